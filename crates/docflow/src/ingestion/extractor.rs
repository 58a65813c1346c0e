//! Extractor capability and the extension registry

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::parser::{CsvExtractor, DocxExtractor, HtmlExtractor, PdfExtractor, PlainTextExtractor};
use crate::error::{Error, Result};

/// Maps file bytes plus the original filename to plain text.
///
/// Implementations are synchronous and may be CPU heavy; callers on an async
/// runtime should run them on a blocking thread.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, filename: &str, data: &[u8]) -> Result<String>;
}

/// Lowercased extension of a filename, without the dot
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Extension-keyed set of extractors.
///
/// An extension with no registration is an `UnsupportedFormat` error; there
/// is no plain-text fallback.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    by_extension: HashMap<String, Arc<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in format
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(&["txt", "text", "md", "markdown"], Arc::new(PlainTextExtractor));
        registry.register(&["csv"], Arc::new(CsvExtractor));
        registry.register(&["html", "htm"], Arc::new(HtmlExtractor));
        registry.register(&["pdf"], Arc::new(PdfExtractor::default()));
        // Legacy .doc goes through the DOCX reader and fails there unless it is really OOXML
        registry.register(&["docx", "doc"], Arc::new(DocxExtractor));
        registry
    }

    /// Register one extractor under several extensions; later registrations win
    pub fn register(&mut self, extensions: &[&str], extractor: Arc<dyn TextExtractor>) {
        for ext in extensions {
            let ext = ext.trim_start_matches('.').to_ascii_lowercase();
            self.by_extension.insert(ext, Arc::clone(&extractor));
        }
    }

    /// Extractor registered for this filename's extension
    pub fn extractor_for(&self, filename: &str) -> Result<Arc<dyn TextExtractor>> {
        let ext = extension_of(filename).ok_or_else(|| {
            Error::UnsupportedFormat(format!("'{}' has no file extension", filename))
        })?;
        self.by_extension.get(&ext).cloned().ok_or_else(|| {
            Error::UnsupportedFormat(format!(
                ".{}. Supported: {}",
                ext,
                self.supported_extensions()
                    .iter()
                    .map(|e| format!(".{}", e))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
    }

    /// Whether a filename would be accepted
    pub fn supports(&self, filename: &str) -> bool {
        self.extractor_for(filename).is_ok()
    }

    /// Registered extensions, sorted
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.by_extension.keys().cloned().collect();
        exts.sort();
        exts
    }
}

impl TextExtractor for ExtractorRegistry {
    fn extract(&self, filename: &str, data: &[u8]) -> Result<String> {
        self.extractor_for(filename)?.extract(filename, data)
    }
}
