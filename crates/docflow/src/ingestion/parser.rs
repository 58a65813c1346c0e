//! Built-in format extractors

use std::time::Duration;

use super::extractor::TextExtractor;
use crate::error::{Error, Result};

/// Replace typographic characters PDF fonts commonly emit with ASCII
/// equivalents, drop NULs and blank lines.
fn cleanup_pdf_text(text: &str) -> String {
    text.replace('\0', "")
        .replace(['\u{2010}', '\u{2011}', '\u{2013}'], "-")
        .replace('\u{2014}', "--")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace('\u{2022}', "* ")
        .replace('\u{2026}', "...")
        .replace('\u{00A0}', " ")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// UTF-8 text, invalid sequences replaced
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, _filename: &str, data: &[u8]) -> Result<String> {
        Ok(String::from_utf8_lossy(data).into_owned())
    }
}

/// Visible text of the document body
pub struct HtmlExtractor;

impl TextExtractor for HtmlExtractor {
    fn extract(&self, filename: &str, data: &[u8]) -> Result<String> {
        let html = String::from_utf8_lossy(data);
        let document = scraper::Html::parse_document(&html);

        let body_selector = scraper::Selector::parse("body")
            .map_err(|e| Error::extraction(filename, format!("bad selector: {}", e)))?;

        let mut content = String::new();
        if let Some(body) = document.select(&body_selector).next() {
            for text in body.text() {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    if !content.is_empty() {
                        content.push(' ');
                    }
                    content.push_str(trimmed);
                }
            }
        }

        Ok(content)
    }
}

/// Rows joined with " | ", header first
pub struct CsvExtractor;

impl TextExtractor for CsvExtractor {
    fn extract(&self, filename: &str, data: &[u8]) -> Result<String> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(data);
        let mut content = String::new();

        let headers = reader
            .headers()
            .map_err(|e| Error::extraction(filename, e.to_string()))?;
        content.push_str(&headers.iter().collect::<Vec<_>>().join(" | "));
        content.push('\n');

        for record in reader.records() {
            let record = record.map_err(|e| Error::extraction(filename, e.to_string()))?;
            content.push_str(&record.iter().collect::<Vec<_>>().join(" | "));
            content.push('\n');
        }

        Ok(content)
    }
}

/// Paragraph text of a Word document
pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn extract(&self, filename: &str, data: &[u8]) -> Result<String> {
        let doc = docx_rs::read_docx(data).map_err(|e| Error::extraction(filename, e.to_string()))?;

        let mut paragraphs = Vec::new();
        for child in doc.document.children {
            if let docx_rs::DocumentChild::Paragraph(p) = child {
                let mut text = String::new();
                for child in p.children {
                    if let docx_rs::ParagraphChild::Run(run) = child {
                        for child in run.children {
                            if let docx_rs::RunChild::Text(t) = child {
                                text.push_str(&t.text);
                            }
                        }
                    }
                }
                if !text.is_empty() {
                    paragraphs.push(text);
                }
            }
        }

        Ok(paragraphs.join("\n").trim().to_string())
    }
}

/// PDF text via `pdf-extract`, falling back to a raw `lopdf` content-stream scan
pub struct PdfExtractor {
    /// Budget for the primary extractor before the fallback is used
    pub primary_timeout: Duration,
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self {
            primary_timeout: Duration::from_secs(60),
        }
    }
}

impl PdfExtractor {
    /// `pdf-extract` can hang on some embedded fonts, so it runs on its own
    /// thread and is abandoned after `primary_timeout`.
    fn extract_primary(&self, filename: &str, data: &[u8]) -> Result<String> {
        use std::sync::mpsc;
        use std::thread;

        let data_vec = data.to_vec();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let result = pdf_extract::extract_text_from_mem(&data_vec);
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.primary_timeout) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => {
                tracing::warn!("pdf-extract failed on '{}': {}, trying fallback", filename, e);
                Self::extract_fallback(filename, data)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::error!(
                    "pdf-extract timed out after {:?} on '{}', trying fallback",
                    self.primary_timeout,
                    filename
                );
                Self::extract_fallback(filename, data)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::error!("pdf-extract thread crashed on '{}'", filename);
                Self::extract_fallback(filename, data)
            }
        }
    }

    fn extract_fallback(filename: &str, data: &[u8]) -> Result<String> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::extraction(filename, format!("Failed to load PDF: {}", e)))?;

        let mut all_text = String::new();
        for (page_num, page_id) in doc.get_pages() {
            match doc.get_page_content(page_id) {
                Ok(content) => {
                    let text = text_from_content_stream(&content);
                    if !text.is_empty() {
                        all_text.push_str(&text);
                        all_text.push('\n');
                    }
                }
                Err(e) => {
                    tracing::debug!("No content for page {} of '{}': {}", page_num, filename, e);
                }
            }
        }

        if all_text.trim().is_empty() {
            return Err(Error::extraction(
                filename,
                "PDF appears to be image-based or has no extractable text",
            ));
        }

        Ok(all_text)
    }
}

impl TextExtractor for PdfExtractor {
    fn extract(&self, filename: &str, data: &[u8]) -> Result<String> {
        let content = cleanup_pdf_text(&self.extract_primary(filename, data)?);
        if content.trim().is_empty() {
            return Err(Error::extraction(
                filename,
                "No text content could be extracted from PDF",
            ));
        }
        Ok(content)
    }
}

/// Text shown by `Tj`/`TJ` operators between `BT` and `ET`
fn text_from_content_stream(content: &[u8]) -> String {
    let content_str = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut in_text_block = false;
    let mut current = String::new();

    for line in content_str.lines() {
        let line = line.trim();
        match line {
            "BT" => in_text_block = true,
            "ET" => {
                in_text_block = false;
                if !current.is_empty() {
                    text.push_str(&current);
                    text.push(' ');
                    current.clear();
                }
            }
            _ if in_text_block && (line.ends_with("Tj") || line.ends_with("TJ")) => {
                if let (Some(start), Some(end)) = (line.find('('), line.rfind(')')) {
                    if start < end {
                        let decoded = line[start + 1..end]
                            .replace("\\n", "\n")
                            .replace("\\(", "(")
                            .replace("\\)", ")")
                            .replace("\\\\", "\\");
                        current.push_str(&decoded);
                    }
                }
            }
            _ => {}
        }
    }

    text.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_lossy_utf8() {
        let text = PlainTextExtractor.extract("a.txt", b"caf\xc3\xa9 \xff").unwrap();
        assert!(text.starts_with("café "));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_html_body_text() {
        let html = b"<html><head><title>skip</title></head>\
                     <body><h1>Title</h1><p>First  para</p><p>Second</p></body></html>";
        let text = HtmlExtractor.extract("a.html", html).unwrap();
        assert_eq!(text, "Title First  para Second");
    }

    #[test]
    fn test_csv_rows_joined() {
        let text = CsvExtractor.extract("a.csv", b"name,score\nann,3\nbob,4\n").unwrap();
        assert_eq!(text, "name | score\nann | 3\nbob | 4\n");
    }

    #[test]
    fn test_corrupt_pdf_is_extraction_error() {
        let err = PdfExtractor::default()
            .extract("broken.pdf", b"%PDF-1.4 not really")
            .unwrap_err();
        match err {
            Error::Extraction { filename, .. } => assert_eq!(filename, "broken.pdf"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_docx_is_extraction_error() {
        assert!(matches!(
            DocxExtractor.extract("broken.docx", b"not a zip"),
            Err(Error::Extraction { .. })
        ));
    }

    #[test]
    fn test_content_stream_text() {
        let stream = b"BT\n/F1 12 Tf\n(Hello \\(world\\)) Tj\nET\nBT\n(Again) Tj\nET\n";
        assert_eq!(text_from_content_stream(stream), "Hello (world) Again");
    }

    #[test]
    fn test_cleanup_pdf_text() {
        let raw = "  \u{201C}quoted\u{201D}\u{2014}done\0 \n\n\u{FB01}ne  ";
        assert_eq!(cleanup_pdf_text(raw), "\"quoted\"--done\nfine");
    }
}
