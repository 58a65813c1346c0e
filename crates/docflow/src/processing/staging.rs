//! Temporary copies of uploaded payloads

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::Result;

/// Filesystem-safe form of a client-supplied filename.
///
/// Directory components are dropped and anything outside
/// `[A-Za-z0-9._-]` becomes `_`.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Upload written to `upload_dir/{task_id}_{filename}`, owned by one run.
///
/// [`release`](Self::release) removes it and may be called any number of
/// times; dropping an unreleased file removes it synchronously.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    released: bool,
}

impl StagedFile {
    pub async fn write(dir: &Path, task_id: Uuid, filename: &str, data: &[u8]) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let staged = Self {
            path: dir.join(format!("{}_{}", task_id, sanitize_filename(filename))),
            released: false,
        };
        // A partial write is cleaned up by Drop
        tokio::fs::write(&staged.path, data).await?;
        Ok(staged)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&self.path).await?)
    }

    /// Remove the file; a file that is already gone is not an error
    pub async fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.released = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!("Could not remove staged file {}: {}", self.path.display(), e);
                }
            }
        }
    }
}
