use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("rejected capture name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("failed to store capture at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Uploaded captures live under a single directory, keyed by their original file name.
pub struct CaptureStore {
    root: PathBuf,
    extensions: Vec<String>,
}

impl CaptureStore {
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Accepted extensions, lowercase and without the leading dot.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Write `bytes` to `<root>/<file name>`, creating the directory on demand.
    /// A previous capture with the same name is replaced.
    pub async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, CaptureError> {
        let name = self.validate_name(file_name)?;

        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| CaptureError::Io {
                path: self.root.clone(),
                source,
            })?;

        let path = self.root.join(name);
        fs::write(&path, bytes)
            .await
            .map_err(|source| CaptureError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::info!(path = %path.display(), bytes = bytes.len(), "Stored capture");
        Ok(path)
    }

    /// Reduce a client-supplied name to its final path component and check the extension.
    pub fn validate_name<'a>(&self, file_name: &'a str) -> Result<&'a str, CaptureError> {
        let invalid = |reason: &str| CaptureError::InvalidName {
            name: file_name.to_string(),
            reason: reason.to_string(),
        };

        // Browsers on Windows may send the full client path.
        let base = file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(file_name)
            .trim();

        if base.is_empty() || base == "." || base == ".." {
            return Err(invalid("empty file name"));
        }

        let extension = Path::new(base)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if !self.extensions.iter().any(|accepted| *accepted == extension) {
            return Err(invalid(&format!(
                "expected one of: {}",
                self.extensions.join(", ")
            )));
        }

        Ok(base)
    }
}
