pub mod capture;
pub mod dissector;

pub use capture::{CaptureError, CaptureStore};
pub use dissector::{ConvertError, Dissector, DissectorConfig, sidecar_path};

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

/// A stored capture together with its dissected JSON document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedCapture {
    pub capture_path: PathBuf,
    pub json_path: PathBuf,
}

/// Main ingestion pipeline: store the upload, then dissect it.
pub struct Ingestor {
    store: CaptureStore,
    dissector: Dissector,
}

impl Ingestor {
    pub fn new(store: CaptureStore, dissector: Dissector) -> Self {
        Self { store, dissector }
    }

    pub async fn ingest_upload(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<IngestedCapture, IngestError> {
        let capture_path = self.store.save(file_name, bytes).await?;
        Ok(self.ingest_file(&capture_path).await?)
    }

    /// Dissect a capture that is already on disk.
    pub async fn ingest_file(&self, capture_path: &Path) -> Result<IngestedCapture, ConvertError> {
        let json_path = sidecar_path(capture_path);
        self.dissector.convert(capture_path, &json_path).await?;

        Ok(IngestedCapture {
            capture_path: capture_path.to_path_buf(),
            json_path,
        })
    }

    pub fn store(&self) -> &CaptureStore {
        &self.store
    }

    pub fn dissector(&self) -> &Dissector {
        &self.dissector
    }
}
