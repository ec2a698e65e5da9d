use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid JSON: {source}", path.display())]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no credential for the completion service; set {0}")]
    MissingCredential(&'static str),

    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode completion response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl ExtractionError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExtractionError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ExtractionError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Short instruction shown next to the error message.
    pub fn hint(&self) -> &'static str {
        match self {
            ExtractionError::Read { .. } | ExtractionError::InvalidJson { .. } => {
                "The dissector output is unusable; upload the capture again."
            }
            ExtractionError::MissingCredential(_) => {
                "Export OPENAI_API_KEY (or set llm.api_key) and restart."
            }
            ExtractionError::Request(_) => {
                "The completion service is unreachable or too slow; check llm.base_url and llm.timeout_secs."
            }
            ExtractionError::Status { .. } | ExtractionError::Decode(_) => {
                "The completion service rejected the request; check the model name and credential."
            }
        }
    }
}
