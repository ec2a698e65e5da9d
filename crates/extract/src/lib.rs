pub mod error;
pub mod llm;
pub mod parser;
pub mod prompt;
pub mod schema;

pub use error::ExtractionError;
pub use llm::{CompletionClient, LlmClient, LlmSettings, OllamaClient, OpenAiClient, Provider};
pub use parser::parse_triples;
pub use prompt::TRIPLE_DELIMITER;
pub use schema::{MalformedReason, MalformedTriple, Triple};

use std::path::Path;

/// Turns a dissected capture into raw triple text via a completion service.
pub struct Extractor<C> {
    client: C,
    delimiter: String,
}

impl<C: CompletionClient> Extractor<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            delimiter: TRIPLE_DELIMITER.to_string(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Submit the whole JSON document in one prompt and return the raw completion.
    pub async fn extract(&self, json_path: &Path) -> Result<String, ExtractionError> {
        let text = load_document_text(json_path).await?;
        let prompt = prompt::build_extraction_prompt(&text);

        tracing::debug!(
            json = %json_path.display(),
            prompt_chars = prompt.len(),
            "Requesting triple extraction"
        );

        let completion = self.client.complete(&prompt).await?;

        tracing::info!(
            json = %json_path.display(),
            completion_chars = completion.len(),
            "Received extraction completion"
        );
        Ok(completion)
    }

    /// [`Extractor::extract`] followed by [`parse_triples`].
    pub async fn extract_triples(&self, json_path: &Path) -> Result<Vec<String>, ExtractionError> {
        let completion = self.extract(json_path).await?;
        Ok(parse_triples(&completion, &self.delimiter))
    }
}

/// Read a JSON document and serialize it back to a single compact string.
pub async fn load_document_text(json_path: &Path) -> Result<String, ExtractionError> {
    let raw = tokio::fs::read_to_string(json_path)
        .await
        .map_err(|source| ExtractionError::Read {
            path: json_path.to_path_buf(),
            source,
        })?;

    let document: serde_json::Value =
        serde_json::from_str(&raw).map_err(|source| ExtractionError::InvalidJson {
            path: json_path.to_path_buf(),
            source,
        })?;

    Ok(document.to_string())
}
