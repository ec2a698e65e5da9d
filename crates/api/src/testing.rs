//! Stub completion clients and wiring shared by the api tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use extract::{CompletionClient, ExtractionError, Extractor};
use graph::GraphRenderer;
use ingest::{CaptureStore, Dissector, Ingestor};

use crate::AppState;
use crate::metrics::Metrics;
use crate::pipeline::Pipeline;
use crate::session::SessionStore;

pub struct CannedClient {
    completion: String,
}

impl CannedClient {
    pub fn new(completion: &str) -> Self {
        Self {
            completion: completion.to_string(),
        }
    }
}

impl CompletionClient for CannedClient {
    async fn complete(&self, _prompt: &str) -> Result<String, ExtractionError> {
        Ok(self.completion.clone())
    }
}

pub struct FailingClient;

impl CompletionClient for FailingClient {
    async fn complete(&self, _prompt: &str) -> Result<String, ExtractionError> {
        Err(ExtractionError::Status {
            status: 401,
            body: "invalid api key".to_string(),
        })
    }
}

/// Uploads land in `dir/temp`, the document in `dir/graph.html`.
pub fn test_pipeline<C: CompletionClient>(dir: &Path, program: &str, client: C) -> Pipeline<C> {
    let store = CaptureStore::new(dir.join("temp"), vec!["pcap".into(), "pcapng".into()]);
    let dissector = Dissector::new(program, Duration::from_secs(5));
    Pipeline::new(
        Ingestor::new(store, dissector),
        Extractor::new(client),
        GraphRenderer::default(),
        dir.join("graph.html"),
        Metrics::new(),
    )
}

pub fn test_state<C: CompletionClient>(dir: &Path, program: &str, client: C) -> Arc<AppState<C>> {
    Arc::new(AppState {
        pipeline: test_pipeline(dir, program, client),
        sessions: SessionStore::new(),
    })
}
