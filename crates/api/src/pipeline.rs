use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::http::StatusCode;
use extract::{CompletionClient, ExtractionError, Extractor, MalformedTriple};
use graph::{GraphRenderer, RenderError, build_report};
use ingest::{CaptureError, ConvertError, IngestError, IngestedCapture, Ingestor};
use thiserror::Error;

use crate::metrics::{Metrics, TimedOperation};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("rendering task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<IngestError> for PipelineError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Capture(e) => PipelineError::Capture(e),
            IngestError::Convert(e) => PipelineError::Convert(e),
        }
    }
}

impl PipelineError {
    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::Capture(CaptureError::InvalidName { .. }) => StatusCode::BAD_REQUEST,
            PipelineError::Convert(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Extraction(
                ExtractionError::Read { .. } | ExtractionError::InvalidJson { .. },
            ) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Extraction(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Capture(_) | PipelineError::Render(_) | PipelineError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// What the user can do about it.
    pub fn hint(&self) -> &'static str {
        match self {
            PipelineError::Capture(CaptureError::InvalidName { .. }) => {
                "Choose a .pcap file and upload it again."
            }
            PipelineError::Capture(CaptureError::Io { .. }) => {
                "Check that the upload directory is writable."
            }
            PipelineError::Convert(e) => e.hint(),
            PipelineError::Extraction(e) => e.hint(),
            PipelineError::Render(_) | PipelineError::Task(_) => {
                "Check that the output path for graph.html is writable."
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphOutcome {
    pub nodes: usize,
    pub edges: usize,
    pub skipped: Vec<MalformedTriple>,
    pub output_path: PathBuf,
}

/// Upload -> JSON -> triples -> graph -> document, one step per call.
pub struct Pipeline<C> {
    ingestor: Ingestor,
    extractor: Extractor<C>,
    renderer: GraphRenderer,
    output_path: PathBuf,
    metrics: Arc<Metrics>,
}

impl<C: CompletionClient> Pipeline<C> {
    pub fn new(
        ingestor: Ingestor,
        extractor: Extractor<C>,
        renderer: GraphRenderer,
        output_path: PathBuf,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            ingestor,
            extractor,
            renderer,
            output_path,
            metrics,
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Store an uploaded capture and dissect it.
    pub async fn ingest_upload(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<IngestedCapture, PipelineError> {
        let timer = TimedOperation::start();
        let capture = self.ingestor.ingest_upload(file_name, bytes).await?;
        self.metrics.record_convert(timer.elapsed());
        Ok(capture)
    }

    /// Dissect a capture already on disk.
    pub async fn ingest_file(&self, capture_path: &Path) -> Result<IngestedCapture, PipelineError> {
        let timer = TimedOperation::start();
        let capture = self.ingestor.ingest_file(capture_path).await?;
        self.metrics.record_convert(timer.elapsed());
        Ok(capture)
    }

    /// Extract triples from a dissected capture and replace the rendered document.
    pub async fn render_graph(&self, json_path: &Path) -> Result<GraphOutcome, PipelineError> {
        let timer = TimedOperation::start();
        let candidates = self.extractor.extract_triples(json_path).await?;
        let report = build_report(&candidates);
        self.metrics
            .record_extract(timer.elapsed(), report.graph.edge_count(), report.skipped.len());

        if !report.skipped.is_empty() {
            tracing::warn!(
                json = %json_path.display(),
                skipped = report.skipped.len(),
                "Some extracted triples were malformed"
            );
        }

        let timer = TimedOperation::start();
        let renderer = self.renderer.clone();
        let output_path = self.output_path.clone();
        let graph = report.graph;
        let graph = tokio::task::spawn_blocking(move || {
            renderer.render_to(&graph, &output_path).map(|()| graph)
        })
        .await??;
        self.metrics.record_render(timer.elapsed());

        Ok(GraphOutcome {
            nodes: graph.node_count(),
            edges: graph.edge_count(),
            skipped: report.skipped,
            output_path: self.output_path.clone(),
        })
    }
}
