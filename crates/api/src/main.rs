mod config;
mod metrics;
mod pages;
mod pipeline;
mod retry;
mod session;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use clap::{Parser, Subcommand};
use extract::{CompletionClient, Extractor, LlmClient, Provider};
use graph::GraphRenderer;
use ingest::{CaptureStore, Dissector, Ingestor};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::config::{AppConfig, LoggingConfig};
use crate::metrics::Metrics;
use crate::pipeline::{Pipeline, PipelineError};
use crate::retry::{RetryPolicy, RetryingClient};
use crate::session::{SessionContext, SessionError, SessionStore};

/// The completion client used outside of tests.
type LiveClient = RetryingClient<LlmClient>;

#[derive(Parser)]
#[command(name = "packet-graph", version, about = "Turn packet captures into knowledge graphs")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = config::CONFIG_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the upload and graph pages (default)
    Serve {
        /// Address to listen on, e.g. 127.0.0.1:8501
        #[arg(long)]
        bind: Option<String>,
    },
    /// Convert, extract and render a single capture without the UI
    Run {
        capture: PathBuf,
        /// Where to write the graph document
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

struct AppState<C> {
    pipeline: Pipeline<C>,
    sessions: SessionStore,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            serve(&config).await
        }
        Command::Run { capture, output } => {
            if let Some(output) = output {
                config.storage.output_path = output;
            }
            run_once(&config, capture).await
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_pipeline(config: &AppConfig) -> Pipeline<LiveClient> {
    let store = CaptureStore::new(
        config.storage.upload_dir.clone(),
        config.storage.accepted_extensions.clone(),
    );
    let dissector = Dissector::from_config(&config.dissector);
    let client = RetryingClient::new(
        LlmClient::from_settings(&config.llm),
        RetryPolicy::from_config(&config.retry),
    );

    Pipeline::new(
        Ingestor::new(store, dissector),
        Extractor::new(client),
        GraphRenderer::new(config.layout.clone(), config.style.clone()),
        config.storage.output_path.clone(),
        Metrics::new(),
    )
}

async fn serve(config: &AppConfig) -> Result<()> {
    if config.llm.provider == Provider::OpenAi && config.llm.api_key.is_none() {
        tracing::warn!(
            "No API key configured; set {} before proceeding to the graph page",
            extract::llm::OPENAI_API_KEY_VAR
        );
    }

    let state = Arc::new(AppState {
        pipeline: build_pipeline(config),
        sessions: SessionStore::with_limits(
            Duration::from_secs(config.server.session_ttl_secs),
            config.server.max_sessions,
        ),
    });
    let app = router(state, config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    tracing::info!("Server listening on http://{}", config.server.bind);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn run_once(config: &AppConfig, capture: PathBuf) -> Result<()> {
    let pipeline = build_pipeline(config);
    let with_hint = |e: PipelineError| anyhow!("{e}\n{}", e.hint());

    let ingested = pipeline.ingest_file(&capture).await.map_err(with_hint)?;
    let outcome = pipeline
        .render_graph(&ingested.json_path)
        .await
        .map_err(with_hint)?;

    for skipped in &outcome.skipped {
        println!("{skipped}");
    }
    println!(
        "Wrote {} ({} nodes, {} edges)",
        outcome.output_path.display(),
        outcome.nodes,
        outcome.edges
    );
    Ok(())
}

fn router<C: CompletionClient + 'static>(
    state: Arc<AppState<C>>,
    max_upload_bytes: usize,
) -> Router {
    Router::new()
        .route("/", get(upload_form::<C>))
        .route("/upload", post(upload_capture::<C>))
        .route("/sessions/:id/graph", post(show_graph::<C>))
        .route("/graph.html", get(graph_document::<C>))
        .route("/health", get(health_check))
        .route("/stats", get(get_stats::<C>))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .with_state(state)
}

fn error_response(status: StatusCode, message: &str, hint: &str) -> Response {
    (status, Html(pages::error_page(message, hint))).into_response()
}

fn pipeline_error_response(err: &PipelineError) -> Response {
    tracing::error!(error = %err, "Request failed");
    error_response(err.status(), &err.to_string(), err.hint())
}

async fn upload_form<C: CompletionClient + 'static>(
    State(state): State<Arc<AppState<C>>>,
) -> Html<String> {
    Html(pages::upload_page(
        state.pipeline.ingestor().store().extensions(),
    ))
}

struct Upload {
    file_name: String,
    bytes: Vec<u8>,
}

/// First `capture` field of the form, if any.
async fn read_upload(
    multipart: &mut Multipart,
) -> Result<Option<Upload>, axum::extract::multipart::MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("capture") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        return Ok(Some(Upload {
            file_name,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

async fn upload_capture<C: CompletionClient + 'static>(
    State(state): State<Arc<AppState<C>>>,
    mut multipart: Multipart,
) -> Response {
    let metrics = state.pipeline.metrics();
    let upload = match read_upload(&mut multipart).await {
        Ok(Some(upload)) if !upload.bytes.is_empty() => upload,
        Ok(_) => {
            metrics.record_request(false);
            return error_response(
                StatusCode::BAD_REQUEST,
                "No capture was uploaded.",
                "Choose a PCAP file and submit the form again.",
            );
        }
        Err(e) => {
            metrics.record_request(false);
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Malformed upload: {e}"),
                "Submit the form again; very large captures may exceed the upload limit.",
            );
        }
    };

    match state
        .pipeline
        .ingest_upload(&upload.file_name, &upload.bytes)
        .await
    {
        Ok(capture) => {
            metrics.record_request(true);
            let session = SessionContext::new(capture);
            let page = pages::uploaded_page(&session);
            let id = state.sessions.insert(session);
            tracing::info!(session = %id, file = %upload.file_name, "Capture ready");
            Html(page).into_response()
        }
        Err(e) => {
            metrics.record_request(false);
            pipeline_error_response(&e)
        }
    }
}

async fn show_graph<C: CompletionClient + 'static>(
    State(state): State<Arc<AppState<C>>>,
    Path(id): Path<Uuid>,
) -> Response {
    let metrics = state.pipeline.metrics();
    let json_path = match state.sessions.proceed(id) {
        Ok(path) => path,
        Err(e) => {
            metrics.record_request(false);
            let status = match e {
                SessionError::NotFound(_) => StatusCode::NOT_FOUND,
                SessionError::AlreadyGraphed(_) => StatusCode::CONFLICT,
            };
            return error_response(
                status,
                &e.to_string(),
                "Upload the capture again to build a new graph.",
            );
        }
    };

    match state.pipeline.render_graph(&json_path).await {
        Ok(outcome) => {
            metrics.record_request(true);
            Html(pages::graph_page(id, &outcome)).into_response()
        }
        Err(e) => {
            metrics.record_request(false);
            state.sessions.rollback(id);
            pipeline_error_response(&e)
        }
    }
}

async fn graph_document<C: CompletionClient + 'static>(
    State(state): State<Arc<AppState<C>>>,
) -> Response {
    let path = state.pipeline.output_path();
    match tokio::fs::read_to_string(path).await {
        Ok(html) => (
            [(header::CACHE_CONTROL, "no-store")],
            Html(html),
        )
            .into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => error_response(
            StatusCode::NOT_FOUND,
            "No graph has been rendered yet.",
            "Upload a capture and proceed to the graph page.",
        ),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to read graph document");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Failed to read {}: {e}", path.display()),
                "Check the configured output path.",
            )
        }
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_stats<C: CompletionClient + 'static>(
    State(state): State<Arc<AppState<C>>>,
) -> Json<metrics::MetricsSnapshot> {
    Json(state.pipeline.metrics().snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CannedClient, FailingClient, test_state};
    use axum::body::Body;
    use axum::http::Request;
    use crate::session::Page;
    use ingest::IngestedCapture;
    use tower::ServiceExt;

    const BOUNDARY: &str = "packet-graph-boundary";
    const LIMIT: usize = 1024 * 1024;

    fn upload_request(file_name: &str, contents: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"capture\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             {contents}\r\n\
             --{BOUNDARY}--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn post(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// A session whose JSON document is already on disk.
    fn ready_session<C: CompletionClient>(dir: &std::path::Path, state: &AppState<C>) -> Uuid {
        let json_path = dir.join("capture.pcap.json");
        std::fs::write(&json_path, r#"[{"_source":{"layers":{"ip":{}}}}]"#).unwrap();
        state.sessions.insert(SessionContext::new(IngestedCapture {
            capture_path: dir.join("capture.pcap"),
            json_path,
        }))
    }

    #[tokio::test]
    async fn test_upload_page() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "echo", CannedClient::new(""));

        let response = router(state, LIMIT).oneshot(get("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains(pages::UPLOAD_TITLE));
        assert!(html.contains("name=\"capture\""));
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "echo", CannedClient::new(""));

        let response = router(state, LIMIT).oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("ok"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_upload_creates_session() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "echo", CannedClient::new(""));

        let response = router(state.clone(), LIMIT)
            .oneshot(upload_request("dump.pcap", "not really a capture"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains(pages::UPLOAD_SUCCESS));
        assert!(html.contains("Proceed to Graph"));
        assert_eq!(state.sessions.len(), 1);
        assert!(dir.path().join("temp/dump.pcap").is_file());
        assert!(dir.path().join("temp/dump.pcap.json").is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_conversion_stays_on_upload() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "false", CannedClient::new(""));

        let response = router(state.clone(), LIMIT)
            .oneshot(upload_request("dump.pcap", "junk"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(state.sessions.is_empty());
        assert_eq!(state.pipeline.metrics().snapshot().failed_requests, 1);
    }

    #[tokio::test]
    async fn test_wrong_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "echo", CannedClient::new(""));

        let response = router(state.clone(), LIMIT)
            .oneshot(upload_request("notes.txt", "hello"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_proceed_renders_graph_once() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(
            dir.path(),
            "echo",
            CannedClient::new("(10.0.0.1, sent DNS query to, 8.8.8.8)<|>(8.8.8.8, replied to, 10.0.0.1)"),
        );
        let id = ready_session(dir.path(), &state);
        let uri = format!("/sessions/{id}/graph");

        let response = router(state.clone(), LIMIT).oneshot(post(&uri)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains(pages::GRAPH_TITLE));
        assert!(html.contains("2 nodes, 2 edges"));

        let document = router(state.clone(), LIMIT)
            .oneshot(get("/graph.html"))
            .await
            .unwrap();
        assert_eq!(document.status(), StatusCode::OK);
        assert!(body_text(document).await.contains("10.0.0.1"));

        let again = router(state, LIMIT).oneshot(post(&uri)).await.unwrap();
        assert_eq!(again.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "echo", CannedClient::new(""));
        let uri = format!("/sessions/{}/graph", Uuid::new_v4());

        let response = router(state, LIMIT).oneshot(post(&uri)).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_extraction_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "echo", FailingClient);
        let id = ready_session(dir.path(), &state);

        let response = router(state.clone(), LIMIT)
            .oneshot(post(&format!("/sessions/{id}/graph")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(!dir.path().join("graph.html").exists());
        assert_eq!(state.sessions.get(id).unwrap().page(), Page::Upload);

        // The same session can be confirmed again without a new upload.
        let retry = router(state, LIMIT)
            .oneshot(post(&format!("/sessions/{id}/graph")))
            .await
            .unwrap();
        assert_eq!(retry.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_graph_document_missing() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), "echo", CannedClient::new(""));

        let response = router(state, LIMIT).oneshot(get("/graph.html")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "packet-graph",
            "run",
            "dump.pcap",
            "--output",
            "out.html",
        ])
        .unwrap();

        match cli.command {
            Some(Command::Run { capture, output }) => {
                assert_eq!(capture, PathBuf::from("dump.pcap"));
                assert_eq!(output, Some(PathBuf::from("out.html")));
            }
            _ => panic!("expected run subcommand"),
        }
    }
}
