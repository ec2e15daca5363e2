//! HTTP Server for the Rollbook API.
//!
//! Provides REST endpoints to validate student uploads, download the
//! template and error reports, and import validated records.
//!
//! # API Endpoints
//!
//! | Method | Path                      | Description                             |
//! |--------|---------------------------|-----------------------------------------|
//! | GET    | `/health`                 | Health check                            |
//! | POST   | `/api/students/upload`    | Upload a roster (multipart) to validate |
//! | POST   | `/api/students/template`  | Download the upload template (CSV)      |
//! | POST   | `/api/students/errors`    | Download an error report (CSV)          |
//! | POST   | `/api/students/import`    | Import validated records in batches     |
//! | GET    | `/api/logs`               | SSE stream for real-time logs           |

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{
    error_response, import_error_response, ErrorsRequest, ImportRequest, ImportResponse, TemplateRequest,
    UploadResponse,
};
use crate::config::Settings;
use crate::error::{ImportError, PipelineError, ServerError, ServerResult};
use crate::import::import_in_batches;
use crate::models::ReferenceData;
use crate::parser::FileFormat;
use crate::report::ExportFile;
use crate::upload::process_upload;
use crate::validation::{load_existing_students, load_known_classes, IdentityKey};

type SharedSettings = Arc<Settings>;

/// Build the router (exposed for tests)
pub fn router(settings: Settings) -> Router {
    // Permissive CORS for local frontends
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    let body_limit = settings.max_upload_bytes;

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/students/upload", post(upload_students))
        .route("/api/students/template", post(download_template))
        .route("/api/students/errors", post(download_errors))
        .route("/api/students/import", post(import_students))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(settings))
}

/// Start the HTTP server
pub async fn start_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let port = settings.port;
    match settings.import_url {
        Some(ref url) => tracing::info!("Import endpoint: {}", url),
        None => tracing::warn!("No import endpoint configured; /api/students/import is disabled"),
    }

    let app = router(settings);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("🚀 Rollbook server running on http://localhost:{}", port);
    tracing::info!("   POST /api/students/upload   - Validate a roster");
    tracing::info!("   POST /api/students/template - Download template");
    tracing::info!("   POST /api/students/errors   - Download error report");
    tracing::info!("   POST /api/students/import   - Import records");
    tracing::info!("   GET  /api/logs              - SSE log stream");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Pipeline(err) => match err {
                PipelineError::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
                PipelineError::Reference(_) => StatusCode::BAD_REQUEST,
                PipelineError::BlockingErrors(_) => StatusCode::UNPROCESSABLE_ENTITY,
                PipelineError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
                PipelineError::Import(ImportError::MissingEndpoint) => StatusCode::SERVICE_UNAVAILABLE,
                PipelineError::Import(ImportError::InvalidBatchSize) => StatusCode::BAD_REQUEST,
                PipelineError::Import(_) => StatusCode::BAD_GATEWAY,
            },
        };

        let body = match &self {
            ServerError::Pipeline(PipelineError::Import(err)) => import_error_response(err),
            other => error_response(&other.to_string()),
        };

        (status, Json(body)).into_response()
    }
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "rollbook",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "POST /api/students/upload",
            "template": "POST /api/students/template",
            "errors": "POST /api/students/errors",
            "import": "POST /api/students/import",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Fields collected from the upload form
#[derive(Default)]
struct UploadForm {
    file: Option<Vec<u8>>,
    file_name: Option<String>,
    content_type: Option<String>,
    known_classes: Option<String>,
    existing_students: Option<String>,
    identity_key: Option<String>,
}

async fn read_upload_form(mut multipart: Multipart) -> ServerResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        let read_err = |e: axum::extract::multipart::MultipartError| {
            ServerError::BadRequest(format!("Read error in '{}': {}", name, e))
        };

        match name.as_str() {
            "file" => {
                form.file_name = field.file_name().map(str::to_string);
                form.content_type = field.content_type().map(str::to_string);
                form.file = Some(field.bytes().await.map_err(read_err)?.to_vec());
            }
            "knownClasses" => form.known_classes = Some(field.text().await.map_err(read_err)?),
            "existingStudents" => form.existing_students = Some(field.text().await.map_err(read_err)?),
            "identityKey" => form.identity_key = Some(field.text().await.map_err(read_err)?),
            _ => {}
        }
    }

    Ok(form)
}

fn parse_json_field(name: &str, text: Option<&str>) -> ServerResult<Value> {
    match text.map(str::trim).filter(|t| !t.is_empty()) {
        None => Ok(Value::Array(Vec::new())),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| ServerError::BadRequest(format!("'{}' is not valid JSON: {}", name, e))),
    }
}

/// Upload endpoint: parse and validate a roster
async fn upload_students(
    State(settings): State<SharedSettings>,
    multipart: Multipart,
) -> ServerResult<Json<UploadResponse>> {
    let form = read_upload_form(multipart).await?;

    let bytes = form
        .file
        .ok_or_else(|| ServerError::BadRequest("No file provided".to_string()))?;
    let format = FileFormat::detect(form.content_type.as_deref(), form.file_name.as_deref()).ok_or_else(|| {
        ServerError::BadRequest(format!(
            "Unsupported file type: {}",
            form.content_type.as_deref().unwrap_or("unknown")
        ))
    })?;

    let known_classes = load_known_classes(parse_json_field("knownClasses", form.known_classes.as_deref())?)
        .map_err(PipelineError::from)?;
    let existing_students =
        load_existing_students(parse_json_field("existingStudents", form.existing_students.as_deref())?)
            .map_err(PipelineError::from)?;

    let mut options = settings.validation_options();
    if let Some(key) = form.identity_key.as_deref().filter(|k| !k.trim().is_empty()) {
        options.identity_key = key.parse::<IdentityKey>().map_err(ServerError::BadRequest)?;
    }

    log_info(format!(
        "📄 NEW UPLOAD: {} ({} bytes)",
        form.file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let reference = ReferenceData::new(existing_students, known_classes);
    let output = process_upload(&bytes, format, &reference, &options)?;

    Ok(Json(UploadResponse::from(output)))
}

fn attachment(file: ExportFile) -> Response {
    (
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (header::CONTENT_DISPOSITION, file.content_disposition()),
        ],
        file.bytes,
    )
        .into_response()
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

/// Template endpoint: CSV with one example row per class
async fn download_template(Json(request): Json<TemplateRequest>) -> ServerResult<Response> {
    let file = ExportFile::template_file(&request.known_classes, today()).map_err(PipelineError::from)?;
    Ok(attachment(file))
}

/// Error report endpoint
async fn download_errors(Json(request): Json<ErrorsRequest>) -> ServerResult<Response> {
    let file = ExportFile::errors_file(&request.errors, today()).map_err(PipelineError::from)?;
    Ok(attachment(file))
}

/// Import endpoint: forward records to the configured importer
async fn import_students(
    State(settings): State<SharedSettings>,
    Json(request): Json<ImportRequest>,
) -> ServerResult<Json<ImportResponse>> {
    let mut importer = settings
        .importer()
        .ok_or(PipelineError::Import(ImportError::MissingEndpoint))?;

    let mut options = settings.import_options();
    if let Some(batch_size) = request.batch_size {
        options.batch_size = batch_size;
    }

    let summary = import_in_batches(request.records, &mut importer, &options, |_| {})
        .await
        .map_err(PipelineError::from)?;

    Ok(Json(ImportResponse::from(summary)))
}
