//! Notes Digitizer - local session server for digitizing handwritten notes.

mod acquisition;
mod config;
mod digitize;
mod export;
mod notify;
mod session;
mod workflow;

use acquisition::FileHandle;
use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use config::AppConfig;
use digitize::edge_function::EdgeFunctionDigitizer;
use export::CommandClipboard;
use notify::{Notification, NotificationFeed};
use session::{CopyError, Pending, SelectError, Session, Snapshot};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    session: Session,
    feed: NotificationFeed,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "notes_digitizer=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let digitizer = EdgeFunctionDigitizer::from_config(&config)?;
    let clipboard = match config.clipboard_command.as_deref() {
        Some(line) => CommandClipboard::from_command_line(line)
            .context("DIGITIZER_CLIPBOARD_CMD is empty")?,
        None => CommandClipboard::detect(),
    };
    info!("Clipboard: {:?}", clipboard);

    let feed = NotificationFeed::new();
    let session = Session::new(
        Arc::new(digitizer),
        Arc::new(clipboard),
        Arc::new(feed.clone()),
    );

    let app = router(
        AppState { session, feed },
        config.max_upload_bytes,
        config.allowed_origin.clone(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Cross-origin access is off unless an origin is configured; the picker
/// endpoint reads local files and `/session` serves them back.
fn router(state: AppState, max_upload_bytes: usize, allowed_origin: Option<HeaderValue>) -> Router {
    let app = Router::new()
        .route("/health", get(health))
        .route("/session", get(get_session))
        .route("/session/image", post(upload_image).delete(reset_image))
        .route("/session/image/path", post(pick_image))
        .route("/session/digitize", post(digitize))
        .route("/session/text", put(edit_text))
        .route("/session/clipboard", post(copy_text))
        .route("/session/download", get(download_text))
        .route("/notifications", get(notifications))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http());

    let app = match allowed_origin {
        Some(origin) => app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE]),
        ),
        None => app,
    };

    app.with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Current phase, image, text and offered actions.
async fn get_session(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.session.snapshot())
}

#[derive(serde::Deserialize)]
struct WaitParams {
    /// Answer with the settled snapshot instead of 202.
    #[serde(default)]
    wait: bool,
}

/// Drop path: a multipart upload with a single `file` field.
async fn upload_image(
    State(state): State<AppState>,
    Query(params): Query<WaitParams>,
    mut multipart: Multipart,
) -> Result<Response, (StatusCode, String)> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        if field.name() == Some("file") {
            let name = field.file_name().unwrap_or("image").to_string();
            let content_type = field.content_type().unwrap_or_default().to_string();
            let data = field.bytes().await.map_err(|e| {
                (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
            })?;

            info!("Received file: {} ({} bytes, '{}')", name, data.len(), content_type);
            let file = FileHandle::from_bytes(name, content_type, data.to_vec());
            return accept(&state, file, params.wait).await;
        }
    }

    Err((StatusCode::BAD_REQUEST, "No file uploaded".to_string()))
}

#[derive(serde::Deserialize)]
struct PickRequest {
    path: PathBuf,
}

/// Picker path: a file on the local filesystem.
async fn pick_image(
    State(state): State<AppState>,
    Query(params): Query<WaitParams>,
    Json(request): Json<PickRequest>,
) -> Result<Response, (StatusCode, String)> {
    accept(&state, FileHandle::from_path(request.path), params.wait).await
}

async fn accept(
    state: &AppState,
    file: FileHandle,
    wait: bool,
) -> Result<Response, (StatusCode, String)> {
    match state.session.select_file(file) {
        Ok(pending) => Ok(respond(state, pending, wait).await),
        Err(SelectError::Rejected(rejected)) => Err((
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            rejected.user_message().to_string(),
        )),
        Err(SelectError::Refused(refused)) => Err((StatusCode::CONFLICT, refused.to_string())),
    }
}

/// Background work finishes on its own and clients poll `/session`, unless
/// they asked to wait for it.
async fn respond(state: &AppState, pending: Pending, wait: bool) -> Response {
    if wait {
        pending.settled().await;
        Json(state.session.snapshot()).into_response()
    } else {
        drop(pending);
        StatusCode::ACCEPTED.into_response()
    }
}

async fn reset_image(State(state): State<AppState>) -> Json<Snapshot> {
    state.session.reset();
    Json(state.session.snapshot())
}

async fn digitize(
    State(state): State<AppState>,
    Query(params): Query<WaitParams>,
) -> Result<Response, (StatusCode, String)> {
    match state.session.digitize() {
        Ok(pending) => Ok(respond(&state, pending, params.wait).await),
        Err(refused) => Err((StatusCode::CONFLICT, refused.to_string())),
    }
}

async fn edit_text(
    State(state): State<AppState>,
    text: String,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .session
        .edit_text(text)
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|refused| (StatusCode::CONFLICT, refused.to_string()))
}

async fn copy_text(State(state): State<AppState>) -> Result<StatusCode, (StatusCode, String)> {
    match state.session.copy_to_clipboard().await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(CopyError::Refused(refused)) => Err((StatusCode::CONFLICT, refused.to_string())),
        Err(CopyError::Export(e)) => Err((StatusCode::SERVICE_UNAVAILABLE, e.to_string())),
    }
}

async fn download_text(State(state): State<AppState>) -> Result<Response, (StatusCode, String)> {
    let download = state
        .session
        .download()
        .map_err(|refused| (StatusCode::CONFLICT, refused.to_string()))?;

    let disposition = format!("attachment; filename=\"{}\"", download.filename);
    Ok((
        [
            (header::CONTENT_TYPE, download.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.body,
    )
        .into_response())
}

/// Notifications raised since the last poll.
async fn notifications(State(state): State<AppState>) -> Json<Vec<Notification>> {
    Json(state.feed.drain())
}
