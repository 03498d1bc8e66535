//! HTTP surface: a single-page chat UI plus a small JSON API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, Redirect};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::app::{NoticeLevel, RagApp, SystemStatus};
use crate::loader::UploadedFile;
use crate::session::ChatMessage;

mod page;

pub use page::render_page;

/// App shared by every handler; one request holds it at a time.
pub type SharedApp = Arc<Mutex<RagApp>>;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

type ApiError = (StatusCode, Json<ErrorBody>);

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChatForm {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Debug, Serialize)]
struct ChatReply {
    answer: String,
    messages: Vec<ChatMessage>,
}

/// Builds the router over `app`.
pub fn router(app: SharedApp) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/documents", post(upload_documents))
        .route("/chat", post(chat_form))
        .route("/clear", post(clear_chat))
        .route("/api/status", get(api_status))
        .route("/api/messages", get(api_messages))
        .route("/api/chat", post(api_chat))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(app)
}

/// Serves `app` on an already bound listener until the server stops.
pub async fn serve_on(listener: TcpListener, app: SharedApp) -> anyhow::Result<()> {
    axum::serve(listener, router(app))
        .await
        .context("server shutdown")?;
    Ok(())
}

/// Binds `addr` and serves `app`.
pub async fn serve(addr: SocketAddr, app: SharedApp) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "ragbot listening on http://{addr}");
    serve_on(listener, app).await
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn index(State(app): State<SharedApp>) -> Html<String> {
    let mut guard = app.lock().await;
    let status = guard.status();
    let notices = guard.take_notices();
    Html(render_page(&status, guard.messages(), &notices))
}

async fn upload_documents(
    State(app): State<SharedApp>,
    mut multipart: Multipart,
) -> Result<Redirect, ApiError> {
    let mut files = Vec::new();
    let mut rejected = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| bad_request(format!("invalid upload: {err}")))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|err| bad_request(format!("failed to read {name}: {err}")))?;
        if name.is_empty() && bytes.is_empty() {
            continue;
        }
        if is_pdf(&name, content_type.as_deref()) {
            files.push(UploadedFile::new(name, bytes.to_vec()));
        } else {
            warn!(file = %name, "ignoring non-PDF upload");
            rejected.push(name);
        }
    }

    with_app(app, move |app| {
        if !rejected.is_empty() {
            app.notify(
                NoticeLevel::Warning,
                format!("Skipped non-PDF files: {}", rejected.join(", ")),
            );
        }
        app.process_documents(&files);
    })
    .await?;
    Ok(Redirect::to("/"))
}

async fn chat_form(
    State(app): State<SharedApp>,
    Form(form): Form<ChatForm>,
) -> Result<Redirect, ApiError> {
    let question = form.message.trim().to_string();
    if !question.is_empty() {
        with_app(app, move |app| {
            app.ask(&question);
        })
        .await?;
    }
    Ok(Redirect::to("/"))
}

async fn clear_chat(State(app): State<SharedApp>) -> Redirect {
    app.lock().await.clear_chat();
    Redirect::to("/")
}

async fn api_status(State(app): State<SharedApp>) -> Json<SystemStatus> {
    Json(app.lock().await.status())
}

async fn api_messages(State(app): State<SharedApp>) -> Json<Vec<ChatMessage>> {
    Json(app.lock().await.messages().to_vec())
}

async fn api_chat(
    State(app): State<SharedApp>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let question = request.message.trim().to_string();
    if question.is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let reply = with_app(app, move |app| {
        let messages = app.ask(&question).to_vec();
        let answer = messages
            .last()
            .map(|message| message.content.clone())
            .unwrap_or_default();
        ChatReply { answer, messages }
    })
    .await?;
    Ok(Json(reply))
}

/// Runs `f` on the blocking pool with the app locked.
async fn with_app<T, F>(app: SharedApp, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut RagApp) -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = app.blocking_lock();
        f(&mut guard)
    })
    .await
    .map_err(|err| internal_error(anyhow!("request task failed: {err}")))
}

fn is_pdf(name: &str, content_type: Option<&str>) -> bool {
    name.to_ascii_lowercase().ends_with(".pdf")
        || content_type.is_some_and(|ct| ct.eq_ignore_ascii_case("application/pdf"))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

fn internal_error(err: anyhow::Error) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            message: err.to_string(),
        }),
    )
}
