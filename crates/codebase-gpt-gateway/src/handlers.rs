use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use codebase_gpt_core::{ChatMessage, Phase, Session};
use codebase_gpt_index::indexer::IndexReport;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::error::ApiError;
use super::server::AppState;
use super::sessions::SharedSession;

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SessionView {
    pub session_id: Uuid,
    pub phase: Phase,
    pub repo_url: Option<String>,
    pub repo_processed: bool,
    pub chat_history: Vec<ChatMessage>,
}

impl SessionView {
    fn of(session_id: Uuid, session: &Session) -> Self {
        Self {
            session_id,
            phase: session.phase(),
            repo_url: session.repo_url().map(str::to_owned),
            repo_processed: session.repo_processed(),
            chat_history: session.chat_history().to_vec(),
        }
    }

    /// Placeholder for a session whose lock is held by a running action.
    fn busy(session_id: Uuid) -> Self {
        Self {
            session_id,
            phase: Phase::Processing,
            repo_url: None,
            repo_processed: false,
            chat_history: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepositoryRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AskRequest {
    pub question: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

#[derive(Serialize)]
pub(crate) struct AnalyzeResponse {
    status: Vec<String>,
    report: IndexReport,
    /// Documents stored for the repository across every analysis so far.
    documents_total: Option<u64>,
    session: SessionView,
}

#[derive(Serialize)]
pub(crate) struct AskResponse {
    answer: String,
    sources: Vec<String>,
    context_found: bool,
    session: SessionView,
}

async fn lookup(state: &AppState, id: Uuid) -> Result<SharedSession, ApiError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(ApiError::session_not_found)
}

pub(crate) async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

pub(crate) async fn create_session_handler(State(state): State<AppState>) -> Response {
    let (id, session) = state.sessions.create().await;
    tracing::debug!(session = %id, "session created");
    let view = SessionView::of(id, &*session.lock().await);
    (StatusCode::CREATED, Json(view)).into_response()
}

pub(crate) async fn get_session_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let session = lookup(&state, id).await?;
    let view = match session.try_lock() {
        Ok(guard) => SessionView::of(id, &guard),
        Err(_) => SessionView::busy(id),
    };
    Ok(Json(view))
}

pub(crate) async fn delete_session_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(id).await {
        tracing::debug!(session = %id, "session deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::session_not_found())
    }
}

pub(crate) async fn repository_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RepositoryRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let session = lookup(&state, id).await?;
    let mut guard = session.lock().await;
    match guard.enter_url(&req.url) {
        Ok(reset) => {
            if reset {
                tracing::info!(session = %id, repo = %req.url.trim(), "repository selected");
            }
            Ok(Json(SessionView::of(id, &guard)))
        }
        Err(e) => Err(ApiError::from(&e).with_session(SessionView::of(id, &guard))),
    }
}

pub(crate) async fn analyze_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let session = lookup(&state, id).await?;
    let mut guard = session.lock().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = state.controller.analyze(&mut guard, &tx).await;
    drop(tx);
    let mut status = Vec::new();
    while let Some(line) = rx.recv().await {
        status.push(line.to_string());
    }

    let view = SessionView::of(id, &guard);
    match result {
        Ok(report) => {
            let documents_total = match guard.repo_url() {
                Some(url) => state
                    .controller
                    .document_count(url)
                    .await
                    .inspect_err(|e| tracing::warn!(session = %id, "document count failed: {e}"))
                    .ok(),
                None => None,
            };
            Ok(Json(AnalyzeResponse {
                status,
                report,
                documents_total,
                session: view,
            }))
        }
        Err(e) => Err(ApiError::analysis(&e)
            .with_status(status)
            .with_session(view)),
    }
}

pub(crate) async fn ask_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let session = lookup(&state, id).await?;
    let mut guard = session.lock().await;

    match state.controller.ask(&mut guard, &req.question).await {
        Ok(answer) => Ok(Json(AskResponse {
            answer: answer.text,
            sources: answer.sources,
            context_found: answer.context_found,
            session: SessionView::of(id, &guard),
        })),
        Err(e) => Err(ApiError::from(&e).with_session(SessionView::of(id, &guard))),
    }
}

pub(crate) async fn clear_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let session = lookup(&state, id).await?;
    let mut guard = session.lock().await;
    state.controller.clear(&mut guard);
    Ok(Json(SessionView::of(id, &guard)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok",
            uptime_secs: 42,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
    }

    #[test]
    fn ask_request_deserializes() {
        let req: AskRequest = serde_json::from_str(r#"{"question":"what is this?"}"#).unwrap();
        assert_eq!(req.question, "what is this?");
    }

    #[test]
    fn busy_view_reports_processing() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(SessionView::busy(id)).unwrap();
        assert_eq!(json["phase"], "processing");
        assert_eq!(json["session_id"], id.to_string());
    }

    #[test]
    fn page_has_controls() {
        assert!(INDEX_HTML.contains("id=\"repo-url\""));
        assert!(INDEX_HTML.contains("id=\"analyze\""));
        assert!(INDEX_HTML.contains("id=\"question\""));
        assert!(INDEX_HTML.contains("id=\"clear\""));
    }
}
