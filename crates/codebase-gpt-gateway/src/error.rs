use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use codebase_gpt_core::{ErrorKind, SessionError};
use serde::Serialize;
use thiserror::Error;

use crate::handlers::SessionView;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to bind {0}: {1}")]
    Bind(String, std::io::Error),
    #[error("server error: {0}")]
    Server(String),
}

/// Error response: `{error: {kind, message}, status?, session?}`.
#[derive(Debug)]
pub(crate) struct ApiError {
    code: StatusCode,
    kind: ErrorKind,
    message: String,
    status: Option<Vec<String>>,
    session: Option<SessionView>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<&'a SessionView>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    kind: ErrorKind,
    message: &'a str,
}

impl ApiError {
    pub(crate) fn session_not_found() -> Self {
        Self {
            code: StatusCode::NOT_FOUND,
            kind: ErrorKind::InputError,
            message: "session not found".into(),
            status: None,
            session: None,
        }
    }

    pub(crate) fn with_session(mut self, session: SessionView) -> Self {
        self.session = Some(session);
        self
    }

    pub(crate) fn with_status(mut self, status: Vec<String>) -> Self {
        self.status = Some(status);
        self
    }

    /// Analysis failures are worded as a processing error for display.
    pub(crate) fn analysis(err: &SessionError) -> Self {
        let mut api = Self::from(err);
        if matches!(err, SessionError::Index(_)) {
            api.message = format!("Error processing repository: {err}");
        }
        api
    }
}

fn status_code(err: &SessionError) -> StatusCode {
    match (err, err.kind()) {
        (SessionError::InvalidState(_), _) => StatusCode::CONFLICT,
        (_, ErrorKind::InputError) => StatusCode::BAD_REQUEST,
        (_, ErrorKind::CloneError) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl From<&SessionError> for ApiError {
    fn from(err: &SessionError) -> Self {
        Self {
            code: status_code(err),
            kind: err.kind(),
            message: err.to_string(),
            status: None,
            session: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind,
                message: &self.message,
            },
            status: self.status.as_deref(),
            session: self.session.as_ref(),
        };
        (self.code, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use codebase_gpt_index::{CloneError, IndexError};

    use super::*;

    #[test]
    fn status_codes_by_kind() {
        assert_eq!(
            status_code(&SessionError::Input("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_code(&SessionError::InvalidState("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_code(&SessionError::Index(IndexError::Clone(CloneError::Timeout(1)))),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_code(&SessionError::Index(IndexError::Config("bad".into()))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_code(&SessionError::Index(IndexError::EmbeddingCountMismatch {
                expected: 1,
                got: 0
            })),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn analysis_message_is_prefixed() {
        let err = SessionError::Index(IndexError::Clone(CloneError::Timeout(9)));
        let api = ApiError::analysis(&err);
        assert_eq!(
            api.message,
            "Error processing repository: git clone timed out after 9s"
        );

        let state = SessionError::InvalidState("repository already analyzed".into());
        assert_eq!(ApiError::analysis(&state).message, "repository already analyzed");
    }
}
