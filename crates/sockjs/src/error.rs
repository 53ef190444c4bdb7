use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Malformed client payloads.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("payload expected")]
    PayloadExpected,
    #[error("broken JSON encoding: {0}")]
    BrokenJson(#[source] serde_json::Error),
}

/// Returned by [`crate::Conn`] operations against a session that is not open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session not open")]
    NotOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AttachError {
    #[error("another connection still open")]
    AlreadyAttached,
}

/// Request-level failures surfaced to the HTTP client.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Payload expected.")]
    PayloadExpected,
    #[error("Broken JSON encoding.")]
    BrokenJson,
    #[error("session not found")]
    SessionNotFound,
    #[error("\"callback\" parameter required")]
    CallbackRequired,
    #[error("invalid \"callback\" parameter")]
    InvalidCallback,
    #[error("bad websocket upgrade request")]
    BadUpgrade,
    #[error("origin not allowed")]
    OriginForbidden,
}

impl TransportError {
    pub fn status(&self) -> StatusCode {
        match self {
            TransportError::PayloadExpected
            | TransportError::BrokenJson
            | TransportError::InvalidCallback
            | TransportError::BadUpgrade => StatusCode::BAD_REQUEST,
            TransportError::SessionNotFound => StatusCode::NOT_FOUND,
            TransportError::CallbackRequired => StatusCode::INTERNAL_SERVER_ERROR,
            TransportError::OriginForbidden => StatusCode::FORBIDDEN,
        }
    }
}

impl From<FrameError> for TransportError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::PayloadExpected => TransportError::PayloadExpected,
            FrameError::BrokenJson(_) => TransportError::BrokenJson,
        }
    }
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
