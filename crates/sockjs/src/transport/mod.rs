//! Transport adapters.
//!
//! Every adapter resolves a session through the registry, attaches to it and
//! relays frames until its own notion of "done" (one frame for polling, a
//! byte budget for streaming, the socket's lifetime for websockets). The
//! session itself never knows which transport carries it.

pub mod polling;
pub mod send;
pub mod streaming;
pub mod websocket;

use serde::Deserialize;

use crate::error::{AttachError, TransportError};
use crate::frame::Framing;
use crate::handler::Handler;
use crate::session::Attachment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    WebSocket,
    Xhr,
    XhrStreaming,
    EventSource,
    HtmlFile,
    Jsonp,
}

impl TransportKind {
    pub fn name(self) -> &'static str {
        match self {
            TransportKind::WebSocket => "websocket",
            TransportKind::Xhr => "xhr",
            TransportKind::XhrStreaming => "xhr_streaming",
            TransportKind::EventSource => "eventsource",
            TransportKind::HtmlFile => "htmlfile",
            TransportKind::Jsonp => "jsonp",
        }
    }

    /// Streaming transports keep one response open across many frames.
    pub fn is_streaming(self) -> bool {
        matches!(
            self,
            TransportKind::XhrStreaming | TransportKind::EventSource | TransportKind::HtmlFile
        )
    }

    pub fn content_type(self) -> &'static str {
        match self {
            TransportKind::WebSocket => "text/plain; charset=UTF-8",
            TransportKind::Xhr | TransportKind::XhrStreaming | TransportKind::Jsonp => {
                "application/javascript; charset=UTF-8"
            }
            TransportKind::EventSource => "text/event-stream; charset=UTF-8",
            TransportKind::HtmlFile => "text/html; charset=UTF-8",
        }
    }

    pub fn framing(self, callback: Option<&str>) -> Framing {
        match self {
            TransportKind::WebSocket => Framing::Bare,
            TransportKind::Xhr | TransportKind::XhrStreaming => Framing::Line,
            TransportKind::EventSource => Framing::EventSource,
            TransportKind::HtmlFile => Framing::HtmlFile,
            TransportKind::Jsonp => Framing::Jsonp {
                callback: callback.unwrap_or_default().to_string(),
            },
        }
    }
}

/// `/{server}/{session}/...` path segments.
#[derive(Debug, Deserialize)]
pub struct SessionPath {
    pub server: String,
    pub session: String,
}

impl SessionPath {
    /// Ids must be non-empty and dot-free.
    pub fn validate(&self) -> Result<&str, TransportError> {
        let valid = |s: &str| !s.is_empty() && !s.contains('.');
        if valid(&self.server) && valid(&self.session) {
            Ok(&self.session)
        } else {
            Err(TransportError::SessionNotFound)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub c: Option<String>,
}

/// Resolve `id`, attach to it and start the application on a fresh session.
///
/// The application only starts after the first attach, so its first frame
/// can never overtake the open frame.
pub(crate) fn attach(handler: &Handler, id: &str) -> Result<Attachment, AttachError> {
    let (session, _) = handler.registry().resolve(id);
    let attachment = session.attach()?;
    // Whichever transport opens the session starts the application, even if
    // a concurrent request was the one that created it.
    if attachment.opens_session() {
        handler.start(&session);
    }
    Ok(attachment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn session_path_rejects_dots() {
        let path = SessionPath {
            server: "000".into(),
            session: "abc".into(),
        };
        assert_eq!(path.validate().unwrap(), "abc");

        let path = SessionPath {
            server: "000".into(),
            session: "a.b".into(),
        };
        assert!(matches!(
            path.validate(),
            Err(TransportError::SessionNotFound)
        ));
    }

    #[test_timeout::timeout]
    fn streaming_kinds() {
        assert!(TransportKind::XhrStreaming.is_streaming());
        assert!(TransportKind::EventSource.is_streaming());
        assert!(!TransportKind::Jsonp.is_streaming());
        assert!(!TransportKind::WebSocket.is_streaming());
        assert_eq!(
            TransportKind::Jsonp.framing(Some("cb")),
            Framing::Jsonp {
                callback: "cb".into()
            }
        );
    }
}
