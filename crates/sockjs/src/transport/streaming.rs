//! Streaming receivers: `xhr_streaming`, `eventsource` and `htmlfile`.
//!
//! The response stays open across many frames and is recycled once it has
//! carried `response_limit` bytes; the client then opens a new one against
//! the same session.

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use futures::stream::{self, Stream};
use tracing::debug;

use super::{attach, CallbackQuery, SessionPath, TransportKind};
use crate::error::TransportError;
use crate::frame::{validate_callback, CloseFrame, Frame, Framing};
use crate::handler::Handler;
use crate::session::Attachment;

pub async fn xhr_streaming(
    State(handler): State<Handler>,
    Path(path): Path<SessionPath>,
) -> Result<Response, TransportError> {
    let id = path.validate()?;
    Ok(open_stream(&handler, id, TransportKind::XhrStreaming, None))
}

pub async fn eventsource(
    State(handler): State<Handler>,
    Path(path): Path<SessionPath>,
) -> Result<Response, TransportError> {
    let id = path.validate()?;
    Ok(open_stream(&handler, id, TransportKind::EventSource, None))
}

pub async fn htmlfile(
    State(handler): State<Handler>,
    Path(path): Path<SessionPath>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, TransportError> {
    let callback = validate_callback(query.c.as_deref())?;
    let id = path.validate()?;
    Ok(open_stream(&handler, id, TransportKind::HtmlFile, Some(callback)))
}

/// Bytes sent ahead of the first frame so intermediaries start flushing.
fn prelude(kind: TransportKind, callback: Option<&str>) -> String {
    match kind {
        TransportKind::XhrStreaming => format!("{}\n", "h".repeat(2048)),
        TransportKind::EventSource => "\r\n".to_string(),
        TransportKind::HtmlFile => {
            let page = HTMLFILE_TEMPLATE.replace("{{callback}}", callback.unwrap_or_default());
            format!("{page:<1024}\r\n")
        }
        _ => String::new(),
    }
}

const HTMLFILE_TEMPLATE: &str = r#"<!doctype html>
<html><head>
  <meta http-equiv="X-UA-Compatible" content="IE=edge" />
  <meta http-equiv="Content-Type" content="text/html; charset=UTF-8" />
</head><body><h2>Don't panic!</h2>
  <script>
    document.domain = document.domain;
    var c = parent.{{callback}};
    c.start();
    function p(d) {c.message(d);};
    window.onload = function() {c.stop();};
  </script>"#;

fn open_stream(
    handler: &Handler,
    id: &str,
    kind: TransportKind,
    callback: Option<&str>,
) -> Response {
    let framing = kind.framing(callback);
    let prelude = prelude(kind, callback);
    let body = match attach(handler, id) {
        Ok(attachment) => Body::from_stream(frames(
            attachment,
            framing,
            prelude,
            handler.options().response_limit,
        )),
        Err(err) => {
            debug!(session = %id, %err, transport = kind.name(), "stream rejected");
            let close = framing.wrap(&Frame::Close(CloseFrame::another_connection()));
            Body::from(format!("{prelude}{close}"))
        }
    };
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, kind.content_type()),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate, max-age=0"),
        ],
        body,
    )
        .into_response()
}

struct StreamState {
    attachment: Option<Attachment>,
    framing: Framing,
    prelude: Option<String>,
    written: usize,
    limit: usize,
}

/// Chunks for one streaming response.
///
/// The attachment lives inside the stream: if the client goes away, hyper
/// drops the body, the attachment is dropped unfinished and the session is
/// interrupted.
fn frames(
    attachment: Attachment,
    framing: Framing,
    prelude: String,
    limit: usize,
) -> impl Stream<Item = Result<String, Infallible>> + Send + 'static {
    let state = StreamState {
        attachment: Some(attachment),
        framing,
        prelude: Some(prelude),
        written: 0,
        limit,
    };
    stream::unfold(state, |mut state| async move {
        if let Some(prelude) = state.prelude.take() {
            return Some((Ok(prelude), state));
        }
        let frame = state.attachment.as_mut()?.next_frame_or_heartbeat(true).await;
        let chunk = state.framing.wrap(&frame);
        state.written += chunk.len();
        if frame.is_close() {
            if let Some(attachment) = state.attachment.take() {
                attachment.close_flushed();
                attachment.finish();
            }
        } else if state.written >= state.limit {
            if let Some(attachment) = state.attachment.take() {
                debug!(session = %attachment.session().id(), "response limit reached");
                attachment.finish();
            }
        }
        Some((Ok(chunk), state))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn preludes() {
        let xhr = prelude(TransportKind::XhrStreaming, None);
        assert_eq!(xhr.len(), 2049);
        assert!(xhr.ends_with("h\n"));
        assert_eq!(prelude(TransportKind::EventSource, None), "\r\n");

        let html = prelude(TransportKind::HtmlFile, Some("cb"));
        assert!(html.contains("var c = parent.cb;"));
        assert!(html.len() >= 1026);
        assert!(html.ends_with("\r\n"));
    }
}
