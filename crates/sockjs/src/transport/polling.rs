//! Long-polling receivers: `xhr` and the callback-wrapped `jsonp`.
//!
//! One request carries exactly one frame. A fresh session answers with the
//! open frame right away; otherwise the request waits for queued messages
//! (batched), the close frame, or a heartbeat once the interval elapses.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::{attach, CallbackQuery, SessionPath, TransportKind};
use crate::error::TransportError;
use crate::frame::{validate_callback, CloseFrame, Frame, Framing};
use crate::handler::Handler;

pub async fn xhr(
    State(handler): State<Handler>,
    Path(path): Path<SessionPath>,
) -> Result<Response, TransportError> {
    let id = path.validate()?;
    let kind = TransportKind::Xhr;
    let body = poll(&handler, id, &kind.framing(None)).await;
    Ok(respond(kind, body))
}

pub async fn jsonp(
    State(handler): State<Handler>,
    Path(path): Path<SessionPath>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, TransportError> {
    let callback = validate_callback(query.c.as_deref())?;
    let id = path.validate()?;
    let kind = TransportKind::Jsonp;
    let body = poll(&handler, id, &kind.framing(Some(callback))).await;
    Ok(respond(kind, body))
}

async fn poll(handler: &Handler, id: &str, framing: &Framing) -> String {
    let mut attachment = match attach(handler, id) {
        Ok(attachment) => attachment,
        Err(err) => {
            debug!(session = %id, %err, "poll rejected");
            return framing.wrap(&Frame::Close(CloseFrame::another_connection()));
        }
    };
    let frame = attachment.next_frame_or_heartbeat(true).await;
    if frame.is_close() {
        attachment.close_flushed();
    }
    attachment.finish();
    framing.wrap(&frame)
}

fn respond(kind: TransportKind, body: String) -> Response {
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
