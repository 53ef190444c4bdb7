//! Client-to-server endpoints paired with the polling and streaming
//! receivers: `xhr_send` and `jsonp_send`.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::SessionPath;
use crate::error::TransportError;
use crate::frame::decode_messages;
use crate::handler::Handler;

const PLAIN_TEXT: &str = "text/plain; charset=UTF-8";

pub async fn xhr_send(
    State(handler): State<Handler>,
    Path(path): Path<SessionPath>,
    body: Bytes,
) -> Result<Response, TransportError> {
    let id = path.validate()?;
    deliver(&handler, id, &body)?;
    Ok((StatusCode::NO_CONTENT, [(header::CONTENT_TYPE, PLAIN_TEXT)]).into_response())
}

pub async fn jsonp_send(
    State(handler): State<Handler>,
    Path(path): Path<SessionPath>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, TransportError> {
    let id = path.validate()?;
    let payload = if is_form(&headers) {
        form_payload(&body).ok_or(TransportError::PayloadExpected)?
    } else {
        body.to_vec()
    };
    deliver(&handler, id, &payload)?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, PLAIN_TEXT)], "ok").into_response())
}

// Payload problems are reported before the session lookup so a malformed
// request never reveals whether a session id exists.
fn deliver(handler: &Handler, id: &str, payload: &[u8]) -> Result<(), TransportError> {
    let messages = decode_messages(payload).map_err(|err| {
        warn!(session = %id, %err, "rejected client payload");
        TransportError::from(err)
    })?;
    let session = handler
        .registry()
        .lookup(id)
        .ok_or(TransportError::SessionNotFound)?;
    debug!(session = %id, count = messages.len(), "client messages received");
    session
        .push_inbound(messages)
        .map_err(|_| TransportError::SessionNotFound)
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

/// JSONP clients post `d=<payload>` from a hidden form.
fn form_payload(body: &[u8]) -> Option<Vec<u8>> {
    url::form_urlencoded::parse(body)
        .find(|(key, _)| key == "d")
        .map(|(_, value)| value.into_owned().into_bytes())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn form_payload_extracts_d() {
        assert_eq!(
            form_payload(b"d=%5B%22x%22%5D").as_deref(),
            Some(br#"["x"]"#.as_slice())
        );
        assert_eq!(form_payload(b"e=1"), None);
        assert_eq!(form_payload(b"d="), None);
    }

    #[test_timeout::timeout]
    fn detects_form_content_type() {
        let mut headers = HeaderMap::new();
        assert!(!is_form(&headers));
        headers.insert(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded; charset=UTF-8".parse().unwrap(),
        );
        assert!(is_form(&headers));
    }
}
