use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

use super::{attach, SessionPath};
use crate::error::TransportError;
use crate::frame::{decode_socket_message, CloseFrame, Frame, Framing};
use crate::handler::Handler;
use crate::session::Attachment;

/// WebSocket upgrade handler.
///
/// Malformed upgrade requests get `400`; a missing or foreign `Origin` gets
/// `403`. Neither creates or touches a session.
pub async fn websocket(
    State(handler): State<Handler>,
    Path(path): Path<SessionPath>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, TransportError> {
    let id = path.validate()?.to_string();
    let upgrade = upgrade.map_err(|rejection| {
        warn!(session = %id, %rejection, "rejected websocket upgrade");
        TransportError::BadUpgrade
    })?;
    if handler.options().check_origin && !same_origin(&headers) {
        warn!(
            session = %id,
            origin = ?headers.get(header::ORIGIN),
            "websocket origin rejected"
        );
        return Err(TransportError::OriginForbidden);
    }
    Ok(upgrade.on_upgrade(move |socket| handle_socket(socket, handler, id)))
}

/// `Origin` must name the same authority the request was sent to.
fn same_origin(headers: &HeaderMap) -> bool {
    let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Some(host) = headers.get(header::HOST).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Ok(origin) = url::Url::parse(origin) else {
        return false;
    };
    let Some(origin_host) = origin.host_str() else {
        return false;
    };
    if origin.port().is_none() && origin_host.eq_ignore_ascii_case(host) {
        return true;
    }
    match origin.port_or_known_default() {
        Some(port) => format!("{origin_host}:{port}").eq_ignore_ascii_case(host),
        None => false,
    }
}

async fn handle_socket(socket: WebSocket, handler: Handler, session_id: String) {
    let (mut sender, mut receiver) = socket.split();

    let mut attachment = match attach(&handler, &session_id) {
        Ok(attachment) => attachment,
        Err(err) => {
            debug!(session = %session_id, %err, "websocket attach rejected");
            let close = Framing::Bare.wrap(&Frame::Close(CloseFrame::another_connection()));
            let _ = sender.send(Message::Text(close)).await;
            return;
        }
    };
    debug!(session = %session_id, "websocket attached");

    // Only outbound writes push the heartbeat back; a chatty client still
    // gets `h` if the application stays quiet.
    let interval = attachment.session().heartbeat_interval();
    let heartbeat = tokio::time::sleep(interval);
    tokio::pin!(heartbeat);

    loop {
        let frame = tokio::select! {
            frame = attachment.next_frame(false) => frame,
            () = &mut heartbeat => Frame::Heartbeat,
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => relay_inbound(&attachment, &session_id, &text),
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(session = %session_id, "websocket closed by client");
                        break;
                    }
                    Some(Err(err)) => {
                        debug!(session = %session_id, %err, "websocket read failed");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
                continue;
            }
        };

        let closing = frame.is_close();
        if let Err(err) = sender.send(Message::Text(Framing::Bare.wrap(&frame))).await {
            debug!(session = %session_id, %err, "websocket write failed");
            break;
        }
        heartbeat
            .as_mut()
            .reset(tokio::time::Instant::now() + interval);
        if closing {
            attachment.close_flushed();
            attachment.finish();
            // Dropping both halves without a closing handshake terminates
            // the connection right after the close frame.
            debug!(session = %session_id, "websocket closed by server");
            return;
        }
    }

    // Still attached here means the client went away.
    drop(attachment);
}

fn relay_inbound(attachment: &Attachment, session_id: &str, text: &str) {
    match decode_socket_message(text) {
        Ok(messages) if messages.is_empty() => {}
        Ok(messages) => {
            if attachment.session().push_inbound(messages).is_err() {
                debug!(session = %session_id, "dropping messages for closing session");
            }
        }
        Err(err) => {
            warn!(session = %session_id, %err, "malformed websocket frame");
        }
    }
}
