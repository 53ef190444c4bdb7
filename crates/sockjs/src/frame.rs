//! Wire frames and their per-transport envelopes.
//!
//! The four frame kinds (`o`, `h`, `a[...]`, `c[code,"reason"]`) are a
//! compatibility contract with existing SockJS clients and must stay
//! byte-for-byte stable.

use serde::Serialize;

use crate::error::{FrameError, TransportError};

/// Code/reason pair carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseFrame {
    pub code: u32,
    pub reason: String,
}

impl CloseFrame {
    pub fn new(code: u32, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Server-initiated close used when a session expires.
    pub fn go_away() -> Self {
        Self::new(3000, "Go away!")
    }

    /// Sent to a receiver that tries to attach while another one is attached.
    pub fn another_connection() -> Self {
        Self::new(2010, "Another connection still open")
    }

    /// Recorded when the client side of an attachment vanished.
    pub fn interrupted() -> Self {
        Self::new(1002, "Connection interrupted")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Open,
    Heartbeat,
    Messages(Vec<String>),
    Close(CloseFrame),
}

impl Frame {
    pub fn encode(&self) -> String {
        match self {
            Frame::Open => "o".to_string(),
            Frame::Heartbeat => "h".to_string(),
            Frame::Messages(messages) => format!("a{}", json_array(messages)),
            Frame::Close(close) => format!(
                "c[{},{}]",
                close.code,
                json_string(&close.reason)
            ),
        }
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Frame::Close(_))
    }
}

fn json_string(value: &str) -> String {
    // Serializing a &str into JSON cannot fail.
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn json_array(values: &[String]) -> String {
    let encoded: Vec<String> = values.iter().map(|v| json_string(v)).collect();
    format!("[{}]", encoded.join(","))
}

/// Decode a client payload posted to one of the `*_send` endpoints.
pub fn decode_messages(payload: &[u8]) -> Result<Vec<String>, FrameError> {
    if payload.is_empty() {
        return Err(FrameError::PayloadExpected);
    }
    serde_json::from_slice::<Vec<String>>(payload).map_err(FrameError::BrokenJson)
}

/// Decode a text frame received over a websocket.
///
/// Clients send a JSON array of strings, but a bare JSON string is accepted
/// too. Empty frames carry nothing.
pub fn decode_socket_message(text: &str) -> Result<Vec<String>, FrameError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<serde_json::Value>(text).map_err(FrameError::BrokenJson)? {
        serde_json::Value::String(message) => Ok(vec![message]),
        value => serde_json::from_value::<Vec<String>>(value).map_err(FrameError::BrokenJson),
    }
}

/// How an encoded frame is wrapped on a particular transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framing {
    /// Websocket text frames carry the bare frame.
    Bare,
    /// xhr and xhr_streaming: newline-terminated.
    Line,
    /// Server-sent events.
    EventSource,
    /// `callback("<frame>");\r\n`
    Jsonp { callback: String },
    /// Script tags pushed into a forever-iframe.
    HtmlFile,
}

impl Framing {
    pub fn wrap(&self, frame: &Frame) -> String {
        let encoded = frame.encode();
        match self {
            Framing::Bare => encoded,
            Framing::Line => format!("{encoded}\n"),
            Framing::EventSource => format!("data: {encoded}\r\n\r\n"),
            Framing::Jsonp { callback } => {
                format!("{callback}({});\r\n", json_string(&encoded))
            }
            Framing::HtmlFile => {
                format!("<script>\np({});\n</script>\r\n", json_string(&encoded))
            }
        }
    }
}

/// Check the `c` query parameter of callback-based transports.
///
/// Only `[A-Za-z0-9_.]` is accepted so the name can never break out of the
/// script context it is echoed into.
pub fn validate_callback(callback: Option<&str>) -> Result<&str, TransportError> {
    let callback = match callback {
        Some(c) if !c.is_empty() => c,
        _ => return Err(TransportError::CallbackRequired),
    };
    let safe = callback
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if safe {
        Ok(callback)
    } else {
        Err(TransportError::InvalidCallback)
    }
}
