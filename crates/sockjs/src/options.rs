use std::time::Duration;

/// Server-wide knobs applied to every session the handler creates.
#[derive(Debug, Clone)]
pub struct Options {
    /// Serve the websocket transport and advertise it in `/info`.
    pub websocket: bool,
    /// Longest silence on an attached transport before a heartbeat frame.
    /// Values below [`crate::session::MIN_HEARTBEAT_INTERVAL`] are raised to it.
    pub heartbeat_delay: Duration,
    /// How long a session survives without an attached transport.
    pub disconnect_delay: Duration,
    /// Bytes a streaming response may carry before it is recycled.
    pub response_limit: usize,
    /// Require the websocket `Origin` to match the `Host` header.
    pub check_origin: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            websocket: true,
            heartbeat_delay: Duration::from_secs(25),
            disconnect_delay: Duration::from_secs(5),
            response_limit: 128 * 1024,
            check_origin: true,
        }
    }
}
