use std::sync::Arc;

use crate::error::SessionError;
use crate::session::{Session, SessionState};

/// Application-facing handle for one session.
///
/// Cheap to clone; every clone talks to the same session. The handle stays
/// valid after the session closes but every operation then reports
/// [`SessionError::NotOpen`] (except `close`, which stays a silent no-op).
#[derive(Debug, Clone)]
pub struct Conn {
    session: Arc<Session>,
}

impl Conn {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn id(&self) -> &str {
        self.session.id()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn send(&self, message: impl Into<String>) -> Result<(), SessionError> {
        self.session.send(message)
    }

    pub async fn recv(&self) -> Result<String, SessionError> {
        self.session.recv().await
    }

    pub fn close(&self, code: u32, reason: impl Into<String>) -> Result<(), SessionError> {
        self.session.close(code, reason);
        Ok(())
    }
}
