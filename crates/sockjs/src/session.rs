//! Per-session state machine shared by every transport.
//!
//! A [`Session`] owns the inbound and outbound queues of one logical
//! connection. Transports come and go through [`Attachment`]s; at most one is
//! attached at any time and the queues outlive all of them.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::error::{AttachError, SessionError};
use crate::frame::{CloseFrame, Frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl SessionState {
    fn is_closing(self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Closed)
    }
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    inbound: VecDeque<String>,
    outbound: VecDeque<String>,
    close: Option<CloseFrame>,
    attached: Option<u64>,
    next_token: u64,
    // Bumped on every detach so stale disconnect timers can tell they lost.
    detach_generation: u64,
}

#[derive(Debug)]
pub struct Session {
    id: String,
    heartbeat_interval: Duration,
    disconnect_timeout: Duration,
    inner: Mutex<Inner>,
    inbound_ready: Notify,
    outbound_ready: Notify,
    closed: Notify,
}

/// Shortest heartbeat interval a session accepts.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10);

impl Session {
    /// Sessions are created through [`crate::SessionRegistry::resolve`],
    /// which also arms the disconnect timer that ends a session nobody
    /// attaches to.
    pub(crate) fn new(
        id: impl Into<String>,
        heartbeat_interval: Duration,
        disconnect_timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            heartbeat_interval: heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL),
            disconnect_timeout,
            inner: Mutex::new(Inner {
                state: SessionState::Connecting,
                inbound: VecDeque::new(),
                outbound: VecDeque::new(),
                close: None,
                attached: None,
                next_token: 0,
                detach_generation: 0,
            }),
            inbound_ready: Notify::new(),
            outbound_ready: Notify::new(),
            closed: Notify::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn disconnect_timeout(&self) -> Duration {
        self.disconnect_timeout
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_attached(&self) -> bool {
        self.inner.lock().attached.is_some()
    }

    /// The close frame recorded by the first close, if any.
    pub fn close_frame(&self) -> Option<CloseFrame> {
        self.inner.lock().close.clone()
    }

    /// Queue a message for the client.
    pub fn send(&self, message: impl Into<String>) -> Result<(), SessionError> {
        {
            let mut inner = self.inner.lock();
            if inner.state.is_closing() {
                return Err(SessionError::NotOpen);
            }
            inner.outbound.push_back(message.into());
        }
        self.outbound_ready.notify_waiters();
        Ok(())
    }

    /// Wait for the next message from the client.
    ///
    /// Fails with [`SessionError::NotOpen`] once the session is closing, and
    /// wakes up with that error if the session closes while waiting. A
    /// session that never gets a transport is closed by its disconnect timer,
    /// so this does not wait forever.
    pub async fn recv(&self) -> Result<String, SessionError> {
        loop {
            let notified = self.inbound_ready.notified();
            {
                let mut inner = self.inner.lock();
                if inner.state.is_closing() {
                    return Err(SessionError::NotOpen);
                }
                if let Some(message) = inner.inbound.pop_front() {
                    return Ok(message);
                }
            }
            notified.await;
        }
    }

    /// Hand decoded client messages to the application.
    pub fn push_inbound(&self, messages: Vec<String>) -> Result<(), SessionError> {
        {
            let mut inner = self.inner.lock();
            if inner.state.is_closing() {
                return Err(SessionError::NotOpen);
            }
            inner.inbound.extend(messages);
        }
        self.inbound_ready.notify_waiters();
        Ok(())
    }

    /// Close the session. Only the first call records its code and reason;
    /// later calls do nothing.
    pub fn close(&self, code: u32, reason: impl Into<String>) {
        self.close_with(CloseFrame::new(code, reason));
    }

    fn close_with(&self, frame: CloseFrame) {
        let state = {
            let mut inner = self.inner.lock();
            if inner.state.is_closing() {
                return;
            }
            // Queued messages still go out ahead of the close frame, through
            // whichever transport attaches next.
            inner.state = if inner.attached.is_some() || !inner.outbound.is_empty() {
                SessionState::Closing
            } else {
                SessionState::Closed
            };
            info!(session = %self.id, code = frame.code, reason = %frame.reason, "session closing");
            inner.close = Some(frame);
            inner.state
        };
        self.wake(state);
    }

    /// The client side of the current attachment went away.
    pub fn interrupt(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Closed {
                return;
            }
            if inner.close.is_none() {
                inner.close = Some(CloseFrame::interrupted());
            }
            inner.state = SessionState::Closed;
        }
        debug!(session = %self.id, "session interrupted");
        self.wake(SessionState::Closed);
    }

    fn wake(&self, state: SessionState) {
        self.inbound_ready.notify_waiters();
        self.outbound_ready.notify_waiters();
        if state == SessionState::Closed {
            self.closed.notify_waiters();
        }
    }

    /// Resolves once the session reached [`SessionState::Closed`].
    pub async fn closed(&self) {
        loop {
            let notified = self.closed.notified();
            if self.state() == SessionState::Closed {
                return;
            }
            notified.await;
        }
    }

    /// Attach a transport. Fails while another transport is attached.
    pub fn attach(self: &Arc<Self>) -> Result<Attachment, AttachError> {
        let mut inner = self.inner.lock();
        if inner.attached.is_some() {
            return Err(AttachError::AlreadyAttached);
        }
        let token = inner.next_token;
        inner.next_token += 1;
        inner.attached = Some(token);
        let pending_open = inner.state == SessionState::Connecting;
        if pending_open {
            inner.state = SessionState::Open;
        }
        debug!(session = %self.id, token, "transport attached");
        Ok(Attachment {
            session: Arc::clone(self),
            token,
            pending_open,
            finished: false,
        })
    }

    fn detach(self: &Arc<Self>, token: u64, clean: bool) {
        let generation = {
            let mut inner = self.inner.lock();
            if inner.attached != Some(token) {
                return;
            }
            inner.attached = None;
            inner.detach_generation += 1;
            inner.detach_generation
        };
        debug!(session = %self.id, token, clean, "transport detached");
        if clean {
            self.arm_disconnect_timer(generation);
        } else {
            self.interrupt();
        }
    }

    /// Close the session if nothing attaches within the disconnect timeout.
    pub(crate) fn arm_disconnect_timer(self: &Arc<Self>, generation: u64) {
        if self.state() == SessionState::Closed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(session = %self.id, "no runtime; disconnect timer not armed");
            return;
        };
        let session = Arc::clone(self);
        runtime.spawn(async move {
            tokio::time::sleep(session.disconnect_timeout).await;
            session.expire(generation);
        });
    }

    fn expire(&self, generation: u64) {
        let expired = {
            let mut inner = self.inner.lock();
            if inner.attached.is_some()
                || inner.detach_generation != generation
                || inner.state == SessionState::Closed
            {
                false
            } else {
                if inner.close.is_none() {
                    inner.close = Some(CloseFrame::go_away());
                }
                inner.state = SessionState::Closed;
                true
            }
        };
        if expired {
            info!(session = %self.id, "session expired");
            self.wake(SessionState::Closed);
        }
    }

    fn flushed_close(&self) {
        let closed = {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Closing {
                inner.state = SessionState::Closed;
                true
            } else {
                false
            }
        };
        if closed {
            self.wake(SessionState::Closed);
        }
    }
}

/// One transport's claim on a session.
///
/// Dropping it detaches. A detach without [`Attachment::finish`] means the
/// client vanished mid-response and closes the session.
#[derive(Debug)]
pub struct Attachment {
    session: Arc<Session>,
    token: u64,
    pending_open: bool,
    finished: bool,
}

impl Attachment {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Next frame for the client: the open frame first, then queued
    /// messages, then the close frame once the queue has drained.
    ///
    /// With `batch` all queued messages go out in one frame. Cancel-safe.
    pub async fn next_frame(&mut self, batch: bool) -> Frame {
        if self.pending_open {
            self.pending_open = false;
            return Frame::Open;
        }
        loop {
            let notified = self.session.outbound_ready.notified();
            {
                let mut inner = self.session.inner.lock();
                if inner.state != SessionState::Closed && !inner.outbound.is_empty() {
                    let messages: Vec<String> = if batch {
                        inner.outbound.drain(..).collect()
                    } else {
                        inner.outbound.pop_front().into_iter().collect()
                    };
                    return Frame::Messages(messages);
                }
                if inner.state.is_closing() {
                    let close = inner.close.clone().unwrap_or_else(CloseFrame::go_away);
                    return Frame::Close(close);
                }
            }
            notified.await;
        }
    }

    /// Like [`Attachment::next_frame`], but yields a heartbeat when nothing
    /// arrives within the session's heartbeat interval.
    pub async fn next_frame_or_heartbeat(&mut self, batch: bool) -> Frame {
        let interval = self.session.heartbeat_interval;
        match tokio::time::timeout(interval, self.next_frame(batch)).await {
            Ok(frame) => frame,
            Err(_) => Frame::Heartbeat,
        }
    }

    /// Whether this attachment moved the session out of `Connecting`.
    pub(crate) fn opens_session(&self) -> bool {
        self.pending_open
    }

    /// Record that a close frame reached the client.
    pub fn close_flushed(&self) {
        self.session.flushed_close();
    }

    /// Detach cleanly; the session waits for the next transport.
    pub fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.session.detach(self.token, self.finished);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Arc<Session> {
        Arc::new(Session::new(
            "s1",
            Duration::from_millis(50),
            Duration::from_millis(100),
        ))
    }

    #[test_timeout::tokio_timeout_test(5)]
    async fn open_frame_once_per_session() {
        let session = session();
        let mut first = session.attach().unwrap();
        assert_eq!(first.next_frame(true).await, Frame::Open);
        assert_eq!(session.state(), SessionState::Open);
        first.finish();

        session.send("hello").unwrap();
        let mut second = session.attach().unwrap();
        assert_eq!(
            second.next_frame(true).await,
            Frame::Messages(vec!["hello".into()])
        );
    }

    #[test_timeout::tokio_timeout_test(5)]
    async fn messages_keep_enqueue_order() {
        let session = session();
        let mut attachment = session.attach().unwrap();
        attachment.next_frame(false).await;
        session.send("message 1").unwrap();
        session.send("message 2").unwrap();
        assert_eq!(
            attachment.next_frame(false).await,
            Frame::Messages(vec!["message 1".into()])
        );
        assert_eq!(
            attachment.next_frame(false).await,
            Frame::Messages(vec!["message 2".into()])
        );

        session.send("message 3").unwrap();
        session.send("message 4").unwrap();
        assert_eq!(
            attachment.next_frame(true).await,
            Frame::Messages(vec!["message 3".into(), "message 4".into()])
        );
    }

    #[test_timeout::tokio_timeout_test(5)]
    async fn only_first_close_is_honored() {
        let session = session();
        let mut attachment = session.attach().unwrap();
        attachment.next_frame(true).await;
        session.send("last").unwrap();
        session.close(1024, "some close message");
        session.close(0, "this should be ignored");
        assert_eq!(session.state(), SessionState::Closing);
        assert!(session.send("too late").is_err());

        assert_eq!(
            attachment.next_frame(true).await,
            Frame::Messages(vec!["last".into()])
        );
        assert_eq!(
            attachment.next_frame(true).await,
            Frame::Close(CloseFrame::new(1024, "some close message"))
        );
        attachment.close_flushed();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test_timeout::tokio_timeout_test(5)]
    async fn close_between_polls_keeps_queued_messages() {
        let session = session();
        let mut poll = session.attach().unwrap();
        assert_eq!(poll.next_frame(true).await, Frame::Open);
        poll.finish();

        session.send("bye").unwrap();
        session.close(1024, "done");
        assert_eq!(session.state(), SessionState::Closing);

        let mut poll = session.attach().unwrap();
        assert_eq!(
            poll.next_frame(true).await,
            Frame::Messages(vec!["bye".into()])
        );
        poll.finish();
        let mut poll = session.attach().unwrap();
        let frame = poll.next_frame(true).await;
        assert_eq!(frame, Frame::Close(CloseFrame::new(1024, "done")));
        poll.close_flushed();
        poll.finish();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test_timeout::tokio_timeout_test(5)]
    async fn closing_session_without_poll_expires() {
        let session = session();
        session.attach().unwrap().finish();
        session.send("never read").unwrap();
        session.close(1024, "done");
        session.closed().await;
        assert_eq!(session.close_frame(), Some(CloseFrame::new(1024, "done")));
    }

    #[test_timeout::timeout]
    fn heartbeat_interval_has_a_floor() {
        let session = Session::new("hb", Duration::ZERO, Duration::from_secs(1));
        assert_eq!(session.heartbeat_interval(), MIN_HEARTBEAT_INTERVAL);
    }

    #[test_timeout::tokio_timeout_test(5)]
    async fn close_without_transport_is_immediate() {
        let session = session();
        session.close(3000, "bye");
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.close_frame(), Some(CloseFrame::new(3000, "bye")));
    }

    #[test_timeout::tokio_timeout_test(5)]
    async fn second_attach_is_rejected() {
        let session = session();
        let _first = session.attach().unwrap();
        assert_eq!(
            session.attach().unwrap_err(),
            AttachError::AlreadyAttached
        );
    }

    #[test_timeout::tokio_timeout_test(5)]
    async fn recv_wakes_with_error_on_close() {
        let session = session();
        let _attachment = session.attach().unwrap();
        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.recv().await })
        };
        tokio::task::yield_now().await;
        session.push_inbound(vec!["ping".into()]).unwrap();
        assert_eq!(waiter.await.unwrap(), Ok("ping".to_string()));

        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.recv().await })
        };
        tokio::task::yield_now().await;
        session.close(1000, "done");
        assert_eq!(waiter.await.unwrap(), Err(SessionError::NotOpen));
    }

    #[test_timeout::tokio_timeout_test(5)]
    async fn dropped_attachment_interrupts() {
        let session = session();
        let attachment = session.attach().unwrap();
        drop(attachment);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.close_frame(), Some(CloseFrame::interrupted()));
        assert_eq!(session.recv().await, Err(SessionError::NotOpen));
    }

    #[test_timeout::tokio_timeout_test(5)]
    async fn heartbeat_when_idle() {
        let session = session();
        let mut attachment = session.attach().unwrap();
        assert_eq!(attachment.next_frame_or_heartbeat(true).await, Frame::Open);
        assert_eq!(
            attachment.next_frame_or_heartbeat(true).await,
            Frame::Heartbeat
        );
    }

    #[test_timeout::tokio_timeout_test(5)]
    async fn expires_without_transport() {
        let session = session();
        let attachment = session.attach().unwrap();
        attachment.finish();
        assert_eq!(session.state(), SessionState::Open);
        session.closed().await;
        assert_eq!(session.close_frame(), Some(CloseFrame::go_away()));
    }

    #[test_timeout::tokio_timeout_test(5)]
    async fn reattach_cancels_expiry() {
        let session = session();
        session.attach().unwrap().finish();
        let _again = session.attach().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(session.state(), SessionState::Open);
    }
}
