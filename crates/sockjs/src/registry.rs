use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use crate::session::Session;

/// Map of live sessions, shared by every transport adapter.
///
/// Create/lookup/remove are serialized per id by the underlying `DashMap`
/// shard locks, so two transports resolving the same unseen id concurrently
/// end up with the same session.
#[derive(Clone, Debug)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Arc<Session>>>,
    heartbeat_interval: Duration,
    disconnect_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(heartbeat_interval: Duration, disconnect_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            heartbeat_interval,
            disconnect_timeout,
        }
    }

    /// Fetch the session for `id`, creating it if needed.
    ///
    /// The flag is `true` when this call created the session.
    pub fn resolve(&self, id: &str) -> (Arc<Session>, bool) {
        let mut created = false;
        let session = {
            let entry = self.sessions.entry(id.to_string()).or_insert_with(|| {
                created = true;
                Arc::new(Session::new(
                    id,
                    self.heartbeat_interval,
                    self.disconnect_timeout,
                ))
            });
            Arc::clone(entry.value())
        };
        if created {
            debug!(session = %id, "session created");
            session.arm_disconnect_timer(0);
            self.spawn_reaper(&session);
        }
        (session, created)
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    // Closed sessions linger for one more disconnect timeout so late polls
    // still get the close frame.
    fn spawn_reaper(&self, session: &Arc<Session>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let sessions = Arc::clone(&self.sessions);
        let session = Arc::clone(session);
        runtime.spawn(async move {
            session.closed().await;
            tokio::time::sleep(session.disconnect_timeout()).await;
            let removed = sessions
                .remove_if(session.id(), |_, current| Arc::ptr_eq(current, &session))
                .is_some();
            if removed {
                debug!(session = %session.id(), "session removed");
            }
        });
    }
}
