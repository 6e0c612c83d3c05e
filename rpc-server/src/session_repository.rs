//! The session repository (§4.8): tracks every live [`ServerSession`] and
//! periodically evicts idle ones.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::session::ServerSession;
use crate::ServerError;

/// Concurrent-map-backed registry of live sessions, with a background idle
/// sweeper task.
pub struct SessionRepository {
    sessions: DashMap<Uuid, Arc<ServerSession>>,
    sweeping: AtomicBool,
}

impl Default for SessionRepository {
    fn default() -> Self {
        Self { sessions: DashMap::new(), sweeping: AtomicBool::new(false) }
    }
}

impl SessionRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, session: Arc<ServerSession>) {
        self.sessions.insert(session.session_id, session);
    }

    pub fn get(&self, session_id: Uuid) -> Result<Arc<ServerSession>, ServerError> {
        self.sessions.get(&session_id).map(|entry| entry.clone()).ok_or(ServerError::KeyNotFound(session_id))
    }

    /// Remove and drop `session_id`. A no-op if absent — both the inbound
    /// handler and the idle sweeper may race to remove the same session.
    pub fn remove(&self, session_id: Uuid) {
        if self.sessions.remove(&session_id).is_some() {
            info!(session_id = %session_id, "session closed");
        }
    }

    /// Non-blocking snapshot of live session ids.
    pub fn session_ids(&self) -> Vec<Uuid> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Start the idle sweeper on `self` (an `Arc<SessionRepository>`).
    /// `sweep_interval_sec == 0` disables sweeping entirely.
    pub fn spawn_idle_sweeper(self: &Arc<Self>, sweep_interval_sec: u64, max_inactivity_minutes: u64) {
        if sweep_interval_sec == 0 || self.sweeping.swap(true, Ordering::SeqCst) {
            return;
        }
        let repository = self.clone();
        tokio::spawn(async move { repository.sweep_loop(sweep_interval_sec, max_inactivity_minutes).await });
    }

    #[instrument(skip(self))]
    async fn sweep_loop(self: Arc<Self>, sweep_interval_sec: u64, max_inactivity_minutes: u64) {
        let max_inactivity_secs = (max_inactivity_minutes * 60) as i64;
        let mut ticker = tokio::time::interval(Duration::from_secs(sweep_interval_sec));
        loop {
            ticker.tick().await;
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            let stale: Vec<Uuid> = self
                .sessions
                .iter()
                .filter(|entry| now - entry.value().last_activity_unix() > max_inactivity_secs)
                .map(|entry| *entry.key())
                .collect();

            for session_id in stale {
                if self.sessions.remove(&session_id).is_some() {
                    info!(session_id = %session_id, "session evicted (idle)");
                }
            }
        }
    }

    /// Drain and drop every session, used when a [`crate::Server`] stops.
    pub fn dispose(&self) {
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_reflects_inserted_sessions() {
        let repository = SessionRepository::new();
        assert!(repository.is_empty());
        assert_eq!(repository.session_ids().len(), 0);
    }

    #[test]
    fn get_on_missing_session_is_key_not_found() {
        let repository = SessionRepository::new();
        let err = repository.get(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ServerError::KeyNotFound(_)));
    }

    #[test]
    fn remove_on_missing_session_is_a_no_op() {
        let repository = SessionRepository::new();
        repository.remove(Uuid::new_v4());
        assert!(repository.is_empty());
    }
}
