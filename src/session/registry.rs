//! Process-wide mapping from session id to session
//!
//! Every operation holds the map lock for a single critical section and never
//! across transport I/O.

use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::errors::SessionError;
use crate::session::{transport::CloseOutcome, Session, SessionHandle, SessionId};

/// How many fresh ids `create_session` tries before giving up.
pub const MAX_ID_ATTEMPTS: usize = 4;

type IdGenerator = Box<dyn Fn() -> SessionId + Send + Sync>;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub closed: Vec<SessionId>,
    pub abandoned: Vec<SessionId>,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    generate_id: IdGenerator,
    event_buffer_capacity: usize,
}

impl SessionRegistry {
    pub fn new(event_buffer_capacity: usize) -> Self {
        Self::with_id_generator(event_buffer_capacity, SessionId::generate)
    }

    pub fn with_id_generator(
        event_buffer_capacity: usize,
        generate_id: impl Fn() -> SessionId + Send + Sync + 'static,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            generate_id: Box::new(generate_id),
            event_buffer_capacity,
        }
    }

    /// Inserts a pending session under a freshly generated id.
    pub async fn create(&self) -> Result<SessionHandle, SessionError> {
        let id = (self.generate_id)();
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(SessionError::Collision(id));
        }

        let session = Arc::new(Session::new(id.clone(), self.event_buffer_capacity));
        sessions.insert(id, Arc::clone(&session));
        Ok(session)
    }

    /// Like [`create`](Self::create), regenerating the id on collision.
    pub async fn create_session(&self) -> Result<SessionHandle, SessionError> {
        let mut last_error = None;
        for attempt in 1..=MAX_ID_ATTEMPTS {
            match self.create().await {
                Ok(session) => {
                    info!(session_id = %session.id(), "session created");
                    return Ok(session);
                }
                Err(SessionError::Collision(id)) => {
                    warn!(session_id = %id, attempt, "session id collision, regenerating");
                    last_error = Some(SessionError::Collision(id));
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or(SessionError::UnknownSession))
    }

    pub async fn get(&self, id: &SessionId) -> Result<SessionHandle, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(SessionError::UnknownSession)
    }

    /// Removes a session; returns whether it was present.
    pub async fn remove(&self, id: &SessionId) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Snapshot of the sessions registered at the time of the call.
    pub async fn active(&self) -> Vec<SessionHandle> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Closes the session's transport and evicts it.
    pub async fn terminate(&self, id: &SessionId) -> Result<CloseOutcome, SessionError> {
        let session = self.get(id).await?;
        Ok(self.close_and_evict(&session).await)
    }

    async fn close_and_evict(&self, session: &Session) -> CloseOutcome {
        let outcome = session.transport().close().await;
        self.remove(session.id()).await;
        if outcome == CloseOutcome::Closed {
            info!(
                session_id = %session.id(),
                age_secs = session.age().num_seconds(),
                "session closed"
            );
        }
        outcome
    }

    /// Closes every registered session concurrently, abandoning any that
    /// take longer than `grace`.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        let sessions = self.active().await;
        let results = join_all(sessions.iter().map(|session| async move {
            let finished = tokio::time::timeout(grace, self.close_and_evict(session))
                .await
                .is_ok();
            (session.id().clone(), finished)
        }))
        .await;

        let mut report = ShutdownReport::default();
        for (id, finished) in results {
            if finished {
                report.closed.push(id);
            } else {
                warn!(session_id = %id, "session did not close within grace period, abandoning");
                self.remove(&id).await;
                report.abandoned.push(id);
            }
        }

        info!(
            closed = report.closed.len(),
            abandoned = report.abandoned.len(),
            "session shutdown complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use serde_json::json;

    use super::*;
    use crate::mcp::dispatcher::ToolDispatcher;
    use crate::session::transport::TransportState;

    fn scripted_ids(ids: &'static [&'static str]) -> impl Fn() -> SessionId + Send + Sync {
        let next = AtomicUsize::new(0);
        move || {
            let index = next.fetch_add(1, Ordering::SeqCst) % ids.len();
            SessionId::parse(ids[index]).expect("valid scripted id")
        }
    }

    #[tokio::test]
    async fn create_then_get_returns_same_session() {
        let registry = SessionRegistry::new(8);
        let session = registry.create_session().await.expect("created");

        let found = registry.get(session.id()).await.expect("found");
        assert!(Arc::ptr_eq(&session, &found));
        assert_eq!(found.transport().state(), TransportState::Pending);
    }

    #[tokio::test]
    async fn colliding_id_is_rejected_by_create() {
        let registry = SessionRegistry::with_id_generator(8, scripted_ids(&["fixed"]));
        registry.create().await.expect("first");

        let err = registry.create().await.expect_err("collision");
        assert!(matches!(err, SessionError::Collision(id) if id.as_str() == "fixed"));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn create_session_regenerates_after_collision() {
        let registry =
            SessionRegistry::with_id_generator(8, scripted_ids(&["one", "one", "two"]));
        registry.create_session().await.expect("first");

        let second = registry.create_session().await.expect("second");
        assert_eq!(second.id().as_str(), "two");
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn create_session_gives_up_after_repeated_collisions() {
        let registry = SessionRegistry::with_id_generator(8, scripted_ids(&["same"]));
        registry.create_session().await.expect("first");

        let err = registry.create_session().await.expect_err("exhausted");
        assert!(matches!(err, SessionError::Collision(_)));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = SessionRegistry::new(8);
        let session = registry.create_session().await.expect("created");

        assert!(registry.remove(session.id()).await);
        assert!(!registry.remove(session.id()).await);
        assert_eq!(
            registry.get(session.id()).await.expect_err("gone"),
            SessionError::UnknownSession
        );
    }

    #[tokio::test]
    async fn terminate_evicts_so_later_lookups_are_unknown() {
        let registry = SessionRegistry::new(8);
        let session = registry.create_session().await.expect("created");
        session
            .transport()
            .attach(Arc::new(ToolDispatcher::new()))
            .expect("attach");

        assert_eq!(
            registry.terminate(session.id()).await,
            Ok(CloseOutcome::Closed)
        );
        assert_eq!(session.transport().state(), TransportState::Closed);
        assert_eq!(
            registry.terminate(session.id()).await,
            Err(SessionError::UnknownSession)
        );
    }

    #[tokio::test]
    async fn active_is_a_snapshot() {
        let registry = SessionRegistry::new(8);
        registry.create_session().await.expect("a");
        registry.create_session().await.expect("b");

        let snapshot = registry.active().await;
        registry.create_session().await.expect("c");
        registry.remove(snapshot[0].id()).await;

        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn shutdown_closes_every_session() {
        let registry = SessionRegistry::new(8);
        for _ in 0..3 {
            let session = registry.create_session().await.expect("created");
            session
                .transport()
                .attach(Arc::new(ToolDispatcher::new()))
                .expect("attach");
        }

        let report = registry.shutdown(Duration::from_secs(1)).await;
        assert_eq!(report.closed.len(), 3);
        assert!(report.abandoned.is_empty());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn shutdown_abandons_session_stuck_past_grace() {
        let registry = SessionRegistry::new(8);
        let stuck = registry.create_session().await.expect("stuck");
        let idle = registry.create_session().await.expect("idle");
        for session in [&stuck, &idle] {
            session
                .transport()
                .attach(Arc::new(ToolDispatcher::new()))
                .expect("attach");
        }

        let call = stuck.transport().admit_call().expect("admitted");
        let report = registry.shutdown(Duration::from_millis(50)).await;

        assert_eq!(report.abandoned, vec![stuck.id().clone()]);
        assert_eq!(report.closed, vec![idle.id().clone()]);
        assert!(registry.is_empty().await);
        assert_eq!(stuck.transport().state(), TransportState::Closing);

        drop(call);
    }

    #[tokio::test]
    async fn sessions_do_not_share_event_streams() {
        let registry = SessionRegistry::new(8);
        let first = registry.create_session().await.expect("first");
        let second = registry.create_session().await.expect("second");
        for session in [&first, &second] {
            session
                .transport()
                .attach(Arc::new(ToolDispatcher::new()))
                .expect("attach");
        }

        let _first_stream = first.transport().open_stream(None).expect("first stream");
        let (a, b) = tokio::join!(
            async { second.transport().events().publish_json(&json!({"n": 1})) },
            async { second.transport().open_stream(None).map(|_| ()) },
        );

        assert_eq!(a, Some(1));
        assert!(b.is_ok());
        assert_eq!(first.transport().events().last_event_id(), None);
        assert_eq!(second.transport().events().last_event_id(), Some(1));
    }
}
