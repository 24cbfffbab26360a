//! Process-wide map from session identifier to live session.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::{Mutex, MutexGuard, broadcast};

use crate::{
    dto::events::{EventEnvelope, SessionEvent},
    error::ServiceError,
    state::session::Session,
};

/// Events buffered per subscriber before it is considered lagging.
pub const EVENT_BUFFER: usize = 64;

/// Shared handle to one session: its state behind a mutex and its event fan-out.
///
/// Every mutation and the matching [`publish`](Self::publish) happen while the mutex is
/// held, so subscribers observe events in mutation order.
pub struct SessionHandle {
    id: String,
    session: Mutex<Session>,
    events: broadcast::Sender<EventEnvelope>,
}

impl SessionHandle {
    fn new(session: Session) -> Self {
        let (events, _receiver) = broadcast::channel(EVENT_BUFFER);
        Self {
            id: session.id().to_owned(),
            session: Mutex::new(session),
            events,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Exclusive access to the session.
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().await
    }

    /// Stamp `event` with the next sequence number and fan it out. Never waits on receivers.
    pub fn publish(&self, session: &mut Session, event: SessionEvent) -> u64 {
        let seq = session.next_seq();
        let _ = self.events.send(EventEnvelope {
            seq,
            session_id: self.id.clone(),
            event,
        });
        seq
    }

    /// Subscribe while holding the session lock, so the caller's snapshot and the
    /// first received event are contiguous.
    pub fn subscribe(&self, _session: &Session) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    /// Receivers currently attached.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

/// Injectable session store. A fresh registry per test keeps tests isolated.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionHandle>>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the session registered under `session_id`, creating it with `create` when absent.
    ///
    /// Insertion happens under the map's entry lock: concurrent callers for the same unseen
    /// identifier all receive the single winning instance.
    pub fn get_or_create<F>(
        &self,
        session_id: &str,
        create: F,
    ) -> Result<(Arc<SessionHandle>, bool), ServiceError>
    where
        F: FnOnce() -> Result<Session, ServiceError>,
    {
        match self.sessions.entry(session_id.to_owned()) {
            Entry::Occupied(entry) => Ok((entry.get().clone(), false)),
            Entry::Vacant(entry) => {
                let handle = Arc::new(SessionHandle::new(create()?));
                entry.insert(handle.clone());
                Ok((handle, true))
            }
        }
    }

    /// Live session registered under `session_id`.
    pub fn get(&self, session_id: &str) -> Result<Arc<SessionHandle>, ServiceError> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}`")))
    }

    /// Drop an idle lobby. No-op while players remain or once the game started.
    pub async fn remove(&self, session_id: &str) -> bool {
        let Ok(handle) = self.get(session_id) else {
            return false;
        };
        let mut session = handle.lock().await;
        if !session.is_idle() {
            return false;
        }
        self.detach(&handle, &mut session);
        true
    }

    /// Retire `session` and unregister `handle`, leaving any newer session with the same id alone.
    pub fn detach(&self, handle: &Arc<SessionHandle>, session: &mut Session) {
        session.retire();
        self.sessions
            .remove_if(handle.id(), |_, current| Arc::ptr_eq(current, handle));
    }

    /// Every registered session.
    pub fn handles(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// No session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::state::round::{Round, RoundKind};

    fn session(id: &str) -> Result<Session, ServiceError> {
        Session::new(
            id,
            "science",
            vec![Round {
                id: "sci-1".into(),
                kind: RoundKind::Text {
                    prompt: "H2O?".into(),
                },
                options: vec!["water".into(), "salt".into()],
                correct_option_index: 0,
                duration_ms: 30_000,
            }],
        )
    }

    #[tokio::test]
    async fn concurrent_first_joiners_share_one_session() {
        let registry = Arc::new(SessionRegistry::new());
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create("room", || session("room")) })
            })
            .collect();

        let mut handles = Vec::new();
        let mut created = 0;
        for task in tasks {
            let (handle, was_created) = task.await.unwrap().unwrap();
            created += usize::from(was_created);
            handles.push(handle);
        }

        assert_eq!(created, 1);
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn failed_creation_registers_nothing() {
        let registry = SessionRegistry::new();
        let result = registry.get_or_create("room", || {
            Err(ServiceError::NotFound("category `nope`".into()))
        });
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn remove_only_drops_idle_lobbies() {
        let registry = SessionRegistry::new();
        let (handle, _) = registry.get_or_create("room", || session("room")).unwrap();
        handle
            .lock()
            .await
            .add_player("alice", 20, SystemTime::now())
            .unwrap();

        assert!(!registry.remove("room").await);
        assert!(registry.get("room").is_ok());

        handle.lock().await.remove_player("alice").unwrap();
        assert!(registry.remove("room").await);
        assert!(matches!(registry.get("room"), Err(ServiceError::NotFound(_))));
        assert!(handle.lock().await.is_retired());
        assert!(!registry.remove("room").await);
    }

    #[tokio::test]
    async fn publish_assigns_increasing_sequence_numbers() {
        let registry = SessionRegistry::new();
        let (handle, _) = registry.get_or_create("room", || session("room")).unwrap();
        let mut session = handle.lock().await;
        let mut receiver = handle.subscribe(&session);

        handle.publish(
            &mut session,
            SessionEvent::PlayerLeft(crate::dto::events::PlayerLeftEvent {
                player: "alice".into(),
                departed: false,
            }),
        );
        handle.publish(
            &mut session,
            SessionEvent::PlayerLeft(crate::dto::events::PlayerLeftEvent {
                player: "bob".into(),
                departed: false,
            }),
        );
        drop(session);

        assert_eq!(receiver.recv().await.unwrap().seq, 1);
        assert_eq!(receiver.recv().await.unwrap().seq, 2);
    }
}
