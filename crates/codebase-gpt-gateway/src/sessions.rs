use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use codebase_gpt_core::Session;
use tokio::sync::Mutex;
use uuid::Uuid;

pub(crate) type SharedSession = Arc<Mutex<Session>>;

struct Entry {
    session: SharedSession,
    last_used: Instant,
}

/// Bounded in-memory session table. Idle sessions expire after `ttl`; at capacity the
/// least recently used one is evicted.
#[derive(Clone)]
pub(crate) struct SessionStore {
    entries: Arc<Mutex<HashMap<Uuid, Entry>>>,
    max_sessions: usize,
    ttl: Duration,
}

impl SessionStore {
    pub(crate) fn new(max_sessions: usize, ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            max_sessions: max_sessions.max(1),
            ttl,
        }
    }

    pub(crate) async fn create(&self) -> (Uuid, SharedSession) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| now.duration_since(e.last_used) <= self.ttl);

        if entries.len() >= self.max_sessions
            && let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(id, _)| *id)
        {
            entries.remove(&oldest);
            tracing::debug!(session = %oldest, "evicted least recently used session");
        }

        let id = Uuid::new_v4();
        let session = Arc::new(Mutex::new(Session::new()));
        entries.insert(
            id,
            Entry {
                session: Arc::clone(&session),
                last_used: now,
            },
        );
        (id, session)
    }

    pub(crate) async fn get(&self, id: Uuid) -> Option<SharedSession> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let live = entries
            .get(&id)
            .map(|e| now.duration_since(e.last_used) <= self.ttl)?;
        if !live {
            entries.remove(&id);
            tracing::debug!(session = %id, "session expired");
            return None;
        }
        let entry = entries.get_mut(&id)?;
        entry.last_used = now;
        Some(Arc::clone(&entry.session))
    }

    pub(crate) async fn remove(&self, id: Uuid) -> bool {
        self.entries.lock().await.remove(&id).is_some()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_get() {
        let store = SessionStore::new(10, Duration::from_secs(60));
        let (id, session) = store.create().await;
        let fetched = store.get(id).await.unwrap();
        assert!(Arc::ptr_eq(&session, &fetched));
        assert!(store.get(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn evicts_least_recently_used_at_capacity() {
        let store = SessionStore::new(2, Duration::from_secs(60));
        let (first, _) = store.create().await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        let (second, _) = store.create().await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        // Touch the first so the second becomes the oldest.
        store.get(first).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;

        let (third, _) = store.create().await;
        assert_eq!(store.len().await, 2);
        assert!(store.get(first).await.is_some());
        assert!(store.get(second).await.is_none());
        assert!(store.get(third).await.is_some());
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let store = SessionStore::new(10, Duration::from_millis(1));
        let (id, _) = store.create().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(store.get(id).await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let store = SessionStore::new(10, Duration::from_secs(60));
        let (id, _) = store.create().await;
        assert!(store.remove(id).await);
        assert!(!store.remove(id).await);
    }
}
