//! Session storage.
//!
//! `SessionStore` is the backend seam: the in-memory store below is the
//! default, and anything with get/set/delete semantics (a TTL cache, a
//! key-value service) can replace it. Without a TTL the memory store keeps
//! every session for the life of the process, which is fine for a single
//! demo instance and wrong for a long-running multi-instance deployment.
//!
//! `SessionManager` layers the session operations and per-session write
//! serialization on top of a store.

use crate::segment::Branch;
use crate::session::{Session, SessionId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;

/// Errors from session storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session backend error: {0}")]
    Backend(String),

    #[error("Corrupt session '{id}': {reason}")]
    Corrupt { id: SessionId, reason: String },
}

/// Key-value storage for sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a session, if present.
    async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// Insert or replace a session.
    async fn set(&self, session: Session) -> Result<(), StoreError>;

    /// Remove a session. Returns whether it existed.
    async fn delete(&self, id: &SessionId) -> Result<bool, StoreError>;
}

#[derive(Debug)]
struct StoredSession {
    session: Session,
    touched: Instant,
}

/// In-process session store with optional idle expiry.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionId, StoredSession>>,
    ttl: Option<Duration>,
}

impl MemoryStore {
    /// Create a store that never expires sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire sessions that have been idle for longer than `ttl`.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Number of sessions held, expired or not.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop every expired session. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, stored| now.duration_since(stored.touched) <= ttl);
        before - sessions.len()
    }

    fn is_expired(&self, stored: &StoredSession, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.duration_since(stored.touched) > ttl)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let sessions = self.sessions.read().await;
        let now = Instant::now();
        Ok(sessions
            .get(id)
            .filter(|stored| !self.is_expired(stored, now))
            .map(|stored| stored.session.clone()))
    }

    async fn set(&self, session: Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            session.id().clone(),
            StoredSession {
                session,
                touched: Instant::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }
}

/// Session operations over a store, with one writer per session id.
///
/// Callers that read-modify-write a session must hold the guard from
/// [`SessionManager::lock`] for the whole cycle; the `*_locked` methods
/// assume it is held.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    locks: StdMutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Manager over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Acquire the write lock for one session.
    pub async fn lock(&self, id: &SessionId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Forget lock entries nobody holds or waits on. Returns how many went.
    pub fn prune_locks(&self) -> usize {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    /// Load a session, creating an unstarted one if absent.
    pub async fn get_or_create(&self, id: &SessionId) -> Result<Session, StoreError> {
        let _guard = self.lock(id).await;
        self.get_or_create_locked(id).await
    }

    /// Take a branch on a session, creating it implicitly if needed.
    pub async fn advance(&self, id: &SessionId, branch: Branch) -> Result<Session, StoreError> {
        let _guard = self.lock(id).await;
        let mut session = self.get_or_create_locked(id).await?;
        session.advance(branch);
        self.save_locked(session.clone()).await?;
        Ok(session)
    }

    /// Put a session back to step 0 with no history.
    pub async fn reset(&self, id: &SessionId) -> Result<Session, StoreError> {
        let _guard = self.lock(id).await;
        let session = Session::new(id.clone());
        self.save_locked(session.clone()).await?;
        Ok(session)
    }

    /// Drop a session and hand out a fresh one under a new id, so a new
    /// playthrough shares nothing with the old one.
    pub async fn reset_fresh(&self, id: &SessionId) -> Result<Session, StoreError> {
        {
            let _guard = self.lock(id).await;
            self.store.delete(id).await?;
        }
        let session = Session::new(SessionId::generate());
        self.store.set(session.clone()).await?;
        Ok(session)
    }

    /// Load a session without creating it.
    pub(crate) async fn load_locked(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        match self.store.get(id).await? {
            Some(session) if session.id() != id => Err(StoreError::Corrupt {
                id: id.clone(),
                reason: format!("stored under id '{}'", session.id()),
            }),
            loaded => Ok(loaded),
        }
    }

    pub(crate) async fn get_or_create_locked(&self, id: &SessionId) -> Result<Session, StoreError> {
        if let Some(session) = self.load_locked(id).await? {
            return Ok(session);
        }
        let session = Session::new(id.clone());
        self.store.set(session.clone()).await?;
        Ok(session)
    }

    pub(crate) async fn save_locked(&self, session: Session) -> Result<(), StoreError> {
        self.store.set(session).await
    }
}
