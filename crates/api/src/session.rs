use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use ingest::IngestedCapture;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Which page a session is on. `Graph` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Page {
    Upload,
    Graph,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} not found; upload the capture again")]
    NotFound(Uuid),
    #[error("session {0} has already rendered its graph; upload the capture again to start over")]
    AlreadyGraphed(Uuid),
}

/// State carried from the upload step to the graph step.
#[derive(Debug, Clone)]
pub struct SessionContext {
    id: Uuid,
    page: Page,
    capture: IngestedCapture,
    created: Instant,
}

impl SessionContext {
    pub fn new(capture: IngestedCapture) -> Self {
        Self {
            id: Uuid::new_v4(),
            page: Page::Upload,
            capture,
            created: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn capture_path(&self) -> &Path {
        &self.capture.capture_path
    }

    pub fn json_path(&self) -> &Path {
        &self.capture.json_path
    }

    /// `Upload -> Graph`. There is no way back.
    pub fn proceed(&mut self) -> Result<PathBuf, SessionError> {
        match self.page {
            Page::Upload => {
                self.page = Page::Graph;
                Ok(self.capture.json_path.clone())
            }
            Page::Graph => Err(SessionError::AlreadyGraphed(self.id)),
        }
    }

    /// Undo a `proceed` whose graph run failed, so the user can confirm again.
    pub fn rollback(&mut self) {
        self.page = Page::Upload;
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }
}

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

/// Live sessions for this process. Nothing survives a restart.
///
/// Sessions older than the TTL are dropped on every insert. When the store is
/// full, sessions already on the graph page go first, then the oldest uploads.
pub struct SessionStore {
    sessions: DashMap<Uuid, SessionContext>,
    ttl: Duration,
    capacity: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_SESSION_TTL, DEFAULT_MAX_SESSIONS)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn insert(&self, session: SessionContext) -> Uuid {
        self.evict();
        let id = session.id();
        self.sessions.insert(id, session);
        id
    }

    pub fn get(&self, id: Uuid) -> Option<SessionContext> {
        self.sessions
            .get(&id)
            .filter(|entry| entry.value().age() < self.ttl)
            .map(|entry| entry.value().clone())
    }

    /// Apply the page transition under the entry lock and return the JSON path to graph.
    pub fn proceed(&self, id: Uuid) -> Result<PathBuf, SessionError> {
        let mut entry = self
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::NotFound(id))?;
        if entry.value().age() >= self.ttl {
            drop(entry);
            self.sessions.remove(&id);
            return Err(SessionError::NotFound(id));
        }
        entry.value_mut().proceed()
    }

    /// See [`SessionContext::rollback`]. Unknown ids are ignored.
    pub fn rollback(&self, id: Uuid) {
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            entry.value_mut().rollback();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Make room for one more session.
    fn evict(&self) {
        let before = self.sessions.len();
        let ttl = self.ttl;
        self.sessions.retain(|_, session| session.age() < ttl);

        if self.sessions.len() >= self.capacity {
            self.sessions
                .retain(|_, session| session.page() == Page::Upload);
        }
        while self.sessions.len() >= self.capacity {
            let oldest = self
                .sessions
                .iter()
                .max_by_key(|entry| entry.value().age())
                .map(|entry| *entry.key());
            match oldest {
                Some(id) => {
                    self.sessions.remove(&id);
                }
                None => break,
            }
        }

        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.sessions.len(), "Evicted sessions");
        }
    }
}
