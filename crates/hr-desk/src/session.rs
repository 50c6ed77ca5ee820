//! Per-caller session state: identity, flash messages and workflow slots.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Opaque session identifier handed out at login.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated staff member as returned by the credential lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: i64,
    pub login: String,
    pub role: String,
}

/// A resolved session: the token plus whoever logged in with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub token: SessionToken,
    pub identity: Identity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// One-shot message shown on the caller's next page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn new(level: FlashLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("session not found")]
    UnknownSession,
    #[error("session storage unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction for login sessions.
pub trait SessionStore: Send + Sync {
    fn create(&self, identity: Identity) -> Result<SessionToken, RepositoryError>;
    fn identity(&self, token: &SessionToken) -> Result<Option<Identity>, RepositoryError>;
    fn destroy(&self, token: &SessionToken) -> Result<(), RepositoryError>;
    fn push_flash(&self, token: &SessionToken, flash: Flash) -> Result<(), RepositoryError>;
    fn take_flashes(&self, token: &SessionToken) -> Result<Vec<Flash>, RepositoryError>;

    fn caller(&self, token: &SessionToken) -> Result<Option<Caller>, RepositoryError> {
        Ok(self.identity(token)?.map(|identity| Caller {
            token: token.clone(),
            identity,
        }))
    }
}

/// Default idle lifetime of a login session.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(8 * 60 * 60);

#[derive(Debug)]
struct SessionData {
    identity: Option<Identity>,
    flashes: Vec<Flash>,
    slots: BTreeMap<String, Value>,
    last_seen: Instant,
}

impl SessionData {
    fn new(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            flashes: Vec::new(),
            slots: BTreeMap::new(),
            last_seen: Instant::now(),
        }
    }

    fn is_expired(&self, idle_timeout: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) >= idle_timeout
    }
}

type Sessions = HashMap<SessionToken, SessionData>;

/// Process-local session store. Workflow state is kept in named per-session
/// slots, so it is isolated per caller and vanishes with the session. Sessions
/// idle for longer than the timeout are treated as unknown and dropped.
#[derive(Debug, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<Mutex<Sessions>>,
    idle_timeout: Duration,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl InMemorySessionStore {
    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::default(),
            idle_timeout,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Sessions>, RepositoryError> {
        self.sessions
            .lock()
            .map_err(|_| RepositoryError::Unavailable("session lock poisoned".to_string()))
    }

    /// Live session behind `token`, refreshed; an expired one is removed.
    fn live<'s>(
        &self,
        sessions: &'s mut Sessions,
        token: &SessionToken,
    ) -> Option<&'s mut SessionData> {
        let now = Instant::now();
        if sessions
            .get(token)
            .is_some_and(|session| session.is_expired(self.idle_timeout, now))
        {
            sessions.remove(token);
            debug!("expired session dropped");
            return None;
        }
        let session = sessions.get_mut(token)?;
        session.last_seen = now;
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|sessions| sessions.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn slot(
        &self,
        token: &SessionToken,
        name: &str,
    ) -> Result<Option<Value>, RepositoryError> {
        let mut sessions = self.lock()?;
        let session = self
            .live(&mut sessions, token)
            .ok_or(RepositoryError::UnknownSession)?;
        Ok(session.slots.get(name).cloned())
    }

    pub fn put_slot(
        &self,
        token: &SessionToken,
        name: &str,
        value: Value,
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.lock()?;
        let session = self
            .live(&mut sessions, token)
            .ok_or(RepositoryError::UnknownSession)?;
        session.slots.insert(name.to_string(), value);
        Ok(())
    }

    /// Removing from a missing session is a no-op.
    pub fn remove_slot(&self, token: &SessionToken, name: &str) -> Result<(), RepositoryError> {
        let mut sessions = self.lock()?;
        if let Some(session) = self.live(&mut sessions, token) {
            session.slots.remove(name);
        }
        Ok(())
    }
}

impl SessionStore for InMemorySessionStore {
    fn create(&self, identity: Identity) -> Result<SessionToken, RepositoryError> {
        let token = SessionToken::generate();
        let now = Instant::now();
        let mut sessions = self.lock()?;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(self.idle_timeout, now));
        if sessions.len() < before {
            debug!(dropped = before - sessions.len(), "expired sessions swept");
        }
        sessions.insert(token.clone(), SessionData::new(identity));
        Ok(token)
    }

    fn identity(&self, token: &SessionToken) -> Result<Option<Identity>, RepositoryError> {
        let mut sessions = self.lock()?;
        Ok(self
            .live(&mut sessions, token)
            .and_then(|session| session.identity.clone()))
    }

    fn destroy(&self, token: &SessionToken) -> Result<(), RepositoryError> {
        self.lock()?.remove(token);
        Ok(())
    }

    fn push_flash(&self, token: &SessionToken, flash: Flash) -> Result<(), RepositoryError> {
        let mut sessions = self.lock()?;
        let session = self
            .live(&mut sessions, token)
            .ok_or(RepositoryError::UnknownSession)?;
        session.flashes.push(flash);
        Ok(())
    }

    fn take_flashes(&self, token: &SessionToken) -> Result<Vec<Flash>, RepositoryError> {
        let mut sessions = self.lock()?;
        Ok(self
            .live(&mut sessions, token)
            .map(|session| std::mem::take(&mut session.flashes))
            .unwrap_or_default())
    }
}
