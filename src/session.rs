//! In-memory user sessions and their credentials.
//!
//! Credentials live only as long as the session does: they are dropped when the
//! session is deleted or expires, never written to disk, and redacted from
//! `Debug` output so they cannot leak through logs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use uuid::Uuid;

use crate::models::Provider;

/// A secret string that never prints its value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw value (only for building outgoing requests).
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Provider credentials for one session.
#[derive(Clone, Default)]
pub struct Credentials {
    keys: HashMap<Provider, Secret>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear a credential. Blank values clear it.
    pub fn set(&mut self, provider: Provider, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            self.keys.remove(&provider);
        } else {
            self.keys.insert(provider, Secret::new(value));
        }
    }

    #[cfg(test)]
    pub fn with(mut self, provider: Provider, value: &str) -> Self {
        self.set(provider, value);
        self
    }

    pub fn get(&self, provider: Provider) -> Option<&Secret> {
        self.keys.get(&provider)
    }

    pub fn has(&self, provider: Provider) -> bool {
        self.keys.contains_key(&provider)
    }

    /// Providers with a credential, in registry order.
    pub fn configured(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.has(*p))
            .collect()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("configured", &self.configured())
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session {0} not found")]
    NotFound(Uuid),

    #[error("A query is already running for session {0}")]
    Busy(Uuid),
}

#[derive(Debug)]
struct Session {
    credentials: Credentials,
    last_seen: Instant,
    busy: bool,
}

type SessionMap = HashMap<Uuid, Session>;

/// All live sessions.
pub struct SessionStore {
    sessions: Arc<Mutex<SessionMap>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionMap> {
        lock_map(&self.sessions)
    }

    /// Start a new session with no credentials.
    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().insert(
            id,
            Session {
                credentials: Credentials::new(),
                last_seen: Instant::now(),
                busy: false,
            },
        );
        tracing::info!("Session {} created", id);
        id
    }

    /// Apply credential updates and return the providers now configured.
    pub fn update_credentials<'a>(
        &self,
        id: Uuid,
        updates: impl IntoIterator<Item = (Provider, &'a str)>,
    ) -> Result<Vec<Provider>, SessionError> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        for (provider, value) in updates {
            session.credentials.set(provider, value);
        }
        session.last_seen = Instant::now();
        Ok(session.credentials.configured())
    }

    /// Providers configured for a session.
    pub fn configured(&self, id: Uuid) -> Result<Vec<Provider>, SessionError> {
        self.lock()
            .get(&id)
            .map(|s| s.credentials.configured())
            .ok_or(SessionError::NotFound(id))
    }

    /// End a session, dropping its credentials.
    pub fn remove(&self, id: Uuid) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            tracing::info!("Session {} ended", id);
        }
        removed
    }

    /// Mark a session busy for the duration of one query.
    ///
    /// Returns a snapshot of the session's credentials and a guard that clears
    /// the busy flag when dropped.
    pub fn begin_query(&self, id: Uuid) -> Result<(Credentials, QueryGuard), SessionError> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        if session.busy {
            return Err(SessionError::Busy(id));
        }
        session.busy = true;
        session.last_seen = Instant::now();
        Ok((
            session.credentials.clone(),
            QueryGuard {
                id,
                sessions: Arc::clone(&self.sessions),
            },
        ))
    }

    /// Drop idle sessions older than the TTL. Busy sessions are kept.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, s| s.busy || now.duration_since(s.last_seen) < self.ttl);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn a background task that periodically expires idle sessions.
    pub fn start_cleanup_task(self: Arc<Self>) {
        let period = (self.ttl / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let purged = self.purge_expired();
                if purged > 0 {
                    tracing::info!("Expired {} idle session(s)", purged);
                }
            }
        });
    }
}

/// Clears a session's busy flag on drop.
pub struct QueryGuard {
    id: Uuid,
    sessions: Arc<Mutex<SessionMap>>,
}

impl Drop for QueryGuard {
    fn drop(&mut self) {
        if let Some(session) = lock_map(&self.sessions).get_mut(&self.id) {
            session.busy = false;
            session.last_seen = Instant::now();
        }
    }
}

fn lock_map(map: &Mutex<SessionMap>) -> MutexGuard<'_, SessionMap> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
