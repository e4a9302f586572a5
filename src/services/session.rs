//! Session state and the server-side session table.
//!
//! ARCHITECTURE
//! ============
//! The client holds only an opaque token (the `session_token` cookie). All
//! session state lives here, keyed by that token: the authentication flag,
//! who is logged in, the URL to return to after a login round-trip, and the
//! queue of flash messages.
//!
//! TRADE-OFFS
//! ==========
//! Logging in does not rotate the token. A token handed out before login
//! stays valid afterwards, so a fixated token carries over into the
//! authenticated session.
//!
//! The table is process-local even when users live in Postgres; a restart
//! ends every session. Only sessions carrying state are stored, and every
//! entry expires, so anonymous traffic cannot grow the table without bound.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

// =============================================================================
// SESSION
// =============================================================================

/// How the identity in a session was proven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Password,
    Google,
}

/// Who is logged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionIdentity {
    pub email: String,
    pub name: String,
    pub method: AuthMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashCategory {
    Success,
    Error,
}

/// A user-facing message shown once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    pub category: FlashCategory,
    pub message: String,
}

impl Flash {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self { category: FlashCategory::Success, message: message.into() }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self { category: FlashCategory::Error, message: message.into() }
    }
}

/// Per-client session state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    authenticated: bool,
    identity: Option<SessionIdentity>,
    pending_redirect: Option<String>,
    flashes: Vec<Flash>,
}

impl Session {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    #[must_use]
    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.identity.as_ref()
    }

    /// Mark the session as logged in as `identity`. The token is kept as is.
    pub fn mark_authenticated(&mut self, identity: SessionIdentity) {
        self.authenticated = true;
        self.identity = Some(identity);
    }

    /// Drop the login and any redirect captured for it.
    pub fn mark_unauthenticated(&mut self) {
        self.authenticated = false;
        self.identity = None;
        self.pending_redirect = None;
    }

    /// Remember where an intercepted request wanted to go.
    pub fn capture_redirect(&mut self, url: impl Into<String>) {
        self.pending_redirect = Some(url.into());
    }

    /// Return the captured URL once; afterwards `default` is returned.
    pub fn consume_redirect(&mut self, default: &str) -> String {
        self.pending_redirect.take().unwrap_or_else(|| default.to_owned())
    }

    #[must_use]
    pub fn pending_redirect(&self) -> Option<&str> {
        self.pending_redirect.as_deref()
    }

    pub fn flash(&mut self, flash: Flash) {
        self.flashes.push(flash);
    }

    /// Drain queued flash messages.
    pub fn take_flashes(&mut self) -> Vec<Flash> {
        std::mem::take(&mut self.flashes)
    }

    /// Anonymous, with nothing captured and nothing queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.authenticated && self.identity.is_none() && self.pending_redirect.is_none() && self.flashes.is_empty()
    }
}

// =============================================================================
// SESSION STORE
// =============================================================================

/// Lifetime of a logged-in session, renewed on every save.
pub const AUTHENTICATED_TTL: Duration = Duration::days(7);
/// Lifetime of an anonymous session (a captured redirect or pending flashes).
pub const ANONYMOUS_TTL: Duration = Duration::minutes(30);
pub const DEFAULT_CAPACITY: usize = 100_000;

struct Entry {
    session: Session,
    expires_at: OffsetDateTime,
}

/// Server-side session table keyed by token.
///
/// Entries expire after [`AUTHENTICATED_TTL`] or [`ANONYMOUS_TTL`] without a
/// save. When the table is full, expired entries are swept first and then the
/// entry closest to expiry is evicted, so the table never exceeds its capacity.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Entry>>>,
    capacity: usize,
    authenticated_ttl: Duration,
    anonymous_ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_CAPACITY, AUTHENTICATED_TTL, ANONYMOUS_TTL)
    }
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_limits(capacity: usize, authenticated_ttl: Duration, anonymous_ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
            authenticated_ttl,
            anonymous_ttl,
        }
    }

    /// Look up a session. `None` means the token was never issued, was removed or has expired.
    pub async fn load(&self, token: &str) -> Option<Session> {
        let now = OffsetDateTime::now_utc();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                Some(entry) if entry.expires_at > now => return Some(entry.session.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        let mut sessions = self.sessions.write().await;
        if sessions.get(token).is_some_and(|entry| entry.expires_at <= now) {
            sessions.remove(token);
        }
        None
    }

    /// Store `session` under `token` and renew its expiry.
    pub async fn save(&self, token: &str, session: Session) {
        let now = OffsetDateTime::now_utc();
        let ttl = if session.is_authenticated() { self.authenticated_ttl } else { self.anonymous_ttl };
        let mut sessions = self.sessions.write().await;

        if !sessions.contains_key(token) && sessions.len() >= self.capacity {
            sessions.retain(|_, entry| entry.expires_at > now);
            if sessions.len() >= self.capacity {
                let oldest = sessions
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(token, _)| token.clone());
                if let Some(oldest) = oldest {
                    tracing::debug!("session table full; evicting the entry closest to expiry");
                    sessions.remove(&oldest);
                }
            }
        }

        sessions.insert(token.to_owned(), Entry { session, expires_at: now + ttl });
    }

    pub async fn remove(&self, token: &str) {
        self.sessions.write().await.remove(token);
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
