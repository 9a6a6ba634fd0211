//! Server-side sessions.
//!
//! Users are configured with a SHA-256 digest of their password. A successful
//! login issues an opaque random bearer token that every API request must
//! present; tokens live in memory until they expire or are revoked.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::UserCredential;
use crate::errors::AuthError;

const TOKEN_BYTES: usize = 32;

/// A token handed out at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedSession {
    pub token: String,
    pub expires_in: Duration,
}

#[derive(Debug)]
struct Session {
    username: String,
    expires_at: Instant,
}

/// Configured users plus the table of live sessions.
#[derive(Debug)]
pub struct SessionStore {
    users: Vec<UserCredential>,
    ttl: Duration,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(users: Vec<UserCredential>, ttl: Duration) -> Self {
        SessionStore {
            users,
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Check credentials and open a new session.
    pub fn login(&self, username: &str, password: &str) -> Result<IssuedSession, AuthError> {
        let digest = password_digest(password);
        let known = self
            .users
            .iter()
            .any(|u| u.username == username && digests_match(&u.password_sha256, &digest));
        if !known {
            warn!(username, "Rejected login");
            return Err(AuthError::InvalidCredentials);
        }

        let token = new_token();
        let mut sessions = self.lock();
        purge_expired(&mut sessions, Instant::now());
        sessions.insert(
            token.clone(),
            Session {
                username: username.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        info!(username, active_sessions = sessions.len(), "Session opened");

        Ok(IssuedSession {
            token,
            expires_in: self.ttl,
        })
    }

    /// Resolve a bearer token to its username.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        self.verify_at(token, Instant::now())
    }

    fn verify_at(&self, token: &str, now: Instant) -> Result<String, AuthError> {
        let mut sessions = self.lock();
        match sessions.get(token) {
            Some(s) if s.expires_at > now => Ok(s.username.clone()),
            Some(_) => {
                sessions.remove(token);
                debug!("Expired session presented");
                Err(AuthError::InvalidSession)
            }
            None => Err(AuthError::InvalidSession),
        }
    }

    /// Drop a session. Unknown tokens are ignored.
    pub fn revoke(&self, token: &str) {
        if let Some(s) = self.lock().remove(token) {
            info!(username = %s.username, "Session closed");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)
}

/// Lowercase hex SHA-256 of `password`, the form stored in configuration.
pub fn password_digest(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

fn digests_match(configured: &str, computed: &str) -> bool {
    let configured = configured.trim().to_ascii_lowercase();
    configured.len() == computed.len()
        && configured
            .bytes()
            .zip(computed.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn purge_expired(sessions: &mut HashMap<String, Session>, now: Instant) {
    sessions.retain(|_, s| s.expires_at > now);
}
