use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::auth::user::AuthenticationLevel;
use crate::error::{GateError, Result};

/// State attached to a session cookie
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub username: String,
    pub display_name: String,
    pub groups: Vec<String>,
    pub emails: Vec<String>,
    pub authentication_level: AuthenticationLevel,
    /// Unix timestamp of the last authenticated activity
    pub last_activity: i64,
    pub keep_me_logged_in: bool,
    /// Deadline after which the profile must be refreshed from the user provider
    pub refresh_ttl: Option<DateTime<Utc>>,
}

/// Generate an unguessable session identifier
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Trait for session backends
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Fresh unauthenticated session
    fn new_default_session(&self) -> UserSession {
        UserSession::default()
    }

    /// Session stored under `id`, `None` when absent or expired
    async fn get_session(&self, id: &str) -> Result<Option<UserSession>>;

    /// Store `session` under `id`, keeping its current expiration if any
    async fn save_session(&self, id: &str, session: UserSession) -> Result<()>;

    /// Move the session under a new identifier and return it
    async fn regenerate_session_id(&self, id: &str) -> Result<String>;

    /// Push the expiration of the session to `expiration` from now
    async fn update_expiration(&self, id: &str, expiration: Duration) -> Result<()>;

    /// Remember me duration, zero when the feature is disabled
    fn remember_me(&self) -> Duration;
}

struct StoredSession {
    session: UserSession,
    expires_at: Instant,
}

/// In-memory session store
pub struct MemorySessionProvider {
    sessions: RwLock<HashMap<String, StoredSession>>,
    expiration: Duration,
    remember_me: Duration,
}

impl MemorySessionProvider {
    pub fn new(expiration: Duration, remember_me: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            expiration,
            remember_me,
        }
    }

    /// Time left before the session expires
    pub async fn time_to_live(&self, id: &str) -> Option<Duration> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .and_then(|stored| stored.expires_at.checked_duration_since(Instant::now()))
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Remove expired sessions, returning how many were dropped
    pub async fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, stored| stored.expires_at > now);
        before - sessions.len()
    }

    /// Start background cleanup task
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                let removed = self.cleanup_expired().await;
                if removed > 0 {
                    log::debug!("Removed {} expired sessions", removed);
                }
            }
        });
    }
}

#[async_trait]
impl SessionProvider for MemorySessionProvider {
    async fn get_session(&self, id: &str) -> Result<Option<UserSession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(id)
            .filter(|stored| stored.expires_at > Instant::now())
            .map(|stored| stored.session.clone()))
    }

    async fn save_session(&self, id: &str, session: UserSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        if let Some(stored) = sessions.get_mut(id).filter(|stored| stored.expires_at > now) {
            stored.session = session;
            return Ok(());
        }

        sessions.insert(
            id.to_string(),
            StoredSession {
                session,
                expires_at: now + self.expiration,
            },
        );
        Ok(())
    }

    async fn regenerate_session_id(&self, id: &str) -> Result<String> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions.remove(id).ok_or_else(|| GateError::SessionNotFound(id.to_string()))?;

        let mut new_id = generate_session_id();
        while sessions.contains_key(&new_id) {
            new_id = generate_session_id();
        }
        sessions.insert(new_id.clone(), stored);
        Ok(new_id)
    }

    async fn update_expiration(&self, id: &str, expiration: Duration) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(id)
            .ok_or_else(|| GateError::SessionNotFound(id.to_string()))?;
        stored.expires_at = Instant::now() + expiration;
        Ok(())
    }

    fn remember_me(&self) -> Duration {
        self.remember_me
    }
}
