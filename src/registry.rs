//! Isolated sessions for server-side aggregation.
//!
//! Each session owns its own [`Shield`]; nothing mutable is shared between
//! sessions. The registry also routes invisible-link endpoint hits back to the
//! session whose token they carry.

use crate::config::ShieldConfig;
use crate::environment::Environment;
use crate::shield::Shield;
use crate::traps::invisible_link::token_from_path;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Shared handle to one session.
pub type SessionHandle = Arc<Mutex<Shield>>;

struct SessionEntry {
    shield: SessionHandle,
    created_at: Instant,
    link_token: String,
}

/// Bounded map of live sessions keyed by session id.
pub struct SessionRegistry {
    config: ShieldConfig,
    sessions: DashMap<String, SessionEntry>,
    /// Invisible-link token -> session id
    links: DashMap<String, String>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(config: ShieldConfig, max_sessions: usize) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
            links: DashMap::new(),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Create and initialize a session, replacing any session with the same id.
    /// Evicts the oldest session when full.
    pub fn create_session(&self, id: &str, env: Environment) -> SessionHandle {
        self.remove(id);
        if self.sessions.len() >= self.max_sessions {
            self.evict_oldest();
        }

        let mut shield = Shield::new(self.config.clone(), env);
        shield.initialize();
        let link_token = shield.link_token().to_string();
        let handle = Arc::new(Mutex::new(shield));

        self.links.insert(link_token.clone(), id.to_string());
        self.sessions.insert(
            id.to_string(),
            SessionEntry {
                shield: handle.clone(),
                created_at: Instant::now(),
                link_token,
            },
        );

        debug!(session = id, sessions = self.sessions.len(), "Session created");
        handle
    }

    fn evict_oldest(&self) {
        let oldest = self
            .sessions
            .iter()
            .min_by_key(|entry| entry.value().created_at)
            .map(|entry| entry.key().clone());

        if let Some(id) = oldest {
            debug!(session = %id, "Evicting oldest session");
            self.remove(&id);
        }
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| entry.shield.clone())
    }

    /// Drop a session. Returns false if it did not exist.
    pub fn remove(&self, id: &str) -> bool {
        match self.sessions.remove(id) {
            Some((_, entry)) => {
                self.links.remove(&entry.link_token);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Reset a session in place and re-index its rotated link token.
    pub async fn reset_session(&self, id: &str) -> bool {
        let Some(handle) = self.get(id) else {
            return false;
        };

        let new_token = {
            let mut shield = handle.lock().await;
            shield.reset();
            shield.initialize();
            shield.link_token().to_string()
        };

        if let Some(mut entry) = self.sessions.get_mut(id) {
            let old = std::mem::replace(&mut entry.link_token, new_token.clone());
            self.links.remove(&old);
        }
        self.links.insert(new_token, id.to_string());
        true
    }

    /// Route an invisible-link endpoint hit to its session and record the
    /// trap there. Returns the session id on a match.
    pub async fn report_link_hit(&self, path: &str) -> Option<String> {
        let token = token_from_path(&self.config.traps.link_path_prefix, path)?;
        let id = self.links.get(token).map(|entry| entry.value().clone())?;
        let handle = self.get(&id)?;

        let recorded = handle.lock().await.report_link_hit(token);
        if recorded {
            info!(session = %id, "Invisible link hit reported");
            Some(id)
        } else {
            None
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(ShieldConfig::default(), 10_000)
    }
}
