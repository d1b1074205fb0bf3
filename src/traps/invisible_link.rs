//! Invisible link to a per-session endpoint.
//!
//! The anchor is never rendered and cannot be reached by layout or keyboard,
//! so a request for its endpoint can only come from something reading the raw
//! markup. The endpoint itself lives outside the Shield; it reports hits back
//! through [`super::TrapRegistry::report_link_hit`].

use super::hidden_field::escape_attr;
use super::{Decoy, TrapHit, TrapHost};
use crate::error::ShieldError;

/// Confidence of an endpoint hit.
pub const INVISIBLE_LINK_CONFIDENCE: u8 = 100;

/// Markup description of the decoy anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoyLink {
    pub href: String,
}

impl DecoyLink {
    /// Render as an empty, undisplayed `<a>` the host can inject.
    pub fn to_html(&self) -> String {
        format!(
            r#"<a href="{}" rel="nofollow noindex" tabindex="-1" aria-hidden="true" style="display:none"></a>"#,
            escape_attr(&self.href)
        )
    }
}

/// Invisible-link trap.
#[derive(Debug, Clone)]
pub struct InvisibleLinkTrap {
    prefix: String,
    token: String,
    armed: bool,
}

impl InvisibleLinkTrap {
    /// Create a trap with a fresh random token under `prefix`.
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            token: hex::encode(rand::random::<[u8; 16]>()),
            armed: false,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Endpoint path of this session's link.
    pub fn path(&self) -> String {
        format!("{}{}", self.prefix, self.token)
    }

    pub fn decoy(&self) -> DecoyLink {
        DecoyLink { href: self.path() }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn arm(&mut self, host: &mut dyn TrapHost) -> Result<(), ShieldError> {
        if self.armed {
            return Ok(());
        }
        host.mount(&Decoy::Link(self.decoy()))?;
        self.armed = true;
        Ok(())
    }

    pub fn disarm(&mut self, host: &mut dyn TrapHost) -> Result<(), ShieldError> {
        if !self.armed {
            return Ok(());
        }
        host.unmount(&Decoy::Link(self.decoy()))?;
        self.armed = false;
        Ok(())
    }

    /// Whether `path` (or a bare token) addresses this link. Query strings
    /// and a trailing slash are ignored.
    pub fn matches(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or(path);
        let path = path.strip_suffix('/').unwrap_or(path);
        path == self.path() || path == self.token
    }

    /// Every request counts; the endpoint is not reachable by a person.
    pub fn hit(&self, path: &str) -> Option<TrapHit> {
        self.matches(path).then(|| {
            TrapHit::new(
                INVISIBLE_LINK_CONFIDENCE,
                format!("invisible link {} requested", self.path()),
            )
        })
    }
}

/// Extract the token from an endpoint path under `prefix`.
pub fn token_from_path<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    let path = path.split('?').next().unwrap_or(path);
    let token = path.strip_prefix(prefix)?;
    let token = token.strip_suffix('/').unwrap_or(token);
    (!token.is_empty() && !token.contains('/')).then_some(token)
}
