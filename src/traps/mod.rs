//! Honeypot traps.
//!
//! Each trap is invisible or irrelevant to a person using the page but easy
//! for automation to walk into. Every trigger is appended to the session's
//! [`HoneypotState`], whose aggregate confidence only ever goes up.

pub mod hidden_field;
pub mod invisible_link;
pub mod js_execution;
pub mod pointer;
pub mod sequence;
pub mod timing;

pub use hidden_field::{DecoyField, HiddenFieldTrap};
pub use invisible_link::{DecoyLink, InvisibleLinkTrap};
pub use js_execution::{JsChallenge, JsExecutionTrap, Verification};
pub use pointer::{ClickPositionTrap, MouseMovementTrap, TargetRect};
pub use sequence::SequenceTrap;
pub use timing::TimingTrap;

use crate::clock::Clock;
use crate::config::TrapConfig;
use crate::environment::EnvironmentDescriptor;
use crate::error::ShieldError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Timing trap armed for the first generic page interaction.
pub const PAGE_INTERACTION: &str = "page-interaction";

/// Trap kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrapType {
    HiddenField,
    InvisibleLink,
    Timing,
    Sequence,
    JsExecution,
    MouseMovement,
    ClickPosition,
}

impl TrapType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrapType::HiddenField => "hidden-field",
            TrapType::InvisibleLink => "invisible-link",
            TrapType::Timing => "timing",
            TrapType::Sequence => "sequence",
            TrapType::JsExecution => "js-execution",
            TrapType::MouseMovement => "mouse-movement",
            TrapType::ClickPosition => "click-position",
        }
    }
}

/// What a trap reports when it fires, before it is stamped.
#[derive(Debug, Clone, PartialEq)]
pub struct TrapHit {
    pub confidence: u8,
    pub details: String,
}

impl TrapHit {
    pub fn new(confidence: u8, details: impl Into<String>) -> Self {
        Self {
            confidence: confidence.min(100),
            details: details.into(),
        }
    }
}

/// One trap activation. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrapEvent {
    pub trap_type: TrapType,
    pub confidence: u8,
    pub details: String,
    pub timestamp: f64,
}

/// Aggregate honeypot state of one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoneypotState {
    pub traps_triggered: Vec<TrapEvent>,
    pub is_bot: bool,
    /// Sum of trap confidences, capped at 100; never decreases
    pub confidence: u8,
}

impl HoneypotState {
    /// Append a trap event and raise the aggregate confidence.
    pub fn record(&mut self, event: TrapEvent, bot_threshold: u8) {
        self.confidence = self.confidence.saturating_add(event.confidence).min(100);
        self.traps_triggered.push(event);
        if !self.is_bot && self.confidence >= bot_threshold {
            self.is_bot = true;
        }
    }

    pub fn has_triggered(&self) -> bool {
        !self.traps_triggered.is_empty()
    }

    /// Number of activations of one trap kind.
    pub fn count(&self, trap_type: TrapType) -> usize {
        self.traps_triggered
            .iter()
            .filter(|e| e.trap_type == trap_type)
            .count()
    }
}

/// A decoy element for the host page to mount.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoy {
    Field(DecoyField),
    Link(DecoyLink),
}

/// Host page capability for mounting decoys and reading them back.
pub trait TrapHost: Send + Sync {
    /// Insert a decoy into the page. Fails if the page is not ready.
    fn mount(&mut self, decoy: &Decoy) -> Result<(), ShieldError>;

    /// Remove a previously mounted decoy.
    fn unmount(&mut self, decoy: &Decoy) -> Result<(), ShieldError>;

    /// Current value of a form field, if present.
    fn field_value(&self, name: &str) -> Option<String>;
}

/// All traps of one session plus their shared state.
pub struct TrapRegistry {
    config: TrapConfig,
    clock: Arc<dyn Clock>,
    state: HoneypotState,
    hidden_field: HiddenFieldTrap,
    link: InvisibleLinkTrap,
    timers: HashMap<String, TimingTrap>,
    sequence: SequenceTrap,
    js: JsExecutionTrap,
    movement: MouseMovementTrap,
    clicks: ClickPositionTrap,
}

impl TrapRegistry {
    pub fn new(config: TrapConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            hidden_field: HiddenFieldTrap::new(
                &config.hidden_field_name,
                &config.hidden_field_autocomplete,
            ),
            link: InvisibleLinkTrap::new(&config.link_path_prefix),
            timers: HashMap::new(),
            sequence: SequenceTrap::new(
                config.sequence_history,
                config.min_step_interval_ms,
                config.impossible_sequences.clone(),
            ),
            js: JsExecutionTrap::new(&config.challenge_secret, config.challenge_validity_seconds),
            movement: MouseMovementTrap::new(config.min_movement_px),
            clicks: ClickPositionTrap::new(
                config.center_tolerance_px,
                config.round_coordinate_modulus,
            ),
            state: HoneypotState::default(),
            clock,
            config,
        }
    }

    pub fn state(&self) -> &HoneypotState {
        &self.state
    }

    fn fire(&mut self, trap_type: TrapType, hit: TrapHit) {
        info!(
            trap = trap_type.as_str(),
            confidence = hit.confidence,
            details = %hit.details,
            "Honeypot trap triggered"
        );
        let event = TrapEvent {
            trap_type,
            confidence: hit.confidence,
            details: hit.details,
            timestamp: self.clock.now_ms(),
        };
        self.state.record(event, self.config.bot_threshold);
    }

    /// Mount the off-screen decoy field. Returns false (trap not armed) when
    /// the host cannot take it.
    pub fn arm_hidden_field(&mut self, host: &mut dyn TrapHost) -> bool {
        match self.hidden_field.arm(host) {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "Hidden-field trap not armed");
                false
            }
        }
    }

    /// Read the decoy field back from the host.
    pub fn check_hidden_field(&mut self, host: &dyn TrapHost) -> bool {
        if !self.hidden_field.is_armed() {
            return false;
        }
        let value = host.field_value(self.hidden_field.name());
        self.check_hidden_field_value(value.as_deref())
    }

    /// Check a submitted value of the decoy field.
    pub fn check_hidden_field_value(&mut self, value: Option<&str>) -> bool {
        match self.hidden_field.check(value) {
            Some(hit) => {
                self.fire(TrapType::HiddenField, hit);
                true
            }
            None => false,
        }
    }

    pub fn hidden_field(&self) -> &HiddenFieldTrap {
        &self.hidden_field
    }

    /// Mount the invisible link. Returns false when the host cannot take it.
    pub fn arm_invisible_link(&mut self, host: &mut dyn TrapHost) -> bool {
        match self.link.arm(host) {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "Invisible-link trap not armed");
                false
            }
        }
    }

    /// Take both decoys off the page, ahead of a reset that re-mounts them
    /// with fresh tokens.
    pub fn disarm_decoys(&mut self, host: &mut dyn TrapHost) {
        if let Err(err) = self.hidden_field.disarm(host) {
            debug!(error = %err, "Decoy field not removed");
        }
        if let Err(err) = self.link.disarm(host) {
            debug!(error = %err, "Invisible link not removed");
        }
    }

    pub fn invisible_link(&self) -> &InvisibleLinkTrap {
        &self.link
    }

    /// Report a request for the invisible-link endpoint. Accepts the full
    /// path or the bare token; returns false if it is not this session's link.
    pub fn report_link_hit(&mut self, path: &str) -> bool {
        match self.link.hit(path) {
            Some(hit) => {
                self.fire(TrapType::InvisibleLink, hit);
                true
            }
            None => false,
        }
    }

    /// Start (or restart) a named timing trap.
    pub fn start_timing(&mut self, action: &str, min_ms: f64) {
        let now = self.clock.now_ms();
        self.timers
            .entry(action.to_string())
            .or_insert_with(|| TimingTrap::new(min_ms))
            .start(now, min_ms);
    }

    /// Complete a named timing trap. One-shot: the trap disarms afterwards.
    pub fn check_timing(&mut self, action: &str) -> bool {
        let now = self.clock.now_ms();
        let hit = match self.timers.get_mut(action) {
            Some(trap) => trap.check(now, action),
            None => None,
        };
        match hit {
            Some(hit) => {
                self.fire(TrapType::Timing, hit);
                true
            }
            None => false,
        }
    }

    pub fn timing_pending(&self, action: &str) -> bool {
        self.timers.get(action).is_some_and(|t| t.is_pending())
    }

    /// Record a navigation step. Returns true if it tripped the sequence trap.
    pub fn record_step(&mut self, step: &str) -> bool {
        let now = self.clock.now_ms();
        let hits = self.sequence.record(step, now);
        let fired = !hits.is_empty();
        for hit in hits {
            self.fire(TrapType::Sequence, hit);
        }
        fired
    }

    pub fn steps(&self) -> Vec<String> {
        self.sequence.steps()
    }

    /// Issue a JS-execution challenge bound to `env`.
    pub fn issue_js_challenge(&mut self, env: &EnvironmentDescriptor) -> JsChallenge {
        self.js.issue(env)
    }

    /// Verify the answer to the outstanding challenge. Returns true on pass.
    pub fn verify_js(&mut self, token: &str) -> bool {
        match self.js.verify(token) {
            Verification::Passed => true,
            Verification::Mismatch(hit) => {
                self.fire(TrapType::JsExecution, hit);
                false
            }
            Verification::Expired => {
                debug!("JS challenge answered after expiry");
                false
            }
            Verification::NotIssued => false,
        }
    }

    pub fn record_mouse_movement(&mut self, x: f64, y: f64) {
        self.movement.record(x, y);
    }

    pub fn movement_count(&self) -> u32 {
        self.movement.count()
    }

    pub fn has_mouse_movement(&self) -> bool {
        self.movement.has_movement()
    }

    /// Check a click against its target. Returns true if it looked scripted.
    pub fn check_click(&mut self, x: f64, y: f64, target: Option<&TargetRect>) -> bool {
        match self.clicks.check(x, y, target) {
            Some(hit) => {
                self.fire(TrapType::ClickPosition, hit);
                true
            }
            None => false,
        }
    }

    /// Clear all trap state and rotate per-session tokens.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone(), self.clock.clone());
    }
}
