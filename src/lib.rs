//! Shield: per-session bot/human classification
//!
//! Fuses several independent signals into one verdict that never fails to
//! resolve.
//!
//! # Signals
//!
//! - Temporal entropy of interaction timing
//! - Rendering backend fingerprint from a timed micro-benchmark
//! - Honeypot traps invisible to people (decoy field, invisible link, timing,
//!   navigation sequence, JS execution, click placement)
//! - Pointer movement as a behavioral signal
//!
//! # Example
//!
//! ```ignore
//! use shield_bot_detection::{Environment, InputEvent, Shield, ShieldConfig};
//!
//! let mut shield = Shield::new(ShieldConfig::default(), Environment::headless());
//! shield.initialize();
//! shield.handle_input(InputEvent::PointerMove { x: 120.0, y: 48.0 });
//!
//! let verdict = shield.analyze().await;
//! println!("{} ({})", verdict.verdict, verdict.confidence);
//! ```

pub mod clock;
pub mod config;
pub mod detectors;
pub mod environment;
pub mod error;
pub mod registry;
pub mod replay;
pub mod score;
pub mod shield;
pub mod traps;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::ShieldConfig;
pub use environment::{Capabilities, Environment, EnvironmentDescriptor};
pub use error::ShieldError;
pub use registry::SessionRegistry;
pub use score::{CategoryScores, QuickVerdict, Verdict, VerdictKind};
pub use shield::{InputEvent, Lifecycle, Shield};
pub use traps::{HoneypotState, TrapEvent, TrapType};
