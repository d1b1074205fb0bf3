//! Per-session fusion engine.

use crate::config::ShieldConfig;
use crate::detectors::hardware::digest_hex;
use crate::detectors::{
    clamp_confidence, EntropyResult, EventPayload, EventRecorder, HardwareProbe, HardwareStatus,
    InteractionKind, KeyPhase, Point, RenderBackend,
};
use crate::environment::{Capabilities, Environment, EnvironmentDescriptor};
use crate::score::{
    BehaviorSignals, CategoryScores, QuickVerdict, ScoreCalculator, Verdict, VerdictKind,
};
use crate::traps::{
    HoneypotState, JsChallenge, TargetRect, TrapHost, TrapRegistry, TrapType, PAGE_INTERACTION,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Session fingerprint namespace.
pub const FINGERPRINT_PREFIX: &str = "shield_";

const FINGERPRINT_HEX_LEN: usize = 16;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Uninitialized,
    /// Input wired, hardware probe still in flight
    Initializing,
    Armed,
}

/// Raw input from the host page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InputEvent {
    KeyDown {
        key: String,
    },
    KeyUp {
        key: String,
    },
    PointerMove {
        x: f64,
        y: f64,
    },
    Click {
        x: f64,
        y: f64,
        #[serde(default)]
        button: u8,
        #[serde(default)]
        target: Option<TargetRect>,
    },
    Scroll {
        y: f64,
    },
    Touch {
        x: f64,
        y: f64,
    },
}

/// Bot/human classification engine for one session.
pub struct Shield {
    config: ShieldConfig,
    descriptor: EnvironmentDescriptor,
    capabilities: Capabilities,
    render: Option<Arc<dyn RenderBackend>>,
    host: Option<Box<dyn TrapHost>>,
    recorder: EventRecorder,
    probe: HardwareProbe,
    traps: TrapRegistry,
    scorer: ScoreCalculator,
    initialized: bool,
    hardware_tx: Arc<watch::Sender<HardwareStatus>>,
    hardware_rx: watch::Receiver<HardwareStatus>,
    probe_task: Option<JoinHandle<()>>,
    /// Degraded capabilities noticed during initialization
    degraded: Vec<String>,
}

impl Shield {
    pub fn new(config: ShieldConfig, env: Environment) -> Self {
        let capabilities = env.capabilities();
        let Environment {
            descriptor,
            render,
            host,
            clock,
            benchmark_clock,
        } = env;

        let benchmark_clock = benchmark_clock.unwrap_or_else(|| clock.clone());
        let (hardware_tx, hardware_rx) = watch::channel(HardwareStatus::Pending);

        Self {
            recorder: EventRecorder::new(config.entropy.clone(), clock.clone()),
            probe: HardwareProbe::new(config.hardware.clone(), benchmark_clock),
            traps: TrapRegistry::new(config.traps.clone(), clock.clone()),
            scorer: ScoreCalculator::from_config(&config),
            config,
            descriptor,
            capabilities,
            render,
            host,
            initialized: false,
            hardware_tx: Arc::new(hardware_tx),
            hardware_rx,
            probe_task: None,
            degraded: Vec::new(),
        }
    }

    /// Shield with default configuration and no host capabilities.
    pub fn headless() -> Self {
        Self::new(ShieldConfig::default(), Environment::headless())
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn lifecycle(&self) -> Lifecycle {
        if !self.initialized {
            Lifecycle::Uninitialized
        } else if self.hardware_rx.borrow().is_ready() {
            Lifecycle::Armed
        } else {
            Lifecycle::Initializing
        }
    }

    /// Arm traps and start the hardware probe. Idempotent.
    ///
    /// Inside a tokio runtime the probe runs on a blocking worker; without
    /// one it runs inline before returning.
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        if let Some(host) = self.host.as_deref_mut() {
            let field = self.traps.arm_hidden_field(host);
            let link = self.traps.arm_invisible_link(host);
            if !(field && link) {
                warn!(
                    hidden_field = field,
                    invisible_link = link,
                    "Decoys could not be mounted"
                );
                self.degraded.push("trap-injection-failed".to_string());
            }
        } else {
            debug!("No trap host; decoys not mounted");
        }

        self.traps
            .start_timing(PAGE_INTERACTION, self.config.traps.interaction_floor_ms);

        if self.render.is_none() {
            warn!("No rendering backend; hardware signal degraded");
        }

        let probe = self.probe.clone();
        let backend = self.render.clone();
        let tx = self.hardware_tx.clone();
        match Handle::try_current() {
            Ok(handle) => {
                self.probe_task = Some(handle.spawn(async move {
                    let fingerprint = probe.generate_fingerprint(backend).await;
                    tx.send_replace(HardwareStatus::Ready(fingerprint));
                }));
            }
            Err(_) => {
                debug!("No async runtime; running hardware probe inline");
                let fingerprint = probe.probe_blocking(backend.as_deref());
                tx.send_replace(HardwareStatus::Ready(fingerprint));
            }
        }

        info!(
            rendering = self.capabilities.rendering,
            trap_host = self.capabilities.trap_host,
            "Shield initialized"
        );
    }

    /// Feed one input event. Ignored before `initialize()`.
    pub fn handle_input(&mut self, event: InputEvent) {
        if !self.initialized {
            return;
        }

        match event {
            InputEvent::KeyDown { key } => {
                self.recorder.record_keystroke(&key, KeyPhase::Down);
                self.complete_page_interaction();
            }
            InputEvent::KeyUp { key } => self.recorder.record_keystroke(&key, KeyPhase::Up),
            InputEvent::PointerMove { x, y } => {
                self.recorder.record_mouse_move(x, y);
                self.traps.record_mouse_movement(x, y);
            }
            InputEvent::Click {
                x,
                y,
                button,
                target,
            } => {
                self.recorder.record_click(x, y, button);
                self.complete_page_interaction();
                self.traps.check_click(x, y, target.as_ref());
            }
            InputEvent::Scroll { y } => self.recorder.record_scroll(y),
            InputEvent::Touch { x, y } => {
                self.recorder.record_event(
                    InteractionKind::Touch,
                    EventPayload {
                        coordinates: Some(Point::new(x, y)),
                        ..Default::default()
                    },
                );
            }
        }
    }

    fn complete_page_interaction(&mut self) {
        if self.traps.timing_pending(PAGE_INTERACTION) {
            self.traps.check_timing(PAGE_INTERACTION);
        }
    }

    /// Record a navigation step for the sequence trap.
    pub fn record_navigation(&mut self, step: &str) -> bool {
        self.traps.record_step(step)
    }

    /// Start a named timing trap with its own floor.
    pub fn start_action(&mut self, action: &str, min_ms: f64) {
        self.traps.start_timing(action, min_ms);
    }

    /// Complete a named timing trap. Returns true if it fired.
    pub fn complete_action(&mut self, action: &str) -> bool {
        self.traps.check_timing(action)
    }

    /// Read the decoy field back through the host, if one is mounted.
    pub fn check_hidden_field(&mut self) -> bool {
        match self.host.as_deref() {
            Some(host) => self.traps.check_hidden_field(host),
            None => false,
        }
    }

    /// Check a submitted value of the decoy field (server-side forms).
    pub fn check_hidden_field_value(&mut self, value: Option<&str>) -> bool {
        self.traps.check_hidden_field_value(value)
    }

    /// Name of the decoy form field.
    pub fn hidden_field_name(&self) -> &str {
        self.traps.hidden_field().name()
    }

    /// Endpoint path of this session's invisible link.
    pub fn link_path(&self) -> String {
        self.traps.invisible_link().path()
    }

    pub fn link_token(&self) -> &str {
        self.traps.invisible_link().token()
    }

    /// Report a request for the invisible-link endpoint.
    pub fn report_link_hit(&mut self, path: &str) -> bool {
        self.traps.report_link_hit(path)
    }

    /// Issue a JS-execution challenge bound to this session's environment.
    pub fn issue_js_challenge(&mut self) -> JsChallenge {
        self.traps.issue_js_challenge(&self.descriptor)
    }

    pub fn verify_js(&mut self, token: &str) -> bool {
        self.traps.verify_js(token)
    }

    pub fn honeypot(&self) -> &HoneypotState {
        self.traps.state()
    }

    pub fn event_count(&self) -> usize {
        self.recorder.event_count()
    }

    pub fn entropy(&self) -> EntropyResult {
        self.recorder.analyze()
    }

    pub fn hardware_status(&self) -> HardwareStatus {
        self.hardware_rx.borrow().clone()
    }

    /// Wait for the hardware probe. Returns immediately when it was never
    /// started.
    pub async fn await_hardware(&self) -> HardwareStatus {
        if !self.initialized {
            return self.hardware_status();
        }
        let mut rx = self.hardware_rx.clone();
        let status = match rx.wait_for(HardwareStatus::is_ready).await {
            Ok(status) => (*status).clone(),
            Err(_) => self.hardware_status(),
        };
        status
    }

    /// Fuse every signal into a verdict. Never fails; a pending hardware
    /// probe contributes the baseline score.
    pub async fn analyze(&self) -> Verdict {
        let entropy = self.recorder.analyze();
        let hardware = self.hardware_status();
        let honeypot = self.traps.state().clone();

        let behavior = BehaviorSignals::new(
            self.traps.movement_count(),
            self.recorder.event_count(),
            &honeypot,
        );

        let scores = CategoryScores {
            temporal: self.scorer.temporal(&entropy),
            hardware: self.scorer.hardware(&hardware),
            behavioral: self.scorer.behavioral(&behavior),
            honeypot: self.scorer.honeypot(&honeypot),
        };
        let overall = self.scorer.overall(&scores);
        let interacted = entropy.confidence > 0 || behavior.movement_count > 0;
        let (verdict, confidence) = self.scorer.decide(overall, &honeypot, interacted);

        debug!(
            temporal = scores.temporal,
            hardware = scores.hardware,
            behavioral = scores.behavioral,
            honeypot = scores.honeypot,
            overall,
            "Category scores"
        );

        let mut anomalies = self.collect_anomalies(&entropy, &hardware, &behavior, &honeypot);
        if !interacted {
            anomalies.push("behavior:no-interaction".to_string());
        }
        let fingerprint = self.fingerprint(&entropy, &hardware);

        info!(
            verdict = verdict.as_str(),
            confidence,
            overall,
            events = behavior.event_count,
            traps = honeypot.traps_triggered.len(),
            "Session analyzed"
        );

        Verdict {
            is_human: verdict == VerdictKind::Human,
            confidence,
            verdict,
            entropy,
            hardware: hardware.fingerprint().cloned(),
            honeypot,
            scores,
            anomalies,
            fingerprint,
            analyzed_at: unix_millis(),
        }
    }

    fn collect_anomalies(
        &self,
        entropy: &EntropyResult,
        hardware: &HardwareStatus,
        behavior: &BehaviorSignals,
        honeypot: &HoneypotState,
    ) -> Vec<String> {
        let mut anomalies: Vec<String> = entropy
            .anomalies
            .iter()
            .map(|a| format!("entropy:{}", a))
            .collect();

        match hardware.fingerprint() {
            Some(fp) => anomalies.extend(fp.anomalies.iter().map(|a| format!("gpu:{}", a))),
            None => anomalies.push("gpu:probe-pending".to_string()),
        }

        let cfg = &self.config.behavior;
        if behavior.movement_count == 0 && behavior.event_count >= cfg.no_movement_min_events {
            anomalies.push("behavior:no-pointer-movement".to_string());
        }
        if behavior.timing_violations > 0 {
            anomalies.push("behavior:timing-violation".to_string());
        }
        if behavior.sequence_violations > 0 {
            anomalies.push("behavior:sequence-violation".to_string());
        }

        let mut seen: Vec<TrapType> = Vec::new();
        for event in &honeypot.traps_triggered {
            if !seen.contains(&event.trap_type) {
                seen.push(event.trap_type);
                anomalies.push(format!("honeypot:{}", event.trap_type.as_str()));
            }
        }
        anomalies.extend(self.degraded.iter().map(|a| format!("honeypot:{}", a)));

        anomalies
    }

    /// Stable session fingerprint over hardware, timing summary and
    /// environment.
    pub fn fingerprint(&self, entropy: &EntropyResult, hardware: &HardwareStatus) -> String {
        let hardware_hash = hardware.fingerprint().map_or("pending", |fp| fp.hash.as_str());
        let digest = digest_hex(&[
            hardware_hash,
            &format!("{:.4}", entropy.entropy),
            &format!("{:.4}", entropy.stats.coefficient_of_variation),
            &self.descriptor.summary(),
        ]);
        format!("{}{}", FINGERPRINT_PREFIX, &digest[..FINGERPRINT_HEX_LEN])
    }

    /// Synchronous fast path over cached signals.
    pub fn quick_check(&self) -> QuickVerdict {
        let cfg = &self.config.quick_check;
        let honeypot = self.traps.state();

        if honeypot.has_triggered() {
            return QuickVerdict {
                is_human: false,
                verdict: VerdictKind::Bot,
                confidence: cfg.bot_confidence.min(100),
            };
        }

        let events = self.recorder.event_count();
        let hardware = self.hardware_status();

        let mut score = 0.0;
        if self.traps.has_mouse_movement() {
            score += f64::from(cfg.movement_points);
        }
        let saturation = cfg.event_saturation.max(1) as f64;
        score += f64::from(cfg.event_points) * (events as f64 / saturation).min(1.0);
        if hardware.fingerprint().is_some_and(|fp| fp.is_real_gpu) {
            score += f64::from(cfg.hardware_points);
        }
        let score = score.clamp(0.0, 100.0);

        let (verdict, confidence) = if score >= f64::from(cfg.threshold) {
            (VerdictKind::Human, score)
        } else if events == 0 && !hardware.is_ready() {
            (VerdictKind::Unknown, 0.0)
        } else {
            (VerdictKind::Suspicious, 100.0 - score)
        };

        QuickVerdict {
            is_human: verdict == VerdictKind::Human,
            verdict,
            confidence: clamp_confidence(confidence),
        }
    }

    /// Clear all session state and return to `Uninitialized`. Abandons an
    /// in-flight hardware probe and rotates the invisible-link token.
    pub fn reset(&mut self) {
        if let Some(task) = self.probe_task.take() {
            task.abort();
        }
        let (tx, rx) = watch::channel(HardwareStatus::Pending);
        self.hardware_tx = Arc::new(tx);
        self.hardware_rx = rx;

        self.recorder.clear();
        if let Some(host) = self.host.as_deref_mut() {
            self.traps.disarm_decoys(host);
        }
        self.traps.reset();
        self.degraded.clear();
        self.initialized = false;

        info!("Shield reset");
    }
}

impl Drop for Shield {
    fn drop(&mut self) {
        if let Some(task) = self.probe_task.take() {
            task.abort();
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
