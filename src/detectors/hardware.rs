//! Rendering backend fingerprinting.
//!
//! Identifies the graphics stack behind a session:
//! - Vendor/renderer strings against known software and virtualization
//!   signatures
//! - A timed micro-benchmark whose per-iteration cost forms a timing
//!   signature
//!
//! Emulated backends are either too slow, too fast (calls not executing) or
//! unnaturally uniform.

use super::{clamp_confidence, TimingStats};
use crate::clock::{Clock, MonotonicClock};
use crate::config::HardwareConfig;
use crate::error::ShieldError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// Software rasterizers that stand in for a GPU.
static SOFTWARE_RENDERERS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"(?i)swiftshader").unwrap(), "swiftshader"),
        (Regex::new(r"(?i)llvmpipe").unwrap(), "llvmpipe"),
        (Regex::new(r"(?i)softpipe").unwrap(), "softpipe"),
        (Regex::new(r"(?i)lavapipe").unwrap(), "lavapipe"),
        (Regex::new(r"(?i)software rasterizer").unwrap(), "software_rasterizer"),
        (Regex::new(r"(?i)microsoft basic render").unwrap(), "microsoft_basic_render"),
        (Regex::new(r"(?i)apple software renderer").unwrap(), "apple_software"),
        (Regex::new(r"(?i)mesa offscreen").unwrap(), "mesa_offscreen"),
    ]
});

/// Virtual display adapters.
static VM_RENDERERS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"(?i)vmware").unwrap(), "vmware"),
        (Regex::new(r"(?i)virtualbox|vbox").unwrap(), "virtualbox"),
        (Regex::new(r"(?i)parallels").unwrap(), "parallels"),
        (Regex::new(r"(?i)qemu").unwrap(), "qemu"),
        (Regex::new(r"(?i)virgl").unwrap(), "virgl"),
        (Regex::new(r"(?i)virtio").unwrap(), "virtio"),
        (Regex::new(r"(?i)hyper-v").unwrap(), "hyper_v"),
        (Regex::new(r"(?i)bochs").unwrap(), "bochs"),
        (Regex::new(r"(?i)red hat|qxl").unwrap(), "qxl"),
        (Regex::new(r"(?i)citrix").unwrap(), "citrix"),
    ]
});

/// Capability limits reported by the rendering backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderLimits {
    pub max_texture_size: u32,
    pub max_renderbuffer_size: u32,
    pub max_viewport_width: u32,
    pub max_viewport_height: u32,
    pub max_vertex_attribs: u32,
}

/// An acquired rendering context.
pub trait RenderContext: Send {
    /// Unmasked vendor string, if the backend exposes one.
    fn vendor(&self) -> Option<String>;

    /// Unmasked renderer string, if the backend exposes one.
    fn renderer(&self) -> Option<String>;

    fn limits(&self) -> RenderLimits;

    /// Submit one fixed rendering operation.
    fn draw(&mut self) -> Result<(), ShieldError>;

    /// Block until all submitted work has executed.
    fn finish(&mut self) -> Result<(), ShieldError>;

    /// Give the context back to the backend. Called exactly once.
    fn release(&mut self);
}

/// Host capability that hands out rendering contexts.
pub trait RenderBackend: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn RenderContext>, ShieldError>;
}

/// Releases the context when dropped, on success, error and unwind alike.
struct ContextGuard {
    ctx: Box<dyn RenderContext>,
}

impl Deref for ContextGuard {
    type Target = dyn RenderContext;

    fn deref(&self) -> &Self::Target {
        self.ctx.as_ref()
    }
}

impl DerefMut for ContextGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx.as_mut()
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.ctx.release();
    }
}

/// Hardware fingerprint of a session. Computed once and cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareFingerprint {
    pub vendor: String,
    pub renderer: String,
    pub is_software_renderer: bool,
    pub is_virtual_machine: bool,

    /// Average per-iteration duration of each batch (ms)
    pub timing_signature: Vec<f64>,

    pub confidence: u8,

    #[serde(rename = "isRealGPU")]
    pub is_real_gpu: bool,

    pub anomalies: Vec<String>,

    /// Stable hash over vendor, renderer, limits and rounded timings
    pub hash: String,
}

/// Hardware probe result as seen by the fusion layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum HardwareStatus {
    /// Benchmark still running (or never started)
    #[default]
    Pending,
    Ready(HardwareFingerprint),
}

impl HardwareStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, HardwareStatus::Ready(_))
    }

    pub fn fingerprint(&self) -> Option<&HardwareFingerprint> {
        match self {
            HardwareStatus::Ready(fp) => Some(fp),
            HardwareStatus::Pending => None,
        }
    }
}

/// Outcome of analyzing a timing signature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingAnalysis {
    /// None when the signature is empty
    pub stats: Option<TimingStats>,
    pub anomalies: Vec<String>,
}

/// Rendering fingerprint generator.
#[derive(Clone)]
pub struct HardwareProbe {
    config: HardwareConfig,
    clock: Arc<dyn Clock>,
    extra_software: Vec<Regex>,
    extra_vm: Vec<Regex>,
}

impl HardwareProbe {
    /// Create a probe timing the benchmark with `clock`.
    pub fn new(config: HardwareConfig, clock: Arc<dyn Clock>) -> Self {
        let extra_software = Self::compile_signatures(&config.software_signatures);
        let extra_vm = Self::compile_signatures(&config.vm_signatures);
        Self {
            config,
            clock,
            extra_software,
            extra_vm,
        }
    }

    fn compile_signatures(signatures: &[String]) -> Vec<Regex> {
        signatures
            .iter()
            .filter(|s| !s.trim().is_empty())
            .filter_map(|s| Regex::new(&format!("(?i){}", regex::escape(s))).ok())
            .collect()
    }

    fn matches_software(&self, text: &str) -> Option<String> {
        SOFTWARE_RENDERERS
            .iter()
            .find(|(re, _)| re.is_match(text))
            .map(|(_, name)| name.to_string())
            .or_else(|| {
                self.extra_software
                    .iter()
                    .find(|re| re.is_match(text))
                    .map(|_| "custom".to_string())
            })
    }

    fn matches_vm(&self, text: &str) -> Option<String> {
        VM_RENDERERS
            .iter()
            .find(|(re, _)| re.is_match(text))
            .map(|(_, name)| name.to_string())
            .or_else(|| {
                self.extra_vm
                    .iter()
                    .find(|re| re.is_match(text))
                    .map(|_| "custom".to_string())
            })
    }

    /// Generate the fingerprint on a blocking worker.
    ///
    /// Never fails: a missing backend or a crashed benchmark degrades to a
    /// low-confidence fingerprint.
    pub async fn generate_fingerprint(
        &self,
        backend: Option<Arc<dyn RenderBackend>>,
    ) -> HardwareFingerprint {
        let probe = self.clone();
        match tokio::task::spawn_blocking(move || probe.probe_blocking(backend.as_deref())).await {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                warn!(error = %err, "Hardware probe task did not complete");
                let cause = ShieldError::SignalUnavailable(err.to_string());
                let mut fingerprint = self.unavailable(&cause);
                fingerprint.anomalies = vec!["probe-aborted".to_string()];
                fingerprint
            }
        }
    }

    /// Run the whole probe on the current thread.
    pub fn probe_blocking(&self, backend: Option<&dyn RenderBackend>) -> HardwareFingerprint {
        let Some(backend) = backend else {
            debug!("No rendering backend available");
            let cause = ShieldError::SignalUnavailable("no rendering backend".to_string());
            return self.unavailable(&cause);
        };

        let mut ctx = match backend.acquire() {
            Ok(ctx) => ContextGuard { ctx },
            Err(err) => {
                debug!(error = %err, "Could not acquire rendering context");
                return self.unavailable(&err);
            }
        };

        let vendor = ctx.vendor();
        let renderer = ctx.renderer();
        let limits = ctx.limits();

        let mut anomalies = Vec::new();
        let signature = match self.run_batches(&mut ctx) {
            Ok(signature) => signature,
            Err(err) => {
                debug!(error = %err, "Rendering benchmark failed");
                anomalies.push(err.anomaly().to_string());
                Vec::new()
            }
        };
        drop(ctx);

        self.assemble(vendor, renderer, &limits, signature, anomalies)
    }

    fn run_batches(&self, ctx: &mut ContextGuard) -> Result<Vec<f64>, ShieldError> {
        let iterations = self.config.iterations_per_batch.max(1);
        let mut signature = Vec::with_capacity(self.config.batches);

        for _ in 0..self.config.batches {
            let start = self.clock.now_ms();
            for _ in 0..iterations {
                ctx.draw()?;
            }
            // Sync point, so we time execution rather than queueing
            ctx.finish()?;
            let per_iteration = (self.clock.now_ms() - start) / iterations as f64;
            if !per_iteration.is_finite() {
                return Err(ShieldError::Render(format!(
                    "non-finite batch timing: {}",
                    per_iteration
                )));
            }
            signature.push(per_iteration);
        }

        Ok(signature)
    }

    /// Check a timing signature for emulation tells.
    pub fn analyze_timing(&self, signature: &[f64]) -> TimingAnalysis {
        let Some(stats) = TimingStats::from_samples(signature) else {
            return TimingAnalysis::default();
        };

        let mut anomalies = Vec::new();
        if stats.coefficient_of_variation < self.config.uniform_cv {
            anomalies.push("suspiciously-uniform-timing".to_string());
        }
        if stats.mean > self.config.slow_iteration_ms {
            anomalies.push("slow-rendering".to_string());
        }
        if stats.mean < self.config.fast_iteration_ms {
            anomalies.push("suspiciously-fast-timing".to_string());
        }

        TimingAnalysis {
            stats: Some(stats),
            anomalies,
        }
    }

    fn assemble(
        &self,
        vendor: Option<String>,
        renderer: Option<String>,
        limits: &RenderLimits,
        signature: Vec<f64>,
        mut anomalies: Vec<String>,
    ) -> HardwareFingerprint {
        let vendor = vendor.filter(|v| !v.trim().is_empty());
        let renderer = renderer.filter(|r| !r.trim().is_empty());
        let resolved = vendor.is_some() && renderer.is_some();
        let vendor = vendor.unwrap_or_else(|| "unknown".to_string());
        let renderer = renderer.unwrap_or_else(|| "unknown".to_string());

        let identity = format!("{} {}", vendor, renderer);
        let software = self.matches_software(&identity);
        let vm = self.matches_vm(&identity);
        if let Some(name) = &software {
            anomalies.push(format!("software-renderer:{}", name));
        }
        if let Some(name) = &vm {
            anomalies.push(format!("virtual-machine:{}", name));
        }

        let timing = self.analyze_timing(&signature);
        anomalies.extend(timing.anomalies);

        let mut confidence: f64 = 50.0;
        if software.is_some() {
            confidence -= 30.0;
        }
        if vm.is_some() {
            confidence -= 20.0;
        }
        if let Some(stats) = timing.stats {
            let cv = stats.coefficient_of_variation;
            if cv < 0.3 {
                confidence += 20.0;
            }
            if cv > 0.01 && cv < 0.2 {
                confidence += 15.0;
            }
        }
        if resolved {
            confidence += 15.0;
        }
        if anomalies.is_empty() {
            confidence += 10.0;
        }
        let confidence = clamp_confidence(confidence);

        let rounded: Vec<String> = signature.iter().map(|t| format!("{:.1}", t)).collect();
        let hash = digest_hex(&[
            &vendor,
            &renderer,
            &format!(
                "{}x{}x{}x{}x{}",
                limits.max_texture_size,
                limits.max_renderbuffer_size,
                limits.max_viewport_width,
                limits.max_viewport_height,
                limits.max_vertex_attribs
            ),
            &rounded.join(","),
        ]);

        debug!(
            vendor = %vendor,
            renderer = %renderer,
            software = software.is_some(),
            vm = vm.is_some(),
            confidence,
            "Hardware fingerprint complete"
        );

        HardwareFingerprint {
            is_real_gpu: software.is_none() && vm.is_none() && confidence >= 50,
            is_software_renderer: software.is_some(),
            is_virtual_machine: vm.is_some(),
            vendor,
            renderer,
            timing_signature: signature,
            confidence,
            anomalies,
            hash,
        }
    }

    /// Fingerprint reported when no rendering context could be used.
    /// Absence of capability is itself suspicious, hence the low confidence.
    /// `cause` adds its own anomaly tag when it is more specific.
    pub fn unavailable(&self, cause: &ShieldError) -> HardwareFingerprint {
        let mut anomalies = vec!["no-rendering-context".to_string()];
        if cause.anomaly() != "no-rendering-context" {
            anomalies.push(cause.anomaly().to_string());
        }
        HardwareFingerprint {
            vendor: "unknown".to_string(),
            renderer: "unknown".to_string(),
            is_software_renderer: false,
            is_virtual_machine: false,
            timing_signature: vec![],
            confidence: self.config.no_context_confidence.min(100),
            is_real_gpu: false,
            anomalies,
            hash: digest_hex(&["unavailable"]),
        }
    }
}

impl Default for HardwareProbe {
    fn default() -> Self {
        Self::new(HardwareConfig::default(), Arc::new(MonotonicClock::new()))
    }
}

/// Hex SHA-256 over `parts` joined with `|`, truncated to 32 characters.
pub(crate) fn digest_hex(parts: &[&str]) -> String {
    let digest = Sha256::digest(parts.join("|").as_bytes());
    hex::encode(&digest[..16])
}
