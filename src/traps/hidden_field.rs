//! Off-screen decoy form field.
//!
//! Positioned outside the viewport rather than `display:none`, which naive
//! scrapers check for. The autocomplete hint baits form-filling bots.

use super::{Decoy, TrapHit, TrapHost};
use crate::error::ShieldError;

/// Confidence of a filled decoy field.
pub const HIDDEN_FIELD_CONFIDENCE: u8 = 80;

const OFFSCREEN_STYLE: &str =
    "position:absolute;left:-10000px;top:auto;width:1px;height:1px;overflow:hidden";

/// Markup description of the decoy field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoyField {
    pub name: String,
    pub autocomplete: String,
    pub style: &'static str,
}

impl DecoyField {
    /// Render as an `<input>` the host can inject.
    pub fn to_html(&self) -> String {
        format!(
            r#"<input type="text" name="{}" autocomplete="{}" tabindex="-1" aria-hidden="true" style="{}" value="">"#,
            escape_attr(&self.name),
            escape_attr(&self.autocomplete),
            self.style
        )
    }
}

pub(crate) fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Hidden-field trap.
#[derive(Debug, Clone)]
pub struct HiddenFieldTrap {
    field: DecoyField,
    armed: bool,
    fired: bool,
}

impl HiddenFieldTrap {
    pub fn new(name: &str, autocomplete: &str) -> Self {
        Self {
            field: DecoyField {
                name: name.to_string(),
                autocomplete: autocomplete.to_string(),
                style: OFFSCREEN_STYLE,
            },
            armed: false,
            fired: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.field.name
    }

    pub fn decoy(&self) -> &DecoyField {
        &self.field
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Mount the field. On failure the trap stays unarmed.
    pub fn arm(&mut self, host: &mut dyn TrapHost) -> Result<(), ShieldError> {
        if self.armed {
            return Ok(());
        }
        host.mount(&Decoy::Field(self.field.clone()))?;
        self.armed = true;
        Ok(())
    }

    pub fn disarm(&mut self, host: &mut dyn TrapHost) -> Result<(), ShieldError> {
        if !self.armed {
            return Ok(());
        }
        host.unmount(&Decoy::Field(self.field.clone()))?;
        self.armed = false;
        Ok(())
    }

    /// Fires once, on the first non-empty value.
    pub fn check(&mut self, value: Option<&str>) -> Option<TrapHit> {
        if self.fired {
            return None;
        }
        let value = value.filter(|v| !v.is_empty())?;
        self.fired = true;
        Some(TrapHit::new(
            HIDDEN_FIELD_CONFIDENCE,
            format!(
                "decoy field `{}` filled ({} chars)",
                self.field.name,
                value.chars().count()
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RefusingHost;

    impl TrapHost for RefusingHost {
        fn mount(&mut self, _decoy: &Decoy) -> Result<(), ShieldError> {
            Err(ShieldError::TrapInjection("document not ready".into()))
        }

        fn unmount(&mut self, _decoy: &Decoy) -> Result<(), ShieldError> {
            Ok(())
        }

        fn field_value(&self, _name: &str) -> Option<String> {
            None
        }
    }

    #[derive(Default)]
    struct RecordingHost {
        mounted: Vec<Decoy>,
    }

    impl TrapHost for RecordingHost {
        fn mount(&mut self, decoy: &Decoy) -> Result<(), ShieldError> {
            self.mounted.push(decoy.clone());
            Ok(())
        }

        fn unmount(&mut self, decoy: &Decoy) -> Result<(), ShieldError> {
            self.mounted.retain(|d| d != decoy);
            Ok(())
        }

        fn field_value(&self, _name: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_offscreen_not_display_none() {
        let trap = HiddenFieldTrap::new("website", "url");
        let html = trap.decoy().to_html();
        assert!(html.contains("left:-10000px"));
        assert!(!html.contains("display:none"));
        assert!(html.contains(r#"autocomplete="url""#));
        assert!(html.contains(r#"tabindex="-1""#));
    }

    #[test]
    fn test_escaping() {
        let trap = HiddenFieldTrap::new(r#"x" onfocus="y"#, "email");
        assert!(trap.decoy().to_html().contains("x&quot; onfocus=&quot;y"));
    }

    #[test]
    fn test_arm_failure_leaves_unarmed() {
        let mut trap = HiddenFieldTrap::new("website", "url");
        let err = trap.arm(&mut RefusingHost).unwrap_err();
        assert_eq!(err.anomaly(), "trap-injection-failed");
        assert!(!trap.is_armed());
    }

    #[test]
    fn test_arm_once() {
        let mut trap = HiddenFieldTrap::new("website", "url");
        let mut host = RecordingHost::default();
        trap.arm(&mut host).unwrap();
        trap.arm(&mut host).unwrap();
        assert!(trap.is_armed());
        assert_eq!(host.mounted.len(), 1);
    }

    #[test]
    fn test_disarm_removes_decoy() {
        let mut trap = HiddenFieldTrap::new("website", "url");
        let mut host = RecordingHost::default();
        trap.disarm(&mut host).unwrap();
        trap.arm(&mut host).unwrap();
        trap.disarm(&mut host).unwrap();
        assert!(!trap.is_armed());
        assert!(host.mounted.is_empty());
    }

    #[test]
    fn test_fires_once_on_any_value() {
        let mut trap = HiddenFieldTrap::new("website", "url");
        assert!(trap.check(None).is_none());
        assert!(trap.check(Some("")).is_none());

        let hit = trap.check(Some(" ")).unwrap();
        assert_eq!(hit.confidence, 80);
        assert!(hit.details.contains("website"));
        assert!(trap.check(Some("again")).is_none());
    }
}
