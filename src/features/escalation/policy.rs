//! # Escalation Policies
//!
//! Declarative, relative-time alert plans. A policy is an ordered list of
//! steps; each step's delay is measured from the reminder's trigger instant.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Fail-closed decoding of step kinds
//! - 1.0.0: Initial release with the four canonical presets

use crate::core::ValidationError;
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How loudly a step alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    /// Standard push notification
    Push,
    /// Time-sensitive alert with a loud sound
    Alarm,
}

impl AlertKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            AlertKind::Push => "Push notification",
            AlertKind::Alarm => "Alarm",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::Push => write!(f, "push"),
            AlertKind::Alarm => write!(f, "alarm"),
        }
    }
}

impl std::str::FromStr for AlertKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "push" => Ok(AlertKind::Push),
            "alarm" => Ok(AlertKind::Alarm),
            _ => Err(ValidationError::UnknownAlertKind(s.to_string())),
        }
    }
}

/// One step of an escalation policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationStep {
    pub kind: AlertKind,

    /// Offset from the trigger instant (cumulative, not from the previous step)
    pub delay_minutes: i64,

    /// If set, the step repeats at this interval until the expansion cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_interval_minutes: Option<i64>,
}

impl EscalationStep {
    pub fn new(kind: AlertKind, delay_minutes: i64) -> Self {
        EscalationStep {
            kind,
            delay_minutes,
            repeat_interval_minutes: None,
        }
    }

    pub fn repeating(kind: AlertKind, delay_minutes: i64, interval_minutes: i64) -> Self {
        EscalationStep {
            kind,
            delay_minutes,
            repeat_interval_minutes: Some(interval_minutes),
        }
    }

    pub fn push(delay_minutes: i64) -> Self {
        Self::new(AlertKind::Push, delay_minutes)
    }

    pub fn alarm(delay_minutes: i64) -> Self {
        Self::new(AlertKind::Alarm, delay_minutes)
    }

    /// Check a single step; `index` is only used for the error message
    pub fn validate(&self, index: usize) -> Result<(), ValidationError> {
        if self.delay_minutes < 0 {
            return Err(ValidationError::NegativeDelay {
                index,
                delay: self.delay_minutes,
            });
        }
        if let Some(interval) = self.repeat_interval_minutes {
            if interval < 1 {
                return Err(ValidationError::InvalidRepeatInterval { index, interval });
            }
        }
        Ok(())
    }

    /// Human-readable summary, e.g. "Alarm every 30 min after 150 min"
    pub fn describe(&self) -> String {
        let name = self.kind.display_name();
        match (self.delay_minutes, self.repeat_interval_minutes) {
            (0, None) => format!("{name} at reminder time"),
            (0, Some(interval)) => format!("{name} every {interval} min from reminder time"),
            (delay, Some(interval)) => format!("{name} every {interval} min after {delay} min"),
            (delay, None) => format!("{name} after {delay} min"),
        }
    }
}

/// A named, ordered escalation plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub id: Uuid,
    pub name: String,
    pub steps: Vec<EscalationStep>,
    pub is_preset: bool,
}

pub const PRESET_GENTLE: &str = "Gentle";
pub const PRESET_STANDARD: &str = "Standard";
pub const PRESET_URGENT: &str = "Urgent";
pub const PRESET_NUCLEAR: &str = "Nuclear";

impl EscalationPolicy {
    /// Create a validated custom (non-preset) policy
    pub fn new(name: impl Into<String>, steps: Vec<EscalationStep>) -> Result<Self, ValidationError> {
        let policy = EscalationPolicy {
            id: Uuid::new_v4(),
            name: name.into(),
            steps,
            is_preset: false,
        };
        policy.validate()?;
        Ok(policy)
    }

    fn preset(name: &str, steps: Vec<EscalationStep>) -> Self {
        EscalationPolicy {
            id: Uuid::new_v4(),
            name: name.to_string(),
            steps,
            is_preset: true,
        }
    }

    /// Steps are caller-ordered and never sorted here; a decreasing delay is
    /// allowed but logged.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyPolicyName);
        }
        if self.steps.is_empty() {
            return Err(ValidationError::EmptyPolicy(self.name.clone()));
        }
        for (index, step) in self.steps.iter().enumerate() {
            step.validate(index)?;
        }
        if self
            .steps
            .windows(2)
            .any(|pair| pair[1].delay_minutes < pair[0].delay_minutes)
        {
            warn!(
                "Escalation policy '{}' has decreasing step delays; steps fire in listed order",
                self.name
            );
        }
        Ok(())
    }

    pub fn gentle() -> Self {
        Self::preset(
            PRESET_GENTLE,
            vec![
                EscalationStep::push(0),
                EscalationStep::push(120),
                EscalationStep::push(240),
            ],
        )
    }

    pub fn standard() -> Self {
        Self::preset(
            PRESET_STANDARD,
            vec![
                EscalationStep::push(0),
                EscalationStep::push(60),
                EscalationStep::alarm(120),
                EscalationStep::repeating(AlertKind::Alarm, 150, 30),
            ],
        )
    }

    pub fn urgent() -> Self {
        Self::preset(
            PRESET_URGENT,
            vec![
                EscalationStep::push(0),
                EscalationStep::alarm(15),
                EscalationStep::repeating(AlertKind::Alarm, 25, 10),
            ],
        )
    }

    pub fn nuclear() -> Self {
        Self::preset(
            PRESET_NUCLEAR,
            vec![
                EscalationStep::alarm(0),
                EscalationStep::repeating(AlertKind::Alarm, 5, 5),
            ],
        )
    }

    pub fn presets() -> Vec<EscalationPolicy> {
        vec![
            Self::gentle(),
            Self::standard(),
            Self::urgent(),
            Self::nuclear(),
        ]
    }

    pub fn is_preset_name(name: &str) -> bool {
        [PRESET_GENTLE, PRESET_STANDARD, PRESET_URGENT, PRESET_NUCLEAR]
            .iter()
            .any(|preset| preset.eq_ignore_ascii_case(name))
    }

    /// Persisted form of the step list (order-preserving JSON array)
    pub fn encode_steps(steps: &[EscalationStep]) -> serde_json::Result<String> {
        serde_json::to_string(steps)
    }

    pub fn decode_steps(raw: &str) -> serde_json::Result<Vec<EscalationStep>> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid_and_flagged() {
        let presets = EscalationPolicy::presets();
        assert_eq!(presets.len(), 4);
        for preset in &presets {
            assert!(preset.is_preset);
            assert!(preset.validate().is_ok(), "{} should validate", preset.name);
        }
        let names: Vec<&str> = presets.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Gentle", "Standard", "Urgent", "Nuclear"]);
    }

    #[test]
    fn test_standard_preset_shape() {
        let standard = EscalationPolicy::standard();
        let delays: Vec<i64> = standard.steps.iter().map(|s| s.delay_minutes).collect();
        assert_eq!(delays, vec![0, 60, 120, 150]);
        assert_eq!(standard.steps[3].repeat_interval_minutes, Some(30));
        assert_eq!(standard.steps[2].kind, AlertKind::Alarm);
    }

    #[test]
    fn test_negative_delay_rejected() {
        let result = EscalationPolicy::new("Broken", vec![EscalationStep::push(-1)]);
        assert_eq!(
            result.unwrap_err(),
            ValidationError::NegativeDelay { index: 0, delay: -1 }
        );
    }

    #[test]
    fn test_zero_repeat_interval_rejected() {
        let result = EscalationPolicy::new(
            "Broken",
            vec![
                EscalationStep::push(0),
                EscalationStep::repeating(AlertKind::Alarm, 10, 0),
            ],
        );
        assert_eq!(
            result.unwrap_err(),
            ValidationError::InvalidRepeatInterval { index: 1, interval: 0 }
        );
    }

    #[test]
    fn test_empty_policy_rejected() {
        assert!(matches!(
            EscalationPolicy::new("Nothing", vec![]),
            Err(ValidationError::EmptyPolicy(_))
        ));
        assert_eq!(
            EscalationPolicy::new("  ", vec![EscalationStep::push(0)]).unwrap_err(),
            ValidationError::EmptyPolicyName
        );
    }

    #[test]
    fn test_decreasing_delays_are_allowed() {
        let policy = EscalationPolicy::new(
            "Backwards",
            vec![EscalationStep::push(60), EscalationStep::push(0)],
        );
        assert!(policy.is_ok());
    }

    #[test]
    fn test_step_descriptions() {
        assert_eq!(
            EscalationStep::push(0).describe(),
            "Push notification at reminder time"
        );
        assert_eq!(EscalationStep::alarm(15).describe(), "Alarm after 15 min");
        assert_eq!(
            EscalationStep::repeating(AlertKind::Alarm, 150, 30).describe(),
            "Alarm every 30 min after 150 min"
        );
    }

    #[test]
    fn test_steps_encoding_preserves_order() {
        let steps = EscalationPolicy::urgent().steps;
        let raw = EscalationPolicy::encode_steps(&steps).unwrap();
        assert!(raw.contains("\"alarm\""));
        assert_eq!(EscalationPolicy::decode_steps(&raw).unwrap(), steps);
    }

    #[test]
    fn test_unknown_kind_fails_closed() {
        assert!("siren".parse::<AlertKind>().is_err());
        assert!(EscalationPolicy::decode_steps(r#"[{"kind":"siren","delay_minutes":0}]"#).is_err());
        assert_eq!("ALARM".parse::<AlertKind>().unwrap(), AlertKind::Alarm);
    }

    #[test]
    fn test_preset_name_lookup() {
        assert!(EscalationPolicy::is_preset_name("standard"));
        assert!(!EscalationPolicy::is_preset_name("Bedtime"));
    }
}
