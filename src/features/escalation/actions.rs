//! Alert responses delivered to the engine over a command channel.

use crate::core::ValidationError;
use crate::features::escalation::snooze::SnoozeOption;
use uuid::Uuid;

pub const FIRED_ACTION_ID: &str = "FIRED";
pub const COMPLETE_ACTION_ID: &str = "COMPLETE_ACTION";
pub const IGNORE_ACTION_ID: &str = "IGNORE_ACTION";
pub const SNOOZE_1_HOUR_ACTION_ID: &str = "SNOOZE_1_HOUR_ACTION";
pub const SNOOZE_3_HOURS_ACTION_ID: &str = "SNOOZE_3_HOURS_ACTION";
pub const SNOOZE_EVENING_ACTION_ID: &str = "SNOOZE_EVENING_ACTION";
pub const SNOOZE_TOMORROW_ACTION_ID: &str = "SNOOZE_TOMORROW_ACTION";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertAction {
    /// The alert went off (or was tapped without choosing an action)
    Fired,
    Complete,
    Ignore,
    Snooze(SnoozeOption),
}

impl AlertAction {
    pub fn identifier(&self) -> &'static str {
        match self {
            AlertAction::Fired => FIRED_ACTION_ID,
            AlertAction::Complete => COMPLETE_ACTION_ID,
            AlertAction::Ignore => IGNORE_ACTION_ID,
            AlertAction::Snooze(SnoozeOption::OneHour) => SNOOZE_1_HOUR_ACTION_ID,
            AlertAction::Snooze(SnoozeOption::ThreeHours) => SNOOZE_3_HOURS_ACTION_ID,
            AlertAction::Snooze(SnoozeOption::UntilEvening) => SNOOZE_EVENING_ACTION_ID,
            AlertAction::Snooze(SnoozeOption::UntilTomorrow) => SNOOZE_TOMORROW_ACTION_ID,
        }
    }
}

impl std::str::FromStr for AlertAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            FIRED_ACTION_ID => Ok(AlertAction::Fired),
            COMPLETE_ACTION_ID => Ok(AlertAction::Complete),
            IGNORE_ACTION_ID => Ok(AlertAction::Ignore),
            SNOOZE_1_HOUR_ACTION_ID => Ok(AlertAction::Snooze(SnoozeOption::OneHour)),
            SNOOZE_3_HOURS_ACTION_ID => Ok(AlertAction::Snooze(SnoozeOption::ThreeHours)),
            SNOOZE_EVENING_ACTION_ID => Ok(AlertAction::Snooze(SnoozeOption::UntilEvening)),
            SNOOZE_TOMORROW_ACTION_ID => Ok(AlertAction::Snooze(SnoozeOption::UntilTomorrow)),
            _ => Err(ValidationError::UnknownAction(s.to_string())),
        }
    }
}

/// A response to one alert, addressed to the reminder that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertCommand {
    pub reminder_id: Uuid,
    pub step_index: usize,
    pub action: AlertAction,
}

impl AlertCommand {
    pub fn from_identifier(
        reminder_id: Uuid,
        step_index: usize,
        identifier: &str,
    ) -> Result<Self, ValidationError> {
        Ok(AlertCommand {
            reminder_id,
            step_index,
            action: identifier.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_roundtrip() {
        let actions = [
            AlertAction::Fired,
            AlertAction::Complete,
            AlertAction::Ignore,
            AlertAction::Snooze(SnoozeOption::OneHour),
            AlertAction::Snooze(SnoozeOption::ThreeHours),
            AlertAction::Snooze(SnoozeOption::UntilEvening),
            AlertAction::Snooze(SnoozeOption::UntilTomorrow),
        ];
        for action in actions {
            assert_eq!(action.identifier().parse::<AlertAction>().unwrap(), action);
        }
    }

    #[test]
    fn test_unknown_identifier() {
        let id = Uuid::new_v4();
        assert_eq!(
            AlertCommand::from_identifier(id, 0, "DISMISS").unwrap_err(),
            ValidationError::UnknownAction("DISMISS".to_string())
        );
        let command = AlertCommand::from_identifier(id, 2, "SNOOZE_1_HOUR_ACTION").unwrap();
        assert_eq!(command.action, AlertAction::Snooze(SnoozeOption::OneHour));
        assert_eq!(command.step_index, 2);
    }
}
