//! # Reminder Records
//!
//! The entity being escalated. Owns its lifecycle state and the step cursor
//! used to resume escalation after a snooze.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.2.0: Unknown state strings fail closed instead of defaulting to pending
//! - 1.1.0: Track remote origin key and owning feed source
//! - 1.0.0: Initial release

use crate::core::ValidationError;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a reminder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderState {
    /// Not yet triggered
    Pending,
    /// Escalation in progress
    Active,
    /// User marked it done
    Completed,
    /// User dismissed it without completing
    Ignored,
}

impl ReminderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReminderState::Completed | ReminderState::Ignored)
    }
}

impl std::fmt::Display for ReminderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReminderState::Pending => write!(f, "pending"),
            ReminderState::Active => write!(f, "active"),
            ReminderState::Completed => write!(f, "completed"),
            ReminderState::Ignored => write!(f, "ignored"),
        }
    }
}

impl std::str::FromStr for ReminderState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ReminderState::Pending),
            "active" => Ok(ReminderState::Active),
            "completed" => Ok(ReminderState::Completed),
            "ignored" => Ok(ReminderState::Ignored),
            _ => Err(ValidationError::UnknownState(s.to_string())),
        }
    }
}

/// Where a reminder came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Created or taken over by the user
    Local,
    /// Owned by a remote calendar feed
    Remote,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Local => write!(f, "local"),
            SourceKind::Remote => write!(f, "remote"),
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(SourceKind::Local),
            "remote" => Ok(SourceKind::Remote),
            _ => Err(ValidationError::UnknownSourceKind(s.to_string())),
        }
    }
}

/// A reminder and its escalation cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,

    /// Calendar date of the reminder (local calendar)
    pub reminder_date: NaiveDate,

    /// Optional time-of-day; `None` means an all-day reminder
    pub reminder_time: Option<NaiveTime>,

    /// Opaque RRULE text, carried but never expanded
    pub recurrence_rule: Option<String>,

    pub(crate) state: ReminderState,
    pub escalation_policy_id: Option<Uuid>,
    pub(crate) current_step_index: usize,
    pub(crate) snoozed_until: Option<DateTime<Utc>>,

    pub source_kind: SourceKind,

    /// Identifier of the remote event this reminder mirrors
    pub origin_key: Option<String>,

    /// Feed source that created this reminder
    pub source_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReminderRecord {
    pub fn new(
        title: impl Into<String>,
        reminder_date: NaiveDate,
        reminder_time: Option<NaiveTime>,
        now: DateTime<Utc>,
    ) -> Self {
        ReminderRecord {
            id: Uuid::new_v4(),
            title: title.into(),
            description: None,
            reminder_date,
            reminder_time,
            recurrence_rule: None,
            state: ReminderState::Pending,
            escalation_policy_id: None,
            current_step_index: 0,
            snoozed_until: None,
            source_kind: SourceKind::Local,
            origin_key: None,
            source_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_policy(mut self, policy_id: Uuid) -> Self {
        self.escalation_policy_id = Some(policy_id);
        self
    }

    pub fn with_recurrence(mut self, rule: impl Into<String>) -> Self {
        self.recurrence_rule = Some(rule.into());
        self
    }

    pub fn state(&self) -> ReminderState {
        self.state
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn snoozed_until(&self) -> Option<DateTime<Utc>> {
        self.snoozed_until
    }

    pub fn is_active(&self) -> bool {
        self.state == ReminderState::Active
    }

    pub fn is_pending(&self) -> bool {
        self.state == ReminderState::Pending
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn has_time(&self) -> bool {
        self.reminder_time.is_some()
    }

    /// Trigger instant in the process-local calendar
    pub fn trigger_date(&self) -> DateTime<Utc> {
        self.trigger_date_in(&chrono::Local)
    }

    /// Trigger instant with the date (and optional time) read in `tz`
    pub fn trigger_date_in<Tz: TimeZone>(&self, tz: &Tz) -> DateTime<Utc> {
        let time = self.reminder_time.unwrap_or_default();
        local_instant(tz, self.reminder_date.and_time(time))
    }

    /// Enter Active with the cursor at the first step
    pub fn activate(&mut self, now: DateTime<Utc>) {
        self.state = ReminderState::Active;
        self.current_step_index = 0;
        self.updated_at = now;
    }

    /// Returns false when the reminder was already closed
    pub fn mark_complete(&mut self, now: DateTime<Utc>) -> bool {
        self.close(ReminderState::Completed, now)
    }

    pub fn mark_ignored(&mut self, now: DateTime<Utc>) -> bool {
        self.close(ReminderState::Ignored, now)
    }

    fn close(&mut self, terminal: ReminderState, now: DateTime<Utc>) -> bool {
        self.snoozed_until = None;
        if self.state.is_terminal() {
            return false;
        }
        self.state = terminal;
        self.updated_at = now;
        true
    }

    pub fn snooze(&mut self, until: DateTime<Utc>, now: DateTime<Utc>) {
        self.snoozed_until = Some(until);
        self.updated_at = now;
    }

    /// Clears the snooze marker; the step cursor is left where it was
    pub fn resume_from_snooze(&mut self, now: DateTime<Utc>) {
        self.snoozed_until = None;
        self.updated_at = now;
    }

    /// Move the cursor forward to `step_index`. Never moves backward.
    pub fn advance_to(&mut self, step_index: usize, now: DateTime<Utc>) -> bool {
        if step_index <= self.current_step_index {
            return false;
        }
        self.current_step_index = step_index;
        self.updated_at = now;
        true
    }

    /// Set date, time and the all-day flag from an instant.
    pub fn set_schedule_from<Tz: TimeZone>(&mut self, start: DateTime<Utc>, all_day: bool, tz: &Tz) {
        if all_day {
            self.reminder_date = start.date_naive();
            self.reminder_time = None;
        } else {
            let local = start.with_timezone(tz).naive_local();
            self.reminder_date = local.date();
            self.reminder_time = Some(local.time());
        }
    }
}

/// Resolve a wall-clock time in `tz`. Ambiguous times take the earlier
/// instant; times inside a DST gap are pushed forward by an hour.
pub fn local_instant<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    if let Some(resolved) = tz.from_local_datetime(&naive).earliest() {
        return resolved.with_timezone(&Utc);
    }
    let shifted = naive + Duration::hours(1);
    match tz.from_local_datetime(&shifted).earliest() {
        Some(resolved) => resolved.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&naive),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
    }

    fn sample() -> ReminderRecord {
        ReminderRecord::new(
            "Water plants",
            NaiveDate::from_ymd_opt(2026, 5, 4).unwrap(),
            NaiveTime::from_hms_opt(18, 30, 0),
            now(),
        )
    }

    #[test]
    fn test_new_reminder_is_pending_local() {
        let reminder = sample();
        assert_eq!(reminder.state(), ReminderState::Pending);
        assert_eq!(reminder.source_kind, SourceKind::Local);
        assert_eq!(reminder.current_step_index(), 0);
        assert!(reminder.snoozed_until().is_none());
    }

    #[test]
    fn test_trigger_date_combines_date_and_time() {
        let reminder = sample();
        assert_eq!(
            reminder.trigger_date_in(&Utc),
            Utc.with_ymd_and_hms(2026, 5, 4, 18, 30, 0).unwrap()
        );

        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(
            reminder.trigger_date_in(&plus_two),
            Utc.with_ymd_and_hms(2026, 5, 4, 16, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_trigger_date_without_time_is_midnight() {
        let mut reminder = sample();
        reminder.reminder_time = None;
        assert!(!reminder.has_time());
        assert_eq!(
            reminder.trigger_date_in(&Utc),
            Utc.with_ymd_and_hms(2026, 5, 4, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_terminal_states_clear_snooze_and_absorb() {
        let mut reminder = sample();
        reminder.activate(now());
        reminder.snooze(now() + Duration::hours(1), now());

        assert!(reminder.mark_complete(now()));
        assert!(reminder.snoozed_until().is_none());
        assert_eq!(reminder.state(), ReminderState::Completed);

        assert!(!reminder.mark_ignored(now()));
        assert_eq!(reminder.state(), ReminderState::Completed);
    }

    #[test]
    fn test_cursor_only_moves_forward_until_reset() {
        let mut reminder = sample();
        reminder.activate(now());
        assert!(reminder.advance_to(2, now()));
        assert!(!reminder.advance_to(1, now()));
        assert_eq!(reminder.current_step_index(), 2);

        reminder.snooze(now() + Duration::hours(1), now());
        reminder.resume_from_snooze(now());
        assert_eq!(reminder.current_step_index(), 2);

        reminder.activate(now());
        assert_eq!(reminder.current_step_index(), 0);
    }

    #[test]
    fn test_state_parsing_fails_closed() {
        assert_eq!("Active".parse::<ReminderState>().unwrap(), ReminderState::Active);
        assert_eq!(
            "snoozing".parse::<ReminderState>().unwrap_err(),
            ValidationError::UnknownState("snoozing".to_string())
        );
        assert!("iCal".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_set_schedule_from_all_day_and_timed() {
        let mut reminder = sample();
        let start = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        reminder.set_schedule_from(start, true, &Utc);
        assert_eq!(reminder.reminder_date, NaiveDate::from_ymd_opt(2026, 7, 1).unwrap());
        assert!(reminder.reminder_time.is_none());

        let start = Utc.with_ymd_and_hms(2026, 7, 1, 23, 15, 0).unwrap();
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        reminder.set_schedule_from(start, false, &plus_two);
        assert_eq!(reminder.reminder_date, NaiveDate::from_ymd_opt(2026, 7, 2).unwrap());
        assert_eq!(reminder.reminder_time, NaiveTime::from_hms_opt(1, 15, 0));
        assert_eq!(reminder.trigger_date_in(&plus_two), start);
    }
}
