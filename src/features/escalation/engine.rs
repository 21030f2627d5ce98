//! # Escalation Engine
//!
//! Turns an escalation policy into concrete alert instants for a reminder,
//! re-derives them after a snooze, and drives the reminder state machine.
//! The engine holds no per-reminder state: the record store and the alert
//! scheduler are passed into every call.
//!
//! - **Version**: 2.2.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 2.2.0: Closed reminders are never re-armed; restart restore keeps the step cursor
//! - 2.1.0: Alert responses arrive as commands instead of broadcast events
//! - 2.0.0: Explicit error returns from every mutating operation
//! - 1.0.0: Initial release

use crate::core::config::DEFAULT_MAX_REPEAT_ALERTS;
use crate::core::{Clock, EngineResult, RecordStore, ValidationError};
use crate::features::escalation::actions::{AlertAction, AlertCommand};
use crate::features::escalation::alerts::{AlertPayload, AlertScheduler, AlertTag};
use crate::features::escalation::policy::{AlertKind, EscalationPolicy, EscalationStep};
use crate::features::escalation::reminder::{ReminderRecord, SourceKind};
use crate::features::escalation::snooze::SnoozeOption;
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

const DEFAULT_ALERT_BODY: &str = "Tap to view reminder";

/// One concrete alert the engine intends to schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlannedAlert {
    pub step_index: usize,
    pub kind: AlertKind,
    pub at: DateTime<Utc>,
}

/// Outcome of a (re)arm
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArmReport {
    /// Alerts removed before rescheduling
    pub cancelled: usize,
    /// Alerts the scheduler accepted
    pub scheduled: Vec<PlannedAlert>,
    /// Alerts the scheduler refused (capacity or rejection)
    pub rejected: usize,
}

/// Fire instants for every step at or after `cursor`, measured from the
/// trigger instant. Instants at or before `now` are dropped.
pub fn plan_from_trigger(
    steps: &[EscalationStep],
    cursor: usize,
    trigger: DateTime<Utc>,
    now: DateTime<Utc>,
    max_repeat: usize,
) -> Vec<PlannedAlert> {
    let mut planned = Vec::new();
    for (index, step) in steps.iter().enumerate().skip(cursor) {
        let at = trigger + Duration::minutes(step.delay_minutes);
        expand_step(&mut planned, index, step, at, now, max_repeat);
    }
    planned
}

/// Fire instants after a snooze: the step at `cursor` fires at `resume_at`
/// and later steps keep their delay relative to that step.
pub fn plan_from_resume(
    steps: &[EscalationStep],
    cursor: usize,
    resume_at: DateTime<Utc>,
    now: DateTime<Utc>,
    max_repeat: usize,
) -> Vec<PlannedAlert> {
    let Some(anchor) = steps.get(cursor) else {
        return Vec::new();
    };

    let mut planned = Vec::new();
    for (index, step) in steps.iter().enumerate().skip(cursor) {
        let at = resume_at + Duration::minutes(step.delay_minutes - anchor.delay_minutes);
        expand_step(&mut planned, index, step, at, now, max_repeat);
    }
    planned
}

fn expand_step(
    planned: &mut Vec<PlannedAlert>,
    step_index: usize,
    step: &EscalationStep,
    at: DateTime<Utc>,
    now: DateTime<Utc>,
    max_repeat: usize,
) {
    if at <= now {
        return;
    }

    match step.repeat_interval_minutes {
        Some(interval) if interval > 0 => {
            for n in 0..max_repeat {
                planned.push(PlannedAlert {
                    step_index,
                    kind: step.kind,
                    at: at + Duration::minutes(interval * n as i64),
                });
            }
        }
        _ => planned.push(PlannedAlert {
            step_index,
            kind: step.kind,
            at,
        }),
    }
}

/// Field values for a user edit of a reminder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderEdit {
    pub title: String,
    pub description: Option<String>,
    pub reminder_date: NaiveDate,
    pub reminder_time: Option<NaiveTime>,
    pub recurrence_rule: Option<String>,
    pub escalation_policy_id: Option<Uuid>,
}

impl ReminderEdit {
    /// Start from the reminder's current values
    pub fn from_record(reminder: &ReminderRecord) -> Self {
        ReminderEdit {
            title: reminder.title.clone(),
            description: reminder.description.clone(),
            reminder_date: reminder.reminder_date,
            reminder_time: reminder.reminder_time,
            recurrence_rule: reminder.recurrence_rule.clone(),
            escalation_policy_id: reminder.escalation_policy_id,
        }
    }
}

pub struct EscalationEngine {
    clock: Arc<dyn Clock>,
    max_repeat_alerts: usize,
}

impl EscalationEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        EscalationEngine {
            clock,
            max_repeat_alerts: DEFAULT_MAX_REPEAT_ALERTS,
        }
    }

    pub fn with_max_repeat_alerts(mut self, max_repeat_alerts: usize) -> Self {
        self.max_repeat_alerts = max_repeat_alerts.max(1);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Cancel, recompute from the step cursor, submit, then mark Active with
    /// the cursor reset. A fully past schedule arms nothing but still
    /// activates. A failed save is returned without unscheduling. Closed
    /// reminders are refused.
    pub async fn arm(
        &self,
        reminder: &mut ReminderRecord,
        policy: &EscalationPolicy,
        store: &dyn RecordStore,
        scheduler: &dyn AlertScheduler,
    ) -> EngineResult<ArmReport> {
        if reminder.is_closed() {
            return Err(ValidationError::Terminal(reminder.id).into());
        }

        let now = self.clock.now();
        let cancelled = scheduler.cancel_all(reminder.id).await;

        let planned = plan_from_trigger(
            &policy.steps,
            reminder.current_step_index(),
            reminder.trigger_date(),
            now,
            self.max_repeat_alerts,
        );
        let (scheduled, rejected) = self.submit(reminder, planned, scheduler).await;

        reminder.escalation_policy_id = Some(policy.id);
        reminder.activate(now);
        store.save_reminder(reminder).await?;

        info!(
            "Armed reminder {} ('{}') with policy '{}': {} alert(s) scheduled",
            reminder.id,
            reminder.title,
            policy.name,
            scheduled.len()
        );

        Ok(ArmReport {
            cancelled,
            scheduled,
            rejected,
        })
    }

    /// Resume escalation at `resume_at` from the step the reminder was on.
    /// The cursor is left unchanged.
    pub async fn rearm_from_snooze(
        &self,
        reminder: &mut ReminderRecord,
        resume_at: DateTime<Utc>,
        store: &dyn RecordStore,
        scheduler: &dyn AlertScheduler,
    ) -> EngineResult<ArmReport> {
        if reminder.is_closed() {
            return Err(ValidationError::Terminal(reminder.id).into());
        }

        let now = self.clock.now();
        let cancelled = scheduler.cancel_all(reminder.id).await;

        let planned = match self.resolve_policy(reminder, store).await? {
            Some(policy) => plan_from_resume(
                &policy.steps,
                reminder.current_step_index(),
                resume_at,
                now,
                self.max_repeat_alerts,
            ),
            None => {
                debug!("Reminder {} has no escalation policy, nothing to resume", reminder.id);
                Vec::new()
            }
        };
        let (scheduled, rejected) = self.submit(reminder, planned, scheduler).await;

        reminder.resume_from_snooze(now);
        store.save_reminder(reminder).await?;

        debug!(
            "Re-armed reminder {} from step {} at {}: {} alert(s)",
            reminder.id,
            reminder.current_step_index(),
            resume_at,
            scheduled.len()
        );

        Ok(ArmReport {
            cancelled,
            scheduled,
            rejected,
        })
    }

    /// Only Active reminders can be snoozed; a Pending one has nothing to
    /// postpone yet.
    pub async fn snooze(
        &self,
        reminder: &mut ReminderRecord,
        until: DateTime<Utc>,
        store: &dyn RecordStore,
        scheduler: &dyn AlertScheduler,
    ) -> EngineResult<ArmReport> {
        if reminder.is_closed() {
            return Err(ValidationError::Terminal(reminder.id).into());
        }
        if !reminder.is_active() {
            return Err(ValidationError::NotActive(reminder.id).into());
        }

        let now = self.clock.now();
        scheduler.cancel_all(reminder.id).await;
        reminder.snooze(until, now);
        store.save_reminder(reminder).await?;

        info!("Snoozed reminder {} until {}", reminder.id, until);
        self.rearm_from_snooze(reminder, until, store, scheduler).await
    }

    /// Snooze with a named option resolved against local wall-clock time
    pub async fn snooze_with(
        &self,
        reminder: &mut ReminderRecord,
        option: SnoozeOption,
        store: &dyn RecordStore,
        scheduler: &dyn AlertScheduler,
    ) -> EngineResult<ArmReport> {
        let until = option.resolve(self.clock.now().with_timezone(&Local));
        self.snooze(reminder, until, store, scheduler).await
    }

    pub async fn complete(
        &self,
        reminder: &mut ReminderRecord,
        store: &dyn RecordStore,
        scheduler: &dyn AlertScheduler,
    ) -> EngineResult<()> {
        let cancelled = scheduler.cancel_all(reminder.id).await;
        if reminder.mark_complete(self.clock.now()) {
            store.save_reminder(reminder).await?;
            info!("Reminder {} completed ({} alert(s) cancelled)", reminder.id, cancelled);
        } else {
            debug!("Reminder {} already closed as {}", reminder.id, reminder.state());
        }
        Ok(())
    }

    pub async fn ignore(
        &self,
        reminder: &mut ReminderRecord,
        store: &dyn RecordStore,
        scheduler: &dyn AlertScheduler,
    ) -> EngineResult<()> {
        let cancelled = scheduler.cancel_all(reminder.id).await;
        if reminder.mark_ignored(self.clock.now()) {
            store.save_reminder(reminder).await?;
            info!("Reminder {} ignored ({} alert(s) cancelled)", reminder.id, cancelled);
        } else {
            debug!("Reminder {} already closed as {}", reminder.id, reminder.state());
        }
        Ok(())
    }

    /// Reschedule an Active reminder after a restart without touching its
    /// cursor. A pending snooze (expired or not) resumes from the snooze
    /// instant; otherwise steps from the cursor onward are planned from the
    /// trigger.
    pub async fn restore(
        &self,
        reminder: &mut ReminderRecord,
        store: &dyn RecordStore,
        scheduler: &dyn AlertScheduler,
    ) -> EngineResult<ArmReport> {
        if !reminder.is_active() {
            return Ok(ArmReport::default());
        }
        if let Some(until) = reminder.snoozed_until() {
            return self.rearm_from_snooze(reminder, until, store, scheduler).await;
        }

        let Some(policy) = self.resolve_policy(reminder, store).await? else {
            return Ok(ArmReport::default());
        };

        let cancelled = scheduler.cancel_all(reminder.id).await;
        let planned = plan_from_trigger(
            &policy.steps,
            reminder.current_step_index(),
            reminder.trigger_date(),
            self.clock.now(),
            self.max_repeat_alerts,
        );
        let (scheduled, rejected) = self.submit(reminder, planned, scheduler).await;

        debug!(
            "Restored reminder {} at step {}: {} alert(s)",
            reminder.id,
            reminder.current_step_index(),
            scheduled.len()
        );

        Ok(ArmReport {
            cancelled,
            scheduled,
            rejected,
        })
    }

    /// Drop outstanding alerts without touching state
    pub async fn cancel(&self, reminder: &ReminderRecord, scheduler: &dyn AlertScheduler) -> usize {
        let cancelled = scheduler.cancel_all(reminder.id).await;
        debug!("Cancelled {} alert(s) for reminder {}", cancelled, reminder.id);
        cancelled
    }

    /// A delivered alert moves the cursor forward to its step
    pub async fn advance_step(
        &self,
        reminder: &mut ReminderRecord,
        step_index: usize,
        store: &dyn RecordStore,
    ) -> EngineResult<bool> {
        if !reminder.is_active() {
            return Ok(false);
        }
        if !reminder.advance_to(step_index, self.clock.now()) {
            return Ok(false);
        }
        store.save_reminder(reminder).await?;
        debug!("Reminder {} advanced to step {}", reminder.id, step_index);
        Ok(true)
    }

    /// Persist a new reminder and start escalating it if it is due later
    pub async fn register(
        &self,
        reminder: &mut ReminderRecord,
        store: &dyn RecordStore,
        scheduler: &dyn AlertScheduler,
    ) -> EngineResult<ArmReport> {
        let now = self.clock.now();

        if reminder.trigger_date() <= now {
            reminder.activate(now);
            store.save_reminder(reminder).await?;
            return Ok(ArmReport::default());
        }

        match self.resolve_policy(reminder, store).await? {
            Some(policy) => self.arm(reminder, &policy, store, scheduler).await,
            None => {
                store.save_reminder(reminder).await?;
                Ok(ArmReport::default())
            }
        }
    }

    /// Apply a user edit. Remote reminders are detached from their feed, and
    /// active reminders restart escalation from the first step.
    pub async fn apply_edit(
        &self,
        reminder: &mut ReminderRecord,
        edit: ReminderEdit,
        store: &dyn RecordStore,
        scheduler: &dyn AlertScheduler,
    ) -> EngineResult<ArmReport> {
        if reminder.is_closed() {
            return Err(ValidationError::Terminal(reminder.id).into());
        }

        let now = self.clock.now();
        let was_active = reminder.is_active();

        reminder.title = edit.title;
        reminder.description = edit.description;
        reminder.reminder_date = edit.reminder_date;
        reminder.reminder_time = edit.reminder_time;
        reminder.recurrence_rule = edit.recurrence_rule;
        reminder.escalation_policy_id = edit.escalation_policy_id;
        reminder.updated_at = now;

        if reminder.source_kind == SourceKind::Remote {
            self.detach_from_feed(reminder, store).await?;
        }

        if !was_active {
            store.save_reminder(reminder).await?;
            return Ok(ArmReport::default());
        }

        reminder.activate(now);
        match self.resolve_policy(reminder, store).await? {
            Some(policy) => self.arm(reminder, &policy, store, scheduler).await,
            None => {
                let cancelled = scheduler.cancel_all(reminder.id).await;
                store.save_reminder(reminder).await?;
                Ok(ArmReport {
                    cancelled,
                    ..ArmReport::default()
                })
            }
        }
    }

    /// Cancel alerts and remove the record
    pub async fn delete(
        &self,
        reminder: &ReminderRecord,
        store: &dyn RecordStore,
        scheduler: &dyn AlertScheduler,
    ) -> EngineResult<bool> {
        self.cancel(reminder, scheduler).await;
        Ok(store.delete_reminder(reminder.id).await?)
    }

    pub async fn handle_command(
        &self,
        command: AlertCommand,
        store: &dyn RecordStore,
        scheduler: &dyn AlertScheduler,
    ) -> EngineResult<()> {
        let Some(mut reminder) = store.get_reminder(command.reminder_id).await? else {
            warn!("Dropping {:?} for unknown reminder {}", command.action, command.reminder_id);
            return Ok(());
        };

        match command.action {
            AlertAction::Fired => {
                self.advance_step(&mut reminder, command.step_index, store).await?;
            }
            AlertAction::Complete => self.complete(&mut reminder, store, scheduler).await?,
            AlertAction::Ignore => self.ignore(&mut reminder, store, scheduler).await?,
            AlertAction::Snooze(option) => {
                if !reminder.is_active() {
                    debug!("Ignoring snooze for {} reminder {}", reminder.state(), reminder.id);
                    return Ok(());
                }
                self.snooze_with(&mut reminder, option, store, scheduler).await?;
            }
        }
        Ok(())
    }

    /// Consume alert commands until every sender is dropped
    pub async fn run_commands(
        &self,
        mut commands: mpsc::Receiver<AlertCommand>,
        store: &dyn RecordStore,
        scheduler: &dyn AlertScheduler,
    ) {
        while let Some(command) = commands.recv().await {
            if let Err(e) = self.handle_command(command, store, scheduler).await {
                error!(
                    "Failed to handle {} for reminder {}: {e}",
                    command.action.identifier(),
                    command.reminder_id
                );
            }
        }
        info!("Alert command channel closed");
    }

    async fn resolve_policy(
        &self,
        reminder: &ReminderRecord,
        store: &dyn RecordStore,
    ) -> EngineResult<Option<EscalationPolicy>> {
        let Some(policy_id) = reminder.escalation_policy_id else {
            return Ok(None);
        };
        let policy = store.get_policy(policy_id).await?;
        if policy.is_none() {
            warn!("Reminder {} references missing policy {}", reminder.id, policy_id);
        }
        Ok(policy)
    }

    async fn detach_from_feed(
        &self,
        reminder: &mut ReminderRecord,
        store: &dyn RecordStore,
    ) -> EngineResult<()> {
        reminder.source_kind = SourceKind::Local;

        let (Some(source_id), Some(origin_key)) = (reminder.source_id, reminder.origin_key.clone()) else {
            return Ok(());
        };
        if let Some(mut source) = store.get_source(source_id).await? {
            if source.ignore_origin_key(origin_key.clone()) {
                store.save_source(&source).await?;
                info!(
                    "Reminder {} detached from feed '{}' (origin {})",
                    reminder.id, source.name, origin_key
                );
            }
        }
        Ok(())
    }

    async fn submit(
        &self,
        reminder: &ReminderRecord,
        planned: Vec<PlannedAlert>,
        scheduler: &dyn AlertScheduler,
    ) -> (Vec<PlannedAlert>, usize) {
        let payload = AlertPayload {
            title: reminder.title.clone(),
            body: reminder
                .description
                .clone()
                .unwrap_or_else(|| DEFAULT_ALERT_BODY.to_string()),
        };

        let mut scheduled = Vec::with_capacity(planned.len());
        let mut rejected = 0;
        let mut last_error = None;

        for alert in planned {
            let tag = AlertTag {
                reminder_id: reminder.id,
                step_index: alert.step_index,
                kind: alert.kind,
            };
            match scheduler.schedule(reminder.id, tag, alert.at, payload.clone()).await {
                Ok(_) => scheduled.push(alert),
                Err(e) => {
                    rejected += 1;
                    last_error = Some(e);
                }
            }
        }

        if let Some(e) = last_error {
            warn!(
                "Scheduler refused {} alert(s) for reminder {}: {}",
                rejected, reminder.id, e
            );
        }
        (scheduled, rejected)
    }
}
