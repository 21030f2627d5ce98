//! # Alert Scheduling
//!
//! The future-fire scheduler the escalation engine submits alerts to, plus a
//! bounded in-process implementation and its delivery loop.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Delivery loop emits fired alerts on the action command channel
//! - 1.0.0: Initial release with fixed-capacity local scheduler

use crate::core::{Clock, SchedulingError};
use crate::features::escalation::actions::{AlertAction, AlertCommand};
use crate::features::escalation::policy::AlertKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Identifies which reminder step an alert belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertTag {
    pub reminder_id: Uuid,
    pub step_index: usize,
    pub kind: AlertKind,
}

/// What the user sees when the alert fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertHandle(pub Uuid);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledAlert {
    pub handle: AlertHandle,
    pub owner: Uuid,
    pub tag: AlertTag,
    pub at: DateTime<Utc>,
    pub payload: AlertPayload,
}

#[async_trait]
pub trait AlertScheduler: Send + Sync {
    async fn schedule(
        &self,
        owner: Uuid,
        tag: AlertTag,
        at: DateTime<Utc>,
        payload: AlertPayload,
    ) -> Result<AlertHandle, SchedulingError>;

    /// Remove every outstanding item owned by `owner`; returns how many
    async fn cancel_all(&self, owner: Uuid) -> usize;
}

/// In-process scheduler with a fixed outstanding-item ceiling
pub struct LocalAlertScheduler {
    capacity: usize,
    clock: Arc<dyn Clock>,
    items: Mutex<Vec<ScheduledAlert>>,
}

impl LocalAlertScheduler {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        LocalAlertScheduler {
            capacity,
            clock,
            items: Mutex::new(Vec::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn outstanding(&self) -> usize {
        self.items.lock().await.len()
    }

    /// Outstanding alerts of one owner, earliest first
    pub async fn pending_for(&self, owner: Uuid) -> Vec<ScheduledAlert> {
        let items = self.items.lock().await;
        let mut pending: Vec<ScheduledAlert> =
            items.iter().filter(|a| a.owner == owner).cloned().collect();
        pending.sort_by_key(|a| (a.at, a.tag.step_index));
        pending
    }

    /// Remove and return everything due at or before `now`, earliest first
    pub async fn take_due(&self, now: DateTime<Utc>) -> Vec<ScheduledAlert> {
        let mut items = self.items.lock().await;
        let (mut due, rest): (Vec<ScheduledAlert>, Vec<ScheduledAlert>) =
            items.drain(..).partition(|a| a.at <= now);
        *items = rest;
        due.sort_by_key(|a| a.at);
        due
    }
}

#[async_trait]
impl AlertScheduler for LocalAlertScheduler {
    async fn schedule(
        &self,
        owner: Uuid,
        tag: AlertTag,
        at: DateTime<Utc>,
        payload: AlertPayload,
    ) -> Result<AlertHandle, SchedulingError> {
        if at <= self.clock.now() {
            return Err(SchedulingError::Rejected(format!(
                "fire time {at} is not in the future"
            )));
        }

        let mut items = self.items.lock().await;
        if items.len() >= self.capacity {
            return Err(SchedulingError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let handle = AlertHandle(Uuid::new_v4());
        items.push(ScheduledAlert {
            handle,
            owner,
            tag,
            at,
            payload,
        });
        Ok(handle)
    }

    async fn cancel_all(&self, owner: Uuid) -> usize {
        let mut items = self.items.lock().await;
        let before = items.len();
        items.retain(|a| a.owner != owner);
        before - items.len()
    }
}

/// Fire due alerts every `tick` and forward them as commands.
///
/// Returns when the command receiver is dropped.
pub async fn run_delivery(
    scheduler: Arc<LocalAlertScheduler>,
    clock: Arc<dyn Clock>,
    tick: Duration,
    commands: mpsc::Sender<AlertCommand>,
) {
    let mut interval = tokio::time::interval(tick);
    info!("Alert delivery loop started (tick {}s)", tick.as_secs());

    loop {
        interval.tick().await;

        let due = scheduler.take_due(clock.now()).await;
        if due.is_empty() {
            continue;
        }
        debug!("{} alert(s) due", due.len());

        for alert in due {
            match alert.tag.kind {
                AlertKind::Alarm => warn!(
                    "🚨 ALARM: {} (step {}) - {}",
                    alert.payload.title,
                    alert.tag.step_index + 1,
                    alert.payload.body
                ),
                AlertKind::Push => info!(
                    "🔔 {} (step {}) - {}",
                    alert.payload.title,
                    alert.tag.step_index + 1,
                    alert.payload.body
                ),
            }

            let command = AlertCommand {
                reminder_id: alert.tag.reminder_id,
                step_index: alert.tag.step_index,
                action: AlertAction::Fired,
            };
            if commands.send(command).await.is_err() {
                info!("Command channel closed, stopping alert delivery");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FixedClock;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn tag(owner: Uuid, step_index: usize) -> AlertTag {
        AlertTag {
            reminder_id: owner,
            step_index,
            kind: AlertKind::Push,
        }
    }

    fn payload() -> AlertPayload {
        AlertPayload {
            title: "Stretch".to_string(),
            body: "Tap to view reminder".to_string(),
        }
    }

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let clock = FixedClock::new(start());
        let scheduler = LocalAlertScheduler::new(2, Arc::new(clock));
        let owner = Uuid::new_v4();
        let at = start() + chrono::Duration::minutes(5);

        assert!(scheduler.schedule(owner, tag(owner, 0), at, payload()).await.is_ok());
        assert!(scheduler.schedule(owner, tag(owner, 1), at, payload()).await.is_ok());
        assert_eq!(
            scheduler.schedule(owner, tag(owner, 2), at, payload()).await,
            Err(SchedulingError::CapacityExceeded { capacity: 2 })
        );
    }

    #[tokio::test]
    async fn test_rejects_past_instants() {
        let scheduler = LocalAlertScheduler::new(4, Arc::new(FixedClock::new(start())));
        let owner = Uuid::new_v4();
        let result = scheduler.schedule(owner, tag(owner, 0), start(), payload()).await;
        assert!(matches!(result, Err(SchedulingError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_cancel_all_only_touches_owner() {
        let scheduler = LocalAlertScheduler::new(8, Arc::new(FixedClock::new(start())));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let at = start() + chrono::Duration::minutes(1);
        scheduler.schedule(a, tag(a, 0), at, payload()).await.unwrap();
        scheduler.schedule(a, tag(a, 1), at, payload()).await.unwrap();
        scheduler.schedule(b, tag(b, 0), at, payload()).await.unwrap();

        assert_eq!(scheduler.cancel_all(a).await, 2);
        assert!(scheduler.pending_for(a).await.is_empty());
        assert_eq!(scheduler.pending_for(b).await.len(), 1);
        assert_eq!(scheduler.cancel_all(a).await, 0);
    }

    #[tokio::test]
    async fn test_take_due_removes_only_due_items() {
        let clock = FixedClock::new(start());
        let scheduler = LocalAlertScheduler::new(8, Arc::new(clock.clone()));
        let owner = Uuid::new_v4();
        scheduler
            .schedule(owner, tag(owner, 1), start() + chrono::Duration::minutes(10), payload())
            .await
            .unwrap();
        scheduler
            .schedule(owner, tag(owner, 0), start() + chrono::Duration::minutes(1), payload())
            .await
            .unwrap();

        let due = scheduler.take_due(start() + chrono::Duration::minutes(5)).await;
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].tag.step_index, 0);
        assert_eq!(scheduler.outstanding().await, 1);
    }

    #[tokio::test]
    async fn test_delivery_loop_emits_fired_commands() {
        let clock = FixedClock::new(start());
        let scheduler = Arc::new(LocalAlertScheduler::new(8, Arc::new(clock.clone())));
        let owner = Uuid::new_v4();
        scheduler
            .schedule(owner, tag(owner, 3), start() + chrono::Duration::minutes(1), payload())
            .await
            .unwrap();
        clock.advance(chrono::Duration::minutes(2));

        let (tx, mut rx) = mpsc::channel(4);
        let handle = tokio::spawn(run_delivery(
            scheduler.clone(),
            Arc::new(clock.clone()),
            Duration::from_millis(10),
            tx,
        ));

        let command = rx.recv().await.unwrap();
        assert_eq!(command.reminder_id, owner);
        assert_eq!(command.step_index, 3);
        assert_eq!(command.action, AlertAction::Fired);
        assert_eq!(scheduler.outstanding().await, 0);

        drop(rx);
        handle.abort();
    }
}
