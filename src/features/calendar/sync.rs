//! # Calendar Sync
//!
//! Pulls enabled remote feeds, parses them, and merges each event into the
//! record store. Failures are collected per source so one broken feed never
//! blocks the others.
//!
//! - **Version**: 1.3.0
//! - **Since**: 0.4.0
//!
//! ## Changelog
//! - 1.3.0: Content updates no longer rewrite lifecycle columns; source removal drops its lock
//! - 1.2.0: Per-source lock table; concurrent syncs of one source are serialized
//! - 1.1.0: Respect locally detached events via the source ignore list
//! - 1.0.0: Initial release

use crate::core::{Clock, RecordStore, SyncError};
use crate::features::calendar::fetch::{decode_text, Fetcher};
use crate::features::calendar::parser::{parse, CalendarEvent};
use crate::features::calendar::source::RemoteFeedSource;
use crate::features::escalation::policy::PRESET_STANDARD;
use crate::features::escalation::{
    AlertScheduler, EscalationEngine, EscalationPolicy, ReminderRecord, SourceKind,
};
use chrono::Local;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Per-source merge tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeCounts {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Ignored by the source or detached to a local reminder
    pub skipped: usize,
}

#[derive(Debug)]
pub struct SourceSyncResult {
    pub source_id: Uuid,
    pub source_name: String,
    pub outcome: Result<MergeCounts, SyncError>,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub results: Vec<SourceSyncResult>,
    /// Message of the last failure in this run
    pub last_error: Option<String>,
}

impl SyncReport {
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_err()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeOutcome {
    Created,
    Updated,
    Unchanged,
    Skipped,
}

pub struct CalendarSyncEngine {
    clock: Arc<dyn Clock>,
    engine: Arc<EscalationEngine>,
    source_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl CalendarSyncEngine {
    pub fn new(clock: Arc<dyn Clock>, engine: Arc<EscalationEngine>) -> Self {
        CalendarSyncEngine {
            clock,
            engine,
            source_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, source_id: Uuid) -> Arc<Mutex<()>> {
        self.source_locks
            .entry(source_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Whether a sync of this source is in flight
    pub fn is_syncing(&self, source_id: Uuid) -> bool {
        self.source_locks
            .get(&source_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Delete a source once any in-flight sync of it has finished. Its
    /// reminders are kept.
    pub async fn remove_source(&self, source_id: Uuid, store: &dyn RecordStore) -> Result<bool, SyncError> {
        let lock = self.lock_for(source_id);
        let deleted = {
            let _guard = lock.lock().await;
            store.delete_source(source_id).await?
        };
        self.source_locks.remove(&source_id);

        if deleted {
            info!("Removed feed source {source_id}");
        }
        Ok(deleted)
    }

    /// Sync every enabled source whose interval has elapsed
    pub async fn sync_all(
        &self,
        store: &dyn RecordStore,
        fetcher: &dyn Fetcher,
        scheduler: &dyn AlertScheduler,
    ) -> SyncReport {
        let mut report = SyncReport::default();

        let sources = match store.find_enabled_sources().await {
            Ok(sources) => sources,
            Err(e) => {
                error!("Failed to load feed sources: {e}");
                report.last_error = Some(e.to_string());
                return report;
            }
        };

        let now = self.clock.now();
        for source in sources.into_iter().filter(|s| s.is_due(now)) {
            let outcome = self.sync_source(&source, store, fetcher, scheduler).await;
            if let Err(e) = &outcome {
                warn!("Sync of '{}' failed: {e}", source.name);
                report.last_error = Some(format!("{}: {e}", source.name));
            }
            report.results.push(SourceSyncResult {
                source_id: source.id,
                source_name: source.name,
                outcome,
            });
        }

        if !report.results.is_empty() {
            info!(
                "Synced {} feed source(s), {} failed",
                report.results.len(),
                report.failures()
            );
        }
        report
    }

    /// Sync one source now, regardless of its interval
    pub async fn sync_source(
        &self,
        source: &RemoteFeedSource,
        store: &dyn RecordStore,
        fetcher: &dyn Fetcher,
        scheduler: &dyn AlertScheduler,
    ) -> Result<MergeCounts, SyncError> {
        let lock = self.lock_for(source.id);
        let _guard = lock.lock().await;

        let bytes = fetcher.fetch(&source.endpoint).await?;
        let events = parse(&decode_text(bytes)?);
        debug!("Feed '{}' has {} event(s)", source.name, events.len());

        // The ignore list may have grown while the fetch was in flight
        let current = store
            .get_source(source.id)
            .await?
            .unwrap_or_else(|| source.clone());
        let default_policy = store.find_policy_by_name(PRESET_STANDARD).await?;

        let mut counts = MergeCounts::default();
        for event in &events {
            match self
                .merge_event(&current, event, default_policy.as_ref(), store, scheduler)
                .await?
            {
                MergeOutcome::Created => counts.created += 1,
                MergeOutcome::Updated => counts.updated += 1,
                MergeOutcome::Unchanged => counts.unchanged += 1,
                MergeOutcome::Skipped => counts.skipped += 1,
            }
        }

        let mut stamped = store.get_source(source.id).await?.unwrap_or(current);
        stamped.last_synced_at = Some(self.clock.now());
        store.save_source(&stamped).await?;

        info!(
            "Feed '{}': {} created, {} updated, {} unchanged, {} skipped",
            source.name, counts.created, counts.updated, counts.unchanged, counts.skipped
        );
        Ok(counts)
    }

    async fn merge_event(
        &self,
        source: &RemoteFeedSource,
        event: &CalendarEvent,
        default_policy: Option<&EscalationPolicy>,
        store: &dyn RecordStore,
        scheduler: &dyn AlertScheduler,
    ) -> Result<MergeOutcome, SyncError> {
        if source.is_ignored(&event.origin_key) {
            return Ok(MergeOutcome::Skipped);
        }

        match store.find_by_origin_key(&event.origin_key).await? {
            Some(existing) if existing.source_kind == SourceKind::Local => Ok(MergeOutcome::Skipped),
            Some(mut existing) => {
                if !self.apply_event(&mut existing, event) {
                    return Ok(MergeOutcome::Unchanged);
                }
                // Detached or deleted since the lookup
                if !store.update_reminder_content(&existing).await? {
                    return Ok(MergeOutcome::Skipped);
                }
                debug!("Updated reminder {} from {}", existing.id, event.origin_key);
                Ok(MergeOutcome::Updated)
            }
            None => {
                self.create_from_event(source, event, default_policy, store, scheduler)
                    .await?;
                Ok(MergeOutcome::Created)
            }
        }
    }

    /// Overwrite content fields; returns whether anything changed. State,
    /// cursor and scheduled alerts are left alone.
    fn apply_event(&self, reminder: &mut ReminderRecord, event: &CalendarEvent) -> bool {
        let before = (
            reminder.title.clone(),
            reminder.description.clone(),
            reminder.reminder_date,
            reminder.reminder_time,
            reminder.recurrence_rule.clone(),
        );

        reminder.title = event.title.clone();
        reminder.description = event.description.clone();
        reminder.recurrence_rule = event.recurrence_rule.clone();
        reminder.set_schedule_from(event.start, event.all_day, &Local);

        let after = (
            reminder.title.clone(),
            reminder.description.clone(),
            reminder.reminder_date,
            reminder.reminder_time,
            reminder.recurrence_rule.clone(),
        );
        if before == after {
            return false;
        }
        reminder.updated_at = self.clock.now();
        true
    }

    async fn create_from_event(
        &self,
        source: &RemoteFeedSource,
        event: &CalendarEvent,
        default_policy: Option<&EscalationPolicy>,
        store: &dyn RecordStore,
        scheduler: &dyn AlertScheduler,
    ) -> Result<(), SyncError> {
        let now = self.clock.now();
        let mut reminder = ReminderRecord::new(event.title.clone(), event.start.date_naive(), None, now);
        reminder.description = event.description.clone();
        reminder.recurrence_rule = event.recurrence_rule.clone();
        reminder.set_schedule_from(event.start, event.all_day, &Local);
        reminder.source_kind = SourceKind::Remote;
        reminder.origin_key = Some(event.origin_key.clone());
        reminder.source_id = Some(source.id);
        reminder.escalation_policy_id = default_policy.map(|p| p.id);

        match default_policy {
            Some(policy) if reminder.trigger_date() > now => {
                self.engine.arm(&mut reminder, policy, store, scheduler).await?;
            }
            _ => store.save_reminder(&reminder).await?,
        }
        debug!("Created reminder {} from {}", reminder.id, event.origin_key);
        Ok(())
    }
}
