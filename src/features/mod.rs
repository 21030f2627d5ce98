//! # Features
//!
//! - **escalation**: policies, reminder lifecycle, alert scheduling
//! - **calendar**: feed import/export and sync

pub mod calendar;
pub mod escalation;

pub use calendar::{
    parse, serialize, serialize_one, CalendarEvent, CalendarSyncEngine, Fetcher, HttpFetcher,
    RemoteFeedSource, SyncReport,
};
pub use escalation::{
    run_delivery, seed_presets, AlertAction, AlertCommand, AlertKind, AlertScheduler,
    EscalationEngine, EscalationPolicy, EscalationStep, LocalAlertScheduler, ReminderEdit,
    ReminderRecord, ReminderState, SnoozeOption, SourceKind,
};
