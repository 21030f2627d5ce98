// Core layer - shared types and configuration
pub mod core;

// Features layer - escalation and calendar
pub mod features;

// Infrastructure
pub mod database;

pub use core::Config;
pub use database::Database;

pub use features::{
    // Escalation
    run_delivery, seed_presets, AlertAction, AlertCommand, AlertKind, AlertScheduler,
    EscalationEngine, EscalationPolicy, EscalationStep, LocalAlertScheduler, ReminderEdit,
    ReminderRecord, ReminderState, SnoozeOption, SourceKind,
    // Calendar
    parse, serialize, serialize_one, CalendarEvent, CalendarSyncEngine, Fetcher, HttpFetcher,
    RemoteFeedSource, SyncReport,
};
