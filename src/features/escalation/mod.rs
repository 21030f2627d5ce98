//! # Escalation Feature
//!
//! Relative-time escalation policies, the reminder state machine, and the
//! engine that turns both into scheduled alerts.
//!
//! - **Version**: 2.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.1.0: Alert actions routed through a command channel
//! - 2.0.0: Snooze resumes from the current step instead of restarting
//! - 1.0.0: Initial release

pub mod actions;
pub mod alerts;
pub mod catalog;
pub mod engine;
pub mod policy;
pub mod reminder;
pub mod snooze;

pub use actions::{AlertAction, AlertCommand};
pub use alerts::{
    run_delivery, AlertHandle, AlertPayload, AlertScheduler, AlertTag, LocalAlertScheduler,
    ScheduledAlert,
};
pub use catalog::{
    apply_policy_file, create_policy, delete_policy, load_custom_policies, seed_presets,
    update_policy, PolicyFile,
};
pub use engine::{
    plan_from_resume, plan_from_trigger, ArmReport, EscalationEngine, PlannedAlert, ReminderEdit,
};
pub use policy::{AlertKind, EscalationPolicy, EscalationStep};
pub use reminder::{ReminderRecord, ReminderState, SourceKind};
pub use snooze::SnoozeOption;
