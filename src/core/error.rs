//! # Error Types
//!
//! Typed failures for the escalation engine, record store, and calendar sync.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.2.0
//!
//! ## Changelog
//! - 1.1.0: Split fetch and decode failures out of SyncError
//! - 1.0.0: Initial release

use thiserror::Error;
use uuid::Uuid;

/// Malformed policies, steps, or persisted enum values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("step {index} has negative delay ({delay} min)")]
    NegativeDelay { index: usize, delay: i64 },

    #[error("step {index} has non-positive repeat interval ({interval} min)")]
    InvalidRepeatInterval { index: usize, interval: i64 },

    #[error("escalation policy '{0}' has no steps")]
    EmptyPolicy(String),

    #[error("escalation policy name must not be empty")]
    EmptyPolicyName,

    #[error("preset policy '{0}' cannot be modified")]
    PresetImmutable(String),

    #[error("reminder {0} is closed")]
    Terminal(Uuid),

    #[error("reminder {0} is not active")]
    NotActive(Uuid),

    #[error("unknown reminder state: {0}")]
    UnknownState(String),

    #[error("unknown source kind: {0}")]
    UnknownSourceKind(String),

    #[error("unknown alert kind: {0}")]
    UnknownAlertKind(String),

    #[error("unknown alert action: {0}")]
    UnknownAction(String),

    #[error("sync interval must be at least one minute (got {0})")]
    InvalidSyncInterval(i64),
}

/// The alert scheduler refused an item.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("alert scheduler is full ({capacity} outstanding items)")]
    CapacityExceeded { capacity: usize },

    #[error("alert rejected: {0}")]
    Rejected(String),
}

/// Persistence failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] sqlite::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("invalid stored value: {0}")]
    Invalid(#[from] ValidationError),

    #[error("corrupt column '{column}': {value}")]
    Corrupt { column: &'static str, value: String },
}

/// Transport-level failure while fetching a feed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("server returned HTTP {0}")]
    Status(u16),
}

/// Feed bytes were not valid text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("feed is not valid UTF-8: {0}")]
pub struct DecodeError(pub String);

/// Per-source sync failure. Collected, never propagated past `sync_all`.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Failures of the escalation engine entry points.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
