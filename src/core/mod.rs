//! # Core Module
//!
//! Configuration, error types, clock, and the record-store seam shared by
//! the escalation and calendar features.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.2.0: Added RecordStore trait so engines take persistence as a parameter
//! - 1.1.0: Added Clock abstraction
//! - 1.0.0: Initial creation with config and error modules

pub mod clock;
pub mod config;
pub mod error;
pub mod store;

// Re-export commonly used items
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use error::{
    DecodeError, EngineError, EngineResult, FetchError, SchedulingError, StoreError, StoreResult,
    SyncError, ValidationError,
};
pub use store::RecordStore;
