//! # Calendar Feature
//!
//! iCalendar import and export, plus the sync engine that mirrors remote
//! feeds into reminders.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.4.0
//! - **Toggleable**: true
//!
//! ## Changelog
//! - 1.2.0: Per-source sync locks
//! - 1.1.0: Calendar export
//! - 1.0.0: Initial release with feed import

pub mod fetch;
pub mod parser;
pub mod serializer;
pub mod source;
pub mod sync;

pub use fetch::{decode_text, Fetcher, HttpFetcher};
pub use parser::{parse, CalendarEvent};
pub use serializer::{serialize, serialize_one};
pub use source::RemoteFeedSource;
pub use sync::{CalendarSyncEngine, MergeCounts, SourceSyncResult, SyncReport};
