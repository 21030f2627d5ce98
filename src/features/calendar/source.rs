//! Remote calendar feed sources and their locally-overridden event keys.

use crate::core::ValidationError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

pub const DEFAULT_SYNC_INTERVAL_MINUTES: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFeedSource {
    pub id: Uuid,
    pub name: String,
    pub endpoint: String,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub sync_interval_minutes: i64,

    /// Origin keys the user has taken local ownership of
    pub ignored_origin_keys: BTreeSet<String>,
}

impl RemoteFeedSource {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        RemoteFeedSource {
            id: Uuid::new_v4(),
            name: name.into(),
            endpoint: endpoint.into(),
            last_synced_at: None,
            enabled: true,
            sync_interval_minutes: DEFAULT_SYNC_INTERVAL_MINUTES,
            ignored_origin_keys: BTreeSet::new(),
        }
    }

    pub fn with_interval(mut self, minutes: i64) -> Result<Self, ValidationError> {
        if minutes < 1 {
            return Err(ValidationError::InvalidSyncInterval(minutes));
        }
        self.sync_interval_minutes = minutes;
        Ok(self)
    }

    /// Returns true if the key was newly added
    pub fn ignore_origin_key(&mut self, key: impl Into<String>) -> bool {
        self.ignored_origin_keys.insert(key.into())
    }

    pub fn is_ignored(&self, key: &str) -> bool {
        self.ignored_origin_keys.contains(key)
    }

    /// Never synced, or the resync interval has elapsed
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_synced_at {
            None => true,
            Some(last) => now - last >= Duration::minutes(self.sync_interval_minutes),
        }
    }

    pub fn encode_ignored(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.ignored_origin_keys)
    }

    pub fn decode_ignored(raw: &str) -> serde_json::Result<BTreeSet<String>> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_is_due() {
        let now = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
        let mut source = RemoteFeedSource::new("Work", "https://example.com/work.ics")
            .with_interval(30)
            .unwrap();
        assert!(source.is_due(now));

        source.last_synced_at = Some(now - Duration::minutes(29));
        assert!(!source.is_due(now));

        source.last_synced_at = Some(now - Duration::minutes(30));
        assert!(source.is_due(now));
    }

    #[test]
    fn test_invalid_interval() {
        let result = RemoteFeedSource::new("Work", "https://example.com").with_interval(0);
        assert_eq!(result.unwrap_err(), ValidationError::InvalidSyncInterval(0));
    }

    #[test]
    fn test_ignored_keys_roundtrip_through_encoding() {
        let mut source = RemoteFeedSource::new("Home", "https://example.com/home.ics");
        assert!(source.ignore_origin_key("evt-1"));
        assert!(!source.ignore_origin_key("evt-1"));
        source.ignore_origin_key("evt-0");

        let raw = source.encode_ignored().unwrap();
        assert_eq!(raw, r#"["evt-0","evt-1"]"#);
        assert_eq!(RemoteFeedSource::decode_ignored(&raw).unwrap(), source.ignored_origin_keys);
        assert!(source.is_ignored("evt-0"));
        assert!(!source.is_ignored("evt-2"));
    }
}
