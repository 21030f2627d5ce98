//! Persistence seam. The engines take a `&dyn RecordStore` so tests and the
//! daemon can share the same code paths.

use crate::core::error::StoreResult;
use crate::features::calendar::RemoteFeedSource;
use crate::features::escalation::{EscalationPolicy, ReminderRecord};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or update by id
    async fn save_reminder(&self, reminder: &ReminderRecord) -> StoreResult<()>;

    /// Save several reminders in one transaction
    async fn save_reminders(&self, reminders: &[ReminderRecord]) -> StoreResult<()>;

    /// Rewrite title, description, date, time, recurrence and `updated_at`
    /// of a remote reminder, leaving lifecycle columns alone. Returns false
    /// when no remote reminder with that id exists.
    async fn update_reminder_content(&self, reminder: &ReminderRecord) -> StoreResult<bool>;

    async fn get_reminder(&self, id: Uuid) -> StoreResult<Option<ReminderRecord>>;

    async fn delete_reminder(&self, id: Uuid) -> StoreResult<bool>;

    async fn list_reminders(&self) -> StoreResult<Vec<ReminderRecord>>;

    async fn find_by_origin_key(&self, origin_key: &str) -> StoreResult<Option<ReminderRecord>>;

    async fn save_policy(&self, policy: &EscalationPolicy) -> StoreResult<()>;

    async fn get_policy(&self, id: Uuid) -> StoreResult<Option<EscalationPolicy>>;

    async fn find_policy_by_name(&self, name: &str) -> StoreResult<Option<EscalationPolicy>>;

    async fn list_policies(&self) -> StoreResult<Vec<EscalationPolicy>>;

    /// Detaches reminders that referenced the policy, then removes it
    async fn delete_policy(&self, id: Uuid) -> StoreResult<bool>;

    async fn save_source(&self, source: &RemoteFeedSource) -> StoreResult<()>;

    async fn get_source(&self, id: Uuid) -> StoreResult<Option<RemoteFeedSource>>;

    async fn list_sources(&self) -> StoreResult<Vec<RemoteFeedSource>>;

    async fn find_enabled_sources(&self) -> StoreResult<Vec<RemoteFeedSource>>;

    async fn delete_source(&self, id: Uuid) -> StoreResult<bool>;
}
