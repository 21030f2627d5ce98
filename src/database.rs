//! # Database
//!
//! SQLite-backed record store for reminders, escalation policies, and feed
//! sources. A single connection is shared behind an async mutex; every
//! statement runs to completion before the lock is released.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 2.0.0: Implements RecordStore; enum columns decode fail-closed
//! - 1.1.0: Unique origin key index for feed-sourced reminders
//! - 1.0.0: Initial schema

use crate::core::error::{StoreError, StoreResult};
use crate::core::RecordStore;
use crate::features::calendar::RemoteFeedSource;
use crate::features::escalation::{EscalationPolicy, ReminderRecord};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use log::{debug, info, warn};
use sqlite::{Connection, State, Statement};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS escalation_policies (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        steps TEXT NOT NULL,
        is_preset INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS reminders (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT,
        reminder_date TEXT NOT NULL,
        reminder_time TEXT,
        recurrence_rule TEXT,
        state TEXT NOT NULL,
        escalation_policy_id TEXT,
        current_step_index INTEGER NOT NULL DEFAULT 0,
        snoozed_until TEXT,
        source_kind TEXT NOT NULL,
        origin_key TEXT,
        source_id TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_reminders_origin_key
        ON reminders(origin_key) WHERE origin_key IS NOT NULL;

    CREATE TABLE IF NOT EXISTS feed_sources (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        endpoint TEXT NOT NULL,
        last_synced_at TEXT,
        enabled INTEGER NOT NULL DEFAULT 1,
        sync_interval_minutes INTEGER NOT NULL DEFAULT 60,
        ignored_origin_keys TEXT NOT NULL DEFAULT '[]'
    );
";

const REMINDER_COLUMNS: &str = "id, title, description, reminder_date, reminder_time, \
    recurrence_rule, state, escalation_policy_id, current_step_index, snoozed_until, \
    source_kind, origin_key, source_id, created_at, updated_at";

const UPSERT_REMINDER: &str = "
    INSERT INTO reminders (id, title, description, reminder_date, reminder_time,
        recurrence_rule, state, escalation_policy_id, current_step_index, snoozed_until,
        source_kind, origin_key, source_id, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        title = excluded.title,
        description = excluded.description,
        reminder_date = excluded.reminder_date,
        reminder_time = excluded.reminder_time,
        recurrence_rule = excluded.recurrence_rule,
        state = excluded.state,
        escalation_policy_id = excluded.escalation_policy_id,
        current_step_index = excluded.current_step_index,
        snoozed_until = excluded.snoozed_until,
        source_kind = excluded.source_kind,
        origin_key = excluded.origin_key,
        source_id = excluded.source_id,
        updated_at = excluded.updated_at";

// Lifecycle columns (state, cursor, snooze) are owned by the engine
const UPDATE_REMINDER_CONTENT: &str = "
    UPDATE reminders SET
        title = ?,
        description = ?,
        reminder_date = ?,
        reminder_time = ?,
        recurrence_rule = ?,
        updated_at = ?
    WHERE id = ? AND source_kind = 'remote'";

const SOURCE_COLUMNS: &str =
    "id, name, endpoint, last_synced_at, enabled, sync_interval_minutes, ignored_origin_keys";

#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file and apply the schema
    pub async fn new(path: &str) -> StoreResult<Self> {
        let connection = sqlite::open(path)?;
        connection.execute("PRAGMA foreign_keys = ON;")?;
        connection.execute(SCHEMA)?;
        info!("Opened reminder database at {path}");
        Ok(Database {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Private in-memory database, used by tests
    pub async fn in_memory() -> StoreResult<Self> {
        Self::new(":memory:").await
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339()
}

fn parse_instant(column: &'static str, raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt {
            column,
            value: raw.to_string(),
        })
}

fn parse_optional_instant(column: &'static str, raw: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    raw.map(|value| parse_instant(column, &value)).transpose()
}

fn parse_uuid(column: &'static str, raw: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| StoreError::Corrupt {
        column,
        value: raw.to_string(),
    })
}

fn parse_optional_uuid(column: &'static str, raw: Option<String>) -> StoreResult<Option<Uuid>> {
    raw.map(|value| parse_uuid(column, &value)).transpose()
}

fn bind_reminder(statement: &mut Statement<'_>, reminder: &ReminderRecord) -> StoreResult<()> {
    let id = reminder.id.to_string();
    let date = reminder.reminder_date.format("%Y-%m-%d").to_string();
    let time = reminder
        .reminder_time
        .map(|t| t.format("%H:%M:%S").to_string());
    let state = reminder.state().to_string();
    let policy_id = reminder.escalation_policy_id.map(|id| id.to_string());
    let snoozed_until = reminder.snoozed_until().map(|t| format_instant(&t));
    let source_kind = reminder.source_kind.to_string();
    let source_id = reminder.source_id.map(|id| id.to_string());
    let created_at = format_instant(&reminder.created_at);
    let updated_at = format_instant(&reminder.updated_at);

    statement.bind((1, id.as_str()))?;
    statement.bind((2, reminder.title.as_str()))?;
    statement.bind((3, reminder.description.as_deref()))?;
    statement.bind((4, date.as_str()))?;
    statement.bind((5, time.as_deref()))?;
    statement.bind((6, reminder.recurrence_rule.as_deref()))?;
    statement.bind((7, state.as_str()))?;
    statement.bind((8, policy_id.as_deref()))?;
    statement.bind((9, reminder.current_step_index() as i64))?;
    statement.bind((10, snoozed_until.as_deref()))?;
    statement.bind((11, source_kind.as_str()))?;
    statement.bind((12, reminder.origin_key.as_deref()))?;
    statement.bind((13, source_id.as_deref()))?;
    statement.bind((14, created_at.as_str()))?;
    statement.bind((15, updated_at.as_str()))?;
    Ok(())
}

fn read_reminder(statement: &Statement<'_>) -> StoreResult<ReminderRecord> {
    let raw_date = statement.read::<String, _>("reminder_date")?;
    let reminder_date = NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d").map_err(|_| {
        StoreError::Corrupt {
            column: "reminder_date",
            value: raw_date.clone(),
        }
    })?;

    let reminder_time = match statement.read::<Option<String>, _>("reminder_time")? {
        Some(raw) => Some(NaiveTime::parse_from_str(&raw, "%H:%M:%S").map_err(|_| {
            StoreError::Corrupt {
                column: "reminder_time",
                value: raw.clone(),
            }
        })?),
        None => None,
    };

    let step_index = statement.read::<i64, _>("current_step_index")?;
    let current_step_index = usize::try_from(step_index).map_err(|_| StoreError::Corrupt {
        column: "current_step_index",
        value: step_index.to_string(),
    })?;

    Ok(ReminderRecord {
        id: parse_uuid("id", &statement.read::<String, _>("id")?)?,
        title: statement.read::<String, _>("title")?,
        description: statement.read::<Option<String>, _>("description")?,
        reminder_date,
        reminder_time,
        recurrence_rule: statement.read::<Option<String>, _>("recurrence_rule")?,
        state: statement.read::<String, _>("state")?.parse()?,
        escalation_policy_id: parse_optional_uuid(
            "escalation_policy_id",
            statement.read::<Option<String>, _>("escalation_policy_id")?,
        )?,
        current_step_index,
        snoozed_until: parse_optional_instant(
            "snoozed_until",
            statement.read::<Option<String>, _>("snoozed_until")?,
        )?,
        source_kind: statement.read::<String, _>("source_kind")?.parse()?,
        origin_key: statement.read::<Option<String>, _>("origin_key")?,
        source_id: parse_optional_uuid(
            "source_id",
            statement.read::<Option<String>, _>("source_id")?,
        )?,
        created_at: parse_instant("created_at", &statement.read::<String, _>("created_at")?)?,
        updated_at: parse_instant("updated_at", &statement.read::<String, _>("updated_at")?)?,
    })
}

fn read_policy(statement: &Statement<'_>) -> StoreResult<EscalationPolicy> {
    Ok(EscalationPolicy {
        id: parse_uuid("id", &statement.read::<String, _>("id")?)?,
        name: statement.read::<String, _>("name")?,
        steps: EscalationPolicy::decode_steps(&statement.read::<String, _>("steps")?)?,
        is_preset: statement.read::<i64, _>("is_preset")? != 0,
    })
}

fn read_source(statement: &Statement<'_>) -> StoreResult<RemoteFeedSource> {
    Ok(RemoteFeedSource {
        id: parse_uuid("id", &statement.read::<String, _>("id")?)?,
        name: statement.read::<String, _>("name")?,
        endpoint: statement.read::<String, _>("endpoint")?,
        last_synced_at: parse_optional_instant(
            "last_synced_at",
            statement.read::<Option<String>, _>("last_synced_at")?,
        )?,
        enabled: statement.read::<i64, _>("enabled")? != 0,
        sync_interval_minutes: statement.read::<i64, _>("sync_interval_minutes")?,
        ignored_origin_keys: RemoteFeedSource::decode_ignored(
            &statement.read::<String, _>("ignored_origin_keys")?,
        )?,
    })
}

// ============================================================================
// Statement helpers (run while the connection lock is held)
// ============================================================================

fn upsert_reminder(connection: &Connection, reminder: &ReminderRecord) -> StoreResult<()> {
    let mut statement = connection.prepare(UPSERT_REMINDER)?;
    bind_reminder(&mut statement, reminder)?;
    while let State::Row = statement.next()? {}
    Ok(())
}

fn query_reminders(connection: &Connection, filter: &str, param: Option<&str>) -> StoreResult<Vec<ReminderRecord>> {
    let sql = format!("SELECT {REMINDER_COLUMNS} FROM reminders {filter}");
    let mut statement = connection.prepare(sql)?;
    if let Some(value) = param {
        statement.bind((1, value))?;
    }
    let mut rows = Vec::new();
    while let State::Row = statement.next()? {
        rows.push(read_reminder(&statement)?);
    }
    Ok(rows)
}

fn query_policies(connection: &Connection, filter: &str, param: Option<&str>) -> StoreResult<Vec<EscalationPolicy>> {
    let sql = format!("SELECT id, name, steps, is_preset FROM escalation_policies {filter}");
    let mut statement = connection.prepare(sql)?;
    if let Some(value) = param {
        statement.bind((1, value))?;
    }
    let mut rows = Vec::new();
    while let State::Row = statement.next()? {
        rows.push(read_policy(&statement)?);
    }
    Ok(rows)
}

fn query_sources(connection: &Connection, filter: &str, param: Option<&str>) -> StoreResult<Vec<RemoteFeedSource>> {
    let sql = format!("SELECT {SOURCE_COLUMNS} FROM feed_sources {filter}");
    let mut statement = connection.prepare(sql)?;
    if let Some(value) = param {
        statement.bind((1, value))?;
    }
    let mut rows = Vec::new();
    while let State::Row = statement.next()? {
        rows.push(read_source(&statement)?);
    }
    Ok(rows)
}

fn delete_by_id(connection: &Connection, table: &str, id: Uuid) -> StoreResult<bool> {
    let id = id.to_string();
    let mut statement = connection.prepare(format!("DELETE FROM {table} WHERE id = ?"))?;
    statement.bind((1, id.as_str()))?;
    while let State::Row = statement.next()? {}
    Ok(connection.change_count() > 0)
}

fn in_transaction<T, F>(connection: &Connection, work: F) -> StoreResult<T>
where
    F: FnOnce(&Connection) -> StoreResult<T>,
{
    connection.execute("BEGIN IMMEDIATE")?;
    match work(connection) {
        Ok(value) => {
            connection.execute("COMMIT")?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = connection.execute("ROLLBACK") {
                warn!("Rollback failed after {e}: {rollback}");
            }
            Err(e)
        }
    }
}

#[async_trait]
impl RecordStore for Database {
    async fn save_reminder(&self, reminder: &ReminderRecord) -> StoreResult<()> {
        let connection = self.connection.lock().await;
        upsert_reminder(&connection, reminder)?;
        debug!("Saved reminder {} ({})", reminder.id, reminder.state());
        Ok(())
    }

    async fn save_reminders(&self, reminders: &[ReminderRecord]) -> StoreResult<()> {
        if reminders.is_empty() {
            return Ok(());
        }
        let connection = self.connection.lock().await;
        in_transaction(&connection, |conn| {
            for reminder in reminders {
                upsert_reminder(conn, reminder)?;
            }
            Ok(())
        })?;
        debug!("Saved {} reminders in one transaction", reminders.len());
        Ok(())
    }

    async fn update_reminder_content(&self, reminder: &ReminderRecord) -> StoreResult<bool> {
        let id = reminder.id.to_string();
        let date = reminder.reminder_date.format("%Y-%m-%d").to_string();
        let time = reminder
            .reminder_time
            .map(|t| t.format("%H:%M:%S").to_string());
        let updated_at = format_instant(&reminder.updated_at);

        let connection = self.connection.lock().await;
        let mut statement = connection.prepare(UPDATE_REMINDER_CONTENT)?;
        statement.bind((1, reminder.title.as_str()))?;
        statement.bind((2, reminder.description.as_deref()))?;
        statement.bind((3, date.as_str()))?;
        statement.bind((4, time.as_deref()))?;
        statement.bind((5, reminder.recurrence_rule.as_deref()))?;
        statement.bind((6, updated_at.as_str()))?;
        statement.bind((7, id.as_str()))?;
        while let State::Row = statement.next()? {}
        drop(statement);

        let updated = connection.change_count() > 0;
        if updated {
            debug!("Updated content of reminder {}", reminder.id);
        }
        Ok(updated)
    }

    async fn get_reminder(&self, id: Uuid) -> StoreResult<Option<ReminderRecord>> {
        let connection = self.connection.lock().await;
        let id = id.to_string();
        Ok(query_reminders(&connection, "WHERE id = ?", Some(&id))?
            .into_iter()
            .next())
    }

    async fn delete_reminder(&self, id: Uuid) -> StoreResult<bool> {
        let connection = self.connection.lock().await;
        delete_by_id(&connection, "reminders", id)
    }

    async fn list_reminders(&self) -> StoreResult<Vec<ReminderRecord>> {
        let connection = self.connection.lock().await;
        query_reminders(&connection, "ORDER BY reminder_date, reminder_time, created_at", None)
    }

    async fn find_by_origin_key(&self, origin_key: &str) -> StoreResult<Option<ReminderRecord>> {
        let connection = self.connection.lock().await;
        Ok(query_reminders(&connection, "WHERE origin_key = ?", Some(origin_key))?
            .into_iter()
            .next())
    }

    async fn save_policy(&self, policy: &EscalationPolicy) -> StoreResult<()> {
        let steps = EscalationPolicy::encode_steps(&policy.steps)?;
        let id = policy.id.to_string();
        let connection = self.connection.lock().await;
        let mut statement = connection.prepare(
            "INSERT INTO escalation_policies (id, name, steps, is_preset) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                steps = excluded.steps,
                is_preset = excluded.is_preset",
        )?;
        statement.bind((1, id.as_str()))?;
        statement.bind((2, policy.name.as_str()))?;
        statement.bind((3, steps.as_str()))?;
        statement.bind((4, i64::from(policy.is_preset)))?;
        while let State::Row = statement.next()? {}
        Ok(())
    }

    async fn get_policy(&self, id: Uuid) -> StoreResult<Option<EscalationPolicy>> {
        let connection = self.connection.lock().await;
        let id = id.to_string();
        Ok(query_policies(&connection, "WHERE id = ?", Some(&id))?
            .into_iter()
            .next())
    }

    async fn find_policy_by_name(&self, name: &str) -> StoreResult<Option<EscalationPolicy>> {
        let connection = self.connection.lock().await;
        // Presets win over a custom policy that happens to share the name
        Ok(query_policies(
            &connection,
            "WHERE name = ? ORDER BY is_preset DESC LIMIT 1",
            Some(name),
        )?
        .into_iter()
        .next())
    }

    async fn list_policies(&self) -> StoreResult<Vec<EscalationPolicy>> {
        let connection = self.connection.lock().await;
        query_policies(&connection, "ORDER BY is_preset DESC, name", None)
    }

    async fn delete_policy(&self, id: Uuid) -> StoreResult<bool> {
        let connection = self.connection.lock().await;
        in_transaction(&connection, |conn| {
            let raw_id = id.to_string();
            let mut detach = conn.prepare(
                "UPDATE reminders SET escalation_policy_id = NULL WHERE escalation_policy_id = ?",
            )?;
            detach.bind((1, raw_id.as_str()))?;
            while let State::Row = detach.next()? {}
            drop(detach);
            delete_by_id(conn, "escalation_policies", id)
        })
    }

    async fn save_source(&self, source: &RemoteFeedSource) -> StoreResult<()> {
        let ignored = source.encode_ignored()?;
        let id = source.id.to_string();
        let last_synced = source.last_synced_at.map(|t| format_instant(&t));
        let connection = self.connection.lock().await;
        let mut statement = connection.prepare(
            "INSERT INTO feed_sources (id, name, endpoint, last_synced_at, enabled,
                sync_interval_minutes, ignored_origin_keys)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                endpoint = excluded.endpoint,
                last_synced_at = excluded.last_synced_at,
                enabled = excluded.enabled,
                sync_interval_minutes = excluded.sync_interval_minutes,
                ignored_origin_keys = excluded.ignored_origin_keys",
        )?;
        statement.bind((1, id.as_str()))?;
        statement.bind((2, source.name.as_str()))?;
        statement.bind((3, source.endpoint.as_str()))?;
        statement.bind((4, last_synced.as_deref()))?;
        statement.bind((5, i64::from(source.enabled)))?;
        statement.bind((6, source.sync_interval_minutes))?;
        statement.bind((7, ignored.as_str()))?;
        while let State::Row = statement.next()? {}
        Ok(())
    }

    async fn get_source(&self, id: Uuid) -> StoreResult<Option<RemoteFeedSource>> {
        let connection = self.connection.lock().await;
        let id = id.to_string();
        Ok(query_sources(&connection, "WHERE id = ?", Some(&id))?
            .into_iter()
            .next())
    }

    async fn list_sources(&self) -> StoreResult<Vec<RemoteFeedSource>> {
        let connection = self.connection.lock().await;
        query_sources(&connection, "ORDER BY name", None)
    }

    async fn find_enabled_sources(&self) -> StoreResult<Vec<RemoteFeedSource>> {
        let connection = self.connection.lock().await;
        query_sources(&connection, "WHERE enabled = 1 ORDER BY name", None)
    }

    async fn delete_source(&self, id: Uuid) -> StoreResult<bool> {
        let connection = self.connection.lock().await;
        delete_by_id(&connection, "feed_sources", id)
    }
}
