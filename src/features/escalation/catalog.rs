//! # Policy Catalog
//!
//! Preset seeding, custom policy management, and the YAML file of custom
//! policies loaded at startup.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.3.0
//!
//! ## Changelog
//! - 1.1.0: Custom policies can be declared in a YAML file
//! - 1.0.0: Initial release

use crate::core::{EngineResult, RecordStore, ValidationError};
use crate::features::escalation::policy::{EscalationPolicy, EscalationStep};
use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Insert the four presets when the store has none yet
pub async fn seed_presets(store: &dyn RecordStore) -> EngineResult<usize> {
    let existing = store.list_policies().await?;
    if existing.iter().any(|p| p.is_preset) {
        return Ok(0);
    }

    let presets = EscalationPolicy::presets();
    for preset in &presets {
        store.save_policy(preset).await?;
    }
    info!("Seeded {} preset escalation policies", presets.len());
    Ok(presets.len())
}

pub async fn create_policy(
    store: &dyn RecordStore,
    name: &str,
    steps: Vec<EscalationStep>,
) -> EngineResult<EscalationPolicy> {
    if EscalationPolicy::is_preset_name(name) {
        return Err(ValidationError::PresetImmutable(name.to_string()).into());
    }
    let policy = EscalationPolicy::new(name, steps)?;
    store.save_policy(&policy).await?;
    info!("Created escalation policy '{}' ({} steps)", policy.name, policy.steps.len());
    Ok(policy)
}

/// Replace a custom policy's name and steps. Reminders already armed with it
/// keep their scheduled alerts until they are next armed.
pub async fn update_policy(store: &dyn RecordStore, policy: &EscalationPolicy) -> EngineResult<()> {
    if let Some(stored) = store.get_policy(policy.id).await? {
        if stored.is_preset {
            return Err(ValidationError::PresetImmutable(stored.name).into());
        }
    }
    if policy.is_preset || EscalationPolicy::is_preset_name(&policy.name) {
        return Err(ValidationError::PresetImmutable(policy.name.clone()).into());
    }
    policy.validate()?;
    store.save_policy(policy).await?;
    info!("Updated escalation policy '{}'", policy.name);
    Ok(())
}

pub async fn delete_policy(store: &dyn RecordStore, id: Uuid) -> EngineResult<bool> {
    let Some(policy) = store.get_policy(id).await? else {
        return Ok(false);
    };
    if policy.is_preset {
        return Err(ValidationError::PresetImmutable(policy.name).into());
    }
    let deleted = store.delete_policy(id).await?;
    info!("Deleted escalation policy '{}'", policy.name);
    Ok(deleted)
}

/// Root of the custom policies file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyFile {
    #[serde(default)]
    pub policies: Vec<PolicyDefinition>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyDefinition {
    pub name: String,
    pub steps: Vec<EscalationStep>,
}

impl PolicyFile {
    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let file: PolicyFile = serde_yaml::from_str(contents)?;
        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<()> {
        for definition in &self.policies {
            if EscalationPolicy::is_preset_name(&definition.name) {
                return Err(anyhow::anyhow!(
                    "Policy name '{}' is reserved for a preset",
                    definition.name
                ));
            }
            EscalationPolicy::new(definition.name.clone(), definition.steps.clone()).map_err(
                |e| anyhow::anyhow!("Invalid policy '{}': {}", definition.name, e),
            )?;
        }
        Ok(())
    }
}

/// Upsert every policy from the file by name; returns how many were written
pub async fn load_custom_policies(path: &str, store: &dyn RecordStore) -> Result<usize> {
    let file = PolicyFile::load(path)?;
    apply_policy_file(&file, store).await
}

pub async fn apply_policy_file(file: &PolicyFile, store: &dyn RecordStore) -> Result<usize> {
    let mut written = 0;
    for definition in &file.policies {
        let mut policy = EscalationPolicy::new(definition.name.clone(), definition.steps.clone())?;
        if let Some(existing) = store.find_policy_by_name(&definition.name).await? {
            if existing.is_preset {
                warn!("Skipping custom policy '{}': name belongs to a preset", definition.name);
                continue;
            }
            policy.id = existing.id;
        }
        store.save_policy(&policy).await?;
        written += 1;
    }
    info!("Loaded {} custom escalation policies", written);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EngineError;
    use crate::database::Database;
    use crate::features::escalation::policy::AlertKind;

    const POLICIES_YAML: &str = r#"
policies:
  - name: Medication
    steps:
      - kind: push
        delay_minutes: 0
      - kind: alarm
        delay_minutes: 10
        repeat_interval_minutes: 5
"#;

    #[tokio::test]
    async fn test_seed_presets_only_once() {
        let store = Database::in_memory().await.unwrap();
        assert_eq!(seed_presets(&store).await.unwrap(), 4);
        assert_eq!(seed_presets(&store).await.unwrap(), 0);
        assert_eq!(store.list_policies().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_presets_are_immutable() {
        let store = Database::in_memory().await.unwrap();
        seed_presets(&store).await.unwrap();
        let mut standard = store.find_policy_by_name("Standard").await.unwrap().unwrap();

        standard.steps.push(EscalationStep::alarm(500));
        assert!(matches!(
            update_policy(&store, &standard).await,
            Err(EngineError::Validation(ValidationError::PresetImmutable(_)))
        ));
        assert!(delete_policy(&store, standard.id).await.is_err());
        assert!(create_policy(&store, "nuclear", vec![EscalationStep::push(0)]).await.is_err());
    }

    #[tokio::test]
    async fn test_custom_policy_lifecycle() {
        let store = Database::in_memory().await.unwrap();
        let mut policy = create_policy(&store, "Morning", vec![EscalationStep::push(0)])
            .await
            .unwrap();

        policy.steps.push(EscalationStep::alarm(30));
        update_policy(&store, &policy).await.unwrap();
        let stored = store.get_policy(policy.id).await.unwrap().unwrap();
        assert_eq!(stored.steps.len(), 2);

        policy.steps.push(EscalationStep::push(-1));
        assert!(update_policy(&store, &policy).await.is_err());

        assert!(delete_policy(&store, policy.id).await.unwrap());
        assert!(!delete_policy(&store, policy.id).await.unwrap());
    }

    #[test]
    fn test_policy_file_parses_and_rejects_presets() {
        let file = PolicyFile::parse(POLICIES_YAML).unwrap();
        assert_eq!(file.policies.len(), 1);
        assert_eq!(file.policies[0].steps[1].kind, AlertKind::Alarm);
        assert_eq!(file.policies[0].steps[1].repeat_interval_minutes, Some(5));

        let reserved = "policies:\n  - name: Gentle\n    steps:\n      - kind: push\n        delay_minutes: 0\n";
        assert!(PolicyFile::parse(reserved).is_err());

        let empty = "policies:\n  - name: Empty\n    steps: []\n";
        assert!(PolicyFile::parse(empty).is_err());

        let bad_kind = "policies:\n  - name: Siren\n    steps:\n      - kind: siren\n        delay_minutes: 0\n";
        assert!(PolicyFile::parse(bad_kind).is_err());
    }

    #[tokio::test]
    async fn test_policy_file_upserts_by_name() {
        let store = Database::in_memory().await.unwrap();
        let file = PolicyFile::parse(POLICIES_YAML).unwrap();

        assert_eq!(apply_policy_file(&file, &store).await.unwrap(), 1);
        let first = store.find_policy_by_name("Medication").await.unwrap().unwrap();
        assert_eq!(apply_policy_file(&file, &store).await.unwrap(), 1);
        let second = store.find_policy_by_name("Medication").await.unwrap().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.list_policies().await.unwrap().len(), 1);
    }
}
