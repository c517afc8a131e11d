/// Settings store access and the mutations front-ends request through it
use crate::config::{decode, GroupNames, SettingKey};
use crate::error::StoreError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key-value settings storage with per-key areas
#[allow(async_fn_in_trait)]
pub trait SettingsStore {
    async fn get(&self, key: SettingKey) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: SettingKey, value: Value) -> Result<(), StoreError>;

    async fn remove(&self, key: SettingKey) -> Result<(), StoreError>;
}

/// Read one setting, defaulting when it is absent or malformed
pub async fn read<S, T>(store: &S, key: SettingKey) -> Result<T, StoreError>
where
    S: SettingsStore,
    T: DeserializeOwned + Default,
{
    let value = store.get(key).await?;
    Ok(decode(key, value))
}

pub async fn write<S, T>(store: &S, key: SettingKey, value: &T) -> Result<(), StoreError>
where
    S: SettingsStore,
    T: Serialize,
{
    let value = serde_json::to_value(value).map_err(|e| StoreError::Write {
        key: key.as_str(),
        message: e.to_string(),
    })?;
    store.set(key, value).await
}

/// The portable part of the configuration: whitelist and custom group names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigExport {
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub group_names: GroupNames,
}

impl ConfigExport {
    /// Union `imported` into this configuration, keeping existing entries and their order
    pub fn merge(&mut self, imported: ConfigExport) {
        for entry in imported.whitelist {
            add_whitelist_entry(&mut self.whitelist, &entry);
        }
        for (label, domains) in imported.group_names {
            let existing = self.group_names.entry(label).or_default();
            for domain in domains {
                if !existing.contains(&domain) {
                    existing.push(domain);
                }
            }
        }
    }
}

pub fn add_whitelist_entry(whitelist: &mut Vec<String>, entry: &str) -> bool {
    let entry = entry.trim();
    if entry.is_empty() || whitelist.iter().any(|existing| existing == entry) {
        return false;
    }
    whitelist.push(entry.to_string());
    true
}

pub fn remove_whitelist_entry(whitelist: &mut Vec<String>, entry: &str) -> bool {
    let original_len = whitelist.len();
    whitelist.retain(|existing| existing != entry);
    whitelist.len() < original_len
}

/// File `domain` under `label`, taking it away from any other label
///
/// Labels left without domains are removed. Returns false when nothing changed.
pub fn assign_group_domain(group_names: &mut GroupNames, label: &str, domain: &str) -> bool {
    let already_assigned = group_names
        .get(label)
        .is_some_and(|domains| domains.iter().any(|d| d == domain));
    let claimed_elsewhere = group_names
        .iter()
        .any(|(other, domains)| other != label && domains.iter().any(|d| d == domain));
    if already_assigned && !claimed_elsewhere {
        return false;
    }

    for (other, domains) in group_names.iter_mut() {
        if other != label {
            domains.retain(|d| d != domain);
        }
    }
    group_names.retain(|other, domains| other == label || !domains.is_empty());

    let domains = group_names.entry(label.to_string()).or_default();
    if !domains.iter().any(|d| d == domain) {
        domains.push(domain.to_string());
    }
    true
}

pub fn remove_group(group_names: &mut GroupNames, label: &str) -> bool {
    group_names.remove(label).is_some()
}
