/// Persisted settings schema and the derived configuration snapshot
use crate::domain::normalize_domain;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Custom group names: user label -> domains grouped under it
pub type GroupNames = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    Local,
    Sync,
}

impl StorageArea {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageArea::Local => "local",
            StorageArea::Sync => "sync",
        }
    }
}

/// Every settings field the engine reads or reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingKey {
    SubdomainEnabled,
    GroupTop,
    GroupSortMode,
    GroupNames,
    Accordion,
    ExtensionReplace,
    ExtensionReplaceMap,
    Whitelist,
    ExtensionWhitelist,
    EnableNewtabGrouping,
    ClearGroupedTabs,
}

impl SettingKey {
    pub const ALL: [SettingKey; 11] = [
        SettingKey::SubdomainEnabled,
        SettingKey::GroupTop,
        SettingKey::GroupSortMode,
        SettingKey::GroupNames,
        SettingKey::Accordion,
        SettingKey::ExtensionReplace,
        SettingKey::ExtensionReplaceMap,
        SettingKey::Whitelist,
        SettingKey::ExtensionWhitelist,
        SettingKey::EnableNewtabGrouping,
        SettingKey::ClearGroupedTabs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::SubdomainEnabled => "subdomainEnabled",
            SettingKey::GroupTop => "groupTop",
            SettingKey::GroupSortMode => "groupSortMode",
            SettingKey::GroupNames => "groupNames",
            SettingKey::Accordion => "accordion",
            SettingKey::ExtensionReplace => "extensionReplace",
            SettingKey::ExtensionReplaceMap => "extensionReplaceMap",
            SettingKey::Whitelist => "whitelist",
            SettingKey::ExtensionWhitelist => "extensionWhitelist",
            SettingKey::EnableNewtabGrouping => "enableNewtabGrouping",
            SettingKey::ClearGroupedTabs => "clearGroupedTabs",
        }
    }

    pub fn from_name(name: &str) -> Option<SettingKey> {
        SettingKey::ALL.into_iter().find(|key| key.as_str() == name)
    }

    /// User-curated lists sync across devices; flags and derived maps stay local
    pub fn area(self) -> StorageArea {
        match self {
            SettingKey::Whitelist | SettingKey::GroupNames | SettingKey::ExtensionWhitelist => StorageArea::Sync,
            _ => StorageArea::Local,
        }
    }
}

/// How groups are ordered after a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Default,
    Name,
    Append,
}

/// Settings as persisted, with defaults applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub subdomain_enabled: bool,
    pub group_top: bool,
    pub sort_mode: SortMode,
    pub group_names: GroupNames,
    pub accordion: bool,
    pub extension_replace: bool,
    pub extension_replace_map: HashMap<String, String>,
    pub whitelist: Vec<String>,
    pub extension_whitelist: Vec<String>,
    pub enable_newtab_grouping: bool,
    pub clear_grouped_tabs: bool,
}

impl Settings {
    /// Decode settings from raw stored values; `lookup` returns what the store holds for a key
    pub fn from_values(mut lookup: impl FnMut(SettingKey) -> Option<Value>) -> Settings {
        Settings {
            subdomain_enabled: decode(SettingKey::SubdomainEnabled, lookup(SettingKey::SubdomainEnabled)),
            group_top: decode(SettingKey::GroupTop, lookup(SettingKey::GroupTop)),
            sort_mode: decode(SettingKey::GroupSortMode, lookup(SettingKey::GroupSortMode)),
            group_names: decode(SettingKey::GroupNames, lookup(SettingKey::GroupNames)),
            accordion: decode(SettingKey::Accordion, lookup(SettingKey::Accordion)),
            extension_replace: decode(SettingKey::ExtensionReplace, lookup(SettingKey::ExtensionReplace)),
            extension_replace_map: decode(SettingKey::ExtensionReplaceMap, lookup(SettingKey::ExtensionReplaceMap)),
            whitelist: decode(SettingKey::Whitelist, lookup(SettingKey::Whitelist)),
            extension_whitelist: decode(SettingKey::ExtensionWhitelist, lookup(SettingKey::ExtensionWhitelist)),
            enable_newtab_grouping: decode(
                SettingKey::EnableNewtabGrouping,
                lookup(SettingKey::EnableNewtabGrouping),
            ),
            clear_grouped_tabs: decode(SettingKey::ClearGroupedTabs, lookup(SettingKey::ClearGroupedTabs)),
        }
    }
}

/// Decode one stored value, falling back to the default when absent or malformed
pub fn decode<T: DeserializeOwned + Default>(key: SettingKey, value: Option<Value>) -> T {
    match value {
        None | Some(Value::Null) => T::default(),
        Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
            log::warn!("Ignoring malformed setting {}: {}", key.as_str(), e);
            T::default()
        }),
    }
}

/// Settings plus the lookup structures the classifier needs
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    pub settings: Settings,
    whitelist_set: HashSet<String>,
    domain_to_label: HashMap<String, String>,
}

impl ConfigSnapshot {
    pub fn new(settings: Settings) -> ConfigSnapshot {
        let whitelist_set = settings
            .whitelist
            .iter()
            .map(|entry| normalize_domain(entry))
            .filter(|entry| !entry.is_empty())
            .collect();

        let mut domain_to_label = HashMap::new();
        for (label, domains) in &settings.group_names {
            for domain in domains {
                domain_to_label.insert(normalize_domain(domain), label.clone());
            }
        }

        ConfigSnapshot {
            settings,
            whitelist_set,
            domain_to_label,
        }
    }

    /// Exact match first, then either string containing the other
    pub fn is_whitelisted(&self, base_key: &str) -> bool {
        if self.whitelist_set.contains(base_key) {
            return true;
        }
        self.whitelist_set
            .iter()
            .any(|entry| base_key.contains(entry.as_str()) || entry.contains(base_key))
    }

    pub fn is_extension_whitelisted(&self, id: &str) -> bool {
        self.settings.extension_whitelist.iter().any(|entry| entry == id)
    }

    pub fn custom_label(&self, base_key: &str) -> Option<&str> {
        self.domain_to_label.get(base_key).map(String::as_str)
    }

    /// Label for an extension page, honoring the name substitution toggle
    pub fn extension_label(&self, extension_id: &str) -> String {
        if self.settings.extension_replace {
            if let Some(name) = self.settings.extension_replace_map.get(extension_id) {
                return name.clone();
            }
        }
        extension_id.to_string()
    }

    pub fn needs_reorder(&self) -> bool {
        self.settings.group_top || self.settings.sort_mode == SortMode::Name
    }
}
