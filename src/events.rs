/// Browser and settings events, and the work each one triggers
use crate::config::{decode, SettingKey};
use crate::debounce::WindowKey;
use crate::tab_data::{TabId, WindowId};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserEvent {
    TabUpdated { tab_id: TabId, window_id: WindowId, complete: bool },
    TabRemoved { tab_id: TabId, window_id: WindowId, window_closing: bool },
    TabActivated { tab_id: TabId, window_id: WindowId },
    WindowCreated { window_id: WindowId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Debounced plan-and-apply pass
    Regroup(WindowKey),
    Accordion { tab_id: TabId, window_id: WindowId },
    ClearGroupedTabs { window_id: WindowId },
}

pub fn route_event(event: &BrowserEvent) -> Option<Trigger> {
    match *event {
        BrowserEvent::TabUpdated { window_id, complete, .. } => {
            complete.then_some(Trigger::Regroup(WindowKey::Window(window_id)))
        }
        BrowserEvent::TabRemoved {
            window_id, window_closing, ..
        } => (!window_closing).then_some(Trigger::Regroup(WindowKey::Window(window_id))),
        BrowserEvent::TabActivated { tab_id, window_id } => Some(Trigger::Accordion { tab_id, window_id }),
        BrowserEvent::WindowCreated { window_id } => Some(Trigger::ClearGroupedTabs { window_id }),
    }
}

/// One changed settings field
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsChange {
    pub key: SettingKey,
    pub new_value: Option<Value>,
}

impl SettingsChange {
    pub fn new(key: SettingKey, new_value: Value) -> SettingsChange {
        SettingsChange {
            key,
            new_value: Some(new_value),
        }
    }

    /// Parse a storage change record (`{field: {oldValue, newValue}}`).
    /// Fields the engine does not know are ignored.
    pub fn parse_all(changes: &Map<String, Value>) -> Vec<SettingsChange> {
        changes
            .iter()
            .filter_map(|(name, change)| {
                let Some(key) = SettingKey::from_name(name) else {
                    log::debug!("Ignoring change to unknown setting {:?}", name);
                    return None;
                };
                let new_value = change.get("newValue").filter(|v| !v.is_null()).cloned();
                Some(SettingsChange { key, new_value })
            })
            .collect()
    }

    fn flag(&self) -> bool {
        decode(self.key, self.new_value.clone())
    }
}

/// Variants are declared in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SettingsAction {
    RefreshExtensionNames,
    RemoveExtensionNames,
    UngroupActiveWindow,
    RegroupAll,
    Accordion(bool),
}

pub fn route_change(change: &SettingsChange) -> Vec<SettingsAction> {
    match change.key {
        SettingKey::SubdomainEnabled => vec![SettingsAction::UngroupActiveWindow, SettingsAction::RegroupAll],
        SettingKey::GroupTop if change.flag() => vec![SettingsAction::RegroupAll],
        SettingKey::GroupTop => vec![],
        SettingKey::GroupSortMode | SettingKey::GroupNames => vec![SettingsAction::RegroupAll],
        SettingKey::Accordion => vec![SettingsAction::Accordion(change.flag())],
        SettingKey::ExtensionReplace if change.flag() => vec![SettingsAction::RefreshExtensionNames],
        SettingKey::ExtensionReplace => vec![SettingsAction::RemoveExtensionNames],
        SettingKey::ExtensionReplaceMap
        | SettingKey::Whitelist
        | SettingKey::ExtensionWhitelist
        | SettingKey::EnableNewtabGrouping
        | SettingKey::ClearGroupedTabs => vec![],
    }
}

/// Actions for a batch of changes in execution order, without repeats
pub fn route_changes(changes: &[SettingsChange]) -> Vec<SettingsAction> {
    let mut actions: Vec<SettingsAction> = changes.iter().flat_map(route_change).collect();
    actions.sort();
    actions.dedup();
    actions
}
