/// Data structures mirrored from the browser's tab and group model
use serde::{Deserialize, Serialize};

pub type TabId = i32;
pub type GroupId = i32;
pub type WindowId = i32;

/// Group id the browser reports for tabs that belong to no group
pub const GROUP_ID_NONE: GroupId = -1;

/// Information about a browser tab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    pub window_id: WindowId,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub index: i32,
    #[serde(default)]
    pub active: bool,
    #[serde(default, with = "group_membership")]
    pub group_id: Option<GroupId>,
}

impl Tab {
    pub fn new(id: TabId, window_id: WindowId, url: &str) -> Tab {
        Tab {
            id,
            window_id,
            url: Some(url.to_string()),
            pinned: false,
            index: 0,
            active: false,
            group_id: None,
        }
    }

    pub fn pinned(mut self) -> Tab {
        self.pinned = true;
        self
    }

    pub fn at_index(mut self, index: i32) -> Tab {
        self.index = index;
        self
    }

    pub fn in_group(mut self, group_id: GroupId) -> Tab {
        self.group_id = Some(group_id);
        self
    }

    pub fn is_grouped(&self) -> bool {
        self.group_id.is_some()
    }
}

/// A tab group as reported by the browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabGroup {
    pub id: GroupId,
    pub window_id: WindowId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub collapsed: bool,
}

impl TabGroup {
    pub fn new(id: GroupId, window_id: WindowId, title: &str) -> TabGroup {
        TabGroup {
            id,
            window_id,
            title: title.to_string(),
            collapsed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRef {
    pub id: WindowId,
}

/// An installed extension, used to build the extension name map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
}

/// Where a grouping request puts its tabs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupTarget {
    Existing(GroupId),
    NewInWindow(WindowId),
}

/// Destination index for a tab or group move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    At(usize),
    End,
}

impl Position {
    /// Index in the browser's convention, where -1 means "after the last tab"
    pub fn to_browser_index(self) -> i32 {
        match self {
            Position::At(index) => i32::try_from(index).unwrap_or(i32::MAX),
            Position::End => -1,
        }
    }
}

/// Serde adapter for the browser's `-1` "no group" sentinel
mod group_membership {
    use super::{GroupId, GROUP_ID_NONE};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<GroupId>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(value.unwrap_or(GROUP_ID_NONE))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<GroupId>, D::Error> {
        let raw = Option::<GroupId>::deserialize(deserializer)?;
        Ok(raw.filter(|id| *id >= 0))
    }
}
