/// Grouping planner: partitions a window's tabs into target groups
use crate::config::ConfigSnapshot;
use crate::domain::{classify_str, Classification};
use crate::reference::ReferenceData;
use crate::tab_data::{GroupId, Tab, TabGroup, TabId};
use std::collections::HashMap;

/// A tab as the planner saw it: its id and the group it was in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedTab {
    pub id: TabId,
    pub current_group: Option<GroupId>,
}

impl From<&Tab> for PlannedTab {
    fn from(tab: &Tab) -> PlannedTab {
        PlannedTab {
            id: tab.id,
            current_group: tab.group_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedGroup {
    pub key: String,
    /// Title the group carries in the browser
    pub title: String,
    /// Members in provider enumeration order
    pub tabs: Vec<PlannedTab>,
}

impl PlannedGroup {
    pub fn tab_ids(&self) -> Vec<TabId> {
        self.tabs.iter().map(|t| t.id).collect()
    }
}

/// The desired grouping for one window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    /// Groups with two or more tabs, in order of first appearance
    pub groups: Vec<PlannedGroup>,
    /// Tabs whose key matched no other tab; they must not sit in a group
    pub dissolve: Vec<PlannedTab>,
    /// Existing group titles and the group carrying each
    pub existing: HashMap<String, GroupId>,
    /// Title of every existing group, untitled ones included
    pub group_titles: HashMap<GroupId, String>,
}

impl Plan {
    pub fn group(&self, title: &str) -> Option<&PlannedGroup> {
        self.groups.iter().find(|g| g.title == title)
    }
}

/// Compute the plan for `tabs` given the groups that already exist.
///
/// Pinned tabs, tabs without a usable URL and excluded tabs are left out
/// entirely: the plan neither groups nor ungroups them.
pub fn plan(tabs: &[Tab], existing_groups: &[TabGroup], config: &ConfigSnapshot, reference: &ReferenceData) -> Plan {
    let mut existing = HashMap::new();
    let mut group_titles = HashMap::new();
    for group in existing_groups {
        group_titles.insert(group.id, group.title.clone());
        if !group.title.is_empty() {
            existing.entry(group.title.clone()).or_insert(group.id);
        }
    }

    let mut buckets: Vec<(Classification, Vec<PlannedTab>)> = Vec::new();
    let mut bucket_index: HashMap<String, usize> = HashMap::new();

    for tab in tabs.iter().filter(|t| !t.pinned) {
        let Some(url) = tab.url.as_deref().filter(|u| !u.is_empty()) else {
            log::debug!("Skipping tab {} without a URL", tab.id);
            continue;
        };

        let classification = match classify_str(url, config, reference) {
            Ok(Some(classification)) => classification,
            Ok(None) => continue,
            Err(e) => {
                log::warn!("Skipping tab {} with unparsable URL {:?}: {}", tab.id, url, e);
                continue;
            }
        };

        match bucket_index.get(&classification.key) {
            Some(&pos) => buckets[pos].1.push(PlannedTab::from(tab)),
            None => {
                bucket_index.insert(classification.key.clone(), buckets.len());
                buckets.push((classification, vec![PlannedTab::from(tab)]));
            }
        }
    }

    // Distinct keys may strip to the same label; those groups keep their full key as title
    let mut label_counts: HashMap<&str, usize> = HashMap::new();
    for (classification, members) in &buckets {
        if members.len() > 1 {
            *label_counts.entry(classification.label.as_str()).or_insert(0) += 1;
        }
    }
    let colliding: Vec<String> = label_counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(label, _)| label.to_string())
        .collect();

    let mut result = Plan {
        existing,
        group_titles,
        ..Plan::default()
    };
    for (classification, members) in buckets {
        if members.len() == 1 {
            result.dissolve.extend(members);
            continue;
        }

        let title = if colliding.contains(&classification.label) {
            classification.key.clone()
        } else {
            classification.label
        };
        result.groups.push(PlannedGroup {
            key: classification.key,
            title,
            tabs: members,
        });
    }

    log::debug!(
        "Planned {} groups and {} singletons from {} tabs",
        result.groups.len(),
        result.dissolve.len(),
        tabs.len()
    );
    result
}
