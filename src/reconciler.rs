/// Reconciler: turns a plan into the minimal set of provider calls
use crate::config::SortMode;
use crate::error::ProviderError;
use crate::planner::{Plan, PlannedTab};
use crate::provider::TabProvider;
use crate::tab_data::{GroupId, GroupTarget, Position, TabId, WindowId};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;

/// Provider calls needed to bring a window in line with a plan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Actions {
    /// Singleton tabs currently sitting in a group
    pub ungroup: Vec<TabId>,
    /// Tabs to add to a group that already carries the planned title
    pub move_into: Vec<(GroupId, Vec<TabId>)>,
    /// Groups already holding all of a planned group's tabs under another title
    pub rename: Vec<(GroupId, String)>,
    /// Groups to create, in plan order
    pub create: Vec<(String, Vec<TabId>)>,
}

impl Actions {
    pub fn is_empty(&self) -> bool {
        self.ungroup.is_empty() && self.move_into.is_empty() && self.rename.is_empty() && self.create.is_empty()
    }
}

/// What one reconciliation pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub ungrouped: usize,
    pub moved: usize,
    pub renamed: usize,
    pub created: usize,
    pub failures: usize,
}

impl ReconcileReport {
    /// Successful operations issued
    pub fn operations(&self) -> usize {
        self.ungrouped + self.moved + self.renamed + self.created
    }
}

impl std::ops::AddAssign for ReconcileReport {
    fn add_assign(&mut self, other: ReconcileReport) {
        self.ungrouped += other.ungrouped;
        self.moved += other.moved;
        self.renamed += other.renamed;
        self.created += other.created;
        self.failures += other.failures;
    }
}

/// Diff a plan against the membership it recorded
pub fn diff(plan: &Plan) -> Actions {
    let mut actions = Actions {
        ungroup: plan
            .dissolve
            .iter()
            .filter(|tab| tab.current_group.is_some())
            .map(|tab| tab.id)
            .collect(),
        ..Actions::default()
    };

    let claimed: HashSet<&str> = plan.groups.iter().map(|g| g.title.as_str()).collect();
    let mut adopted: HashSet<GroupId> = HashSet::new();

    for group in &plan.groups {
        if let Some(&group_id) = plan.existing.get(&group.title) {
            let missing: Vec<TabId> = group
                .tabs
                .iter()
                .filter(|tab| tab.current_group != Some(group_id))
                .map(|tab| tab.id)
                .collect();
            if !missing.is_empty() {
                actions.move_into.push((group_id, missing));
            }
            continue;
        }

        match adoptable_group(plan, &group.tabs, &claimed, &adopted) {
            Some(group_id) => {
                adopted.insert(group_id);
                actions.rename.push((group_id, group.title.clone()));
            }
            None => actions.create.push((group.title.clone(), group.tab_ids())),
        }
    }

    actions
}

/// The group every tab already shares, if its title is free to change
fn adoptable_group(
    plan: &Plan,
    tabs: &[PlannedTab],
    claimed: &HashSet<&str>,
    adopted: &HashSet<GroupId>,
) -> Option<GroupId> {
    let shared = tabs.first()?.current_group?;
    if tabs.iter().any(|tab| tab.current_group != Some(shared)) || adopted.contains(&shared) {
        return None;
    }
    let title = plan.group_titles.get(&shared)?;
    if claimed.contains(title.as_str()) {
        return None;
    }
    Some(shared)
}

/// Apply `plan` to `window`.
///
/// Ungroups, moves and renames run concurrently; new groups are created one
/// at a time because concurrent creates with the same title race into
/// duplicate groups. Failures are logged and counted, never propagated.
pub async fn apply<P: TabProvider>(
    provider: &P,
    plan: &Plan,
    window: WindowId,
    sort_mode: SortMode,
) -> ReconcileReport {
    let actions = diff(plan);
    if actions.is_empty() {
        log::debug!("Window {} already matches its plan", window);
        return ReconcileReport::default();
    }
    apply_actions(provider, actions, window, sort_mode).await
}

pub async fn apply_actions<P: TabProvider>(
    provider: &P,
    actions: Actions,
    window: WindowId,
    sort_mode: SortMode,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    let ungroups = join_all(actions.ungroup.iter().map(|tab_id| async move {
        provider
            .ungroup_tabs(std::slice::from_ref(tab_id))
            .await
            .inspect_err(|e| log::error!("Failed to ungroup tab {}: {}", tab_id, e))
    }));
    let moves = join_all(actions.move_into.iter().map(|(group_id, tab_ids)| async move {
        provider
            .group_tabs(tab_ids, GroupTarget::Existing(*group_id))
            .await
            .inspect_err(|e| log::error!("Failed to add tabs {:?} to group {}: {}", tab_ids, group_id, e))
    }));
    let renames = join_all(actions.rename.iter().map(|(group_id, title)| async move {
        provider
            .set_group_title(*group_id, title)
            .await
            .inspect_err(|e| log::error!("Failed to rename group {} to {:?}: {}", group_id, title, e))
    }));

    let (ungroups, moves, renames) = futures::join!(ungroups, moves, renames);
    tally(&mut report.ungrouped, &mut report.failures, &ungroups);
    tally(&mut report.moved, &mut report.failures, &moves);
    tally(&mut report.renamed, &mut report.failures, &renames);

    for (title, tab_ids) in &actions.create {
        match create_group(provider, window, title, tab_ids, sort_mode).await {
            Ok(group_id) => {
                log::debug!("Created group {} {:?} in window {}", group_id, title, window);
                report.created += 1;
            }
            Err(e) => {
                log::error!("Failed to create group {:?}: {}", title, e);
                report.failures += 1;
            }
        }
    }

    log::info!(
        "Window {}: {} ungrouped, {} moved, {} renamed, {} created, {} failed",
        window,
        report.ungrouped,
        report.moved,
        report.renamed,
        report.created,
        report.failures
    );
    report
}

async fn create_group<P: TabProvider>(
    provider: &P,
    window: WindowId,
    title: &str,
    tab_ids: &[TabId],
    sort_mode: SortMode,
) -> Result<GroupId, ProviderError> {
    let group_id = provider.group_tabs(tab_ids, GroupTarget::NewInWindow(window)).await?;
    provider.set_group_title(group_id, title).await?;
    if sort_mode == SortMode::Append {
        provider.move_group(group_id, Position::End).await?;
    }
    Ok(group_id)
}

fn tally<T>(succeeded: &mut usize, failed: &mut usize, results: &[Result<T, ProviderError>]) {
    for result in results {
        match result {
            Ok(_) => *succeeded += 1,
            Err(_) => *failed += 1,
        }
    }
}
