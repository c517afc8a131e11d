/// Tab and group ordering: pinned tabs, then groups, then ungrouped tabs
use crate::config::SortMode;
use crate::error::ProviderError;
use crate::provider::TabProvider;
use crate::tab_data::{GroupId, Position, Tab, TabGroup, TabId, WindowId};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Locale-aware string comparison
pub trait Collator {
    fn compare(&self, a: &str, b: &str) -> Ordering;
}

/// Case-insensitive comparison, used where no locale collator is available
#[derive(Debug, Clone, Copy, Default)]
pub struct FoldingCollator;

impl Collator for FoldingCollator {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
    }
}

/// Sort tier of a title by its first character:
/// 0 = CJK ideograph, 1 = ASCII letter, 2 = ASCII digit, 3 = anything else
pub fn title_tier(title: &str) -> u8 {
    match title.chars().next() {
        Some('\u{4e00}'..='\u{9fff}') => 0,
        Some(c) if c.is_ascii_alphabetic() => 1,
        Some(c) if c.is_ascii_digit() => 2,
        _ => 3,
    }
}

pub fn compare_group_names(a: &str, b: &str, collator: &dyn Collator) -> Ordering {
    title_tier(a)
        .cmp(&title_tier(b))
        .then_with(|| collator.compare(a, b))
}

/// The canonical left-to-right arrangement of a window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    pub pinned: Vec<TabId>,
    /// Groups in placement order with their members
    pub blocks: Vec<(GroupId, Vec<TabId>)>,
    pub ungrouped: Vec<TabId>,
}

impl Layout {
    /// Every tab id in target order
    pub fn order(&self) -> Vec<TabId> {
        let mut order = self.pinned.clone();
        for (_, members) in &self.blocks {
            order.extend(members);
        }
        order.extend(&self.ungrouped);
        order
    }

    /// Whether `tabs` are already arranged this way
    pub fn matches(&self, tabs: &[Tab]) -> bool {
        let mut current: Vec<&Tab> = tabs.iter().collect();
        current.sort_by_key(|t| t.index);
        current.iter().map(|t| t.id).eq(self.order())
    }
}

/// Compute the target layout from a snapshot of one window.
///
/// With `SortMode::Name` groups are ordered by title; otherwise they keep
/// their current relative order.
pub fn plan_layout(tabs: &[Tab], groups: &[TabGroup], sort_mode: SortMode, collator: &dyn Collator) -> Layout {
    let mut sorted: Vec<&Tab> = tabs.iter().collect();
    sorted.sort_by_key(|t| t.index);

    let mut members: HashMap<GroupId, Vec<TabId>> = HashMap::new();
    let mut first_seen: HashMap<GroupId, usize> = HashMap::new();
    let mut layout = Layout::default();

    for (position, tab) in sorted.iter().enumerate() {
        if tab.pinned {
            layout.pinned.push(tab.id);
            continue;
        }
        match tab.group_id.filter(|id| groups.iter().any(|g| g.id == *id)) {
            Some(group_id) => {
                members.entry(group_id).or_default().push(tab.id);
                first_seen.entry(group_id).or_insert(position);
            }
            None => layout.ungrouped.push(tab.id),
        }
    }

    let mut ordered: Vec<&TabGroup> = groups.iter().filter(|g| members.contains_key(&g.id)).collect();
    match sort_mode {
        SortMode::Name => ordered.sort_by(|a, b| compare_group_names(&a.title, &b.title, collator)),
        SortMode::Default | SortMode::Append => ordered.sort_by_key(|g| first_seen[&g.id]),
    }

    layout.blocks = ordered
        .into_iter()
        .filter_map(|g| members.remove(&g.id).map(|ids| (g.id, ids)))
        .collect();
    layout
}

/// Rearrange `window` into its canonical layout.
///
/// Runs only when `group_top` is set or groups sort by name. Works from a
/// single snapshot: moves that fail are logged and the walk continues.
/// Returns the number of move requests issued.
pub async fn reorder<P: TabProvider>(
    provider: &P,
    window: WindowId,
    sort_mode: SortMode,
    group_top: bool,
    collator: &dyn Collator,
) -> Result<usize, ProviderError> {
    if !group_top && sort_mode != SortMode::Name {
        return Ok(0);
    }

    let (tabs, groups) = futures::try_join!(provider.list_tabs(Some(window)), provider.list_groups(Some(window)))?;
    let layout = plan_layout(&tabs, &groups, sort_mode, collator);
    if layout.matches(&tabs) {
        log::debug!("Window {} already in order", window);
        return Ok(0);
    }

    Ok(apply_layout(provider, &layout).await)
}

async fn apply_layout<P: TabProvider>(provider: &P, layout: &Layout) -> usize {
    let mut issued = 0;
    let mut cursor = layout.pinned.len();

    for (group_id, members) in &layout.blocks {
        if let Err(e) = provider.move_group(*group_id, Position::At(cursor)).await {
            log::error!("Failed to move group {} to {}: {}", group_id, cursor, e);
        }
        if let Err(e) = provider.move_tabs(members, Position::At(cursor)).await {
            log::error!("Failed to move tabs of group {} to {}: {}", group_id, cursor, e);
        }
        issued += 2;
        cursor += members.len();
    }

    if !layout.ungrouped.is_empty() {
        if let Err(e) = provider.move_tabs(&layout.ungrouped, Position::End).await {
            log::error!("Failed to move ungrouped tabs to the end: {}", e);
        }
        issued += 1;
    }

    log::debug!("Reordered {} groups with {} moves", layout.blocks.len(), issued);
    issued
}
