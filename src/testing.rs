/// In-memory stand-ins for the browser, the settings store and timers
use crate::config::SettingKey;
use crate::debounce::Scheduler;
use crate::error::{ProviderError, StoreError, BUSY_MESSAGE};
use crate::provider::{Clock, TabProvider};
use crate::storage::SettingsStore;
use crate::tab_data::{ExtensionInfo, GroupId, GroupTarget, Position, Tab, TabGroup, TabId, WindowId, WindowRef};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

/// A mutating call recorded by [`FakeBrowser`]
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Group(Vec<TabId>, GroupTarget),
    Ungroup(Vec<TabId>),
    SetTitle(GroupId, String),
    SetCollapsed(GroupId, bool),
    MoveGroup(GroupId, Position),
    MoveTabs(Vec<TabId>, Position),
    Close(Vec<TabId>),
}

#[derive(Default)]
struct BrowserState {
    windows: BTreeMap<WindowId, Vec<Tab>>,
    groups: Vec<TabGroup>,
    next_group_id: GroupId,
    ops: Vec<Op>,
    busy_collapses: u32,
    rejected_groups: HashSet<GroupId>,
    reject_creates: bool,
    extensions: Vec<ExtensionInfo>,
}

impl BrowserState {
    fn window_of(&self, tab_id: TabId) -> Option<WindowId> {
        self.windows
            .iter()
            .find(|(_, tabs)| tabs.iter().any(|t| t.id == tab_id))
            .map(|(id, _)| *id)
    }

    fn take_tabs(&mut self, window: WindowId, tab_ids: &[TabId]) -> Vec<Tab> {
        let tabs = self.windows.entry(window).or_default();
        let mut taken = Vec::new();
        for id in tab_ids {
            if let Some(pos) = tabs.iter().position(|t| t.id == *id) {
                taken.push(tabs.remove(pos));
            }
        }
        taken
    }

    fn insert_tabs(&mut self, window: WindowId, position: Position, moved: Vec<Tab>) {
        let tabs = self.windows.entry(window).or_default();
        let at = match position {
            Position::At(index) => index.min(tabs.len()),
            Position::End => tabs.len(),
        };
        for (offset, tab) in moved.into_iter().enumerate() {
            tabs.insert(at + offset, tab);
        }
    }

    fn prune_empty_groups(&mut self) {
        let used: HashSet<GroupId> = self
            .windows
            .values()
            .flatten()
            .filter_map(|t| t.group_id)
            .collect();
        self.groups.retain(|g| used.contains(&g.id));
    }

    fn check_group(&self, op: &'static str, group_id: GroupId) -> Result<(), ProviderError> {
        if self.rejected_groups.contains(&group_id) || !self.groups.iter().any(|g| g.id == group_id) {
            return Err(ProviderError::from_message(op, format!("No group with id: {}.", group_id)));
        }
        Ok(())
    }
}

/// A browser whose tabs and groups live in memory and which records every mutation
#[derive(Default)]
pub struct FakeBrowser {
    state: RefCell<BrowserState>,
}

impl FakeBrowser {
    pub fn new() -> FakeBrowser {
        FakeBrowser {
            state: RefCell::new(BrowserState {
                next_group_id: 100,
                ..BrowserState::default()
            }),
        }
    }

    /// Add tabs in order; tabs land in their own window's strip
    pub fn with_tabs(self, tabs: Vec<Tab>) -> FakeBrowser {
        {
            let mut state = self.state.borrow_mut();
            for tab in tabs {
                state.windows.entry(tab.window_id).or_default().push(tab);
            }
        }
        self
    }

    pub fn with_group(self, group: TabGroup) -> FakeBrowser {
        self.state.borrow_mut().groups.push(group);
        self
    }

    pub fn with_window(self, window: WindowId) -> FakeBrowser {
        self.state.borrow_mut().windows.entry(window).or_default();
        self
    }

    pub fn with_extensions(self, extensions: Vec<ExtensionInfo>) -> FakeBrowser {
        self.state.borrow_mut().extensions = extensions;
        self
    }

    /// Fail the next `count` collapse requests with the transient busy error
    pub fn fail_collapses(&self, count: u32) {
        self.state.borrow_mut().busy_collapses = count;
    }

    pub fn reject_group(&self, group_id: GroupId) {
        self.state.borrow_mut().rejected_groups.insert(group_id);
    }

    pub fn reject_creates(&self) {
        self.state.borrow_mut().reject_creates = true;
    }

    pub fn ops(&self) -> Vec<Op> {
        self.state.borrow().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.borrow_mut().ops.clear();
    }

    /// Tabs of `window` in strip order, with indices filled in
    pub fn tabs(&self, window: WindowId) -> Vec<Tab> {
        let state = self.state.borrow();
        state
            .windows
            .get(&window)
            .map(|tabs| indexed(tabs))
            .unwrap_or_default()
    }

    pub fn groups(&self) -> Vec<TabGroup> {
        self.state.borrow().groups.clone()
    }

    pub fn group_titled(&self, title: &str) -> Option<TabGroup> {
        self.state.borrow().groups.iter().find(|g| g.title == title).cloned()
    }

    pub fn group_of(&self, tab_id: TabId) -> Option<GroupId> {
        let state = self.state.borrow();
        state.windows.values().flatten().find(|t| t.id == tab_id).and_then(|t| t.group_id)
    }

    pub fn set_active(&self, tab_id: TabId) {
        let mut state = self.state.borrow_mut();
        for tab in state.windows.values_mut().flatten() {
            tab.active = tab.id == tab_id;
        }
    }

    fn record(&self, op: Op) {
        self.state.borrow_mut().ops.push(op);
    }
}

fn indexed(tabs: &[Tab]) -> Vec<Tab> {
    tabs.iter()
        .enumerate()
        .map(|(index, tab)| Tab {
            index: index as i32,
            ..tab.clone()
        })
        .collect()
}

impl TabProvider for FakeBrowser {
    async fn list_tabs(&self, window: Option<WindowId>) -> Result<Vec<Tab>, ProviderError> {
        let state = self.state.borrow();
        Ok(state
            .windows
            .iter()
            .filter(|(id, _)| window.is_none_or(|w| w == **id))
            .flat_map(|(_, tabs)| indexed(tabs))
            .collect())
    }

    async fn list_groups(&self, window: Option<WindowId>) -> Result<Vec<TabGroup>, ProviderError> {
        let state = self.state.borrow();
        Ok(state
            .groups
            .iter()
            .filter(|g| window.is_none_or(|w| w == g.window_id))
            .cloned()
            .collect())
    }

    async fn list_windows(&self) -> Result<Vec<WindowRef>, ProviderError> {
        Ok(self.state.borrow().windows.keys().map(|id| WindowRef { id: *id }).collect())
    }

    async fn group_tabs(&self, tab_ids: &[TabId], target: GroupTarget) -> Result<GroupId, ProviderError> {
        self.record(Op::Group(tab_ids.to_vec(), target));
        let mut state = self.state.borrow_mut();
        let first = tab_ids
            .first()
            .copied()
            .ok_or_else(|| ProviderError::from_message("groupTabs", "No tabs given."))?;
        let window = state
            .window_of(first)
            .ok_or_else(|| ProviderError::from_message("groupTabs", format!("No tab with id: {}.", first)))?;

        let group_id = match target {
            GroupTarget::Existing(group_id) => {
                state.check_group("groupTabs", group_id)?;
                group_id
            }
            GroupTarget::NewInWindow(window_id) => {
                if state.reject_creates {
                    return Err(ProviderError::from_message("groupTabs", "Cannot create group."));
                }
                state.next_group_id += 1;
                let group_id = state.next_group_id;
                state.groups.push(TabGroup::new(group_id, window_id, ""));
                group_id
            }
        };

        // Members stay contiguous: new members join right after the group's last tab
        let anchor = {
            let tabs = &state.windows[&window];
            tabs.iter()
                .rposition(|t| t.group_id == Some(group_id) && !tab_ids.contains(&t.id))
                .map(|pos| pos + 1)
                .or_else(|| tabs.iter().position(|t| tab_ids.contains(&t.id)))
                .unwrap_or(tabs.len())
        };
        let before_anchor = state.windows[&window][..anchor]
            .iter()
            .filter(|t| tab_ids.contains(&t.id))
            .count();
        let mut moved = state.take_tabs(window, tab_ids);
        for tab in &mut moved {
            tab.group_id = Some(group_id);
            tab.pinned = false;
        }
        state.insert_tabs(window, Position::At(anchor - before_anchor), moved);
        state.prune_empty_groups();
        Ok(group_id)
    }

    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> Result<(), ProviderError> {
        self.record(Op::Ungroup(tab_ids.to_vec()));
        let mut state = self.state.borrow_mut();
        for tab in state.windows.values_mut().flatten() {
            if tab_ids.contains(&tab.id) {
                tab.group_id = None;
            }
        }
        state.prune_empty_groups();
        Ok(())
    }

    async fn set_group_title(&self, group_id: GroupId, title: &str) -> Result<(), ProviderError> {
        self.record(Op::SetTitle(group_id, title.to_string()));
        let mut state = self.state.borrow_mut();
        state.check_group("setGroupTitle", group_id)?;
        if let Some(group) = state.groups.iter_mut().find(|g| g.id == group_id) {
            group.title = title.to_string();
        }
        Ok(())
    }

    async fn set_group_collapsed(&self, group_id: GroupId, collapsed: bool) -> Result<(), ProviderError> {
        self.record(Op::SetCollapsed(group_id, collapsed));
        let mut state = self.state.borrow_mut();
        if state.busy_collapses > 0 {
            state.busy_collapses -= 1;
            return Err(ProviderError::from_message("setGroupCollapsed", BUSY_MESSAGE));
        }
        state.check_group("setGroupCollapsed", group_id)?;
        if let Some(group) = state.groups.iter_mut().find(|g| g.id == group_id) {
            group.collapsed = collapsed;
        }
        Ok(())
    }

    async fn move_group(&self, group_id: GroupId, position: Position) -> Result<(), ProviderError> {
        self.record(Op::MoveGroup(group_id, position));
        let mut state = self.state.borrow_mut();
        state.check_group("moveGroup", group_id)?;
        let window = state
            .groups
            .iter()
            .find(|g| g.id == group_id)
            .map(|g| g.window_id)
            .unwrap_or_default();
        let members: Vec<TabId> = state.windows[&window]
            .iter()
            .filter(|t| t.group_id == Some(group_id))
            .map(|t| t.id)
            .collect();
        let moved = state.take_tabs(window, &members);
        state.insert_tabs(window, position, moved);
        Ok(())
    }

    async fn move_tabs(&self, tab_ids: &[TabId], position: Position) -> Result<(), ProviderError> {
        self.record(Op::MoveTabs(tab_ids.to_vec(), position));
        let mut state = self.state.borrow_mut();
        let window = tab_ids
            .first()
            .and_then(|id| state.window_of(*id))
            .ok_or_else(|| ProviderError::from_message("moveTabs", "No such tab."))?;
        let moved = state.take_tabs(window, tab_ids);
        state.insert_tabs(window, position, moved);
        Ok(())
    }

    async fn close_tabs(&self, tab_ids: &[TabId]) -> Result<(), ProviderError> {
        self.record(Op::Close(tab_ids.to_vec()));
        let mut state = self.state.borrow_mut();
        for tabs in state.windows.values_mut() {
            tabs.retain(|t| !tab_ids.contains(&t.id));
        }
        state.prune_empty_groups();
        Ok(())
    }

    async fn active_tab(&self) -> Result<Option<Tab>, ProviderError> {
        let state = self.state.borrow();
        Ok(state
            .windows
            .values()
            .flat_map(|tabs| indexed(tabs))
            .find(|t| t.active))
    }

    async fn installed_extensions(&self) -> Result<Vec<ExtensionInfo>, ProviderError> {
        Ok(self.state.borrow().extensions.clone())
    }
}

/// Settings held in a map, with read counting and failure injection
#[derive(Default)]
pub struct MemoryStore {
    values: RefCell<HashMap<SettingKey, Value>>,
    reads: Cell<usize>,
    fail_reads: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn with(self, key: SettingKey, value: Value) -> MemoryStore {
        self.values.borrow_mut().insert(key, value);
        self
    }

    pub fn put(&self, key: SettingKey, value: Value) {
        self.values.borrow_mut().insert(key, value);
    }

    pub fn value(&self, key: SettingKey) -> Option<Value> {
        self.values.borrow().get(&key).cloned()
    }

    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }
}

impl SettingsStore for MemoryStore {
    async fn get(&self, key: SettingKey) -> Result<Option<Value>, StoreError> {
        self.reads.set(self.reads.get() + 1);
        if self.fail_reads.get() {
            return Err(StoreError::Read {
                key: key.as_str(),
                message: "storage unavailable".to_string(),
            });
        }
        Ok(self.value(key))
    }

    async fn set(&self, key: SettingKey, value: Value) -> Result<(), StoreError> {
        self.values.borrow_mut().insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: SettingKey) -> Result<(), StoreError> {
        self.values.borrow_mut().remove(&key);
        Ok(())
    }
}

/// A clock that only moves when told to; sleeping advances it instantly
#[derive(Default)]
pub struct ManualClock {
    now: Cell<f64>,
    sleeps: RefCell<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> ManualClock {
        ManualClock {
            now: Cell::new(start_ms),
            sleeps: RefCell::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by.as_secs_f64() * 1000.0);
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.advance(duration);
    }
}

struct ScheduledTask {
    id: u64,
    due: Duration,
    task: Box<dyn FnOnce()>,
}

#[derive(Default)]
struct SchedulerState {
    now: Duration,
    next_id: u64,
    tasks: Vec<ScheduledTask>,
}

/// A scheduler driven by explicit `advance` calls
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Rc<RefCell<SchedulerState>>,
}

impl ManualScheduler {
    pub fn new() -> ManualScheduler {
        ManualScheduler::default()
    }

    /// Move time forward, running every task that comes due in order
    pub fn advance(&self, by: Duration) {
        let target = self.state.borrow().now + by;
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let due = state
                    .tasks
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due <= target)
                    .min_by_key(|(_, t)| (t.due, t.id))
                    .map(|(pos, _)| pos);
                due.map(|pos| {
                    let task = state.tasks.remove(pos);
                    state.now = task.due;
                    task
                })
            };
            match next {
                Some(task) => (task.task)(),
                None => break,
            }
        }
        self.state.borrow_mut().now = target;
    }

    pub fn live_tasks(&self) -> usize {
        self.state.borrow().tasks.len()
    }
}

impl Scheduler for ManualScheduler {
    type Handle = u64;

    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) -> u64 {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        let due = state.now + delay;
        state.tasks.push(ScheduledTask { id, due, task });
        id
    }

    fn cancel(&self, handle: u64) {
        self.state.borrow_mut().tasks.retain(|t| t.id != handle);
    }
}
