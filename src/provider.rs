/// The browser capabilities the engine drives
use crate::error::ProviderError;
use crate::tab_data::{ExtensionInfo, GroupId, GroupTarget, Position, Tab, TabGroup, TabId, WindowId, WindowRef};
use std::time::Duration;

/// Enumerates and mutates tabs, groups and windows.
///
/// Every call may fail independently; callers decide whether a failure is
/// logged, retried or propagated.
#[allow(async_fn_in_trait)]
pub trait TabProvider {
    /// Tabs in `window` (all windows when `None`), in left-to-right order
    async fn list_tabs(&self, window: Option<WindowId>) -> Result<Vec<Tab>, ProviderError>;

    async fn list_groups(&self, window: Option<WindowId>) -> Result<Vec<TabGroup>, ProviderError>;

    async fn list_windows(&self) -> Result<Vec<WindowRef>, ProviderError>;

    /// Put `tab_ids` into a group, returning the group's id
    async fn group_tabs(&self, tab_ids: &[TabId], target: GroupTarget) -> Result<GroupId, ProviderError>;

    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> Result<(), ProviderError>;

    async fn set_group_title(&self, group_id: GroupId, title: &str) -> Result<(), ProviderError>;

    async fn set_group_collapsed(&self, group_id: GroupId, collapsed: bool) -> Result<(), ProviderError>;

    async fn move_group(&self, group_id: GroupId, position: Position) -> Result<(), ProviderError>;

    async fn move_tabs(&self, tab_ids: &[TabId], position: Position) -> Result<(), ProviderError>;

    async fn close_tabs(&self, tab_ids: &[TabId]) -> Result<(), ProviderError>;

    /// The active tab of the focused window
    async fn active_tab(&self) -> Result<Option<Tab>, ProviderError>;

    async fn installed_extensions(&self) -> Result<Vec<ExtensionInfo>, ProviderError>;
}

/// Wall-clock time and timed waits
#[allow(async_fn_in_trait)]
pub trait Clock {
    /// Milliseconds since the Unix epoch
    fn now_ms(&self) -> f64;

    async fn sleep(&self, duration: Duration);
}
