/// Accordion mode: only the active tab's group stays expanded
use crate::error::ProviderError;
use crate::provider::{Clock, TabProvider};
use crate::tab_data::{GroupId, Tab, WindowId};
use futures::future::join_all;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccordionState {
    CollapsedExceptActive,
    Expanded,
}

impl AccordionState {
    pub fn from_enabled(enabled: bool) -> AccordionState {
        if enabled {
            AccordionState::CollapsedExceptActive
        } else {
            AccordionState::Expanded
        }
    }
}

/// Linear backoff for collapse requests the browser refuses while busy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub step: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            step: Duration::from_millis(100),
            max_retries: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.step * (attempt + 1)
    }
}

/// Collapse a group, retrying only while the browser reports it is busy
pub async fn collapse_with_retry<P: TabProvider, C: Clock>(
    provider: &P,
    clock: &C,
    group_id: GroupId,
    policy: RetryPolicy,
) -> Result<(), ProviderError> {
    let mut attempt = 0;
    loop {
        match provider.set_group_collapsed(group_id, true).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                log::debug!("Group {} busy, retrying collapse in {:?}", group_id, delay);
                clock.sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Collapse every expanded group in `tab`'s window except the tab's own.
/// Returns how many groups were collapsed.
pub async fn collapse_others<P: TabProvider, C: Clock>(
    provider: &P,
    clock: &C,
    tab: &Tab,
    policy: RetryPolicy,
) -> Result<usize, ProviderError> {
    let groups = provider.list_groups(Some(tab.window_id)).await?;
    let targets = groups.iter().filter(|g| !g.collapsed && Some(g.id) != tab.group_id);

    let results = join_all(targets.map(|group| async move {
        collapse_with_retry(provider, clock, group.id, policy)
            .await
            .inspect_err(|e| log::error!("Failed to collapse group {}: {}", group.id, e))
    }))
    .await;
    Ok(results.iter().filter(|r| r.is_ok()).count())
}

pub async fn expand_all<P: TabProvider>(provider: &P, window: WindowId) -> Result<usize, ProviderError> {
    let groups = provider.list_groups(Some(window)).await?;

    let results = join_all(groups.iter().filter(|g| g.collapsed).map(|group| async move {
        provider
            .set_group_collapsed(group.id, false)
            .await
            .inspect_err(|e| log::error!("Failed to expand group {}: {}", group.id, e))
    }))
    .await;
    Ok(results.iter().filter(|r| r.is_ok()).count())
}

/// Bring the active window into `state`
pub async fn enter_state<P: TabProvider, C: Clock>(
    provider: &P,
    clock: &C,
    state: AccordionState,
    policy: RetryPolicy,
) -> Result<usize, ProviderError> {
    let Some(active) = provider.active_tab().await? else {
        log::debug!("No active tab; accordion unchanged");
        return Ok(0);
    };
    match state {
        AccordionState::CollapsedExceptActive => collapse_others(provider, clock, &active, policy).await,
        AccordionState::Expanded => expand_all(provider, active.window_id).await,
    }
}
