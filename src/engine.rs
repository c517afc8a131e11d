/// The grouping engine: wires configuration, planning, reconciliation,
/// ordering and the accordion to one browser and one settings store
use crate::accordion::{self, AccordionState, RetryPolicy};
use crate::cache::ConfigCache;
use crate::config::{ConfigSnapshot, GroupNames, SettingKey};
use crate::domain::{base_domain, extract_hostname};
use crate::error::{EngineError, ProviderError, StoreError};
use crate::events::{route_changes, SettingsAction, SettingsChange};
use crate::ordering::{reorder, Collator, FoldingCollator};
use crate::planner::plan;
use crate::provider::{Clock, TabProvider};
use crate::reconciler::{self, ReconcileReport};
use crate::reference::ReferenceData;
use crate::storage::{self, ConfigExport, SettingsStore};
use crate::tab_data::{TabId, WindowId};
use std::collections::HashMap;
use std::rc::Rc;

pub struct Engine<P, S, C> {
    provider: P,
    cache: ConfigCache<S>,
    clock: C,
    reference: ReferenceData,
    collator: Box<dyn Collator>,
    retry: RetryPolicy,
}

impl<P, S, C> Engine<P, S, C>
where
    P: TabProvider,
    S: SettingsStore,
    C: Clock,
{
    pub fn new(provider: P, store: S, clock: C, reference: ReferenceData) -> Engine<P, S, C> {
        Engine {
            provider,
            cache: ConfigCache::new(store),
            clock,
            reference,
            collator: Box::new(FoldingCollator),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_collator(mut self, collator: impl Collator + 'static) -> Engine<P, S, C> {
        self.collator = Box::new(collator);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Engine<P, S, C> {
        self.retry = retry;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn store(&self) -> &S {
        self.cache.store()
    }

    pub fn cache(&self) -> &ConfigCache<S> {
        &self.cache
    }

    pub async fn config(&self) -> Result<Rc<ConfigSnapshot>, StoreError> {
        self.cache.snapshot(self.clock.now_ms()).await
    }

    /// Plan and apply one window, or every window when `window` is `None`.
    ///
    /// A configuration read failure aborts the pass before anything is
    /// applied. A window whose tabs cannot be listed is skipped.
    pub async fn regroup(&self, window: Option<WindowId>) -> Result<ReconcileReport, EngineError> {
        let config = self.config().await?;
        let windows = match window {
            Some(id) => vec![id],
            None => self.provider.list_windows().await?.into_iter().map(|w| w.id).collect(),
        };

        let mut report = ReconcileReport::default();
        for id in windows {
            match self.regroup_window(id, &config).await {
                Ok(window_report) => report += window_report,
                Err(e) => log::error!("Skipping window {}: {}", id, e),
            }
        }
        Ok(report)
    }

    async fn regroup_window(
        &self,
        window: WindowId,
        config: &ConfigSnapshot,
    ) -> Result<ReconcileReport, ProviderError> {
        let (tabs, groups) = futures::try_join!(
            self.provider.list_tabs(Some(window)),
            self.provider.list_groups(Some(window))
        )?;
        let planned = plan(&tabs, &groups, config, &self.reference);
        let report = reconciler::apply(&self.provider, &planned, window, config.settings.sort_mode).await;

        if config.needs_reorder() {
            let settings = &config.settings;
            if let Err(e) = reorder(
                &self.provider,
                window,
                settings.sort_mode,
                settings.group_top,
                self.collator.as_ref(),
            )
            .await
            {
                log::error!("Failed to reorder window {}: {}", window, e);
            }
        }
        Ok(report)
    }

    /// React to a batch of settings changes.
    ///
    /// Every action runs even when an earlier one fails; the first error is
    /// returned once the batch is done.
    pub async fn on_settings_changed(&self, changes: &[SettingsChange]) -> Result<(), EngineError> {
        self.cache.invalidate();

        let mut first_error = None;
        for action in route_changes(changes) {
            log::debug!("Settings change: {:?}", action);
            if let Err(e) = self.run_settings_action(action).await {
                log::error!("Settings action {:?} failed: {}", action, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn run_settings_action(&self, action: SettingsAction) -> Result<(), EngineError> {
        match action {
            SettingsAction::RefreshExtensionNames => self.refresh_extension_names(true).await,
            SettingsAction::RemoveExtensionNames => self.refresh_extension_names(false).await,
            SettingsAction::UngroupActiveWindow => {
                if let Some(active) = self.provider.active_tab().await? {
                    self.ungroup_all(Some(active.window_id)).await?;
                }
                Ok(())
            }
            SettingsAction::RegroupAll => self.regroup(None).await.map(|_| ()),
            SettingsAction::Accordion(enabled) => {
                let state = AccordionState::from_enabled(enabled);
                accordion::enter_state(&self.provider, &self.clock, state, self.retry).await?;
                Ok(())
            }
        }
    }

    /// Collapse the other groups around a newly activated tab when accordion mode is on
    pub async fn on_tab_activated(&self, tab_id: TabId, window: WindowId) -> Result<usize, EngineError> {
        let config = self.config().await?;
        if !config.settings.accordion {
            return Ok(0);
        }

        let tabs = self.provider.list_tabs(Some(window)).await?;
        let Some(tab) = tabs.into_iter().find(|t| t.id == tab_id) else {
            log::debug!("Activated tab {} is gone", tab_id);
            return Ok(0);
        };
        Ok(accordion::collapse_others(&self.provider, &self.clock, &tab, self.retry).await?)
    }

    pub async fn on_window_created(&self, window: WindowId) -> Result<usize, EngineError> {
        let config = self.config().await?;
        if !config.settings.clear_grouped_tabs {
            return Ok(0);
        }
        log::debug!("Window {} created; clearing grouped tabs", window);
        self.clear_grouped_tabs().await
    }

    /// Ungroup and close every grouped tab in every window
    pub async fn clear_grouped_tabs(&self) -> Result<usize, EngineError> {
        let grouped: Vec<TabId> = self
            .provider
            .list_tabs(None)
            .await?
            .into_iter()
            .filter(|t| t.is_grouped())
            .map(|t| t.id)
            .collect();
        if grouped.is_empty() {
            return Ok(0);
        }

        self.provider.ungroup_tabs(&grouped).await?;
        self.provider.close_tabs(&grouped).await?;
        log::info!("Closed {} grouped tabs", grouped.len());
        Ok(grouped.len())
    }

    pub async fn ungroup_all(&self, window: Option<WindowId>) -> Result<usize, EngineError> {
        let grouped: Vec<TabId> = self
            .provider
            .list_tabs(window)
            .await?
            .into_iter()
            .filter(|t| t.is_grouped())
            .map(|t| t.id)
            .collect();
        if !grouped.is_empty() {
            self.provider.ungroup_tabs(&grouped).await?;
        }
        Ok(grouped.len())
    }

    /// Store installed extension names for label substitution, or drop them
    pub async fn refresh_extension_names(&self, enabled: bool) -> Result<(), EngineError> {
        if enabled {
            let names: HashMap<String, String> = self
                .provider
                .installed_extensions()
                .await?
                .into_iter()
                .map(|ext| (ext.id, ext.name))
                .collect();
            log::debug!("Recording names of {} extensions", names.len());
            storage::write(self.store(), SettingKey::ExtensionReplaceMap, &names).await?;
        } else {
            self.store().remove(SettingKey::ExtensionReplaceMap).await?;
        }
        self.cache.invalidate();
        Ok(())
    }

    /// Group `domain` under `label` from now on.
    ///
    /// The domain is reduced to the same base key the classifier uses, so
    /// with subdomains disabled `mail.corp.com` is stored as `corp.com`.
    pub async fn set_group_name(&self, domain: &str, label: &str) -> Result<bool, EngineError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(EngineError::EmptyGroupName);
        }
        let host = extract_hostname(domain).ok_or_else(|| EngineError::InvalidDomain(domain.to_string()))?;
        let config = self.config().await?;
        let key = base_domain(&host, config.settings.subdomain_enabled);

        let mut names: GroupNames = storage::read(self.store(), SettingKey::GroupNames).await?;
        if !storage::assign_group_domain(&mut names, label, &key) {
            return Ok(false);
        }
        storage::write(self.store(), SettingKey::GroupNames, &names).await?;
        self.cache.invalidate();
        log::info!("Grouping {} under {:?}", key, label);
        Ok(true)
    }

    pub async fn remove_group_name(&self, label: &str) -> Result<bool, EngineError> {
        let mut names: GroupNames = storage::read(self.store(), SettingKey::GroupNames).await?;
        if !storage::remove_group(&mut names, label) {
            return Ok(false);
        }
        storage::write(self.store(), SettingKey::GroupNames, &names).await?;
        self.cache.invalidate();
        Ok(true)
    }

    pub async fn add_to_whitelist(&self, entry: &str) -> Result<bool, EngineError> {
        let host = extract_hostname(entry).ok_or_else(|| EngineError::InvalidDomain(entry.to_string()))?;
        let mut whitelist: Vec<String> = storage::read(self.store(), SettingKey::Whitelist).await?;
        if !storage::add_whitelist_entry(&mut whitelist, &host) {
            return Ok(false);
        }
        storage::write(self.store(), SettingKey::Whitelist, &whitelist).await?;
        self.cache.invalidate();
        Ok(true)
    }

    pub async fn remove_from_whitelist(&self, entry: &str) -> Result<bool, EngineError> {
        let mut whitelist: Vec<String> = storage::read(self.store(), SettingKey::Whitelist).await?;
        if !storage::remove_whitelist_entry(&mut whitelist, entry.trim()) {
            return Ok(false);
        }
        storage::write(self.store(), SettingKey::Whitelist, &whitelist).await?;
        self.cache.invalidate();
        Ok(true)
    }

    pub async fn export_config(&self) -> Result<ConfigExport, EngineError> {
        let (whitelist, group_names) = futures::try_join!(
            storage::read(self.store(), SettingKey::Whitelist),
            storage::read(self.store(), SettingKey::GroupNames)
        )?;
        Ok(ConfigExport { whitelist, group_names })
    }

    /// Merge an exported configuration into the stored one
    pub async fn import_config(&self, imported: ConfigExport) -> Result<ConfigExport, EngineError> {
        let mut merged = self.export_config().await?;
        merged.merge(imported);
        storage::write(self.store(), SettingKey::Whitelist, &merged.whitelist).await?;
        storage::write(self.store(), SettingKey::GroupNames, &merged.group_names).await?;
        self.cache.invalidate();
        log::info!(
            "Imported configuration: {} whitelist entries, {} custom groups",
            merged.whitelist.len(),
            merged.group_names.len()
        );
        Ok(merged)
    }
}
