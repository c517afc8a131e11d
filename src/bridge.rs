/// Chrome extension implementations of the provider, settings store,
/// clock, timers and collator
use crate::config::SettingKey;
use crate::debounce::Scheduler;
use crate::error::{ProviderError, StoreError};
use crate::ordering::Collator;
use crate::provider::{Clock, TabProvider};
use crate::storage::SettingsStore;
use crate::tab_data::{ExtensionInfo, GroupId, GroupTarget, Position, Tab, TabGroup, TabId, WindowId, WindowRef};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cmp::Ordering;
use std::time::Duration;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::WorkerGlobalScope;

// Thin wrappers over chrome.tabs, chrome.tabGroups, chrome.windows,
// chrome.management and chrome.storage
#[wasm_bindgen(module = "/js/bridge.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn queryTabs(window_id: Option<i32>) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn queryGroups(window_id: Option<i32>) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn getAllWindows() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn groupTabs(tab_ids: JsValue, group_id: Option<i32>, window_id: Option<i32>) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn ungroupTabs(tab_ids: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn updateGroup(group_id: i32, properties: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn moveGroup(group_id: i32, index: i32) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn moveTabs(tab_ids: JsValue, index: i32) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn removeTabs(tab_ids: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn getActiveTab() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn getAllExtensions() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn getStorage(area: &str, key: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn setStorage(area: &str, key: &str, value: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn removeStorage(area: &str, key: &str) -> Result<(), JsValue>;
}

/// Message text of a rejected browser call
pub fn js_error_message(error: &JsValue) -> String {
    if let Some(error) = error.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    error.as_string().unwrap_or_else(|| format!("{:?}", error))
}

/// Convert to a plain JS value: objects, not `Map`s
pub fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, serde_wasm_bindgen::Error> {
    value.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
}

fn from_js<T: DeserializeOwned>(op: &'static str, value: JsValue) -> Result<T, ProviderError> {
    serde_wasm_bindgen::from_value(value)
        .map_err(|e| ProviderError::from_message(op, format!("Failed to parse response: {}", e)))
}

fn ids_to_js(op: &'static str, ids: &[TabId]) -> Result<JsValue, ProviderError> {
    to_js(ids).map_err(|e| ProviderError::from_message(op, format!("Failed to serialize tab ids: {}", e)))
}

fn rejected(op: &'static str) -> impl Fn(JsValue) -> ProviderError {
    move |e| ProviderError::from_message(op, js_error_message(&e))
}

/// The browser's tabs, groups and windows
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeProvider;

impl TabProvider for ChromeProvider {
    async fn list_tabs(&self, window: Option<WindowId>) -> Result<Vec<Tab>, ProviderError> {
        let tabs = queryTabs(window).await.map_err(rejected("tabs.query"))?;
        from_js("tabs.query", tabs)
    }

    async fn list_groups(&self, window: Option<WindowId>) -> Result<Vec<TabGroup>, ProviderError> {
        let groups = queryGroups(window).await.map_err(rejected("tabGroups.query"))?;
        from_js("tabGroups.query", groups)
    }

    async fn list_windows(&self) -> Result<Vec<WindowRef>, ProviderError> {
        let windows = getAllWindows().await.map_err(rejected("windows.getAll"))?;
        from_js("windows.getAll", windows)
    }

    async fn group_tabs(&self, tab_ids: &[TabId], target: GroupTarget) -> Result<GroupId, ProviderError> {
        let (group_id, window_id) = match target {
            GroupTarget::Existing(id) => (Some(id), None),
            GroupTarget::NewInWindow(id) => (None, Some(id)),
        };
        let ids = ids_to_js("tabs.group", tab_ids)?;
        let group = groupTabs(ids, group_id, window_id).await.map_err(rejected("tabs.group"))?;
        from_js("tabs.group", group)
    }

    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> Result<(), ProviderError> {
        let ids = ids_to_js("tabs.ungroup", tab_ids)?;
        ungroupTabs(ids).await.map_err(rejected("tabs.ungroup"))
    }

    async fn set_group_title(&self, group_id: GroupId, title: &str) -> Result<(), ProviderError> {
        let properties = to_js(&serde_json::json!({ "title": title }))
            .map_err(|e| ProviderError::from_message("tabGroups.update", e.to_string()))?;
        updateGroup(group_id, properties).await.map_err(rejected("tabGroups.update"))
    }

    async fn set_group_collapsed(&self, group_id: GroupId, collapsed: bool) -> Result<(), ProviderError> {
        let properties = to_js(&serde_json::json!({ "collapsed": collapsed }))
            .map_err(|e| ProviderError::from_message("tabGroups.update", e.to_string()))?;
        updateGroup(group_id, properties).await.map_err(rejected("tabGroups.update"))
    }

    async fn move_group(&self, group_id: GroupId, position: Position) -> Result<(), ProviderError> {
        moveGroup(group_id, position.to_browser_index())
            .await
            .map_err(rejected("tabGroups.move"))
    }

    async fn move_tabs(&self, tab_ids: &[TabId], position: Position) -> Result<(), ProviderError> {
        let ids = ids_to_js("tabs.move", tab_ids)?;
        moveTabs(ids, position.to_browser_index()).await.map_err(rejected("tabs.move"))
    }

    async fn close_tabs(&self, tab_ids: &[TabId]) -> Result<(), ProviderError> {
        let ids = ids_to_js("tabs.remove", tab_ids)?;
        removeTabs(ids).await.map_err(rejected("tabs.remove"))
    }

    async fn active_tab(&self) -> Result<Option<Tab>, ProviderError> {
        let tab = getActiveTab().await.map_err(rejected("tabs.query"))?;
        if tab.is_null() || tab.is_undefined() {
            return Ok(None);
        }
        from_js("tabs.query", tab).map(Some)
    }

    async fn installed_extensions(&self) -> Result<Vec<ExtensionInfo>, ProviderError> {
        let extensions = getAllExtensions().await.map_err(rejected("management.getAll"))?;
        from_js("management.getAll", extensions)
    }
}

/// `chrome.storage`, with each key in its own area
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeSettings;

impl SettingsStore for ChromeSettings {
    async fn get(&self, key: SettingKey) -> Result<Option<serde_json::Value>, StoreError> {
        let read_error = |message: String| StoreError::Read {
            key: key.as_str(),
            message,
        };
        let value = getStorage(key.area().as_str(), key.as_str())
            .await
            .map_err(|e| read_error(js_error_message(&e)))?;
        if value.is_null() || value.is_undefined() {
            return Ok(None);
        }
        serde_wasm_bindgen::from_value(value)
            .map(Some)
            .map_err(|e| read_error(e.to_string()))
    }

    async fn set(&self, key: SettingKey, value: serde_json::Value) -> Result<(), StoreError> {
        let write_error = |message: String| StoreError::Write {
            key: key.as_str(),
            message,
        };
        let value = to_js(&value).map_err(|e| write_error(e.to_string()))?;
        setStorage(key.area().as_str(), key.as_str(), value)
            .await
            .map_err(|e| write_error(js_error_message(&e)))
    }

    async fn remove(&self, key: SettingKey) -> Result<(), StoreError> {
        removeStorage(key.area().as_str(), key.as_str())
            .await
            .map_err(|e| StoreError::Write {
                key: key.as_str(),
                message: js_error_message(&e),
            })
    }
}

fn global_scope() -> Result<WorkerGlobalScope, JsValue> {
    js_sys::global()
        .dyn_into::<WorkerGlobalScope>()
        .map_err(JsValue::from)
}

fn millis(duration: Duration) -> i32 {
    i32::try_from(duration.as_millis()).unwrap_or(i32::MAX)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsClock;

impl Clock for JsClock {
    fn now_ms(&self) -> f64 {
        js_sys::Date::now()
    }

    async fn sleep(&self, duration: Duration) {
        let scope = match global_scope() {
            Ok(scope) => scope,
            Err(e) => {
                log::error!("No timer scope for sleep: {}", js_error_message(&e));
                return;
            }
        };
        let promise = js_sys::Promise::new(&mut |resolve, _reject| {
            if let Err(e) = scope.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, millis(duration)) {
                log::error!("Failed to set sleep timer: {}", js_error_message(&e));
                let _ = resolve.call0(&JsValue::NULL);
            }
        });
        let _ = JsFuture::from(promise).await;
    }
}

/// `setTimeout` / `clearTimeout` on the worker's global scope
#[derive(Debug, Clone, Default)]
pub struct JsTimers;

impl Scheduler for JsTimers {
    type Handle = Option<i32>;

    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) -> Option<i32> {
        let scope = global_scope()
            .inspect_err(|e| log::error!("No timer scope: {}", js_error_message(e)))
            .ok()?;
        let callback = Closure::once_into_js(move || task());
        scope
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), millis(delay))
            .inspect_err(|e| log::error!("Failed to schedule timer: {}", js_error_message(e)))
            .ok()
    }

    fn cancel(&self, handle: Option<i32>) {
        if let (Some(handle), Ok(scope)) = (handle, global_scope()) {
            scope.clear_timeout_with_handle(handle);
        }
    }
}

/// Locale-aware ordering through `Intl.Collator`
pub struct IntlCollator {
    compare: js_sys::Function,
}

impl IntlCollator {
    pub fn new(locale: &str) -> IntlCollator {
        let locales = js_sys::Array::of1(&JsValue::from_str(locale));
        let collator = js_sys::Intl::Collator::new(&locales, &js_sys::Object::new());
        IntlCollator {
            compare: collator.compare(),
        }
    }
}

impl Collator for IntlCollator {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        let result = self
            .compare
            .call2(&JsValue::NULL, &JsValue::from_str(a), &JsValue::from_str(b))
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        result.partial_cmp(&0.0).unwrap_or(Ordering::Equal)
    }
}
