/// Tab Grouper - Chrome extension that groups tabs by domain
/// Built with Rust + WASM

pub mod accordion;
pub mod bridge;
pub mod cache;
pub mod config;
pub mod debounce;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod ordering;
pub mod planner;
pub mod provider;
pub mod reconciler;
pub mod reference;
pub mod storage;
pub mod tab_data;

#[cfg(test)]
mod testing;

use bridge::{to_js, ChromeProvider, ChromeSettings, IntlCollator, JsClock, JsTimers};
use debounce::{Debouncer, DEBOUNCE_DELAY};
use engine::Engine;
use events::{route_event, BrowserEvent, SettingsChange, Trigger};
use reference::ReferenceData;
use std::rc::Rc;
use storage::ConfigExport;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// Re-export the classifier's hostname check for the options page
#[wasm_bindgen]
pub fn extract_hostname(input: &str) -> Option<String> {
    domain::extract_hostname(input)
}

struct Runtime {
    engine: Engine<ChromeProvider, ChromeSettings, JsClock>,
    debouncer: Debouncer<JsTimers>,
}

/// The background service worker's handle on the engine
#[wasm_bindgen]
pub struct TabGrouper {
    runtime: Rc<Runtime>,
}

#[wasm_bindgen]
impl TabGrouper {
    #[wasm_bindgen(constructor)]
    pub fn new() -> TabGrouper {
        TabGrouper::build(ReferenceData::builtin())
    }

    /// Build with freshly fetched TLD and alias lists
    pub fn with_reference(tld_text: &str, aliases_json: &str) -> Result<TabGrouper, JsValue> {
        let reference = ReferenceData::from_sources(tld_text, aliases_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid alias table: {}", e)))?;
        Ok(TabGrouper::build(reference))
    }

    pub fn on_tab_updated(&self, tab_id: i32, window_id: i32, complete: bool) {
        self.dispatch(BrowserEvent::TabUpdated {
            tab_id,
            window_id,
            complete,
        });
    }

    pub fn on_tab_removed(&self, tab_id: i32, window_id: i32, window_closing: bool) {
        self.dispatch(BrowserEvent::TabRemoved {
            tab_id,
            window_id,
            window_closing,
        });
    }

    pub fn on_tab_activated(&self, tab_id: i32, window_id: i32) {
        self.dispatch(BrowserEvent::TabActivated { tab_id, window_id });
    }

    pub fn on_window_created(&self, window_id: i32) {
        self.dispatch(BrowserEvent::WindowCreated { window_id });
    }

    /// Forward a `chrome.storage.onChanged` record
    pub fn on_storage_changed(&self, changes: JsValue) {
        let changes: serde_json::Map<String, serde_json::Value> = match serde_wasm_bindgen::from_value(changes) {
            Ok(changes) => changes,
            Err(e) => {
                log::error!("Unreadable storage change: {}", e);
                return;
            }
        };
        let changes = SettingsChange::parse_all(&changes);
        if changes.is_empty() {
            return;
        }

        let runtime = Rc::clone(&self.runtime);
        spawn_local(async move {
            if let Err(e) = runtime.engine.on_settings_changed(&changes).await {
                log::error!("Failed to apply settings change: {}", e);
            }
        });
    }

    /// Regroup one window, or all windows, right away
    pub fn regroup_now(&self, window_id: Option<i32>) -> js_sys::Promise {
        let runtime = Rc::clone(&self.runtime);
        future_to_promise(async move {
            let report = runtime.engine.regroup(window_id).await.map_err(to_js_error)?;
            to_js(&report).map_err(to_js_error)
        })
    }

    pub fn set_group_name(&self, domain: String, label: String) -> js_sys::Promise {
        let runtime = Rc::clone(&self.runtime);
        future_to_promise(async move {
            let changed = runtime.engine.set_group_name(&domain, &label).await.map_err(to_js_error)?;
            Ok(JsValue::from_bool(changed))
        })
    }

    pub fn remove_group_name(&self, label: String) -> js_sys::Promise {
        let runtime = Rc::clone(&self.runtime);
        future_to_promise(async move {
            let changed = runtime.engine.remove_group_name(&label).await.map_err(to_js_error)?;
            Ok(JsValue::from_bool(changed))
        })
    }

    pub fn add_to_whitelist(&self, entry: String) -> js_sys::Promise {
        let runtime = Rc::clone(&self.runtime);
        future_to_promise(async move {
            let changed = runtime.engine.add_to_whitelist(&entry).await.map_err(to_js_error)?;
            Ok(JsValue::from_bool(changed))
        })
    }

    pub fn export_config(&self) -> js_sys::Promise {
        let runtime = Rc::clone(&self.runtime);
        future_to_promise(async move {
            let exported = runtime.engine.export_config().await.map_err(to_js_error)?;
            to_js(&exported).map_err(to_js_error)
        })
    }

    pub fn import_config(&self, config: JsValue) -> js_sys::Promise {
        let runtime = Rc::clone(&self.runtime);
        future_to_promise(async move {
            let imported: ConfigExport = serde_wasm_bindgen::from_value(config).map_err(to_js_error)?;
            let merged = runtime.engine.import_config(imported).await.map_err(to_js_error)?;
            to_js(&merged).map_err(to_js_error)
        })
    }
}

impl TabGrouper {
    fn build(reference: ReferenceData) -> TabGrouper {
        let engine =
            Engine::new(ChromeProvider, ChromeSettings, JsClock, reference).with_collator(IntlCollator::new("zh-CN"));
        TabGrouper {
            runtime: Rc::new(Runtime {
                engine,
                debouncer: Debouncer::new(JsTimers, DEBOUNCE_DELAY),
            }),
        }
    }

    fn dispatch(&self, event: BrowserEvent) {
        let Some(trigger) = route_event(&event) else {
            return;
        };

        let runtime = Rc::clone(&self.runtime);
        match trigger {
            Trigger::Regroup(key) => {
                let task_runtime = Rc::clone(&runtime);
                runtime.debouncer.trigger(key, move || {
                    spawn_local(async move {
                        if let Err(e) = task_runtime.engine.regroup(key.window()).await {
                            log::error!("Regroup pass failed: {}", e);
                        }
                    });
                });
            }
            Trigger::Accordion { tab_id, window_id } => spawn_local(async move {
                if let Err(e) = runtime.engine.on_tab_activated(tab_id, window_id).await {
                    log::error!("Accordion update failed: {}", e);
                }
            }),
            Trigger::ClearGroupedTabs { window_id } => spawn_local(async move {
                if let Err(e) = runtime.engine.on_window_created(window_id).await {
                    log::error!("Failed to clear grouped tabs: {}", e);
                }
            }),
        }
    }
}

impl Default for TabGrouper {
    fn default() -> Self {
        TabGrouper::new()
    }
}

fn to_js_error(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&error.to_string())
}
