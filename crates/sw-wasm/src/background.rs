//! Background context: hosts the coordinator.

use std::rc::Rc;

use js_sys::{Array, Function, Reflect};
use serde::Serialize;
use sw_core::coordinator::{Badge, Coordinator, Indicator, RuleSets};
use sw_core::message::Command;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

use crate::chrome;
use crate::storage::ChromeStore;

type BackgroundCoordinator = Coordinator<ChromeStore, DeclarativeRules, ActionBadge>;

/// `chrome.declarativeNetRequest` static rule sets.
pub struct DeclarativeRules;

impl RuleSets for DeclarativeRules {
    fn set_enabled(&self, ruleset_id: &str, enabled: bool) {
        let key = if enabled { "enableRulesetIds" } else { "disableRulesetIds" };
        let ids = Array::of1(&JsValue::from_str(ruleset_id));
        let payload = chrome::object(&[(key, ids.into())]);

        spawn_local(async move {
            if let Err(e) = chrome::call_async("declarativeNetRequest", "updateEnabledRulesets", &[payload.into()]).await {
                log::warn!("updateEnabledRulesets failed: {}", chrome::describe(&e));
            }
        });
    }
}

/// `chrome.action` badge on the active tab of the current window.
pub struct ActionBadge;

impl ActionBadge {
    async fn active_tab_id() -> Option<f64> {
        let query = chrome::object(&[
            ("active", JsValue::TRUE),
            ("currentWindow", JsValue::TRUE),
        ]);
        let tabs = chrome::call_async("tabs", "query", &[query.into()]).await.ok()?;
        let first = Array::from(&tabs).get(0);
        if first.is_undefined() {
            return None;
        }
        Reflect::get(&first, &JsValue::from_str("id")).ok()?.as_f64()
    }
}

impl Indicator for ActionBadge {
    async fn show(&self, badge: &Badge) -> bool {
        let Some(tab_id) = Self::active_tab_id().await else {
            return false;
        };

        let text = chrome::object(&[
            ("text", JsValue::from_str(&badge.text)),
            ("tabId", JsValue::from_f64(tab_id)),
        ]);
        if let Err(e) = chrome::call_async("action", "setBadgeText", &[text.into()]).await {
            log::debug!("setBadgeText failed: {}", chrome::describe(&e));
        }

        let color = chrome::object(&[("color", JsValue::from_str(&badge.color))]);
        if let Err(e) = chrome::call_async("action", "setBadgeBackgroundColor", &[color.into()]).await {
            log::debug!("setBadgeBackgroundColor failed: {}", chrome::describe(&e));
        }
        true
    }
}

fn listen<F>(event: &str, handler: F) -> Result<(), JsValue>
where
    F: FnMut(JsValue, JsValue) + 'static,
{
    let closure = Closure::<dyn FnMut(JsValue, JsValue)>::new(handler);
    chrome::add_listener(event, closure.as_ref().unchecked_ref())?;
    closure.forget();
    Ok(())
}

fn on_message(coordinator: Rc<BackgroundCoordinator>) -> Result<(), JsValue> {
    let closure = Closure::<dyn FnMut(JsValue, JsValue, Function) -> bool>::new(
        move |request: JsValue, _sender: JsValue, send_response: Function| {
            let Ok(command) = serde_wasm_bindgen::from_value::<Command>(request) else {
                return false;
            };

            let coordinator = Rc::clone(&coordinator);
            spawn_local(async move {
                let response = coordinator.handle(command).await;
                match response.serialize(&serde_wasm_bindgen::Serializer::json_compatible()) {
                    Ok(value) => {
                        if let Err(e) = send_response.call1(&JsValue::UNDEFINED, &value) {
                            log::debug!("sendResponse failed: {}", chrome::describe(&e));
                        }
                    }
                    Err(e) => log::error!("failed to serialize response: {}", e),
                }
            });
            // Keep the channel open for the async response
            true
        },
    );
    chrome::add_listener("runtime.onMessage", closure.as_ref().unchecked_ref())?;
    closure.forget();
    Ok(())
}

/// Entry point for the extension's background service worker.
#[wasm_bindgen]
pub fn start_background() -> Result<(), JsValue> {
    crate::init_logging();

    // Forgotten listener closures keep the coordinator alive for the
    // lifetime of the worker.
    let coordinator: Rc<BackgroundCoordinator> =
        Rc::new(Coordinator::new(ChromeStore, DeclarativeRules, ActionBadge));

    // The worker is respawned without onStartup; every spawn is a startup.
    let c = Rc::clone(&coordinator);
    spawn_local(async move { c.resynchronize().await });

    let c = Rc::clone(&coordinator);
    listen("runtime.onInstalled", move |_, _| {
        let c = Rc::clone(&c);
        spawn_local(async move { c.initialize().await });
    })?;

    let c = Rc::clone(&coordinator);
    listen("runtime.onStartup", move |_, _| {
        let c = Rc::clone(&c);
        spawn_local(async move { c.resynchronize().await });
    })?;

    // Only present for unpacked builds with declarativeNetRequestFeedback
    let c = Rc::clone(&coordinator);
    let counted = listen("declarativeNetRequest.onRuleMatchedDebug", move |_, _| {
        let c = Rc::clone(&c);
        spawn_local(async move { c.record_suppression_event().await });
    });
    if let Err(e) = counted {
        log::warn!("block counting unavailable: {}", chrome::describe(&e));
    }

    on_message(Rc::clone(&coordinator))?;

    let c = Rc::clone(&coordinator);
    listen("tabs.onUpdated", move |_tab_id, change_info| {
        let complete = Reflect::get(&change_info, &JsValue::from_str("status"))
            .ok()
            .and_then(|s| s.as_string())
            .is_some_and(|s| s == "complete");
        if complete {
            let c = Rc::clone(&c);
            spawn_local(async move {
                c.refresh_indicator().await;
            });
        }
    })?;

    let c = Rc::clone(&coordinator);
    listen("tabs.onActivated", move |_, _| {
        let c = Rc::clone(&c);
        spawn_local(async move {
            c.refresh_indicator().await;
        });
    })?;

    log::info!("background started");
    Ok(())
}
