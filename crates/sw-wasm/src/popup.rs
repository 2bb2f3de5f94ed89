//! Popup: renders `PopupView`s and forwards button clicks.

use std::cell::Cell;
use std::rc::Rc;

use serde::Serialize;
use sw_core::message::{Command, Response};
use sw_core::surface::{Channel, ControlSurface, PopupView};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::Element;

use crate::chrome;
use crate::storage::ChromeStore;

type Surface = ControlSurface<RuntimeChannel, ChromeStore>;

/// `chrome.runtime.sendMessage` to the background context.
pub struct RuntimeChannel;

impl Channel for RuntimeChannel {
    async fn send(&self, command: Command) -> Option<Response> {
        let message = command
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .ok()?;
        let reply = match chrome::call_async("runtime", "sendMessage", &[message]).await {
            Ok(reply) => reply,
            Err(e) => {
                log::debug!("{:?} went unanswered: {}", command, chrome::describe(&e));
                return None;
            }
        };
        if reply.is_undefined() || reply.is_null() {
            return None;
        }
        serde_wasm_bindgen::from_value(reply).ok()
    }
}

struct PopupElements {
    toggle: Element,
    reset: Element,
    status_text: Element,
    status_indicator: Element,
    blocked_count: Element,
}

impl PopupElements {
    fn find(document: &web_sys::Document) -> Result<Self, JsValue> {
        let by_id = |id: &str| {
            document
                .get_element_by_id(id)
                .ok_or_else(|| JsValue::from_str(&format!("popup is missing #{}", id)))
        };
        Ok(Self {
            toggle: by_id("toggleBtn")?,
            reset: by_id("resetBtn")?,
            status_text: by_id("statusText")?,
            status_indicator: by_id("statusIndicator")?,
            blocked_count: by_id("blockedCount")?,
        })
    }

    fn render(&self, view: &PopupView) {
        self.blocked_count.set_text_content(Some(&view.count_text));
        let _ = self.toggle.set_attribute("aria-pressed", view.aria_pressed());
        self.toggle.set_class_name(view.toggle_class());
        self.status_text.set_text_content(Some(view.status_text()));
        self.status_indicator.set_class_name(view.indicator_class());
    }
}

fn refresh(surface: &Rc<Surface>, elements: &Rc<PopupElements>) {
    let surface = Rc::clone(surface);
    let elements = Rc::clone(elements);
    spawn_local(async move {
        if let Some(view) = surface.refresh().await {
            elements.render(&view);
        }
    });
}

fn on_click<F>(element: &Element, handler: F) -> Result<(), JsValue>
where
    F: FnMut() + 'static,
{
    let closure = Closure::<dyn FnMut()>::new(handler);
    element.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref())?;
    closure.forget();
    Ok(())
}

/// Entry point for the popup page. Call after `DOMContentLoaded`.
#[wasm_bindgen]
pub fn start_popup() -> Result<(), JsValue> {
    crate::init_logging();

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let document = window.document().ok_or_else(|| JsValue::from_str("no document"))?;
    let elements = Rc::new(PopupElements::find(&document)?);
    let surface: Rc<Surface> = Rc::new(ControlSurface::new(RuntimeChannel, ChromeStore));

    refresh(&surface, &elements);

    let (s, e) = (Rc::clone(&surface), Rc::clone(&elements));
    on_click(&elements.toggle, move || {
        let (s, e) = (Rc::clone(&s), Rc::clone(&e));
        spawn_local(async move {
            if let Some(view) = s.toggle().await {
                e.render(&view);
            }
        });
    })?;

    let (s, e) = (Rc::clone(&surface), Rc::clone(&elements));
    on_click(&elements.reset, move || {
        let (s, e) = (Rc::clone(&s), Rc::clone(&e));
        spawn_local(async move {
            if let Some(view) = s.reset().await {
                e.render(&view);
            }
        });
    })?;

    let (s, e) = (Rc::clone(&surface), Rc::clone(&elements));
    let tick = Closure::<dyn FnMut()>::new(move || refresh(&s, &e));
    let period = i32::try_from(surface.config().refresh_ms).unwrap_or(i32::MAX);
    let interval = window.set_interval_with_callback_and_timeout_and_arguments_0(tick.as_ref().unchecked_ref(), period)?;
    tick.forget();

    let cleared = Rc::new(Cell::new(false));
    let w = window.clone();
    let s = Rc::clone(&surface);
    let on_hide = Closure::<dyn FnMut()>::new(move || {
        s.close();
        if !cleared.replace(true) {
            w.clear_interval_with_handle(interval);
        }
    });
    window.add_event_listener_with_callback("pagehide", on_hide.as_ref().unchecked_ref())?;
    on_hide.forget();

    Ok(())
}
