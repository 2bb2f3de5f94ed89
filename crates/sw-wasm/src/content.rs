//! Content script: one `PageSuppressor` over the live DOM.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use js_sys::{Array, Function, Reflect};
use sw_core::page::{Document, ElementFilter, ElementView, MutationBatch, PageError, Scheduler};
use sw_core::patterns::{popup_is_blocked, PatternSet};
use sw_core::suppressor::{resolve_enabled, PageEvent, PageSuppressor};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{
    AddEventListenerOptions, Element, HtmlElement, MutationObserver, MutationObserverInit,
    MutationRecord, NodeList, Window,
};

use crate::chrome;
use crate::storage::{parse_changes, ChromeStore};

type ContentSuppressor = PageSuppressor<WebDocument, WebScheduler>;

thread_local! {
    static SUPPRESSOR: RefCell<Option<Rc<RefCell<ContentSuppressor>>>> = const { RefCell::new(None) };
}

fn dispatch(target: &Weak<RefCell<ContentSuppressor>>, event: PageEvent) {
    let Some(suppressor) = target.upgrade() else {
        return;
    };
    match suppressor.try_borrow_mut() {
        Ok(mut suppressor) => suppressor.handle(event),
        Err(_) => log::trace!("suppressor busy, dropping {:?}", event),
    };
}

// =============================================================================
// Document
// =============================================================================

struct WebElementView<'a>(&'a Element);

impl ElementView for WebElementView<'_> {
    fn attribute(&self, name: &str) -> Option<String> {
        self.0.get_attribute(name)
    }

    fn text_content(&self) -> String {
        self.0.text_content().unwrap_or_default()
    }
}

type OpenGuard = Closure<dyn FnMut(JsValue, JsValue, JsValue) -> JsValue>;

pub struct WebDocument {
    window: Window,
    document: web_sys::Document,
    open_guard: Option<OpenGuard>,
}

impl WebDocument {
    pub fn new(window: Window, document: web_sys::Document) -> Self {
        Self {
            window,
            document,
            open_guard: None,
        }
    }

    fn query(&self, selector: &str) -> Result<Vec<Element>, PageError> {
        let list: NodeList = self
            .document
            .query_selector_all(selector)
            .map_err(|e| PageError::invalid_selector(selector, chrome::describe(&e)))?;

        let mut elements = Vec::with_capacity(list.length() as usize);
        for i in 0..list.length() {
            if let Some(element) = list.item(i).and_then(|node| node.dyn_into::<Element>().ok()) {
                elements.push(element);
            }
        }
        Ok(elements)
    }
}

impl Document for WebDocument {
    type Style = Element;

    fn remove_where(&mut self, selector: &str, filter: ElementFilter<'_>) -> Result<usize, PageError> {
        let mut removed = 0;
        for element in self.query(selector)? {
            if element.parent_node().is_some() && filter(&WebElementView(&element)) {
                element.remove();
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn hide_where(&mut self, selector: &str, filter: ElementFilter<'_>) -> Result<usize, PageError> {
        let mut hidden = 0;
        for element in self.query(selector)? {
            if !filter(&WebElementView(&element)) {
                continue;
            }
            let Some(html) = element.dyn_ref::<HtmlElement>() else {
                continue;
            };
            let style = html.style();
            style
                .set_property_with_priority("display", "none", "important")
                .and_then(|_| style.set_property_with_priority("visibility", "hidden", "important"))
                .map_err(|e| PageError::Dom(chrome::describe(&e)))?;
            hidden += 1;
        }
        Ok(hidden)
    }

    fn neutralize_global(&mut self, name: &str) -> bool {
        let key = JsValue::from_str(name);
        match Reflect::get(&self.window, &key) {
            Ok(value) if value.is_truthy() => Reflect::set(&self.window, &key, &JsValue::FALSE).unwrap_or(false),
            _ => false,
        }
    }

    fn guard_window_open(&mut self, blocked: &[String]) {
        let key = JsValue::from_str("open");
        let Ok(original) = Reflect::get(&self.window, &key).and_then(|f| f.dyn_into::<Function>()) else {
            log::debug!("window.open is not a function; leaving it alone");
            return;
        };

        let blocked = blocked.to_vec();
        let window = self.window.clone();
        let guard: OpenGuard = Closure::new(move |url: JsValue, target: JsValue, features: JsValue| {
            if let Some(url) = url.as_string() {
                if popup_is_blocked(&url, &blocked) {
                    log::debug!("refused window.open({})", url);
                    return JsValue::NULL;
                }
            }
            let args = Array::of3(&url, &target, &features);
            Reflect::apply(&original, &window, &args).unwrap_or(JsValue::NULL)
        });

        if Reflect::set(&self.window, &key, guard.as_ref()).unwrap_or(false) {
            self.open_guard = Some(guard);
        }
    }

    fn inject_style(&mut self, css: &str) -> Option<Element> {
        let style = self.document.create_element("style").ok()?;
        style.set_text_content(Some(css));
        let parent = self
            .document
            .query_selector("head")
            .ok()
            .flatten()
            .or_else(|| self.document.document_element())?;
        parent.append_child(&style).ok()?;
        Some(style)
    }

    fn remove_style(&mut self, style: Element) {
        style.remove();
    }
}

// =============================================================================
// Scheduler
// =============================================================================

pub struct WebObserver {
    observer: MutationObserver,
    _callback: Closure<dyn FnMut(Array, MutationObserver)>,
}

pub struct WebTimer {
    handle: i32,
    _callback: Closure<dyn FnMut()>,
}

pub struct WebScheduler {
    window: Window,
    target: Weak<RefCell<ContentSuppressor>>,
}

impl WebScheduler {
    fn new(window: Window, target: Weak<RefCell<ContentSuppressor>>) -> Self {
        Self { window, target }
    }
}

fn millis(duration: Duration) -> i32 {
    i32::try_from(duration.as_millis()).unwrap_or(i32::MAX)
}

impl Scheduler for WebScheduler {
    type Timer = WebTimer;
    type Observer = WebObserver;

    fn observe_mutations(&mut self) -> Option<WebObserver> {
        let target = self.target.clone();
        let callback = Closure::<dyn FnMut(Array, MutationObserver)>::new(move |records: Array, _: MutationObserver| {
            let added_nodes = records
                .iter()
                .filter_map(|record| record.dyn_into::<MutationRecord>().ok())
                .map(|record| record.added_nodes().length() as usize)
                .sum();
            dispatch(&target, PageEvent::Mutations(MutationBatch { added_nodes }));
        });

        let observer = MutationObserver::new(callback.as_ref().unchecked_ref()).ok()?;
        let document = self.window.document()?;
        let root: Element = match document.body() {
            Some(body) => body.into(),
            None => document.document_element()?,
        };

        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        observer.observe_with_options(&root, &init).ok()?;

        Some(WebObserver { observer, _callback: callback })
    }

    fn disconnect(&mut self, observer: WebObserver) {
        observer.observer.disconnect();
    }

    fn start_interval(&mut self, period: Duration) -> Option<WebTimer> {
        let target = self.target.clone();
        let callback = Closure::<dyn FnMut()>::new(move || dispatch(&target, PageEvent::Tick));
        let handle = self
            .window
            .set_interval_with_callback_and_timeout_and_arguments_0(callback.as_ref().unchecked_ref(), millis(period))
            .ok()?;
        Some(WebTimer { handle, _callback: callback })
    }

    fn cancel_interval(&mut self, timer: WebTimer) {
        self.window.clear_interval_with_handle(timer.handle);
    }

    fn schedule_settle(&mut self, delay: Duration) {
        let target = self.target.clone();
        let callback = Closure::once_into_js(move || dispatch(&target, PageEvent::Settled));
        if let Err(e) = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), millis(delay))
        {
            log::debug!("setTimeout failed: {}", chrome::describe(&e));
        }
    }
}

// =============================================================================
// Entry
// =============================================================================

/// Deliver `DocumentReady` once the DOM is parsed.
fn notify_when_parsed(suppressor: &Rc<RefCell<ContentSuppressor>>, document: &web_sys::Document) {
    let target = Rc::downgrade(suppressor);
    let callback = Closure::once_into_js(move || dispatch(&target, PageEvent::DocumentReady));
    let options = AddEventListenerOptions::new();
    options.set_once(true);
    if let Err(e) = document.add_event_listener_with_callback_and_add_event_listener_options(
        "DOMContentLoaded",
        callback.unchecked_ref(),
        &options,
    ) {
        log::warn!("could not wait for DOMContentLoaded: {}", chrome::describe(&e));
    }
}

/// Entry point for the content script.
#[wasm_bindgen]
pub fn start_content() -> Result<(), JsValue> {
    crate::init_logging();

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let document = window.document().ok_or_else(|| JsValue::from_str("no document"))?;
    let patterns = Rc::new(PatternSet::builtin().clone());
    let loading = document.ready_state() == "loading";

    let suppressor: Rc<RefCell<ContentSuppressor>> = Rc::new_cyclic(|weak| {
        let suppressor = PageSuppressor::new(
            WebDocument::new(window.clone(), document.clone()),
            WebScheduler::new(window.clone(), weak.clone()),
            patterns,
        );
        RefCell::new(if loading {
            suppressor.waiting_for_document()
        } else {
            suppressor
        })
    });
    SUPPRESSOR.with(|slot| *slot.borrow_mut() = Some(Rc::clone(&suppressor)));

    let target = Rc::downgrade(&suppressor);
    let on_changed = Closure::<dyn FnMut(JsValue, JsValue)>::new(move |changes: JsValue, area: JsValue| {
        let Some(suppressor) = target.upgrade() else {
            return;
        };
        for change in parse_changes(changes, &area) {
            suppressor.borrow_mut().on_store_change(&change);
        }
    });
    chrome::add_listener("storage.onChanged", on_changed.as_ref().unchecked_ref())?;
    on_changed.forget();

    if loading {
        notify_when_parsed(&suppressor, &document);
    }

    // While the page is loading, this read and any store change only set
    // the wanted state; `DocumentReady` applies the latest one.
    spawn_local(async move {
        let enabled = resolve_enabled(&ChromeStore).await;
        suppressor.borrow_mut().handle(PageEvent::EnabledChanged(enabled));
    });

    Ok(())
}
