//! WebAssembly bindings for AdSweep
//!
//! One crate, three extension contexts. Each JS shim loads the module and
//! calls its entry point:
//!
//! - `start_background()` from the service worker
//! - `start_content()` from the content script
//! - `start_popup()` from the popup page

use std::sync::Once;

use sw_core::patterns::PatternSet;
use wasm_bindgen::prelude::*;

mod background;
mod chrome;
mod content;
mod popup;
mod storage;

pub use background::start_background;
pub use content::start_content;
pub use popup::start_popup;

static LOGGING: Once = Once::new();

pub(crate) fn init_logging() {
    LOGGING.call_once(|| {
        console_error_panic_hook::set_once();
        wasm_logger::init(wasm_logger::Config::new(log::Level::Info));
    });
}

/// The stylesheet injected into active pages.
#[wasm_bindgen]
pub fn pattern_stylesheet() -> String {
    PatternSet::builtin().stylesheet()
}

/// Would the page's `window.open` guard refuse this URL?
#[wasm_bindgen]
pub fn is_popup_blocked(url: &str) -> bool {
    PatternSet::builtin().popup_is_blocked(url)
}
