//! Page seams used by the suppressor.
//!
//! `Document` covers everything done to the page content, `Scheduler`
//! covers everything that calls back later. Handles are associated types so
//! a browser implementation can keep its closures alive inside them.

use std::time::Duration;

/// Error type for page operations.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error("DOM error: {0}")]
    Dom(String),
}

impl PageError {
    pub fn invalid_selector(selector: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }
}

/// Read-only view of a matched element.
pub trait ElementView {
    fn attribute(&self, name: &str) -> Option<String>;
    fn text_content(&self) -> String;
}

/// Element filter passed to bulk operations.
pub type ElementFilter<'a> = &'a dyn Fn(&dyn ElementView) -> bool;

/// The content of one loaded page.
pub trait Document {
    /// Injected stylesheet handle.
    type Style;

    /// Detach every element matching `selector` that passes `filter`.
    /// Returns the number detached. A selector the engine cannot parse is
    /// an error for this call only.
    fn remove_where(&mut self, selector: &str, filter: ElementFilter<'_>) -> Result<usize, PageError>;

    /// Force `display: none` / `visibility: hidden` (both `!important`) on
    /// every element matching `selector` that passes `filter`.
    fn hide_where(&mut self, selector: &str, filter: ElementFilter<'_>) -> Result<usize, PageError>;

    /// Set a page global to `false` if it is currently truthy. Returns
    /// whether it was changed.
    fn neutralize_global(&mut self, name: &str) -> bool;

    /// Make `window.open` return null for URLs containing any of `blocked`.
    fn guard_window_open(&mut self, blocked: &[String]);

    fn inject_style(&mut self, css: &str) -> Option<Self::Style>;

    fn remove_style(&mut self, style: Self::Style);
}

/// Timers and DOM observation for one page.
///
/// Callbacks are delivered back to the suppressor as
/// [`PageEvent`](crate::suppressor::PageEvent)s by whoever owns both.
pub trait Scheduler {
    type Timer;
    type Observer;

    /// Start watching for structural changes (child list, subtree).
    fn observe_mutations(&mut self) -> Option<Self::Observer>;

    fn disconnect(&mut self, observer: Self::Observer);

    /// Deliver `PageEvent::Tick` every `period`.
    fn start_interval(&mut self, period: Duration) -> Option<Self::Timer>;

    fn cancel_interval(&mut self, timer: Self::Timer);

    /// Deliver `PageEvent::Settled` once after `delay`.
    fn schedule_settle(&mut self, delay: Duration);
}

/// One mutation-observer callback's worth of records, reduced to what the
/// suppressor needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationBatch {
    pub added_nodes: usize,
}

impl MutationBatch {
    pub fn has_additions(&self) -> bool {
        self.added_nodes > 0
    }
}
