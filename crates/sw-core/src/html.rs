//! Off-browser page over static HTML.
//!
//! `HtmlDocument` parses markup with `scraper` and implements [`Document`]
//! so suppression passes can run against saved pages. Page globals and
//! `window.open` are simulated. Hiding is tracked per node rather than
//! written back into the markup.
//!
//! `StaticScheduler` never fires anything on its own; it only counts live
//! handles. The owner decides when to deliver `Tick`/`Settled`.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use scraper::{ElementRef, Html, Selector};

use crate::page::{Document, ElementFilter, ElementView, PageError, Scheduler};
use crate::patterns::popup_is_blocked;

struct HtmlElementView<'a>(ElementRef<'a>);

impl ElementView for HtmlElementView<'_> {
    fn attribute(&self, name: &str) -> Option<String> {
        self.0.value().attr(name).map(str::to_string)
    }

    fn text_content(&self) -> String {
        self.0.text().collect()
    }
}

/// Handle to a stylesheet injected into an [`HtmlDocument`].
#[derive(Debug, PartialEq, Eq)]
pub struct HtmlStyle(u32);

pub struct HtmlDocument {
    html: Html,
    /// Arena positions of every element hidden so far. Detaching keeps
    /// nodes in the arena, so positions stay stable.
    hidden: HashSet<usize>,
    globals: HashMap<String, bool>,
    popup_guard: Option<Vec<String>>,
    styles: Vec<(u32, String)>,
    next_style: u32,
}

impl HtmlDocument {
    pub fn parse(markup: &str) -> Self {
        Self {
            html: Html::parse_document(markup),
            hidden: HashSet::new(),
            globals: HashMap::new(),
            popup_guard: None,
            styles: Vec::new(),
            next_style: 0,
        }
    }

    /// Number of attached elements matching `selector`; 0 for a bad selector.
    pub fn count(&self, selector: &str) -> usize {
        match Selector::parse(selector) {
            Ok(sel) => self.root().select(&sel).count(),
            Err(_) => 0,
        }
    }

    /// Is any element matching `selector` hidden?
    pub fn is_hidden(&self, selector: &str) -> bool {
        let Ok(sel) = Selector::parse(selector) else {
            return false;
        };
        self.root()
            .select(&sel)
            .filter_map(|el| self.arena_position(el))
            .any(|pos| self.hidden.contains(&pos))
    }

    pub fn hidden_count(&self) -> usize {
        self.hidden.len()
    }

    /// Define a page global with the given truthiness.
    pub fn set_global(&mut self, name: &str, truthy: bool) {
        self.globals.insert(name.to_string(), truthy);
    }

    pub fn global(&self, name: &str) -> Option<bool> {
        self.globals.get(name).copied()
    }

    /// Simulated `window.open`: `false` when the guard refuses the URL.
    pub fn open_window(&self, url: &str) -> bool {
        match &self.popup_guard {
            Some(blocked) => !popup_is_blocked(url, blocked),
            None => true,
        }
    }

    pub fn injected_styles(&self) -> Vec<&str> {
        self.styles.iter().map(|(_, css)| css.as_str()).collect()
    }

    /// Append `markup` to `<body>`, as a script on the page would. Returns
    /// the number of top-level nodes added.
    pub fn append_html(&mut self, markup: &str) -> usize {
        let fragment = Html::parse_fragment(markup);
        let body = match Selector::parse("body") {
            Ok(sel) => self.root().select(&sel).next().map(|el| el.id()),
            Err(_) => None,
        };
        let Some(body) = body else {
            return 0;
        };

        // Breadth-first copy; siblings are queued together so order holds
        let mut pending: Vec<_> = fragment
            .root_element()
            .children()
            .map(|child| (child.id(), body))
            .collect();
        let added = pending.len();
        let mut next = 0;
        while next < pending.len() {
            let (source, parent) = pending[next];
            next += 1;
            let Some(source) = fragment.tree.get(source) else {
                continue;
            };
            let Some(mut parent) = self.html.tree.get_mut(parent) else {
                continue;
            };
            let copy = parent.append(source.value().clone()).id();
            pending.extend(source.children().map(|child| (child.id(), copy)));
        }
        added
    }

    /// Serialize the current tree.
    pub fn to_html(&self) -> String {
        self.html.html()
    }

    /// Detached nodes stay in the arena; only walk what is still attached.
    fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    fn arena_position(&self, el: ElementRef<'_>) -> Option<usize> {
        let id = el.id();
        self.html.tree.nodes().position(|node| node.id() == id)
    }

    fn parse_selector(selector: &str) -> Result<Selector, PageError> {
        Selector::parse(selector).map_err(|e| PageError::invalid_selector(selector, e.to_string()))
    }
}

impl Document for HtmlDocument {
    type Style = HtmlStyle;

    fn remove_where(&mut self, selector: &str, filter: ElementFilter<'_>) -> Result<usize, PageError> {
        let sel = Self::parse_selector(selector)?;
        let ids: Vec<_> = self
            .root()
            .select(&sel)
            .filter(|el| filter(&HtmlElementView(*el)))
            .map(|el| el.id())
            .collect();

        let mut removed = 0;
        for id in ids {
            if let Some(mut node) = self.html.tree.get_mut(id) {
                node.detach();
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn hide_where(&mut self, selector: &str, filter: ElementFilter<'_>) -> Result<usize, PageError> {
        let sel = Self::parse_selector(selector)?;
        let matched: Vec<usize> = self
            .root()
            .select(&sel)
            .filter(|el| filter(&HtmlElementView(*el)))
            .filter_map(|el| self.arena_position(el))
            .collect();

        let mut hidden = 0;
        for pos in matched {
            if self.hidden.insert(pos) {
                hidden += 1;
            }
        }
        Ok(hidden)
    }

    fn neutralize_global(&mut self, name: &str) -> bool {
        match self.globals.get_mut(name) {
            Some(value) if *value => {
                *value = false;
                true
            }
            _ => false,
        }
    }

    fn guard_window_open(&mut self, blocked: &[String]) {
        self.popup_guard = Some(blocked.to_vec());
    }

    fn inject_style(&mut self, css: &str) -> Option<HtmlStyle> {
        let id = self.next_style;
        self.next_style += 1;
        self.styles.push((id, css.to_string()));
        Some(HtmlStyle(id))
    }

    fn remove_style(&mut self, style: HtmlStyle) {
        self.styles.retain(|(id, _)| *id != style.0);
    }
}

// =============================================================================
// StaticScheduler
// =============================================================================

#[derive(Debug, PartialEq, Eq)]
pub struct StaticObserver(u32);

#[derive(Debug, PartialEq, Eq)]
pub struct StaticTimer(u32);

/// Scheduler that records requests and never fires.
#[derive(Debug, Default)]
pub struct StaticScheduler {
    next_id: u32,
    live_observers: usize,
    live_timers: usize,
    intervals: Vec<Duration>,
    settles: Vec<Duration>,
}

impl StaticScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_observers(&self) -> usize {
        self.live_observers
    }

    pub fn live_timers(&self) -> usize {
        self.live_timers
    }

    /// Every interval period ever requested.
    pub fn intervals(&self) -> &[Duration] {
        &self.intervals
    }

    /// Every settle delay ever requested.
    pub fn settles(&self) -> &[Duration] {
        &self.settles
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Scheduler for StaticScheduler {
    type Timer = StaticTimer;
    type Observer = StaticObserver;

    fn observe_mutations(&mut self) -> Option<StaticObserver> {
        self.live_observers += 1;
        Some(StaticObserver(self.next()))
    }

    fn disconnect(&mut self, _observer: StaticObserver) {
        self.live_observers -= 1;
    }

    fn start_interval(&mut self, period: Duration) -> Option<StaticTimer> {
        self.live_timers += 1;
        self.intervals.push(period);
        Some(StaticTimer(self.next()))
    }

    fn cancel_interval(&mut self, _timer: StaticTimer) {
        self.live_timers -= 1;
    }

    fn schedule_settle(&mut self, delay: Duration) {
        self.settles.push(delay);
    }
}
