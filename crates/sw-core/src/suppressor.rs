//! Page Suppressor
//!
//! One instance per loaded page. Two states: while `Active` it owns a
//! mutation observer, a periodic timer and an injected stylesheet; while
//! `Inactive` it owns nothing. The shared `enabled` flag decides which.

use std::ops::AddAssign;
use std::rc::Rc;

use crate::config::SuppressorConfig;
use crate::page::{Document, ElementView, MutationBatch, Scheduler};
use crate::patterns::PatternSet;
use crate::store::{read_or_absent, Store, StoreChange, StoreKey, DEFAULT_ENABLED};

bitflags::bitflags! {
    /// Which passes to run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Passes: u8 {
        /// Detach elements matching the ad selectors
        const AD_ELEMENTS = 1 << 0;
        /// Detach known tracking `<script src>` tags
        const TRACKING_SCRIPTS = 1 << 1;
        /// Hide cookie/consent notices
        const CONSENT_BANNERS = 1 << 2;
        /// Neutralize anti-adblock globals and guard `window.open`
        const ANTI_ADBLOCK = 1 << 3;

        /// Run once on entering Active
        const ENTRY = Self::AD_ELEMENTS.bits()
            | Self::TRACKING_SCRIPTS.bits()
            | Self::CONSENT_BANNERS.bits()
            | Self::ANTI_ADBLOCK.bits();
        /// Run on every tick and settle
        const RECURRING = Self::AD_ELEMENTS.bits() | Self::CONSENT_BANNERS.bits();
    }
}

/// What a pass (or several) did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub removed: usize,
    pub scripts_removed: usize,
    pub hidden: usize,
    pub neutralized: usize,
    pub skipped_selectors: usize,
}

impl AddAssign for PassStats {
    fn add_assign(&mut self, other: Self) {
        self.removed += other.removed;
        self.scripts_removed += other.scripts_removed;
        self.hidden += other.hidden;
        self.neutralized += other.neutralized;
        self.skipped_selectors += other.skipped_selectors;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressorState {
    Inactive,
    Active,
}

/// Everything that can wake the suppressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// `enabled` resolved or changed
    EnabledChanged(bool),
    /// Mutation observer callback
    Mutations(MutationBatch),
    /// Settle delay after a mutation batch elapsed
    Settled,
    /// Periodic timer fired
    Tick,
    /// The page finished parsing (`DOMContentLoaded`)
    DocumentReady,
}

struct SuppressionSession<D: Document, S: Scheduler> {
    observer: Option<S::Observer>,
    timer: Option<S::Timer>,
    style: Option<D::Style>,
}

pub struct PageSuppressor<D: Document, S: Scheduler> {
    document: D,
    scheduler: S,
    patterns: Rc<PatternSet>,
    config: SuppressorConfig,
    session: Option<SuppressionSession<D, S>>,
    settle_pending: bool,
    popup_guarded: bool,
    /// False until `DocumentReady` for pages still loading
    document_ready: bool,
    /// Latest `enabled` seen, applied once the document is ready
    wanted: Option<bool>,
    totals: PassStats,
}

impl<D: Document, S: Scheduler> PageSuppressor<D, S> {
    pub fn new(document: D, scheduler: S, patterns: Rc<PatternSet>) -> Self {
        Self {
            document,
            scheduler,
            patterns,
            config: SuppressorConfig::default(),
            session: None,
            settle_pending: false,
            popup_guarded: false,
            document_ready: true,
            wanted: None,
            totals: PassStats::default(),
        }
    }

    pub fn with_config(mut self, config: SuppressorConfig) -> Self {
        self.config = config;
        self
    }

    /// Hold off activation until `PageEvent::DocumentReady`. Enable and
    /// disable requests in the meantime only update the wanted state.
    pub fn waiting_for_document(mut self) -> Self {
        self.document_ready = false;
        self
    }

    pub fn state(&self) -> SuppressorState {
        if self.session.is_some() {
            SuppressorState::Active
        } else {
            SuppressorState::Inactive
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Accumulated stats over the life of the page.
    pub fn totals(&self) -> PassStats {
        self.totals
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn into_document(self) -> D {
        self.document
    }

    /// Inactive → Active. No-op when already Active.
    pub fn activate(&mut self) -> PassStats {
        if self.session.is_some() {
            return PassStats::default();
        }

        let stats = self.run_passes(Passes::ENTRY);

        let observer = self.scheduler.observe_mutations();
        if observer.is_none() {
            log::warn!("mutation observer unavailable; relying on periodic passes");
        }
        let timer = self.scheduler.start_interval(self.config.tick_interval());

        let css = self.patterns.stylesheet();
        let style = if css.is_empty() {
            None
        } else {
            self.document.inject_style(&css)
        };

        self.session = Some(SuppressionSession { observer, timer, style });
        log::debug!("suppression active: {:?}", stats);
        stats
    }

    /// Active → Inactive. No-op when already Inactive.
    pub fn deactivate(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        if let Some(observer) = session.observer {
            self.scheduler.disconnect(observer);
        }
        if let Some(timer) = session.timer {
            self.scheduler.cancel_interval(timer);
        }
        if let Some(style) = session.style {
            self.document.remove_style(style);
        }
        self.settle_pending = false;
        log::debug!("suppression inactive");
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.wanted = Some(enabled);
        if !self.document_ready {
            log::trace!("document still loading; enabled={} deferred", enabled);
            return;
        }
        if enabled {
            self.activate();
        } else {
            self.deactivate();
        }
    }

    /// React to a store change notification. Only `enabled` matters here;
    /// a removed key falls back to its default.
    pub fn on_store_change(&mut self, change: &StoreChange) {
        if let StoreChange::Enabled { new, .. } = change {
            self.set_enabled(new.unwrap_or(DEFAULT_ENABLED));
        }
    }

    pub fn handle(&mut self, event: PageEvent) {
        match event {
            PageEvent::EnabledChanged(enabled) => self.set_enabled(enabled),
            PageEvent::Mutations(batch) => {
                // Never scrub inside the observer callback. Batches that
                // arrive while a settle is pending fold into it.
                if self.is_active() && batch.has_additions() && !self.settle_pending {
                    self.settle_pending = true;
                    self.scheduler.schedule_settle(self.config.settle_delay());
                }
            }
            PageEvent::Settled => {
                self.settle_pending = false;
                if self.is_active() {
                    self.run_passes(Passes::RECURRING);
                }
            }
            PageEvent::Tick => {
                if self.is_active() {
                    self.run_passes(Passes::RECURRING);
                }
            }
            PageEvent::DocumentReady => {
                if self.document_ready {
                    return;
                }
                self.document_ready = true;
                if let Some(enabled) = self.wanted {
                    self.set_enabled(enabled);
                }
            }
        }
    }

    /// Run the selected passes now, regardless of state.
    pub fn run_passes(&mut self, passes: Passes) -> PassStats {
        let mut stats = PassStats::default();

        if passes.contains(Passes::AD_ELEMENTS) {
            stats += self.remove_ad_elements();
        }
        if passes.contains(Passes::TRACKING_SCRIPTS) {
            stats += self.remove_tracking_scripts();
        }
        if passes.contains(Passes::CONSENT_BANNERS) {
            stats += self.hide_consent_banners();
        }
        if passes.contains(Passes::ANTI_ADBLOCK) {
            stats += self.defuse_anti_adblock();
        }

        self.totals += stats;
        stats
    }

    fn remove_ad_elements(&mut self) -> PassStats {
        let patterns = Rc::clone(&self.patterns);
        let mut stats = PassStats::default();

        for selector in &patterns.ad_selectors {
            match self.document.remove_where(selector, &|_: &dyn ElementView| true) {
                Ok(n) => stats.removed += n,
                Err(e) => {
                    log::debug!("skipping selector: {}", e);
                    stats.skipped_selectors += 1;
                }
            }
        }
        stats
    }

    fn remove_tracking_scripts(&mut self) -> PassStats {
        let patterns = Rc::clone(&self.patterns);
        let mut stats = PassStats::default();

        let is_tracker = |el: &dyn ElementView| {
            el.attribute("src")
                .is_some_and(|src| patterns.is_tracking_script(&src))
        };
        match self.document.remove_where("script[src]", &is_tracker) {
            Ok(n) => stats.scripts_removed = n,
            Err(e) => {
                log::debug!("script scan failed: {}", e);
                stats.skipped_selectors += 1;
            }
        }
        stats
    }

    fn hide_consent_banners(&mut self) -> PassStats {
        let patterns = Rc::clone(&self.patterns);
        let mut stats = PassStats::default();

        // Both conditions: the container looks like a notice and its text
        // talks about cookies/privacy/consent.
        let is_notice = |el: &dyn ElementView| patterns.mentions_consent(&el.text_content());
        for selector in &patterns.consent_selectors {
            match self.document.hide_where(selector, &is_notice) {
                Ok(n) => stats.hidden += n,
                Err(e) => {
                    log::debug!("skipping consent selector: {}", e);
                    stats.skipped_selectors += 1;
                }
            }
        }
        stats
    }

    fn defuse_anti_adblock(&mut self) -> PassStats {
        let patterns = Rc::clone(&self.patterns);
        let mut stats = PassStats::default();

        for name in &patterns.anti_adblock_globals {
            if self.document.neutralize_global(name) {
                stats.neutralized += 1;
            }
        }

        // Wrap window.open once per page, not once per activation.
        if !self.popup_guarded {
            self.document.guard_window_open(&patterns.blocked_popup_substrings);
            self.popup_guarded = true;
        }
        stats
    }
}

/// Resolve the initial `enabled` value for a freshly loaded page.
/// A failed read counts as absent, so the page starts Active.
pub async fn resolve_enabled<St: Store + ?Sized>(store: &St) -> bool {
    read_or_absent(store, &[StoreKey::Enabled])
        .await
        .enabled
        .unwrap_or(DEFAULT_ENABLED)
}

#[cfg(all(test, feature = "html"))]
mod tests {
    use std::cell::RefCell;
    use std::time::Duration;

    use super::*;
    use crate::coordinator::tests::coordinator;
    use crate::coordinator::AD_RULESET_ID;
    use crate::html::{HtmlDocument, StaticScheduler};
    use crate::store::{MemoryStore, StoreRecord};

    const PAGE: &str = r#"<html><head></head><body>
        <div class="adsbygoogle">ad one</div>
        <div id="top-banner">ad two</div>
        <iframe src="https://ad.doubleclick.net/frame"></iframe>
        <div class="sponsored">ad three</div>
        <p class="lead">Real content</p>
        <article id="story">More content</article>
        <iframe src="https://www.youtube.com/embed/x"></iframe>
        <script src="https://www.google-analytics.com/analytics.js"></script>
        <script src="/static/app.js"></script>
        <div class="cookie-bar">We use cookies to improve this site.</div>
        <div class="cookie-jar-recipe">Grandma's oatmeal recipe</div>
    </body></html>"#;

    type TestSuppressor = PageSuppressor<HtmlDocument, StaticScheduler>;

    fn suppressor(markup: &str) -> TestSuppressor {
        PageSuppressor::new(
            HtmlDocument::parse(markup),
            StaticScheduler::new(),
            Rc::new(PatternSet::builtin().clone()),
        )
    }

    #[test]
    fn activation_is_idempotent() {
        let mut s = suppressor(PAGE);

        s.activate();
        let second = s.activate();

        assert_eq!(second, PassStats::default());
        assert_eq!(s.scheduler().live_observers(), 1);
        assert_eq!(s.scheduler().live_timers(), 1);
        assert_eq!(s.document().injected_styles().len(), 1);
        assert_eq!(s.scheduler().intervals(), &[Duration::from_secs(3)]);
    }

    #[test]
    fn deactivation_releases_everything_and_is_idempotent() {
        let mut s = suppressor(PAGE);
        s.activate();

        s.deactivate();
        s.deactivate();

        assert_eq!(s.state(), SuppressorState::Inactive);
        assert_eq!(s.scheduler().live_observers(), 0);
        assert_eq!(s.scheduler().live_timers(), 0);
        assert!(s.document().injected_styles().is_empty());
    }

    #[test]
    fn reactivation_starts_one_fresh_session() {
        let mut s = suppressor(PAGE);
        s.activate();
        s.deactivate();
        s.activate();

        assert!(s.is_active());
        assert_eq!(s.scheduler().live_observers(), 1);
        assert_eq!(s.scheduler().live_timers(), 1);
        assert_eq!(s.document().injected_styles().len(), 1);
    }

    #[test]
    fn ad_pass_removes_exactly_the_matching_elements() {
        let mut s = suppressor(PAGE);

        let stats = s.run_passes(Passes::AD_ELEMENTS);

        assert_eq!(stats.removed, 4);
        let doc = s.document();
        assert_eq!(doc.count(".adsbygoogle"), 0);
        assert_eq!(doc.count("#top-banner"), 0);
        assert_eq!(doc.count("iframe[src*=\"doubleclick\"]"), 0);
        assert_eq!(doc.count(".sponsored"), 0);
        assert_eq!(doc.count("p.lead"), 1);
        assert_eq!(doc.count("#story"), 1);
        assert_eq!(doc.count("iframe"), 1);
        assert_eq!(doc.count("script"), 2);
    }

    #[test]
    fn selector_order_does_not_change_the_result() {
        let mut forward = suppressor(PAGE);
        let mut reversed_patterns = PatternSet::builtin().clone();
        reversed_patterns.ad_selectors.reverse();
        let mut reversed = PageSuppressor::new(
            HtmlDocument::parse(PAGE),
            StaticScheduler::new(),
            Rc::new(reversed_patterns),
        );

        forward.run_passes(Passes::AD_ELEMENTS);
        reversed.run_passes(Passes::AD_ELEMENTS);

        assert_eq!(forward.document().to_html(), reversed.document().to_html());
    }

    #[test]
    fn bad_selector_is_skipped_not_fatal() {
        let mut patterns = PatternSet::builtin().clone();
        patterns.ad_selectors = vec![
            ".sponsored".to_string(),
            "div[[broken".to_string(),
            ".adsbygoogle".to_string(),
        ];
        let mut s = PageSuppressor::new(HtmlDocument::parse(PAGE), StaticScheduler::new(), Rc::new(patterns));

        let stats = s.run_passes(Passes::AD_ELEMENTS);

        assert_eq!(stats.removed, 2);
        assert_eq!(stats.skipped_selectors, 1);
        assert_eq!(s.document().count(".adsbygoogle"), 0);
    }

    #[test]
    fn entry_passes_cover_scripts_consent_and_globals() {
        let mut doc = HtmlDocument::parse(PAGE);
        doc.set_global("adblock", true);
        doc.set_global("ads_blocked", true);
        let mut s = PageSuppressor::new(doc, StaticScheduler::new(), Rc::new(PatternSet::builtin().clone()));

        let stats = s.activate();

        assert_eq!(stats.scripts_removed, 1);
        assert_eq!(stats.neutralized, 2);
        assert_eq!(stats.hidden, 1);

        let doc = s.document();
        assert_eq!(doc.count("script[src*=\"analytics\"]"), 0);
        assert_eq!(doc.count("script[src=\"/static/app.js\"]"), 1);
        assert!(doc.is_hidden(".cookie-bar"));
        assert!(!doc.is_hidden(".cookie-jar-recipe"));
        assert_eq!(doc.global("adblock"), Some(false));
        assert!(!doc.open_window("https://example.com/adblock-wall"));
        assert!(doc.open_window("https://example.com/article"));
    }

    #[test]
    fn mutations_schedule_one_deferred_pass() {
        let mut s = suppressor(PAGE);
        s.activate();

        s.handle(PageEvent::Mutations(MutationBatch { added_nodes: 0 }));
        assert!(s.scheduler().settles().is_empty());

        s.handle(PageEvent::Mutations(MutationBatch { added_nodes: 2 }));
        s.handle(PageEvent::Mutations(MutationBatch { added_nodes: 1 }));
        assert_eq!(s.scheduler().settles(), &[Duration::from_millis(100)]);

        s.handle(PageEvent::Settled);
        s.handle(PageEvent::Mutations(MutationBatch { added_nodes: 1 }));
        assert_eq!(s.scheduler().settles().len(), 2);
    }

    #[test]
    fn inactive_page_ignores_timers_and_mutations() {
        let mut s = suppressor(PAGE);

        s.handle(PageEvent::Mutations(MutationBatch { added_nodes: 3 }));
        s.handle(PageEvent::Tick);
        s.handle(PageEvent::Settled);

        assert!(s.scheduler().settles().is_empty());
        assert_eq!(s.totals(), PassStats::default());
        assert_eq!(s.document().count(".adsbygoogle"), 1);
    }

    #[test]
    fn tick_runs_recurring_passes_only() {
        let mut doc = HtmlDocument::parse(PAGE);
        doc.set_global("adblock", true);
        let mut s = PageSuppressor::new(doc, StaticScheduler::new(), Rc::new(PatternSet::builtin().clone()));
        s.activate();
        let after_entry = s.totals();

        s.handle(PageEvent::Tick);

        let delta_scripts = s.totals().scripts_removed - after_entry.scripts_removed;
        assert_eq!(delta_scripts, 0);
        assert_eq!(s.totals().neutralized, after_entry.neutralized);
    }

    #[test]
    fn tick_and_settle_clean_up_late_content() {
        let mut s = suppressor(PAGE);
        s.activate();
        let entry = s.totals();

        s.document_mut().append_html(
            r#"<div class="sponsored">late ad</div><div class="cookie-bar">Cookie settings</div>"#,
        );
        s.handle(PageEvent::Tick);

        assert_eq!(s.totals().removed, entry.removed + 1);
        assert_eq!(s.totals().hidden, entry.hidden + 1);
        assert_eq!(s.document().count(".sponsored"), 0);

        s.document_mut().append_html(r#"<div id="top-banner">another</div>"#);
        s.handle(PageEvent::Mutations(MutationBatch { added_nodes: 1 }));
        assert_eq!(s.document().count("#top-banner"), 1);

        s.handle(PageEvent::Settled);
        assert_eq!(s.totals().removed, entry.removed + 2);
        assert_eq!(s.document().count("#top-banner"), 0);
    }

    #[test]
    fn loading_page_waits_for_document_and_latest_state() {
        let mut s = suppressor(PAGE).waiting_for_document();

        s.handle(PageEvent::EnabledChanged(true));
        assert!(!s.is_active());
        assert_eq!(s.document().count(".adsbygoogle"), 1);

        s.on_store_change(&StoreChange::Enabled { old: Some(true), new: Some(false) });
        s.handle(PageEvent::DocumentReady);

        assert!(!s.is_active());
        assert_eq!(s.scheduler().live_observers(), 0);
        assert_eq!(s.document().count(".adsbygoogle"), 1);
    }

    #[test]
    fn document_ready_applies_resolved_state() {
        let mut unresolved = suppressor(PAGE).waiting_for_document();
        unresolved.handle(PageEvent::DocumentReady);
        assert!(!unresolved.is_active());

        unresolved.handle(PageEvent::EnabledChanged(true));
        assert!(unresolved.is_active());

        let mut s = suppressor(PAGE).waiting_for_document();
        s.handle(PageEvent::EnabledChanged(true));
        s.handle(PageEvent::DocumentReady);
        s.handle(PageEvent::DocumentReady);

        assert!(s.is_active());
        assert_eq!(s.scheduler().live_observers(), 1);
        assert_eq!(s.document().count(".adsbygoogle"), 0);
    }

    #[test]
    fn store_change_drives_state() {
        let mut s = suppressor(PAGE);

        s.on_store_change(&StoreChange::Enabled { old: None, new: Some(true) });
        assert!(s.is_active());

        s.on_store_change(&StoreChange::BlockedCount { old: Some(0), new: Some(1) });
        assert!(s.is_active());

        s.on_store_change(&StoreChange::Enabled { old: Some(true), new: Some(false) });
        assert!(!s.is_active());

        s.on_store_change(&StoreChange::Enabled { old: Some(false), new: None });
        assert!(s.is_active());
    }

    #[tokio::test]
    async fn initial_state_defaults_to_enabled() {
        let store = MemoryStore::new();
        assert!(resolve_enabled(&store).await);

        store.set(&StoreRecord::enabled(false)).await.unwrap();
        assert!(!resolve_enabled(&store).await);

        store.fail_reads(true);
        assert!(resolve_enabled(&store).await);
    }

    #[tokio::test]
    async fn disabling_protection_stops_every_open_page() {
        let store = MemoryStore::new();
        let (coordinator, rules, _) = coordinator(&store);
        coordinator.initialize().await;

        let pages: Vec<Rc<RefCell<TestSuppressor>>> =
            (0..2).map(|_| Rc::new(RefCell::new(suppressor(PAGE)))).collect();
        for page in &pages {
            let enabled = resolve_enabled(&store).await;
            page.borrow_mut().handle(PageEvent::EnabledChanged(enabled));
            let listener = Rc::clone(page);
            store.subscribe(move |change| listener.borrow_mut().on_store_change(change));
        }
        assert!(pages.iter().all(|p| p.borrow().is_active()));

        coordinator.toggle().await;

        assert_eq!(rules.last(), Some((AD_RULESET_ID.to_string(), false)));
        for page in &pages {
            let page = page.borrow();
            assert_eq!(page.state(), SuppressorState::Inactive);
            assert!(page.document().injected_styles().is_empty());
            assert_eq!(page.scheduler().live_observers(), 0);
            assert_eq!(page.scheduler().live_timers(), 0);
        }
    }
}
