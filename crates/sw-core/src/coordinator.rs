//! Coordinator
//!
//! Single authority for `enabled` and `blockedCount`. Runs in the background
//! context, activates/deactivates the network rule set and keeps the badge
//! current. Other contexts only see its decisions through the store or
//! through command responses.

use std::cell::Cell;

use crate::config::BadgeColors;
use crate::message::{Command, ResetResponse, Response, StatusResponse, ToggleResponse};
use crate::store::{
    read_or_absent, write_best_effort, ProtectionStatus, Store, StoreKey, StoreRecord,
};

/// Id of the pre-built network rule set.
pub const AD_RULESET_ID: &str = "ad_rules";

// =============================================================================
// Collaborators
// =============================================================================

/// Network rule-set activation. Fire-and-forget.
pub trait RuleSets {
    fn set_enabled(&self, ruleset_id: &str, enabled: bool);
}

/// The visible badge on the focused view.
#[allow(async_fn_in_trait)]
pub trait Indicator {
    /// Apply `badge` to the currently active view. Returns `false` when no
    /// view is active; that is not an error.
    async fn show(&self, badge: &Badge) -> bool;
}

/// Badge text and background color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub text: String,
    pub color: String,
}

impl Badge {
    /// Empty text for a zero count, otherwise the decimal count.
    pub fn derive(status: ProtectionStatus, colors: &BadgeColors) -> Self {
        let text = if status.blocked_count == 0 {
            String::new()
        } else {
            status.blocked_count.to_string()
        };
        let color = if status.enabled {
            colors.active.clone()
        } else {
            colors.inactive.clone()
        };
        Self { text, color }
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// In-process copy of the authoritative state. Owned by one coordinator.
#[derive(Debug)]
pub struct CoordinatorState {
    enabled: Cell<bool>,
    blocked_count: Cell<u64>,
    /// Set once the store has been read in this process
    loaded: Cell<bool>,
}

impl Default for CoordinatorState {
    fn default() -> Self {
        let status = ProtectionStatus::default();
        Self {
            enabled: Cell::new(status.enabled),
            blocked_count: Cell::new(status.blocked_count),
            loaded: Cell::new(false),
        }
    }
}

impl CoordinatorState {
    fn load(&self, status: ProtectionStatus) {
        self.enabled.set(status.enabled);
        self.blocked_count.set(status.blocked_count);
        self.loaded.set(true);
    }

    fn snapshot(&self) -> ProtectionStatus {
        ProtectionStatus {
            enabled: self.enabled.get(),
            blocked_count: self.blocked_count.get(),
        }
    }
}

pub struct Coordinator<S, R, I> {
    store: S,
    rules: R,
    indicator: I,
    colors: BadgeColors,
    state: CoordinatorState,
}

impl<S: Store, R: RuleSets, I: Indicator> Coordinator<S, R, I> {
    pub fn new(store: S, rules: R, indicator: I) -> Self {
        Self {
            store,
            rules,
            indicator,
            colors: BadgeColors::default(),
            state: CoordinatorState::default(),
        }
    }

    pub fn with_colors(mut self, colors: BadgeColors) -> Self {
        self.colors = colors;
        self
    }

    /// In-memory view of the state.
    pub fn status(&self) -> ProtectionStatus {
        self.state.snapshot()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// First install: seed the store, then resynchronize.
    pub async fn initialize(&self) {
        log::info!("initializing store with install defaults");
        write_best_effort(&self.store, &StoreRecord::install_defaults()).await;
        self.resynchronize().await;
    }

    /// Startup: reload state from the store (absent values take defaults)
    /// and re-apply everything derived from it.
    pub async fn resynchronize(&self) {
        let status = self.read_status().await;
        self.state.load(status);
        log::debug!("resynchronized: {:?}", self.state.snapshot());
        self.apply_rules();
        self.refresh_indicator().await;
    }

    /// The network layer blocked a request.
    pub async fn record_suppression_event(&self) {
        self.ensure_loaded().await;
        // No await between reading and bumping the counter, so back-to-back
        // events never read the same value.
        let count = self.state.blocked_count.get().saturating_add(1);
        self.state.blocked_count.set(count);
        write_best_effort(&self.store, &StoreRecord::blocked_count(count)).await;
        self.refresh_indicator().await;
    }

    pub async fn toggle(&self) -> ToggleResponse {
        self.ensure_loaded().await;
        let enabled = !self.state.enabled.get();
        self.state.enabled.set(enabled);
        log::info!("protection {}", if enabled { "enabled" } else { "disabled" });
        write_best_effort(&self.store, &StoreRecord::enabled(enabled)).await;
        self.apply_rules();
        self.refresh_indicator().await;
        ToggleResponse { enabled }
    }

    /// Answered from the store, not from memory.
    pub async fn get_status(&self) -> StatusResponse {
        let status = self.read_status().await;
        StatusResponse {
            enabled: status.enabled,
            blocked_count: status.blocked_count,
        }
    }

    pub async fn reset_count(&self) -> ResetResponse {
        self.ensure_loaded().await;
        self.state.blocked_count.set(0);
        write_best_effort(&self.store, &StoreRecord::blocked_count(0)).await;
        self.refresh_indicator().await;
        ResetResponse { success: true }
    }

    /// Re-derive the badge and apply it to the active view, if any.
    pub async fn refresh_indicator(&self) -> bool {
        self.ensure_loaded().await;
        let badge = Badge::derive(self.state.snapshot(), &self.colors);
        let shown = self.indicator.show(&badge).await;
        if !shown {
            log::trace!("no active view for badge {:?}", badge.text);
        }
        shown
    }

    pub async fn handle(&self, command: Command) -> Response {
        match command {
            Command::Toggle => Response::Toggle(self.toggle().await),
            Command::GetStatus => Response::Status(self.get_status().await),
            Command::ResetCount => Response::Reset(self.reset_count().await),
        }
    }

    async fn read_status(&self) -> ProtectionStatus {
        read_or_absent(&self.store, &[StoreKey::Enabled, StoreKey::BlockedCount])
            .await
            .status()
    }

    /// A respawned background process gets neither install nor startup
    /// events; load from the store before the first mutation. Whoever
    /// finishes reading first wins, so a later read never clobbers an
    /// increment made in between.
    async fn ensure_loaded(&self) {
        if self.state.loaded.get() {
            return;
        }
        let status = self.read_status().await;
        if !self.state.loaded.get() {
            log::debug!("loaded state on first use: {:?}", status);
            self.state.load(status);
        }
    }

    fn apply_rules(&self) {
        self.rules.set_enabled(AD_RULESET_ID, self.state.enabled.get());
    }
}
