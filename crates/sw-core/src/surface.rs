//! Control Surface (popup) view model.
//!
//! Holds no authoritative state: every view is built from the latest
//! coordinator response or store read. A command that goes unanswered
//! produces no view, and the caller leaves the UI as it was.

use std::cell::Cell;
use std::rc::Rc;

use crate::config::SurfaceConfig;
use crate::coordinator::{Coordinator, Indicator, RuleSets};
use crate::message::{Command, Response};
use crate::store::{read_or_absent, Store, StoreKey};

/// Request/response channel to the coordinator.
#[allow(async_fn_in_trait)]
pub trait Channel {
    /// `None` when nobody answered (recipient not ready, channel closed).
    async fn send(&self, command: Command) -> Option<Response>;
}

impl<C: Channel + ?Sized> Channel for &C {
    async fn send(&self, command: Command) -> Option<Response> {
        (**self).send(command).await
    }
}

impl<C: Channel + ?Sized> Channel for Rc<C> {
    async fn send(&self, command: Command) -> Option<Response> {
        (**self).send(command).await
    }
}

/// In-process delivery, used when popup and coordinator share a context
/// (CLI, tests).
impl<S: Store, R: RuleSets, I: Indicator> Channel for Coordinator<S, R, I> {
    async fn send(&self, command: Command) -> Option<Response> {
        Some(self.handle(command).await)
    }
}

/// Everything the popup renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupView {
    pub enabled: bool,
    pub count_text: String,
}

impl PopupView {
    pub fn new(enabled: bool, blocked_count: u64) -> Self {
        Self {
            enabled,
            count_text: format_count(blocked_count),
        }
    }

    pub fn status_text(&self) -> &'static str {
        if self.enabled {
            "Protection Enabled"
        } else {
            "Protection Disabled"
        }
    }

    pub fn toggle_class(&self) -> &'static str {
        if self.enabled {
            "toggle-btn enabled"
        } else {
            "toggle-btn disabled"
        }
    }

    pub fn indicator_class(&self) -> &'static str {
        if self.enabled {
            "status-indicator status-enabled"
        } else {
            "status-indicator status-disabled"
        }
    }

    /// Value for the toggle button's `aria-pressed`.
    pub fn aria_pressed(&self) -> &'static str {
        if self.enabled {
            "true"
        } else {
            "false"
        }
    }
}

/// Decimal count with comma thousands separators.
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub struct ControlSurface<C, S> {
    channel: C,
    store: S,
    config: SurfaceConfig,
    visible: Cell<bool>,
}

impl<C: Channel, S: Store> ControlSurface<C, S> {
    pub fn new(channel: C, store: S) -> Self {
        Self {
            channel,
            store,
            config: SurfaceConfig::default(),
            visible: Cell::new(true),
        }
    }

    pub fn with_config(mut self, config: SurfaceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    /// The popup went away; periodic refreshes stop producing views.
    pub fn close(&self) {
        self.visible.set(false);
    }

    /// Status query, used on open and on every refresh tick.
    pub async fn refresh(&self) -> Option<PopupView> {
        if !self.is_visible() {
            return None;
        }
        let status = self.channel.send(Command::GetStatus).await?.as_status()?;
        Some(PopupView::new(status.enabled, status.blocked_count))
    }

    /// Toggle, then show the returned state with the stored count.
    pub async fn toggle(&self) -> Option<PopupView> {
        let toggled = self.channel.send(Command::Toggle).await?.as_toggle()?;
        let record = read_or_absent(&self.store, &[StoreKey::BlockedCount]).await;
        Some(PopupView::new(toggled.enabled, record.status().blocked_count))
    }

    /// Reset, then show the stored `enabled` with a zero count.
    pub async fn reset(&self) -> Option<PopupView> {
        self.channel.send(Command::ResetCount).await?.as_reset()?;
        let record = read_or_absent(&self.store, &[StoreKey::Enabled]).await;
        Some(PopupView::new(record.status().enabled, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::tests::coordinator;
    use crate::store::{MemoryStore, StoreRecord};

    struct Silent;

    impl Channel for Silent {
        async fn send(&self, _command: Command) -> Option<Response> {
            None
        }
    }

    #[test]
    fn count_formatting() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(1234567), "1,234,567");
    }

    #[test]
    fn view_classes_follow_state() {
        let on = PopupView::new(true, 5);
        assert_eq!(on.status_text(), "Protection Enabled");
        assert_eq!(on.toggle_class(), "toggle-btn enabled");
        assert_eq!(on.indicator_class(), "status-indicator status-enabled");
        assert_eq!(on.aria_pressed(), "true");

        let off = PopupView::new(false, 5);
        assert_eq!(off.status_text(), "Protection Disabled");
        assert_eq!(off.toggle_class(), "toggle-btn disabled");
        assert_eq!(off.indicator_class(), "status-indicator status-disabled");
        assert_eq!(off.aria_pressed(), "false");
    }

    #[tokio::test]
    async fn refresh_toggle_and_reset_through_coordinator() {
        let store = MemoryStore::new();
        let (coordinator, _, _) = coordinator(&store);
        coordinator.initialize().await;
        for _ in 0..1500 {
            coordinator.record_suppression_event().await;
        }

        let surface = ControlSurface::new(&coordinator, store.clone());

        let view = surface.refresh().await.unwrap();
        assert_eq!(view, PopupView { enabled: true, count_text: "1,500".to_string() });

        let view = surface.toggle().await.unwrap();
        assert_eq!(view, PopupView { enabled: false, count_text: "1,500".to_string() });

        let view = surface.reset().await.unwrap();
        assert_eq!(view, PopupView { enabled: false, count_text: "0".to_string() });
        assert_eq!(store.snapshot().blocked_count, Some(0));
    }

    #[tokio::test]
    async fn unanswered_commands_leave_ui_alone() {
        let store = MemoryStore::with_record(StoreRecord::install_defaults());
        let surface = ControlSurface::new(Silent, store);

        assert_eq!(surface.refresh().await, None);
        assert_eq!(surface.toggle().await, None);
        assert_eq!(surface.reset().await, None);
    }

    #[tokio::test]
    async fn closed_surface_stops_refreshing() {
        let store = MemoryStore::new();
        let (coordinator, _, _) = coordinator(&store);
        let surface = ControlSurface::new(&coordinator, store.clone());

        assert!(surface.refresh().await.is_some());
        surface.close();
        assert!(!surface.is_visible());
        assert_eq!(surface.refresh().await, None);
    }

    #[tokio::test]
    async fn reset_view_defaults_enabled_when_absent() {
        let store = MemoryStore::new();
        let (coordinator, _, _) = coordinator(&store);
        let surface = ControlSurface::new(&coordinator, store.clone());

        let view = surface.reset().await.unwrap();
        assert!(view.enabled);
    }
}
