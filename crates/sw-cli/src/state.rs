//! Off-browser collaborators for driving the coordinator from a terminal.

use sw_core::coordinator::{Badge, Indicator, RuleSets};

/// Logs rule-set switches instead of calling `declarativeNetRequest`.
pub struct LoggedRules;

impl RuleSets for LoggedRules {
    fn set_enabled(&self, ruleset_id: &str, enabled: bool) {
        log::info!("ruleset '{}' -> {}", ruleset_id, if enabled { "enabled" } else { "disabled" });
    }
}

/// A terminal always has an active view.
pub struct LoggedBadge;

impl Indicator for LoggedBadge {
    async fn show(&self, badge: &Badge) -> bool {
        log::debug!("badge {:?} on {}", badge.text, badge.color);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_store::FileStore;
    use sw_core::coordinator::Coordinator;
    use sw_core::store::{Store, StoreKey};

    #[tokio::test]
    async fn coordinator_over_file_store() {
        let path = std::env::temp_dir()
            .join(format!("sw-cli-test-{}", std::process::id()))
            .join("coordinator.json");
        let _ = std::fs::remove_file(&path);

        let coordinator = Coordinator::new(FileStore::new(&path), LoggedRules, LoggedBadge);
        coordinator.initialize().await;
        coordinator.record_suppression_event().await;
        coordinator.record_suppression_event().await;
        let toggled = coordinator.toggle().await;
        assert!(!toggled.enabled);

        let record = coordinator.store().get(&StoreKey::ALL).await.unwrap();
        assert_eq!(record.enabled, Some(false));
        assert_eq!(record.blocked_count, Some(2));

        let restarted = Coordinator::new(FileStore::new(&path), LoggedRules, LoggedBadge);
        restarted.resynchronize().await;
        assert!(!restarted.status().enabled);
        assert_eq!(restarted.status().blocked_count, 2);
        let _ = std::fs::remove_file(&path);
    }
}
