//! Persistent State Store
//!
//! The store itself is an external collaborator (`chrome.storage.local` in
//! the extension, a JSON file in the CLI). This module defines the keys, the
//! record shape, typed change notifications and the `Store` trait, plus an
//! in-process `MemoryStore`.
//!
//! Reads never fail from the caller's point of view: an error or a missing
//! key resolves to the documented default. Writes are best-effort.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Default for `enabled` when absent.
pub const DEFAULT_ENABLED: bool = true;
/// Default for `blockedCount` when absent.
pub const DEFAULT_BLOCKED_COUNT: u64 = 0;

/// Error type for store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),
    #[error("Malformed store record: {0}")]
    Malformed(String),
}

// =============================================================================
// Keys and records
// =============================================================================

/// Keys persisted in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Enabled,
    BlockedCount,
    Whitelist,
}

impl StoreKey {
    pub const ALL: [StoreKey; 3] = [Self::Enabled, Self::BlockedCount, Self::Whitelist];

    /// Wire name used by the storage backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::BlockedCount => "blockedCount",
            Self::Whitelist => "whitelist",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "enabled" => Some(Self::Enabled),
            "blockedCount" => Some(Self::BlockedCount),
            "whitelist" => Some(Self::Whitelist),
            _ => None,
        }
    }
}

/// A partial view of the store. `None` means absent (on read) or
/// untouched (on write).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<Vec<String>>,
}

/// Resolved `{enabled, blockedCount}` with defaults applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectionStatus {
    pub enabled: bool,
    pub blocked_count: u64,
}

impl Default for ProtectionStatus {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_ENABLED,
            blocked_count: DEFAULT_BLOCKED_COUNT,
        }
    }
}

impl StoreRecord {
    /// Values written on first install.
    pub fn install_defaults() -> Self {
        Self {
            enabled: Some(DEFAULT_ENABLED),
            blocked_count: Some(DEFAULT_BLOCKED_COUNT),
            whitelist: Some(Vec::new()),
        }
    }

    pub fn enabled(value: bool) -> Self {
        Self {
            enabled: Some(value),
            ..Self::default()
        }
    }

    pub fn blocked_count(value: u64) -> Self {
        Self {
            blocked_count: Some(value),
            ..Self::default()
        }
    }

    /// Apply defaults for absent fields.
    pub fn status(&self) -> ProtectionStatus {
        ProtectionStatus {
            enabled: self.enabled.unwrap_or(DEFAULT_ENABLED),
            blocked_count: self.blocked_count.unwrap_or(DEFAULT_BLOCKED_COUNT),
        }
    }

    /// Keep only the requested keys.
    pub fn project(&self, keys: &[StoreKey]) -> Self {
        let mut out = Self::default();
        for key in keys {
            match key {
                StoreKey::Enabled => out.enabled = self.enabled,
                StoreKey::BlockedCount => out.blocked_count = self.blocked_count,
                StoreKey::Whitelist => out.whitelist = self.whitelist.clone(),
            }
        }
        out
    }

    /// Write every present field of `update` into `self` and return one
    /// change per key whose value actually changed.
    pub fn merge(&mut self, update: &StoreRecord) -> Vec<StoreChange> {
        let mut changes = Vec::new();

        if let Some(new) = update.enabled {
            if self.enabled != Some(new) {
                changes.push(StoreChange::Enabled { old: self.enabled, new: Some(new) });
                self.enabled = Some(new);
            }
        }
        if let Some(new) = update.blocked_count {
            if self.blocked_count != Some(new) {
                changes.push(StoreChange::BlockedCount { old: self.blocked_count, new: Some(new) });
                self.blocked_count = Some(new);
            }
        }
        if let Some(new) = &update.whitelist {
            if self.whitelist.as_ref() != Some(new) {
                changes.push(StoreChange::Whitelist {
                    old: self.whitelist.take(),
                    new: Some(new.clone()),
                });
                self.whitelist = Some(new.clone());
            }
        }

        changes
    }
}

// =============================================================================
// Change notifications
// =============================================================================

/// A single key changed in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Enabled { old: Option<bool>, new: Option<bool> },
    BlockedCount { old: Option<u64>, new: Option<u64> },
    Whitelist { old: Option<Vec<String>>, new: Option<Vec<String>> },
}

impl StoreChange {
    pub fn key(&self) -> StoreKey {
        match self {
            Self::Enabled { .. } => StoreKey::Enabled,
            Self::BlockedCount { .. } => StoreKey::BlockedCount,
            Self::Whitelist { .. } => StoreKey::Whitelist,
        }
    }
}

/// `{oldValue, newValue}` pair as delivered by the storage backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueChange<T> {
    #[serde(default)]
    pub old_value: Option<T>,
    #[serde(default)]
    pub new_value: Option<T>,
}

/// Raw change notification payload, keyed by store key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    #[serde(default)]
    pub enabled: Option<ValueChange<bool>>,
    #[serde(default)]
    pub blocked_count: Option<ValueChange<u64>>,
    #[serde(default)]
    pub whitelist: Option<ValueChange<Vec<String>>>,
}

impl ChangeSet {
    pub fn into_changes(self) -> Vec<StoreChange> {
        let mut changes = Vec::new();
        if let Some(c) = self.enabled {
            changes.push(StoreChange::Enabled { old: c.old_value, new: c.new_value });
        }
        if let Some(c) = self.blocked_count {
            changes.push(StoreChange::BlockedCount { old: c.old_value, new: c.new_value });
        }
        if let Some(c) = self.whitelist {
            changes.push(StoreChange::Whitelist { old: c.old_value, new: c.new_value });
        }
        changes
    }
}

// =============================================================================
// Store trait
// =============================================================================

/// Asynchronous key-value store with eventual cross-context visibility.
///
/// Futures are not required to be `Send`; every context is single-threaded.
#[allow(async_fn_in_trait)]
pub trait Store {
    /// Read the given keys. Absent keys come back as `None`.
    async fn get(&self, keys: &[StoreKey]) -> Result<StoreRecord, StoreError>;

    /// Write every present field of `record`.
    async fn set(&self, record: &StoreRecord) -> Result<(), StoreError>;
}

impl<S: Store + ?Sized> Store for &S {
    async fn get(&self, keys: &[StoreKey]) -> Result<StoreRecord, StoreError> {
        (**self).get(keys).await
    }

    async fn set(&self, record: &StoreRecord) -> Result<(), StoreError> {
        (**self).set(record).await
    }
}

impl<S: Store + ?Sized> Store for Rc<S> {
    async fn get(&self, keys: &[StoreKey]) -> Result<StoreRecord, StoreError> {
        (**self).get(keys).await
    }

    async fn set(&self, record: &StoreRecord) -> Result<(), StoreError> {
        (**self).set(record).await
    }
}

/// Read keys, treating any failure as "everything absent".
pub async fn read_or_absent<S: Store + ?Sized>(store: &S, keys: &[StoreKey]) -> StoreRecord {
    match store.get(keys).await {
        Ok(record) => record,
        Err(e) => {
            log::warn!("store read failed, using defaults: {}", e);
            StoreRecord::default()
        }
    }
}

/// Fire-and-forget write. Failures are logged and otherwise dropped.
pub async fn write_best_effort<S: Store + ?Sized>(store: &S, record: &StoreRecord) {
    if let Err(e) = store.set(record).await {
        log::warn!("store write dropped: {}", e);
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

type Listener = Rc<dyn Fn(&StoreChange)>;

#[derive(Default)]
struct MemoryInner {
    record: RefCell<StoreRecord>,
    listeners: RefCell<Vec<Listener>>,
    fail_reads: Cell<bool>,
    fail_writes: Cell<bool>,
}

/// In-process store with synchronous change notification.
///
/// Clones share the same underlying record, like several extension
/// contexts sharing one `storage.local`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Rc<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: StoreRecord) -> Self {
        let store = Self::default();
        *store.inner.record.borrow_mut() = record;
        store
    }

    /// Current contents.
    pub fn snapshot(&self) -> StoreRecord {
        self.inner.record.borrow().clone()
    }

    /// Register a change listener. Listeners run after the write completes,
    /// in registration order.
    pub fn subscribe(&self, listener: impl Fn(&StoreChange) + 'static) {
        self.inner.listeners.borrow_mut().push(Rc::new(listener));
    }

    /// Simulate a backend whose reads fail.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.set(fail);
    }

    /// Simulate a backend whose writes fail.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.set(fail);
    }
}

impl Store for MemoryStore {
    async fn get(&self, keys: &[StoreKey]) -> Result<StoreRecord, StoreError> {
        if self.inner.fail_reads.get() {
            return Err(StoreError::Backend("read failure".to_string()));
        }
        Ok(self.inner.record.borrow().project(keys))
    }

    async fn set(&self, record: &StoreRecord) -> Result<(), StoreError> {
        if self.inner.fail_writes.get() {
            return Err(StoreError::Backend("write failure".to_string()));
        }

        let changes = self.inner.record.borrow_mut().merge(record);
        if changes.is_empty() {
            return Ok(());
        }

        let listeners: Vec<Listener> = self.inner.listeners.borrow().clone();
        for change in &changes {
            for listener in &listeners {
                listener(change);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_with_wire_names() {
        let json = serde_json::to_string(&StoreRecord::install_defaults()).unwrap();
        assert_eq!(json, r#"{"enabled":true,"blockedCount":0,"whitelist":[]}"#);

        let partial = serde_json::to_string(&StoreRecord::blocked_count(7)).unwrap();
        assert_eq!(partial, r#"{"blockedCount":7}"#);
    }

    #[test]
    fn empty_record_resolves_to_defaults() {
        let status = StoreRecord::default().status();
        assert_eq!(status, ProtectionStatus { enabled: true, blocked_count: 0 });
    }

    #[test]
    fn merge_reports_only_real_changes() {
        let mut record = StoreRecord::install_defaults();
        let changes = record.merge(&StoreRecord {
            enabled: Some(true),
            blocked_count: Some(4),
            whitelist: None,
        });
        assert_eq!(changes, vec![StoreChange::BlockedCount { old: Some(0), new: Some(4) }]);
        assert_eq!(record.blocked_count, Some(4));
        assert_eq!(record.whitelist, Some(Vec::new()));
    }

    #[test]
    fn change_set_parses_backend_payload() {
        let payload = r#"{"enabled":{"oldValue":true,"newValue":false},"other":{"newValue":1}}"#;
        let changes = serde_json::from_str::<ChangeSet>(payload).unwrap().into_changes();
        assert_eq!(changes, vec![StoreChange::Enabled { old: Some(true), new: Some(false) }]);
        assert_eq!(changes[0].key(), StoreKey::Enabled);
    }

    #[test]
    fn key_names_round_trip() {
        for key in StoreKey::ALL {
            assert_eq!(StoreKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(StoreKey::parse("nope"), None);
    }

    #[tokio::test]
    async fn memory_store_notifies_subscribers() {
        let store = MemoryStore::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(move |change| sink.borrow_mut().push(change.clone()));

        store.set(&StoreRecord::enabled(false)).await.unwrap();
        store.set(&StoreRecord::enabled(false)).await.unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![StoreChange::Enabled { old: None, new: Some(false) }]
        );
    }

    #[tokio::test]
    async fn failed_read_resolves_to_absent() {
        let store = MemoryStore::with_record(StoreRecord::enabled(false));
        store.fail_reads(true);
        let record = read_or_absent(&store, &[StoreKey::Enabled]).await;
        assert_eq!(record, StoreRecord::default());
        assert!(record.status().enabled);
    }

    #[tokio::test]
    async fn failed_write_is_dropped_silently() {
        let store = MemoryStore::new();
        store.fail_writes(true);
        write_best_effort(&store, &StoreRecord::blocked_count(3)).await;
        assert_eq!(store.snapshot(), StoreRecord::default());
    }

    #[tokio::test]
    async fn clones_share_contents() {
        let a = MemoryStore::new();
        let b = a.clone();
        a.set(&StoreRecord::blocked_count(9)).await.unwrap();
        let record = b.get(&[StoreKey::BlockedCount, StoreKey::Enabled]).await.unwrap();
        assert_eq!(record.blocked_count, Some(9));
        assert_eq!(record.enabled, None);
    }
}
