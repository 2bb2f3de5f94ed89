//! `chrome.storage.local` as a [`Store`].

use js_sys::Array;
use serde::Serialize;
use sw_core::store::{ChangeSet, Store, StoreChange, StoreError, StoreKey, StoreRecord};
use wasm_bindgen::JsValue;

use crate::chrome;

pub struct ChromeStore;

impl Store for ChromeStore {
    async fn get(&self, keys: &[StoreKey]) -> Result<StoreRecord, StoreError> {
        let names = Array::new();
        for key in keys {
            names.push(&JsValue::from_str(key.as_str()));
        }

        let value = chrome::call_async("storage.local", "get", &[names.into()])
            .await
            .map_err(|e| StoreError::Backend(chrome::describe(&e)))?;

        serde_wasm_bindgen::from_value(value).map_err(|e| StoreError::Malformed(e.to_string()))
    }

    async fn set(&self, record: &StoreRecord) -> Result<(), StoreError> {
        let value = record
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        chrome::call_async("storage.local", "set", &[value])
            .await
            .map_err(|e| StoreError::Backend(chrome::describe(&e)))?;
        Ok(())
    }
}

/// Decode a `storage.onChanged` payload. Other areas and unreadable
/// payloads yield no changes.
pub fn parse_changes(changes: JsValue, area: &JsValue) -> Vec<StoreChange> {
    if area.as_string().as_deref() != Some("local") {
        return Vec::new();
    }
    match serde_wasm_bindgen::from_value::<ChangeSet>(changes) {
        Ok(set) => set.into_changes(),
        Err(e) => {
            log::debug!("ignoring unreadable storage change: {}", e);
            Vec::new()
        }
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn parses_local_enabled_change() {
        let changes = js_sys::JSON::parse(r#"{"enabled":{"oldValue":true,"newValue":false}}"#).unwrap();
        let parsed = parse_changes(changes, &JsValue::from_str("local"));
        assert_eq!(parsed, vec![StoreChange::Enabled { old: Some(true), new: Some(false) }]);
    }

    #[wasm_bindgen_test]
    fn ignores_other_areas() {
        let changes = js_sys::JSON::parse(r#"{"enabled":{"newValue":false}}"#).unwrap();
        assert!(parse_changes(changes, &JsValue::from_str("sync")).is_empty());
    }
}
