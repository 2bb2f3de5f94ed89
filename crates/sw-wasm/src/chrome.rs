//! Minimal access to the `chrome.*` extension namespace.
//!
//! Everything goes through `js_sys::Reflect` so no bindings have to be
//! generated for the WebExtension API surface.

use js_sys::{Array, Function, Object, Promise, Reflect};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

/// Resolve `chrome.<path>`, e.g. `api("storage.local")`.
pub fn api(path: &str) -> Result<JsValue, JsValue> {
    let mut value: JsValue = js_sys::global().into();
    for part in std::iter::once("chrome").chain(path.split('.')) {
        value = Reflect::get(&value, &JsValue::from_str(part))?;
        if value.is_undefined() || value.is_null() {
            return Err(JsValue::from_str(&format!("chrome.{} is not available", path)));
        }
    }
    Ok(value)
}

/// Call `chrome.<namespace>.<method>(...args)` with `this` bound to the
/// namespace object.
pub fn call(namespace: &str, method: &str, args: &[JsValue]) -> Result<JsValue, JsValue> {
    let target = api(namespace)?;
    let func: Function = Reflect::get(&target, &JsValue::from_str(method))?.dyn_into()?;
    let arg_array = Array::new();
    for arg in args {
        arg_array.push(arg);
    }
    Reflect::apply(&func, &target, &arg_array)
}

/// Like [`call`], awaiting the result when the API returns a promise.
/// A rejected promise (`runtime.lastError`) comes back as `Err`.
pub async fn call_async(namespace: &str, method: &str, args: &[JsValue]) -> Result<JsValue, JsValue> {
    let result = call(namespace, method, args)?;
    match result.dyn_into::<Promise>() {
        Ok(promise) => JsFuture::from(promise).await,
        Err(value) => Ok(value),
    }
}

/// `chrome.<event>.addListener(listener)`.
pub fn add_listener(event: &str, listener: &Function) -> Result<(), JsValue> {
    call(event, "addListener", &[listener.clone().into()]).map(|_| ())
}

/// Build a plain object from `(key, value)` pairs.
pub fn object(entries: &[(&str, JsValue)]) -> Object {
    let obj = Object::new();
    for (key, value) in entries {
        let _ = Reflect::set(&obj, &JsValue::from_str(key), value);
    }
    obj
}

/// Readable form of a thrown JS value for logs.
pub fn describe(err: &JsValue) -> String {
    err.as_string()
        .or_else(|| {
            Reflect::get(err, &JsValue::from_str("message"))
                .ok()
                .and_then(|m| m.as_string())
        })
        .unwrap_or_else(|| format!("{:?}", err))
}
