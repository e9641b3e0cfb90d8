//! `window.ethereum` as an [`Eip1193`] provider.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;

use js_sys::{Function, Promise, Reflect};
use serde::Serialize;
use serde_json::{json, Value};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use crate::provider::{Eip1193, EventHandler, ListenerId, ProviderEvent, RpcError};

const INTERNAL_ERROR: i64 = -32603;
const METHOD_NOT_FOUND: i64 = -32601;

type Listener = (ProviderEvent, Closure<dyn Fn(JsValue)>);

#[derive(Clone)]
pub struct InjectedProvider {
    inner: Rc<Inner>,
}

struct Inner {
    ethereum: JsValue,
    listeners: RefCell<HashMap<ListenerId, Listener>>,
    next_id: Cell<u64>,
}

impl InjectedProvider {
    /// Looks up the provider a wallet extension injected into the page.
    pub fn detect() -> Option<Self> {
        let window = web_sys::window()?;
        let ethereum = Reflect::get(&window, &JsValue::from_str("ethereum")).ok()?;
        if ethereum.is_undefined() || ethereum.is_null() {
            return None;
        }
        Some(Self {
            inner: Rc::new(Inner {
                ethereum,
                listeners: RefCell::new(HashMap::new()),
                next_id: Cell::new(1),
            }),
        })
    }

    fn function(&self, name: &str) -> Option<Function> {
        lookup_function(&self.inner.ethereum, name)
    }
}

fn lookup_function(target: &JsValue, name: &str) -> Option<Function> {
    Reflect::get(target, &JsValue::from_str(name))
        .ok()?
        .dyn_into::<Function>()
        .ok()
}

fn to_js(value: &Value) -> Result<JsValue, RpcError> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))
}

fn from_js(value: JsValue) -> Value {
    if value.is_undefined() || value.is_null() {
        return Value::Null;
    }
    serde_wasm_bindgen::from_value(value).unwrap_or(Value::Null)
}

fn rpc_error_from_js(err: JsValue) -> RpcError {
    let code = Reflect::get(&err, &JsValue::from_str("code"))
        .ok()
        .and_then(|c| c.as_f64())
        .map(|c| c as i64)
        .unwrap_or(INTERNAL_ERROR);
    let message = Reflect::get(&err, &JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string())
        .or_else(|| err.as_string())
        .unwrap_or_else(|| "Unknown wallet error".to_string());
    RpcError { code, message }
}

impl Eip1193 for InjectedProvider {
    fn request(
        &self,
        method: &str,
        params: Value,
    ) -> impl Future<Output = Result<Value, RpcError>> + 'static {
        let ethereum = self.inner.ethereum.clone();
        let args = json!({ "method": method, "params": params });
        async move {
            let request = lookup_function(&ethereum, "request").ok_or_else(|| {
                RpcError::new(METHOD_NOT_FOUND, "provider does not implement request")
            })?;
            let pending = request
                .call1(&ethereum, &to_js(&args)?)
                .map_err(rpc_error_from_js)?;
            let promise: Promise = pending.dyn_into().map_err(|_| {
                RpcError::new(INTERNAL_ERROR, "provider.request did not return a promise")
            })?;
            let result = JsFuture::from(promise).await.map_err(rpc_error_from_js)?;
            Ok(from_js(result))
        }
    }

    fn subscribe(&self, event: ProviderEvent, handler: EventHandler) -> Option<ListenerId> {
        let on = self.function("on")?;
        // Without removeListener we could never detach, so treat it as unsupported.
        self.function("removeListener")?;

        let closure = Closure::<dyn Fn(JsValue)>::new(move |payload: JsValue| {
            handler(from_js(payload));
        });
        if let Err(err) = on.call2(
            &self.inner.ethereum,
            &JsValue::from_str(event.name()),
            closure.as_ref().unchecked_ref(),
        ) {
            tracing::warn!(event = event.name(), error = %rpc_error_from_js(err), "provider.on failed");
            return None;
        }

        let id = ListenerId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        self.inner
            .listeners
            .borrow_mut()
            .insert(id, (event, closure));
        Some(id)
    }

    fn unsubscribe(&self, id: ListenerId) {
        let Some((event, closure)) = self.inner.listeners.borrow_mut().remove(&id) else {
            return;
        };
        if let Some(remove) = self.function("removeListener") {
            let _ = remove.call2(
                &self.inner.ethereum,
                &JsValue::from_str(event.name()),
                closure.as_ref().unchecked_ref(),
            );
        }
    }
}
