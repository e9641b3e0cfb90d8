use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use js_sys::Promise;
use wasm_bindgen_futures::JsFuture;

/// Task spawning and timers for the single-threaded event loop.
pub trait Runtime: Clone + 'static {
    fn spawn(&self, task: impl Future<Output = ()> + 'static);

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + 'static;

    fn now(&self) -> DateTime<Utc>;
}

/// `spawn_local` plus `setTimeout`, for the wasm build.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserRuntime;

impl Runtime for BrowserRuntime {
    fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        leptos::task::spawn_local(task);
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + 'static {
        let millis = i32::try_from(duration.as_millis()).unwrap_or(i32::MAX);
        let promise = Promise::new(&mut |resolve, _reject| {
            if let Some(window) = web_sys::window() {
                let _ = window
                    .set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, millis);
            }
        });
        async move {
            let _ = JsFuture::from(promise).await;
        }
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(js_sys::Date::now() as i64).unwrap_or_default()
    }
}

/// Undoes whatever a `start()` call set up.
#[must_use = "a Disposer does nothing until dispose is called"]
pub struct Disposer {
    dispose: Option<Box<dyn FnOnce()>>,
}

impl Disposer {
    pub fn new(dispose: impl FnOnce() + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    pub fn dispose(mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}
