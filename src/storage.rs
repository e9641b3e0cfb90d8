use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Minimal string key/value persistence.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// `window.localStorage`. Writes are best effort; quota and privacy-mode
/// failures are logged and ignored.
#[derive(Clone)]
pub struct BrowserStorage {
    storage: web_sys::Storage,
}

impl BrowserStorage {
    pub fn open() -> Option<Self> {
        let storage = web_sys::window()?.local_storage().ok().flatten()?;
        Some(Self { storage })
    }
}

impl KeyValueStore for BrowserStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.storage.get_item(key).ok().flatten()
    }

    fn set(&self, key: &str, value: &str) {
        if self.storage.set_item(key, value).is_err() {
            tracing::warn!(key, "localStorage write failed");
        }
    }

    fn remove(&self, key: &str) {
        let _ = self.storage.remove_item(key);
    }
}

/// Used when the browser refuses storage, and in tests.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    entries: Rc<RefCell<HashMap<String, String>>>,
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

/// Whichever store the page could get.
#[derive(Clone)]
pub enum PageStorage {
    Browser(BrowserStorage),
    Memory(MemoryStorage),
}

impl PageStorage {
    pub fn open() -> Self {
        match BrowserStorage::open() {
            Some(storage) => Self::Browser(storage),
            None => {
                tracing::info!("localStorage unavailable, session will not persist");
                Self::Memory(MemoryStorage::default())
            }
        }
    }
}

impl KeyValueStore for PageStorage {
    fn get(&self, key: &str) -> Option<String> {
        match self {
            Self::Browser(s) => s.get(key),
            Self::Memory(s) => s.get(key),
        }
    }

    fn set(&self, key: &str, value: &str) {
        match self {
            Self::Browser(s) => s.set(key, value),
            Self::Memory(s) => s.set(key, value),
        }
    }

    fn remove(&self, key: &str) {
        match self {
            Self::Browser(s) => s.remove(key),
            Self::Memory(s) => s.remove(key),
        }
    }
}
