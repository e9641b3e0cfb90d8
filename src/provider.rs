//! The seam between the app and an EIP-1193 wallet provider.
//!
//! The browser build talks to `window.ethereum` through
//! [`crate::injected::InjectedProvider`]; tests use a scripted fake. Everything
//! above this module only sees the [`Eip1193`] trait.

use std::future::Future;
use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;

pub const USER_REJECTED: i64 = 4001;
pub const UNRECOGNIZED_CHAIN: i64 = 4902;

/// An error object returned by the provider (`{ code, message }`).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == USER_REJECTED
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == UNRECOGNIZED_CHAIN
            || self.message.to_ascii_lowercase().contains("unrecognized chain")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderEvent {
    AccountsChanged,
    ChainChanged,
}

impl ProviderEvent {
    pub fn name(self) -> &'static str {
        match self {
            Self::AccountsChanged => "accountsChanged",
            Self::ChainChanged => "chainChanged",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

pub type EventHandler = Rc<dyn Fn(Value)>;

pub trait Eip1193: 'static {
    fn request(
        &self,
        method: &str,
        params: Value,
    ) -> impl Future<Output = Result<Value, RpcError>> + 'static;

    /// Registers `handler` for `event`. Returns `None` when the provider has
    /// no event support, in which case callers refresh on demand.
    fn subscribe(&self, event: ProviderEvent, handler: EventHandler) -> Option<ListenerId>;

    fn unsubscribe(&self, id: ListenerId);
}
