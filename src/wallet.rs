use std::rc::Rc;

use serde_json::{json, Value};

use crate::chains::{parse_chain_id, to_hex_chain_id, ChainDefinition};
use crate::error::{AppError, AppResult};
use crate::provider::{Eip1193, ListenerId, ProviderEvent};

/// Typed access to the injected provider.
///
/// The provider is handed in by the caller; `None` models a page without a
/// wallet extension, in which case every request fails with
/// [`AppError::WalletUnavailable`].
pub struct WalletAdapter<P> {
    provider: Option<Rc<P>>,
}

impl<P> Clone for WalletAdapter<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
        }
    }
}

impl<P: Eip1193> WalletAdapter<P> {
    pub fn new(provider: Option<P>) -> Self {
        Self {
            provider: provider.map(Rc::new),
        }
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn request(&self, method: &str, params: Value) -> AppResult<Value> {
        let provider = self.provider.as_ref().ok_or(AppError::WalletUnavailable)?;
        tracing::trace!(method, "wallet request");
        provider
            .request(method, params)
            .await
            .map_err(AppError::from)
    }

    /// Accounts the page is already authorized for; never prompts.
    pub async fn current_accounts(&self) -> AppResult<Vec<String>> {
        let value = self.request("eth_accounts", json!([])).await?;
        Ok(accounts_from(value))
    }

    pub async fn request_accounts(&self) -> AppResult<Vec<String>> {
        let value = self.request("eth_requestAccounts", json!([])).await?;
        Ok(accounts_from(value))
    }

    pub async fn current_chain_id(&self) -> AppResult<u64> {
        let value = self.request("eth_chainId", json!([])).await?;
        parse_chain_id(&value)
    }

    /// Fails with an error for which [`AppError::is_unrecognized_chain`] holds
    /// when the wallet does not know the chain yet.
    pub async fn switch_chain(&self, chain_id: u64) -> AppResult<()> {
        self.request(
            "wallet_switchEthereumChain",
            json!([{ "chainId": to_hex_chain_id(chain_id) }]),
        )
        .await?;
        Ok(())
    }

    /// Registers one of the built-in chain definitions with the wallet.
    pub async fn add_chain(&self, chain_id: u64) -> AppResult<()> {
        let definition = ChainDefinition::builtin(chain_id)
            .ok_or(AppError::UnknownChainDefinition(chain_id))?;
        self.request(
            "wallet_addEthereumChain",
            json!([definition.to_add_chain_params()]),
        )
        .await?;
        Ok(())
    }

    pub fn on_accounts_changed(
        &self,
        handler: impl Fn(Vec<String>) + 'static,
    ) -> Option<ListenerId> {
        let provider = self.provider.as_ref()?;
        provider.subscribe(
            ProviderEvent::AccountsChanged,
            Rc::new(move |payload| handler(accounts_from(payload))),
        )
    }

    /// `handler` receives the parsed chain id, or the parse error for a malformed payload.
    pub fn on_chain_changed(
        &self,
        handler: impl Fn(AppResult<u64>) + 'static,
    ) -> Option<ListenerId> {
        let provider = self.provider.as_ref()?;
        provider.subscribe(
            ProviderEvent::ChainChanged,
            Rc::new(move |payload| handler(parse_chain_id(&payload))),
        )
    }

    pub fn remove_listener(&self, id: ListenerId) {
        if let Some(provider) = &self.provider {
            provider.unsubscribe(id);
        }
    }
}

fn accounts_from(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}
