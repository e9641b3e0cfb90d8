use std::cell::Cell;
use std::rc::Rc;

use leptos::prelude::{ArcRwSignal, GetUntracked, Set, WithUntracked};

use crate::error::{AppError, AppResult};
use crate::provider::{Eip1193, ListenerId};
use crate::runtime::{Disposer, Runtime};
use crate::storage::KeyValueStore;
use crate::wallet::WalletAdapter;

/// localStorage key holding the last connected address.
pub const ACCOUNT_KEY: &str = "base_note_account";

const PREFIX_LEN: usize = 6;
const SUFFIX_LEN: usize = 4;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WalletSession {
    pub address: Option<String>,
}

impl WalletSession {
    pub fn connected(&self) -> bool {
        self.address.is_some()
    }

    /// `0x1234...abcd`, or the full string when it cannot be elided on
    /// character boundaries.
    pub fn short_address(&self) -> String {
        let Some(address) = &self.address else {
            return String::new();
        };
        if address.len() <= PREFIX_LEN + SUFFIX_LEN {
            return address.clone();
        }
        let prefix = address.get(..PREFIX_LEN);
        let suffix = address.get(address.len() - SUFFIX_LEN..);
        match (prefix, suffix) {
            (Some(prefix), Some(suffix)) => format!("{prefix}...{suffix}"),
            _ => address.clone(),
        }
    }
}

/// Owns the connected account and keeps it in sync with the wallet.
pub struct SessionManager<P, S> {
    inner: Rc<Inner<P, S>>,
}

struct Inner<P, S> {
    wallet: WalletAdapter<P>,
    storage: S,
    state: ArcRwSignal<WalletSession>,
    listener: Cell<Option<ListenerId>>,
    epoch: Cell<u64>,
}

impl<P, S> Clone for SessionManager<P, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P: Eip1193, S: KeyValueStore + 'static> SessionManager<P, S> {
    pub fn new(wallet: WalletAdapter<P>, storage: S) -> Self {
        Self {
            inner: Rc::new(Inner {
                wallet,
                storage,
                state: ArcRwSignal::new(WalletSession::default()),
                listener: Cell::new(None),
                epoch: Cell::new(0),
            }),
        }
    }

    pub fn state(&self) -> ArcRwSignal<WalletSession> {
        self.inner.state.clone()
    }

    pub fn current(&self) -> WalletSession {
        self.inner.state.get_untracked()
    }

    /// Shows the cached account right away, then checks it against `eth_accounts`.
    ///
    /// Without a cached account the session stays disconnected even if the
    /// wallet still authorizes the page: a local disconnect survives reloads.
    pub async fn restore(&self) {
        let Some(cached) = self.inner.storage.get(ACCOUNT_KEY) else {
            return;
        };
        let epoch = self.inner.epoch.get();
        self.set_address(Some(cached.clone()));

        match self.inner.wallet.current_accounts().await {
            Ok(_) if self.inner.epoch.get() != epoch => {}
            Ok(accounts) => {
                let still_authorized = accounts.iter().any(|a| a.eq_ignore_ascii_case(&cached));
                if !still_authorized {
                    self.apply_accounts(accounts);
                }
            }
            Err(err) => {
                tracing::warn!(%err, "could not confirm cached account");
                if matches!(err, AppError::WalletUnavailable) && self.inner.epoch.get() == epoch {
                    self.inner.state.set(WalletSession::default());
                }
            }
        }
    }

    pub async fn connect(&self) -> AppResult<String> {
        let accounts = self.inner.wallet.request_accounts().await?;
        let account = accounts
            .into_iter()
            .next()
            .ok_or_else(|| AppError::UserRejected("No account authorized".to_string()))?;
        tracing::info!(account = %account, "wallet connected");
        self.set_address(Some(account.clone()));
        Ok(account)
    }

    /// Forgets the account locally. The wallet keeps its permission.
    pub fn disconnect(&self) {
        tracing::info!("wallet disconnected locally");
        self.set_address(None);
    }

    /// Restores the session and follows `accountsChanged` until disposed.
    pub fn start<R: Runtime>(&self, runtime: &R) -> Disposer {
        let session = self.clone();
        runtime.spawn(async move { session.restore().await });

        let session = self.clone();
        let epoch = self.inner.epoch.get();
        let listener = self.inner.wallet.on_accounts_changed(move |accounts| {
            if session.inner.epoch.get() != epoch {
                return;
            }
            // A locally disconnected session ignores account switches.
            let connected = session.inner.state.with_untracked(WalletSession::connected);
            if connected || accounts.is_empty() {
                session.apply_accounts(accounts);
            }
        });
        self.inner.listener.set(listener);

        let session = self.clone();
        Disposer::new(move || session.stop())
    }

    pub fn stop(&self) {
        self.inner.epoch.set(self.inner.epoch.get() + 1);
        if let Some(id) = self.inner.listener.take() {
            self.inner.wallet.remove_listener(id);
        }
    }

    fn apply_accounts(&self, accounts: Vec<String>) {
        tracing::debug!(count = accounts.len(), "accounts changed");
        self.set_address(accounts.into_iter().next());
    }

    fn set_address(&self, address: Option<String>) {
        match &address {
            Some(address) => self.inner.storage.set(ACCOUNT_KEY, address),
            None => self.inner.storage.remove(ACCOUNT_KEY),
        }
        self.inner.state.set(WalletSession { address });
    }
}
