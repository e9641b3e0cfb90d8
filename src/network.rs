use std::cell::Cell;
use std::rc::Rc;

use leptos::prelude::{ArcRwSignal, GetUntracked, Update, WithUntracked};

use crate::chains::chain_name;
use crate::error::AppResult;
use crate::provider::{Eip1193, ListenerId};
use crate::runtime::{Disposer, Runtime};
use crate::wallet::WalletAdapter;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkState {
    /// `None` until the first successful `eth_chainId`, and again after an adapter failure.
    pub chain_id: Option<u64>,
    pub expected_chain_id: u64,
    pub switching: bool,
    pub error: Option<String>,
}

impl NetworkState {
    pub fn new(expected_chain_id: u64) -> Self {
        Self {
            chain_id: None,
            expected_chain_id,
            switching: false,
            error: None,
        }
    }

    pub fn is_wrong_network(&self) -> bool {
        self.chain_id
            .is_some_and(|chain_id| chain_id != self.expected_chain_id)
    }

    /// Writes need a known chain that matches; unknown counts as disabled.
    pub fn writes_enabled(&self) -> bool {
        self.chain_id == Some(self.expected_chain_id)
    }

    pub fn chain_label(&self) -> Option<String> {
        self.chain_id.map(chain_name)
    }
}

/// Tracks the wallet's chain and drives the switch/add-chain flow.
pub struct NetworkReconciler<P> {
    inner: Rc<Inner<P>>,
}

struct Inner<P> {
    wallet: WalletAdapter<P>,
    state: ArcRwSignal<NetworkState>,
    listener: Cell<Option<ListenerId>>,
    epoch: Cell<u64>,
}

impl<P> Clone for NetworkReconciler<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P: Eip1193> NetworkReconciler<P> {
    pub fn new(wallet: WalletAdapter<P>, expected_chain_id: u64) -> Self {
        Self {
            inner: Rc::new(Inner {
                wallet,
                state: ArcRwSignal::new(NetworkState::new(expected_chain_id)),
                listener: Cell::new(None),
                epoch: Cell::new(0),
            }),
        }
    }

    pub fn state(&self) -> ArcRwSignal<NetworkState> {
        self.inner.state.clone()
    }

    pub fn current(&self) -> NetworkState {
        self.inner.state.get_untracked()
    }

    /// Re-reads `eth_chainId`. Also the fallback for providers without events.
    pub async fn refresh(&self) {
        let epoch = self.inner.epoch.get();
        let result = self.inner.wallet.current_chain_id().await;
        if self.inner.epoch.get() != epoch {
            return;
        }
        self.apply(result);
    }

    /// Loads the chain id and follows `chainChanged` until disposed.
    pub fn start<R: Runtime>(&self, runtime: &R) -> Disposer {
        let reconciler = self.clone();
        runtime.spawn(async move { reconciler.refresh().await });

        let reconciler = self.clone();
        let epoch = self.inner.epoch.get();
        let listener = self.inner.wallet.on_chain_changed(move |chain_id| {
            if reconciler.inner.epoch.get() == epoch {
                reconciler.apply(chain_id);
            }
        });
        if listener.is_none() {
            tracing::debug!("provider has no chainChanged events, refreshing on demand");
        }
        self.inner.listener.set(listener);

        let reconciler = self.clone();
        Disposer::new(move || reconciler.stop())
    }

    pub fn stop(&self) {
        self.inner.epoch.set(self.inner.epoch.get() + 1);
        if let Some(id) = self.inner.listener.take() {
            self.inner.wallet.remove_listener(id);
        }
    }

    /// Asks the wallet to move to the expected chain, registering it first if
    /// the wallet does not know it. Other failures are shown as-is.
    pub async fn switch_to_expected(&self) {
        let expected = self.inner.state.with_untracked(|s| s.expected_chain_id);
        self.inner.state.update(|s| {
            s.switching = true;
            s.error = None;
        });

        let result = self.switch_or_add(expected).await;
        if let Err(err) = &result {
            tracing::warn!(%err, expected, "network switch failed");
        }
        self.inner.state.update(|s| {
            s.switching = false;
            s.error = result.err().map(|e| e.to_string());
        });
        if self.inner.state.with_untracked(|s| s.error.is_none()) {
            self.refresh().await;
        }
    }

    async fn switch_or_add(&self, chain_id: u64) -> AppResult<()> {
        let wallet = &self.inner.wallet;
        match wallet.switch_chain(chain_id).await {
            Err(err) if err.is_unrecognized_chain() => {
                tracing::info!(chain_id, "wallet does not know the chain, adding it");
                wallet.add_chain(chain_id).await?;
                wallet.switch_chain(chain_id).await
            }
            other => other,
        }
    }

    fn apply(&self, result: AppResult<u64>) {
        self.inner.state.update(|s| match result {
            Ok(chain_id) => {
                if s.chain_id != Some(chain_id) {
                    tracing::info!(chain_id, expected = s.expected_chain_id, "chain changed");
                }
                s.chain_id = Some(chain_id);
                s.error = None;
            }
            Err(err) => {
                s.chain_id = None;
                s.error = Some(err.to_string());
            }
        });
    }
}
