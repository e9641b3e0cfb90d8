//! The on-chain note as the page sees it.
//!
//! [`NoteReconciler`] owns a [`NoteState`] signal that is written from exactly
//! three places: a completed [`NoteReconciler::load`], the optimistic step of
//! [`NoteReconciler::submit`], and `NoteUpdated` events (which only touch
//! metadata and schedule a debounced load). Reads always replace the content
//! wholesale; an optimistic value is never merged with what the chain says.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use alloy_primitives::TxHash;
use chrono::{DateTime, Utc};
use leptos::prelude::{ArcRwSignal, GetUntracked, Update, WithUntracked};

use crate::config::{AppConfig, MAX_NOTE_BYTES};
use crate::contract::{ContractFactory, NoteUpdatedEvent, Receipt};
use crate::debounce::Debouncer;
use crate::error::{AppError, AppResult, ValidationError};
use crate::events::NoteEventWatcher;
use crate::network::NetworkState;
use crate::provider::Eip1193;
use crate::runtime::{Disposer, Runtime};
use crate::session::WalletSession;

/// Size of `text` as the contract measures it: UTF-8 bytes.
pub fn byte_length(text: &str) -> usize {
    text.len()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubmitStatus {
    #[default]
    Idle,
    Signing,
    Mining,
    Done,
}

impl SubmitStatus {
    pub fn in_flight(self) -> bool {
        matches!(self, Self::Signing | Self::Mining)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NoteState {
    pub text: String,
    pub byte_length: u64,
    pub has_note: bool,
    /// False while `text` is an optimistic value that the chain has not confirmed.
    pub confirmed: bool,
    pub pending_tx_hash: Option<TxHash>,
    pub last_confirmed_block: Option<u64>,
    pub last_confirmed_tx_hash: Option<TxHash>,
    /// Set by a failed load; the content fields are empty when this is set.
    pub error: Option<String>,
    pub status: SubmitStatus,
    pub submit_error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTransaction {
    pub hash: TxHash,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Content {
    text: String,
    byte_length: u64,
    has_note: bool,
    confirmed: bool,
}

impl Content {
    fn capture(state: &NoteState) -> Self {
        Self {
            text: state.text.clone(),
            byte_length: state.byte_length,
            has_note: state.has_note,
            confirmed: state.confirmed,
        }
    }

    fn apply(self, state: &mut NoteState) {
        state.text = self.text;
        state.byte_length = self.byte_length;
        state.has_note = self.has_note;
        state.confirmed = self.confirmed;
    }
}

struct InFlight {
    tx: PendingTransaction,
    previous: Content,
}

pub struct NoteReconciler<P, R> {
    inner: Rc<Inner<P, R>>,
}

struct Inner<P, R> {
    factory: ContractFactory<P>,
    runtime: R,
    session: ArcRwSignal<WalletSession>,
    network: ArcRwSignal<NetworkState>,
    state: ArcRwSignal<NoteState>,
    in_flight: RefCell<Option<InFlight>>,
    debouncer: Debouncer<R>,
    watcher: RefCell<Option<NoteEventWatcher>>,
    started: Cell<bool>,
    bound_chain: Cell<Option<u64>>,
    issued_loads: Cell<u64>,
    applied_load: Cell<u64>,
    epoch: Cell<u64>,
    event_poll_interval: Duration,
    receipt_poll_interval: Duration,
}

impl<P, R> Clone for NoteReconciler<P, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P: Eip1193, R: Runtime> NoteReconciler<P, R> {
    pub fn new(
        factory: ContractFactory<P>,
        runtime: R,
        session: ArcRwSignal<WalletSession>,
        network: ArcRwSignal<NetworkState>,
        config: &AppConfig,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                factory,
                debouncer: Debouncer::new(runtime.clone(), config.debounce),
                runtime,
                session,
                network,
                state: ArcRwSignal::new(NoteState::default()),
                in_flight: RefCell::new(None),
                watcher: RefCell::new(None),
                started: Cell::new(false),
                bound_chain: Cell::new(None),
                issued_loads: Cell::new(0),
                applied_load: Cell::new(0),
                epoch: Cell::new(0),
                event_poll_interval: config.event_poll_interval,
                receipt_poll_interval: config.receipt_poll_interval,
            }),
        }
    }

    pub fn state(&self) -> ArcRwSignal<NoteState> {
        self.inner.state.clone()
    }

    pub fn current(&self) -> NoteState {
        self.inner.state.get_untracked()
    }

    pub fn pending_transaction(&self) -> Option<PendingTransaction> {
        self.inner
            .in_flight
            .borrow()
            .as_ref()
            .map(|f| f.tx.clone())
    }

    /// Reads the note and replaces the content fields in one update.
    ///
    /// A load that finishes after a later-issued load has already been
    /// applied is dropped, as is any load finishing after [`Self::stop`].
    pub async fn load(&self) {
        let epoch = self.inner.epoch.get();
        let seq = self.inner.issued_loads.get() + 1;
        self.inner.issued_loads.set(seq);

        let result = self.read_content().await;
        if self.inner.epoch.get() != epoch || seq < self.inner.applied_load.get() {
            tracing::debug!(seq, "dropping superseded note load");
            return;
        }
        self.inner.applied_load.set(seq);

        self.inner.state.update(|s| match result {
            Ok(content) => {
                content.apply(s);
                s.error = None;
            }
            Err(err) => {
                tracing::warn!(%err, "note load failed");
                Content::default().apply(s);
                s.error = Some(err.to_string());
            }
        });
    }

    async fn read_content(&self) -> AppResult<Content> {
        let client = self.inner.factory.read_client().await?;
        let text = client.note().await?;
        let byte_length = client.note_length().await?;
        let has_note = client.has_note().await?;
        Ok(Content {
            text,
            byte_length,
            has_note,
            confirmed: true,
        })
    }

    /// Local checks that must pass before anything is sent to the wallet.
    pub fn validate(&self, text: &str) -> AppResult<()> {
        if self.inner.state.with_untracked(|s| s.status.in_flight()) {
            return Err(ValidationError::SubmitInFlight.into());
        }
        let bytes = byte_length(text);
        if bytes > MAX_NOTE_BYTES {
            return Err(ValidationError::NoteTooLong {
                bytes,
                max: MAX_NOTE_BYTES,
            }
            .into());
        }
        if !self.inner.session.with_untracked(WalletSession::connected) {
            return Err(ValidationError::NotConnected.into());
        }
        let network = self.inner.network.get_untracked();
        match network.chain_id {
            Some(actual) if actual != network.expected_chain_id => Err(AppError::WrongNetwork {
                expected: network.expected_chain_id,
                actual,
            }),
            Some(_) => Ok(()),
            None => Err(AppError::ChainIdUnavailable(
                "network not detected yet".to_string(),
            )),
        }
    }

    /// Writes `text` on-chain.
    ///
    /// The note is shown optimistically once the wallet returns a transaction
    /// hash. When the receipt arrives the state is marked confirmed and
    /// `on_confirmed` runs; on any failure the flow returns to idle, the
    /// optimistic value is rolled back and the error is kept for display.
    pub async fn submit(&self, text: &str, on_confirmed: impl FnOnce()) -> AppResult<Receipt> {
        if let Err(err) = self.validate(text) {
            self.inner
                .state
                .update(|s| s.submit_error = Some(err.to_string()));
            return Err(err);
        }

        let epoch = self.inner.epoch.get();
        self.inner.state.update(|s| {
            s.status = SubmitStatus::Signing;
            s.submit_error = None;
        });

        let result = self.send_and_confirm(text, epoch).await;
        let in_flight = self.inner.in_flight.borrow_mut().take();
        if self.inner.epoch.get() != epoch {
            return result;
        }

        match &result {
            Ok(receipt) => {
                tracing::info!(tx = %receipt.tx_hash, block = ?receipt.block_number, "note confirmed");
                self.inner.state.update(|s| {
                    s.status = SubmitStatus::Done;
                    s.confirmed = true;
                    s.pending_tx_hash = None;
                    s.last_confirmed_tx_hash = Some(receipt.tx_hash);
                    if receipt.block_number.is_some() {
                        s.last_confirmed_block = receipt.block_number;
                    }
                });
                on_confirmed();
            }
            Err(err) => {
                tracing::warn!(%err, "note submission failed");
                self.inner.state.update(|s| {
                    if let Some(flight) = in_flight {
                        // Roll back only if nothing authoritative replaced the optimistic
                        // value, a failed load included.
                        let untouched = !s.confirmed
                            && s.error.is_none()
                            && s.pending_tx_hash == Some(flight.tx.hash);
                        if untouched {
                            flight.previous.apply(s);
                        }
                    }
                    s.status = SubmitStatus::Idle;
                    s.pending_tx_hash = None;
                    s.submit_error = Some(err.to_string());
                });
            }
        }
        result
    }

    async fn send_and_confirm(&self, text: &str, epoch: u64) -> AppResult<Receipt> {
        let expected = self.inner.network.with_untracked(|n| n.expected_chain_id);
        let client = self.inner.factory.write_client(expected).await?;
        let hash = client.set_note(text).await?;
        tracing::info!(tx = %hash, "note transaction submitted");

        if self.inner.epoch.get() == epoch {
            self.publish_optimistic(text, hash);
        }
        client
            .wait_for_receipt(hash, &self.inner.runtime, self.inner.receipt_poll_interval)
            .await
    }

    fn publish_optimistic(&self, text: &str, hash: TxHash) {
        let previous = self.inner.state.with_untracked(Content::capture);
        *self.inner.in_flight.borrow_mut() = Some(InFlight {
            tx: PendingTransaction {
                hash,
                submitted_at: self.inner.runtime.now(),
            },
            previous,
        });
        self.inner.state.update(|s| {
            Content {
                text: text.to_string(),
                byte_length: byte_length(text) as u64,
                has_note: !text.is_empty(),
                confirmed: false,
            }
            .apply(s);
            s.pending_tx_hash = Some(hash);
            s.status = SubmitStatus::Mining;
        });
    }

    /// Records a confirmed `NoteUpdated` and schedules a debounced reload.
    pub fn handle_event(&self, event: NoteUpdatedEvent) {
        let acknowledged = event.tx_hash.is_some()
            && self.inner.state.with_untracked(|s| s.pending_tx_hash == event.tx_hash);
        if acknowledged {
            tracing::debug!(tx = ?event.tx_hash, "pending note transaction seen on-chain");
            self.inner.in_flight.borrow_mut().take();
        }
        self.inner.state.update(|s| {
            if acknowledged {
                s.pending_tx_hash = None;
            }
            if event.block_number.is_some() {
                s.last_confirmed_block = event.block_number;
            }
            if event.tx_hash.is_some() {
                s.last_confirmed_tx_hash = event.tx_hash;
            }
        });

        let reconciler = self.clone();
        self.inner
            .debouncer
            .call(move || async move { reconciler.load().await });
    }

    /// Loads the note and watches for updates until disposed.
    pub fn start(&self) -> Disposer {
        let epoch = self.inner.epoch.get();
        self.inner.started.set(true);
        self.inner
            .bound_chain
            .set(self.inner.network.with_untracked(|n| n.chain_id));
        self.spawn_bind(epoch);

        let reconciler = self.clone();
        Disposer::new(move || reconciler.stop())
    }

    /// Rebinds a started reconciler when the wallet reports a different chain.
    ///
    /// An unknown chain keeps the current binding.
    pub fn follow_chain(&self, chain_id: Option<u64>) {
        if !self.inner.started.get() || chain_id.is_none() {
            return;
        }
        if self.inner.bound_chain.replace(chain_id) != chain_id {
            tracing::info!(chain_id = ?chain_id, "rebinding note to new chain");
            self.unwatch();
            self.spawn_bind(self.inner.epoch.get());
        }
    }

    /// Cancels the pending reload, stops watching and ignores whatever is still in flight.
    pub fn stop(&self) {
        self.inner.epoch.set(self.inner.epoch.get() + 1);
        self.inner.started.set(false);
        self.inner.debouncer.cancel();
        self.unwatch();
    }

    fn unwatch(&self) {
        if let Some(watcher) = self.inner.watcher.borrow_mut().take() {
            watcher.stop();
        }
    }

    fn spawn_bind(&self, epoch: u64) {
        let reconciler = self.clone();
        self.inner.runtime.spawn(async move {
            reconciler.load().await;
            reconciler.watch(epoch).await;
        });
    }

    async fn watch(&self, epoch: u64) {
        let client = match self.inner.factory.read_client().await {
            Ok(client) => client,
            Err(err) => {
                tracing::info!(%err, "not watching NoteUpdated");
                return;
            }
        };
        if self.inner.epoch.get() != epoch {
            return;
        }

        let reconciler = self.clone();
        let watcher = NoteEventWatcher::spawn(
            client,
            self.inner.runtime.clone(),
            self.inner.event_poll_interval,
            move |event| {
                if reconciler.inner.epoch.get() == epoch {
                    reconciler.handle_event(event);
                }
            },
        );
        if let Some(previous) = self.inner.watcher.borrow_mut().replace(watcher) {
            previous.stop();
        }
    }
}
