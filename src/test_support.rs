//! A scripted wallet and a tokio-backed runtime for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::future::Future;
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::{address, hex, Address, TxHash, B256, U256};
use alloy_sol_types::{SolCall, SolEvent, SolValue};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::addresses::AddressRegistry;
use crate::chains::{parse_quantity, to_hex_chain_id, BASE_MAINNET, BASE_SEPOLIA};
use crate::contract::{ContractFactory, IBaseNote};
use crate::provider::{Eip1193, EventHandler, ListenerId, ProviderEvent, RpcError};
use crate::runtime::Runtime;
use crate::wallet::WalletAdapter;

pub const ACCOUNT: &str = "0x1111111111111111111111111111111111111111";
pub const CONTRACT: Address = address!("abc0000000000000000000000000000000000001");

pub fn registry() -> AddressRegistry {
    AddressRegistry::new([(BASE_SEPOLIA, CONTRACT), (BASE_MAINNET, Address::ZERO)])
}

pub fn factory(fake: &FakeWallet) -> ContractFactory<FakeWallet> {
    ContractFactory::new(WalletAdapter::new(Some(fake.clone())), registry())
}

/// Runs `fut` inside a `LocalSet` so `TestRuntime::spawn` works.
pub async fn run_local<F: Future>(fut: F) -> F::Output {
    tokio::task::LocalSet::new().run_until(fut).await
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TestRuntime;

impl Runtime for TestRuntime {
    fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        tokio::task::spawn_local(task);
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + 'static {
        tokio::time::sleep(duration)
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

struct PendingTx {
    hash: TxHash,
    from: Address,
    note: String,
}

struct FakeInner {
    events_supported: bool,
    chain_id: RefCell<Value>,
    known_chains: RefCell<BTreeSet<u64>>,
    accounts: RefCell<Vec<String>>,
    reject_accounts: Cell<bool>,
    note: RefCell<String>,
    block: Cell<u64>,
    tx_counter: Cell<u8>,
    auto_mine: Cell<bool>,
    revert_next: Cell<bool>,
    pending: RefCell<Vec<PendingTx>>,
    receipts: RefCell<HashMap<TxHash, Value>>,
    logs: RefCell<Vec<(u64, Value)>>,
    failures: RefCell<HashMap<String, RpcError>>,
    next_failures: RefCell<HashMap<String, VecDeque<RpcError>>>,
    max_log_range: Cell<Option<u64>>,
    delays: RefCell<HashMap<String, VecDeque<Duration>>>,
    calls: RefCell<Vec<(String, Value)>>,
    listeners: RefCell<Vec<(ListenerId, ProviderEvent, EventHandler)>>,
    next_listener: Cell<u64>,
}

/// An in-memory wallet on Base Sepolia with the note contract deployed at [`CONTRACT`].
#[derive(Clone)]
pub struct FakeWallet {
    inner: Rc<FakeInner>,
}

impl FakeWallet {
    pub fn new() -> Self {
        Self::build(true)
    }

    pub fn without_events() -> Self {
        Self::build(false)
    }

    fn build(events_supported: bool) -> Self {
        Self {
            inner: Rc::new(FakeInner {
                events_supported,
                chain_id: RefCell::new(json!(to_hex_chain_id(BASE_SEPOLIA))),
                known_chains: RefCell::new(BTreeSet::from([BASE_SEPOLIA, BASE_MAINNET])),
                accounts: RefCell::new(Vec::new()),
                reject_accounts: Cell::new(false),
                note: RefCell::new(String::new()),
                block: Cell::new(100),
                tx_counter: Cell::new(0),
                auto_mine: Cell::new(true),
                revert_next: Cell::new(false),
                pending: RefCell::new(Vec::new()),
                receipts: RefCell::new(HashMap::new()),
                logs: RefCell::new(Vec::new()),
                failures: RefCell::new(HashMap::new()),
                next_failures: RefCell::new(HashMap::new()),
                max_log_range: Cell::new(None),
                delays: RefCell::new(HashMap::new()),
                calls: RefCell::new(Vec::new()),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
            }),
        }
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.set_chain_id_payload(json!(to_hex_chain_id(chain_id)));
    }

    pub fn set_chain_id_payload(&self, payload: Value) {
        *self.inner.chain_id.borrow_mut() = payload;
    }

    pub fn forget_chain(&self, chain_id: u64) {
        self.inner.known_chains.borrow_mut().remove(&chain_id);
    }

    pub fn authorize(&self) {
        *self.inner.accounts.borrow_mut() = vec![ACCOUNT.to_string()];
    }

    pub fn reject_account_requests(&self) {
        self.inner.reject_accounts.set(true);
    }

    /// Changes the contract state without emitting a log.
    pub fn set_note(&self, text: &str) {
        *self.inner.note.borrow_mut() = text.to_string();
    }

    pub fn set_auto_mine(&self, auto_mine: bool) {
        self.inner.auto_mine.set(auto_mine);
    }

    pub fn revert_next_transaction(&self) {
        self.inner.revert_next.set(true);
    }

    /// Every call to `method` fails with `err` until [`FakeWallet::clear_failure`].
    pub fn fail(&self, method: &str, err: RpcError) {
        self.inner
            .failures
            .borrow_mut()
            .insert(method.to_string(), err);
    }

    pub fn clear_failure(&self, method: &str) {
        self.inner.failures.borrow_mut().remove(method);
    }

    /// Only the next call to `method` fails with `err`.
    pub fn fail_next(&self, method: &str, err: RpcError) {
        self.inner
            .next_failures
            .borrow_mut()
            .entry(method.to_string())
            .or_default()
            .push_back(err);
    }

    /// `eth_getLogs` rejects windows spanning more than `blocks` blocks.
    pub fn limit_log_range(&self, blocks: u64) {
        self.inner.max_log_range.set(Some(blocks));
    }

    /// Produces `count` empty blocks.
    pub fn advance_blocks(&self, count: u64) {
        self.inner.block.set(self.inner.block.get() + count);
    }

    /// Delays the response of the next call to `method`.
    pub fn delay_next(&self, method: &str, delay: Duration) {
        self.inner
            .delays
            .borrow_mut()
            .entry(method.to_string())
            .or_default()
            .push_back(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner
            .calls
            .borrow()
            .iter()
            .map(|(method, _)| method.clone())
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.inner
            .calls
            .borrow()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    pub fn last_params(&self, method: &str) -> Option<Value> {
        self.inner
            .calls
            .borrow()
            .iter()
            .rev()
            .find(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    pub fn emit(&self, event: ProviderEvent, payload: Value) {
        let handlers: Vec<EventHandler> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .filter(|(_, e, _)| *e == event)
            .map(|(_, _, h)| Rc::clone(h))
            .collect();
        for handler in handlers {
            handler(payload.clone());
        }
    }

    /// Mines every pending transaction, one block each. Returns their hashes.
    pub fn mine(&self) -> Vec<TxHash> {
        let pending: Vec<PendingTx> = self.inner.pending.borrow_mut().drain(..).collect();
        pending
            .into_iter()
            .map(|tx| {
                let hash = tx.hash;
                self.mine_one(tx);
                hash
            })
            .collect()
    }

    fn mine_one(&self, tx: PendingTx) {
        let block = self.inner.block.get() + 1;
        self.inner.block.set(block);
        let reverted = self.inner.revert_next.replace(false);

        self.inner.receipts.borrow_mut().insert(
            tx.hash,
            json!({
                "transactionHash": tx.hash,
                "blockNumber": to_hex_chain_id(block),
                "status": if reverted { "0x0" } else { "0x1" },
            }),
        );
        if reverted {
            return;
        }

        *self.inner.note.borrow_mut() = tx.note.clone();
        let event = IBaseNote::NoteUpdated {
            by: tx.from,
            note: tx.note,
        };
        self.inner.logs.borrow_mut().push((
            block,
            json!({
                "address": CONTRACT,
                "topics": [IBaseNote::NoteUpdated::SIGNATURE_HASH, tx.from.into_word()],
                "data": hex::encode_prefixed(event.encode_data()),
                "blockNumber": to_hex_chain_id(block),
                "transactionHash": tx.hash,
                "removed": false,
            }),
        ));
    }

    fn dispatch(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        let next_failure = self
            .inner
            .next_failures
            .borrow_mut()
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        if let Some(err) = next_failure {
            return Err(err);
        }
        if let Some(err) = self.inner.failures.borrow().get(method) {
            return Err(err.clone());
        }
        match method {
            "eth_chainId" => Ok(self.inner.chain_id.borrow().clone()),
            "eth_accounts" => Ok(json!(*self.inner.accounts.borrow())),
            "eth_requestAccounts" => {
                if self.inner.reject_accounts.get() {
                    return Err(RpcError::new(4001, "User rejected the request."));
                }
                self.authorize();
                Ok(json!(*self.inner.accounts.borrow()))
            }
            "wallet_switchEthereumChain" => {
                let chain_id = params[0]["chainId"]
                    .as_str()
                    .and_then(parse_quantity)
                    .ok_or_else(|| RpcError::new(-32602, "invalid chainId"))?;
                if !self.inner.known_chains.borrow().contains(&chain_id) {
                    return Err(RpcError::new(
                        4902,
                        format!("Unrecognized chain ID \"{}\".", to_hex_chain_id(chain_id)),
                    ));
                }
                self.set_chain_id(chain_id);
                self.emit(ProviderEvent::ChainChanged, json!(to_hex_chain_id(chain_id)));
                Ok(Value::Null)
            }
            "wallet_addEthereumChain" => {
                let chain_id = params[0]["chainId"]
                    .as_str()
                    .and_then(parse_quantity)
                    .ok_or_else(|| RpcError::new(-32602, "invalid chainId"))?;
                self.inner.known_chains.borrow_mut().insert(chain_id);
                Ok(Value::Null)
            }
            "eth_call" => self.contract_call(params),
            "eth_sendTransaction" => self.send_transaction(params),
            "eth_getTransactionReceipt" => {
                let hash = params[0]
                    .as_str()
                    .and_then(|raw| TxHash::from_str(raw).ok())
                    .ok_or_else(|| RpcError::new(-32602, "invalid hash"))?;
                Ok(self
                    .inner
                    .receipts
                    .borrow()
                    .get(&hash)
                    .cloned()
                    .unwrap_or(Value::Null))
            }
            "eth_blockNumber" => Ok(json!(to_hex_chain_id(self.inner.block.get()))),
            "eth_getLogs" => {
                let filter = &params[0];
                let from = filter["fromBlock"].as_str().and_then(parse_quantity).unwrap_or(0);
                let to = filter["toBlock"]
                    .as_str()
                    .and_then(parse_quantity)
                    .unwrap_or(u64::MAX);
                if let Some(max) = self.inner.max_log_range.get() {
                    if to.saturating_sub(from) + 1 > max {
                        return Err(RpcError::new(-32005, "query exceeds max block range"));
                    }
                }
                let logs: Vec<Value> = self
                    .inner
                    .logs
                    .borrow()
                    .iter()
                    .filter(|(block, _)| (from..=to).contains(block))
                    .map(|(_, log)| log.clone())
                    .collect();
                Ok(Value::Array(logs))
            }
            other => Err(RpcError::new(-32601, format!("method {other} not supported"))),
        }
    }

    fn contract_call(&self, params: &Value) -> Result<Value, RpcError> {
        let data = params[0]["data"]
            .as_str()
            .and_then(|raw| hex::decode(raw).ok())
            .ok_or_else(|| RpcError::new(-32602, "invalid call data"))?;
        let note = self.inner.note.borrow().clone();
        let encoded = match data.get(..4) {
            Some(selector) if selector == IBaseNote::noteCall::SELECTOR => (note,).abi_encode_params(),
            Some(selector) if selector == IBaseNote::noteLengthCall::SELECTOR => {
                (U256::from(note.len()),).abi_encode_params()
            }
            Some(selector) if selector == IBaseNote::hasNoteCall::SELECTOR => {
                (!note.is_empty(),).abi_encode_params()
            }
            _ => return Err(RpcError::new(3, "execution reverted")),
        };
        Ok(json!(hex::encode_prefixed(encoded)))
    }

    fn send_transaction(&self, params: &Value) -> Result<Value, RpcError> {
        let tx = &params[0];
        let from = tx["from"]
            .as_str()
            .and_then(|raw| Address::from_str(raw).ok())
            .ok_or_else(|| RpcError::new(-32602, "missing from"))?;
        let data = tx["data"]
            .as_str()
            .and_then(|raw| hex::decode(raw).ok())
            .ok_or_else(|| RpcError::new(-32602, "missing data"))?;
        let call = IBaseNote::setNoteCall::abi_decode(&data)
            .map_err(|e| RpcError::new(3, format!("execution reverted: {e}")))?;

        let counter = self.inner.tx_counter.get() + 1;
        self.inner.tx_counter.set(counter);
        let hash = B256::with_last_byte(counter);
        let pending = PendingTx {
            hash,
            from,
            note: call.newNote,
        };
        if self.inner.auto_mine.get() {
            self.mine_one(pending);
        } else {
            self.inner.pending.borrow_mut().push(pending);
        }
        Ok(json!(hash))
    }
}

impl Eip1193 for FakeWallet {
    fn request(
        &self,
        method: &str,
        params: Value,
    ) -> impl Future<Output = Result<Value, RpcError>> + 'static {
        self.inner
            .calls
            .borrow_mut()
            .push((method.to_string(), params.clone()));
        let result = self.dispatch(method, &params);
        let delay = self
            .inner
            .delays
            .borrow_mut()
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        }
    }

    fn subscribe(&self, event: ProviderEvent, handler: EventHandler) -> Option<ListenerId> {
        if !self.inner.events_supported {
            return None;
        }
        let id = ListenerId(self.inner.next_listener.get());
        self.inner.next_listener.set(id.0 + 1);
        self.inner.listeners.borrow_mut().push((id, event, handler));
        Some(id)
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.inner
            .listeners
            .borrow_mut()
            .retain(|(lid, _, _)| *lid != id);
    }
}
