//! The note contract, spoken to through the wallet's JSON-RPC methods.

use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::{hex, Address, Bytes, TxHash, B256, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use serde::Deserialize;
use serde_json::json;

use crate::addresses::AddressRegistry;
use crate::chains::{parse_quantity, to_hex_chain_id};
use crate::error::{AppError, AppResult};
use crate::provider::Eip1193;
use crate::runtime::Runtime;
use crate::wallet::WalletAdapter;

sol! {
    interface IBaseNote {
        function note() external view returns (string);
        function noteLength() external view returns (uint256);
        function hasNote() external view returns (bool);
        function setNote(string newNote) external;

        event NoteUpdated(address indexed by, string note);
    }
}

/// A decoded `NoteUpdated` log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteUpdatedEvent {
    pub by: Address,
    pub note: String,
    pub block_number: Option<u64>,
    pub tx_hash: Option<TxHash>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLog {
    #[serde(default)]
    topics: Vec<B256>,
    #[serde(default)]
    data: Bytes,
    block_number: Option<String>,
    transaction_hash: Option<TxHash>,
    #[serde(default)]
    removed: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    status: Option<String>,
    block_number: Option<String>,
}

/// A contract handle bound to one chain. Write-capable when it carries a signer.
pub struct ContractClient<P> {
    wallet: WalletAdapter<P>,
    address: Address,
    chain_id: u64,
    signer: Option<Address>,
}

impl<P> Clone for ContractClient<P> {
    fn clone(&self) -> Self {
        Self {
            wallet: self.wallet.clone(),
            address: self.address,
            chain_id: self.chain_id,
            signer: self.signer,
        }
    }
}

impl<P: Eip1193> ContractClient<P> {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn signer(&self) -> Option<Address> {
        self.signer
    }

    async fn call<C: SolCall>(&self, call: C) -> AppResult<C::Return> {
        let data = hex::encode_prefixed(call.abi_encode());
        let value = self
            .wallet
            .request(
                "eth_call",
                json!([{ "to": self.address, "data": data }, "latest"]),
            )
            .await?;
        let raw = value
            .as_str()
            .ok_or_else(|| AppError::decode("eth_call", &value))?;
        let bytes = hex::decode(raw).map_err(|e| AppError::decode("eth_call", e))?;
        C::abi_decode_returns(&bytes).map_err(|e| AppError::decode(C::SIGNATURE, e))
    }

    pub async fn note(&self) -> AppResult<String> {
        self.call(IBaseNote::noteCall {}).await
    }

    pub async fn note_length(&self) -> AppResult<u64> {
        let length: U256 = self.call(IBaseNote::noteLengthCall {}).await?;
        u64::try_from(length).map_err(|e| AppError::decode("noteLength()", e))
    }

    pub async fn has_note(&self) -> AppResult<bool> {
        self.call(IBaseNote::hasNoteCall {}).await
    }

    /// Sends `setNote(text)` and returns the transaction hash without waiting for it.
    pub async fn set_note(&self, text: &str) -> AppResult<TxHash> {
        let from = self.signer.ok_or_else(|| {
            AppError::TransactionFailed("read-only contract client cannot send".to_string())
        })?;
        let data = IBaseNote::setNoteCall {
            newNote: text.to_string(),
        }
        .abi_encode();
        let value = self
            .wallet
            .request(
                "eth_sendTransaction",
                json!([{ "from": from, "to": self.address, "data": hex::encode_prefixed(data) }]),
            )
            .await
            .map_err(AppError::from_transaction)?;
        value
            .as_str()
            .and_then(|raw| TxHash::from_str(raw).ok())
            .ok_or_else(|| AppError::decode("eth_sendTransaction", &value))
    }

    /// Polls for the receipt until the transaction is mined.
    pub async fn wait_for_receipt<R: Runtime>(
        &self,
        tx_hash: TxHash,
        runtime: &R,
        poll_interval: Duration,
    ) -> AppResult<Receipt> {
        loop {
            let value = match self
                .wallet
                .request("eth_getTransactionReceipt", json!([tx_hash]))
                .await
            {
                Ok(value) => value,
                // Node hiccups say nothing about the transaction itself.
                Err(AppError::Rpc(err)) => {
                    tracing::warn!(%err, tx = %tx_hash, "receipt poll failed, retrying");
                    runtime.sleep(poll_interval).await;
                    continue;
                }
                Err(err) => return Err(AppError::from_transaction(err)),
            };
            if !value.is_null() {
                let raw: RawReceipt = serde_json::from_value(value)
                    .map_err(|e| AppError::decode("eth_getTransactionReceipt", e))?;
                if raw.status.as_deref().and_then(parse_quantity) == Some(0) {
                    return Err(AppError::TransactionFailed(format!(
                        "transaction {tx_hash} reverted"
                    )));
                }
                return Ok(Receipt {
                    tx_hash,
                    block_number: raw.block_number.as_deref().and_then(parse_quantity),
                });
            }
            runtime.sleep(poll_interval).await;
        }
    }

    pub async fn block_number(&self) -> AppResult<u64> {
        let value = self.wallet.request("eth_blockNumber", json!([])).await?;
        value
            .as_str()
            .and_then(parse_quantity)
            .ok_or_else(|| AppError::decode("eth_blockNumber", &value))
    }

    /// `NoteUpdated` logs of this contract in `from..=to`, oldest first.
    pub async fn note_updated_logs(&self, from: u64, to: u64) -> AppResult<Vec<NoteUpdatedEvent>> {
        let filter = json!([{
            "address": self.address,
            "topics": [IBaseNote::NoteUpdated::SIGNATURE_HASH],
            "fromBlock": to_hex_chain_id(from),
            "toBlock": to_hex_chain_id(to),
        }]);
        let value = self.wallet.request("eth_getLogs", filter).await?;
        let logs: Vec<RawLog> =
            serde_json::from_value(value).map_err(|e| AppError::decode("eth_getLogs", e))?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs.into_iter().filter(|log| !log.removed) {
            match IBaseNote::NoteUpdated::decode_raw_log(log.topics.iter().copied(), &log.data) {
                Ok(decoded) => events.push(NoteUpdatedEvent {
                    by: decoded.by,
                    note: decoded.note,
                    block_number: log.block_number.as_deref().and_then(parse_quantity),
                    tx_hash: log.transaction_hash,
                }),
                Err(err) => tracing::warn!(%err, "skipping undecodable NoteUpdated log"),
            }
        }
        Ok(events)
    }
}

/// Builds contract clients for whatever chain the wallet is on.
pub struct ContractFactory<P> {
    wallet: WalletAdapter<P>,
    registry: AddressRegistry,
}

impl<P> Clone for ContractFactory<P> {
    fn clone(&self) -> Self {
        Self {
            wallet: self.wallet.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<P: Eip1193> ContractFactory<P> {
    pub fn new(wallet: WalletAdapter<P>, registry: AddressRegistry) -> Self {
        Self { wallet, registry }
    }

    pub fn wallet(&self) -> &WalletAdapter<P> {
        &self.wallet
    }

    pub fn registry(&self) -> &AddressRegistry {
        &self.registry
    }

    pub async fn read_client(&self) -> AppResult<ContractClient<P>> {
        if !self.wallet.is_available() {
            return Err(AppError::WalletUnavailable);
        }
        let chain_id = self.wallet.current_chain_id().await?;
        let address = self.registry.resolve(chain_id)?;
        Ok(ContractClient {
            wallet: self.wallet.clone(),
            address,
            chain_id,
            signer: None,
        })
    }

    /// The network check comes first so a mismatched wallet is never prompted or written to.
    pub async fn write_client(&self, expected_chain_id: u64) -> AppResult<ContractClient<P>> {
        if !self.wallet.is_available() {
            return Err(AppError::WalletUnavailable);
        }
        let chain_id = self.wallet.current_chain_id().await?;
        if chain_id != expected_chain_id {
            return Err(AppError::WrongNetwork {
                expected: expected_chain_id,
                actual: chain_id,
            });
        }
        let address = self.registry.resolve(chain_id)?;

        let mut accounts = self.wallet.current_accounts().await?;
        if accounts.is_empty() {
            accounts = self.wallet.request_accounts().await?;
        }
        let account = accounts
            .first()
            .ok_or_else(|| AppError::UserRejected("No account authorized".to_string()))?;
        let signer =
            Address::from_str(account).map_err(|e| AppError::decode("eth_accounts", e))?;

        Ok(ContractClient {
            wallet: self.wallet.clone(),
            address,
            chain_id,
            signer: Some(signer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RpcError;
    use crate::test_support::{factory, run_local, FakeWallet, TestRuntime, ACCOUNT, CONTRACT};

    #[tokio::test]
    async fn reads_the_three_note_fields() {
        let fake = FakeWallet::new();
        fake.set_note("gm ☀");
        let client = factory(&fake).read_client().await.unwrap();
        assert_eq!(client.address(), CONTRACT);
        assert_eq!(client.chain_id(), 84532);
        assert_eq!(client.signer(), None);
        assert_eq!(client.note().await.unwrap(), "gm ☀");
        assert_eq!(client.note_length().await.unwrap(), 6);
        assert!(client.has_note().await.unwrap());
    }

    #[tokio::test]
    async fn read_client_fails_on_unconfigured_chain() {
        let fake = FakeWallet::new();
        fake.set_chain_id(8453);
        assert_eq!(
            factory(&fake).read_client().await.err(),
            Some(AppError::UnconfiguredChain(8453))
        );
    }

    #[tokio::test]
    async fn read_client_without_wallet_is_unavailable() {
        let factory = ContractFactory::new(
            WalletAdapter::<FakeWallet>::new(None),
            AddressRegistry::new([(84532, CONTRACT)]),
        );
        assert_eq!(
            factory.read_client().await.err(),
            Some(AppError::WalletUnavailable)
        );
    }

    #[tokio::test]
    async fn write_client_on_wrong_network_never_writes() {
        let fake = FakeWallet::new();
        fake.set_chain_id(8453);
        let err = factory(&fake).write_client(84532).await.err();
        assert_eq!(
            err,
            Some(AppError::WrongNetwork {
                expected: 84532,
                actual: 8453
            })
        );
        assert_eq!(fake.count("eth_requestAccounts"), 0);
        assert_eq!(fake.count("eth_sendTransaction"), 0);
    }

    #[tokio::test]
    async fn write_client_prompts_only_when_not_authorized() {
        let fake = FakeWallet::new();
        let client = factory(&fake).write_client(84532).await.unwrap();
        assert_eq!(client.signer(), Some(Address::from_str(ACCOUNT).unwrap()));
        assert_eq!(fake.count("eth_requestAccounts"), 1);

        factory(&fake).write_client(84532).await.unwrap();
        assert_eq!(fake.count("eth_requestAccounts"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn set_note_then_wait_for_the_receipt() {
        run_local(async {
            let fake = FakeWallet::new();
            fake.set_auto_mine(false);
            let client = factory(&fake).write_client(84532).await.unwrap();

            let hash = client.set_note("hello").await.unwrap();
            let params = fake.last_params("eth_sendTransaction").unwrap();
            assert_eq!(params[0]["to"], json!(CONTRACT));

            let waiter = {
                let client = client.clone();
                tokio::task::spawn_local(async move {
                    client
                        .wait_for_receipt(hash, &TestRuntime, Duration::from_millis(100))
                        .await
                })
            };
            tokio::time::sleep(Duration::from_millis(350)).await;
            assert!(!waiter.is_finished());
            fake.mine();

            let receipt = waiter.await.unwrap().unwrap();
            assert_eq!(receipt.tx_hash, hash);
            assert_eq!(receipt.block_number, Some(101));
            assert_eq!(client.note().await.unwrap(), "hello");
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn receipt_lookup_errors_are_retried() {
        run_local(async {
            let fake = FakeWallet::new();
            fake.set_auto_mine(false);
            let client = factory(&fake).write_client(84532).await.unwrap();
            let hash = client.set_note("again").await.unwrap();
            fake.fail_next(
                "eth_getTransactionReceipt",
                RpcError::new(-32005, "rate limited"),
            );
            fake.mine();

            let receipt = client
                .wait_for_receipt(hash, &TestRuntime, Duration::from_millis(100))
                .await
                .unwrap();
            assert_eq!(receipt.tx_hash, hash);
            assert_eq!(fake.count("eth_getTransactionReceipt"), 2);
        })
        .await;
    }

    #[tokio::test]
    async fn rejected_receipt_lookup_is_not_retried() {
        let fake = FakeWallet::new();
        let client = factory(&fake).write_client(84532).await.unwrap();
        let hash = client.set_note("x").await.unwrap();
        fake.fail(
            "eth_getTransactionReceipt",
            RpcError::new(4001, "User rejected the request."),
        );
        let err = client
            .wait_for_receipt(hash, &TestRuntime, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UserRejected(_)));
        assert_eq!(fake.count("eth_getTransactionReceipt"), 1);
    }

    #[tokio::test]
    async fn reverted_transactions_fail() {
        let fake = FakeWallet::new();
        fake.revert_next_transaction();
        let client = factory(&fake).write_client(84532).await.unwrap();
        let hash = client.set_note("nope").await.unwrap();
        let err = client
            .wait_for_receipt(hash, &TestRuntime, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TransactionFailed(_)));
    }

    #[tokio::test]
    async fn send_failures_pass_the_message_through() {
        let fake = FakeWallet::new();
        let client = factory(&fake).write_client(84532).await.unwrap();
        fake.fail("eth_sendTransaction", RpcError::new(-32000, "insufficient funds for gas"));
        assert_eq!(
            client.set_note("x").await,
            Err(AppError::TransactionFailed(
                "insufficient funds for gas".to_string()
            ))
        );

        fake.fail("eth_sendTransaction", RpcError::new(4001, "User denied transaction signature."));
        assert!(matches!(
            client.set_note("x").await,
            Err(AppError::UserRejected(_))
        ));
    }

    #[tokio::test]
    async fn decodes_note_updated_logs() {
        let fake = FakeWallet::new();
        let client = factory(&fake).write_client(84532).await.unwrap();
        let first = client.set_note("one").await.unwrap();
        let second = client.set_note("two").await.unwrap();

        let events = client.note_updated_logs(0, 200).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].note, "one");
        assert_eq!(events[0].tx_hash, Some(first));
        assert_eq!(events[0].block_number, Some(101));
        assert_eq!(events[1].tx_hash, Some(second));
        assert_eq!(events[1].by, Address::from_str(ACCOUNT).unwrap());

        assert_eq!(client.note_updated_logs(102, 102).await.unwrap().len(), 1);
        assert!(client.note_updated_logs(103, 200).await.unwrap().is_empty());
        assert_eq!(client.block_number().await.unwrap(), 102);
    }
}
