use thiserror::Error;

use crate::provider::RpcError;

pub type AppResult<T> = Result<T, AppError>;

/// Everything that can go wrong between the view layer and the chain.
///
/// Every variant renders as a short message that is shown to the user as-is;
/// none of them is fatal.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("No injected wallet found")]
    WalletUnavailable,

    #[error("{0}")]
    UserRejected(String),

    #[error("BaseNote address not configured for chainId {0}")]
    UnconfiguredChain(u64),

    #[error("Unknown chain {0}: please add it in your wallet manually.")]
    UnknownChainDefinition(u64),

    #[error("Wrong network: expected {expected}, got {actual}")]
    WrongNetwork { expected: u64, actual: u64 },

    #[error("Unable to read chainId: {0}")]
    ChainIdUnavailable(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    TransactionFailed(String),

    #[error("{0}")]
    Rpc(RpcError),

    #[error("unexpected {method} response: {detail}")]
    Decode { method: String, detail: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Note exceeds {max} bytes ({bytes} used)")]
    NoteTooLong { bytes: usize, max: usize },

    #[error("Connect wallet first")]
    NotConnected,

    #[error("A note update is already in flight")]
    SubmitInFlight,
}

impl AppError {
    pub fn decode(method: &str, detail: impl ToString) -> Self {
        Self::Decode {
            method: method.to_string(),
            detail: detail.to_string(),
        }
    }

    /// Wallets signal an unknown chain with 4902; some only say so in the message.
    pub fn is_unrecognized_chain(&self) -> bool {
        match self {
            Self::Rpc(err) => err.is_unrecognized_chain(),
            _ => false,
        }
    }

    /// Wraps a failure from the transaction path, keeping user rejections distinct.
    pub fn from_transaction(err: AppError) -> Self {
        match err {
            Self::Rpc(rpc) => Self::TransactionFailed(rpc.message),
            other => other,
        }
    }
}

impl From<RpcError> for AppError {
    fn from(err: RpcError) -> Self {
        if err.is_user_rejection() {
            Self::UserRejected(err.message)
        } else {
            Self::Rpc(err)
        }
    }
}
