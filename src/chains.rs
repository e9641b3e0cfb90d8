use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};

pub const BASE_MAINNET: u64 = 8453;
pub const BASE_SEPOLIA: u64 = 84532;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NativeCurrency {
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
}

/// The parameter set `wallet_addEthereumChain` needs for one network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainDefinition {
    pub chain_id: u64,
    pub display_name: &'static str,
    pub native_currency: NativeCurrency,
    pub rpc_url: &'static str,
    pub explorer_url: &'static str,
}

const ETH: NativeCurrency = NativeCurrency {
    name: "ETH",
    symbol: "ETH",
    decimals: 18,
};

static BUILTIN_CHAINS: [ChainDefinition; 2] = [
    ChainDefinition {
        chain_id: BASE_SEPOLIA,
        display_name: "Base Sepolia",
        native_currency: ETH,
        rpc_url: "https://sepolia.base.org",
        explorer_url: "https://sepolia.basescan.org",
    },
    ChainDefinition {
        chain_id: BASE_MAINNET,
        display_name: "Base",
        native_currency: ETH,
        rpc_url: "https://mainnet.base.org",
        explorer_url: "https://basescan.org",
    },
];

impl ChainDefinition {
    pub fn builtin(chain_id: u64) -> Option<&'static ChainDefinition> {
        BUILTIN_CHAINS.iter().find(|c| c.chain_id == chain_id)
    }

    /// The single element of the `wallet_addEthereumChain` params array.
    pub fn to_add_chain_params(&self) -> Value {
        serde_json::json!({
            "chainId": to_hex_chain_id(self.chain_id),
            "chainName": self.display_name,
            "nativeCurrency": self.native_currency,
            "rpcUrls": [self.rpc_url],
            "blockExplorerUrls": [self.explorer_url],
        })
    }
}

pub fn chain_name(chain_id: u64) -> String {
    match chain_id {
        BASE_MAINNET => "Base Mainnet".to_string(),
        BASE_SEPOLIA => "Base Sepolia".to_string(),
        other => format!("Chain {other}"),
    }
}

pub fn to_hex_chain_id(chain_id: u64) -> String {
    format!("{chain_id:#x}")
}

/// Wallets answer `eth_chainId` with a hex string, but some return decimals or numbers.
pub fn parse_chain_id(value: &Value) -> AppResult<u64> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => parse_quantity(s).or_else(|| s.trim().parse().ok()),
        _ => None,
    };
    parsed.ok_or_else(|| AppError::ChainIdUnavailable(value.to_string()))
}

/// Parses a `0x`-prefixed JSON-RPC quantity.
pub fn parse_quantity(raw: &str) -> Option<u64> {
    let digits = raw
        .trim()
        .strip_prefix("0x")
        .or_else(|| raw.trim().strip_prefix("0X"))?;
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}
