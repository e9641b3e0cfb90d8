//! Build-time configuration.
//!
//! Values are baked in through environment variables at compile time (the
//! page has no server to ask at runtime):
//!
//! - `BASE_NOTE_CHAIN_ID`: the chain writes are allowed on (default 84532)
//! - `BASE_NOTE_ADDRESS_84532` / `BASE_NOTE_ADDRESS_8453`: deployed contract
//!   addresses; unset means the zero placeholder
//! - `BASE_NOTE_LOG`: `trace`, `debug`, `info`, `warn` or `error`

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;
use tracing::Level;

use crate::chains::{BASE_MAINNET, BASE_SEPOLIA};
use crate::error::{AppError, AppResult};

pub const DEFAULT_CHAIN_ID: u64 = BASE_SEPOLIA;
pub const MAX_NOTE_BYTES: usize = 280;

const CHAIN_ID_VAR: &str = "BASE_NOTE_CHAIN_ID";
const LOG_VAR: &str = "BASE_NOTE_LOG";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub expected_chain_id: u64,
    pub contract_addresses: BTreeMap<u64, Address>,
    pub log_level: Level,
    pub debounce: Duration,
    pub event_poll_interval: Duration,
    pub receipt_poll_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            expected_chain_id: DEFAULT_CHAIN_ID,
            contract_addresses: BTreeMap::from([
                (BASE_SEPOLIA, Address::ZERO),
                (BASE_MAINNET, Address::ZERO),
            ]),
            log_level: Level::INFO,
            debounce: Duration::from_millis(300),
            event_poll_interval: Duration::from_secs(4),
            receipt_poll_interval: Duration::from_secs(1),
        }
    }
}

impl AppConfig {
    /// Reads the variables captured when the crate was compiled.
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|key| {
            match key {
                CHAIN_ID_VAR => option_env!("BASE_NOTE_CHAIN_ID"),
                LOG_VAR => option_env!("BASE_NOTE_LOG"),
                "BASE_NOTE_ADDRESS_84532" => option_env!("BASE_NOTE_ADDRESS_84532"),
                "BASE_NOTE_ADDRESS_8453" => option_env!("BASE_NOTE_ADDRESS_8453"),
                _ => None,
            }
            .map(str::to_string)
        })
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let mut config = Self::default();

        // A non-numeric chain id silently keeps the default.
        if let Some(chain_id) = lookup(CHAIN_ID_VAR).and_then(|raw| raw.trim().parse().ok()) {
            config.expected_chain_id = chain_id;
        }

        if let Some(level) = lookup(LOG_VAR) {
            config.log_level = Level::from_str(level.trim())
                .map_err(|_| AppError::Config(format!("{LOG_VAR}={level} is not a log level")))?;
        }

        for chain_id in [BASE_SEPOLIA, BASE_MAINNET] {
            let key = address_var(chain_id);
            if let Some(raw) = lookup(&key) {
                let address = Address::from_str(raw.trim()).map_err(|e| {
                    AppError::Config(format!("{key}={raw} is not an address: {e}"))
                })?;
                config.contract_addresses.insert(chain_id, address);
            }
        }

        Ok(config)
    }
}

fn address_var(chain_id: u64) -> String {
    format!("BASE_NOTE_ADDRESS_{chain_id}")
}
