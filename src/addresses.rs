use std::collections::BTreeMap;

use alloy_primitives::Address;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

/// Where the note contract lives on each chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressRegistry {
    entries: BTreeMap<u64, Address>,
}

impl AddressRegistry {
    pub fn new(entries: impl IntoIterator<Item = (u64, Address)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.contract_addresses.clone())
    }

    /// The zero address is the placeholder for "not deployed here yet".
    pub fn resolve(&self, chain_id: u64) -> AppResult<Address> {
        match self.entries.get(&chain_id) {
            Some(address) if !address.is_zero() => Ok(*address),
            _ => Err(AppError::UnconfiguredChain(chain_id)),
        }
    }
}
