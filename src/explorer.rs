use crate::chains::ChainDefinition;

/// Explorer for the chain, or `""` when we don't know one.
pub fn explorer_base_url(chain_id: u64) -> &'static str {
    ChainDefinition::builtin(chain_id)
        .map(|chain| chain.explorer_url)
        .unwrap_or_default()
}

pub fn address_url(chain_id: u64, address: &str) -> String {
    format!("{}/address/{address}", explorer_base_url(chain_id))
}

pub fn tx_url(chain_id: u64, hash: &str) -> String {
    format!("{}/tx/{hash}", explorer_base_url(chain_id))
}
