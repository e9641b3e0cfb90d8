//! Browser front end for the BaseNote contract: connect an injected wallet,
//! keep it on the expected Base chain, and read and write the on-chain note.

pub mod addresses;
pub mod app;
pub mod chains;
pub mod config;
pub mod contract;
pub mod debounce;
pub mod error;
pub mod events;
pub mod explorer;
pub mod injected;
pub mod logging;
pub mod network;
pub mod note;
pub mod provider;
pub mod runtime;
pub mod session;
pub mod storage;
pub mod wallet;

#[cfg(test)]
mod test_support;
