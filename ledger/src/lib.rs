use borsh::BorshSerialize;
use serde::Serialize;

pub mod account;
pub mod block;
pub mod builder;
pub mod chain;
pub mod config;
pub mod error;
pub mod event;
pub mod levy;
pub mod store;
pub mod transaction;
pub mod utxo;

pub use chain::Ledger;
pub use config::LedgerConfig;
pub use error::{LedgerError, Result};

// Encoding into an in-memory buffer does not fail for these types.
pub(crate) fn encode_borsh<T: BorshSerialize>(value: &T) -> Vec<u8> {
    value.try_to_vec().unwrap_or_default()
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).unwrap_or_default()
}
