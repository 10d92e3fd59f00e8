//! Persistence interface of the ledger.
//!
//! Every collection is keyed by its natural key and every `put_*` is an
//! upsert, so a write sequence interrupted by a failure can be replayed.

use tally_crypto::Hash;
use thiserror::Error;

use crate::account::{Account, Address};
use crate::block::Block;
use crate::event::{Event, EventKind};
use crate::levy::LevyRecord;
use crate::transaction::Transaction;
use crate::utxo::{OutputId, UnspentOutput};

pub mod memory;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("stored value could not be encoded or decoded: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result of a conditional unspent-to-spent transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SpendOutcome {
    Spent(UnspentOutput),
    AlreadySpent(UnspentOutput),
    Missing,
}

pub trait Store: Send + Sync {
    fn put_block(&self, block: &Block) -> StoreResult<()>;

    fn block(&self, hash: &Hash) -> StoreResult<Option<Block>>;

    /// All blocks ordered by index.
    fn blocks(&self) -> StoreResult<Vec<Block>>;

    fn put_transaction(&self, tx: &Transaction) -> StoreResult<()>;

    fn transaction(&self, hash: &Hash) -> StoreResult<Option<Transaction>>;

    /// Transactions sent or received by `address`, newest first.
    fn transactions_by_address(&self, address: &Address) -> StoreResult<Vec<Transaction>>;

    fn put_pending(&self, tx: &Transaction) -> StoreResult<()>;

    /// The pending pool ordered by timestamp, then hash.
    fn pending(&self) -> StoreResult<Vec<Transaction>>;

    fn remove_pending(&self, hash: &Hash) -> StoreResult<()>;

    fn put_output(&self, output: &UnspentOutput) -> StoreResult<()>;

    fn output(&self, id: &OutputId) -> StoreResult<Option<UnspentOutput>>;

    /// Unspent outputs of `owner`, oldest first (creation time, then id).
    fn unspent_outputs(&self, owner: &Address) -> StoreResult<Vec<UnspentOutput>>;

    fn all_unspent_outputs(&self) -> StoreResult<Vec<UnspentOutput>>;

    /// Atomically flips an unspent output to spent. Two concurrent callers
    /// on the same output never both observe `Spent`.
    fn spend_output(&self, id: &OutputId, spending_tx: &Hash, at: i64) -> StoreResult<SpendOutcome>;

    fn put_account(&self, account: &Account) -> StoreResult<()>;

    fn account(&self, address: &Address) -> StoreResult<Option<Account>>;

    fn accounts(&self) -> StoreResult<Vec<Account>>;

    /// Upserts by `(address, period)`.
    fn put_levy(&self, record: &LevyRecord) -> StoreResult<()>;

    /// Levy records of `address`, oldest period first.
    fn levies(&self, address: &Address) -> StoreResult<Vec<LevyRecord>>;

    fn put_event(&self, event: &Event) -> StoreResult<()>;

    /// Events newest first, optionally of one kind. A `limit` of 0 returns
    /// all of them.
    fn events(&self, kind: Option<EventKind>, limit: usize) -> StoreResult<Vec<Event>>;
}

/// Sort key shared by backends for oldest-first coin selection.
pub fn output_order(a: &UnspentOutput, b: &UnspentOutput) -> std::cmp::Ordering {
    (a.created_at, a.id).cmp(&(b.created_at, b.id))
}

/// Sort key shared by backends for the pending pool.
pub fn pending_order(a: &Transaction, b: &Transaction) -> std::cmp::Ordering {
    (a.payload.timestamp, a.hash).cmp(&(b.payload.timestamp, b.hash))
}
