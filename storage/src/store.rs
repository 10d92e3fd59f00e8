//! Durable [`Store`] backed by sled.
//!
//! Values are bincode encoded. Secondary trees index transactions by the
//! addresses they involve and unspent outputs by owner; their values are
//! empty and the key carries the reference.

use std::path::Path;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use tally_crypto::Hash;
use tally_ledger::account::{Account, Address};
use tally_ledger::block::Block;
use tally_ledger::event::{Event, EventKind};
use tally_ledger::levy::LevyRecord;
use tally_ledger::store::{output_order, pending_order, SpendOutcome, Store, StoreError, StoreResult};
use tally_ledger::transaction::Transaction;
use tally_ledger::utxo::{OutputId, UnspentOutput};

const TREE_BLOCKS: &str = "blocks";
const TREE_BLOCK_INDEX: &str = "block_index";
const TREE_TRANSACTIONS: &str = "transactions";
const TREE_TRANSACTIONS_BY_ADDRESS: &str = "transactions_by_address";
const TREE_PENDING: &str = "pending";
const TREE_OUTPUTS: &str = "outputs";
const TREE_UNSPENT_BY_OWNER: &str = "unspent_by_owner";
const TREE_ACCOUNTS: &str = "accounts";
const TREE_LEVIES: &str = "levies";
const TREE_EVENTS: &str = "events";

const EMPTY: &[u8] = &[];

pub struct SledStore {
    db: Db,
    blocks: Tree,
    block_index: Tree,
    transactions: Tree,
    transactions_by_address: Tree,
    pending: Tree,
    outputs: Tree,
    unspent_by_owner: Tree,
    accounts: Tree,
    levies: Tree,
    events: Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path).map_err(backend)?;
        Self::with_db(db)
    }

    /// Store deleted when dropped.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open().map_err(backend)?;
        Self::with_db(db)
    }

    fn with_db(db: Db) -> StoreResult<Self> {
        let tree = |name: &str| db.open_tree(name).map_err(backend);
        Ok(SledStore {
            blocks: tree(TREE_BLOCKS)?,
            block_index: tree(TREE_BLOCK_INDEX)?,
            transactions: tree(TREE_TRANSACTIONS)?,
            transactions_by_address: tree(TREE_TRANSACTIONS_BY_ADDRESS)?,
            pending: tree(TREE_PENDING)?,
            outputs: tree(TREE_OUTPUTS)?,
            unspent_by_owner: tree(TREE_UNSPENT_BY_OWNER)?,
            accounts: tree(TREE_ACCOUNTS)?,
            levies: tree(TREE_LEVIES)?,
            events: tree(TREE_EVENTS)?,
            db,
        })
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush().map_err(backend)?;
        Ok(())
    }
}

impl Drop for SledStore {
    fn drop(&mut self) {
        let _ = self.db.flush();
    }
}

fn backend(e: sled::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn key(parts: &[&[u8]]) -> Vec<u8> {
    parts.concat()
}

fn get<T: DeserializeOwned>(tree: &Tree, key: &[u8]) -> StoreResult<Option<T>> {
    match tree.get(key).map_err(backend)? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

fn put<T: Serialize>(tree: &Tree, key: &[u8], value: &T) -> StoreResult<()> {
    tree.insert(key, encode(value)?).map_err(backend)?;
    Ok(())
}

fn values<T: DeserializeOwned>(tree: &Tree) -> StoreResult<Vec<T>> {
    tree.iter()
        .values()
        .map(|bytes| decode(&bytes.map_err(backend)?))
        .collect()
}

/// Suffixes of the keys under `prefix` in an index tree.
fn index_scan(tree: &Tree, prefix: &[u8]) -> StoreResult<Vec<Vec<u8>>> {
    tree.scan_prefix(prefix)
        .keys()
        .map(|k| Ok(k.map_err(backend)?[prefix.len()..].to_vec()))
        .collect()
}

/// Big-endian key that sorts signed timestamps in order.
fn timestamp_key(timestamp: i64) -> [u8; 8] {
    ((timestamp as u64) ^ (1 << 63)).to_be_bytes()
}

fn hash(bytes: &[u8]) -> StoreResult<Hash> {
    if bytes.len() != Hash::LENGTH {
        return Err(StoreError::Serialization(format!(
            "index key suffix of {} bytes",
            bytes.len()
        )));
    }
    let mut array = [0u8; Hash::LENGTH];
    array.copy_from_slice(bytes);
    Ok(Hash::new(array))
}

impl Store for SledStore {
    fn put_block(&self, block: &Block) -> StoreResult<()> {
        let index = block.index.to_be_bytes();
        put(&self.blocks, &index, block)?;
        self.block_index
            .insert(block.hash.as_bytes(), &index[..])
            .map_err(backend)?;
        self.flush()?;
        debug!("Stored block {} {}", block.index, block.hash);
        Ok(())
    }

    fn block(&self, hash: &Hash) -> StoreResult<Option<Block>> {
        match self.block_index.get(hash.as_bytes()).map_err(backend)? {
            Some(index) => {
                let block: Option<Block> = get(&self.blocks, &index)?;
                Ok(block.filter(|b| b.hash == *hash))
            }
            None => Ok(None),
        }
    }

    fn blocks(&self) -> StoreResult<Vec<Block>> {
        values(&self.blocks)
    }

    fn put_transaction(&self, tx: &Transaction) -> StoreResult<()> {
        put(&self.transactions, tx.hash.as_bytes(), tx)?;
        let mut involved = vec![tx.payload.receiver];
        involved.extend(tx.payload.sender);
        involved.extend(tx.payload.outputs.iter().map(|o| o.owner));
        for address in involved {
            self.transactions_by_address
                .insert(key(&[address.as_bytes(), tx.hash.as_bytes()]), EMPTY)
                .map_err(backend)?;
        }
        Ok(())
    }

    fn transaction(&self, hash: &Hash) -> StoreResult<Option<Transaction>> {
        get(&self.transactions, hash.as_bytes())
    }

    fn transactions_by_address(&self, address: &Address) -> StoreResult<Vec<Transaction>> {
        let mut found = Vec::new();
        for suffix in index_scan(&self.transactions_by_address, address.as_bytes())? {
            if let Some(tx) = self.transaction(&hash(&suffix)?)? {
                found.push(tx);
            }
        }
        found.sort_by(|a, b| pending_order(b, a));
        Ok(found)
    }

    fn put_pending(&self, tx: &Transaction) -> StoreResult<()> {
        put(&self.pending, tx.hash.as_bytes(), tx)
    }

    fn pending(&self) -> StoreResult<Vec<Transaction>> {
        let mut pending: Vec<Transaction> = values(&self.pending)?;
        pending.sort_by(pending_order);
        Ok(pending)
    }

    fn remove_pending(&self, hash: &Hash) -> StoreResult<()> {
        self.pending.remove(hash.as_bytes()).map_err(backend)?;
        Ok(())
    }

    fn put_output(&self, output: &UnspentOutput) -> StoreResult<()> {
        put(&self.outputs, output.id.as_hash().as_bytes(), output)?;
        let index = key(&[output.owner.as_bytes(), output.id.as_hash().as_bytes()]);
        if output.spent {
            self.unspent_by_owner.remove(index).map_err(backend)?;
        } else {
            self.unspent_by_owner.insert(index, EMPTY).map_err(backend)?;
        }
        Ok(())
    }

    fn output(&self, id: &OutputId) -> StoreResult<Option<UnspentOutput>> {
        get(&self.outputs, id.as_hash().as_bytes())
    }

    fn unspent_outputs(&self, owner: &Address) -> StoreResult<Vec<UnspentOutput>> {
        let mut outputs = Vec::new();
        for suffix in index_scan(&self.unspent_by_owner, owner.as_bytes())? {
            if let Some(output) = self.output(&OutputId::from(hash(&suffix)?))? {
                if !output.spent {
                    outputs.push(output);
                }
            }
        }
        outputs.sort_by(output_order);
        Ok(outputs)
    }

    fn all_unspent_outputs(&self) -> StoreResult<Vec<UnspentOutput>> {
        let mut outputs = values::<UnspentOutput>(&self.outputs)?
            .into_iter()
            .filter(|o| !o.spent)
            .collect::<Vec<UnspentOutput>>();
        outputs.sort_by(output_order);
        Ok(outputs)
    }

    fn spend_output(&self, id: &OutputId, spending_tx: &Hash, at: i64) -> StoreResult<SpendOutcome> {
        let id_key = id.as_hash().as_bytes();
        loop {
            let current = match self.outputs.get(id_key).map_err(backend)? {
                Some(bytes) => bytes,
                None => return Ok(SpendOutcome::Missing),
            };
            let mut output: UnspentOutput = decode(&current)?;
            if output.spent {
                return Ok(SpendOutcome::AlreadySpent(output));
            }
            output.spent = true;
            output.spent_by = Some(*spending_tx);
            output.spent_at = Some(at);

            let swapped = self
                .outputs
                .compare_and_swap(id_key, Some(current), Some(encode(&output)?))
                .map_err(backend)?;
            if swapped.is_ok() {
                self.unspent_by_owner
                    .remove(key(&[output.owner.as_bytes(), id_key]))
                    .map_err(backend)?;
                return Ok(SpendOutcome::Spent(output));
            }
        }
    }

    fn put_account(&self, account: &Account) -> StoreResult<()> {
        put(&self.accounts, account.address.as_bytes(), account)
    }

    fn account(&self, address: &Address) -> StoreResult<Option<Account>> {
        get(&self.accounts, address.as_bytes())
    }

    fn accounts(&self) -> StoreResult<Vec<Account>> {
        let mut accounts: Vec<Account> = values(&self.accounts)?;
        accounts.sort_by_key(|a| (a.created_at, a.address));
        Ok(accounts)
    }

    fn put_levy(&self, record: &LevyRecord) -> StoreResult<()> {
        let period = record.period.to_string();
        put(
            &self.levies,
            &key(&[record.address.as_bytes(), period.as_bytes()]),
            record,
        )
    }

    fn levies(&self, address: &Address) -> StoreResult<Vec<LevyRecord>> {
        self.levies
            .scan_prefix(address.as_bytes())
            .values()
            .map(|bytes| decode(&bytes.map_err(backend)?))
            .collect()
    }

    fn put_event(&self, event: &Event) -> StoreResult<()> {
        put(
            &self.events,
            &key(&[&timestamp_key(event.timestamp)[..], event.id.as_bytes()]),
            event,
        )
    }

    fn events(&self, kind: Option<EventKind>, limit: usize) -> StoreResult<Vec<Event>> {
        let mut events = Vec::new();
        for bytes in self.events.iter().values().rev() {
            let event: Event = decode(&bytes.map_err(backend)?)?;
            if kind.map_or(true, |k| event.kind == k) {
                events.push(event);
                if events.len() == limit {
                    break;
                }
            }
        }
        Ok(events)
    }
}
