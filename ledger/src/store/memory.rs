use std::collections::HashMap;

use parking_lot::Mutex;
use tally_crypto::Hash;

use super::{output_order, pending_order, SpendOutcome, Store, StoreResult};
use crate::account::{Account, Address};
use crate::block::Block;
use crate::event::{event_order, Event, EventKind};
use crate::levy::{LevyRecord, Period};
use crate::transaction::Transaction;
use crate::utxo::{OutputId, UnspentOutput};

#[derive(Default)]
struct Collections {
    blocks: HashMap<Hash, Block>,
    transactions: HashMap<Hash, Transaction>,
    pending: HashMap<Hash, Transaction>,
    outputs: HashMap<OutputId, UnspentOutput>,
    accounts: HashMap<Address, Account>,
    levies: HashMap<(Address, Period), LevyRecord>,
    events: HashMap<Hash, Event>,
}

/// Non-durable backend. All collections sit behind a single mutex.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl Store for MemoryStore {
    fn put_block(&self, block: &Block) -> StoreResult<()> {
        self.inner.lock().blocks.insert(block.hash, block.clone());
        Ok(())
    }

    fn block(&self, hash: &Hash) -> StoreResult<Option<Block>> {
        Ok(self.inner.lock().blocks.get(hash).cloned())
    }

    fn blocks(&self) -> StoreResult<Vec<Block>> {
        let mut blocks = self
            .inner
            .lock()
            .blocks
            .values()
            .cloned()
            .collect::<Vec<Block>>();
        blocks.sort_by_key(|b| b.index);
        Ok(blocks)
    }

    fn put_transaction(&self, tx: &Transaction) -> StoreResult<()> {
        self.inner.lock().transactions.insert(tx.hash, tx.clone());
        Ok(())
    }

    fn transaction(&self, hash: &Hash) -> StoreResult<Option<Transaction>> {
        Ok(self.inner.lock().transactions.get(hash).cloned())
    }

    fn transactions_by_address(&self, address: &Address) -> StoreResult<Vec<Transaction>> {
        let mut found = self
            .inner
            .lock()
            .transactions
            .values()
            .filter(|tx| tx.involves(address))
            .cloned()
            .collect::<Vec<Transaction>>();
        found.sort_by(|a, b| pending_order(b, a));
        Ok(found)
    }

    fn put_pending(&self, tx: &Transaction) -> StoreResult<()> {
        self.inner.lock().pending.insert(tx.hash, tx.clone());
        Ok(())
    }

    fn pending(&self) -> StoreResult<Vec<Transaction>> {
        let mut pending = self
            .inner
            .lock()
            .pending
            .values()
            .cloned()
            .collect::<Vec<Transaction>>();
        pending.sort_by(pending_order);
        Ok(pending)
    }

    fn remove_pending(&self, hash: &Hash) -> StoreResult<()> {
        self.inner.lock().pending.remove(hash);
        Ok(())
    }

    fn put_output(&self, output: &UnspentOutput) -> StoreResult<()> {
        self.inner.lock().outputs.insert(output.id, output.clone());
        Ok(())
    }

    fn output(&self, id: &OutputId) -> StoreResult<Option<UnspentOutput>> {
        Ok(self.inner.lock().outputs.get(id).cloned())
    }

    fn unspent_outputs(&self, owner: &Address) -> StoreResult<Vec<UnspentOutput>> {
        let mut outputs = self
            .inner
            .lock()
            .outputs
            .values()
            .filter(|o| !o.spent && o.owner == *owner)
            .cloned()
            .collect::<Vec<UnspentOutput>>();
        outputs.sort_by(output_order);
        Ok(outputs)
    }

    fn all_unspent_outputs(&self) -> StoreResult<Vec<UnspentOutput>> {
        let mut outputs = self
            .inner
            .lock()
            .outputs
            .values()
            .filter(|o| !o.spent)
            .cloned()
            .collect::<Vec<UnspentOutput>>();
        outputs.sort_by(output_order);
        Ok(outputs)
    }

    fn spend_output(&self, id: &OutputId, spending_tx: &Hash, at: i64) -> StoreResult<SpendOutcome> {
        let mut inner = self.inner.lock();
        let outcome = match inner.outputs.get_mut(id) {
            None => SpendOutcome::Missing,
            Some(output) if output.spent => SpendOutcome::AlreadySpent(output.clone()),
            Some(output) => {
                output.spent = true;
                output.spent_by = Some(*spending_tx);
                output.spent_at = Some(at);
                SpendOutcome::Spent(output.clone())
            }
        };
        Ok(outcome)
    }

    fn put_account(&self, account: &Account) -> StoreResult<()> {
        self.inner
            .lock()
            .accounts
            .insert(account.address, account.clone());
        Ok(())
    }

    fn account(&self, address: &Address) -> StoreResult<Option<Account>> {
        Ok(self.inner.lock().accounts.get(address).cloned())
    }

    fn accounts(&self) -> StoreResult<Vec<Account>> {
        let mut accounts = self
            .inner
            .lock()
            .accounts
            .values()
            .cloned()
            .collect::<Vec<Account>>();
        accounts.sort_by_key(|a| (a.created_at, a.address));
        Ok(accounts)
    }

    fn put_levy(&self, record: &LevyRecord) -> StoreResult<()> {
        self.inner
            .lock()
            .levies
            .insert((record.address, record.period), record.clone());
        Ok(())
    }

    fn levies(&self, address: &Address) -> StoreResult<Vec<LevyRecord>> {
        let mut records = self
            .inner
            .lock()
            .levies
            .values()
            .filter(|r| r.address == *address)
            .cloned()
            .collect::<Vec<LevyRecord>>();
        records.sort_by_key(|r| r.period);
        Ok(records)
    }

    fn put_event(&self, event: &Event) -> StoreResult<()> {
        self.inner.lock().events.insert(event.id, event.clone());
        Ok(())
    }

    fn events(&self, kind: Option<EventKind>, limit: usize) -> StoreResult<Vec<Event>> {
        let mut events = self
            .inner
            .lock()
            .events
            .values()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .cloned()
            .collect::<Vec<Event>>();
        events.sort_by(event_order);
        if limit > 0 {
            events.truncate(limit);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{TransactionKind, TransactionOutput};
    use tally_crypto::ed25519::Ed25519KeyPair;
    use tally_crypto::traits::Keypair;

    fn address() -> Address {
        Address::from(Ed25519KeyPair::generate().public)
    }

    #[test]
    fn test_spend_output_is_conditional() {
        let store = MemoryStore::new();
        let output = UnspentOutput::new(
            &Hash::hash(b"tx"),
            0,
            &TransactionOutput {
                owner: address(),
                amount: 3,
            },
            0,
        );
        store.put_output(&output).unwrap();

        let first = store.spend_output(&output.id, &Hash::hash(b"a"), 1).unwrap();
        assert!(matches!(first, SpendOutcome::Spent(_)));
        let second = store.spend_output(&output.id, &Hash::hash(b"b"), 2).unwrap();
        match second {
            SpendOutcome::AlreadySpent(o) => assert_eq!(Some(Hash::hash(b"a")), o.spent_by),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_pending_round_trip() {
        let store = MemoryStore::new();
        let tx = Transaction::issuance(TransactionKind::Genesis, &address(), 1, None).unwrap();
        store.put_pending(&tx).unwrap();
        store.put_pending(&tx).unwrap();
        assert_eq!(vec![tx.clone()], store.pending().unwrap());
        store.remove_pending(&tx.hash).unwrap();
        assert!(store.pending().unwrap().is_empty());
    }

    #[test]
    fn test_transactions_by_address_newest_first() {
        let store = MemoryStore::new();
        let owner = address();
        let mut older = Transaction::issuance(TransactionKind::Genesis, &owner, 1, None).unwrap();
        older.payload.timestamp = 1;
        let mut newer = Transaction::issuance(TransactionKind::Genesis, &owner, 2, None).unwrap();
        newer.payload.timestamp = 2;
        store.put_transaction(&older).unwrap();
        store.put_transaction(&newer).unwrap();
        store
            .put_transaction(&Transaction::issuance(TransactionKind::Genesis, &address(), 3, None).unwrap())
            .unwrap();

        let found = store.transactions_by_address(&owner).unwrap();
        assert_eq!(2, found.len());
        assert_eq!(newer.hash, found[0].hash);
    }
}
