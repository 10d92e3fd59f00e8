use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use tally_crypto::seal::VaultKey;
use tally_crypto::Hash;
use tally_ledger::account::{Account, Address};
use tally_ledger::block::Block;
use tally_ledger::event::{Event, EventKind};
use tally_ledger::levy::LevyRecord;
use tally_ledger::store::memory::MemoryStore;
use tally_ledger::store::{SpendOutcome, Store, StoreError, StoreResult};
use tally_ledger::transaction::{Transaction, TransactionKind, TransactionStatus};
use tally_ledger::utxo::{OutputId, UnspentOutput};
use tally_ledger::{Ledger, LedgerConfig, LedgerError};

fn init_logger() {
    let _ = TermLogger::init(
        LevelFilter::Debug,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}

fn config(starting_balance: u64) -> LedgerConfig {
    LedgerConfig {
        difficulty: 1,
        starting_balance,
        ..LedgerConfig::default()
    }
}

#[test]
fn test_transfer_splits_outputs() {
    init_logger();
    let ledger = Ledger::open(MemoryStore::new(), config(1000), VaultKey::generate()).unwrap();
    let (alice, alice_keys) = ledger.open_account().unwrap();
    let (bob, _) = Account::provision(&VaultKey::generate());
    ledger.store().put_account(&bob).unwrap();

    let tx = ledger
        .transfer(
            &alice.address,
            &bob.address,
            300,
            Some(String::from("rent")),
            &alice_keys.private,
        )
        .unwrap();

    assert_eq!(TransactionStatus::Confirmed, tx.status);
    assert_eq!(Some(ledger.latest_block().unwrap().hash), tx.block_hash);
    assert_eq!(700, ledger.balance(&alice.address).unwrap());
    assert_eq!(300, ledger.balance(&bob.address).unwrap());

    let spent = ledger
        .store()
        .output(&tx.payload.inputs[0])
        .unwrap()
        .unwrap();
    assert!(spent.spent);
    assert_eq!(1000, spent.amount);
    assert_eq!(Some(tx.hash), spent.spent_by);

    let alice_outputs = ledger.outputs(&alice.address).unwrap();
    assert_eq!(1, alice_outputs.len());
    assert_eq!(700, alice_outputs[0].amount);
    let bob_outputs = ledger.outputs(&bob.address).unwrap();
    assert_eq!(1, bob_outputs.len());
    assert_eq!(300, bob_outputs[0].amount);
    assert_eq!(tx.hash, bob_outputs[0].source_tx);

    let mined = ledger.events(Some(EventKind::Mining), 1).unwrap();
    assert_eq!(tx.block_hash, mined[0].block_hash);

    assert_eq!(1000, ledger.total_supply().unwrap());
    assert!(ledger.pending().is_empty());
    assert!(ledger.validate_chain());
}

#[test]
fn test_insufficient_funds_leaves_state_untouched() {
    init_logger();
    let ledger = Ledger::open(MemoryStore::new(), config(50), VaultKey::generate()).unwrap();
    let (alice, alice_keys) = ledger.open_account().unwrap();
    let (bob, _) = ledger.open_account().unwrap();
    let chain = ledger.chain();

    let result = ledger.transfer(&alice.address, &bob.address, 100, None, &alice_keys.private);
    assert!(matches!(
        result,
        Err(LedgerError::InsufficientFunds { have: 50, need: 100 })
    ));
    assert!(result.unwrap_err().is_rejection());

    assert_eq!(chain, ledger.chain());
    assert!(ledger.pending().is_empty());
    assert_eq!(50, ledger.balance(&alice.address).unwrap());
    assert_eq!(50, ledger.balance(&bob.address).unwrap());
    assert_eq!(100, ledger.total_supply().unwrap());
}

#[test]
fn test_supply_is_conserved_across_transfers() {
    init_logger();
    let ledger = Ledger::open(MemoryStore::new(), config(1000), VaultKey::generate()).unwrap();
    let accounts = (0..3)
        .map(|_| ledger.open_account().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(3000, ledger.total_supply().unwrap());

    for (i, amount) in [120u64, 45, 999, 3, 1].iter().enumerate() {
        let (sender, keys) = &accounts[i % 3];
        let (receiver, _) = &accounts[(i + 1) % 3];
        let _ = ledger.transfer(&sender.address, &receiver.address, *amount, None, &keys.private);
        assert_eq!(3000, ledger.total_supply().unwrap());
    }

    let total = accounts
        .iter()
        .map(|(a, _)| ledger.balance(&a.address).unwrap())
        .sum::<u64>();
    assert_eq!(3000, total);
    assert!(ledger.validate_chain());
}

#[test]
fn test_history_and_lookup() {
    init_logger();
    let ledger = Ledger::open(MemoryStore::new(), config(1000), VaultKey::generate()).unwrap();
    let (alice, alice_keys) = ledger.open_account().unwrap();
    let (bob, _) = ledger.open_account().unwrap();
    let first = ledger
        .transfer(&alice.address, &bob.address, 10, None, &alice_keys.private)
        .unwrap();
    let second = ledger
        .transfer(&alice.address, &bob.address, 20, None, &alice_keys.private)
        .unwrap();

    let history = ledger.history(&alice.address).unwrap();
    assert_eq!(3, history.len());
    assert_eq!(second.hash, history[0].hash);
    assert_eq!(first.hash, history[1].hash);
    assert_eq!(TransactionKind::Genesis, history[2].payload.kind);
    assert_eq!(first, ledger.transaction(&first.hash).unwrap());
}

#[test]
fn test_tampered_store_fails_validation() {
    init_logger();
    let vault = VaultKey::generate();
    let ledger = Ledger::open(MemoryStore::new(), config(1000), VaultKey::generate()).unwrap();
    let (alice, alice_keys) = ledger.open_account().unwrap();
    let (bob, _) = ledger.open_account().unwrap();
    ledger
        .transfer(&alice.address, &bob.address, 300, None, &alice_keys.private)
        .unwrap();
    assert!(ledger.validate_chain());

    let mut block = ledger.latest_block().unwrap();
    block.transactions[0].payload.outputs[0].amount = 3000;
    ledger.store().put_block(&block).unwrap();

    let reopened = Ledger::open(ledger.into_store(), config(1000), vault).unwrap();
    assert!(!reopened.validate_chain());
    assert!(matches!(
        reopened.verify_chain(),
        Err(LedgerError::ChainIntegrityViolation { index: 3, .. })
    ));
}

#[test]
fn test_concurrent_double_spend() {
    init_logger();
    let ledger = Arc::new(
        Ledger::open(MemoryStore::new(), config(1000), VaultKey::generate()).unwrap(),
    );
    let (alice, alice_keys) = ledger.open_account().unwrap();
    let (bob, _) = ledger.open_account().unwrap();
    let (carol, _) = ledger.open_account().unwrap();
    let alice_keys = Arc::new(alice_keys);

    let handles = [bob.address, carol.address]
        .iter()
        .map(|receiver| {
            let ledger = Arc::clone(&ledger);
            let keys = Arc::clone(&alice_keys);
            let sender = alice.address;
            let receiver = *receiver;
            thread::spawn(move || ledger.transfer(&sender, &receiver, 700, None, &keys.private))
        })
        .collect::<Vec<_>>();
    let results = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect::<Vec<_>>();

    assert_eq!(1, results.iter().filter(|r| r.is_ok()).count());
    assert!(results.iter().any(|r| matches!(
        r,
        Err(LedgerError::InsufficientFunds { .. }) | Err(LedgerError::AlreadySpent(_))
    )));
    assert_eq!(300, ledger.balance(&alice.address).unwrap());
    assert_eq!(3000, ledger.total_supply().unwrap());
    assert!(ledger.validate_chain());
}

/// Delegates to a [`MemoryStore`] and fails block writes while `fail` is set.
struct FlakyStore {
    inner: MemoryStore,
    fail: AtomicBool,
}

impl Store for FlakyStore {
    fn put_block(&self, block: &Block) -> StoreResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(String::from("disk unavailable")));
        }
        self.inner.put_block(block)
    }

    fn block(&self, hash: &Hash) -> StoreResult<Option<Block>> {
        self.inner.block(hash)
    }

    fn blocks(&self) -> StoreResult<Vec<Block>> {
        self.inner.blocks()
    }

    fn put_transaction(&self, tx: &Transaction) -> StoreResult<()> {
        self.inner.put_transaction(tx)
    }

    fn transaction(&self, hash: &Hash) -> StoreResult<Option<Transaction>> {
        self.inner.transaction(hash)
    }

    fn transactions_by_address(&self, address: &Address) -> StoreResult<Vec<Transaction>> {
        self.inner.transactions_by_address(address)
    }

    fn put_pending(&self, tx: &Transaction) -> StoreResult<()> {
        self.inner.put_pending(tx)
    }

    fn pending(&self) -> StoreResult<Vec<Transaction>> {
        self.inner.pending()
    }

    fn remove_pending(&self, hash: &Hash) -> StoreResult<()> {
        self.inner.remove_pending(hash)
    }

    fn put_output(&self, output: &UnspentOutput) -> StoreResult<()> {
        self.inner.put_output(output)
    }

    fn output(&self, id: &OutputId) -> StoreResult<Option<UnspentOutput>> {
        self.inner.output(id)
    }

    fn unspent_outputs(&self, owner: &Address) -> StoreResult<Vec<UnspentOutput>> {
        self.inner.unspent_outputs(owner)
    }

    fn all_unspent_outputs(&self) -> StoreResult<Vec<UnspentOutput>> {
        self.inner.all_unspent_outputs()
    }

    fn spend_output(&self, id: &OutputId, spending_tx: &Hash, at: i64) -> StoreResult<SpendOutcome> {
        self.inner.spend_output(id, spending_tx, at)
    }

    fn put_account(&self, account: &Account) -> StoreResult<()> {
        self.inner.put_account(account)
    }

    fn account(&self, address: &Address) -> StoreResult<Option<Account>> {
        self.inner.account(address)
    }

    fn accounts(&self) -> StoreResult<Vec<Account>> {
        self.inner.accounts()
    }

    fn put_levy(&self, record: &LevyRecord) -> StoreResult<()> {
        self.inner.put_levy(record)
    }

    fn levies(&self, address: &Address) -> StoreResult<Vec<LevyRecord>> {
        self.inner.levies(address)
    }

    fn put_event(&self, event: &Event) -> StoreResult<()> {
        self.inner.put_event(event)
    }

    fn events(&self, kind: Option<EventKind>, limit: usize) -> StoreResult<Vec<Event>> {
        self.inner.events(kind, limit)
    }
}

#[test]
fn test_persistence_failure_is_retryable() {
    init_logger();
    let store = FlakyStore {
        inner: MemoryStore::new(),
        fail: AtomicBool::new(false),
    };
    let ledger = Ledger::open(store, config(1000), VaultKey::generate()).unwrap();
    let (alice, alice_keys) = ledger.open_account().unwrap();
    let (bob, _) = ledger.open_account().unwrap();
    let height = ledger.height();

    ledger.store().fail.store(true, Ordering::SeqCst);
    let result = ledger.transfer(&alice.address, &bob.address, 300, None, &alice_keys.private);
    assert!(matches!(result, Err(LedgerError::PersistenceFailure(_))));
    assert!(!result.unwrap_err().is_rejection());
    assert_eq!(height, ledger.height());
    assert_eq!(1, ledger.pending().len());

    ledger.store().fail.store(false, Ordering::SeqCst);
    let block = ledger.mine(None).unwrap();
    assert_eq!(height, block.index);
    assert!(ledger.pending().is_empty());
    assert_eq!(700, ledger.balance(&alice.address).unwrap());
    assert_eq!(300 + 1000, ledger.balance(&bob.address).unwrap());
    assert_eq!(2000, ledger.total_supply().unwrap());
    assert!(ledger.validate_chain());
}

#[test]
fn test_failed_block_write_survives_restart() {
    init_logger();
    let store = FlakyStore {
        inner: MemoryStore::new(),
        fail: AtomicBool::new(false),
    };
    let ledger = Ledger::open(store, config(1000), VaultKey::generate()).unwrap();
    let (alice, alice_keys) = ledger.open_account().unwrap();
    let (bob, _) = ledger.open_account().unwrap();
    let height = ledger.height();

    ledger.store().fail.store(true, Ordering::SeqCst);
    let result = ledger.transfer(&alice.address, &bob.address, 300, None, &alice_keys.private);
    assert!(matches!(result, Err(LedgerError::PersistenceFailure(_))));
    let hash = ledger.pending()[0].hash;

    let store = ledger.into_store();
    store.fail.store(false, Ordering::SeqCst);
    let reopened = Ledger::open(store, config(1000), VaultKey::generate()).unwrap();
    assert_eq!(height, reopened.height());
    assert_eq!(vec![hash], reopened.pending().iter().map(|tx| tx.hash).collect::<Vec<_>>());

    let block = reopened.mine(None).unwrap();
    assert_eq!(height, block.index);
    let tx = reopened.transaction(&hash).unwrap();
    assert_eq!(TransactionStatus::Confirmed, tx.status);
    assert_eq!(Some(block.hash), tx.block_hash);
    assert!(reopened.pending().is_empty());
    assert_eq!(700, reopened.balance(&alice.address).unwrap());
    assert_eq!(1300, reopened.balance(&bob.address).unwrap());
    assert_eq!(2000, reopened.total_supply().unwrap());
    assert!(reopened.validate_chain());
}

#[test]
fn test_mining_timeout_keeps_pool() {
    init_logger();
    let config = LedgerConfig {
        difficulty: 64,
        mining_timeout_secs: Some(0),
        ..LedgerConfig::default()
    };
    let ledger = Ledger::open(MemoryStore::new(), config, VaultKey::generate()).unwrap();

    assert!(matches!(
        ledger.open_account(),
        Err(LedgerError::MiningTimedOut(_))
    ));
    assert_eq!(1, ledger.height());
    assert_eq!(1, ledger.pending().len());
    assert_eq!(0, ledger.total_supply().unwrap());
}

#[test]
fn test_issuance_cannot_be_submitted() {
    init_logger();
    let ledger = Ledger::open(MemoryStore::new(), config(1000), VaultKey::generate()).unwrap();
    let (alice, _) = ledger.open_account().unwrap();
    let mint = Transaction::issuance(TransactionKind::MiningReward, &alice.address, 10, None).unwrap();
    assert!(matches!(
        ledger.commit(&mint),
        Err(LedgerError::InvalidInput(_))
    ));
    assert!(ledger.pending().is_empty());
}
