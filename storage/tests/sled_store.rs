use std::sync::Arc;
use std::thread;

use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use tally_crypto::ed25519::Ed25519KeyPair;
use tally_crypto::seal::VaultKey;
use tally_crypto::traits::Keypair;
use tally_crypto::Hash;
use tally_ledger::account::Address;
use tally_ledger::event::{Event, EventKind};
use tally_ledger::levy::{LevyJob, Period};
use tally_ledger::store::{SpendOutcome, Store};
use tally_ledger::transaction::TransactionOutput;
use tally_ledger::utxo::{OutputId, UnspentOutput};
use tally_ledger::{Ledger, LedgerConfig};
use tally_storage::SledStore;
use tempdir::TempDir;

fn init_logger() {
    let _ = TermLogger::init(
        LevelFilter::Debug,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}

fn config() -> LedgerConfig {
    LedgerConfig {
        difficulty: 1,
        starting_balance: 200,
        ..LedgerConfig::default()
    }
}

#[test]
fn test_ledger_survives_reopen() {
    init_logger();
    let dir = TempDir::new("tally_ledger_survives_reopen").unwrap();
    let vault_hex = "11".repeat(32);

    let (alice, bob, chain, tx_hash) = {
        let store = SledStore::open(dir.path()).unwrap();
        let ledger = Ledger::open(store, config(), VaultKey::from_hex(&vault_hex).unwrap()).unwrap();
        let (alice, alice_keys) = ledger.open_account().unwrap();
        let (bob, _) = ledger.open_account().unwrap();
        let tx = ledger
            .transfer(&alice.address, &bob.address, 50, None, &alice_keys.private)
            .unwrap();
        LevyJob::new(&ledger)
            .run(Period::new(2021, 6).unwrap())
            .unwrap();
        (alice, bob, ledger.chain(), tx.hash)
    };

    let store = SledStore::open(dir.path()).unwrap();
    let ledger = Ledger::open(store, config(), VaultKey::from_hex(&vault_hex).unwrap()).unwrap();
    assert_eq!(chain, ledger.chain());
    assert!(ledger.validate_chain());
    assert!(ledger.pending().is_empty());

    // 150 - 3 and 250 - 6 after the levy.
    assert_eq!(147, ledger.balance(&alice.address).unwrap());
    assert_eq!(244, ledger.balance(&bob.address).unwrap());
    assert_eq!(9, ledger.balance(&ledger.collector()).unwrap());
    assert_eq!(400, ledger.total_supply().unwrap());

    assert_eq!(tx_hash, ledger.history(&bob.address).unwrap()[1].hash);
    assert_eq!(1, ledger.levies(&alice.address).unwrap().len());
    assert_eq!(
        Some(Period::new(2021, 6).unwrap()),
        ledger.account(&alice.address).unwrap().levy.last_period
    );
    assert!(ledger
        .block_by_hash(&chain.last().unwrap().hash)
        .is_ok());
}

#[test]
fn test_spend_output_single_winner() {
    init_logger();
    let store = Arc::new(SledStore::open_temporary().unwrap());
    let owner = Address::from(Ed25519KeyPair::generate().public);
    let output = UnspentOutput::new(
        &Hash::hash(b"source"),
        0,
        &TransactionOutput { owner, amount: 10 },
        0,
    );
    store.put_output(&output).unwrap();
    assert_eq!(vec![output.clone()], store.unspent_outputs(&owner).unwrap());

    let handles = (0..8u8)
        .map(|i| {
            let store = Arc::clone(&store);
            let id = output.id;
            thread::spawn(move || store.spend_output(&id, &Hash::hash([i]), i as i64).unwrap())
        })
        .collect::<Vec<_>>();
    let outcomes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect::<Vec<_>>();

    assert_eq!(
        1,
        outcomes
            .iter()
            .filter(|o| matches!(o, SpendOutcome::Spent(_)))
            .count()
    );
    assert!(store.unspent_outputs(&owner).unwrap().is_empty());
    assert!(store.all_unspent_outputs().unwrap().is_empty());
    assert!(store.output(&output.id).unwrap().unwrap().spent);
}

#[test]
fn test_missing_output() {
    let store = SledStore::open_temporary().unwrap();
    let id = OutputId::derive(&Hash::hash(b"nothing"), 0);
    assert_eq!(
        SpendOutcome::Missing,
        store.spend_output(&id, &Hash::hash(b"tx"), 0).unwrap()
    );
}

#[test]
fn test_events_newest_first_across_reopen() {
    init_logger();
    let dir = TempDir::new("tally_events_newest_first").unwrap();
    let at = |kind: EventKind, message: &str, timestamp: i64| {
        let mut event = Event::new(kind, message);
        event.timestamp = timestamp;
        event
    };

    {
        let store = SledStore::open(dir.path()).unwrap();
        store.put_event(&at(EventKind::Mining, "block 1", 100)).unwrap();
        store.put_event(&at(EventKind::LevyError, "levy failed", -5)).unwrap();
        store.put_event(&at(EventKind::Mining, "block 2", 300)).unwrap();
        store.flush().unwrap();
    }

    let store = SledStore::open(dir.path()).unwrap();
    store.put_event(&at(EventKind::ValidationFailure, "bad signature", 200)).unwrap();

    let messages = |events: Vec<Event>| events.into_iter().map(|e| e.message).collect::<Vec<_>>();
    assert_eq!(
        vec!["block 2", "bad signature", "block 1", "levy failed"],
        messages(store.events(None, 0).unwrap())
    );
    assert_eq!(vec!["block 2", "bad signature"], messages(store.events(None, 2).unwrap()));
    assert_eq!(
        vec!["block 2", "block 1"],
        messages(store.events(Some(EventKind::Mining), 0).unwrap())
    );
    assert_eq!(
        vec!["levy failed"],
        messages(store.events(Some(EventKind::LevyError), 5).unwrap())
    );
}
