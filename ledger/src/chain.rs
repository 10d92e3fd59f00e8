//! Chain state: the ordered blocks, the pending pool and the miner.
//!
//! Blocks and the pool are cached in memory behind one reader/writer lock
//! and mirrored in the [`Store`]. A mining cycle snapshots the pool and the
//! tip under the read lock, searches the proof of work with no chain lock
//! held, and appends under the write lock only if the tip did not move.

use std::collections::HashSet;
use std::time::Instant;

use log::{debug, error, info};
use parking_lot::{Mutex, RwLock};
use tally_crypto::ed25519::{Ed25519KeyPair, Ed25519PrivateKey};
use tally_crypto::seal::VaultKey;
use tally_crypto::Hash;

use crate::account::{Account, Address};
use crate::block::Block;
use crate::builder::TransactionBuilder;
use crate::config::LedgerConfig;
use crate::error::{IntegrityFault, LedgerError, Missing, Result};
use crate::event::{self, Event, EventKind};
use crate::levy::LevyRecord;
use crate::store::Store;
use crate::transaction::{Transaction, TransactionKind, TransactionStatus};
use crate::utxo::{UnspentOutput, UtxoSet};

struct ChainState {
    blocks: Vec<Block>,
    pending: Vec<Transaction>,
}

pub struct Ledger<S: Store> {
    store: S,
    config: LedgerConfig,
    vault: VaultKey,
    collector: Address,
    state: RwLock<ChainState>,
    mining: Mutex<()>,
    levying: Mutex<()>,
}

impl<S: Store> Ledger<S> {
    /// Loads the chain from `store`, seeding it with a genesis block and a
    /// collector account when the store holds no blocks.
    pub fn open(store: S, config: LedgerConfig, vault: VaultKey) -> Result<Self> {
        config.validate()?;

        let mut blocks = store.blocks()?;
        if blocks.is_empty() {
            let (collector, _) = Account::provision(&vault);
            store.put_account(&collector)?;

            let mut genesis = Block::genesis(&collector.address)?;
            for tx in genesis.transactions.iter_mut() {
                tx.status = TransactionStatus::Confirmed;
                tx.block_hash = Some(genesis.hash);
                store.put_transaction(tx)?;
            }
            store.put_block(&genesis)?;
            info!(
                "Created genesis block {} with collector {}",
                genesis.hash, collector.address
            );
            blocks.push(genesis);
        }

        let genesis_collector = blocks[0]
            .transactions
            .first()
            .filter(|tx| tx.payload.kind == TransactionKind::Genesis)
            .map(|tx| tx.payload.receiver)
            .ok_or(LedgerError::ChainIntegrityViolation {
                index: 0,
                fault: IntegrityFault::NoGenesis,
            })?;
        let collector = config.levy_collector.unwrap_or(genesis_collector);
        for block in blocks.iter().skip(1) {
            confirm(&store, block)?;
        }
        let pending = store.pending()?;
        info!(
            "Loaded chain of {} blocks with {} pending transactions",
            blocks.len(),
            pending.len()
        );

        Ok(Ledger {
            store,
            config,
            vault,
            collector,
            state: RwLock::new(ChainState { blocks, pending }),
            mining: Mutex::new(()),
            levying: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Closes the ledger and hands back its store.
    pub fn into_store(self) -> S {
        self.store
    }

    pub fn collector(&self) -> Address {
        self.collector
    }

    /// Provisions a key pair, stores the account with its key sealed, and
    /// mints the configured starting balance through a genesis transaction.
    pub fn open_account(&self) -> Result<(Account, Ed25519KeyPair)> {
        let (account, keypair) = Account::provision(&self.vault);
        self.store.put_account(&account)?;
        info!("Opened account {}", account.address);

        if self.config.starting_balance > 0 {
            let mint = Transaction::issuance(
                TransactionKind::Genesis,
                &account.address,
                self.config.starting_balance,
                Some(String::from("starting balance")),
            )?;
            {
                let mut state = self.state.write();
                TransactionBuilder::new(&self.store, &self.config).enqueue(&mint)?;
                state.pending.push(mint.clone());
            }
            self.mine_committed(&mint.hash, None)?;
        }
        Ok((account, keypair))
    }

    /// Builds, commits and mines a transfer. The returned transaction
    /// carries its confirmation.
    pub fn transfer(
        &self,
        sender: &Address,
        receiver: &Address,
        amount: u64,
        note: Option<String>,
        private_key: &Ed25519PrivateKey,
    ) -> Result<Transaction> {
        self.submit(
            TransactionKind::Transfer,
            sender,
            receiver,
            amount,
            note,
            private_key,
        )
    }

    pub(crate) fn submit(
        &self,
        kind: TransactionKind,
        sender: &Address,
        receiver: &Address,
        amount: u64,
        note: Option<String>,
        private_key: &Ed25519PrivateKey,
    ) -> Result<Transaction> {
        let tx = {
            let mut state = self.state.write();
            let builder = TransactionBuilder::new(&self.store, &self.config);
            let tx = builder.build(kind, sender, receiver, amount, note, private_key)?;
            builder.commit(&tx)?;
            state.pending.push(tx.clone());
            tx
        };
        self.mine_committed(&tx.hash, None)
    }

    /// Queues an externally built transaction.
    pub fn commit(&self, tx: &Transaction) -> Result<()> {
        let mut state = self.state.write();
        TransactionBuilder::new(&self.store, &self.config).commit(tx)?;
        state.pending.push(tx.clone());
        Ok(())
    }

    pub fn validate_transaction(&self, tx: &Transaction) -> Result<()> {
        let _state = self.state.read();
        TransactionBuilder::new(&self.store, &self.config).validate(tx)
    }

    fn mine_committed(&self, hash: &Hash, miner: Option<Address>) -> Result<Transaction> {
        match self.mine(miner) {
            // Another cycle drained the pool first.
            Ok(_) | Err(LedgerError::NothingToMine) => {}
            Err(e) => return Err(e),
        }
        self.transaction(hash)
    }

    /// Runs one mining cycle over the whole pending pool.
    pub fn mine(&self, miner: Option<Address>) -> Result<Block> {
        let _cycle = self.mining.lock();

        let (mut transactions, tip) = {
            let state = self.state.read();
            if state.pending.is_empty() {
                return Err(LedgerError::NothingToMine);
            }
            let tip = state
                .blocks
                .last()
                .cloned()
                .ok_or(LedgerError::ChainIntegrityViolation {
                    index: 0,
                    fault: IntegrityFault::NoGenesis,
                })?;
            (state.pending.clone(), tip)
        };

        if let (Some(miner), true) = (miner, self.config.mining_reward > 0) {
            transactions.push(Transaction::issuance_at(
                TransactionKind::MiningReward,
                &miner,
                self.config.mining_reward,
                Some(format!("reward for block {}", tip.index + 1)),
                tip.timestamp.saturating_add(1),
            )?);
        }

        let deadline = self.config.mining_timeout().map(|t| Instant::now() + t);
        let candidate = Block::candidate(
            tip.index + 1,
            tip.hash,
            transactions,
            self.config.difficulty,
            miner,
        );
        debug!(
            "Mining block {} with {} transactions at difficulty {}",
            candidate.index,
            candidate.transactions.len(),
            candidate.difficulty
        );
        let mut block = candidate.mine(deadline)?;

        let mut state = self.state.write();
        if state.blocks.last().map(|b| b.hash) != Some(tip.hash) {
            return Err(LedgerError::StaleTip(block.index));
        }
        self.apply(&mut block)?;

        let drained = block
            .transactions
            .iter()
            .map(|tx| tx.hash)
            .collect::<HashSet<Hash>>();
        state.pending.retain(|tx| !drained.contains(&tx.hash));
        state.blocks.push(block.clone());
        event::record(
            &self.store,
            Event::new(
                EventKind::Mining,
                format!(
                    "mined block {} with {} transactions",
                    block.index,
                    block.transactions.len()
                ),
            )
            .with_block(block.hash),
        );
        info!(
            "Mined block {} {} with {} transactions, nonce {}",
            block.index,
            block.hash,
            block.transactions.len(),
            block.nonce
        );
        Ok(block)
    }

    /// Persists the effects of `block`. Every write is an upsert, so a
    /// failed application can be retried with a fresh candidate. The block
    /// is written before its transactions leave the pending pool.
    fn apply(&self, block: &mut Block) -> Result<()> {
        let utxos = UtxoSet::new(&self.store);

        for tx in &block.transactions {
            for id in &tx.payload.inputs {
                let output = self
                    .store
                    .output(id)?
                    .ok_or(LedgerError::UnknownOutput(*id))?;
                if output.spent && output.spent_by != Some(tx.hash) {
                    return Err(LedgerError::AlreadySpent(*id));
                }
            }
        }

        for tx in block.transactions.iter_mut() {
            utxos.mark_all_spent(&tx.payload.inputs, &tx.hash, block.timestamp)?;
            for (index, output) in tx.payload.outputs.iter().enumerate() {
                utxos.create_output(&tx.hash, index as u32, output, block.timestamp)?;
            }
            tx.status = TransactionStatus::Confirmed;
            tx.block_hash = Some(block.hash);
        }
        self.store.put_block(block)?;
        confirm(&self.store, block)
    }

    pub fn chain(&self) -> Vec<Block> {
        self.state.read().blocks.clone()
    }

    pub fn height(&self) -> u64 {
        self.state.read().blocks.len() as u64
    }

    pub fn latest_block(&self) -> Result<Block> {
        self.state
            .read()
            .blocks
            .last()
            .cloned()
            .ok_or(LedgerError::NotFound(Missing::Block(String::from("latest"))))
    }

    pub fn block_by_index(&self, index: u64) -> Result<Block> {
        self.state
            .read()
            .blocks
            .get(index as usize)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(Missing::Block(index.to_string())))
    }

    pub fn block_by_hash(&self, hash: &Hash) -> Result<Block> {
        self.state
            .read()
            .blocks
            .iter()
            .find(|b| b.hash == *hash)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(Missing::Block(hash.to_string())))
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.state.read().pending.clone()
    }

    pub fn validate_chain(&self) -> bool {
        self.verify_chain().is_ok()
    }

    /// Reports the first block that breaks linkage, content hash, proof of
    /// work, height or Merkle root.
    pub fn verify_chain(&self) -> Result<()> {
        let state = self.state.read();
        let result = verify_blocks(&state.blocks);
        if let Err(e) = &result {
            error!("Chain verification failed: {}", e);
            event::record(
                &self.store,
                Event::new(EventKind::IntegrityViolation, e.to_string()),
            );
        }
        result
    }

    pub fn balance(&self, address: &Address) -> Result<u64> {
        let _state = self.state.read();
        UtxoSet::new(&self.store).compute_balance(address)
    }

    pub fn outputs(&self, address: &Address) -> Result<Vec<UnspentOutput>> {
        let _state = self.state.read();
        UtxoSet::new(&self.store).outputs_of(address)
    }

    pub fn total_supply(&self) -> Result<u64> {
        let _state = self.state.read();
        UtxoSet::new(&self.store).total_supply()
    }

    pub fn account(&self, address: &Address) -> Result<Account> {
        self.store
            .account(address)?
            .ok_or(LedgerError::NotFound(Missing::Account(*address)))
    }

    pub fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self.store.accounts()?)
    }

    pub fn transaction(&self, hash: &Hash) -> Result<Transaction> {
        self.store
            .transaction(hash)?
            .ok_or(LedgerError::NotFound(Missing::Transaction(*hash)))
    }

    /// Transactions involving `address`, newest first.
    pub fn history(&self, address: &Address) -> Result<Vec<Transaction>> {
        Ok(self.store.transactions_by_address(address)?)
    }

    pub fn levies(&self, address: &Address) -> Result<Vec<LevyRecord>> {
        Ok(self.store.levies(address)?)
    }

    /// Audit events newest first. A `limit` of 0 returns all of them.
    pub fn events(&self, kind: Option<EventKind>, limit: usize) -> Result<Vec<Event>> {
        Ok(self.store.events(kind, limit)?)
    }

    pub(crate) fn unseal(&self, account: &Account) -> Result<Ed25519PrivateKey> {
        Ok(account.unseal(&self.vault)?)
    }

    pub(crate) fn levy_guard(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.levying.lock()
    }
}

/// Records the transactions of a stored block as confirmed and drops them
/// from the pending pool. Reapplying it to an already confirmed block
/// changes nothing.
fn confirm<S: Store>(store: &S, block: &Block) -> Result<()> {
    for tx in &block.transactions {
        let stored = store.transaction(&tx.hash)?;
        if stored.as_ref().map(|t| t.block_hash) != Some(Some(block.hash)) {
            store.put_transaction(tx)?;
        }
        store.remove_pending(&tx.hash)?;
    }
    Ok(())
}

fn verify_blocks(blocks: &[Block]) -> Result<()> {
    let violation = |index: u64, fault: IntegrityFault| LedgerError::ChainIntegrityViolation { index, fault };

    let genesis = blocks.first().ok_or_else(|| violation(0, IntegrityFault::NoGenesis))?;
    if genesis.index != 0 || !genesis.previous_hash.is_zero() {
        return Err(violation(0, IntegrityFault::NoGenesis));
    }
    if genesis.compute_hash() != genesis.hash {
        return Err(violation(0, IntegrityFault::InvalidHash));
    }

    for (previous, block) in blocks.iter().zip(blocks.iter().skip(1)) {
        let index = previous.index + 1;
        if block.index != index {
            return Err(violation(index, IntegrityFault::InvalidHeight));
        }
        if block.previous_hash != previous.hash {
            return Err(violation(index, IntegrityFault::InvalidPreviousHash));
        }
        if block.compute_hash() != block.hash {
            return Err(violation(index, IntegrityFault::InvalidHash));
        }
        if !block.has_valid_work() {
            return Err(violation(index, IntegrityFault::InsufficientWork(block.difficulty)));
        }
        if block.compute_merkle_root() != block.merkle_root {
            return Err(violation(index, IntegrityFault::InvalidMerkleRoot));
        }
    }
    Ok(())
}
