//! Construction, validation and commitment of transactions.

use std::collections::HashSet;

use log::{debug, warn};
use tally_crypto::ed25519::Ed25519PrivateKey;
use tally_crypto::traits::PrivateKey;

use crate::account::{Account, Address};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Missing, Result};
use crate::event::{self, Event, EventKind};
use crate::store::Store;
use crate::transaction::{now, Transaction, TransactionKind, TransactionOutput, TransactionPayload};
use crate::utxo::UtxoSet;

pub struct TransactionBuilder<'a, S: Store + ?Sized> {
    store: &'a S,
    config: &'a LedgerConfig,
}

impl<'a, S: Store + ?Sized> TransactionBuilder<'a, S> {
    pub fn new(store: &'a S, config: &'a LedgerConfig) -> Self {
        TransactionBuilder { store, config }
    }

    /// Builds and signs a transfer or levy deduction. Output 0 pays the
    /// receiver and output 1, when present, returns change to the sender.
    pub fn build(
        &self,
        kind: TransactionKind,
        sender: &Address,
        receiver: &Address,
        amount: u64,
        note: Option<String>,
        private_key: &Ed25519PrivateKey,
    ) -> Result<Transaction> {
        if kind.is_issuance() {
            return Err(LedgerError::InvalidInput(format!(
                "{} transactions are not built from inputs",
                kind
            )));
        }
        if amount < self.config.minimum_unit {
            return Err(LedgerError::InvalidInput(format!(
                "amount must be at least {}",
                self.config.minimum_unit
            )));
        }
        if sender == receiver {
            return Err(LedgerError::SelfTransferRejected);
        }
        self.resolve(sender)?;
        self.resolve(receiver)?;
        if Address::from(&private_key.public_key()) != *sender {
            return Err(LedgerError::SignatureInvalid);
        }

        let utxos = UtxoSet::new(self.store);
        let balance = utxos.compute_balance(sender)?;
        if balance < amount {
            return Err(LedgerError::InsufficientFunds {
                have: balance,
                need: amount,
            });
        }
        let (selected, total) = utxos.select_outputs(sender, amount)?;

        let mut outputs = vec![TransactionOutput {
            owner: *receiver,
            amount,
        }];
        let change = total - amount;
        if change > 0 {
            outputs.push(TransactionOutput {
                owner: *sender,
                amount: change,
            });
        }

        let payload = TransactionPayload {
            kind,
            sender: Some(*sender),
            receiver: *receiver,
            amount,
            note,
            timestamp: now(),
            inputs: selected.iter().map(|o| o.id).collect(),
            outputs,
        };
        payload.finalize(private_key)
    }

    /// Checks a transaction against the current store without mutating it.
    pub fn validate(&self, tx: &Transaction) -> Result<()> {
        tx.verify()?;
        let payload = &tx.payload;
        if payload.kind.is_issuance() {
            return self.validate_issuance(tx);
        }

        let sender = payload.sender.ok_or_else(|| {
            LedgerError::InvalidInput(String::from("transaction has no sender"))
        })?;
        self.resolve(&sender)?;
        self.resolve(&payload.receiver)?;
        if sender == payload.receiver {
            return Err(LedgerError::SelfTransferRejected);
        }
        if payload.amount < self.config.minimum_unit {
            return Err(LedgerError::InvalidInput(format!(
                "amount must be at least {}",
                self.config.minimum_unit
            )));
        }
        let signer = tx
            .signature
            .as_ref()
            .map(|s| Address::from(&s.pubkey))
            .ok_or(LedgerError::SignatureInvalid)?;
        if signer != sender {
            return Err(LedgerError::SignatureInvalid);
        }
        match payload.outputs.first() {
            Some(first) if first.owner == payload.receiver && first.amount == payload.amount => {}
            _ => {
                return Err(LedgerError::InvalidInput(String::from(
                    "first output must pay the receiver the transfer amount",
                )))
            }
        }
        if payload.inputs.is_empty() {
            return Err(LedgerError::InvalidInput(String::from(
                "transaction has no inputs",
            )));
        }

        let mut seen = HashSet::new();
        let mut inputs = 0u64;
        for id in &payload.inputs {
            if !seen.insert(*id) {
                return Err(LedgerError::InvalidInput(format!(
                    "output {} is referenced twice",
                    id
                )));
            }
            let output = self
                .store
                .output(id)?
                .ok_or(LedgerError::UnknownOutput(*id))?;
            if output.spent {
                return Err(LedgerError::AlreadySpent(*id));
            }
            if output.owner != sender {
                return Err(LedgerError::InvalidInput(format!(
                    "output {} is not owned by the sender",
                    id
                )));
            }
            inputs = inputs
                .checked_add(output.amount)
                .ok_or(LedgerError::Overflow)?;
        }
        let outputs = payload.output_total()?;
        if inputs < outputs {
            return Err(LedgerError::ValueNotConserved { inputs, outputs });
        }
        Ok(())
    }

    /// Validates `tx` and queues it in the persisted pending pool. Issuance
    /// is refused here; only the ledger mints value.
    pub fn commit(&self, tx: &Transaction) -> Result<()> {
        if tx.payload.kind.is_issuance() {
            return Err(LedgerError::InvalidInput(format!(
                "{} transactions cannot be submitted",
                tx.payload.kind
            )));
        }
        self.enqueue(tx)
    }

    pub(crate) fn enqueue(&self, tx: &Transaction) -> Result<()> {
        if let Err(e) = self.validate(tx) {
            warn!("Rejected transaction {}: {}", tx.hash, e);
            let mut rejected = Event::new(
                EventKind::ValidationFailure,
                format!("{} rejected: {}", tx.payload.kind, e),
            )
            .with_tx(tx.hash);
            if let Some(sender) = tx.payload.sender {
                rejected = rejected.with_address(sender);
            }
            event::record(self.store, rejected);
            return Err(e);
        }
        if self.store.transaction(&tx.hash)?.is_some() {
            return Err(LedgerError::InvalidInput(format!(
                "transaction {} already exists",
                tx.hash
            )));
        }
        let reserved = self
            .store
            .pending()?
            .into_iter()
            .flat_map(|p| p.payload.inputs)
            .collect::<HashSet<_>>();
        if let Some(id) = tx.payload.inputs.iter().find(|id| reserved.contains(id)) {
            return Err(LedgerError::AlreadySpent(*id));
        }

        self.store.put_transaction(tx)?;
        self.store.put_pending(tx)?;
        debug!("Committed {}", tx);
        Ok(())
    }

    fn validate_issuance(&self, tx: &Transaction) -> Result<()> {
        let payload = &tx.payload;
        if payload.sender.is_some() || !payload.inputs.is_empty() {
            return Err(LedgerError::InvalidInput(String::from(
                "issuance has no sender and no inputs",
            )));
        }
        let outputs = payload.output_total()?;
        if outputs != payload.amount
            || payload.outputs.iter().any(|o| o.owner != payload.receiver)
        {
            return Err(LedgerError::InvalidInput(String::from(
                "issuance must pay its amount to the receiver",
            )));
        }
        Ok(())
    }

    fn resolve(&self, address: &Address) -> Result<Account> {
        self.store
            .account(address)?
            .ok_or(LedgerError::NotFound(Missing::Account(*address)))
    }
}
