use std::fmt::{Display, Formatter};
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tally_crypto::Hash;

use crate::account::Address;
use crate::error::{LedgerError, Result};
use crate::store::{SpendOutcome, Store};
use crate::transaction::TransactionOutput;

/// Identifier of an output, derived from the producing transaction and the
/// output position so that recreating an output addresses the same record.
#[derive(
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    std::hash::Hash,
    Debug,
)]
pub struct OutputId(Hash);

impl OutputId {
    pub fn derive(source_tx: &Hash, index: u32) -> Self {
        let mut bytes = source_tx.to_vec();
        bytes.extend_from_slice(&index.to_le_bytes());
        OutputId(Hash::hash(bytes))
    }

    pub fn as_hash(&self) -> &Hash {
        &self.0
    }
}

impl From<Hash> for OutputId {
    fn from(hash: Hash) -> Self {
        OutputId(hash)
    }
}

impl Display for OutputId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OutputId {
    type Err = <Hash as FromStr>::Err;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(OutputId(s.parse()?))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UnspentOutput {
    pub id: OutputId,
    pub source_tx: Hash,
    pub output_index: u32,
    pub owner: Address,
    pub amount: u64,
    pub spent: bool,
    pub spent_by: Option<Hash>,
    pub created_at: i64,
    pub spent_at: Option<i64>,
}

impl UnspentOutput {
    pub fn new(source_tx: &Hash, output_index: u32, output: &TransactionOutput, at: i64) -> Self {
        UnspentOutput {
            id: OutputId::derive(source_tx, output_index),
            source_tx: *source_tx,
            output_index,
            owner: output.owner,
            amount: output.amount,
            spent: false,
            spent_by: None,
            created_at: at,
            spent_at: None,
        }
    }
}

/// Value-fragment operations over a [`Store`].
pub struct UtxoSet<'a, S: Store + ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> UtxoSet<'a, S> {
    pub fn new(store: &'a S) -> Self {
        UtxoSet { store }
    }

    pub fn compute_balance(&self, owner: &Address) -> Result<u64> {
        sum(self.store.unspent_outputs(owner)?.iter())
    }

    /// Oldest unspent outputs first until `target` is covered.
    pub fn select_outputs(&self, owner: &Address, target: u64) -> Result<(Vec<UnspentOutput>, u64)> {
        let mut selected = Vec::new();
        let mut total = 0u64;
        for output in self.store.unspent_outputs(owner)? {
            if total >= target {
                break;
            }
            total = total
                .checked_add(output.amount)
                .ok_or(LedgerError::Overflow)?;
            selected.push(output);
        }
        if total < target {
            return Err(LedgerError::InsufficientFunds {
                have: total,
                need: target,
            });
        }
        Ok((selected, total))
    }

    /// Marks one output spent by `spending_tx`. The transition is a
    /// conditional update at the store.
    pub fn mark_spent(&self, id: &OutputId, spending_tx: &Hash, at: i64) -> Result<UnspentOutput> {
        match self.store.spend_output(id, spending_tx, at)? {
            SpendOutcome::Spent(output) => Ok(output),
            SpendOutcome::AlreadySpent(_) => Err(LedgerError::AlreadySpent(*id)),
            SpendOutcome::Missing => Err(LedgerError::UnknownOutput(*id)),
        }
    }

    /// Spends every input of `spending_tx`. Inputs already spent by the same
    /// transaction are accepted so an interrupted application can be rerun.
    pub fn mark_all_spent(&self, ids: &[OutputId], spending_tx: &Hash, at: i64) -> Result<()> {
        for id in ids {
            match self.store.output(id)? {
                None => return Err(LedgerError::UnknownOutput(*id)),
                Some(output) if output.spent && output.spent_by.as_ref() != Some(spending_tx) => {
                    return Err(LedgerError::AlreadySpent(*id))
                }
                Some(_) => {}
            }
        }
        for id in ids {
            match self.store.spend_output(id, spending_tx, at)? {
                SpendOutcome::Spent(_) => {}
                SpendOutcome::AlreadySpent(output)
                    if output.spent_by.as_ref() == Some(spending_tx) => {}
                SpendOutcome::AlreadySpent(_) => return Err(LedgerError::AlreadySpent(*id)),
                SpendOutcome::Missing => return Err(LedgerError::UnknownOutput(*id)),
            }
        }
        Ok(())
    }

    /// Upserts the unspent output at `index` of `source_tx`. An output
    /// that already exists is returned untouched.
    pub fn create_output(
        &self,
        source_tx: &Hash,
        index: u32,
        output: &TransactionOutput,
        at: i64,
    ) -> Result<UnspentOutput> {
        let id = OutputId::derive(source_tx, index);
        if let Some(existing) = self.store.output(&id)? {
            return Ok(existing);
        }
        let created = UnspentOutput::new(source_tx, index, output, at);
        self.store.put_output(&created)?;
        Ok(created)
    }

    pub fn total_supply(&self) -> Result<u64> {
        sum(self.store.all_unspent_outputs()?.iter())
    }

    pub fn outputs_of(&self, owner: &Address) -> Result<Vec<UnspentOutput>> {
        Ok(self.store.unspent_outputs(owner)?)
    }
}

fn sum<'o, I: Iterator<Item = &'o UnspentOutput>>(mut outputs: I) -> Result<u64> {
    outputs.try_fold(0u64, |total, output| {
        total
            .checked_add(output.amount)
            .ok_or(LedgerError::Overflow)
    })
}
