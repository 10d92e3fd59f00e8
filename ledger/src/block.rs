use std::time::Instant;

use borsh::BorshSerialize;
use serde::{Deserialize, Serialize};
use tally_crypto::Hash;
use tally_merkletree::{merkle_root, MerkleTree};
use tally_powork::{work_hash, PoWorkProof};

use crate::account::Address;
use crate::encode_borsh;
use crate::error::Result;
use crate::transaction::{now, Transaction, TransactionKind};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Block {
    pub index: u64,
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: Hash,
    pub nonce: u64,
    pub hash: Hash,
    pub merkle_root: Option<Hash>,
    pub difficulty: u8,
    pub miner: Option<Address>,
}

/// Hashed block fields apart from the nonce. Transactions enter through
/// their content digests.
#[derive(BorshSerialize)]
struct BlockHeader {
    index: u64,
    timestamp: i64,
    previous_hash: Hash,
    merkle_root: Option<Hash>,
    difficulty: u8,
    miner: Option<Address>,
    transactions: Vec<Hash>,
}

impl Block {
    /// Block 0: a zero-amount genesis transaction to `collector`, linked to
    /// the all-zero hash and not mined.
    pub fn genesis(collector: &Address) -> Result<Self> {
        let tx = Transaction::issuance(
            TransactionKind::Genesis,
            collector,
            0,
            Some(String::from("genesis")),
        )?;
        let mut block = Block::candidate(0, Hash::zero(), vec![tx], 0, None);
        block.hash = block.compute_hash();
        Ok(block)
    }

    /// Unmined block. `hash` stays zero until [`Block::mine`].
    pub fn candidate(
        index: u64,
        previous_hash: Hash,
        transactions: Vec<Transaction>,
        difficulty: u8,
        miner: Option<Address>,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp: now(),
            transactions,
            previous_hash,
            nonce: 0,
            hash: Hash::zero(),
            merkle_root: None,
            difficulty,
            miner,
        };
        block.merkle_root = block.compute_merkle_root();
        block
    }

    /// Searches the smallest nonce satisfying the difficulty.
    pub fn mine(mut self, deadline: Option<Instant>) -> Result<Self> {
        let header = self.header_bytes();
        let proof = match deadline {
            Some(deadline) => PoWorkProof::find_proof_until(&header, self.difficulty, deadline)?,
            None => PoWorkProof::find_proof(&header, self.difficulty)?,
        };
        self.nonce = proof.nonce;
        self.hash = Hash::new(proof.hash);
        Ok(self)
    }

    pub fn compute_hash(&self) -> Hash {
        Hash::new(work_hash(self.nonce, &self.header_bytes()))
    }

    pub fn compute_merkle_root(&self) -> Option<Hash> {
        let leaves = self
            .transactions
            .iter()
            .map(|tx| tx.hash)
            .collect::<Vec<Hash>>();
        merkle_root(&leaves)
    }

    pub fn merkle_tree(&self) -> MerkleTree {
        let leaves = self
            .transactions
            .iter()
            .map(|tx| tx.hash)
            .collect::<Vec<Hash>>();
        MerkleTree::from_leaves(&leaves)
    }

    /// The stored hash is the work hash of the header at `nonce` and meets
    /// the difficulty.
    pub fn has_valid_work(&self) -> bool {
        let proof = PoWorkProof {
            nonce: self.nonce,
            hash: self.hash.to_bytes(),
        };
        proof.verify(self.header_bytes(), self.difficulty)
    }

    fn header_bytes(&self) -> Vec<u8> {
        encode_borsh(&BlockHeader {
            index: self.index,
            timestamp: self.timestamp,
            previous_hash: self.previous_hash,
            merkle_root: self.merkle_root,
            difficulty: self.difficulty,
            miner: self.miner,
            transactions: self
                .transactions
                .iter()
                .map(Transaction::content_digest)
                .collect(),
        })
    }
}
