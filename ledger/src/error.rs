use crate::account::Address;
use crate::store::StoreError;
use crate::utxo::OutputId;
use tally_crypto::{CryptoError, Hash};
use tally_powork::PoWorkError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cannot make transaction to self address")]
    SelfTransferRejected,

    #[error("{0} not found")]
    NotFound(Missing),

    #[error("output {0} does not exist")]
    UnknownOutput(OutputId),

    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },

    #[error("output {0} is already spent")]
    AlreadySpent(OutputId),

    #[error("inputs of {inputs} do not cover outputs of {outputs}")]
    ValueNotConserved { inputs: u64, outputs: u64 },

    #[error("invalid transaction signature")]
    SignatureInvalid,

    #[error("chain integrity violated at block {index}: {fault}")]
    ChainIntegrityViolation { index: u64, fault: IntegrityFault },

    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),

    #[error("no pending transactions to mine")]
    NothingToMine,

    #[error("mining stopped: {0}")]
    MiningTimedOut(#[from] PoWorkError),

    #[error("chain tip moved while mining block {0}")]
    StaleTip(u64),

    #[error("key material error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("amount overflow")]
    Overflow,
}

impl LedgerError {
    /// Deterministic rejections of the request itself, as opposed to
    /// failures a caller may retry.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            LedgerError::PersistenceFailure(_) | LedgerError::MiningTimedOut(_) | LedgerError::StaleTip(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Missing {
    Account(Address),
    Transaction(Hash),
    Block(String),
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Missing::Account(address) => write!(f, "account {}", address),
            Missing::Transaction(hash) => write!(f, "transaction {}", hash),
            Missing::Block(key) => write!(f, "block {}", key),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntegrityFault {
    #[error("height is not contiguous")]
    InvalidHeight,

    #[error("previous hash is incorrect")]
    InvalidPreviousHash,

    #[error("stored hash does not match block content")]
    InvalidHash,

    #[error("hash does not satisfy difficulty {0}")]
    InsufficientWork(u8),

    #[error("merkle root does not match transactions")]
    InvalidMerkleRoot,

    #[error("chain has no genesis block")]
    NoGenesis,
}
