use std::fmt::{Display, Formatter};
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tally_crypto::ed25519::{Ed25519KeyPair, Ed25519PrivateKey, Ed25519PublicKey};
use tally_crypto::seal::VaultKey;
use tally_crypto::traits::{Keypair, PrivateKey, PublicKey};
use tally_crypto::{CryptoError, Hash};
use thiserror::Error;

use crate::levy::Period;
use crate::transaction::now;

const VERSION: &[u8] = b"01";
const PREFIX: &str = "TL_";

#[derive(Error, Debug, PartialEq)]
pub enum AddressError {
    #[error("address must start with \"TL_\"")]
    MissingPrefix,

    #[error("address is not valid base58")]
    InvalidEncoding,

    #[error("address must be {expected} bytes, found {found}")]
    InvalidLength { expected: usize, found: usize },

    #[error("unsupported address version")]
    InvalidVersion,

    #[error("address checksum mismatch")]
    InvalidChecksum,
}

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
pub struct Address([u8; Address::ADDRESS_LENGTH]);

impl Address {
    pub const ADDRESS_LENGTH: usize = 22;

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn checksum(payload: &[u8]) -> [u8; 4] {
        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(&Hash::hash(payload).as_bytes()[..4]);
        checksum
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let encoded = s.strip_prefix(PREFIX).ok_or(AddressError::MissingPrefix)?;
        let bytes = bs58::decode(encoded)
            .into_vec()
            .or(Err(AddressError::InvalidEncoding))?;
        if bytes.len() != Address::ADDRESS_LENGTH {
            return Err(AddressError::InvalidLength {
                expected: Address::ADDRESS_LENGTH,
                found: bytes.len(),
            });
        }
        if &bytes[..VERSION.len()] != VERSION {
            return Err(AddressError::InvalidVersion);
        }
        let (payload, checksum) = bytes.split_at(Address::ADDRESS_LENGTH - 4);
        if Address::checksum(payload)[..] != *checksum {
            return Err(AddressError::InvalidChecksum);
        }

        let mut address = [0u8; Address::ADDRESS_LENGTH];
        address.copy_from_slice(&bytes);
        Ok(Address(address))
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", PREFIX, bs58::encode(self.0).into_string())
    }
}

impl<T: PublicKey> From<&T> for Address {
    fn from(key: &T) -> Self {
        let key_hash = Hash::hash(key.as_bytes());
        let mut address = [0u8; Address::ADDRESS_LENGTH];
        address[..2].copy_from_slice(VERSION); // 2 bytes
        address[2..18].copy_from_slice(&key_hash.as_bytes()[..16]); // 16 bytes
        let checksum = Address::checksum(&address[..18]);
        address[18..].copy_from_slice(&checksum); // 4 bytes
        Address(address)
    }
}

impl From<Ed25519PublicKey> for Address {
    fn from(key: Ed25519PublicKey) -> Self {
        Address::from(&key)
    }
}

/// Levy bookkeeping carried on each account.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LevyTracking {
    pub last_period: Option<Period>,
    pub total_deducted: u64,
    pub period_deducted: u64,
}

/// A provisioned account. The private key is only ever stored sealed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Account {
    pub address: Address,
    pub public_key: Ed25519PublicKey,
    pub sealed_private_key: Vec<u8>,
    pub created_at: i64,
    pub levy: LevyTracking,
}

impl Account {
    /// Generates a key pair and seals its private half under `vault`.
    pub fn provision(vault: &VaultKey) -> (Account, Ed25519KeyPair) {
        let keypair = Ed25519KeyPair::generate();
        let account = Account {
            address: Address::from(keypair.public),
            public_key: keypair.public,
            sealed_private_key: vault.seal(keypair.private.as_bytes()),
            created_at: now(),
            levy: LevyTracking::default(),
        };
        (account, keypair)
    }

    pub fn unseal(&self, vault: &VaultKey) -> Result<Ed25519PrivateKey, CryptoError> {
        let bytes = vault.open(&self.sealed_private_key)?;
        let private = Ed25519PrivateKey::from_bytes(&bytes)?;
        if private.public_key() != self.public_key {
            return Err(CryptoError::MalformedKey);
        }
        Ok(private)
    }
}
