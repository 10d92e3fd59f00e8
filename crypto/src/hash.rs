use borsh::{BorshDeserialize, BorshSerialize};
use hex::{encode, FromHex};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// A 32-byte digest. Content hashes are blake3; proof-of-work hashes are
/// produced elsewhere and wrapped with [`Hash::new`].
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
)]
pub struct Hash {
    hash: [u8; Hash::LENGTH],
}

impl Hash {
    pub const LENGTH: usize = 32;

    pub fn new(hash: [u8; Hash::LENGTH]) -> Self {
        Hash { hash }
    }

    pub fn hash<T: AsRef<[u8]>>(value: T) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(value.as_ref());
        Hash {
            hash: hasher.finalize().into(),
        }
    }

    pub fn concat_and_hash(values: &[Self]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for val in values {
            hasher.update(val.as_ref());
        }
        Hash {
            hash: hasher.finalize().into(),
        }
    }

    pub const fn zero() -> Self {
        Hash {
            hash: [0; Hash::LENGTH],
        }
    }

    pub fn is_zero(&self) -> bool {
        self.hash == [0; Hash::LENGTH]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.hash
    }

    pub fn to_bytes(&self) -> [u8; Hash::LENGTH] {
        self.hash
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.hash.to_vec()
    }

    pub fn to_hex(&self) -> String {
        encode(self.hash)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.hash
    }
}

impl From<[u8; Hash::LENGTH]> for Hash {
    fn from(hash: [u8; Hash::LENGTH]) -> Self {
        Hash { hash }
    }
}

impl FromStr for Hash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        <[u8; Hash::LENGTH]>::from_hex(s).map(Hash::new)
    }
}

impl Display for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl Debug for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}
