use borsh::{BorshDeserialize, BorshSerialize};
use digest::Digest;
use sha2::Sha256;
use std::time::Instant;
use thiserror::Error;

/// Hex characters in a SHA-256 digest, the upper bound for difficulty.
pub const MAX_DIFFICULTY: u8 = 64;

const DEADLINE_CHECK_INTERVAL: u64 = 1 << 12;

#[derive(Error, Debug, PartialEq)]
pub enum PoWorkError {
    #[error("difficulty must be at most 64, found {0}")]
    InvalidDifficulty(u8),

    #[error("no proof found before the deadline, stopped at nonce {0}")]
    DeadlineExceeded(u64),
}

#[derive(BorshSerialize, BorshDeserialize, Clone, PartialEq, Debug)]
pub struct PoWorkProof {
    pub nonce: u64,
    pub hash: [u8; 32],
}

impl PoWorkProof {
    /// Searches nonces upward from 0 and returns the first whose hash has
    /// `difficulty` leading zero hex characters.
    pub fn find_proof<T: AsRef<[u8]>>(data: T, difficulty: u8) -> Result<Self, PoWorkError> {
        Self::search(data.as_ref(), difficulty, None)
    }

    /// Same search as [`PoWorkProof::find_proof`], abandoned once `deadline`
    /// has passed.
    pub fn find_proof_until<T: AsRef<[u8]>>(
        data: T,
        difficulty: u8,
        deadline: Instant,
    ) -> Result<Self, PoWorkError> {
        Self::search(data.as_ref(), difficulty, Some(deadline))
    }

    pub fn verify<T: AsRef<[u8]>>(&self, data: T, difficulty: u8) -> bool {
        let hash = work_hash(self.nonce, data.as_ref());
        hash == self.hash && meets_difficulty(&hash, difficulty)
    }

    fn search(data: &[u8], difficulty: u8, deadline: Option<Instant>) -> Result<Self, PoWorkError> {
        if difficulty > MAX_DIFFICULTY {
            return Err(PoWorkError::InvalidDifficulty(difficulty));
        }

        let mut nonce: u64 = 0u64;

        loop {
            let hash = work_hash(nonce, data);
            if meets_difficulty(&hash, difficulty) {
                return Ok(Self { nonce, hash });
            }
            if let Some(deadline) = deadline {
                if nonce % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= deadline {
                    return Err(PoWorkError::DeadlineExceeded(nonce));
                }
            }
            nonce += 1;
        }
    }
}

/// SHA-256 over the little-endian nonce followed by the data.
pub fn work_hash(nonce: u64, data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(nonce.to_le_bytes());
    hasher.update(data);
    hasher.finalize().into()
}

/// Whether the hex rendering of `hash` starts with `difficulty` zeros.
pub fn meets_difficulty(hash: &[u8], difficulty: u8) -> bool {
    let difficulty = difficulty as usize;
    if difficulty > hash.len() * 2 {
        return false;
    }
    (0..difficulty).all(|i| {
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        nibble == 0
    })
}
