//! Symmetric sealing of private key material at rest.
//!
//! A sealed blob is `nonce || ciphertext || tag`. The ciphertext comes from
//! ChaCha20 under a key derived from the vault key, and the tag is a keyed
//! blake3 hash over `nonce || ciphertext` under a second derived key.

use crate::error::{CryptoError, Result};
use chacha20::cipher::{NewCipher, StreamCipher};
use chacha20::{ChaCha20, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 32;
const CIPHER_CONTEXT: &str = "tally 2021-06 vault cipher key";
const MAC_CONTEXT: &str = "tally 2021-06 vault mac key";

pub struct VaultKey {
    cipher_key: [u8; 32],
    mac_key: [u8; 32],
}

impl VaultKey {
    pub const LENGTH: usize = 32;

    pub fn new(material: &[u8]) -> Result<Self> {
        if material.len() != Self::LENGTH {
            return Err(CryptoError::VaultKeyLength {
                expected: Self::LENGTH,
                found: material.len(),
            });
        }
        Ok(Self::derive(material))
    }

    pub fn from_hex(encoded: &str) -> Result<Self> {
        let material = hex::decode(encoded.trim()).or(Err(CryptoError::MalformedKey))?;
        Self::new(&material)
    }

    pub fn generate() -> Self {
        Self::derive(&Self::generate_material())
    }

    /// Fresh random key material, to be kept by the operator.
    pub fn generate_material() -> [u8; Self::LENGTH] {
        let mut material = [0u8; Self::LENGTH];
        OsRng.fill_bytes(&mut material);
        material
    }

    fn derive(material: &[u8]) -> Self {
        let mut cipher_key = [0u8; 32];
        let mut mac_key = [0u8; 32];
        blake3::derive_key(CIPHER_CONTEXT, material, &mut cipher_key);
        blake3::derive_key(MAC_CONTEXT, material, &mut mac_key);
        VaultKey {
            cipher_key,
            mac_key,
        }
    }

    pub fn seal(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut nonce = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);

        let mut sealed = Vec::with_capacity(NONCE_LENGTH + plaintext.len() + TAG_LENGTH);
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(plaintext);
        self.keystream(&nonce, &mut sealed[NONCE_LENGTH..]);

        let tag = blake3::keyed_hash(&self.mac_key, &sealed);
        sealed.extend_from_slice(tag.as_bytes());
        sealed
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(CryptoError::SealTooShort);
        }
        let (body, tag) = sealed.split_at(sealed.len() - TAG_LENGTH);
        let mut expected = [0u8; TAG_LENGTH];
        expected.copy_from_slice(tag);
        // blake3::Hash equality is constant time.
        if blake3::keyed_hash(&self.mac_key, body) != blake3::Hash::from(expected) {
            return Err(CryptoError::SealTampered);
        }

        let (nonce, ciphertext) = body.split_at(NONCE_LENGTH);
        let mut plaintext = ciphertext.to_vec();
        self.keystream(nonce, &mut plaintext);
        Ok(plaintext)
    }

    fn keystream(&self, nonce: &[u8], data: &mut [u8]) {
        let mut cipher = ChaCha20::new(Key::from_slice(&self.cipher_key), Nonce::from_slice(nonce));
        cipher.apply_keystream(data);
    }
}
