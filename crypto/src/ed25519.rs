use crate::error::{CryptoError, Result};
use crate::traits::{Keypair, PrivateKey, PublicKey, Signature};
use ed25519_dalek::PublicKey as DalekPublicKey;
use ed25519_dalek::{Digest, Keypair as DalekKeypair, Sha512};
use ed25519_dalek::{ExpandedSecretKey, SecretKey as DalekPrivateKey, Signature as DalekSignature};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};

#[derive(Debug)]
pub struct Ed25519KeyPair {
    pub public: Ed25519PublicKey,
    pub private: Ed25519PrivateKey,
}

impl Ed25519KeyPair {
    pub fn from_private(private: Ed25519PrivateKey) -> Self {
        Ed25519KeyPair {
            public: private.public_key(),
            private,
        }
    }
}

impl Keypair for Ed25519KeyPair {
    type PublicKeyType = Ed25519PublicKey;
    type PrivateKeyType = Ed25519PrivateKey;

    fn generate() -> Self {
        let keypair = DalekKeypair::generate(&mut OsRng);
        Ed25519KeyPair {
            public: Ed25519PublicKey(keypair.public),
            private: Ed25519PrivateKey(keypair.secret),
        }
    }

    fn sign<T>(
        &self,
        message: T,
        context: Option<&[u8]>,
    ) -> Result<<Self::PublicKeyType as PublicKey>::SignatureType>
    where
        T: AsRef<[u8]>,
    {
        self.private.sign(message, context, self.public)
    }

    fn public_key(&self) -> Self::PublicKeyType {
        self.public
    }

    fn private_key(&self) -> &Self::PrivateKeyType {
        &self.private
    }
}

pub struct Ed25519PrivateKey(DalekPrivateKey);

impl PrivateKey for Ed25519PrivateKey {
    type PublicKeyType = Ed25519PublicKey;

    fn public_key(&self) -> Self::PublicKeyType {
        Ed25519PublicKey(DalekPublicKey::from(&self.0))
    }

    fn sign<T>(
        &self,
        message: T,
        context: Option<&[u8]>,
        public_key: Self::PublicKeyType,
    ) -> Result<<Self::PublicKeyType as PublicKey>::SignatureType>
    where
        T: AsRef<[u8]>,
    {
        let mut hasher = Sha512::new();
        hasher.update(message.as_ref());

        let expanded: ExpandedSecretKey = (&self.0).into();
        let signature: DalekSignature = expanded
            .sign_prehashed(hasher, &public_key.0, context)
            .or(Err(CryptoError::InvalidSignature))?;
        Ok(Ed25519Signature(signature))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        DalekPrivateKey::from_bytes(bytes)
            .map(Ed25519PrivateKey)
            .or(Err(CryptoError::MalformedKey))
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Debug for Ed25519PrivateKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519PrivateKey(..)")
    }
}

#[derive(Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Debug)]
pub struct Ed25519PublicKey(DalekPublicKey);

impl Ed25519PublicKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl PublicKey for Ed25519PublicKey {
    type SignatureType = Ed25519Signature;

    fn verify<T: AsRef<[u8]>>(
        &self,
        signature: &Self::SignatureType,
        message: T,
        context: Option<&[u8]>,
    ) -> Result<()> {
        let mut hasher = Sha512::new();
        hasher.update(message.as_ref());
        self.0
            .verify_prehashed(hasher, context, &signature.0)
            .or(Err(CryptoError::InvalidSignature))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        DalekPublicKey::from_bytes(bytes)
            .map(Ed25519PublicKey)
            .or(Err(CryptoError::MalformedKey))
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Ed25519Signature(DalekSignature);

impl Ed25519Signature {
    pub fn zero() -> Self {
        Ed25519Signature(DalekSignature::new([0u8; 64]))
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }
}

impl Signature for Ed25519Signature {}
