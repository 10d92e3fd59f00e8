use thiserror::Error;

pub type Result<T> = std::result::Result<T, CryptoError>;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("key material is malformed")]
    MalformedKey,

    #[error("vault key must be {expected} bytes, found {found}")]
    VaultKeyLength { expected: usize, found: usize },

    #[error("sealed data is too short to contain a nonce and a tag")]
    SealTooShort,

    #[error("sealed data failed authentication")]
    SealTampered,
}
