pub mod ed25519;
pub mod error;
pub mod hash;
pub mod seal;
pub mod traits;

pub use error::{CryptoError, Result};
pub use hash::Hash;
