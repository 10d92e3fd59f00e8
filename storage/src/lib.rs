pub mod error;
pub mod keypair;
pub mod store;

pub use store::SledStore;
