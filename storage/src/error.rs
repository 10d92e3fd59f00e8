use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyFileError {
    #[error("path must be a directory: {0}")]
    PathIsNotDirectory(PathBuf),

    #[error("key file {0} does not hold a hex encoded private key")]
    MalformedKeyFile(PathBuf),

    #[error("key file {path} is named {named} but holds the key of {actual}")]
    AddressMismatch {
        path: PathBuf,
        named: String,
        actual: String,
    },
}
