//! Plain key files for the command line, one per account, named by
//! address and holding the hex private key.

use std::fs::{read_dir, read_to_string, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tally_crypto::ed25519::{Ed25519KeyPair, Ed25519PrivateKey};
use tally_crypto::traits::PrivateKey;
use tally_ledger::account::Address;

use crate::error::KeyFileError;

pub fn store_keypair(keypair: &Ed25519KeyPair, path: &Path) -> Result<PathBuf> {
    if !path.is_dir() {
        return Err(KeyFileError::PathIsNotDirectory(path.to_path_buf()).into());
    }
    let address = Address::from(keypair.public);
    let file_path = path.join(address.to_string());
    let mut file = File::create(&file_path)?;
    file.write_all(hex::encode(keypair.private.as_bytes()).as_bytes())?;
    Ok(file_path)
}

pub fn read_keypair(path: &Path) -> Result<Ed25519KeyPair> {
    let malformed = || KeyFileError::MalformedKeyFile(path.to_path_buf());
    let bytes = hex::decode(read_to_string(path)?.trim()).map_err(|_| malformed())?;
    let private_key = Ed25519PrivateKey::from_bytes(&bytes).map_err(|_| malformed())?;
    let keypair = Ed25519KeyPair::from_private(private_key);

    let actual = Address::from(keypair.public).to_string();
    if let Some(named) = path.file_name().and_then(|n| n.to_str()) {
        if named.parse::<Address>().is_ok() && named != actual {
            return Err(KeyFileError::AddressMismatch {
                path: path.to_path_buf(),
                named: named.to_string(),
                actual,
            }
            .into());
        }
    }
    Ok(keypair)
}

/// Reads every key file directly inside `path`.
pub fn read_all_keypair(path: &Path) -> Result<Vec<Ed25519KeyPair>> {
    if !path.is_dir() {
        return Err(KeyFileError::PathIsNotDirectory(path.to_path_buf()).into());
    }
    let mut paths = read_dir(path)?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|e| e.is_file())
        .collect::<Vec<PathBuf>>();
    paths.sort();
    paths.iter().map(|p| read_keypair(p)).collect()
}

/// Finds the key file for `address` inside `path`.
pub fn find_keypair(address: &Address, path: &Path) -> Result<Ed25519KeyPair> {
    read_keypair(&path.join(address.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tally_crypto::traits::Keypair;
    use tempdir::TempDir;

    #[test]
    fn test_store_and_read_keypair() {
        let tmpdir = TempDir::new("test_store_and_read_keypair").unwrap();
        let keypair = Ed25519KeyPair::generate();
        let file = store_keypair(&keypair, tmpdir.path()).unwrap();

        let read = read_keypair(&file).unwrap();
        assert_eq!(keypair.public, read.public);
        let found = find_keypair(&Address::from(keypair.public), tmpdir.path()).unwrap();
        assert_eq!(keypair.private.as_bytes(), found.private.as_bytes());
    }

    #[test]
    fn test_read_all_keypair() {
        let tmpdir = TempDir::new("test_read_all_keypair").unwrap();
        let keypairs = (0..3).map(|_| Ed25519KeyPair::generate()).collect::<Vec<_>>();
        for keypair in &keypairs {
            store_keypair(keypair, tmpdir.path()).unwrap();
        }
        let read = read_all_keypair(tmpdir.path()).unwrap();
        assert_eq!(3, read.len());
        for keypair in &keypairs {
            assert!(read.iter().any(|k| k.public == keypair.public));
        }
    }

    #[test]
    fn test_rejects_bad_files() {
        let tmpdir = TempDir::new("test_rejects_bad_files").unwrap();
        let garbage = tmpdir.path().join("garbage");
        fs::write(&garbage, "not hex").unwrap();
        let err = read_keypair(&garbage).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KeyFileError>(),
            Some(KeyFileError::MalformedKeyFile(_))
        ));

        let keypair = Ed25519KeyPair::generate();
        let other = Address::from(Ed25519KeyPair::generate().public);
        let misnamed = tmpdir.path().join(other.to_string());
        fs::write(&misnamed, hex::encode(keypair.private.as_bytes())).unwrap();
        let err = read_keypair(&misnamed).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KeyFileError>(),
            Some(KeyFileError::AddressMismatch { .. })
        ));

        assert!(store_keypair(&keypair, &garbage).is_err());
    }
}
