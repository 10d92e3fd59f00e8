use crate::account::Address;
use crate::error::{LedgerError, Result};
use crate::utxo::OutputId;
use crate::{encode, encode_borsh};
use chrono::{Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use strum::{AsRefStr, Display as StrumDisplay, EnumString};
use tally_crypto::ed25519::{Ed25519PrivateKey, Ed25519PublicKey, Ed25519Signature};
use tally_crypto::traits::{PrivateKey, PublicKey};
use tally_crypto::Hash;

const CONTEXT: &[u8] = b"TallyTxnSigning";

/// Wall-clock time in nanoseconds since the epoch.
pub fn now() -> i64 {
    Utc::now().timestamp_nanos()
}

#[derive(
    Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Debug, StrumDisplay, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum TransactionKind {
    Transfer,
    LevyDeduction,
    MiningReward,
    Genesis,
}

impl TransactionKind {
    /// Issuance kinds mint value: no sender, no inputs, no signature.
    pub fn is_issuance(&self) -> bool {
        matches!(self, TransactionKind::MiningReward | TransactionKind::Genesis)
    }
}

#[derive(
    Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Debug, StrumDisplay, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TransactionOutput {
    pub owner: Address,
    pub amount: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TransactionPayload {
    pub kind: TransactionKind,
    pub sender: Option<Address>,
    pub receiver: Address,
    pub amount: u64,
    pub note: Option<String>,
    pub timestamp: i64,
    pub inputs: Vec<OutputId>,
    pub outputs: Vec<TransactionOutput>,
}

impl TransactionPayload {
    /// Canonical bytes covered by the sender's signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        encode_borsh(&(
            self.sender,
            self.receiver,
            self.amount,
            self.timestamp,
            self.note.clone(),
        ))
    }

    pub fn hash(&self) -> Hash {
        Hash::hash(encode_borsh(&(
            self.sender,
            self.receiver,
            self.amount,
            self.timestamp,
        )))
    }

    pub fn output_total(&self) -> Result<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |total, output| total.checked_add(output.amount))
            .ok_or(LedgerError::Overflow)
    }

    pub fn finalize(self, private_key: &Ed25519PrivateKey) -> Result<Transaction> {
        let pubkey = private_key.public_key();
        let signature = private_key
            .sign(self.signing_bytes(), Some(CONTEXT), pubkey)
            .or(Err(LedgerError::SignatureInvalid))?;

        Ok(Transaction {
            hash: self.hash(),
            signature: Some(TransactionSignature { pubkey, signature }),
            payload: self,
            status: TransactionStatus::Pending,
            block_hash: None,
        })
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TransactionSignature {
    pub pubkey: Ed25519PublicKey,
    pub signature: Ed25519Signature,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Transaction {
    pub hash: Hash,
    pub signature: Option<TransactionSignature>,
    pub payload: TransactionPayload,
    pub status: TransactionStatus,
    pub block_hash: Option<Hash>,
}

impl Transaction {
    /// Mints `amount` to `receiver`. Only `genesis` and `mining_reward`
    /// kinds are accepted.
    pub fn issuance(
        kind: TransactionKind,
        receiver: &Address,
        amount: u64,
        note: Option<String>,
    ) -> Result<Self> {
        Self::issuance_at(kind, receiver, amount, note, now())
    }

    /// Issuance with a caller-chosen timestamp, which makes the hash
    /// reproducible.
    pub fn issuance_at(
        kind: TransactionKind,
        receiver: &Address,
        amount: u64,
        note: Option<String>,
        timestamp: i64,
    ) -> Result<Self> {
        if !kind.is_issuance() {
            return Err(LedgerError::InvalidInput(format!(
                "{} transactions cannot mint value",
                kind
            )));
        }
        let outputs = if amount > 0 {
            vec![TransactionOutput {
                owner: *receiver,
                amount,
            }]
        } else {
            Vec::new()
        };
        let payload = TransactionPayload {
            kind,
            sender: None,
            receiver: *receiver,
            amount,
            note,
            timestamp,
            inputs: Vec::new(),
            outputs,
        };
        Ok(Transaction {
            hash: payload.hash(),
            signature: None,
            payload,
            status: TransactionStatus::Pending,
            block_hash: None,
        })
    }

    /// Checks the recorded hash and the signature. Issuance must be
    /// unsigned; every other kind must carry a valid sender signature.
    pub fn verify(&self) -> Result<()> {
        if self.hash != self.payload.hash() {
            return Err(LedgerError::InvalidInput(String::from(
                "transaction hash does not match its payload",
            )));
        }
        if self.payload.kind.is_issuance() {
            return match self.signature {
                None => Ok(()),
                Some(_) => Err(LedgerError::SignatureInvalid),
            };
        }
        self.signature
            .as_ref()
            .map_or(Err(LedgerError::SignatureInvalid), |s| {
                s.pubkey
                    .verify(&s.signature, self.payload.signing_bytes(), Some(CONTEXT))
                    .or(Err(LedgerError::SignatureInvalid))
            })
    }

    /// Digest of everything fixed at signing time. Status and block hash
    /// are excluded since they change on confirmation.
    pub fn content_digest(&self) -> Hash {
        let mut bytes = self.hash.to_vec();
        bytes.extend(encode(&(&self.payload, &self.signature)));
        Hash::hash(bytes)
    }

    pub fn involves(&self, address: &Address) -> bool {
        self.payload.sender.as_ref() == Some(address)
            || self.payload.receiver == *address
            || self.payload.outputs.iter().any(|o| o.owner == *address)
    }
}

impl Display for Transaction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}: {}, from: {}, to: {}, amount: {}, datetime: {}]",
            self.payload.kind,
            self.hash.to_hex(),
            self.payload
                .sender
                .map_or(String::from("none"), |x| x.to_string()),
            self.payload.receiver,
            self.payload.amount,
            Utc.timestamp_nanos(self.payload.timestamp)
                .with_timezone(&Local)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_crypto::ed25519::Ed25519KeyPair;
    use tally_crypto::traits::Keypair;

    fn setup() -> (TransactionPayload, Ed25519KeyPair, Ed25519KeyPair) {
        let keypair_1 = Ed25519KeyPair::generate();
        let keypair_2 = Ed25519KeyPair::generate();

        (
            TransactionPayload {
                kind: TransactionKind::Transfer,
                sender: Some(keypair_1.public.into()),
                receiver: keypair_2.public.into(),
                amount: 12,
                note: Some(String::from("rent")),
                timestamp: now(),
                inputs: vec![OutputId::derive(&Hash::hash(b"source"), 0)],
                outputs: vec![TransactionOutput {
                    owner: keypair_2.public.into(),
                    amount: 12,
                }],
            },
            keypair_1,
            keypair_2,
        )
    }

    #[test]
    fn test_txpayload_verify() {
        let (payload, keypair_1, _) = setup();

        let tx = payload.finalize(&keypair_1.private).unwrap();
        assert!(tx.verify().is_ok());
        assert_eq!(TransactionStatus::Pending, tx.status);
    }

    #[test]
    fn test_txpayload_tampered_amount() {
        let (payload, keypair_1, _) = setup();

        let mut tx = payload.finalize(&keypair_1.private).unwrap();
        tx.payload.amount = 124;
        tx.hash = tx.payload.hash();
        assert!(matches!(tx.verify(), Err(LedgerError::SignatureInvalid)));
    }

    #[test]
    fn test_txpayload_tampered_timestamp() {
        let (payload, keypair_1, _) = setup();

        let mut tx = payload.finalize(&keypair_1.private).unwrap();
        tx.payload.timestamp += 1;
        assert!(tx.verify().is_err());
    }

    #[test]
    fn test_txpayload_tampered_receiver() {
        let (payload, keypair_1, _) = setup();

        let mut tx = payload.finalize(&keypair_1.private).unwrap();
        tx.payload.receiver = Ed25519KeyPair::generate().public.into();
        tx.hash = tx.payload.hash();
        assert!(tx.verify().is_err());
    }

    #[test]
    fn test_txpayload_tampered_note() {
        let (payload, keypair_1, _) = setup();

        let mut tx = payload.finalize(&keypair_1.private).unwrap();
        tx.payload.note = None;
        assert!(matches!(tx.verify(), Err(LedgerError::SignatureInvalid)));
    }

    #[test]
    fn test_txpayload_invalid_signature() {
        let (payload, keypair_1, _) = setup();

        let mut tx = payload.finalize(&keypair_1.private).unwrap();
        tx.signature.as_mut().unwrap().signature = Ed25519Signature::zero();
        assert!(tx.verify().is_err());
    }

    #[test]
    fn test_txpayload_invalid_pubkey() {
        let (payload, keypair_1, keypair_2) = setup();

        let mut tx = payload.finalize(&keypair_1.private).unwrap();
        tx.signature.as_mut().unwrap().pubkey = keypair_2.public;
        assert!(tx.verify().is_err());
    }

    #[test]
    fn test_verify_no_signature() {
        let (payload, _, _) = setup();
        let tx = Transaction {
            hash: payload.hash(),
            signature: None,
            payload,
            status: TransactionStatus::Pending,
            block_hash: None,
        };
        assert!(matches!(tx.verify(), Err(LedgerError::SignatureInvalid)));
    }

    #[test]
    fn test_issuance_is_unsigned() {
        let keypair = Ed25519KeyPair::generate();
        let tx = Transaction::issuance(
            TransactionKind::Genesis,
            &Address::from(keypair.public),
            1234,
            None,
        )
        .unwrap();
        assert!(tx.verify().is_ok());
        assert_eq!(1234, tx.payload.output_total().unwrap());
        assert!(tx.payload.inputs.is_empty());
    }

    #[test]
    fn test_issuance_rejects_transfer_kind() {
        let keypair = Ed25519KeyPair::generate();
        let tx = Transaction::issuance(
            TransactionKind::Transfer,
            &Address::from(keypair.public),
            1,
            None,
        );
        assert!(matches!(tx, Err(LedgerError::InvalidInput(_))));
    }

    #[test]
    fn test_zero_issuance_has_no_outputs() {
        let keypair = Ed25519KeyPair::generate();
        let tx = Transaction::issuance(
            TransactionKind::Genesis,
            &Address::from(keypair.public),
            0,
            None,
        )
        .unwrap();
        assert!(tx.payload.outputs.is_empty());
    }

    #[test]
    fn test_hash_ignores_note() {
        let (payload, _, _) = setup();
        let mut other = payload.clone();
        other.note = Some(String::from("something else"));
        assert_eq!(payload.hash(), other.hash());
        assert_ne!(payload.signing_bytes(), other.signing_bytes());
    }

    #[test]
    fn test_content_digest_ignores_confirmation() {
        let (payload, keypair_1, _) = setup();
        let tx = payload.finalize(&keypair_1.private).unwrap();

        let mut confirmed = tx.clone();
        confirmed.status = TransactionStatus::Confirmed;
        confirmed.block_hash = Some(Hash::hash(b"block"));
        assert_eq!(tx.content_digest(), confirmed.content_digest());

        let mut tampered = tx.clone();
        tampered.payload.outputs[0].amount = 13;
        assert_ne!(tx.content_digest(), tampered.content_digest());
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!("levy_deduction", TransactionKind::LevyDeduction.to_string());
        assert_eq!(
            TransactionKind::MiningReward,
            "mining_reward".parse::<TransactionKind>().unwrap()
        );
        assert_eq!("confirmed", TransactionStatus::Confirmed.as_ref());
    }
}
