//! Persisted audit trail of notable ledger activity.

use std::sync::atomic::{AtomicU64, Ordering};

use log::warn;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display as StrumDisplay, EnumString};
use tally_crypto::Hash;

use crate::account::Address;
use crate::encode;
use crate::store::Store;
use crate::transaction::now;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(
    Serialize,
    Deserialize,
    Copy,
    Clone,
    PartialEq,
    Eq,
    std::hash::Hash,
    Debug,
    StrumDisplay,
    EnumString,
    AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Mining,
    ValidationFailure,
    LevyDeduction,
    LevyError,
    IntegrityViolation,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Event {
    pub id: Hash,
    pub kind: EventKind,
    pub message: String,
    pub address: Option<Address>,
    pub tx_hash: Option<Hash>,
    pub block_hash: Option<Hash>,
    pub timestamp: i64,
}

impl Event {
    pub fn new<M: Into<String>>(kind: EventKind, message: M) -> Self {
        let timestamp = now();
        let message = message.into();
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Event {
            id: Hash::hash(encode(&(timestamp, sequence, kind, &message))),
            kind,
            message,
            address: None,
            tx_hash: None,
            block_hash: None,
            timestamp,
        }
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_tx(mut self, tx_hash: Hash) -> Self {
        self.tx_hash = Some(tx_hash);
        self
    }

    pub fn with_block(mut self, block_hash: Hash) -> Self {
        self.block_hash = Some(block_hash);
        self
    }
}

/// Stores `event`. A failed write is logged and otherwise ignored.
pub(crate) fn record<S: Store + ?Sized>(store: &S, event: Event) {
    if let Err(e) = store.put_event(&event) {
        warn!("Could not record {} event: {}", event.kind, e);
    }
}

/// Newest-first ordering shared by backends.
pub fn event_order(a: &Event, b: &Event) -> std::cmp::Ordering {
    (b.timestamp, b.id).cmp(&(a.timestamp, a.id))
}
