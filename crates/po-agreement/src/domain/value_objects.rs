//! # Domain Value Objects
//!
//! Immutable value types shared by the assembly, validation and flow layers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use std::fmt;
use uuid::Uuid;

/// A 32-byte SHA-256 digest.
pub type Hash = [u8; 32];

/// Ed25519 public key identifying a signer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short hex form used in logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.short())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A signature together with the key that produced it.
#[serde_as]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalSignature {
    /// Signer key.
    pub by: PublicKey,
    /// Raw Ed25519 signature bytes.
    #[serde_as(as = "Bytes")]
    pub bytes: [u8; 64],
}

impl fmt::Debug for DigitalSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DigitalSignature(by={}, {}..)",
            self.by.short(),
            hex::encode(&self.bytes[..4])
        )
    }
}

/// Content-derived transaction identifier.
///
/// Computed from the unsigned transaction only, so adding signatures never
/// changes it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub Hash);

impl TransactionId {
    /// Raw digest bytes (the message every party signs).
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", hex::encode_upper(&self.0[..6]))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

/// Linear identifier of a business document: an external reference
/// (the order number) plus a random UUID.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UniqueIdentifier {
    /// Human-meaningful reference shared with external systems.
    pub external_id: Option<String>,
    /// Globally unique component.
    pub id: Uuid,
}

impl UniqueIdentifier {
    /// Fresh identifier with a random UUID.
    pub fn new(external_id: Option<String>) -> Self {
        Self {
            external_id,
            id: Uuid::new_v4(),
        }
    }
}

impl fmt::Display for UniqueIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.external_id {
            Some(ext) => write!(f, "{}_{}", ext, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Pointer to an output of a recorded transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateRef {
    /// Transaction that produced the state.
    pub txhash: TransactionId,
    /// Output index inside that transaction.
    pub index: u32,
}

/// Identifier of one agreement session between two nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Fresh random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validity window attached to a transaction and checked by the notary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Earliest instant the transaction may be notarised.
    pub not_before: DateTime<Utc>,
    /// Latest instant the transaction may be notarised.
    pub not_after: DateTime<Utc>,
}

impl TimeWindow {
    /// Window `[start, start + length]`.
    pub fn starting_at(start: DateTime<Utc>, length: Duration) -> Self {
        Self {
            not_before: start,
            not_after: start + length,
        }
    }

    /// Instant halfway through the window.
    pub fn midpoint(&self) -> DateTime<Utc> {
        self.not_before + (self.not_after - self.not_before) / 2
    }

    /// Whether `instant` lies inside the window (inclusive bounds).
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.not_before && instant <= self.not_after
    }

    /// Window length.
    pub fn length(&self) -> Duration {
        self.not_after - self.not_before
    }
}
