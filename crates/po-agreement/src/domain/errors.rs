//! # Domain Errors
//!
//! Error types for the agreement protocol.
//!
//! Every failure a caller can observe is a [`FlowError`] carrying exactly one
//! [`FailureKind`]. Lower-level errors (assembly, ledger, channel, crypto)
//! convert into that taxonomy through `From`.

use super::value_objects::{PublicKey, StateRef, TransactionId};
use std::fmt;
use thiserror::Error;

/// Result alias used by the flows and the service.
pub type FlowResult<T> = Result<T, FlowError>;

/// Tag identifying the taxonomy kind of a [`FlowError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Contract rules rejected the transaction.
    ValidationFailure,
    /// A signature did not match the expected key or transaction.
    SignatureInvalid,
    /// The notary refused or did not answer.
    NotaryRejected,
    /// The session transport failed.
    ChannelError,
    /// Anything else; detail is kept minimal.
    Unrecognized,
}

impl FailureKind {
    /// Stable lowercase label (metrics, logs).
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ValidationFailure => "validation_failure",
            FailureKind::SignatureInvalid => "signature_invalid",
            FailureKind::NotaryRejected => "notary_rejected",
            FailureKind::ChannelError => "channel_error",
            FailureKind::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of an agreement session.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FlowError {
    /// Contract validation failed; reasons are reported verbatim.
    #[error("Validation failed: {0}")]
    ValidationFailure(#[from] ValidationFailure),

    /// Signature tampering, substitution or a missing signature.
    #[error("Invalid signature: {reason}")]
    SignatureInvalid {
        /// What was wrong.
        reason: String,
    },

    /// The notary refused to sign or the outcome is unknown.
    #[error("Notary rejected transaction: {0}")]
    NotaryRejected(#[from] NotaryRejection),

    /// Session transport failure.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Unexpected internal condition.
    #[error("Unrecognized error: {detail}")]
    Unrecognized {
        /// Short detail, no internals.
        detail: String,
    },
}

impl FlowError {
    /// Taxonomy kind of this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            FlowError::ValidationFailure(_) => FailureKind::ValidationFailure,
            FlowError::SignatureInvalid { .. } => FailureKind::SignatureInvalid,
            FlowError::NotaryRejected(_) => FailureKind::NotaryRejected,
            FlowError::Channel(_) => FailureKind::ChannelError,
            FlowError::Unrecognized { .. } => FailureKind::Unrecognized,
        }
    }

    /// Shorthand for a signature failure.
    pub fn signature(reason: impl Into<String>) -> Self {
        FlowError::SignatureInvalid {
            reason: reason.into(),
        }
    }

    /// Shorthand for an unrecognized failure.
    pub fn unrecognized(detail: impl Into<String>) -> Self {
        FlowError::Unrecognized {
            detail: detail.into(),
        }
    }
}

impl From<AssemblyError> for FlowError {
    fn from(err: AssemblyError) -> Self {
        FlowError::signature(err.to_string())
    }
}

impl From<LedgerError> for FlowError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UnresolvedInput(state_ref) => FlowError::ValidationFailure(
                ValidationFailure::single("inputs", format!("Unresolvable input {state_ref:?}")),
            ),
            other => FlowError::unrecognized(other.to_string()),
        }
    }
}

impl From<CryptoError> for FlowError {
    fn from(err: CryptoError) -> Self {
        FlowError::signature(err.to_string())
    }
}

/// Rejection produced by the contract rule interpreter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{clause}: {}", .reasons.join("; "))]
pub struct ValidationFailure {
    /// Name of the failing clause.
    pub clause: String,
    /// Human-readable reasons, in evaluation order.
    pub reasons: Vec<String>,
}

impl ValidationFailure {
    /// Failure with one reason.
    pub fn single(clause: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            clause: clause.into(),
            reasons: vec![reason.into()],
        }
    }

    /// Whether any reason contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.reasons.iter().any(|r| r.contains(needle))
    }
}

/// Notary refusal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotaryRejection {
    /// No answer in time, or the outcome of an earlier request is unknown.
    #[error("notary request timed out")]
    TimedOut,

    /// One or more inputs were already consumed by another transaction.
    #[error("input conflict: {} input(s) already consumed by {consuming_tx}", .consumed.len())]
    Conflict {
        /// Inputs already spent.
        consumed: Vec<StateRef>,
        /// Transaction that spent them first.
        consuming_tx: TransactionId,
    },

    /// The notary's clock lies outside the transaction's validity window.
    /// Reported under the notary-rejected kind like the other refusals.
    #[error("time window invalid: {detail}")]
    InvalidTimeWindow {
        /// Window and clock reading.
        detail: String,
    },
}

/// Per-session transport failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The peer cannot be reached.
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    /// No party with this name is registered.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// No message arrived in time.
    #[error("receive timed out")]
    Timeout,

    /// Payload could not be decoded.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// A message of the wrong type arrived.
    #[error("unexpected message: expected {expected}, got {got}")]
    UnexpectedMessage {
        /// Expected message kind.
        expected: &'static str,
        /// Received message kind.
        got: &'static str,
    },

    /// The session was closed by the other side.
    #[error("channel closed")]
    Closed,
}

/// Errors from the pure transaction assembly operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssemblyError {
    /// Signer is neither a participant nor the notary.
    #[error("signer {0} is not a required signer")]
    UnauthorizedSigner(PublicKey),

    /// Signature does not verify over the transaction id.
    #[error("signature by {0} does not verify over the transaction id")]
    BadSignature(PublicKey),

    /// Required signatures are absent.
    #[error("missing signatures from {}", fmt_keys(.0))]
    MissingSignatures(Vec<PublicKey>),

    /// The notary signature came from another key.
    #[error("notary signature by {got}, expected {expected}")]
    WrongNotary {
        /// Notary named in the transaction.
        expected: PublicKey,
        /// Key that actually signed.
        got: PublicKey,
    },

    /// Unsigned transaction differs from the one the signer expected.
    #[error("transaction substituted: expected {expected}, got {got}")]
    TransactionMismatch {
        /// Locally derived id.
        expected: TransactionId,
        /// Received id.
        got: TransactionId,
    },
}

fn fmt_keys(keys: &[PublicKey]) -> String {
    keys.iter()
        .map(PublicKey::short)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Ledger store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Declared input does not exist in the ledger.
    #[error("unresolved input: {0:?}")]
    UnresolvedInput(StateRef),

    /// Storage backend failure.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Key and signature handling errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Bytes are not a valid Ed25519 point.
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Signature did not verify.
    #[error("Signature verification failed")]
    SignatureVerificationFailed,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A duration that must be positive is zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// Environment variable could not be parsed.
    #[error("invalid value for {var}: {value}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },

    /// Configured notary name is not a registered notary.
    #[error("notary not found: {0}")]
    UnknownNotary(String),

    /// Registry holds no notary at all.
    #[error("no notary registered")]
    NoNotary,
}

impl From<ConfigError> for FlowError {
    fn from(err: ConfigError) -> Self {
        FlowError::unrecognized(err.to_string())
    }
}
