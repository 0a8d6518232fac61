//! # Outbound Ports
//!
//! Traits for everything the protocol depends on but does not own:
//! transport, notary, ledger, identities, time and checkpoint storage.

use crate::domain::{
    ChannelError, DigitalSignature, FinalizedTransaction, LedgerError, NotaryRejection,
    PartiallySignedTransaction, Party, ProposedAgreement, PublicKey, PurchaseOrderState,
    SessionId, StateRef, TimeWindow, TransactionId, UniqueIdentifier,
};
use crate::flow::Checkpoint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload exchanged over a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FlowMessage {
    /// Proposer → counterparty.
    Proposal(ProposedAgreement),
    /// Counterparty → proposer, carrying the counterparty signature.
    PartiallySigned(PartiallySignedTransaction),
    /// Proposer → counterparty once notarised and recorded.
    Finalized(FinalizedTransaction),
}

impl FlowMessage {
    /// Message kind for error reports.
    pub fn kind(&self) -> &'static str {
        match self {
            FlowMessage::Proposal(_) => "Proposal",
            FlowMessage::PartiallySigned(_) => "PartiallySigned",
            FlowMessage::Finalized(_) => "Finalized",
        }
    }

    /// Expect a proposal.
    pub fn into_proposal(self) -> Result<ProposedAgreement, ChannelError> {
        match self {
            FlowMessage::Proposal(p) => Ok(p),
            other => Err(unexpected("Proposal", &other)),
        }
    }

    /// Expect a partially signed transaction.
    pub fn into_partially_signed(self) -> Result<PartiallySignedTransaction, ChannelError> {
        match self {
            FlowMessage::PartiallySigned(stx) => Ok(stx),
            other => Err(unexpected("PartiallySigned", &other)),
        }
    }

    /// Expect a finalized transaction.
    pub fn into_finalized(self) -> Result<FinalizedTransaction, ChannelError> {
        match self {
            FlowMessage::Finalized(ftx) => Ok(ftx),
            other => Err(unexpected("Finalized", &other)),
        }
    }
}

fn unexpected(expected: &'static str, got: &FlowMessage) -> ChannelError {
    ChannelError::UnexpectedMessage {
        expected,
        got: got.kind(),
    }
}

/// Ordered, reliable point-to-point channel for one session with one peer.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Session this channel belongs to.
    fn session_id(&self) -> SessionId;

    /// Party at the other end.
    fn peer(&self) -> &Party;

    /// Send without waiting for a reply.
    async fn send(&self, message: FlowMessage) -> Result<(), ChannelError>;

    /// Wait for the next message from the peer.
    async fn receive(&self) -> Result<FlowMessage, ChannelError>;

    /// Send and block for the reply.
    async fn send_and_receive(&self, message: FlowMessage) -> Result<FlowMessage, ChannelError> {
        self.send(message).await?;
        self.receive().await
    }
}

/// A node's attachment to the peer-to-peer transport.
#[async_trait]
pub trait MessageNetwork: Send + Sync {
    /// Open (or reopen) `session` towards `peer`.
    async fn open(
        &self,
        peer: &Party,
        session: SessionId,
    ) -> Result<Box<dyn MessageChannel>, ChannelError>;

    /// Wait for the next inbound session. `None` once the node is detached.
    async fn accept(&self) -> Option<Box<dyn MessageChannel>>;
}

/// Uniqueness service.
#[async_trait]
pub trait NotaryService: Send + Sync {
    /// The notary's identity.
    fn identity(&self) -> &Party;

    /// Sign `stx` if none of its inputs were consumed before and its window
    /// holds now.
    async fn request_signature(
        &self,
        stx: &PartiallySignedTransaction,
        window: TimeWindow,
    ) -> Result<DigitalSignature, NotaryRejection>;
}

/// Durable append-only store of finalized transactions.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Record `tx`. Idempotent by id; returns `false` if already present.
    async fn record(&self, tx: &FinalizedTransaction) -> Result<bool, LedgerError>;

    /// Current (unconsumed) state for a document.
    async fn query(
        &self,
        linear_id: &UniqueIdentifier,
    ) -> Result<Option<PurchaseOrderState>, LedgerError>;

    /// Recorded transaction by id.
    async fn transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Option<FinalizedTransaction>, LedgerError>;

    /// State produced at `state_ref`, if recorded.
    async fn resolve(&self, state_ref: &StateRef)
        -> Result<Option<PurchaseOrderState>, LedgerError>;

    /// Every current state.
    async fn current_states(&self) -> Result<Vec<PurchaseOrderState>, LedgerError>;
}

/// Directory of parties and notaries.
pub trait IdentityRegistry: Send + Sync {
    /// Party by display name.
    fn resolve(&self, name: &str) -> Option<Party>;

    /// Party by owning key.
    fn resolve_key(&self, key: &PublicKey) -> Option<Party>;

    /// Every registered party, notaries included.
    fn parties(&self) -> Vec<Party>;

    /// Registered notaries.
    fn notaries(&self) -> Vec<Party>;
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Now.
    fn now(&self) -> DateTime<Utc>;
}

/// Store for flow continuations.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Insert or overwrite the checkpoint for its session.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), LedgerError>;

    /// Checkpoint for `session`, if any.
    async fn load(&self, session: SessionId) -> Result<Option<Checkpoint>, LedgerError>;

    /// Drop the checkpoint of a finished session.
    async fn remove(&self, session: SessionId) -> Result<(), LedgerError>;

    /// Every stored checkpoint.
    async fn pending(&self) -> Result<Vec<Checkpoint>, LedgerError>;
}
