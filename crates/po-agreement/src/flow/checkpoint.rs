//! # Flow Continuations
//!
//! What a suspended flow needs to carry on: the step it was about to run and
//! the transaction built so far. Flows persist a [`Checkpoint`] before every
//! step and remove it once they end.

use super::state::{CounterpartyStep, ProposerStep};
use crate::domain::{
    FinalizedTransaction, PartiallySignedTransaction, Party, ProposedAgreement,
    PurchaseOrderState, SessionId, TransactionId, UnsignedTransaction,
};
use serde::{Deserialize, Serialize};

/// Proposer continuation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ProposerState {
    /// Build the proposal for this state.
    Init {
        /// Output state to agree on.
        state: PurchaseOrderState,
    },
    /// Send the proposal.
    OfferSent {
        /// The proposal.
        proposal: ProposedAgreement,
    },
    /// Wait for the countersigned transaction.
    AwaitCountersign {
        /// The proposal that was sent.
        proposal: ProposedAgreement,
    },
    /// Resolve inputs and run the contract.
    Validating {
        /// Countersigned transaction.
        stx: PartiallySignedTransaction,
    },
    /// Add our signature.
    Signing {
        /// Validated transaction.
        stx: PartiallySignedTransaction,
    },
    /// Ask the notary.
    AwaitNotary {
        /// Transaction signed by both participants.
        stx: PartiallySignedTransaction,
    },
    /// Record locally.
    Recording {
        /// Notarised transaction.
        ftx: FinalizedTransaction,
    },
    /// Forward to the counterparty.
    SendingFinal {
        /// Recorded transaction.
        ftx: FinalizedTransaction,
    },
    /// Finished.
    Done {
        /// Committed transaction id.
        tx_id: TransactionId,
    },
}

impl ProposerState {
    /// Step this continuation runs.
    pub fn step(&self) -> ProposerStep {
        match self {
            Self::Init { .. } => ProposerStep::Init,
            Self::OfferSent { .. } => ProposerStep::OfferSent,
            Self::AwaitCountersign { .. } => ProposerStep::AwaitCountersign,
            Self::Validating { .. } => ProposerStep::Validating,
            Self::Signing { .. } => ProposerStep::Signing,
            Self::AwaitNotary { .. } => ProposerStep::AwaitNotary,
            Self::Recording { .. } => ProposerStep::Recording,
            Self::SendingFinal { .. } => ProposerStep::SendingFinal,
            Self::Done { .. } => ProposerStep::Done,
        }
    }
}

/// Counterparty continuation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CounterpartyState {
    /// Wait for a proposal.
    AwaitOffer,
    /// Derive the unsigned transaction.
    BuildTx {
        /// Structurally checked proposal.
        proposal: ProposedAgreement,
    },
    /// Sign and return.
    Sign {
        /// Derived transaction.
        tx: UnsignedTransaction,
    },
    /// Wait for the finalized transaction.
    AwaitFinal {
        /// What we signed and returned.
        stx: PartiallySignedTransaction,
    },
    /// Check the finalized transaction.
    ValidateFinal {
        /// Expected transaction id.
        expected: TransactionId,
        /// Received transaction.
        ftx: FinalizedTransaction,
    },
    /// Record locally.
    Recording {
        /// Checked transaction.
        ftx: FinalizedTransaction,
    },
    /// Finished.
    Done {
        /// Committed transaction id.
        tx_id: TransactionId,
    },
}

impl CounterpartyState {
    /// Step this continuation runs.
    pub fn step(&self) -> CounterpartyStep {
        match self {
            Self::AwaitOffer => CounterpartyStep::AwaitOffer,
            Self::BuildTx { .. } => CounterpartyStep::BuildTx,
            Self::Sign { .. } => CounterpartyStep::Sign,
            Self::AwaitFinal { .. } => CounterpartyStep::AwaitFinal,
            Self::ValidateFinal { .. } => CounterpartyStep::ValidateFinal,
            Self::Recording { .. } => CounterpartyStep::Recording,
            Self::Done { .. } => CounterpartyStep::Done,
        }
    }
}

/// Role-tagged continuation of one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Checkpoint {
    /// Proposing side.
    Proposer {
        /// Session.
        session: SessionId,
        /// Counterparty.
        peer: Party,
        /// Notary chosen for the session.
        notary: Party,
        /// Where to continue.
        state: ProposerState,
    },
    /// Countersigning side.
    Counterparty {
        /// Session.
        session: SessionId,
        /// Proposer.
        peer: Party,
        /// Where to continue.
        state: CounterpartyState,
    },
}

impl Checkpoint {
    /// Session the checkpoint belongs to.
    pub fn session(&self) -> SessionId {
        match self {
            Self::Proposer { session, .. } | Self::Counterparty { session, .. } => *session,
        }
    }

    /// The other party.
    pub fn peer(&self) -> &Party {
        match self {
            Self::Proposer { peer, .. } | Self::Counterparty { peer, .. } => peer,
        }
    }

    /// Role label.
    pub fn role(&self) -> &'static str {
        match self {
            Self::Proposer { .. } => "proposer",
            Self::Counterparty { .. } => "counterparty",
        }
    }

    /// Label of the step the session will continue with.
    pub fn step_label(&self) -> &'static str {
        use super::state::FlowStep;
        match self {
            Self::Proposer { state, .. } => state.step().label(),
            Self::Counterparty { state, .. } => state.step().label(),
        }
    }
}
