//! # Flow Steps
//!
//! Finite-state enums for both roles, their transition tables, and the
//! read-only progress watch each flow exposes.

use crate::domain::FlowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;
use tracing::debug;

/// Behaviour shared by the step enums of both roles.
pub trait FlowStep: Copy + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Human-readable description of the step.
    fn label(&self) -> &'static str;

    /// Whether `next` may follow `self`.
    fn can_transition_to(&self, next: Self) -> bool;

    /// Whether the flow has ended.
    fn is_terminal(&self) -> bool;

    /// The failure step.
    fn failed() -> Self;
}

/// Steps of the proposing side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposerStep {
    /// Nothing sent yet.
    #[default]
    Init,
    /// Proposal being sent.
    OfferSent,
    /// Waiting for the counterparty's signature.
    AwaitCountersign,
    /// Checking contract rules.
    Validating,
    /// Adding our signature.
    Signing,
    /// Waiting for the notary.
    AwaitNotary,
    /// Writing to the local ledger.
    Recording,
    /// Forwarding the finalized transaction.
    SendingFinal,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
}

impl FlowStep for ProposerStep {
    fn label(&self) -> &'static str {
        match self {
            Self::Init => "Constructing proposed purchase order.",
            Self::OfferSent => "Sending purchase order to seller for review.",
            Self::AwaitCountersign => "Receiving partially signed transaction from seller.",
            Self::Validating => "Verifying signatures and contract constraints.",
            Self::Signing => "Signing transaction with our private key.",
            Self::AwaitNotary => "Obtaining notary signature.",
            Self::Recording => "Recording transaction in vault.",
            Self::SendingFinal => "Sending fully signed transaction to seller.",
            Self::Done => "Done.",
            Self::Failed => "Failed.",
        }
    }

    fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Init, Self::OfferSent) => true,
            (Self::OfferSent, Self::AwaitCountersign) => true,
            (Self::AwaitCountersign, Self::Validating) => true,
            (Self::Validating, Self::Signing) => true,
            (Self::Signing, Self::AwaitNotary) => true,
            (Self::AwaitNotary, Self::Recording) => true,
            (Self::Recording, Self::SendingFinal) => true,
            (Self::SendingFinal, Self::Done) => true,
            (from, Self::Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    fn failed() -> Self {
        Self::Failed
    }
}

/// Steps of the countersigning side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CounterpartyStep {
    /// Waiting for a proposal.
    #[default]
    AwaitOffer,
    /// Deriving the unsigned transaction.
    BuildTx,
    /// Signing and returning it.
    Sign,
    /// Waiting for the finalized transaction.
    AwaitFinal,
    /// Checking signatures and contract rules.
    ValidateFinal,
    /// Writing to the local ledger.
    Recording,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
}

impl FlowStep for CounterpartyStep {
    fn label(&self) -> &'static str {
        match self {
            Self::AwaitOffer => "Receiving proposed purchase order from buyer.",
            Self::BuildTx => "Generating transaction based on proposed purchase order.",
            Self::Sign => "Signing proposed transaction with our private key.",
            Self::AwaitFinal => "Sending partially signed transaction to buyer and wait for a response.",
            Self::ValidateFinal => "Verifying signatures and contract constraints.",
            Self::Recording => "Recording transaction in vault.",
            Self::Done => "Done.",
            Self::Failed => "Failed.",
        }
    }

    fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::AwaitOffer, Self::BuildTx) => true,
            (Self::BuildTx, Self::Sign) => true,
            (Self::Sign, Self::AwaitFinal) => true,
            (Self::AwaitFinal, Self::ValidateFinal) => true,
            // finalized transaction re-forwarded after the proposer restarted
            (Self::AwaitOffer, Self::ValidateFinal) => true,
            (Self::ValidateFinal, Self::Recording) => true,
            (Self::Recording, Self::Done) => true,
            (from, Self::Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    fn failed() -> Self {
        Self::Failed
    }
}

/// Publishes the current step of one flow.
///
/// Observers hold a [`watch::Receiver`] and can only read.
#[derive(Debug)]
pub struct ProgressTracker<S: FlowStep> {
    sender: watch::Sender<S>,
}

impl<S: FlowStep> ProgressTracker<S> {
    /// Tracker positioned at `initial`.
    pub fn new(initial: S) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Current step.
    pub fn current(&self) -> S {
        *self.sender.borrow()
    }

    /// Read-only view.
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.sender.subscribe()
    }

    /// Move to `next`, enforcing the transition table.
    pub(crate) fn advance(&self, next: S) -> Result<(), FlowError> {
        let current = self.current();
        if current == next {
            return Ok(());
        }
        if !current.can_transition_to(next) {
            return Err(FlowError::unrecognized(format!(
                "invalid step transition {:?} -> {:?}",
                current, next
            )));
        }
        debug!(from = ?current, to = ?next, step = next.label(), "[po] step");
        self.sender.send_replace(next);
        Ok(())
    }

    /// Jump to a step restored from a checkpoint.
    pub(crate) fn restore(&self, step: S) {
        debug!(step = ?step, "[po] restored");
        self.sender.send_replace(step);
    }

    /// Mark the flow failed unless it already ended.
    pub(crate) fn fail(&self) {
        if !self.current().is_terminal() {
            self.sender.send_replace(S::failed());
        }
    }
}
