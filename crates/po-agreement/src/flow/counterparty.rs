//! # Counterparty Flow
//!
//! ```text
//! AWAIT_OFFER → BUILD_TX → SIGN → AWAIT_FINAL → VALIDATE_FINAL → RECORDING → DONE
//! ```
//!
//! The counterparty signs what it derived itself, never what it was sent,
//! and records only after every signature is present and the contract
//! passes again on its own side.
//!
//! Two messages are accepted out of the usual order so that a restarted
//! proposer can finish its session:
//!
//! - a finalized transaction at AWAIT_OFFER (the proposer recorded, then
//!   lost the forward) goes straight to VALIDATE_FINAL;
//! - the same proposal again at AWAIT_FINAL (the proposer lost our reply)
//!   is answered with the stored partial transaction.

use super::checkpoint::{Checkpoint, CounterpartyState};
use super::state::{CounterpartyStep, FlowStep, ProgressTracker};
use super::FlowContext;
use crate::algorithms::{build_unsigned, check_proposal, check_recovered, derive_unsigned, sign};
use crate::domain::{
    AssemblyError, FinalizedTransaction, FlowError, FlowResult, PartiallySignedTransaction,
    Party, ProposedAgreement, TransactionId, ValidationFailure,
};
use crate::metrics;
use crate::ports::{FlowMessage, MessageChannel};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const ROLE: &str = "counterparty";

/// Countersigning side of one session.
pub struct CounterpartyFlow {
    ctx: FlowContext,
    channel: Box<dyn MessageChannel>,
    progress: ProgressTracker<CounterpartyStep>,
}

impl CounterpartyFlow {
    /// Flow answering the proposer at the other end of `channel`.
    pub fn new(ctx: FlowContext, channel: Box<dyn MessageChannel>) -> Self {
        Self {
            ctx,
            channel,
            progress: ProgressTracker::new(CounterpartyStep::AwaitOffer),
        }
    }

    /// Read-only view of the current step.
    pub fn progress(&self) -> watch::Receiver<CounterpartyStep> {
        self.progress.subscribe()
    }

    /// Wait for a proposal and drive the session to the end.
    pub async fn respond(self) -> FlowResult<TransactionId> {
        metrics::record_session_started(ROLE);
        info!(
            session_id = %self.channel.session_id(),
            peer = %self.channel.peer(),
            "[po] responding to proposal"
        );
        let result = self.run(CounterpartyState::AwaitOffer).await;
        self.finish(result).await
    }

    /// Continue a session from a stored continuation.
    ///
    /// Until our signature has been sent the proposer starts over with a
    /// fresh proposal, so those continuations fall back to waiting for it.
    pub async fn resume(self, state: CounterpartyState) -> FlowResult<TransactionId> {
        let state = match state {
            CounterpartyState::BuildTx { .. } | CounterpartyState::Sign { .. } => {
                CounterpartyState::AwaitOffer
            }
            other => other,
        };
        self.progress.restore(state.step());
        info!(
            session_id = %self.channel.session_id(),
            step = ?state.step(),
            "[po] resuming counterparty"
        );
        let result = self.run(state).await;
        self.finish(result).await
    }

    async fn finish(&self, result: FlowResult<TransactionId>) -> FlowResult<TransactionId> {
        let session = self.channel.session_id();
        if let Err(err) = self.ctx.clear(session).await {
            warn!(session_id = %session, error = %err, "[po] could not clear checkpoint");
        }
        match &result {
            Ok(tx_id) => {
                metrics::record_session_completed(ROLE);
                info!(session_id = %session, tx_id = %tx_id, "[po] agreement recorded");
            }
            Err(err) => {
                self.progress.fail();
                metrics::record_session_failed(ROLE, err.kind().as_str());
                if let FlowError::Unrecognized { .. } = err {
                    error!(session_id = %session, kind = %err.kind(), "[po] counterparty failed: {}", err);
                } else {
                    warn!(session_id = %session, kind = %err.kind(), "[po] counterparty failed: {}", err);
                }
            }
        }
        result
    }

    async fn checkpoint(&self, state: &CounterpartyState) -> FlowResult<()> {
        self.ctx
            .save(&Checkpoint::Counterparty {
                session: self.channel.session_id(),
                peer: self.channel.peer().clone(),
                state: state.clone(),
            })
            .await
    }

    fn ensure_known_notary(&self, clause: &str, notary: &Party) -> Result<(), ValidationFailure> {
        let registered = self
            .ctx
            .identities
            .resolve_key(&notary.owning_key)
            .is_some_and(|party| party == *notary);
        if registered && self.ctx.identities.notaries().contains(notary) {
            Ok(())
        } else {
            Err(ValidationFailure::single(
                clause,
                format!("{} is not a known notary", notary),
            ))
        }
    }

    /// Accept a finalized transaction for a session we hold no state for.
    fn recover(&self, ftx: FinalizedTransaction) -> FlowResult<CounterpartyState> {
        check_recovered(&ftx, self.ctx.identity.party(), self.channel.peer())?;
        self.ensure_known_notary("Recovery", &ftx.tx().notary)?;
        info!(
            session_id = %self.channel.session_id(),
            tx_id = %ftx.id(),
            "[po] finalized transaction received without a pending offer, recovering"
        );
        Ok(CounterpartyState::ValidateFinal {
            expected: ftx.id(),
            ftx,
        })
    }

    async fn run(&self, start: CounterpartyState) -> FlowResult<TransactionId> {
        let mut state = start;
        loop {
            self.progress.advance(state.step())?;
            if !state.step().is_terminal() {
                self.checkpoint(&state).await?;
            }
            state = match state {
                CounterpartyState::AwaitOffer => {
                    match self.ctx.receive(self.channel.as_ref()).await? {
                        FlowMessage::Finalized(ftx) => self.recover(ftx)?,
                        message => {
                            let proposal = message.into_proposal()?;
                            check_proposal(
                                &proposal,
                                self.ctx.identity.party(),
                                self.channel.peer(),
                            )?;
                            self.ensure_known_notary("Proposal", &proposal.notary)?;
                            CounterpartyState::BuildTx { proposal }
                        }
                    }
                }

                CounterpartyState::BuildTx { proposal } => {
                    let tx = build_unsigned(
                        &proposal,
                        self.ctx.clock.now(),
                        self.ctx.config.window_length(),
                    );
                    debug!(tx_id = %tx.id(), "[po] derived unsigned transaction");
                    CounterpartyState::Sign { tx }
                }

                CounterpartyState::Sign { tx } => {
                    let mut stx = PartiallySignedTransaction::new(tx);
                    sign(&mut stx, self.ctx.identity.keypair())?;
                    self.channel
                        .send(FlowMessage::PartiallySigned(stx.clone()))
                        .await?;
                    CounterpartyState::AwaitFinal { stx }
                }

                CounterpartyState::AwaitFinal { stx } => {
                    let mut message = self.ctx.receive(self.channel.as_ref()).await?;
                    while let FlowMessage::Proposal(proposal) = &message {
                        if !is_replay(proposal, &stx) {
                            break;
                        }
                        debug!(tx_id = %stx.id(), "[po] proposal repeated, returning stored signature");
                        let reply = FlowMessage::PartiallySigned(stx.clone());
                        message = self.ctx.exchange(self.channel.as_ref(), reply).await?;
                    }
                    CounterpartyState::ValidateFinal {
                        expected: stx.id(),
                        ftx: message.into_finalized()?,
                    }
                }

                CounterpartyState::ValidateFinal { expected, ftx } => {
                    if ftx.id() != expected {
                        return Err(AssemblyError::TransactionMismatch {
                            expected,
                            got: ftx.id(),
                        }
                        .into());
                    }
                    // signer set was checked when the message was decoded
                    debug!(tx_id = %expected, signatures = ftx.signature_count(), "[po] finalized transaction received");
                    self.ctx.validate(ftx.tx()).await?;
                    CounterpartyState::Recording { ftx }
                }

                CounterpartyState::Recording { ftx } => {
                    self.ctx.record(&ftx).await?;
                    CounterpartyState::Done { tx_id: ftx.id() }
                }

                CounterpartyState::Done { tx_id } => return Ok(tx_id),
            };
        }
    }
}

/// Whether `proposal` is the one `stx` was built from.
fn is_replay(proposal: &ProposedAgreement, stx: &PartiallySignedTransaction) -> bool {
    stx.tx()
        .time_window
        .is_some_and(|window| derive_unsigned(proposal, window).id() == stx.id())
}
