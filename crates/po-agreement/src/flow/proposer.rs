//! # Proposer Flow
//!
//! ```text
//! INIT → OFFER_SENT → AWAIT_COUNTERSIGN → VALIDATING → SIGNING
//!      → AWAIT_NOTARY → RECORDING → SENDING_FINAL → DONE
//! ```
//!
//! Any step may end in FAILED. Signature problems and notary rejections are
//! terminal; nothing is retried.

use super::checkpoint::{Checkpoint, ProposerState};
use super::state::{FlowStep, ProgressTracker, ProposerStep};
use super::FlowContext;
use crate::algorithms::{
    build_proposal, check_window, derive_unsigned, ensure_same_transaction, finalize, sign,
    verify_signatures,
};
use crate::domain::{
    FlowError, FlowResult, NotaryRejection, Party, PurchaseOrderState, TransactionId,
};
use crate::metrics;
use crate::ports::{FlowMessage, MessageChannel, NotaryService};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const ROLE: &str = "proposer";

/// Proposing side of one session.
pub struct ProposerFlow {
    ctx: FlowContext,
    notary: Arc<dyn NotaryService>,
    channel: Box<dyn MessageChannel>,
    progress: ProgressTracker<ProposerStep>,
}

impl ProposerFlow {
    /// Flow over `channel`, notarising with `notary`.
    pub fn new(
        ctx: FlowContext,
        notary: Arc<dyn NotaryService>,
        channel: Box<dyn MessageChannel>,
    ) -> Self {
        Self {
            ctx,
            notary,
            channel,
            progress: ProgressTracker::new(ProposerStep::Init),
        }
    }

    /// Read-only view of the current step.
    pub fn progress(&self) -> watch::Receiver<ProposerStep> {
        self.progress.subscribe()
    }

    /// Propose `state` to the channel's peer and drive the session to the end.
    pub async fn initiate(self, state: PurchaseOrderState) -> FlowResult<TransactionId> {
        metrics::record_session_started(ROLE);
        info!(
            session_id = %self.channel.session_id(),
            peer = %self.channel.peer(),
            reference = state.reference().unwrap_or_default(),
            "[po] proposing purchase order"
        );
        self.drive(ProposerState::Init { state }).await
    }

    /// Continue a session from a stored continuation.
    ///
    /// A continuation waiting on the notary is never re-submitted: the
    /// earlier request may or may not have been signed, so the session ends
    /// as timed out. A continuation still waiting for the countersignature
    /// re-sends the proposal, since the reply was lost with the old channel.
    pub async fn resume(self, state: ProposerState) -> FlowResult<TransactionId> {
        let state = match state {
            ProposerState::AwaitCountersign { proposal } => ProposerState::OfferSent { proposal },
            other => other,
        };
        self.progress.restore(state.step());
        info!(
            session_id = %self.channel.session_id(),
            step = ?state.step(),
            "[po] resuming proposer"
        );
        if let ProposerState::AwaitNotary { .. } = state {
            warn!(
                session_id = %self.channel.session_id(),
                "[po] notary outcome unknown after restart, not retrying"
            );
            return self
                .finish(Err(FlowError::from(NotaryRejection::TimedOut)))
                .await;
        }
        self.drive(state).await
    }

    async fn drive(&self, start: ProposerState) -> FlowResult<TransactionId> {
        let result = self.run(start).await;
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
                info!(session_id = %session, tx_id = %tx_id, "[po] agreement committed");
            }
            Err(err) => {
                self.progress.fail();
                metrics::record_session_failed(ROLE, err.kind().as_str());
                match err {
                    FlowError::Unrecognized { .. } => {
                        error!(session_id = %session, kind = %err.kind(), "[po] proposer failed: {}", err)
                    }
                    _ => {
                        warn!(session_id = %session, kind = %err.kind(), "[po] proposer failed: {}", err)
                    }
                }
            }
        }
        result
    }

    async fn checkpoint(&self, state: &ProposerState) -> FlowResult<()> {
        self.ctx
            .save(&Checkpoint::Proposer {
                session: self.channel.session_id(),
                peer: self.channel.peer().clone(),
                notary: self.notary.identity().clone(),
                state: state.clone(),
            })
            .await
    }

    fn me(&self) -> &Party {
        self.ctx.identity.party()
    }

    async fn run(&self, start: ProposerState) -> FlowResult<TransactionId> {
        let mut state = start;
        loop {
            self.progress.advance(state.step())?;
            if !state.step().is_terminal() {
                self.checkpoint(&state).await?;
            }
            state = match state {
                ProposerState::Init { state: output } => {
                    let proposal = build_proposal(
                        output,
                        self.me().clone(),
                        self.channel.peer().clone(),
                        self.notary.identity().clone(),
                    );
                    ProposerState::OfferSent { proposal }
                }

                ProposerState::OfferSent { proposal } => {
                    self.channel
                        .send(FlowMessage::Proposal(proposal.clone()))
                        .await?;
                    ProposerState::AwaitCountersign { proposal }
                }

                ProposerState::AwaitCountersign { proposal } => {
                    let stx = self
                        .ctx
                        .receive(self.channel.as_ref())
                        .await?
                        .into_partially_signed()?;

                    let window = stx.tx().time_window.ok_or_else(|| {
                        FlowError::signature("countersigned transaction carries no time window")
                    })?;
                    check_window(
                        &window,
                        self.ctx.clock.now(),
                        self.ctx.config.window_length(),
                        self.ctx.config.clock_skew(),
                    )?;
                    let expected = derive_unsigned(&proposal, window);
                    ensure_same_transaction(&expected, &stx)?;
                    verify_signatures(
                        &stx,
                        &[self.me().owning_key, self.notary.identity().owning_key],
                    )?;
                    debug!(tx_id = %stx.id(), "[po] countersignature verified");
                    ProposerState::Validating { stx }
                }

                ProposerState::Validating { stx } => {
                    self.ctx.validate(stx.tx()).await?;
                    ProposerState::Signing { stx }
                }

                ProposerState::Signing { mut stx } => {
                    sign(&mut stx, self.ctx.identity.keypair())?;
                    ProposerState::AwaitNotary { stx }
                }

                ProposerState::AwaitNotary { stx } => {
                    let window = stx.tx().time_window.ok_or_else(|| {
                        FlowError::unrecognized("transaction lost its time window")
                    })?;
                    let request = self.notary.request_signature(&stx, window);
                    let signature =
                        match tokio::time::timeout(self.ctx.config.notary_timeout, request).await {
                            Ok(Ok(signature)) => {
                                metrics::record_notary_request("signed");
                                signature
                            }
                            Ok(Err(rejection)) => {
                                metrics::record_notary_request("rejected");
                                return Err(rejection.into());
                            }
                            Err(_) => {
                                metrics::record_notary_request("timed_out");
                                return Err(NotaryRejection::TimedOut.into());
                            }
                        };
                    let ftx = finalize(stx, signature)?;
                    ProposerState::Recording { ftx }
                }

                ProposerState::Recording { ftx } => {
                    self.ctx.record(&ftx).await?;
                    ProposerState::SendingFinal { ftx }
                }

                ProposerState::SendingFinal { ftx } => {
                    let tx_id = ftx.id();
                    if let Err(err) = self.channel.send(FlowMessage::Finalized(ftx)).await {
                        warn!(
                            tx_id = %tx_id,
                            error = %err,
                            "[po] could not forward finalized transaction; local commit stands"
                        );
                    }
                    ProposerState::Done { tx_id }
                }

                ProposerState::Done { tx_id } => return Ok(tx_id),
            };
        }
    }
}
