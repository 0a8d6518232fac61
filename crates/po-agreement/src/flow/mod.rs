//! # Agreement Flows
//!
//! The two roles of the handshake as suspend/resume state machines.
//!
//! Each flow is a loop over a data-carrying continuation
//! ([`ProposerState`] / [`CounterpartyState`]). Before a step runs, its
//! continuation is saved to the [`CheckpointStore`]; once the flow ends
//! (either way) the checkpoint is removed, so nothing partial outlives a
//! failed session.

pub mod checkpoint;
pub mod counterparty;
pub mod proposer;
pub mod state;

pub use checkpoint::{Checkpoint, CounterpartyState, ProposerState};
pub use counterparty::CounterpartyFlow;
pub use proposer::ProposerFlow;
pub use state::{CounterpartyStep, FlowStep, ProgressTracker, ProposerStep};

use crate::algorithms::PurchaseOrderContract;
use crate::config::AgreementConfig;
use crate::crypto::LocalIdentity;
use crate::domain::{
    ChannelError, FinalizedTransaction, FlowResult, LedgerError, LedgerTransaction, SessionId,
    UnsignedTransaction,
};
use crate::metrics;
use crate::ports::{
    CheckpointStore, Clock, FlowMessage, IdentityRegistry, LedgerStore, MessageChannel,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Everything a flow needs from its node. Cheap to clone; sessions share
/// only the ledger and the stores behind these handles.
#[derive(Clone)]
pub struct FlowContext {
    /// Our identity and signing key.
    pub identity: Arc<LocalIdentity>,
    /// Party and notary directory.
    pub identities: Arc<dyn IdentityRegistry>,
    /// Local ledger.
    pub ledger: Arc<dyn LedgerStore>,
    /// Continuation store.
    pub checkpoints: Arc<dyn CheckpointStore>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Contract rules.
    pub contract: PurchaseOrderContract,
    /// Protocol tunables.
    pub config: AgreementConfig,
}

impl FlowContext {
    /// Receive the next message, bounded by the receive timeout.
    pub(crate) async fn receive(&self, channel: &dyn MessageChannel) -> FlowResult<FlowMessage> {
        match tokio::time::timeout(self.config.receive_timeout, channel.receive()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ChannelError::Timeout.into()),
        }
    }

    /// Send `message` and wait for the reply, bounded by the receive timeout.
    pub(crate) async fn exchange(
        &self,
        channel: &dyn MessageChannel,
        message: FlowMessage,
    ) -> FlowResult<FlowMessage> {
        match tokio::time::timeout(self.config.receive_timeout, channel.send_and_receive(message))
            .await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(ChannelError::Timeout.into()),
        }
    }

    /// Resolve declared inputs through the ledger.
    pub(crate) async fn resolve(&self, tx: &UnsignedTransaction) -> FlowResult<LedgerTransaction> {
        let mut inputs = Vec::with_capacity(tx.inputs.len());
        for state_ref in &tx.inputs {
            let state = self
                .ledger
                .resolve(state_ref)
                .await?
                .ok_or(LedgerError::UnresolvedInput(*state_ref))?;
            inputs.push(state);
        }
        Ok(LedgerTransaction::new(tx, inputs))
    }

    /// Resolve inputs and run the contract.
    pub(crate) async fn validate(&self, tx: &UnsignedTransaction) -> FlowResult<()> {
        let ltx = self.resolve(tx).await?;
        self.contract.verify(&ltx)?;
        debug!(tx_id = %ltx.id, "[po] contract verified");
        Ok(())
    }

    /// Append to the local ledger (idempotent).
    pub(crate) async fn record(&self, ftx: &FinalizedTransaction) -> FlowResult<()> {
        let fresh = self.ledger.record(ftx).await?;
        if fresh {
            metrics::record_transaction_recorded();
            info!(tx_id = %ftx.id(), "[po] transaction recorded");
        } else {
            debug!(tx_id = %ftx.id(), "[po] transaction already recorded");
        }
        Ok(())
    }

    pub(crate) async fn save(&self, checkpoint: &Checkpoint) -> FlowResult<()> {
        if self.config.checkpointing {
            self.checkpoints.save(checkpoint).await?;
        }
        Ok(())
    }

    pub(crate) async fn clear(&self, session: SessionId) -> FlowResult<()> {
        if self.config.checkpointing {
            self.checkpoints.remove(session).await?;
        }
        Ok(())
    }
}
