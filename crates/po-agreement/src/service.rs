//! Agreement Service - one node's view of the protocol
//!
//! Resolves counterparties and notaries, opens sessions and runs one flow
//! per session. Sessions share nothing but the ledger, the checkpoint store
//! and the notaries behind the [`FlowContext`].

use crate::domain::invariants::reasons;
use crate::domain::{
    ChannelError, ConfigError, FlowError, FlowResult, Party, PurchaseOrder, PurchaseOrderState,
    SessionId, TransactionId, ValidationFailure,
};
use crate::flow::{Checkpoint, CounterpartyFlow, FlowContext, ProposerFlow};
use crate::ports::{AgreementApi, MessageChannel, MessageNetwork, NotaryService};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Agreement node service.
pub struct AgreementService {
    ctx: FlowContext,
    network: Arc<dyn MessageNetwork>,
    notaries: Vec<Arc<dyn NotaryService>>,
}

impl AgreementService {
    /// Service for the node described by `ctx`, reachable through `network`
    /// and notarising through one of `notaries`.
    pub fn new(
        ctx: FlowContext,
        network: Arc<dyn MessageNetwork>,
        notaries: Vec<Arc<dyn NotaryService>>,
    ) -> Self {
        Self {
            ctx,
            network,
            notaries,
        }
    }

    /// Shared flow context.
    pub fn context(&self) -> &FlowContext {
        &self.ctx
    }

    /// Our party.
    pub fn party(&self) -> &Party {
        self.ctx.identity.party()
    }

    /// Notary picked by the configured selection policy.
    pub fn select_notary(&self) -> FlowResult<Arc<dyn NotaryService>> {
        let parties: Vec<Party> = self.notaries.iter().map(|n| n.identity().clone()).collect();
        let chosen = self.ctx.config.notary_selection.select(&parties)?;
        self.notary_for(chosen)
    }

    fn notary_for(&self, party: &Party) -> FlowResult<Arc<dyn NotaryService>> {
        self.notaries
            .iter()
            .find(|n| n.identity() == party)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownNotary(party.name.clone()).into())
    }

    /// Build the output state for `order` with us as buyer.
    pub fn purchase_order_state(
        &self,
        order: PurchaseOrder,
        counterparty: &str,
    ) -> FlowResult<PurchaseOrderState> {
        let seller = self
            .ctx
            .identities
            .resolve(counterparty)
            .ok_or_else(|| ChannelError::UnknownPeer(counterparty.to_string()))?;
        if seller == *self.party() {
            return Err(ValidationFailure::single("Proposal", reasons::DISTINCT_PARTIES).into());
        }
        Ok(PurchaseOrderState::new(order, self.party().clone(), seller))
    }

    /// Open a fresh session towards the seller of `state` and run the
    /// proposer flow.
    pub async fn propose(&self, state: PurchaseOrderState) -> FlowResult<TransactionId> {
        let notary = self.select_notary()?;
        let session = SessionId::new();
        let channel = self.network.open(&state.seller, session).await?;
        debug!(session_id = %session, notary = %notary.identity(), "[po] session opened for proposal");
        ProposerFlow::new(self.ctx.clone(), notary, channel)
            .initiate(state)
            .await
    }

    /// Run the counterparty side of an accepted session, continuing from
    /// our checkpoint if the proposer reopened a known session.
    pub async fn respond_on(&self, channel: Box<dyn MessageChannel>) -> FlowResult<TransactionId> {
        let session = channel.session_id();
        let stored = if self.ctx.config.checkpointing {
            match self.ctx.checkpoints.load(session).await {
                Ok(stored) => stored,
                Err(err) => {
                    warn!(session_id = %session, error = %err, "[po] could not load checkpoint for inbound session");
                    return Err(err.into());
                }
            }
        } else {
            None
        };
        let flow = CounterpartyFlow::new(self.ctx.clone(), channel);
        match stored {
            Some(Checkpoint::Counterparty { state, .. }) => flow.resume(state).await,
            Some(other) => {
                warn!(session_id = %session, role = other.role(), "[po] checkpoint role mismatch, starting fresh");
                flow.respond().await
            }
            None => flow.respond().await,
        }
    }

    /// Accept inbound sessions until the node is detached, spawning one
    /// counterparty task per session.
    pub fn spawn_responder(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            info!(node = %service.party(), "[po] responder started");
            while let Some(channel) = service.network.accept().await {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    let session = channel.session_id();
                    // flow outcomes are logged by the flow; this catches setup errors too
                    if let Err(err) = service.respond_on(channel).await {
                        debug!(session_id = %session, kind = %err.kind(), "[po] responder session ended: {}", err);
                    }
                });
            }
            info!(node = %service.party(), "[po] responder stopped");
        })
    }

    /// Continue every proposer session left in the checkpoint store.
    /// Counterparty sessions continue when their proposer reconnects.
    pub async fn resume_pending(&self) -> FlowResult<Vec<FlowResult<TransactionId>>> {
        let pending = self.ctx.checkpoints.pending().await?;
        let mut outcomes = Vec::new();
        for checkpoint in pending {
            let Checkpoint::Proposer {
                session,
                peer,
                notary,
                state,
            } = checkpoint
            else {
                continue;
            };
            info!(session_id = %session, peer = %peer, step = ?state.step(), "[po] resuming session");
            outcomes.push(self.resume_proposer(session, &peer, &notary, state).await);
        }
        Ok(outcomes)
    }

    async fn resume_proposer(
        &self,
        session: SessionId,
        peer: &Party,
        notary: &Party,
        state: crate::flow::ProposerState,
    ) -> FlowResult<TransactionId> {
        let opened = match self.notary_for(notary) {
            Ok(notary) => self
                .network
                .open(peer, session)
                .await
                .map(|channel| (notary, channel))
                .map_err(FlowError::from),
            Err(err) => Err(err),
        };
        match opened {
            Ok((notary, channel)) => ProposerFlow::new(self.ctx.clone(), notary, channel)
                .resume(state)
                .await,
            Err(err) => {
                warn!(session_id = %session, error = %err, "[po] cannot resume session, dropping it");
                self.ctx.clear(session).await?;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl AgreementApi for AgreementService {
    async fn initiate(
        &self,
        order: PurchaseOrder,
        counterparty: &str,
    ) -> FlowResult<TransactionId> {
        let state = self.purchase_order_state(order, counterparty)?;
        self.propose(state).await
    }

    async fn respond(&self) -> FlowResult<TransactionId> {
        let channel = self
            .network
            .accept()
            .await
            .ok_or(ChannelError::Closed)?;
        self.respond_on(channel).await
    }

    fn whoami(&self) -> String {
        self.party().name.clone()
    }

    fn peers(&self) -> Vec<Party> {
        let notaries = self.ctx.identities.notaries();
        self.ctx
            .identities
            .parties()
            .into_iter()
            .filter(|p| p != self.party() && !notaries.contains(p))
            .collect()
    }

    async fn purchase_orders(&self) -> FlowResult<Vec<PurchaseOrderState>> {
        let me = [self.party().owning_key];
        Ok(self
            .ctx
            .ledger
            .current_states()
            .await?
            .into_iter()
            .filter(|s| s.is_relevant(&me))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{
        channel_pair, InMemoryCheckpointStore, InMemoryIdentityRegistry, InMemoryLedger, InMemoryNetwork,
        InMemoryNotary, SystemClock,
    };
    use crate::algorithms::PurchaseOrderContract;
    use crate::config::{AgreementConfig, NotarySelection};
    use crate::crypto::{Ed25519KeyPair, LocalIdentity};
    use crate::domain::{Address, FailureKind, Item, LedgerError};
    use crate::ports::CheckpointStore;
    use chrono::{Duration, Utc};

    /// Checkpoint store whose backend is gone.
    struct BrokenCheckpoints;

    #[async_trait]
    impl CheckpointStore for BrokenCheckpoints {
        async fn save(&self, _checkpoint: &Checkpoint) -> Result<(), LedgerError> {
            Err(LedgerError::Storage("offline".into()))
        }

        async fn load(&self, _session: SessionId) -> Result<Option<Checkpoint>, LedgerError> {
            Err(LedgerError::Storage("offline".into()))
        }

        async fn remove(&self, _session: SessionId) -> Result<(), LedgerError> {
            Err(LedgerError::Storage("offline".into()))
        }

        async fn pending(&self) -> Result<Vec<Checkpoint>, LedgerError> {
            Err(LedgerError::Storage("offline".into()))
        }
    }

    struct Fixture {
        service: AgreementService,
    }

    fn fixture(selection: NotarySelection) -> Fixture {
        let network = InMemoryNetwork::new();
        let registry = Arc::new(InMemoryIdentityRegistry::new());
        let me = LocalIdentity::new("PartyA", Ed25519KeyPair::from_seed([1; 32]));
        let other = Party::new("PartyB", Ed25519KeyPair::from_seed([2; 32]).public_key());
        registry.register(me.party().clone());
        registry.register(other);

        let mut notaries: Vec<Arc<dyn NotaryService>> = Vec::new();
        for (name, seed) in [("NotaryZ", 8u8), ("NotaryA", 9u8)] {
            let identity = LocalIdentity::new(name, Ed25519KeyPair::from_seed([seed; 32]));
            registry.register_notary(identity.party().clone());
            notaries.push(Arc::new(InMemoryNotary::new(identity, Arc::new(SystemClock))));
        }

        let endpoint = network.attach(me.party().clone());
        let ctx = FlowContext {
            identity: Arc::new(me),
            identities: registry,
            ledger: Arc::new(InMemoryLedger::new()),
            checkpoints: Arc::new(InMemoryCheckpointStore::new()),
            clock: Arc::new(SystemClock),
            contract: PurchaseOrderContract::default(),
            config: AgreementConfig {
                notary_selection: selection,
                ..AgreementConfig::default()
            },
        };
        Fixture {
            service: AgreementService::new(ctx, Arc::new(endpoint), notaries),
        }
    }

    fn order() -> PurchaseOrder {
        PurchaseOrder {
            order_number: 1,
            delivery_date: Utc::now() + Duration::days(7),
            delivery_address: Address::new("London", "UK"),
            items: vec![Item::new("widget", 10)],
        }
    }

    #[test]
    fn test_whoami_and_peers_exclude_self_and_notaries() {
        let f = fixture(NotarySelection::FirstByName);
        assert_eq!(f.service.whoami(), "PartyA");
        let peers: Vec<String> = f.service.peers().into_iter().map(|p| p.name).collect();
        assert_eq!(peers, vec!["PartyB".to_string()]);
    }

    #[test]
    fn test_notary_selection_policy() {
        let f = fixture(NotarySelection::FirstByName);
        assert_eq!(f.service.select_notary().unwrap().identity().name, "NotaryA");

        let f = fixture(NotarySelection::Named("NotaryZ".into()));
        assert_eq!(f.service.select_notary().unwrap().identity().name, "NotaryZ");

        let f = fixture(NotarySelection::Named("Nobody".into()));
        assert!(f.service.select_notary().is_err());
    }

    #[tokio::test]
    async fn test_initiate_unknown_counterparty() {
        let f = fixture(NotarySelection::FirstByName);
        let err = f.service.initiate(order(), "PartyC").await.unwrap_err();
        assert_eq!(err, FlowError::Channel(ChannelError::UnknownPeer("PartyC".into())));
    }

    #[tokio::test]
    async fn test_initiate_with_self_is_rejected() {
        let f = fixture(NotarySelection::FirstByName);
        let err = f.service.initiate(order(), "PartyA").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ValidationFailure);
    }

    #[tokio::test]
    async fn test_initiate_towards_detached_peer() {
        let f = fixture(NotarySelection::FirstByName);
        let err = f.service.initiate(order(), "PartyB").await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::Channel(ChannelError::PeerUnreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_purchase_orders_empty() {
        let f = fixture(NotarySelection::FirstByName);
        assert!(f.service.purchase_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_respond_on_reports_checkpoint_load_failure() {
        let f = fixture(NotarySelection::FirstByName);
        let ctx = FlowContext {
            checkpoints: Arc::new(BrokenCheckpoints),
            ..f.service.context().clone()
        };
        let service = AgreementService::new(ctx, f.service.network.clone(), Vec::new());
        let peer = Party::new("PartyB", Ed25519KeyPair::from_seed([2; 32]).public_key());
        let (_theirs, ours) = channel_pair(SessionId::new(), peer, service.party().clone());

        let err = service.respond_on(Box::new(ours)).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Unrecognized);
        assert!(err.to_string().contains("offline"));
    }
}
