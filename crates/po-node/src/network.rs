//! In-process network of agreement nodes sharing one notary.

use anyhow::{Context, Result};
use po_agreement::{
    AgreementConfig, AgreementService, FlowContext, InMemoryCheckpointStore,
    InMemoryIdentityRegistry, InMemoryLedger, InMemoryNetwork, InMemoryNotary, LocalIdentity,
    NotaryService, PurchaseOrderContract, SystemClock,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// A running node.
pub struct Node {
    /// Node service.
    pub service: Arc<AgreementService>,
    /// Accept loop for inbound sessions.
    pub responder: JoinHandle<()>,
}

/// Every node of the demo plus the shared infrastructure.
pub struct DemoNetwork {
    network: Arc<InMemoryNetwork>,
    registry: Arc<InMemoryIdentityRegistry>,
    notaries: Vec<Arc<dyn NotaryService>>,
    config: AgreementConfig,
    nodes: BTreeMap<String, Node>,
}

impl DemoNetwork {
    /// Network with one notary called `notary_name`.
    pub fn new(notary_name: &str, config: AgreementConfig) -> Self {
        let registry = Arc::new(InMemoryIdentityRegistry::new());
        let identity = LocalIdentity::generate(notary_name);
        registry.register_notary(identity.party().clone());
        let notary: Arc<dyn NotaryService> =
            Arc::new(InMemoryNotary::new(identity, Arc::new(SystemClock)));
        info!(notary = %notary.identity(), "notary started");

        Self {
            network: InMemoryNetwork::new(),
            registry,
            notaries: vec![notary],
            config,
            nodes: BTreeMap::new(),
        }
    }

    /// Start a node called `name` and its responder.
    pub fn spawn_node(&mut self, name: &str) -> Arc<AgreementService> {
        let identity = LocalIdentity::generate(name);
        let party = identity.party().clone();
        self.registry.register(party.clone());

        let ctx = FlowContext {
            identity: Arc::new(identity),
            identities: self.registry.clone(),
            ledger: Arc::new(InMemoryLedger::new()),
            checkpoints: Arc::new(InMemoryCheckpointStore::new()),
            clock: Arc::new(SystemClock),
            contract: PurchaseOrderContract::default(),
            config: self.config.clone(),
        };
        let endpoint = self.network.attach(party.clone());
        let service = Arc::new(AgreementService::new(
            ctx,
            Arc::new(endpoint),
            self.notaries.clone(),
        ));
        let responder = service.spawn_responder();
        info!(node = %party, "node started");

        self.nodes.insert(
            name.to_string(),
            Node {
                service: service.clone(),
                responder,
            },
        );
        service
    }

    /// Service of the node called `name`.
    pub fn node(&self, name: &str) -> Result<Arc<AgreementService>> {
        self.nodes
            .get(name)
            .map(|node| node.service.clone())
            .with_context(|| format!("no node named {}", name))
    }

    /// Detach every node and wait for the responders to stop.
    pub async fn shutdown(self) -> Result<()> {
        for node in self.nodes.values() {
            self.network.detach(node.service.party());
        }
        for (name, node) in self.nodes {
            node.responder
                .await
                .with_context(|| format!("responder of {} panicked", name))?;
        }
        Ok(())
    }
}
