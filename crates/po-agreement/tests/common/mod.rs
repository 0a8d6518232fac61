//! Shared fixtures: an in-process network with a notary, full nodes backed
//! by `AgreementService`, and raw endpoints for scripting a misbehaving peer.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use po_agreement::{
    AgreementConfig, AgreementService, Address, Ed25519KeyPair, FinalizedTransaction,
    FlowContext, InMemoryCheckpointStore, InMemoryIdentityRegistry, InMemoryLedger,
    InMemoryNetwork, InMemoryNotary, Item, LedgerStore, LocalIdentity, NodeEndpoint,
    NotaryService, Party, PurchaseOrder, PurchaseOrderContract, SystemClock, TransactionId,
};
use std::sync::Arc;

pub const NOTARY_SEED: [u8; 32] = [9; 32];

pub struct Node {
    pub party: Party,
    pub ledger: Arc<InMemoryLedger>,
    pub checkpoints: Arc<InMemoryCheckpointStore>,
    pub service: Arc<AgreementService>,
}

pub struct RawPeer {
    pub identity: LocalIdentity,
    pub endpoint: NodeEndpoint,
}

pub struct Harness {
    pub network: Arc<InMemoryNetwork>,
    pub registry: Arc<InMemoryIdentityRegistry>,
    pub notary: Arc<InMemoryNotary>,
    pub notaries: Vec<Arc<dyn NotaryService>>,
}

impl Harness {
    pub fn new() -> Self {
        let registry = Arc::new(InMemoryIdentityRegistry::new());
        let identity = LocalIdentity::new("Controller", Ed25519KeyPair::from_seed(NOTARY_SEED));
        registry.register_notary(identity.party().clone());
        let notary = Arc::new(InMemoryNotary::new(identity, Arc::new(SystemClock)));
        let shared: Arc<dyn NotaryService> = notary.clone();
        Self {
            network: InMemoryNetwork::new(),
            registry,
            notary,
            notaries: vec![shared],
        }
    }

    /// Register an extra notary; nodes created afterwards can use it.
    pub fn add_notary(&mut self, notary: Arc<dyn NotaryService>) {
        self.registry.register_notary(notary.identity().clone());
        self.notaries.push(notary);
    }

    pub fn context(&self, identity: LocalIdentity, config: AgreementConfig) -> FlowContext {
        FlowContext {
            identity: Arc::new(identity),
            identities: self.registry.clone(),
            ledger: Arc::new(InMemoryLedger::new()),
            checkpoints: Arc::new(InMemoryCheckpointStore::new()),
            clock: Arc::new(SystemClock),
            contract: PurchaseOrderContract::default(),
            config,
        }
    }

    pub fn node(&self, name: &str, seed: u8) -> Node {
        self.node_with(name, seed, AgreementConfig::default())
    }

    pub fn node_with(&self, name: &str, seed: u8, config: AgreementConfig) -> Node {
        let identity = LocalIdentity::new(name, Ed25519KeyPair::from_seed([seed; 32]));
        let party = identity.party().clone();
        self.registry.register(party.clone());

        let ledger = Arc::new(InMemoryLedger::new());
        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let ctx = FlowContext {
            ledger: ledger.clone(),
            checkpoints: checkpoints.clone(),
            ..self.context(identity, config)
        };
        let endpoint = self.network.attach(party.clone());
        let service = Arc::new(AgreementService::new(
            ctx,
            Arc::new(endpoint),
            self.notaries.clone(),
        ));
        Node {
            party,
            ledger,
            checkpoints,
            service,
        }
    }

    pub fn raw(&self, name: &str, seed: u8) -> RawPeer {
        let identity = LocalIdentity::new(name, Ed25519KeyPair::from_seed([seed; 32]));
        self.registry.register(identity.party().clone());
        let endpoint = self.network.attach(identity.party().clone());
        RawPeer { identity, endpoint }
    }
}

pub fn order(order_number: u32, country: &str, amounts: &[i32]) -> PurchaseOrder {
    PurchaseOrder {
        order_number,
        delivery_date: Utc::now() + Duration::days(14),
        delivery_address: Address::new("London", country),
        items: amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| Item::new(format!("item-{}", i), *amount))
            .collect(),
    }
}

pub fn uk_order(order_number: u32) -> PurchaseOrder {
    order(order_number, "UK", &[10, 20, 30])
}

/// Poll `ledger` until `id` shows up or two seconds pass.
pub async fn wait_for_record(ledger: &InMemoryLedger, id: &TransactionId) -> Option<FinalizedTransaction> {
    for _ in 0..200 {
        if let Ok(Some(ftx)) = ledger.transaction(id).await {
            return Some(ftx);
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    None
}
