//! # Inbound Ports
//!
//! What a node offers to its callers.

use crate::domain::{FlowResult, Party, PurchaseOrder, PurchaseOrderState, TransactionId};
use async_trait::async_trait;

/// Agreement API - inbound port.
#[async_trait]
pub trait AgreementApi: Send + Sync {
    /// Propose `order` to the party named `counterparty` and run the
    /// handshake to completion.
    async fn initiate(&self, order: PurchaseOrder, counterparty: &str)
        -> FlowResult<TransactionId>;

    /// Answer the next inbound proposal.
    async fn respond(&self) -> FlowResult<TransactionId>;

    /// Our own display name.
    fn whoami(&self) -> String;

    /// Every registered party except ourselves and the notaries.
    fn peers(&self) -> Vec<Party>;

    /// Current purchase-order states in the local ledger that concern us.
    async fn purchase_orders(&self) -> FlowResult<Vec<PurchaseOrderState>>;
}
