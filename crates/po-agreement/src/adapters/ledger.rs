//! Ledger Store Adapter
//!
//! Implements `LedgerStore` in memory: finalized transactions keyed by id,
//! plus an index of current states by output ref and by linear id.

use crate::domain::{
    FinalizedTransaction, LedgerError, PurchaseOrderState, StateRef, TransactionId,
    UniqueIdentifier,
};
use crate::ports::LedgerStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

#[derive(Default)]
struct LedgerData {
    /// Recorded transactions, in recording order.
    order: Vec<TransactionId>,
    transactions: HashMap<TransactionId, FinalizedTransaction>,
    /// Every output ever recorded.
    states: HashMap<StateRef, PurchaseOrderState>,
    /// Outputs spent by a later transaction.
    consumed: HashSet<StateRef>,
    /// Latest output per document.
    heads: HashMap<UniqueIdentifier, StateRef>,
}

/// In-memory append-only ledger for one node.
#[derive(Default)]
pub struct InMemoryLedger {
    data: RwLock<LedgerData>,
    unavailable: AtomicBool,
}

impl InMemoryLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a storage error (for failure testing).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of recorded transactions.
    pub fn len(&self) -> usize {
        self.data.read().order.len()
    }

    /// Whether nothing was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recorded ids in recording order.
    pub fn transaction_ids(&self) -> Vec<TransactionId> {
        self.data.read().order.clone()
    }

    fn check_available(&self) -> Result<(), LedgerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Storage("ledger unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn record(&self, tx: &FinalizedTransaction) -> Result<bool, LedgerError> {
        self.check_available()?;
        let id = tx.id();
        let mut data = self.data.write();

        if data.transactions.contains_key(&id) {
            debug!(tx_id = %id, "[po] ledger: already recorded");
            return Ok(false);
        }

        for input in &tx.tx().inputs {
            data.consumed.insert(*input);
        }
        for (index, output) in tx.outputs().iter().enumerate() {
            let state_ref = StateRef {
                txhash: id,
                index: index as u32,
            };
            data.states.insert(state_ref, output.clone());
            data.heads.insert(output.linear_id.clone(), state_ref);
        }
        data.transactions.insert(id, tx.clone());
        data.order.push(id);

        info!(tx_id = %id, outputs = tx.outputs().len(), "[po] ledger: recorded");
        Ok(true)
    }

    async fn query(
        &self,
        linear_id: &UniqueIdentifier,
    ) -> Result<Option<PurchaseOrderState>, LedgerError> {
        self.check_available()?;
        let data = self.data.read();
        Ok(data
            .heads
            .get(linear_id)
            .filter(|r| !data.consumed.contains(*r))
            .and_then(|r| data.states.get(r))
            .cloned())
    }

    async fn transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Option<FinalizedTransaction>, LedgerError> {
        self.check_available()?;
        Ok(self.data.read().transactions.get(id).cloned())
    }

    async fn resolve(
        &self,
        state_ref: &StateRef,
    ) -> Result<Option<PurchaseOrderState>, LedgerError> {
        self.check_available()?;
        Ok(self.data.read().states.get(state_ref).cloned())
    }

    async fn current_states(&self) -> Result<Vec<PurchaseOrderState>, LedgerError> {
        self.check_available()?;
        let data = self.data.read();
        let mut heads: Vec<&StateRef> = data
            .heads
            .values()
            .filter(|r| !data.consumed.contains(*r))
            .collect();
        heads.sort();
        Ok(heads
            .into_iter()
            .filter_map(|r| data.states.get(r).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{build_proposal, build_unsigned, finalize, sign};
    use crate::crypto::Ed25519KeyPair;
    use crate::domain::{Address, Item, PartiallySignedTransaction, Party, PurchaseOrder};
    use chrono::{Duration, TimeZone, Utc};

    fn finalized() -> FinalizedTransaction {
        let buyer = Ed25519KeyPair::from_seed([1; 32]);
        let seller = Ed25519KeyPair::from_seed([2; 32]);
        let notary = Ed25519KeyPair::from_seed([3; 32]);
        let buyer_party = Party::new("Buyer", buyer.public_key());
        let seller_party = Party::new("Seller", seller.public_key());
        let po = PurchaseOrder {
            order_number: 5,
            delivery_date: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
            delivery_address: Address::new("London", "UK"),
            items: vec![Item::new("a", 1)],
        };
        let state = PurchaseOrderState::new(po, buyer_party.clone(), seller_party.clone());
        let proposal = build_proposal(
            state,
            buyer_party,
            seller_party,
            Party::new("Notary", notary.public_key()),
        );
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut stx =
            PartiallySignedTransaction::new(build_unsigned(&proposal, now, Duration::seconds(30)));
        sign(&mut stx, &seller).unwrap();
        sign(&mut stx, &buyer).unwrap();
        let notary_sig = notary.sign(&stx.id());
        finalize(stx, notary_sig).unwrap()
    }

    #[tokio::test]
    async fn test_record_is_idempotent() {
        let ledger = InMemoryLedger::new();
        let ftx = finalized();

        assert!(ledger.record(&ftx).await.unwrap());
        assert!(!ledger.record(&ftx).await.unwrap());
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_query_by_linear_id_and_resolve() {
        let ledger = InMemoryLedger::new();
        let ftx = finalized();
        ledger.record(&ftx).await.unwrap();

        let state = &ftx.outputs()[0];
        let found = ledger.query(&state.linear_id).await.unwrap();
        assert_eq!(found.as_ref(), Some(state));

        let state_ref = StateRef {
            txhash: ftx.id(),
            index: 0,
        };
        assert_eq!(ledger.resolve(&state_ref).await.unwrap().as_ref(), Some(state));
        assert_eq!(ledger.current_states().await.unwrap().len(), 1);
        assert!(ledger.transaction(&ftx.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unavailable_ledger_errors() {
        let ledger = InMemoryLedger::new();
        ledger.set_unavailable(true);
        assert!(matches!(
            ledger.record(&finalized()).await,
            Err(LedgerError::Storage(_))
        ));
        assert!(ledger.is_empty());
    }
}
