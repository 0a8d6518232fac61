//! Notary Adapter
//!
//! In-memory uniqueness notary. It never looks at business content: it
//! checks the validity window against its own clock, records which inputs
//! each transaction consumed, and signs the transaction id.
//!
//! Re-submitting a transaction it already signed returns a fresh signature
//! over the same id; any other transaction touching a consumed input is a
//! conflict.

use crate::crypto::LocalIdentity;
use crate::domain::{
    DigitalSignature, NotaryRejection, PartiallySignedTransaction, Party, StateRef, TimeWindow,
    TransactionId,
};
use crate::ports::{Clock, NotaryService};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// In-memory uniqueness notary.
pub struct InMemoryNotary {
    identity: LocalIdentity,
    clock: Arc<dyn Clock>,
    consumed: Mutex<HashMap<StateRef, TransactionId>>,
    latency: Mutex<Option<Duration>>,
    requests: AtomicUsize,
}

impl InMemoryNotary {
    /// Notary signing as `identity`, reading time from `clock`.
    pub fn new(identity: LocalIdentity, clock: Arc<dyn Clock>) -> Self {
        Self {
            identity,
            clock,
            consumed: Mutex::new(HashMap::new()),
            latency: Mutex::new(None),
            requests: AtomicUsize::new(0),
        }
    }

    /// Delay every answer by `latency` (for timeout testing).
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Transaction that consumed `state_ref`, if any.
    pub fn consumed_by(&self, state_ref: &StateRef) -> Option<TransactionId> {
        self.consumed.lock().get(state_ref).copied()
    }

    fn commit(&self, id: TransactionId, inputs: &[StateRef]) -> Result<(), NotaryRejection> {
        let mut consumed = self.consumed.lock();

        let mut conflicts = Vec::new();
        let mut consuming_tx = None;
        for input in inputs {
            if let Some(existing) = consumed.get(input) {
                if *existing != id {
                    conflicts.push(*input);
                    consuming_tx.get_or_insert(*existing);
                }
            }
        }
        if let Some(consuming_tx) = consuming_tx {
            return Err(NotaryRejection::Conflict {
                consumed: conflicts,
                consuming_tx,
            });
        }

        for input in inputs {
            consumed.insert(*input, id);
        }
        Ok(())
    }
}

#[async_trait]
impl NotaryService for InMemoryNotary {
    fn identity(&self) -> &Party {
        self.identity.party()
    }

    async fn request_signature(
        &self,
        stx: &PartiallySignedTransaction,
        window: TimeWindow,
    ) -> Result<DigitalSignature, NotaryRejection> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let id = stx.id();
        if stx.tx().time_window != Some(window) {
            warn!(tx_id = %id, "[po] notary: window does not match transaction");
            return Err(NotaryRejection::InvalidTimeWindow {
                detail: "requested window differs from the transaction's".to_string(),
            });
        }
        let now = self.clock.now();
        if !window.contains(now) {
            warn!(tx_id = %id, %now, "[po] notary: outside time window");
            return Err(NotaryRejection::InvalidTimeWindow {
                detail: format!(
                    "now {} not within [{}, {}]",
                    now, window.not_before, window.not_after
                ),
            });
        }

        if let Err(rejection) = self.commit(id, &stx.tx().inputs) {
            warn!(tx_id = %id, "[po] notary: {}", rejection);
            return Err(rejection);
        }

        debug!(tx_id = %id, inputs = stx.tx().inputs.len(), "[po] notary: inputs committed");
        info!(tx_id = %id, "[po] notary: signed");
        Ok(self.identity.keypair().sign(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FixedClock;
    use crate::crypto::{self, Ed25519KeyPair};
    use crate::domain::{
        Address, Command, CommandKind, Item, PurchaseOrder, PurchaseOrderState,
        UnsignedTransaction,
    };
    use chrono::{DateTime, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()
    }

    fn notary(clock: Arc<FixedClock>) -> InMemoryNotary {
        InMemoryNotary::new(
            LocalIdentity::new("Controller", Ed25519KeyPair::from_seed([3; 32])),
            clock,
        )
    }

    fn stx(inputs: Vec<StateRef>, order_number: u32, notary: &Party) -> PartiallySignedTransaction {
        let buyer = Party::new("Buyer", crate::domain::PublicKey([1; 32]));
        let seller = Party::new("Seller", crate::domain::PublicKey([2; 32]));
        let po = PurchaseOrder {
            order_number,
            delivery_date: t0() + chrono::Duration::days(1),
            delivery_address: Address::new("London", "UK"),
            items: vec![Item::new("a", 1)],
        };
        let state = PurchaseOrderState::new(po, buyer, seller);
        PartiallySignedTransaction::new(UnsignedTransaction {
            inputs,
            commands: vec![Command {
                kind: CommandKind::Place,
                signers: state.participants(),
            }],
            outputs: vec![state],
            notary: notary.clone(),
            time_window: Some(TimeWindow::starting_at(t0(), chrono::Duration::seconds(30))),
        })
    }

    fn input(n: u8) -> StateRef {
        StateRef {
            txhash: TransactionId([n; 32]),
            index: 0,
        }
    }

    #[tokio::test]
    async fn test_signs_within_window() {
        let clock = Arc::new(FixedClock::new(t0()));
        let notary = notary(clock);
        let tx = stx(vec![], 1, notary.identity());
        let window = tx.tx().time_window.unwrap();

        let sig = notary.request_signature(&tx, window).await.unwrap();
        assert_eq!(sig.by, notary.identity().owning_key);
        assert!(crypto::verify(&tx.id(), &sig).is_ok());
    }

    #[tokio::test]
    async fn test_rejects_outside_window() {
        let clock = Arc::new(FixedClock::new(t0()));
        let notary = notary(clock.clone());
        let tx = stx(vec![], 1, notary.identity());
        let window = tx.tx().time_window.unwrap();

        clock.advance(chrono::Duration::seconds(31));
        let result = notary.request_signature(&tx, window).await;
        assert!(matches!(result, Err(NotaryRejection::InvalidTimeWindow { .. })));
    }

    #[tokio::test]
    async fn test_conflict_on_double_spend() {
        let clock = Arc::new(FixedClock::new(t0()));
        let notary = notary(clock);
        let first = stx(vec![input(1), input(2)], 1, notary.identity());
        let second = stx(vec![input(2)], 2, notary.identity());
        let window = first.tx().time_window.unwrap();

        notary.request_signature(&first, window).await.unwrap();
        let result = notary.request_signature(&second, window).await;

        match result {
            Err(NotaryRejection::Conflict {
                consumed,
                consuming_tx,
            }) => {
                assert_eq!(consumed, vec![input(2)]);
                assert_eq!(consuming_tx, first.id());
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(notary.consumed_by(&input(1)), Some(first.id()));
    }

    #[tokio::test]
    async fn test_resubmission_is_idempotent() {
        let clock = Arc::new(FixedClock::new(t0()));
        let notary = notary(clock);
        let tx = stx(vec![input(7)], 1, notary.identity());
        let window = tx.tx().time_window.unwrap();

        let a = notary.request_signature(&tx, window).await.unwrap();
        let b = notary.request_signature(&tx, window).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(notary.request_count(), 2);
    }
}
