//! # Domain Invariants
//!
//! Business rules for purchase-order issuance. Each `invariant_*` function
//! checks one rule and returns the human-readable reason on failure; the
//! `Place` clause collects these reasons.

use super::entities::{PurchaseOrder, PurchaseOrderState};
use super::value_objects::{PublicKey, TimeWindow};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// The only country the seller delivers to.
pub const ALLOWED_DELIVERY_COUNTRY: &str = "UK";

/// Upper bound on the summed quantity of all items in one order.
pub const MAX_TOTAL_QUANTITY: i64 = 100;

/// Default validity window length in seconds.
pub const DEFAULT_TIME_WINDOW_SECS: u64 = 30;

/// Contract identifier bound into every transaction id.
pub const CONTRACT_NAME: &str = "PurchaseOrderContract";

/// Text whose SHA-256 is the legal contract reference.
pub const LEGAL_CONTRACT_TEMPLATE: &str = "purchase order contract template and params";

/// Reason strings reported by the issuance rules.
pub mod reasons {
    /// Timestamped clause.
    pub const MUST_BE_TIMESTAMPED: &str = "must be timestamped";
    /// Issuance consumes nothing.
    pub const NO_INPUTS: &str = "No inputs should be consumed when issuing a purchase order.";
    /// One output per group.
    pub const ONE_OUTPUT: &str = "Only one output state should be created for each group.";
    /// Distinct parties.
    pub const DISTINCT_PARTIES: &str = "The buyer and the seller cannot be the same entity.";
    /// Participants must sign.
    pub const PARTICIPANTS_SIGN: &str = "All of the participants must be signers.";
    /// Delivery region.
    pub const DELIVERY_REGION: &str = "We only deliver to the UK.";
    /// Non-empty order.
    pub const AT_LEAST_ONE_ITEM: &str = "You must order at least one type of item.";
    /// Positive quantities.
    pub const POSITIVE_AMOUNTS: &str = "You cannot order zero or negative amounts of an item.";
    /// Quantity limit.
    pub const QUANTITY_LIMIT: &str = "You can only order up to 100 items in total.";
    /// Future delivery.
    pub const FUTURE_DELIVERY: &str = "The delivery date must be in the future.";
    /// Command not claimed by any clause.
    pub const UNHANDLED_COMMAND: &str = "unhandled command";
}

/// SHA-256 of [`LEGAL_CONTRACT_TEMPLATE`].
pub fn legal_contract_reference() -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(LEGAL_CONTRACT_TEMPLATE.as_bytes());
    hasher.finalize().into()
}

/// Invariant: a validity window is attached.
pub fn invariant_timestamped(window: Option<&TimeWindow>) -> Result<(), &'static str> {
    match window {
        Some(_) => Ok(()),
        None => Err(reasons::MUST_BE_TIMESTAMPED),
    }
}

/// Invariant: buyer and seller are different parties.
pub fn invariant_distinct_parties(state: &PurchaseOrderState) -> Result<(), &'static str> {
    if state.buyer == state.seller || state.buyer.owning_key == state.seller.owning_key {
        return Err(reasons::DISTINCT_PARTIES);
    }
    Ok(())
}

/// Invariant: every participant key is among the command signers.
pub fn invariant_participants_sign(
    state: &PurchaseOrderState,
    signers: &[PublicKey],
) -> Result<(), &'static str> {
    if state.participants().iter().all(|key| signers.contains(key)) {
        Ok(())
    } else {
        Err(reasons::PARTICIPANTS_SIGN)
    }
}

/// Invariant: delivery goes to the allowed region.
pub fn invariant_delivery_region(po: &PurchaseOrder) -> Result<(), &'static str> {
    if po.delivery_address.country == ALLOWED_DELIVERY_COUNTRY {
        Ok(())
    } else {
        Err(reasons::DELIVERY_REGION)
    }
}

/// Invariant: at least one item, every amount strictly positive.
///
/// Returns every violated reason.
pub fn invariant_items(po: &PurchaseOrder) -> Vec<&'static str> {
    let mut failed = Vec::new();
    if po.items.is_empty() {
        failed.push(reasons::AT_LEAST_ONE_ITEM);
    }
    if po.items.iter().any(|item| item.amount <= 0) {
        failed.push(reasons::POSITIVE_AMOUNTS);
    }
    failed
}

/// Invariant: summed quantity does not exceed [`MAX_TOTAL_QUANTITY`].
pub fn invariant_total_quantity(po: &PurchaseOrder) -> Result<(), &'static str> {
    if po.total_quantity() <= MAX_TOTAL_QUANTITY {
        Ok(())
    } else {
        Err(reasons::QUANTITY_LIMIT)
    }
}

/// Invariant: delivery strictly after the midpoint of the validity window.
///
/// The midpoint is the best estimate of "now" the contract may use.
pub fn invariant_future_delivery(
    delivery: DateTime<Utc>,
    window: &TimeWindow,
) -> Result<(), &'static str> {
    if delivery > window.midpoint() {
        Ok(())
    } else {
        Err(reasons::FUTURE_DELIVERY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Address, Item, Party};
    use chrono::{Duration, TimeZone};

    fn state(country: &str, amounts: &[i32]) -> PurchaseOrderState {
        let po = PurchaseOrder {
            order_number: 1,
            delivery_date: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
            delivery_address: Address::new("London", country),
            items: amounts
                .iter()
                .map(|a| Item::new("thing", *a))
                .collect(),
        };
        PurchaseOrderState::new(
            po,
            Party::new("Buyer", PublicKey([1; 32])),
            Party::new("Seller", PublicKey([2; 32])),
        )
    }

    #[test]
    fn test_legal_reference_is_stable() {
        assert_eq!(legal_contract_reference(), legal_contract_reference());
        assert_ne!(legal_contract_reference(), [0u8; 32]);
    }

    #[test]
    fn test_region() {
        assert!(invariant_delivery_region(&state("UK", &[1]).po).is_ok());
        assert_eq!(
            invariant_delivery_region(&state("US", &[1]).po),
            Err(reasons::DELIVERY_REGION)
        );
    }

    #[test]
    fn test_quantity_limit_boundary() {
        assert!(invariant_total_quantity(&state("UK", &[50, 50]).po).is_ok());
        assert!(invariant_total_quantity(&state("UK", &[50, 51]).po).is_err());
    }

    #[test]
    fn test_items_reports_each_violation() {
        assert_eq!(
            invariant_items(&state("UK", &[]).po),
            vec![reasons::AT_LEAST_ONE_ITEM]
        );
        assert_eq!(
            invariant_items(&state("UK", &[3, 0]).po),
            vec![reasons::POSITIVE_AMOUNTS]
        );
    }

    #[test]
    fn test_distinct_parties() {
        let mut s = state("UK", &[1]);
        assert!(invariant_distinct_parties(&s).is_ok());
        s.seller = s.buyer.clone();
        assert_eq!(invariant_distinct_parties(&s), Err(reasons::DISTINCT_PARTIES));
    }

    #[test]
    fn test_future_delivery_midpoint_boundary() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let window = TimeWindow::starting_at(start, Duration::seconds(30));
        let mid = window.midpoint();
        assert!(invariant_future_delivery(mid, &window).is_err());
        assert!(invariant_future_delivery(mid - Duration::seconds(1), &window).is_err());
        assert!(invariant_future_delivery(mid + Duration::nanoseconds(1), &window).is_ok());
    }

    #[test]
    fn test_participants_sign() {
        let s = state("UK", &[1]);
        assert!(invariant_participants_sign(&s, &[PublicKey([1; 32]), PublicKey([2; 32])]).is_ok());
        assert!(invariant_participants_sign(&s, &[PublicKey([1; 32])]).is_err());
    }
}
