//! # Domain Entities
//!
//! Parties and the purchase-order document the two parties agree on.

use super::value_objects::{PublicKey, UniqueIdentifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A legal identity: display name plus owning key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Party {
    /// Display name, unique within the identity registry.
    pub name: String,
    /// Key that signs on behalf of this party.
    pub owning_key: PublicKey,
}

impl Party {
    /// Create a new party.
    pub fn new(name: impl Into<String>, owning_key: PublicKey) -> Self {
        Self {
            name: name.into(),
            owning_key,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Delivery address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// City.
    pub city: String,
    /// Country code (e.g. "UK").
    pub country: String,
}

impl Address {
    /// Create a new address.
    pub fn new(city: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            country: country.into(),
        }
    }
}

/// One line of a purchase order.
///
/// The amount is signed so that malformed orders from the wire can be
/// represented and rejected by the contract rather than by the decoder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Catalogue item name.
    pub name: String,
    /// Quantity ordered.
    pub amount: i32,
}

impl Item {
    /// Create a new item line.
    pub fn new(name: impl Into<String>, amount: i32) -> Self {
        Self {
            name: name.into(),
            amount,
        }
    }
}

/// The business document the buyer proposes to the seller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    /// Buyer-assigned order number.
    pub order_number: u32,
    /// Requested delivery instant.
    pub delivery_date: DateTime<Utc>,
    /// Where to deliver.
    pub delivery_address: Address,
    /// Ordered items.
    pub items: Vec<Item>,
}

impl PurchaseOrder {
    /// Sum of all item amounts, widened so it cannot overflow.
    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|item| i64::from(item.amount)).sum()
    }
}

/// Ledger state recording an agreed purchase order between a buyer and a
/// seller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderState {
    /// The agreed document.
    pub po: PurchaseOrder,
    /// Party placing the order.
    pub buyer: Party,
    /// Party fulfilling the order.
    pub seller: Party,
    /// Linear identifier grouping every version of this document.
    pub linear_id: UniqueIdentifier,
}

impl PurchaseOrderState {
    /// New state with a fresh linear id whose external part is the order
    /// number.
    pub fn new(po: PurchaseOrder, buyer: Party, seller: Party) -> Self {
        let linear_id = UniqueIdentifier::new(Some(po.order_number.to_string()));
        Self {
            po,
            buyer,
            seller,
            linear_id,
        }
    }

    /// External reference (the order number).
    pub fn reference(&self) -> Option<&str> {
        self.linear_id.external_id.as_deref()
    }

    /// Parties involved in the deal.
    pub fn parties(&self) -> [&Party; 2] {
        [&self.buyer, &self.seller]
    }

    /// Keys whose signatures are mandatory for any transaction touching this
    /// state.
    pub fn participants(&self) -> Vec<PublicKey> {
        vec![self.buyer.owning_key, self.seller.owning_key]
    }

    /// Whether a node holding `our_keys` should track this state.
    pub fn is_relevant(&self, our_keys: &[PublicKey]) -> bool {
        self.participants().iter().any(|key| our_keys.contains(key))
    }
}
