//! # Algorithms
//!
//! Pure transaction assembly and the contract rule interpreter.

pub mod assembly;
pub mod validation;

pub use assembly::{
    add_signature, build_proposal, build_unsigned, check_proposal, check_recovered, check_window,
    compute_id, derive_unsigned, ensure_same_transaction, finalize, fresh_window, sign,
    verify_signatures,
};
pub use validation::{PurchaseOrderContract, Rule};
