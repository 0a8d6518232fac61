//! # Agreement Metrics
//!
//! Prometheus counters for session outcomes and notary traffic.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! po-agreement = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `po_sessions_started_total{role}` - Sessions started
//! - `po_sessions_completed_total{role}` - Sessions that committed a transaction
//! - `po_sessions_failed_total{role,kind}` - Sessions that failed, by failure kind
//! - `po_notary_requests_total{outcome}` - Notary requests by outcome
//! - `po_transactions_recorded_total` - Transactions newly written to the local ledger

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Sessions started, labeled by role
    pub static ref SESSIONS_STARTED: IntCounterVec = register_int_counter_vec!(
        "po_sessions_started_total",
        "Total number of agreement sessions started",
        &["role"]
    )
    .expect("Failed to create SESSIONS_STARTED metric");

    /// Sessions completed, labeled by role
    pub static ref SESSIONS_COMPLETED: IntCounterVec = register_int_counter_vec!(
        "po_sessions_completed_total",
        "Total number of agreement sessions that committed a transaction",
        &["role"]
    )
    .expect("Failed to create SESSIONS_COMPLETED metric");

    /// Sessions failed, labeled by role and failure kind
    pub static ref SESSIONS_FAILED: IntCounterVec = register_int_counter_vec!(
        "po_sessions_failed_total",
        "Total number of agreement sessions that failed",
        &["role", "kind"]
    )
    .expect("Failed to create SESSIONS_FAILED metric");

    /// Notary requests, labeled by outcome
    pub static ref NOTARY_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "po_notary_requests_total",
        "Total number of notarisation requests",
        &["outcome"]
    )
    .expect("Failed to create NOTARY_REQUESTS metric");

    /// Transactions newly recorded
    pub static ref TRANSACTIONS_RECORDED: IntCounter = register_int_counter!(
        "po_transactions_recorded_total",
        "Total number of transactions written to the local ledger"
    )
    .expect("Failed to create TRANSACTIONS_RECORDED metric");
}

/// Record a session start
#[cfg(feature = "metrics")]
pub fn record_session_started(role: &str) {
    SESSIONS_STARTED.with_label_values(&[role]).inc();
}

/// Record a session that committed
#[cfg(feature = "metrics")]
pub fn record_session_completed(role: &str) {
    SESSIONS_COMPLETED.with_label_values(&[role]).inc();
}

/// Record a failed session
#[cfg(feature = "metrics")]
pub fn record_session_failed(role: &str, kind: &str) {
    SESSIONS_FAILED.with_label_values(&[role, kind]).inc();
}

/// Record a notary request outcome
#[cfg(feature = "metrics")]
pub fn record_notary_request(outcome: &str) {
    NOTARY_REQUESTS.with_label_values(&[outcome]).inc();
}

/// Record a newly recorded transaction
#[cfg(feature = "metrics")]
pub fn record_transaction_recorded() {
    TRANSACTIONS_RECORDED.inc();
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

/// Record a session start
#[cfg(not(feature = "metrics"))]
pub fn record_session_started(_role: &str) {}

/// Record a session that committed
#[cfg(not(feature = "metrics"))]
pub fn record_session_completed(_role: &str) {}

/// Record a failed session
#[cfg(not(feature = "metrics"))]
pub fn record_session_failed(_role: &str, _kind: &str) {}

/// Record a notary request outcome
#[cfg(not(feature = "metrics"))]
pub fn record_notary_request(_outcome: &str) {}

/// Record a newly recorded transaction
#[cfg(not(feature = "metrics"))]
pub fn record_transaction_recorded() {}
