//! # PO Agreement
//!
//! Two-party purchase-order agreement with notarization.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! A buyer proposes a purchase order to a seller. Both sides sign the same
//! content-addressed transaction, a uniqueness notary stamps it, and both
//! record it in their local ledgers:
//!
//! ```text
//! Proposer                         Counterparty                 Notary
//!    │── Proposal ──────────────────►│                             │
//!    │                               │ build tx, sign              │
//!    │◄──────────── PartiallySigned ─│                             │
//!    │ verify, validate, sign        │                             │
//!    │── request_signature ───────────────────────────────────────►│
//!    │◄─────────────────────────────────────────────── signature ──│
//!    │ record                        │                             │
//!    │── Finalized ─────────────────►│ validate, record            │
//! ```
//!
//! ## Contract Rules
//!
//! | Rule | Detail |
//! |------|--------|
//! | Timestamped | A time window is present |
//! | Issuance | No inputs, exactly one output |
//! | Parties | Buyer and seller differ and both sign |
//! | Delivery | To the UK, in the future |
//! | Items | At least one, all positive, at most 100 in total |
//!
//! ## Module Structure
//!
//! ```text
//! po-agreement/
//! ├── domain/          # Orders, states, transactions, errors, invariants
//! ├── algorithms/      # Assembly and the clause-based contract
//! ├── flow/            # Proposer/counterparty state machines, checkpoints
//! ├── ports/           # AgreementApi, channel, notary, ledger, clock
//! ├── adapters/        # In-memory implementations of the ports
//! └── service.rs       # Node service wiring flows to the network
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod flow;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-exports
pub use adapters::{
    channel_pair, FixedClock, InMemoryChannel, InMemoryCheckpointStore, InMemoryIdentityRegistry,
    InMemoryLedger, InMemoryNetwork, InMemoryNotary, NodeEndpoint, SystemClock,
};
pub use algorithms::{PurchaseOrderContract, Rule};
pub use config::{AgreementConfig, NotarySelection};
pub use crypto::{Ed25519KeyPair, LocalIdentity};
pub use domain::{
    Address, AssemblyError, ChannelError, ConfigError, DigitalSignature, FailureKind,
    FinalizedTransaction, FlowError, FlowResult, Item, LedgerError, NotaryRejection,
    PartiallySignedTransaction, Party, ProposedAgreement, PublicKey, PurchaseOrder,
    PurchaseOrderState, SessionId, StateRef, TimeWindow, TransactionId, UniqueIdentifier,
    UnsignedTransaction, ValidationFailure,
};
pub use flow::{
    Checkpoint, CounterpartyFlow, CounterpartyState, CounterpartyStep, FlowContext, FlowStep,
    ProposerFlow, ProposerState, ProposerStep,
};
pub use ports::{
    AgreementApi, CheckpointStore, Clock, FlowMessage, IdentityRegistry, LedgerStore,
    MessageChannel, MessageNetwork, NotaryService,
};
pub use service::AgreementService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
