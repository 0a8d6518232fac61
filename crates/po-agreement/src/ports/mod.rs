//! # Ports
//!
//! Hexagonal boundaries: the API the node exposes and the services it
//! depends on.

pub mod inbound;
pub mod outbound;

pub use inbound::AgreementApi;
pub use outbound::{
    CheckpointStore, Clock, FlowMessage, IdentityRegistry, LedgerStore, MessageChannel,
    MessageNetwork, NotaryService,
};
