//! # Adapters
//!
//! In-process implementations of the outbound ports. A full node wires the
//! same ports to durable storage and a real transport.

pub mod checkpoint;
pub mod clock;
pub mod identity;
pub mod ledger;
pub mod network;
pub mod notary;

pub use checkpoint::InMemoryCheckpointStore;
pub use clock::{FixedClock, SystemClock};
pub use identity::InMemoryIdentityRegistry;
pub use ledger::InMemoryLedger;
pub use network::{channel_pair, InMemoryChannel, InMemoryNetwork, NodeEndpoint};
pub use notary::InMemoryNotary;
