//! Identity Registry Adapter
//!
//! In-memory network map: display name → party, with a notary flag.

use crate::domain::{Party, PublicKey};
use crate::ports::IdentityRegistry;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Clone, Debug)]
struct Entry {
    party: Party,
    notary: bool,
}

/// In-memory identity registry shared by every node of a network.
#[derive(Debug, Default)]
pub struct InMemoryIdentityRegistry {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl InMemoryIdentityRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a regular party.
    pub fn register(&self, party: Party) {
        debug!(name = %party.name, key = %party.owning_key.short(), "[po] party registered");
        self.entries.write().insert(
            party.name.clone(),
            Entry {
                party,
                notary: false,
            },
        );
    }

    /// Register (or replace) a notary.
    pub fn register_notary(&self, party: Party) {
        debug!(name = %party.name, key = %party.owning_key.short(), "[po] notary registered");
        self.entries.write().insert(
            party.name.clone(),
            Entry {
                party,
                notary: true,
            },
        );
    }
}

impl IdentityRegistry for InMemoryIdentityRegistry {
    fn resolve(&self, name: &str) -> Option<Party> {
        self.entries.read().get(name).map(|e| e.party.clone())
    }

    fn resolve_key(&self, key: &PublicKey) -> Option<Party> {
        self.entries
            .read()
            .values()
            .find(|e| e.party.owning_key == *key)
            .map(|e| e.party.clone())
    }

    fn parties(&self) -> Vec<Party> {
        self.entries.read().values().map(|e| e.party.clone()).collect()
    }

    fn notaries(&self) -> Vec<Party> {
        self.entries
            .read()
            .values()
            .filter(|e| e.notary)
            .map(|e| e.party.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_and_enumerate() {
        let registry = InMemoryIdentityRegistry::new();
        registry.register(Party::new("NodeA", PublicKey([1; 32])));
        registry.register(Party::new("NodeB", PublicKey([2; 32])));
        registry.register_notary(Party::new("Controller", PublicKey([3; 32])));

        assert_eq!(registry.resolve("NodeB").unwrap().owning_key, PublicKey([2; 32]));
        assert!(registry.resolve("NodeC").is_none());
        assert_eq!(
            registry.resolve_key(&PublicKey([3; 32])).unwrap().name,
            "Controller"
        );
        assert_eq!(registry.parties().len(), 3);
        assert_eq!(registry.notaries().len(), 1);
    }
}
