//! Checkpoint Store Adapter
//!
//! Keeps continuations as bincode blobs keyed by session, the same bytes a
//! durable store would hold.

use crate::domain::{LedgerError, SessionId};
use crate::flow::Checkpoint;
use crate::ports::CheckpointStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::trace;

/// In-memory checkpoint store.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    entries: RwLock<HashMap<SessionId, Vec<u8>>>,
}

impl InMemoryCheckpointStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored checkpoints.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no checkpoint is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn decode(bytes: &[u8]) -> Result<Checkpoint, LedgerError> {
    bincode::deserialize(bytes).map_err(|e| LedgerError::Storage(e.to_string()))
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), LedgerError> {
        let bytes =
            bincode::serialize(checkpoint).map_err(|e| LedgerError::Storage(e.to_string()))?;
        trace!(
            session_id = %checkpoint.session(),
            step = checkpoint.step_label(),
            len = bytes.len(),
            "[po] checkpoint saved"
        );
        self.entries.write().insert(checkpoint.session(), bytes);
        Ok(())
    }

    async fn load(&self, session: SessionId) -> Result<Option<Checkpoint>, LedgerError> {
        self.entries
            .read()
            .get(&session)
            .map(|bytes| decode(bytes))
            .transpose()
    }

    async fn remove(&self, session: SessionId) -> Result<(), LedgerError> {
        self.entries.write().remove(&session);
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<Checkpoint>, LedgerError> {
        self.entries
            .read()
            .values()
            .map(|bytes| decode(bytes))
            .collect()
    }
}
