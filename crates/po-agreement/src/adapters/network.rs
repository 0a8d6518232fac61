//! # In-Memory Network
//!
//! Point-to-point sessions between nodes of one process.
//!
//! Every message crosses the channel as bincode bytes, so a receiver sees
//! exactly what a remote peer would: a payload it must decode and check
//! before trusting. A payload that does not decode is reported as
//! [`ChannelError::Malformed`].
//!
//! ```text
//!  NodeEndpoint(A) ──open(B, session)──► InMemoryNetwork ──inbox──► NodeEndpoint(B).accept()
//!        │                                                                │
//!        └────────────── InMemoryChannel ◄══ mpsc bytes ══► InMemoryChannel
//! ```

use crate::domain::{ChannelError, Party, PublicKey, SessionId};
use crate::ports::{FlowMessage, MessageChannel, MessageNetwork};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace, warn};

/// One end of a session.
pub struct InMemoryChannel {
    session: SessionId,
    peer: Party,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl InMemoryChannel {
    /// Push raw bytes to the peer without encoding (fault injection).
    pub fn send_raw(&self, bytes: Vec<u8>) -> Result<(), ChannelError> {
        self.outbound.send(bytes).map_err(|_| ChannelError::Closed)
    }
}

/// Connected pair for `session`: the first end talks to `b`, the second to `a`.
pub fn channel_pair(session: SessionId, a: Party, b: Party) -> (InMemoryChannel, InMemoryChannel) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        InMemoryChannel {
            session,
            peer: b,
            outbound: a_tx,
            inbound: Mutex::new(a_rx),
        },
        InMemoryChannel {
            session,
            peer: a,
            outbound: b_tx,
            inbound: Mutex::new(b_rx),
        },
    )
}

#[async_trait]
impl MessageChannel for InMemoryChannel {
    fn session_id(&self) -> SessionId {
        self.session
    }

    fn peer(&self) -> &Party {
        &self.peer
    }

    async fn send(&self, message: FlowMessage) -> Result<(), ChannelError> {
        let bytes =
            bincode::serialize(&message).map_err(|e| ChannelError::Malformed(e.to_string()))?;
        trace!(session_id = %self.session, kind = message.kind(), len = bytes.len(), "[po] send");
        self.send_raw(bytes)
    }

    async fn receive(&self) -> Result<FlowMessage, ChannelError> {
        let bytes = self
            .inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or(ChannelError::Closed)?;
        bincode::deserialize(&bytes).map_err(|e| {
            warn!(session_id = %self.session, peer = %self.peer, "[po] undecodable message");
            ChannelError::Malformed(e.to_string())
        })
    }
}

type Inbox = mpsc::UnboundedSender<InMemoryChannel>;

/// Switchboard connecting attached nodes.
#[derive(Default)]
pub struct InMemoryNetwork {
    inboxes: RwLock<HashMap<PublicKey, Inbox>>,
}

impl InMemoryNetwork {
    /// Empty network.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach `party`, replacing any earlier attachment under the same key.
    pub fn attach(self: &Arc<Self>, party: Party) -> NodeEndpoint {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.write().insert(party.owning_key, tx);
        debug!(party = %party, "[po] attached to network");
        NodeEndpoint {
            party,
            hub: Arc::clone(self),
            inbox: Mutex::new(rx),
        }
    }

    /// Detach `party`. Its pending `accept` returns `None` and opening a
    /// session towards it fails.
    pub fn detach(&self, party: &Party) {
        if self.inboxes.write().remove(&party.owning_key).is_some() {
            debug!(party = %party, "[po] detached from network");
        }
    }

    /// Whether `party` is currently attached.
    pub fn is_attached(&self, party: &Party) -> bool {
        self.inboxes.read().contains_key(&party.owning_key)
    }
}

/// A node's handle on the [`InMemoryNetwork`].
pub struct NodeEndpoint {
    party: Party,
    hub: Arc<InMemoryNetwork>,
    inbox: Mutex<mpsc::UnboundedReceiver<InMemoryChannel>>,
}

impl NodeEndpoint {
    /// Party this endpoint belongs to.
    pub fn party(&self) -> &Party {
        &self.party
    }
}

#[async_trait]
impl MessageNetwork for NodeEndpoint {
    async fn open(
        &self,
        peer: &Party,
        session: SessionId,
    ) -> Result<Box<dyn MessageChannel>, ChannelError> {
        let inbox = self
            .hub
            .inboxes
            .read()
            .get(&peer.owning_key)
            .cloned()
            .ok_or_else(|| ChannelError::PeerUnreachable(peer.name.clone()))?;

        let (near, far) = channel_pair(session, self.party.clone(), peer.clone());
        inbox
            .send(far)
            .map_err(|_| ChannelError::PeerUnreachable(peer.name.clone()))?;
        debug!(session_id = %session, peer = %peer, "[po] session opened");
        Ok(Box::new(near))
    }

    async fn accept(&self) -> Option<Box<dyn MessageChannel>> {
        let channel = self.inbox.lock().await.recv().await?;
        debug!(session_id = %channel.session, peer = %channel.peer, "[po] session accepted");
        Some(Box::new(channel))
    }
}
