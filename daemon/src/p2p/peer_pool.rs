use std::sync::Arc;

use tokio::sync::mpsc;

use super::{peer_list::Peer, types::PeerId};

/// A connect/disconnect notification from the peer pool.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    Connected(Arc<Peer>),
    Disconnected(PeerId),
}

pub type PeerEventReceiver = mpsc::Receiver<PeerEvent>;
pub type PeerEventSender = mpsc::Sender<PeerEvent>;

/// The narrow contract this core consumes from the peer pool: connect
/// and disconnect notifications. Peer discovery, handshaking and the
/// pool's own bookkeeping of live connections are all out of scope here —
/// the sync engine only ever observes.
pub trait PeerPool: Send + Sync {
    /// Register the sync engine as an observer. The pool keeps the sending
    /// half and pushes a [`PeerEvent`] each time a peer connects or
    /// disconnects; the engine owns the receiving half for its lifetime.
    fn subscribe(&self) -> PeerEventReceiver;
}
