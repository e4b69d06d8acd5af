use std::{
    fmt::{Display, Error, Formatter},
    hash::{Hash as StdHash, Hasher},
    sync::Arc,
};

use fastsync_common::U256;

use crate::p2p::{
    error::P2pError,
    types::{
        BlockNumber, DisconnectReason, GetBlockBodiesResponse, GetBlockHeadersRequest,
        GetBlockHeadersResponse, Hash, PeerId,
    },
    wire::WireClient,
};

/// A peer as seen by the sync engine: a stable identity plus the narrow
/// slice of `WireClient` the engine actually calls.
///
/// Equality and hashing derive from `id()` alone, never from the observed
/// chain view (best hash / total difficulty) and never from a raw
/// connection pointer — that is unsound across an `await` boundary if the
/// pointee can be torn down concurrently. A `PeerId` never is.
pub struct Peer {
    wire: Arc<dyn WireClient>,
    priority: bool,
}

impl Peer {
    pub fn new(wire: Arc<dyn WireClient>, priority: bool) -> Self {
        Self { wire, priority }
    }

    pub fn id(&self) -> PeerId {
        self.wire.peer_id()
    }

    pub fn best_block_hash(&self) -> Hash {
        self.wire.best_block_hash()
    }

    pub fn best_total_difficulty(&self) -> U256 {
        self.wire.best_total_difficulty()
    }

    pub fn best_block_number(&self) -> BlockNumber {
        self.wire.best_block_number()
    }

    /// Locally configured trust (seed node or manually added by the
    /// operator). Unrelated to the dynamically computed trust quorum in
    /// [`crate::p2p::trust::PeerTrustSet`] — kept here only because it is a
    /// property of the peer connection itself.
    pub fn is_priority(&self) -> bool {
        self.priority
    }

    pub async fn get_block_headers(
        &self,
        req: GetBlockHeadersRequest,
    ) -> Result<Option<GetBlockHeadersResponse>, P2pError> {
        self.wire.get_block_headers(req).await
    }

    pub async fn get_block_bodies(
        &self,
        hashes: Vec<Hash>,
    ) -> Result<Option<GetBlockBodiesResponse>, P2pError> {
        self.wire.get_block_bodies(hashes).await
    }

    pub async fn disconnect(&self, reason: DisconnectReason) -> Result<(), P2pError> {
        self.wire.disconnect(reason).await
    }
}

impl Display for Peer {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "Peer[id: {}, best: {}, td: {}, priority: {}]",
            self.id(),
            self.best_block_hash(),
            self.best_total_difficulty(),
            self.priority
        )
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Peer {}

impl StdHash for Peer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}
