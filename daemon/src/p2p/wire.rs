use async_trait::async_trait;
use fastsync_common::U256;

use super::{
    error::P2pError,
    types::{BlockNumber, DisconnectReason, GetBlockHeadersRequest, GetBlockHeadersResponse, GetBlockBodiesResponse, Hash, PeerId},
};

/// The narrow wire contract this core consumes from a single remote peer.
///
/// Everything below `WireClient` — the encrypted transport handshake,
/// sub-protocol framing, RLP encoding, per-request timeouts — is an
/// external collaborator; the sync engine only ever calls these six
/// methods.
///
/// Implementations MUST enforce `PEER_OBJECT_TIMEOUT_MILLIS` themselves and
/// surface it as [`P2pError::Timeout`]: the engine does not wrap these
/// calls in its own timeout, it trusts the collaborator.
#[async_trait]
pub trait WireClient: Send + Sync {
    fn peer_id(&self) -> PeerId;

    /// Cached best-block hash from the handshake / last ping. Does not
    /// require a network round-trip.
    fn best_block_hash(&self) -> Hash;

    /// Cached best total difficulty from the handshake / last ping.
    fn best_total_difficulty(&self) -> U256;

    /// Cached best block number from the handshake / last ping. Probed by
    /// the download task at task start to extend `endBlockNumber`.
    fn best_block_number(&self) -> BlockNumber;

    async fn get_block_headers(
        &self,
        req: GetBlockHeadersRequest,
    ) -> Result<Option<GetBlockHeadersResponse>, P2pError>;

    async fn get_block_bodies(
        &self,
        hashes: Vec<Hash>,
    ) -> Result<Option<GetBlockBodiesResponse>, P2pError>;

    async fn disconnect(&self, reason: DisconnectReason) -> Result<(), P2pError>;
}
