use std::fmt::{self, Display, Formatter};

pub use fastsync_common::{block_number::BlockNumber, hash::Hash};

/// Stable peer identity assigned by the [`super::peer_pool::PeerPool`] at
/// admission time. Never recycled while the node is running.
///
/// Using a plain integer id (rather than hashing a connection handle or a
/// raw pointer) matters because a `Peer` reference can go stale across an
/// `await` boundary, but its id never does.
pub type PeerId = u64;

/// A canonical block header as exchanged on the wire. Treated as an opaque,
/// already-validated-by-the-wire-codec payload here; the sync engine only
/// ever reads `number`, `parent_hash` and `hash` out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub hash: Hash,
    pub parent_hash: Hash,
    pub number: BlockNumber,
}

/// A canonical block body, aligned 1-to-1 with the header of the same hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBody {
    pub hash: Hash,
}

/// Selects the starting point of a `getBlockHeaders` request: either a
/// known hash (used by the trust protocol's pairwise-agreement probe) or a
/// block number (used by the range downloader).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashOrNumber {
    Hash(Hash),
    Number(BlockNumber),
}

impl Display for HashOrNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            HashOrNumber::Hash(h) => write!(f, "hash {}", h),
            HashOrNumber::Number(n) => write!(f, "number {}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBlockHeadersRequest {
    pub start_block: HashOrNumber,
    pub max_results: u32,
    pub skip: u32,
    pub reverse: bool,
}

impl Display for GetBlockHeadersRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "getBlockHeaders(start={}, max={}, skip={}, reverse={})",
            self.start_block, self.max_results, self.skip, self.reverse
        )
    }
}

impl GetBlockHeadersRequest {
    /// A forward, no-skip range request of `[start .. start + num_blocks)`,
    /// as used by the per-peer download loop.
    pub fn forward_range(start: BlockNumber, num_blocks: u32) -> Self {
        Self {
            start_block: HashOrNumber::Number(start),
            max_results: num_blocks,
            skip: 0,
            reverse: false,
        }
    }

    /// A single reversed lookup by hash, as used by the trust protocol's
    /// `peersAgreeOnChain` probe.
    pub fn single_reversed(hash: Hash) -> Self {
        Self {
            start_block: HashOrNumber::Hash(hash),
            max_results: 1,
            skip: 0,
            reverse: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBlockHeadersResponse {
    pub headers: Vec<BlockHeader>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBlockBodiesResponse {
    pub blocks: Vec<BlockBody>,
}

/// Why the engine closed a connection. Surfaced to the [`super::wire::WireClient`]
/// so the peer pool can decide whether to temp-ban the remote address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Empty/partial/mismatched response to a range request.
    SubprotocolViolation,
    /// A wire request exceeded `PEER_OBJECT_TIMEOUT_MILLIS`.
    Timeout,
}

impl Display for DisconnectReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::SubprotocolViolation => write!(f, "subprotocol violation"),
            DisconnectReason::Timeout => write!(f, "timeout"),
        }
    }
}
