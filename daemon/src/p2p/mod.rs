pub mod chain_sink;
pub mod error;
pub mod peer_list;
pub mod peer_pool;
pub mod sync_context;
pub mod sync_engine;
pub mod trust;
pub mod types;
pub mod wire;
mod work_queue;

pub use chain_sink::ChainSink;
pub use error::{P2pError, SyncError, SyncOutcome};
pub use peer_list::Peer;
pub use peer_pool::{PeerEvent, PeerPool};
pub use sync_engine::SyncEngine;
pub use wire::WireClient;
