use async_trait::async_trait;

use super::types::{BlockBody, BlockHeader};

/// The narrow persistence contract this core consumes from the chain
/// database. The chain database's internal storage (how headers and
/// bodies are actually laid out on disk) is out of scope here.
#[async_trait]
pub trait ChainSink: Send + Sync {
    /// Best header currently on disk; used once at sync start to seed
    /// `finalizedBlock`.
    async fn best_header(&self) -> BlockHeader;

    /// Atomically persist a contiguous, ascending `(headers, bodies)`
    /// batch. `headers[i]` corresponds to `bodies[i]`.
    ///
    /// MUST validate internal consistency (e.g. `headers[i].parent_hash ==
    /// headers[i-1].hash`) and MAY fail; this implementation treats a
    /// failure here as fatal to the current sync run rather than retrying
    /// the same batch.
    async fn persist(&self, headers: Vec<BlockHeader>, bodies: Vec<BlockBody>) -> anyhow::Result<()>;
}
