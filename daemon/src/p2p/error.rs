use thiserror::Error;

/// Errors raised by a single wire interaction with one peer.
///
/// These are the only errors the per-peer download task and the trust
/// protocol ever see; the engine treats every variant here the same way:
/// revert the slot, disconnect the peer, stop the task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum P2pError {
    #[error("request to peer timed out")]
    Timeout,

    #[error("peer disconnected before responding")]
    Disconnected,

    #[error("peer returned an empty response for {0}")]
    EmptyResponse(String),

    #[error("header/body count mismatch: {headers} headers, {bodies} bodies")]
    CountMismatch { headers: usize, bodies: usize },

    #[error("invalid response from peer: {0}")]
    InvalidResponse(String),
}

/// The outcome of a top-level sync run, returned by [`crate::p2p::sync_engine::SyncEngine::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The sync window was fully downloaded and persisted.
    Success,
    /// The trusted-peer set never reached `MIN_PEERS_TO_START_SYNC` within the configured bound.
    NotEnoughPeers,
    /// No forward progress was observed within the configured stall bound.
    TimedOut,
}

/// Fatal, crate-level errors. Everything transient is a [`P2pError`] and is
/// swallowed by the download task; this type only carries what should
/// actually abort a sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("chain sink rejected persistence: {0}")]
    Sink(#[from] anyhow::Error),
}
