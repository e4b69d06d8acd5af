// Fast-sync engine configuration.
//
// These are compile-time defaults. A surrounding node binary may expose CLI
// flags or a config file to override them before constructing the
// SyncEngine; this crate only owns the defaults and the types.

use std::time::Duration;

// Sub-protocol version this engine speaks / expects from peers.
pub const PROTOCOL_VERSION: u32 = 63;

// Trust quorum.
pub const MIN_PEERS_TO_START_SYNC: usize = 2;
pub const MAX_TRUSTED_PEERS: usize = 8;

// Wire-protocol bounds. MAX_RECEIPTS_PER_REQUEST and MAX_STATE_PER_REQUEST
// are part of the wire contract but unused by this core (no receipt or
// state sync here); kept so the constants stay in one place for whoever
// wires the WireClient up to an actual codec.
pub const MAX_HEADERS_PER_REQUEST: u32 = 192;
pub const MAX_BODIES_PER_REQUEST: u32 = 128;
pub const MAX_RECEIPTS_PER_REQUEST: u32 = 256;
pub const MAX_STATE_PER_REQUEST: u32 = 384;

// Per wire-request timeout, enforced by the WireClient implementation; the
// engine just assumes any request can take this long before it gives up and
// treats the peer as failed.
pub const PEER_OBJECT_TIMEOUT_MILLIS: u64 = 8_000;

// Stuck-slot sweeper: reclaims *Requested* slots whose owning task died
// without reaching its own error path.
pub const STUCK_SLOT_SWEEP_INTERVAL_MILLIS: u64 = 15_000;
pub const STUCK_SLOT_TIMEOUT_MILLIS: u64 = 30_000;

// Top-level entry-point bounds.
pub const NOT_ENOUGH_PEERS_TIMEOUT_MILLIS: u64 = 60_000;
pub const STALL_TIMEOUT_MILLIS: u64 = 120_000;

pub fn peer_object_timeout() -> Duration {
    Duration::from_millis(PEER_OBJECT_TIMEOUT_MILLIS)
}

pub fn stuck_slot_sweep_interval() -> Duration {
    Duration::from_millis(STUCK_SLOT_SWEEP_INTERVAL_MILLIS)
}

pub fn stuck_slot_timeout() -> Duration {
    Duration::from_millis(STUCK_SLOT_TIMEOUT_MILLIS)
}

pub fn not_enough_peers_timeout() -> Duration {
    Duration::from_millis(NOT_ENOUGH_PEERS_TIMEOUT_MILLIS)
}

pub fn stall_timeout() -> Duration {
    Duration::from_millis(STALL_TIMEOUT_MILLIS)
}
