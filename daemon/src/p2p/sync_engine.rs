use std::collections::HashSet;
use std::sync::Arc;

use fastsync_common::hash::Hash;
use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval, sleep, Instant};

use crate::config;

use super::chain_sink::ChainSink;
use super::error::{SyncError, SyncOutcome};
use super::peer_list::Peer;
use super::peer_pool::{PeerEvent, PeerPool};
use super::sync_context::SyncContext;
use super::trust::AdmissionOutcome;
use super::types::{DisconnectReason, GetBlockHeadersRequest, PeerId};

/// Orchestrates the whole sync run: owns the [`SyncContext`], reacts to
/// [`PeerEvent`]s from the [`PeerPool`], and drives per-peer download tasks
/// against a [`ChainSink`].
pub struct SyncEngine {
    context: Arc<SyncContext>,
    sink: Arc<dyn ChainSink>,
    pool: Arc<dyn PeerPool>,
}

impl SyncEngine {
    pub async fn new(sink: Arc<dyn ChainSink>, pool: Arc<dyn PeerPool>) -> Self {
        let best = sink.best_header().await;
        let context = Arc::new(SyncContext::new(
            best.number,
            best.number,
            config::MIN_PEERS_TO_START_SYNC,
            config::MAX_TRUSTED_PEERS,
        ));
        log::info!("sync engine starting from finalized block {}", best.number);
        Self { context, sink, pool }
    }

    /// Top-level entry point. Runs until the sync window is fully persisted,
    /// the trust threshold is never reached in time, forward progress
    /// stalls, or the chain sink rejects a batch.
    pub async fn run(&self) -> Result<SyncOutcome, SyncError> {
        let mut events = self.pool.subscribe();
        let mut downloads: JoinSet<()> = JoinSet::new();
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<SyncError>(1);
        // Admission tasks report back here whenever a peer becomes eligible
        // to download from (either it was just admitted past the bootstrap
        // phase, or the trust set just crossed `MIN_PEERS_TO_START_SYNC` and
        // every existing member needs its download task launched too). `run`
        // is the only spawner of download tasks so they all land in the same
        // `JoinSet`.
        let (ready_tx, mut ready_rx) = mpsc::channel::<Arc<Peer>>(config::MAX_TRUSTED_PEERS);

        let mut sweeper = interval(config::stuck_slot_sweep_interval());
        let not_enough_peers_deadline = sleep(config::not_enough_peers_timeout());
        tokio::pin!(not_enough_peers_deadline);

        let mut last_progress = self.context.finalized_block().await;
        let mut last_progress_at = Instant::now();

        let mut downloads_ever_started = false;
        // Peers that already have a spawned `obtain_blocks_from_peer` task.
        // A peer can be reported eligible more than once over the engine's
        // lifetime (e.g. it survives one threshold crossing, then the trust
        // set dips below `MIN_PEERS_TO_START_SYNC` and re-crosses with a
        // different member added) — `run` is the single spawn point, so it
        // is the only place that can de-duplicate against a live task.
        let mut downloading: HashSet<PeerId> = HashSet::new();

        loop {
            if downloads_ever_started && downloads.is_empty() && self.context.is_complete().await {
                log::info!("sync complete at finalized block {}", last_progress);
                return Ok(SyncOutcome::Success);
            }

            let trusted_now = self.context.trusted_peer_count().await;

            tokio::select! {
                biased;

                Some(err) = fatal_rx.recv() => {
                    log::error!("sync aborting on fatal sink error: {err}");
                    downloads.shutdown().await;
                    return Err(err);
                }

                event = events.recv() => {
                    match event {
                        Some(PeerEvent::Connected(peer)) => {
                            self.handle_peer_connected(peer, &mut downloads, ready_tx.clone());
                        }
                        Some(PeerEvent::Disconnected(id)) => {
                            self.handle_peer_disconnected(id).await;
                        }
                        None => {
                            log::debug!("peer pool event channel closed");
                        }
                    }
                }

                Some(peer) = ready_rx.recv() => {
                    if downloading.insert(peer.id()) {
                        log::info!("launching download task for {peer}");
                        let context = Arc::clone(&self.context);
                        let sink = Arc::clone(&self.sink);
                        let fatal_tx = fatal_tx.clone();
                        downloads.spawn(async move {
                            obtain_blocks_from_peer(context, sink, peer, fatal_tx).await;
                        });
                        downloads_ever_started = true;
                    } else {
                        log::debug!("{peer} already has a download task; skipping duplicate dispatch");
                    }
                }

                _ = sweeper.tick() => {
                    self.sweep_stuck_slots().await;
                }

                Some(_) = downloads.join_next(), if !downloads.is_empty() => {}

                () = &mut not_enough_peers_deadline, if trusted_now < config::MIN_PEERS_TO_START_SYNC => {
                    log::warn!("never reached trust threshold within the configured bound");
                    downloads.shutdown().await;
                    return Ok(SyncOutcome::NotEnoughPeers);
                }
            }

            let current = self.context.finalized_block().await;
            if current != last_progress {
                last_progress = current;
                last_progress_at = Instant::now();
            } else if trusted_now > 0 && last_progress_at.elapsed() >= config::stall_timeout() {
                log::warn!("no forward progress since {:?}, stalled at {}", last_progress_at, last_progress);
                downloads.shutdown().await;
                return Ok(SyncOutcome::TimedOut);
            }
        }
    }

    /// onPeerConnected: run the trust protocol as its own task, tracked by
    /// the caller's `JoinSet` so `run` can await and shut it down uniformly.
    /// Trust-check failures are logged but non-fatal to the engine. Admission
    /// decisions are reported back over `ready_tx` rather than spawning the
    /// download task here directly, so `run` stays the single place download
    /// tasks enter the `JoinSet`.
    fn handle_peer_connected(&self, peer: Arc<Peer>, downloads: &mut JoinSet<()>, ready_tx: mpsc::Sender<Arc<Peer>>) {
        let context = Arc::clone(&self.context);

        downloads.spawn(async move {
            let (outcome, newly_eligible) = {
                let mut guard = context.lock().await;
                let before = guard.trust().len();
                let outcome = guard.trust().consider_candidate(Arc::clone(&peer)).await;
                let after = guard.trust().len();

                let crossed_threshold = before < config::MIN_PEERS_TO_START_SYNC
                    && after >= config::MIN_PEERS_TO_START_SYNC;

                let newly_eligible = if crossed_threshold {
                    // Every peer admitted during bootstrap gets a download
                    // task the moment the trust set first reaches quorum,
                    // not just the peer that tipped it over.
                    guard.trust().peers().to_vec()
                } else if after >= config::MIN_PEERS_TO_START_SYNC
                    && matches!(outcome, AdmissionOutcome::Admitted | AdmissionOutcome::AdmittedEvicting(_))
                {
                    vec![Arc::clone(&peer)]
                } else {
                    Vec::new()
                };

                (outcome, newly_eligible)
            };

            match outcome {
                AdmissionOutcome::AdmittedFirst => log::info!("admitted {peer} as the first trusted peer"),
                AdmissionOutcome::Admitted => log::info!("admitted {peer} to the trusted set"),
                AdmissionOutcome::AdmittedEvicting(evicted) => {
                    log::warn!("{peer} disagreed with peer {evicted}; evicting {evicted} and admitting {peer}");
                }
                AdmissionOutcome::Rejected => {
                    log::info!("rejected {peer}: disagrees with the trusted set's chain view");
                }
                AdmissionOutcome::AlreadyFull => log::debug!("trusted set is full; not considering {peer}"),
            }

            for eligible in newly_eligible {
                let _ = ready_tx.send(eligible).await;
            }
        });
    }

    /// onPeerDisconnected: drop `id` from the trusted set. Any download task
    /// bound to it is left to fail on its own next network call; the
    /// stuck-slot sweeper reclaims the slot it leaves behind if that never
    /// happens.
    async fn handle_peer_disconnected(&self, id: PeerId) {
        let removed = self.context.lock().await.trust().remove(id).is_some();
        if removed {
            log::info!("peer {id} disconnected; removed from trusted set");
        }
    }

    /// Background backstop: reclaim *Requested* slots whose owning task died
    /// without reverting them itself. A slot only qualifies once it has sat
    /// in *Requested* for longer than `STUCK_SLOT_TIMEOUT_MILLIS`, comfortably
    /// past `PEER_OBJECT_TIMEOUT_MILLIS`, so a live task racing this sweep
    /// always finishes (and reverts or completes the slot itself) first.
    async fn sweep_stuck_slots(&self) {
        let reverted = self
            .context
            .with_lock(|q, _| q.sweep_stuck(config::STUCK_SLOT_TIMEOUT_MILLIS))
            .await;
        if !reverted.is_empty() {
            log::warn!("stuck-slot sweep reclaimed {} requested slot(s): {reverted:?}", reverted.len());
        }
    }
}

/// `obtainBlocksFromPeer`: the per-peer download loop.
async fn obtain_blocks_from_peer(
    context: Arc<SyncContext>,
    sink: Arc<dyn ChainSink>,
    peer: Arc<Peer>,
    fatal_tx: mpsc::Sender<SyncError>,
) {
    // Step 1: probe and extend the sync window. Never lowered again, even
    // if this peer turns out to be lying and is evicted later.
    let best = peer.best_block_number();
    context.with_lock(|q, _| q.raise_end_block_number(best)).await;

    loop {
        let idx = match context.with_lock(|q, _| q.claim_available()).await {
            Some(idx) => idx,
            None => {
                log::debug!("{peer} has no more work; download task exiting");
                return;
            }
        };

        let (start, num_blocks) = context
            .with_lock(|q, _| {
                let item = q.item(idx);
                (item.start_index, item.num_blocks)
            })
            .await;

        if log::log_enabled!(log::Level::Trace) {
            log::trace!("{peer} requesting {num_blocks} headers starting at {start}");
        }

        counter!("fastsync_header_requests", "peer" => peer.id().to_string()).increment(1u64);
        let req = GetBlockHeadersRequest::forward_range(start, num_blocks);
        let headers = match peer.get_block_headers(req).await {
            Ok(Some(resp)) if !resp.headers.is_empty() => resp.headers,
            Ok(_) => {
                log::warn!("{peer} returned an empty header response for slot at {start}");
                fail_slot(&context, idx, &peer).await;
                return;
            }
            Err(err) => {
                log::warn!("{peer} failed header request for slot at {start}: {err}");
                fail_slot(&context, idx, &peer).await;
                return;
            }
        };

        let hashes: Vec<Hash> = headers.iter().map(|h| h.hash).collect();
        let mut bodies = Vec::with_capacity(hashes.len());
        let mut body_fetch_failed = false;

        for chunk in hashes.chunks(config::MAX_BODIES_PER_REQUEST as usize) {
            match peer.get_block_bodies(chunk.to_vec()).await {
                Ok(Some(resp)) => bodies.extend(resp.blocks),
                Ok(None) => {
                    log::warn!("{peer} returned no body batch for slot at {start}");
                    body_fetch_failed = true;
                    break;
                }
                Err(err) => {
                    log::warn!("{peer} failed body request for slot at {start}: {err}");
                    body_fetch_failed = true;
                    break;
                }
            }
        }

        if body_fetch_failed || bodies.len() != headers.len() {
            log::warn!(
                "{peer} header/body mismatch for slot at {start}: {} headers, {} bodies",
                headers.len(),
                bodies.len()
            );
            fail_slot(&context, idx, &peer).await;
            return;
        }

        context.with_lock(|q, _| q.mark_received(idx, headers, bodies)).await;

        if let Err(err) = drain_to_sink(&context, &sink).await {
            let _ = fatal_tx.send(err).await;
            return;
        }
    }
}

/// Shared failure path for a failed header or body fetch: revert the slot,
/// disconnect the peer citing a subprotocol violation, and drop the peer
/// from the trusted set so the engine stops counting on it.
async fn fail_slot(context: &SyncContext, idx: usize, peer: &Peer) {
    context.with_lock(|q, _| q.revert(idx)).await;
    let _ = peer.disconnect(DisconnectReason::SubprotocolViolation).await;
    context.lock().await.trust().remove(peer.id());
}

/// The persistence drain: repeatedly persist the next in-order *Received*
/// slot until none remains. Holds the `SyncContext` lock across the
/// `ChainSink::persist` call itself, so the whole drain is observed as one
/// atomic step by every other task — other slot claims block for the
/// duration of a persist call.
async fn drain_to_sink(context: &SyncContext, sink: &Arc<dyn ChainSink>) -> Result<(), SyncError> {
    loop {
        let mut guard = context.lock().await;
        let Some(idx) = guard.queue().next_ready_for_persist() else {
            return Ok(());
        };

        let item = guard.queue().item(idx);
        let headers = item.headers.clone();
        let bodies = item.bodies.clone();
        let (start, end) = (item.start_index, item.end_index());

        sink.persist(headers, bodies).await.map_err(SyncError::Sink)?;

        guard.queue().mark_persisted(idx);
        drop(guard);

        counter!("fastsync_blocks_persisted").increment(end.saturating_diff(&start) + 1);
        log::info!("persisted blocks [{start}..{end}]");
    }
}
