use fastsync_common::block_number::BlockNumber;
use tokio::sync::Mutex;

use super::trust::PeerTrustSet;
use super::work_queue::WorkQueue;

/// The process-wide singleton for one sync run: the WorkQueue and the
/// trusted-peer set behind a single lock, plus the two watermarks every
/// component reads.
///
/// Holding both behind one mutex, rather than one lock per field, is what
/// makes the invariants between the queue and the trust set hold without a
/// separate locking protocol — admitting a peer and claiming a slot for it
/// are never observed interleaved by a third task.
pub struct SyncContext {
    inner: Mutex<Inner>,
}

struct Inner {
    queue: WorkQueue,
    trust: PeerTrustSet,
}

impl SyncContext {
    pub fn new(
        finalized_block: BlockNumber,
        end_block_number: BlockNumber,
        min_peers_to_start_sync: usize,
        max_trusted_peers: usize,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: WorkQueue::new(finalized_block, end_block_number),
                trust: PeerTrustSet::new(min_peers_to_start_sync, max_trusted_peers),
            }),
        }
    }

    /// Run a closure with exclusive access to both the queue and the trust
    /// set. Every mutation in this crate goes through here: there is no
    /// direct public accessor to either field, so a caller cannot forget to
    /// take the lock.
    pub async fn with_lock<R>(&self, f: impl FnOnce(&mut WorkQueue, &mut PeerTrustSet) -> R) -> R {
        let mut guard = self.inner.lock().await;
        let Inner { queue, trust } = &mut *guard;
        f(queue, trust)
    }

    /// Take the lock and hold it across the returned guard's lifetime,
    /// including across further `.await` points. Used by the persistence
    /// drain: it needs the queue and the `ChainSink::persist` call to be
    /// observed as one atomic step, which a `with_lock` closure (synchronous,
    /// can't `.await` inside it) cannot express.
    pub async fn lock(&self) -> SyncContextGuard<'_> {
        SyncContextGuard {
            inner: self.inner.lock().await,
        }
    }

    pub async fn finalized_block(&self) -> BlockNumber {
        self.with_lock(|q, _| q.finalized_block()).await
    }

    pub async fn is_complete(&self) -> bool {
        self.with_lock(|q, _| q.is_complete()).await
    }

    pub async fn trusted_peer_count(&self) -> usize {
        self.with_lock(|_, t| t.len()).await
    }
}

/// A held lock on the [`SyncContext`], alive across `.await` points.
pub struct SyncContextGuard<'a> {
    inner: tokio::sync::MutexGuard<'a, Inner>,
}

impl<'a> SyncContextGuard<'a> {
    pub fn queue(&mut self) -> &mut WorkQueue {
        &mut self.inner.queue
    }

    pub fn trust(&mut self) -> &mut PeerTrustSet {
        &mut self.inner.trust
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_lock_serializes_access_to_both_fields() {
        let ctx = SyncContext::new(BlockNumber::new(100), BlockNumber::new(200), 2, 8);
        assert_eq!(ctx.finalized_block().await, BlockNumber::new(100));
        assert_eq!(ctx.trusted_peer_count().await, 0);
        assert!(!ctx.is_complete().await);
    }
}
