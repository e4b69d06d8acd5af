use fastsync_common::block_number::BlockNumber;
use fastsync_common::time::{get_current_time_in_millis, TimestampMillis};

use super::types::{BlockBody, BlockHeader};

/// Lifecycle of a single [`WorkItem`]. Progresses strictly forward except
/// for the one allowed revert `Requested -> Initial` on peer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Initial,
    Requested,
    Received,
    Persisted,
}

/// A reservation for a contiguous block range inside the sync window.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub start_index: BlockNumber,
    pub num_blocks: u32,
    pub state: SlotState,
    pub headers: Vec<BlockHeader>,
    pub bodies: Vec<BlockBody>,
    /// Wall-clock time (millis) this slot last transitioned into
    /// `Requested`. `None` outside that state. Read by the stuck-slot
    /// sweeper to decide whether the owning task is presumed dead.
    requested_at: Option<TimestampMillis>,
}

impl WorkItem {
    fn new(start_index: BlockNumber, num_blocks: u32) -> Self {
        debug_assert!(num_blocks > 0, "a work item must cover at least one block");
        Self {
            start_index,
            num_blocks,
            state: SlotState::Initial,
            headers: Vec::new(),
            bodies: Vec::new(),
            requested_at: None,
        }
    }

    /// Last block number covered by this item, inclusive.
    pub fn end_index(&self) -> BlockNumber {
        self.start_index.saturating_add(self.num_blocks as u64 - 1)
    }
}

/// The in-memory sliding window of work items.
///
/// This type holds no lock of its own: callers (the [`super::sync_context::SyncContext`])
/// are expected to hold it behind a single mutex for the duration of each
/// operation, so that `claim_available` observes a consistent view and the
/// claim itself is the serialization point.
pub struct WorkQueue {
    items: Vec<WorkItem>,
    finalized_block: BlockNumber,
    end_block_number: BlockNumber,
}

impl WorkQueue {
    pub fn new(finalized_block: BlockNumber, end_block_number: BlockNumber) -> Self {
        Self {
            items: Vec::new(),
            finalized_block,
            end_block_number,
        }
    }

    pub fn finalized_block(&self) -> BlockNumber {
        self.finalized_block
    }

    pub fn end_block_number(&self) -> BlockNumber {
        self.end_block_number
    }

    /// Raise the sync window target. Monotonic only: a lower or equal value
    /// is a no-op.
    pub fn raise_end_block_number(&mut self, candidate: BlockNumber) {
        if candidate > self.end_block_number {
            self.end_block_number = candidate;
        }
    }

    pub fn item(&self, idx: usize) -> &WorkItem {
        &self.items[idx]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True once every item is `Persisted` and the window cannot be
    /// extended further.
    pub fn is_complete(&self) -> bool {
        self.finalized_block.saturating_add(1) > self.end_block_number
            && self.items.iter().all(|i| i.state == SlotState::Persisted)
    }

    /// The slot-selection algorithm: atomically pick a slot to work on and
    /// mark it `Requested` before returning, so that by the time the caller
    /// sees the index, no other worker can claim the same slot — the
    /// transition to `Requested` happens before any network wait.
    ///
    /// Returns `None` when the sync window is exhausted for this peer: no
    /// recyclable `Initial` slot exists and the window cannot be extended
    /// further.
    pub fn claim_available(&mut self) -> Option<usize> {
        let mut max_pending = self.finalized_block;
        let mut initial_hit = None;

        for (idx, item) in self.items.iter().enumerate() {
            let end = item.end_index();
            if end > max_pending {
                max_pending = end;
            }
            if initial_hit.is_none() && item.state == SlotState::Initial {
                initial_hit = Some(idx);
            }
        }

        if let Some(idx) = initial_hit {
            let item = &mut self.items[idx];
            item.state = SlotState::Requested;
            item.requested_at = Some(get_current_time_in_millis());
            return Some(idx);
        }

        let next_start = max_pending.saturating_add(1);
        if next_start > self.end_block_number {
            // Sync window exhausted: nothing left to extend into.
            return None;
        }

        // Inclusive remaining width: `end_block_number` is the last block in
        // the window, so the final request must cover exactly one block when
        // `next_start == end_block_number` rather than zero.
        let remaining = self.end_block_number.saturating_diff(&next_start) + 1;
        let num_blocks = remaining.min(crate::config::MAX_HEADERS_PER_REQUEST as u64) as u32;

        let idx = match self.find_persisted_slot() {
            Some(idx) => {
                let item = &mut self.items[idx];
                item.start_index = next_start;
                item.num_blocks = num_blocks;
                item.state = SlotState::Requested;
                item.headers.clear();
                item.bodies.clear();
                item.requested_at = Some(get_current_time_in_millis());
                idx
            }
            None => {
                let mut item = WorkItem::new(next_start, num_blocks);
                item.state = SlotState::Requested;
                item.requested_at = Some(get_current_time_in_millis());
                self.items.push(item);
                self.items.len() - 1
            }
        };

        Some(idx)
    }

    fn find_persisted_slot(&self) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.state == SlotState::Persisted)
    }

    /// Transition `Requested -> Received`, storing the downloaded material.
    /// Panics if the slot was not `Requested`: that would mean the caller
    /// lost track of its own claim, which is a programming error in the
    /// download task, not a peer failure.
    pub fn mark_received(&mut self, idx: usize, headers: Vec<BlockHeader>, bodies: Vec<BlockBody>) {
        let item = &mut self.items[idx];
        assert_eq!(item.state, SlotState::Requested, "mark_received on a non-Requested slot");
        debug_assert_eq!(headers.len(), bodies.len());
        debug_assert_eq!(headers.len(), item.num_blocks as usize);
        item.headers = headers;
        item.bodies = bodies;
        item.state = SlotState::Received;
        item.requested_at = None;
    }

    /// Transition `Requested -> Initial`, discarding any partial data. The
    /// slot is never removed — a later worker reclaims it via
    /// `claim_available`.
    pub fn revert(&mut self, idx: usize) {
        let item = &mut self.items[idx];
        assert_eq!(item.state, SlotState::Requested, "revert on a non-Requested slot");
        item.headers.clear();
        item.bodies.clear();
        item.state = SlotState::Initial;
        item.requested_at = None;
    }

    /// True if any `Received` item is waiting behind a gap.
    pub fn has_out_of_order_blocks(&self) -> bool {
        self.items.iter().any(|i| i.state == SlotState::Received)
    }

    /// Pop the next `Received` item ready for in-order persistence, if any,
    /// returning its index, headers and bodies. Does not mutate the item's
    /// state or `finalized_block` — the caller does that once the sink call
    /// actually succeeds, so a failed persist leaves the queue unchanged.
    pub fn next_ready_for_persist(&self) -> Option<usize> {
        let expected_start = self.finalized_block.saturating_add(1);
        self.items
            .iter()
            .position(|i| i.state == SlotState::Received && i.start_index == expected_start)
    }

    /// Mark `idx` persisted, releasing its material and advancing
    /// `finalized_block` to its `end_index`.
    pub fn mark_persisted(&mut self, idx: usize) {
        let end_index = {
            let item = &self.items[idx];
            assert_eq!(item.state, SlotState::Received, "mark_persisted on a non-Received slot");
            assert_eq!(
                item.start_index,
                self.finalized_block.saturating_add(1),
                "persisted out of order"
            );
            item.end_index()
        };
        let item = &mut self.items[idx];
        item.headers.clear();
        item.bodies.clear();
        item.state = SlotState::Persisted;
        self.finalized_block = end_index;
    }

    /// Revert every `Requested` slot whose `requested_at` is older than
    /// `max_age_millis`, on the theory that the worker holding it died
    /// without reaching its own error path (its peer disconnected mid-await
    /// and nothing else will ever revert the slot for it). Returns the
    /// indices reverted, for logging.
    ///
    /// Safe to call even if a slot's owning task is in fact still alive and
    /// about to finish: `claim_available` will simply hand the slot to a
    /// second worker, and whichever of the two calls `mark_received` or
    /// `revert` first wins the race — the other's assert will fire, which
    /// is the same "lost track of its own claim" contract every other
    /// mutator here already has. In practice this only fires once
    /// `max_age_millis` comfortably exceeds `PEER_OBJECT_TIMEOUT_MILLIS`,
    /// so a live task finishes long before the sweep would reclaim under it.
    pub fn sweep_stuck(&mut self, max_age_millis: u64) -> Vec<usize> {
        let now = get_current_time_in_millis();
        let mut reverted = Vec::new();
        for (idx, item) in self.items.iter_mut().enumerate() {
            if item.state != SlotState::Requested {
                continue;
            }
            let Some(requested_at) = item.requested_at else {
                continue;
            };
            if now.saturating_sub(requested_at) >= max_age_millis {
                item.headers.clear();
                item.bodies.clear();
                item.state = SlotState::Initial;
                item.requested_at = None;
                reverted.push(idx);
            }
        }
        reverted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bn(n: u64) -> BlockNumber {
        BlockNumber::new(n)
    }

    fn headers_and_bodies(start: u64, n: u32) -> (Vec<BlockHeader>, Vec<BlockBody>) {
        let headers = (0..n)
            .map(|i| BlockHeader {
                hash: fastsync_common::hash::hash(&(start + i as u64).to_be_bytes()),
                parent_hash: fastsync_common::hash::Hash::zero(),
                number: bn(start + i as u64),
            })
            .collect::<Vec<_>>();
        let bodies = headers.iter().map(|h| BlockBody { hash: h.hash }).collect();
        (headers, bodies)
    }

    #[test]
    fn claim_partitions_the_window_by_max_headers_per_request() {
        let mut q = WorkQueue::new(bn(100), bn(500));

        let idx1 = q.claim_available().expect("first slot");
        assert_eq!(q.item(idx1).start_index, bn(101));
        assert_eq!(q.item(idx1).end_index(), bn(292));

        let idx2 = q.claim_available().expect("second slot");
        assert_eq!(q.item(idx2).start_index, bn(293));
        assert_eq!(q.item(idx2).end_index(), bn(484));

        let idx3 = q.claim_available().expect("third slot");
        assert_eq!(q.item(idx3).start_index, bn(485));
        assert_eq!(q.item(idx3).end_index(), bn(500));

        assert!(q.claim_available().is_none(), "window is fully claimed");
    }

    #[test]
    fn single_block_window_yields_exactly_one_block() {
        let mut q = WorkQueue::new(bn(499), bn(500));
        let idx = q.claim_available().expect("one block left");
        assert_eq!(q.item(idx).start_index, bn(500));
        assert_eq!(q.item(idx).num_blocks, 1);
        assert!(q.claim_available().is_none());
    }

    #[test]
    fn revert_recycles_the_same_slot_without_growing_the_queue() {
        let mut q = WorkQueue::new(bn(100), bn(500));
        let idx = q.claim_available().unwrap();
        let len_before = q.len();
        q.revert(idx);
        assert_eq!(q.item(idx).state, SlotState::Initial);
        assert_eq!(q.len(), len_before);

        let idx2 = q.claim_available().unwrap();
        assert_eq!(idx2, idx, "the reverted slot is recycled before a new one is appended");
    }

    #[test]
    fn mark_received_then_persisted_advances_finalized_block() {
        let mut q = WorkQueue::new(bn(100), bn(500));
        let idx = q.claim_available().unwrap();
        let (headers, bodies) = headers_and_bodies(101, 192);
        q.mark_received(idx, headers, bodies);

        assert_eq!(q.next_ready_for_persist(), Some(idx));
        q.mark_persisted(idx);

        assert_eq!(q.finalized_block(), bn(292));
        assert_eq!(q.item(idx).state, SlotState::Persisted);
        assert!(q.item(idx).headers.is_empty());
    }

    #[test]
    fn out_of_order_arrival_is_not_persisted_until_the_gap_closes() {
        let mut q = WorkQueue::new(bn(100), bn(500));
        let a = q.claim_available().unwrap();
        let b = q.claim_available().unwrap();

        let (h_b, bo_b) = headers_and_bodies(293, 192);
        q.mark_received(b, h_b, bo_b);
        assert!(q.has_out_of_order_blocks());
        assert_eq!(q.next_ready_for_persist(), None, "B arrived but A hasn't, so nothing drains yet");

        let (h_a, bo_a) = headers_and_bodies(101, 192);
        q.mark_received(a, h_a, bo_a);
        assert_eq!(q.next_ready_for_persist(), Some(a));
        q.mark_persisted(a);
        assert_eq!(q.next_ready_for_persist(), Some(b));
        q.mark_persisted(b);
        assert_eq!(q.finalized_block(), bn(484));
        assert!(!q.has_out_of_order_blocks());
    }

    #[test]
    fn raising_end_block_number_never_lowers_it() {
        let mut q = WorkQueue::new(bn(100), bn(500));
        q.raise_end_block_number(bn(600));
        assert_eq!(q.end_block_number(), bn(600));
        q.raise_end_block_number(bn(550));
        assert_eq!(q.end_block_number(), bn(600));
    }

    #[test]
    fn is_complete_once_every_slot_is_persisted_and_window_exhausted() {
        let mut q = WorkQueue::new(bn(100), bn(101));
        let idx = q.claim_available().unwrap();
        assert!(!q.is_complete());
        let (h, b) = headers_and_bodies(101, 1);
        q.mark_received(idx, h, b);
        q.mark_persisted(idx);
        assert!(q.claim_available().is_none());
        assert!(q.is_complete());
    }

    #[test]
    fn sweep_stuck_reverts_only_requested_slots_past_the_max_age() {
        let mut q = WorkQueue::new(bn(100), bn(500));
        let idx = q.claim_available().unwrap();

        // A zero max age means "stuck the instant it was requested" —
        // deterministic without needing to actually sleep in a unit test.
        let reverted = q.sweep_stuck(0);
        assert_eq!(reverted, vec![idx]);
        assert_eq!(q.item(idx).state, SlotState::Initial);
    }

    #[test]
    fn sweep_stuck_leaves_fresh_claims_and_non_requested_slots_alone() {
        let mut q = WorkQueue::new(bn(100), bn(500));
        let idx = q.claim_available().unwrap();

        // A generous max age never fires for a slot claimed moments ago.
        assert!(q.sweep_stuck(u64::MAX).is_empty());
        assert_eq!(q.item(idx).state, SlotState::Requested);

        let (h, b) = headers_and_bodies(101, q.item(idx).num_blocks);
        q.mark_received(idx, h, b);
        assert!(q.sweep_stuck(0).is_empty(), "a Received slot is never swept");
    }
}
