use std::sync::Arc;

use rand::seq::SliceRandom;

use super::peer_list::Peer;
use super::types::{GetBlockHeadersRequest, PeerId};

/// Result of [`PeerTrustSet::consider_candidate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// The trust set was empty; `p` seeded it unconditionally.
    AdmittedFirst,
    /// `p` agreed with every existing member (or with the random witness
    /// once the set is past bootstrap) and was admitted.
    Admitted,
    /// `p` disagreed with exactly one existing member during bootstrap; that
    /// member was evicted and `p` admitted in its place.
    AdmittedEvicting(PeerId),
    /// `p` disagreed with two or more members, or with the random witness.
    Rejected,
    /// The set is already at `MAX_TRUSTED_PEERS`; `p` was not considered.
    AlreadyFull,
}

/// Pairwise agreement check: the peer with the lower reported total
/// difficulty is asked whether it knows the other's best hash. A network
/// failure during the probe is treated the same as a negative answer — this
/// protocol only distinguishes "agrees" from "does not agree", and a trust
/// check has no separate retry path.
pub async fn peers_agree_on_chain(a: &Peer, b: &Peer) -> bool {
    let (asker, target) = if a.best_total_difficulty() <= b.best_total_difficulty() {
        (a, b)
    } else {
        (b, a)
    };

    let req = GetBlockHeadersRequest::single_reversed(target.best_block_hash());
    match asker.get_block_headers(req).await {
        Ok(Some(response)) => !response.headers.is_empty(),
        Ok(None) | Err(_) => false,
    }
}

/// The dynamically computed set of peers whose chain view has passed the
/// pairwise agreement protocol. Distinct from [`Peer::is_priority`], which
/// is static operator configuration.
pub struct PeerTrustSet {
    peers: Vec<Arc<Peer>>,
    min_to_start_sync: usize,
    max_trusted: usize,
}

impl PeerTrustSet {
    pub fn new(min_to_start_sync: usize, max_trusted: usize) -> Self {
        Self {
            peers: Vec::new(),
            min_to_start_sync,
            max_trusted,
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.peers.iter().any(|p| p.id() == id)
    }

    pub fn peers(&self) -> &[Arc<Peer>] {
        &self.peers
    }

    /// Drop `id` from the set, e.g. on disconnect.
    pub fn remove(&mut self, id: PeerId) -> Option<Arc<Peer>> {
        let pos = self.peers.iter().position(|p| p.id() == id)?;
        Some(self.peers.remove(pos))
    }

    fn random_member(&self) -> Option<Arc<Peer>> {
        self.peers.choose(&mut rand::thread_rng()).cloned()
    }

    /// Run the admission protocol for a newly connected candidate. Callers
    /// are expected to hold the `SyncContext` mutex across this call, since
    /// it mutates the set.
    pub async fn consider_candidate(&mut self, candidate: Arc<Peer>) -> AdmissionOutcome {
        if self.peers.len() >= self.max_trusted {
            return AdmissionOutcome::AlreadyFull;
        }

        if self.peers.is_empty() {
            self.peers.push(candidate);
            return AdmissionOutcome::AdmittedFirst;
        }

        // The bootstrap, full-pairwise-comparison phase covers sizes 1
        // through `min_to_start_sync` inclusive, not just sizes strictly
        // below it: a worked scenario in the protocol this follows has a
        // dissenting member evicted at the exact moment the quorum is
        // reached (candidate disagrees with one of the two founding
        // members), which a strict `<` here would miss — that candidate
        // would fall through to the single-random-witness branch below and
        // never get to compare against the member it actually disagrees
        // with. Once the set is strictly larger than the minimum, eviction
        // stops and a single random witness decides admission.
        if self.peers.len() <= self.min_to_start_sync {
            let mut dissenters = Vec::new();
            for existing in &self.peers {
                if !peers_agree_on_chain(&candidate, existing).await {
                    dissenters.push(existing.id());
                }
            }

            match dissenters.len() {
                0 => {
                    self.peers.push(candidate);
                    AdmissionOutcome::Admitted
                }
                1 => {
                    let evicted = dissenters[0];
                    self.remove(evicted);
                    self.peers.push(candidate);
                    AdmissionOutcome::AdmittedEvicting(evicted)
                }
                _ => AdmissionOutcome::Rejected,
            }
        } else {
            let Some(witness) = self.random_member() else {
                return AdmissionOutcome::Rejected;
            };

            if peers_agree_on_chain(&candidate, &witness).await {
                self.peers.push(candidate);
                AdmissionOutcome::Admitted
            } else {
                AdmissionOutcome::Rejected
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use fastsync_common::{block_number::BlockNumber, hash::Hash, U256};

    use super::*;
    use crate::p2p::error::P2pError;
    use crate::p2p::types::{
        DisconnectReason, GetBlockBodiesResponse, GetBlockHeadersResponse, HashOrNumber,
    };
    use crate::p2p::wire::WireClient;

    struct FakeWire {
        id: PeerId,
        best_hash: Hash,
        best_td: U256,
        knows: StdMutex<HashSet<Hash>>,
    }

    impl FakeWire {
        fn new(id: PeerId, best_hash: Hash, best_td: u64) -> Self {
            Self {
                id,
                best_hash,
                best_td: U256::from(best_td),
                knows: StdMutex::new(HashSet::new()),
            }
        }

        fn also_knows(self, hash: Hash) -> Self {
            self.knows.lock().unwrap().insert(hash);
            self
        }
    }

    #[async_trait]
    impl WireClient for FakeWire {
        fn peer_id(&self) -> PeerId {
            self.id
        }

        fn best_block_hash(&self) -> Hash {
            self.best_hash
        }

        fn best_total_difficulty(&self) -> U256 {
            self.best_td
        }

        fn best_block_number(&self) -> BlockNumber {
            BlockNumber::ZERO
        }

        async fn get_block_headers(
            &self,
            req: GetBlockHeadersRequest,
        ) -> Result<Option<GetBlockHeadersResponse>, P2pError> {
            let HashOrNumber::Hash(hash) = req.start_block else {
                return Ok(Some(GetBlockHeadersResponse { headers: vec![] }));
            };
            let known = self.knows.lock().unwrap().contains(&hash) || hash == self.best_hash;
            if known {
                Ok(Some(GetBlockHeadersResponse {
                    headers: vec![crate::p2p::types::BlockHeader {
                        hash,
                        parent_hash: Hash::zero(),
                        number: BlockNumber::ZERO,
                    }],
                }))
            } else {
                Ok(Some(GetBlockHeadersResponse { headers: vec![] }))
            }
        }

        async fn get_block_bodies(
            &self,
            _hashes: Vec<Hash>,
        ) -> Result<Option<GetBlockBodiesResponse>, P2pError> {
            Ok(Some(GetBlockBodiesResponse { blocks: vec![] }))
        }

        async fn disconnect(&self, _reason: DisconnectReason) -> Result<(), P2pError> {
            Ok(())
        }
    }

    fn peer(id: PeerId, hash: Hash, td: u64) -> Arc<Peer> {
        Arc::new(Peer::new(Arc::new(FakeWire::new(id, hash, td)), false))
    }

    fn peer_knowing(id: PeerId, hash: Hash, td: u64, also: Hash) -> Arc<Peer> {
        Arc::new(Peer::new(
            Arc::new(FakeWire::new(id, hash, td).also_knows(also)),
            false,
        ))
    }

    fn h(byte: u8) -> Hash {
        Hash::new([byte; 32])
    }

    #[tokio::test]
    async fn first_peer_is_admitted_unconditionally() {
        let mut set = PeerTrustSet::new(2, 8);
        let p1 = peer(1, h(1), 100);
        assert_eq!(set.consider_candidate(p1).await, AdmissionOutcome::AdmittedFirst);
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn agreeing_second_peer_is_admitted() {
        let mut set = PeerTrustSet::new(2, 8);
        let p1 = peer(1, h(1), 100);
        set.consider_candidate(p1.clone()).await;

        // p2 has lower td, so p2 is asked whether it knows p1's hash.
        let p2 = peer_knowing(2, h(2), 50, h(1));
        assert_eq!(set.consider_candidate(p2).await, AdmissionOutcome::Admitted);
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn lying_peer_is_evicted_in_favor_of_the_newcomer() {
        let mut set = PeerTrustSet::new(2, 8);
        let t1 = peer(1, h(1), 100);
        let t2 = peer_knowing(2, h(2), 90, h(1));
        set.consider_candidate(t1.clone()).await;
        set.consider_candidate(t2).await;
        assert_eq!(set.len(), 2);

        // p disagrees with t1 only (doesn't know h(1)), agrees with t2.
        let p = peer_knowing(3, h(3), 10, h(2));
        let outcome = set.consider_candidate(p).await;
        assert_eq!(outcome, AdmissionOutcome::AdmittedEvicting(1));
        assert!(!set.contains(1));
        assert!(set.contains(3));
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn disagreement_with_two_or_more_members_rejects_the_candidate() {
        let mut set = PeerTrustSet::new(3, 8);
        let t1 = peer(1, h(1), 100);
        let t2 = peer(2, h(2), 90);
        set.consider_candidate(t1).await;
        set.consider_candidate(t2).await;
        assert_eq!(set.len(), 2);

        // p knows neither h(1) nor h(2).
        let p = peer(3, h(3), 10);
        assert_eq!(set.consider_candidate(p).await, AdmissionOutcome::Rejected);
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn full_trust_set_rejects_further_candidates_without_probing() {
        let mut set = PeerTrustSet::new(1, 1);
        let t1 = peer(1, h(1), 100);
        set.consider_candidate(t1).await;

        let p = peer(2, h(2), 50);
        assert_eq!(set.consider_candidate(p).await, AdmissionOutcome::AlreadyFull);
    }
}
