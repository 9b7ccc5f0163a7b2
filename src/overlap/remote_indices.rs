//! RemoteIndices: which of our entities are known to which other rank.
//!
//! Every rank advertises the public `(global, attribute)` pairs of its source
//! set (and of its target set, when that is a different set). Each received
//! advertisement is intersected with the local sets by a merge-join over
//! ascending global indices, so position `k` of our list for rank `q` and
//! position `k` of `q`'s list for us always name the same global entity.
//!
//! Without a candidate neighbour list the advertisements travel around a ring
//! of `P-1` steps: in step `s` a rank forwards what it received in step
//! `s-1` to `rank+1` and receives from `rank-1`. Every rank sees every other
//! rank's advertisement after `P-1` steps, at O(P) latency and O(P·n) volume
//! per rank. With a candidate list a single direct exchange is used instead.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use itertools::{EitherOrBoth, Itertools};

use crate::algs::communicator::{CommTag, Communicator, ExchangeTags};
use crate::algs::exchange::exchange_with_sizes;
use crate::algs::wire::{
    WIRE_VERSION, WireAttribute, WireGlobal, WireIndexHdr, WireIndexPair, cast_slice, expect_exact_len,
    pod_vec_from,
};
use crate::config::CommConfig;
use crate::data::index_set::ParallelIndexSet;
use crate::data::local_index::{Attribute, GlobalIndex, IndexPair};
use crate::par_error::ParIndexError;

/// One shared entity: the attribute the neighbour gives it, plus our own
/// record of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoteIndex<G, A> {
    attribute: A,
    pair: IndexPair<G, A>,
}

impl<G: Copy, A: Copy> RemoteIndex<G, A> {
    pub fn new(attribute: A, pair: IndexPair<G, A>) -> Self {
        Self { attribute, pair }
    }

    /// Attribute of the entity on the remote rank.
    #[inline]
    pub fn attribute(&self) -> A {
        self.attribute
    }

    /// Our own entry for the entity.
    #[inline]
    pub fn local_pair(&self) -> &IndexPair<G, A> {
        &self.pair
    }

    #[inline]
    pub fn global(&self) -> G {
        self.pair.global()
    }

    /// Our local index of the entity.
    #[inline]
    pub fn local(&self) -> usize {
        self.pair.local().local()
    }

    /// Our attribute of the entity.
    #[inline]
    pub fn local_attribute(&self) -> A {
        self.pair.local().attribute()
    }
}

/// Correspondences with one neighbour.
///
/// `send` holds source-set entries the neighbour has in its target set;
/// `receive` holds target-set entries the neighbour has in its source set.
/// Both are sorted by global index. With a single index set they are equal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteIndexLists<G, A> {
    send: Vec<RemoteIndex<G, A>>,
    receive: Vec<RemoteIndex<G, A>>,
}

impl<G, A> RemoteIndexLists<G, A> {
    #[inline]
    pub fn send(&self) -> &[RemoteIndex<G, A>] {
        &self.send
    }

    #[inline]
    pub fn receive(&self) -> &[RemoteIndex<G, A>] {
        &self.receive
    }

    pub fn is_empty(&self) -> bool {
        self.send.is_empty() && self.receive.is_empty()
    }
}

/// A decoded advertisement.
struct Advert<G, A> {
    origin: usize,
    two_sets: bool,
    source: Vec<(G, A)>,
    target: Vec<(G, A)>,
}

/// Remote correspondences of a `(source, target)` pair of index sets.
///
/// The index sets and the communicator are borrowed for the lifetime of this
/// value, so neither set can be resized while its remote indices exist.
pub struct RemoteIndices<'a, G, A, C> {
    source: &'a ParallelIndexSet<G, A>,
    target: &'a ParallelIndexSet<G, A>,
    comm: &'a C,
    neighbours: Option<BTreeSet<usize>>,
    ignore_public: bool,
    tags: ExchangeTags,
    remote: BTreeMap<usize, RemoteIndexLists<G, A>>,
    /// `(source, target)` sequence numbers at the last rebuild.
    synced_at: Option<(u64, u64)>,
}

impl<'a, G, A, C> RemoteIndices<'a, G, A, C>
where
    G: GlobalIndex,
    A: Attribute,
    C: Communicator,
{
    /// Pass the same set twice for overlap discovery, or two different sets
    /// for redistribution.
    pub fn new(source: &'a ParallelIndexSet<G, A>, target: &'a ParallelIndexSet<G, A>, comm: &'a C) -> Self {
        Self {
            source,
            target,
            comm,
            neighbours: None,
            ignore_public: false,
            tags: ExchangeTags::from_base(CommTag::new(CommConfig::default().base_tag)),
            remote: BTreeMap::new(),
            synced_at: None,
        }
    }

    /// Restrict the exchange to these ranks. The list must be symmetric:
    /// if `p` lists `q` then `q` lists `p`.
    pub fn with_neighbours(mut self, ranks: impl IntoIterator<Item = usize>) -> Self {
        self.neighbours = Some(ranks.into_iter().collect());
        self
    }

    /// Advertise private entries too.
    pub fn with_ignore_public(mut self, ignore: bool) -> Self {
        self.ignore_public = ignore;
        self
    }

    pub fn with_tags(mut self, base: CommTag) -> Self {
        self.tags = ExchangeTags::from_base(base);
        self
    }

    #[inline]
    pub fn source(&self) -> &'a ParallelIndexSet<G, A> {
        self.source
    }

    #[inline]
    pub fn target(&self) -> &'a ParallelIndexSet<G, A> {
        self.target
    }

    #[inline]
    pub fn communicator(&self) -> &'a C {
        self.comm
    }

    fn same_sets(&self) -> bool {
        std::ptr::eq(self.source, self.target)
    }

    /// Whether the map reflects the current state of both index sets.
    pub fn is_synced(&self) -> bool {
        self.synced_at == Some((self.source.seq_no(), self.target.seq_no()))
    }

    /// Rediscover the remote correspondences. Collective: every rank of the
    /// communicator must call it.
    ///
    /// With `include_self` and two distinct sets, the local rank is paired
    /// with itself (entities moving from our source to our own target).
    pub fn rebuild(&mut self, include_self: bool) -> Result<(), ParIndexError> {
        self.source.ensure_ground()?;
        self.target.ensure_ground()?;
        let me = self.comm.rank();
        let size = self.comm.size();
        if let Some(n) = &self.neighbours {
            if let Some(&rank) = n.iter().find(|&&r| r >= size) {
                return Err(ParIndexError::RankOutOfRange { rank, size });
            }
        }

        let own = self.pack()?;
        let adverts = match &self.neighbours {
            Some(n) => {
                log::debug!("rank {me}: rebuilding remote indices with {} candidate neighbours", n.len());
                self.exchange_direct(&own, n)?
            }
            None => {
                log::debug!("rank {me}: rebuilding remote indices in a ring of {size}");
                self.exchange_ring(own.clone())?
            }
        };

        let mut remote = BTreeMap::new();
        if include_self && !self.same_sets() {
            let adv = self.decode(me, &own)?;
            let lists = self.intersect(&adv);
            if !lists.is_empty() {
                remote.insert(me, lists);
            }
        }
        for adv in &adverts {
            let lists = self.intersect(adv);
            if !lists.is_empty() {
                remote.insert(adv.origin, lists);
            }
        }

        log::debug!("rank {me}: {} remote neighbours", remote.len());
        self.remote = remote;
        self.synced_at = Some((self.source.seq_no(), self.target.seq_no()));
        Ok(())
    }

    fn published<'s>(&self, set: &'s ParallelIndexSet<G, A>) -> Vec<&'s IndexPair<G, A>> {
        set.iter()
            .filter(|p| self.ignore_public || p.local().is_public())
            .collect()
    }

    fn pack(&self) -> Result<Vec<u8>, ParIndexError> {
        let two_sets = !self.same_sets();
        let src = self.published(self.source);
        let tgt = if two_sets { self.published(self.target) } else { Vec::new() };
        let hdr = WireIndexHdr::new(two_sets, self.comm.size(), self.comm.rank(), src.len(), tgt.len())?;
        let pairs: Vec<WireIndexPair> = src
            .iter()
            .chain(tgt.iter())
            .map(|p| WireIndexPair::new(p.global().to_wire(), p.local().attribute().to_wire()))
            .collect();
        let mut out = Vec::with_capacity(size_of::<WireIndexHdr>() + pairs.len() * WireIndexPair::SIZE);
        out.extend_from_slice(cast_slice(std::slice::from_ref(&hdr)));
        out.extend_from_slice(cast_slice(&pairs));
        Ok(out)
    }

    fn decode(&self, neighbor: usize, bytes: &[u8]) -> Result<Advert<G, A>, ParIndexError> {
        let hdr_len = size_of::<WireIndexHdr>();
        if bytes.len() < hdr_len {
            return Err(ParIndexError::ProtocolMismatch {
                neighbor,
                reason: format!("advertisement of {} bytes has no header", bytes.len()),
            });
        }
        let hdr: WireIndexHdr = bytemuck::pod_read_unaligned(&bytes[..hdr_len]);
        if hdr.version() != WIRE_VERSION {
            return Err(ParIndexError::WireVersion {
                expected: WIRE_VERSION,
                found: hdr.version(),
            });
        }
        if hdr.procs() != self.comm.size() {
            return Err(ParIndexError::ProtocolMismatch {
                neighbor,
                reason: format!(
                    "sender sees {} processes, this rank sees {}",
                    hdr.procs(),
                    self.comm.size()
                ),
            });
        }
        expect_exact_len(
            neighbor,
            bytes.len(),
            hdr_len + (hdr.n_source() + hdr.n_target()) * WireIndexPair::SIZE,
        )?;

        let decode_pair = |w: &WireIndexPair| -> Result<(G, A), ParIndexError> {
            let a = A::from_wire(w.attribute()).ok_or_else(|| ParIndexError::ProtocolMismatch {
                neighbor,
                reason: format!("unknown attribute code {}", w.attribute()),
            })?;
            Ok((G::from_wire(w.global()), a))
        };
        let raw: Vec<WireIndexPair> = pod_vec_from(&bytes[hdr_len..]);
        let (src, tgt) = raw.split_at(hdr.n_source());
        Ok(Advert {
            origin: hdr.origin(),
            two_sets: hdr.two_sets(),
            source: src.iter().map(decode_pair).collect::<Result<_, _>>()?,
            target: tgt.iter().map(decode_pair).collect::<Result<_, _>>()?,
        })
    }

    fn exchange_direct(&self, own: &[u8], neighbours: &BTreeSet<usize>) -> Result<Vec<Advert<G, A>>, ParIndexError> {
        let me = self.comm.rank();
        let peers: BTreeSet<usize> = neighbours.iter().copied().filter(|&r| r != me).collect();
        let outgoing: BTreeMap<usize, Vec<u8>> = peers.iter().map(|&p| (p, own.to_vec())).collect();
        let received = exchange_with_sizes(self.comm, self.tags, &outgoing, &peers)?;

        let mut adverts = Vec::with_capacity(received.len());
        for (peer, bytes) in received {
            let adv = self.decode(peer, &bytes).map_err(|e| self.protocol_error(e))?;
            self.check_origin(peer, adv.origin, peer)?;
            adverts.push(adv);
        }
        Ok(adverts)
    }

    fn exchange_ring(&self, own: Vec<u8>) -> Result<Vec<Advert<G, A>>, ParIndexError> {
        let me = self.comm.rank();
        let size = self.comm.size();
        let next = (me + 1) % size;
        let prev = (me + size - 1) % size;

        let mut adverts = Vec::with_capacity(size.saturating_sub(1));
        let mut current = own;
        for step in 1..size {
            let outgoing = BTreeMap::from([(next, current)]);
            let mut received = exchange_with_sizes(self.comm, self.tags, &outgoing, &BTreeSet::from([prev]))?;
            let bytes = received.remove(&prev).unwrap_or_default();
            let adv = self.decode(prev, &bytes).map_err(|e| self.protocol_error(e))?;
            self.check_origin(prev, adv.origin, (me + size - step) % size)?;
            adverts.push(adv);
            current = bytes;
        }
        Ok(adverts)
    }

    fn check_origin(&self, neighbor: usize, found: usize, expected: usize) -> Result<(), ParIndexError> {
        if found == expected {
            return Ok(());
        }
        Err(self.protocol_error(ParIndexError::ProtocolMismatch {
            neighbor,
            reason: format!("advertisement packed by rank {found}, expected rank {expected}"),
        }))
    }

    fn protocol_error(&self, err: ParIndexError) -> ParIndexError {
        log::warn!("rank {}: {err}", self.comm.rank());
        self.comm.on_protocol_error(&err);
        err
    }

    fn intersect(&self, adv: &Advert<G, A>) -> RemoteIndexLists<G, A> {
        let src = self.published(self.source);
        let tgt = self.published(self.target);
        let receive = merge_join(&adv.source, &tgt);
        let send = if adv.two_sets {
            merge_join(&adv.target, &src)
        } else {
            merge_join(&adv.source, &src)
        };
        RemoteIndexLists { send, receive }
    }

    /// Lists for one neighbour, if it shares anything with us.
    pub fn get(&self, rank: usize) -> Option<&RemoteIndexLists<G, A>> {
        self.remote.get(&rank)
    }

    /// Neighbours in ascending rank order.
    pub fn iter(&self) -> std::collections::btree_map::Iter<'_, usize, RemoteIndexLists<G, A>> {
        self.remote.iter()
    }

    pub fn neighbours(&self) -> impl Iterator<Item = usize> + '_ {
        self.remote.keys().copied()
    }

    /// Number of neighbours.
    pub fn len(&self) -> usize {
        self.remote.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remote.is_empty()
    }
}

/// Pair every remote `(global, attribute)` with the local entry of the same
/// global. Both inputs are sorted by global index.
fn merge_join<G: GlobalIndex, A: Attribute>(
    remote: &[(G, A)],
    local: &[&IndexPair<G, A>],
) -> Vec<RemoteIndex<G, A>> {
    remote
        .iter()
        .merge_join_by(local, |(g, _), l| g.cmp(&l.global()))
        .filter_map(|e| match e {
            EitherOrBoth::Both(&(_, a), l) => Some(RemoteIndex::new(a, **l)),
            _ => None,
        })
        .collect()
}

impl<G: PartialEq, A: PartialEq, C> PartialEq for RemoteIndices<'_, G, A, C> {
    fn eq(&self, other: &Self) -> bool {
        self.remote == other.remote
    }
}

impl<G: fmt::Debug, A: fmt::Debug, C> fmt::Display for RemoteIndices<'_, G, A, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (rank, lists) in &self.remote {
            write!(f, "process {rank}: send [")?;
            for (k, r) in lists.send.iter().enumerate() {
                if k > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}@{}", r.attribute, r.pair)?;
            }
            write!(f, "] receive [")?;
            for (k, r) in lists.receive.iter().enumerate() {
                if k > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}@{}", r.attribute, r.pair)?;
            }
            writeln!(f, "]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{LocalComm, NoComm};
    use crate::data::local_index::GridFlag;

    fn set(entries: &[(u64, GridFlag, bool)]) -> ParallelIndexSet<u64, GridFlag> {
        let mut s = ParallelIndexSet::new();
        s.begin_resize().unwrap();
        for &(g, a, p) in entries {
            s.add(g, a, p).unwrap();
        }
        s.end_resize().unwrap();
        s
    }

    #[test]
    fn merge_join_pairs_common_globals() {
        let s = set(&[(1, GridFlag::Owner, true), (3, GridFlag::Owner, true), (5, GridFlag::Border, true)]);
        let local: Vec<_> = s.iter().collect();
        let remote = [(0u64, GridFlag::Owner), (3, GridFlag::Overlap), (5, GridFlag::Owner), (9, GridFlag::Owner)];
        let out = merge_join(&remote, &local);
        let got: Vec<(u64, GridFlag, GridFlag)> =
            out.iter().map(|r| (r.global(), r.local_attribute(), r.attribute())).collect();
        assert_eq!(
            got,
            vec![(3, GridFlag::Owner, GridFlag::Overlap), (5, GridFlag::Border, GridFlag::Owner)]
        );
    }

    #[test]
    fn single_rank_has_no_neighbours() {
        let s = set(&[(1, GridFlag::Owner, true)]);
        let comm = NoComm;
        let mut ri = RemoteIndices::new(&s, &s, &comm);
        assert!(!ri.is_synced());
        ri.rebuild(true).unwrap();
        assert!(ri.is_synced());
        assert!(ri.is_empty());
    }

    #[test]
    fn include_self_pairs_two_local_sets() {
        let src = set(&[(1, GridFlag::Owner, true), (2, GridFlag::Owner, true)]);
        let dst = set(&[(2, GridFlag::Owner, true), (3, GridFlag::Owner, true)]);
        let comm = NoComm;
        let mut ri = RemoteIndices::new(&src, &dst, &comm);
        ri.rebuild(false).unwrap();
        assert!(ri.get(0).is_none());
        ri.rebuild(true).unwrap();
        let lists = ri.get(0).unwrap();
        assert_eq!(lists.send().len(), 1);
        assert_eq!(lists.receive().len(), 1);
        assert_eq!(lists.send()[0].global(), 2);
        assert_eq!(lists.send()[0].local(), src.get(2).unwrap().local().local());
        assert_eq!(lists.receive()[0].local(), dst.get(2).unwrap().local().local());
    }

    #[test]
    fn private_entries_are_not_advertised() {
        let world = LocalComm::world(2);
        let sets = [
            set(&[(1, GridFlag::Owner, true), (2, GridFlag::Owner, false)]),
            set(&[(1, GridFlag::Overlap, true), (2, GridFlag::Overlap, true)]),
        ];
        std::thread::scope(|s| {
            for (comm, is) in world.iter().zip(&sets) {
                s.spawn(move || {
                    let mut ri = RemoteIndices::new(is, is, comm);
                    ri.rebuild(false).unwrap();
                    let other = 1 - comm.rank();
                    assert_eq!(ri.get(other).unwrap().send().len(), 1);

                    let mut all = RemoteIndices::new(is, is, comm).with_ignore_public(true);
                    all.rebuild(false).unwrap();
                    assert_eq!(all.get(other).unwrap().send().len(), 2);
                });
            }
        });
    }

    #[test]
    fn candidate_rank_out_of_range() {
        let s = set(&[(1, GridFlag::Owner, true)]);
        let comm = NoComm;
        let mut ri = RemoteIndices::new(&s, &s, &comm).with_neighbours([3]);
        assert!(matches!(
            ri.rebuild(false),
            Err(ParIndexError::RankOutOfRange { rank: 3, size: 1 })
        ));
    }

    #[test]
    fn truncated_advertisement_is_a_protocol_error() {
        let s = set(&[(1, GridFlag::Owner, true)]);
        let comm = NoComm;
        let ri = RemoteIndices::new(&s, &s, &comm);
        let mut bytes = ri.pack().unwrap();
        bytes.pop();
        assert!(matches!(
            ri.decode(0, &bytes),
            Err(ParIndexError::ProtocolMismatch { neighbor: 0, .. })
        ));
    }

    fn advertisement(procs: usize, origin: usize, pairs: &[(u64, u32)]) -> Vec<u8> {
        let hdr = WireIndexHdr::new(false, procs, origin, pairs.len(), 0).unwrap();
        let wire: Vec<WireIndexPair> = pairs.iter().map(|&(g, a)| WireIndexPair::new(g, a)).collect();
        let mut bytes = cast_slice(std::slice::from_ref(&hdr)).to_vec();
        bytes.extend_from_slice(cast_slice(&wire));
        bytes
    }

    #[test]
    fn hand_built_advertisement_decodes() {
        let s = set(&[(1, GridFlag::Owner, true)]);
        let comm = NoComm;
        let ri = RemoteIndices::new(&s, &s, &comm);
        let adv = ri.decode(0, &advertisement(1, 0, &[(1, 1), (4, 2)])).unwrap();
        assert_eq!(adv.source, vec![(1, GridFlag::Overlap), (4, GridFlag::Border)]);
        assert!(adv.target.is_empty());
        assert!(!adv.two_sets);
    }

    #[test]
    fn process_count_disagreement_is_a_protocol_error() {
        let s = set(&[(1, GridFlag::Owner, true)]);
        let comm = NoComm;
        let ri = RemoteIndices::new(&s, &s, &comm);
        match ri.decode(0, &advertisement(4, 0, &[(1, 0)])) {
            Err(ParIndexError::ProtocolMismatch { neighbor: 0, reason }) => {
                assert!(reason.contains("4 processes"), "{reason}");
            }
            other => panic!("expected ProtocolMismatch, got {:?}", other.map(|a| a.origin)),
        }
    }

    #[test]
    fn unknown_attribute_code_is_a_protocol_error() {
        let s = set(&[(1, GridFlag::Owner, true)]);
        let comm = NoComm;
        let ri = RemoteIndices::new(&s, &s, &comm);
        match ri.decode(0, &advertisement(1, 0, &[(1, 0), (2, 9)])) {
            Err(ParIndexError::ProtocolMismatch { neighbor: 0, reason }) => {
                assert!(reason.contains("unknown attribute code 9"), "{reason}");
            }
            other => panic!("expected ProtocolMismatch, got {:?}", other.map(|a| a.origin)),
        }
    }

    #[test]
    fn wrong_wire_version_is_rejected() {
        let s = set(&[(1, GridFlag::Owner, true)]);
        let comm = NoComm;
        let ri = RemoteIndices::new(&s, &s, &comm);
        let mut bytes = advertisement(1, 0, &[]);
        bytes[..2].copy_from_slice(&(WIRE_VERSION + 1).to_le_bytes());
        assert!(matches!(
            ri.decode(0, &bytes),
            Err(ParIndexError::WireVersion { found, .. }) if found == WIRE_VERSION + 1
        ));
    }

    #[test]
    fn origin_must_match_the_expected_sender() {
        let s = set(&[(1, GridFlag::Owner, true)]);
        let comm = NoComm;
        let ri = RemoteIndices::new(&s, &s, &comm);
        assert!(ri.check_origin(1, 1, 1).is_ok());
        match ri.check_origin(1, 2, 1) {
            Err(ParIndexError::ProtocolMismatch { neighbor: 1, reason }) => {
                assert!(reason.contains("packed by rank 2"), "{reason}");
            }
            other => panic!("expected ProtocolMismatch, got {other:?}"),
        }
    }
}
