//! Interface: per-neighbour send and receive lists of local indices.
//!
//! Built once from synced [`RemoteIndices`] and two attribute predicates,
//! immutable afterwards. Position `k` of our send list for rank `q` matches
//! position `k` of `q`'s receive list for us, because both sides filter the
//! same globally sorted correspondence with the same predicates.

use std::collections::BTreeMap;
use std::fmt;

use crate::algs::communicator::Communicator;
use crate::data::local_index::{Attribute, GlobalIndex};
use crate::overlap::predicate::Predicate;
use crate::overlap::remote_indices::RemoteIndices;
use crate::par_error::ParIndexError;

/// Ordered local indices exchanged with one neighbour in one direction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterfaceInformation {
    indices: Vec<usize>,
}

impl InterfaceInformation {
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[inline]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn iter(&self) -> std::iter::Copied<std::slice::Iter<'_, usize>> {
        self.indices.iter().copied()
    }
}

impl std::ops::Index<usize> for InterfaceInformation {
    type Output = usize;
    fn index(&self, k: usize) -> &usize {
        &self.indices[k]
    }
}

impl From<Vec<usize>> for InterfaceInformation {
    fn from(indices: Vec<usize>) -> Self {
        Self { indices }
    }
}

/// `rank -> (send, receive)`; neighbours with both lists empty are absent.
pub struct Interface<'a, C> {
    comm: &'a C,
    interfaces: BTreeMap<usize, (InterfaceInformation, InterfaceInformation)>,
}

impl<C> Clone for Interface<'_, C> {
    fn clone(&self) -> Self {
        Self {
            comm: self.comm,
            interfaces: self.interfaces.clone(),
        }
    }
}

impl<'a, C: Communicator> Interface<'a, C> {
    /// An entry is sent when our attribute is in `source` and the
    /// neighbour's is in `dest`; it is received when our attribute is in
    /// `dest` and the neighbour's is in `source`.
    ///
    /// # Errors
    /// `NotSynced` if `remote` was never rebuilt.
    pub fn build<G: GlobalIndex, A: Attribute>(
        remote: &RemoteIndices<'a, G, A, C>,
        source: &Predicate<A>,
        dest: &Predicate<A>,
    ) -> Result<Self, ParIndexError> {
        if !remote.is_synced() {
            return Err(ParIndexError::NotSynced);
        }
        let mut interfaces = BTreeMap::new();
        for (&rank, lists) in remote.iter() {
            let send: Vec<usize> = lists
                .send()
                .iter()
                .filter(|r| source.contains(r.local_attribute()) && dest.contains(r.attribute()))
                .map(|r| r.local())
                .collect();
            let receive: Vec<usize> = lists
                .receive()
                .iter()
                .filter(|r| dest.contains(r.local_attribute()) && source.contains(r.attribute()))
                .map(|r| r.local())
                .collect();
            if !(send.is_empty() && receive.is_empty()) {
                interfaces.insert(rank, (send.into(), receive.into()));
            }
        }

        let iface = Self {
            comm: remote.communicator(),
            interfaces,
        };
        log::debug!(
            "rank {}: interface with {} neighbours ({} send, {} receive entries)",
            iface.comm.rank(),
            iface.len(),
            iface.send_len(),
            iface.receive_len()
        );
        Ok(iface)
    }

    /// Log every list at debug level.
    pub fn print(&self) {
        for line in self.to_string().lines() {
            log::debug!("rank {}: {line}", self.comm.rank());
        }
    }
}

impl<'a, C> Interface<'a, C> {
    #[inline]
    pub fn communicator(&self) -> &'a C {
        self.comm
    }

    #[inline]
    pub fn interfaces(&self) -> &BTreeMap<usize, (InterfaceInformation, InterfaceInformation)> {
        &self.interfaces
    }

    pub fn get(&self, rank: usize) -> Option<&(InterfaceInformation, InterfaceInformation)> {
        self.interfaces.get(&rank)
    }

    /// Number of neighbours.
    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// Total entries over all send lists.
    pub fn send_len(&self) -> usize {
        self.interfaces.values().map(|(s, _)| s.len()).sum()
    }

    /// Total entries over all receive lists.
    pub fn receive_len(&self) -> usize {
        self.interfaces.values().map(|(_, r)| r.len()).sum()
    }
}

impl<C> PartialEq for Interface<'_, C> {
    fn eq(&self, other: &Self) -> bool {
        self.interfaces == other.interfaces
    }
}

impl<C> fmt::Debug for Interface<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.interfaces.iter()).finish()
    }
}

impl<C> fmt::Display for Interface<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (rank, (send, receive)) in &self.interfaces {
            writeln!(f, "{rank}: send {:?} receive {:?}", send.indices(), receive.indices())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::data::index_set::ParallelIndexSet;
    use crate::data::local_index::GridFlag;

    fn set(entries: &[(u64, GridFlag)]) -> ParallelIndexSet<u64, GridFlag> {
        let mut s = ParallelIndexSet::new();
        s.begin_resize().unwrap();
        for &(g, a) in entries {
            s.add(g, a, true).unwrap();
        }
        s.end_resize().unwrap();
        s
    }

    #[test]
    fn unsynced_remote_indices_are_rejected() {
        let s = set(&[(1, GridFlag::Owner)]);
        let comm = NoComm;
        let ri = RemoteIndices::new(&s, &s, &comm);
        let all = Predicate::All;
        assert!(matches!(
            Interface::build(&ri, &all, &all),
            Err(ParIndexError::NotSynced)
        ));
    }

    #[test]
    fn self_link_filters_by_both_attributes() {
        let src = set(&[(1, GridFlag::Owner), (2, GridFlag::Owner), (3, GridFlag::Border)]);
        let dst = set(&[(3, GridFlag::Owner), (2, GridFlag::Overlap), (1, GridFlag::Owner)]);
        let comm = NoComm;
        let mut ri = RemoteIndices::new(&src, &dst, &comm);
        ri.rebuild(true).unwrap();

        let owner = Predicate::member(GridFlag::Owner);
        let iface = Interface::build(&ri, &owner, &owner).unwrap();
        let (send, receive) = iface.get(0).unwrap();
        // global 1 is owner on both sides; 2 and 3 differ in one of them
        assert_eq!(send.indices(), &[src.get(1).unwrap().local().local()]);
        assert_eq!(receive.indices(), &[dst.get(1).unwrap().local().local()]);

        let none = Interface::build(&ri, &Predicate::Empty, &owner).unwrap();
        assert!(none.is_empty());
        assert_eq!(iface.to_string(), "0: send [0] receive [2]\n");
    }
}
