//! Local index records: what one process knows about one entity.
//!
//! A [`ParallelLocalIndex`] is the process-local half of the correspondence
//! kept by a [`ParallelIndexSet`](crate::data::index_set::ParallelIndexSet):
//! a dense local position, the attribute naming the role this process plays
//! for the entity, and whether the entity may be advertised to other ranks.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::algs::wire::{WireAttribute, WireGlobal};

/// Stable, application-chosen identifier of a logical entity.
pub trait GlobalIndex: Copy + Ord + Hash + fmt::Debug + WireGlobal {}
impl<T: Copy + Ord + Hash + fmt::Debug + WireGlobal> GlobalIndex for T {}

/// Application-defined role tag.
pub trait Attribute: Copy + Ord + Hash + fmt::Debug + WireAttribute {}
impl<T: Copy + Ord + Hash + fmt::Debug + WireAttribute> Attribute for T {}

/// Stock attribute set for overlapping grid partitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridFlag {
    /// This process owns the entity.
    Owner,
    /// Ghost copy of an entity owned elsewhere.
    Overlap,
    /// Entity on the partition boundary, shared but not owned.
    Border,
}

impl WireAttribute for GridFlag {
    #[inline]
    fn to_wire(self) -> u32 {
        match self {
            GridFlag::Owner => 0,
            GridFlag::Overlap => 1,
            GridFlag::Border => 2,
        }
    }

    #[inline]
    fn from_wire(w: u32) -> Option<Self> {
        match w {
            0 => Some(GridFlag::Owner),
            1 => Some(GridFlag::Overlap),
            2 => Some(GridFlag::Border),
            _ => None,
        }
    }
}

impl fmt::Display for GridFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GridFlag::Owner => "owner",
            GridFlag::Overlap => "overlap",
            GridFlag::Border => "border",
        };
        f.write_str(s)
    }
}

/// Local position, attribute and visibility of one entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParallelLocalIndex<A> {
    local: usize,
    attribute: A,
    public: bool,
}

impl<A: Copy> ParallelLocalIndex<A> {
    pub fn new(local: usize, attribute: A, public: bool) -> Self {
        Self {
            local,
            attribute,
            public,
        }
    }

    #[inline]
    pub fn local(&self) -> usize {
        self.local
    }

    #[inline]
    pub fn attribute(&self) -> A {
        self.attribute
    }

    /// Whether this entry may be advertised to other processes.
    #[inline]
    pub fn is_public(&self) -> bool {
        self.public
    }

    pub(crate) fn set_local(&mut self, local: usize) {
        self.local = local;
    }
}

/// A global index together with its local record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexPair<G, A> {
    global: G,
    local: ParallelLocalIndex<A>,
}

impl<G: Copy, A: Copy> IndexPair<G, A> {
    pub fn new(global: G, local: ParallelLocalIndex<A>) -> Self {
        Self { global, local }
    }

    #[inline]
    pub fn global(&self) -> G {
        self.global
    }

    #[inline]
    pub fn local(&self) -> &ParallelLocalIndex<A> {
        &self.local
    }

    pub(crate) fn local_mut(&mut self) -> &mut ParallelLocalIndex<A> {
        &mut self.local
    }
}

impl<G: fmt::Debug, A: fmt::Debug> fmt::Display for IndexPair<G, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{global={:?}, local={}, attribute={:?}, public={}}}",
            self.global, self.local.local, self.local.attribute, self.local.public
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_flag_wire_codes_roundtrip() {
        for f in [GridFlag::Owner, GridFlag::Overlap, GridFlag::Border] {
            assert_eq!(GridFlag::from_wire(f.to_wire()), Some(f));
        }
        assert_eq!(GridFlag::from_wire(7), None);
    }

    #[test]
    fn pair_accessors_and_display() {
        let p = IndexPair::new(42u64, ParallelLocalIndex::new(3, GridFlag::Overlap, true));
        assert_eq!(p.global(), 42);
        assert_eq!(p.local().local(), 3);
        assert_eq!(p.local().attribute(), GridFlag::Overlap);
        assert!(p.local().is_public());
        assert_eq!(p.to_string(), "{global=42, local=3, attribute=Overlap, public=true}");
    }
}
