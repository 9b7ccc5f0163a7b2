//! ParallelIndexSet: per-process bijection between global ids and dense
//! local indices.
//!
//! Entries are registered inside a resize transaction:
//!
//! ```rust
//! # fn try_main() -> Result<(), parindex::par_error::ParIndexError> {
//! use parindex::data::index_set::ParallelIndexSet;
//! use parindex::data::local_index::GridFlag;
//! let mut set = ParallelIndexSet::<u64, GridFlag>::new();
//! set.begin_resize()?;
//! set.add(10, GridFlag::Owner, true)?;
//! set.add(3, GridFlag::Overlap, true)?;
//! set.end_resize()?;
//! assert_eq!(set.get(10)?.local().local(), 0);
//! assert_eq!(set.pair_by_local(1)?.global(), 3);
//! # Ok(())
//! # }
//! ```
//!
//! Outside a transaction the set is read-only and iterates in ascending
//! global order.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::data::local_index::{Attribute, GlobalIndex, IndexPair, ParallelLocalIndex};
use crate::debug_invariants::DebugInvariants;
use crate::par_error::ParIndexError;

/// Transaction state of a [`ParallelIndexSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexSetState {
    /// Read-only; lookups are valid.
    Ground,
    /// Inside `begin_resize` / `end_resize`.
    Resize,
    /// A transaction failed; the set must be discarded.
    Invalid,
}

/// Mapping `global -> ParallelLocalIndex`, sorted by global index.
///
/// # Invariants
///
/// After every successful [`end_resize`](Self::end_resize):
/// - entries are strictly ascending by global index (so each global appears once),
/// - local indices form the dense range `0..len`.
///
/// These are checked in debug builds and with the `check-invariants` feature,
/// and can be verified manually via
/// [`validate_invariants`](DebugInvariants::validate_invariants).
#[derive(Clone, Debug)]
pub struct ParallelIndexSet<G, A> {
    entries: Vec<IndexPair<G, A>>,
    /// local index -> position in `entries`
    by_local: Vec<usize>,
    pending: Vec<IndexPair<G, A>>,
    pending_globals: HashSet<G>,
    deleted: BTreeSet<G>,
    next_local: usize,
    state: IndexSetState,
    seq_no: u64,
}

impl<G, A> Default for ParallelIndexSet<G, A> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            by_local: Vec::new(),
            pending: Vec::new(),
            pending_globals: HashSet::new(),
            deleted: BTreeSet::new(),
            next_local: 0,
            state: IndexSetState::Ground,
            seq_no: 0,
        }
    }
}

impl<G: GlobalIndex, A: Attribute> ParallelIndexSet<G, A> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> IndexSetState {
        self.state
    }

    /// Incremented on every committed transaction and on renumbering.
    #[inline]
    pub fn seq_no(&self) -> u64 {
        self.seq_no
    }

    /// Number of committed entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fails unless the set is in the `Ground` state.
    pub fn ensure_ground(&self) -> Result<(), ParIndexError> {
        match self.state {
            IndexSetState::Ground => Ok(()),
            IndexSetState::Resize => Err(ParIndexError::ResizeInProgress),
            IndexSetState::Invalid => Err(ParIndexError::InvalidState),
        }
    }

    fn ensure_resizing(&self) -> Result<(), ParIndexError> {
        match self.state {
            IndexSetState::Resize => Ok(()),
            IndexSetState::Ground => Err(ParIndexError::NotResizing),
            IndexSetState::Invalid => Err(ParIndexError::InvalidState),
        }
    }

    fn position(&self, global: G) -> Option<usize> {
        self.entries.binary_search_by(|p| p.global().cmp(&global)).ok()
    }

    /// Open a resize transaction.
    pub fn begin_resize(&mut self) -> Result<(), ParIndexError> {
        self.ensure_ground()?;
        self.state = IndexSetState::Resize;
        self.next_local = self.entries.len();
        Ok(())
    }

    /// Register `global` with the next unused local index and return that index.
    ///
    /// # Errors
    /// `NotResizing` outside a transaction, `DuplicateGlobal` if `global` is
    /// already committed (and not marked deleted) or already pending.
    pub fn add(&mut self, global: G, attribute: A, public: bool) -> Result<usize, ParIndexError> {
        let local = self.next_local;
        self.add_pair(global, ParallelLocalIndex::new(local, attribute, public))?;
        Ok(local)
    }

    /// Register `global` with an explicit local record.
    ///
    /// Local indices are not checked here; density is validated by
    /// [`end_resize`](Self::end_resize).
    pub fn add_pair(&mut self, global: G, local: ParallelLocalIndex<A>) -> Result<(), ParIndexError> {
        self.ensure_resizing()?;
        let committed = self.position(global).is_some() && !self.deleted.contains(&global);
        if committed || self.pending_globals.contains(&global) {
            return Err(ParIndexError::DuplicateGlobal(format!("{global:?}")));
        }
        let after = local.local().checked_add(1).ok_or(ParIndexError::LocalOutOfRange {
            local: local.local(),
            len: usize::MAX,
        })?;
        self.pending_globals.insert(global);
        self.next_local = self.next_local.max(after);
        self.pending.push(IndexPair::new(global, local));
        Ok(())
    }

    /// Remove a committed entry when the transaction closes. The remaining
    /// entries keep their relative local order and are compacted.
    pub fn mark_as_deleted(&mut self, global: G) -> Result<(), ParIndexError> {
        self.ensure_resizing()?;
        if self.position(global).is_none() {
            return Err(ParIndexError::UnknownGlobal(format!("{global:?}")));
        }
        self.deleted.insert(global);
        Ok(())
    }

    /// Close the transaction: merge, sort, compact and validate.
    ///
    /// On failure the set moves to [`IndexSetState::Invalid`].
    pub fn end_resize(&mut self) -> Result<(), ParIndexError> {
        self.ensure_resizing()?;

        let deleted = std::mem::take(&mut self.deleted);
        let mut merged: Vec<IndexPair<G, A>> = std::mem::take(&mut self.entries)
            .into_iter()
            .filter(|p| !deleted.contains(&p.global()))
            .collect();
        // A re-added global replaces its deleted entry.
        merged.append(&mut self.pending);
        self.pending_globals.clear();
        merged.sort_by(|a, b| a.global().cmp(&b.global()));

        if !deleted.is_empty() {
            let mut order: Vec<usize> = (0..merged.len()).collect();
            order.sort_by_key(|&i| merged[i].local().local());
            for (new_local, i) in order.into_iter().enumerate() {
                merged[i].local_mut().set_local(new_local);
            }
        }

        match build_local_lookup(&merged) {
            Ok(by_local) => {
                self.entries = merged;
                self.by_local = by_local;
                self.state = IndexSetState::Ground;
                self.seq_no = self.seq_no.wrapping_add(1);
                crate::debug_invariants!(self.validate_invariants(), "ParallelIndexSet invalid");
                Ok(())
            }
            Err(e) => {
                self.entries = merged;
                self.by_local.clear();
                self.state = IndexSetState::Invalid;
                Err(e)
            }
        }
    }

    /// Look up the entry for `global`.
    pub fn get(&self, global: G) -> Result<&IndexPair<G, A>, ParIndexError> {
        self.ensure_ground()?;
        self.position(global)
            .map(|i| &self.entries[i])
            .ok_or_else(|| ParIndexError::UnknownGlobal(format!("{global:?}")))
    }

    /// Look up the entry whose local index is `local`.
    pub fn pair_by_local(&self, local: usize) -> Result<&IndexPair<G, A>, ParIndexError> {
        self.ensure_ground()?;
        self.by_local
            .get(local)
            .map(|&i| &self.entries[i])
            .ok_or(ParIndexError::LocalOutOfRange {
                local,
                len: self.entries.len(),
            })
    }

    /// Whether `global` is committed in the set.
    #[inline]
    pub fn contains(&self, global: G) -> bool {
        self.position(global).is_some()
    }

    /// Committed entries in ascending global order.
    pub fn iter(&self) -> std::slice::Iter<'_, IndexPair<G, A>> {
        self.entries.iter()
    }

    #[inline]
    pub fn as_slice(&self) -> &[IndexPair<G, A>] {
        &self.entries
    }

    /// Reassign local indices so they follow ascending global order.
    pub fn renumber_local(&mut self) -> Result<(), ParIndexError> {
        self.ensure_ground()?;
        for (i, p) in self.entries.iter_mut().enumerate() {
            p.local_mut().set_local(i);
        }
        self.by_local = (0..self.entries.len()).collect();
        self.seq_no = self.seq_no.wrapping_add(1);
        Ok(())
    }
}

/// `local -> position` table, or the first gap/duplicate in the locals.
fn build_local_lookup<G: Copy, A: Copy>(entries: &[IndexPair<G, A>]) -> Result<Vec<usize>, ParIndexError> {
    let mut by_local = vec![usize::MAX; entries.len()];
    for (pos, p) in entries.iter().enumerate() {
        let l = p.local().local();
        match by_local.get_mut(l) {
            Some(slot) if *slot == usize::MAX => *slot = pos,
            _ => {
                let expected = by_local.iter().position(|&s| s == usize::MAX).unwrap_or(l);
                return Err(ParIndexError::NonDenseLocal { expected, found: l });
            }
        }
    }
    Ok(by_local)
}

impl<G: GlobalIndex, A: Attribute> DebugInvariants for ParallelIndexSet<G, A> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "ParallelIndexSet invalid");
    }

    fn validate_invariants(&self) -> Result<(), ParIndexError> {
        if self.state != IndexSetState::Ground {
            return Ok(());
        }
        // 1) strictly ascending globals
        if let Some(w) = self.entries.windows(2).find(|w| w[0].global() >= w[1].global()) {
            return Err(ParIndexError::DuplicateGlobal(format!("{:?}", w[1].global())));
        }
        // 2) dense locals and a consistent reverse table
        if self.by_local.len() != self.entries.len() {
            return Err(ParIndexError::NonDenseLocal {
                expected: self.entries.len(),
                found: self.by_local.len(),
            });
        }
        for (l, &pos) in self.by_local.iter().enumerate() {
            let found = self.entries.get(pos).map(|p| p.local().local());
            if found != Some(l) {
                return Err(ParIndexError::NonDenseLocal {
                    expected: l,
                    found: found.unwrap_or(usize::MAX),
                });
            }
        }
        Ok(())
    }
}

impl<G: PartialEq, A: PartialEq> PartialEq for ParallelIndexSet<G, A> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<G: fmt::Debug, A: fmt::Debug> fmt::Display for ParallelIndexSet<G, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, p) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, "}}")
    }
}

impl<'a, G, A> IntoIterator for &'a ParallelIndexSet<G, A> {
    type Item = &'a IndexPair<G, A>;
    type IntoIter = std::slice::Iter<'a, IndexPair<G, A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
