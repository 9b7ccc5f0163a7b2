//! Data module: local index records and the parallel index set.

pub mod index_set;
pub mod local_index;

pub use crate::debug_invariants::DebugInvariants;

pub use index_set::{IndexSetState, ParallelIndexSet};
pub use local_index::{Attribute, GlobalIndex, GridFlag, IndexPair, ParallelLocalIndex};
