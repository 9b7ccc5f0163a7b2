//! Overlap module: discovery of shared entities and the interfaces built
//! from them.
//!
//! [`remote_indices`] finds which entities each neighbour also holds,
//! [`interface`] filters those by attribute [`predicate`]s into send and
//! receive lists, and [`delta`] defines how values are merged on arrival.

pub mod delta;
pub mod interface;
pub mod predicate;
pub mod remote_indices;

pub use delta::{AddGatherScatter, CopyGatherScatter, GatherScatter};
pub use interface::{Interface, InterfaceInformation};
pub use predicate::Predicate;
pub use remote_indices::{RemoteIndex, RemoteIndexLists, RemoteIndices};
