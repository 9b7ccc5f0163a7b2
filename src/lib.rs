#![cfg_attr(docsrs, feature(doc_cfg))]
//! # parindex
//!
//! parindex is the parallel index layer of a distributed PDE code: it keeps
//! track of which process holds which entity under which role, and moves
//! per-entity data between processes along that correspondence.
//!
//! ## Features
//! - [`ParallelIndexSet`](data::index_set::ParallelIndexSet): per-process
//!   bijection between global ids and dense local indices, with attributes
//!   and public/private visibility
//! - [`RemoteIndices`](overlap::remote_indices::RemoteIndices): distributed
//!   discovery of shared entities, either around a ring or with a candidate
//!   neighbour list
//! - [`Interface`](overlap::interface::Interface): per-neighbour send and
//!   receive lists filtered by attribute predicates
//! - [`DatatypeCommunicator`](algs::datatype::DatatypeCommunicator) and
//!   [`BufferedCommunicator`](algs::buffered::BufferedCommunicator) for
//!   ghost refresh, accumulation and redistribution
//! - Pluggable transports: serial, in-process threads, and MPI
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! parindex = "0.3"
//! # features = ["mpi-support"]
//! ```
//!
//! A typical overlap exchange:
//!
//! ```rust
//! # fn try_main() -> Result<(), parindex::par_error::ParIndexError> {
//! use parindex::prelude::*;
//!
//! let mut set = ParallelIndexSet::<u64, GridFlag>::new();
//! set.begin_resize()?;
//! set.add(0, GridFlag::Owner, true)?;
//! set.end_resize()?;
//!
//! let comm = NoComm;
//! let mut remote = RemoteIndices::new(&set, &set, &comm);
//! remote.rebuild(false)?;
//!
//! let owner = Predicate::member(GridFlag::Owner);
//! let overlap = Predicate::member(GridFlag::Overlap);
//! let interface = Interface::build(&remote, &owner, &overlap)?;
//! let mut bc = BufferedCommunicator::build::<f64>(&interface);
//! let mut values = vec![1.0f64];
//! bc.forward_in_place::<CopyGatherScatter, _>(&mut values)?;
//! # Ok(())
//! # }
//! # try_main().unwrap();
//! ```
//!
//! Every fallible call returns [`ParIndexError`](par_error::ParIndexError).
//! Logging goes through the `log` facade; no logger is installed here.

pub mod algs;
pub mod config;
pub mod data;
pub mod debug_invariants;
pub mod overlap;
pub mod par_error;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::InterfaceCommunicator;
    pub use crate::algs::buffered::BufferedCommunicator;
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{CommTag, Communicator, LocalComm, NoComm};
    pub use crate::algs::datatype::DatatypeCommunicator;
    pub use crate::config::{CommConfig, ErrorPolicy};
    pub use crate::data::index_set::ParallelIndexSet;
    pub use crate::data::local_index::{GridFlag, ParallelLocalIndex};
    pub use crate::overlap::delta::{AddGatherScatter, CopyGatherScatter, GatherScatter};
    pub use crate::overlap::interface::Interface;
    pub use crate::overlap::predicate::Predicate;
    pub use crate::overlap::remote_indices::RemoteIndices;
    pub use crate::par_error::ParIndexError;
}
