//! Transport, wire format and the interface communicators.

pub mod buffered;
pub mod communicator;
pub mod datatype;
pub mod exchange;
pub mod wire;

pub use buffered::BufferedCommunicator;
pub use datatype::{DatatypeCommunicator, IndexedType};

use crate::par_error::ParIndexError;

/// Data movement along a built interface, shared by both communicator
/// variants. Values are copied; use
/// [`BufferedCommunicator`] directly for other gather/scatter policies.
///
/// All four calls are collective over the interface's neighbours.
pub trait InterfaceCommunicator<Cont: ?Sized> {
    /// Values at the send positions of `source` land at the matching receive
    /// positions of the neighbours' `dest`.
    fn forward(&mut self, source: &Cont, dest: &mut Cont) -> Result<(), ParIndexError>;
    /// Values at the receive positions of `dest` land at the matching send
    /// positions of the neighbours' `source`.
    fn backward(&mut self, source: &mut Cont, dest: &Cont) -> Result<(), ParIndexError>;
    fn forward_in_place(&mut self, data: &mut Cont) -> Result<(), ParIndexError>;
    fn backward_in_place(&mut self, data: &mut Cont) -> Result<(), ParIndexError>;
}
