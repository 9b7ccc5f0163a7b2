//! BufferedCommunicator: pack, exchange and unpack along an interface with a
//! caller-supplied [`GatherScatter`] policy.
//!
//! The element size is fixed at build time, and one send buffer per
//! neighbour is allocated then and reused by every call. A self link
//! (`rank == me`, from `rebuild(true)` over two sets) is copied locally
//! without a message.
//!
//! Indices may carry a variable number of values ([`GatherScatter::size`]).
//! Each side computes the byte count of a link from its own container, so a
//! disagreement on any shared entity surfaces as a protocol mismatch.

use std::collections::BTreeMap;
use std::mem::size_of;

use bytemuck::Pod;

use crate::algs::InterfaceCommunicator;
use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::exchange_bytes;
use crate::algs::wire::pod_vec_from;
use crate::config::CommConfig;
use crate::data::local_index::{Attribute, GlobalIndex};
use crate::overlap::delta::{CopyGatherScatter, GatherScatter};
use crate::overlap::interface::{Interface, InterfaceInformation};
use crate::overlap::predicate::Predicate;
use crate::overlap::remote_indices::RemoteIndices;
use crate::par_error::ParIndexError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

pub struct BufferedCommunicator<'a, C> {
    interface: Interface<'a, C>,
    elem_size: usize,
    send_buffers: BTreeMap<usize, Vec<u8>>,
    tag: CommTag,
}

impl<'a, C: Communicator> BufferedCommunicator<'a, C> {
    /// Prepare buffers for one value of type `V` per index along `interface`.
    pub fn build<V: Pod>(interface: &Interface<'a, C>) -> Self {
        Self::with_capacities(interface, size_of::<V>(), |send, receive| send.len().max(receive.len()))
    }

    /// Prepare buffers sized for the per-index value counts `P` reports on
    /// `source` (send side) and `dest` (receive side).
    pub fn build_for<P, Cont>(interface: &Interface<'a, C>, source: &Cont, dest: &Cont) -> Result<Self, ParIndexError>
    where
        P: GatherScatter<Cont>,
        Cont: ?Sized,
    {
        for (send, receive) in interface.interfaces().values() {
            check_indices(send, P::len(source))?;
            check_indices(receive, P::len(dest))?;
        }
        Ok(Self::with_capacities(interface, size_of::<P::Value>(), |send, receive| {
            values_at::<P, Cont>(source, send).max(values_at::<P, Cont>(dest, receive))
        }))
    }

    fn with_capacities(
        interface: &Interface<'a, C>,
        elem_size: usize,
        values: impl Fn(&InterfaceInformation, &InterfaceInformation) -> usize,
    ) -> Self {
        let send_buffers = interface
            .interfaces()
            .iter()
            .map(|(&rank, (send, receive))| (rank, Vec::with_capacity(values(send, receive) * elem_size)))
            .collect();
        log::debug!(
            "rank {}: buffered communicator over {} neighbours, {elem_size}-byte values",
            interface.communicator().rank(),
            interface.len()
        );
        Self {
            interface: interface.clone(),
            elem_size,
            send_buffers,
            tag: CommTag::new(CommConfig::default().base_tag).offset(3),
        }
    }

    /// Build the interface from `remote` and the predicates first.
    pub fn from_remote<V: Pod, G: GlobalIndex, A: Attribute>(
        remote: &RemoteIndices<'a, G, A, C>,
        source: &Predicate<A>,
        dest: &Predicate<A>,
    ) -> Result<Self, ParIndexError> {
        Ok(Self::build::<V>(&Interface::build(remote, source, dest)?))
    }

    pub fn with_tag(mut self, tag: CommTag) -> Self {
        self.tag = tag;
        self
    }

    #[inline]
    pub fn interface(&self) -> &Interface<'a, C> {
        &self.interface
    }

    #[inline]
    pub fn elem_size(&self) -> usize {
        self.elem_size
    }

    /// Lists used for sending and receiving in `dir`.
    fn lists(
        (send, receive): &(InterfaceInformation, InterfaceInformation),
        dir: Direction,
    ) -> (&InterfaceInformation, &InterfaceInformation) {
        match dir {
            Direction::Forward => (send, receive),
            Direction::Backward => (receive, send),
        }
    }

    /// Validate sizes and pack every outgoing buffer from `from`.
    fn pack<P, Cont>(&mut self, from: &Cont, into: &Cont, dir: Direction) -> Result<BTreeMap<usize, usize>, ParIndexError>
    where
        P: GatherScatter<Cont>,
        Cont: ?Sized,
    {
        if size_of::<P::Value>() != self.elem_size {
            return Err(ParIndexError::ElementSizeMismatch {
                expected: self.elem_size,
                found: size_of::<P::Value>(),
            });
        }
        let (from_len, into_len) = (P::len(from), P::len(into));
        let mut expected = BTreeMap::new();
        for (&rank, pair) in self.interface.interfaces() {
            let (out, inn) = Self::lists(pair, dir);
            check_indices(out, from_len)?;
            check_indices(inn, into_len)?;
            expected.insert(rank, values_at::<P, Cont>(into, inn) * self.elem_size);

            let buf = self.send_buffers.entry(rank).or_default();
            buf.clear();
            for i in out.iter() {
                for j in 0..P::size(from, i) {
                    buf.extend_from_slice(bytemuck::bytes_of(&P::gather(from, i, j)));
                }
            }
        }
        Ok(expected)
    }

    fn unpack<P, Cont>(&self, received: BTreeMap<usize, Vec<u8>>, into: &mut Cont, dir: Direction)
    where
        P: GatherScatter<Cont>,
        Cont: ?Sized,
    {
        for (rank, bytes) in received {
            let Some(pair) = self.interface.get(rank) else {
                continue;
            };
            let (_, inn) = Self::lists(pair, dir);
            let mut values = pod_vec_from::<P::Value>(&bytes).into_iter();
            for i in inn.iter() {
                for j in 0..P::size(into, i) {
                    let Some(v) = values.next() else {
                        return;
                    };
                    P::scatter(into, v, i, j);
                }
            }
        }
    }

    fn communicate<P, Cont>(&mut self, from: &Cont, into: &mut Cont, dir: Direction) -> Result<(), ParIndexError>
    where
        P: GatherScatter<Cont>,
        Cont: ?Sized,
    {
        let expected = self.pack::<P, Cont>(from, into, dir)?;
        let received = exchange_bytes(self.interface.communicator(), self.tag, &self.send_buffers, &expected)?;
        self.unpack::<P, Cont>(received, into, dir);
        Ok(())
    }

    fn communicate_in_place<P, Cont>(&mut self, data: &mut Cont, dir: Direction) -> Result<(), ParIndexError>
    where
        P: GatherScatter<Cont>,
        Cont: ?Sized,
    {
        let current: &Cont = data;
        let expected = self.pack::<P, Cont>(current, current, dir)?;
        let received = exchange_bytes(self.interface.communicator(), self.tag, &self.send_buffers, &expected)?;
        self.unpack::<P, Cont>(received, data, dir);
        Ok(())
    }

    /// Gather `source` at send positions, scatter into `dest` at receive
    /// positions.
    pub fn forward<P, Cont>(&mut self, source: &Cont, dest: &mut Cont) -> Result<(), ParIndexError>
    where
        P: GatherScatter<Cont>,
        Cont: ?Sized,
    {
        self.communicate::<P, Cont>(source, dest, Direction::Forward)
    }

    /// Gather `dest` at receive positions, scatter into `source` at send
    /// positions.
    pub fn backward<P, Cont>(&mut self, source: &mut Cont, dest: &Cont) -> Result<(), ParIndexError>
    where
        P: GatherScatter<Cont>,
        Cont: ?Sized,
    {
        self.communicate::<P, Cont>(dest, source, Direction::Backward)
    }

    pub fn forward_in_place<P, Cont>(&mut self, data: &mut Cont) -> Result<(), ParIndexError>
    where
        P: GatherScatter<Cont>,
        Cont: ?Sized,
    {
        self.communicate_in_place::<P, Cont>(data, Direction::Forward)
    }

    pub fn backward_in_place<P, Cont>(&mut self, data: &mut Cont) -> Result<(), ParIndexError>
    where
        P: GatherScatter<Cont>,
        Cont: ?Sized,
    {
        self.communicate_in_place::<P, Cont>(data, Direction::Backward)
    }
}

/// Total values `P` stores at the indices of `list`.
fn values_at<P, Cont>(cont: &Cont, list: &InterfaceInformation) -> usize
where
    P: GatherScatter<Cont>,
    Cont: ?Sized,
{
    list.iter().map(|i| P::size(cont, i)).sum()
}

fn check_indices(list: &InterfaceInformation, len: usize) -> Result<(), ParIndexError> {
    match list.iter().find(|&i| i >= len) {
        Some(index) => Err(ParIndexError::IndexOutOfContainer { index, len }),
        None => Ok(()),
    }
}

impl<T: Pod, C: Communicator> InterfaceCommunicator<[T]> for BufferedCommunicator<'_, C> {
    fn forward(&mut self, source: &[T], dest: &mut [T]) -> Result<(), ParIndexError> {
        BufferedCommunicator::forward::<CopyGatherScatter, [T]>(self, source, dest)
    }
    fn backward(&mut self, source: &mut [T], dest: &[T]) -> Result<(), ParIndexError> {
        BufferedCommunicator::backward::<CopyGatherScatter, [T]>(self, source, dest)
    }
    fn forward_in_place(&mut self, data: &mut [T]) -> Result<(), ParIndexError> {
        BufferedCommunicator::forward_in_place::<CopyGatherScatter, [T]>(self, data)
    }
    fn backward_in_place(&mut self, data: &mut [T]) -> Result<(), ParIndexError> {
        BufferedCommunicator::backward_in_place::<CopyGatherScatter, [T]>(self, data)
    }
}
