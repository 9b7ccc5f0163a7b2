//! DatatypeCommunicator: exchange along an interface through block layouts
//! over the application's own contiguous containers.
//!
//! Each neighbour and direction gets an [`IndexedType`]: the interface's local
//! indices, in interface order, with runs of consecutive indices coalesced
//! into `(start, len)` blocks. `forward` copies whole blocks out of the
//! source container and into the destination container; `backward` uses the
//! same layouts with the roles swapped.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::mem::size_of;

use bytemuck::Pod;

use crate::algs::InterfaceCommunicator;
use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::exchange_bytes;
use crate::algs::wire::{cast_slice, cast_slice_mut};
use crate::config::CommConfig;
use crate::data::local_index::{Attribute, GlobalIndex};
use crate::overlap::interface::Interface;
use crate::overlap::predicate::Predicate;
use crate::overlap::remote_indices::RemoteIndices;
use crate::par_error::ParIndexError;

/// Element blocks `(start, len)` in transfer order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexedType {
    blocks: Vec<(usize, usize)>,
    count: usize,
}

impl IndexedType {
    /// Coalesce runs of consecutive indices; order is preserved.
    pub fn from_indices(indices: &[usize]) -> Self {
        let mut blocks: Vec<(usize, usize)> = Vec::new();
        for &i in indices {
            match blocks.last_mut() {
                Some((start, len)) if *start + *len == i => *len += 1,
                _ => blocks.push((i, 1)),
            }
        }
        Self {
            blocks,
            count: indices.len(),
        }
    }

    #[inline]
    pub fn blocks(&self) -> &[(usize, usize)] {
        &self.blocks
    }

    /// Number of elements described.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// One past the largest index described.
    pub fn extent(&self) -> usize {
        self.blocks.iter().map(|&(s, l)| s + l).max().unwrap_or(0)
    }

    fn pack<T: Pod>(&self, data: &[T], out: &mut Vec<u8>) {
        out.clear();
        for &(start, len) in &self.blocks {
            out.extend_from_slice(cast_slice(&data[start..start + len]));
        }
    }

    fn unpack<T: Pod>(&self, bytes: &[u8], data: &mut [T]) {
        let mut off = 0;
        for &(start, len) in &self.blocks {
            let n = len * size_of::<T>();
            cast_slice_mut(&mut data[start..start + len]).copy_from_slice(&bytes[off..off + n]);
            off += n;
        }
    }
}

/// Per-neighbour `(send, receive)` layouts.
type Layouts = BTreeMap<usize, (IndexedType, IndexedType)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Layout used for sending and for receiving in `dir`.
fn roles((send, receive): &(IndexedType, IndexedType), dir: Direction) -> (&IndexedType, &IndexedType) {
    match dir {
        Direction::Forward => (send, receive),
        Direction::Backward => (receive, send),
    }
}

/// Typed exchange of `T` values along an interface.
///
/// Values are read straight out of the source container block by block and
/// written straight into the destination; the only staging is one send
/// buffer per neighbour, allocated at build time and reused by every call.
pub struct DatatypeCommunicator<'a, T, C> {
    interface: Interface<'a, C>,
    layouts: Layouts,
    send_buffers: BTreeMap<usize, Vec<u8>>,
    source_len: usize,
    dest_len: usize,
    tag: CommTag,
    _marker: PhantomData<T>,
}

impl<'a, T: Pod, C: Communicator> DatatypeCommunicator<'a, T, C> {
    /// Build the interface from `remote` and the predicates, then the block
    /// layouts over `source` (sending side) and `dest` (receiving side).
    ///
    /// Only the lengths of the containers are recorded; every later call must
    /// pass containers of the same lengths.
    pub fn build<G: GlobalIndex, A: Attribute>(
        remote: &RemoteIndices<'a, G, A, C>,
        source_pred: &Predicate<A>,
        source: &[T],
        dest_pred: &Predicate<A>,
        dest: &[T],
    ) -> Result<Self, ParIndexError> {
        let interface = Interface::build(remote, source_pred, dest_pred)?;
        Self::from_interface(interface, source.len(), dest.len())
    }

    /// Use an interface that was already built.
    pub fn from_interface(interface: Interface<'a, C>, source_len: usize, dest_len: usize) -> Result<Self, ParIndexError> {
        let mut layouts = Layouts::new();
        let mut send_buffers = BTreeMap::new();
        for (&rank, (send, receive)) in interface.interfaces() {
            let s = IndexedType::from_indices(send.indices());
            let r = IndexedType::from_indices(receive.indices());
            check_extent(&s, source_len)?;
            check_extent(&r, dest_len)?;
            let widest = s.count().max(r.count()) * size_of::<T>();
            send_buffers.insert(rank, Vec::with_capacity(widest));
            layouts.insert(rank, (s, r));
        }
        log::debug!(
            "rank {}: datatype communicator over {} neighbours, {} blocks",
            interface.communicator().rank(),
            layouts.len(),
            layouts.values().map(|(s, r)| s.blocks().len() + r.blocks().len()).sum::<usize>()
        );
        Ok(Self {
            interface,
            layouts,
            send_buffers,
            source_len,
            dest_len,
            tag: CommTag::new(CommConfig::default().base_tag).offset(2),
            _marker: PhantomData,
        })
    }

    pub fn with_tag(mut self, tag: CommTag) -> Self {
        self.tag = tag;
        self
    }

    #[inline]
    pub fn interface(&self) -> &Interface<'a, C> {
        &self.interface
    }

    /// Layouts of one neighbour, `(send, receive)`.
    pub fn layout(&self, rank: usize) -> Option<&(IndexedType, IndexedType)> {
        self.layouts.get(&rank)
    }

    fn check_lengths(&self, source: usize, dest: usize) -> Result<(), ParIndexError> {
        if source != self.source_len {
            return Err(ParIndexError::ContainerSizeMismatch {
                expected: self.source_len,
                found: source,
            });
        }
        if dest != self.dest_len {
            return Err(ParIndexError::ContainerSizeMismatch {
                expected: self.dest_len,
                found: dest,
            });
        }
        Ok(())
    }

    /// Fill every send buffer from `from`; returns the byte count expected
    /// from each neighbour.
    fn pack(&mut self, from: &[T], dir: Direction) -> BTreeMap<usize, usize> {
        let mut expected = BTreeMap::new();
        for (&rank, layout) in &self.layouts {
            let (out, inn) = roles(layout, dir);
            out.pack(from, self.send_buffers.entry(rank).or_default());
            expected.insert(rank, inn.count() * size_of::<T>());
        }
        expected
    }

    fn unpack(&self, received: &BTreeMap<usize, Vec<u8>>, into: &mut [T], dir: Direction) {
        for (rank, bytes) in received {
            if let Some(layout) = self.layouts.get(rank) {
                roles(layout, dir).1.unpack(bytes, into);
            }
        }
    }

    fn exchange(&self, expected: &BTreeMap<usize, usize>) -> Result<BTreeMap<usize, Vec<u8>>, ParIndexError> {
        exchange_bytes(self.interface.communicator(), self.tag, &self.send_buffers, expected)
    }

    /// `dest[receive positions] <- source[send positions]` of the neighbours.
    pub fn forward(&mut self, source: &[T], dest: &mut [T]) -> Result<(), ParIndexError> {
        self.check_lengths(source.len(), dest.len())?;
        let expected = self.pack(source, Direction::Forward);
        let received = self.exchange(&expected)?;
        self.unpack(&received, dest, Direction::Forward);
        Ok(())
    }

    /// `source[send positions] <- dest[receive positions]` of the neighbours.
    pub fn backward(&mut self, source: &mut [T], dest: &[T]) -> Result<(), ParIndexError> {
        self.check_lengths(source.len(), dest.len())?;
        let expected = self.pack(dest, Direction::Backward);
        let received = self.exchange(&expected)?;
        self.unpack(&received, source, Direction::Backward);
        Ok(())
    }

    /// Forward within one container. Every send buffer is packed before
    /// anything is written back.
    pub fn forward_in_place(&mut self, data: &mut [T]) -> Result<(), ParIndexError> {
        self.check_lengths(data.len(), data.len())?;
        let expected = self.pack(data, Direction::Forward);
        let received = self.exchange(&expected)?;
        self.unpack(&received, data, Direction::Forward);
        Ok(())
    }

    pub fn backward_in_place(&mut self, data: &mut [T]) -> Result<(), ParIndexError> {
        self.check_lengths(data.len(), data.len())?;
        let expected = self.pack(data, Direction::Backward);
        let received = self.exchange(&expected)?;
        self.unpack(&received, data, Direction::Backward);
        Ok(())
    }
}

fn check_extent(t: &IndexedType, len: usize) -> Result<(), ParIndexError> {
    match t.extent() {
        e if e > len => Err(ParIndexError::IndexOutOfContainer { index: e - 1, len }),
        _ => Ok(()),
    }
}

impl<T: Pod, C: Communicator> InterfaceCommunicator<[T]> for DatatypeCommunicator<'_, T, C> {
    fn forward(&mut self, source: &[T], dest: &mut [T]) -> Result<(), ParIndexError> {
        DatatypeCommunicator::forward(self, source, dest)
    }
    fn backward(&mut self, source: &mut [T], dest: &[T]) -> Result<(), ParIndexError> {
        DatatypeCommunicator::backward(self, source, dest)
    }
    fn forward_in_place(&mut self, data: &mut [T]) -> Result<(), ParIndexError> {
        DatatypeCommunicator::forward_in_place(self, data)
    }
    fn backward_in_place(&mut self, data: &mut [T]) -> Result<(), ParIndexError> {
        DatatypeCommunicator::backward_in_place(self, data)
    }
}
