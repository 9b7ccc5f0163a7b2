//! GatherScatter: how values leave and enter an application container.
//!
//! The buffered communicator never touches a container directly. It calls
//! [`GatherScatter::gather`] at every send position and
//! [`GatherScatter::scatter`] at every receive position, so the policy alone
//! decides whether incoming values overwrite (ghost refresh) or accumulate
//! (reduce-to-owner).
//!
//! An index may hold more than one value: [`GatherScatter::size`] gives the
//! count at index `i`, and `gather`/`scatter` address value `j` of it. Both
//! ends of a link must agree on the count of every shared entity.

use bytemuck::Pod;

/// Pack/unpack rules for one container type.
pub trait GatherScatter<Cont: ?Sized> {
    /// What travels for one value.
    type Value: Pod;

    /// Number of addressable entries in `cont`.
    fn len(cont: &Cont) -> usize;

    /// Number of values stored at local index `i`.
    #[inline]
    fn size(_cont: &Cont, _i: usize) -> usize {
        1
    }

    /// Value `j` to send for local index `i`.
    fn gather(cont: &Cont, i: usize, j: usize) -> Self::Value;

    /// Merge a received value into value `j` of local index `i`.
    fn scatter(cont: &mut Cont, v: Self::Value, i: usize, j: usize);
}

/// Received values overwrite the local entry.
#[derive(Copy, Clone, Debug, Default)]
pub struct CopyGatherScatter;

/// Received values are added to the local entry.
#[derive(Copy, Clone, Debug, Default)]
pub struct AddGatherScatter;

impl<T: Pod> GatherScatter<[T]> for CopyGatherScatter {
    type Value = T;
    #[inline]
    fn len(cont: &[T]) -> usize {
        cont.len()
    }
    #[inline]
    fn gather(cont: &[T], i: usize, _j: usize) -> T {
        cont[i]
    }
    #[inline]
    fn scatter(cont: &mut [T], v: T, i: usize, _j: usize) {
        cont[i] = v;
    }
}

impl<T: Pod> GatherScatter<Vec<T>> for CopyGatherScatter {
    type Value = T;
    #[inline]
    fn len(cont: &Vec<T>) -> usize {
        cont.len()
    }
    #[inline]
    fn gather(cont: &Vec<T>, i: usize, _j: usize) -> T {
        cont[i]
    }
    #[inline]
    fn scatter(cont: &mut Vec<T>, v: T, i: usize, _j: usize) {
        cont[i] = v;
    }
}

impl<T> GatherScatter<[T]> for AddGatherScatter
where
    T: Pod + std::ops::AddAssign,
{
    type Value = T;
    #[inline]
    fn len(cont: &[T]) -> usize {
        cont.len()
    }
    #[inline]
    fn gather(cont: &[T], i: usize, _j: usize) -> T {
        cont[i]
    }
    #[inline]
    fn scatter(cont: &mut [T], v: T, i: usize, _j: usize) {
        cont[i] += v;
    }
}

impl<T> GatherScatter<Vec<T>> for AddGatherScatter
where
    T: Pod + std::ops::AddAssign,
{
    type Value = T;
    #[inline]
    fn len(cont: &Vec<T>) -> usize {
        cont.len()
    }
    #[inline]
    fn gather(cont: &Vec<T>, i: usize, _j: usize) -> T {
        cont[i]
    }
    #[inline]
    fn scatter(cont: &mut Vec<T>, v: T, i: usize, _j: usize) {
        cont[i] += v;
    }
}
