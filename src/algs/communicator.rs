//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices*. Sends are buffered in every backend:
//! `isend` returns once the payload has been copied out of the caller's
//! buffer, so a rank may post all of its sends before waiting on any receive.
//! Receives are **waitable**; exchange code calls `.wait()` before it trusts
//! that the data is there. Messages between one `(source, destination, tag)`
//! triple are delivered in the order they were sent.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::par_error::ParIndexError;

/// Non-blocking communication interface (minimal by design).
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive; `buf.len()` is the length the caller expects. The
    /// message is returned by [`Wait::wait`] exactly as it was sent, so a
    /// length mismatch is left for the caller to detect.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Block until every rank reached the barrier.
    fn barrier(&self) {}

    /// Called once before a distributed protocol error is returned to the
    /// caller. Backends may use it to apply their configured error policy.
    fn on_protocol_error(&self, _err: &ParIndexError) {}

    /// Every rank contributes `local`; returns all contributions in rank
    /// order. Collective.
    fn allgather(&self, tag: u16, local: &[u8]) -> Result<Vec<Vec<u8>>, ParIndexError> {
        let me = self.rank();
        let size = self.size();
        let sends: Vec<_> = (0..size)
            .filter(|&p| p != me)
            .map(|p| self.isend(p, tag, local))
            .collect();
        let recvs: Vec<_> = (0..size)
            .map(|p| (p != me).then(|| self.irecv(p, tag, &mut [])))
            .collect();

        let mut out = Vec::with_capacity(size);
        let mut maybe_err = None;
        for (peer, h) in recvs.into_iter().enumerate() {
            match h.map(Wait::wait) {
                None => out.push(local.to_vec()),
                Some(Some(data)) => out.push(data),
                Some(None) => {
                    maybe_err.get_or_insert_with(|| ParIndexError::CommError {
                        neighbor: peer,
                        source: format!("allgather: nothing received from rank {peer}").into(),
                    });
                }
            }
        }
        for s in sends {
            let _ = s.wait();
        }
        match maybe_err {
            Some(err) => {
                self.on_protocol_error(&err);
                Err(err)
            }
            None => Ok(out),
        }
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Typed message tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommTag(u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }
    pub const fn as_u16(self) -> u16 {
        self.0
    }
    /// Tag `n` slots above this one.
    pub const fn offset(self, n: u16) -> Self {
        Self(self.0.wrapping_add(n))
    }
}

/// Tags for one "sizes then data" exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExchangeTags {
    pub sizes: CommTag,
    pub data: CommTag,
}

impl ExchangeTags {
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            sizes: base,
            data: base.offset(1),
        }
    }
}

/// Compile-time no-op comm for pure serial use: one rank, no messages.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
}

// --- LocalComm: in-process ranks, one thread each ---

type Key = (usize, usize, u16); // (src, dst, tag)

struct Hub {
    size: usize,
    mailbox: DashMap<Key, VecDeque<Bytes>>,
    signal: Mutex<()>,
    arrived: Condvar,
    barrier: std::sync::Barrier,
}

impl Hub {
    fn pop(&self, key: &Key) -> Option<Bytes> {
        self.mailbox.get_mut(key).and_then(|mut q| q.pop_front())
    }
}

/// One rank of an in-process "world". Every rank is meant to be driven by
/// its own thread; see [`LocalComm::world`].
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    hub: Arc<Hub>,
}

impl fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.hub.size)
            .finish()
    }
}

impl LocalComm {
    /// Create the `size` ranks of a fresh world sharing one mailbox.
    pub fn world(size: usize) -> Vec<LocalComm> {
        let hub = Arc::new(Hub {
            size,
            mailbox: DashMap::new(),
            signal: Mutex::new(()),
            arrived: Condvar::new(),
            barrier: std::sync::Barrier::new(size.max(1)),
        });
        (0..size)
            .map(|rank| LocalComm {
                rank,
                hub: Arc::clone(&hub),
            })
            .collect()
    }
}

pub struct LocalRecvHandle {
    hub: Arc<Hub>,
    key: Key,
}

impl Wait for LocalRecvHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let mut guard = self.hub.signal.lock();
        loop {
            if let Some(bytes) = self.hub.pop(&self.key) {
                drop(guard);
                return Some(bytes.to_vec());
            }
            self.hub.arrived.wait(&mut guard);
        }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalRecvHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.rank, peer, tag);
        self.hub
            .mailbox
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
        // Taking the lock orders this notify after any receiver's check.
        let _guard = self.hub.signal.lock();
        self.hub.arrived.notify_all();
    }

    fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> LocalRecvHandle {
        LocalRecvHandle {
            hub: Arc::clone(&self.hub),
            key: (peer, self.rank, tag),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.hub.size
    }

    fn barrier(&self) {
        self.hub.barrier.wait();
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use crate::config::{CommConfig, ErrorPolicy};
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as _, CommunicatorCollectives, Destination, Source};
    use std::rc::Rc;

    /// MPI world communicator. Sends use `MPI_Bsend` on a buffer attached at
    /// construction, receives are matched blocking receives run on `wait`.
    pub struct MpiComm {
        // Declared before `universe` so it is dropped before MPI finalizes.
        world: Rc<SimpleCommunicator>,
        rank: usize,
        size: usize,
        config: CommConfig,
        _universe: Universe,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, ParIndexError> {
            Self::with_config(CommConfig::default())
        }

        pub fn with_config(config: CommConfig) -> Result<Self, ParIndexError> {
            let mut universe = mpi::initialize()
                .ok_or_else(|| ParIndexError::InitFailed("MPI was already initialized".into()))?;
            universe.set_buffer_size(config.bsend_buffer_bytes);
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            log::debug!("rank {rank}/{size}: MPI up, bsend buffer {} bytes", config.bsend_buffer_bytes);
            Ok(Self {
                world: Rc::new(world),
                rank,
                size,
                config,
                _universe: universe,
            })
        }

        pub fn world(&self) -> &SimpleCommunicator {
            &self.world
        }

        pub fn config(&self) -> &CommConfig {
            &self.config
        }
    }

    pub struct MpiRecvHandle {
        world: Rc<SimpleCommunicator>,
        peer: i32,
        tag: i32,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let (data, _status) = self
                .world
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            self.world
                .process_at_rank(peer as i32)
                .buffered_send_with_tag(buf, tag as i32);
        }

        fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> MpiRecvHandle {
            MpiRecvHandle {
                world: Rc::clone(&self.world),
                peer: peer as i32,
                tag: tag as i32,
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) {
            self.world.barrier();
        }

        fn on_protocol_error(&self, err: &ParIndexError) {
            if self.config.error_policy == ErrorPolicy::Abort {
                log::error!("rank {}: aborting on protocol error: {err}", self.rank);
                self.world.abort(1);
            }
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_roundtrip_two_ranks() {
        let world = LocalComm::world(2);
        let (c0, c1) = (&world[0], &world[1]);

        let mut recv_buf = [0u8; 4];
        let recv_handle = c1.irecv(0, 7, &mut recv_buf);
        c0.isend(1, 7, &[1, 2, 3, 4]).wait();

        let data = recv_handle
            .wait()
            .expect("Expected to receive data from rank 0");
        recv_buf.copy_from_slice(&data);
        assert_eq!(&recv_buf, &[1, 2, 3, 4]);
    }

    #[test]
    fn local_fifo_and_tag_isolation() {
        let world = LocalComm::world(2);
        for i in 0..5u8 {
            world[0].isend(1, 3, &[i]);
        }
        world[0].isend(1, 4, &[99]);
        let mut b = [0u8; 1];
        assert_eq!(world[1].irecv(0, 4, &mut b).wait(), Some(vec![99]));
        let got: Vec<u8> = (0..5)
            .map(|_| world[1].irecv(0, 3, &mut b).wait().unwrap()[0])
            .collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn local_receive_blocks_until_send() {
        let world = LocalComm::world(2);
        std::thread::scope(|s| {
            let c1 = world[1].clone();
            let h = s.spawn(move || {
                let mut buf = [0u8; 3];
                c1.irecv(0, 1, &mut buf).wait()
            });
            std::thread::sleep(std::time::Duration::from_millis(20));
            world[0].isend(1, 1, b"abc");
            assert_eq!(h.join().unwrap(), Some(b"abc".to_vec()));
        });
    }

    #[test]
    fn local_oversized_message_is_returned_whole() {
        let world = LocalComm::world(2);
        world[0].isend(1, 2, &[1, 2, 3, 4, 5, 6]);
        let mut small = [0u8; 4];
        assert_eq!(world[1].irecv(0, 2, &mut small).wait(), Some(vec![1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn allgather_collects_in_rank_order() {
        let world = LocalComm::world(3);
        let got: Vec<Vec<Vec<u8>>> = std::thread::scope(|s| {
            let hs: Vec<_> = world
                .iter()
                .map(|c| s.spawn(move || c.allgather(9, &vec![c.rank() as u8; c.rank() + 1]).unwrap()))
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for per_rank in &got {
            assert_eq!(per_rank, &vec![vec![0], vec![1, 1], vec![2, 2, 2]]);
        }
        assert_eq!(NoComm.allgather(9, &[7]).unwrap(), vec![vec![7]]);
    }

    #[test]
    fn local_barrier_releases_all_ranks() {
        let world = LocalComm::world(3);
        std::thread::scope(|s| {
            for c in &world {
                s.spawn(move || c.barrier());
            }
        });
    }

    #[test]
    fn no_comm_is_nop() {
        let comm = NoComm;
        let mut buf = [0u8; 8];
        assert!(comm.irecv(0, 123, &mut buf).wait().is_none());
        assert!(comm.isend(0, 123, &[]).wait().is_none());
        assert_eq!((comm.rank(), comm.size()), (0, 1));
    }

    #[test]
    fn tags_from_base() {
        let tags = ExchangeTags::from_base(CommTag::new(0xFFFF));
        assert_eq!(tags.sizes.as_u16(), 0xFFFF);
        assert_eq!(tags.data.as_u16(), 0);
    }
}
