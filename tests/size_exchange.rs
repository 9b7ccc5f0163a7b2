use parindex::algs::communicator::{CommTag, Communicator, NoComm, Wait};
use parindex::algs::exchange::{exchange_bytes, exchange_sizes};
use parindex::algs::wire::WireCount;
use parindex::par_error::ParIndexError;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

#[derive(Clone)]
struct DummySendHandle {
    waited: Arc<AtomicBool>,
}

impl Wait for DummySendHandle {
    fn wait(self) -> Option<Vec<u8>> {
        self.waited.store(true, Ordering::SeqCst);
        None
    }
}

#[derive(Clone)]
struct DummyRecvHandle {
    waited: Arc<AtomicBool>,
    resp: Option<Vec<u8>>,
}

impl Wait for DummyRecvHandle {
    fn wait(self) -> Option<Vec<u8>> {
        self.waited.store(true, Ordering::SeqCst);
        self.resp
    }
}

/// Rank 0 of a 3-rank world answering receives from a fixed table.
struct DummyComm {
    responses: BTreeMap<(usize, u16), Option<Vec<u8>>>,
    send_flags: Mutex<Vec<Arc<AtomicBool>>>,
    recv_flags: Mutex<Vec<Arc<AtomicBool>>>,
    protocol_errors: AtomicUsize,
}

impl DummyComm {
    fn new(responses: BTreeMap<(usize, u16), Option<Vec<u8>>>) -> Self {
        Self {
            responses,
            send_flags: Mutex::new(Vec::new()),
            recv_flags: Mutex::new(Vec::new()),
            protocol_errors: AtomicUsize::new(0),
        }
    }

    fn all_waited(&self) -> bool {
        let s = self.send_flags.lock().unwrap();
        let r = self.recv_flags.lock().unwrap();
        s.iter().chain(r.iter()).all(|f| f.load(Ordering::SeqCst))
    }
}

impl Communicator for DummyComm {
    type SendHandle = DummySendHandle;
    type RecvHandle = DummyRecvHandle;

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) -> Self::SendHandle {
        let flag = Arc::new(AtomicBool::new(false));
        self.send_flags.lock().unwrap().push(flag.clone());
        DummySendHandle { waited: flag }
    }

    fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> Self::RecvHandle {
        let flag = Arc::new(AtomicBool::new(false));
        self.recv_flags.lock().unwrap().push(flag.clone());
        let resp = self.responses.get(&(peer, tag)).cloned().unwrap_or(None);
        DummyRecvHandle { waited: flag, resp }
    }

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        3
    }

    fn on_protocol_error(&self, _err: &ParIndexError) {
        self.protocol_errors.fetch_add(1, Ordering::SeqCst);
    }
}

fn count_bytes(n: usize) -> Vec<u8> {
    bytemuck::bytes_of(&WireCount::new(n).unwrap()).to_vec()
}

#[test]
fn zero_neighbors_ok() {
    let comm = NoComm;
    let got = exchange_sizes(&comm, CommTag::new(1), &BTreeMap::new(), &BTreeSet::new()).unwrap();
    assert!(got.is_empty());
}

#[test]
fn sizes_decoded_per_peer() {
    let tag = CommTag::new(0x10);
    let comm = DummyComm::new(BTreeMap::from([
        ((1, 0x10), Some(count_bytes(7))),
        ((2, 0x10), Some(count_bytes(0))),
    ]));
    let out = BTreeMap::from([(1, vec![0u8; 3]), (2, vec![])]);
    let got = exchange_sizes(&comm, tag, &out, &BTreeSet::from([1, 2])).unwrap();
    assert_eq!(got, BTreeMap::from([(1, 7), (2, 0)]));
    assert!(comm.all_waited());
}

#[test]
fn missing_payload_drains_everything_then_fails() {
    let tag = CommTag::new(0x20);
    let comm = DummyComm::new(BTreeMap::from([((1, 0x20), None), ((2, 0x20), Some(vec![1, 2]))]));
    let out = BTreeMap::from([(1, vec![9u8]), (2, vec![9u8])]);
    let err = exchange_bytes(&comm, tag, &out, &BTreeMap::from([(1, 2), (2, 2)])).unwrap_err();
    assert!(matches!(err, ParIndexError::CommError { neighbor: 1, .. }));
    assert!(comm.all_waited());
    assert_eq!(comm.protocol_errors.load(Ordering::SeqCst), 1);
}

#[test]
fn wrong_length_is_a_protocol_mismatch() {
    let tag = CommTag::new(0x30);
    let comm = DummyComm::new(BTreeMap::from([((2, 0x30), Some(vec![1, 2, 3]))]));
    let err = exchange_bytes(&comm, tag, &BTreeMap::new(), &BTreeMap::from([(2, 4)])).unwrap_err();
    assert!(matches!(err, ParIndexError::ProtocolMismatch { neighbor: 2, .. }));
    assert!(err.is_protocol_error());
}
