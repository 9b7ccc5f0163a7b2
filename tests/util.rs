#![allow(dead_code)]
use parindex::algs::communicator::LocalComm;
use parindex::data::index_set::ParallelIndexSet;
use parindex::data::local_index::GridFlag;

pub type Set = ParallelIndexSet<u64, GridFlag>;

/// Build a committed set; locals follow the order of `entries`.
pub fn index_set(entries: &[(u64, GridFlag, bool)]) -> Set {
    let mut s = Set::new();
    s.begin_resize().unwrap();
    for &(g, a, public) in entries {
        s.add(g, a, public).unwrap();
    }
    s.end_resize().unwrap();
    s
}

/// Run `f` once per rank of an `n`-rank in-process world, each rank on its
/// own scoped thread. Results come back in rank order.
pub fn run_ranks<R: Send>(n: usize, f: impl Fn(&LocalComm) -> R + Sync) -> Vec<R> {
    let world = LocalComm::world(n);
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = world.iter().map(|c| s.spawn(move || f(c))).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// 1-D chain of `n` ranks, `per` owned entities each, with one ghost of each
/// neighbour's boundary entity.
///
/// Rank `r` owns globals `r*per .. (r+1)*per`. Owned entities get local
/// indices first, ghosts after them.
pub fn chain_set(rank: usize, n: usize, per: u64) -> Set {
    let lo = rank as u64 * per;
    let hi = lo + per;
    let mut entries: Vec<(u64, GridFlag, bool)> = (lo..hi).map(|g| (g, GridFlag::Owner, true)).collect();
    if rank > 0 {
        entries.push((lo - 1, GridFlag::Overlap, true));
    }
    if rank + 1 < n {
        entries.push((hi, GridFlag::Overlap, true));
    }
    index_set(&entries)
}

/// Assert vec is a permutation of another vec (order-agnostic).
pub fn assert_permutation<T: Ord + Copy + std::fmt::Debug>(got: &[T], want: &[T]) {
    let mut a = got.to_vec();
    a.sort_unstable();
    let mut b = want.to_vec();
    b.sort_unstable();
    assert_eq!(a, b, "not a permutation\n got={:?}\nwant={:?}", got, want);
}
