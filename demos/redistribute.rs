// Redistribution between two partitions of the same ids. Every id starts on
// rank `id % P` and moves to rank `(id / 2) % P`. Ids that stay on their rank
// travel through the self link that `rebuild(true)` sets up.
//
//     mpirun -n 3 cargo run --example redistribute --features mpi-support
use parindex::prelude::*;

fn main() -> Result<(), ParIndexError> {
    let comm = MpiComm::new()?;
    let (me, n) = (comm.rank(), comm.size());
    let total = 12 * n as u64;

    let mut old = ParallelIndexSet::<u64, GridFlag>::new();
    old.begin_resize()?;
    for g in (0..total).filter(|g| (g % n as u64) as usize == me) {
        old.add(g, GridFlag::Owner, true)?;
    }
    old.end_resize()?;

    let mut new = ParallelIndexSet::<u64, GridFlag>::new();
    new.begin_resize()?;
    for g in (0..total).rev().filter(|g| ((g / 2) % n as u64) as usize == me) {
        new.add(g, GridFlag::Owner, true)?;
    }
    new.end_resize()?;

    let mut remote = RemoteIndices::new(&old, &new, &comm);
    remote.rebuild(true)?;

    let all = Predicate::All;
    let source: Vec<u64> = (0..old.len())
        .map(|l| old.pair_by_local(l).map(|p| p.global()))
        .collect::<Result<_, _>>()?;
    let mut dest = vec![0u64; new.len()];
    let mut dc = DatatypeCommunicator::build(&remote, &all, &source, &all, &dest)?;
    dc.forward(&source, &mut dest)?;

    for (l, v) in dest.iter().enumerate() {
        assert_eq!(*v, new.pair_by_local(l)?.global());
    }
    println!("rank {me}: received {} ids", dest.len());
    comm.barrier();
    Ok(())
}
