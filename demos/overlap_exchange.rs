// Overlap exchange on a 1-D chain of MPI ranks. Each rank owns eight
// consecutive global ids and holds a ghost copy of each neighbour's boundary
// id. Ghosts are refreshed from their owners with a copying forward, then
// each owner collects its ghosts' contributions with an additive backward.
//
//     mpirun -n 4 cargo run --example overlap_exchange --features mpi-support
use parindex::prelude::*;

fn main() -> Result<(), ParIndexError> {
    let comm = MpiComm::new()?;
    let (me, n) = (comm.rank(), comm.size());
    let per = 8u64;
    let lo = me as u64 * per;

    let mut set = ParallelIndexSet::<u64, GridFlag>::new();
    set.begin_resize()?;
    for g in lo..lo + per {
        set.add(g, GridFlag::Owner, true)?;
    }
    if me > 0 {
        set.add(lo - 1, GridFlag::Overlap, true)?;
    }
    if me + 1 < n {
        set.add(lo + per, GridFlag::Overlap, true)?;
    }
    set.end_resize()?;

    let mut remote = RemoteIndices::new(&set, &set, &comm);
    remote.rebuild(false)?;
    let interface = Interface::build(
        &remote,
        &Predicate::member(GridFlag::Owner),
        &Predicate::member(GridFlag::Overlap),
    )?;
    interface.print();

    let mut bc = BufferedCommunicator::build::<f64>(&interface);
    let mut values: Vec<f64> = (0..set.len())
        .map(|l| match set.pair_by_local(l) {
            Ok(p) if p.local().attribute() == GridFlag::Owner => p.global() as f64,
            _ => 0.0,
        })
        .collect();
    bc.forward_in_place::<CopyGatherScatter, _>(&mut values)?;
    println!("rank {me}: after forward {values:?}");

    bc.backward_in_place::<AddGatherScatter, _>(&mut values)?;
    println!("rank {me}: after backward {values:?}");

    comm.barrier();
    Ok(())
}
