mod util;

use parindex::data::index_set::{IndexSetState, ParallelIndexSet};
use parindex::data::local_index::{GridFlag, ParallelLocalIndex};
use parindex::par_error::ParIndexError;
use util::index_set;

#[test]
fn sets_built_in_different_orders_are_compatible_after_renumbering() {
    let mut a = index_set(&[(3, GridFlag::Owner, true), (1, GridFlag::Owner, true)]);
    let mut b = index_set(&[(1, GridFlag::Owner, true), (3, GridFlag::Owner, true)]);
    assert_ne!(a, b);
    a.renumber_local().unwrap();
    b.renumber_local().unwrap();
    assert_eq!(a, b);
}

#[test]
fn explicit_locals_via_add_pair() {
    let mut s = ParallelIndexSet::<i64, u8>::new();
    s.begin_resize().unwrap();
    s.add_pair(-4, ParallelLocalIndex::new(1, 2, false)).unwrap();
    s.add_pair(8, ParallelLocalIndex::new(0, 1, true)).unwrap();
    s.end_resize().unwrap();
    assert_eq!(s.pair_by_local(0).unwrap().global(), 8);
    assert_eq!(s.iter().next().unwrap().global(), -4);
    assert!(!s.get(-4).unwrap().local().is_public());
}

#[test]
fn failed_transaction_poisons_the_set() {
    let mut s = ParallelIndexSet::<u32, GridFlag>::new();
    s.begin_resize().unwrap();
    s.add_pair(1, ParallelLocalIndex::new(5, GridFlag::Owner, true)).unwrap();
    assert!(matches!(s.end_resize(), Err(ParIndexError::NonDenseLocal { .. })));
    assert_eq!(s.state(), IndexSetState::Invalid);
    assert!(matches!(s.renumber_local(), Err(ParIndexError::InvalidState)));
}

#[test]
fn local_records_serialize() {
    let l = ParallelLocalIndex::new(4, GridFlag::Border, true);
    let text = serde_json::to_string(&l).unwrap();
    assert!(text.contains("\"border\""));
    let back: ParallelLocalIndex<GridFlag> = serde_json::from_str(&text).unwrap();
    assert_eq!(back, l);
}
