//! Attribute predicates: single-value membership closed under union.

/// A set of attribute values.
///
/// ```rust
/// use parindex::data::local_index::GridFlag;
/// use parindex::overlap::predicate::Predicate;
/// let shared = Predicate::member(GridFlag::Overlap).union(Predicate::member(GridFlag::Border));
/// assert!(shared.contains(GridFlag::Border));
/// assert!(!shared.contains(GridFlag::Owner));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Predicate<A> {
    /// Matches nothing.
    Empty,
    /// Matches every attribute.
    All,
    Member(A),
    Union(Box<Predicate<A>>, Box<Predicate<A>>),
}

impl<A: Copy + PartialEq> Predicate<A> {
    pub fn member(a: A) -> Self {
        Predicate::Member(a)
    }

    pub fn union(self, other: Predicate<A>) -> Self {
        Predicate::Union(Box::new(self), Box::new(other))
    }

    /// Union of single-value predicates; `Empty` for no values.
    pub fn any_of(values: impl IntoIterator<Item = A>) -> Self {
        values
            .into_iter()
            .map(Predicate::Member)
            .reduce(Predicate::union)
            .unwrap_or(Predicate::Empty)
    }

    pub fn contains(&self, a: A) -> bool {
        match self {
            Predicate::Empty => false,
            Predicate::All => true,
            Predicate::Member(m) => *m == a,
            Predicate::Union(l, r) => l.contains(a) || r.contains(a),
        }
    }
}

impl<A> From<A> for Predicate<A> {
    fn from(a: A) -> Self {
        Predicate::Member(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::local_index::GridFlag;

    #[test]
    fn membership_and_union() {
        let p = Predicate::any_of([GridFlag::Owner, GridFlag::Border]);
        assert!(p.contains(GridFlag::Owner));
        assert!(p.contains(GridFlag::Border));
        assert!(!p.contains(GridFlag::Overlap));
    }

    #[test]
    fn empty_and_all() {
        assert!(!Predicate::any_of(Vec::<GridFlag>::new()).contains(GridFlag::Owner));
        assert!(Predicate::<GridFlag>::All.contains(GridFlag::Overlap));
        assert!(Predicate::<GridFlag>::Empty.union(GridFlag::Owner.into()).contains(GridFlag::Owner));
    }
}
