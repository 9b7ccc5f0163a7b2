//! Structural self-checks for the index containers.
//!
//! A committed [`ParallelIndexSet`](crate::data::index_set::ParallelIndexSet)
//! must be sorted by global index, free of duplicates and densely numbered.
//! Those checks run after every committed transaction in debug builds, and in
//! release builds with the `check-invariants` feature.

use crate::par_error::ParIndexError;

pub trait DebugInvariants {
    /// Panic on a broken invariant; no-op unless checks are compiled in.
    fn debug_assert_invariants(&self);

    /// First broken invariant, as the error a caller would have seen.
    fn validate_invariants(&self) -> Result<(), ParIndexError>;
}

/// `debug_invariants!(set.validate_invariants(), "after end_resize")`
///
/// Evaluates the check only when checks are compiled in and panics with the
/// given context on `Err`.
#[macro_export]
macro_rules! debug_invariants {
    ($check:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if let Err(e) = $check {
            panic!(concat!("[parindex invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysBroken;

    impl DebugInvariants for AlwaysBroken {
        fn debug_assert_invariants(&self) {
            crate::debug_invariants!(self.validate_invariants(), "AlwaysBroken");
        }
        fn validate_invariants(&self) -> Result<(), ParIndexError> {
            Err(ParIndexError::NonDenseLocal { expected: 1, found: 0 })
        }
    }

    #[cfg(any(debug_assertions, feature = "check-invariants"))]
    #[test]
    #[should_panic(expected = "[parindex invariants] AlwaysBroken")]
    fn broken_invariant_panics_with_context() {
        AlwaysBroken.debug_assert_invariants();
    }
}
