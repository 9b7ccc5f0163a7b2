//! ParIndexError: unified error type for parindex public APIs
//!
//! Every fallible operation in the crate returns `Result<_, ParIndexError>`.
//! Usage errors (wrong transaction state, stale layouts, mismatched
//! containers) and distributed protocol errors share this type; none of them
//! are recovered from inside the library.

use thiserror::Error;

/// Unified error type for parindex operations.
#[derive(Debug, Error)]
pub enum ParIndexError {
    /// `begin_resize` was called while a transaction was already open, or a
    /// read accessor was used during one.
    #[error("index set is being resized; call end_resize() first")]
    ResizeInProgress,
    /// A mutation that requires an open transaction was called outside one.
    #[error("index set is not being resized; call begin_resize() first")]
    NotResizing,
    /// A previous transaction failed and the set must be discarded.
    #[error("index set is in an invalid state after a failed transaction")]
    InvalidState,
    /// The global index is already registered in this set.
    #[error("global index {0} is already present in the index set")]
    DuplicateGlobal(String),
    /// The global index is not registered in this set.
    #[error("global index {0} is not present in the index set")]
    UnknownGlobal(String),
    /// A local index beyond the size of the set was requested.
    #[error("local index {local} out of range (size {len})")]
    LocalOutOfRange { local: usize, len: usize },
    /// Local indices do not form the dense range `0..len` after `end_resize`.
    #[error("local indices are not dense: expected {expected}, found {found}")]
    NonDenseLocal { expected: usize, found: usize },
    /// Remote indices were never built, or their index sets changed since.
    #[error("remote indices are not in sync with their index sets; call rebuild() first")]
    NotSynced,
    /// A rank that does not exist in the communicator was named.
    #[error("rank {rank} out of range for communicator of size {size}")]
    RankOutOfRange { rank: usize, size: usize },
    /// A container passed to a communicator differs in length from the one
    /// its layout was built for.
    #[error("container has {found} entries but the layout was built for {expected}")]
    ContainerSizeMismatch { expected: usize, found: usize },
    /// An interface index points past the end of the container.
    #[error("interface index {index} out of range for container of length {len}")]
    IndexOutOfContainer { index: usize, len: usize },
    /// The gather/scatter value type differs in size from the build-time type.
    #[error("value of {found} bytes used with buffers built for {expected}-byte values")]
    ElementSizeMismatch { expected: usize, found: usize },
    /// Wire header of an unsupported version.
    #[error("unsupported wire version {found} (expected {expected})")]
    WireVersion { expected: u16, found: u16 },
    /// A length, count or rank does not fit its 32-bit wire field.
    #[error("{field} = {value} does not fit in a 32-bit wire field")]
    WireOverflow { field: &'static str, value: usize },
    /// A neighbour sent a message that does not fit the agreed protocol.
    #[error("protocol mismatch with rank {neighbor}: {reason}")]
    ProtocolMismatch { neighbor: usize, reason: String },
    /// The message-passing runtime could not be brought up.
    #[error("communicator initialization failed: {0}")]
    InitFailed(String),
    /// Communication with a neighbour failed.
    #[error("communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ParIndexError {
    /// Whether this error comes from the message exchange rather than from
    /// local misuse of the API.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            ParIndexError::CommError { .. }
                | ParIndexError::ProtocolMismatch { .. }
                | ParIndexError::WireVersion { .. }
        )
    }
}
