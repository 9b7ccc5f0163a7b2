//! Process-wide communication settings.
//!
//! A [`CommConfig`] is handed to a communicator backend once at startup and
//! stays fixed for the lifetime of that communicator. Nothing in the crate
//! reads global mutable state for these settings.

use serde::{Deserialize, Serialize};

/// What a backend does when a distributed protocol error is detected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Return the error to the caller (the caller is expected to stop).
    #[default]
    Propagate,
    /// Abort every process in the communicator.
    Abort,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommConfig {
    /// First message tag used by this crate; the default layouts use a few
    /// consecutive tags above it.
    pub base_tag: u16,
    /// Size of the buffer attached for buffered MPI sends.
    pub bsend_buffer_bytes: usize,
    pub error_policy: ErrorPolicy,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            base_tag: 0x4E00,
            bsend_buffer_bytes: 64 << 20,
            error_policy: ErrorPolicy::Propagate,
        }
    }
}
