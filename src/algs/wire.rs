//! Fixed, versioned, little-endian wire types for index discovery and
//! interface exchange.

use bytemuck::{Pod, Zeroable};
use std::mem::size_of;

use crate::par_error::ParIndexError;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Decode a byte buffer into owned records. The buffer need not be aligned.
pub fn pod_vec_from<T: Pod>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

/// Narrow a length, count or rank to its 32-bit wire field.
pub fn to_wire_u32(field: &'static str, value: usize) -> Result<u32, ParIndexError> {
    u32::try_from(value).map_err(|_| ParIndexError::WireOverflow { field, value })
}

pub fn expect_exact_len(neighbor: usize, actual: usize, expected: usize) -> Result<(), ParIndexError> {
    if actual == expected {
        Ok(())
    } else {
        Err(ParIndexError::ProtocolMismatch {
            neighbor,
            reason: format!("expected {expected} bytes, got {actual}"),
        })
    }
}

/// Global indices travel as a single little-endian `u64`.
pub trait WireGlobal: Copy {
    fn to_wire(self) -> u64;
    fn from_wire(w: u64) -> Self;
}

/// Attributes travel as a little-endian `u32`.
pub trait WireAttribute: Copy {
    fn to_wire(self) -> u32;
    /// `None` for a code this attribute type does not know.
    fn from_wire(w: u32) -> Option<Self>;
}

macro_rules! wire_global_unsigned {
    ($($t:ty),*) => {$(
        impl WireGlobal for $t {
            #[inline]
            fn to_wire(self) -> u64 { self as u64 }
            #[inline]
            fn from_wire(w: u64) -> Self { w as $t }
        }
    )*};
}
wire_global_unsigned!(u32, u64, usize);

// Signed ids go through their two's complement bit pattern.
impl WireGlobal for i32 {
    #[inline]
    fn to_wire(self) -> u64 {
        self as i64 as u64
    }
    #[inline]
    fn from_wire(w: u64) -> Self {
        w as i64 as i32
    }
}

impl WireGlobal for i64 {
    #[inline]
    fn to_wire(self) -> u64 {
        self as u64
    }
    #[inline]
    fn from_wire(w: u64) -> Self {
        w as i64
    }
}

impl WireAttribute for u8 {
    #[inline]
    fn to_wire(self) -> u32 {
        self as u32
    }
    #[inline]
    fn from_wire(w: u32) -> Option<Self> {
        u8::try_from(w).ok()
    }
}

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

// All multi-byte integers in these structs are **little-endian** on the wire.
// We store them pre-LE with `.to_le()` and decode with `.from_le()`.

// ===== Index discovery =====================================================

/// Header of one rank's index advertisement.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireIndexHdr {
    pub version_le: u16,
    /// 1 when source and target sets differ on the sender.
    pub two_sets_le: u16,
    /// Communicator size as seen by the sender.
    pub procs_le: u32,
    /// Rank that packed the message (ring messages are forwarded).
    pub origin_le: u32,
    pub n_source_le: u32,
    pub n_target_le: u32,
    pub reserved_le: u32, // keep zero
}

impl WireIndexHdr {
    pub fn new(
        two_sets: bool,
        procs: usize,
        origin: usize,
        n_source: usize,
        n_target: usize,
    ) -> Result<Self, ParIndexError> {
        Ok(Self {
            version_le: WIRE_VERSION.to_le(),
            two_sets_le: u16::from(two_sets).to_le(),
            procs_le: to_wire_u32("procs", procs)?.to_le(),
            origin_le: to_wire_u32("origin", origin)?.to_le(),
            n_source_le: to_wire_u32("n_source", n_source)?.to_le(),
            n_target_le: to_wire_u32("n_target", n_target)?.to_le(),
            reserved_le: 0,
        })
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn two_sets(&self) -> bool {
        u16::from_le(self.two_sets_le) != 0
    }
    pub fn procs(&self) -> usize {
        u32::from_le(self.procs_le) as usize
    }
    pub fn origin(&self) -> usize {
        u32::from_le(self.origin_le) as usize
    }
    pub fn n_source(&self) -> usize {
        u32::from_le(self.n_source_le) as usize
    }
    pub fn n_target(&self) -> usize {
        u32::from_le(self.n_target_le) as usize
    }
}

/// One advertised `(global, attribute)` pair.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireIndexPair {
    pub global_le: u64,
    pub attribute_le: u32,
    pub _pad: u32, // pad to 8-byte alignment (explicit)
}

impl WireIndexPair {
    pub const SIZE: usize = 16;
    pub fn new(global: u64, attribute: u32) -> Self {
        Self {
            global_le: global.to_le(),
            attribute_le: attribute.to_le(),
            _pad: 0,
        }
    }
    pub fn global(&self) -> u64 {
        u64::from_le(self.global_le)
    }
    pub fn attribute(&self) -> u32 {
        u32::from_le(self.attribute_le)
    }
}

// ===== Exchange sizes =======================================================

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32, // count of following bytes
}

impl WireCount {
    pub fn new(n: usize) -> Result<Self, ParIndexError> {
        Ok(Self {
            n_le: to_wire_u32("count", n)?.to_le(),
        })
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

// ===== Compile-time sanity checks =========================================

// Pod/Zeroable ensures no padding contains uninit when cast to bytes.
static_assertions::assert_eq_size!(WireIndexHdr, [u8; 24]);
static_assertions::assert_eq_size!(WireCount, u32);
static_assertions::const_assert_eq!(size_of::<WireIndexPair>(), WireIndexPair::SIZE);
static_assertions::assert_eq_align!(WireIndexPair, u64);
