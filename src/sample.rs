//! Fixed-width LWE sample records and the hash used to detect corruption.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Sentinel written into [`Sample::error`] when the error term is unknown
/// (the sample was not constructed from a known secret). Contagious: any
/// combination involving an unknown error term is itself unknown.
pub const UNKNOWN_ERROR: i16 = -1;

/// A single LWE sample `(a, e)` with `b = <a,s> + e mod q`, stored as
/// `sum_with_error = b`. `a` is a `Vec<u16>` rather than a fixed array
/// because `n` is a per-instance runtime parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub a: Vec<u16>,
    pub hash: u64,
    pub error: i16,
    pub sum_with_error: u16,
}

impl Sample {
    pub fn new(a: Vec<u16>, error: i16, sum_with_error: u16) -> Self {
        let hash = hash_column(&a);
        Self { a, hash, error, sum_with_error }
    }

    #[inline]
    pub fn n(&self) -> usize {
        self.a.len()
    }

    /// Recomputes `hash` from `a` and stores it, as every sample
    /// constructor in the original (`bkwColumnComputeHash`) does after
    /// mutating `a`.
    pub fn refresh_hash(&mut self) {
        self.hash = hash_column(&self.a);
    }

    #[inline]
    pub fn error_term(&self) -> ErrorTerm {
        ErrorTerm::from_raw(self.error)
    }

    pub fn is_zero_column(&self) -> bool {
        self.a.iter().all(|&x| x == 0)
    }
}

/// Internal view of [`Sample::error`] that makes the "unknown is
/// contagious" combination rule explicit instead of relying on callers to
/// remember the `-1` sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorTerm {
    Known(i16),
    Unknown,
}

impl ErrorTerm {
    #[inline]
    pub fn from_raw(raw: i16) -> Self {
        if raw == UNKNOWN_ERROR {
            ErrorTerm::Unknown
        } else {
            ErrorTerm::Known(raw)
        }
    }

    #[inline]
    pub fn into_raw(self) -> i16 {
        match self {
            ErrorTerm::Known(v) => v,
            ErrorTerm::Unknown => UNKNOWN_ERROR,
        }
    }

    pub fn combine(self, other: Self, op: impl FnOnce(i16, i16) -> i16) -> Self {
        match (self, other) {
            (ErrorTerm::Known(a), ErrorTerm::Known(b)) => ErrorTerm::Known(op(a, b)),
            _ => ErrorTerm::Unknown,
        }
    }
}

/// FNV-1a over the little-endian byte representation of `a`. The original
/// column hash is otherwise unspecified; FNV-1a is a fast, deterministic,
/// dependency-free choice that serves the same corruption-detection role.
pub fn hash_column(a: &[u16]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut hash = FNV_OFFSET;
    for &value in a {
        for byte in value.to_le_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

/// On-disk fixed-width trailer for a sample whose dimension is known from
/// the enclosing store: per spec.md §3/§6, a record is `a[n]: u16` followed
/// by `hash: u64, error: i16, sumWithError: u16`, so this trailer is written
/// and read immediately *after* the flat run of `n` little-endian `u16`s
/// that make up `a`, not before it. No teacher precedent introduces
/// `bytemuck::Pod` for this (see DESIGN.md); it's brought in fresh to give
/// this fixed-width tail a zero-copy layout matching spec.md's documented
/// byte layout exactly.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct SampleRecordTrailer {
    pub hash: u64,
    pub error: i16,
    pub sum_with_error: u16,
}

impl SampleRecordTrailer {
    pub fn from_sample(sample: &Sample) -> Self {
        Self {
            hash: sample.hash,
            error: sample.error,
            sum_with_error: sample.sum_with_error,
        }
    }
}
