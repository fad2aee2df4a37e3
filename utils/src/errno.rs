//! This module stores the errno utilities.
//!
//! Subset of the POSIX errno table that this workspace actually returns,
//! following the flat `pub const`-over-`i32` style of `maestro-os-maestro`'s
//! `src/errno.rs` rather than the richer location-tracking `Errno` the
//! kernel's later `utils::errno` grew into; this core has no use for the
//! extra bookkeeping.

/// Type representing a Unix errno.
pub type Errno = i32;

/// The result type used throughout this workspace for fallible operations.
pub type EResult<T> = Result<T, Errno>;

/// Invalid argument.
pub const EINVAL: Errno = 22;
/// Not enough space.
pub const ENOMEM: Errno = 12;
/// Bad address.
pub const EFAULT: Errno = 14;
