//! Constants shared across the crate, mirroring the role of
//! `maestro-os-maestro`'s `src/limits.rs`.

/// The size of a page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// `K`: the maximum number of resident pages (pages backed by RAM) per process.
///
/// Called `MAX_PSYC_PAGES` in the originating assignment; renamed here to the role it
/// plays rather than the historical acronym.
pub const MAX_RESIDENT_PAGES: usize = 16;

/// The ceiling on `total_size / PAGE_SIZE`: the largest virtual image (resident or
/// paged-out pages combined) a process may grow to.
pub const MAX_TOTAL_PAGES: usize = 32;

/// Minimum growth increment requested from the arena's `sbrk`-style growth source by
/// the user allocator's general-purpose `malloc`, in bytes.
pub const MALLOC_SBRK_INCREMENT: usize = 4096;

/// The first page index of the address-space region `pmalloc` hands pages out of.
///
/// Kept well clear of the region `growproc` grows (page indices
/// `0..MAX_TOTAL_PAGES`), the same way a real process keeps its `brk` heap
/// and its `mmap` region in disjoint parts of the address space instead of
/// racing over the same page numbers.
pub const PMALLOC_REGION_BASE: usize = MAX_TOTAL_PAGES;
