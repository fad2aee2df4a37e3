//! Physical frame allocation.
//!
//! `maestro-os-maestro`'s `kernel/src/memory/buddy.rs` manages physical RAM
//! with a buddy allocator over power-of-two zones, because the kernel must
//! serve allocations of many different orders. The VM core here only ever
//! hands out single pages (demand paging and `pmalloc` both work in whole
//! pages), so a flat free list in the shape of xv6's `kalloc.c` is enough;
//! the buddy machinery would be unused complexity. This divergence is
//! recorded in the design ledger.

use crate::limits::{MAX_TOTAL_PAGES, PAGE_SIZE};
use crate::memory::Frame;
use utils::errno::{self, EResult};
use utils::lock::IntMutex;

/// Byte pattern used to poison a freed frame, the same role `maestro-os-maestro`'s
/// buddy allocator fills with `0xcc` in debug builds: a freed-then-reused frame
/// that still shows this pattern indicates a use-after-free.
const POISON_BYTE: u8 = 0xcc;

/// A pool of physical frames backing one process's resident pages.
///
/// The real kernel's frame pool is system-wide; this one is instantiated
/// per [`crate::process::ProcessVm`] and sized to [`crate::limits::MAX_RESIDENT_PAGES`],
/// which is the only call site the spec requires.
pub struct FrameAllocator {
	inner: IntMutex<Inner>,
}

struct Inner {
	/// Backing store for every possible frame, indexed by frame number.
	store: alloc::vec::Vec<[u8; PAGE_SIZE]>,
	free_list: alloc::vec::Vec<Frame>,
	allocated_count: usize,
}

impl FrameAllocator {
	/// Creates a pool of `capacity` frames, all initially free.
	pub fn new(capacity: usize) -> Self {
		assert!(capacity <= MAX_TOTAL_PAGES, "frame pool larger than the total page cap");
		let store = alloc::vec![[0u8; PAGE_SIZE]; capacity];
		let free_list = (0..capacity).rev().collect();
		Self {
			inner: IntMutex::new(Inner {
				store,
				free_list,
				allocated_count: 0,
			}),
		}
	}

	/// Takes one frame from the free list, zeroing it first.
	///
	/// Returns `Err(ENOMEM)` once the pool is exhausted -- the `OutOfFrames`
	/// condition callers in [`crate::fault`] translate to a process kill.
	pub fn alloc_frame(&self) -> EResult<Frame> {
		let mut inner = self.inner.lock();
		let frame = inner.free_list.pop().ok_or(errno::ENOMEM)?;
		inner.store[frame] = [0u8; PAGE_SIZE];
		inner.allocated_count += 1;
		Ok(frame)
	}

	/// Returns `frame` to the free list, poisoning its backing bytes.
	pub fn free_frame(&self, frame: Frame) {
		let mut inner = self.inner.lock();
		inner.store[frame] = [POISON_BYTE; PAGE_SIZE];
		inner.allocated_count -= 1;
		inner.free_list.push(frame);
	}

	/// Reads the full contents of `frame`.
	pub fn read(&self, frame: Frame) -> [u8; PAGE_SIZE] {
		self.inner.lock().store[frame]
	}

	/// Overwrites the full contents of `frame`.
	pub fn write(&self, frame: Frame, data: &[u8; PAGE_SIZE]) {
		self.inner.lock().store[frame] = *data;
	}

	/// The number of frames currently allocated.
	pub fn allocated_count(&self) -> usize {
		self.inner.lock().allocated_count
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn exhausts_then_frees() {
		let pool = FrameAllocator::new(2);
		let a = pool.alloc_frame().unwrap();
		let _b = pool.alloc_frame().unwrap();
		assert_eq!(pool.alloc_frame(), Err(errno::ENOMEM));
		pool.free_frame(a);
		assert!(pool.alloc_frame().is_ok());
	}

	#[test]
	fn freed_frame_is_poisoned() {
		let pool = FrameAllocator::new(1);
		let f = pool.alloc_frame().unwrap();
		pool.write(f, &[7u8; PAGE_SIZE]);
		pool.free_frame(f);
		let f2 = pool.alloc_frame().unwrap();
		assert_eq!(f2, f);
		assert_eq!(pool.read(f2), [0u8; PAGE_SIZE]);
	}
}
