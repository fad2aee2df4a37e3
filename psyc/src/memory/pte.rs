//! Page table entries.
//!
//! The bit layout follows `maestro-os-maestro`'s `kernel/src/memory/vmem/x86.rs`
//! flag set (`PRESENT`, `WRITABLE`, `USER`, `ACCESSED`, `DIRTY`), extended with
//! two bits of our own: `PAGED_OUT` (this entry's swap slot is valid; mutually
//! exclusive with `PRESENT`) and `PMALLOCED` (this page was handed out by
//! `pmalloc` and must never be chosen as an eviction victim, per the
//! exclusion recommended in the design notes).

use crate::memory::Frame;
use crate::swap::SlotIndex;
use bitflags::bitflags;

bitflags! {
	/// Raw per-page flag bits.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct PteFlags: u32 {
		/// The page is backed by a resident physical frame.
		const PRESENT   = 1 << 0;
		/// The page may be written to.
		const WRITABLE  = 1 << 1;
		/// The page is accessible from user mode.
		const USER      = 1 << 2;
		/// Set by [`crate::replacement`] bookkeeping when the page is referenced;
		/// cleared by the second-chance sweep.
		const ACCESSED  = 1 << 3;
		/// Set when the page has been written to since it was last made resident.
		const DIRTY     = 1 << 4;
		/// The page's contents live in the process's swap file, not in RAM.
		const PAGED_OUT = 1 << 5;
		/// The page was allocated through `pmalloc` and is pinned against eviction.
		const PMALLOCED = 1 << 6;
	}
}

/// A single page table entry.
///
/// Internally this is still the flat flag-and-payload representation a real
/// MMU would read, but [`Pte::state`] projects it to the sum type the design
/// notes recommend callers reason over, so `fault`, `replacement`, and
/// `process` never have to re-derive the `PRESENT`/`PAGED_OUT` exclusion
/// themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pte {
	flags: PteFlags,
	/// Either a frame number (if `PRESENT`) or a swap slot index (if `PAGED_OUT`);
	/// meaningless otherwise.
	payload: usize,
}

/// The high-level classification of a [`Pte`], making the `PRESENT`/`PAGED_OUT`
/// mutual exclusion a property of the type rather than a bit-twiddling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PteState {
	/// No virtual page is mapped here at all.
	Unmapped,
	/// Backed by RAM.
	Resident { frame: Frame, writable: bool },
	/// Backed by the swap file.
	PagedOut { slot: SlotIndex },
}

impl Default for Pte {
	fn default() -> Self {
		Self::unmapped()
	}
}

impl Pte {
	/// An entry mapping nothing.
	pub const fn unmapped() -> Self {
		Self {
			flags: PteFlags::empty(),
			payload: 0,
		}
	}

	/// Builds a resident entry pointing at `frame`.
	pub fn resident(frame: Frame, writable: bool, user: bool, pmalloced: bool) -> Self {
		let mut flags = PteFlags::PRESENT;
		flags.set(PteFlags::WRITABLE, writable);
		flags.set(PteFlags::USER, user);
		flags.set(PteFlags::PMALLOCED, pmalloced);
		Self {
			flags,
			payload: frame,
		}
	}

	/// Builds a paged-out entry pointing at `slot`.
	pub fn paged_out(slot: SlotIndex, writable: bool, user: bool, pmalloced: bool) -> Self {
		let mut flags = PteFlags::PAGED_OUT;
		flags.set(PteFlags::WRITABLE, writable);
		flags.set(PteFlags::USER, user);
		flags.set(PteFlags::PMALLOCED, pmalloced);
		Self {
			flags,
			payload: slot.0,
		}
	}

	/// Projects this entry to the caller-facing sum type.
	pub fn state(&self) -> PteState {
		if self.flags.contains(PteFlags::PRESENT) {
			PteState::Resident {
				frame: self.payload,
				writable: self.flags.contains(PteFlags::WRITABLE),
			}
		} else if self.flags.contains(PteFlags::PAGED_OUT) {
			PteState::PagedOut {
				slot: SlotIndex(self.payload),
			}
		} else {
			PteState::Unmapped
		}
	}

	/// Whether this page was handed out by `pmalloc`.
	pub fn is_pmalloced(&self) -> bool {
		self.flags.contains(PteFlags::PMALLOCED)
	}

	/// Whether this page is writable (meaningful only when mapped).
	pub fn is_writable(&self) -> bool {
		self.flags.contains(PteFlags::WRITABLE)
	}

	/// Whether the referenced (`ACCESSED`) bit is set.
	pub fn is_accessed(&self) -> bool {
		self.flags.contains(PteFlags::ACCESSED)
	}

	/// Sets the `ACCESSED` bit.
	pub fn mark_accessed(&mut self) {
		self.flags.insert(PteFlags::ACCESSED);
	}

	/// Clears the `ACCESSED` bit, as the second-chance sweep does on its pass over the
	/// resident queue.
	pub fn clear_accessed(&mut self) {
		self.flags.remove(PteFlags::ACCESSED);
	}

	/// Sets the `DIRTY` bit.
	pub fn mark_dirty(&mut self) {
		self.flags.insert(PteFlags::DIRTY);
	}

	/// Whether the `DIRTY` bit is set.
	pub fn is_dirty(&self) -> bool {
		self.flags.contains(PteFlags::DIRTY)
	}

	/// Clears the writable bit, the mechanism `protect_page` uses to trap the next
	/// write.
	pub fn clear_writable(&mut self) {
		self.flags.remove(PteFlags::WRITABLE);
	}

	/// Sets the writable bit back.
	pub fn set_writable(&mut self) {
		self.flags.insert(PteFlags::WRITABLE);
	}

	/// The raw flag bits, for the generic `mark_flags`/`check_flags`/`clear_flags`
	/// kernel operations (spec.md §4.7) that operate on an arbitrary caller-supplied
	/// mask rather than this type's named accessors.
	pub fn raw_flags(&self) -> PteFlags {
		self.flags
	}

	/// Sets every bit in `mask`.
	pub fn insert_flags(&mut self, mask: PteFlags) {
		self.flags.insert(mask);
	}

	/// Clears every bit in `mask`.
	pub fn remove_flags(&mut self, mask: PteFlags) {
		self.flags.remove(mask);
	}
}
