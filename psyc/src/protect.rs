//! Kernel-side half of `protect_page`: clearing and restoring the writable bit, and
//! counting how many pages are currently under protection.
//!
//! The user-space entry points (`pmalloc`/`protect_page`/`pfree`) live in
//! [`crate::malloc`]; this module is what they call down into, in the same
//! split `maestro-os-maestro` draws between `kernel/src/syscall/` (argument
//! validation) and `kernel/src/process/mem_space` (the actual page-table
//! mutation).

use crate::malloc::arena::GrowSource;
use crate::memory::pte::{PteFlags, PteState};
use crate::memory::VirtAddr;
use crate::process::ProcessVm;
use crate::swap::SwapBackend;
use utils::errno::{self, EResult};

impl<B: SwapBackend, G: GrowSource> ProcessVm<B, G> {
	/// Sets every bit in `mask` on the PTE mapping `addr`, the kernel half of the
	/// `light_page_flags` syscall (spec.md §4.7/§6).
	///
	/// `protected_count` isn't a field this touches directly -- it's derived from
	/// table state on every call (see [`Self::protected_count`]), so setting
	/// `WRITABLE` back here is automatically reflected without separate
	/// bookkeeping.
	pub fn mark_flags(&mut self, addr: VirtAddr, mask: PteFlags) -> EResult<()> {
		let page = addr.page_down();
		let mut pte = self.table.get(page).copied().ok_or(errno::EINVAL)?;
		pte.insert_flags(mask);
		self.table.set(page, pte);
		Ok(())
	}

	/// Returns the bits of `mask` currently set on the PTE mapping `addr`. Non-mutating.
	pub fn check_flags(&self, addr: VirtAddr, mask: PteFlags) -> EResult<PteFlags> {
		let page = addr.page_down();
		let pte = self.table.get(page).copied().ok_or(errno::EINVAL)?;
		Ok(pte.raw_flags() & mask)
	}

	/// Clears every bit in `mask` on the PTE mapping `addr`, the kernel half of the
	/// `turn_off_page_flags` syscall.
	pub fn clear_flags(&mut self, addr: VirtAddr, mask: PteFlags) -> EResult<()> {
		let page = addr.page_down();
		let mut pte = self.table.get(page).copied().ok_or(errno::EINVAL)?;
		pte.remove_flags(mask);
		self.table.set(page, pte);
		Ok(())
	}

	/// Clears the writable bit on the page at `addr`, so the next write to it faults.
	///
	/// Returns `Err(EINVAL)` if `addr` isn't a resident, pmalloc'd page --
	/// `protect_page` is only ever meaningful on pages that came out of
	/// `pmalloc`, per the allocator's exclusive-use-once-marked contract.
	pub fn protect_page(&mut self, addr: VirtAddr) -> EResult<()> {
		let page = addr.page_down();
		let pte = self.table.get(page).copied().ok_or(errno::EINVAL)?;
		match pte.state() {
			PteState::Resident { .. } if pte.is_pmalloced() => {
				let mut new = pte;
				new.clear_writable();
				self.table.set(page, new);
				Ok(())
			}
			_ => Err(errno::EINVAL),
		}
	}

	/// Restores the writable bit on the page at `addr`, reversing [`Self::protect_page`].
	///
	/// `pfree` doesn't need this itself -- it replaces the entry outright --
	/// but a caller that wants to keep reusing a page without going through
	/// `pfree`/`pmalloc` again can lift the protection directly.
	pub fn unprotect_page(&mut self, addr: VirtAddr) -> EResult<()> {
		let page = addr.page_down();
		let pte = self.table.get(page).copied().ok_or(errno::EINVAL)?;
		match pte.state() {
			PteState::Resident { .. } if pte.is_pmalloced() => {
				let mut new = pte;
				new.set_writable();
				self.table.set(page, new);
				Ok(())
			}
			_ => Err(errno::EINVAL),
		}
	}

	/// The number of pages currently write-protected.
	pub fn protected_count(&self) -> usize {
		self.table
			.iter()
			.filter(|(_, pte)| pte.is_pmalloced() && !pte.is_writable() && matches!(pte.state(), PteState::Resident { .. }))
			.count()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::limits::MAX_RESIDENT_PAGES;
	use crate::malloc::arena::NullGrow;
	use crate::memory::pte::Pte;
	use crate::swap::MemBackend;

	fn new_vm() -> ProcessVm<MemBackend, NullGrow> {
		ProcessVm::new(MemBackend::new(MAX_RESIDENT_PAGES), NullGrow)
	}

	#[test]
	fn protect_then_unprotect_round_trips() {
		let mut vm = new_vm();
		let page = VirtAddr::of_page(0);
		let frame = vm.frames.alloc_frame().unwrap();
		vm.table.set(page, Pte::resident(frame, true, true, true));

		vm.protect_page(page).unwrap();
		assert_eq!(vm.protected_count(), 1);
		assert!(!vm.table.get(page).unwrap().is_writable());

		vm.unprotect_page(page).unwrap();
		assert_eq!(vm.protected_count(), 0);
	}

	#[test]
	fn rejects_non_pmalloced_pages() {
		let mut vm = new_vm();
		let page = VirtAddr::of_page(0);
		let frame = vm.frames.alloc_frame().unwrap();
		vm.table.set(page, Pte::resident(frame, true, true, false));
		assert_eq!(vm.protect_page(page), Err(errno::EINVAL));
	}

	#[test]
	fn generic_flag_ops_read_and_mutate_an_arbitrary_mask() {
		use crate::memory::pte::PteFlags;

		let mut vm = new_vm();
		let page = VirtAddr::of_page(0);
		let frame = vm.frames.alloc_frame().unwrap();
		vm.table.set(page, Pte::resident(frame, true, true, true));

		assert_eq!(vm.check_flags(page, PteFlags::PMALLOCED).unwrap(), PteFlags::PMALLOCED);

		vm.clear_flags(page, PteFlags::WRITABLE).unwrap();
		assert!(!vm.table.get(page).unwrap().is_writable());
		assert_eq!(vm.check_flags(page, PteFlags::WRITABLE).unwrap(), PteFlags::empty());

		vm.mark_flags(page, PteFlags::WRITABLE).unwrap();
		assert!(vm.table.get(page).unwrap().is_writable());
	}

	#[test]
	fn generic_flag_ops_reject_unmapped_addresses() {
		use crate::memory::pte::PteFlags;

		let mut vm = new_vm();
		let page = VirtAddr::of_page(7);
		assert_eq!(vm.check_flags(page, PteFlags::WRITABLE), Err(errno::EINVAL));
		assert_eq!(vm.mark_flags(page, PteFlags::WRITABLE), Err(errno::EINVAL));
		assert_eq!(vm.clear_flags(page, PteFlags::WRITABLE), Err(errno::EINVAL));
	}
}
