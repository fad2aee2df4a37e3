//! Page fault handling: the demand-paging engine's entry point.
//!
//! Grounded on the fault-dispatch shape of `maestro-os-maestro`'s
//! `kernel/src/process/mem_space/mod.rs` (`MemSpace::handle_page_fault`),
//! generalized to also serve as the delivery mechanism for `protect_page`
//! violations, since this crate has no separate trap-classification layer.

use crate::malloc::arena::GrowSource;
use crate::memory::pte::{Pte, PteState};
use crate::memory::VirtAddr;
use crate::process::ProcessVm;
use crate::swap::SwapBackend;
use utils::errno::{self, EResult};

/// Whether the faulting access was a read or a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
	Read,
	Write,
}

/// The reason a fault led to the process being killed rather than resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
	/// A write landed on a page `protect_page` had marked read-only.
	WroteToProtectedPage,
}

/// What the trap dispatcher should do once the fault handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
	/// The fault was resolved; the faulting instruction may be retried.
	Resolved,
	/// The fault cannot be resolved; the process must be killed.
	Kill(KillReason),
}

impl<B: SwapBackend, G: GrowSource> ProcessVm<B, G> {
	/// Handles a page fault at `addr`.
	///
	/// `OutOfFrames` (no free frame and no evictable victim, e.g. under the
	/// `none` policy once the resident set is full) surfaces as `Err(ENOMEM)`;
	/// a write to a page `protect_page` marked read-only surfaces as
	/// `Ok(FaultOutcome::Kill(..))`, matching the error-handling design's
	/// split between resource exhaustion (an errno) and a protection
	/// violation (a signal-like outcome, not an errno).
	pub fn handle_page_fault(&mut self, addr: VirtAddr, kind: FaultKind) -> EResult<FaultOutcome> {
		self.fault_count += 1;
		let page = addr.page_down();
		let page_index = page.page_index();

		if page_index >= self.table.capacity_pages() {
			if page_index < self.total_pages {
				// Within the image but never materialized (e.g. beyond the resident
				// cap at growproc time): demand-zero it in now.
				self.fault_in_zero_page(page)?;
				return Ok(FaultOutcome::Resolved);
			}
			// Outside the image entirely: not our concern here, the scheduler's
			// trap dispatcher is expected to have already rejected genuinely
			// out-of-bounds addresses before calling us.
			return Err(errno::EFAULT);
		}

		match self.table.get(page).copied().unwrap_or_default().state() {
			PteState::Unmapped => {
				self.fault_in_zero_page(page)?;
				Ok(FaultOutcome::Resolved)
			}
			PteState::PagedOut { slot } => {
				self.swap_in(page, slot)?;
				Ok(FaultOutcome::Resolved)
			}
			PteState::Resident { writable, .. } => {
				if kind == FaultKind::Write && !writable {
					Ok(FaultOutcome::Kill(KillReason::WroteToProtectedPage))
				} else {
					// Already resolved by a concurrent fault, or a benign
					// accessed-bit update; nothing to do.
					Ok(FaultOutcome::Resolved)
				}
			}
		}
	}

	/// Materializes a demand-zero page at `page`, evicting a victim first if the
	/// resident set is already at capacity.
	fn fault_in_zero_page(&mut self, page: VirtAddr) -> EResult<()> {
		let frame = self.acquire_frame()?;
		self.table.set(page, Pte::resident(frame, true, true, false));
		self.resident.push(page);
		Ok(())
	}

	/// Brings a paged-out page back into RAM, evicting a victim first if needed, and
	/// frees its swap slot.
	///
	/// Reads the incoming page's slot and frees it *before* acquiring a frame: with
	/// the swap file sized to exactly `K` slots (one per possible paged-out page),
	/// an eviction triggered by the frame acquisition below needs a free slot for its
	/// own victim, and the incoming page's slot is the one about to become available.
	/// Allocating the victim's slot before freeing this one would spuriously exhaust
	/// the file even though a slot is rightfully about to be freed.
	fn swap_in(&mut self, page: VirtAddr, slot: crate::swap::SlotIndex) -> EResult<()> {
		let mut data = [0u8; crate::limits::PAGE_SIZE];
		self.swap.read_slot(slot, &mut data)?;
		self.swap.free_slot(slot);
		let frame = self.acquire_frame()?;
		self.frames.write(frame, &data);
		let writable = self.table.get(page).map(|p| p.is_writable()).unwrap_or(true);
		let pmalloced = self.table.get(page).map(|p| p.is_pmalloced()).unwrap_or(false);
		self.table.set(page, Pte::resident(frame, writable, true, pmalloced));
		self.resident.push(page);
		Ok(())
	}

	/// Returns a free frame, evicting a resident page to the swap file first if the
	/// pool is exhausted.
	pub(crate) fn acquire_frame(&mut self) -> EResult<crate::memory::Frame> {
		match self.frames.alloc_frame() {
			Ok(frame) => Ok(frame),
			Err(_) => self.evict_one(),
		}
	}

	/// Evicts one resident page per the active policy, freeing its frame for reuse.
	///
	/// `pmalloc`'d pages share the resident queue (so they still count against the
	/// cap) but are never themselves a valid victim; `choose_victim`'s `is_pinned`
	/// predicate keeps the sweep looking past them instead of handing one back.
	fn evict_one(&mut self) -> EResult<crate::memory::Frame> {
		let table = &self.table;
		let mut to_clear = alloc::vec::Vec::new();
		let victim = self.resident.choose_victim(
			self.policy,
			|p| table.get(p).map(|e| e.is_accessed()).unwrap_or(false),
			|p| to_clear.push(p),
			|p| table.get(p).map(|e| e.is_pmalloced()).unwrap_or(false),
		);
		// Apply the second-chance sweep's bit-clears for real, now that the
		// selection pass above (which only read the bit) is done.
		for p in to_clear {
			if let Some(pte) = self.table.get_mut(p) {
				pte.clear_accessed();
			}
		}
		let victim = match victim {
			Some(v) => v,
			None => {
				crate::kwarn!("evict_one: no evictable victim (resident set fully pinned)");
				return Err(errno::ENOMEM);
			}
		};
		let pte = self.table.get(victim).copied().ok_or(errno::ENOMEM)?;
		debug_assert!(!pte.is_pmalloced(), "choose_victim must never return a pinned page");
		if let PteState::Resident { frame, .. } = pte.state() {
			let slot = self.swap.allocate_slot()?;
			let data = self.frames.read(frame);
			self.swap.write_slot(slot, &data)?;
			self.table.set(victim, Pte::paged_out(slot, pte.is_writable(), true, false));
			self.frames.free_frame(frame);
			self.paged_out_total += 1;
			return Ok(self.frames.alloc_frame()?);
		}
		Err(errno::ENOMEM)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::limits::MAX_RESIDENT_PAGES;
	use crate::malloc::arena::NullGrow;
	use crate::swap::MemBackend;

	fn new_vm() -> ProcessVm<MemBackend, NullGrow> {
		ProcessVm::new(MemBackend::new(MAX_RESIDENT_PAGES), NullGrow)
	}

	#[test]
	fn faulting_past_resident_cap_evicts_and_pages_out() {
		let mut vm = new_vm();
		vm.growproc(MAX_RESIDENT_PAGES).unwrap();
		assert_eq!(vm.resident_count(), MAX_RESIDENT_PAGES);

		vm.total_pages += 1;
		let extra = VirtAddr::of_page(MAX_RESIDENT_PAGES);
		let outcome = vm.handle_page_fault(extra, FaultKind::Read).unwrap();
		assert_eq!(outcome, FaultOutcome::Resolved);
		assert_eq!(vm.resident_count(), MAX_RESIDENT_PAGES);
		assert!(vm.paged_out_total >= 1);
	}

	#[test]
	fn scfifo_eviction_clears_the_accessed_bit_in_the_table() {
		let mut vm = new_vm();
		vm.growproc(MAX_RESIDENT_PAGES).unwrap();
		// Mark every resident page but the last as accessed, so the second-chance
		// sweep has to give all of them a lap before landing on a victim.
		for i in 0..MAX_RESIDENT_PAGES - 1 {
			vm.table.get_mut(VirtAddr::of_page(i)).unwrap().mark_accessed();
		}

		vm.total_pages += 1;
		let extra = VirtAddr::of_page(MAX_RESIDENT_PAGES);
		vm.handle_page_fault(extra, FaultKind::Read).unwrap();

		// Every page that survived the sweep must have had its bit cleared for
		// real in the table, not just in the transient selection pass.
		for i in 0..MAX_RESIDENT_PAGES - 1 {
			if let Some(pte) = vm.table.get(VirtAddr::of_page(i)) {
				assert!(!pte.is_accessed(), "page {i} still marked accessed after eviction sweep");
			}
		}
	}

	#[test]
	fn write_to_protected_page_is_killed() {
		let mut vm = new_vm();
		vm.growproc(1).unwrap();
		let page = VirtAddr::of_page(0);
		if let PteState::Resident { frame, .. } = vm.table.get(page).unwrap().state() {
			vm.table.set(page, Pte::resident(frame, false, true, false));
		}
		let outcome = vm.handle_page_fault(page, FaultKind::Write).unwrap();
		assert_eq!(outcome, FaultOutcome::Kill(KillReason::WroteToProtectedPage));
	}
}
