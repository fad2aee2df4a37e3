//! Simulated user-mode memory access: `read_bytes`/`write_bytes`.
//!
//! Every other module in this crate reasons about pages; nothing so far
//! actually moves bytes the way a running process's loads and stores would,
//! demand-faulting and evicting exactly as the CPU's own page-walk would on
//! a real miss. `write_bytes` is also what makes a literal `memset` scenario
//! (spec.md's big-`malloc`-then-`memset` case) and the eviction-soundness
//! property ("the value read from a page equals the value last written to
//! it, regardless of any intervening evictions") things this crate can
//! actually exercise instead of merely asserting fault counts.
//!
//! Grounded on `maestro-os-maestro`'s `kernel/src/process/mem_space/mod.rs`
//! `copy_to_user`/`copy_from_user` helpers, which walk a multi-page range
//! one page at a time and fault each one in before touching it.

use crate::fault::{FaultKind, FaultOutcome};
use crate::malloc::arena::GrowSource;
use crate::memory::pte::PteState;
use crate::memory::{Frame, VirtAddr};
use crate::process::ProcessVm;
use crate::swap::SwapBackend;
use utils::errno::{self, EResult};

impl<B: SwapBackend, G: GrowSource> ProcessVm<B, G> {
	/// Ensures `page` is resident and returns its frame, demand-faulting (and
	/// evicting, if necessary) it in first if it isn't.
	///
	/// Sets the PTE's `ACCESSED` bit on every touch, the same bit a real MMU would
	/// set in hardware on every load/store -- this is what gives the SCFIFO policy's
	/// second-chance sweep anything to read.
	fn ensure_resident(&mut self, page: VirtAddr, kind: FaultKind) -> EResult<Frame> {
		if let Some(PteState::Resident { frame, writable }) = self.table.get(page).map(|p| p.state()) {
			if kind == FaultKind::Read || writable {
				if let Some(pte) = self.table.get_mut(page) {
					pte.mark_accessed();
				}
				return Ok(frame);
			}
		}
		match self.handle_page_fault(page, kind)? {
			FaultOutcome::Resolved => {}
			// A simulated user access that the kernel would kill the process over
			// surfaces here as a plain error -- there's no scheduler in this crate to
			// actually deliver the kill to.
			FaultOutcome::Kill(_) => return Err(errno::EFAULT),
		}
		if let Some(pte) = self.table.get_mut(page) {
			pte.mark_accessed();
		}
		match self.table.get(page).map(|p| p.state()) {
			Some(PteState::Resident { frame, .. }) => Ok(frame),
			_ => Err(errno::EFAULT),
		}
	}

	/// Writes `data` starting at `addr`, faulting in (and evicting for, if needed)
	/// every page the range touches, exactly as a real store would.
	pub fn write_bytes(&mut self, addr: VirtAddr, data: &[u8]) -> EResult<()> {
		let mut offset = 0;
		while offset < data.len() {
			let cur = addr + offset;
			let page = cur.page_down();
			let page_offset = cur.page_offset();
			let chunk_len = (crate::limits::PAGE_SIZE - page_offset).min(data.len() - offset);
			let frame = self.ensure_resident(page, FaultKind::Write)?;
			let mut buf = self.frames.read(frame);
			buf[page_offset..page_offset + chunk_len].copy_from_slice(&data[offset..offset + chunk_len]);
			self.frames.write(frame, &buf);
			offset += chunk_len;
		}
		Ok(())
	}

	/// Reads `out.len()` bytes starting at `addr`, faulting in every page the range
	/// touches that isn't already resident.
	pub fn read_bytes(&mut self, addr: VirtAddr, out: &mut [u8]) -> EResult<()> {
		let mut offset = 0;
		while offset < out.len() {
			let cur = addr + offset;
			let page = cur.page_down();
			let page_offset = cur.page_offset();
			let chunk_len = (crate::limits::PAGE_SIZE - page_offset).min(out.len() - offset);
			let frame = self.ensure_resident(page, FaultKind::Read)?;
			let buf = self.frames.read(frame);
			out[offset..offset + chunk_len].copy_from_slice(&buf[page_offset..page_offset + chunk_len]);
			offset += chunk_len;
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::limits::{MAX_RESIDENT_PAGES, PAGE_SIZE};
	use crate::malloc::arena::NullGrow;
	use crate::swap::MemBackend;

	fn new_vm() -> ProcessVm<MemBackend, NullGrow> {
		ProcessVm::new(MemBackend::new(MAX_RESIDENT_PAGES), NullGrow)
	}

	#[test]
	fn write_then_read_back_within_one_page() {
		let mut vm = new_vm();
		vm.growproc(1).unwrap();
		let addr = VirtAddr::of_page(0) + 10;
		vm.write_bytes(addr, &[1, 2, 3]).unwrap();
		let mut out = [0u8; 3];
		vm.read_bytes(addr, &mut out).unwrap();
		assert_eq!(out, [1, 2, 3]);
	}

	#[test]
	fn value_survives_an_intervening_eviction() {
		let mut vm = new_vm();
		vm.growproc(MAX_RESIDENT_PAGES).unwrap();
		let target = VirtAddr::of_page(0);
		vm.write_bytes(target, &[0x42]).unwrap();
		// Simulate enough time (or other accesses) passing for a prior scan to have
		// cleared the bit our own write just set, so the second-chance sweep below
		// picks `target` on its first pass rather than giving it another lap.
		vm.table.get_mut(target).unwrap().clear_accessed();

		// Force `target` out to swap by touching one more page than the resident cap
		// allows.
		vm.total_pages += 1;
		let extra = VirtAddr::of_page(MAX_RESIDENT_PAGES);
		vm.write_bytes(extra, &[0xff]).unwrap();
		assert!(matches!(vm.page_state(target), PteState::PagedOut { .. }));

		let mut out = [0u8; 1];
		vm.read_bytes(target, &mut out).unwrap();
		assert_eq!(out, [0x42]);
	}

	#[test]
	fn write_spanning_multiple_pages_lands_each_byte_correctly() {
		let mut vm = new_vm();
		vm.growproc(3).unwrap();
		let addr = VirtAddr::of_page(0) + (PAGE_SIZE - 2);
		let data = [1u8, 2, 3, 4];
		vm.write_bytes(addr, &data).unwrap();
		let mut out = [0u8; 4];
		vm.read_bytes(addr, &mut out).unwrap();
		assert_eq!(out, data);
	}

	#[test]
	fn writing_to_a_protected_page_surfaces_as_an_error() {
		let mut vm = new_vm();
		let page = vm.pmalloc().unwrap();
		vm.protect_page(page).unwrap();
		assert_eq!(vm.write_bytes(page, &[1]), Err(errno::EFAULT));
	}
}
