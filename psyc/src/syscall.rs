//! Thin argument-validating wrappers over the allocator and protection entry points.
//!
//! `maestro-os-maestro`'s `macros/src/syscall.rs` generates the boilerplate
//! that decodes raw syscall arguments before handing them to a plain Rust
//! function; this crate has no raw-argument ABI to decode (the trap
//! dispatcher that would own that is out of scope), so this module plays
//! only the second half of that role: validating preconditions the way a
//! syscall entry point would, before delegating to [`crate::process::ProcessVm`].

use crate::malloc::arena::GrowSource;
use crate::memory::pte::PteFlags;
use crate::memory::VirtAddr;
use crate::process::ProcessVm;
use crate::swap::SwapBackend;
use utils::errno::{self, EResult};

impl<B: SwapBackend, G: GrowSource> ProcessVm<B, G> {
	/// `light_page_flags(user_va, flag_mask)`: sets the given bits (spec.md §6). `1` on
	/// success, `-1` on a misaligned address or a PTE that doesn't exist.
	pub fn sys_light_page_flags(&mut self, addr: VirtAddr, mask: PteFlags) -> i32 {
		if !addr.is_page_aligned() {
			return -1;
		}
		match self.mark_flags(addr, mask) {
			Ok(()) => 1,
			Err(_) => -1,
		}
	}

	/// `check_page_flags(user_va, flag_mask)`: a non-mutating read, returning the masked
	/// bits (or `-1` for a misaligned address or nonexistent PTE).
	pub fn sys_check_page_flags(&self, addr: VirtAddr, mask: PteFlags) -> i32 {
		if !addr.is_page_aligned() {
			return -1;
		}
		match self.check_flags(addr, mask) {
			Ok(bits) => bits.bits() as i32,
			Err(_) => -1,
		}
	}

	/// `turn_off_page_flags(user_va, flag_mask)`: clears the given bits. `1` on success,
	/// `-1` on a misaligned address or a PTE that doesn't exist.
	pub fn sys_turn_off_page_flags(&mut self, addr: VirtAddr, mask: PteFlags) -> i32 {
		if !addr.is_page_aligned() {
			return -1;
		}
		match self.clear_flags(addr, mask) {
			Ok(()) => 1,
			Err(_) => -1,
		}
	}

	/// Performs a page-granular allocation.
	///
	/// There's no caller-supplied size or address to validate here --
	/// `pmalloc` always hands out exactly one page -- so this exists mainly
	/// to keep the three entry points at the same layer for callers.
	pub fn sys_pmalloc(&mut self) -> EResult<VirtAddr> {
		self.pmalloc()
	}

	/// Validates and applies write-protection to a pmalloc'd page.
	///
	/// `addr` must be page-aligned; a misaligned address is a caller bug,
	/// reported as `EINVAL` rather than silently rounded, since rounding
	/// would protect a page the caller didn't name.
	pub fn sys_protect_page(&mut self, addr: VirtAddr) -> EResult<()> {
		if !addr.is_page_aligned() {
			return Err(errno::EINVAL);
		}
		self.protect_page(addr)
	}

	/// Validates and releases a pmalloc'd page back to the allocator.
	pub fn sys_pfree(&mut self, addr: VirtAddr) -> EResult<()> {
		if !addr.is_page_aligned() {
			return Err(errno::EINVAL);
		}
		self.pfree(addr)
	}

	/// `malloc(nbytes)`: the general-purpose, byte-granular allocation (spec.md §6).
	///
	/// There's no alignment precondition to check here the way `pmalloc`/`pfree`
	/// have one -- any `nbytes` is a valid request; `ProcessVm::malloc` itself
	/// rejects the one caller-bug case (`nbytes == 0`).
	pub fn sys_malloc(&mut self, nbytes: usize) -> EResult<VirtAddr> {
		self.malloc(nbytes)
	}

	/// `free(p)`: the symmetric release of a `malloc`'d range.
	pub fn sys_free(&mut self, addr: VirtAddr) -> EResult<()> {
		self.free(addr)
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
	fn protect_rejects_misaligned_address() {
		let mut vm = new_vm();
		assert_eq!(vm.sys_protect_page(VirtAddr(1)), Err(errno::EINVAL));
	}

	#[test]
	fn generic_flag_syscalls_round_trip() {
		use crate::memory::pte::{Pte, PteFlags};

		let mut vm = new_vm();
		let page = VirtAddr::of_page(0);
		let frame = vm.frames.alloc_frame().unwrap();
		vm.table.set(page, Pte::resident(frame, true, true, false));

		assert_eq!(vm.sys_turn_off_page_flags(page, PteFlags::WRITABLE), 1);
		assert_eq!(vm.sys_check_page_flags(page, PteFlags::WRITABLE), 0);
		assert_eq!(vm.sys_light_page_flags(page, PteFlags::WRITABLE), 1);
		assert_eq!(vm.sys_check_page_flags(page, PteFlags::WRITABLE), PteFlags::WRITABLE.bits() as i32);
	}

	#[test]
	fn generic_flag_syscalls_reject_misaligned_address() {
		use crate::memory::pte::PteFlags;

		let mut vm = new_vm();
		assert_eq!(vm.sys_light_page_flags(VirtAddr(1), PteFlags::WRITABLE), -1);
		assert_eq!(vm.sys_check_page_flags(VirtAddr(1), PteFlags::WRITABLE), -1);
		assert_eq!(vm.sys_turn_off_page_flags(VirtAddr(1), PteFlags::WRITABLE), -1);
	}

	#[test]
	fn malloc_and_free_round_trip() {
		let mut vm = new_vm();
		let a = vm.sys_malloc(64).unwrap();
		vm.sys_free(a).unwrap();
		let b = vm.sys_malloc(64).unwrap();
		assert_eq!(a, b);
	}

	#[test]
	fn free_rejects_an_address_malloc_never_returned() {
		let mut vm = new_vm();
		assert_eq!(vm.sys_free(VirtAddr(4096)), Err(errno::EINVAL));
	}
}
