//! The user-space allocators: the page-granular `pmalloc`/`pfree` and the
//! general-purpose, byte-granular `malloc`/`free`.
//!
//! `pmalloc` hands out (or reclaims) exactly one page, mapped resident and
//! marked `PMALLOCED` so [`crate::replacement`] never picks it as an
//! eviction victim and [`crate::protect`] will accept it as a
//! `protect_page` target. Address-range bookkeeping is delegated to
//! [`arena::Arena`]; the actual frame and page-table work mirrors
//! `growproc` in [`crate::process`].
//!
//! `malloc`/`free` serve ordinary byte-sized requests out of [`heap::Heap`],
//! growing the process's image via `growproc` itself rather than through a
//! separate pinned-frame path -- unlike a `pmalloc`'d page, a `malloc`'d
//! range is ordinary demand-paged memory, evictable like any other.

pub mod arena;
pub mod chunk;
pub mod heap;

use crate::limits::{MALLOC_SBRK_INCREMENT, PAGE_SIZE};
use crate::malloc::arena::GrowSource;
use crate::memory::pte::{Pte, PteState};
use crate::memory::VirtAddr;
use crate::process::ProcessVm;
use crate::swap::SwapBackend;
use utils::errno::{self, EResult};

impl<B: SwapBackend, G: GrowSource> ProcessVm<B, G> {
	/// Hands out one page, writable and pinned against eviction.
	///
	/// `OutOfFrames` (the resident set is full and nothing evictable remains,
	/// e.g. under the `none` policy) and the arena being unable to grow both
	/// surface as `Err(ENOMEM)`.
	pub fn pmalloc(&mut self) -> EResult<VirtAddr> {
		let arena_index = self.arena.alloc_page(crate::limits::MALLOC_SBRK_INCREMENT)?;
		let addr = VirtAddr::of_page(crate::limits::PMALLOC_REGION_BASE + arena_index);
		let frame = self.acquire_frame_for_pmalloc()?;
		self.table.set(addr, Pte::resident(frame, true, true, true));
		self.resident.push(addr);
		Ok(addr)
	}

	/// Releases a page previously returned by [`Self::pmalloc`].
	///
	/// Returns `Err(EINVAL)` for an address that isn't a live `pmalloc`'d
	/// page -- calling `pfree` twice, or on an address `pmalloc` never
	/// returned, is API misuse rather than a resource condition.
	pub fn pfree(&mut self, addr: VirtAddr) -> EResult<()> {
		let page = addr.page_down();
		let pte = self.table.get(page).copied().ok_or(errno::EINVAL)?;
		if !pte.is_pmalloced() {
			return Err(errno::EINVAL);
		}
		if let PteState::Resident { frame, .. } = pte.state() {
			self.frames.free_frame(frame);
			self.resident.remove(page);
		}
		self.table.set(page, Pte::unmapped());
		self.arena.free_page(page.page_index() - crate::limits::PMALLOC_REGION_BASE);
		Ok(())
	}

	/// Hands out `nbytes` of heap memory, growing the process's image via `growproc`
	/// (in whole pages, at least [`MALLOC_SBRK_INCREMENT`] bytes at a time) when the
	/// existing free list can't satisfy the request.
	///
	/// Unlike `pmalloc`, the returned range isn't pinned against eviction or marked
	/// `PMALLOCED`; it's ordinary demand-paged heap, indistinguishable from any other
	/// page `growproc` mapped.
	pub fn malloc(&mut self, nbytes: usize) -> EResult<VirtAddr> {
		if nbytes == 0 {
			return Err(errno::EINVAL);
		}
		if let Some(start) = self.heap.try_alloc(nbytes) {
			return Ok(VirtAddr(start));
		}
		let grow_bytes = nbytes.max(MALLOC_SBRK_INCREMENT);
		let grow_pages = (grow_bytes + PAGE_SIZE - 1) / PAGE_SIZE;
		self.growproc(grow_pages)?;
		self.heap.grow_to(self.total_pages * PAGE_SIZE);
		self.heap.try_alloc(nbytes).ok_or(errno::ENOMEM)
	}

	/// Releases a range previously returned by [`Self::malloc`].
	///
	/// `EINVAL` for an address `malloc` never returned, or one already freed --
	/// the same "API misuse, not a resource condition" treatment [`Self::pfree`]
	/// gives a bad `pmalloc` address.
	pub fn free(&mut self, addr: VirtAddr) -> EResult<()> {
		self.heap.free(addr.0).map(|_| ()).ok_or(errno::EINVAL)
	}

	/// Acquires a frame for a new `pmalloc`'d page, evicting a victim first if the
	/// resident set is already full.
	///
	/// A `pmalloc`'d page is never itself eligible to be the victim here --
	/// it doesn't exist in the table yet at the point this runs.
	fn acquire_frame_for_pmalloc(&mut self) -> EResult<crate::memory::Frame> {
		match self.frames.alloc_frame() {
			Ok(frame) => Ok(frame),
			Err(_) => self.evict_for_pmalloc(),
		}
	}

	fn evict_for_pmalloc(&mut self) -> EResult<crate::memory::Frame> {
		let table = &self.table;
		let mut to_clear = alloc::vec::Vec::new();
		let victim = self.resident.choose_victim(
			self.policy,
			|p| table.get(p).map(|e| e.is_accessed()).unwrap_or(false),
			|p| to_clear.push(p),
			|p| table.get(p).map(|e| e.is_pmalloced()).unwrap_or(false),
		);
		for p in to_clear {
			if let Some(pte) = self.table.get_mut(p) {
				pte.clear_accessed();
			}
		}
		let victim = match victim {
			Some(v) => v,
			None => {
				crate::kwarn!("evict_for_pmalloc: no evictable victim (resident set fully pinned)");
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
			return self.frames.alloc_frame();
		}
		Err(errno::ENOMEM)
	}
}
