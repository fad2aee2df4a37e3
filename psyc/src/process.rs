//! The per-process virtual memory space.
//!
//! [`ProcessVm`] is the aggregate root the rest of the crate operates on,
//! playing the role `maestro-os-maestro`'s `kernel/src/process/mem_space::MemSpace`
//! plays for the real kernel: one instance per process, owning its page
//! table, its frame accounting, and (here) its swap file and user-allocator
//! arena. `growproc`/`fork`/teardown mirror `MemSpace::fork`/`MemSpace::exit`.

use crate::config;
use crate::limits::{MAX_RESIDENT_PAGES, MAX_TOTAL_PAGES, PAGE_SIZE};
use crate::malloc::arena::{Arena, GrowSource};
use crate::malloc::heap::Heap;
use crate::memory::frame::FrameAllocator;
use crate::memory::pte::{Pte, PteState};
use crate::memory::table::PageTable;
use crate::memory::VirtAddr;
use crate::replacement::{Policy, ResidentQueue};
use crate::swap::{MemBackend, SwapBackend, SwapFile};
use utils::errno::{self, EResult};

/// A process's virtual memory space: page table, physical frames, swap file, and the
/// `pmalloc`/`malloc` arena that allocates out of it.
pub struct ProcessVm<B: SwapBackend = MemBackend, G: GrowSource = crate::malloc::arena::NullGrow> {
	pub(crate) table: PageTable,
	pub(crate) frames: FrameAllocator,
	pub(crate) swap: SwapFile<B>,
	pub(crate) resident: ResidentQueue,
	pub(crate) policy: Policy,
	pub(crate) arena: Arena<G>,
	/// Byte-granular free-list bookkeeping for the general-purpose `malloc`/`free`,
	/// carved out of the same `growproc` region the arena's pages are disjoint from.
	pub(crate) heap: Heap,
	/// Total pages the image has ever spanned (resident + paged-out), the quantity
	/// `growproc` checks against [`MAX_TOTAL_PAGES`].
	pub(crate) total_pages: usize,
	pub fault_count: usize,
	pub paged_out_total: usize,
}

impl<B: SwapBackend, G: GrowSource> ProcessVm<B, G> {
	/// Creates a fresh, empty address space backed by `swap_backend` and growable
	/// through `grow_source`.
	pub fn new(swap_backend: B, grow_source: G) -> Self {
		Self {
			table: PageTable::new(),
			frames: FrameAllocator::new(MAX_RESIDENT_PAGES),
			swap: SwapFile::new(swap_backend, MAX_RESIDENT_PAGES),
			resident: ResidentQueue::new(),
			policy: config::active_policy(),
			arena: Arena::new(grow_source),
			heap: Heap::new(),
			total_pages: 0,
			fault_count: 0,
			paged_out_total: 0,
		}
	}

	/// Grows the process's virtual image by `additional_pages` pages.
	///
	/// Every new page is mapped eagerly: zeroed, made resident and enqueued, evicting
	/// a victim to swap first if the resident set is already at its cap -- `growproc`
	/// never leaves a page in the image neither `PRESENT` nor `PAGED_OUT`. Grounded on
	/// `original_source/vm.c`'s `allocuvm`, which `kalloc`s and `mappages` every new
	/// page and calls `swap_page` on a victim once the resident table is full, rather
	/// than deferring the mapping to the first fault.
	///
	/// If acquiring a frame for some page partway through fails (no free frame and
	/// nothing evictable, e.g. under the `none` policy), every page this call had
	/// already mapped is unwound before the error is returned, so a failed `growproc`
	/// never leaves the image larger than it was on entry.
	///
	/// Mirrors `MemSpace::map`'s bookkeeping, simplified to whole pages only.
	pub fn growproc(&mut self, additional_pages: usize) -> EResult<VirtAddr> {
		// Deliberately `self.total_pages`, not `self.table.capacity_pages()`: the
		// flat table is shared with the disjoint `pmalloc` region starting at
		// `PMALLOC_REGION_BASE`, so once any page has been `pmalloc`'d the
		// table's capacity can already exceed this process's heap size. Keying
		// off our own tracked size keeps the two regions from colliding.
		let start_page = self.total_pages;
		if self.total_pages + additional_pages > MAX_TOTAL_PAGES {
			return Err(errno::ENOMEM);
		}
		for i in 0..additional_pages {
			let page = VirtAddr::of_page(start_page + i);
			let frame = match self.acquire_frame() {
				Ok(frame) => frame,
				Err(e) => {
					self.unmap_range(start_page, start_page + i);
					return Err(e);
				}
			};
			self.table.set(page, Pte::resident(frame, true, true, false));
			self.resident.push(page);
		}
		self.total_pages += additional_pages;
		Ok(VirtAddr::of_page(start_page))
	}

	/// Shrinks the process's virtual image by `removed_pages` pages, freeing every
	/// frame or swap slot backing the pages removed from the top of the image down.
	///
	/// The negative-`delta` half of spec.md's `growproc`: walks
	/// `PAGE_UP(new_size)..PAGE_UP(old_size)` freeing each page's frame (if resident)
	/// or swap slot (if paged-out) and dropping it from the resident queue, mirroring
	/// `MemSpace::unmap`'s per-page teardown for a shrinking region.
	pub fn shrinkproc(&mut self, removed_pages: usize) -> EResult<()> {
		if removed_pages > self.total_pages {
			return Err(errno::EINVAL);
		}
		let new_total = self.total_pages - removed_pages;
		self.unmap_range(new_total, self.total_pages);
		self.total_pages = new_total;
		Ok(())
	}

	/// Frees every frame or swap slot backing pages `[from, to)` and clears their
	/// PTEs, without touching `self.total_pages` -- the per-page teardown shared by
	/// `shrinkproc` and `growproc`'s unwind-on-failure path.
	fn unmap_range(&mut self, from: usize, to: usize) {
		for i in from..to {
			let page = VirtAddr::of_page(i);
			if let Some(pte) = self.table.get(page).copied() {
				match pte.state() {
					PteState::Resident { frame, .. } => {
						self.frames.free_frame(frame);
						self.resident.remove(page);
					}
					PteState::PagedOut { slot } => {
						self.swap.free_slot(slot);
					}
					PteState::Unmapped => {}
				}
				self.table.set(page, Pte::unmapped());
			}
		}
	}

	/// Tears down the address space: every resident frame and swap slot is released.
	///
	/// Mirrors `MemSpace::exit`/`Drop for MemSpace`.
	pub fn teardown(&mut self) {
		for (index, pte) in self.table.iter() {
			match pte.state() {
				PteState::Resident { frame, .. } => self.frames.free_frame(frame),
				PteState::PagedOut { slot } => self.swap.free_slot(slot),
				PteState::Unmapped => {}
			}
			let _ = index;
		}
	}

	/// The number of pages currently backed by RAM.
	pub fn resident_count(&self) -> usize {
		self.resident.len()
	}

	/// The total number of pages this image currently spans (resident + paged-out).
	pub fn total_pages(&self) -> usize {
		self.total_pages
	}

	/// The current classification of the page containing `addr`.
	pub fn page_state(&self, addr: VirtAddr) -> PteState {
		self.table
			.get(addr.page_down())
			.copied()
			.unwrap_or_default()
			.state()
	}
}

impl<G: GrowSource> ProcessVm<MemBackend, G> {
	/// Forks this address space: an independent swap file, and every resident or
	/// paged-out page copied without being forced resident.
	///
	/// Per the design notes, copying a paged-out page means copying the swap
	/// slot's bytes directly into the child's own slot -- never faulting it
	/// back into RAM first just to duplicate it.
	pub fn fork(&self, grow_source: G) -> EResult<Self> {
		let mut child = ProcessVm::new(MemBackend::new(MAX_RESIDENT_PAGES), grow_source);
		child.total_pages = self.total_pages;
		for (index, pte) in self.table.iter() {
			let page = VirtAddr::of_page(index);
			match pte.state() {
				PteState::Resident { frame, writable } => {
					let child_frame = child.frames.alloc_frame()?;
					let data = self.frames.read(frame);
					child.frames.write(child_frame, &data);
					child
						.table
						.set(page, Pte::resident(child_frame, writable, true, pte.is_pmalloced()));
					child.resident.push(page);
				}
				PteState::PagedOut { slot } => {
					let mut data = [0u8; PAGE_SIZE];
					self.swap.read_slot(slot, &mut data)?;
					let child_slot = child.swap.allocate_slot()?;
					child.swap.write_slot(child_slot, &data)?;
					child
						.table
						.set(page, Pte::paged_out(child_slot, pte.is_writable(), true, pte.is_pmalloced()));
				}
				PteState::Unmapped => {}
			}
		}
		Ok(child)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::malloc::arena::NullGrow;

	fn new_vm() -> ProcessVm<MemBackend, NullGrow> {
		ProcessVm::new(MemBackend::new(MAX_RESIDENT_PAGES), NullGrow)
	}

	#[test]
	fn growproc_maps_up_to_resident_cap() {
		let mut vm = new_vm();
		vm.growproc(MAX_RESIDENT_PAGES + 2).unwrap();
		assert_eq!(vm.resident_count(), MAX_RESIDENT_PAGES);
		assert_eq!(vm.total_pages, MAX_RESIDENT_PAGES + 2);
	}

	#[test]
	fn growproc_rejects_over_cap() {
		let mut vm = new_vm();
		assert_eq!(vm.growproc(MAX_TOTAL_PAGES + 1), Err(errno::ENOMEM));
	}

	#[test]
	fn growproc_unwinds_every_page_it_mapped_when_a_later_page_cannot_be_acquired() {
		let mut vm = new_vm();
		// Paging disabled: once the resident set is full there is no evictable
		// victim, so growing past the cap must fail outright rather than map
		// part of the request.
		vm.policy = Policy::None;
		let result = vm.growproc(MAX_RESIDENT_PAGES + 1);
		assert_eq!(result, Err(errno::ENOMEM));
		assert_eq!(vm.total_pages, 0);
		assert_eq!(vm.resident_count(), 0);
		assert_eq!(vm.frames.allocated_count(), 0);
	}

	#[test]
	fn teardown_frees_everything() {
		let mut vm = new_vm();
		vm.growproc(3).unwrap();
		vm.teardown();
		assert_eq!(vm.frames.allocated_count(), 0);
	}

	#[test]
	fn shrinkproc_frees_resident_frames_and_shrinks_total_size() {
		let mut vm = new_vm();
		vm.growproc(3).unwrap();
		let before = vm.frames.allocated_count();
		vm.shrinkproc(2).unwrap();
		assert_eq!(vm.total_pages, 1);
		assert_eq!(vm.frames.allocated_count(), before - 2);
		assert!(matches!(vm.page_state(VirtAddr::of_page(1)), PteState::Unmapped));
		assert!(matches!(vm.page_state(VirtAddr::of_page(0)), PteState::Resident { .. }));
	}

	#[test]
	fn shrinkproc_frees_paged_out_slots_too() {
		let mut vm = new_vm();
		// One page past the resident cap forces growproc itself to evict a
		// victim to swap, since every new page is mapped eagerly.
		vm.growproc(MAX_RESIDENT_PAGES + 1).unwrap();
		assert!(vm.paged_out_total >= 1);
		vm.shrinkproc(vm.total_pages).unwrap();
		assert_eq!(vm.total_pages, 0);
		assert_eq!(vm.resident_count(), 0);
		assert_eq!(vm.swap.used_slots(), 0);
	}

	#[test]
	fn shrinkproc_rejects_removing_more_than_total() {
		let mut vm = new_vm();
		vm.growproc(1).unwrap();
		assert_eq!(vm.shrinkproc(2), Err(errno::EINVAL));
	}

	#[test]
	fn growproc_after_pmalloc_does_not_collide_with_the_pmalloc_region() {
		use crate::malloc::arena::VecGrow;

		let mut vm = ProcessVm::new(MemBackend::new(MAX_RESIDENT_PAGES), VecGrow::new());
		// Pushes the shared flat table's capacity out to `PMALLOC_REGION_BASE + 1`,
		// well past this process's (still empty) heap.
		let pmalloc_page = vm.pmalloc().unwrap();

		let heap_start = vm.growproc(1).unwrap();
		assert_eq!(heap_start, VirtAddr::of_page(0));
		assert_ne!(heap_start, pmalloc_page);
		assert!(matches!(vm.page_state(VirtAddr::of_page(0)), PteState::Resident { .. }));
	}
}
