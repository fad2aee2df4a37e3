//! Process memory observability.
//!
//! `maestro-os-maestro`'s `kernel/src/process/mem_space/mod.rs` exposes a
//! `Debug` impl that walks the page table for diagnostics printed to the
//! kernel console; this crate has no console of its own (out of scope per
//! the spec), so [`ProcessVm::dump`] instead writes to any
//! [`core::fmt::Write`] sink the caller provides -- the kernel log
//! ([`crate::klog::KernelLog`]) being the obvious one, but tests can just as
//! well hand it a `String` or `alloc::string::String`-backed writer.

use crate::malloc::arena::GrowSource;
use crate::memory::pte::PteState;
use crate::process::ProcessVm;
use crate::swap::SwapBackend;
use core::fmt::{self, Write};

impl<B: SwapBackend, G: GrowSource> ProcessVm<B, G> {
	/// Writes a human-readable summary of this address space's page table and
	/// fault/eviction counters to `out`.
	///
	/// Prints the subset of spec.md §6's process-dump line this crate actually
	/// owns (`total_size`, `paged_out_pages`, `protected_pages`, `page_faults`,
	/// `total_paged_out`); `pid`/`state`/`name` and the system-wide free-page
	/// count belong to the process table and frame-pool *singletons* (external
	/// collaborators per §1), so a caller wanting the full line prefixes/
	/// appends those fields itself around this one.
	pub fn dump(&self, out: &mut impl Write) -> fmt::Result {
		let paged_out_pages = self
			.table
			.iter()
			.filter(|(_, pte)| matches!(pte.state(), PteState::PagedOut { .. }))
			.count();
		writeln!(
			out,
			"vm: total_size={} resident={} paged_out_pages={} protected_pages={} page_faults={} total_paged_out={}",
			self.total_pages * crate::limits::PAGE_SIZE,
			self.resident_count(),
			paged_out_pages,
			self.protected_count(),
			self.fault_count,
			self.paged_out_total,
		)?;
		for (index, pte) in self.table.iter() {
			match pte.state() {
				PteState::Resident { frame, writable } => {
					writeln!(
						out,
						"  page {index}: resident frame={frame} {}{}",
						if writable { "rw" } else { "ro" },
						if pte.is_pmalloced() { " pmalloc" } else { "" },
					)?;
				}
				PteState::PagedOut { slot } => {
					writeln!(out, "  page {index}: paged out, slot={}", slot.0)?;
				}
				PteState::Unmapped => {}
			}
		}
		Ok(())
	}
}
