//! `psyc` is the per-process virtual memory core of a teaching kernel: demand
//! paging to a per-process swap file, and the page-granular user allocator
//! (`pmalloc`/`protect_page`/`pfree`) that rides on top of it.
//!
//! This crate is deliberately narrow. It owns the page-fault/swap engine,
//! the page-table bookkeeping, and the user-level allocator; it treats the
//! scheduler, the process table, the file-system driver, the trap
//! dispatcher, and the physical frame pool's ultimate backing memory as
//! external collaborators reached through a handful of trait boundaries
//! (see [`swap::SwapBackend`], [`malloc::arena::GrowSource`]).

#![no_std]

extern crate alloc;

pub mod access;
pub mod config;
pub mod dump;
pub mod fault;
pub mod klog;
pub mod limits;
pub mod malloc;
pub mod memory;
pub mod process;
pub mod protect;
pub mod replacement;
pub mod swap;
pub mod syscall;

pub use limits::PAGE_SIZE;
