//! Mutual exclusion primitive used for the crate's process-wide singletons
//! (frame allocator, kernel log).
//!
//! `maestro-os-maestro` names this `sync::spin::Spin` / `sync::mutex::IntMutex`
//! and implements its own spinlock to control interrupt state around the
//! critical section. This workspace has no interrupt controller of its own
//! to drive (that lives in the trap dispatcher, out of scope per the spec),
//! so `IntMutex` here is a thin, identically-named wrapper around
//! [`spin::Mutex`]: the name documents the intent ("held with interrupts
//! disabled on the real kernel this links into") without reimplementing
//! `cli`/`sti`.

use core::ops::{Deref, DerefMut};

/// A mutex intended to be held only for short, non-blocking critical sections,
/// the way `maestro-os-maestro` uses `IntMutex` for the buddy allocator zones
/// and the kernel logger.
pub struct IntMutex<T: ?Sized>(spin::Mutex<T>);

impl<T> IntMutex<T> {
	/// Creates a new mutex wrapping `data`.
	pub const fn new(data: T) -> Self {
		Self(spin::Mutex::new(data))
	}
}

impl<T: ?Sized> IntMutex<T> {
	/// Locks the mutex, spinning until it becomes available.
	pub fn lock(&self) -> IntMutexGuard<'_, T> {
		IntMutexGuard(self.0.lock())
	}
}

/// RAII guard for [`IntMutex`].
pub struct IntMutexGuard<'a, T: ?Sized>(spin::MutexGuard<'a, T>);

impl<T: ?Sized> Deref for IntMutexGuard<'_, T> {
	type Target = T;

	fn deref(&self) -> &T {
		&self.0
	}
}

impl<T: ?Sized> DerefMut for IntMutexGuard<'_, T> {
	fn deref_mut(&mut self) -> &mut T {
		&mut self.0
	}
}
