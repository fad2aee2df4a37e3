//! Kernel-style logging.
//!
//! Grounded on `maestro-os-maestro`'s `kernel/src/logger.rs`: a ring buffer of
//! recent log lines behind an [`IntMutex`], rather than a dependency on the
//! `log` crate facade (this crate has no registered logger to hand `log` —
//! the teacher's own console/TTY is out of scope here, as spelled out in
//! `spec.md` §1).

use core::fmt::{self, Write};
use utils::lock::IntMutex;

/// The size of the in-memory log buffer, in bytes.
const LOG_BUF_SIZE: usize = 16384;

/// The crate's logger instance.
pub static KLOG: IntMutex<KernelLog> = IntMutex::new(KernelLog::new());

/// A small ring buffer of log bytes, overwriting the oldest entries once full.
///
/// Unlike `maestro-os-maestro`'s `Logger`, this one never touches a VGA
/// buffer or TTY: callers needing the text (e.g. the observability dump in
/// [`crate::dump`]) drain it explicitly.
pub struct KernelLog {
	buf: [u8; LOG_BUF_SIZE],
	write_head: usize,
	len: usize,
}

impl KernelLog {
	/// Creates a new, empty log.
	#[allow(clippy::new_without_default)]
	pub const fn new() -> Self {
		Self {
			buf: [0; LOG_BUF_SIZE],
			write_head: 0,
			len: 0,
		}
	}

	/// Appends `s` to the ring buffer, wrapping around and overwriting the oldest bytes
	/// if it doesn't fit.
	pub fn write_str(&mut self, s: &str) {
		for &b in s.as_bytes() {
			self.buf[self.write_head] = b;
			self.write_head = (self.write_head + 1) % LOG_BUF_SIZE;
			self.len = (self.len + 1).min(LOG_BUF_SIZE);
		}
	}

	/// Copies the buffered log, oldest byte first, into `out`. Returns the number of
	/// bytes written.
	pub fn drain_into(&self, out: &mut [u8]) -> usize {
		let n = self.len.min(out.len());
		let start = (self.write_head + LOG_BUF_SIZE - self.len) % LOG_BUF_SIZE;
		for i in 0..n {
			out[i] = self.buf[(start + i) % LOG_BUF_SIZE];
		}
		n
	}
}

impl fmt::Write for KernelLog {
	fn write_str(&mut self, s: &str) -> fmt::Result {
		KernelLog::write_str(self, s);
		Ok(())
	}
}

/// Writes a formatted, `warn:`-prefixed line to the kernel log -- used at the handful
/// of call sites that log a recoverable-but-noteworthy condition (e.g. an eviction
/// sweep that comes up empty) rather than ordinary trace output.
#[macro_export]
macro_rules! kwarn {
	($($arg:tt)*) => {{
		let mut log = $crate::klog::KLOG.lock();
		let _ = ::core::write!(log, "warn: ");
		let _ = ::core::write!(log, $($arg)*);
		let _ = ::core::write!(log, "\n");
	}};
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn wraps_without_panicking() {
		let log = KernelLog::new();
		let mut l = log;
		for _ in 0..(LOG_BUF_SIZE / 4) {
			l.write_str("abcd");
		}
		let mut out = [0u8; LOG_BUF_SIZE];
		let n = l.drain_into(&mut out);
		assert_eq!(n, LOG_BUF_SIZE);
	}

	#[test]
	fn drains_in_order() {
		let mut l = KernelLog::new();
		l.write_str("hello");
		let mut out = [0u8; 5];
		let n = l.drain_into(&mut out);
		assert_eq!(&out[..n], b"hello");
	}
}
