//! Build-time configuration.
//!
//! Mirrors the shape of `maestro-os-maestro`'s `kernel/src/config.rs`: a
//! small module whose job is to turn Cargo features into one concrete
//! constant the rest of the crate reads, keeping the `#[cfg(feature = ...)]`
//! blast radius to this one file. The value itself is an ordinary
//! [`crate::replacement::Policy`] enum, not a set of differently-compiled
//! code paths -- see that module's docs for why.

use crate::replacement::Policy;

/// At most one of `lifo`/`scfifo`/`none` should be enabled; if more than one
/// is (e.g. a workspace-level feature union), precedence here matches the
/// order spec.md lists them, with `scfifo` -- the crate's default -- as the
/// final fallback.
pub const fn active_policy() -> Policy {
	if cfg!(feature = "lifo") {
		Policy::Lifo
	} else if cfg!(feature = "none") {
		Policy::None
	} else {
		Policy::Scfifo
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn default_build_is_scfifo() {
		// With no feature flags flipped in the test profile beyond the crate
		// default, scfifo is expected.
		assert_eq!(active_policy(), Policy::Scfifo);
	}
}
