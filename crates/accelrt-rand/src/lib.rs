//! # accelrt Rand
//!
//! Random number generation for accelrt.
//!
//! - [`Philox`] - Counter-based Philox4x32-10 stream used by host-side generators
//! - [`RandomContext`] - A seeded device generator with odd-count normal padding
//! - [`LazyRandomContext`] - Process-wide, construct-once holder for the context

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod philox;
pub mod seed;

pub use context::{padded_normal_count, LazyRandomContext, RandomContext};
pub use philox::{Philox, PhiloxState};
pub use seed::entropy_seed;
