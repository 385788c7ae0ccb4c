//! mp-core: Shared types and numeric primitives for Masterprint
//!
//! This crate provides the foundational pieces used by the fingerprint and
//! mastering crates:
//!
//! - [`AudioBuffer`]: validated planar PCM with a fixed sample rate
//! - [`numeric`]: guarded division, logarithms, powers, aggregation and
//!   normalization that never emit NaN or infinity
//! - [`loudness`]: ITU-R BS.1770 K-weighted loudness with gated integration

mod buffer;
mod error;
pub mod loudness;
pub mod numeric;

pub use buffer::*;
pub use error::*;
