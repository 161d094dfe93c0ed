//! Shared IR support types for the Sable compiler.
//!
//! This crate holds the small, dependency-light types every compiler stage
//! needs:
//!
//! - [`Span`] — compact 8-byte source location.
//! - [`Name`] — 32-bit interned string identifier.
//! - [`StringInterner`] / [`SharedInterner`] — sharded, thread-safe interner
//!   backing [`Name`].
//!
//! Downstream crates (`sable_diagnostic`, `sable_verify`) depend on this
//! crate; it depends on nothing compiler-specific.

mod interner;
mod name;
mod span;

pub use interner::{InternError, SharedInterner, StringInterner};
pub use name::Name;
pub use span::{Span, SpanError};
