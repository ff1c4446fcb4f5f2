//! Small, IR-agnostic leaf utilities shared by the `gpuir` core.
//!
//! Kept as its own crate so the core's `Cargo.toml` can depend on a tiny,
//! rarely-rebuilt leaf rather than inlining bit-twiddling and scoped-guard
//! code into the main crate.

pub mod bits;
pub mod pin;
