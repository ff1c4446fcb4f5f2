//! Opaque entity handles into the arenas owned by a compilation context.
//!
//! Each is a `u32`-backed newtype via `cranelift_entity::entity_impl!`,
//! the same handle style `mu_ir::ir::entities` uses for `Value`/`Block`/
//! `Inst`.

use cranelift_entity::entity_impl;

/// An opaque reference to an SSA value.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(u32);
entity_impl!(ValueId, "v");

/// An opaque reference to a basic block.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);
entity_impl!(BlockId, "block");

/// An opaque reference to a method within a compilation context.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(u32);
entity_impl!(MethodId, "method");
