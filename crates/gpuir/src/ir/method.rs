//! `MethodHandle` — a stable, serializable name for a method declaration.

use std::fmt;

use crate::context::CompilationContext;
use crate::error::{IrError, IrResult, Location};
use crate::types::TypeId;

use cranelift_entity::PrimaryMap;

use super::block::BasicBlock;
use super::entities::BlockId;
use super::value::ValueRef;

/// A tiny bitflags stand-in: there is exactly one flags struct here and
/// pulling in the `bitflags` crate for it would be a dependency for two
/// constants.
macro_rules! bitflags_like_flags {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $(const $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
        pub struct $name($repr);

        impl $name {
            $(pub const $flag: $name = $name($value);)*

            pub const fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn union(self, other: $name) -> $name {
                $name(self.0 | other.0)
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                self.union(rhs)
            }
        }
    };
}

/// `MethodHandle{id, name}`; empty iff `id < 1 || name.is_empty()`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodHandle {
    id: i64,
    name: String,
}

impl MethodHandle {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub const fn empty() -> Self {
        Self {
            id: 0,
            name: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id < 1 || self.name.is_empty()
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Serializes as `"<name>/<id>"`; the empty handle serializes as
    /// `<Empty>`.
    pub fn serialize(&self) -> String {
        if self.is_empty() {
            "<Empty>".to_string()
        } else {
            format!("{}/{}", self.name, self.id)
        }
    }

    /// Inverse of [`MethodHandle::serialize`] for non-empty handles.
    pub fn deserialize(s: &str) -> IrResult<Self> {
        if s == "<Empty>" {
            return Ok(Self::empty());
        }
        let (name, id_str) = s.rsplit_once('/').ok_or_else(|| {
            IrError::ArgumentOutOfRange {
                location: Location::unknown(),
                key: "InvalidMethodHandleFormat",
                detail: format!("expected \"<name>/<id>\", found {s:?}"),
            }
        })?;
        let id: i64 = id_str.parse().map_err(|_| IrError::ArgumentOutOfRange {
            location: Location::unknown(),
            key: "InvalidMethodHandleFormat",
            detail: format!("non-numeric id in {s:?}"),
        })?;
        if name.is_empty() || id < 1 {
            return Err(IrError::ArgumentOutOfRange {
                location: Location::unknown(),
                key: "InvalidMethodHandleFormat",
                detail: format!("{s:?} does not round-trip to a non-empty handle"),
            });
        }
        Ok(Self::new(id, name))
    }
}

impl fmt::Display for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}

bitflags_like_flags! {
    /// Marker bits seeded from the frontend's `MethodBase`:
    /// `AggressiveInlining`/`NoInlining`.
    pub struct MethodFlags: u8 {
        const NONE = 0;
        const AGGRESSIVE_INLINING = 1 << 0;
        const NO_INLINING = 1 << 1;
    }
}

#[derive(Clone, Debug)]
pub struct Declaration {
    pub handle: MethodHandle,
    pub return_type: TypeId,
    pub flags: MethodFlags,
}

/// An ordered collection of blocks with an entry block, parameter list,
/// and declaration. Produced by
/// [`super::method_builder::MethodBuilder::dispose`].
#[derive(Clone, Debug)]
pub struct Method {
    pub declaration: Declaration,
    pub entry_block: BlockId,
    pub parameters: Vec<super::entities::ValueId>,
    /// Reverse-post-order block list, valid only after disposal.
    pub blocks: Vec<BlockId>,
    /// Per-block instruction lists and predecessor links, keyed the same
    /// way as `blocks` lists them.
    pub block_data: PrimaryMap<BlockId, BasicBlock>,
}

impl Method {
    pub fn return_type(&self) -> TypeId {
        self.declaration.return_type
    }

    /// Textual rendering of every block and value, in reverse
    /// post-order: one line per value giving its id, type, kind, and
    /// operand ids. Format is for human/diagnostic consumption, not a
    /// parseable wire form.
    pub fn dump(&self, ctx: &CompilationContext, w: &mut impl fmt::Write) -> fmt::Result {
        writeln!(w, "method {} -> {:?}", self.declaration.handle, self.declaration.return_type)?;
        for &block_id in &self.blocks {
            let block = &self.block_data[block_id];
            writeln!(w, "{block_id:?}: preds={:?}", block.preds())?;
            for &value_id in block.values() {
                let v = ValueRef::from_resolved(value_id);
                let ty = ctx.values.type_of(v);
                let kind = ctx.values.kind_of(v);
                writeln!(w, "    {value_id:?} {ty:?} = {kind:?}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_round_trips() {
        let h = MethodHandle::new(42, "kernel_main");
        assert_eq!(MethodHandle::deserialize(&h.serialize()).unwrap(), h);
    }

    #[test]
    fn empty_handle_prints_sentinel() {
        assert_eq!(MethodHandle::empty().serialize(), "<Empty>");
        assert_eq!(MethodHandle::deserialize("<Empty>").unwrap(), MethodHandle::empty());
    }

    #[test]
    fn empty_iff_bad_id_or_name() {
        assert!(MethodHandle::new(0, "x").is_empty());
        assert!(MethodHandle::new(1, "").is_empty());
        assert!(!MethodHandle::new(1, "x").is_empty());
    }

    #[test]
    fn flags_union_and_contains() {
        let f = MethodFlags::AGGRESSIVE_INLINING | MethodFlags::NO_INLINING;
        assert!(f.contains(MethodFlags::AGGRESSIVE_INLINING));
        assert!(!MethodFlags::NONE.contains(MethodFlags::AGGRESSIVE_INLINING));
    }
}
