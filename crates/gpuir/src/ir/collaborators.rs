//! Values the core consumes from its frontend collaborators, rather than
//! producing itself: feature switches, the reflection-like view over a
//! frontend method declaration, and the language-level object model that
//! [`super::builder::IrBuilder::create_object_value`] lowers into IR.
//!
//! Plain `Copy` structs/enums passed into constructors, not parsed from
//! environment or files: there is no CLI or service boundary here for a
//! config-file format to bind to.

use gpuir_utils::pin::PinGuard;

use crate::types::TypeId;

use super::method::{Declaration, MethodFlags, MethodHandle};

/// Boolean feature switches threaded into [`super::builder::IrBuilder`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct ContextFlags {
    /// `f64` constants are coerced to `f32` on construction.
    pub force_32bit_floats: bool,
    /// Attaches sequence points; unused by the core itself, carried for
    /// frontends that inspect it when deciding whether to track locations.
    pub enable_debug_information: bool,
}

impl ContextFlags {
    pub const fn new() -> Self {
        Self {
            force_32bit_floats: false,
            enable_debug_information: false,
        }
    }
}

/// Gates whether [`super::builder::IrBuilder::create_array_value`] accepts
/// a static array that is not immutable.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub enum ArrayMode {
    #[default]
    RejectStatic,
    InlineMutableStaticArrays,
}

/// Frontend method declaration, inspected only for its return type and
/// inlining marker bits when seeding [`MethodFlags`].
pub trait MethodBase {
    fn return_type(&self) -> TypeId;
    fn is_aggressive_inlining(&self) -> bool {
        false
    }
    fn is_no_inlining(&self) -> bool {
        false
    }
}

/// Builds a [`Declaration`] from a [`MethodBase`], seeding [`MethodFlags`]
/// from its inlining marker bits.
pub fn declaration_from_method_base(base: &dyn MethodBase, handle: MethodHandle) -> Declaration {
    let mut flags = MethodFlags::NONE;
    if base.is_aggressive_inlining() {
        flags = flags | MethodFlags::AGGRESSIVE_INLINING;
    }
    if base.is_no_inlining() {
        flags = flags | MethodFlags::NO_INLINING;
    }
    Declaration {
        handle,
        return_type: base.return_type(),
        flags,
    }
}

/// A language-level value a frontend wants lowered into IR via
/// `createObjectValue`. Borrows the frontend's own byte buffers for
/// structure padding rather than copying them up front.
pub enum LanguageObject<'a> {
    /// A primitive scalar, raw bits already in the primitive's own width.
    Primitive(TypeId, u64),
    /// An enum constant; lowers to its underlying integer representation.
    Enum(TypeId, u64),
    /// A managed class reference. Never lowers: `createObjectValue` always
    /// fails on this variant with `NotSupportedClassType`.
    Class,
    Array(ArrayObject<'a>),
    Structure(StructureObject<'a>),
}

/// A compile-time array: known element count per dimension and, for each
/// element, its own [`LanguageObject`].
pub struct ArrayObject<'a> {
    pub element_type: TypeId,
    pub lengths: Vec<u64>,
    pub elements: Vec<LanguageObject<'a>>,
    /// A static (source-level, non-stack) array rather than a freshly
    /// constructed one.
    pub is_static: bool,
    pub is_immutable: bool,
}

/// A compile-time structure: one slot per flat field type of the
/// structure's [`crate::types::TypeNode::Structure`]. A slot is `None`
/// only when the corresponding field type is
/// [`crate::types::TypeNode::Padding`]; its bytes are recovered from
/// `raw_bytes` instead of being supplied by the frontend.
pub struct StructureObject<'a> {
    pub fields: Vec<Option<LanguageObject<'a>>>,
    pub raw_bytes: PinGuard<'a>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CompilationContext;
    use crate::types::BasicValueType;

    struct AggressivelyInlined(TypeId);

    impl MethodBase for AggressivelyInlined {
        fn return_type(&self) -> TypeId {
            self.0
        }
        fn is_aggressive_inlining(&self) -> bool {
            true
        }
    }

    #[test]
    fn method_base_seeds_flags_and_return_type() {
        let ctx = CompilationContext::new();
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let base = AggressivelyInlined(i32t);
        let decl = declaration_from_method_base(&base, MethodHandle::new(1, "kernel"));
        assert_eq!(decl.return_type, i32t);
        assert!(decl.flags.contains(MethodFlags::AGGRESSIVE_INLINING));
        assert!(!decl.flags.contains(MethodFlags::NO_INLINING));
    }
}
