//! The type context: interns [`TypeNode`]s behind stable [`TypeId`] handles.
//!
//! Primitives sit in a fixed table, compound types behind per-kind
//! interning; the interner lives on an explicit, instance-owned
//! `TypeContext` rather than a process-global static (see `DESIGN.md` for
//! why).

use std::fmt;

use cranelift_entity::{entity_impl, PrimaryMap};
use parking_lot::RwLock;
use std::collections::HashMap;

/// An opaque, interned reference to a [`TypeNode`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);
entity_impl!(TypeId, "type");

/// The element type of a scalar, width-only value; `None` denotes the
/// absence of a scalar payload (used for `Void`-adjacent bookkeeping).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BasicValueType {
    None,
    Int1,
    Int8,
    Int16,
    Int32,
    Int64,
    Float16,
    Float32,
    Float64,
}

impl BasicValueType {
    pub const ALL: [BasicValueType; 9] = [
        BasicValueType::None,
        BasicValueType::Int1,
        BasicValueType::Int8,
        BasicValueType::Int16,
        BasicValueType::Int32,
        BasicValueType::Int64,
        BasicValueType::Float16,
        BasicValueType::Float32,
        BasicValueType::Float64,
    ];

    pub const fn is_int(self) -> bool {
        matches!(
            self,
            BasicValueType::Int1
                | BasicValueType::Int8
                | BasicValueType::Int16
                | BasicValueType::Int32
                | BasicValueType::Int64
        )
    }

    pub const fn is_float(self) -> bool {
        matches!(
            self,
            BasicValueType::Float16 | BasicValueType::Float32 | BasicValueType::Float64
        )
    }

    /// Bit width of the scalar; `0` for `None`.
    pub const fn bits(self) -> u32 {
        match self {
            BasicValueType::None => 0,
            BasicValueType::Int1 => 1,
            BasicValueType::Int8 => 8,
            BasicValueType::Int16 => 16,
            BasicValueType::Int32 => 32,
            BasicValueType::Int64 => 64,
            BasicValueType::Float16 => 16,
            BasicValueType::Float32 => 32,
            BasicValueType::Float64 => 64,
        }
    }

    pub const fn bytes(self) -> u32 {
        self.bits().div_ceil(8)
    }
}

/// A named memory region carried by pointer and view types.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum AddressSpace {
    Generic,
    Global,
    Shared,
    Local,
    Constant,
}

/// An interned, immutable type-tree node. Equality is structural; after
/// interning, two structurally-equal nodes share the same [`TypeId`].
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeNode {
    Void,
    Primitive(BasicValueType),
    String,
    Pointer(TypeId, AddressSpace),
    View(TypeId, AddressSpace),
    Array(TypeId, u32, Option<u64>),
    Structure(Vec<TypeId>),
    Function(Vec<TypeId>, TypeId),
    Padding(BasicValueType),
}

impl fmt::Display for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeNode::Void => write!(f, "void"),
            TypeNode::Primitive(bv) => write!(f, "{bv:?}"),
            TypeNode::String => write!(f, "string"),
            TypeNode::Pointer(elem, space) => write!(f, "ptr<{elem:?}, {space:?}>"),
            TypeNode::View(elem, space) => write!(f, "view<{elem:?}, {space:?}>"),
            TypeNode::Array(elem, rank, len) => write!(f, "array<{elem:?}, {rank}, {len:?}>"),
            TypeNode::Structure(fields) => write!(f, "struct{fields:?}"),
            TypeNode::Function(params, ret) => write!(f, "fn{params:?}->{ret:?}"),
            TypeNode::Padding(bv) => write!(f, "padding({bv:?})"),
        }
    }
}

struct Inner {
    nodes: PrimaryMap<TypeId, TypeNode>,
    interner: HashMap<TypeNode, TypeId>,
}

/// Owns every interned [`TypeNode`] for a compilation context. A coarse
/// `RwLock` guards the arena so concurrent reads and interning from
/// methods built on different threads stay consistent.
pub struct TypeContext {
    inner: RwLock<Inner>,
    primitives: [TypeId; 9],
    void: TypeId,
    string: TypeId,
}

impl TypeContext {
    pub fn new() -> Self {
        let mut nodes = PrimaryMap::new();
        let mut interner = HashMap::new();

        let intern_initial = |nodes: &mut PrimaryMap<TypeId, TypeNode>,
                                   interner: &mut HashMap<TypeNode, TypeId>,
                                   node: TypeNode|
         -> TypeId {
            if let Some(&id) = interner.get(&node) {
                return id;
            }
            let id = nodes.push(node.clone());
            interner.insert(node, id);
            id
        };

        let void = intern_initial(&mut nodes, &mut interner, TypeNode::Void);
        let string = intern_initial(&mut nodes, &mut interner, TypeNode::String);

        let mut primitives = [void; 9];
        for (i, bv) in BasicValueType::ALL.into_iter().enumerate() {
            primitives[i] = intern_initial(&mut nodes, &mut interner, TypeNode::Primitive(bv));
        }

        Self {
            inner: RwLock::new(Inner { nodes, interner }),
            primitives,
            void,
            string,
        }
    }

    pub fn void_type(&self) -> TypeId {
        self.void
    }

    pub fn string_type(&self) -> TypeId {
        self.string
    }

    pub fn primitive_type(&self, bv: BasicValueType) -> TypeId {
        self.primitives[bv as usize]
    }

    /// Interns an arbitrary [`TypeNode`], returning the canonical
    /// [`TypeId`] for it. Two calls with structurally-equal `node`s
    /// always return the same id.
    pub fn intern(&self, node: TypeNode) -> TypeId {
        // Primitives, Void and String are looked up through the fixed
        // table/initial slots rather than re-hashed on every call.
        match &node {
            TypeNode::Void => return self.void,
            TypeNode::String => return self.string,
            TypeNode::Primitive(bv) => return self.primitive_type(*bv),
            _ => {}
        }

        if let Some(&id) = self.inner.read().interner.get(&node) {
            return id;
        }
        let mut inner = self.inner.write();
        if let Some(&id) = inner.interner.get(&node) {
            return id;
        }
        let id = inner.nodes.push(node.clone());
        log::trace!(target: "gpuir::types", "interned new type {id:?}: {node}");
        inner.interner.insert(node, id);
        id
    }

    pub fn pointer(&self, elem: TypeId, space: AddressSpace) -> TypeId {
        self.intern(TypeNode::Pointer(elem, space))
    }

    pub fn view(&self, elem: TypeId, space: AddressSpace) -> TypeId {
        self.intern(TypeNode::View(elem, space))
    }

    pub fn array(&self, elem: TypeId, rank: u32, length: Option<u64>) -> TypeId {
        self.intern(TypeNode::Array(elem, rank, length))
    }

    pub fn structure(&self, fields: Vec<TypeId>) -> TypeId {
        self.intern(TypeNode::Structure(fields))
    }

    pub fn function(&self, params: Vec<TypeId>, ret: TypeId) -> TypeId {
        self.intern(TypeNode::Function(params, ret))
    }

    pub fn padding(&self, bv: BasicValueType) -> TypeId {
        self.intern(TypeNode::Padding(bv))
    }

    pub fn get(&self, id: TypeId) -> TypeNode {
        self.inner.read().nodes[id].clone()
    }

    pub fn with<R>(&self, id: TypeId, f: impl FnOnce(&TypeNode) -> R) -> R {
        f(&self.inner.read().nodes[id])
    }

    pub fn is_void(&self, id: TypeId) -> bool {
        id == self.void
    }

    pub fn is_primitive(&self, id: TypeId) -> bool {
        matches!(self.get(id), TypeNode::Primitive(_))
    }

    pub fn basic_value_type(&self, id: TypeId) -> Option<BasicValueType> {
        match self.get(id) {
            TypeNode::Primitive(bv) | TypeNode::Padding(bv) => Some(bv),
            _ => None,
        }
    }

    pub fn is_int(&self, id: TypeId) -> bool {
        self.basic_value_type(id).is_some_and(BasicValueType::is_int)
    }

    pub fn is_float(&self, id: TypeId) -> bool {
        self.basic_value_type(id).is_some_and(BasicValueType::is_float)
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.get(id), TypeNode::Pointer(..))
    }

    pub fn is_view(&self, id: TypeId) -> bool {
        matches!(self.get(id), TypeNode::View(..))
    }

    pub fn is_structure(&self, id: TypeId) -> bool {
        matches!(self.get(id), TypeNode::Structure(_))
    }

    /// Flat field types at natural alignment; `None` when `id` is not a
    /// structure type.
    pub fn fields(&self, id: TypeId) -> Option<Vec<TypeId>> {
        match self.get(id) {
            TypeNode::Structure(fields) => Some(fields),
            _ => None,
        }
    }

    /// Size in bytes, honoring natural alignment and struct padding.
    pub fn size_of(&self, id: TypeId) -> u64 {
        match self.get(id) {
            TypeNode::Void => 0,
            TypeNode::Primitive(bv) | TypeNode::Padding(bv) => bv.bytes() as u64,
            TypeNode::String => 16, // (ptr, len) fat reference
            TypeNode::Pointer(..) | TypeNode::View(..) | TypeNode::Function(..) => 8,
            TypeNode::Array(elem, rank, length) => {
                let elem_size = self.size_of(elem);
                let count = length.unwrap_or(1) * rank.max(1) as u64;
                elem_size * count
            }
            TypeNode::Structure(fields) => {
                let mut offset = 0u64;
                for field in &fields {
                    let align = self.align_of(*field).max(1);
                    offset = align_up(offset, align);
                    offset += self.size_of(*field);
                }
                align_up(offset, self.align_of(id).max(1))
            }
        }
    }

    /// Natural alignment in bytes.
    pub fn align_of(&self, id: TypeId) -> u64 {
        match self.get(id) {
            TypeNode::Void => 1,
            TypeNode::Primitive(bv) | TypeNode::Padding(bv) => bv.bytes().max(1) as u64,
            TypeNode::String | TypeNode::Pointer(..) | TypeNode::View(..) | TypeNode::Function(..) => 8,
            TypeNode::Array(elem, ..) => self.align_of(elem),
            TypeNode::Structure(fields) => fields
                .iter()
                .map(|f| self.align_of(*f))
                .max()
                .unwrap_or(1),
        }
    }
}

impl Default for TypeContext {
    fn default() -> Self {
        Self::new()
    }
}

fn align_up(offset: u64, align: u64) -> u64 {
    if align == 0 {
        offset
    } else {
        offset.div_ceil(align) * align
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_are_preinterned_and_stable() {
        let ctx = TypeContext::new();
        assert_eq!(
            ctx.primitive_type(BasicValueType::Int32),
            ctx.intern(TypeNode::Primitive(BasicValueType::Int32))
        );
    }

    #[test]
    fn structural_equality_implies_identity() {
        let ctx = TypeContext::new();
        let i32t = ctx.primitive_type(BasicValueType::Int32);
        let a = ctx.pointer(i32t, AddressSpace::Global);
        let b = ctx.pointer(i32t, AddressSpace::Global);
        assert_eq!(a, b);

        let c = ctx.pointer(i32t, AddressSpace::Shared);
        assert_ne!(a, c);
    }

    #[test]
    fn struct_size_respects_alignment_and_padding() {
        let ctx = TypeContext::new();
        let i8t = ctx.primitive_type(BasicValueType::Int8);
        let i32t = ctx.primitive_type(BasicValueType::Int32);
        // { i8, i32 } needs 3 bytes of padding before the i32 field.
        let st = ctx.structure(vec![i8t, i32t]);
        assert_eq!(ctx.size_of(st), 8);
        assert_eq!(ctx.align_of(st), 4);
    }

    #[test]
    fn array_size_multiplies_by_length_and_rank() {
        let ctx = TypeContext::new();
        let f32t = ctx.primitive_type(BasicValueType::Float32);
        let arr = ctx.array(f32t, 1, Some(4));
        assert_eq!(ctx.size_of(arr), 16);
    }
}
