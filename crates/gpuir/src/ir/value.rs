//! The value arena: interned constants, structural op nodes, use-list
//! tracking, and replacement (`replace`/`resolve`).
//!
//! Mirrors `mu_ir::ir::dfg::DataFlowGraph`'s value storage, but every
//! operand is carried as a [`ValueRef`] rather than a bare [`ValueId`] so
//! the arena can auto-resolve through a replacement chain at the point an
//! operand is read, not just when it's written.

use std::fmt;

use cranelift_entity::{PrimaryMap, SecondaryMap};
use gpuir_utils::bits;
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::error::{IrError, IrResult, Location};
use crate::types::{AddressSpace, BasicValueType, TypeContext, TypeId};

use super::entities::{BlockId, MethodId, ValueId};
use super::span::FieldSpan;

/// A reference to a value, resolved through the replacement chain at
/// construction time. Operand lists store these, not bare [`ValueId`]s,
/// so a stale read can never observe a value that has since been
/// replaced.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct ValueRef(ValueId);

impl ValueRef {
    pub fn id(self) -> ValueId {
        self.0
    }

    /// Wraps an id already known to be canonical (e.g. one just returned
    /// by [`ValueArena::resolve`]) without re-resolving it.
    pub fn from_resolved(id: ValueId) -> Self {
        ValueRef(id)
    }
}

impl fmt::Debug for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CastKind {
    /// Bit-reinterpretation between equal-width types.
    Bitcast,
    /// Truncates to a narrower integer type.
    Truncate,
    /// Sign-extends to a wider integer type.
    SignExtend,
    /// Zero-extends to a wider integer type.
    ZeroExtend,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ConvertKind {
    IntToFloat,
    FloatToInt,
    FloatExtend,
    FloatTruncate,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CompareKind {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareKind {
    pub const fn negated(self) -> CompareKind {
        match self {
            CompareKind::Eq => CompareKind::Ne,
            CompareKind::Ne => CompareKind::Eq,
            CompareKind::Lt => CompareKind::Ge,
            CompareKind::Le => CompareKind::Gt,
            CompareKind::Gt => CompareKind::Le,
            CompareKind::Ge => CompareKind::Lt,
        }
    }

    pub const fn swapped(self) -> CompareKind {
        match self {
            CompareKind::Eq => CompareKind::Eq,
            CompareKind::Ne => CompareKind::Ne,
            CompareKind::Lt => CompareKind::Gt,
            CompareKind::Le => CompareKind::Ge,
            CompareKind::Gt => CompareKind::Lt,
            CompareKind::Ge => CompareKind::Le,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum UnaryOp {
    Neg,
    Not,
    /// Absolute value. Identity on unsigned operands (see
    /// [`super::builder::IrBuilder::abs`]).
    Abs,
    /// Float reciprocal; the canonical rewrite target of `Div(1, x)`.
    RcpF,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    /// Two-argument arctangent; float operands only.
    Atan2F,
    /// Float exponentiation; float operands only.
    PowF,
}

impl BinaryOp {
    /// Whether operand order doesn't affect the result; used to
    /// canonicalize commutative binops during construction.
    pub const fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Mul | BinaryOp::And | BinaryOp::Or | BinaryOp::Xor
        )
    }
}

/// The operation a value computes. Constants and block parameters carry
/// no operands; everything else names its operands as [`ValueRef`]s so
/// [`ValueKind::operands`] can enumerate them uniformly for use-list
/// maintenance and rewriting.
#[derive(Clone, PartialEq, Debug)]
pub enum ValueKind {
    /// A method parameter, identified by its position in the parameter
    /// list.
    Param(u32),
    /// An integer, float, or boolean constant, carried as raw bits
    /// reinterpreted per `ty`.
    Constant(u64),
    /// The null value of a pointer or view type.
    NullConstant,
    /// An interned string literal.
    StringConstant(String),
    Cast(CastKind, ValueRef),
    /// A numeric conversion. The two `bool`s are `source_unsigned` and
    /// `target_unsigned`: they select which integer side, if any, is
    /// treated as unsigned when folding or re-folding a nested convert.
    Convert(ConvertKind, ValueRef, bool, bool),
    /// A comparison. The trailing `bool` is `unsigned_or_unordered`:
    /// for integer operands it selects an unsigned rather than signed
    /// comparison; for float operands it selects unordered (NaN-safe,
    /// true on either operand NaN) rather than ordered semantics.
    Compare(CompareKind, ValueRef, ValueRef, bool),
    Unary(UnaryOp, ValueRef),
    /// A binary arithmetic op. The trailing `bool` is `unsigned`: it
    /// only affects `Div`/`Rem`/`Shr`, where signed and unsigned integer
    /// semantics differ.
    Binary(BinaryOp, ValueRef, ValueRef, bool),
    /// Extracts the field at `span` from a structure value.
    GetField(ValueRef, FieldSpan),
    /// Produces a new structure value with the field at `span` replaced.
    SetField(ValueRef, FieldSpan, ValueRef),
    /// Computes the address of element `index` of a pointer/view base.
    LoadElementAddress(ValueRef, ValueRef, AddressSpace),
    /// Computes the address of the field at `span` of a pointer/view base.
    LoadFieldAddress(ValueRef, FieldSpan, AddressSpace),
    /// The byte offset needed to align `base` up to `alignment`.
    AlignmentOffset(ValueRef, u64),
    /// An aggregate array value built from its elements in order.
    ArrayValue(Vec<ValueRef>),
    /// Allocates an array of the given array type, one length operand per
    /// dimension.
    NewArray(TypeId, Vec<ValueRef>),
    /// Total element count (`None`) or one dimension's length (`Some(d)`)
    /// of an array produced by `NewArray`.
    GetArrayLength(ValueRef, Option<u32>),
    /// Address of the element at the given per-dimension indices of an
    /// array produced by `NewArray`.
    LoadArrayElementAddress(ValueRef, Vec<ValueRef>, AddressSpace),
    /// A phi node: one incoming value per predecessor block.
    Phi(Vec<(BlockId, ValueRef)>),
    /// Selects `if_true` or `if_false` based on a boolean condition,
    /// without branching. Used to lower `bool -> T` conversions.
    Select(ValueRef, ValueRef, ValueRef),
    /// A call to another method in the same compilation context.
    Call(MethodId, Vec<ValueRef>),
    /// Unconditional branch; must be the last value in a block.
    Branch(BlockId),
    /// Conditional branch; must be the last value in a block.
    CondBranch(ValueRef, BlockId, BlockId),
    /// Multi-way branch on an integer value; must be the last value in a
    /// block.
    Switch(ValueRef, Vec<(u64, BlockId)>, BlockId),
    /// Returns from the enclosing method; must be the last value in a
    /// block. `None` for a void method.
    Return(Option<ValueRef>),
    /// Marks a block as provably unreachable; must be the last value in
    /// a block.
    Unreachable,
    /// Fills the use-site of a value scheduled for removal whose
    /// replacement was not otherwise determined, preserving the type of
    /// every remaining reference to it.
    Undefined,
}

impl ValueKind {
    /// All operands this kind reads, in a stable order.
    pub fn operands(&self) -> SmallVec<[ValueRef; 4]> {
        match self {
            ValueKind::Param(_)
            | ValueKind::Constant(_)
            | ValueKind::NullConstant
            | ValueKind::StringConstant(_) => SmallVec::new(),
            ValueKind::Cast(_, v) | ValueKind::Unary(_, v) | ValueKind::Convert(_, v, ..) => {
                SmallVec::from_slice(&[*v])
            }
            ValueKind::Compare(_, a, b, _) | ValueKind::Binary(_, a, b, _) => {
                SmallVec::from_slice(&[*a, *b])
            }
            ValueKind::GetField(v, _) => SmallVec::from_slice(&[*v]),
            ValueKind::SetField(v, _, w) => SmallVec::from_slice(&[*v, *w]),
            ValueKind::LoadElementAddress(base, idx, _) => SmallVec::from_slice(&[*base, *idx]),
            ValueKind::LoadFieldAddress(base, _, _) => SmallVec::from_slice(&[*base]),
            ValueKind::AlignmentOffset(v, _) => SmallVec::from_slice(&[*v]),
            ValueKind::ArrayValue(elems) => elems.iter().copied().collect(),
            ValueKind::NewArray(_, lengths) => lengths.iter().copied().collect(),
            ValueKind::GetArrayLength(a, _) => SmallVec::from_slice(&[*a]),
            ValueKind::LoadArrayElementAddress(a, indices, _) => {
                let mut out = SmallVec::from_slice(&[*a]);
                out.extend(indices.iter().copied());
                out
            }
            ValueKind::Phi(incoming) => incoming.iter().map(|(_, v)| *v).collect(),
            ValueKind::Select(c, t, f) => SmallVec::from_slice(&[*c, *t, *f]),
            ValueKind::Call(_, args) => args.iter().copied().collect(),
            ValueKind::Branch(_) | ValueKind::Unreachable | ValueKind::Undefined => SmallVec::new(),
            ValueKind::CondBranch(cond, ..) => SmallVec::from_slice(&[*cond]),
            ValueKind::Switch(v, ..) => SmallVec::from_slice(&[*v]),
            ValueKind::Return(v) => v.iter().copied().collect(),
        }
    }

    pub const fn is_phi(&self) -> bool {
        matches!(self, ValueKind::Phi(_))
    }

    pub const fn is_constant(&self) -> bool {
        matches!(
            self,
            ValueKind::Constant(_) | ValueKind::NullConstant | ValueKind::StringConstant(_)
        )
    }

    pub const fn is_terminator(&self) -> bool {
        matches!(
            self,
            ValueKind::Branch(_)
                | ValueKind::CondBranch(..)
                | ValueKind::Switch(..)
                | ValueKind::Return(_)
                | ValueKind::Unreachable
        )
    }

    /// The blocks this value can transfer control to; empty for
    /// non-terminators.
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            ValueKind::Branch(target) => SmallVec::from_slice(&[*target]),
            ValueKind::CondBranch(_, t, f) => SmallVec::from_slice(&[*t, *f]),
            ValueKind::Switch(_, cases, default) => {
                let mut out: SmallVec<[BlockId; 2]> = cases.iter().map(|(_, b)| *b).collect();
                out.push(*default);
                out
            }
            _ => SmallVec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ValueData {
    pub kind: ValueKind,
    pub ty: TypeId,
    pub location: Location,
}

struct Inner {
    values: PrimaryMap<ValueId, ValueData>,
    /// `Some(w)` once `v` has been replaced by `w`; path-compressed on
    /// each [`ValueArena::resolve`].
    replacement: SecondaryMap<ValueId, Option<ValueId>>,
    /// Every value that currently names `v` as an operand, keyed by `v`.
    uses: SecondaryMap<ValueId, Vec<ValueId>>,
    const_cache: std::collections::HashMap<(u64, TypeId), ValueId>,
    null_cache: std::collections::HashMap<TypeId, ValueId>,
    string_cache: std::collections::HashMap<String, ValueId>,
}

/// Owns every value produced within a method. Operands are stored
/// resolved; [`ValueArena::replace`] rewrites every existing user in
/// place rather than leaving dangling indirection for later cleanup.
pub struct ValueArena {
    inner: RwLock<Inner>,
}

impl ValueArena {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                values: PrimaryMap::new(),
                replacement: SecondaryMap::new(),
                uses: SecondaryMap::new(),
                const_cache: std::collections::HashMap::new(),
                null_cache: std::collections::HashMap::new(),
                string_cache: std::collections::HashMap::new(),
            }),
        }
    }

    /// Resolves `id` to its current canonical value, following and
    /// compressing the replacement chain.
    pub fn resolve(&self, id: ValueId) -> ValueId {
        let mut inner = self.inner.write();
        Self::resolve_locked(&mut inner, id)
    }

    fn resolve_locked(inner: &mut Inner, id: ValueId) -> ValueId {
        let mut cur = id;
        let mut chain = SmallVec::<[ValueId; 4]>::new();
        while let Some(next) = inner.replacement[cur] {
            chain.push(cur);
            cur = next;
        }
        for node in chain {
            inner.replacement[node] = Some(cur);
        }
        cur
    }

    /// Wraps `id` as a [`ValueRef`], resolving it first.
    pub fn make_ref(&self, id: ValueId) -> ValueRef {
        ValueRef(self.resolve(id))
    }

    fn push(&self, kind: ValueKind, ty: TypeId, location: Location) -> ValueRef {
        let mut inner = self.inner.write();
        let operands = kind.operands();
        let id = inner.values.push(ValueData { kind, ty, location });
        for operand in operands {
            inner.uses[operand.id()].push(id);
        }
        ValueRef(id)
    }

    pub fn data(&self, v: ValueRef) -> ValueData {
        self.inner.read().values[v.id()].clone()
    }

    pub fn type_of(&self, v: ValueRef) -> TypeId {
        self.inner.read().values[v.id()].ty
    }

    pub fn kind_of(&self, v: ValueRef) -> ValueKind {
        self.inner.read().values[v.id()].kind.clone()
    }

    /// Interns (or returns the existing) raw-bits constant of type `ty`.
    pub fn constant(&self, ty: TypeId, raw: u64, location: Location) -> ValueRef {
        {
            let inner = self.inner.read();
            if let Some(&id) = inner.const_cache.get(&(raw, ty)) {
                return ValueRef(id);
            }
        }
        let mut inner = self.inner.write();
        if let Some(&id) = inner.const_cache.get(&(raw, ty)) {
            return ValueRef(id);
        }
        let id = inner.values.push(ValueData {
            kind: ValueKind::Constant(raw),
            ty,
            location,
        });
        inner.const_cache.insert((raw, ty), id);
        ValueRef(id)
    }

    pub fn bool_constant(&self, types: &TypeContext, value: bool, location: Location) -> ValueRef {
        self.constant(types.primitive_type(BasicValueType::Int1), value as u64, location)
    }

    pub fn null_constant(&self, ty: TypeId, location: Location) -> ValueRef {
        {
            let inner = self.inner.read();
            if let Some(&id) = inner.null_cache.get(&ty) {
                return ValueRef(id);
            }
        }
        let mut inner = self.inner.write();
        if let Some(&id) = inner.null_cache.get(&ty) {
            return ValueRef(id);
        }
        let id = inner.values.push(ValueData {
            kind: ValueKind::NullConstant,
            ty,
            location,
        });
        inner.null_cache.insert(ty, id);
        ValueRef(id)
    }

    pub fn string_constant(&self, types: &TypeContext, value: impl Into<String>, location: Location) -> ValueRef {
        let value = value.into();
        {
            let inner = self.inner.read();
            if let Some(&id) = inner.string_cache.get(&value) {
                return ValueRef(id);
            }
        }
        let mut inner = self.inner.write();
        if let Some(&id) = inner.string_cache.get(&value) {
            return ValueRef(id);
        }
        let id = inner.values.push(ValueData {
            kind: ValueKind::StringConstant(value.clone()),
            ty: types.string_type(),
            location,
        });
        inner.string_cache.insert(value, id);
        ValueRef(id)
    }

    pub fn param(&self, index: u32, ty: TypeId, location: Location) -> ValueRef {
        self.push(ValueKind::Param(index), ty, location)
    }

    pub fn make(&self, kind: ValueKind, ty: TypeId, location: Location) -> ValueRef {
        self.push(kind, ty, location)
    }

    /// Wires a phi's incoming pairs after the fact (the SSA engine
    /// creates an empty phi to give callers a stable id to reference
    /// before its predecessors are all known, then fills it in once
    /// they are). Registers use-list entries for the new operands.
    pub fn set_phi_incoming(&self, phi: ValueId, incoming: Vec<(BlockId, ValueRef)>) {
        let mut inner = self.inner.write();
        for (_, v) in &incoming {
            inner.uses[v.id()].push(phi);
        }
        inner.values[phi].kind = ValueKind::Phi(incoming);
    }

    /// Every value that currently names `id` as an operand.
    pub fn users_of(&self, id: ValueId) -> Vec<ValueId> {
        self.inner.read().uses[id].clone()
    }

    /// Retargets every incoming pair of `phi` naming `old_pred` to name
    /// `new_pred` instead. Used when a block split or merge changes which
    /// block a successor's phi should credit as the predecessor.
    pub fn rewrite_phi_predecessor(&self, phi: ValueId, old_pred: BlockId, new_pred: BlockId) {
        let mut inner = self.inner.write();
        if let ValueKind::Phi(incoming) = &mut inner.values[phi].kind {
            for (pred, _) in incoming.iter_mut() {
                if *pred == old_pred {
                    *pred = new_pred;
                }
            }
        }
    }

    /// Replaces every use of `old` with `new`, eagerly rewriting each
    /// existing user's operand list. `old` and `new` must have the same
    /// type. Idempotent: replacing an already-replaced value re-targets
    /// its replacement.
    pub fn replace(&self, old: ValueRef, new: ValueRef, location: Location) -> IrResult<()> {
        let mut inner = self.inner.write();
        let old_id = Self::resolve_locked(&mut inner, old.id());
        let new_id = Self::resolve_locked(&mut inner, new.id());
        if old_id == new_id {
            return Ok(());
        }

        let old_ty = inner.values[old_id].ty;
        let new_ty = inner.values[new_id].ty;
        if old_ty != new_ty {
            return Err(IrError::type_mismatch(location, "ReplaceTypeMismatch", old_ty, new_ty));
        }

        let users = std::mem::take(&mut inner.uses[old_id]);
        for user in &users {
            let kind = inner.values[*user].kind.clone();
            let rewritten = rewrite_operands(kind, old_id, new_id);
            inner.values[*user].kind = rewritten;
            inner.uses[new_id].push(*user);
        }
        inner.replacement[old_id] = Some(new_id);
        Ok(())
    }
}

impl Default for ValueArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrites every occurrence of `old` to `new` within `kind`'s operand
/// list, leaving the operation itself unchanged.
fn rewrite_operands(kind: ValueKind, old: ValueId, new: ValueId) -> ValueKind {
    let swap = |v: ValueRef| -> ValueRef {
        if v.id() == old {
            ValueRef(new)
        } else {
            v
        }
    };
    match kind {
        ValueKind::Cast(k, v) => ValueKind::Cast(k, swap(v)),
        ValueKind::Convert(k, v, su, tu) => ValueKind::Convert(k, swap(v), su, tu),
        ValueKind::Unary(op, v) => ValueKind::Unary(op, swap(v)),
        ValueKind::Compare(k, a, b, u) => ValueKind::Compare(k, swap(a), swap(b), u),
        ValueKind::Binary(op, a, b, u) => ValueKind::Binary(op, swap(a), swap(b), u),
        ValueKind::GetField(v, span) => ValueKind::GetField(swap(v), span),
        ValueKind::SetField(v, span, w) => ValueKind::SetField(swap(v), span, swap(w)),
        ValueKind::LoadElementAddress(base, idx, space) => {
            ValueKind::LoadElementAddress(swap(base), swap(idx), space)
        }
        ValueKind::LoadFieldAddress(base, span, space) => {
            ValueKind::LoadFieldAddress(swap(base), span, space)
        }
        ValueKind::AlignmentOffset(v, align) => ValueKind::AlignmentOffset(swap(v), align),
        ValueKind::ArrayValue(elems) => ValueKind::ArrayValue(elems.into_iter().map(swap).collect()),
        ValueKind::NewArray(ty, lengths) => ValueKind::NewArray(ty, lengths.into_iter().map(swap).collect()),
        ValueKind::GetArrayLength(a, dim) => ValueKind::GetArrayLength(swap(a), dim),
        ValueKind::LoadArrayElementAddress(a, indices, space) => {
            ValueKind::LoadArrayElementAddress(swap(a), indices.into_iter().map(swap).collect(), space)
        }
        ValueKind::Phi(incoming) => {
            ValueKind::Phi(incoming.into_iter().map(|(b, v)| (b, swap(v))).collect())
        }
        ValueKind::Select(c, t, f) => ValueKind::Select(swap(c), swap(t), swap(f)),
        ValueKind::Call(callee, args) => ValueKind::Call(callee, args.into_iter().map(swap).collect()),
        ValueKind::CondBranch(cond, t, f) => ValueKind::CondBranch(swap(cond), t, f),
        ValueKind::Switch(v, cases, default) => ValueKind::Switch(swap(v), cases, default),
        ValueKind::Return(v) => ValueKind::Return(v.map(swap)),
        other @ (ValueKind::Param(_)
        | ValueKind::Constant(_)
        | ValueKind::NullConstant
        | ValueKind::StringConstant(_)
        | ValueKind::Branch(_)
        | ValueKind::Unreachable
        | ValueKind::Undefined) => other,
    }
}

pub use bits::{f32_to_raw, f64_to_raw, raw_to_f32, raw_to_f64};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeContext;

    #[test]
    fn constants_are_uniqued() {
        let arena = ValueArena::new();
        let types = TypeContext::new();
        let i32t = types.primitive_type(BasicValueType::Int32);
        let a = arena.constant(i32t, 7, Location::unknown());
        let b = arena.constant(i32t, 7, Location::unknown());
        assert_eq!(a.id(), b.id());

        let c = arena.constant(i32t, 8, Location::unknown());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn replace_rewrites_existing_users_and_converges() {
        let arena = ValueArena::new();
        let types = TypeContext::new();
        let i32t = types.primitive_type(BasicValueType::Int32);
        let a = arena.constant(i32t, 1, Location::unknown());
        let b = arena.constant(i32t, 2, Location::unknown());
        let sum = arena.make(ValueKind::Binary(BinaryOp::Add, a, b, false), i32t, Location::unknown());

        let c = arena.constant(i32t, 3, Location::unknown());
        arena.replace(a, c, Location::unknown()).unwrap();

        match arena.kind_of(sum) {
            ValueKind::Binary(BinaryOp::Add, lhs, rhs, _) => {
                assert_eq!(arena.resolve(lhs.id()), c.id());
                assert_eq!(arena.resolve(rhs.id()), b.id());
            }
            other => panic!("unexpected kind: {other:?}"),
        }

        // A second replacement of an already-replaced value still
        // converges to a single canonical id.
        let d = arena.constant(i32t, 4, Location::unknown());
        arena.replace(c, d, Location::unknown()).unwrap();
        assert_eq!(arena.resolve(a.id()), d.id());
    }

    #[test]
    fn replace_rejects_type_mismatch() {
        let arena = ValueArena::new();
        let types = TypeContext::new();
        let i32t = types.primitive_type(BasicValueType::Int32);
        let f32t = types.primitive_type(BasicValueType::Float32);
        let a = arena.constant(i32t, 1, Location::unknown());
        let b = arena.constant(f32t, f32_to_raw(1.0) as u64, Location::unknown());
        assert!(arena.replace(a, b, Location::unknown()).is_err());
    }

    #[test]
    fn string_constants_are_uniqued() {
        let arena = ValueArena::new();
        let types = TypeContext::new();
        let a = arena.string_constant(&types, "hello", Location::unknown());
        let b = arena.string_constant(&types, "hello", Location::unknown());
        assert_eq!(a.id(), b.id());
    }
}
