//! `IrBuilder` — one factory per value kind, applying the deterministic
//! simplifications that keep the graph canonical as it's built.
//!
//! Pure value construction: no notion of block or insert position lives
//! here. [`super::method_builder::MethodBuilder`] owns placement.

use gpuir_utils::bits;

use crate::context::CompilationContext;
use crate::error::{IrError, IrResult, Location};
use crate::types::{AddressSpace, BasicValueType, TypeId, TypeNode};

use super::collaborators::{ArrayMode, ArrayObject, ContextFlags, LanguageObject, StructureObject};
use super::span::FieldSpan;
use super::value::{BinaryOp, CastKind, CompareKind, ConvertKind, UnaryOp, ValueKind, ValueRef};

pub struct IrBuilder<'a> {
    ctx: &'a CompilationContext,
    flags: ContextFlags,
}

impl<'a> IrBuilder<'a> {
    pub fn new(ctx: &'a CompilationContext) -> Self {
        Self {
            ctx,
            flags: ContextFlags::new(),
        }
    }

    pub fn with_flags(ctx: &'a CompilationContext, flags: ContextFlags) -> Self {
        Self { ctx, flags }
    }

    pub fn ctx(&self) -> &'a CompilationContext {
        self.ctx
    }

    fn const_of(&self, v: ValueRef) -> Option<(u64, BasicValueType)> {
        let ty = self.ctx.values.type_of(v);
        let bv = self.ctx.types.basic_value_type(ty)?;
        match self.ctx.values.kind_of(v) {
            ValueKind::Constant(raw) => Some((raw, bv)),
            _ => None,
        }
    }

    fn make_const(&self, ty: TypeId, raw: u64, location: Location) -> ValueRef {
        self.ctx.values.constant(ty, raw, location)
    }

    /// `createNull(T)`: a primitive zero for a primitive type, else an
    /// interned null value.
    pub fn null(&self, ty: TypeId, location: Location) -> ValueRef {
        if self.ctx.types.is_primitive(ty) {
            self.make_const(ty, 0, location)
        } else {
            self.ctx.values.null_constant(ty, location)
        }
    }

    pub fn param(&self, index: u32, ty: TypeId, location: Location) -> ValueRef {
        self.ctx.values.param(index, ty, location)
    }

    pub fn constant_bool(&self, value: bool, location: Location) -> ValueRef {
        self.ctx
            .values
            .bool_constant(&self.ctx.types, value, location)
    }

    pub fn constant_int(&self, ty: TypeId, value: i64, location: Location) -> IrResult<ValueRef> {
        let bv = self
            .ctx
            .types
            .basic_value_type(ty)
            .filter(|b| b.is_int())
            .ok_or_else(|| IrError::type_mismatch(location, "ExpectedIntegerType", ty, ty))?;
        let raw = bits::zero_extend(value as u64, bv.bits().max(1));
        Ok(self.make_const(ty, raw, location))
    }

    pub fn constant_f32(&self, value: f32, location: Location) -> ValueRef {
        let ty = self.ctx.types.primitive_type(BasicValueType::Float32);
        self.make_const(ty, bits::f32_to_raw(value), location)
    }

    pub fn constant_f64(&self, value: f64, location: Location) -> ValueRef {
        if self.flags.force_32bit_floats {
            return self.constant_f32(value as f32, location);
        }
        let ty = self.ctx.types.primitive_type(BasicValueType::Float64);
        self.make_const(ty, bits::f64_to_raw(value), location)
    }

    // ---- casts --------------------------------------------------------

    pub fn cast(&self, kind: CastKind, v: ValueRef, target: TypeId, location: Location) -> IrResult<ValueRef> {
        let source = self.ctx.values.type_of(v);
        if kind == CastKind::Bitcast && source == target {
            return Ok(v);
        }
        if kind == CastKind::Bitcast {
            if let ValueKind::Cast(CastKind::Bitcast, inner) = self.ctx.values.kind_of(v) {
                return self.cast(CastKind::Bitcast, inner, target, location);
            }
        }
        match (kind, self.const_of(v)) {
            (CastKind::Truncate, Some((raw, _))) => {
                let bits_of = self
                    .ctx
                    .types
                    .basic_value_type(target)
                    .ok_or_else(|| IrError::type_mismatch(location, "ExpectedPrimitiveTarget", target, target))?
                    .bits();
                Ok(self.make_const(target, bits::truncate(raw, bits_of.max(1)), location))
            }
            (CastKind::SignExtend, Some((raw, source_bv))) => {
                Ok(self.make_const(target, bits::sign_extend(raw, source_bv.bits().max(1)), location))
            }
            (CastKind::ZeroExtend, Some((raw, source_bv))) => {
                Ok(self.make_const(target, bits::zero_extend(raw, source_bv.bits().max(1)), location))
            }
            // A bitcast on a constant never changes the bit pattern, only
            // how wide a word it's stored in; re-tag the raw bits directly.
            (CastKind::Bitcast, Some((raw, _))) => Ok(self.make_const(target, raw, location)),
            _ => Ok(self.ctx.values.make(ValueKind::Cast(kind, v), target, location)),
        }
    }

    /// `viewCast`: identity if element type and address space both match;
    /// otherwise delegates to [`Self::address_space_cast`] with a
    /// view-typed `make_type`.
    pub fn view_cast(&self, v: ValueRef, elem: TypeId, space: AddressSpace, location: Location) -> IrResult<ValueRef> {
        self.address_space_cast(v, elem, space, |e, s| self.ctx.types.view(e, s), location)
    }

    /// `intAsPointer`: always constructs a fresh bitcast, never folded or
    /// collapsed, unlike `pointerCast`.
    pub fn int_as_pointer(&self, v: ValueRef, target: TypeId, location: Location) -> IrResult<ValueRef> {
        let source = self.ctx.values.type_of(v);
        self.ctx
            .types
            .basic_value_type(source)
            .filter(|b| b.is_int())
            .ok_or_else(|| IrError::type_mismatch(location, "ExpectedIntegerSource", source, source))?;
        if !matches!(self.ctx.types.get(target), TypeNode::Pointer(_, _)) {
            return Err(IrError::type_mismatch(location, "ExpectedPointerTarget", target, target));
        }
        Ok(self.ctx.values.make(ValueKind::Cast(CastKind::Bitcast, v), target, location))
    }

    /// `pointerAsInt`: always constructs a fresh bitcast, never folded or
    /// collapsed, unlike `pointerCast`.
    pub fn pointer_as_int(&self, v: ValueRef, target: TypeId, location: Location) -> IrResult<ValueRef> {
        let source = self.ctx.values.type_of(v);
        if !matches!(self.ctx.types.get(source), TypeNode::Pointer(_, _)) {
            return Err(IrError::type_mismatch(location, "ExpectedPointerSource", source, source));
        }
        self.ctx
            .types
            .basic_value_type(target)
            .filter(|b| b.is_int())
            .ok_or_else(|| IrError::type_mismatch(location, "ExpectedIntegerTarget", target, target))?;
        Ok(self.ctx.values.make(ValueKind::Cast(CastKind::Bitcast, v), target, location))
    }

    /// `floatAsInt`: a bit-reinterpreting cast between equal-width float
    /// and integer primitives, built on the bitcast path so constants fold
    /// directly (re-tagging raw bits, no numeric recomputation).
    pub fn float_as_int(&self, v: ValueRef, target: TypeId, location: Location) -> IrResult<ValueRef> {
        let source = self.ctx.values.type_of(v);
        let source_bv = self
            .ctx
            .types
            .basic_value_type(source)
            .filter(|b| b.is_float())
            .ok_or_else(|| IrError::type_mismatch(location, "ExpectedFloatSource", source, source))?;
        let target_bv = self
            .ctx
            .types
            .basic_value_type(target)
            .filter(|b| b.is_int())
            .ok_or_else(|| IrError::type_mismatch(location, "ExpectedIntegerTarget", target, target))?;
        if source_bv.bits() != target_bv.bits() {
            return Err(IrError::type_mismatch(location, "BitcastWidthMismatch", target, source));
        }
        self.cast(CastKind::Bitcast, v, target, location)
    }

    /// `intAsFloat`: a bit-reinterpreting cast between equal-width integer
    /// and float primitives, built on the bitcast path so constants fold
    /// directly (re-tagging raw bits, no numeric recomputation).
    pub fn int_as_float(&self, v: ValueRef, target: TypeId, location: Location) -> IrResult<ValueRef> {
        let source = self.ctx.values.type_of(v);
        let source_bv = self
            .ctx
            .types
            .basic_value_type(source)
            .filter(|b| b.is_int())
            .ok_or_else(|| IrError::type_mismatch(location, "ExpectedIntegerSource", source, source))?;
        let target_bv = self
            .ctx
            .types
            .basic_value_type(target)
            .filter(|b| b.is_float())
            .ok_or_else(|| IrError::type_mismatch(location, "ExpectedFloatTarget", target, target))?;
        if source_bv.bits() != target_bv.bits() {
            return Err(IrError::type_mismatch(location, "BitcastWidthMismatch", target, source));
        }
        self.cast(CastKind::Bitcast, v, target, location)
    }

    /// `addressSpaceCast`/`viewCast`-style identity + nested collapse for
    /// pointer and view element-type-preserving casts.
    pub fn address_space_cast(
        &self,
        v: ValueRef,
        elem: TypeId,
        space: AddressSpace,
        make_type: impl Fn(TypeId, AddressSpace) -> TypeId,
        location: Location,
    ) -> IrResult<ValueRef> {
        let target = make_type(elem, space);
        if self.ctx.values.type_of(v) == target {
            return Ok(v);
        }
        if let ValueKind::Cast(CastKind::Bitcast, inner) = self.ctx.values.kind_of(v) {
            return Ok(self.ctx.values.make(ValueKind::Cast(CastKind::Bitcast, inner), target, location));
        }
        Ok(self.ctx.values.make(ValueKind::Cast(CastKind::Bitcast, v), target, location))
    }

    // ---- convert --------------------------------------------------------

    /// `source_unsigned`/`target_unsigned` select unsigned rather than
    /// signed interpretation on whichever side of `kind` is an integer
    /// (`IntToFloat` reads `source_unsigned`, `FloatToInt` reads
    /// `target_unsigned`); ignored for the two float-width conversions.
    pub fn convert(
        &self,
        kind: ConvertKind,
        v: ValueRef,
        target: TypeId,
        source_unsigned: bool,
        target_unsigned: bool,
        location: Location,
    ) -> IrResult<ValueRef> {
        let source = self.ctx.values.type_of(v);
        if source == target {
            return Ok(v);
        }
        if let ValueKind::Convert(_, inner_v, ..) = self.ctx.values.kind_of(v) {
            let inner_source = self.ctx.values.type_of(inner_v);
            if inner_source == target {
                return Ok(inner_v);
            }
        }
        if let Some((raw, source_bv)) = self.const_of(v) {
            let target_bv = self
                .ctx
                .types
                .basic_value_type(target)
                .ok_or_else(|| IrError::type_mismatch(location, "ExpectedPrimitiveTarget", target, target))?;
            return Ok(self.make_const(
                target,
                fold_convert(kind, raw, source_bv, target_bv, source_unsigned, target_unsigned),
                location,
            ));
        }
        Ok(self
            .ctx
            .values
            .make(ValueKind::Convert(kind, v, source_unsigned, target_unsigned), target, location))
    }

    /// `x -> bool` as `x != 0`.
    pub fn convert_to_bool(&self, v: ValueRef, location: Location) -> IrResult<ValueRef> {
        let ty = self.ctx.values.type_of(v);
        let zero = self.null(ty, location);
        self.compare(CompareKind::Ne, v, zero, false, location)
    }

    /// `bool -> T` as `select(x, one(T), zero(T))`.
    pub fn convert_from_bool(&self, v: ValueRef, target: TypeId, location: Location) -> IrResult<ValueRef> {
        let one = self.constant_int(target, 1, location)?;
        let zero = self.null(target, location);
        Ok(self
            .ctx
            .values
            .make(ValueKind::Select(v, one, zero), target, location))
    }

    // ---- compare --------------------------------------------------------

    /// `unsigned_or_unordered` selects, for integer operands, an unsigned
    /// rather than signed comparison; for float operands it selects
    /// unordered (true whenever either operand is NaN) rather than ordered
    /// (false whenever either operand is NaN) semantics.
    pub fn compare(
        &self,
        kind: CompareKind,
        a: ValueRef,
        b: ValueRef,
        unsigned_or_unordered: bool,
        location: Location,
    ) -> IrResult<ValueRef> {
        let bool_ty = self.ctx.types.primitive_type(BasicValueType::Int1);
        if let (Some((ra, bv)), Some((rb, _))) = (self.const_of(a), self.const_of(b)) {
            let result = fold_compare(kind, ra, rb, bv, unsigned_or_unordered);
            return Ok(self.constant_bool(result, location));
        }

        // Constant on the left: swap to the right, inverting non-symmetric kinds.
        if self.const_of(a).is_some() && self.const_of(b).is_none() {
            return self.compare(kind.swapped(), b, a, unsigned_or_unordered, location);
        }

        let lhs_ty = self.ctx.values.type_of(a);
        if self.ctx.types.basic_value_type(lhs_ty) == Some(BasicValueType::Int1) {
            if let (CompareKind::Eq, Some((raw, _))) = (kind, self.const_of(b)) {
                return if raw != 0 {
                    Ok(a)
                } else {
                    Ok(self.ctx.values.make(ValueKind::Unary(UnaryOp::Not, a), bool_ty, location))
                };
            }
        }

        Ok(self
            .ctx
            .values
            .make(ValueKind::Compare(kind, a, b, unsigned_or_unordered), bool_ty, location))
    }

    // ---- unary / binary arithmetic --------------------------------------

    pub fn unary(&self, op: UnaryOp, v: ValueRef, location: Location) -> IrResult<ValueRef> {
        let ty = self.ctx.values.type_of(v);
        if op == UnaryOp::Not {
            if let ValueKind::Unary(UnaryOp::Not, inner) = self.ctx.values.kind_of(v) {
                return Ok(inner);
            }
            if let ValueKind::Compare(k, a, b, unsigned_or_unordered) = self.ctx.values.kind_of(v) {
                let operand_bv = self.ctx.types.basic_value_type(self.ctx.values.type_of(a));
                let toggled = if operand_bv.is_some_and(|bv| bv.is_float()) {
                    !unsigned_or_unordered
                } else {
                    unsigned_or_unordered
                };
                return self.compare(k.negated(), a, b, toggled, location);
            }
        }
        if let Some((raw, bv)) = self.const_of(v) {
            return Ok(self.make_const(ty, fold_unary(op, raw, bv), location));
        }
        Ok(self.ctx.values.make(ValueKind::Unary(op, v), ty, location))
    }

    /// `unsigned` only affects `Div`/`Rem` (signed vs unsigned division) and
    /// `Shr` (arithmetic vs logical shift); every other op is
    /// signedness-agnostic at fixed width under two's complement.
    pub fn binary(&self, op: BinaryOp, a: ValueRef, b: ValueRef, unsigned: bool, location: Location) -> IrResult<ValueRef> {
        let ty = self.ctx.values.type_of(a);
        let bv = self
            .ctx
            .types
            .basic_value_type(ty)
            .ok_or_else(|| IrError::type_mismatch(location, "ExpectedPrimitiveOperand", ty, ty))?;

        if matches!(op, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor) && bv.is_float() {
            return Err(IrError::type_mismatch(location, "BitwiseOpOnFloat", ty, ty));
        }
        if matches!(op, BinaryOp::Atan2F | BinaryOp::PowF) && !bv.is_float() {
            return Err(IrError::type_mismatch(location, "FloatOnlyOp", ty, ty));
        }

        if let (Some((ra, _)), Some((rb, _))) = (self.const_of(a), self.const_of(b)) {
            return Ok(self.make_const(ty, fold_binary(op, ra, rb, bv, unsigned), location));
        }

        // `x / 1.0 -> x`, `1.0 / x -> rcp(x)`: the division identities a
        // plain constant-fold can't reach because `b` isn't constant.
        if op == BinaryOp::Div && bv.is_float() {
            let one = if bv == BasicValueType::Float64 {
                bits::f64_to_raw(1.0)
            } else {
                bits::f32_to_raw(1.0)
            };
            if let Some((raw, _)) = self.const_of(a) {
                if raw == one {
                    return self.unary(UnaryOp::RcpF, b, location);
                }
            }
        }

        // Commutativity normalization: primitive LHS, non-primitive RHS -> swap.
        if op.is_commutative() && self.const_of(a).is_some() && self.const_of(b).is_none() {
            return self.binary(op, b, a, unsigned, location);
        }

        // `(x op c1) op c2` -> `x op (c1 op c2)` for associative/commutative
        // integer ops, folding the two constants into one.
        if matches!(op, BinaryOp::Add | BinaryOp::Mul | BinaryOp::And | BinaryOp::Or | BinaryOp::Xor) {
            if let Some((rb, _)) = self.const_of(b) {
                if let ValueKind::Binary(inner_op, ia, ib, inner_unsigned) = self.ctx.values.kind_of(a) {
                    if inner_op == op {
                        if let Some((rc, _)) = self.const_of(ib) {
                            let combined = self.make_const(ty, fold_binary(op, rc, rb, bv, inner_unsigned), location);
                            return self.binary(op, ia, combined, inner_unsigned, location);
                        }
                    }
                }
            }
        }

        if op == BinaryOp::Mul || op == BinaryOp::Div {
            if let Some((raw, _)) = self.const_of(b).filter(|_| bv.is_int()) {
                if let Some(shift) = bits::power_of_two_shift(raw) {
                    let shift_ty = ty;
                    let shift_amount = self.constant_int(shift_ty, shift as i64, location)?;
                    let shift_op = if op == BinaryOp::Mul {
                        BinaryOp::Shl
                    } else {
                        BinaryOp::Shr
                    };
                    return Ok(self
                        .ctx
                        .values
                        .make(ValueKind::Binary(shift_op, a, shift_amount, unsigned), ty, location));
                }
            }
        }

        Ok(self.ctx.values.make(ValueKind::Binary(op, a, b, unsigned), ty, location))
    }

    /// `abs(x)`: identity on unsigned operands, else the usual
    /// constant-folded or built `Unary(Abs, x)`.
    pub fn abs(&self, v: ValueRef, unsigned: bool, location: Location) -> IrResult<ValueRef> {
        if unsigned {
            return Ok(v);
        }
        self.unary(UnaryOp::Abs, v, location)
    }

    /// `pointerCast`: casting the address of an unnarrowed field
    /// (`LoadFieldAddress` over the 0-span, i.e. the whole object) back to
    /// a pointer over its own base element type collapses to an
    /// address-space cast of the base pointer, instead of stacking a
    /// fresh cast on top of the field address.
    pub fn pointer_cast(&self, v: ValueRef, target: TypeId, location: Location) -> IrResult<ValueRef> {
        let source = self.ctx.values.type_of(v);
        if source == target {
            return Ok(v);
        }
        if let ValueKind::LoadFieldAddress(base, span, space) = self.ctx.values.kind_of(v) {
            if span.index == 0 && span.span == 0 {
                if let (crate::types::TypeNode::Pointer(elem, base_space), crate::types::TypeNode::Pointer(target_elem, target_space)) =
                    (self.ctx.types.get(self.ctx.values.type_of(base)), self.ctx.types.get(target))
                {
                    if base_space == space && target_elem == elem {
                        return self.address_space_cast(
                            base,
                            elem,
                            target_space,
                            |e, s| self.ctx.types.pointer(e, s),
                            location,
                        );
                    }
                }
            }
        }
        if let ValueKind::Cast(CastKind::Bitcast, inner) = self.ctx.values.kind_of(v) {
            return Ok(self.ctx.values.make(ValueKind::Cast(CastKind::Bitcast, inner), target, location));
        }
        Ok(self.ctx.values.make(ValueKind::Cast(CastKind::Bitcast, v), target, location))
    }

    // ---- structures ------------------------------------------------------

    pub fn get_field(&self, o: ValueRef, span: FieldSpan, field_type: TypeId, location: Location) -> IrResult<ValueRef> {
        match self.ctx.values.kind_of(o) {
            ValueKind::ArrayValue(fields) if span.span == 1 && (span.index as usize) < fields.len() => {
                Ok(fields[span.index as usize])
            }
            ValueKind::NullConstant => Ok(self.null(field_type, location)),
            ValueKind::SetField(base, set_span, value) => {
                if set_span == span {
                    Ok(value)
                } else if set_span.contains(span) {
                    self.get_field(value, set_span.relative_to(span), field_type, location)
                } else if !set_span.overlaps(span) {
                    self.get_field(base, span, field_type, location)
                } else {
                    Ok(self.ctx.values.make(ValueKind::GetField(o, span), field_type, location))
                }
            }
            _ => Ok(self.ctx.values.make(ValueKind::GetField(o, span), field_type, location)),
        }
    }

    pub fn set_field(&self, o: ValueRef, span: FieldSpan, value: ValueRef, location: Location) -> IrResult<ValueRef> {
        let ty = self.ctx.values.type_of(o);
        match self.ctx.values.kind_of(o) {
            ValueKind::ArrayValue(mut fields) if span.span == 1 && (span.index as usize) < fields.len() => {
                fields[span.index as usize] = value;
                Ok(self.ctx.values.make(ValueKind::ArrayValue(fields), ty, location))
            }
            ValueKind::NullConstant if span.index == 0 && span.span == self.full_span(ty) => Ok(value),
            _ => Ok(self.ctx.values.make(ValueKind::SetField(o, span, value), ty, location)),
        }
    }

    fn full_span(&self, ty: TypeId) -> u32 {
        self.ctx.types.fields(ty).map(|f| f.len() as u32).unwrap_or(1)
    }

    /// `createObjectValue(o)`: lowers a language-level object into IR.
    /// Primitives and enums become constants; arrays recurse into
    /// `create_array_value` (gated by `mode`); classes always fail;
    /// structures decompose flat through `create_structure_value`.
    pub fn create_object_value(
        &self,
        obj: &LanguageObject<'_>,
        ty: TypeId,
        mode: ArrayMode,
        location: Location,
    ) -> IrResult<ValueRef> {
        match obj {
            LanguageObject::Primitive(_, raw) | LanguageObject::Enum(_, raw) => {
                let bv = self
                    .ctx
                    .types
                    .basic_value_type(ty)
                    .ok_or_else(|| IrError::type_mismatch(location, "ExpectedPrimitiveType", ty, ty))?;
                let masked = bits::zero_extend(*raw, bv.bits().max(1));
                Ok(self.make_const(ty, masked, location))
            }
            LanguageObject::Class => Err(IrError::not_supported(
                location,
                "NotSupportedClassType",
                "managed class objects have no IR value representation",
            )),
            LanguageObject::Array(arr) => self.create_array_value(arr, mode, location),
            LanguageObject::Structure(st) => self.create_structure_value(st, ty, mode, location),
        }
    }

    /// `createArrayValue`: builds an immediate array aggregate. Rejects a
    /// mutable static array unless `mode` is
    /// `ArrayMode::InlineMutableStaticArrays`.
    pub fn create_array_value(&self, obj: &ArrayObject<'_>, mode: ArrayMode, location: Location) -> IrResult<ValueRef> {
        if obj.is_static && !obj.is_immutable && mode == ArrayMode::RejectStatic {
            return Err(IrError::not_supported(
                location,
                "NotSupportedLoadFromStaticArray",
                "mutable static arrays require ArrayMode::InlineMutableStaticArrays",
            ));
        }
        let rank = obj.lengths.len().max(1) as u32;
        let total: u64 = obj.lengths.iter().product::<u64>().max(1);
        if obj.elements.len() as u64 != total {
            return Err(IrError::invalid_state(
                location,
                "ArrayElementCountMismatch",
                format!(
                    "array of lengths {:?} expects {} elements, found {}",
                    obj.lengths,
                    total,
                    obj.elements.len()
                ),
            ));
        }
        let array_ty = self.ctx.types.array(obj.element_type, rank, Some(total));
        let values = obj
            .elements
            .iter()
            .map(|e| self.create_object_value(e, obj.element_type, mode, location))
            .collect::<IrResult<Vec<_>>>()?;
        Ok(self.array_value(values, array_ty, location))
    }

    /// Decomposes a structure object flat, field by field. A field slot
    /// with no supplied object must correspond to a `Padding` type slot;
    /// its raw bytes are read out of `obj.raw_bytes` at the slot's natural
    /// offset and reassembled little-endian.
    fn create_structure_value(&self, obj: &StructureObject<'_>, ty: TypeId, mode: ArrayMode, location: Location) -> IrResult<ValueRef> {
        let field_types = self
            .ctx
            .types
            .fields(ty)
            .ok_or_else(|| IrError::type_mismatch(location, "ExpectedStructureType", ty, ty))?;
        if obj.fields.len() != field_types.len() {
            return Err(IrError::invalid_state(
                location,
                "StructureFieldCountMismatch",
                format!("type has {} fields, object supplies {}", field_types.len(), obj.fields.len()),
            ));
        }

        let mut offset = 0u64;
        let mut values = Vec::with_capacity(field_types.len());
        for (field_ty, field_obj) in field_types.iter().zip(obj.fields.iter()) {
            let align = self.ctx.types.align_of(*field_ty).max(1);
            offset = align_up(offset, align);

            let value = match field_obj {
                Some(o) => self.create_object_value(o, *field_ty, mode, location)?,
                None => {
                    if !matches!(self.ctx.types.get(*field_ty), TypeNode::Padding(_)) {
                        return Err(IrError::invalid_state(
                            location,
                            "MissingStructureField",
                            "a non-padding field requires a supplied object",
                        ));
                    }
                    let bv = self.ctx.types.basic_value_type(*field_ty).unwrap();
                    let raw = read_padding_bytes(obj.raw_bytes.bytes(), offset as usize, bv, location)?;
                    self.make_const(*field_ty, raw, location)
                }
            };
            values.push(value);
            offset += self.ctx.types.size_of(*field_ty);
        }
        Ok(self.array_value(values, ty, location))
    }

    // ---- pointers / views -------------------------------------------------

    pub fn load_element_address(&self, p: ValueRef, index: ValueRef, space: AddressSpace, elem: TypeId, location: Location) -> IrResult<ValueRef> {
        if let Some((0, _)) = self.const_of(index) {
            return Ok(p);
        }
        let ty = self.ctx.types.pointer(elem, space);
        Ok(self
            .ctx
            .values
            .make(ValueKind::LoadElementAddress(p, index, space), ty, location))
    }

    pub fn load_field_address(&self, p: ValueRef, span: FieldSpan, elem_is_structure: bool, space: AddressSpace, field_type: TypeId, location: Location) -> IrResult<ValueRef> {
        if !elem_is_structure && span.index == 0 && span.span < 2 {
            return Ok(p);
        }
        if let ValueKind::LoadFieldAddress(base, inner_span, inner_space) = self.ctx.values.kind_of(p) {
            if inner_space == space {
                let composed = inner_span.narrow(span);
                let ty = self.ctx.types.pointer(field_type, space);
                return Ok(self
                    .ctx
                    .values
                    .make(ValueKind::LoadFieldAddress(base, composed, space), ty, location));
            }
        }
        let ty = self.ctx.types.pointer(field_type, space);
        Ok(self
            .ctx
            .values
            .make(ValueKind::LoadFieldAddress(p, span, space), ty, location))
    }

    /// `alignmentOffset(ptr, a) = (a - (ptr & (a-1))) & (a-1)`, expanded
    /// through the builder's own integer arithmetic factories so the
    /// result participates in the same folding as hand-written code.
    pub fn alignment_offset(&self, ptr_as_int: ValueRef, alignment: u64, int_ty: TypeId, location: Location) -> IrResult<ValueRef> {
        let mask = self.constant_int(int_ty, (alignment - 1) as i64, location)?;
        let masked = self.binary(BinaryOp::And, ptr_as_int, mask, true, location)?;
        let align_const = self.constant_int(int_ty, alignment as i64, location)?;
        let base = self.binary(BinaryOp::Sub, align_const, masked, true, location)?;
        self.binary(BinaryOp::And, base, mask, true, location)
    }

    // ---- arrays ------------------------------------------------------------

    pub fn array_value(&self, elements: Vec<ValueRef>, ty: TypeId, location: Location) -> ValueRef {
        self.ctx.values.make(ValueKind::ArrayValue(elements), ty, location)
    }

    /// `newArray(T, lengths...)`: one length operand per dimension of the
    /// array type `array_ty`.
    pub fn new_array(&self, array_ty: TypeId, lengths: Vec<ValueRef>, location: Location) -> ValueRef {
        self.ctx.values.make(ValueKind::NewArray(array_ty, lengths), array_ty, location)
    }

    /// `getArrayLength`: total element count when `dim` is `None`, else the
    /// length of dimension `dim`.
    pub fn get_array_length(&self, array: ValueRef, dim: Option<u32>, int_ty: TypeId, location: Location) -> ValueRef {
        self.ctx.values.make(ValueKind::GetArrayLength(array, dim), int_ty, location)
    }

    pub fn load_array_element_address(
        &self,
        array: ValueRef,
        indices: Vec<ValueRef>,
        space: AddressSpace,
        elem: TypeId,
        location: Location,
    ) -> ValueRef {
        let ty = self.ctx.types.pointer(elem, space);
        self.ctx
            .values
            .make(ValueKind::LoadArrayElementAddress(array, indices, space), ty, location)
    }

    /// A placeholder filling the use-site of a value scheduled for
    /// removal (see [`super::method_builder::MethodBuilder::perform_removal`]).
    pub fn undefined(&self, ty: TypeId, location: Location) -> ValueRef {
        self.ctx.values.make(ValueKind::Undefined, ty, location)
    }

    // ---- terminators ---------------------------------------------------------

    pub fn ret(&self, value: Option<ValueRef>, return_type: TypeId, location: Location) -> IrResult<ValueRef> {
        if let Some(v) = value {
            let vt = self.ctx.values.type_of(v);
            if vt != return_type {
                return Err(IrError::type_mismatch(location, "ReturnTypeMismatch", return_type, vt));
            }
        } else if !self.ctx.types.is_void(return_type) {
            return Err(IrError::type_mismatch(location, "ReturnTypeMismatch", return_type, return_type));
        }
        let void_ty = self.ctx.types.void_type();
        Ok(self.ctx.values.make(ValueKind::Return(value), void_ty, location))
    }

    pub fn branch(&self, target: super::entities::BlockId, location: Location) -> ValueRef {
        let void_ty = self.ctx.types.void_type();
        self.ctx.values.make(ValueKind::Branch(target), void_ty, location)
    }

    pub fn cond_branch(
        &self,
        cond: ValueRef,
        if_true: super::entities::BlockId,
        if_false: super::entities::BlockId,
        location: Location,
    ) -> ValueRef {
        let void_ty = self.ctx.types.void_type();
        self.ctx
            .values
            .make(ValueKind::CondBranch(cond, if_true, if_false), void_ty, location)
    }

    /// `createSwitchBranch`: a switch with exactly two targets lowers to
    /// a conditional branch against zero.
    pub fn switch_branch(
        &self,
        value: ValueRef,
        targets: Vec<(u64, super::entities::BlockId)>,
        default: super::entities::BlockId,
        location: Location,
    ) -> IrResult<ValueRef> {
        if targets.len() == 1 {
            let (case, target) = targets[0];
            let ty = self.ctx.values.type_of(value);
            let case_value = self.constant_int(ty, case as i64, location)?;
            let cond = self.compare(CompareKind::Eq, value, case_value, false, location)?;
            return Ok(self.cond_branch(cond, target, default, location));
        }
        let void_ty = self.ctx.types.void_type();
        Ok(self
            .ctx
            .values
            .make(ValueKind::Switch(value, targets, default), void_ty, location))
    }

    pub fn unreachable(&self, location: Location) -> ValueRef {
        let void_ty = self.ctx.types.void_type();
        self.ctx.values.make(ValueKind::Unreachable, void_ty, location)
    }

    pub fn phi(&self, incoming: Vec<(super::entities::BlockId, ValueRef)>, ty: TypeId, location: Location) -> ValueRef {
        self.ctx.values.make(ValueKind::Phi(incoming), ty, location)
    }
}

fn fold_unary(op: UnaryOp, raw: u64, bv: BasicValueType) -> u64 {
    match (op, bv) {
        (UnaryOp::Not, _) => !raw & bits::zero_extend(u64::MAX, bv.bits().max(1)),
        (UnaryOp::Neg, BasicValueType::Int1) => (!raw) & 1,
        (UnaryOp::Neg, b) if b.is_float() => {
            if b == BasicValueType::Float64 {
                bits::f64_to_raw(-bits::raw_to_f64(raw))
            } else {
                bits::f32_to_raw(-bits::raw_to_f32(raw))
            }
        }
        (UnaryOp::Neg, b) => bits::zero_extend((raw as i64).wrapping_neg() as u64, b.bits().max(1)),
        (UnaryOp::Abs, BasicValueType::Int1) => raw & 1,
        (UnaryOp::Abs, b) if b.is_float() => {
            if b == BasicValueType::Float64 {
                bits::f64_to_raw(bits::raw_to_f64(raw).abs())
            } else {
                bits::f32_to_raw(bits::raw_to_f32(raw).abs())
            }
        }
        (UnaryOp::Abs, b) => {
            let signed = bits::sign_extend(raw, b.bits().max(1)) as i64;
            bits::zero_extend(signed.wrapping_abs() as u64, b.bits().max(1))
        }
        (UnaryOp::RcpF, b) if b.is_float() => {
            if b == BasicValueType::Float64 {
                bits::f64_to_raw(1.0 / bits::raw_to_f64(raw))
            } else {
                bits::f32_to_raw(1.0 / bits::raw_to_f32(raw))
            }
        }
        (UnaryOp::RcpF, _) => unreachable!("RcpF only constructed for float operands"),
    }
}

fn fold_binary(op: BinaryOp, a: u64, b: u64, bv: BasicValueType, unsigned: bool) -> u64 {
    if bv.is_float() {
        return fold_binary_float(op, a, b, bv);
    }
    let bits_width = bv.bits().max(1);
    let result = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div if unsigned => {
            if b == 0 {
                0
            } else {
                a.wrapping_div(b)
            }
        }
        BinaryOp::Div => {
            if b == 0 {
                0
            } else {
                (bits::sign_extend(a, bits_width) as i64 / bits::sign_extend(b, bits_width) as i64) as u64
            }
        }
        BinaryOp::Rem if unsigned => {
            if b == 0 {
                0
            } else {
                a.wrapping_rem(b)
            }
        }
        BinaryOp::Rem => {
            if b == 0 {
                0
            } else {
                (bits::sign_extend(a, bits_width) as i64 % bits::sign_extend(b, bits_width) as i64) as u64
            }
        }
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Shl => a.wrapping_shl(b as u32 % bits_width.max(1)),
        BinaryOp::Shr if unsigned => a.wrapping_shr(b as u32 % bits_width.max(1)),
        BinaryOp::Shr => {
            let signed = bits::sign_extend(a, bits_width) as i64;
            (signed.wrapping_shr(b as u32 % bits_width.max(1))) as u64
        }
        BinaryOp::Atan2F | BinaryOp::PowF => unreachable!("float-only op reaches integer fold path"),
    };
    bits::zero_extend(result, bits_width)
}

fn fold_binary_float(op: BinaryOp, a: u64, b: u64, bv: BasicValueType) -> u64 {
    let (fa, fb) = if bv == BasicValueType::Float64 {
        (bits::raw_to_f64(a), bits::raw_to_f64(b))
    } else {
        (bits::raw_to_f32(a) as f64, bits::raw_to_f32(b) as f64)
    };
    let result = match op {
        BinaryOp::Add => fa + fb,
        BinaryOp::Sub => fa - fb,
        BinaryOp::Mul => fa * fb,
        BinaryOp::Div => fa / fb,
        BinaryOp::Rem => fa % fb,
        BinaryOp::Atan2F => fa.atan2(fb),
        BinaryOp::PowF => fa.powf(fb),
        _ => unreachable!("bitwise op on float already rejected before folding"),
    };
    if bv == BasicValueType::Float64 {
        bits::f64_to_raw(result)
    } else {
        bits::f32_to_raw(result as f32)
    }
}

/// `unsigned_or_unordered`: for integers, selects unsigned rather than
/// signed comparison; for floats, selects unordered (true on either
/// operand NaN) rather than ordered (false on either operand NaN)
/// semantics, following the LLVM `fcmp` convention.
fn fold_compare(kind: CompareKind, a: u64, b: u64, bv: BasicValueType, unsigned_or_unordered: bool) -> bool {
    if bv.is_float() {
        let (fa, fb) = if bv == BasicValueType::Float64 {
            (bits::raw_to_f64(a), bits::raw_to_f64(b))
        } else {
            (bits::raw_to_f32(a) as f64, bits::raw_to_f32(b) as f64)
        };
        if fa.is_nan() || fb.is_nan() {
            return unsigned_or_unordered;
        }
        return match kind {
            CompareKind::Eq => fa == fb,
            CompareKind::Ne => fa != fb,
            CompareKind::Lt => fa < fb,
            CompareKind::Le => fa <= fb,
            CompareKind::Gt => fa > fb,
            CompareKind::Ge => fa >= fb,
        };
    }
    let bits_width = bv.bits().max(1);
    if unsigned_or_unordered {
        let (ua, ub) = (bits::zero_extend(a, bits_width), bits::zero_extend(b, bits_width));
        return match kind {
            CompareKind::Eq => ua == ub,
            CompareKind::Ne => ua != ub,
            CompareKind::Lt => ua < ub,
            CompareKind::Le => ua <= ub,
            CompareKind::Gt => ua > ub,
            CompareKind::Ge => ua >= ub,
        };
    }
    let (ia, ib) = (bits::sign_extend(a, bits_width) as i64, bits::sign_extend(b, bits_width) as i64);
    match kind {
        CompareKind::Eq => ia == ib,
        CompareKind::Ne => ia != ib,
        CompareKind::Lt => ia < ib,
        CompareKind::Le => ia <= ib,
        CompareKind::Gt => ia > ib,
        CompareKind::Ge => ia >= ib,
    }
}

/// `source_unsigned` governs `IntToFloat`'s source read; `target_unsigned`
/// governs `FloatToInt`'s target write. Both are ignored by the two
/// float-width conversions, which have no integer side.
fn fold_convert(kind: ConvertKind, raw: u64, source: BasicValueType, target: BasicValueType, source_unsigned: bool, target_unsigned: bool) -> u64 {
    match kind {
        ConvertKind::IntToFloat => {
            let value = if source_unsigned {
                bits::zero_extend(raw, source.bits().max(1)) as f64
            } else {
                bits::sign_extend(raw, source.bits().max(1)) as i64 as f64
            };
            if target == BasicValueType::Float64 {
                bits::f64_to_raw(value)
            } else {
                bits::f32_to_raw(value as f32)
            }
        }
        ConvertKind::FloatToInt => {
            let value = if source == BasicValueType::Float64 {
                bits::raw_to_f64(raw)
            } else {
                bits::raw_to_f32(raw) as f64
            };
            let int_value = if target_unsigned { value as u64 } else { value as i64 as u64 };
            bits::zero_extend(int_value, target.bits().max(1))
        }
        ConvertKind::FloatExtend => {
            let value = bits::raw_to_f32(raw) as f64;
            bits::f64_to_raw(value)
        }
        ConvertKind::FloatTruncate => {
            let value = bits::raw_to_f64(raw);
            bits::f32_to_raw(value as f32)
        }
    }
}

fn align_up(offset: u64, align: u64) -> u64 {
    if align == 0 {
        offset
    } else {
        offset.div_ceil(align) * align
    }
}

/// Reads `bv.bytes()` little-endian bytes out of `bytes` at `offset`,
/// the pinned-memory path for structure padding recovery.
fn read_padding_bytes(bytes: &[u8], offset: usize, bv: BasicValueType, location: Location) -> IrResult<u64> {
    let width = bv.bytes() as usize;
    let end = offset
        .checked_add(width)
        .ok_or_else(|| IrError::argument_out_of_range(location, "PaddingReadOutOfRange", "offset overflow"))?;
    let slice = bytes
        .get(offset..end)
        .ok_or_else(|| IrError::argument_out_of_range(location, "PaddingReadOutOfRange", format!("need bytes [{offset}, {end}) of a {}-byte buffer", bytes.len())))?;
    let mut raw = 0u64;
    for (i, byte) in slice.iter().enumerate() {
        raw |= (*byte as u64) << (i * 8);
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CompilationContext;
    use crate::types::BasicValueType;

    fn ctx() -> CompilationContext {
        CompilationContext::new()
    }

    #[test]
    fn constant_fold_matches_reference_add() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let a = b.constant_int(i32t, 5, Location::unknown()).unwrap();
        let c = b.constant_int(i32t, 7, Location::unknown()).unwrap();
        let sum = b.binary(BinaryOp::Add, a, c, false, Location::unknown()).unwrap();
        match ctx.values.kind_of(sum) {
            ValueKind::Constant(raw) => assert_eq!(raw as i32, 12),
            other => panic!("expected folded constant, got {other:?}"),
        }
    }

    #[test]
    fn commutativity_normalization_moves_constant_to_rhs() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let five = b.constant_int(i32t, 5, Location::unknown()).unwrap();
        let param = b.param(0, i32t, Location::unknown());
        let sum = b.binary(BinaryOp::Add, five, param, false, Location::unknown()).unwrap();
        match ctx.values.kind_of(sum) {
            ValueKind::Binary(BinaryOp::Add, lhs, rhs, _) => {
                assert_eq!(lhs.id(), param.id());
                assert_eq!(rhs.id(), five.id());
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn identity_pointer_bitcast_returns_same_node() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let ptr_ty = ctx.types.pointer(i32t, AddressSpace::Generic);
        let p = b.param(0, ptr_ty, Location::unknown());
        let same = b.cast(CastKind::Bitcast, p, ptr_ty, Location::unknown()).unwrap();
        assert_eq!(p.id(), same.id());
    }

    #[test]
    fn int1_compare_against_true_is_identity_against_false_is_not() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let bool_ty = ctx.types.primitive_type(BasicValueType::Int1);
        let x = b.param(0, bool_ty, Location::unknown());
        let t = b.constant_bool(true, Location::unknown());
        let f = b.constant_bool(false, Location::unknown());

        let eq_true = b.compare(CompareKind::Eq, x, t, false, Location::unknown()).unwrap();
        assert_eq!(eq_true.id(), x.id());

        let eq_false = b.compare(CompareKind::Eq, x, f, false, Location::unknown()).unwrap();
        match ctx.values.kind_of(eq_false) {
            ValueKind::Unary(UnaryOp::Not, inner) => assert_eq!(inner.id(), x.id()),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn double_negation_collapses() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let bool_ty = ctx.types.primitive_type(BasicValueType::Int1);
        let x = b.param(0, bool_ty, Location::unknown());
        let not_x = b.unary(UnaryOp::Not, x, Location::unknown()).unwrap();
        let not_not_x = b.unary(UnaryOp::Not, not_x, Location::unknown()).unwrap();
        assert_eq!(not_not_x.id(), x.id());
    }

    #[test]
    fn not_of_compare_inverts_kind() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let a = b.param(0, i32t, Location::unknown());
        let c = b.param(1, i32t, Location::unknown());
        let lt = b.compare(CompareKind::Lt, a, c, false, Location::unknown()).unwrap();
        let not_lt = b.unary(UnaryOp::Not, lt, Location::unknown()).unwrap();
        match ctx.values.kind_of(not_lt) {
            ValueKind::Compare(CompareKind::Ge, .., false) => {}
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn load_element_address_zero_index_is_identity() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let ptr_ty = ctx.types.pointer(i32t, AddressSpace::Generic);
        let p = b.param(0, ptr_ty, Location::unknown());
        let zero = b.constant_int(i32t, 0, Location::unknown()).unwrap();
        let same = b
            .load_element_address(p, zero, AddressSpace::Generic, i32t, Location::unknown())
            .unwrap();
        assert_eq!(p.id(), same.id());
    }

    #[test]
    fn nested_field_address_composes_spans() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i8t = ctx.types.primitive_type(BasicValueType::Int8);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let inner_struct = ctx.types.structure(vec![i8t, i32t]);
        let outer_struct = ctx.types.structure(vec![i32t, inner_struct]);
        let ptr_ty = ctx.types.pointer(outer_struct, AddressSpace::Generic);
        let p = b.param(0, ptr_ty, Location::unknown());

        let to_inner = b
            .load_field_address(p, FieldSpan::single(1), true, AddressSpace::Generic, inner_struct, Location::unknown())
            .unwrap();
        let to_field = b
            .load_field_address(
                to_inner,
                FieldSpan::single(1),
                true,
                AddressSpace::Generic,
                i32t,
                Location::unknown(),
            )
            .unwrap();
        match ctx.values.kind_of(to_field) {
            ValueKind::LoadFieldAddress(base, span, _) => {
                assert_eq!(base.id(), p.id());
                assert_eq!(span, FieldSpan::single(2));
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn get_field_over_set_field_exact_match() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let st = ctx.types.structure(vec![i32t, i32t]);
        let o = b.null(st, Location::unknown());
        let v = b.constant_int(i32t, 42, Location::unknown()).unwrap();
        let updated = b.set_field(o, FieldSpan::single(0), v, Location::unknown()).unwrap();
        let got = b.get_field(updated, FieldSpan::single(0), i32t, Location::unknown()).unwrap();
        assert_eq!(got.id(), v.id());
    }

    #[test]
    fn get_field_disjoint_from_set_field_recurses_into_base() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let st = ctx.types.structure(vec![i32t, i32t]);
        let o = b.null(st, Location::unknown());
        let v = b.constant_int(i32t, 42, Location::unknown()).unwrap();
        let updated = b.set_field(o, FieldSpan::single(0), v, Location::unknown()).unwrap();
        let got = b.get_field(updated, FieldSpan::single(1), i32t, Location::unknown()).unwrap();
        // field 1 is an i32 (primitive), so recursing into the null base
        // resolves to a primitive zero constant, not a `NullValue` node.
        match ctx.values.kind_of(got) {
            ValueKind::Constant(0) => {}
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn mul_by_power_of_two_becomes_shift() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let x = b.param(0, i32t, Location::unknown());
        let eight = b.constant_int(i32t, 8, Location::unknown()).unwrap();
        let product = b.binary(BinaryOp::Mul, x, eight, false, Location::unknown()).unwrap();
        match ctx.values.kind_of(product) {
            ValueKind::Binary(BinaryOp::Shl, lhs, shift, _) => {
                assert_eq!(lhs.id(), x.id());
                match ctx.values.kind_of(shift) {
                    ValueKind::Constant(raw) => assert_eq!(raw, 3),
                    other => panic!("unexpected shift amount kind: {other:?}"),
                }
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn bitwise_op_on_float_is_rejected() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let a = b.constant_f32(1.0, Location::unknown());
        let c = b.constant_f32(2.0, Location::unknown());
        assert!(b.binary(BinaryOp::And, a, c, false, Location::unknown()).is_err());
    }

    #[test]
    fn switch_with_single_target_lowers_to_cond_branch() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let v = b.param(0, i32t, Location::unknown());
        let t = super::super::entities::BlockId::from_u32(1);
        let d = super::super::entities::BlockId::from_u32(2);
        let branch = b.switch_branch(v, vec![(7, t)], d, Location::unknown()).unwrap();
        match ctx.values.kind_of(branch) {
            ValueKind::CondBranch(_, if_true, if_false) => {
                assert_eq!(if_true, t);
                assert_eq!(if_false, d);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn abs_is_identity_on_unsigned() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let x = b.param(0, i32t, Location::unknown());
        let same = b.abs(x, true, Location::unknown()).unwrap();
        assert_eq!(x.id(), same.id());
    }

    #[test]
    fn abs_folds_negative_constant() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let neg = b.constant_int(i32t, -5, Location::unknown()).unwrap();
        let result = b.abs(neg, false, Location::unknown()).unwrap();
        match ctx.values.kind_of(result) {
            ValueKind::Constant(raw) => assert_eq!(raw as i32, 5),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn abs_of_float_constant_folds() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let neg = b.constant_f32(-2.5, Location::unknown());
        let result = b.abs(neg, false, Location::unknown()).unwrap();
        match ctx.values.kind_of(result) {
            ValueKind::Constant(raw) => assert_eq!(bits::raw_to_f32(raw), 2.5),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn div_by_constant_one_point_zero_rewrites_to_reciprocal() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let one = b.constant_f32(1.0, Location::unknown());
        let x = b.param(0, ctx.types.primitive_type(BasicValueType::Float32), Location::unknown());
        let result = b.binary(BinaryOp::Div, one, x, false, Location::unknown()).unwrap();
        match ctx.values.kind_of(result) {
            ValueKind::Unary(UnaryOp::RcpF, inner) => assert_eq!(inner.id(), x.id()),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn atan2_and_pow_reject_integer_operands() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let a = b.param(0, i32t, Location::unknown());
        let c = b.param(1, i32t, Location::unknown());
        assert!(b.binary(BinaryOp::Atan2F, a, c, false, Location::unknown()).is_err());
        assert!(b.binary(BinaryOp::PowF, a, c, false, Location::unknown()).is_err());
    }

    #[test]
    fn pow_f_folds_float_constants() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let base = b.constant_f64(2.0, Location::unknown());
        let exp = b.constant_f64(10.0, Location::unknown());
        let result = b.binary(BinaryOp::PowF, base, exp, false, Location::unknown()).unwrap();
        match ctx.values.kind_of(result) {
            ValueKind::Constant(raw) => assert_eq!(bits::raw_to_f64(raw), 1024.0),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn nested_additive_constants_combine() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let x = b.param(0, i32t, Location::unknown());
        let one = b.constant_int(i32t, 1, Location::unknown()).unwrap();
        let two = b.constant_int(i32t, 2, Location::unknown()).unwrap();
        let x_plus_one = b.binary(BinaryOp::Add, x, one, false, Location::unknown()).unwrap();
        let result = b.binary(BinaryOp::Add, x_plus_one, two, false, Location::unknown()).unwrap();
        match ctx.values.kind_of(result) {
            ValueKind::Binary(BinaryOp::Add, lhs, rhs, _) => {
                assert_eq!(lhs.id(), x.id());
                match ctx.values.kind_of(rhs) {
                    ValueKind::Constant(raw) => assert_eq!(raw as i32, 3),
                    other => panic!("unexpected combined constant kind: {other:?}"),
                }
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn pointer_cast_over_whole_object_field_address_collapses_to_address_space_cast() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let ptr_ty = ctx.types.pointer(i32t, AddressSpace::Generic);
        let p = b.param(0, ptr_ty, Location::unknown());
        let whole_object = b
            .load_field_address(p, FieldSpan::new(0, 0), true, AddressSpace::Generic, i32t, Location::unknown())
            .unwrap();
        let target_ty = ctx.types.pointer(i32t, AddressSpace::Global);
        let result = b.pointer_cast(whole_object, target_ty, Location::unknown()).unwrap();
        match ctx.values.kind_of(result) {
            ValueKind::Cast(CastKind::Bitcast, inner) => assert_eq!(inner.id(), p.id()),
            other => panic!("unexpected kind: {other:?}"),
        }
        assert_eq!(ctx.values.type_of(result), target_ty);
    }

    #[test]
    fn pointer_cast_over_nested_bitcast_collapses_to_single_cast() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let i64t = ctx.types.primitive_type(BasicValueType::Int64);
        let ptr_i32 = ctx.types.pointer(i32t, AddressSpace::Generic);
        let ptr_i64 = ctx.types.pointer(i64t, AddressSpace::Generic);
        let ptr_i8 = ctx.types.pointer(ctx.types.primitive_type(BasicValueType::Int8), AddressSpace::Generic);
        let p = b.param(0, ptr_i32, Location::unknown());
        let once = b.pointer_cast(p, ptr_i64, Location::unknown()).unwrap();
        let twice = b.pointer_cast(once, ptr_i8, Location::unknown()).unwrap();
        match ctx.values.kind_of(twice) {
            ValueKind::Cast(CastKind::Bitcast, inner) => assert_eq!(inner.id(), p.id()),
            other => panic!("unexpected kind: {other:?}"),
        }
        assert_eq!(ctx.values.type_of(twice), ptr_i8);
    }

    #[test]
    fn view_cast_identity_on_matching_element_and_space() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let view_ty = ctx.types.view(i32t, AddressSpace::Generic);
        let v = b.param(0, view_ty, Location::unknown());
        let same = b.view_cast(v, i32t, AddressSpace::Generic, Location::unknown()).unwrap();
        assert_eq!(v.id(), same.id());
    }

    #[test]
    fn view_cast_builds_fresh_cast_on_space_change() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let view_ty = ctx.types.view(i32t, AddressSpace::Generic);
        let v = b.param(0, view_ty, Location::unknown());
        let cast = b.view_cast(v, i32t, AddressSpace::Global, Location::unknown()).unwrap();
        match ctx.values.kind_of(cast) {
            ValueKind::Cast(CastKind::Bitcast, inner) => assert_eq!(inner.id(), v.id()),
            other => panic!("unexpected kind: {other:?}"),
        }
        assert_eq!(ctx.values.type_of(cast), ctx.types.view(i32t, AddressSpace::Global));
    }

    #[test]
    fn int_as_pointer_always_constructs_even_when_types_would_otherwise_match() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i64t = ctx.types.primitive_type(BasicValueType::Int64);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let ptr_ty = ctx.types.pointer(i32t, AddressSpace::Generic);
        let v = b.param(0, i64t, Location::unknown());
        let p = b.int_as_pointer(v, ptr_ty, Location::unknown()).unwrap();
        match ctx.values.kind_of(p) {
            ValueKind::Cast(CastKind::Bitcast, inner) => assert_eq!(inner.id(), v.id()),
            other => panic!("unexpected kind: {other:?}"),
        }
        assert!(b.int_as_pointer(v, i64t, Location::unknown()).is_err());
    }

    #[test]
    fn pointer_as_int_rejects_non_pointer_source() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let i64t = ctx.types.primitive_type(BasicValueType::Int64);
        let ptr_ty = ctx.types.pointer(i32t, AddressSpace::Generic);
        let p = b.param(0, ptr_ty, Location::unknown());
        let i = b.pointer_as_int(p, i64t, Location::unknown()).unwrap();
        match ctx.values.kind_of(i) {
            ValueKind::Cast(CastKind::Bitcast, inner) => assert_eq!(inner.id(), p.id()),
            other => panic!("unexpected kind: {other:?}"),
        }
        let not_a_pointer = b.param(1, i64t, Location::unknown());
        assert!(b.pointer_as_int(not_a_pointer, i64t, Location::unknown()).is_err());
    }

    #[test]
    fn float_as_int_reinterprets_constant_bits() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let f = b.constant_f32(1.0, Location::unknown());
        let i = b.float_as_int(f, i32t, Location::unknown()).unwrap();
        match ctx.values.kind_of(i) {
            ValueKind::Constant(raw) => assert_eq!(raw, bits::f32_to_raw(1.0)),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn float_as_int_rejects_width_mismatch() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i64t = ctx.types.primitive_type(BasicValueType::Int64);
        let f = b.constant_f32(1.0, Location::unknown());
        assert!(b.float_as_int(f, i64t, Location::unknown()).is_err());
    }

    #[test]
    fn int_as_float_reinterprets_constant_bits() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let f32t = ctx.types.primitive_type(BasicValueType::Float32);
        let i = b.constant_int(ctx.types.primitive_type(BasicValueType::Int32), bits::f32_to_raw(2.5) as i64, Location::unknown()).unwrap();
        let f = b.int_as_float(i, f32t, Location::unknown()).unwrap();
        match ctx.values.kind_of(f) {
            ValueKind::Constant(raw) => assert_eq!(bits::raw_to_f32(raw), 2.5),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn unsigned_div_differs_from_signed_on_negative_constant() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let neg_one = b.constant_int(i32t, -1, Location::unknown()).unwrap();
        let two = b.constant_int(i32t, 2, Location::unknown()).unwrap();
        let signed = b.binary(BinaryOp::Div, neg_one, two, false, Location::unknown()).unwrap();
        let unsigned = b.binary(BinaryOp::Div, neg_one, two, true, Location::unknown()).unwrap();
        match (ctx.values.kind_of(signed), ctx.values.kind_of(unsigned)) {
            (ValueKind::Constant(s), ValueKind::Constant(u)) => {
                assert_eq!(s as i32, 0);
                assert_eq!(u as u32, u32::MAX / 2);
            }
            other => panic!("unexpected kinds: {other:?}"),
        }
    }

    #[test]
    fn not_of_compare_toggles_unordered_on_float_operands() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let f32t = ctx.types.primitive_type(BasicValueType::Float32);
        let a = b.param(0, f32t, Location::unknown());
        let c = b.param(1, f32t, Location::unknown());
        let lt = b.compare(CompareKind::Lt, a, c, false, Location::unknown()).unwrap();
        let not_lt = b.unary(UnaryOp::Not, lt, Location::unknown()).unwrap();
        match ctx.values.kind_of(not_lt) {
            ValueKind::Compare(CompareKind::Ge, _, _, unsigned_or_unordered) => assert!(unsigned_or_unordered),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn new_array_and_get_array_length_roundtrip() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let arr_ty = ctx.types.array(i32t, 1, None);
        let len = b.constant_int(i32t, 10, Location::unknown()).unwrap();
        let array = b.new_array(arr_ty, vec![len], Location::unknown());
        let count = b.get_array_length(array, None, i32t, Location::unknown());
        match ctx.values.kind_of(count) {
            ValueKind::GetArrayLength(a, None) => assert_eq!(a.id(), array.id()),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn load_array_element_address_produces_pointer_to_element() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let arr_ty = ctx.types.array(i32t, 1, None);
        let len = b.constant_int(i32t, 10, Location::unknown()).unwrap();
        let array = b.new_array(arr_ty, vec![len], Location::unknown());
        let idx = b.constant_int(i32t, 3, Location::unknown()).unwrap();
        let addr = b.load_array_element_address(array, vec![idx], AddressSpace::Generic, i32t, Location::unknown());
        assert_eq!(ctx.values.type_of(addr), ctx.types.pointer(i32t, AddressSpace::Generic));
    }

    #[test]
    fn undefined_preserves_type() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let u = b.undefined(i32t, Location::unknown());
        assert_eq!(ctx.values.type_of(u), i32t);
        match ctx.values.kind_of(u) {
            ValueKind::Undefined => {}
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn create_object_value_lowers_primitive_and_rejects_class() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let v = b
            .create_object_value(&LanguageObject::Primitive(i32t, 7), i32t, ArrayMode::RejectStatic, Location::unknown())
            .unwrap();
        match ctx.values.kind_of(v) {
            ValueKind::Constant(raw) => assert_eq!(raw as i32, 7),
            other => panic!("expected constant, got {other:?}"),
        }

        let err = b
            .create_object_value(&LanguageObject::Class, i32t, ArrayMode::RejectStatic, Location::unknown())
            .unwrap_err();
        assert_eq!(err.key(), "NotSupportedClassType");
    }

    #[test]
    fn create_array_value_rejects_mutable_static_under_reject_static_mode() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let arr = ArrayObject {
            element_type: i32t,
            lengths: vec![2],
            elements: vec![LanguageObject::Primitive(i32t, 1), LanguageObject::Primitive(i32t, 2)],
            is_static: true,
            is_immutable: false,
        };
        let err = b
            .create_array_value(&arr, ArrayMode::RejectStatic, Location::unknown())
            .unwrap_err();
        assert_eq!(err.key(), "NotSupportedLoadFromStaticArray");

        let v = b
            .create_array_value(&arr, ArrayMode::InlineMutableStaticArrays, Location::unknown())
            .unwrap();
        match ctx.values.kind_of(v) {
            ValueKind::ArrayValue(elems) => assert_eq!(elems.len(), 2),
            other => panic!("expected array value, got {other:?}"),
        }
    }

    #[test]
    fn create_structure_value_fills_padding_from_raw_bytes() {
        let ctx = ctx();
        let b = IrBuilder::new(&ctx);
        let i8t = ctx.types.primitive_type(BasicValueType::Int8);
        let i32t = ctx.types.primitive_type(BasicValueType::Int32);
        let pad_ty = ctx.types.padding(BasicValueType::Int8);
        // { i8, pad*3, i32 }: the padding slot recovers its 3 bytes from
        // the raw backing buffer at its natural offset instead of being
        // supplied by the frontend.
        let st_ty = ctx.types.structure(vec![i8t, pad_ty, i32t]);
        let raw_bytes = [0xAAu8, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x11, 0x22];
        let guard = gpuir_utils::pin::PinGuard::new(&raw_bytes);
        let obj = StructureObject {
            fields: vec![
                Some(LanguageObject::Primitive(i8t, 0x42)),
                None,
                Some(LanguageObject::Primitive(i32t, 99)),
            ],
            raw_bytes: guard,
        };
        let v = b
            .create_structure_value(&obj, st_ty, ArrayMode::RejectStatic, Location::unknown())
            .unwrap();
        match ctx.values.kind_of(v) {
            ValueKind::ArrayValue(elems) => {
                assert_eq!(elems.len(), 3);
                match ctx.values.kind_of(elems[0]) {
                    ValueKind::Constant(raw) => assert_eq!(raw as u8, 0x42),
                    other => panic!("unexpected kind: {other:?}"),
                }
                match ctx.values.kind_of(elems[1]) {
                    ValueKind::Constant(raw) => assert_eq!(raw as u8, 0xBB),
                    other => panic!("unexpected kind: {other:?}"),
                }
                match ctx.values.kind_of(elems[2]) {
                    ValueKind::Constant(raw) => assert_eq!(raw as i32, 99),
                    other => panic!("unexpected kind: {other:?}"),
                }
            }
            other => panic!("expected array value, got {other:?}"),
        }
    }

    #[test]
    fn force_32bit_floats_coerces_f64_constants() {
        let ctx = ctx();
        let b = IrBuilder::with_flags(
            &ctx,
            ContextFlags {
                force_32bit_floats: true,
                enable_debug_information: false,
            },
        );
        let v = b.constant_f64(1.5, Location::unknown());
        assert_eq!(ctx.values.type_of(v), ctx.types.primitive_type(BasicValueType::Float32));
    }
}
