//! `Rebuilder` — clones a method's blocks into another method, remapping
//! every operand through a value and block mapping accumulated as blocks
//! and values are cloned. Interned `TypeId`s need no remapping: source
//! and target methods built from the same [`CompilationContext`] share
//! one `TypeContext`.
//!
//! `specialize_call` composes the rebuilder with [`MethodBuilder`]'s
//! block-splitting primitive to inline a callee at a call site.

use std::collections::HashMap;

use crate::context::CompilationContext;
use crate::error::{IrError, IrResult, Location};

use super::entities::{BlockId, ValueId};
use super::method::Method;
use super::method_builder::MethodBuilder;
use super::value::{ValueKind, ValueRef};

pub struct Rebuilder<'a> {
    ctx: &'a CompilationContext,
    value_map: HashMap<ValueId, ValueId>,
    block_map: HashMap<BlockId, BlockId>,
}

impl<'a> Rebuilder<'a> {
    pub fn new(ctx: &'a CompilationContext) -> Self {
        Self {
            ctx,
            value_map: HashMap::new(),
            block_map: HashMap::new(),
        }
    }

    /// Maps `source`, a value id in the method being cloned, to `target`,
    /// its already-built counterpart in the destination method. Used to
    /// seed a callee's parameters with the call's argument values before
    /// [`Rebuilder::clone_into`] runs.
    pub fn map_value(&mut self, source: ValueId, target: ValueRef) {
        self.value_map.insert(source, target.id());
    }

    /// The destination block a source block was cloned to.
    pub fn mapped_block(&self, source: BlockId) -> BlockId {
        self.block_map[&source]
    }

    fn map(&self, v: ValueRef) -> ValueRef {
        let resolved = self.ctx.values.resolve(v.id());
        ValueRef::from_resolved(self.value_map.get(&resolved).copied().unwrap_or(resolved))
    }

    fn map_block(&self, b: BlockId) -> BlockId {
        self.block_map.get(&b).copied().unwrap_or(b)
    }

    /// Clones every block of `source` into `mb`. Each `Return` terminator
    /// is rewritten into a `Branch(exit_target)`; `source` is guaranteed
    /// by [`MethodBuilder::dispose`] to have exactly one such terminator,
    /// whose (already remapped) operand is returned so the caller can
    /// splice it in as a call's replacement value.
    pub fn clone_into(
        &mut self,
        mb: &mut MethodBuilder,
        source: &Method,
        exit_target: BlockId,
        location: Location,
    ) -> IrResult<Option<ValueRef>> {
        for &b in &source.blocks {
            let new_block = mb.create_block(location);
            self.block_map.insert(b, new_block);
        }

        // Phis are created empty up front so operand remapping always
        // finds a target, even across a loop back edge.
        for &b in &source.blocks {
            for &v in source.block_data[b].values() {
                if let ValueKind::Phi(_) = self.ctx.values.kind_of(ValueRef::from_resolved(v)) {
                    let ty = self.ctx.values.type_of(ValueRef::from_resolved(v));
                    let new_phi = self.ctx.values.make(ValueKind::Phi(Vec::new()), ty, location);
                    self.value_map.insert(v, new_phi.id());
                }
            }
        }

        let mut exit_value = None;

        for &b in &source.blocks {
            let new_block = self.block_map[&b];
            for &v in source.block_data[b].values() {
                let v_ref = ValueRef::from_resolved(v);
                let kind = self.ctx.values.kind_of(v_ref);
                match kind {
                    ValueKind::Phi(_) => {
                        mb.append(new_block, self.value_map[&v]);
                    }
                    ValueKind::Param(_)
                    | ValueKind::Constant(_)
                    | ValueKind::NullConstant
                    | ValueKind::StringConstant(_) => {
                        // Interned/shared across the whole context; reuse
                        // the same id rather than minting a duplicate.
                        self.value_map.insert(v, v);
                    }
                    ValueKind::Return(ret) => {
                        exit_value = ret.map(|r| self.map(r));
                        let branch = mb.ir().branch(exit_target, location);
                        mb.append(new_block, branch.id());
                    }
                    other => {
                        let ty = self.ctx.values.type_of(v_ref);
                        let remapped = self.remap_kind(other);
                        let new_v = self.ctx.values.make(remapped, ty, location);
                        self.value_map.insert(v, new_v.id());
                        mb.append(new_block, new_v.id());
                    }
                }
            }
        }

        for &b in &source.blocks {
            for &v in source.block_data[b].values() {
                if let ValueKind::Phi(incoming) = self.ctx.values.kind_of(ValueRef::from_resolved(v)) {
                    let new_phi = self.value_map[&v];
                    let remapped: Vec<_> = incoming
                        .into_iter()
                        .map(|(pred, val)| (self.map_block(pred), self.map(val)))
                        .collect();
                    self.ctx.values.set_phi_incoming(new_phi, remapped);
                }
            }
        }

        Ok(exit_value)
    }

    fn remap_kind(&self, kind: ValueKind) -> ValueKind {
        let v = |x: ValueRef| self.map(x);
        let bl = |b: BlockId| self.map_block(b);
        match kind {
            ValueKind::Cast(k, x) => ValueKind::Cast(k, v(x)),
            ValueKind::Convert(k, x, su, tu) => ValueKind::Convert(k, v(x), su, tu),
            ValueKind::Compare(k, a, b, u) => ValueKind::Compare(k, v(a), v(b), u),
            ValueKind::Unary(op, x) => ValueKind::Unary(op, v(x)),
            ValueKind::Binary(op, a, b, u) => ValueKind::Binary(op, v(a), v(b), u),
            ValueKind::GetField(x, span) => ValueKind::GetField(v(x), span),
            ValueKind::SetField(x, span, w) => ValueKind::SetField(v(x), span, v(w)),
            ValueKind::LoadElementAddress(base, idx, space) => {
                ValueKind::LoadElementAddress(v(base), v(idx), space)
            }
            ValueKind::LoadFieldAddress(base, span, space) => ValueKind::LoadFieldAddress(v(base), span, space),
            ValueKind::AlignmentOffset(x, align) => ValueKind::AlignmentOffset(v(x), align),
            ValueKind::ArrayValue(elems) => ValueKind::ArrayValue(elems.into_iter().map(v).collect()),
            ValueKind::NewArray(ty, lengths) => ValueKind::NewArray(ty, lengths.into_iter().map(v).collect()),
            ValueKind::GetArrayLength(a, dim) => ValueKind::GetArrayLength(v(a), dim),
            ValueKind::LoadArrayElementAddress(a, indices, space) => {
                ValueKind::LoadArrayElementAddress(v(a), indices.into_iter().map(v).collect(), space)
            }
            ValueKind::Select(c, t, f) => ValueKind::Select(v(c), v(t), v(f)),
            ValueKind::Call(callee, args) => ValueKind::Call(callee, args.into_iter().map(v).collect()),
            ValueKind::Branch(target) => ValueKind::Branch(bl(target)),
            ValueKind::CondBranch(cond, t, f) => ValueKind::CondBranch(v(cond), bl(t), bl(f)),
            ValueKind::Switch(val, cases, default) => ValueKind::Switch(
                v(val),
                cases.into_iter().map(|(c, b)| (c, bl(b))).collect(),
                bl(default),
            ),
            ValueKind::Unreachable => ValueKind::Unreachable,
            ValueKind::Undefined => ValueKind::Undefined,
            ValueKind::Phi(_) | ValueKind::Return(_) => {
                unreachable!("phis and returns are cloned by clone_into directly")
            }
            ValueKind::Param(_) | ValueKind::Constant(_) | ValueKind::NullConstant | ValueKind::StringConstant(_) => {
                unreachable!("identity-mapped before remap_kind is reached")
            }
        }
    }
}

/// `specializeCall(call, scope)`: splits the caller at the call site,
/// clones `callee`'s blocks into the caller in its place, wires the
/// caller's current block to the callee's (cloned) entry, and wires the
/// callee's (cloned) exit back to the caller's tail block. The call's
/// result is replaced by the callee's returned value.
pub fn specialize_call(
    mb: &mut MethodBuilder,
    block: BlockId,
    call: ValueId,
    callee: &Method,
    location: Location,
) -> IrResult<ValueRef> {
    log::debug!(target: "gpuir::rebuilder", "specializing call {call:?} against {}", callee.declaration.handle);
    let call_ref = ValueRef::from_resolved(mb.ctx().values.resolve(call));
    let args = match mb.ctx().values.kind_of(call_ref) {
        ValueKind::Call(_, args) => args,
        other => {
            return Err(IrError::invalid_state(
                location,
                "ExpectedCallValue",
                format!("expected a Call value, found {other:?}"),
            ))
        }
    };
    if args.len() != callee.parameters.len() {
        return Err(IrError::invalid_state(
            location,
            "CallArityMismatch",
            format!("callee expects {} arguments, call site passes {}", callee.parameters.len(), args.len()),
        ));
    }

    let tail = mb.split_block(block, call_ref.id(), false, location)?;

    let mut rebuilder = Rebuilder::new(mb.ctx());
    for (&param, &arg) in callee.parameters.iter().zip(args.iter()) {
        rebuilder.map_value(param, arg);
    }
    let exit_value = rebuilder.clone_into(mb, callee, tail, location)?;

    let cloned_entry = rebuilder.mapped_block(callee.entry_block);
    let entry_branch = mb.ir().branch(cloned_entry, location);
    mb.set_terminator(block, entry_branch.id());

    let call_ty = mb.ctx().values.type_of(call_ref);
    let replacement = match exit_value {
        Some(v) => v,
        None => mb.ir().undefined(call_ty, location),
    };
    mb.ctx().values.replace(call_ref, replacement, location)?;
    mb.schedule_remove(tail, call_ref.id());

    Ok(replacement)
}
