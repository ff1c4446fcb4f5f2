//! `MethodBuilder` — owns a method's blocks, assigns block identifiers,
//! recomputes control flow, and unifies multiple exits on disposal.

use std::collections::HashSet;

use cranelift_entity::{PrimaryMap, SecondaryMap};

use crate::context::CompilationContext;
use crate::error::{IrError, IrResult, Location};
use crate::types::TypeId;

use super::block::BasicBlock;
use super::builder::IrBuilder;
use super::entities::{BlockId, MethodId, ValueId};
use super::method::{Declaration, Method};
use super::ssa::SsaHost;
use super::value::{ValueKind, ValueRef};

pub struct MethodBuilder<'a> {
    ctx: &'a CompilationContext,
    declaration: Declaration,
    blocks: PrimaryMap<BlockId, BasicBlock>,
    entry: BlockId,
    parameters: Vec<ValueId>,
    /// Reverse-post-order block list; recomputed by
    /// [`MethodBuilder::update_control_flow`].
    order: Vec<BlockId>,
    dirty: bool,
    /// Values scheduled for removal from a block, keyed by the block they
    /// currently live in. Flushed by [`MethodBuilder::perform_removal`].
    pending_remove: SecondaryMap<BlockId, HashSet<ValueId>>,
}

impl<'a> MethodBuilder<'a> {
    pub fn new(ctx: &'a CompilationContext, declaration: Declaration) -> Self {
        let mut blocks = PrimaryMap::new();
        let entry = blocks.push(BasicBlock::new(Location::unknown()));
        Self {
            ctx,
            declaration,
            blocks,
            entry,
            parameters: Vec::new(),
            order: vec![entry],
            dirty: false,
            pending_remove: SecondaryMap::new(),
        }
    }

    pub fn ir(&self) -> IrBuilder<'a> {
        IrBuilder::new(self.ctx)
    }

    pub fn ctx(&self) -> &'a CompilationContext {
        self.ctx
    }

    pub fn entry_block(&self) -> BlockId {
        self.entry
    }

    pub fn create_block(&mut self, location: Location) -> BlockId {
        self.dirty = true;
        self.blocks.push(BasicBlock::new(location))
    }

    pub fn block(&self, b: BlockId) -> &BasicBlock {
        &self.blocks[b]
    }

    pub fn add_parameter(&mut self, ty: TypeId, location: Location) -> ValueRef {
        let index = self.parameters.len() as u32;
        let p = self.ir().param(index, ty, location);
        self.parameters.push(p.id());
        p
    }

    fn kind_of(&self, id: ValueId) -> ValueKind {
        self.ctx.values.kind_of(ValueRef::from_resolved(id))
    }

    /// Appends `v` to `b`, before its terminator if one already exists.
    pub fn append(&mut self, b: BlockId, v: ValueId) {
        let term = self.blocks[b].terminator().filter(|t| self.kind_of(*t).is_terminator());
        let block = &mut self.blocks[b];
        match term {
            Some(t) => block.insert_before(t, v),
            None => block.push(v),
        }
    }

    /// Sets `b`'s terminator, replacing any existing one. Marks the
    /// method dirty if the successor set changed, so the next
    /// [`MethodBuilder::update_control_flow`] recomputes order and
    /// predecessor links.
    pub fn set_terminator(&mut self, b: BlockId, terminator: ValueId) {
        let old_successors = self.blocks[b]
            .terminator()
            .map(|t| self.kind_of(t).successors())
            .unwrap_or_default();
        if let Some(old) = self.blocks[b].terminator() {
            if self.kind_of(old).is_terminator() {
                self.blocks[b].remove(old);
            }
        }
        self.blocks[b].push(terminator);
        let new_successors = self.kind_of(terminator).successors();
        if old_successors.as_slice() != new_successors.as_slice() {
            self.dirty = true;
        }
    }

    /// Partitions `b` at `at`: everything from `at` onward (or after `at`
    /// when `keep` is true) moves into a fresh successor block that
    /// inherits `b`'s terminator, while `b` is left ending in an
    /// unconditional branch to it. Phi arguments in the tail's successors
    /// that credited `b` as their predecessor are retargeted to the new
    /// block. Flushes `b`'s pending removals first. Returns the new block.
    pub fn split_block(&mut self, b: BlockId, at: ValueId, keep: bool, location: Location) -> IrResult<BlockId> {
        self.perform_removal(b)?;
        let values = self.blocks[b].values().to_vec();
        let idx = values.iter().position(|v| *v == at).unwrap_or(values.len());
        let split_idx = (if keep { idx + 1 } else { idx }).min(values.len());
        let tail = values[split_idx..].to_vec();

        let new_block = self.create_block(location);
        self.blocks[new_block].set_values(tail);
        self.blocks[b].set_values(values[..split_idx].to_vec());

        let branch = self.ir().branch(new_block, location);
        self.blocks[b].push(branch.id());

        self.retarget_phi_predecessors(new_block, b, new_block);
        self.dirty = true;
        Ok(new_block)
    }

    /// Appends `other`'s values onto `b`, adopting `other`'s terminator
    /// in place of `b`'s (which is dropped — the caller is responsible
    /// for `b` having branched to `other`). Phi arguments in `b`'s new
    /// successors that credited `other` as their predecessor are
    /// retargeted to `b`. `other` is left empty.
    pub fn merge_block(&mut self, b: BlockId, other: BlockId) -> IrResult<()> {
        if b == other {
            return Err(IrError::assertion(
                Location::unknown(),
                "MergeBlockSelf",
                "cannot merge a block with itself",
            ));
        }
        self.perform_removal(other)?;
        if let Some(old_term) = self.blocks[b].terminator() {
            if self.kind_of(old_term).is_terminator() {
                self.blocks[b].remove(old_term);
            }
        }
        let other_values = self.blocks[other].values().to_vec();
        for v in &other_values {
            self.blocks[b].push(*v);
        }
        self.blocks[other].set_values(Vec::new());

        self.retarget_phi_predecessors(b, other, b);
        self.dirty = true;
        Ok(())
    }

    /// Retargets phi arguments in every successor of `from` that credit
    /// `old_pred` as their predecessor to `new_pred` instead.
    fn retarget_phi_predecessors(&self, from: BlockId, old_pred: BlockId, new_pred: BlockId) {
        for succ in self.successors_of(from) {
            let phis: Vec<ValueId> = self.blocks[succ]
                .values()
                .iter()
                .copied()
                .take_while(|v| self.kind_of(*v).is_phi())
                .collect();
            for phi in phis {
                self.ctx.values.rewrite_phi_predecessor(phi, old_pred, new_pred);
            }
        }
    }

    /// Replaces `v` with a call to `target` passing `v`'s own operands,
    /// rewiring every existing user of `v` to the call's result.
    pub fn replace_with_call(&mut self, b: BlockId, v: ValueId, target: MethodId, location: Location) -> IrResult<ValueId> {
        let v_ref = ValueRef::from_resolved(v);
        let operands = self.ctx.values.kind_of(v_ref).operands();
        let ty = self.ctx.values.type_of(v_ref);
        let call = self.ctx.values.make(ValueKind::Call(target, operands.to_vec()), ty, location);

        self.blocks[b].insert_before(v, call.id());
        self.ctx.values.replace(v_ref, call, location)?;
        self.blocks[b].remove(v);
        Ok(call.id())
    }

    /// Marks `v`, currently living in block `b`, for removal on the next
    /// [`MethodBuilder::perform_removal`] of that block.
    pub fn schedule_remove(&mut self, b: BlockId, v: ValueId) {
        self.pending_remove[b].insert(v);
    }

    /// Flushes every value scheduled for removal from `b`: any value
    /// still named as an operand elsewhere is first replaced with a fresh
    /// [`ValueKind::Undefined`] of its own type (so existing uses stay
    /// valid), then the node is dropped from the block's instruction
    /// list.
    pub fn perform_removal(&mut self, b: BlockId) -> IrResult<()> {
        let scheduled = std::mem::take(&mut self.pending_remove[b]);
        if scheduled.is_empty() {
            return Ok(());
        }
        for v in &scheduled {
            let resolved = self.ctx.values.resolve(*v);
            if !self.ctx.values.users_of(resolved).is_empty() {
                let v_ref = ValueRef::from_resolved(resolved);
                let ty = self.ctx.values.type_of(v_ref);
                let undef = self.ir().undefined(ty, Location::unknown());
                self.ctx.values.replace(v_ref, undef, Location::unknown())?;
            }
        }
        let kept: Vec<ValueId> = self.blocks[b]
            .values()
            .iter()
            .copied()
            .filter(|v| !scheduled.contains(v))
            .collect();
        self.blocks[b].set_values(kept);
        Ok(())
    }

    /// Recomputes reverse post-order from the entry block using each
    /// block's terminator successors, then rebuilds predecessor links.
    /// Idempotent; the single canonical place block order and preds are
    /// derived.
    pub fn update_control_flow(&mut self) {
        if !self.dirty {
            return;
        }
        let mut visited = std::collections::HashSet::new();
        let mut post_order = Vec::new();
        self.dfs_post_order(self.entry, &mut visited, &mut post_order);
        post_order.reverse();
        self.order = post_order;

        let preds_by_block: Vec<(BlockId, BlockId)> = self
            .order
            .iter()
            .flat_map(|&b| {
                let successors = self.successors_of(b);
                successors.into_iter().map(move |s| (s, b))
            })
            .collect();
        for block in self.blocks.values_mut() {
            block.clear_preds();
        }
        for (succ, pred) in preds_by_block {
            self.blocks[succ].add_pred(pred);
        }
        self.dirty = false;
    }

    fn successors_of(&self, b: BlockId) -> Vec<BlockId> {
        self.blocks[b]
            .terminator()
            .map(|t| self.kind_of(t).successors().to_vec())
            .unwrap_or_default()
    }

    fn dfs_post_order(&self, b: BlockId, visited: &mut std::collections::HashSet<BlockId>, out: &mut Vec<BlockId>) {
        if !visited.insert(b) {
            return;
        }
        for succ in self.successors_of(b) {
            self.dfs_post_order(succ, visited, out);
        }
        out.push(b);
    }

    /// Collects every block whose terminator has no successors; if more
    /// than one exists, synthesizes a single `Exit` block that every
    /// original exit branches to, returning through a phi over their
    /// return values (or a plain return for a void method).
    pub fn ensure_unique_exit_block(&mut self) -> IrResult<()> {
        self.update_control_flow();
        let exits: Vec<BlockId> = self
            .order
            .iter()
            .copied()
            .filter(|b| self.successors_of(*b).is_empty())
            .collect();

        if exits.len() <= 1 {
            return Ok(());
        }
        log::debug!(target: "gpuir::method_builder", "unifying {} exit blocks for {}", exits.len(), self.declaration.handle);

        let return_type = self.declaration.return_type;
        let is_void = self.ctx.types.is_void(return_type);
        let exit = self.create_block(Location::unknown());

        let mut returned_values = Vec::with_capacity(exits.len());
        for &old_exit in &exits {
            let term = self.blocks[old_exit].terminator().ok_or_else(|| {
                IrError::invalid_state(Location::unknown(), "ExitBlockMissingTerminator", "exit block has no terminator")
            })?;
            let returned = match self.kind_of(term) {
                ValueKind::Return(v) => v,
                other => {
                    return Err(IrError::invalid_state(
                        Location::unknown(),
                        "ExitBlockNotAReturn",
                        format!("expected Return terminator, found {other:?}"),
                    ))
                }
            };
            if let Some(v) = returned {
                returned_values.push((old_exit, v));
            }
            let branch = self.ir().branch(exit, Location::unknown());
            self.set_terminator(old_exit, branch.id());
        }

        let exit_return = if is_void {
            self.ir().ret(None, return_type, Location::unknown())?
        } else {
            let phi = self
                .ir()
                .phi(returned_values, return_type, Location::unknown());
            self.ir().ret(Some(phi), return_type, Location::unknown())?
        };
        self.append(exit, exit_return.id());
        self.dirty = true;
        self.update_control_flow();
        Ok(())
    }

    /// Drops replaced parameters and reassigns contiguous indices,
    /// flushes removals in every block, recomputes control flow, then
    /// asserts a unique exit exists.
    pub fn dispose(mut self) -> IrResult<Method> {
        log::debug!(target: "gpuir::method_builder", "disposing {}", self.declaration.handle);
        self.parameters.retain(|p| {
            let resolved = self.ctx.values.resolve(*p);
            resolved == *p
        });

        let blocks: Vec<BlockId> = self.blocks.keys().collect();
        for b in blocks {
            self.perform_removal(b)?;
        }

        self.ensure_unique_exit_block()?;
        self.update_control_flow();

        let exits = self
            .order
            .iter()
            .copied()
            .filter(|b| self.successors_of(*b).is_empty())
            .count();
        if exits != 1 {
            return Err(IrError::assertion(
                Location::unknown(),
                "ExpectedUniqueExit",
                format!("found {exits} exit blocks after disposal"),
            ));
        }

        Ok(Method {
            declaration: self.declaration,
            entry_block: self.entry,
            parameters: self.parameters,
            blocks: self.order,
            block_data: self.blocks,
        })
    }
}

impl<'a> SsaHost for MethodBuilder<'a> {
    fn predecessors(&self, b: BlockId) -> Vec<BlockId> {
        self.blocks[b].preds().to_vec()
    }

    fn insert_phi(&mut self, b: BlockId, phi: ValueId) {
        let values = &self.ctx.values;
        let at = self.blocks[b]
            .values()
            .iter()
            .take_while(|v| values.kind_of(ValueRef::from_resolved(**v)).is_phi())
            .count();
        let before = self.blocks[b].values().get(at).copied();
        let block = &mut self.blocks[b];
        match before {
            Some(b) => block.insert_before(b, phi),
            None => block.push(phi),
        }
    }
}
