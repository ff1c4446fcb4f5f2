//! SSA construction engine: *Simple and Efficient Construction of Static
//! Single Assignment Form* (Braun et al., 2013), parameterized over a
//! user-chosen variable key type `V`.
//!
//! The engine is single-owner and non-reentrant; it does not place
//! values in blocks itself — it calls back into a [`SsaHost`] for the
//! two side effects it needs: creating a phi node and sealing it into a
//! block's instruction list.

use std::collections::HashMap;
use std::hash::Hash;

use crate::context::CompilationContext;
use crate::error::Location;
use crate::types::TypeId;

use super::builder::IrBuilder;
use super::entities::{BlockId, ValueId};
use super::value::ValueKind;

/// Callbacks the SSA engine needs from whatever owns the blocks it reads
/// and writes phis into. Kept minimal so the engine has no dependency on
/// `MethodBuilder` beyond this seam.
pub trait SsaHost {
    /// Predecessors of `b`, in construction order.
    fn predecessors(&self, b: BlockId) -> Vec<BlockId>;
    /// Inserts `phi` at the head of `b`'s phi prefix.
    fn insert_phi(&mut self, b: BlockId, phi: ValueId);
}

struct BlockState<V: Eq + Hash> {
    processed: bool,
    sealed: bool,
    values: HashMap<V, ValueId>,
    incomplete_phis: HashMap<V, ValueId>,
}

impl<V: Eq + Hash> Default for BlockState<V> {
    fn default() -> Self {
        Self {
            processed: false,
            sealed: false,
            values: HashMap::new(),
            incomplete_phis: HashMap::new(),
        }
    }
}

/// Per-method SSA construction state. `V` is the caller's variable key
/// (a local-slot index, a name, whatever identifies one SSA variable).
pub struct SsaBuilder<'a, V: Eq + Hash + Copy> {
    ctx: &'a CompilationContext,
    blocks: HashMap<BlockId, BlockState<V>>,
}

impl<'a, V: Eq + Hash + Copy> SsaBuilder<'a, V> {
    pub fn new(ctx: &'a CompilationContext) -> Self {
        Self {
            ctx,
            blocks: HashMap::new(),
        }
    }

    fn entry(&mut self, b: BlockId) -> &mut BlockState<V> {
        self.blocks.entry(b).or_default()
    }

    pub fn write(&mut self, b: BlockId, v: V, value: ValueId) {
        self.entry(b).values.insert(v, value);
    }

    pub fn is_sealed(&self, b: BlockId) -> bool {
        self.blocks.get(&b).is_some_and(|s| s.sealed)
    }

    pub fn is_processed(&self, b: BlockId) -> bool {
        self.blocks.get(&b).is_some_and(|s| s.processed)
    }

    pub fn mark_processed(&mut self, b: BlockId) {
        self.entry(b).processed = true;
    }

    /// Reads the current value of `v` visible at the end of `b`,
    /// synthesizing phis as needed (Braun et al., Algorithm 2).
    pub fn read(&mut self, host: &mut impl SsaHost, b: BlockId, v: V, ty: TypeId) -> ValueId {
        if let Some(value) = self.blocks.get(&b).and_then(|s| s.values.get(&v)).copied() {
            return value;
        }

        let preds = host.predecessors(b);
        let sealed = self.is_sealed(b);

        let value = if sealed && preds.len() == 1 {
            self.read(host, preds[0], v, ty)
        } else {
            let phi = self.make_phi(b, ty, host);
            self.write(b, v, phi);
            if sealed {
                self.wire_phi(host, b, v, phi, ty);
                self.try_remove_trivial_phi(host, phi)
            } else {
                self.entry(b).incomplete_phis.insert(v, phi);
                phi
            }
        };
        self.write(b, v, value);
        value
    }

    fn make_phi(&self, b: BlockId, ty: TypeId, host: &mut impl SsaHost) -> ValueId {
        let ir = IrBuilder::new(self.ctx);
        let phi = ir.phi(vec![], ty, Location::unknown());
        host.insert_phi(b, phi.id());
        phi.id()
    }

    fn wire_phi(&mut self, host: &mut impl SsaHost, b: BlockId, v: V, phi: ValueId, ty: TypeId) {
        let preds = host.predecessors(b);
        let mut incoming = Vec::with_capacity(preds.len());
        for pred in preds {
            let value = self.read(host, pred, v, ty);
            incoming.push((pred, super::value::ValueRef::from_resolved(value)));
        }
        self.ctx.values.set_phi_incoming(phi, incoming);
    }

    /// Marks every predecessor of `b` known; preconditions every
    /// predecessor is already processed or sealed, then wires every
    /// phi left pending while `b` was unsealed.
    pub fn seal(&mut self, host: &mut impl SsaHost, b: BlockId) {
        log::debug!(target: "gpuir::ssa", "sealing {b:?}");
        let pending: Vec<(V, ValueId)> = self
            .blocks
            .get(&b)
            .map(|s| s.incomplete_phis.iter().map(|(v, p)| (*v, *p)).collect())
            .unwrap_or_default();

        for (v, phi) in &pending {
            let ty = self.ctx.values.type_of(super::value::ValueRef::from_resolved(*phi));
            self.wire_phi(host, b, *v, *phi, ty);
        }
        self.entry(b).sealed = true;
        for (_, phi) in pending {
            self.try_remove_trivial_phi(host, phi);
        }
    }

    /// A phi whose non-self arguments reduce to one unique value
    /// collapses to that value; its users become candidates for further
    /// trivial-phi removal, handled transitively by `replace`'s use-list
    /// rewrite plus a direct recursive check on phi users.
    fn try_remove_trivial_phi(&mut self, host: &mut impl SsaHost, phi: ValueId) -> ValueId {
        let phi_ref = super::value::ValueRef::from_resolved(phi);
        let incoming = match self.ctx.values.kind_of(phi_ref) {
            ValueKind::Phi(incoming) => incoming,
            _ => return phi,
        };

        let mut unique: Option<ValueId> = None;
        for (_, v) in &incoming {
            let resolved = self.ctx.values.resolve(v.id());
            if resolved == phi {
                continue; // self-reference
            }
            match unique {
                Some(u) if u != resolved => return phi, // more than one distinct value
                _ => unique = Some(resolved),
            }
        }

        let Some(replacement) = unique else {
            // A phi with no non-self arguments is unreachable code; leave
            // it in place rather than guessing a replacement.
            return phi;
        };

        log::trace!(target: "gpuir::ssa", "collapsing trivial phi {phi:?} to {replacement:?}");
        let users = self.ctx.values.users_of(phi);
        let _ = self
            .ctx
            .values
            .replace(phi_ref, super::value::ValueRef::from_resolved(replacement), Location::unknown());
        let _ = host; // users are rewired by `replace`; nothing left for the host to do.

        for user in users {
            if self.ctx.values.kind_of(super::value::ValueRef::from_resolved(user)).is_phi() {
                self.try_remove_trivial_phi(host, user);
            }
        }
        replacement
    }
}
