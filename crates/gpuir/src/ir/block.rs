//! `BasicBlock` — an ordered instruction list headed by phis and closed
//! by exactly one terminator.

use crate::error::Location;

use super::entities::{BlockId, ValueId};
use super::value::ValueKind;

/// A straight-line sequence of values with no internal control flow.
/// Phis (if any) occupy a prefix of `values`; the last entry, once the
/// block is closed, is always a terminator.
#[derive(Clone, Debug, Default)]
pub struct BasicBlock {
    pub name: Option<String>,
    pub location: Location,
    values: Vec<ValueId>,
    /// Predecessors recorded as branches into this block are built.
    preds: Vec<BlockId>,
    /// Set once [`crate::builder::MethodBuilder`] has read every
    /// variable use in this block (Braun et al.'s "sealed" predicate).
    pub sealed: bool,
}

impl BasicBlock {
    pub fn new(location: Location) -> Self {
        Self {
            name: None,
            location,
            values: Vec::new(),
            preds: Vec::new(),
            sealed: false,
        }
    }

    pub fn values(&self) -> &[ValueId] {
        &self.values
    }

    pub fn preds(&self) -> &[BlockId] {
        &self.preds
    }

    pub fn add_pred(&mut self, pred: BlockId) {
        if !self.preds.contains(&pred) {
            self.preds.push(pred);
        }
    }

    pub fn remove_pred(&mut self, pred: BlockId) {
        self.preds.retain(|p| *p != pred);
    }

    pub fn clear_preds(&mut self) {
        self.preds.clear();
    }

    /// Number of phi values currently at the head of the block (those
    /// whose kind is [`ValueKind::Phi`] and have not yet been
    /// interspersed with non-phi values).
    pub fn phi_prefix_len(&self, kind_of: impl Fn(ValueId) -> ValueKind) -> usize {
        self.values.iter().take_while(|v| kind_of(**v).is_phi()).count()
    }

    pub fn has_terminator(&self, kind_of: impl Fn(ValueId) -> ValueKind) -> bool {
        self.values
            .last()
            .is_some_and(|v| kind_of(*v).is_terminator())
    }

    pub fn terminator(&self) -> Option<ValueId> {
        self.values.last().copied()
    }

    /// Appends `v` to the end of the block. The caller is responsible
    /// for ensuring at most one terminator ever lands here.
    pub fn push(&mut self, v: ValueId) {
        self.values.push(v);
    }

    /// Inserts `v` at the head of the block, after any existing phis.
    pub fn insert_after_phis(&mut self, v: ValueId, kind_of: impl Fn(ValueId) -> ValueKind) {
        let at = self.phi_prefix_len(kind_of);
        self.values.insert(at, v);
    }

    /// Inserts `v` immediately before `before`.
    pub fn insert_before(&mut self, before: ValueId, v: ValueId) {
        let at = self.values.iter().position(|x| *x == before).unwrap_or(self.values.len());
        self.values.insert(at, v);
    }

    /// Removes `v` from the block's instruction list.
    pub fn remove(&mut self, v: ValueId) {
        self.values.retain(|x| *x != v);
    }

    /// Splits this block right before `at`: the returned list is the
    /// tail (`at` and everything after it), which the caller moves into
    /// a freshly-created successor block.
    pub fn split_at(&mut self, at: ValueId) -> Vec<ValueId> {
        let idx = self.values.iter().position(|x| *x == at).unwrap_or(self.values.len());
        self.values.split_off(idx)
    }

    pub fn set_values(&mut self, values: Vec<ValueId>) {
        self.values = values;
    }
}
