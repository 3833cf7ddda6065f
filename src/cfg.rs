//! The control-flow graph model.
//!
//! A [`Scfg`] is a full program fragment in SSA form: a set of
//! [`BasicBlock`]s with dense ids, each holding phi-bound arguments, a list
//! of let-bound instructions, and one terminator. Block arguments are
//! ordinary variables whose definitions are [`Phi`] nodes; the phi's i-th
//! value is the one flowing in from the predecessor whose goto carries
//! index i.

use std::cell::{Cell, RefCell};

use crate::sexpr::{Expr, ExprRef, VariableKind};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PhiStatus {
    /// Incoming values genuinely differ.
    MultiVal,
    /// All incoming values canonicalize to the same expression.
    SingleVal,
    /// Not yet analyzed.
    Incomplete,
}

/// An SSA phi node. One value per predecessor, in predecessor-index order.
pub struct Phi<'a> {
    values: RefCell<Vec<ExprRef<'a>>>,
    status: Cell<PhiStatus>,
}

impl<'a> Phi<'a> {
    pub(crate) fn new(values: Vec<&'a Expr<'a>>) -> Phi<'a> {
        Phi {
            values: RefCell::new(values.into_iter().map(|v| ExprRef::new(Some(v))).collect()),
            status: Cell::new(PhiStatus::MultiVal),
        }
    }

    pub(crate) fn incomplete() -> Phi<'a> {
        Phi {
            values: RefCell::new(Vec::new()),
            status: Cell::new(PhiStatus::Incomplete),
        }
    }

    #[inline(always)]
    pub fn status(&self) -> PhiStatus {
        self.status.get()
    }

    pub fn set_status(&self, status: PhiStatus) {
        self.status.set(status);
    }

    /// A snapshot of the incoming values.
    pub fn values(&self) -> Vec<Option<&'a Expr<'a>>> {
        self.values.borrow().iter().map(|r| r.get()).collect()
    }

    pub fn num_values(&self) -> usize {
        self.values.borrow().len()
    }

    pub fn add_value(&self, value: &'a Expr<'a>) {
        self.values.borrow_mut().push(ExprRef::new(Some(value)));
    }
}

/// An unconditional jump. `index` selects this edge's slot in the target
/// block's phi nodes.
pub struct Goto<'a> {
    pub(crate) target: &'a BasicBlock<'a>,
    pub(crate) index: u32,
}

impl<'a> Goto<'a> {
    pub fn target(&self) -> &'a BasicBlock<'a> {
        self.target
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

/// A conditional jump with two successors.
pub struct Branch<'a> {
    pub(crate) condition: ExprRef<'a>,
    pub(crate) then_block: &'a BasicBlock<'a>,
    pub(crate) else_block: &'a BasicBlock<'a>,
    pub(crate) then_index: u32,
    pub(crate) else_index: u32,
}

impl<'a> Branch<'a> {
    pub fn condition(&self) -> Option<&'a Expr<'a>> {
        self.condition.get()
    }

    pub fn then_block(&self) -> &'a BasicBlock<'a> {
        self.then_block
    }

    pub fn else_block(&self) -> &'a BasicBlock<'a> {
        self.else_block
    }

    pub fn then_index(&self) -> u32 {
        self.then_index
    }

    pub fn else_index(&self) -> u32 {
        self.else_index
    }
}

/// A basic block. Ids are assigned by [`Scfg::add`]; variable slots are
/// stamped as arguments and instructions are appended.
pub struct BasicBlock<'a> {
    block_id: Cell<u32>,
    num_vars: Cell<u32>,
    num_predecessors: Cell<u32>,
    parent: Cell<Option<&'a BasicBlock<'a>>>,
    args: RefCell<Vec<&'a Expr<'a>>>,
    instrs: RefCell<Vec<&'a Expr<'a>>>,
    terminator: ExprRef<'a>,
}

impl<'a> BasicBlock<'a> {
    pub(crate) fn new() -> BasicBlock<'a> {
        BasicBlock {
            block_id: Cell::new(0),
            num_vars: Cell::new(0),
            num_predecessors: Cell::new(0),
            parent: Cell::new(None),
            args: RefCell::new(Vec::new()),
            instrs: RefCell::new(Vec::new()),
            terminator: ExprRef::null(),
        }
    }

    #[inline(always)]
    pub fn block_id(&self) -> u32 {
        self.block_id.get()
    }

    pub(crate) fn set_block_id(&self, id: u32) {
        self.block_id.set(id);
    }

    pub(crate) fn set_num_predecessors(&self, n: u32) {
        self.num_predecessors.set(n);
    }

    /// The immediate dominator, when one has been computed.
    pub fn parent(&self) -> Option<&'a BasicBlock<'a>> {
        self.parent.get()
    }

    pub fn set_parent(&self, parent: Option<&'a BasicBlock<'a>>) {
        self.parent.set(parent);
    }

    pub fn num_predecessors(&self) -> u32 {
        self.num_predecessors.get()
    }

    /// Reserves the next predecessor slot and returns its index, for use as
    /// the goto/branch phi index.
    pub fn add_predecessor(&self) -> u32 {
        let i = self.num_predecessors.get();
        self.num_predecessors.set(i + 1);
        i
    }

    pub fn arguments(&self) -> Vec<&'a Expr<'a>> {
        self.args.borrow().clone()
    }

    pub fn instructions(&self) -> Vec<&'a Expr<'a>> {
        self.instrs.borrow().clone()
    }

    pub fn terminator(&self) -> Option<&'a Expr<'a>> {
        self.terminator.get()
    }

    /// Adds a phi-bound block argument. Must be a variable; its id is
    /// stamped from this block.
    pub fn add_argument(&self, var: &'a Expr<'a>) {
        self.stamp(var);
        self.args.borrow_mut().push(var);
    }

    /// Adds a let-bound instruction. Must be a variable; its id is stamped
    /// from this block.
    pub fn add_instruction(&self, var: &'a Expr<'a>) {
        self.stamp(var);
        self.instrs.borrow_mut().push(var);
    }

    fn stamp(&self, var: &'a Expr<'a>) {
        let v = var
            .as_variable()
            .expect("block arguments and instructions must be variables");
        let slot = self.num_vars.get();
        v.set_id(self.block_id.get(), slot);
        self.num_vars.set(slot + 1);
    }

    pub fn set_terminator(&'a self, e: &'a Expr<'a>) {
        self.terminator.reset(Some(e));
        self.terminator.register();
    }
}

/// A whole CFG. `add` hands out dense block ids in insertion order; the
/// first block added becomes the entry.
pub struct Scfg<'a> {
    blocks: RefCell<Vec<&'a BasicBlock<'a>>>,
    entry: Cell<Option<&'a BasicBlock<'a>>>,
    exit: Cell<Option<&'a BasicBlock<'a>>>,
}

impl<'a> Scfg<'a> {
    pub(crate) fn new() -> Scfg<'a> {
        Scfg {
            blocks: RefCell::new(Vec::new()),
            entry: Cell::new(None),
            exit: Cell::new(None),
        }
    }

    pub fn blocks(&self) -> Vec<&'a BasicBlock<'a>> {
        self.blocks.borrow().clone()
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.borrow().len()
    }

    pub fn entry(&self) -> Option<&'a BasicBlock<'a>> {
        self.entry.get()
    }

    pub fn exit(&self) -> Option<&'a BasicBlock<'a>> {
        self.exit.get()
    }

    pub fn set_entry(&self, b: &'a BasicBlock<'a>) {
        self.entry.set(Some(b));
    }

    pub fn set_exit(&self, b: &'a BasicBlock<'a>) {
        self.exit.set(Some(b));
    }

    pub fn add(&self, b: &'a BasicBlock<'a>) {
        let mut blocks = self.blocks.borrow_mut();
        b.set_block_id(blocks.len() as u32);
        blocks.push(b);
        if self.entry.get().is_none() {
            self.entry.set(Some(b));
        }
    }
}

/// Chases let-variable chains and collapsed phi nodes down to a canonical
/// value. Stops at parameters, at multi-valued phis, and at trivial
/// definitions.
pub fn get_canonical_val<'a>(e: &'a Expr<'a>) -> &'a Expr<'a> {
    let mut e = e;
    while let Expr::Variable(_) = e {
        let mut var = e;
        let def = loop {
            let v = variant!(var, Expr::Variable);
            if v.kind() != VariableKind::Let {
                return var;
            }
            let d = match v.definition() {
                Some(d) => d,
                None => return var,
            };
            if let Expr::Variable(_) = d {
                var = d;
            } else {
                break d;
            }
        };
        if def.is_trivial() {
            return def;
        }
        if let Expr::Phi(ph) = def {
            if ph.status() == PhiStatus::Incomplete {
                simplify_incomplete_arg(var, ph);
            }
            if ph.status() == PhiStatus::SingleVal {
                if let Some(v0) = ph.values().first().copied().flatten() {
                    e = v0;
                    continue;
                }
            }
        }
        return var;
    }
    e
}

/// Analyzes an incomplete phi bound to `var`. If every incoming value
/// canonicalizes to the same expression (self-references excepted) the phi
/// collapses to `SingleVal`, otherwise it stays `MultiVal`.
pub fn simplify_incomplete_arg<'a>(var: &'a Expr<'a>, ph: &Phi<'a>) {
    assert_eq!(ph.status(), PhiStatus::Incomplete);
    // mark multi-valued up front so cycles through this phi terminate
    ph.set_status(PhiStatus::MultiVal);

    let values = ph.values();
    let e0 = match values.first().copied().flatten() {
        Some(v) => get_canonical_val(v),
        None => return,
    };
    for &vi in &values[1..] {
        let ei = match vi {
            Some(v) => get_canonical_val(v),
            None => return,
        };
        if std::ptr::eq(ei, var) {
            // the phi references its own variable
            continue;
        }
        if !std::ptr::eq(ei, e0) {
            return;
        }
    }
    ph.set_status(PhiStatus::SingleVal);
    log::debug!(
        "phi for {} collapsed to a single value",
        variant!(var, Expr::Variable).name()
    );
}

#[cfg(test)]
mod cfg_tests {
    use super::*;
    use crate::arena::Arena;
    use crate::sexpr::Opcode;

    #[test]
    fn test_dense_block_ids() {
        let arena = Arena::new();
        let cfg_e = arena.scfg();
        let cfg = cfg_e.as_scfg().unwrap();

        let b0 = arena.basic_block();
        let b1 = arena.basic_block();
        let b2 = arena.basic_block();
        cfg.add(b0);
        cfg.add(b1);
        cfg.add(b2);

        assert_eq!(b0.block_id(), 0);
        assert_eq!(b1.block_id(), 1);
        assert_eq!(b2.block_id(), 2);
        assert!(std::ptr::eq(cfg.entry().unwrap(), b0));
        assert_eq!(cfg.num_blocks(), 3);
    }

    #[test]
    fn test_variable_slot_stamping() {
        let arena = Arena::new();
        let cfg_e = arena.scfg();
        let cfg = cfg_e.as_scfg().unwrap();
        let b = arena.basic_block();
        cfg.add(b);
        let b1 = arena.basic_block();
        cfg.add(b1);

        let a0 = arena.let_variable(Some(arena.incomplete_phi()), None);
        let a1 = arena.let_variable(Some(arena.incomplete_phi()), None);
        b1.add_argument(a0);
        b1.add_argument(a1);

        let lit = arena.literal(arena.source_expr("1"));
        let i0 = arena.let_variable(Some(arena.load(lit)), None);
        b1.add_instruction(i0);

        for (slot, v) in [a0, a1, i0].iter().enumerate() {
            let v = v.as_variable().unwrap();
            assert_eq!(v.block_id(), 1);
            assert_eq!(v.slot_id(), slot as u32);
        }
    }

    #[test]
    fn test_terminator_owns_its_edge() {
        let arena = Arena::new();
        let b0 = arena.basic_block();
        let b1 = arena.basic_block();
        let idx = b1.add_predecessor();
        b0.set_terminator(arena.goto(b1, idx));

        let t = b0.terminator().unwrap();
        assert_eq!(t.opcode(), Opcode::Goto);
        let g = variant!(t, Expr::Goto);
        assert!(std::ptr::eq(g.target(), b1));
        assert_eq!(g.index(), 0);
        assert_eq!(b1.num_predecessors(), 1);
    }

    #[test]
    fn test_canonical_val_follows_let_chain() {
        let arena = Arena::new();
        let lit = arena.literal(arena.source_expr("42"));
        let v1 = arena.let_variable(Some(lit), None);
        let v2 = arena.let_variable(Some(v1), None);
        let v3 = arena.let_variable(Some(v2), None);

        assert!(std::ptr::eq(get_canonical_val(v3), lit));
    }

    #[test]
    fn test_canonical_val_stops_at_parameters() {
        let arena = Arena::new();
        let p = arena.variable(VariableKind::Fun, None, Some(arena.decl("p")));
        let v = arena.let_variable(Some(p), None);

        assert!(std::ptr::eq(get_canonical_val(v), p));
    }

    #[test]
    fn test_canonical_val_stops_at_nontrivial_defs() {
        let arena = Arena::new();
        let lit = arena.literal(arena.source_expr("p"));
        let v = arena.let_variable(Some(arena.load(lit)), None);

        assert!(std::ptr::eq(get_canonical_val(v), v));
    }

    #[test]
    fn test_incomplete_phi_collapses_to_single_val() {
        let arena = Arena::new();
        let lit = arena.literal(arena.source_expr("x"));
        let phi_e = arena.incomplete_phi();
        let v = arena.let_variable(Some(phi_e), None);
        let ph = phi_e.as_phi().unwrap();
        ph.add_value(lit);
        ph.add_value(lit);
        // a back edge feeding the phi its own variable
        ph.add_value(v);

        assert!(std::ptr::eq(get_canonical_val(v), lit));
        assert_eq!(ph.status(), PhiStatus::SingleVal);
    }

    #[test]
    fn test_incomplete_phi_with_distinct_values_stays_multi() {
        let arena = Arena::new();
        let a = arena.literal(arena.source_expr("a"));
        let b = arena.literal(arena.source_expr("b"));
        let phi_e = arena.incomplete_phi();
        let v = arena.let_variable(Some(phi_e), None);
        let ph = phi_e.as_phi().unwrap();
        ph.add_value(a);
        ph.add_value(b);

        assert!(std::ptr::eq(get_canonical_val(v), v));
        assert_eq!(ph.status(), PhiStatus::MultiVal);
    }
}
