//! Structural comparison of expressions.
//!
//! A [`Comparator`] folds two trees in lockstep into an associated result
//! type, short-circuiting as soon as a partial result is no longer true.
//! Leaves compare by token identity, bound variables by binding position, so
//! comparison is alpha-equivalence; a wildcard on either side matches any
//! subtree. [`EqualsComparator`] instantiates the protocol at `bool`.

use itertools::Itertools;

use crate::cfg::{BasicBlock, Scfg};
use crate::sexpr::Expr;

pub trait Comparator<'a>: Sized {
    /// The partial comparison result.
    type CT;

    /// The result for trivially equal subtrees.
    fn true_result(&mut self) -> Self::CT;

    /// Whether a partial result should stop the comparison.
    fn not_true(&mut self, ct: &Self::CT) -> bool;

    fn compare_integers(&mut self, a: u32, b: u32) -> Self::CT;

    /// Comparison of leaves that only have identity.
    fn compare_identity(&mut self, same: bool) -> Self::CT;

    /// Comparison of two variable uses. Bound variables correspond through
    /// the scopes entered so far; free variables only equal themselves.
    fn compare_variable_refs(&mut self, a: &'a Expr<'a>, b: &'a Expr<'a>) -> Self::CT;

    fn enter_scope(&mut self, a: &'a Expr<'a>, b: &'a Expr<'a>);
    fn leave_scope(&mut self);

    fn compare(&mut self, a: Option<&'a Expr<'a>>, b: Option<&'a Expr<'a>>) -> Self::CT {
        compare_exprs(self, a, b)
    }
}

macro_rules! check {
    ($c:expr, $ct:expr) => {{
        let ct = $ct;
        if $c.not_true(&ct) {
            return ct;
        }
        ct
    }};
}

pub fn compare_exprs<'a, C: Comparator<'a>>(
    c: &mut C,
    a: Option<&'a Expr<'a>>,
    b: Option<&'a Expr<'a>>,
) -> C::CT {
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        (None, None) => return c.true_result(),
        _ => return c.compare_identity(false),
    };
    // a wildcard matches any subtree
    if let Expr::Wildcard = a {
        return c.true_result();
    }
    if let Expr::Wildcard = b {
        return c.true_result();
    }
    if a.opcode() != b.opcode() {
        return c.compare_integers(a.opcode() as u32, b.opcode() as u32);
    }

    match (a, b) {
        (Expr::Variable(_), Expr::Variable(_)) => c.compare_variable_refs(a, b),
        (Expr::Future(fa), Expr::Future(fb)) => {
            match (fa.maybe_get_result(), fb.maybe_get_result()) {
                (Some(ra), Some(rb)) => c.compare(Some(ra), Some(rb)),
                _ => c.compare_identity(std::ptr::eq(a, b)),
            }
        }
        (Expr::Undefined(_), Expr::Undefined(_)) => c.true_result(),
        (Expr::Literal(la), Expr::Literal(lb)) => {
            c.compare_identity(std::ptr::eq(la.source(), lb.source()))
        }
        (Expr::LiteralPtr(la), Expr::LiteralPtr(lb)) => {
            c.compare_identity(std::ptr::eq(la.decl(), lb.decl()))
        }
        (Expr::Function(fa), Expr::Function(fb)) => {
            check!(
                c,
                c.compare(fa.variable().definition(), fb.variable().definition())
            );
            c.enter_scope(fa.variable_decl(), fb.variable_decl());
            let ct = c.compare(fa.body(), fb.body());
            c.leave_scope();
            ct
        }
        (Expr::SFunction(fa), Expr::SFunction(fb)) => {
            c.enter_scope(fa.variable_decl(), fb.variable_decl());
            let ct = c.compare(fa.body(), fb.body());
            c.leave_scope();
            ct
        }
        (Expr::Code(ca), Expr::Code(cb)) => {
            check!(c, c.compare(ca.return_type(), cb.return_type()));
            c.compare(ca.body(), cb.body())
        }
        (Expr::Apply(aa), Expr::Apply(ab)) => {
            check!(c, c.compare(aa.fun(), ab.fun()));
            c.compare(aa.arg(), ab.arg())
        }
        (Expr::SApply(sa), Expr::SApply(sb)) => {
            let ct = c.compare(sa.sfun(), sb.sfun());
            if c.not_true(&ct) || (sa.is_delegation() && sb.is_delegation()) {
                return ct;
            }
            c.compare(sa.arg(), sb.arg())
        }
        (Expr::Project(pa), Expr::Project(pb)) => {
            check!(c, c.compare(pa.record(), pb.record()));
            c.compare_identity(std::ptr::eq(pa.decl(), pb.decl()))
        }
        (Expr::Call(ca), Expr::Call(cb)) => c.compare(ca.target(), cb.target()),
        (Expr::Alloc(aa), Expr::Alloc(ab)) => {
            check!(c, c.compare_integers(aa.kind() as u32, ab.kind() as u32));
            c.compare(aa.data_type(), ab.data_type())
        }
        (Expr::Load(la), Expr::Load(lb)) => c.compare(la.pointer(), lb.pointer()),
        (Expr::Store(sa), Expr::Store(sb)) => {
            check!(c, c.compare(sa.destination(), sb.destination()));
            c.compare(sa.source(), sb.source())
        }
        (Expr::ArrayFirst(aa), Expr::ArrayFirst(ab)) => c.compare(aa.array(), ab.array()),
        (Expr::ArrayAdd(aa), Expr::ArrayAdd(ab)) => {
            check!(c, c.compare(aa.array(), ab.array()));
            c.compare(aa.index(), ab.index())
        }
        (Expr::UnaryOp(ua), Expr::UnaryOp(ub)) => {
            check!(
                c,
                c.compare_integers(ua.unary_opcode() as u32, ub.unary_opcode() as u32)
            );
            c.compare(ua.expr(), ub.expr())
        }
        (Expr::BinaryOp(ba), Expr::BinaryOp(bb)) => {
            check!(
                c,
                c.compare_integers(ba.binary_opcode() as u32, bb.binary_opcode() as u32)
            );
            check!(c, c.compare(ba.expr0(), bb.expr0()));
            c.compare(ba.expr1(), bb.expr1())
        }
        (Expr::Cast(ca), Expr::Cast(cb)) => {
            check!(
                c,
                c.compare_integers(ca.cast_opcode() as u32, cb.cast_opcode() as u32)
            );
            c.compare(ca.expr(), cb.expr())
        }
        (Expr::Phi(pa), Expr::Phi(pb)) => {
            let (va, vb) = (pa.values(), pb.values());
            check!(c, c.compare_integers(va.len() as u32, vb.len() as u32));
            for (x, y) in va.into_iter().zip_eq(vb) {
                check!(c, c.compare(x, y));
            }
            c.true_result()
        }
        (Expr::Goto(ga), Expr::Goto(gb)) => {
            check!(
                c,
                c.compare_integers(ga.target().block_id(), gb.target().block_id())
            );
            c.compare_integers(ga.index(), gb.index())
        }
        (Expr::Branch(ba), Expr::Branch(bb)) => {
            check!(c, c.compare(ba.condition(), bb.condition()));
            check!(
                c,
                c.compare_integers(ba.then_block().block_id(), bb.then_block().block_id())
            );
            c.compare_integers(ba.else_block().block_id(), bb.else_block().block_id())
        }
        (Expr::Scfg(ca), Expr::Scfg(cb)) => compare_scfgs(c, ca, cb),
        _ => unreachable!("opcodes were already checked for equality"),
    }
}

fn block_id_or_sentinel(b: Option<&BasicBlock>) -> u32 {
    b.map(|b| b.block_id()).unwrap_or(u32::MAX)
}

/// Compares two CFGs. Blocks correspond positionally by dense id. All
/// block-variable scopes are entered up front so phi values and cross-block
/// references resolve regardless of block order, then definitions and
/// terminators are compared block by block.
fn compare_scfgs<'a, C: Comparator<'a>>(c: &mut C, a: &Scfg<'a>, b: &Scfg<'a>) -> C::CT {
    let ablocks = a.blocks();
    let bblocks = b.blocks();

    let mut entered = 0usize;
    macro_rules! bail {
        ($ct:expr) => {{
            let ct = $ct;
            if c.not_true(&ct) {
                for _ in 0..entered {
                    c.leave_scope();
                }
                return ct;
            }
        }};
    }

    bail!(c.compare_integers(ablocks.len() as u32, bblocks.len() as u32));

    for (ba, bb) in ablocks.iter().zip_eq(bblocks.iter()) {
        let (xa, xb) = (ba.arguments(), bb.arguments());
        bail!(c.compare_integers(xa.len() as u32, xb.len() as u32));
        let (ia, ib) = (ba.instructions(), bb.instructions());
        bail!(c.compare_integers(ia.len() as u32, ib.len() as u32));
        for (x, y) in xa.into_iter().zip_eq(xb).chain(ia.into_iter().zip_eq(ib)) {
            c.enter_scope(x, y);
            entered += 1;
        }
    }

    for (ba, bb) in ablocks.iter().zip_eq(bblocks.iter()) {
        let vars = ba
            .arguments()
            .into_iter()
            .zip_eq(bb.arguments())
            .chain(ba.instructions().into_iter().zip_eq(bb.instructions()));
        for (x, y) in vars {
            let (xv, yv) = (variant!(x, Expr::Variable), variant!(y, Expr::Variable));
            bail!(c.compare(xv.definition(), yv.definition()));
        }
        bail!(c.compare(ba.terminator(), bb.terminator()));
    }

    for _ in 0..entered {
        c.leave_scope();
    }
    let ct = c.compare_integers(
        block_id_or_sentinel(a.entry()),
        block_id_or_sentinel(b.entry()),
    );
    if c.not_true(&ct) {
        return ct;
    }
    c.compare_integers(
        block_id_or_sentinel(a.exit()),
        block_id_or_sentinel(b.exit()),
    )
}

/// Boolean alpha-equivalence.
pub struct EqualsComparator<'a> {
    scope: Vec<(&'a Expr<'a>, &'a Expr<'a>)>,
}

impl<'a> EqualsComparator<'a> {
    pub fn new() -> EqualsComparator<'a> {
        EqualsComparator { scope: Vec::new() }
    }
}

impl<'a> Default for EqualsComparator<'a> {
    fn default() -> EqualsComparator<'a> {
        EqualsComparator::new()
    }
}

impl<'a> Comparator<'a> for EqualsComparator<'a> {
    type CT = bool;

    fn true_result(&mut self) -> bool {
        true
    }

    fn not_true(&mut self, ct: &bool) -> bool {
        !*ct
    }

    fn compare_integers(&mut self, a: u32, b: u32) -> bool {
        a == b
    }

    fn compare_identity(&mut self, same: bool) -> bool {
        same
    }

    fn compare_variable_refs(&mut self, a: &'a Expr<'a>, b: &'a Expr<'a>) -> bool {
        // innermost binding wins; a bound variable never equals a free one
        for &(x, y) in self.scope.iter().rev() {
            let ax = std::ptr::eq(x, a);
            let by = std::ptr::eq(y, b);
            if ax || by {
                return ax && by;
            }
        }
        std::ptr::eq(a, b)
    }

    fn enter_scope(&mut self, a: &'a Expr<'a>, b: &'a Expr<'a>) {
        self.scope.push((a, b));
    }

    fn leave_scope(&mut self) {
        self.scope.pop();
    }
}

/// Whether two expressions are alpha-equivalent.
pub fn equivalent<'a>(a: Option<&'a Expr<'a>>, b: Option<&'a Expr<'a>>) -> bool {
    EqualsComparator::new().compare(a, b)
}

#[cfg(test)]
mod compare_tests {
    use super::*;
    use crate::arena::Arena;
    use crate::ops::BinaryOpcode;
    use crate::sexpr::VariableKind;

    #[test]
    fn test_leaves_compare_by_token_identity() {
        let arena = Arena::new();
        let mu = arena.decl("mu");
        let a = arena.literal_ptr(mu);
        let b = arena.literal_ptr(mu);
        assert!(equivalent(Some(a), Some(b)));

        // same spelling, different token
        let other = arena.literal_ptr(arena.decl("mu"));
        assert!(!equivalent(Some(a), Some(other)));

        let one_a = arena.literal(arena.source_expr("1"));
        let one_b = arena.literal(arena.source_expr("1"));
        assert!(!equivalent(Some(one_a), Some(one_b)));
    }

    #[test]
    fn test_guard_expressions_compare_structurally() {
        let arena = Arena::new();
        let b = arena.decl("b");
        let a = arena.decl("a");
        let mu = arena.decl("mu");
        // two separate lowerings of *b.a.mu
        let e1 = arena.load(arena.project(arena.project(arena.literal_ptr(b), a), mu));
        let e2 = arena.load(arena.project(arena.project(arena.literal_ptr(b), a), mu));
        assert!(!std::ptr::eq(e1, e2));
        assert!(equivalent(Some(e1), Some(e2)));

        let e3 = arena.load(arena.project(arena.literal_ptr(b), mu));
        assert!(!equivalent(Some(e1), Some(e3)));
    }

    #[test]
    fn test_alpha_equivalence_of_binders() {
        let arena = Arena::new();
        let ty = arena.literal(arena.source_expr("int"));

        let vx = arena.variable(VariableKind::Fun, Some(ty), Some(arena.decl("x")));
        let fx = arena.function(vx, arena.binary_op(BinaryOpcode::Add, vx, vx));

        let vy = arena.variable(VariableKind::Fun, Some(ty), Some(arena.decl("y")));
        let fy = arena.function(vy, arena.binary_op(BinaryOpcode::Add, vy, vy));

        assert!(equivalent(Some(fx), Some(fy)));

        // a bound variable does not match a free one
        let free = arena.let_variable(None, Some(arena.decl("z")));
        let vz = arena.variable(VariableKind::Fun, Some(ty), Some(arena.decl("x")));
        let fz = arena.function(vz, arena.binary_op(BinaryOpcode::Add, vz, free));
        assert!(!equivalent(Some(fx), Some(fz)));
    }

    #[test]
    fn test_wildcard_matches_any_subtree() {
        let arena = Arena::new();
        let mu = arena.decl("mu");
        let e = arena.load(arena.project(arena.literal_ptr(mu), arena.decl("a")));
        let pat = arena.load(arena.wildcard());

        assert!(equivalent(Some(e), Some(pat)));
        assert!(equivalent(Some(pat), Some(e)));
        assert!(equivalent(Some(arena.wildcard()), Some(arena.wildcard())));

        // the wildcard only absorbs the subtree it stands for
        let store = arena.store(arena.literal_ptr(mu), arena.wildcard());
        assert!(!equivalent(Some(e), Some(store)));
    }

    #[test]
    fn test_absent_edges() {
        let arena = Arena::new();
        let e = arena.literal_ptr(arena.decl("mu"));
        assert!(equivalent(None, None));
        assert!(!equivalent(Some(e), None));
        assert!(!equivalent(None, Some(e)));
    }

    struct CountingComparator<'a> {
        inner: EqualsComparator<'a>,
        identity_results: Vec<bool>,
    }

    impl<'a> CountingComparator<'a> {
        fn new() -> CountingComparator<'a> {
            CountingComparator {
                inner: EqualsComparator::new(),
                identity_results: Vec::new(),
            }
        }
    }

    impl<'a> Comparator<'a> for CountingComparator<'a> {
        type CT = bool;

        fn true_result(&mut self) -> bool {
            self.inner.true_result()
        }

        fn not_true(&mut self, ct: &bool) -> bool {
            self.inner.not_true(ct)
        }

        fn compare_integers(&mut self, a: u32, b: u32) -> bool {
            self.inner.compare_integers(a, b)
        }

        fn compare_identity(&mut self, same: bool) -> bool {
            self.identity_results.push(same);
            self.inner.compare_identity(same)
        }

        fn compare_variable_refs(&mut self, a: &'a Expr<'a>, b: &'a Expr<'a>) -> bool {
            self.inner.compare_variable_refs(a, b)
        }

        fn enter_scope(&mut self, a: &'a Expr<'a>, b: &'a Expr<'a>) {
            self.inner.enter_scope(a, b);
        }

        fn leave_scope(&mut self) {
            self.inner.leave_scope();
        }
    }

    #[test]
    fn test_comparison_short_circuits() {
        let arena = Arena::new();
        let mu = arena.decl("mu");
        let s1 = arena.store(
            arena.literal_ptr(arena.decl("p")),
            arena.literal_ptr(mu),
        );
        let s2 = arena.store(
            arena.literal_ptr(arena.decl("q")),
            arena.literal_ptr(mu),
        );

        let mut c = CountingComparator::new();
        let eq = c.compare(Some(s1), Some(s2));
        assert!(!eq);
        // the destinations differ, so the sources are never inspected
        assert_eq!(c.identity_results, vec![false]);
    }

    #[test]
    fn test_binary_op_operands_compare_left_to_right() {
        let arena = Arena::new();
        let p = arena.decl("p");
        let q = arena.decl("q");
        let r = arena.decl("r");
        let e1 = arena.binary_op(BinaryOpcode::Add, arena.literal_ptr(p), arena.literal_ptr(q));

        // left operands differ: the right ones are never inspected
        let e2 = arena.binary_op(BinaryOpcode::Add, arena.literal_ptr(r), arena.literal_ptr(q));
        let mut c = CountingComparator::new();
        assert!(!c.compare(Some(e1), Some(e2)));
        assert_eq!(c.identity_results, vec![false]);

        // left operands match first, then the right ones fail
        let e3 = arena.binary_op(BinaryOpcode::Add, arena.literal_ptr(p), arena.literal_ptr(r));
        let mut c = CountingComparator::new();
        assert!(!c.compare(Some(e1), Some(e3)));
        assert_eq!(c.identity_results, vec![true, false]);
    }

    fn build_diamond<'a>(arena: &'a Arena<'a>, p: &'a crate::sexpr::ValueDecl) -> &'a Expr<'a> {
        let cfg_e = arena.scfg();
        let cfg = cfg_e.as_scfg().unwrap();
        let b0 = arena.basic_block();
        let b1 = arena.basic_block();
        let b2 = arena.basic_block();
        let b3 = arena.basic_block();
        cfg.add(b0);
        cfg.add(b1);
        cfg.add(b2);
        cfg.add(b3);
        cfg.set_exit(b3);

        let cond = arena.let_variable(Some(arena.load(arena.literal_ptr(p))), None);
        b0.add_instruction(cond);
        let ti = b3.add_predecessor();
        let ei = b3.add_predecessor();
        b0.set_terminator(arena.branch(cond, b1, b2, ti, ei));

        let v1 = arena.let_variable(Some(arena.load(cond)), None);
        b1.add_instruction(v1);
        b1.set_terminator(arena.goto(b3, ti));
        let v2 = arena.let_variable(Some(arena.load(cond)), None);
        b2.add_instruction(v2);
        b2.set_terminator(arena.goto(b3, ei));

        let phi = arena.phi(vec![v1, v2]);
        let a3 = arena.let_variable(Some(phi), None);
        b3.add_argument(a3);
        cfg_e
    }

    #[test]
    fn test_cfgs_compare_by_block_position() {
        let arena = Arena::new();
        let p = arena.decl("p");
        let c1 = build_diamond(&arena, p);
        let c2 = build_diamond(&arena, p);
        assert!(!std::ptr::eq(c1, c2));
        assert!(equivalent(Some(c1), Some(c2)));

        let c3 = build_diamond(&arena, arena.decl("q"));
        assert!(!equivalent(Some(c1), Some(c3)));
    }
}
