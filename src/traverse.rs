//! The rewriting traversal protocol.
//!
//! A [`Traversal`] walks an expression tree bottom-up and folds it into an
//! associated result type through one `reduce_*` callback per node kind. The
//! same protocol serves visitors (result `()` or `bool`), rewriters (result
//! `Option<&Expr>`), and pretty printers; [`CopyReducer`] is the reference
//! rewriter and produces a fresh copy of the graph in another arena.

use fnv::FnvHashMap;

use crate::arena::Arena;
use crate::cfg::BasicBlock;
use crate::sexpr::Expr;

/// How an edge should be traversed.
///
/// `Lazy` marks subtrees a rewriter may defer (types, code bodies), `Tail`
/// marks terminator position. [`walk_expr`] itself treats all three alike;
/// lazy rewriters override [`Traversal::traverse`] and inspect the kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TraversalKind {
    Normal,
    Lazy,
    Tail,
}

pub trait Traversal<'a>: Sized {
    /// The result of reducing one node.
    type R;

    fn traverse(&mut self, e: Option<&'a Expr<'a>>, kind: TraversalKind) -> Self::R {
        walk_expr(self, e, kind)
    }

    /// Reduction of an absent edge.
    fn reduce_null(&mut self) -> Self::R;

    /// A use of a variable. Binding sites go through [`Traversal::enter_scope`]
    /// instead.
    fn reduce_variable_ref(&mut self, var: &'a Expr<'a>) -> Self::R;

    fn reduce_undefined(&mut self, orig: &'a Expr<'a>) -> Self::R;
    fn reduce_wildcard(&mut self, orig: &'a Expr<'a>) -> Self::R;
    fn reduce_literal(&mut self, orig: &'a Expr<'a>) -> Self::R;
    fn reduce_literal_ptr(&mut self, orig: &'a Expr<'a>) -> Self::R;

    fn reduce_function(&mut self, orig: &'a Expr<'a>, var_decl: &'a Expr<'a>, body: Self::R)
        -> Self::R;
    fn reduce_sfunction(&mut self, orig: &'a Expr<'a>, var_decl: &'a Expr<'a>, body: Self::R)
        -> Self::R;
    fn reduce_code(&mut self, orig: &'a Expr<'a>, return_type: Self::R, body: Self::R) -> Self::R;
    fn reduce_apply(&mut self, orig: &'a Expr<'a>, fun: Self::R, arg: Self::R) -> Self::R;
    /// `arg` is `None` for delegations.
    fn reduce_sapply(&mut self, orig: &'a Expr<'a>, sfun: Self::R, arg: Option<Self::R>)
        -> Self::R;
    fn reduce_project(&mut self, orig: &'a Expr<'a>, record: Self::R) -> Self::R;
    fn reduce_call(&mut self, orig: &'a Expr<'a>, target: Self::R) -> Self::R;
    fn reduce_alloc(&mut self, orig: &'a Expr<'a>, data_type: Self::R) -> Self::R;
    fn reduce_load(&mut self, orig: &'a Expr<'a>, pointer: Self::R) -> Self::R;
    fn reduce_store(&mut self, orig: &'a Expr<'a>, dest: Self::R, source: Self::R) -> Self::R;
    fn reduce_array_first(&mut self, orig: &'a Expr<'a>, array: Self::R) -> Self::R;
    fn reduce_array_add(&mut self, orig: &'a Expr<'a>, array: Self::R, index: Self::R) -> Self::R;
    fn reduce_unary_op(&mut self, orig: &'a Expr<'a>, expr: Self::R) -> Self::R;
    fn reduce_binary_op(&mut self, orig: &'a Expr<'a>, expr0: Self::R, expr1: Self::R) -> Self::R;
    fn reduce_cast(&mut self, orig: &'a Expr<'a>, expr: Self::R) -> Self::R;

    fn reduce_phi(&mut self, orig: &'a Expr<'a>, values: Vec<Self::R>) -> Self::R;
    fn reduce_goto(&mut self, orig: &'a Expr<'a>, target: &'a BasicBlock<'a>) -> Self::R;
    fn reduce_branch(
        &mut self,
        orig: &'a Expr<'a>,
        condition: Self::R,
        then_block: &'a BasicBlock<'a>,
        else_block: &'a BasicBlock<'a>,
    ) -> Self::R;
    fn reduce_scfg(&mut self, orig: &'a Expr<'a>, blocks: Vec<&'a BasicBlock<'a>>) -> Self::R;

    /// Folds one traversed basic block. `args` and `instrs` hold whatever
    /// [`Traversal::enter_scope`] returned for each slot.
    fn reduce_basic_block(
        &mut self,
        orig: &'a BasicBlock<'a>,
        args: Vec<&'a Expr<'a>>,
        instrs: Vec<&'a Expr<'a>>,
        terminator: Self::R,
    ) -> &'a BasicBlock<'a> {
        let _ = (args, instrs, terminator);
        orig
    }

    /// Called when the walk enters a binder, with the already-reduced
    /// definition. Returns the variable that stands for the binder from here
    /// on; rewriters return a fresh one.
    fn enter_scope(&mut self, var_decl: &'a Expr<'a>, definition: Self::R) -> &'a Expr<'a> {
        let _ = definition;
        var_decl
    }

    fn exit_scope(&mut self, var_decl: &'a Expr<'a>) {
        let _ = var_decl;
    }

    fn enter_cfg(&mut self, cfg: &'a Expr<'a>) {
        let _ = cfg;
    }

    fn exit_cfg(&mut self, cfg: &'a Expr<'a>) {
        let _ = cfg;
    }
}

/// The default walk. Children are reduced left to right in a fixed order per
/// node kind; binders bracket their bodies with scope hooks.
pub fn walk_expr<'a, T: Traversal<'a>>(
    s: &mut T,
    e: Option<&'a Expr<'a>>,
    kind: TraversalKind,
) -> T::R {
    let e = match e {
        Some(e) => e,
        None => return s.reduce_null(),
    };
    match e {
        Expr::Variable(_) => s.reduce_variable_ref(e),
        Expr::Future(f) => {
            let r = f
                .maybe_get_result()
                .expect("cannot traverse a future that has not been forced");
            s.traverse(Some(r), kind)
        }
        Expr::Undefined(_) => s.reduce_undefined(e),
        Expr::Wildcard => s.reduce_wildcard(e),
        Expr::Literal(_) => s.reduce_literal(e),
        Expr::LiteralPtr(_) => s.reduce_literal_ptr(e),
        Expr::Function(f) => {
            let def = s.traverse(f.variable().definition(), TraversalKind::Lazy);
            let nvd = s.enter_scope(f.variable_decl(), def);
            let body = s.traverse(f.body(), TraversalKind::Normal);
            s.exit_scope(f.variable_decl());
            s.reduce_function(e, nvd, body)
        }
        Expr::SFunction(f) => {
            // the self-variable is introduced undefined and patched by the
            // reducer once the new sfunction exists
            let def = s.reduce_null();
            let nvd = s.enter_scope(f.variable_decl(), def);
            let body = s.traverse(f.body(), TraversalKind::Normal);
            s.exit_scope(f.variable_decl());
            s.reduce_sfunction(e, nvd, body)
        }
        Expr::Code(c) => {
            let t = s.traverse(c.return_type(), TraversalKind::Lazy);
            let b = s.traverse(c.body(), TraversalKind::Lazy);
            s.reduce_code(e, t, b)
        }
        Expr::Apply(a) => {
            let f = s.traverse(a.fun(), TraversalKind::Normal);
            let x = s.traverse(a.arg(), TraversalKind::Normal);
            s.reduce_apply(e, f, x)
        }
        Expr::SApply(a) => {
            let sf = s.traverse(a.sfun(), TraversalKind::Normal);
            let x = a
                .explicit_arg()
                .map(|x| s.traverse(Some(x), TraversalKind::Normal));
            s.reduce_sapply(e, sf, x)
        }
        Expr::Project(p) => {
            let r = s.traverse(p.record(), TraversalKind::Normal);
            s.reduce_project(e, r)
        }
        Expr::Call(c) => {
            let t = s.traverse(c.target(), TraversalKind::Normal);
            s.reduce_call(e, t)
        }
        Expr::Alloc(a) => {
            let d = s.traverse(a.data_type(), TraversalKind::Normal);
            s.reduce_alloc(e, d)
        }
        Expr::Load(l) => {
            let p = s.traverse(l.pointer(), TraversalKind::Normal);
            s.reduce_load(e, p)
        }
        Expr::Store(st) => {
            let d = s.traverse(st.destination(), TraversalKind::Normal);
            let v = s.traverse(st.source(), TraversalKind::Normal);
            s.reduce_store(e, d, v)
        }
        Expr::ArrayFirst(a) => {
            let arr = s.traverse(a.array(), TraversalKind::Normal);
            s.reduce_array_first(e, arr)
        }
        Expr::ArrayAdd(a) => {
            let arr = s.traverse(a.array(), TraversalKind::Normal);
            let i = s.traverse(a.index(), TraversalKind::Normal);
            s.reduce_array_add(e, arr, i)
        }
        Expr::UnaryOp(u) => {
            let x = s.traverse(u.expr(), TraversalKind::Normal);
            s.reduce_unary_op(e, x)
        }
        Expr::BinaryOp(b) => {
            let x0 = s.traverse(b.expr0(), TraversalKind::Normal);
            let x1 = s.traverse(b.expr1(), TraversalKind::Normal);
            s.reduce_binary_op(e, x0, x1)
        }
        Expr::Cast(c) => {
            let x = s.traverse(c.expr(), TraversalKind::Normal);
            s.reduce_cast(e, x)
        }
        Expr::Phi(p) => {
            let vs = p
                .values()
                .into_iter()
                .map(|v| s.traverse(v, TraversalKind::Normal))
                .collect();
            s.reduce_phi(e, vs)
        }
        Expr::Goto(g) => s.reduce_goto(e, g.target()),
        Expr::Branch(b) => {
            let c = s.traverse(b.condition(), TraversalKind::Normal);
            s.reduce_branch(e, c, b.then_block(), b.else_block())
        }
        Expr::Scfg(cfg) => {
            s.enter_cfg(e);
            let mut nbs = Vec::with_capacity(cfg.num_blocks());
            for b in cfg.blocks() {
                nbs.push(walk_basic_block(s, b));
            }
            let r = s.reduce_scfg(e, nbs);
            s.exit_cfg(e);
            r
        }
    }
}

/// Walks one block: argument definitions, instruction definitions, then the
/// terminator in tail position; scopes are exited in reverse order.
pub fn walk_basic_block<'a, T: Traversal<'a>>(
    s: &mut T,
    b: &'a BasicBlock<'a>,
) -> &'a BasicBlock<'a> {
    let args = b.arguments();
    let instrs = b.instructions();

    let mut nargs = Vec::with_capacity(args.len());
    for &a in &args {
        let v = variant!(a, Expr::Variable);
        let def = s.traverse(v.definition(), TraversalKind::Normal);
        nargs.push(s.enter_scope(a, def));
    }
    let mut ninstrs = Vec::with_capacity(instrs.len());
    for &i in &instrs {
        let v = variant!(i, Expr::Variable);
        let def = s.traverse(v.definition(), TraversalKind::Normal);
        ninstrs.push(s.enter_scope(i, def));
    }
    let term = s.traverse(b.terminator(), TraversalKind::Tail);

    for &i in instrs.iter().rev() {
        s.exit_scope(i);
    }
    for &a in args.iter().rev() {
        s.exit_scope(a);
    }
    s.reduce_basic_block(b, nargs, ninstrs, term)
}

fn addr<T>(p: &T) -> usize {
    p as *const T as usize
}

/// Rewrites an expression into a structurally identical copy allocated in
/// `arena`. Binders get fresh variables; every use site is redirected to the
/// fresh binder. Returns `None` if any reduced subtree was absent.
///
/// Variables bound lexically are tracked with a shadow stack so that reusing
/// a name deeper in the tree restores the outer binding on exit. Variables
/// bound by CFG blocks are pre-created when the CFG is entered and stay
/// visible for the whole CFG, since phi nodes reach them through back edges
/// before their block's walk has filled in their definitions.
pub struct CopyReducer<'a> {
    arena: &'a Arena<'a>,
    vars: FnvHashMap<usize, &'a Expr<'a>>,
    shadowed: Vec<(usize, Option<&'a Expr<'a>>)>,
    cfg_vars: FnvHashMap<usize, &'a Expr<'a>>,
    blocks: FnvHashMap<usize, &'a BasicBlock<'a>>,
    cfgs: Vec<&'a Expr<'a>>,
}

impl<'a> CopyReducer<'a> {
    pub fn new(arena: &'a Arena<'a>) -> CopyReducer<'a> {
        CopyReducer {
            arena,
            vars: FnvHashMap::default(),
            shadowed: Vec::new(),
            cfg_vars: FnvHashMap::default(),
            blocks: FnvHashMap::default(),
            cfgs: Vec::new(),
        }
    }

    fn mapped_block(&self, b: &'a BasicBlock<'a>) -> &'a BasicBlock<'a> {
        self.blocks.get(&addr(b)).copied().unwrap_or(b)
    }
}

impl<'a> Traversal<'a> for CopyReducer<'a> {
    type R = Option<&'a Expr<'a>>;

    fn reduce_null(&mut self) -> Self::R {
        None
    }

    fn reduce_variable_ref(&mut self, var: &'a Expr<'a>) -> Self::R {
        let key = addr(var);
        if let Some(&nv) = self.cfg_vars.get(&key) {
            return Some(nv);
        }
        if let Some(&nv) = self.vars.get(&key) {
            return Some(nv);
        }
        // free variable; keep the reference to the original
        Some(var)
    }

    fn reduce_undefined(&mut self, orig: &'a Expr<'a>) -> Self::R {
        Some(self.arena.undefined(variant!(orig, Expr::Undefined).stmt()))
    }

    fn reduce_wildcard(&mut self, _orig: &'a Expr<'a>) -> Self::R {
        Some(self.arena.wildcard())
    }

    fn reduce_literal(&mut self, orig: &'a Expr<'a>) -> Self::R {
        Some(self.arena.literal(variant!(orig, Expr::Literal).source()))
    }

    fn reduce_literal_ptr(&mut self, orig: &'a Expr<'a>) -> Self::R {
        Some(self.arena.literal_ptr(variant!(orig, Expr::LiteralPtr).decl()))
    }

    fn reduce_function(
        &mut self,
        _orig: &'a Expr<'a>,
        var_decl: &'a Expr<'a>,
        body: Self::R,
    ) -> Self::R {
        Some(self.arena.function(var_decl, body?))
    }

    fn reduce_sfunction(
        &mut self,
        _orig: &'a Expr<'a>,
        var_decl: &'a Expr<'a>,
        body: Self::R,
    ) -> Self::R {
        Some(self.arena.sfunction(var_decl, body?))
    }

    fn reduce_code(&mut self, _orig: &'a Expr<'a>, return_type: Self::R, body: Self::R) -> Self::R {
        Some(self.arena.code(return_type?, body?))
    }

    fn reduce_apply(&mut self, _orig: &'a Expr<'a>, fun: Self::R, arg: Self::R) -> Self::R {
        Some(self.arena.apply(fun?, arg?))
    }

    fn reduce_sapply(
        &mut self,
        _orig: &'a Expr<'a>,
        sfun: Self::R,
        arg: Option<Self::R>,
    ) -> Self::R {
        let arg = match arg {
            Some(a) => Some(a?),
            None => None,
        };
        Some(self.arena.sapply(sfun?, arg))
    }

    fn reduce_project(&mut self, orig: &'a Expr<'a>, record: Self::R) -> Self::R {
        Some(self.arena.project(record?, variant!(orig, Expr::Project).decl()))
    }

    fn reduce_call(&mut self, orig: &'a Expr<'a>, target: Self::R) -> Self::R {
        Some(self.arena.call(target?, variant!(orig, Expr::Call).call_expr()))
    }

    fn reduce_alloc(&mut self, orig: &'a Expr<'a>, data_type: Self::R) -> Self::R {
        Some(self.arena.alloc(data_type?, variant!(orig, Expr::Alloc).kind()))
    }

    fn reduce_load(&mut self, _orig: &'a Expr<'a>, pointer: Self::R) -> Self::R {
        Some(self.arena.load(pointer?))
    }

    fn reduce_store(&mut self, _orig: &'a Expr<'a>, dest: Self::R, source: Self::R) -> Self::R {
        Some(self.arena.store(dest?, source?))
    }

    fn reduce_array_first(&mut self, _orig: &'a Expr<'a>, array: Self::R) -> Self::R {
        Some(self.arena.array_first(array?))
    }

    fn reduce_array_add(&mut self, _orig: &'a Expr<'a>, array: Self::R, index: Self::R) -> Self::R {
        Some(self.arena.array_add(array?, index?))
    }

    fn reduce_unary_op(&mut self, orig: &'a Expr<'a>, expr: Self::R) -> Self::R {
        let op = variant!(orig, Expr::UnaryOp).unary_opcode();
        Some(self.arena.unary_op(op, expr?))
    }

    fn reduce_binary_op(&mut self, orig: &'a Expr<'a>, expr0: Self::R, expr1: Self::R) -> Self::R {
        let op = variant!(orig, Expr::BinaryOp).binary_opcode();
        Some(self.arena.binary_op(op, expr0?, expr1?))
    }

    fn reduce_cast(&mut self, orig: &'a Expr<'a>, expr: Self::R) -> Self::R {
        let op = variant!(orig, Expr::Cast).cast_opcode();
        Some(self.arena.cast(op, expr?))
    }

    fn reduce_phi(&mut self, orig: &'a Expr<'a>, values: Vec<Self::R>) -> Self::R {
        let vs = values.into_iter().collect::<Option<Vec<_>>>()?;
        let nph = self.arena.phi(vs);
        nph.as_phi()
            .unwrap()
            .set_status(variant!(orig, Expr::Phi).status());
        Some(nph)
    }

    fn reduce_goto(&mut self, orig: &'a Expr<'a>, target: &'a BasicBlock<'a>) -> Self::R {
        let g = variant!(orig, Expr::Goto);
        Some(self.arena.goto(self.mapped_block(target), g.index()))
    }

    fn reduce_branch(
        &mut self,
        orig: &'a Expr<'a>,
        condition: Self::R,
        then_block: &'a BasicBlock<'a>,
        else_block: &'a BasicBlock<'a>,
    ) -> Self::R {
        let b = variant!(orig, Expr::Branch);
        Some(self.arena.branch(
            condition?,
            self.mapped_block(then_block),
            self.mapped_block(else_block),
            b.then_index(),
            b.else_index(),
        ))
    }

    fn reduce_scfg(&mut self, _orig: &'a Expr<'a>, _blocks: Vec<&'a BasicBlock<'a>>) -> Self::R {
        Some(self.cfgs.pop().expect("unbalanced cfg exit"))
    }

    fn reduce_basic_block(
        &mut self,
        orig: &'a BasicBlock<'a>,
        args: Vec<&'a Expr<'a>>,
        instrs: Vec<&'a Expr<'a>>,
        terminator: Self::R,
    ) -> &'a BasicBlock<'a> {
        let nb = self.mapped_block(orig);
        for a in args {
            nb.add_argument(a);
        }
        for i in instrs {
            nb.add_instruction(i);
        }
        if let Some(t) = terminator {
            nb.set_terminator(t);
        }
        nb
    }

    fn enter_scope(&mut self, var_decl: &'a Expr<'a>, definition: Self::R) -> &'a Expr<'a> {
        let key = addr(var_decl);
        if let Some(&nv) = self.cfg_vars.get(&key) {
            // pre-created by enter_cfg; the definition becomes known here
            variant!(nv, Expr::Variable).set_definition(definition);
            return nv;
        }
        let ov = variant!(var_decl, Expr::Variable);
        let nv = self.arena.variable(ov.kind(), definition, ov.decl());
        let old = self.vars.insert(key, nv);
        self.shadowed.push((key, old));
        nv
    }

    fn exit_scope(&mut self, var_decl: &'a Expr<'a>) {
        let key = addr(var_decl);
        if self.cfg_vars.contains_key(&key) {
            // block-defined; stays visible until the CFG is left
            return;
        }
        let (skey, old) = self.shadowed.pop().expect("unbalanced scope exit");
        debug_assert_eq!(skey, key);
        match old {
            Some(v) => {
                self.vars.insert(skey, v);
            }
            None => {
                self.vars.remove(&skey);
            }
        }
    }

    fn enter_cfg(&mut self, cfg: &'a Expr<'a>) {
        let ocfg = variant!(cfg, Expr::Scfg);
        let ncfg_e = self.arena.scfg();
        let ncfg = ncfg_e.as_scfg().unwrap();
        for ob in ocfg.blocks() {
            let nb = self.arena.basic_block();
            nb.set_num_predecessors(ob.num_predecessors());
            ncfg.add(nb);
            self.blocks.insert(addr(ob), nb);
            // bind every block-defined variable up front so phi values can
            // reach it through a back edge before its block is walked
            for ov in ob.arguments().into_iter().chain(ob.instructions()) {
                let v = variant!(ov, Expr::Variable);
                let nv = self.arena.variable(v.kind(), None, v.decl());
                self.cfg_vars.insert(addr(ov), nv);
            }
        }
        for ob in ocfg.blocks() {
            if let Some(p) = ob.parent() {
                self.mapped_block(ob).set_parent(Some(self.mapped_block(p)));
            }
        }
        if let Some(en) = ocfg.entry() {
            ncfg.set_entry(self.mapped_block(en));
        }
        if let Some(ex) = ocfg.exit() {
            ncfg.set_exit(self.mapped_block(ex));
        }
        self.cfgs.push(ncfg_e);
    }

    fn exit_cfg(&mut self, _cfg: &'a Expr<'a>) {
        if self.cfgs.is_empty() {
            self.cfg_vars.clear();
            self.blocks.clear();
        }
    }
}

/// Copies `e` into `arena` with fresh binders.
pub fn copy_expr<'a>(arena: &'a Arena<'a>, e: &'a Expr<'a>) -> Option<&'a Expr<'a>> {
    CopyReducer::new(arena).traverse(Some(e), TraversalKind::Normal)
}

#[cfg(test)]
mod traverse_tests {
    use super::*;
    use crate::cfg::PhiStatus;
    use crate::compare::equivalent;
    use crate::ops::BinaryOpcode;
    use crate::sexpr::{Opcode, VariableKind};

    #[test]
    fn test_copy_preserves_structure() {
        let arena = Arena::new();
        let b = arena.decl("b");
        let a = arena.decl("a");
        let mu = arena.decl("mu");
        // *b.a.mu
        let e = arena.load(arena.project(
            arena.project(arena.literal_ptr(b), a),
            mu,
        ));

        let copy = copy_expr(&arena, e).unwrap();
        assert!(!std::ptr::eq(copy, e));
        assert!(equivalent(Some(e), Some(copy)));
    }

    #[test]
    fn test_copy_makes_fresh_binders() {
        let arena = Arena::new();
        let x = arena.decl("x");
        let one = arena.literal(arena.source_expr("1"));
        let v = arena.variable(VariableKind::Fun, Some(one), Some(x));
        let body = arena.binary_op(BinaryOpcode::Add, v, v);
        let f = arena.function(v, body);

        let copy = copy_expr(&arena, f).unwrap();
        assert!(equivalent(Some(f), Some(copy)));

        let nf = variant!(copy, Expr::Function);
        let of = variant!(f, Expr::Function);
        assert!(!std::ptr::eq(nf.variable_decl(), of.variable_decl()));
        // use sites follow the fresh binder
        let nb = variant!(nf.body().unwrap(), Expr::BinaryOp);
        assert!(std::ptr::eq(nb.expr0().unwrap(), nf.variable_decl()));
        assert_eq!(nf.variable().uses(), 2);
    }

    #[test]
    fn test_copy_keeps_free_variables() {
        let arena = Arena::new();
        let free = arena.let_variable(None, Some(arena.decl("free")));
        let e = arena.load(free);

        let copy = copy_expr(&arena, e).unwrap();
        let l = variant!(copy, Expr::Load);
        assert!(std::ptr::eq(l.pointer().unwrap(), free));
    }

    #[test]
    fn test_copy_rebinds_sfunction_self_variable() {
        let arena = Arena::new();
        let this = arena.decl("this");
        let v = arena.variable(VariableKind::SFun, None, Some(this));
        let body = arena.load(v);
        let sfn = arena.sfunction(v, body);

        let copy = copy_expr(&arena, sfn).unwrap();
        assert_eq!(copy.opcode(), Opcode::SFunction);
        let nsf = variant!(copy, Expr::SFunction);
        assert!(!std::ptr::eq(copy, sfn));
        // the fresh self-variable points at the fresh sfunction
        assert!(std::ptr::eq(nsf.variable().definition().unwrap(), copy));
        let nb = variant!(nsf.body().unwrap(), Expr::Load);
        assert!(std::ptr::eq(nb.pointer().unwrap(), nsf.variable_decl()));
    }

    #[test]
    fn test_copy_shadowed_binders() {
        let arena = Arena::new();
        let x = arena.decl("x");
        let ty = arena.literal(arena.source_expr("int"));
        let outer = arena.variable(VariableKind::Fun, Some(ty), Some(x));
        let inner = arena.variable(VariableKind::Fun, Some(ty), Some(x));
        // fn x. (fn x. x) x   -- inner body sees inner, outer arg sees outer
        let inner_fn = arena.function(inner, inner);
        let body = arena.apply(inner_fn, outer);
        let f = arena.function(outer, body);

        let copy = copy_expr(&arena, f).unwrap();
        assert!(equivalent(Some(f), Some(copy)));

        let nf = variant!(copy, Expr::Function);
        let napp = variant!(nf.body().unwrap(), Expr::Apply);
        let ninner = variant!(napp.fun().unwrap(), Expr::Function);
        assert!(std::ptr::eq(
            ninner.body().unwrap(),
            ninner.variable_decl()
        ));
        assert!(std::ptr::eq(napp.arg().unwrap(), nf.variable_decl()));
    }

    #[test]
    fn test_copy_cfg_round_trip() {
        let arena = Arena::new();
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
        for b in [b1, b2, b3].iter() {
            b.set_parent(Some(b0));
        }

        let p = arena.literal_ptr(arena.decl("p"));
        let cond = arena.let_variable(Some(arena.load(p)), Some(arena.decl("c")));
        b0.add_instruction(cond);
        let ti = b3.add_predecessor();
        let ei = b3.add_predecessor();
        b0.set_terminator(arena.branch(cond, b1, b2, ti, ei));

        let one = arena.literal(arena.source_expr("1"));
        let two = arena.literal(arena.source_expr("2"));
        let v1 = arena.let_variable(Some(arena.load(one)), None);
        b1.add_instruction(v1);
        b1.set_terminator(arena.goto(b3, ti));
        let v2 = arena.let_variable(Some(arena.load(two)), None);
        b2.add_instruction(v2);
        b2.set_terminator(arena.goto(b3, ei));

        let phi = arena.phi(vec![v1, v2]);
        let a3 = arena.let_variable(Some(phi), Some(arena.decl("m")));
        b3.add_argument(a3);

        let copy = copy_expr(&arena, cfg_e).unwrap();
        assert!(!std::ptr::eq(copy, cfg_e));
        assert!(equivalent(Some(cfg_e), Some(copy)));

        let ncfg = copy.as_scfg().unwrap();
        assert_eq!(ncfg.num_blocks(), 4);
        let nb0 = ncfg.entry().unwrap();
        assert_eq!(nb0.block_id(), 0);
        let nbr = variant!(nb0.terminator().unwrap(), Expr::Branch);
        assert!(std::ptr::eq(nbr.then_block(), ncfg.blocks()[1]));
        assert!(std::ptr::eq(nbr.else_block(), ncfg.blocks()[2]));

        // the copied phi references the copied instructions
        let nb3 = ncfg.exit().unwrap();
        let na = variant!(nb3.arguments()[0], Expr::Variable);
        let nph = variant!(na.definition().unwrap(), Expr::Phi);
        let nvals = nph.values();
        assert!(std::ptr::eq(
            nvals[0].unwrap(),
            ncfg.blocks()[1].instructions()[0]
        ));
        assert!(std::ptr::eq(
            nvals[1].unwrap(),
            ncfg.blocks()[2].instructions()[0]
        ));
    }

    #[test]
    fn test_copy_cfg_back_edges() {
        let arena = Arena::new();
        let cfg_e = arena.scfg();
        let cfg = cfg_e.as_scfg().unwrap();
        let b0 = arena.basic_block();
        let b1 = arena.basic_block();
        let b2 = arena.basic_block();
        cfg.add(b0);
        cfg.add(b1);
        cfg.add(b2);
        cfg.set_exit(b2);
        b1.set_parent(Some(b0));
        b2.set_parent(Some(b1));

        // b0 -> b1 <-> b2, with a loop-header phi in b1 fed by both edges
        let p = arena.literal_ptr(arena.decl("p"));
        let i0 = arena.let_variable(Some(arena.load(p)), None);
        b0.add_instruction(i0);
        let entry_edge = b1.add_predecessor();
        let back_edge = b1.add_predecessor();
        b0.set_terminator(arena.goto(b1, entry_edge));

        let phi_e = arena.incomplete_phi();
        let a1 = arena.let_variable(Some(phi_e), Some(arena.decl("n")));
        b1.add_argument(a1);
        b1.set_terminator(arena.goto(b2, b2.add_predecessor()));

        let i2 = arena.let_variable(Some(arena.load(a1)), None);
        b2.add_instruction(i2);
        b2.set_terminator(arena.goto(b1, back_edge));

        let ph = phi_e.as_phi().unwrap();
        ph.add_value(i0);
        ph.add_value(i2);
        ph.set_status(PhiStatus::MultiVal);

        let copy = copy_expr(&arena, cfg_e).unwrap();
        assert!(!std::ptr::eq(copy, cfg_e));

        // the phi value flowing in over the back edge must be the copied
        // instruction, not a reference into the source graph
        let ncfg = copy.as_scfg().unwrap();
        let ni2 = ncfg.blocks()[2].instructions()[0];
        assert!(!std::ptr::eq(ni2, i2));
        let na = variant!(ncfg.blocks()[1].arguments()[0], Expr::Variable);
        let nph = variant!(na.definition().unwrap(), Expr::Phi);
        let nvals = nph.values();
        assert!(std::ptr::eq(
            nvals[0].unwrap(),
            ncfg.blocks()[0].instructions()[0]
        ));
        assert!(std::ptr::eq(nvals[1].unwrap(), ni2));

        assert!(equivalent(Some(cfg_e), Some(copy)));
    }
}
