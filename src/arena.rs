//! Bump allocation for IR graphs.
//!
//! All nodes built for one analysis pass share a single [`Arena`] and are
//! reclaimed together when it is dropped. Builders hand out `&'a Expr<'a>`
//! references with the arena's own lifetime, which is what lets nodes point
//! at each other (and at themselves, for sfunctions) without reference
//! counting.

use typed_arena::Arena as TypedArena;

use crate::cfg::{BasicBlock, Branch, Goto, Phi, Scfg};
use crate::ops::{BinaryOpcode, CastOpcode, UnaryOpcode};
use crate::sexpr::{
    Alloc, AllocKind, Apply, ArrayAdd, ArrayFirst, BinaryOp, Call, Cast, Code, Expr, ExprRef,
    Function, Future, LazyRewrite, Literal, LiteralPtr, Load, Project, SApply, SFunction,
    SourceExpr, SourceStmt, Store, UnaryOp, Undefined, ValueDecl, Variable, VariableKind,
};

pub struct Arena<'a> {
    exprs: TypedArena<Expr<'a>>,
    blocks: TypedArena<BasicBlock<'a>>,
    decls: TypedArena<ValueDecl>,
    source_exprs: TypedArena<SourceExpr>,
    source_stmts: TypedArena<SourceStmt>,
}

impl<'a> Arena<'a> {
    pub fn new() -> Arena<'a> {
        Arena {
            exprs: TypedArena::new(),
            blocks: TypedArena::new(),
            decls: TypedArena::new(),
            source_exprs: TypedArena::new(),
            source_stmts: TypedArena::new(),
        }
    }

    fn insert(&'a self, e: Expr<'a>) -> &'a Expr<'a> {
        let e = self.exprs.alloc(e);
        e.register_edges();
        e
    }

    pub fn decl<S: Into<String>>(&'a self, name: S) -> &'a ValueDecl {
        self.decls.alloc(ValueDecl::new(name))
    }

    pub fn source_expr<S: Into<String>>(&'a self, text: S) -> &'a SourceExpr {
        self.source_exprs.alloc(SourceExpr::new(text))
    }

    pub fn source_stmt<S: Into<String>>(&'a self, text: S) -> &'a SourceStmt {
        self.source_stmts.alloc(SourceStmt::new(text))
    }

    pub fn variable(
        &'a self,
        kind: VariableKind,
        definition: Option<&'a Expr<'a>>,
        decl: Option<&'a ValueDecl>,
    ) -> &'a Expr<'a> {
        self.insert(Expr::Variable(Variable::new(kind, definition, decl)))
    }

    pub fn let_variable(
        &'a self,
        definition: Option<&'a Expr<'a>>,
        decl: Option<&'a ValueDecl>,
    ) -> &'a Expr<'a> {
        self.variable(VariableKind::Let, definition, decl)
    }

    pub fn future(&'a self, thunk: &'a dyn LazyRewrite<'a>) -> &'a Expr<'a> {
        self.insert(Expr::Future(Future::new(thunk)))
    }

    pub fn undefined(&'a self, stmt: Option<&'a SourceStmt>) -> &'a Expr<'a> {
        self.insert(Expr::Undefined(Undefined { stmt }))
    }

    pub fn wildcard(&'a self) -> &'a Expr<'a> {
        self.insert(Expr::Wildcard)
    }

    pub fn literal(&'a self, source: &'a SourceExpr) -> &'a Expr<'a> {
        self.insert(Expr::Literal(Literal { source }))
    }

    pub fn literal_ptr(&'a self, decl: &'a ValueDecl) -> &'a Expr<'a> {
        self.insert(Expr::LiteralPtr(LiteralPtr { decl }))
    }

    /// Builds a lambda. The binder must be a variable node; its kind is
    /// switched to `Fun`.
    pub fn function(&'a self, var_decl: &'a Expr<'a>, body: &'a Expr<'a>) -> &'a Expr<'a> {
        let v = var_decl
            .as_variable()
            .expect("a function binder must be a variable");
        v.set_kind(VariableKind::Fun);
        self.insert(Expr::Function(Function {
            var_decl,
            body: ExprRef::new(Some(body)),
        }))
    }

    /// Builds a self-applicable function and back-patches the self-variable's
    /// definition to point at it. The binder must be an undefined variable.
    pub fn sfunction(&'a self, var_decl: &'a Expr<'a>, body: &'a Expr<'a>) -> &'a Expr<'a> {
        let v = var_decl
            .as_variable()
            .expect("an sfunction binder must be a variable");
        assert!(
            v.definition().is_none(),
            "an sfunction binder must start undefined"
        );
        v.set_kind(VariableKind::SFun);
        let e = self.insert(Expr::SFunction(SFunction {
            var_decl,
            body: ExprRef::new(Some(body)),
        }));
        v.set_definition(Some(e));
        e
    }

    pub fn code(&'a self, return_type: &'a Expr<'a>, body: &'a Expr<'a>) -> &'a Expr<'a> {
        self.insert(Expr::Code(Code {
            return_type: ExprRef::new(Some(return_type)),
            body: ExprRef::new(Some(body)),
        }))
    }

    pub fn apply(&'a self, fun: &'a Expr<'a>, arg: &'a Expr<'a>) -> &'a Expr<'a> {
        self.insert(Expr::Apply(Apply {
            fun: ExprRef::new(Some(fun)),
            arg: ExprRef::new(Some(arg)),
        }))
    }

    /// `arg` of `None` builds a delegation.
    pub fn sapply(&'a self, sfun: &'a Expr<'a>, arg: Option<&'a Expr<'a>>) -> &'a Expr<'a> {
        self.insert(Expr::SApply(SApply {
            sfun: ExprRef::new(Some(sfun)),
            arg: ExprRef::new(arg),
        }))
    }

    pub fn project(&'a self, record: &'a Expr<'a>, decl: &'a ValueDecl) -> &'a Expr<'a> {
        self.insert(Expr::Project(Project {
            record: ExprRef::new(Some(record)),
            decl,
        }))
    }

    pub fn call(
        &'a self,
        target: &'a Expr<'a>,
        call_expr: Option<&'a SourceExpr>,
    ) -> &'a Expr<'a> {
        self.insert(Expr::Call(Call {
            target: ExprRef::new(Some(target)),
            call_expr,
        }))
    }

    pub fn alloc(&'a self, data_type: &'a Expr<'a>, kind: AllocKind) -> &'a Expr<'a> {
        self.insert(Expr::Alloc(Alloc {
            kind,
            data_type: ExprRef::new(Some(data_type)),
        }))
    }

    pub fn load(&'a self, pointer: &'a Expr<'a>) -> &'a Expr<'a> {
        self.insert(Expr::Load(Load {
            pointer: ExprRef::new(Some(pointer)),
        }))
    }

    pub fn store(&'a self, dest: &'a Expr<'a>, source: &'a Expr<'a>) -> &'a Expr<'a> {
        self.insert(Expr::Store(Store {
            dest: ExprRef::new(Some(dest)),
            source: ExprRef::new(Some(source)),
        }))
    }

    pub fn array_first(&'a self, array: &'a Expr<'a>) -> &'a Expr<'a> {
        self.insert(Expr::ArrayFirst(ArrayFirst {
            array: ExprRef::new(Some(array)),
        }))
    }

    pub fn array_add(&'a self, array: &'a Expr<'a>, index: &'a Expr<'a>) -> &'a Expr<'a> {
        self.insert(Expr::ArrayAdd(ArrayAdd {
            array: ExprRef::new(Some(array)),
            index: ExprRef::new(Some(index)),
        }))
    }

    pub fn unary_op(&'a self, op: UnaryOpcode, expr: &'a Expr<'a>) -> &'a Expr<'a> {
        self.insert(Expr::UnaryOp(UnaryOp {
            op,
            expr: ExprRef::new(Some(expr)),
        }))
    }

    pub fn binary_op(
        &'a self,
        op: BinaryOpcode,
        expr0: &'a Expr<'a>,
        expr1: &'a Expr<'a>,
    ) -> &'a Expr<'a> {
        self.insert(Expr::BinaryOp(BinaryOp {
            op,
            expr0: ExprRef::new(Some(expr0)),
            expr1: ExprRef::new(Some(expr1)),
        }))
    }

    pub fn cast(&'a self, op: CastOpcode, expr: &'a Expr<'a>) -> &'a Expr<'a> {
        self.insert(Expr::Cast(Cast {
            op,
            expr: ExprRef::new(Some(expr)),
        }))
    }

    pub fn scfg(&'a self) -> &'a Expr<'a> {
        self.insert(Expr::Scfg(Scfg::new()))
    }

    pub fn basic_block(&'a self) -> &'a BasicBlock<'a> {
        self.blocks.alloc(BasicBlock::new())
    }

    pub fn phi(&'a self, values: Vec<&'a Expr<'a>>) -> &'a Expr<'a> {
        self.insert(Expr::Phi(Phi::new(values)))
    }

    /// A phi with no values yet; callers fill it in while wiring back edges.
    pub fn incomplete_phi(&'a self) -> &'a Expr<'a> {
        self.insert(Expr::Phi(Phi::incomplete()))
    }

    pub fn goto(&'a self, target: &'a BasicBlock<'a>, index: u32) -> &'a Expr<'a> {
        self.insert(Expr::Goto(Goto { target, index }))
    }

    pub fn branch(
        &'a self,
        condition: &'a Expr<'a>,
        then_block: &'a BasicBlock<'a>,
        else_block: &'a BasicBlock<'a>,
        then_index: u32,
        else_index: u32,
    ) -> &'a Expr<'a> {
        self.insert(Expr::Branch(Branch {
            condition: ExprRef::new(Some(condition)),
            then_block,
            else_block,
            then_index,
            else_index,
        }))
    }
}

impl<'a> Default for Arena<'a> {
    fn default() -> Arena<'a> {
        Arena::new()
    }
}
