//! The node model for the typed intermediate language.
//!
//! Source-level guard expressions (`(*b).a.mu` and friends) are lowered into
//! these nodes so that they can be compared structurally, renamed, and pattern
//! matched. Nodes live in an [`Arena`](crate::arena::Arena) for the duration
//! of one analysis pass and are never freed individually; everything that has
//! to change after construction (use counts, future results, phi status) sits
//! behind a `Cell`.

use std::cell::Cell;

use crate::cfg::{Branch, Goto, Phi, Scfg};
use crate::ops::{BinaryOpcode, CastOpcode, UnaryOpcode};

/// An opaque reference to a source-level declaration (a field, a local, a
/// parameter). The IL never looks inside one; two leaves wrapping declarations
/// are equal iff they wrap the same declaration object.
#[derive(Debug)]
pub struct ValueDecl {
    name: String,
}

impl ValueDecl {
    pub fn new<S: Into<String>>(name: S) -> ValueDecl {
        ValueDecl { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// An opaque reference to a source-level expression. Compared by identity.
#[derive(Debug)]
pub struct SourceExpr {
    text: String,
}

impl SourceExpr {
    pub fn new<S: Into<String>>(text: S) -> SourceExpr {
        SourceExpr { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// An opaque reference to a source-level statement. Compared by identity.
#[derive(Debug)]
pub struct SourceStmt {
    text: String,
}

impl SourceStmt {
    pub fn new<S: Into<String>>(text: S) -> SourceStmt {
        SourceStmt { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// The kind tag of a node. Fixed at construction, never mutated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Variable,
    Future,
    Undefined,
    Wildcard,
    Literal,
    LiteralPtr,
    Function,
    SFunction,
    Code,
    Apply,
    SApply,
    Project,
    Call,
    Alloc,
    Load,
    Store,
    ArrayFirst,
    ArrayAdd,
    UnaryOp,
    BinaryOp,
    Cast,
    Scfg,
    Phi,
    Goto,
    Branch,
}

/// How a variable was bound.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VariableKind {
    /// Let-bound: `(let (x = t) u)`.
    Let,
    /// Function parameter: `(fn (x: t) u)`.
    Fun,
    /// The self-parameter of an sfunction: `(sfn (x) t)`.
    SFun,
}

/// Stack or heap allocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AllocKind {
    Stack,
    Heap,
}

/// An owning edge in the IR graph.
///
/// Every structural child of a node is held through exactly one `ExprRef`.
/// Attaching to a [`Variable`] bumps its use count and detaching drops it, so
/// a variable's count always mirrors the number of owning edges pointing at
/// it. A reference constructed against a pending [`Future`] can additionally
/// be registered as that future's location (see [`ExprRef::register`]), which
/// lets the future splice its result into the tree when it is forced.
///
/// There is no `Drop` impl: edges live exactly as long as the arena, and the
/// arena reclaims everything at once. `reset` is the only detach point.
pub struct ExprRef<'a> {
    target: Cell<Option<&'a Expr<'a>>>,
}

impl<'a> ExprRef<'a> {
    pub fn new(e: Option<&'a Expr<'a>>) -> ExprRef<'a> {
        if let Some(Expr::Variable(v)) = e {
            v.attach_var();
        }
        ExprRef {
            target: Cell::new(e),
        }
    }

    pub fn null() -> ExprRef<'a> {
        ExprRef {
            target: Cell::new(None),
        }
    }

    #[inline(always)]
    pub fn get(&self) -> Option<&'a Expr<'a>> {
        self.target.get()
    }

    /// Registers this reference as the location of a pending future target.
    /// Builders call this once the reference has its final address in the
    /// arena; it is a no-op for any other target.
    pub fn register(&'a self) {
        if let Some(Expr::Future(f)) = self.target.get() {
            f.register_location(self);
        }
    }

    /// Detaches the old target, then attaches the new one. Resetting a
    /// reference to its current target leaves use counts unchanged.
    ///
    /// Resetting to a pending future does not re-register a location; call
    /// [`ExprRef::register`] afterwards if the reference should track it.
    pub fn reset(&self, e: Option<&'a Expr<'a>>) {
        if let Some(Expr::Variable(v)) = self.target.get() {
            v.detach_var();
        }
        if let Some(Expr::Variable(v)) = e {
            v.attach_var();
        }
        self.target.set(e);
    }
}

impl<'a> PartialEq for ExprRef<'a> {
    fn eq(&self, other: &ExprRef<'a>) -> bool {
        match (self.get(), other.get()) {
            (Some(a), Some(b)) => std::ptr::eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

/// A named variable.
///
/// A variable node is its own declaration: binders (functions, sfunctions,
/// basic-block slots) own the node, and every use site points back at the
/// same node. There is no separate "variable reference" kind; identity is by
/// address.
pub struct Variable<'a> {
    kind: Cell<VariableKind>,
    definition: ExprRef<'a>,
    decl: Cell<Option<&'a ValueDecl>>,
    block_id: Cell<u32>,
    slot_id: Cell<u32>,
    uses: Cell<u32>,
}

impl<'a> Variable<'a> {
    pub(crate) fn new(
        kind: VariableKind,
        definition: Option<&'a Expr<'a>>,
        decl: Option<&'a ValueDecl>,
    ) -> Variable<'a> {
        Variable {
            kind: Cell::new(kind),
            definition: ExprRef::new(definition),
            decl: Cell::new(decl),
            block_id: Cell::new(0),
            slot_id: Cell::new(0),
            uses: Cell::new(0),
        }
    }

    #[inline(always)]
    pub fn kind(&self) -> VariableKind {
        self.kind.get()
    }

    pub(crate) fn set_kind(&self, kind: VariableKind) {
        self.kind.set(kind);
    }

    /// The definition (for let variables) or type (for parameters and
    /// self-variables). A self-variable's definition is the enclosing
    /// sfunction itself.
    #[inline(always)]
    pub fn definition(&self) -> Option<&'a Expr<'a>> {
        self.definition.get()
    }

    pub fn set_definition(&self, e: Option<&'a Expr<'a>>) {
        assert!(
            self.kind.get() != VariableKind::SFun || self.definition.get().is_none(),
            "the self-variable of an sfunction cannot be rebound"
        );
        self.definition.reset(e);
    }

    pub fn name(&self) -> &'a str {
        match self.decl.get() {
            Some(d) => d.name(),
            None => "_x",
        }
    }

    #[inline(always)]
    pub fn decl(&self) -> Option<&'a ValueDecl> {
        self.decl.get()
    }

    pub fn set_decl(&self, d: Option<&'a ValueDecl>) {
        self.decl.set(d);
    }

    #[inline(always)]
    pub fn block_id(&self) -> u32 {
        self.block_id.get()
    }

    #[inline(always)]
    pub fn slot_id(&self) -> u32 {
        self.slot_id.get()
    }

    pub fn set_id(&self, block_id: u32, slot_id: u32) {
        self.block_id.set(block_id);
        self.slot_id.set(slot_id);
    }

    #[inline(always)]
    pub fn uses(&self) -> u32 {
        self.uses.get()
    }

    pub(crate) fn attach_var(&self) {
        self.uses.set(self.uses.get() + 1);
    }

    pub(crate) fn detach_var(&self) {
        let n = self.uses.get();
        assert!(n > 0, "variable use count must not go negative");
        self.uses.set(n - 1);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FutureStatus {
    Pending,
    Evaluating,
    Done,
}

/// A lazy rewriting strategy implements this to produce the expression a
/// [`Future`] stands for. Returning `None` marks the result as absent.
pub trait LazyRewrite<'a> {
    fn create(&self) -> Option<&'a Expr<'a>>;
}

/// Placeholder for an expression that has not been computed yet.
///
/// Forcing is idempotent: the first `result()` runs the thunk and memoizes;
/// later calls return the cached node. A future caught forcing itself (state
/// `Evaluating`) returns `None` instead of recursing, which callers treat as
/// an illegal recursive rewrite. On the first successful force the result is
/// written through the registered location, so the owning edge sees the real
/// node from then on.
pub struct Future<'a> {
    status: Cell<FutureStatus>,
    result: Cell<Option<&'a Expr<'a>>>,
    location: Cell<Option<&'a ExprRef<'a>>>,
    thunk: &'a dyn LazyRewrite<'a>,
}

impl<'a> Future<'a> {
    pub(crate) fn new(thunk: &'a dyn LazyRewrite<'a>) -> Future<'a> {
        Future {
            status: Cell::new(FutureStatus::Pending),
            result: Cell::new(None),
            location: Cell::new(None),
            thunk,
        }
    }

    #[inline(always)]
    pub fn status(&self) -> FutureStatus {
        self.status.get()
    }

    /// Never forces; peeks at the memoized result if there is one.
    #[inline(always)]
    pub fn maybe_get_result(&self) -> Option<&'a Expr<'a>> {
        self.result.get()
    }

    /// The result of this future, forcing it if necessary.
    pub fn result(&self) -> Option<&'a Expr<'a>> {
        match self.status.get() {
            FutureStatus::Pending => {
                self.force();
                self.result.get()
            }
            // forcing re-entered itself; illegal recursion
            FutureStatus::Evaluating => None,
            FutureStatus::Done => self.result.get(),
        }
    }

    pub(crate) fn register_location(&self, location: &'a ExprRef<'a>) {
        self.location.set(Some(location));
    }

    fn force(&self) {
        self.status.set(FutureStatus::Evaluating);
        let r = self.thunk.create();
        self.result.set(r);
        if let Some(loc) = self.location.get() {
            loc.reset(r);
        }
        self.status.set(FutureStatus::Done);
    }
}

/// Placeholder for source constructs the IL cannot represent.
pub struct Undefined<'a> {
    pub(crate) stmt: Option<&'a SourceStmt>,
}

impl<'a> Undefined<'a> {
    pub fn stmt(&self) -> Option<&'a SourceStmt> {
        self.stmt
    }
}

/// An opaque literal value.
pub struct Literal<'a> {
    pub(crate) source: &'a SourceExpr,
}

impl<'a> Literal<'a> {
    pub fn source(&self) -> &'a SourceExpr {
        self.source
    }
}

/// A symbolic pointer to an object named by a declaration.
pub struct LiteralPtr<'a> {
    pub(crate) decl: &'a ValueDecl,
}

impl<'a> LiteralPtr<'a> {
    pub fn decl(&self) -> &'a ValueDecl {
        self.decl
    }
}

/// A lambda abstraction. Multi-argument functions are curried.
pub struct Function<'a> {
    pub(crate) var_decl: &'a Expr<'a>,
    pub(crate) body: ExprRef<'a>,
}

impl<'a> Function<'a> {
    pub fn variable_decl(&self) -> &'a Expr<'a> {
        self.var_decl
    }

    pub fn variable(&self) -> &'a Variable<'a> {
        match self.var_decl {
            Expr::Variable(v) => v,
            _ => unreachable!("a function binder is always a variable"),
        }
    }

    pub fn body(&self) -> Option<&'a Expr<'a>> {
        self.body.get()
    }
}

/// A self-applicable function; useful for objects and late binding. The
/// self-variable's definition points back at this node.
pub struct SFunction<'a> {
    pub(crate) var_decl: &'a Expr<'a>,
    pub(crate) body: ExprRef<'a>,
}

impl<'a> SFunction<'a> {
    pub fn variable_decl(&self) -> &'a Expr<'a> {
        self.var_decl
    }

    pub fn variable(&self) -> &'a Variable<'a> {
        match self.var_decl {
            Expr::Variable(v) => v,
            _ => unreachable!("an sfunction binder is always a variable"),
        }
    }

    pub fn body(&self) -> Option<&'a Expr<'a>> {
        self.body.get()
    }
}

/// A block of code annotated with its return type.
pub struct Code<'a> {
    pub(crate) return_type: ExprRef<'a>,
    pub(crate) body: ExprRef<'a>,
}

impl<'a> Code<'a> {
    pub fn return_type(&self) -> Option<&'a Expr<'a>> {
        self.return_type.get()
    }

    pub fn body(&self) -> Option<&'a Expr<'a>> {
        self.body.get()
    }
}

/// Apply an argument to a function.
pub struct Apply<'a> {
    pub(crate) fun: ExprRef<'a>,
    pub(crate) arg: ExprRef<'a>,
}

impl<'a> Apply<'a> {
    pub fn fun(&self) -> Option<&'a Expr<'a>> {
        self.fun.get()
    }

    pub fn arg(&self) -> Option<&'a Expr<'a>> {
        self.arg.get()
    }
}

/// Apply a self-argument to a self-applicable function. With no explicit
/// argument the node is a delegation: the sfunction is applied to itself.
pub struct SApply<'a> {
    pub(crate) sfun: ExprRef<'a>,
    pub(crate) arg: ExprRef<'a>,
}

impl<'a> SApply<'a> {
    pub fn sfun(&self) -> Option<&'a Expr<'a>> {
        self.sfun.get()
    }

    /// The explicit argument, if any; `None` means delegation.
    pub fn explicit_arg(&self) -> Option<&'a Expr<'a>> {
        self.arg.get()
    }

    /// The effective argument: falls back to the sfunction for delegation.
    pub fn arg(&self) -> Option<&'a Expr<'a>> {
        self.arg.get().or_else(|| self.sfun.get())
    }

    pub fn is_delegation(&self) -> bool {
        self.arg.get().is_none()
    }
}

/// Project a named slot out of a record-typed expression.
pub struct Project<'a> {
    pub(crate) record: ExprRef<'a>,
    pub(crate) decl: &'a ValueDecl,
}

impl<'a> Project<'a> {
    pub fn record(&self) -> Option<&'a Expr<'a>> {
        self.record.get()
    }

    pub fn decl(&self) -> &'a ValueDecl {
        self.decl
    }

    pub fn slot_name(&self) -> &'a str {
        self.decl.name()
    }
}

/// Call a function once all arguments have been applied.
pub struct Call<'a> {
    pub(crate) target: ExprRef<'a>,
    pub(crate) call_expr: Option<&'a SourceExpr>,
}

impl<'a> Call<'a> {
    pub fn target(&self) -> Option<&'a Expr<'a>> {
        self.target.get()
    }

    pub fn call_expr(&self) -> Option<&'a SourceExpr> {
        self.call_expr
    }
}

/// Allocate memory for a value of the described type.
pub struct Alloc<'a> {
    pub(crate) kind: AllocKind,
    pub(crate) data_type: ExprRef<'a>,
}

impl<'a> Alloc<'a> {
    pub fn kind(&self) -> AllocKind {
        self.kind
    }

    pub fn data_type(&self) -> Option<&'a Expr<'a>> {
        self.data_type.get()
    }
}

/// Load a value from memory.
pub struct Load<'a> {
    pub(crate) pointer: ExprRef<'a>,
}

impl<'a> Load<'a> {
    pub fn pointer(&self) -> Option<&'a Expr<'a>> {
        self.pointer.get()
    }
}

/// Store a value to memory.
pub struct Store<'a> {
    pub(crate) dest: ExprRef<'a>,
    pub(crate) source: ExprRef<'a>,
}

impl<'a> Store<'a> {
    pub fn destination(&self) -> Option<&'a Expr<'a>> {
        self.dest.get()
    }

    pub fn source(&self) -> Option<&'a Expr<'a>> {
        self.source.get()
    }
}

/// A reference to the first element of an array; `p[i]` lowers to
/// `first(p + i)`.
pub struct ArrayFirst<'a> {
    pub(crate) array: ExprRef<'a>,
}

impl<'a> ArrayFirst<'a> {
    pub fn array(&self) -> Option<&'a Expr<'a>> {
        self.array.get()
    }
}

/// Pointer arithmetic restricted to arrays: `p + n` names a subarray.
pub struct ArrayAdd<'a> {
    pub(crate) array: ExprRef<'a>,
    pub(crate) index: ExprRef<'a>,
}

impl<'a> ArrayAdd<'a> {
    pub fn array(&self) -> Option<&'a Expr<'a>> {
        self.array.get()
    }

    pub fn index(&self) -> Option<&'a Expr<'a>> {
        self.index.get()
    }
}

pub struct UnaryOp<'a> {
    pub(crate) op: UnaryOpcode,
    pub(crate) expr: ExprRef<'a>,
}

impl<'a> UnaryOp<'a> {
    pub fn unary_opcode(&self) -> UnaryOpcode {
        self.op
    }

    pub fn expr(&self) -> Option<&'a Expr<'a>> {
        self.expr.get()
    }
}

pub struct BinaryOp<'a> {
    pub(crate) op: BinaryOpcode,
    pub(crate) expr0: ExprRef<'a>,
    pub(crate) expr1: ExprRef<'a>,
}

impl<'a> BinaryOp<'a> {
    pub fn binary_opcode(&self) -> BinaryOpcode {
        self.op
    }

    pub fn expr0(&self) -> Option<&'a Expr<'a>> {
        self.expr0.get()
    }

    pub fn expr1(&self) -> Option<&'a Expr<'a>> {
        self.expr1.get()
    }
}

pub struct Cast<'a> {
    pub(crate) op: CastOpcode,
    pub(crate) expr: ExprRef<'a>,
}

impl<'a> Cast<'a> {
    pub fn cast_opcode(&self) -> CastOpcode {
        self.op
    }

    pub fn expr(&self) -> Option<&'a Expr<'a>> {
        self.expr.get()
    }
}

/// An IR node. The variant is fixed at construction; everything mutable is a
/// `Cell` inside the payload.
pub enum Expr<'a> {
    Variable(Variable<'a>),
    Future(Future<'a>),
    Undefined(Undefined<'a>),
    Wildcard,
    Literal(Literal<'a>),
    LiteralPtr(LiteralPtr<'a>),
    Function(Function<'a>),
    SFunction(SFunction<'a>),
    Code(Code<'a>),
    Apply(Apply<'a>),
    SApply(SApply<'a>),
    Project(Project<'a>),
    Call(Call<'a>),
    Alloc(Alloc<'a>),
    Load(Load<'a>),
    Store(Store<'a>),
    ArrayFirst(ArrayFirst<'a>),
    ArrayAdd(ArrayAdd<'a>),
    UnaryOp(UnaryOp<'a>),
    BinaryOp(BinaryOp<'a>),
    Cast(Cast<'a>),
    Scfg(Scfg<'a>),
    Phi(Phi<'a>),
    Goto(Goto<'a>),
    Branch(Branch<'a>),
}

impl<'a> Expr<'a> {
    pub fn opcode(&self) -> Opcode {
        match self {
            Expr::Variable(_) => Opcode::Variable,
            Expr::Future(_) => Opcode::Future,
            Expr::Undefined(_) => Opcode::Undefined,
            Expr::Wildcard => Opcode::Wildcard,
            Expr::Literal(_) => Opcode::Literal,
            Expr::LiteralPtr(_) => Opcode::LiteralPtr,
            Expr::Function(_) => Opcode::Function,
            Expr::SFunction(_) => Opcode::SFunction,
            Expr::Code(_) => Opcode::Code,
            Expr::Apply(_) => Opcode::Apply,
            Expr::SApply(_) => Opcode::SApply,
            Expr::Project(_) => Opcode::Project,
            Expr::Call(_) => Opcode::Call,
            Expr::Alloc(_) => Opcode::Alloc,
            Expr::Load(_) => Opcode::Load,
            Expr::Store(_) => Opcode::Store,
            Expr::ArrayFirst(_) => Opcode::ArrayFirst,
            Expr::ArrayAdd(_) => Opcode::ArrayAdd,
            Expr::UnaryOp(_) => Opcode::UnaryOp,
            Expr::BinaryOp(_) => Opcode::BinaryOp,
            Expr::Cast(_) => Opcode::Cast,
            Expr::Scfg(_) => Opcode::Scfg,
            Expr::Phi(_) => Opcode::Phi,
            Expr::Goto(_) => Opcode::Goto,
            Expr::Branch(_) => Opcode::Branch,
        }
    }

    /// Variables and literals are trivial: canonicalization stops at them.
    #[inline(always)]
    pub fn is_trivial(&self) -> bool {
        matches!(
            self.opcode(),
            Opcode::Variable | Opcode::Literal | Opcode::LiteralPtr
        )
    }

    pub fn as_variable(&self) -> Option<&Variable<'a>> {
        match self {
            Expr::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_future(&self) -> Option<&Future<'a>> {
        match self {
            Expr::Future(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_phi(&self) -> Option<&Phi<'a>> {
        match self {
            Expr::Phi(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_scfg(&self) -> Option<&Scfg<'a>> {
        match self {
            Expr::Scfg(c) => Some(c),
            _ => None,
        }
    }

    /// Registers every directly-held edge with its target, so that pending
    /// futures learn their location in the tree. Called by the arena once the
    /// node has its final address.
    pub(crate) fn register_edges(&'a self) {
        match self {
            Expr::Variable(n) => n.definition.register(),
            Expr::Function(n) => n.body.register(),
            Expr::SFunction(n) => n.body.register(),
            Expr::Code(n) => {
                n.return_type.register();
                n.body.register();
            }
            Expr::Apply(n) => {
                n.fun.register();
                n.arg.register();
            }
            Expr::SApply(n) => {
                n.sfun.register();
                n.arg.register();
            }
            Expr::Project(n) => n.record.register(),
            Expr::Call(n) => n.target.register(),
            Expr::Alloc(n) => n.data_type.register(),
            Expr::Load(n) => n.pointer.register(),
            Expr::Store(n) => {
                n.dest.register();
                n.source.register();
            }
            Expr::ArrayFirst(n) => n.array.register(),
            Expr::ArrayAdd(n) => {
                n.array.register();
                n.index.register();
            }
            Expr::UnaryOp(n) => n.expr.register(),
            Expr::BinaryOp(n) => {
                n.expr0.register();
                n.expr1.register();
            }
            Expr::Cast(n) => n.expr.register(),
            Expr::Branch(n) => n.condition.register(),
            _ => {}
        }
    }
}
