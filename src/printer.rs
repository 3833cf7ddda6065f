//! Display impls for expressions, blocks and CFGs.
//!
//! The output is for debugging and logs; it is not a parseable syntax and
//! makes no attempt to round-trip.

use std::fmt;

use crate::cfg::BasicBlock;
use crate::sexpr::{AllocKind, Expr, Variable};
use crate::utils::{indent, map_join};

fn fmt_opt(e: Option<&Expr<'_>>) -> String {
    match e {
        Some(e) => e.to_string(),
        None => "<null>".to_string(),
    }
}

fn fmt_var(v: &Variable<'_>) -> String {
    if v.decl().is_some() {
        v.name().to_string()
    } else {
        format!("_x{}_{}", v.block_id(), v.slot_id())
    }
}

impl<'a> fmt::Display for Expr<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Variable(v) => write!(f, "{}", fmt_var(v)),
            Expr::Future(fu) => match fu.maybe_get_result() {
                Some(r) => write!(f, "{}", r),
                None => write!(f, "#future"),
            },
            Expr::Undefined(_) => write!(f, "#undefined"),
            Expr::Wildcard => write!(f, "_"),
            Expr::Literal(l) => write!(f, "{}", l.source().text()),
            Expr::LiteralPtr(l) => write!(f, "{}", l.decl().name()),
            Expr::Function(n) => write!(
                f,
                "\\({}: {}). {}",
                fmt_var(n.variable()),
                fmt_opt(n.variable().definition()),
                fmt_opt(n.body())
            ),
            Expr::SFunction(n) => {
                write!(f, "@({}). {}", fmt_var(n.variable()), fmt_opt(n.body()))
            }
            Expr::Code(n) => write!(f, "code<{}>({})", fmt_opt(n.return_type()), fmt_opt(n.body())),
            Expr::Apply(n) => write!(f, "{}({})", fmt_opt(n.fun()), fmt_opt(n.arg())),
            Expr::SApply(n) => match n.explicit_arg() {
                Some(arg) => write!(f, "{}@({})", fmt_opt(n.sfun()), arg),
                None => write!(f, "{}@()", fmt_opt(n.sfun())),
            },
            Expr::Project(n) => write!(f, "{}.{}", fmt_opt(n.record()), n.slot_name()),
            Expr::Call(n) => write!(f, "call {}", fmt_opt(n.target())),
            Expr::Alloc(n) => match n.kind() {
                AllocKind::Stack => write!(f, "alloca({})", fmt_opt(n.data_type())),
                AllocKind::Heap => write!(f, "new({})", fmt_opt(n.data_type())),
            },
            Expr::Load(n) => write!(f, "*{}", fmt_opt(n.pointer())),
            Expr::Store(n) => write!(
                f,
                "{} := {}",
                fmt_opt(n.destination()),
                fmt_opt(n.source())
            ),
            Expr::ArrayFirst(n) => write!(f, "first({})", fmt_opt(n.array())),
            Expr::ArrayAdd(n) => {
                write!(f, "({} + {})", fmt_opt(n.array()), fmt_opt(n.index()))
            }
            Expr::UnaryOp(n) => write!(f, "{}{}", n.unary_opcode(), fmt_opt(n.expr())),
            Expr::BinaryOp(n) => write!(
                f,
                "({} {} {})",
                fmt_opt(n.expr0()),
                n.binary_opcode(),
                fmt_opt(n.expr1())
            ),
            Expr::Cast(n) => write!(f, "cast<{}>({})", n.cast_opcode(), fmt_opt(n.expr())),
            Expr::Phi(n) => write!(
                f,
                "phi({})",
                map_join(n.values(), ", ", |v| fmt_opt(v))
            ),
            Expr::Goto(n) => write!(f, "goto b{}", n.target().block_id()),
            Expr::Branch(n) => write!(
                f,
                "branch {} ? b{} : b{}",
                fmt_opt(n.condition()),
                n.then_block().block_id(),
                n.else_block().block_id()
            ),
            Expr::Scfg(n) => {
                writeln!(f, "cfg {{")?;
                for b in n.blocks() {
                    writeln!(f, "{}", indent(b.to_string(), 1))?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl<'a> fmt::Display for BasicBlock<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "b{}:", self.block_id())?;
        for x in self.arguments().into_iter().chain(self.instructions()) {
            let v = variant!(x, Expr::Variable);
            writeln!(f, "  let {} = {}", fmt_var(v), fmt_opt(v.definition()))?;
        }
        write!(f, "  {}", fmt_opt(self.terminator()))
    }
}

#[cfg(test)]
mod printer_tests {
    use crate::arena::Arena;

    #[test]
    fn test_print_guard_expression() {
        let arena = Arena::new();
        let e = arena.load(arena.project(
            arena.project(arena.literal_ptr(arena.decl("b")), arena.decl("a")),
            arena.decl("mu"),
        ));
        assert_eq!(e.to_string(), "*b.a.mu");
    }

    #[test]
    fn test_print_block() {
        let arena = Arena::new();
        let cfg_e = arena.scfg();
        let cfg = cfg_e.as_scfg().unwrap();
        let b0 = arena.basic_block();
        let b1 = arena.basic_block();
        cfg.add(b0);
        cfg.add(b1);

        let p = arena.literal_ptr(arena.decl("p"));
        let c = arena.let_variable(Some(arena.load(p)), Some(arena.decl("c")));
        b0.add_instruction(c);
        b0.set_terminator(arena.goto(b1, b1.add_predecessor()));

        assert_eq!(b0.to_string(), "b0:\n  let c = *p\n  goto b1");
    }
}
