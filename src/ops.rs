//! Operator codes carried by `UnaryOp`, `BinaryOp` and `Cast` nodes.
//!
//! The IL does not interpret these; they exist so that two operator nodes can
//! be compared for equality and printed. The lowering front-end decides which
//! source operators map onto which codes.

use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOpcode {
    Minus,
    BitNot,
    LogicNot,
}

impl fmt::Display for UnaryOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOpcode::Minus => write!(f, "-"),
            UnaryOpcode::BitNot => write!(f, "~"),
            UnaryOpcode::LogicNot => write!(f, "!"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOpcode {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitXor,
    BitOr,
    LogicAnd,
    LogicOr,
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
}

impl fmt::Display for BinaryOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOpcode::Add => "+",
            BinaryOpcode::Sub => "-",
            BinaryOpcode::Mul => "*",
            BinaryOpcode::Div => "/",
            BinaryOpcode::Rem => "%",
            BinaryOpcode::Shl => "<<",
            BinaryOpcode::Shr => ">>",
            BinaryOpcode::BitAnd => "&",
            BinaryOpcode::BitXor => "^",
            BinaryOpcode::BitOr => "|",
            BinaryOpcode::LogicAnd => "&&",
            BinaryOpcode::LogicOr => "||",
            BinaryOpcode::Eq => "==",
            BinaryOpcode::Neq => "!=",
            BinaryOpcode::Lt => "<",
            BinaryOpcode::Leq => "<=",
            BinaryOpcode::Gt => ">",
            BinaryOpcode::Geq => ">=",
        };
        write!(f, "{}", s)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CastOpcode {
    NoOp,
    Extend,
    Truncate,
    ToFloat,
    ToInt,
    PtrToInt,
    IntToPtr,
    BitCast,
}

impl fmt::Display for CastOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CastOpcode::NoOp => "noop",
            CastOpcode::Extend => "extend",
            CastOpcode::Truncate => "truncate",
            CastOpcode::ToFloat => "tofloat",
            CastOpcode::ToInt => "toint",
            CastOpcode::PtrToInt => "ptrtoint",
            CastOpcode::IntToPtr => "inttoptr",
            CastOpcode::BitCast => "bitcast",
        };
        write!(f, "{}", s)
    }
}
