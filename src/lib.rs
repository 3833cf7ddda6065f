#[macro_use]
pub mod macros;

pub mod arena;
pub mod cfg;
pub mod compare;
pub mod ops;
pub mod printer;
pub mod sexpr;
pub mod traverse;
pub mod utils;
