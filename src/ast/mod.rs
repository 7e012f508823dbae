pub mod decl;
pub mod expr;
pub mod stmt;
pub mod ty;

pub use decl::{
    ArrayDecl, ConstDecl, Decl, Field, FunctionDecl, ImportDecl, MessageDecl, Param,
    PointerDecl, Program, RecordDecl, VarDecl,
};
pub use expr::{BinaryOp, Expr, ExprKind, IncDecOp, Literal, UnaryOp};
pub use stmt::{LocalDecl, Stmt};
pub use ty::{Primitive, TypeExpr, TypeExprKind};
