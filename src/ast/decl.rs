use crate::ast::expr::Expr;
use crate::ast::stmt::Stmt;
use crate::ast::ty::TypeExpr;
use crate::intern::Symbol;
use crate::source::SourcePos;

/// A parsed compilation unit. After import resolution this is the merged
/// program: imported declarations first, in visitation order.
#[derive(Debug, Default)]
pub struct Program<'a> {
    pub decls: Vec<Decl<'a>>,
}

#[derive(Debug)]
pub enum Decl<'a> {
    Function(FunctionDecl<'a>),
    Var(VarDecl<'a>),
    Array(ArrayDecl<'a>),
    Pointer(PointerDecl<'a>),
    Struct(RecordDecl<'a>),
    Union(RecordDecl<'a>),
    Message(MessageDecl<'a>),
    Const(ConstDecl<'a>),
    Import(ImportDecl),
}

impl<'a> Decl<'a> {
    pub fn pos(&self) -> SourcePos {
        match self {
            Decl::Function(d) => d.pos,
            Decl::Var(d) => d.pos,
            Decl::Array(d) => d.pos,
            Decl::Pointer(d) => d.pos,
            Decl::Struct(d) | Decl::Union(d) => d.pos,
            Decl::Message(d) => d.pos,
            Decl::Const(d) => d.pos,
            Decl::Import(d) => d.pos,
        }
    }
}

#[derive(Debug)]
pub struct FunctionDecl<'a> {
    pub name: Symbol,
    pub return_ty: TypeExpr<'a>,
    pub params: &'a [Param<'a>],
    pub body: &'a Stmt<'a>,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, Copy)]
pub struct Param<'a> {
    pub name: Symbol,
    pub ty: TypeExpr<'a>,
    pub pos: SourcePos,
}

#[derive(Debug)]
pub struct VarDecl<'a> {
    pub name: Symbol,
    pub ty: TypeExpr<'a>,
    pub init: Option<&'a Expr<'a>>,
    pub pos: SourcePos,
}

#[derive(Debug)]
pub struct ArrayDecl<'a> {
    pub name: Symbol,
    pub elem_ty: TypeExpr<'a>,
    pub len: u32,
    pub init: Option<&'a Expr<'a>>,
    pub pos: SourcePos,
}

#[derive(Debug)]
pub struct PointerDecl<'a> {
    /// Full pointer type, depth included.
    pub ty: TypeExpr<'a>,
    pub name: Symbol,
    pub init: Option<&'a Expr<'a>>,
    pub pos: SourcePos,
}

/// Struct or union body; which one is decided by the [`Decl`] variant.
#[derive(Debug)]
pub struct RecordDecl<'a> {
    pub name: Symbol,
    pub fields: &'a [Field<'a>],
    pub pos: SourcePos,
}

#[derive(Debug, Clone, Copy)]
pub struct Field<'a> {
    pub name: Symbol,
    pub ty: TypeExpr<'a>,
    pub bit_width: Option<u32>,
    pub pos: SourcePos,
}

#[derive(Debug)]
pub struct MessageDecl<'a> {
    pub name: Symbol,
    pub elem_ty: TypeExpr<'a>,
    pub pos: SourcePos,
}

#[derive(Debug)]
pub struct ConstDecl<'a> {
    pub name: Symbol,
    pub ty: TypeExpr<'a>,
    pub init: &'a Expr<'a>,
    pub pos: SourcePos,
}

#[derive(Debug)]
pub struct ImportDecl {
    /// Interned relative path as written in the source.
    pub path: Symbol,
    pub pos: SourcePos,
}
