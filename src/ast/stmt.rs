use crate::ast::decl::{ArrayDecl, PointerDecl, VarDecl};
use crate::ast::expr::Expr;
use crate::source::SourcePos;

#[derive(Debug)]
pub enum Stmt<'a> {
    Block {
        stmts: &'a [Stmt<'a>],
        pos: SourcePos,
    },
    If {
        cond: &'a Expr<'a>,
        then_branch: &'a Stmt<'a>,
        else_branch: Option<&'a Stmt<'a>>,
        pos: SourcePos,
    },
    While {
        cond: &'a Expr<'a>,
        body: &'a Stmt<'a>,
        pos: SourcePos,
    },
    For {
        init: Option<&'a Stmt<'a>>,
        cond: Option<&'a Expr<'a>>,
        update: Option<&'a Expr<'a>>,
        body: &'a Stmt<'a>,
        pos: SourcePos,
    },
    Break {
        pos: SourcePos,
    },
    Continue {
        pos: SourcePos,
    },
    Return {
        value: Option<&'a Expr<'a>>,
        pos: SourcePos,
    },
    Expr {
        expr: &'a Expr<'a>,
        pos: SourcePos,
    },
    Local {
        decl: LocalDecl<'a>,
        pos: SourcePos,
    },
}

impl<'a> Stmt<'a> {
    pub fn pos(&self) -> SourcePos {
        match self {
            Stmt::Block { pos, .. }
            | Stmt::If { pos, .. }
            | Stmt::While { pos, .. }
            | Stmt::For { pos, .. }
            | Stmt::Break { pos }
            | Stmt::Continue { pos }
            | Stmt::Return { pos, .. }
            | Stmt::Expr { pos, .. }
            | Stmt::Local { pos, .. } => *pos,
        }
    }
}

/// Declaration appearing inside a function body.
#[derive(Debug)]
pub enum LocalDecl<'a> {
    Var(VarDecl<'a>),
    Array(ArrayDecl<'a>),
    Pointer(PointerDecl<'a>),
}
