use bumpalo::Bump;

use crate::ast::{Expr, ExprKind, Field, Param, Stmt, TypeExpr};
use crate::source::SourcePos;

/// Allocation context for AST nodes. One compilation owns a single bump
/// arena; every node and slice is carved out of it and freed together when
/// the compilation ends. Copyable so helpers can take it by value.
#[derive(Clone, Copy)]
pub struct AstContext<'a> {
    bump: &'a Bump,
}

impl<'a> AstContext<'a> {
    pub fn new(bump: &'a Bump) -> Self {
        AstContext { bump }
    }

    #[inline]
    pub fn expr(&self, kind: ExprKind<'a>, pos: SourcePos) -> &'a Expr<'a> {
        self.bump.alloc(Expr { kind, pos })
    }

    pub fn alloc_expr_list<I>(&self, exprs: I) -> &'a [&'a Expr<'a>]
    where
        I: IntoIterator<Item = &'a Expr<'a>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.bump.alloc_slice_fill_iter(exprs)
    }

    #[inline]
    pub fn stmt(&self, stmt: Stmt<'a>) -> &'a Stmt<'a> {
        self.bump.alloc(stmt)
    }

    pub fn alloc_stmts<I>(&self, stmts: I) -> &'a [Stmt<'a>]
    where
        I: IntoIterator<Item = Stmt<'a>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.bump.alloc_slice_fill_iter(stmts)
    }

    #[inline]
    pub fn ty(&self, ty: TypeExpr<'a>) -> &'a TypeExpr<'a> {
        self.bump.alloc(ty)
    }

    pub fn alloc_params<I>(&self, params: I) -> &'a [Param<'a>]
    where
        I: IntoIterator<Item = Param<'a>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.bump.alloc_slice_fill_iter(params)
    }

    pub fn alloc_fields<I>(&self, fields: I) -> &'a [Field<'a>]
    where
        I: IntoIterator<Item = Field<'a>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.bump.alloc_slice_fill_iter(fields)
    }
}

/// Declares the backing arena and an [`AstContext`] over it in one
/// statement, for call sites that own a whole compilation.
#[macro_export]
macro_rules! ast_arena {
    ($ctx:ident) => {
        let bump = bumpalo::Bump::new();
        let $ctx = $crate::arena_ctx::AstContext::new(&bump);
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Literal;

    #[test]
    fn expr_builder_allocates_with_position() {
        crate::ast_arena!(ctx);
        let pos = SourcePos::default();
        let one = ctx.expr(ExprKind::Literal(Literal::Int(1)), pos);
        assert!(matches!(one.kind, ExprKind::Literal(Literal::Int(1))));
    }

    #[test]
    fn expr_list_preserves_order() {
        crate::ast_arena!(ctx);
        let pos = SourcePos::default();
        let a = ctx.expr(ExprKind::Literal(Literal::Int(1)), pos);
        let b = ctx.expr(ExprKind::Literal(Literal::Int(2)), pos);
        let list = ctx.alloc_expr_list(vec![a, b]);
        assert_eq!(list.len(), 2);
        assert!(matches!(list[1].kind, ExprKind::Literal(Literal::Int(2))));
    }

    #[test]
    fn references_stay_stable_across_many_allocations() {
        crate::ast_arena!(ctx);
        let pos = SourcePos::default();
        let first = ctx.expr(ExprKind::Literal(Literal::Int(0)), pos);
        for i in 1..4096 {
            ctx.expr(ExprKind::Literal(Literal::Int(i)), pos);
        }
        assert!(matches!(first.kind, ExprKind::Literal(Literal::Int(0))));
    }

    #[test]
    fn empty_slices_allocate_fine() {
        crate::ast_arena!(ctx);
        let stmts = ctx.alloc_stmts(Vec::new());
        assert!(stmts.is_empty());
        let params = ctx.alloc_params(Vec::new());
        assert!(params.is_empty());
    }
}
