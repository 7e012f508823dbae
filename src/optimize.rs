//! AST-level optimization passes.
//!
//! Pure AST→AST rewrites run before codegen: constant folding with
//! short-circuit simplification, algebraic identities, dead-branch removal
//! and straight-line dead-store elimination. The pass list iterates until a
//! fixed point or [`MAX_PASSES`] rounds, and every rewrite preserves program
//! behavior — division by zero, overflowing shifts and impure operands are
//! left untouched for the VM to handle.

use crate::arena_ctx::AstContext;
use crate::ast::{
    ArrayDecl, BinaryOp, ConstDecl, Decl, Expr, ExprKind, Literal, LocalDecl, PointerDecl,
    Program, Stmt, UnaryOp, VarDecl,
};
use crate::intern::Symbol;

/// Iteration cap; in practice folding settles in one or two rounds.
pub const MAX_PASSES: u32 = 3;

pub fn optimize<'a>(mut program: Program<'a>, ctx: AstContext<'a>) -> Program<'a> {
    for _ in 0..MAX_PASSES {
        let mut pass = Pass {
            ctx,
            changed: false,
        };
        program = pass.program(program);
        if !pass.changed {
            break;
        }
    }
    program
}

struct Pass<'a> {
    ctx: AstContext<'a>,
    changed: bool,
}

impl<'a> Pass<'a> {
    fn program(&mut self, program: Program<'a>) -> Program<'a> {
        let decls = program
            .decls
            .into_iter()
            .map(|decl| self.decl(decl))
            .collect();
        Program { decls }
    }

    fn decl(&mut self, decl: Decl<'a>) -> Decl<'a> {
        match decl {
            Decl::Function(f) => {
                let body = self.stmt(f.body);
                Decl::Function(crate::ast::FunctionDecl {
                    body: self.ctx.stmt(body),
                    ..f
                })
            }
            Decl::Var(v) => Decl::Var(VarDecl {
                init: v.init.map(|e| self.expr(e)),
                ..v
            }),
            Decl::Array(a) => Decl::Array(ArrayDecl {
                init: a.init.map(|e| self.expr(e)),
                ..a
            }),
            Decl::Pointer(p) => Decl::Pointer(PointerDecl {
                init: p.init.map(|e| self.expr(e)),
                ..p
            }),
            Decl::Const(c) => Decl::Const(ConstDecl {
                init: self.expr(c.init),
                ..c
            }),
            other => other,
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn stmt(&mut self, stmt: &Stmt<'a>) -> Stmt<'a> {
        match stmt {
            Stmt::Block { stmts, pos } => {
                let rewritten: Vec<Stmt<'a>> = stmts.iter().map(|s| self.stmt(s)).collect();
                let pruned = self.eliminate_dead_stores(rewritten);
                Stmt::Block {
                    stmts: self.ctx.alloc_stmts(pruned),
                    pos: *pos,
                }
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                pos,
            } => {
                let cond = self.expr(cond);
                if let ExprKind::Literal(Literal::Bool(value)) = cond.kind {
                    self.changed = true;
                    return if value {
                        self.stmt(then_branch)
                    } else {
                        match else_branch {
                            Some(else_branch) => self.stmt(else_branch),
                            None => Stmt::Block {
                                stmts: self.ctx.alloc_stmts(Vec::new()),
                                pos: *pos,
                            },
                        }
                    };
                }
                let then_branch = self.stmt(then_branch);
                let else_branch = else_branch.map(|e| {
                    let rewritten = self.stmt(e);
                    self.ctx.stmt(rewritten)
                });
                Stmt::If {
                    cond,
                    then_branch: self.ctx.stmt(then_branch),
                    else_branch,
                    pos: *pos,
                }
            }
            Stmt::While { cond, body, pos } => {
                let cond = self.expr(cond);
                if let ExprKind::Literal(Literal::Bool(false)) = cond.kind {
                    self.changed = true;
                    return Stmt::Block {
                        stmts: self.ctx.alloc_stmts(Vec::new()),
                        pos: *pos,
                    };
                }
                let body = self.stmt(body);
                Stmt::While {
                    cond,
                    body: self.ctx.stmt(body),
                    pos: *pos,
                }
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
                pos,
            } => {
                let init = init.map(|s| {
                    let rewritten = self.stmt(s);
                    self.ctx.stmt(rewritten)
                });
                let cond = cond.map(|c| self.expr(c));
                let update = update.map(|u| self.expr(u));
                let body = self.stmt(body);
                Stmt::For {
                    init,
                    cond,
                    update,
                    body: self.ctx.stmt(body),
                    pos: *pos,
                }
            }
            Stmt::Return { value, pos } => Stmt::Return {
                value: value.map(|v| self.expr(v)),
                pos: *pos,
            },
            Stmt::Expr { expr, pos } => Stmt::Expr {
                expr: self.expr(expr),
                pos: *pos,
            },
            Stmt::Local { decl, pos } => Stmt::Local {
                decl: match decl {
                    LocalDecl::Var(v) => LocalDecl::Var(VarDecl {
                        init: v.init.map(|e| self.expr(e)),
                        ..*v
                    }),
                    LocalDecl::Array(a) => LocalDecl::Array(ArrayDecl {
                        init: a.init.map(|e| self.expr(e)),
                        ..*a
                    }),
                    LocalDecl::Pointer(p) => LocalDecl::Pointer(PointerDecl {
                        init: p.init.map(|e| self.expr(e)),
                        ..*p
                    }),
                },
                pos: *pos,
            },
            Stmt::Break { pos } => Stmt::Break { pos: *pos },
            Stmt::Continue { pos } => Stmt::Continue { pos: *pos },
        }
    }

    // ------------------------------------------------------------------
    // Dead stores (straight-line, block-local)
    // ------------------------------------------------------------------

    /// Removes a store to a block-declared local when the next use of that
    /// local in the same straight-line block is another store. Blocks that
    /// take any address are left untouched; control flow clears tracking.
    fn eliminate_dead_stores(&mut self, stmts: Vec<Stmt<'a>>) -> Vec<Stmt<'a>> {
        if stmts.iter().any(stmt_takes_address) {
            return stmts;
        }

        let mut declared: Vec<Symbol> = Vec::new();
        // name → index of the pending (unread) pure store into `stmts`.
        let mut pending: Vec<(Symbol, usize)> = Vec::new();
        let mut dead: Vec<usize> = Vec::new();

        for (index, stmt) in stmts.iter().enumerate() {
            // Any read of a tracked name keeps its pending store alive.
            pending.retain(|&(name, _)| !stmt_reads(stmt, name));

            match stmt {
                Stmt::Local {
                    decl: LocalDecl::Var(v),
                    ..
                } => {
                    declared.push(v.name);
                    if v.init.map(|e| e.is_pure()).unwrap_or(false) {
                        pending.push((v.name, index));
                    }
                }
                Stmt::Expr { expr, .. } => {
                    if let ExprKind::Assign { target, value } = &expr.kind {
                        if let ExprKind::Identifier(name) = target.kind {
                            if declared.contains(&name) {
                                if let Some(entry) =
                                    pending.iter_mut().find(|(n, _)| *n == name)
                                {
                                    dead.push(entry.1);
                                    entry.1 = index;
                                } else if value.is_pure() {
                                    pending.push((name, index));
                                }
                                if !value.is_pure() {
                                    pending.retain(|(n, _)| *n != name);
                                }
                            }
                        }
                    }
                }
                Stmt::If { .. }
                | Stmt::While { .. }
                | Stmt::For { .. }
                | Stmt::Block { .. }
                | Stmt::Break { .. }
                | Stmt::Continue { .. }
                | Stmt::Return { .. } => {
                    pending.clear();
                }
                Stmt::Local { .. } => {}
            }
        }

        // Stores still pending at block end target locals that die here.
        for (name, index) in pending {
            if declared.contains(&name) {
                dead.push(index);
            }
        }

        if dead.is_empty() {
            return stmts;
        }
        self.changed = true;
        stmts
            .into_iter()
            .enumerate()
            .filter_map(|(index, stmt)| {
                if !dead.contains(&index) {
                    return Some(stmt);
                }
                match stmt {
                    // A dead declaration keeps the slot, loses the store.
                    Stmt::Local {
                        decl: LocalDecl::Var(v),
                        pos,
                    } => Some(Stmt::Local {
                        decl: LocalDecl::Var(VarDecl { init: None, ..v }),
                        pos,
                    }),
                    _ => None,
                }
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expr(&mut self, expr: &'a Expr<'a>) -> &'a Expr<'a> {
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::Identifier(_) => expr,
            ExprKind::Binary { op, left, right } => {
                let left = self.expr(left);
                let right = self.expr(right);
                if let Some(folded) = self.fold_binary(*op, left, right, expr) {
                    return folded;
                }
                self.rebuild_binary(expr, *op, left, right)
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.expr(operand);
                if let Some(folded) = self.fold_unary(*op, operand, expr) {
                    return folded;
                }
                self.rebuild(expr, ExprKind::Unary { op: *op, operand })
            }
            ExprKind::Assign { target, value } => {
                let value = self.expr(value);
                self.rebuild(expr, ExprKind::Assign { target, value })
            }
            ExprKind::CompoundAssign { op, target, value } => {
                let value = self.expr(value);
                self.rebuild(
                    expr,
                    ExprKind::CompoundAssign {
                        op: *op,
                        target,
                        value,
                    },
                )
            }
            ExprKind::Call { callee, args } => {
                let args: Vec<&Expr> = args.iter().map(|a| self.expr(a)).collect();
                self.rebuild(
                    expr,
                    ExprKind::Call {
                        callee: *callee,
                        args: self.ctx.alloc_expr_list(args),
                    },
                )
            }
            ExprKind::IntrinsicCall { which, args } => {
                let args: Vec<&Expr> = args.iter().map(|a| self.expr(a)).collect();
                self.rebuild(
                    expr,
                    ExprKind::IntrinsicCall {
                        which: *which,
                        args: self.ctx.alloc_expr_list(args),
                    },
                )
            }
            ExprKind::MessageSend { queue, value } => {
                let value = self.expr(value);
                self.rebuild(
                    expr,
                    ExprKind::MessageSend {
                        queue: *queue,
                        value,
                    },
                )
            }
            ExprKind::MessageRecv { queue, timeout } => {
                let timeout = timeout.map(|t| self.expr(t));
                self.rebuild(
                    expr,
                    ExprKind::MessageRecv {
                        queue: *queue,
                        timeout,
                    },
                )
            }
            ExprKind::Member {
                object,
                field,
                through_pointer,
            } => {
                let object = self.expr(object);
                self.rebuild(
                    expr,
                    ExprKind::Member {
                        object,
                        field: *field,
                        through_pointer: *through_pointer,
                    },
                )
            }
            ExprKind::Index { array, index } => {
                let array = self.expr(array);
                let index = self.expr(index);
                self.rebuild(expr, ExprKind::Index { array, index })
            }
            ExprKind::AddressOf { operand } => {
                let operand = self.expr(operand);
                self.rebuild(expr, ExprKind::AddressOf { operand })
            }
            ExprKind::Deref { operand } => {
                let operand = self.expr(operand);
                self.rebuild(expr, ExprKind::Deref { operand })
            }
            ExprKind::Cast { ty, operand } => {
                let operand = self.expr(operand);
                if let Some(folded) = self.fold_cast(ty, operand, expr) {
                    return folded;
                }
                self.rebuild(expr, ExprKind::Cast { ty: *ty, operand })
            }
            ExprKind::IncDec { op, prefix, target } => self.rebuild(
                expr,
                ExprKind::IncDec {
                    op: *op,
                    prefix: *prefix,
                    target,
                },
            ),
            ExprKind::Aggregate { elems } => {
                let elems: Vec<&Expr> = elems.iter().map(|e| self.expr(e)).collect();
                self.rebuild(
                    expr,
                    ExprKind::Aggregate {
                        elems: self.ctx.alloc_expr_list(elems),
                    },
                )
            }
        }
    }

    /// Re-allocates only when a child actually changed.
    fn rebuild(&mut self, original: &'a Expr<'a>, kind: ExprKind<'a>) -> &'a Expr<'a> {
        self.ctx.expr(kind, original.pos)
    }

    fn rebuild_binary(
        &mut self,
        original: &'a Expr<'a>,
        op: BinaryOp,
        left: &'a Expr<'a>,
        right: &'a Expr<'a>,
    ) -> &'a Expr<'a> {
        self.rebuild(original, ExprKind::Binary { op, left, right })
    }

    fn lit(&mut self, original: &'a Expr<'a>, lit: Literal) -> &'a Expr<'a> {
        self.changed = true;
        self.ctx.expr(ExprKind::Literal(lit), original.pos)
    }

    fn keep(&mut self, expr: &'a Expr<'a>) -> &'a Expr<'a> {
        self.changed = true;
        expr
    }

    fn fold_binary(
        &mut self,
        op: BinaryOp,
        left: &'a Expr<'a>,
        right: &'a Expr<'a>,
        original: &'a Expr<'a>,
    ) -> Option<&'a Expr<'a>> {
        use Literal::*;

        // Short-circuit simplification: the literal side decides whether the
        // other side ever runs, so dropping it is behavior preserving.
        if op == BinaryOp::LogicalAnd {
            if let ExprKind::Literal(Bool(value)) = left.kind {
                return Some(if value {
                    self.keep(right)
                } else {
                    self.lit(original, Bool(false))
                });
            }
        }
        if op == BinaryOp::LogicalOr {
            if let ExprKind::Literal(Bool(value)) = left.kind {
                return Some(if value {
                    self.lit(original, Bool(true))
                } else {
                    self.keep(right)
                });
            }
        }

        let (lv, rv) = match (&left.kind, &right.kind) {
            (ExprKind::Literal(l), ExprKind::Literal(r)) => (Some(*l), Some(*r)),
            (ExprKind::Literal(l), _) => (Some(*l), None),
            (_, ExprKind::Literal(r)) => (None, Some(*r)),
            _ => return None,
        };

        // Algebraic identities; the surviving operand is the result either way.
        if let Some(folded) = self.fold_identity(op, left, right, &lv, &rv) {
            return Some(folded);
        }

        let (lv, rv) = (lv?, rv?);
        let as_int = |lit: Literal| match lit {
            Int(v) => Some(v as i32),
            Char(c) => Some(c as i32),
            _ => None,
        };
        let as_float = |lit: Literal| match lit {
            Float(v) => Some(v),
            Int(v) => Some(v as f64),
            Char(c) => Some(c as u32 as f64),
            _ => None,
        };

        if let (Some(a), Some(b)) = (as_int(lv), as_int(rv)) {
            let int_result = match op {
                BinaryOp::Add => Some(a.wrapping_add(b)),
                BinaryOp::Sub => Some(a.wrapping_sub(b)),
                BinaryOp::Mul => Some(a.wrapping_mul(b)),
                BinaryOp::Div if b != 0 => Some(a.wrapping_div(b)),
                BinaryOp::Mod if b != 0 => Some(a.wrapping_rem(b)),
                BinaryOp::BitAnd => Some(a & b),
                BinaryOp::BitOr => Some(a | b),
                BinaryOp::BitXor => Some(a ^ b),
                BinaryOp::Shl if (0..32).contains(&b) => Some(a.wrapping_shl(b as u32)),
                BinaryOp::Shr if (0..32).contains(&b) => Some(a.wrapping_shr(b as u32)),
                _ => None,
            };
            if let Some(value) = int_result {
                return Some(self.lit(original, Int(value as i64)));
            }
            let cmp_result = match op {
                BinaryOp::Eq => Some(a == b),
                BinaryOp::Ne => Some(a != b),
                BinaryOp::Lt => Some(a < b),
                BinaryOp::Le => Some(a <= b),
                BinaryOp::Gt => Some(a > b),
                BinaryOp::Ge => Some(a >= b),
                _ => None,
            };
            if let Some(value) = cmp_result {
                return Some(self.lit(original, Bool(value)));
            }
            return None;
        }

        if let (Some(a), Some(b)) = (as_float(lv), as_float(rv)) {
            let float_result = match op {
                BinaryOp::Add => Some(a + b),
                BinaryOp::Sub => Some(a - b),
                BinaryOp::Mul => Some(a * b),
                BinaryOp::Div if b != 0.0 => Some(a / b),
                _ => None,
            };
            if let Some(value) = float_result {
                return Some(self.lit(original, Float(value)));
            }
            let cmp_result = match op {
                BinaryOp::Eq => Some(a == b),
                BinaryOp::Ne => Some(a != b),
                BinaryOp::Lt => Some(a < b),
                BinaryOp::Le => Some(a <= b),
                BinaryOp::Gt => Some(a > b),
                BinaryOp::Ge => Some(a >= b),
                _ => None,
            };
            if let Some(value) = cmp_result {
                return Some(self.lit(original, Bool(value)));
            }
            return None;
        }

        if let (Bool(a), Bool(b)) = (lv, rv) {
            let value = match op {
                BinaryOp::Eq => Some(a == b),
                BinaryOp::Ne => Some(a != b),
                _ => None,
            };
            if let Some(value) = value {
                return Some(self.lit(original, Bool(value)));
            }
        }
        None
    }

    fn fold_identity(
        &mut self,
        op: BinaryOp,
        left: &'a Expr<'a>,
        right: &'a Expr<'a>,
        lv: &Option<Literal>,
        rv: &Option<Literal>,
    ) -> Option<&'a Expr<'a>> {
        let is_int = |lit: &Option<Literal>, want: i64| matches!(lit, Some(Literal::Int(v)) if *v == want);
        match op {
            BinaryOp::Add => {
                if is_int(rv, 0) {
                    return Some(self.keep(left));
                }
                if is_int(lv, 0) {
                    return Some(self.keep(right));
                }
            }
            BinaryOp::Sub | BinaryOp::Shl | BinaryOp::Shr | BinaryOp::BitOr | BinaryOp::BitXor => {
                if is_int(rv, 0) {
                    return Some(self.keep(left));
                }
            }
            BinaryOp::Mul => {
                if is_int(rv, 1) {
                    return Some(self.keep(left));
                }
                if is_int(lv, 1) {
                    return Some(self.keep(right));
                }
            }
            BinaryOp::Div => {
                if is_int(rv, 1) {
                    return Some(self.keep(left));
                }
            }
            BinaryOp::BitAnd => {
                // x & ~0 keeps every bit.
                if is_int(rv, -1) {
                    return Some(self.keep(left));
                }
                if is_int(lv, -1) {
                    return Some(self.keep(right));
                }
            }
            _ => {}
        }
        None
    }

    fn fold_unary(
        &mut self,
        op: UnaryOp,
        operand: &'a Expr<'a>,
        original: &'a Expr<'a>,
    ) -> Option<&'a Expr<'a>> {
        if op == UnaryOp::Plus {
            return Some(self.keep(operand));
        }
        let lit = match operand.kind {
            ExprKind::Literal(lit) => lit,
            _ => return None,
        };
        match (op, lit) {
            (UnaryOp::Neg, Literal::Int(v)) => {
                Some(self.lit(original, Literal::Int((v as i32).wrapping_neg() as i64)))
            }
            (UnaryOp::Neg, Literal::Float(v)) => Some(self.lit(original, Literal::Float(-v))),
            (UnaryOp::Not, Literal::Bool(v)) => Some(self.lit(original, Literal::Bool(!v))),
            (UnaryOp::BitNot, Literal::Int(v)) => {
                Some(self.lit(original, Literal::Int(!(v as i32) as i64)))
            }
            _ => None,
        }
    }

    fn fold_cast(
        &mut self,
        ty: &crate::ast::TypeExpr<'a>,
        operand: &'a Expr<'a>,
        original: &'a Expr<'a>,
    ) -> Option<&'a Expr<'a>> {
        use crate::ast::{Primitive, TypeExprKind};
        let target = match ty.kind {
            TypeExprKind::Primitive(p) => p,
            _ => return None,
        };
        let lit = match operand.kind {
            ExprKind::Literal(lit) => lit,
            _ => return None,
        };
        match (target, lit) {
            (Primitive::Int, Literal::Float(v)) => {
                Some(self.lit(original, Literal::Int(v.trunc() as i32 as i64)))
            }
            (Primitive::Int, Literal::Int(v)) => Some(self.lit(original, Literal::Int(v))),
            (Primitive::Int, Literal::Char(c)) => {
                Some(self.lit(original, Literal::Int(c as i64)))
            }
            (Primitive::Float, Literal::Int(v)) => {
                Some(self.lit(original, Literal::Float(v as f64)))
            }
            (Primitive::Float, Literal::Float(v)) => {
                Some(self.lit(original, Literal::Float(v)))
            }
            _ => None,
        }
    }
}

fn stmt_takes_address(stmt: &Stmt<'_>) -> bool {
    let mut found = false;
    walk_stmt_exprs(stmt, &mut |expr| {
        if matches!(expr.kind, ExprKind::AddressOf { .. }) {
            found = true;
        }
    });
    found
}

fn stmt_reads(stmt: &Stmt<'_>, name: Symbol) -> bool {
    match stmt {
        Stmt::Block { stmts, .. } => stmts.iter().any(|s| stmt_reads(s, name)),
        Stmt::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            expr_reads(cond, name)
                || stmt_reads(then_branch, name)
                || else_branch.map(|e| stmt_reads(e, name)).unwrap_or(false)
        }
        Stmt::While { cond, body, .. } => expr_reads(cond, name) || stmt_reads(body, name),
        Stmt::For {
            init,
            cond,
            update,
            body,
            ..
        } => {
            init.map(|s| stmt_reads(s, name)).unwrap_or(false)
                || cond.map(|c| expr_reads(c, name)).unwrap_or(false)
                || update.map(|u| expr_reads(u, name)).unwrap_or(false)
                || stmt_reads(body, name)
        }
        Stmt::Return { value, .. } => value.map(|v| expr_reads(v, name)).unwrap_or(false),
        Stmt::Expr { expr, .. } => expr_reads(expr, name),
        Stmt::Local { decl, .. } => {
            let init = match decl {
                LocalDecl::Var(v) => v.init,
                LocalDecl::Array(a) => a.init,
                LocalDecl::Pointer(p) => p.init,
            };
            init.map(|e| expr_reads(e, name)).unwrap_or(false)
        }
        Stmt::Break { .. } | Stmt::Continue { .. } => false,
    }
}

/// True when evaluating `expr` observes `name`. The bare identifier target
/// of a plain assignment is a write, not a read; member and index targets
/// still read the base they navigate through.
fn expr_reads(expr: &Expr<'_>, name: Symbol) -> bool {
    match &expr.kind {
        ExprKind::Identifier(n) => *n == name,
        ExprKind::Literal(_) => false,
        ExprKind::Assign { target, value } => {
            let target_reads = match target.kind {
                ExprKind::Identifier(_) => false,
                _ => expr_reads(target, name),
            };
            target_reads || expr_reads(value, name)
        }
        ExprKind::CompoundAssign { target, value, .. } => {
            expr_reads(target, name) || expr_reads(value, name)
        }
        ExprKind::IncDec { target, .. } => expr_reads(target, name),
        ExprKind::Binary { left, right, .. } => {
            expr_reads(left, name) || expr_reads(right, name)
        }
        ExprKind::Unary { operand, .. }
        | ExprKind::AddressOf { operand }
        | ExprKind::Deref { operand }
        | ExprKind::Cast { operand, .. } => expr_reads(operand, name),
        ExprKind::Call { args, .. } | ExprKind::IntrinsicCall { args, .. } => {
            args.iter().any(|a| expr_reads(a, name))
        }
        ExprKind::MessageSend { value, .. } => expr_reads(value, name),
        ExprKind::MessageRecv { timeout, .. } => {
            timeout.map(|t| expr_reads(t, name)).unwrap_or(false)
        }
        ExprKind::Member { object, .. } => expr_reads(object, name),
        ExprKind::Index { array, index } => {
            expr_reads(array, name) || expr_reads(index, name)
        }
        ExprKind::Aggregate { elems } => elems.iter().any(|e| expr_reads(e, name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::source::FileId;

    macro_rules! optimized {
        ($src:expr, $program:ident) => {
            crate::ast_arena!(ctx);
            let mut interner = crate::intern::Interner::new();
            let mut diags = crate::error::Diagnostics::new();
            let tokens =
                Lexer::new($src, FileId::default(), &mut interner).tokenize(&mut diags);
            let mut parser = Parser::new(tokens, ctx, &mut interner, &mut diags);
            let parsed = parser.parse_program();
            drop(parser);
            assert!(!diags.has_errors(), "test source must parse");
            let $program = optimize(parsed, ctx);
        };
    }

    fn first_init<'a>(program: &Program<'a>) -> &'a Expr<'a> {
        match &program.decls[0] {
            Decl::Var(v) => v.init.expect("initializer"),
            other => panic!("expected var, got {:?}", other),
        }
    }

    fn body_of<'a>(program: &Program<'a>, index: usize) -> &'a [Stmt<'a>] {
        match &program.decls[index] {
            Decl::Function(f) => match f.body {
                Stmt::Block { stmts, .. } => *stmts,
                _ => panic!("body is not a block"),
            },
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn arithmetic_folds_bottom_up() {
        optimized!("int x = 2 + 3 * 4;", program);
        assert!(matches!(
            first_init(&program).kind,
            ExprKind::Literal(Literal::Int(14))
        ));
    }

    #[test]
    fn nested_unary_folds_in_one_round() {
        optimized!("int x = -(2 + 3);", program);
        assert!(matches!(
            first_init(&program).kind,
            ExprKind::Literal(Literal::Int(-5))
        ));
    }

    #[test]
    fn false_and_anything_is_false() {
        optimized!("void f() { bool b = false && HW_GPIO_GET(2) == 1; }", program);
        let stmts = body_of(&program, 0);
        match &stmts[0] {
            Stmt::Local {
                decl: LocalDecl::Var(v),
                ..
            } => assert!(matches!(
                v.init.unwrap().kind,
                ExprKind::Literal(Literal::Bool(false))
            )),
            _ => panic!("expected local"),
        }
    }

    #[test]
    fn true_or_anything_is_true() {
        optimized!("void f() { bool b = true || HW_GPIO_GET(2) == 1; }", program);
        let stmts = body_of(&program, 0);
        match &stmts[0] {
            Stmt::Local {
                decl: LocalDecl::Var(v),
                ..
            } => assert!(matches!(
                v.init.unwrap().kind,
                ExprKind::Literal(Literal::Bool(true))
            )),
            _ => panic!("expected local"),
        }
    }

    #[test]
    fn adding_zero_vanishes() {
        optimized!("void f() { int a = 1; int b = a + 0; }", program);
        let stmts = body_of(&program, 0);
        match &stmts[1] {
            Stmt::Local {
                decl: LocalDecl::Var(v),
                ..
            } => assert!(matches!(v.init.unwrap().kind, ExprKind::Identifier(_))),
            _ => panic!("expected local"),
        }
    }

    #[test]
    fn masking_with_all_ones_vanishes() {
        optimized!("void f() { int a = 1; int b = a & ~0; }", program);
        let stmts = body_of(&program, 0);
        match &stmts[1] {
            Stmt::Local {
                decl: LocalDecl::Var(v),
                ..
            } => assert!(matches!(v.init.unwrap().kind, ExprKind::Identifier(_))),
            _ => panic!("expected local"),
        }
    }

    #[test]
    fn statically_true_branch_replaces_the_if() {
        optimized!(
            "void f() { if (true) { RTOS_YIELD(); } else { RTOS_DELAY_MS(1); } }",
            program
        );
        let stmts = body_of(&program, 0);
        assert_eq!(stmts.len(), 1);
        match &stmts[0] {
            Stmt::Block { stmts, .. } => {
                assert_eq!(stmts.len(), 1);
                assert!(matches!(
                    stmts[0],
                    Stmt::Expr { expr, .. }
                        if matches!(expr.kind, ExprKind::IntrinsicCall { .. })
                ));
            }
            other => panic!("expected the then block, got {:?}", other),
        }
    }

    #[test]
    fn while_false_disappears() {
        optimized!("void f() { while (false) { RTOS_YIELD(); } }", program);
        let stmts = body_of(&program, 0);
        assert_eq!(stmts.len(), 1);
        assert!(matches!(
            &stmts[0],
            Stmt::Block { stmts, .. } if stmts.is_empty()
        ));
    }

    #[test]
    fn while_true_survives() {
        optimized!("void f() { while (true) { RTOS_YIELD(); } }", program);
        let stmts = body_of(&program, 0);
        assert!(matches!(stmts[0], Stmt::While { .. }));
    }

    #[test]
    fn division_by_zero_is_left_for_the_vm() {
        optimized!("int x = 1 / 0;", program);
        assert!(matches!(
            first_init(&program).kind,
            ExprKind::Binary { .. }
        ));
    }

    #[test]
    fn overwritten_store_is_dropped() {
        optimized!(
            "void f() { int x = 1; x = 2; HW_GPIO_SET(25, x); }",
            program
        );
        let stmts = body_of(&program, 0);
        assert_eq!(stmts.len(), 3);
        match &stmts[0] {
            Stmt::Local {
                decl: LocalDecl::Var(v),
                ..
            } => assert!(v.init.is_none(), "dead initializer should be gone"),
            _ => panic!("expected local"),
        }
        assert!(matches!(&stmts[1], Stmt::Expr { expr, .. }
            if matches!(expr.kind, ExprKind::Assign { .. })));
    }

    #[test]
    fn store_read_in_between_survives() {
        optimized!(
            "void f() { int x = 1; HW_GPIO_SET(25, x); x = 2; HW_GPIO_SET(25, x); }",
            program
        );
        let stmts = body_of(&program, 0);
        match &stmts[0] {
            Stmt::Local {
                decl: LocalDecl::Var(v),
                ..
            } => assert!(v.init.is_some(), "live initializer must stay"),
            _ => panic!("expected local"),
        }
    }

    #[test]
    fn address_taken_blocks_store_elimination() {
        optimized!(
            "void f() { int x = 1; int* p = &x; x = 2; *p = 3; }",
            program
        );
        let stmts = body_of(&program, 0);
        match &stmts[0] {
            Stmt::Local {
                decl: LocalDecl::Var(v),
                ..
            } => assert!(v.init.is_some(), "aliased store must stay"),
            _ => panic!("expected local"),
        }
    }

    #[test]
    fn float_casts_fold() {
        optimized!("int x = (int) 2.9; float y = (float) 3;", program);
        assert!(matches!(
            first_init(&program).kind,
            ExprKind::Literal(Literal::Int(2))
        ));
        match &program.decls[1] {
            Decl::Var(v) => assert!(matches!(
                v.init.unwrap().kind,
                ExprKind::Literal(Literal::Float(f)) if f == 3.0
            )),
            _ => panic!("expected var"),
        }
    }

    macro_rules! optimized_with_ctx {
        ($src:expr, $program:ident, $ctx:ident) => {
            crate::ast_arena!($ctx);
            let mut interner = crate::intern::Interner::new();
            let mut diags = crate::error::Diagnostics::new();
            let tokens =
                Lexer::new($src, FileId::default(), &mut interner).tokenize(&mut diags);
            let mut parser = Parser::new(tokens, $ctx, &mut interner, &mut diags);
            let parsed = parser.parse_program();
            drop(parser);
            let $program = optimize(parsed, $ctx);
        };
    }

    #[test]
    fn optimization_is_idempotent() {
        optimized_with_ctx!("void f() { int x = 1; x = 2 + 3; if (true) { x = 4; } }", program, ctx);
        let once = format!("{:?}", program);
        let again = optimize(program, ctx);
        let twice = format!("{:?}", again);
        assert_eq!(once, twice);
    }
}


fn walk_stmt_exprs<'a>(stmt: &'a Stmt<'a>, visit: &mut dyn FnMut(&'a Expr<'a>)) {
    match stmt {
        Stmt::Block { stmts, .. } => {
            for stmt in stmts.iter() {
                walk_stmt_exprs(stmt, visit);
            }
        }
        Stmt::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            walk_expr(cond, visit);
            walk_stmt_exprs(then_branch, visit);
            if let Some(else_branch) = else_branch {
                walk_stmt_exprs(else_branch, visit);
            }
        }
        Stmt::While { cond, body, .. } => {
            walk_expr(cond, visit);
            walk_stmt_exprs(body, visit);
        }
        Stmt::For {
            init,
            cond,
            update,
            body,
            ..
        } => {
            if let Some(init) = init {
                walk_stmt_exprs(init, visit);
            }
            if let Some(cond) = cond {
                walk_expr(cond, visit);
            }
            if let Some(update) = update {
                walk_expr(update, visit);
            }
            walk_stmt_exprs(body, visit);
        }
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                walk_expr(value, visit);
            }
        }
        Stmt::Expr { expr, .. } => walk_expr(expr, visit),
        Stmt::Local { decl, .. } => {
            let init = match decl {
                LocalDecl::Var(v) => v.init,
                LocalDecl::Array(a) => a.init,
                LocalDecl::Pointer(p) => p.init,
            };
            if let Some(init) = init {
                walk_expr(init, visit);
            }
        }
        Stmt::Break { .. } | Stmt::Continue { .. } => {}
    }
}

fn walk_expr<'a>(expr: &'a Expr<'a>, visit: &mut dyn FnMut(&'a Expr<'a>)) {
    visit(expr);
    match &expr.kind {
        ExprKind::Binary { left, right, .. } => {
            walk_expr(left, visit);
            walk_expr(right, visit);
        }
        ExprKind::Unary { operand, .. }
        | ExprKind::AddressOf { operand }
        | ExprKind::Deref { operand }
        | ExprKind::Cast { operand, .. } => walk_expr(operand, visit),
        ExprKind::Assign { target, value } | ExprKind::CompoundAssign { target, value, .. } => {
            walk_expr(target, visit);
            walk_expr(value, visit);
        }
        ExprKind::Call { args, .. } | ExprKind::IntrinsicCall { args, .. } => {
            for arg in args.iter() {
                walk_expr(arg, visit);
            }
        }
        ExprKind::MessageSend { value, .. } => walk_expr(value, visit),
        ExprKind::MessageRecv { timeout, .. } => {
            if let Some(timeout) = timeout {
                walk_expr(timeout, visit);
            }
        }
        ExprKind::Member { object, .. } => walk_expr(object, visit),
        ExprKind::Index { array, index } => {
            walk_expr(array, visit);
            walk_expr(index, visit);
        }
        ExprKind::IncDec { target, .. } => walk_expr(target, visit),
        ExprKind::Aggregate { elems } => {
            for elem in elems.iter() {
                walk_expr(elem, visit);
            }
        }
        ExprKind::Literal(_) | ExprKind::Identifier(_) => {}
    }
}
