use super::{ParseResult, Parser};
use crate::ast::{BinaryOp, Expr, ExprKind, IncDecOp, Literal, UnaryOp};
use crate::error::DiagnosticKind;
use crate::token::TokenType;

/// Expression parsing by precedence climbing.
pub trait ExprParsing<'a> {
    fn parse_expr(&mut self) -> ParseResult<&'a Expr<'a>>;
}

impl<'a, 'd> ExprParsing<'a> for Parser<'a, 'd> {
    fn parse_expr(&mut self) -> ParseResult<&'a Expr<'a>> {
        self.parse_assignment()
    }
}

fn binary_prec(kind: TokenType) -> Option<(u8, BinaryOp)> {
    match kind {
        TokenType::OrOr => Some((1, BinaryOp::LogicalOr)),
        TokenType::AndAnd => Some((2, BinaryOp::LogicalAnd)),
        TokenType::Pipe => Some((3, BinaryOp::BitOr)),
        TokenType::Caret => Some((4, BinaryOp::BitXor)),
        TokenType::Amp => Some((5, BinaryOp::BitAnd)),
        TokenType::EqEq => Some((6, BinaryOp::Eq)),
        TokenType::NotEq => Some((6, BinaryOp::Ne)),
        TokenType::Lt => Some((7, BinaryOp::Lt)),
        TokenType::LtEq => Some((7, BinaryOp::Le)),
        TokenType::Gt => Some((7, BinaryOp::Gt)),
        TokenType::GtEq => Some((7, BinaryOp::Ge)),
        TokenType::Shl => Some((8, BinaryOp::Shl)),
        TokenType::Shr => Some((8, BinaryOp::Shr)),
        TokenType::Plus => Some((9, BinaryOp::Add)),
        TokenType::Minus => Some((9, BinaryOp::Sub)),
        TokenType::Star => Some((10, BinaryOp::Mul)),
        TokenType::Slash => Some((10, BinaryOp::Div)),
        TokenType::Percent => Some((10, BinaryOp::Mod)),
        _ => None,
    }
}

impl<'a, 'd> Parser<'a, 'd> {
    fn parse_assignment(&mut self) -> ParseResult<&'a Expr<'a>> {
        let target = self.parse_binary(1)?;
        let pos = target.pos;
        let compound = match self.peek_kind() {
            TokenType::Assign => None,
            TokenType::PlusAssign => Some(BinaryOp::Add),
            TokenType::MinusAssign => Some(BinaryOp::Sub),
            TokenType::StarAssign => Some(BinaryOp::Mul),
            TokenType::SlashAssign => Some(BinaryOp::Div),
            _ => return Ok(target),
        };
        self.advance();
        let value = self.parse_assignment()?;
        let kind = match compound {
            None => ExprKind::Assign { target, value },
            Some(op) => ExprKind::CompoundAssign { op, target, value },
        };
        Ok(self.ctx.expr(kind, pos))
    }

    fn parse_binary(&mut self, min_prec: u8) -> ParseResult<&'a Expr<'a>> {
        let mut left = self.parse_unary()?;
        while let Some((prec, op)) = binary_prec(self.peek_kind()) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.parse_binary(prec + 1)?;
            let pos = left.pos;
            left = self.ctx.expr(ExprKind::Binary { op, left, right }, pos);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<&'a Expr<'a>> {
        let pos = self.here();
        let op = match self.peek_kind() {
            TokenType::Not => Some(UnaryOp::Not),
            TokenType::Tilde => Some(UnaryOp::BitNot),
            TokenType::Minus => Some(UnaryOp::Neg),
            TokenType::Plus => Some(UnaryOp::Plus),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(self.ctx.expr(ExprKind::Unary { op, operand }, pos));
        }
        match self.peek_kind() {
            TokenType::Amp => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(self.ctx.expr(ExprKind::AddressOf { operand }, pos))
            }
            TokenType::Star => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(self.ctx.expr(ExprKind::Deref { operand }, pos))
            }
            TokenType::Increment => {
                self.advance();
                let target = self.parse_unary()?;
                Ok(self.ctx.expr(
                    ExprKind::IncDec {
                        op: IncDecOp::Increment,
                        prefix: true,
                        target,
                    },
                    pos,
                ))
            }
            TokenType::Decrement => {
                self.advance();
                let target = self.parse_unary()?;
                Ok(self.ctx.expr(
                    ExprKind::IncDec {
                        op: IncDecOp::Decrement,
                        prefix: true,
                        target,
                    },
                    pos,
                ))
            }
            TokenType::LParen if self.is_cast_start() => {
                self.advance();
                let ty = self.parse_type()?;
                self.expect(TokenType::RParen)?;
                let operand = self.parse_unary()?;
                Ok(self.ctx.expr(ExprKind::Cast { ty, operand }, pos))
            }
            _ => self.parse_postfix(),
        }
    }

    /// `(` starts a cast when followed by a type keyword, or by a named type
    /// with at least one `*` before the closing paren. `(P*) p` is a cast;
    /// `(a * b)` stays an expression.
    fn is_cast_start(&self) -> bool {
        match self.peek_at(1) {
            kind if kind.starts_type() => true,
            TokenType::Identifier(_) => {
                let mut offset = 2;
                let mut stars = 0;
                while matches!(self.peek_at(offset), TokenType::Star) {
                    stars += 1;
                    offset += 1;
                }
                stars > 0 && matches!(self.peek_at(offset), TokenType::RParen)
            }
            _ => false,
        }
    }

    fn parse_postfix(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut expr = self.parse_primary()?;
        loop {
            let pos = expr.pos;
            match self.peek_kind() {
                TokenType::LParen => {
                    let callee = match expr.kind {
                        ExprKind::Identifier(sym) => sym,
                        _ => break,
                    };
                    let args = self.parse_args()?;
                    expr = self.ctx.expr(
                        ExprKind::Call {
                            callee,
                            args: self.ctx.alloc_expr_list(args),
                        },
                        pos,
                    );
                }
                TokenType::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(TokenType::RBracket)?;
                    expr = self.ctx.expr(ExprKind::Index { array: expr, index }, pos);
                }
                TokenType::Dot => {
                    self.advance();
                    match self.peek_kind() {
                        TokenType::Send => {
                            self.advance();
                            let queue = self.queue_name(expr)?;
                            self.expect(TokenType::LParen)?;
                            let value = self.parse_expr()?;
                            self.expect(TokenType::RParen)?;
                            expr = self
                                .ctx
                                .expr(ExprKind::MessageSend { queue, value }, pos);
                        }
                        TokenType::Recv => {
                            self.advance();
                            let queue = self.queue_name(expr)?;
                            self.expect(TokenType::LParen)?;
                            let timeout = if self.check(TokenType::RParen) {
                                None
                            } else {
                                self.expect_timeout_label()?;
                                Some(self.parse_expr()?)
                            };
                            self.expect(TokenType::RParen)?;
                            expr = self
                                .ctx
                                .expr(ExprKind::MessageRecv { queue, timeout }, pos);
                        }
                        _ => {
                            let (field, _) = self.expect_identifier()?;
                            expr = self.ctx.expr(
                                ExprKind::Member {
                                    object: expr,
                                    field,
                                    through_pointer: false,
                                },
                                pos,
                            );
                        }
                    }
                }
                TokenType::Arrow => {
                    self.advance();
                    let (field, _) = self.expect_identifier()?;
                    expr = self.ctx.expr(
                        ExprKind::Member {
                            object: expr,
                            field,
                            through_pointer: true,
                        },
                        pos,
                    );
                }
                TokenType::Increment => {
                    self.advance();
                    expr = self.ctx.expr(
                        ExprKind::IncDec {
                            op: IncDecOp::Increment,
                            prefix: false,
                            target: expr,
                        },
                        pos,
                    );
                }
                TokenType::Decrement => {
                    self.advance();
                    expr = self.ctx.expr(
                        ExprKind::IncDec {
                            op: IncDecOp::Decrement,
                            prefix: false,
                            target: expr,
                        },
                        pos,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn queue_name(&mut self, expr: &'a Expr<'a>) -> ParseResult<crate::intern::Symbol> {
        match expr.kind {
            ExprKind::Identifier(sym) => Ok(sym),
            _ => Err(self.error_here(DiagnosticKind::UnexpectedToken {
                expected: "message queue name".to_string(),
                found: "expression".to_string(),
            })),
        }
    }

    fn expect_timeout_label(&mut self) -> ParseResult<()> {
        match self.peek_kind() {
            TokenType::Identifier(sym) if sym == self.timeout_sym => {
                self.advance();
                self.expect(TokenType::Colon)?;
                Ok(())
            }
            found => Err(self.error_here(DiagnosticKind::UnexpectedToken {
                expected: "'timeout:'".to_string(),
                found: found.describe(),
            })),
        }
    }

    fn parse_args(&mut self) -> ParseResult<Vec<&'a Expr<'a>>> {
        self.expect(TokenType::LParen)?;
        let mut args = Vec::new();
        if !self.check(TokenType::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(TokenType::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenType::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> ParseResult<&'a Expr<'a>> {
        let pos = self.here();
        let kind = match self.peek_kind() {
            TokenType::Integer(value) => {
                self.advance();
                ExprKind::Literal(Literal::Int(value))
            }
            TokenType::Float(value) => {
                self.advance();
                ExprKind::Literal(Literal::Float(value))
            }
            TokenType::Str(sym) => {
                self.advance();
                ExprKind::Literal(Literal::Str(sym))
            }
            TokenType::CharLit(value) => {
                self.advance();
                ExprKind::Literal(Literal::Char(value))
            }
            TokenType::Bool(value) => {
                self.advance();
                ExprKind::Literal(Literal::Bool(value))
            }
            TokenType::Identifier(sym) => {
                self.advance();
                ExprKind::Identifier(sym)
            }
            TokenType::Intrinsic(which) => {
                self.advance();
                let args = self.parse_args()?;
                ExprKind::IntrinsicCall {
                    which,
                    args: self.ctx.alloc_expr_list(args),
                }
            }
            TokenType::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenType::RParen)?;
                return Ok(inner);
            }
            TokenType::LBrace => {
                self.advance();
                let mut elems = Vec::new();
                if !self.check(TokenType::RBrace) {
                    loop {
                        elems.push(self.parse_expr()?);
                        if !self.eat(TokenType::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenType::RBrace)?;
                ExprKind::Aggregate {
                    elems: self.ctx.alloc_expr_list(elems),
                }
            }
            found => {
                return Err(self.error_here(DiagnosticKind::ExpectedExpression {
                    found: found.describe(),
                }))
            }
        };
        Ok(self.ctx.expr(kind, pos))
    }
}
