use super::{ExprParsing, ParseResult, Parser, Recovered};
use crate::ast::{ArrayDecl, LocalDecl, PointerDecl, Stmt, VarDecl};
use crate::token::TokenType;

/// Statement-level parsing, split out of the core parser.
pub trait StmtParsing<'a> {
    fn parse_block(&mut self) -> ParseResult<&'a Stmt<'a>>;
    fn parse_stmt(&mut self) -> ParseResult<Stmt<'a>>;
    fn parse_local_decl(&mut self) -> ParseResult<Stmt<'a>>;
}

impl<'a, 'd> StmtParsing<'a> for Parser<'a, 'd> {
    fn parse_block(&mut self) -> ParseResult<&'a Stmt<'a>> {
        let block = self.parse_block_stmt()?;
        Ok(self.ctx.stmt(block))
    }

    fn parse_stmt(&mut self) -> ParseResult<Stmt<'a>> {
        let pos = self.here();
        match self.peek_kind() {
            TokenType::LBrace => self.parse_block_stmt(),
            TokenType::If => {
                self.advance();
                self.expect(TokenType::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(TokenType::RParen)?;
                let then_branch = self.stmt_ref()?;
                let else_branch = if self.eat(TokenType::Else) {
                    Some(self.stmt_ref()?)
                } else {
                    None
                };
                Ok(Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                    pos,
                })
            }
            TokenType::While => {
                self.advance();
                self.expect(TokenType::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(TokenType::RParen)?;
                let body = self.stmt_ref()?;
                Ok(Stmt::While { cond, body, pos })
            }
            TokenType::For => {
                self.advance();
                self.expect(TokenType::LParen)?;
                let init = if self.eat(TokenType::Semicolon) {
                    None
                } else if self.starts_local_decl() {
                    Some(self.parse_local_decl()?)
                } else {
                    let expr = self.parse_expr()?;
                    let expr_pos = pos;
                    self.expect(TokenType::Semicolon)?;
                    Some(Stmt::Expr {
                        expr,
                        pos: expr_pos,
                    })
                };
                let init = init.map(|s| self.ctx.stmt(s));
                let cond = if self.check(TokenType::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenType::Semicolon)?;
                let update = if self.check(TokenType::RParen) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenType::RParen)?;
                let body = self.stmt_ref()?;
                Ok(Stmt::For {
                    init,
                    cond,
                    update,
                    body,
                    pos,
                })
            }
            TokenType::Break => {
                self.advance();
                self.expect(TokenType::Semicolon)?;
                Ok(Stmt::Break { pos })
            }
            TokenType::Continue => {
                self.advance();
                self.expect(TokenType::Semicolon)?;
                Ok(Stmt::Continue { pos })
            }
            TokenType::Return => {
                self.advance();
                let value = if self.check(TokenType::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenType::Semicolon)?;
                Ok(Stmt::Return { value, pos })
            }
            _ if self.starts_local_decl() => self.parse_local_decl(),
            _ => {
                let expr = self.parse_expr()?;
                self.expect(TokenType::Semicolon)?;
                Ok(Stmt::Expr { expr, pos })
            }
        }
    }

    fn parse_local_decl(&mut self) -> ParseResult<Stmt<'a>> {
        let pos = self.here();
        let base = self.parse_base_type()?;
        let mut depth = 0;
        while self.eat(TokenType::Star) {
            depth += 1;
        }
        let ty = self.wrap_pointers(base, depth);
        let (name, _) = self.expect_identifier()?;

        let decl = if depth > 0 {
            let init = if self.eat(TokenType::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            LocalDecl::Pointer(PointerDecl {
                ty,
                name,
                init,
                pos,
            })
        } else if self.check(TokenType::LBracket) {
            let len = self.parse_array_len()?;
            let init = if self.eat(TokenType::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            LocalDecl::Array(ArrayDecl {
                name,
                elem_ty: ty,
                len,
                init,
                pos,
            })
        } else {
            let init = if self.eat(TokenType::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            LocalDecl::Var(VarDecl {
                name,
                ty,
                init,
                pos,
            })
        };
        self.expect(TokenType::Semicolon)?;
        Ok(Stmt::Local { decl, pos })
    }
}

impl<'a, 'd> Parser<'a, 'd> {
    fn stmt_ref(&mut self) -> ParseResult<&'a Stmt<'a>> {
        let stmt = self.parse_stmt()?;
        Ok(self.ctx.stmt(stmt))
    }

    fn parse_block_stmt(&mut self) -> ParseResult<Stmt<'a>> {
        let pos = self.here();
        self.expect(TokenType::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(TokenType::RBrace) && !self.at_eof() {
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(Recovered) => self.synchronize(),
            }
        }
        self.expect(TokenType::RBrace)?;
        Ok(Stmt::Block {
            stmts: self.ctx.alloc_stmts(stmts),
            pos,
        })
    }

    /// A statement starting with a type keyword, `const`, or a named type
    /// (`P p`, `P* p`) is a local declaration.
    pub(super) fn starts_local_decl(&self) -> bool {
        self.peek_kind().starts_type() || self.names_a_type()
    }
}
