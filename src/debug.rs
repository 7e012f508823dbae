//! Token and AST dumps for the `--tokens` and `--ast` flags.

use std::fmt::Write;

use crate::ast::{
    Decl, Expr, ExprKind, Literal, LocalDecl, Program, Stmt, TypeExpr, TypeExprKind,
};
use crate::intern::Interner;
use crate::source::SourceMap;
use crate::token::{Token, TokenType};

pub fn print_tokens(tokens: &[Token], interner: &Interner, sources: &SourceMap) {
    for token in tokens {
        println!(
            "{:<18} '{}' at {}:{}",
            kind_label(&token.kind),
            interner.resolve(token.lexeme).escape_debug(),
            sources.name(token.file),
            token.line
        );
    }
}

fn kind_label(kind: &TokenType) -> &'static str {
    match kind {
        TokenType::Integer(_) => "INTEGER",
        TokenType::Float(_) => "FLOAT",
        TokenType::Str(_) => "STRING",
        TokenType::CharLit(_) => "CHAR",
        TokenType::Bool(_) => "BOOL",
        TokenType::Identifier(_) => "IDENTIFIER",
        TokenType::Intrinsic(_) => "INTRINSIC",
        TokenType::Eof => "EOF",
        _ => "SYMBOL",
    }
}

/// Indented tree rendering of the merged program.
pub fn ast_to_string(program: &Program<'_>, interner: &Interner) -> String {
    let mut printer = AstPrinter {
        interner,
        out: String::new(),
        depth: 0,
    };
    printer.line("Program:");
    printer.depth += 1;
    for decl in &program.decls {
        printer.decl(decl);
    }
    printer.out
}

struct AstPrinter<'i> {
    interner: &'i Interner,
    out: String,
    depth: usize,
}

impl<'i> AstPrinter<'i> {
    fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn name(&self, sym: crate::intern::Symbol) -> &str {
        self.interner.resolve(sym)
    }

    fn ty(&self, ty: &TypeExpr<'_>) -> String {
        match ty.kind {
            TypeExprKind::Primitive(p) => p.name().to_string(),
            TypeExprKind::Named(name) => self.name(name).to_string(),
            TypeExprKind::Pointer(inner) => format!("{}*", self.ty(inner)),
            TypeExprKind::Const(inner) => format!("const {}", self.ty(inner)),
        }
    }

    fn nested(&mut self, header: String, body: impl FnOnce(&mut Self)) {
        self.line(header);
        self.depth += 1;
        body(self);
        self.depth -= 1;
    }

    fn decl(&mut self, decl: &Decl<'_>) {
        match decl {
            Decl::Function(f) => {
                let params: Vec<String> = f
                    .params
                    .iter()
                    .map(|p| format!("{} {}", self.ty(&p.ty), self.name(p.name)))
                    .collect();
                self.nested(
                    format!(
                        "FunctionDecl: {} {}({})",
                        self.ty(&f.return_ty),
                        self.name(f.name),
                        params.join(", ")
                    ),
                    |p| p.stmt(f.body),
                );
            }
            Decl::Var(v) => {
                let header = format!("VarDecl: {} {}", self.ty(&v.ty), self.name(v.name));
                match v.init {
                    Some(init) => self.nested(header, |p| p.expr(init)),
                    None => self.line(header),
                }
            }
            Decl::Array(a) => {
                let header = format!(
                    "ArrayDecl: {} {}[{}]",
                    self.ty(&a.elem_ty),
                    self.name(a.name),
                    a.len
                );
                match a.init {
                    Some(init) => self.nested(header, |p| p.expr(init)),
                    None => self.line(header),
                }
            }
            Decl::Pointer(ptr) => {
                let header =
                    format!("PointerDecl: {} {}", self.ty(&ptr.ty), self.name(ptr.name));
                match ptr.init {
                    Some(init) => self.nested(header, |p| p.expr(init)),
                    None => self.line(header),
                }
            }
            Decl::Struct(s) | Decl::Union(s) => {
                let label = if matches!(decl, Decl::Union(_)) {
                    "UnionDecl"
                } else {
                    "StructDecl"
                };
                self.line(format!("{}: {}", label, self.name(s.name)));
                self.depth += 1;
                for field in s.fields.iter() {
                    match field.bit_width {
                        Some(width) => self.line(format!(
                            "Field: {} {} : {}",
                            self.ty(&field.ty),
                            self.name(field.name),
                            width
                        )),
                        None => self.line(format!(
                            "Field: {} {}",
                            self.ty(&field.ty),
                            self.name(field.name)
                        )),
                    }
                }
                self.depth -= 1;
            }
            Decl::Message(m) => self.line(format!(
                "MessageDecl: message<{}> {}",
                self.ty(&m.elem_ty),
                self.name(m.name)
            )),
            Decl::Const(c) => {
                let header = format!("ConstDecl: {} {}", self.ty(&c.ty), self.name(c.name));
                self.nested(header, |p| p.expr(c.init));
            }
            Decl::Import(i) => {
                self.line(format!("Import: \"{}\"", self.name(i.path)));
            }
        }
    }

    fn stmt(&mut self, stmt: &Stmt<'_>) {
        match stmt {
            Stmt::Block { stmts, .. } => {
                self.nested("Block:".to_string(), |p| {
                    for stmt in stmts.iter() {
                        p.stmt(stmt);
                    }
                });
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                self.nested("If:".to_string(), |p| {
                    p.nested("cond:".to_string(), |p| p.expr(cond));
                    p.nested("then:".to_string(), |p| p.stmt(then_branch));
                    if let Some(else_branch) = else_branch {
                        p.nested("else:".to_string(), |p| p.stmt(else_branch));
                    }
                });
            }
            Stmt::While { cond, body, .. } => {
                self.nested("While:".to_string(), |p| {
                    p.nested("cond:".to_string(), |p| p.expr(cond));
                    p.stmt(body);
                });
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
                ..
            } => {
                self.nested("For:".to_string(), |p| {
                    if let Some(init) = init {
                        p.nested("init:".to_string(), |p| p.stmt(init));
                    }
                    if let Some(cond) = cond {
                        p.nested("cond:".to_string(), |p| p.expr(cond));
                    }
                    if let Some(update) = update {
                        p.nested("update:".to_string(), |p| p.expr(update));
                    }
                    p.stmt(body);
                });
            }
            Stmt::Break { .. } => self.line("Break"),
            Stmt::Continue { .. } => self.line("Continue"),
            Stmt::Return { value, .. } => match value {
                Some(value) => self.nested("Return:".to_string(), |p| p.expr(value)),
                None => self.line("Return"),
            },
            Stmt::Expr { expr, .. } => self.expr(expr),
            Stmt::Local { decl, .. } => match decl {
                LocalDecl::Var(v) => {
                    let header =
                        format!("VarDecl: {} {}", self.ty(&v.ty), self.name(v.name));
                    match v.init {
                        Some(init) => self.nested(header, |p| p.expr(init)),
                        None => self.line(header),
                    }
                }
                LocalDecl::Array(a) => {
                    let header = format!(
                        "ArrayDecl: {} {}[{}]",
                        self.ty(&a.elem_ty),
                        self.name(a.name),
                        a.len
                    );
                    match a.init {
                        Some(init) => self.nested(header, |p| p.expr(init)),
                        None => self.line(header),
                    }
                }
                LocalDecl::Pointer(ptr) => {
                    let header =
                        format!("PointerDecl: {} {}", self.ty(&ptr.ty), self.name(ptr.name));
                    match ptr.init {
                        Some(init) => self.nested(header, |p| p.expr(init)),
                        None => self.line(header),
                    }
                }
            },
        }
    }

    fn expr(&mut self, expr: &Expr<'_>) {
        match &expr.kind {
            ExprKind::Literal(lit) => {
                let text = match lit {
                    Literal::Int(v) => format!("Literal: {}", v),
                    Literal::Float(v) => format!("Literal: {}", v),
                    Literal::Char(c) => format!("Literal: '{}'", c.escape_default()),
                    Literal::Bool(b) => format!("Literal: {}", b),
                    Literal::Str(s) => {
                        format!("Literal: \"{}\"", self.name(*s).escape_debug())
                    }
                };
                self.line(text);
            }
            ExprKind::Identifier(name) => {
                self.line(format!("Identifier: {}", self.name(*name)))
            }
            ExprKind::Binary { op, left, right } => {
                self.nested(format!("Binary: {}", op.symbol()), |p| {
                    p.expr(left);
                    p.expr(right);
                });
            }
            ExprKind::Unary { op, operand } => {
                let symbol = match op {
                    crate::ast::UnaryOp::Neg => "-",
                    crate::ast::UnaryOp::Plus => "+",
                    crate::ast::UnaryOp::Not => "!",
                    crate::ast::UnaryOp::BitNot => "~",
                };
                self.nested(format!("Unary: {}", symbol), |p| p.expr(operand));
            }
            ExprKind::Assign { target, value } => {
                self.nested("Assign:".to_string(), |p| {
                    p.expr(target);
                    p.expr(value);
                });
            }
            ExprKind::CompoundAssign { op, target, value } => {
                self.nested(format!("CompoundAssign: {}=", op.symbol()), |p| {
                    p.expr(target);
                    p.expr(value);
                });
            }
            ExprKind::Call { callee, args } => {
                let header = format!("Call: {}", self.name(*callee));
                self.nested(header, |p| {
                    for arg in args.iter() {
                        p.expr(arg);
                    }
                });
            }
            ExprKind::IntrinsicCall { which, args } => {
                let header = format!("IntrinsicCall: {}", which.name());
                self.nested(header, |p| {
                    for arg in args.iter() {
                        p.expr(arg);
                    }
                });
            }
            ExprKind::MessageSend { queue, value } => {
                let header = format!("MessageSend: {}", self.name(*queue));
                self.nested(header, |p| p.expr(value));
            }
            ExprKind::MessageRecv { queue, timeout } => {
                let header = format!("MessageRecv: {}", self.name(*queue));
                match timeout {
                    Some(timeout) => self.nested(header, |p| {
                        p.nested("timeout:".to_string(), |p| p.expr(timeout))
                    }),
                    None => self.line(header),
                }
            }
            ExprKind::Member {
                object,
                field,
                through_pointer,
            } => {
                let op = if *through_pointer { "->" } else { "." };
                self.nested(
                    format!("MemberExpr: {}{}", op, self.name(*field)),
                    |p| p.expr(object),
                );
            }
            ExprKind::Index { array, index } => {
                self.nested("ArrayAccess:".to_string(), |p| {
                    p.expr(array);
                    p.expr(index);
                });
            }
            ExprKind::AddressOf { operand } => {
                self.nested("AddressOf:".to_string(), |p| p.expr(operand));
            }
            ExprKind::Deref { operand } => {
                self.nested("Dereference:".to_string(), |p| p.expr(operand));
            }
            ExprKind::Cast { ty, operand } => {
                let mut header = String::new();
                let _ = write!(header, "Cast: ({})", self.ty(ty));
                self.nested(header, |p| p.expr(operand));
            }
            ExprKind::IncDec { op, prefix, target } => {
                let symbol = match op {
                    crate::ast::IncDecOp::Increment => "++",
                    crate::ast::IncDecOp::Decrement => "--",
                };
                let placement = if *prefix { "prefix" } else { "postfix" };
                self.nested(format!("IncDec: {} ({})", symbol, placement), |p| {
                    p.expr(target)
                });
            }
            ExprKind::Aggregate { elems } => {
                self.nested("AggregateLiteral:".to_string(), |p| {
                    for elem in elems.iter() {
                        p.expr(elem);
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Diagnostics;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::source::FileId;

    #[test]
    fn ast_dump_names_node_kinds() {
        crate::ast_arena!(ctx);
        let mut interner = Interner::new();
        let mut diags = Diagnostics::new();
        let src = "struct P { int x; int y; };\n\
                   P pts[4];\n\
                   void f() { pts[2].y = 7; }";
        let tokens = Lexer::new(src, FileId::default(), &mut interner).tokenize(&mut diags);
        let mut parser = Parser::new(tokens, ctx, &mut interner, &mut diags);
        let program = parser.parse_program();
        drop(parser);
        assert!(!diags.has_errors());

        let dump = ast_to_string(&program, &interner);
        assert!(dump.contains("StructDecl: P"), "{}", dump);
        assert!(dump.contains("ArrayDecl: P pts[4]"), "{}", dump);
        assert!(dump.contains("FunctionDecl: void f()"), "{}", dump);
        assert!(dump.contains("MemberExpr: .y"), "{}", dump);
        assert!(dump.contains("ArrayAccess:"), "{}", dump);
    }

    #[test]
    fn deeper_nodes_are_indented_further() {
        crate::ast_arena!(ctx);
        let mut interner = Interner::new();
        let mut diags = Diagnostics::new();
        let src = "void f() { if (true) { return; } }";
        let tokens = Lexer::new(src, FileId::default(), &mut interner).tokenize(&mut diags);
        let mut parser = Parser::new(tokens, ctx, &mut interner, &mut diags);
        let program = parser.parse_program();
        drop(parser);

        let dump = ast_to_string(&program, &interner);
        let fn_indent = dump
            .lines()
            .find(|l| l.contains("FunctionDecl"))
            .unwrap()
            .chars()
            .take_while(|c| *c == ' ')
            .count();
        let ret_indent = dump
            .lines()
            .find(|l| l.contains("Return"))
            .unwrap()
            .chars()
            .take_while(|c| *c == ' ')
            .count();
        assert!(ret_indent > fn_indent);
    }
}
