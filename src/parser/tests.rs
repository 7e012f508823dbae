use super::*;
use crate::ast::{Decl, ExprKind, Literal, LocalDecl, Stmt};
use crate::lexer::Lexer;
use crate::source::FileId;

macro_rules! parsed {
    ($src:expr, $program:ident, $interner:ident, $diags:ident) => {
        crate::ast_arena!(ctx);
        let mut $interner = crate::intern::Interner::new();
        let mut $diags = crate::error::Diagnostics::new();
        let tokens =
            Lexer::new($src, FileId::default(), &mut $interner).tokenize(&mut $diags);
        let mut parser = Parser::new(tokens, ctx, &mut $interner, &mut $diags);
        let $program = parser.parse_program();
        drop(parser);
    };
}

fn body_stmts<'a>(decl: &Decl<'a>) -> &'a [Stmt<'a>] {
    match decl {
        Decl::Function(f) => match f.body {
            Stmt::Block { stmts, .. } => *stmts,
            _ => panic!("function body is not a block"),
        },
        _ => panic!("expected a function declaration"),
    }
}

#[test]
fn function_declaration_parses() {
    parsed!("void main() { return; }", program, interner, diags);
    assert!(!diags.has_errors());
    assert_eq!(program.decls.len(), 1);
    match &program.decls[0] {
        Decl::Function(f) => {
            assert_eq!(interner.resolve(f.name), "main");
            assert!(f.params.is_empty());
        }
        other => panic!("expected function, got {:?}", other),
    }
}

#[test]
fn global_variable_with_initializer() {
    parsed!("int x = 42;", program, _interner, diags);
    assert!(!diags.has_errors());
    match &program.decls[0] {
        Decl::Var(v) => {
            let init = v.init.expect("initializer");
            assert!(matches!(init.kind, ExprKind::Literal(Literal::Int(42))));
        }
        other => panic!("expected var, got {:?}", other),
    }
}

#[test]
fn struct_with_two_fields() {
    parsed!(
        "struct Point { int x; int y; };",
        program,
        interner,
        diags
    );
    assert!(!diags.has_errors());
    match &program.decls[0] {
        Decl::Struct(s) => {
            assert_eq!(interner.resolve(s.name), "Point");
            assert_eq!(s.fields.len(), 2);
        }
        other => panic!("expected struct, got {:?}", other),
    }
}

#[test]
fn bitfield_widths_are_recorded() {
    parsed!(
        "struct F { int a : 4; int b : 8; int c : 20; };",
        program,
        _interner,
        diags
    );
    assert!(!diags.has_errors());
    match &program.decls[0] {
        Decl::Struct(s) => {
            let widths: Vec<Option<u32>> = s.fields.iter().map(|f| f.bit_width).collect();
            assert_eq!(widths, vec![Some(4), Some(8), Some(20)]);
        }
        other => panic!("expected struct, got {:?}", other),
    }
}

#[test]
fn union_declaration_parses() {
    parsed!("union Reg { int i; float f; };", program, _interner, diags);
    assert!(!diags.has_errors());
    assert!(matches!(program.decls[0], Decl::Union(_)));
}

#[test]
fn array_of_named_type_with_aggregate_initializer() {
    parsed!(
        "struct P { int x; int y; }; P pts[4] = {{0,0},{1,0},{1,1},{0,1}};",
        program,
        _interner,
        diags
    );
    assert!(!diags.has_errors());
    match &program.decls[1] {
        Decl::Array(a) => {
            assert_eq!(a.len, 4);
            let init = a.init.expect("initializer");
            match init.kind {
                ExprKind::Aggregate { elems } => assert_eq!(elems.len(), 4),
                _ => panic!("expected aggregate initializer"),
            }
        }
        other => panic!("expected array, got {:?}", other),
    }
}

#[test]
fn zero_length_array_is_rejected() {
    parsed!("int xs[0];", _program, _interner, diags);
    assert!(diags.has_errors());
}

#[test]
fn pointer_declaration_and_deref() {
    parsed!(
        "int g; int* p = &g; void f() { *p = 5; }",
        program,
        _interner,
        diags
    );
    assert!(!diags.has_errors());
    assert!(matches!(program.decls[1], Decl::Pointer(_)));
    let stmts = body_stmts(&program.decls[2]);
    match &stmts[0] {
        Stmt::Expr { expr, .. } => match expr.kind {
            ExprKind::Assign { target, .. } => {
                assert!(matches!(target.kind, ExprKind::Deref { .. }));
            }
            _ => panic!("expected assignment"),
        },
        _ => panic!("expected expression statement"),
    }
}

#[test]
fn message_declaration_and_operations() {
    parsed!(
        "message<int> Q; void t() { int v = Q.recv(timeout: 100); Q.send(v + 1); }",
        program,
        interner,
        diags
    );
    assert!(!diags.has_errors());
    match &program.decls[0] {
        Decl::Message(m) => assert_eq!(interner.resolve(m.name), "Q"),
        other => panic!("expected message, got {:?}", other),
    }
    let stmts = body_stmts(&program.decls[1]);
    match &stmts[0] {
        Stmt::Local {
            decl: LocalDecl::Var(v),
            ..
        } => {
            let init = v.init.expect("initializer");
            match init.kind {
                ExprKind::MessageRecv { timeout, .. } => assert!(timeout.is_some()),
                _ => panic!("expected recv"),
            }
        }
        _ => panic!("expected local declaration"),
    }
    match &stmts[1] {
        Stmt::Expr { expr, .. } => {
            assert!(matches!(expr.kind, ExprKind::MessageSend { .. }))
        }
        _ => panic!("expected send statement"),
    }
}

#[test]
fn recv_without_timeout_blocks() {
    parsed!(
        "message<int> Q; void t() { int v = Q.recv(); }",
        program,
        _interner,
        diags
    );
    assert!(!diags.has_errors());
    let stmts = body_stmts(&program.decls[1]);
    match &stmts[0] {
        Stmt::Local {
            decl: LocalDecl::Var(v),
            ..
        } => match v.init.unwrap().kind {
            ExprKind::MessageRecv { timeout, .. } => assert!(timeout.is_none()),
            _ => panic!("expected recv"),
        },
        _ => panic!("expected local declaration"),
    }
}

#[test]
fn import_statements_parse_first_class() {
    parsed!(
        "import \"drivers/led.rtmc\";\nvoid main() {}",
        program,
        interner,
        diags
    );
    assert!(!diags.has_errors());
    match &program.decls[0] {
        Decl::Import(i) => assert_eq!(interner.resolve(i.path), "drivers/led.rtmc"),
        other => panic!("expected import, got {:?}", other),
    }
}

#[test]
fn precedence_multiplication_binds_tighter_than_addition() {
    parsed!("int x = 1 + 2 * 3;", program, _interner, diags);
    assert!(!diags.has_errors());
    match &program.decls[0] {
        Decl::Var(v) => match v.init.unwrap().kind {
            ExprKind::Binary {
                op: crate::ast::BinaryOp::Add,
                right,
                ..
            } => {
                assert!(matches!(
                    right.kind,
                    ExprKind::Binary {
                        op: crate::ast::BinaryOp::Mul,
                        ..
                    }
                ));
            }
            _ => panic!("expected addition at the top"),
        },
        _ => panic!("expected var"),
    }
}

#[test]
fn logical_or_binds_loosest() {
    parsed!("bool b = true || false && true;", program, _interner, diags);
    assert!(!diags.has_errors());
    match &program.decls[0] {
        Decl::Var(v) => assert!(matches!(
            v.init.unwrap().kind,
            ExprKind::Binary {
                op: crate::ast::BinaryOp::LogicalOr,
                ..
            }
        )),
        _ => panic!("expected var"),
    }
}

#[test]
fn assignment_is_right_associative() {
    parsed!("void f() { int a; int b; a = b = 1; }", program, _interner, diags);
    assert!(!diags.has_errors());
    let stmts = body_stmts(&program.decls[0]);
    match &stmts[2] {
        Stmt::Expr { expr, .. } => match expr.kind {
            ExprKind::Assign { value, .. } => {
                assert!(matches!(value.kind, ExprKind::Assign { .. }));
            }
            _ => panic!("expected assignment"),
        },
        _ => panic!("expected expression statement"),
    }
}

#[test]
fn member_chain_and_index_parse() {
    parsed!(
        "struct P { int x; int y; }; P pts[4]; void f() { int z = pts[2].y; }",
        program,
        _interner,
        diags
    );
    assert!(!diags.has_errors());
    let stmts = body_stmts(&program.decls[2]);
    match &stmts[0] {
        Stmt::Local {
            decl: LocalDecl::Var(v),
            ..
        } => match v.init.unwrap().kind {
            ExprKind::Member { object, .. } => {
                assert!(matches!(object.kind, ExprKind::Index { .. }));
            }
            _ => panic!("expected member access"),
        },
        _ => panic!("expected local declaration"),
    }
}

#[test]
fn arrow_access_parses_through_pointer() {
    parsed!(
        "struct P { int x; int y; }; void f(P* p) { p->x = 1; }",
        program,
        _interner,
        diags
    );
    assert!(!diags.has_errors());
    let stmts = body_stmts(&program.decls[1]);
    match &stmts[0] {
        Stmt::Expr { expr, .. } => match expr.kind {
            ExprKind::Assign { target, .. } => match target.kind {
                ExprKind::Member {
                    through_pointer, ..
                } => assert!(through_pointer),
                _ => panic!("expected member"),
            },
            _ => panic!("expected assignment"),
        },
        _ => panic!("expected expression statement"),
    }
}

#[test]
fn cast_of_primitive_parses() {
    parsed!("void f() { float x = 1.5; int y = (int) x; }", program, _interner, diags);
    assert!(!diags.has_errors());
    let stmts = body_stmts(&program.decls[0]);
    match &stmts[1] {
        Stmt::Local {
            decl: LocalDecl::Var(v),
            ..
        } => assert!(matches!(v.init.unwrap().kind, ExprKind::Cast { .. })),
        _ => panic!("expected local declaration"),
    }
}

#[test]
fn parenthesized_product_is_not_a_cast() {
    parsed!("void f(int a, int b) { int c = (a) * b; }", program, _interner, diags);
    assert!(!diags.has_errors());
    let stmts = body_stmts(&program.decls[0]);
    match &stmts[0] {
        Stmt::Local {
            decl: LocalDecl::Var(v),
            ..
        } => assert!(matches!(
            v.init.unwrap().kind,
            ExprKind::Binary {
                op: crate::ast::BinaryOp::Mul,
                ..
            }
        )),
        _ => panic!("expected local declaration"),
    }
}

#[test]
fn intrinsic_calls_parse_with_arguments() {
    parsed!(
        "void main() { HW_GPIO_INIT(25, 1); RTOS_DELAY_MS(500); }",
        program,
        _interner,
        diags
    );
    assert!(!diags.has_errors());
    let stmts = body_stmts(&program.decls[0]);
    match &stmts[0] {
        Stmt::Expr { expr, .. } => match expr.kind {
            ExprKind::IntrinsicCall { which, args } => {
                assert_eq!(which, crate::intrinsics::Intrinsic::HwGpioInit);
                assert_eq!(args.len(), 2);
            }
            _ => panic!("expected intrinsic call"),
        },
        _ => panic!("expected expression statement"),
    }
}

#[test]
fn for_loop_with_declaration_init() {
    parsed!(
        "void f() { for (int i = 0; i < 4; i++) { } }",
        program,
        _interner,
        diags
    );
    assert!(!diags.has_errors());
    let stmts = body_stmts(&program.decls[0]);
    match &stmts[0] {
        Stmt::For {
            init,
            cond,
            update,
            ..
        } => {
            assert!(matches!(init, Some(Stmt::Local { .. })));
            assert!(cond.is_some());
            assert!(matches!(
                update.unwrap().kind,
                ExprKind::IncDec { prefix: false, .. }
            ));
        }
        _ => panic!("expected for loop"),
    }
}

#[test]
fn braces_may_open_on_the_next_line() {
    parsed!(
        "void main()\n{\n    if (true)\n    {\n        return;\n    }\n}",
        program,
        _interner,
        diags
    );
    assert!(!diags.has_errors());
    assert_eq!(program.decls.len(), 1);
}

#[test]
fn recovery_surfaces_multiple_errors() {
    parsed!(
        "int x = ;\nint y = 1;\nvoid f() { int z = ; }",
        program,
        _interner,
        diags
    );
    assert!(diags.has_errors());
    assert!(diags.error_count() >= 2, "expected both errors reported");
    // The healthy declaration in between still parses.
    assert!(program
        .decls
        .iter()
        .any(|d| matches!(d, Decl::Var(_))));
}

#[test]
fn parsing_is_deterministic_over_token_stream() {
    let src = "struct P { int x; int y; }; void f() { P p; p.x = 1; }";
    parsed!(src, first, _i1, d1);
    parsed!(src, second, _i2, d2);
    assert!(!d1.has_errors() && !d2.has_errors());
    assert_eq!(first.decls.len(), second.decls.len());
}
