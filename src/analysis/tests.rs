use super::*;
use crate::error::Diagnostics;
use crate::intern::Interner;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::source::FileId;

fn analyze_src(src: &str) -> (Analysis, Diagnostics, Interner) {
    crate::ast_arena!(ctx);
    let mut interner = Interner::new();
    let mut diags = Diagnostics::new();
    let tokens = Lexer::new(src, FileId::default(), &mut interner).tokenize(&mut diags);
    let mut parser = Parser::new(tokens, ctx, &mut interner, &mut diags);
    let program = parser.parse_program();
    drop(parser);
    let analysis = SemanticAnalyzer::new(&interner).analyze(&program, &mut diags);
    (analysis, diags, interner)
}

fn errors_of(src: &str) -> Diagnostics {
    analyze_src(src).1
}

#[test]
fn valid_blink_program_passes() {
    let diags = errors_of(
        "void main() {\n\
            HW_GPIO_INIT(25, 1);\n\
            while (true) {\n\
                HW_GPIO_SET(25, 1);\n\
                RTOS_DELAY_MS(500);\n\
                HW_GPIO_SET(25, 0);\n\
                RTOS_DELAY_MS(500);\n\
            }\n\
        }",
    );
    assert!(!diags.has_errors());
}

#[test]
fn string_initializer_for_int_is_one_type_error() {
    let diags = errors_of("int x = \"hi\";");
    assert_eq!(diags.error_count(), 1);
    let diag = diags.iter().next().unwrap();
    assert_eq!(diag.pos.line, 1);
}

#[test]
fn undeclared_identifier_suggests_a_close_name() {
    let diags = errors_of("void f() { int led_pin = 25; led_pn = 1; }");
    assert!(diags.has_errors());
    let message = diags
        .iter()
        .map(|d| d.kind.message())
        .collect::<Vec<_>>()
        .join("\n");
    assert!(message.contains("did you mean 'led_pin'"), "{}", message);
}

#[test]
fn use_before_declare_in_body_is_an_error() {
    let diags = errors_of("void f() { x = 1; int x = 0; }");
    assert!(diags.has_errors());
}

#[test]
fn forward_function_reference_is_legal() {
    let diags = errors_of("void a() { b(); } void b() { }");
    assert!(!diags.has_errors());
}

#[test]
fn redeclaration_in_same_scope_is_an_error() {
    let diags = errors_of("void f() { int x = 1; int x = 2; }");
    assert!(diags.has_errors());
}

#[test]
fn shadowing_is_a_warning_not_an_error() {
    let diags = errors_of("int x = 1; void f() { int x = 2; }");
    assert!(!diags.has_errors());
    assert!(!diags.is_empty(), "expected a shadowing warning");
}

#[test]
fn assigning_a_const_is_rejected() {
    let diags = errors_of("const int LIMIT = 10; void f() { LIMIT = 11; }");
    assert!(diags.has_errors());
}

#[test]
fn int_to_float_converts_implicitly() {
    let diags = errors_of("void f() { float x = 3; }");
    assert!(!diags.has_errors());
}

#[test]
fn float_to_int_requires_a_cast() {
    let diags = errors_of("void f() { float x = 1.5; int y = x; }");
    assert!(diags.has_errors());
    let diags = errors_of("void f() { float x = 1.5; int y = (int) x; }");
    assert!(!diags.has_errors());
}

#[test]
fn char_and_int_mix_implicitly() {
    let diags = errors_of("void f() { char c = 'A'; int x = c; char d = x; }");
    assert!(!diags.has_errors());
}

#[test]
fn int_condition_warns_but_compiles() {
    let diags = errors_of("void f() { int x = 1; if (x) { } }");
    assert!(!diags.has_errors());
    assert!(!diags.is_empty(), "expected a coercion warning");
}

#[test]
fn float_condition_is_an_error() {
    let diags = errors_of("void f() { float x = 1.0; while (x) { } }");
    assert!(diags.has_errors());
}

#[test]
fn intrinsic_arity_is_checked() {
    let diags = errors_of("void f() { HW_GPIO_INIT(25); }");
    assert!(diags.has_errors());
}

#[test]
fn intrinsic_argument_types_are_checked() {
    let diags = errors_of("void f() { RTOS_DELAY_MS(\"soon\"); }");
    assert!(diags.has_errors());
}

#[test]
fn create_task_accepts_a_void_entry_function() {
    let diags = errors_of(
        "void worker() { RTOS_YIELD(); }\n\
         void main() { Task t = RTOS_CREATE_TASK(worker, \"worker\", 1024, 5, 0); RTOS_SUSPEND_TASK(t); }",
    );
    assert!(!diags.has_errors());
}

#[test]
fn create_task_rejects_an_entry_with_parameters() {
    let diags = errors_of(
        "void worker(int n) { }\n\
         void main() { RTOS_CREATE_TASK(worker, \"worker\", 1024, 5, 0); }",
    );
    assert!(diags.has_errors());
}

#[test]
fn message_send_must_match_element_type() {
    let diags = errors_of("message<int> Q; void f() { Q.send(1.5); }");
    assert!(diags.has_errors());
    let diags = errors_of("message<int> Q; void f() { Q.send(7); }");
    assert!(!diags.has_errors());
}

#[test]
fn message_recv_yields_the_element_type() {
    let diags =
        errors_of("message<int> Q; void f() { int v = Q.recv(timeout: 100); Q.send(v + 1); }");
    assert!(!diags.has_errors());
}

#[test]
fn recv_timeout_must_be_int() {
    let diags = errors_of("message<int> Q; void f() { int v = Q.recv(timeout: 1.5); }");
    assert!(diags.has_errors());
}

#[test]
fn message_element_must_be_primitive_or_struct() {
    let diags = errors_of("message<int*> Q;");
    assert!(diags.has_errors());
}

#[test]
fn user_function_calls_check_arity_and_types() {
    let diags = errors_of("int add(int a, int b) { return a + b; } void f() { add(1); }");
    assert!(diags.has_errors());
    let diags =
        errors_of("int add(int a, int b) { return a + b; } void f() { int s = add(1, 2); }");
    assert!(!diags.has_errors());
}

#[test]
fn return_type_is_enforced() {
    let diags = errors_of("int f() { return \"no\"; }");
    assert!(diags.has_errors());
    let diags = errors_of("void f() { return 1; }");
    assert!(diags.has_errors());
}

#[test]
fn break_outside_a_loop_is_an_error() {
    let diags = errors_of("void f() { break; }");
    assert!(diags.has_errors());
}

#[test]
fn unknown_struct_field_is_reported() {
    let diags = errors_of("struct P { int x; int y; }; void f() { P p; p.z = 1; }");
    assert!(diags.has_errors());
}

#[test]
fn arrow_requires_a_pointer() {
    let diags = errors_of("struct P { int x; int y; }; void f() { P p; p->x = 1; }");
    assert!(diags.has_errors());
    let diags = errors_of("struct P { int x; int y; }; void f(P* p) { p->x = 1; }");
    assert!(!diags.has_errors());
}

#[test]
fn aggregate_assignment_is_rejected() {
    let diags = errors_of(
        "struct P { int x; int y; }; void f() { P a; P b; a = b; }",
    );
    assert!(diags.has_errors());
}

#[test]
fn struct_recursion_without_pointer_is_an_error() {
    let diags = errors_of("struct A { B b; }; struct B { A a; };");
    assert!(diags.has_errors());
}

#[test]
fn struct_recursion_through_pointer_is_fine() {
    let diags = errors_of("struct Node { int value; Node* next; };");
    assert!(!diags.has_errors());
}

#[test]
fn analysis_exposes_layouts_and_queues() {
    let (analysis, diags, interner) = analyze_src(
        "struct P { int x; int y; };\n\
         message<int> Q;\n\
         P origin;\n\
         void f() { }",
    );
    assert!(!diags.has_errors());
    let p = interner.lookup("P").unwrap();
    let layout = analysis.layouts.get(p).unwrap();
    assert_eq!(layout.size, 8);
    let q = interner.lookup("Q").unwrap();
    assert_eq!(analysis.messages[&q].queue_id, 0);
    let origin = interner.lookup("origin").unwrap();
    assert!(analysis.global(origin).is_some());
    let f = interner.lookup("f").unwrap();
    assert!(analysis.functions.contains_key(&f));
}

#[test]
fn index_on_non_array_is_reported() {
    let diags = errors_of("void f() { int x = 0; int y = x[1]; }");
    assert!(diags.has_errors());
}

#[test]
fn address_of_parameter_is_rejected() {
    let diags = errors_of("void f(int a) { int* p = &a; }");
    assert!(diags.has_errors());
}
