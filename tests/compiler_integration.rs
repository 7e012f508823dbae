//! End-to-end pipeline tests: source files on disk through `compile_file`
//! to a `.vmb` container and back through the reader.

use std::fs;
use std::path::{Path, PathBuf};

use rtmcc::bytecode::generator::CompileMode;
use rtmcc::bytecode::reader::BytecodeReader;
use rtmcc::bytecode::writer::BytecodeWriter;
use rtmcc::bytecode::Opcode;
use rtmcc::compile::{compile_file, CompileOptions};
use tempfile::tempdir;

fn write_src(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

fn demo(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

#[test]
fn blink_compiles_and_round_trips_through_the_container() {
    let dir = tempdir().unwrap();
    let input = write_src(
        dir.path(),
        "blink.rtmc",
        "void main() {\n\
            HW_GPIO_INIT(25, 1);\n\
            while (true) {\n\
                HW_GPIO_SET(25, 1);\n\
                RTOS_DELAY_MS(500);\n\
                HW_GPIO_SET(25, 0);\n\
                RTOS_DELAY_MS(500);\n\
            }\n\
        }\n",
    );

    let compilation = compile_file(&input, &CompileOptions::default()).unwrap();
    assert!(compilation.succeeded(), "blink must compile");
    let program = compilation.program.unwrap();

    let out = dir.path().join("blink.vmb");
    BytecodeWriter::new().write(&program, &out).unwrap();
    let loaded = BytecodeReader::new().read(&out).unwrap();
    assert_eq!(loaded, program);

    let body = loaded.function_body("main").unwrap();
    let order: Vec<Opcode> = body
        .iter()
        .map(|i| i.opcode)
        .filter(|op| {
            matches!(
                op,
                Opcode::HwGpioInit | Opcode::HwGpioSet | Opcode::RtosDelayMs | Opcode::Jmp
            )
        })
        .collect();
    assert_eq!(
        order,
        vec![
            Opcode::HwGpioInit,
            Opcode::HwGpioSet,
            Opcode::RtosDelayMs,
            Opcode::HwGpioSet,
            Opcode::RtosDelayMs,
            Opcode::Jmp,
        ]
    );
}

#[test]
fn import_cycle_compiles_with_each_declaration_once() {
    let dir = tempdir().unwrap();
    write_src(
        dir.path(),
        "a.rtmc",
        "import \"b.rtmc\";\nint from_a;\nvoid main() { from_a = from_b; }\n",
    );
    write_src(dir.path(), "b.rtmc", "import \"a.rtmc\";\nint from_b;\n");

    let compilation =
        compile_file(&dir.path().join("a.rtmc"), &CompileOptions::default()).unwrap();
    assert!(compilation.succeeded(), "cycle must compile");
    let program = compilation.program.unwrap();
    let globals: Vec<&str> = program.globals.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(globals, vec!["from_b", "from_a"]);
}

#[test]
fn type_error_reports_and_produces_no_program() {
    let dir = tempdir().unwrap();
    let input = write_src(dir.path(), "bad.rtmc", "int x = \"hi\";\n");

    let compilation = compile_file(&input, &CompileOptions::default()).unwrap();
    assert!(compilation.program.is_none());
    assert_eq!(compilation.diagnostics.error_count(), 1);
    assert_eq!(compilation.diagnostics.exit_code(), 1);
    let diag = compilation.diagnostics.iter().next().unwrap();
    assert_eq!(diag.pos.line, 1);
}

#[test]
fn missing_import_exits_like_an_io_failure() {
    let dir = tempdir().unwrap();
    let input = write_src(
        dir.path(),
        "main.rtmc",
        "import \"gone.rtmc\";\nvoid main() { }\n",
    );

    let compilation = compile_file(&input, &CompileOptions::default()).unwrap();
    assert!(compilation.program.is_none());
    assert_eq!(compilation.diagnostics.exit_code(), 2);
}

#[test]
fn missing_input_is_a_hard_error() {
    let result = compile_file(
        Path::new("/no/such/file.rtmc"),
        &CompileOptions::default(),
    );
    assert!(result.is_err());
}

#[test]
fn debug_and_release_agree_on_executable_content() {
    let dir = tempdir().unwrap();
    let input = write_src(
        dir.path(),
        "msg.rtmc",
        "message<int> Q;\n\
         void t() { int v = Q.recv(timeout: 100); Q.send(v + 1); }\n\
         void main() { RTOS_CREATE_TASK(t, \"t\", 1024, 5, 0); }\n",
    );

    let debug = compile_file(&input, &CompileOptions::default())
        .unwrap()
        .program
        .unwrap();
    let release = compile_file(
        &input,
        &CompileOptions {
            mode: CompileMode::Release,
            ..CompileOptions::default()
        },
    )
    .unwrap()
    .program
    .unwrap();

    assert_eq!(debug.instructions, release.instructions);
    assert_eq!(debug.functions, release.functions);
    assert_eq!(debug.constants, release.constants);
    assert_eq!(debug.globals, release.globals);
    assert!(debug.debug.is_some() && release.debug.is_none());
}

#[test]
fn optimizer_can_be_disabled_without_changing_acceptance() {
    let dir = tempdir().unwrap();
    let input = write_src(
        dir.path(),
        "opt.rtmc",
        "void main() { int x = 2 + 3; if (x > 4) { RTOS_YIELD(); } }\n",
    );

    let optimized = compile_file(&input, &CompileOptions::default()).unwrap();
    let plain = compile_file(
        &input,
        &CompileOptions {
            optimize: false,
            ..CompileOptions::default()
        },
    )
    .unwrap();
    assert!(optimized.succeeded() && plain.succeeded());
    // Folding 2 + 3 saves at least the ADD.
    let optimized_len = optimized.program.unwrap().instructions.len();
    let plain_len = plain.program.unwrap().instructions.len();
    assert!(optimized_len < plain_len);
}

#[test]
fn struct_array_scenario_lays_out_and_addresses_correctly() {
    let dir = tempdir().unwrap();
    let input = write_src(
        dir.path(),
        "pts.rtmc",
        "struct P { int x; int y; };\n\
         P pts[4] = {{0,0},{1,0},{1,1},{0,1}};\n\
         void f() { int z = pts[2].y; }\n",
    );

    let compilation = compile_file(&input, &CompileOptions::default()).unwrap();
    assert!(compilation.succeeded());
    let program = compilation.program.unwrap();

    let allocs: Vec<u32> = program
        .instructions
        .iter()
        .filter(|i| i.opcode == Opcode::Alloc)
        .map(|i| i.operands[0])
        .collect();
    assert_eq!(allocs, vec![32]);

    let body = program.function_body("f").unwrap();
    let load = body
        .iter()
        .find(|i| i.opcode == Opcode::LoadField)
        .expect("folded field load");
    assert_eq!(load.operands, vec![20, 4]);
}

#[test]
fn bundled_demos_compile_in_both_modes() {
    for name in ["blink.rtmc", "sensor.rtmc", "registers.rtmc"] {
        for mode in [CompileMode::Debug, CompileMode::Release] {
            let compilation = compile_file(
                &demo(name),
                &CompileOptions {
                    mode,
                    ..CompileOptions::default()
                },
            )
            .unwrap();
            assert!(
                compilation.succeeded(),
                "{} must compile: {} errors",
                name,
                compilation.diagnostics.error_count()
            );
        }
    }
}

#[test]
fn every_jump_in_a_demo_lands_inside_the_stream() {
    let compilation = compile_file(&demo("sensor.rtmc"), &CompileOptions::default()).unwrap();
    let program = compilation.program.unwrap();
    let len = program.instructions.len() as u32;
    for instruction in &program.instructions {
        if matches!(
            instruction.opcode,
            Opcode::Jmp | Opcode::JmpIfFalse | Opcode::JmpIfTrue
        ) {
            assert!(instruction.operands[0] < len);
        }
    }
}

#[test]
fn skipping_semantic_checks_still_generates_code() {
    let dir = tempdir().unwrap();
    let input = write_src(
        dir.path(),
        "loose.rtmc",
        "void main() { int x = 1; if (x) { RTOS_YIELD(); } }\n",
    );
    let compilation = compile_file(
        &input,
        &CompileOptions {
            check: false,
            ..CompileOptions::default()
        },
    )
    .unwrap();
    assert!(compilation.succeeded());
    // With checks on, the integer condition is a warning, not an error.
    let checked = compile_file(&input, &CompileOptions::default()).unwrap();
    assert!(checked.succeeded());
    assert!(!checked.diagnostics.is_empty());
}
