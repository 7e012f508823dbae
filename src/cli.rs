//! Command-line front end.

use clap::Parser;
use std::path::PathBuf;

use crate::bytecode::generator::CompileMode;
use crate::bytecode::writer::BytecodeWriter;
use crate::compile::{compile_file, CompileOptions};
use crate::style::{bold, Color};

#[derive(Parser)]
#[command(name = "rtmcc")]
#[command(about = "RT-Micro-C compiler for RTOS targets", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Input RT-Micro-C source file
    pub input: PathBuf,

    /// Output bytecode file (.vmb)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Print the merged AST
    #[arg(long)]
    pub ast: bool,

    /// Print the main file's tokens
    #[arg(long)]
    pub tokens: bool,

    /// Skip optimization
    #[arg(long)]
    pub no_optimize: bool,

    /// Skip semantic enforcement
    #[arg(long)]
    pub no_semantic: bool,

    /// Compile in release mode (strip debug info)
    #[arg(long)]
    pub release: bool,

    /// Run the compiled program on the virtual machine
    #[arg(long)]
    pub run: bool,
}

/// Entry point; returns the process exit code. 0 on success, 1 for
/// compilation errors, 2 for I/O failures (missing input, missing import,
/// unwritable output).
pub fn run_cli() -> i32 {
    let cli = Cli::parse();
    run(&cli)
}

fn run(cli: &Cli) -> i32 {
    let options = CompileOptions {
        mode: if cli.release {
            CompileMode::Release
        } else {
            CompileMode::Debug
        },
        optimize: !cli.no_optimize,
        check: !cli.no_semantic,
        verbose: cli.verbose,
        dump_tokens: cli.tokens,
        dump_ast: cli.ast,
    };

    let compilation = match compile_file(&cli.input, &options) {
        Ok(compilation) => compilation,
        Err(message) => {
            eprintln!("{}: {}", bold(Color::Red, "error"), message);
            return 2;
        }
    };

    compilation.diagnostics.report(&compilation.sources);

    let program = match compilation.program {
        Some(program) => program,
        None => return compilation.diagnostics.exit_code(),
    };

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension("vmb"));
    if let Err(e) = BytecodeWriter::new().write(&program, &output) {
        eprintln!(
            "{}: cannot write '{}': {}",
            bold(Color::Red, "error"),
            output.display(),
            e
        );
        return 2;
    }

    if cli.verbose {
        println!("Compilation successful! Output: {}", output.display());
        let mode = if cli.release { "RELEASE" } else { "DEBUG" };
        println!("Mode: {}", mode);
    }

    if cli.run {
        eprintln!(
            "{}: --run needs the RT-Micro-C virtual machine; upload '{}' to the target instead",
            bold(Color::Red, "error"),
            output.display()
        );
        return 1;
    }

    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse_like_the_front_end_contract() {
        let cli = Cli::try_parse_from([
            "rtmcc",
            "blink.rtmc",
            "-o",
            "out.vmb",
            "-v",
            "--ast",
            "--tokens",
            "--no-optimize",
            "--no-semantic",
            "--release",
        ])
        .unwrap();
        assert_eq!(cli.input, PathBuf::from("blink.rtmc"));
        assert_eq!(cli.output, Some(PathBuf::from("out.vmb")));
        assert!(cli.verbose && cli.ast && cli.tokens);
        assert!(cli.no_optimize && cli.no_semantic && cli.release);
        assert!(!cli.run);
    }

    #[test]
    fn input_is_required() {
        assert!(Cli::try_parse_from(["rtmcc"]).is_err());
    }

    #[test]
    fn output_defaults_to_vmb_extension() {
        let cli = Cli::try_parse_from(["rtmcc", "demo/blink.rtmc"]).unwrap();
        let output = cli
            .output
            .clone()
            .unwrap_or_else(|| cli.input.with_extension("vmb"));
        assert_eq!(output, PathBuf::from("demo/blink.vmb"));
    }
}
