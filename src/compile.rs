//! Compilation pipeline.
//!
//! Source text → tokens → merged AST (post-import) → analyzed tables →
//! optimized AST → bytecode program. Each stage consumes the previous one;
//! a non-empty error set at a stage boundary stops the pipeline. Codegen
//! failures are internal errors and fail fast.

use std::path::Path;

use bumpalo::Bump;

use crate::analysis::SemanticAnalyzer;
use crate::arena_ctx::AstContext;
use crate::bytecode::generator::{BytecodeGenerator, CompileMode};
use crate::bytecode::program::BytecodeProgram;
use crate::error::{DiagnosticKind, Diagnostics};
use crate::intern::Interner;
use crate::lexer::Lexer;
use crate::loader;
use crate::optimize;
use crate::source::SourceMap;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub mode: CompileMode,
    /// Run the optimizer passes.
    pub optimize: bool,
    /// Enforce semantic diagnostics. When off, analysis still runs to build
    /// the tables codegen needs, but its findings are discarded.
    pub check: bool,
    pub verbose: bool,
    pub dump_tokens: bool,
    pub dump_ast: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            mode: CompileMode::Debug,
            optimize: true,
            check: true,
            verbose: false,
            dump_tokens: false,
            dump_ast: false,
        }
    }
}

/// Result of one compilation: the program when every stage passed, plus
/// everything needed to report diagnostics.
pub struct Compilation {
    pub program: Option<BytecodeProgram>,
    pub diagnostics: Diagnostics,
    pub sources: SourceMap,
}

impl Compilation {
    pub fn succeeded(&self) -> bool {
        self.program.is_some() && !self.diagnostics.has_errors()
    }
}

/// Compiles one root file and its imports. `Err` is reserved for an
/// unreadable root (exit code 2 territory); everything else lands in the
/// returned diagnostics.
pub fn compile_file(input: &Path, options: &CompileOptions) -> Result<Compilation, String> {
    let mut interner = Interner::new();
    let mut diags = Diagnostics::new();
    let mut sources = SourceMap::new();

    let bump = Bump::new();
    let ctx = AstContext::new(&bump);

    if options.verbose {
        println!("Stage 1: Lexical analysis and parsing (with imports)...");
    }
    let program = loader::parse_with_imports(input, ctx, &mut interner, &mut sources, &mut diags)?;

    if options.dump_tokens {
        println!("=== TOKENS (main file only) ===");
        let root = crate::source::FileId::from_index(0);
        let text = sources.text(root).to_string();
        let mut scratch = Diagnostics::new();
        let tokens = Lexer::new(&text, root, &mut interner).tokenize(&mut scratch);
        crate::debug::print_tokens(&tokens, &interner, &sources);
        println!();
    }
    if options.dump_ast {
        println!("=== AST ===");
        print!("{}", crate::debug::ast_to_string(&program, &interner));
        println!();
    }

    if diags.has_errors() {
        return Ok(Compilation {
            program: None,
            diagnostics: diags,
            sources,
        });
    }

    if options.verbose {
        println!("Stage 2: Semantic analysis...");
    }
    let mut analysis = if options.check {
        SemanticAnalyzer::new(&interner).analyze(&program, &mut diags)
    } else {
        // Tables are still required downstream; findings are dropped.
        let mut scratch = Diagnostics::new();
        SemanticAnalyzer::new(&interner).analyze(&program, &mut scratch)
    };
    if diags.has_errors() {
        return Ok(Compilation {
            program: None,
            diagnostics: diags,
            sources,
        });
    }

    let program = if options.optimize {
        if options.verbose {
            println!("Stage 3: Optimization...");
        }
        optimize::optimize(program, ctx)
    } else {
        program
    };

    if options.verbose {
        println!("Stage 4: Bytecode generation...");
    }
    let generated =
        BytecodeGenerator::new(&mut analysis, &interner, &sources, options.mode)
            .generate(&program);
    let program = match generated {
        Ok(program) => program,
        Err(e) => {
            diags.error(DiagnosticKind::Internal { detail: e.detail }, e.pos);
            return Ok(Compilation {
                program: None,
                diagnostics: diags,
                sources,
            });
        }
    };

    if options.verbose {
        println!("Generated {} instructions", program.instructions.len());
        if let Some(debug) = &program.debug {
            println!("Debug info: {} line entries", debug.lines.len());
        }
    }

    Ok(Compilation {
        program: Some(program),
        diagnostics: diags,
        sources,
    })
}
