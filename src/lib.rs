//! RT-Micro-C compiler.
//!
//! Ahead-of-time compiler from the RTMC systems language — C-like, with
//! first-class GPIO/ADC/UART/SPI/I2C/timer primitives, RTOS tasks and
//! semaphores, and typed inter-task message queues — to the compact `.vmb`
//! bytecode executed by a bare-metal virtual machine on microcontrollers.
//!
//! The pipeline runs strictly forward: source text → tokens → merged AST
//! (post-import) → analyzed tables → optimized AST → bytecode → container.

pub mod analysis;
pub mod arena_ctx;
pub mod ast;
pub mod bytecode;
pub mod cli;
pub mod compile;
pub mod debug;
pub mod error;
pub mod intern;
pub mod intrinsics;
pub mod lexer;
pub mod loader;
pub mod optimize;
pub mod parser;
pub mod scope;
pub mod source;
pub mod style;
pub mod suggest;
pub mod token;

pub use analysis::{Analysis, SemanticAnalyzer};
pub use arena_ctx::AstContext;
pub use bytecode::{BytecodeProgram, BytecodeReader, BytecodeWriter, Opcode};
pub use compile::{compile_file, CompileOptions, Compilation};
pub use error::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use intern::{Interner, Symbol};
pub use lexer::Lexer;
pub use parser::Parser;
pub use source::{FileId, SourceMap, SourcePos};
pub use token::{Token, TokenType};
