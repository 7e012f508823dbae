pub mod generator;
pub mod op;
pub mod program;
pub mod reader;
pub mod writer;

pub use generator::{BytecodeGenerator, CodegenError, CompileMode};
pub use op::Opcode;
pub use program::{BytecodeProgram, Constant, FunctionInfo, GlobalInfo, Instruction};
pub use reader::{BytecodeReader, ReadError};
pub use writer::BytecodeWriter;
