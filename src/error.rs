//! Diagnostics.
//!
//! Lex, parse and semantic errors are accumulated so one run can surface
//! several problems; codegen and I/O errors abort immediately. Every
//! diagnostic carries a source position and renders with the offending line,
//! a caret, and ANSI color.

use crate::source::{SourceMap, SourcePos};
use crate::style::{bold, paint, Color};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

/// Which stage produced a diagnostic. Import and I/O failures map to a
/// distinct process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lex,
    Parse,
    Import,
    Type,
    Scope,
    Layout,
    Codegen,
    Io,
}

#[derive(Debug, Clone)]
pub enum DiagnosticKind {
    // Lexical
    UnknownCharacter { ch: char },
    UnterminatedString,
    UnterminatedChar,
    UnterminatedComment,
    MalformedNumber { lexeme: String },

    // Parse
    UnexpectedToken { expected: String, found: String },
    ExpectedDeclaration { found: String },
    ExpectedExpression { found: String },
    InvalidArraySize,

    // Import
    ImportNotFound { path: String },
    ImportUnreadable { path: String, reason: String },

    // Type
    TypeMismatch { expected: String, found: String },
    InvalidCast { from: String, to: String },
    InvalidOperands { op: &'static str, left: String, right: String },
    ConditionNotBool { found: String },
    IntCondition,
    ArityMismatch { name: String, expected: usize, found: usize },
    ArgumentMismatch { name: String, index: usize, expected: String, found: String },
    NotAFunction { name: String },
    NotAQueue { name: String },
    MessageElementInvalid { found: String },
    ReturnTypeMismatch { expected: String, found: String },
    ReturnValueInVoid,
    MissingReturnValue { expected: String },
    VoidValue,
    InvalidLvalue,
    AggregateAssignment,
    VoidVariable { name: String },
    AggregateOutsideInitializer,
    TooManyInitializers { expected: usize, found: usize },
    UnionInitializer,
    CannotTakeAddress { what: String },
    DerefNonPointer { found: String },
    NotAnArray { found: String },
    NoSuchField { record: String, field: String },
    MemberOfNonRecord { found: String },
    ArrowOnNonPointer { found: String },
    TaskEntryMismatch { name: String },

    // Scope
    Undeclared { name: String, suggestion: Option<String> },
    Redeclaration { name: String },
    ShadowedBinding { name: String },
    AssignToConst { name: String },
    BreakOutsideLoop,
    ContinueOutsideLoop,
    UnknownType { name: String },

    // Layout
    RecursiveRecord { name: String },
    BitfieldTooWide { field: String, width: u32 },
    BitfieldBadStorage { field: String },
    ZeroSizeArray { name: String },

    // Fail-fast
    Internal { detail: String },
    Io { detail: String },
}

impl DiagnosticKind {
    pub fn stage(&self) -> Stage {
        use DiagnosticKind::*;
        match self {
            UnknownCharacter { .. } | UnterminatedString | UnterminatedChar
            | UnterminatedComment | MalformedNumber { .. } => Stage::Lex,
            UnexpectedToken { .. } | ExpectedDeclaration { .. } | ExpectedExpression { .. }
            | InvalidArraySize => Stage::Parse,
            ImportNotFound { .. } | ImportUnreadable { .. } => Stage::Import,
            TypeMismatch { .. } | InvalidCast { .. } | InvalidOperands { .. }
            | ConditionNotBool { .. } | IntCondition | ArityMismatch { .. }
            | ArgumentMismatch { .. } | NotAFunction { .. } | NotAQueue { .. }
            | MessageElementInvalid { .. } | ReturnTypeMismatch { .. } | ReturnValueInVoid
            | MissingReturnValue { .. } | VoidValue | InvalidLvalue | AggregateAssignment
            | VoidVariable { .. } | AggregateOutsideInitializer | TooManyInitializers { .. }
            | UnionInitializer
            | CannotTakeAddress { .. } | DerefNonPointer { .. } | NotAnArray { .. }
            | NoSuchField { .. } | MemberOfNonRecord { .. } | ArrowOnNonPointer { .. }
            | TaskEntryMismatch { .. } => Stage::Type,
            Undeclared { .. } | Redeclaration { .. } | ShadowedBinding { .. }
            | AssignToConst { .. } | BreakOutsideLoop | ContinueOutsideLoop
            | UnknownType { .. } => Stage::Scope,
            RecursiveRecord { .. } | BitfieldTooWide { .. } | BitfieldBadStorage { .. }
            | ZeroSizeArray { .. } => Stage::Layout,
            Internal { .. } => Stage::Codegen,
            Io { .. } => Stage::Io,
        }
    }

    pub fn message(&self) -> String {
        use DiagnosticKind::*;
        match self {
            UnknownCharacter { ch } => format!("unknown character '{}'", ch.escape_default()),
            UnterminatedString => "unterminated string literal".to_string(),
            UnterminatedChar => "unterminated character literal".to_string(),
            UnterminatedComment => "unterminated block comment".to_string(),
            MalformedNumber { lexeme } => format!("malformed numeric literal '{}'", lexeme),
            UnexpectedToken { expected, found } => {
                format!("expected {}, found {}", expected, found)
            }
            ExpectedDeclaration { found } => format!("expected a declaration, found {}", found),
            ExpectedExpression { found } => format!("expected an expression, found {}", found),
            InvalidArraySize => "array size must be a positive integer constant".to_string(),
            ImportNotFound { path } => format!("import file not found: '{}'", path),
            ImportUnreadable { path, reason } => {
                format!("cannot read import '{}': {}", path, reason)
            }
            TypeMismatch { expected, found } => {
                format!("type mismatch: expected '{}', found '{}'", expected, found)
            }
            InvalidCast { from, to } => format!("cannot cast '{}' to '{}'", from, to),
            InvalidOperands { op, left, right } => {
                format!("invalid operands to '{}': '{}' and '{}'", op, left, right)
            }
            ConditionNotBool { found } => {
                format!("condition must be 'bool', found '{}'", found)
            }
            IntCondition => {
                "integer condition is compared against zero; use a bool expression".to_string()
            }
            ArityMismatch { name, expected, found } => format!(
                "'{}' expects {} argument(s), found {}",
                name, expected, found
            ),
            ArgumentMismatch { name, index, expected, found } => format!(
                "argument {} of '{}' expects '{}', found '{}'",
                index + 1,
                name,
                expected,
                found
            ),
            NotAFunction { name } => format!("'{}' is not a function", name),
            NotAQueue { name } => format!("'{}' is not a message queue", name),
            MessageElementInvalid { found } => format!(
                "message element must be a primitive or struct type, found '{}'",
                found
            ),
            ReturnTypeMismatch { expected, found } => {
                format!("return type mismatch: expected '{}', found '{}'", expected, found)
            }
            ReturnValueInVoid => "void function cannot return a value".to_string(),
            MissingReturnValue { expected } => {
                format!("return without a value in function returning '{}'", expected)
            }
            VoidValue => "void expression used as a value".to_string(),
            InvalidLvalue => "expression is not assignable".to_string(),
            AggregateAssignment => {
                "struct and array values cannot be assigned as a whole".to_string()
            }
            VoidVariable { name } => format!("variable '{}' cannot have type 'void'", name),
            AggregateOutsideInitializer => {
                "brace literals are only allowed as initializers".to_string()
            }
            TooManyInitializers { expected, found } => {
                format!("initializer has {} element(s) but only {} fit", found, expected)
            }
            UnionInitializer => "unions cannot use brace initializers".to_string(),
            CannotTakeAddress { what } => format!("cannot take the address of {}", what),
            DerefNonPointer { found } => format!("cannot dereference non-pointer '{}'", found),
            NotAnArray { found } => format!("cannot index non-array '{}'", found),
            NoSuchField { record, field } => {
                format!("'{}' has no field named '{}'", record, field)
            }
            MemberOfNonRecord { found } => {
                format!("member access on non-struct value of type '{}'", found)
            }
            ArrowOnNonPointer { found } => {
                format!("'->' requires a struct pointer, found '{}'", found)
            }
            TaskEntryMismatch { name } => format!(
                "task entry '{}' must be a 'void' function with no parameters",
                name
            ),
            Undeclared { name, suggestion } => match suggestion {
                Some(s) => format!("undeclared identifier '{}'; did you mean '{}'?", name, s),
                None => format!("undeclared identifier '{}'", name),
            },
            Redeclaration { name } => format!("'{}' is already declared in this scope", name),
            ShadowedBinding { name } => format!("'{}' shadows an outer declaration", name),
            AssignToConst { name } => format!("cannot assign to constant '{}'", name),
            BreakOutsideLoop => "'break' outside of a loop".to_string(),
            ContinueOutsideLoop => "'continue' outside of a loop".to_string(),
            UnknownType { name } => format!("unknown struct or union type '{}'", name),
            RecursiveRecord { name } => format!(
                "'{}' contains itself; use a pointer to break the cycle",
                name
            ),
            BitfieldTooWide { field, width } => format!(
                "bitfield '{}' is {} bits wide but its storage unit holds 32",
                field, width
            ),
            BitfieldBadStorage { field } => {
                format!("bitfield '{}' must have 'int' storage type", field)
            }
            ZeroSizeArray { name } => format!("array '{}' must have at least one element", name),
            Internal { detail } => format!("internal compiler error: {}", detail),
            Io { detail } => format!("i/o error: {}", detail),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub pos: SourcePos,
}

impl Diagnostic {
    /// Full rendering: header, location, source line and caret.
    pub fn display_with_source(&self, sources: &SourceMap) -> String {
        let label = match self.severity {
            Severity::Warning => bold(Color::Yellow, "warning"),
            Severity::Error => bold(Color::Red, "error"),
        };
        let mut out = format!("{}: {}\n", label, self.kind.message());
        out.push_str(&format!(
            "  {} {}:{}:{}\n",
            paint(Color::Blue, "-->"),
            sources.name(self.pos.file),
            self.pos.line,
            self.pos.column
        ));

        if let Some(line) = sources.line_text(self.pos.file, self.pos.line) {
            let line_num = paint(Color::Blue, &format!("{:4}", self.pos.line));
            let pipe = paint(Color::Blue, "|");
            let caret_pad = " ".repeat(self.pos.column.saturating_sub(1) as usize);
            let caret = paint(Color::Red, "^");
            out.push_str(&format!(
                "{} {} {}\n     {} {}{}",
                line_num, pipe, line, pipe, caret_pad, caret
            ));
        }
        out
    }
}

/// Accumulating sink. Lex/parse/semantic stages push and keep going; the
/// driver checks [`Diagnostics::has_errors`] at each stage boundary.
#[derive(Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics { items: Vec::new() }
    }

    pub fn error(&mut self, kind: DiagnosticKind, pos: SourcePos) {
        self.items.push(Diagnostic {
            kind,
            severity: Severity::Error,
            pos,
        });
    }

    pub fn warning(&mut self, kind: DiagnosticKind, pos: SourcePos) {
        self.items.push(Diagnostic {
            kind,
            severity: Severity::Warning,
            pos,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Process exit code mirroring the worst recorded problem: 2 for
    /// import/I-O failures, 1 for any other error, 0 otherwise.
    pub fn exit_code(&self) -> i32 {
        let io = self.items.iter().any(|d| {
            d.severity == Severity::Error
                && matches!(d.kind.stage(), Stage::Import | Stage::Io)
        });
        if io {
            2
        } else if self.has_errors() {
            1
        } else {
            0
        }
    }

    pub fn report(&self, sources: &SourceMap) {
        for diag in &self.items {
            eprintln!("{}\n", diag.display_with_source(sources));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn map_with(text: &str) -> (SourceMap, SourcePos) {
        let mut sources = SourceMap::new();
        let file = sources.add_file(&PathBuf::from("test.rtmc"), text.to_string());
        (sources, SourcePos::new(file, 1, 9))
    }

    #[test]
    fn rendering_includes_line_and_caret() {
        let (sources, pos) = map_with("int x = \"hi\";");
        let diag = Diagnostic {
            kind: DiagnosticKind::TypeMismatch {
                expected: "int".into(),
                found: "string".into(),
            },
            severity: Severity::Error,
            pos,
        };
        let display = diag.display_with_source(&sources);
        assert!(display.contains("int x = \"hi\";"), "{}", display);
        assert!(display.contains("test.rtmc:1:9"), "{}", display);
        assert!(display.contains('^'), "{}", display);
        assert!(display.contains("\x1b["), "expected color codes: {}", display);
    }

    #[test]
    fn warnings_do_not_count_as_errors() {
        let mut diags = Diagnostics::new();
        diags.warning(DiagnosticKind::IntCondition, SourcePos::default());
        assert!(!diags.has_errors());
        assert_eq!(diags.exit_code(), 0);
    }

    #[test]
    fn import_errors_exit_with_two() {
        let mut diags = Diagnostics::new();
        diags.error(
            DiagnosticKind::ImportNotFound {
                path: "lib.rtmc".into(),
            },
            SourcePos::default(),
        );
        assert_eq!(diags.exit_code(), 2);
    }

    #[test]
    fn plain_errors_exit_with_one() {
        let mut diags = Diagnostics::new();
        diags.error(DiagnosticKind::InvalidLvalue, SourcePos::default());
        assert_eq!(diags.exit_code(), 1);
    }

    #[test]
    fn undeclared_with_suggestion_mentions_candidate() {
        let kind = DiagnosticKind::Undeclared {
            name: "led_pn".into(),
            suggestion: Some("led_pin".into()),
        };
        assert!(kind.message().contains("did you mean 'led_pin'"));
    }
}
