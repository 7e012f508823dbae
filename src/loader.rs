//! Import resolution.
//!
//! Walks `import "relative/path";` declarations depth-first, left to right,
//! parsing each file exactly once per compilation. Canonicalized paths break
//! import cycles: a second visit is a no-op, so the merged program carries
//! every declaration exactly once, imported declarations hoisted ahead of
//! the importer's own in visitation order.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::arena_ctx::AstContext;
use crate::ast::{Decl, Program};
use crate::error::{DiagnosticKind, Diagnostics};
use crate::intern::Interner;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::source::{SourceMap, SourcePos};

/// Parses the root file and its transitive imports into one merged program.
/// An unreadable root is returned as an error (there is nowhere to attach a
/// diagnostic yet); unreadable imports become diagnostics at the `import`
/// statement.
pub fn parse_with_imports<'a>(
    root: &Path,
    ctx: AstContext<'a>,
    interner: &mut Interner,
    sources: &mut SourceMap,
    diags: &mut Diagnostics,
) -> Result<Program<'a>, String> {
    let mut loader = Loader {
        ctx,
        visited: HashSet::new(),
    };
    let mut decls = Vec::new();

    let text = fs::read_to_string(root)
        .map_err(|e| format!("cannot read '{}': {}", root.display(), e))?;
    let canonical = root
        .canonicalize()
        .map_err(|e| format!("cannot resolve '{}': {}", root.display(), e))?;
    loader.visited.insert(canonical);
    loader.load(root, text, interner, sources, diags, &mut decls);

    Ok(Program { decls })
}

struct Loader<'a> {
    ctx: AstContext<'a>,
    visited: HashSet<PathBuf>,
}

impl<'a> Loader<'a> {
    /// Parses one file and splices imports ahead of its own declarations.
    fn load(
        &mut self,
        path: &Path,
        text: String,
        interner: &mut Interner,
        sources: &mut SourceMap,
        diags: &mut Diagnostics,
        out: &mut Vec<Decl<'a>>,
    ) {
        let file = sources.add_file(path, text);
        let source = sources.text(file).to_string();
        let tokens = Lexer::new(&source, file, interner).tokenize(diags);
        let mut parser = Parser::new(tokens, self.ctx, interner, diags);
        let program = parser.parse_program();
        drop(parser);

        let mut own = Vec::new();
        for decl in program.decls {
            match decl {
                Decl::Import(import) => {
                    let relative = interner.resolve(import.path).to_string();
                    self.follow_import(path, &relative, import.pos, interner, sources, diags, out);
                }
                other => own.push(other),
            }
        }
        out.extend(own);
    }

    #[allow(clippy::too_many_arguments)]
    fn follow_import(
        &mut self,
        importer: &Path,
        relative: &str,
        pos: SourcePos,
        interner: &mut Interner,
        sources: &mut SourceMap,
        diags: &mut Diagnostics,
        out: &mut Vec<Decl<'a>>,
    ) {
        let base = importer.parent().unwrap_or_else(|| Path::new("."));
        let resolved = base.join(relative);
        let canonical = match resolved.canonicalize() {
            Ok(canonical) => canonical,
            Err(_) => {
                diags.error(
                    DiagnosticKind::ImportNotFound {
                        path: relative.to_string(),
                    },
                    pos,
                );
                return;
            }
        };
        // Already merged in this compilation; importing again is a no-op.
        if !self.visited.insert(canonical) {
            return;
        }
        let text = match fs::read_to_string(&resolved) {
            Ok(text) => text,
            Err(e) => {
                diags.error(
                    DiagnosticKind::ImportUnreadable {
                        path: relative.to_string(),
                        reason: e.to_string(),
                    },
                    pos,
                );
                return;
            }
        };
        self.load(&resolved, text, interner, sources, diags, out);
    }
}
