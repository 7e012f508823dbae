//! Semantic analysis.
//!
//! One forward pass over the merged program: top-level names are collected
//! before any body is checked (forward references within a file are legal),
//! record layouts are computed and memoized, then every function body is
//! type- and scope-checked. Diagnostics accumulate; the driver aborts before
//! codegen when the error set is non-empty.

pub mod layout;
pub mod registry;

pub use layout::{FieldDef, FieldLayout, LayoutTable, RecordDef, RecordLayout};
pub use registry::{Ty, TypeId, TypeTable};

use std::collections::HashMap;

use crate::ast::{
    ArrayDecl, ConstDecl, Decl, Expr, ExprKind, Literal, LocalDecl, PointerDecl, Primitive,
    Program, Stmt, TypeExpr, TypeExprKind, VarDecl,
};
use crate::ast::{BinaryOp, UnaryOp};
use crate::error::{DiagnosticKind, Diagnostics};
use crate::intern::{Interner, Symbol};
use crate::intrinsics::{Intrinsic, ParamKind};
use crate::scope::{DeclareOutcome, ScopeStack, Storage, SymbolEntry, SymbolKind};
use crate::source::SourcePos;

#[derive(Debug, Clone)]
pub struct FunctionSig {
    pub params: Vec<TypeId>,
    pub ret: TypeId,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, Copy)]
pub struct MessageInfo {
    pub elem: TypeId,
    pub queue_id: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct GlobalVar {
    pub name: Symbol,
    pub ty: TypeId,
    pub slot: u32,
    pub is_const: bool,
}

/// Everything the bytecode generator needs from analysis.
pub struct Analysis {
    pub types: TypeTable,
    pub layouts: LayoutTable,
    pub functions: HashMap<Symbol, FunctionSig>,
    pub messages: HashMap<Symbol, MessageInfo>,
    pub globals: Vec<GlobalVar>,
}

impl Analysis {
    pub fn global(&self, name: Symbol) -> Option<&GlobalVar> {
        self.globals.iter().find(|g| g.name == name)
    }
}

pub struct SemanticAnalyzer<'int> {
    types: TypeTable,
    layouts: LayoutTable,
    functions: HashMap<Symbol, FunctionSig>,
    messages: HashMap<Symbol, MessageInfo>,
    globals: Vec<GlobalVar>,
    scopes: ScopeStack,
    interner: &'int Interner,
    current_ret: TypeId,
    loop_depth: u32,
    local_slots: u32,
}

impl<'int> SemanticAnalyzer<'int> {
    pub fn new(interner: &'int Interner) -> Self {
        SemanticAnalyzer {
            types: TypeTable::new(),
            layouts: LayoutTable::new(),
            functions: HashMap::new(),
            messages: HashMap::new(),
            globals: Vec::new(),
            scopes: ScopeStack::new(),
            interner,
            current_ret: TypeId::VOID,
            loop_depth: 0,
            local_slots: 0,
        }
    }

    pub fn analyze(mut self, program: &Program<'_>, diags: &mut Diagnostics) -> Analysis {
        self.collect_records(program, diags);
        self.layouts.compute_all(&self.types, self.interner, diags);
        self.collect_values(program, diags);

        for decl in &program.decls {
            match decl {
                Decl::Function(func) => self.check_function(func, diags),
                Decl::Var(var) => self.check_global_var(var, diags),
                Decl::Array(arr) => self.check_global_array(arr, diags),
                Decl::Pointer(ptr) => self.check_global_pointer(ptr, diags),
                Decl::Const(c) => self.check_global_const(c, diags),
                _ => {}
            }
        }

        Analysis {
            types: self.types,
            layouts: self.layouts,
            functions: self.functions,
            messages: self.messages,
            globals: self.globals,
        }
    }

    fn name_of(&self, sym: Symbol) -> String {
        self.interner.resolve(sym).to_string()
    }

    fn type_name(&self, ty: TypeId) -> String {
        self.types.display(ty, self.interner)
    }

    // ------------------------------------------------------------------
    // Declaration collection
    // ------------------------------------------------------------------

    fn collect_records(&mut self, program: &Program<'_>, diags: &mut Diagnostics) {
        // Record names first so fields can reference records declared later.
        for decl in &program.decls {
            if let Decl::Struct(record) | Decl::Union(record) = decl {
                let is_union = matches!(decl, Decl::Union(_));
                if self.layouts.is_registered(record.name) {
                    diags.error(
                        DiagnosticKind::Redeclaration {
                            name: self.name_of(record.name),
                        },
                        record.pos,
                    );
                    continue;
                }
                self.layouts.register(
                    record.name,
                    RecordDef {
                        is_union,
                        fields: Vec::new(),
                        pos: record.pos,
                    },
                );
            }
        }
        // Second sweep resolves field types now that every record name is known.
        let mut resolved: Vec<(Symbol, RecordDef)> = Vec::new();
        for decl in &program.decls {
            if let Decl::Struct(record) | Decl::Union(record) = decl {
                let fields = record
                    .fields
                    .iter()
                    .map(|f| FieldDef {
                        name: f.name,
                        ty: self.resolve_type(&f.ty, diags),
                        bit_width: f.bit_width,
                        pos: f.pos,
                    })
                    .collect();
                resolved.push((
                    record.name,
                    RecordDef {
                        is_union: matches!(decl, Decl::Union(_)),
                        fields,
                        pos: record.pos,
                    },
                ));
            }
        }
        for (name, def) in resolved {
            self.layouts.replace(name, def);
        }
    }

    fn collect_values(&mut self, program: &Program<'_>, diags: &mut Diagnostics) {
        let mut queue_id = 0u32;
        for decl in &program.decls {
            match decl {
                Decl::Function(func) => {
                    let params = func
                        .params
                        .iter()
                        .map(|p| self.resolve_type(&p.ty, diags))
                        .collect();
                    let ret = self.resolve_type(&func.return_ty, diags);
                    if self.functions.contains_key(&func.name)
                        || self.scopes.lookup(func.name).is_some()
                    {
                        diags.error(
                            DiagnosticKind::Redeclaration {
                                name: self.name_of(func.name),
                            },
                            func.pos,
                        );
                        continue;
                    }
                    self.functions.insert(
                        func.name,
                        FunctionSig {
                            params,
                            ret,
                            pos: func.pos,
                        },
                    );
                }
                Decl::Message(msg) => {
                    let elem = self.resolve_type(&msg.elem_ty, diags);
                    if !self.valid_message_elem(elem) {
                        diags.error(
                            DiagnosticKind::MessageElementInvalid {
                                found: self.type_name(elem),
                            },
                            msg.pos,
                        );
                    }
                    let ty = self.types.intern(Ty::Message(elem));
                    if self.declare_global_entry(
                        msg.name,
                        SymbolKind::Message,
                        ty,
                        queue_id,
                        msg.pos,
                        diags,
                    ) {
                        self.messages.insert(
                            msg.name,
                            MessageInfo {
                                elem,
                                queue_id,
                            },
                        );
                        queue_id += 1;
                    }
                }
                Decl::Var(var) => {
                    let ty = self.resolve_type(&var.ty, diags);
                    self.declare_global_var(var.name, ty, var.pos, diags);
                }
                Decl::Array(arr) => {
                    let elem = self.resolve_type(&arr.elem_ty, diags);
                    let ty = self.types.intern(Ty::Array {
                        elem,
                        len: arr.len,
                    });
                    self.declare_global_var(arr.name, ty, arr.pos, diags);
                }
                Decl::Pointer(ptr) => {
                    let ty = self.resolve_type(&ptr.ty, diags);
                    self.declare_global_var(ptr.name, ty, ptr.pos, diags);
                }
                Decl::Const(c) => {
                    let inner = self.resolve_type(&c.ty, diags);
                    let ty = self.types.intern(Ty::Const(inner));
                    let slot = self.globals.len() as u32;
                    if self.declare_global_entry(
                        c.name,
                        SymbolKind::Const,
                        ty,
                        slot,
                        c.pos,
                        diags,
                    ) {
                        self.globals.push(GlobalVar {
                            name: c.name,
                            ty,
                            slot,
                            is_const: true,
                        });
                    }
                }
                Decl::Struct(_) | Decl::Union(_) | Decl::Import(_) => {}
            }
        }
    }

    fn declare_global_var(
        &mut self,
        name: Symbol,
        ty: TypeId,
        pos: SourcePos,
        diags: &mut Diagnostics,
    ) {
        if self.types.strip_const(ty) == TypeId::VOID {
            diags.error(
                DiagnosticKind::VoidVariable {
                    name: self.name_of(name),
                },
                pos,
            );
        }
        let slot = self.globals.len() as u32;
        if self.declare_global_entry(name, SymbolKind::Var, ty, slot, pos, diags) {
            self.globals.push(GlobalVar {
                name,
                ty,
                slot,
                is_const: false,
            });
        }
    }

    fn declare_global_entry(
        &mut self,
        name: Symbol,
        kind: SymbolKind,
        ty: TypeId,
        slot: u32,
        pos: SourcePos,
        diags: &mut Diagnostics,
    ) -> bool {
        if self.functions.contains_key(&name) {
            diags.error(
                DiagnosticKind::Redeclaration {
                    name: self.name_of(name),
                },
                pos,
            );
            return false;
        }
        match self.scopes.declare(SymbolEntry {
            name,
            kind,
            ty,
            storage: Storage::Global,
            slot,
            declared_at: pos,
        }) {
            DeclareOutcome::Ok | DeclareOutcome::Shadows(_) => true,
            DeclareOutcome::Duplicate(_) => {
                diags.error(
                    DiagnosticKind::Redeclaration {
                        name: self.name_of(name),
                    },
                    pos,
                );
                false
            }
        }
    }

    fn valid_message_elem(&self, elem: TypeId) -> bool {
        match self.types.get(self.types.strip_const(elem)) {
            Ty::Int | Ty::Float | Ty::Char | Ty::Bool | Ty::Error => true,
            Ty::Struct(name) => self
                .layouts
                .get(name)
                .map(|l| l.size > 0)
                .unwrap_or(false),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Type resolution
    // ------------------------------------------------------------------

    fn resolve_type(&mut self, ty: &TypeExpr<'_>, diags: &mut Diagnostics) -> TypeId {
        match ty.kind {
            TypeExprKind::Primitive(Primitive::Int) => TypeId::INT,
            TypeExprKind::Primitive(Primitive::Float) => TypeId::FLOAT,
            TypeExprKind::Primitive(Primitive::Char) => TypeId::CHAR,
            TypeExprKind::Primitive(Primitive::Bool) => TypeId::BOOL,
            TypeExprKind::Primitive(Primitive::Void) => TypeId::VOID,
            TypeExprKind::Primitive(Primitive::Task) => TypeId::TASK,
            TypeExprKind::Named(name) => match self.layouts.record_is_union(name) {
                Some(true) => self.types.intern(Ty::Union(name)),
                Some(false) => self.types.intern(Ty::Struct(name)),
                None => {
                    diags.error(
                        DiagnosticKind::UnknownType {
                            name: self.name_of(name),
                        },
                        ty.pos,
                    );
                    TypeId::ERROR
                }
            },
            TypeExprKind::Pointer(inner) => {
                let inner = self.resolve_type(inner, diags);
                self.types.intern(Ty::Ptr(inner))
            }
            TypeExprKind::Const(inner) => {
                let inner = self.resolve_type(inner, diags);
                self.types.intern(Ty::Const(inner))
            }
        }
    }

    // ------------------------------------------------------------------
    // Globals
    // ------------------------------------------------------------------

    fn check_global_var(&mut self, var: &VarDecl<'_>, diags: &mut Diagnostics) {
        let ty = self.resolve_type(&var.ty, diags);
        if let Some(init) = var.init {
            self.check_initializer(ty, init, diags);
        }
    }

    fn check_global_array(&mut self, arr: &ArrayDecl<'_>, diags: &mut Diagnostics) {
        let elem = self.resolve_type(&arr.elem_ty, diags);
        let ty = self.types.intern(Ty::Array {
            elem,
            len: arr.len,
        });
        if let Some(init) = arr.init {
            self.check_initializer(ty, init, diags);
        }
    }

    fn check_global_pointer(&mut self, ptr: &PointerDecl<'_>, diags: &mut Diagnostics) {
        let ty = self.resolve_type(&ptr.ty, diags);
        if let Some(init) = ptr.init {
            let found = self.check_expr(init, diags);
            self.require_assignable(ty, found, init.pos, diags);
        }
    }

    fn check_global_const(&mut self, c: &ConstDecl<'_>, diags: &mut Diagnostics) {
        let ty = self.resolve_type(&c.ty, diags);
        self.check_initializer(ty, c.init, diags);
    }

    // ------------------------------------------------------------------
    // Functions and statements
    // ------------------------------------------------------------------

    fn check_function(&mut self, func: &crate::ast::FunctionDecl<'_>, diags: &mut Diagnostics) {
        let sig = match self.functions.get(&func.name) {
            Some(sig) => sig.clone(),
            None => return, // redeclaration already reported
        };
        self.current_ret = sig.ret;
        self.local_slots = 0;
        self.scopes.push_scope();

        for (index, param) in func.params.iter().enumerate() {
            let ty = sig.params.get(index).copied().unwrap_or(TypeId::ERROR);
            if self.types.is_aggregate(ty) {
                diags.error(
                    DiagnosticKind::TypeMismatch {
                        expected: "scalar or pointer parameter".to_string(),
                        found: self.type_name(ty),
                    },
                    param.pos,
                );
            }
            match self.scopes.declare(SymbolEntry {
                name: param.name,
                kind: SymbolKind::Var,
                ty,
                storage: Storage::Parameter,
                slot: index as u32,
                declared_at: param.pos,
            }) {
                DeclareOutcome::Duplicate(_) => diags.error(
                    DiagnosticKind::Redeclaration {
                        name: self.name_of(param.name),
                    },
                    param.pos,
                ),
                DeclareOutcome::Shadows(_) => diags.warning(
                    DiagnosticKind::ShadowedBinding {
                        name: self.name_of(param.name),
                    },
                    param.pos,
                ),
                DeclareOutcome::Ok => {}
            }
        }

        self.check_stmt(func.body, diags);
        self.scopes.pop_scope();
    }

    fn check_stmt(&mut self, stmt: &Stmt<'_>, diags: &mut Diagnostics) {
        match stmt {
            Stmt::Block { stmts, .. } => {
                self.scopes.push_scope();
                for stmt in stmts.iter() {
                    self.check_stmt(stmt, diags);
                }
                self.scopes.pop_scope();
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                self.check_condition(cond, diags);
                self.check_stmt(then_branch, diags);
                if let Some(else_branch) = else_branch {
                    self.check_stmt(else_branch, diags);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.check_condition(cond, diags);
                self.loop_depth += 1;
                self.check_stmt(body, diags);
                self.loop_depth -= 1;
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
                ..
            } => {
                self.scopes.push_scope();
                if let Some(init) = init {
                    self.check_stmt(init, diags);
                }
                if let Some(cond) = cond {
                    self.check_condition(cond, diags);
                }
                if let Some(update) = update {
                    self.check_expr(update, diags);
                }
                self.loop_depth += 1;
                self.check_stmt(body, diags);
                self.loop_depth -= 1;
                self.scopes.pop_scope();
            }
            Stmt::Break { pos } => {
                if self.loop_depth == 0 {
                    diags.error(DiagnosticKind::BreakOutsideLoop, *pos);
                }
            }
            Stmt::Continue { pos } => {
                if self.loop_depth == 0 {
                    diags.error(DiagnosticKind::ContinueOutsideLoop, *pos);
                }
            }
            Stmt::Return { value, pos } => match (value, self.current_ret) {
                (None, ret) if ret == TypeId::VOID => {}
                (None, ret) => diags.error(
                    DiagnosticKind::MissingReturnValue {
                        expected: self.type_name(ret),
                    },
                    *pos,
                ),
                (Some(value), ret) if ret == TypeId::VOID => {
                    self.check_expr(value, diags);
                    diags.error(DiagnosticKind::ReturnValueInVoid, *pos);
                }
                (Some(value), ret) => {
                    let found = self.check_expr(value, diags);
                    if !self.assignable(ret, found) {
                        diags.error(
                            DiagnosticKind::ReturnTypeMismatch {
                                expected: self.type_name(ret),
                                found: self.type_name(found),
                            },
                            value.pos,
                        );
                    }
                }
            },
            Stmt::Expr { expr, .. } => {
                self.check_expr(expr, diags);
            }
            Stmt::Local { decl, .. } => self.check_local_decl(decl, diags),
        }
    }

    fn check_local_decl(&mut self, decl: &LocalDecl<'_>, diags: &mut Diagnostics) {
        let (name, ty, init, pos, kind) = match decl {
            LocalDecl::Var(var) => {
                let ty = self.resolve_type(&var.ty, diags);
                let kind = if self.types.is_const(ty) {
                    SymbolKind::Const
                } else {
                    SymbolKind::Var
                };
                (var.name, ty, var.init, var.pos, kind)
            }
            LocalDecl::Array(arr) => {
                let elem = self.resolve_type(&arr.elem_ty, diags);
                let ty = self.types.intern(Ty::Array {
                    elem,
                    len: arr.len,
                });
                (arr.name, ty, arr.init, arr.pos, SymbolKind::Var)
            }
            LocalDecl::Pointer(ptr) => {
                let ty = self.resolve_type(&ptr.ty, diags);
                (ptr.name, ty, ptr.init, ptr.pos, SymbolKind::Var)
            }
        };

        if self.types.strip_const(ty) == TypeId::VOID {
            diags.error(
                DiagnosticKind::VoidVariable {
                    name: self.name_of(name),
                },
                pos,
            );
        }
        if let Some(init) = init {
            self.check_initializer(ty, init, diags);
        }

        let slot = self.local_slots;
        self.local_slots += 1;
        match self.scopes.declare(SymbolEntry {
            name,
            kind,
            ty,
            storage: Storage::Local,
            slot,
            declared_at: pos,
        }) {
            DeclareOutcome::Duplicate(_) => diags.error(
                DiagnosticKind::Redeclaration {
                    name: self.name_of(name),
                },
                pos,
            ),
            DeclareOutcome::Shadows(_) => diags.warning(
                DiagnosticKind::ShadowedBinding {
                    name: self.name_of(name),
                },
                pos,
            ),
            DeclareOutcome::Ok => {}
        }
    }

    fn check_condition(&mut self, cond: &Expr<'_>, diags: &mut Diagnostics) {
        let ty = self.check_expr(cond, diags);
        let base = self.types.strip_const(ty);
        if base == TypeId::BOOL || base == TypeId::ERROR {
            return;
        }
        if base == TypeId::INT || base == TypeId::CHAR {
            // Accepted for backward compatibility; compared against zero.
            diags.warning(DiagnosticKind::IntCondition, cond.pos);
        } else {
            diags.error(
                DiagnosticKind::ConditionNotBool {
                    found: self.type_name(ty),
                },
                cond.pos,
            );
        }
    }

    // ------------------------------------------------------------------
    // Initializers
    // ------------------------------------------------------------------

    fn check_initializer(&mut self, ty: TypeId, init: &Expr<'_>, diags: &mut Diagnostics) {
        let base = self.types.strip_const(ty);
        match (self.types.get(base), &init.kind) {
            (Ty::Array { elem, len }, ExprKind::Aggregate { elems }) => {
                if elems.len() > len as usize {
                    diags.error(
                        DiagnosticKind::TooManyInitializers {
                            expected: len as usize,
                            found: elems.len(),
                        },
                        init.pos,
                    );
                }
                for elem_init in elems.iter() {
                    self.check_initializer(elem, elem_init, diags);
                }
            }
            (Ty::Struct(name), ExprKind::Aggregate { elems }) => {
                let field_tys: Vec<Option<TypeId>> = match self.layouts.get(name) {
                    Some(layout) => {
                        if elems.len() > layout.fields.len() {
                            diags.error(
                                DiagnosticKind::TooManyInitializers {
                                    expected: layout.fields.len(),
                                    found: elems.len(),
                                },
                                init.pos,
                            );
                        }
                        elems
                            .iter()
                            .enumerate()
                            .map(|(i, _)| layout.fields.get(i).map(|f| f.ty))
                            .collect()
                    }
                    None => elems.iter().map(|_| None).collect(),
                };
                for (elem_init, field_ty) in elems.iter().zip(field_tys) {
                    match field_ty {
                        Some(field_ty) => self.check_initializer(field_ty, elem_init, diags),
                        None => {
                            self.check_expr(elem_init, diags);
                        }
                    }
                }
            }
            (Ty::Union(_), ExprKind::Aggregate { .. }) => {
                diags.error(DiagnosticKind::UnionInitializer, init.pos);
            }
            (_, ExprKind::Aggregate { .. }) => {
                diags.error(DiagnosticKind::AggregateOutsideInitializer, init.pos);
            }
            _ => {
                let found = self.check_expr(init, diags);
                self.require_assignable(ty, found, init.pos, diags);
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn require_assignable(
        &mut self,
        expected: TypeId,
        found: TypeId,
        pos: SourcePos,
        diags: &mut Diagnostics,
    ) {
        if !self.assignable(expected, found) {
            diags.error(
                DiagnosticKind::TypeMismatch {
                    expected: self.type_name(expected),
                    found: self.type_name(found),
                },
                pos,
            );
        }
    }

    /// Implicit-conversion compatibility: `char↔int` and `int→float` convert
    /// silently, `float→int` needs a cast. Pointers match structurally.
    fn assignable(&self, expected: TypeId, found: TypeId) -> bool {
        let expected = self.types.strip_const(expected);
        let found = self.types.strip_const(found);
        if expected == found || expected == TypeId::ERROR || found == TypeId::ERROR {
            return true;
        }
        matches!(
            (self.types.get(expected), self.types.get(found)),
            (Ty::Int, Ty::Char)
                | (Ty::Char, Ty::Int)
                | (Ty::Float, Ty::Int)
                | (Ty::Float, Ty::Char)
        )
    }

    fn is_intlike(&self, ty: TypeId) -> bool {
        let base = self.types.strip_const(ty);
        base == TypeId::INT || base == TypeId::CHAR || base == TypeId::ERROR
    }

    fn is_numeric(&self, ty: TypeId) -> bool {
        self.is_intlike(ty) || self.types.strip_const(ty) == TypeId::FLOAT
    }

    pub(crate) fn check_expr(&mut self, expr: &Expr<'_>, diags: &mut Diagnostics) -> TypeId {
        match &expr.kind {
            ExprKind::Literal(lit) => match lit {
                Literal::Int(_) => TypeId::INT,
                Literal::Float(_) => TypeId::FLOAT,
                Literal::Char(_) => TypeId::CHAR,
                Literal::Bool(_) => TypeId::BOOL,
                Literal::Str(_) => TypeId::STR,
            },
            ExprKind::Identifier(name) => match self.scopes.lookup(*name) {
                Some(entry) => entry.ty,
                None => {
                    self.report_undeclared(*name, expr.pos, diags);
                    TypeId::ERROR
                }
            },
            ExprKind::Binary { op, left, right } => {
                self.check_binary(*op, left, right, expr.pos, diags)
            }
            ExprKind::Unary { op, operand } => {
                let ty = self.check_expr(operand, diags);
                match op {
                    UnaryOp::Neg | UnaryOp::Plus => {
                        if !self.is_numeric(ty) {
                            diags.error(
                                DiagnosticKind::InvalidOperands {
                                    op: if *op == UnaryOp::Neg { "-" } else { "+" },
                                    left: self.type_name(ty),
                                    right: String::new(),
                                },
                                expr.pos,
                            );
                            TypeId::ERROR
                        } else {
                            self.types.strip_const(ty)
                        }
                    }
                    UnaryOp::Not => {
                        let base = self.types.strip_const(ty);
                        if base != TypeId::BOOL && base != TypeId::ERROR {
                            if self.is_intlike(ty) {
                                diags.warning(DiagnosticKind::IntCondition, operand.pos);
                            } else {
                                diags.error(
                                    DiagnosticKind::ConditionNotBool {
                                        found: self.type_name(ty),
                                    },
                                    operand.pos,
                                );
                            }
                        }
                        TypeId::BOOL
                    }
                    UnaryOp::BitNot => {
                        if !self.is_intlike(ty) {
                            diags.error(
                                DiagnosticKind::InvalidOperands {
                                    op: "~",
                                    left: self.type_name(ty),
                                    right: String::new(),
                                },
                                expr.pos,
                            );
                        }
                        TypeId::INT
                    }
                }
            }
            ExprKind::Assign { target, value } => {
                self.check_assignment_target(target, diags);
                let target_ty = self.check_lvalue_type(target, diags);
                let value_ty = self.check_expr(value, diags);
                if self.types.is_aggregate(target_ty) {
                    diags.error(DiagnosticKind::AggregateAssignment, expr.pos);
                } else {
                    self.require_assignable(target_ty, value_ty, value.pos, diags);
                }
                TypeId::VOID
            }
            ExprKind::CompoundAssign { op, target, value } => {
                self.check_assignment_target(target, diags);
                let target_ty = self.check_lvalue_type(target, diags);
                let value_ty = self.check_expr(value, diags);
                if !self.is_numeric(target_ty) || !self.is_numeric(value_ty) {
                    diags.error(
                        DiagnosticKind::InvalidOperands {
                            op: op.symbol(),
                            left: self.type_name(target_ty),
                            right: self.type_name(value_ty),
                        },
                        expr.pos,
                    );
                } else {
                    self.require_assignable(target_ty, value_ty, value.pos, diags);
                }
                TypeId::VOID
            }
            ExprKind::IncDec { target, .. } => {
                // ++/-- are variable updates; member and index targets
                // spell the load and store out instead.
                if !matches!(target.kind, ExprKind::Identifier(_)) {
                    diags.error(DiagnosticKind::InvalidLvalue, target.pos);
                    return TypeId::ERROR;
                }
                self.check_assignment_target(target, diags);
                let ty = self.check_lvalue_type(target, diags);
                if !self.is_numeric(ty) {
                    diags.error(
                        DiagnosticKind::InvalidOperands {
                            op: "++",
                            left: self.type_name(ty),
                            right: String::new(),
                        },
                        expr.pos,
                    );
                    return TypeId::ERROR;
                }
                self.types.strip_const(ty)
            }
            ExprKind::Call { callee, args } => self.check_call(*callee, args, expr.pos, diags),
            ExprKind::IntrinsicCall { which, args } => {
                self.check_intrinsic(*which, args, expr.pos, diags)
            }
            ExprKind::MessageSend { queue, value } => {
                let value_ty = self.check_expr(value, diags);
                match self.messages.get(queue).copied() {
                    Some(info) => {
                        self.require_assignable(info.elem, value_ty, value.pos, diags);
                    }
                    None => diags.error(
                        DiagnosticKind::NotAQueue {
                            name: self.name_of(*queue),
                        },
                        expr.pos,
                    ),
                }
                TypeId::VOID
            }
            ExprKind::MessageRecv { queue, timeout } => {
                if let Some(timeout) = timeout {
                    let ty = self.check_expr(timeout, diags);
                    if !self.is_intlike(ty) {
                        diags.error(
                            DiagnosticKind::TypeMismatch {
                                expected: "int".to_string(),
                                found: self.type_name(ty),
                            },
                            timeout.pos,
                        );
                    }
                }
                match self.messages.get(queue).copied() {
                    Some(info) => info.elem,
                    None => {
                        diags.error(
                            DiagnosticKind::NotAQueue {
                                name: self.name_of(*queue),
                            },
                            expr.pos,
                        );
                        TypeId::ERROR
                    }
                }
            }
            ExprKind::Member {
                object,
                field,
                through_pointer,
            } => self.check_member(object, *field, *through_pointer, expr.pos, diags),
            ExprKind::Index { array, index } => {
                let array_ty = self.check_expr(array, diags);
                let index_ty = self.check_expr(index, diags);
                if !self.is_intlike(index_ty) {
                    diags.error(
                        DiagnosticKind::TypeMismatch {
                            expected: "int".to_string(),
                            found: self.type_name(index_ty),
                        },
                        index.pos,
                    );
                }
                match self.types.get(self.types.strip_const(array_ty)) {
                    Ty::Array { elem, .. } => elem,
                    Ty::Error => TypeId::ERROR,
                    _ => {
                        diags.error(
                            DiagnosticKind::NotAnArray {
                                found: self.type_name(array_ty),
                            },
                            array.pos,
                        );
                        TypeId::ERROR
                    }
                }
            }
            ExprKind::AddressOf { operand } => {
                match &operand.kind {
                    ExprKind::Identifier(name) => match self.scopes.lookup(*name).copied() {
                        Some(entry) => {
                            if entry.storage == Storage::Parameter {
                                diags.error(
                                    DiagnosticKind::CannotTakeAddress {
                                        what: format!("parameter '{}'", self.name_of(*name)),
                                    },
                                    expr.pos,
                                );
                            }
                            let inner = self.types.strip_const(entry.ty);
                            self.types.intern(Ty::Ptr(inner))
                        }
                        None => {
                            self.report_undeclared(*name, operand.pos, diags);
                            TypeId::ERROR
                        }
                    },
                    ExprKind::Member {
                        object,
                        field,
                        through_pointer,
                    } => {
                        let object_ty = self.check_expr(object, diags);
                        let (inner, is_bitfield) = self.resolve_member(
                            object_ty,
                            *field,
                            *through_pointer,
                            operand.pos,
                            diags,
                        );
                        if is_bitfield {
                            diags.error(
                                DiagnosticKind::CannotTakeAddress {
                                    what: format!(
                                        "bitfield '{}'",
                                        self.name_of(*field)
                                    ),
                                },
                                expr.pos,
                            );
                        }
                        let inner = self.types.strip_const(inner);
                        self.types.intern(Ty::Ptr(inner))
                    }
                    ExprKind::Index { .. } | ExprKind::Deref { .. } => {
                        let inner = self.check_expr(operand, diags);
                        let inner = self.types.strip_const(inner);
                        self.types.intern(Ty::Ptr(inner))
                    }
                    _ => {
                        diags.error(
                            DiagnosticKind::CannotTakeAddress {
                                what: "a temporary value".to_string(),
                            },
                            expr.pos,
                        );
                        TypeId::ERROR
                    }
                }
            }
            ExprKind::Deref { operand } => {
                let ty = self.check_expr(operand, diags);
                match self.types.get(self.types.strip_const(ty)) {
                    Ty::Ptr(inner) => inner,
                    Ty::Error => TypeId::ERROR,
                    _ => {
                        diags.error(
                            DiagnosticKind::DerefNonPointer {
                                found: self.type_name(ty),
                            },
                            expr.pos,
                        );
                        TypeId::ERROR
                    }
                }
            }
            ExprKind::Cast { ty, operand } => {
                let target = self.resolve_type(ty, diags);
                let source = self.check_expr(operand, diags);
                if !self.castable(target, source) {
                    diags.error(
                        DiagnosticKind::InvalidCast {
                            from: self.type_name(source),
                            to: self.type_name(target),
                        },
                        expr.pos,
                    );
                    return TypeId::ERROR;
                }
                self.types.strip_const(target)
            }
            ExprKind::Aggregate { .. } => {
                diags.error(DiagnosticKind::AggregateOutsideInitializer, expr.pos);
                TypeId::ERROR
            }
        }
    }

    fn castable(&self, target: TypeId, source: TypeId) -> bool {
        let target = self.types.strip_const(target);
        let source = self.types.strip_const(source);
        if target == TypeId::ERROR || source == TypeId::ERROR {
            return true;
        }
        let scalar = |ty: TypeId| {
            matches!(
                self.types.get(ty),
                Ty::Int | Ty::Float | Ty::Char | Ty::Bool
            )
        };
        if scalar(target) && scalar(source) {
            return true;
        }
        matches!(
            (self.types.get(target), self.types.get(source)),
            (Ty::Ptr(_), Ty::Ptr(_))
        )
    }

    fn check_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr<'_>,
        right: &Expr<'_>,
        pos: SourcePos,
        diags: &mut Diagnostics,
    ) -> TypeId {
        if op.is_logical() {
            self.check_condition(left, diags);
            self.check_condition(right, diags);
            return TypeId::BOOL;
        }
        let lt = self.check_expr(left, diags);
        let rt = self.check_expr(right, diags);
        let invalid = |analyzer: &Self, diags: &mut Diagnostics| {
            diags.error(
                DiagnosticKind::InvalidOperands {
                    op: op.symbol(),
                    left: analyzer.type_name(lt),
                    right: analyzer.type_name(rt),
                },
                pos,
            );
        };
        if op.is_comparison() {
            let lb = self.types.strip_const(lt);
            let rb = self.types.strip_const(rt);
            let both_bool = lb == TypeId::BOOL && rb == TypeId::BOOL;
            let eq_op = matches!(op, BinaryOp::Eq | BinaryOp::Ne);
            if (self.is_numeric(lt) && self.is_numeric(rt)) || (both_bool && eq_op) {
                return TypeId::BOOL;
            }
            if lb == TypeId::ERROR || rb == TypeId::ERROR {
                return TypeId::BOOL;
            }
            invalid(self, diags);
            return TypeId::BOOL;
        }
        if op.is_bitwise() || op == BinaryOp::Mod {
            if !self.is_intlike(lt) || !self.is_intlike(rt) {
                invalid(self, diags);
            }
            return TypeId::INT;
        }
        // Arithmetic: int/char promote to int, any float side makes it float.
        if !self.is_numeric(lt) || !self.is_numeric(rt) {
            invalid(self, diags);
            return TypeId::ERROR;
        }
        let lb = self.types.strip_const(lt);
        let rb = self.types.strip_const(rt);
        if lb == TypeId::FLOAT || rb == TypeId::FLOAT {
            TypeId::FLOAT
        } else {
            TypeId::INT
        }
    }

    fn check_member(
        &mut self,
        object: &Expr<'_>,
        field: Symbol,
        through_pointer: bool,
        pos: SourcePos,
        diags: &mut Diagnostics,
    ) -> TypeId {
        let object_ty = self.check_expr(object, diags);
        self.resolve_member(object_ty, field, through_pointer, pos, diags)
            .0
    }

    /// Field type plus bitfieldness for `object_ty{.,->}field`. The object
    /// is already checked; this only resolves the access itself.
    fn resolve_member(
        &mut self,
        object_ty: TypeId,
        field: Symbol,
        through_pointer: bool,
        pos: SourcePos,
        diags: &mut Diagnostics,
    ) -> (TypeId, bool) {
        let mut base = self.types.strip_const(object_ty);
        if through_pointer {
            base = match self.types.get(base) {
                Ty::Ptr(inner) => self.types.strip_const(inner),
                Ty::Error => return (TypeId::ERROR, false),
                _ => {
                    diags.error(
                        DiagnosticKind::ArrowOnNonPointer {
                            found: self.type_name(object_ty),
                        },
                        pos,
                    );
                    return (TypeId::ERROR, false);
                }
            };
        }
        let record = match self.types.get(base) {
            Ty::Struct(name) | Ty::Union(name) => name,
            Ty::Error => return (TypeId::ERROR, false),
            _ => {
                diags.error(
                    DiagnosticKind::MemberOfNonRecord {
                        found: self.type_name(object_ty),
                    },
                    pos,
                );
                return (TypeId::ERROR, false);
            }
        };
        match self.layouts.get(record).and_then(|l| l.field(field)) {
            Some(layout) => (layout.ty, layout.bits.is_some()),
            None => {
                diags.error(
                    DiagnosticKind::NoSuchField {
                        record: self.name_of(record),
                        field: self.name_of(field),
                    },
                    pos,
                );
                (TypeId::ERROR, false)
            }
        }
    }

    fn check_call(
        &mut self,
        callee: Symbol,
        args: &[&Expr<'_>],
        pos: SourcePos,
        diags: &mut Diagnostics,
    ) -> TypeId {
        let sig = match self.functions.get(&callee) {
            Some(sig) => sig.clone(),
            None => {
                if self.scopes.lookup(callee).is_some() {
                    diags.error(
                        DiagnosticKind::NotAFunction {
                            name: self.name_of(callee),
                        },
                        pos,
                    );
                } else {
                    self.report_undeclared(callee, pos, diags);
                }
                for arg in args {
                    self.check_expr(arg, diags);
                }
                return TypeId::ERROR;
            }
        };
        if args.len() != sig.params.len() {
            diags.error(
                DiagnosticKind::ArityMismatch {
                    name: self.name_of(callee),
                    expected: sig.params.len(),
                    found: args.len(),
                },
                pos,
            );
        }
        for (index, (arg, &param)) in args.iter().zip(sig.params.iter()).enumerate() {
            let found = self.check_expr(arg, diags);
            if !self.assignable(param, found) {
                diags.error(
                    DiagnosticKind::ArgumentMismatch {
                        name: self.name_of(callee),
                        index,
                        expected: self.type_name(param),
                        found: self.type_name(found),
                    },
                    arg.pos,
                );
            }
        }
        for arg in args.iter().skip(sig.params.len()) {
            self.check_expr(arg, diags);
        }
        sig.ret
    }

    fn check_intrinsic(
        &mut self,
        which: Intrinsic,
        args: &[&Expr<'_>],
        pos: SourcePos,
        diags: &mut Diagnostics,
    ) -> TypeId {
        let sig = which.signature();
        let arity_ok = if sig.variadic {
            args.len() >= sig.params.len()
        } else {
            args.len() == sig.params.len()
        };
        if !arity_ok {
            diags.error(
                DiagnosticKind::ArityMismatch {
                    name: which.name().to_string(),
                    expected: sig.params.len(),
                    found: args.len(),
                },
                pos,
            );
        }
        for (index, arg) in args.iter().enumerate() {
            match sig.params.get(index) {
                Some(ParamKind::TaskEntry) => self.check_task_entry(which, arg, diags),
                Some(&param) => {
                    let found = self.check_expr(arg, diags);
                    let expected = self.param_type(param);
                    if !self.assignable(expected, found) {
                        diags.error(
                            DiagnosticKind::ArgumentMismatch {
                                name: which.name().to_string(),
                                index,
                                expected: self.type_name(expected),
                                found: self.type_name(found),
                            },
                            arg.pos,
                        );
                    }
                }
                None => {
                    // Variadic tail: any scalar value goes.
                    let found = self.check_expr(arg, diags);
                    let base = self.types.strip_const(found);
                    let scalar = matches!(
                        self.types.get(base),
                        Ty::Int | Ty::Float | Ty::Char | Ty::Bool | Ty::Str | Ty::Error
                    );
                    if !scalar {
                        diags.error(
                            DiagnosticKind::ArgumentMismatch {
                                name: which.name().to_string(),
                                index,
                                expected: "scalar value".to_string(),
                                found: self.type_name(found),
                            },
                            arg.pos,
                        );
                    }
                }
            }
        }
        self.param_type(sig.ret)
    }

    fn param_type(&self, kind: ParamKind) -> TypeId {
        match kind {
            ParamKind::Int => TypeId::INT,
            ParamKind::Str => TypeId::STR,
            ParamKind::Void => TypeId::VOID,
            ParamKind::Task => TypeId::TASK,
            ParamKind::TaskEntry => TypeId::ERROR,
        }
    }

    fn check_task_entry(&mut self, which: Intrinsic, arg: &Expr<'_>, diags: &mut Diagnostics) {
        let name = match &arg.kind {
            ExprKind::Identifier(name) => *name,
            _ => {
                diags.error(
                    DiagnosticKind::TaskEntryMismatch {
                        name: which.name().to_string(),
                    },
                    arg.pos,
                );
                return;
            }
        };
        match self.functions.get(&name) {
            Some(sig) if sig.ret == TypeId::VOID && sig.params.is_empty() => {}
            Some(_) => diags.error(
                DiagnosticKind::TaskEntryMismatch {
                    name: self.name_of(name),
                },
                arg.pos,
            ),
            None => self.report_undeclared(name, arg.pos, diags),
        }
    }

    /// Lvalue checks: shape first, then constness of the root binding.
    fn check_assignment_target(&mut self, target: &Expr<'_>, diags: &mut Diagnostics) {
        match &target.kind {
            ExprKind::Identifier(name) => {
                if let Some(entry) = self.scopes.lookup(*name).copied() {
                    if entry.kind == SymbolKind::Const || self.types.is_const(entry.ty) {
                        diags.error(
                            DiagnosticKind::AssignToConst {
                                name: self.name_of(*name),
                            },
                            target.pos,
                        );
                    }
                }
            }
            ExprKind::Member { .. } | ExprKind::Index { .. } | ExprKind::Deref { .. } => {}
            _ => {
                diags.error(DiagnosticKind::InvalidLvalue, target.pos);
            }
        }
    }

    /// Type of an assignment target. Reuses the expression checker, which
    /// already resolves members, indexing and dereferences.
    fn check_lvalue_type(&mut self, target: &Expr<'_>, diags: &mut Diagnostics) -> TypeId {
        self.check_expr(target, diags)
    }

    fn report_undeclared(&mut self, name: Symbol, pos: SourcePos, diags: &mut Diagnostics) {
        let wanted = self.interner.resolve(name);
        let mut candidates: Vec<&str> = self
            .scopes
            .visible_names()
            .into_iter()
            .map(|sym| self.interner.resolve(sym))
            .collect();
        candidates.extend(self.functions.keys().map(|&sym| self.interner.resolve(sym)));
        let suggestion =
            crate::suggest::find_similar(wanted, candidates.into_iter(), 2).map(String::from);
        diags.error(
            DiagnosticKind::Undeclared {
                name: wanted.to_string(),
                suggestion,
            },
            pos,
        );
    }
}

#[cfg(test)]
mod tests;
