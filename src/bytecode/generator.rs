//! AST → bytecode lowering.
//!
//! A stack machine with a global slot pool, call frames indexed from zero
//! and a deduplicating constant pool. Aggregates (arrays, structs, unions)
//! live in VM-allocated blocks: the owning slot holds the block address and
//! member access goes through address arithmetic plus the field opcodes.
//!
//! Lowering is two-pass only for jumps: instructions are emitted with
//! pending label operands, and a final pass patches them to absolute
//! instruction indices. Any unresolved label or unlowerable node is an
//! internal error, reported fail-fast.

use std::collections::HashMap;

use crate::analysis::{Analysis, Ty, TypeId};
use crate::ast::{
    ArrayDecl, BinaryOp, Decl, Expr, ExprKind, IncDecOp, Literal, LocalDecl, PointerDecl,
    Primitive, Program, Stmt, TypeExpr, TypeExprKind, UnaryOp, VarDecl,
};
use crate::bytecode::op::Opcode;
use crate::bytecode::program::{
    BytecodeProgram, ConstantPool, DebugInfo, DebugLine, FunctionInfo, GlobalInfo, Instruction,
    TypeTag, FORMAT_VERSION,
};
use crate::intern::{Interner, Symbol};
use crate::intrinsics::Intrinsic;
use crate::source::{SourceMap, SourcePos};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileMode {
    Debug,
    Release,
}

/// Internal lowering failure; surfaces as an internal-compiler-error
/// diagnostic rather than a user-facing type error.
#[derive(Debug)]
pub struct CodegenError {
    pub detail: String,
    pub pos: SourcePos,
}

type GenResult<T> = Result<T, CodegenError>;

fn ice<T>(detail: impl Into<String>, pos: SourcePos) -> GenResult<T> {
    Err(CodegenError {
        detail: detail.into(),
        pos,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Residence {
    Local,
    Param,
    Global,
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    residence: Residence,
    slot: u32,
    ty: TypeId,
}

/// How to finish a load or store once `emit_place` ran. `Direct` bindings
/// never touch the stack for addressing; `Addressed` places have their base
/// address on the stack with a statically folded byte offset.
enum Place {
    Direct(Binding),
    Addressed {
        offset: u32,
        ty: TypeId,
        bits: Option<(u32, u32)>,
    },
}

#[derive(Clone, Copy)]
struct Label(usize);

struct LoopCtx {
    break_label: Label,
    continue_label: Label,
}

pub struct BytecodeGenerator<'a> {
    analysis: &'a mut Analysis,
    interner: &'a Interner,
    sources: &'a SourceMap,
    mode: CompileMode,

    instructions: Vec<Instruction>,
    pool: ConstantPool,
    labels: Vec<Option<u32>>,
    fixups: Vec<(usize, usize, Label)>,

    function_order: Vec<Symbol>,
    function_index: HashMap<Symbol, u32>,
    function_infos: Vec<FunctionInfo>,

    frames: Vec<HashMap<Symbol, Binding>>,
    local_count: u16,
    loops: Vec<LoopCtx>,

    debug_lines: Vec<DebugLine>,
    last_line: Option<(u16, u32)>,
}

impl<'a> BytecodeGenerator<'a> {
    pub fn new(
        analysis: &'a mut Analysis,
        interner: &'a Interner,
        sources: &'a SourceMap,
        mode: CompileMode,
    ) -> Self {
        BytecodeGenerator {
            analysis,
            interner,
            sources,
            mode,
            instructions: Vec::new(),
            pool: ConstantPool::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            function_order: Vec::new(),
            function_index: HashMap::new(),
            function_infos: Vec::new(),
            frames: Vec::new(),
            local_count: 0,
            loops: Vec::new(),
            debug_lines: Vec::new(),
            last_line: None,
        }
    }

    pub fn generate(mut self, program: &Program<'_>) -> GenResult<BytecodeProgram> {
        for decl in &program.decls {
            if let Decl::Function(f) = decl {
                let index = self.function_order.len() as u32;
                self.function_order.push(f.name);
                self.function_index.insert(f.name, index);
            }
        }

        self.emit_prelude(program)?;

        for decl in &program.decls {
            if let Decl::Function(f) = decl {
                self.emit_function(f)?;
            }
        }

        self.patch_labels()?;

        let mut globals: Vec<GlobalInfo> = self
            .analysis
            .globals
            .iter()
            .map(|g| GlobalInfo {
                name: self.interner.resolve(g.name).to_string(),
                type_tag: type_tag(self.analysis, g.ty),
            })
            .collect();
        let mut queues: Vec<(u32, Symbol)> = self
            .analysis
            .messages
            .iter()
            .map(|(&name, info)| (info.queue_id, name))
            .collect();
        queues.sort_by_key(|&(id, _)| id);
        for (_, name) in queues {
            globals.push(GlobalInfo {
                name: self.interner.resolve(name).to_string(),
                type_tag: TypeTag::Message,
            });
        }

        let debug = match self.mode {
            CompileMode::Debug => Some(DebugInfo {
                files: (0..self.sources.file_count())
                    .map(|i| {
                        self.sources
                            .name(crate::source::FileId::from_index(i))
                            .to_string()
                    })
                    .collect(),
                lines: self.debug_lines,
            }),
            CompileMode::Release => None,
        };

        Ok(BytecodeProgram {
            version: FORMAT_VERSION,
            constants: self.pool.into_entries(),
            globals,
            functions: self.function_infos,
            instructions: self.instructions,
            debug,
        })
    }

    // ------------------------------------------------------------------
    // Emission primitives
    // ------------------------------------------------------------------

    fn emit(&mut self, opcode: Opcode, operands: Vec<u32>) {
        self.instructions.push(Instruction::new(opcode, operands));
    }

    fn pc(&self) -> u32 {
        self.instructions.len() as u32
    }

    fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.pc());
    }

    fn emit_jump(&mut self, opcode: Opcode, label: Label) {
        let at = self.instructions.len();
        self.fixups.push((at, 0, label));
        self.emit(opcode, vec![u32::MAX]);
    }

    fn patch_labels(&mut self) -> GenResult<()> {
        let limit = self.instructions.len() as u32;
        for &(at, operand, label) in &self.fixups {
            let target = match self.labels[label.0] {
                Some(pc) => pc,
                None => {
                    return ice(
                        format!("unresolved jump label in instruction {}", at),
                        SourcePos::default(),
                    )
                }
            };
            if target >= limit {
                return ice(
                    format!("jump target {} past end of stream", target),
                    SourcePos::default(),
                );
            }
            self.instructions[at].operands[operand] = target;
        }
        Ok(())
    }

    fn note_pos(&mut self, pos: SourcePos) {
        if self.mode != CompileMode::Debug {
            return;
        }
        let key = (pos.file.as_u16(), pos.line);
        if self.last_line == Some(key) {
            return;
        }
        self.last_line = Some(key);
        self.debug_lines.push(DebugLine {
            pc: self.pc(),
            file: key.0,
            line: key.1,
        });
    }

    // ------------------------------------------------------------------
    // Prelude: globals, then the entry call
    // ------------------------------------------------------------------

    fn emit_prelude(&mut self, program: &Program<'_>) -> GenResult<()> {
        // Allocate every aggregate block first so initializers can take
        // addresses of globals declared later in the file.
        for decl in &program.decls {
            let (name, pos) = match decl {
                Decl::Var(v) => (v.name, v.pos),
                Decl::Array(a) => (a.name, a.pos),
                Decl::Pointer(p) => (p.name, p.pos),
                Decl::Const(c) => (c.name, c.pos),
                _ => continue,
            };
            let global = match self.analysis.global(name) {
                Some(g) => *g,
                None => continue, // duplicate decl; already diagnosed
            };
            if self.analysis.types.is_aggregate(global.ty) {
                self.note_pos(pos);
                let size = self
                    .analysis
                    .layouts
                    .size_of(&self.analysis.types, global.ty);
                self.emit(Opcode::Alloc, vec![size]);
                self.emit(Opcode::StoreGlobal, vec![global.slot]);
            }
        }

        for decl in &program.decls {
            match decl {
                Decl::Var(v) => self.emit_global_scalar_init(v.name, v.init, v.pos)?,
                Decl::Pointer(p) => self.emit_global_scalar_init(p.name, p.init, p.pos)?,
                Decl::Const(c) => self.emit_global_scalar_init(c.name, Some(c.init), c.pos)?,
                Decl::Array(a) => self.emit_global_aggregate_init(a.name, a.init, a.pos)?,
                _ => {}
            }
        }

        let main = self.interner.lookup("main").and_then(|sym| {
            self.function_index.get(&sym).copied()
        });
        if let Some(main_idx) = main {
            self.emit(Opcode::Call, vec![main_idx, 0]);
        }
        self.emit(Opcode::Halt, vec![]);
        Ok(())
    }

    fn emit_global_scalar_init(
        &mut self,
        name: Symbol,
        init: Option<&Expr<'_>>,
        pos: SourcePos,
    ) -> GenResult<()> {
        let global = match self.analysis.global(name) {
            Some(g) => *g,
            None => return Ok(()),
        };
        let init = match init {
            Some(init) => init,
            None => return Ok(()),
        };
        self.note_pos(pos);
        if self.analysis.types.is_aggregate(global.ty) {
            return self.emit_aggregate_init_stores(
                BasePlace::Global(global.slot),
                global.ty,
                init,
            );
        }
        let found = self.emit_expr(init)?;
        self.emit_conversion(found, global.ty);
        self.emit(Opcode::StoreGlobal, vec![global.slot]);
        Ok(())
    }

    fn emit_global_aggregate_init(
        &mut self,
        name: Symbol,
        init: Option<&Expr<'_>>,
        pos: SourcePos,
    ) -> GenResult<()> {
        let global = match self.analysis.global(name) {
            Some(g) => *g,
            None => return Ok(()),
        };
        if let Some(init) = init {
            self.note_pos(pos);
            self.emit_aggregate_init_stores(BasePlace::Global(global.slot), global.ty, init)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn emit_function(&mut self, func: &crate::ast::FunctionDecl<'_>) -> GenResult<()> {
        let sig = match self.analysis.functions.get(&func.name) {
            Some(sig) => sig.clone(),
            None => return ice("function missing from analysis", func.pos),
        };
        let entry_pc = self.pc();
        self.local_count = 0;
        self.frames.clear();
        self.frames.push(HashMap::new());
        for (index, param) in func.params.iter().enumerate() {
            let ty = sig.params.get(index).copied().unwrap_or(TypeId::ERROR);
            self.frames.last_mut().unwrap().insert(
                param.name,
                Binding {
                    residence: Residence::Param,
                    slot: index as u32,
                    ty,
                },
            );
        }

        self.note_pos(func.pos);
        self.emit_stmt(func.body, sig.ret)?;

        // A trailing loop or skip label still needs the epilogue: exit
        // labels bind just past the last emitted instruction.
        let end_pc = self.pc();
        let label_at_end = self.labels.iter().any(|&l| l == Some(end_pc));
        let falls_through = label_at_end
            || !matches!(
                self.instructions.last().map(|i| i.opcode),
                Some(Opcode::Ret) | Some(Opcode::RetValue)
            );
        if falls_through {
            if sig.ret == TypeId::VOID {
                self.emit(Opcode::Ret, vec![]);
            } else {
                self.emit(Opcode::PushInt, vec![0]);
                if self.base_ty(sig.ret) == TypeId::FLOAT {
                    self.emit(Opcode::IntToFloat, vec![]);
                }
                self.emit(Opcode::RetValue, vec![]);
            }
        }

        self.frames.clear();
        self.function_infos.push(FunctionInfo {
            name: self.interner.resolve(func.name).to_string(),
            entry_pc,
            local_count: self.local_count,
            param_count: func.params.len() as u16,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn emit_stmt(&mut self, stmt: &Stmt<'_>, ret: TypeId) -> GenResult<()> {
        match stmt {
            Stmt::Block { stmts, .. } => {
                self.frames.push(HashMap::new());
                for stmt in stmts.iter() {
                    self.emit_stmt(stmt, ret)?;
                }
                self.frames.pop();
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                pos,
            } => {
                self.note_pos(*pos);
                let skip_then = self.new_label();
                self.emit_condition(cond)?;
                self.emit_jump(Opcode::JmpIfFalse, skip_then);
                self.emit_stmt(then_branch, ret)?;
                match else_branch {
                    Some(else_branch) => {
                        let end = self.new_label();
                        self.emit_jump(Opcode::Jmp, end);
                        self.bind(skip_then);
                        self.emit_stmt(else_branch, ret)?;
                        self.bind(end);
                    }
                    None => self.bind(skip_then),
                }
            }
            Stmt::While { cond, body, pos } => {
                self.note_pos(*pos);
                let head = self.new_label();
                let end = self.new_label();
                self.bind(head);
                self.emit_condition(cond)?;
                self.emit_jump(Opcode::JmpIfFalse, end);
                self.loops.push(LoopCtx {
                    break_label: end,
                    continue_label: head,
                });
                self.emit_stmt(body, ret)?;
                self.loops.pop();
                self.emit_jump(Opcode::Jmp, head);
                self.bind(end);
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
                pos,
            } => {
                self.note_pos(*pos);
                self.frames.push(HashMap::new());
                if let Some(init) = init {
                    self.emit_stmt(init, ret)?;
                }
                let head = self.new_label();
                let cont = self.new_label();
                let end = self.new_label();
                self.bind(head);
                if let Some(cond) = cond {
                    self.emit_condition(cond)?;
                    self.emit_jump(Opcode::JmpIfFalse, end);
                }
                self.loops.push(LoopCtx {
                    break_label: end,
                    continue_label: cont,
                });
                self.emit_stmt(body, ret)?;
                self.loops.pop();
                self.bind(cont);
                if let Some(update) = update {
                    let ty = self.emit_expr(update)?;
                    if ty != TypeId::VOID {
                        self.emit(Opcode::Pop, vec![]);
                    }
                }
                self.emit_jump(Opcode::Jmp, head);
                self.bind(end);
                self.frames.pop();
            }
            Stmt::Break { pos } => {
                let label = match self.loops.last() {
                    Some(ctx) => ctx.break_label,
                    None => return ice("break outside loop reached codegen", *pos),
                };
                self.emit_jump(Opcode::Jmp, label);
            }
            Stmt::Continue { pos } => {
                let label = match self.loops.last() {
                    Some(ctx) => ctx.continue_label,
                    None => return ice("continue outside loop reached codegen", *pos),
                };
                self.emit_jump(Opcode::Jmp, label);
            }
            Stmt::Return { value, pos } => {
                self.note_pos(*pos);
                match value {
                    Some(value) => {
                        let found = self.emit_expr(value)?;
                        self.emit_conversion(found, ret);
                        self.emit(Opcode::RetValue, vec![]);
                    }
                    None => self.emit(Opcode::Ret, vec![]),
                }
            }
            Stmt::Expr { expr, pos } => {
                self.note_pos(*pos);
                let ty = self.emit_expr(expr)?;
                if ty != TypeId::VOID {
                    self.emit(Opcode::Pop, vec![]);
                }
            }
            Stmt::Local { decl, pos } => {
                self.note_pos(*pos);
                self.emit_local_decl(decl)?;
            }
        }
        Ok(())
    }

    fn emit_local_decl(&mut self, decl: &LocalDecl<'_>) -> GenResult<()> {
        match decl {
            LocalDecl::Var(VarDecl {
                name, ty, init, pos, ..
            }) => {
                let ty = self.resolve_type(ty);
                let slot = self.new_local(*name, ty);
                if self.analysis.types.is_aggregate(ty) {
                    self.emit_local_aggregate(slot, ty, *init, *pos)?;
                } else if let Some(init) = init {
                    let found = self.emit_expr(init)?;
                    self.emit_conversion(found, ty);
                    self.emit(Opcode::StoreLocal, vec![slot]);
                }
            }
            LocalDecl::Array(ArrayDecl {
                name,
                elem_ty,
                len,
                init,
                pos,
            }) => {
                let elem = self.resolve_type(elem_ty);
                let ty = self.analysis.types.intern(Ty::Array { elem, len: *len });
                let slot = self.new_local(*name, ty);
                self.emit_local_aggregate(slot, ty, *init, *pos)?;
            }
            LocalDecl::Pointer(PointerDecl { name, ty, init, .. }) => {
                let ty = self.resolve_type(ty);
                let slot = self.new_local(*name, ty);
                if let Some(init) = init {
                    let found = self.emit_expr(init)?;
                    self.emit_conversion(found, ty);
                    self.emit(Opcode::StoreLocal, vec![slot]);
                }
            }
        }
        Ok(())
    }

    fn emit_local_aggregate(
        &mut self,
        slot: u32,
        ty: TypeId,
        init: Option<&Expr<'_>>,
        _pos: SourcePos,
    ) -> GenResult<()> {
        match init {
            Some(init) if !matches!(init.kind, ExprKind::Aggregate { .. }) => {
                // Message receives and similar produce a fresh block; the
                // slot aliases it instead of allocating a second copy.
                let found = self.emit_expr(init)?;
                self.emit_conversion(found, ty);
                self.emit(Opcode::StoreLocal, vec![slot]);
            }
            init => {
                let size = self.analysis.layouts.size_of(&self.analysis.types, ty);
                self.emit(Opcode::Alloc, vec![size]);
                self.emit(Opcode::StoreLocal, vec![slot]);
                if let Some(init) = init {
                    self.emit_aggregate_init_stores(BasePlace::Local(slot), ty, init)?;
                }
            }
        }
        Ok(())
    }

    fn new_local(&mut self, name: Symbol, ty: TypeId) -> u32 {
        let slot = self.local_count as u32;
        self.local_count += 1;
        self.frames.last_mut().unwrap().insert(
            name,
            Binding {
                residence: Residence::Local,
                slot,
                ty,
            },
        );
        slot
    }

    // ------------------------------------------------------------------
    // Aggregate initializers: flatten to field stores
    // ------------------------------------------------------------------

    fn emit_aggregate_init_stores(
        &mut self,
        base: BasePlace,
        ty: TypeId,
        init: &Expr<'_>,
    ) -> GenResult<()> {
        let mut stores: Vec<FlatStore<'_>> = Vec::new();
        self.flatten_initializer(ty, 0, init, &mut stores)?;
        for store in stores {
            base.push_base(self);
            let found = self.emit_expr(store.value)?;
            self.emit_conversion(found, store.ty);
            match store.bits {
                Some((bit_offset, width)) => self.emit(
                    Opcode::StoreBitfield,
                    vec![store.offset, bit_offset, width],
                ),
                None => {
                    let size = self
                        .analysis
                        .layouts
                        .size_of(&self.analysis.types, store.ty);
                    self.emit(Opcode::StoreField, vec![store.offset, size]);
                }
            }
        }
        Ok(())
    }

    fn flatten_initializer<'e>(
        &mut self,
        ty: TypeId,
        offset: u32,
        init: &'e Expr<'e>,
        out: &mut Vec<FlatStore<'e>>,
    ) -> GenResult<()> {
        let base = self.base_ty(ty);
        match (self.analysis.types.get(base), &init.kind) {
            (Ty::Array { elem, .. }, ExprKind::Aggregate { elems }) => {
                let stride = self.analysis.layouts.stride_of(&self.analysis.types, elem);
                for (index, elem_init) in elems.iter().enumerate() {
                    self.flatten_initializer(
                        elem,
                        offset + index as u32 * stride,
                        *elem_init,
                        out,
                    )?;
                }
                Ok(())
            }
            (Ty::Struct(name), ExprKind::Aggregate { elems }) => {
                let fields: Vec<_> = match self.analysis.layouts.get(name) {
                    Some(layout) => layout.fields.clone(),
                    None => return ice("struct layout missing in initializer", init.pos),
                };
                for (field, elem_init) in fields.iter().zip(elems.iter()) {
                    match field.bits {
                        Some(bits) => out.push(FlatStore {
                            offset: offset + field.offset,
                            ty: TypeId::INT,
                            bits: Some(bits),
                            value: *elem_init,
                        }),
                        None => self.flatten_initializer(
                            field.ty,
                            offset + field.offset,
                            *elem_init,
                            out,
                        )?,
                    }
                }
                Ok(())
            }
            (_, ExprKind::Aggregate { .. }) => {
                ice("brace initializer for a scalar reached codegen", init.pos)
            }
            _ => {
                out.push(FlatStore {
                    offset,
                    ty,
                    bits: None,
                    value: init,
                });
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Emits code leaving exactly one value on the stack, except for
    /// void-typed expressions (assignments, void calls) which leave none.
    fn emit_expr(&mut self, expr: &Expr<'_>) -> GenResult<TypeId> {
        match &expr.kind {
            ExprKind::Literal(lit) => self.emit_literal(*lit),
            ExprKind::Identifier(name) => {
                let binding = self.lookup(*name, expr.pos)?;
                match binding.residence {
                    Residence::Local => self.emit(Opcode::LoadLocal, vec![binding.slot]),
                    Residence::Param => self.emit(Opcode::LoadParam, vec![binding.slot]),
                    Residence::Global => self.emit(Opcode::LoadGlobal, vec![binding.slot]),
                }
                Ok(binding.ty)
            }
            ExprKind::Binary { op, left, right } => self.emit_binary(*op, left, right, expr.pos),
            ExprKind::Unary { op, operand } => {
                let ty = match op {
                    UnaryOp::Neg => {
                        let ty = self.emit_expr(operand)?;
                        if self.base_ty(ty) == TypeId::FLOAT {
                            self.emit(Opcode::NegFloat, vec![]);
                            TypeId::FLOAT
                        } else {
                            self.emit(Opcode::NegInt, vec![]);
                            TypeId::INT
                        }
                    }
                    UnaryOp::Plus => self.emit_expr(operand)?,
                    UnaryOp::Not => {
                        self.emit_condition(operand)?;
                        self.emit(Opcode::NotBool, vec![]);
                        TypeId::BOOL
                    }
                    UnaryOp::BitNot => {
                        self.emit_expr(operand)?;
                        self.emit(Opcode::BitNot, vec![]);
                        TypeId::INT
                    }
                };
                Ok(ty)
            }
            ExprKind::Assign { target, value } => {
                self.emit_assignment(target, value, expr.pos)?;
                Ok(TypeId::VOID)
            }
            ExprKind::CompoundAssign { op, target, value } => {
                self.emit_compound_assignment(*op, target, value, expr.pos)?;
                Ok(TypeId::VOID)
            }
            ExprKind::IncDec { op, prefix, target } => {
                self.emit_incdec(*op, *prefix, target, expr.pos)
            }
            ExprKind::Call { callee, args } => self.emit_call(*callee, args, expr.pos),
            ExprKind::IntrinsicCall { which, args } => {
                self.emit_intrinsic(*which, args, expr.pos)
            }
            ExprKind::MessageSend { queue, value } => {
                let info = self.queue_info(*queue, expr.pos)?;
                let found = self.emit_expr(value)?;
                self.emit_conversion(found, info.0);
                self.emit(Opcode::MsgSend, vec![info.1]);
                Ok(TypeId::VOID)
            }
            ExprKind::MessageRecv { queue, timeout } => {
                let (elem, qid) = self.queue_info(*queue, expr.pos)?;
                match timeout {
                    None => self.emit(Opcode::MsgRecv, vec![qid]),
                    Some(timeout) => match timeout.kind {
                        // Constant timeouts ride in the operand;
                        // anything else is evaluated to the stack.
                        ExprKind::Literal(Literal::Int(ms)) => {
                            self.emit(Opcode::MsgRecvTimeout, vec![qid, ms as i32 as u32]);
                        }
                        _ => {
                            let found = self.emit_expr(timeout)?;
                            self.emit_conversion(found, TypeId::INT);
                            self.emit(Opcode::MsgRecvTimeout, vec![qid]);
                        }
                    },
                }
                Ok(elem)
            }
            ExprKind::Index { array, index } => {
                if let Some(elem) = self.scalar_dynamic_index(array, index)? {
                    let stride =
                        self.analysis.layouts.stride_of(&self.analysis.types, elem);
                    self.emit_index_base(array)?;
                    let found = self.emit_expr(index)?;
                    self.emit_conversion(found, TypeId::INT);
                    self.emit(Opcode::LoadIndex, vec![stride]);
                    return Ok(elem);
                }
                let place = self.emit_place(expr)?;
                self.emit_load_from(place)
            }
            ExprKind::Deref { operand } => {
                let ptr_ty = self.emit_expr(operand)?;
                let pointee = match self.analysis.types.get(self.base_ty(ptr_ty)) {
                    Ty::Ptr(inner) => inner,
                    _ => return ice("dereference of non-pointer reached codegen", expr.pos),
                };
                if self.analysis.types.is_aggregate(pointee) {
                    // The pointer value already is the block address.
                    return Ok(pointee);
                }
                let size = self.analysis.layouts.size_of(&self.analysis.types, pointee);
                self.emit(Opcode::LoadDeref, vec![size]);
                Ok(pointee)
            }
            ExprKind::Member { .. } => {
                let place = self.emit_place(expr)?;
                self.emit_load_from(place)
            }
            ExprKind::AddressOf { operand } => self.emit_address_of(operand, expr.pos),
            ExprKind::Cast { ty, operand } => {
                let target = self.resolve_type(ty);
                let source = self.emit_expr(operand)?;
                let source_base = self.base_ty(source);
                let target_base = self.base_ty(target);
                if source_base == TypeId::FLOAT && target_base != TypeId::FLOAT {
                    self.emit(Opcode::FloatToInt, vec![]);
                } else if source_base != TypeId::FLOAT && target_base == TypeId::FLOAT {
                    self.emit(Opcode::IntToFloat, vec![]);
                }
                Ok(target)
            }
            ExprKind::Aggregate { .. } => {
                ice("aggregate literal outside an initializer", expr.pos)
            }
        }
    }

    fn emit_literal(&mut self, lit: Literal) -> GenResult<TypeId> {
        match lit {
            Literal::Int(value) => {
                let idx = self.pool.intern_int(value as i32);
                self.emit(Opcode::PushConst, vec![idx]);
                Ok(TypeId::INT)
            }
            Literal::Float(value) => {
                let idx = self.pool.intern_float(value as f32);
                self.emit(Opcode::PushConst, vec![idx]);
                Ok(TypeId::FLOAT)
            }
            Literal::Char(value) => {
                let idx = self.pool.intern_int(value as i32);
                self.emit(Opcode::PushConst, vec![idx]);
                Ok(TypeId::CHAR)
            }
            Literal::Bool(value) => {
                self.emit(Opcode::PushBool, vec![value as u32]);
                Ok(TypeId::BOOL)
            }
            Literal::Str(sym) => {
                let idx = self.pool.intern_str(self.interner.resolve(sym));
                self.emit(Opcode::PushConst, vec![idx]);
                Ok(TypeId::STR)
            }
        }
    }

    fn emit_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr<'_>,
        right: &Expr<'_>,
        pos: SourcePos,
    ) -> GenResult<TypeId> {
        if op.is_logical() {
            return self.emit_short_circuit(op, left, right);
        }

        if op.is_bitwise() || op == BinaryOp::Mod {
            self.emit_expr(left)?;
            self.emit_expr(right)?;
            let opcode = match op {
                BinaryOp::BitAnd => Opcode::BitAnd,
                BinaryOp::BitOr => Opcode::BitOr,
                BinaryOp::BitXor => Opcode::BitXor,
                BinaryOp::Shl => Opcode::Shl,
                BinaryOp::Shr => Opcode::Shr,
                BinaryOp::Mod => Opcode::ModInt,
                _ => unreachable!(),
            };
            self.emit(opcode, vec![]);
            return Ok(TypeId::INT);
        }

        // Arithmetic and comparisons: stamp int or float from operand types.
        let lt = self.expr_ty(left)?;
        let rt = self.expr_ty(right)?;
        let float = self.base_ty(lt) == TypeId::FLOAT || self.base_ty(rt) == TypeId::FLOAT;

        let emitted = self.emit_expr(left)?;
        if float && self.base_ty(emitted) != TypeId::FLOAT {
            self.emit(Opcode::IntToFloat, vec![]);
        }
        let emitted = self.emit_expr(right)?;
        if float && self.base_ty(emitted) != TypeId::FLOAT {
            self.emit(Opcode::IntToFloat, vec![]);
        }

        let opcode = match (op, float) {
            (BinaryOp::Add, false) => Opcode::AddInt,
            (BinaryOp::Sub, false) => Opcode::SubInt,
            (BinaryOp::Mul, false) => Opcode::MulInt,
            (BinaryOp::Div, false) => Opcode::DivInt,
            (BinaryOp::Add, true) => Opcode::AddFloat,
            (BinaryOp::Sub, true) => Opcode::SubFloat,
            (BinaryOp::Mul, true) => Opcode::MulFloat,
            (BinaryOp::Div, true) => Opcode::DivFloat,
            (BinaryOp::Eq, false) => Opcode::EqInt,
            (BinaryOp::Ne, false) => Opcode::NeInt,
            (BinaryOp::Lt, false) => Opcode::LtInt,
            (BinaryOp::Le, false) => Opcode::LeInt,
            (BinaryOp::Gt, false) => Opcode::GtInt,
            (BinaryOp::Ge, false) => Opcode::GeInt,
            (BinaryOp::Eq, true) => Opcode::EqFloat,
            (BinaryOp::Ne, true) => Opcode::NeFloat,
            (BinaryOp::Lt, true) => Opcode::LtFloat,
            (BinaryOp::Le, true) => Opcode::LeFloat,
            (BinaryOp::Gt, true) => Opcode::GtFloat,
            (BinaryOp::Ge, true) => Opcode::GeFloat,
            _ => return ice("unexpected binary operator", pos),
        };
        self.emit(opcode, vec![]);
        Ok(if op.is_comparison() {
            TypeId::BOOL
        } else if float {
            TypeId::FLOAT
        } else {
            TypeId::INT
        })
    }

    /// `a && b` / `a || b` with jump-based evaluation; the right side never
    /// runs when the left side decides the result.
    fn emit_short_circuit(
        &mut self,
        op: BinaryOp,
        left: &Expr<'_>,
        right: &Expr<'_>,
    ) -> GenResult<TypeId> {
        let decided = self.new_label();
        let end = self.new_label();
        self.emit_condition(left)?;
        match op {
            BinaryOp::LogicalAnd => self.emit_jump(Opcode::JmpIfFalse, decided),
            BinaryOp::LogicalOr => self.emit_jump(Opcode::JmpIfTrue, decided),
            _ => unreachable!(),
        }
        self.emit_condition(right)?;
        self.emit_jump(Opcode::Jmp, end);
        self.bind(decided);
        let sentinel = matches!(op, BinaryOp::LogicalOr) as u32;
        self.emit(Opcode::PushBool, vec![sentinel]);
        self.bind(end);
        Ok(TypeId::BOOL)
    }

    /// Emits a boolean on the stack; integer conditions compare against
    /// zero for backward compatibility.
    fn emit_condition(&mut self, cond: &Expr<'_>) -> GenResult<()> {
        let ty = self.emit_expr(cond)?;
        let base = self.base_ty(ty);
        if base == TypeId::INT || base == TypeId::CHAR {
            self.emit(Opcode::PushInt, vec![0]);
            self.emit(Opcode::NeInt, vec![]);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Assignment and places
    // ------------------------------------------------------------------

    fn emit_assignment(
        &mut self,
        target: &Expr<'_>,
        value: &Expr<'_>,
        pos: SourcePos,
    ) -> GenResult<()> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                let binding = self.lookup(*name, pos)?;
                let found = self.emit_expr(value)?;
                self.emit_conversion(found, binding.ty);
                let opcode = match binding.residence {
                    Residence::Local => Opcode::StoreLocal,
                    Residence::Param => Opcode::StoreParam,
                    Residence::Global => Opcode::StoreGlobal,
                };
                self.emit(opcode, vec![binding.slot]);
                Ok(())
            }
            ExprKind::Index { array, index } => {
                if let Some(elem) = self.scalar_dynamic_index(array, index)? {
                    let stride =
                        self.analysis.layouts.stride_of(&self.analysis.types, elem);
                    self.emit_index_base(array)?;
                    let found = self.emit_expr(index)?;
                    self.emit_conversion(found, TypeId::INT);
                    let found = self.emit_expr(value)?;
                    self.emit_conversion(found, elem);
                    self.emit(Opcode::StoreIndex, vec![stride]);
                    return Ok(());
                }
                self.emit_addressed_store(target, value, pos)
            }
            ExprKind::Deref { operand } => {
                let ptr_ty = self.emit_expr(operand)?;
                let pointee = match self.analysis.types.get(self.base_ty(ptr_ty)) {
                    Ty::Ptr(inner) => inner,
                    _ => return ice("dereference of non-pointer reached codegen", pos),
                };
                let found = self.emit_expr(value)?;
                self.emit_conversion(found, pointee);
                let size = self.analysis.layouts.size_of(&self.analysis.types, pointee);
                self.emit(Opcode::StoreDeref, vec![size]);
                Ok(())
            }
            _ => self.emit_addressed_store(target, value, pos),
        }
    }

    fn emit_addressed_store(
        &mut self,
        target: &Expr<'_>,
        value: &Expr<'_>,
        pos: SourcePos,
    ) -> GenResult<()> {
        let place = self.emit_place(target)?;
        match place {
            Place::Addressed { offset, ty, bits } => {
                let found = self.emit_expr(value)?;
                self.emit_conversion(found, ty);
                match bits {
                    Some((bit_offset, width)) => {
                        self.emit(Opcode::StoreBitfield, vec![offset, bit_offset, width])
                    }
                    None => {
                        let size = self.analysis.layouts.size_of(&self.analysis.types, ty);
                        self.emit(Opcode::StoreField, vec![offset, size]);
                    }
                }
                Ok(())
            }
            Place::Direct(_) => ice("direct place for compound target", pos),
        }
    }

    /// `Some(elem)` when `array[index]` has a runtime index and a scalar
    /// element, the shape the dedicated index opcodes cover.
    fn scalar_dynamic_index(
        &mut self,
        array: &Expr<'_>,
        index: &Expr<'_>,
    ) -> GenResult<Option<TypeId>> {
        if matches!(index.kind, ExprKind::Literal(Literal::Int(_))) {
            return Ok(None);
        }
        let array_ty = self.expr_ty(array)?;
        let elem = match self.analysis.types.get(self.base_ty(array_ty)) {
            Ty::Array { elem, .. } => elem,
            _ => return Ok(None),
        };
        if self.analysis.types.is_aggregate(elem) {
            return Ok(None);
        }
        Ok(Some(elem))
    }

    /// Pushes the base address of an array lvalue, folding any static
    /// offset accumulated on the way.
    fn emit_index_base(&mut self, array: &Expr<'_>) -> GenResult<()> {
        match self.emit_place(array)? {
            Place::Addressed {
                offset,
                bits: None,
                ..
            } => {
                if offset != 0 {
                    self.emit(Opcode::PushInt, vec![offset]);
                    self.emit(Opcode::AddInt, vec![]);
                }
                Ok(())
            }
            _ => ice("array base is not addressable", array.pos),
        }
    }

    fn emit_compound_assignment(
        &mut self,
        op: BinaryOp,
        target: &Expr<'_>,
        value: &Expr<'_>,
        pos: SourcePos,
    ) -> GenResult<()> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                let binding = self.lookup(*name, pos)?;
                let (load, store) = match binding.residence {
                    Residence::Local => (Opcode::LoadLocal, Opcode::StoreLocal),
                    Residence::Param => (Opcode::LoadParam, Opcode::StoreParam),
                    Residence::Global => (Opcode::LoadGlobal, Opcode::StoreGlobal),
                };
                self.emit(load, vec![binding.slot]);
                self.emit_arith_rhs(op, binding.ty, value)?;
                self.emit(store, vec![binding.slot]);
                Ok(())
            }
            _ => {
                let place = self.emit_place(target)?;
                match place {
                    Place::Addressed { offset, ty, bits } => {
                        self.emit(Opcode::Dup, vec![]);
                        match bits {
                            Some((bit_offset, width)) => {
                                self.emit(
                                    Opcode::LoadBitfield,
                                    vec![offset, bit_offset, width],
                                );
                                self.emit_arith_rhs(op, TypeId::INT, value)?;
                                self.emit(
                                    Opcode::StoreBitfield,
                                    vec![offset, bit_offset, width],
                                );
                            }
                            None => {
                                let size =
                                    self.analysis.layouts.size_of(&self.analysis.types, ty);
                                self.emit(Opcode::LoadField, vec![offset, size]);
                                self.emit_arith_rhs(op, ty, value)?;
                                self.emit(Opcode::StoreField, vec![offset, size]);
                            }
                        }
                        Ok(())
                    }
                    Place::Direct(_) => ice("direct place for compound target", pos),
                }
            }
        }
    }

    /// With the current value of the target on the stack, emits the RHS and
    /// the operation, leaving the updated value.
    fn emit_arith_rhs(
        &mut self,
        op: BinaryOp,
        target_ty: TypeId,
        value: &Expr<'_>,
    ) -> GenResult<()> {
        let float = self.base_ty(target_ty) == TypeId::FLOAT;
        let found = self.emit_expr(value)?;
        if float && self.base_ty(found) != TypeId::FLOAT {
            self.emit(Opcode::IntToFloat, vec![]);
        }
        let opcode = match (op, float) {
            (BinaryOp::Add, false) => Opcode::AddInt,
            (BinaryOp::Sub, false) => Opcode::SubInt,
            (BinaryOp::Mul, false) => Opcode::MulInt,
            (BinaryOp::Div, false) => Opcode::DivInt,
            (BinaryOp::Add, true) => Opcode::AddFloat,
            (BinaryOp::Sub, true) => Opcode::SubFloat,
            (BinaryOp::Mul, true) => Opcode::MulFloat,
            (BinaryOp::Div, true) => Opcode::DivFloat,
            _ => return ice("unexpected compound operator", value.pos),
        };
        self.emit(opcode, vec![]);
        Ok(())
    }

    fn emit_incdec(
        &mut self,
        op: IncDecOp,
        prefix: bool,
        target: &Expr<'_>,
        pos: SourcePos,
    ) -> GenResult<TypeId> {
        let name = match target.kind {
            ExprKind::Identifier(name) => name,
            _ => return ice("increment target must be a variable", pos),
        };
        let binding = self.lookup(name, pos)?;
        let (load, store) = match binding.residence {
            Residence::Local => (Opcode::LoadLocal, Opcode::StoreLocal),
            Residence::Param => (Opcode::LoadParam, Opcode::StoreParam),
            Residence::Global => (Opcode::LoadGlobal, Opcode::StoreGlobal),
        };
        let float = self.base_ty(binding.ty) == TypeId::FLOAT;
        let step = match op {
            IncDecOp::Increment => Opcode::AddInt,
            IncDecOp::Decrement => Opcode::SubInt,
        };
        let step = if float {
            match op {
                IncDecOp::Increment => Opcode::AddFloat,
                IncDecOp::Decrement => Opcode::SubFloat,
            }
        } else {
            step
        };

        if !prefix {
            self.emit(load, vec![binding.slot]);
        }
        self.emit(load, vec![binding.slot]);
        self.emit(Opcode::PushInt, vec![1]);
        if float {
            self.emit(Opcode::IntToFloat, vec![]);
        }
        self.emit(step, vec![]);
        if prefix {
            self.emit(Opcode::Dup, vec![]);
        }
        self.emit(store, vec![binding.slot]);
        Ok(self.base_ty(binding.ty))
    }

    /// Lowers an lvalue to a [`Place`]. For `Addressed` places the base
    /// address is on the stack afterwards; constant member and index
    /// offsets fold into the static offset operand.
    fn emit_place(&mut self, expr: &Expr<'_>) -> GenResult<Place> {
        match &expr.kind {
            ExprKind::Identifier(name) => {
                let binding = self.lookup(*name, expr.pos)?;
                if self.analysis.types.is_aggregate(binding.ty) {
                    // The slot holds the block address.
                    match binding.residence {
                        Residence::Local => self.emit(Opcode::LoadLocal, vec![binding.slot]),
                        Residence::Param => self.emit(Opcode::LoadParam, vec![binding.slot]),
                        Residence::Global => self.emit(Opcode::LoadGlobal, vec![binding.slot]),
                    }
                    Ok(Place::Addressed {
                        offset: 0,
                        ty: binding.ty,
                        bits: None,
                    })
                } else {
                    Ok(Place::Direct(binding))
                }
            }
            ExprKind::Member {
                object,
                field,
                through_pointer,
            } => {
                let (object_offset, object_ty) = if *through_pointer {
                    let ptr_ty = self.emit_expr(object)?;
                    let pointee = match self.analysis.types.get(self.base_ty(ptr_ty)) {
                        Ty::Ptr(inner) => inner,
                        _ => return ice("arrow through non-pointer reached codegen", expr.pos),
                    };
                    (0u32, pointee)
                } else {
                    match self.emit_place(object)? {
                        Place::Addressed {
                            offset,
                            ty,
                            bits: None,
                        } => (offset, ty),
                        _ => return ice("member base is not addressable", expr.pos),
                    }
                };
                let record = match self.analysis.types.get(self.base_ty(object_ty)) {
                    Ty::Struct(name) | Ty::Union(name) => name,
                    _ => return ice("member access on non-record reached codegen", expr.pos),
                };
                let field_layout = match self
                    .analysis
                    .layouts
                    .get(record)
                    .and_then(|l| l.field(*field))
                {
                    Some(f) => *f,
                    None => return ice("unknown field reached codegen", expr.pos),
                };
                Ok(Place::Addressed {
                    offset: object_offset + field_layout.offset,
                    ty: field_layout.ty,
                    bits: field_layout.bits,
                })
            }
            ExprKind::Index { array, index } => {
                let (base_offset, array_ty) = match self.emit_place(array)? {
                    Place::Addressed {
                        offset,
                        ty,
                        bits: None,
                    } => (offset, ty),
                    _ => return ice("index base is not addressable", expr.pos),
                };
                let elem = match self.analysis.types.get(self.base_ty(array_ty)) {
                    Ty::Array { elem, .. } => elem,
                    _ => return ice("indexing a non-array reached codegen", expr.pos),
                };
                let stride = self.analysis.layouts.stride_of(&self.analysis.types, elem);
                if let ExprKind::Literal(Literal::Int(constant)) = index.kind {
                    // Both operands constant: fold the whole displacement.
                    return Ok(Place::Addressed {
                        offset: base_offset + constant as u32 * stride,
                        ty: elem,
                        bits: None,
                    });
                }
                if base_offset != 0 {
                    self.emit(Opcode::PushInt, vec![base_offset]);
                    self.emit(Opcode::AddInt, vec![]);
                }
                let found = self.emit_expr(index)?;
                self.emit_conversion(found, TypeId::INT);
                self.emit(Opcode::PushInt, vec![stride]);
                self.emit(Opcode::MulInt, vec![]);
                self.emit(Opcode::AddInt, vec![]);
                Ok(Place::Addressed {
                    offset: 0,
                    ty: elem,
                    bits: None,
                })
            }
            ExprKind::Deref { operand } => {
                let ptr_ty = self.emit_expr(operand)?;
                let pointee = match self.analysis.types.get(self.base_ty(ptr_ty)) {
                    Ty::Ptr(inner) => inner,
                    _ => return ice("dereference of non-pointer reached codegen", expr.pos),
                };
                Ok(Place::Addressed {
                    offset: 0,
                    ty: pointee,
                    bits: None,
                })
            }
            _ => ice("expression is not a place", expr.pos),
        }
    }

    fn emit_load_from(&mut self, place: Place) -> GenResult<TypeId> {
        match place {
            Place::Direct(binding) => {
                match binding.residence {
                    Residence::Local => self.emit(Opcode::LoadLocal, vec![binding.slot]),
                    Residence::Param => self.emit(Opcode::LoadParam, vec![binding.slot]),
                    Residence::Global => self.emit(Opcode::LoadGlobal, vec![binding.slot]),
                }
                Ok(binding.ty)
            }
            Place::Addressed { offset, ty, bits } => {
                if let Some((bit_offset, width)) = bits {
                    self.emit(Opcode::LoadBitfield, vec![offset, bit_offset, width]);
                    return Ok(TypeId::INT);
                }
                if self.analysis.types.is_aggregate(ty) {
                    // Aggregates travel as addresses; fold in the offset.
                    if offset != 0 {
                        self.emit(Opcode::PushInt, vec![offset]);
                        self.emit(Opcode::AddInt, vec![]);
                    }
                    return Ok(ty);
                }
                let size = self.analysis.layouts.size_of(&self.analysis.types, ty);
                self.emit(Opcode::LoadField, vec![offset, size]);
                Ok(ty)
            }
        }
    }

    fn emit_address_of(&mut self, operand: &Expr<'_>, pos: SourcePos) -> GenResult<TypeId> {
        match &operand.kind {
            ExprKind::Identifier(name) => {
                let binding = self.lookup(*name, pos)?;
                if self.analysis.types.is_aggregate(binding.ty) {
                    match binding.residence {
                        Residence::Local => self.emit(Opcode::LoadLocal, vec![binding.slot]),
                        Residence::Param => self.emit(Opcode::LoadParam, vec![binding.slot]),
                        Residence::Global => self.emit(Opcode::LoadGlobal, vec![binding.slot]),
                    }
                } else {
                    match binding.residence {
                        Residence::Local => self.emit(Opcode::AddrOfLocal, vec![binding.slot]),
                        Residence::Global => {
                            self.emit(Opcode::AddrOfGlobal, vec![binding.slot])
                        }
                        Residence::Param => {
                            return ice("address of parameter reached codegen", pos)
                        }
                    }
                }
                let inner = self.analysis.types.strip_const(binding.ty);
                Ok(self.analysis.types.intern(Ty::Ptr(inner)))
            }
            ExprKind::Member { .. } | ExprKind::Index { .. } | ExprKind::Deref { .. } => {
                match self.emit_place(operand)? {
                    Place::Addressed {
                        offset,
                        ty,
                        bits: None,
                    } => {
                        if offset != 0 {
                            self.emit(Opcode::PushInt, vec![offset]);
                            self.emit(Opcode::AddInt, vec![]);
                        }
                        let inner = self.analysis.types.strip_const(ty);
                        Ok(self.analysis.types.intern(Ty::Ptr(inner)))
                    }
                    _ => ice("cannot take this address", pos),
                }
            }
            _ => ice("address of a temporary reached codegen", pos),
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn emit_call(
        &mut self,
        callee: Symbol,
        args: &[&Expr<'_>],
        pos: SourcePos,
    ) -> GenResult<TypeId> {
        let sig = match self.analysis.functions.get(&callee) {
            Some(sig) => sig.clone(),
            None => return ice("call to unknown function reached codegen", pos),
        };
        let index = match self.function_index.get(&callee) {
            Some(&index) => index,
            None => return ice("function body missing an index", pos),
        };
        for (arg, &param) in args.iter().zip(sig.params.iter()) {
            let found = self.emit_expr(arg)?;
            self.emit_conversion(found, param);
        }
        self.emit(Opcode::Call, vec![index, args.len() as u32]);
        Ok(sig.ret)
    }

    fn emit_intrinsic(
        &mut self,
        which: Intrinsic,
        args: &[&Expr<'_>],
        _pos: SourcePos,
    ) -> GenResult<TypeId> {
        use crate::intrinsics::ParamKind;
        let sig = which.signature();
        for (index, arg) in args.iter().enumerate() {
            match sig.params.get(index) {
                Some(ParamKind::TaskEntry) => {
                    let entry = match arg.kind {
                        ExprKind::Identifier(name) => name,
                        _ => return ice("task entry must be a function name", arg.pos),
                    };
                    let fn_index = match self.function_index.get(&entry) {
                        Some(&index) => index,
                        None => return ice("task entry not generated", arg.pos),
                    };
                    self.emit(Opcode::PushInt, vec![fn_index]);
                }
                _ => {
                    self.emit_expr(arg)?;
                }
            }
        }
        let operands = match which {
            Intrinsic::DbgPrintf => vec![args.len() as u32],
            _ => vec![],
        };
        self.emit(which.opcode(), operands);
        Ok(match sig.ret {
            ParamKind::Int => TypeId::INT,
            ParamKind::Str => TypeId::STR,
            ParamKind::Task => TypeId::TASK,
            ParamKind::Void | ParamKind::TaskEntry => TypeId::VOID,
        })
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    fn base_ty(&self, ty: TypeId) -> TypeId {
        self.analysis.types.strip_const(ty)
    }

    fn emit_conversion(&mut self, from: TypeId, to: TypeId) {
        let from = self.base_ty(from);
        let to = self.base_ty(to);
        if from == to {
            return;
        }
        if to == TypeId::FLOAT && (from == TypeId::INT || from == TypeId::CHAR) {
            self.emit(Opcode::IntToFloat, vec![]);
        }
        // char↔int and pointer-compatible moves are representation no-ops.
    }

    fn lookup(&self, name: Symbol, pos: SourcePos) -> GenResult<Binding> {
        for frame in self.frames.iter().rev() {
            if let Some(binding) = frame.get(&name) {
                return Ok(*binding);
            }
        }
        if let Some(global) = self.analysis.global(name) {
            return Ok(Binding {
                residence: Residence::Global,
                slot: global.slot,
                ty: global.ty,
            });
        }
        ice(
            format!("unbound name '{}' reached codegen", self.interner.resolve(name)),
            pos,
        )
    }

    fn queue_info(&self, queue: Symbol, pos: SourcePos) -> GenResult<(TypeId, u32)> {
        match self.analysis.messages.get(&queue) {
            Some(info) => Ok((info.elem, info.queue_id)),
            None => ice("message operation on unknown queue reached codegen", pos),
        }
    }

    fn resolve_type(&mut self, ty: &TypeExpr<'_>) -> TypeId {
        match ty.kind {
            TypeExprKind::Primitive(Primitive::Int) => TypeId::INT,
            TypeExprKind::Primitive(Primitive::Float) => TypeId::FLOAT,
            TypeExprKind::Primitive(Primitive::Char) => TypeId::CHAR,
            TypeExprKind::Primitive(Primitive::Bool) => TypeId::BOOL,
            TypeExprKind::Primitive(Primitive::Void) => TypeId::VOID,
            TypeExprKind::Primitive(Primitive::Task) => TypeId::TASK,
            TypeExprKind::Named(name) => match self.analysis.layouts.record_is_union(name) {
                Some(true) => self.analysis.types.intern(Ty::Union(name)),
                Some(false) => self.analysis.types.intern(Ty::Struct(name)),
                None => TypeId::ERROR,
            },
            TypeExprKind::Pointer(inner) => {
                let inner = self.resolve_type(inner);
                self.analysis.types.intern(Ty::Ptr(inner))
            }
            TypeExprKind::Const(inner) => {
                let inner = self.resolve_type(inner);
                self.analysis.types.intern(Ty::Const(inner))
            }
        }
    }

    /// Type of an expression without emitting code. Used where a conversion
    /// decision has to precede emission (float promotion of the left
    /// operand).
    fn expr_ty(&mut self, expr: &Expr<'_>) -> GenResult<TypeId> {
        let ty = match &expr.kind {
            ExprKind::Literal(Literal::Int(_)) => TypeId::INT,
            ExprKind::Literal(Literal::Float(_)) => TypeId::FLOAT,
            ExprKind::Literal(Literal::Char(_)) => TypeId::CHAR,
            ExprKind::Literal(Literal::Bool(_)) => TypeId::BOOL,
            ExprKind::Literal(Literal::Str(_)) => TypeId::STR,
            ExprKind::Identifier(name) => self.lookup(*name, expr.pos)?.ty,
            ExprKind::Binary { op, left, right } => {
                if op.is_comparison() || op.is_logical() {
                    TypeId::BOOL
                } else if op.is_bitwise() || *op == BinaryOp::Mod {
                    TypeId::INT
                } else {
                    let lt = self.expr_ty(left)?;
                    let rt = self.expr_ty(right)?;
                    if self.base_ty(lt) == TypeId::FLOAT || self.base_ty(rt) == TypeId::FLOAT {
                        TypeId::FLOAT
                    } else {
                        TypeId::INT
                    }
                }
            }
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Not => TypeId::BOOL,
                UnaryOp::BitNot => TypeId::INT,
                UnaryOp::Neg | UnaryOp::Plus => self.expr_ty(operand)?,
            },
            ExprKind::Assign { .. } | ExprKind::CompoundAssign { .. } => TypeId::VOID,
            ExprKind::IncDec { target, .. } => self.expr_ty(target)?,
            ExprKind::Call { callee, .. } => match self.analysis.functions.get(callee) {
                Some(sig) => sig.ret,
                None => TypeId::ERROR,
            },
            ExprKind::IntrinsicCall { which, .. } => {
                use crate::intrinsics::ParamKind;
                match which.signature().ret {
                    ParamKind::Int => TypeId::INT,
                    ParamKind::Str => TypeId::STR,
                    ParamKind::Task => TypeId::TASK,
                    ParamKind::Void | ParamKind::TaskEntry => TypeId::VOID,
                }
            }
            ExprKind::MessageSend { .. } => TypeId::VOID,
            ExprKind::MessageRecv { queue, .. } => self.queue_info(*queue, expr.pos)?.0,
            ExprKind::Member {
                object,
                field,
                through_pointer,
            } => {
                let object_ty = self.expr_ty(object)?;
                let mut base = self.base_ty(object_ty);
                if *through_pointer {
                    base = match self.analysis.types.get(base) {
                        Ty::Ptr(inner) => self.base_ty(inner),
                        _ => return ice("arrow through non-pointer", expr.pos),
                    };
                }
                let record = match self.analysis.types.get(base) {
                    Ty::Struct(name) | Ty::Union(name) => name,
                    _ => return ice("member of non-record", expr.pos),
                };
                match self
                    .analysis
                    .layouts
                    .get(record)
                    .and_then(|l| l.field(*field))
                {
                    Some(f) if f.bits.is_some() => TypeId::INT,
                    Some(f) => f.ty,
                    None => return ice("unknown field", expr.pos),
                }
            }
            ExprKind::Index { array, .. } => {
                let array_ty = self.expr_ty(array)?;
                match self.analysis.types.get(self.base_ty(array_ty)) {
                    Ty::Array { elem, .. } => elem,
                    _ => return ice("indexing a non-array", expr.pos),
                }
            }
            ExprKind::AddressOf { operand } => {
                let operand_ty = self.expr_ty(operand)?;
                let inner = self.base_ty(operand_ty);
                self.analysis.types.intern(Ty::Ptr(inner))
            }
            ExprKind::Deref { operand } => {
                let operand_ty = self.expr_ty(operand)?;
                match self.analysis.types.get(self.base_ty(operand_ty)) {
                    Ty::Ptr(inner) => inner,
                    _ => return ice("dereference of non-pointer", expr.pos),
                }
            }
            ExprKind::Cast { ty, .. } => self.resolve_type(ty),
            ExprKind::Aggregate { .. } => TypeId::ERROR,
        };
        Ok(ty)
    }
}

// ----------------------------------------------------------------------
// Small helpers outside the generator
// ----------------------------------------------------------------------

/// Base slot of an aggregate initializer target.
#[derive(Clone, Copy)]
enum BasePlace {
    Global(u32),
    Local(u32),
}

impl BasePlace {
    fn push_base(self, generator: &mut BytecodeGenerator<'_>) {
        match self {
            BasePlace::Global(slot) => generator.emit(Opcode::LoadGlobal, vec![slot]),
            BasePlace::Local(slot) => generator.emit(Opcode::LoadLocal, vec![slot]),
        }
    }
}

struct FlatStore<'e> {
    offset: u32,
    ty: TypeId,
    bits: Option<(u32, u32)>,
    value: &'e Expr<'e>,
}

fn type_tag(analysis: &Analysis, ty: TypeId) -> TypeTag {
    match analysis.types.get(analysis.types.strip_const(ty)) {
        Ty::Float => TypeTag::Float,
        Ty::Char => TypeTag::Char,
        Ty::Bool => TypeTag::Bool,
        Ty::Ptr(_) => TypeTag::Ptr,
        Ty::Struct(_) => TypeTag::Struct,
        Ty::Union(_) => TypeTag::Union,
        Ty::Array { .. } => TypeTag::Array,
        Ty::Message(_) => TypeTag::Message,
        Ty::Task => TypeTag::Task,
        _ => TypeTag::Int,
    }
}

