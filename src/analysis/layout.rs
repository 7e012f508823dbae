//! Struct and union layout.
//!
//! Layouts are computed once per record after all records are registered and
//! memoized. Fields align to `min(natural_align, 4)`; the total size is
//! padded to the record's alignment. Consecutive `int` bitfields share one
//! 32-bit storage unit until the next width would cross the unit boundary.

use std::collections::HashMap;

use crate::analysis::registry::{Ty, TypeId, TypeTable};
use crate::error::{DiagnosticKind, Diagnostics};
use crate::intern::{Interner, Symbol};
use crate::source::SourcePos;

/// Machine word of the target VM, in bytes. Caps field alignment.
pub const WORD_SIZE: u32 = 4;
/// Bitfield storage unit, in bits.
pub const BITFIELD_UNIT_BITS: u32 = 32;

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: Symbol,
    pub ty: TypeId,
    pub bit_width: Option<u32>,
    pub pos: SourcePos,
}

#[derive(Debug, Clone)]
pub struct RecordDef {
    pub is_union: bool,
    pub fields: Vec<FieldDef>,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: Symbol,
    pub ty: TypeId,
    pub offset: u32,
    pub size: u32,
    /// Set for bitfields: (bit offset within the 32-bit unit, width).
    pub bits: Option<(u32, u32)>,
}

#[derive(Debug, Clone)]
pub struct RecordLayout {
    pub name: Symbol,
    pub is_union: bool,
    pub size: u32,
    pub align: u32,
    pub fields: Vec<FieldLayout>,
}

impl RecordLayout {
    pub fn field(&self, name: Symbol) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Default)]
pub struct LayoutTable {
    defs: HashMap<Symbol, RecordDef>,
    layouts: HashMap<Symbol, RecordLayout>,
    in_progress: Vec<Symbol>,
}

impl LayoutTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a record body. Returns false when the name is taken.
    pub fn register(&mut self, name: Symbol, def: RecordDef) -> bool {
        if self.defs.contains_key(&name) {
            return false;
        }
        self.defs.insert(name, def);
        true
    }

    pub fn is_registered(&self, name: Symbol) -> bool {
        self.defs.contains_key(&name)
    }

    /// `Some(true)` for unions, `Some(false)` for structs.
    pub fn record_is_union(&self, name: Symbol) -> Option<bool> {
        self.defs.get(&name).map(|d| d.is_union)
    }

    /// Swaps in a resolved body for a name registered earlier. Used by the
    /// two-sweep declaration collection: names first, field types second.
    pub fn replace(&mut self, name: Symbol, def: RecordDef) {
        self.defs.insert(name, def);
    }

    pub fn get(&self, name: Symbol) -> Option<&RecordLayout> {
        self.layouts.get(&name)
    }

    /// Computes every registered layout, reporting cycles and bad bitfields.
    pub fn compute_all(
        &mut self,
        types: &TypeTable,
        interner: &Interner,
        diags: &mut Diagnostics,
    ) {
        let names: Vec<Symbol> = self.defs.keys().copied().collect();
        for name in names {
            let _ = self.compute_record(types, interner, name, diags);
        }
    }

    fn compute_record(
        &mut self,
        types: &TypeTable,
        interner: &Interner,
        name: Symbol,
        diags: &mut Diagnostics,
    ) -> Result<(), ()> {
        if self.layouts.contains_key(&name) {
            return Ok(());
        }
        let def = match self.defs.get(&name) {
            Some(def) => def.clone(),
            None => return Err(()),
        };
        if self.in_progress.contains(&name) {
            diags.error(
                DiagnosticKind::RecursiveRecord {
                    name: interner.resolve(name).to_string(),
                },
                def.pos,
            );
            // Poison entry so dependents settle instead of re-reporting.
            self.layouts.insert(
                name,
                RecordLayout {
                    name,
                    is_union: def.is_union,
                    size: 0,
                    align: 1,
                    fields: Vec::new(),
                },
            );
            return Err(());
        }
        self.in_progress.push(name);
        let layout = if def.is_union {
            self.layout_union(types, interner, name, &def, diags)
        } else {
            self.layout_struct(types, interner, name, &def, diags)
        };
        self.in_progress.pop();
        // A cycle may have inserted a poison entry while we recursed.
        self.layouts.entry(name).or_insert(layout);
        Ok(())
    }

    fn layout_struct(
        &mut self,
        types: &TypeTable,
        interner: &Interner,
        name: Symbol,
        def: &RecordDef,
        diags: &mut Diagnostics,
    ) -> RecordLayout {
        let mut fields = Vec::with_capacity(def.fields.len());
        let mut offset = 0u32;
        let mut align = 1u32;
        // Open bitfield unit: (byte offset of the unit, bits used so far).
        let mut unit: Option<(u32, u32)> = None;

        for field in &def.fields {
            if let Some(width) = field.bit_width {
                if !self.check_bitfield(types, interner, field, width, diags) {
                    continue;
                }
                let (unit_offset, bit_offset) = match unit {
                    Some((at, used)) if used + width <= BITFIELD_UNIT_BITS => (at, used),
                    _ => {
                        let at = align_to(offset, WORD_SIZE);
                        offset = at + WORD_SIZE;
                        (at, 0)
                    }
                };
                unit = Some((unit_offset, bit_offset + width));
                align = align.max(WORD_SIZE);
                fields.push(FieldLayout {
                    name: field.name,
                    ty: field.ty,
                    offset: unit_offset,
                    size: WORD_SIZE,
                    bits: Some((bit_offset, width)),
                });
            } else {
                unit = None;
                let (size, field_align) =
                    self.measure(types, interner, field.ty, field.pos, diags);
                let field_align = field_align.min(WORD_SIZE).max(1);
                offset = align_to(offset, field_align);
                align = align.max(field_align);
                fields.push(FieldLayout {
                    name: field.name,
                    ty: field.ty,
                    offset,
                    size,
                    bits: None,
                });
                offset += size;
            }
        }

        RecordLayout {
            name,
            is_union: false,
            size: align_to(offset, align),
            align,
            fields,
        }
    }

    fn layout_union(
        &mut self,
        types: &TypeTable,
        interner: &Interner,
        name: Symbol,
        def: &RecordDef,
        diags: &mut Diagnostics,
    ) -> RecordLayout {
        let mut fields = Vec::with_capacity(def.fields.len());
        let mut size = 0u32;
        let mut align = 1u32;

        for field in &def.fields {
            if let Some(width) = field.bit_width {
                if !self.check_bitfield(types, interner, field, width, diags) {
                    continue;
                }
                align = align.max(WORD_SIZE);
                size = size.max(WORD_SIZE);
                fields.push(FieldLayout {
                    name: field.name,
                    ty: field.ty,
                    offset: 0,
                    size: WORD_SIZE,
                    bits: Some((0, width)),
                });
            } else {
                let (field_size, field_align) =
                    self.measure(types, interner, field.ty, field.pos, diags);
                align = align.max(field_align.min(WORD_SIZE).max(1));
                size = size.max(field_size);
                fields.push(FieldLayout {
                    name: field.name,
                    ty: field.ty,
                    offset: 0,
                    size: field_size,
                    bits: None,
                });
            }
        }

        RecordLayout {
            name,
            is_union: true,
            size: align_to(size, align),
            align,
            fields,
        }
    }

    fn check_bitfield(
        &self,
        types: &TypeTable,
        interner: &Interner,
        field: &FieldDef,
        width: u32,
        diags: &mut Diagnostics,
    ) -> bool {
        if types.strip_const(field.ty) != TypeId::INT {
            diags.error(
                DiagnosticKind::BitfieldBadStorage {
                    field: interner.resolve(field.name).to_string(),
                },
                field.pos,
            );
            return false;
        }
        if width == 0 || width > BITFIELD_UNIT_BITS {
            diags.error(
                DiagnosticKind::BitfieldTooWide {
                    field: interner.resolve(field.name).to_string(),
                    width,
                },
                field.pos,
            );
            return false;
        }
        true
    }

    /// (size, natural alignment) of a type while layouts are being computed;
    /// recurses into nested records and reports containment cycles.
    fn measure(
        &mut self,
        types: &TypeTable,
        interner: &Interner,
        ty: TypeId,
        pos: SourcePos,
        diags: &mut Diagnostics,
    ) -> (u32, u32) {
        match types.get(ty) {
            Ty::Error | Ty::Void => (0, 1),
            Ty::Int | Ty::Float | Ty::Task | Ty::Str => (4, 4),
            Ty::Char | Ty::Bool => (1, 1),
            Ty::Ptr(_) | Ty::Message(_) => (4, 4),
            Ty::Const(inner) => self.measure(types, interner, inner, pos, diags),
            Ty::Array { elem, len } => {
                let (elem_size, elem_align) = self.measure(types, interner, elem, pos, diags);
                let stride = align_to(elem_size, elem_align.min(WORD_SIZE).max(1));
                (stride * len, elem_align)
            }
            Ty::Struct(name) | Ty::Union(name) => {
                let _ = self.compute_record(types, interner, name, diags);
                match self.layouts.get(&name) {
                    Some(layout) => (layout.size, layout.align),
                    None => {
                        diags.error(
                            DiagnosticKind::UnknownType {
                                name: interner.resolve(name).to_string(),
                            },
                            pos,
                        );
                        (0, 1)
                    }
                }
            }
        }
    }

    /// Size of a fully resolved type. Valid after [`LayoutTable::compute_all`].
    pub fn size_of(&self, types: &TypeTable, ty: TypeId) -> u32 {
        match types.get(ty) {
            Ty::Error | Ty::Void => 0,
            Ty::Int | Ty::Float | Ty::Task | Ty::Str => 4,
            Ty::Char | Ty::Bool => 1,
            Ty::Ptr(_) | Ty::Message(_) => 4,
            Ty::Const(inner) => self.size_of(types, inner),
            Ty::Array { elem, len } => self.stride_of(types, elem) * len,
            Ty::Struct(name) | Ty::Union(name) => {
                self.layouts.get(&name).map(|l| l.size).unwrap_or(0)
            }
        }
    }

    pub fn align_of(&self, types: &TypeTable, ty: TypeId) -> u32 {
        match types.get(ty) {
            Ty::Error | Ty::Void => 1,
            Ty::Char | Ty::Bool => 1,
            Ty::Const(inner) => self.align_of(types, inner),
            Ty::Array { elem, .. } => self.align_of(types, elem),
            Ty::Struct(name) | Ty::Union(name) => {
                self.layouts.get(&name).map(|l| l.align).unwrap_or(1)
            }
            _ => 4,
        }
    }

    /// Element-to-element distance in an array of `elem`.
    pub fn stride_of(&self, types: &TypeTable, elem: TypeId) -> u32 {
        let align = self.align_of(types, elem).min(WORD_SIZE).max(1);
        align_to(self.size_of(types, elem), align)
    }
}

pub fn align_to(offset: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (offset + align - 1) & !(align - 1)
}
