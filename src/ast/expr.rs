use crate::ast::ty::TypeExpr;
use crate::intern::Symbol;
use crate::intrinsics::Intrinsic;
use crate::source::SourcePos;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Char(char),
    Bool(bool),
    Str(Symbol),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogicalAnd,
    LogicalOr,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::LogicalAnd | BinaryOp::LogicalOr)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    Increment,
    Decrement,
}

#[derive(Debug)]
pub struct Expr<'a> {
    pub kind: ExprKind<'a>,
    pub pos: SourcePos,
}

#[derive(Debug)]
pub enum ExprKind<'a> {
    Literal(Literal),
    Identifier(Symbol),
    Binary {
        op: BinaryOp,
        left: &'a Expr<'a>,
        right: &'a Expr<'a>,
    },
    Unary {
        op: UnaryOp,
        operand: &'a Expr<'a>,
    },
    Assign {
        target: &'a Expr<'a>,
        value: &'a Expr<'a>,
    },
    CompoundAssign {
        op: BinaryOp,
        target: &'a Expr<'a>,
        value: &'a Expr<'a>,
    },
    Call {
        callee: Symbol,
        args: &'a [&'a Expr<'a>],
    },
    IntrinsicCall {
        which: Intrinsic,
        args: &'a [&'a Expr<'a>],
    },
    MessageSend {
        queue: Symbol,
        value: &'a Expr<'a>,
    },
    MessageRecv {
        queue: Symbol,
        /// `None` blocks indefinitely.
        timeout: Option<&'a Expr<'a>>,
    },
    Member {
        object: &'a Expr<'a>,
        field: Symbol,
        /// `->` instead of `.`.
        through_pointer: bool,
    },
    Index {
        array: &'a Expr<'a>,
        index: &'a Expr<'a>,
    },
    AddressOf {
        operand: &'a Expr<'a>,
    },
    Deref {
        operand: &'a Expr<'a>,
    },
    Cast {
        ty: TypeExpr<'a>,
        operand: &'a Expr<'a>,
    },
    IncDec {
        op: IncDecOp,
        prefix: bool,
        target: &'a Expr<'a>,
    },
    /// Brace initializer `{e, e, …}` for arrays and structs; the analyzer
    /// classifies it against the declared type.
    Aggregate {
        elems: &'a [&'a Expr<'a>],
    },
}

impl<'a> Expr<'a> {
    /// True when evaluation cannot observe or change program state. Used by
    /// the optimizer before dropping or duplicating a subexpression.
    pub fn is_pure(&self) -> bool {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Identifier(_) => true,
            ExprKind::Binary { left, right, .. } => left.is_pure() && right.is_pure(),
            ExprKind::Unary { operand, .. } => operand.is_pure(),
            ExprKind::Member { object, .. } => object.is_pure(),
            ExprKind::Index { array, index } => array.is_pure() && index.is_pure(),
            ExprKind::AddressOf { operand } => operand.is_pure(),
            ExprKind::Deref { operand } => operand.is_pure(),
            ExprKind::Cast { operand, .. } => operand.is_pure(),
            ExprKind::Aggregate { elems } => elems.iter().all(|e| e.is_pure()),
            _ => false,
        }
    }
}
