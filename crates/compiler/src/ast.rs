//! Abstract syntax tree for the C subset.
//!
//! Nodes live in a flat arena inside [`Tree`] and are referred to by
//! integer handles (`ExprId`/`StmtId`/`DeclId`). Constant folding replaces
//! a record in place (`replace_expr`), so every outstanding handle stays
//! valid — there is no linked structure to rewire and no reference cycles.
//!
//! A distinguished broken handle ([`ExprId::BROKEN`]) propagates error
//! state out of the expression builder. Consumers guard with
//! [`Tree::is_correct`]; a broken subtree suppresses further diagnostics.

use rvc_core::{IdentId, Location, StringId, TypeId};

/// Handle to an expression record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

impl ExprId {
    /// Error sentinel: not a valid arena index.
    pub const BROKEN: ExprId = ExprId(u32::MAX);

    pub fn is_broken(self) -> bool {
        self == ExprId::BROKEN
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a statement record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(u32);

impl StmtId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a declaration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(u32);

impl DeclId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Whether an expression denotes addressable storage or a plain value.
/// A semantic property, orthogonal to the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCategory {
    Lvalue,
    Rvalue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    PostInc,
    PostDec,
    PreInc,
    PreDec,
    Address,
    Indirection,
    Plus,
    Minus,
    BitNot,
    LogNot,
    Abs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Xor,
    Or,
    LogAnd,
    LogOr,
    Comma,
    Assign,
    MulAssign,
    DivAssign,
    RemAssign,
    AddAssign,
    SubAssign,
    ShlAssign,
    ShrAssign,
    AndAssign,
    XorAssign,
    OrAssign,
}

impl BinaryOp {
    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            BinaryOp::Assign
                | BinaryOp::MulAssign
                | BinaryOp::DivAssign
                | BinaryOp::RemAssign
                | BinaryOp::AddAssign
                | BinaryOp::SubAssign
                | BinaryOp::ShlAssign
                | BinaryOp::ShrAssign
                | BinaryOp::AndAssign
                | BinaryOp::XorAssign
                | BinaryOp::OrAssign
        )
    }

    /// Underlying operation of a compound assignment (`+=` → `+`).
    pub fn compound_base(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::MulAssign => Some(BinaryOp::Mul),
            BinaryOp::DivAssign => Some(BinaryOp::Div),
            BinaryOp::RemAssign => Some(BinaryOp::Rem),
            BinaryOp::AddAssign => Some(BinaryOp::Add),
            BinaryOp::SubAssign => Some(BinaryOp::Sub),
            BinaryOp::ShlAssign => Some(BinaryOp::Shl),
            BinaryOp::ShrAssign => Some(BinaryOp::Shr),
            BinaryOp::AndAssign => Some(BinaryOp::And),
            BinaryOp::XorAssign => Some(BinaryOp::Xor),
            BinaryOp::OrAssign => Some(BinaryOp::Or),
            _ => None,
        }
    }

    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Ne)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Identifier {
        ident: IdentId,
    },
    IntLiteral {
        value: i32,
    },
    FloatLiteral {
        value: f64,
    },
    /// Index into the string table.
    StringLiteral {
        index: StringId,
    },
    NullPtrLiteral,
    Subscript {
        base: ExprId,
        index: ExprId,
    },
    Member {
        base: ExprId,
        member_index: usize,
        is_arrow: bool,
    },
    Call {
        callee: ExprId,
        args: Vec<ExprId>,
    },
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Ternary {
        cond: ExprId,
        then: ExprId,
        otherwise: ExprId,
    },
    InitList {
        elements: Vec<ExprId>,
    },
    /// Upper bound of an array dimension.
    Upb {
        dimension: ExprId,
        array: ExprId,
    },
    /// Explicit arithmetic cast; the target type is the node's own type.
    Cast {
        operand: ExprId,
    },
}

/// One expression record: kind plus the semantic annotations every
/// expression carries.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub ty: TypeId,
    pub category: ValueCategory,
    pub loc: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Declarations(Vec<DeclId>),
    Compound(Vec<StmtId>),
    Expr(ExprId),
    Null,
    If {
        cond: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
    },
    Switch {
        cond: ExprId,
        body: StmtId,
    },
    Case {
        value: ExprId,
        body: StmtId,
    },
    Default {
        body: StmtId,
    },
    While {
        cond: ExprId,
        body: StmtId,
    },
    Do {
        body: StmtId,
        cond: ExprId,
    },
    For {
        init: Option<StmtId>,
        cond: Option<ExprId>,
        step: Option<ExprId>,
        body: StmtId,
    },
    Continue,
    Break,
    Return {
        value: Option<ExprId>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclKind {
    /// Variable declaration. Non-empty `bounds` means an array; one bound
    /// per dimension, outermost first.
    Var {
        ident: IdentId,
        bounds: Vec<ExprId>,
        init: Option<ExprId>,
    },
    Func {
        ident: IdentId,
        params: Vec<IdentId>,
        body: StmtId,
    },
}

/// The arena holding one translation unit.
#[derive(Debug, Default)]
pub struct Tree {
    exprs: Vec<ExprNode>,
    stmts: Vec<StmtKind>,
    decls: Vec<DeclKind>,
    unit: Vec<DeclId>,
}

impl Tree {
    pub fn new() -> Self {
        Tree::default()
    }

    pub fn add_expr(&mut self, node: ExprNode) -> ExprId {
        self.exprs.push(node);
        ExprId((self.exprs.len() - 1) as u32)
    }

    pub fn expr(&self, id: ExprId) -> &ExprNode {
        debug_assert!(!id.is_broken(), "expr() on the broken sentinel");
        &self.exprs[id.index()]
    }

    /// Folding: swap the record in place so the handle keeps identifying
    /// the (new) expression.
    pub fn replace_expr(&mut self, id: ExprId, node: ExprNode) {
        self.exprs[id.index()] = node;
    }

    pub fn is_correct(&self, id: ExprId) -> bool {
        !id.is_broken()
    }

    pub fn ty(&self, id: ExprId) -> TypeId {
        self.expr(id).ty
    }

    pub fn category(&self, id: ExprId) -> ValueCategory {
        self.expr(id).category
    }

    pub fn is_lvalue(&self, id: ExprId) -> bool {
        self.expr(id).category == ValueCategory::Lvalue
    }

    pub fn loc(&self, id: ExprId) -> Location {
        self.expr(id).loc
    }

    pub fn is_literal(&self, id: ExprId) -> bool {
        matches!(
            self.expr(id).kind,
            ExprKind::IntLiteral { .. }
                | ExprKind::FloatLiteral { .. }
                | ExprKind::StringLiteral { .. }
                | ExprKind::NullPtrLiteral
        )
    }

    pub fn as_int_literal(&self, id: ExprId) -> Option<i32> {
        match self.expr(id).kind {
            ExprKind::IntLiteral { value } => Some(value),
            _ => None,
        }
    }

    pub fn as_float_literal(&self, id: ExprId) -> Option<f64> {
        match self.expr(id).kind {
            ExprKind::FloatLiteral { value } => Some(value),
            _ => None,
        }
    }

    /// Literal numeric value widened to `f64` (`int` promotes to `double`).
    pub fn literal_as_f64(&self, id: ExprId) -> Option<f64> {
        match self.expr(id).kind {
            ExprKind::IntLiteral { value } => Some(value as f64),
            ExprKind::FloatLiteral { value } => Some(value),
            _ => None,
        }
    }

    pub fn add_stmt(&mut self, stmt: StmtKind) -> StmtId {
        self.stmts.push(stmt);
        StmtId((self.stmts.len() - 1) as u32)
    }

    pub fn stmt(&self, id: StmtId) -> &StmtKind {
        &self.stmts[id.index()]
    }

    pub fn add_decl(&mut self, decl: DeclKind) -> DeclId {
        self.decls.push(decl);
        DeclId((self.decls.len() - 1) as u32)
    }

    pub fn decl(&self, id: DeclId) -> &DeclKind {
        &self.decls[id.index()]
    }

    /// Appends a top-level declaration to the translation unit.
    pub fn push_unit(&mut self, decl: DeclId) {
        self.unit.push(decl);
    }

    pub fn unit(&self) -> &[DeclId] {
        &self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_node(value: i32) -> ExprNode {
        ExprNode {
            kind: ExprKind::IntLiteral { value },
            ty: TypeId::INT,
            category: ValueCategory::Rvalue,
            loc: Location::default(),
        }
    }

    #[test]
    fn test_replace_keeps_handle_stable() {
        let mut tree = Tree::new();
        let a = tree.add_expr(int_node(1));
        let b = tree.add_expr(int_node(2));
        let sum = tree.add_expr(ExprNode {
            kind: ExprKind::Binary {
                op: BinaryOp::Add,
                lhs: a,
                rhs: b,
            },
            ty: TypeId::INT,
            category: ValueCategory::Rvalue,
            loc: Location::default(),
        });

        // Fold in place: the handle `sum` now denotes the literal.
        tree.replace_expr(sum, int_node(3));
        assert_eq!(tree.as_int_literal(sum), Some(3));
        assert_eq!(tree.as_int_literal(a), Some(1));
    }

    #[test]
    fn test_broken_sentinel() {
        let tree = Tree::new();
        assert!(!tree.is_correct(ExprId::BROKEN));
        assert!(ExprId::BROKEN.is_broken());
    }

    #[test]
    fn test_compound_base() {
        assert_eq!(BinaryOp::AddAssign.compound_base(), Some(BinaryOp::Add));
        assert_eq!(BinaryOp::Assign.compound_base(), None);
        assert!(BinaryOp::ShrAssign.is_assignment());
        assert!(!BinaryOp::Shr.is_assignment());
    }
}
