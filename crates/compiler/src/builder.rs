//! Semantic expression builder.
//!
//! One constructor per expression form. Each takes already-built
//! subexpressions plus source locations, enforces the type and value
//! category rules, folds literal operands, and returns either a well-typed
//! node or the broken sentinel. On failure a diagnostic is posted to the
//! reporter and the context's error flag is set; callers keep building to
//! surface more errors, but a broken operand suppresses any further
//! diagnostics on the same subtree.

use crate::ast::{BinaryOp, ExprId, ExprKind, ExprNode, Tree, UnaryOp, ValueCategory};
use rvc_core::{ErrorCode, Location, Syntax, TypeId, WarningCode};
use tracing::trace;

/// Builds typed expression nodes into a [`Tree`].
pub struct ExprBuilder<'a> {
    sx: &'a mut Syntax,
    tree: &'a mut Tree,
}

impl<'a> ExprBuilder<'a> {
    pub fn new(sx: &'a mut Syntax, tree: &'a mut Tree) -> Self {
        ExprBuilder { sx, tree }
    }

    fn error(&mut self, code: ErrorCode, loc: Location, detail: &str) -> ExprId {
        self.sx.reporter.error(code, loc, detail);
        ExprId::BROKEN
    }

    fn add(
        &mut self,
        kind: ExprKind,
        ty: TypeId,
        category: ValueCategory,
        loc: Location,
    ) -> ExprId {
        self.tree.add_expr(ExprNode {
            kind,
            ty,
            category,
            loc,
        })
    }

    /// The usual arithmetic conversion: both integer gives `int`,
    /// otherwise `double`. The language has no unsigned types, so there is
    /// no promotion ladder beyond this.
    fn usual_arithmetic_conversion(&self, left: TypeId, right: TypeId) -> TypeId {
        if self.sx.types.is_integer(left) && self.sx.types.is_integer(right) {
            TypeId::INT
        } else {
            TypeId::FLOAT
        }
    }

    // ------------------------------------------------------------------
    // Primary expressions
    // ------------------------------------------------------------------

    pub fn identifier(&mut self, name: &str, loc: Location) -> ExprId {
        let Some(ident) = self.sx.idents.lookup(name) else {
            return self.error(ErrorCode::UndeclaredIdentifier, loc, name);
        };

        let ty = self.sx.idents.type_of(ident);
        let category = if self.sx.types.is_function(ty) {
            ValueCategory::Rvalue
        } else {
            ValueCategory::Lvalue
        };

        self.add(ExprKind::Identifier { ident }, ty, category, loc)
    }

    pub fn int_literal(&mut self, value: i32, loc: Location) -> ExprId {
        self.add(
            ExprKind::IntLiteral { value },
            TypeId::INT,
            ValueCategory::Rvalue,
            loc,
        )
    }

    pub fn float_literal(&mut self, value: f64, loc: Location) -> ExprId {
        self.add(
            ExprKind::FloatLiteral { value },
            TypeId::FLOAT,
            ValueCategory::Rvalue,
            loc,
        )
    }

    pub fn string_literal(&mut self, text: &str, loc: Location) -> ExprId {
        let index = self.sx.strings.intern(text);
        let ty = self.sx.types.array_of(TypeId::INT);
        self.add(
            ExprKind::StringLiteral { index },
            ty,
            ValueCategory::Lvalue,
            loc,
        )
    }

    pub fn null_pointer(&mut self, loc: Location) -> ExprId {
        self.add(
            ExprKind::NullPtrLiteral,
            TypeId::NULLPTR,
            ValueCategory::Rvalue,
            loc,
        )
    }

    // ------------------------------------------------------------------
    // Postfix expressions
    // ------------------------------------------------------------------

    pub fn subscript(
        &mut self,
        base: ExprId,
        index: ExprId,
        l_loc: Location,
        r_loc: Location,
    ) -> ExprId {
        if !self.tree.is_correct(base) || !self.tree.is_correct(index) {
            return ExprId::BROKEN;
        }

        let base_type = self.tree.ty(base);
        if !self.sx.types.is_array(base_type) {
            return self.error(ErrorCode::SubscriptNotArray, l_loc, "");
        }

        let index_type = self.tree.ty(index);
        if !self.sx.types.is_integer(index_type) {
            let loc = self.tree.loc(index);
            return self.error(ErrorCode::SubscriptNotInteger, loc, "");
        }

        let element_type = self.sx.types.array_element(base_type);
        let loc = self.tree.loc(base).merge(r_loc);
        self.add(
            ExprKind::Subscript { base, index },
            element_type,
            ValueCategory::Lvalue,
            loc,
        )
    }

    pub fn call(
        &mut self,
        callee: ExprId,
        args: Vec<ExprId>,
        _l_loc: Location,
        r_loc: Location,
    ) -> ExprId {
        if !self.tree.is_correct(callee) {
            return ExprId::BROKEN;
        }

        let callee_type = self.tree.ty(callee);
        if !self.sx.types.is_function(callee_type) {
            let loc = self.tree.loc(callee);
            return self.error(ErrorCode::CallNotFunction, loc, "");
        }

        let expected = self.sx.types.function_params(callee_type).len();
        let variadic = self.sx.types.function_is_variadic(callee_type);
        let arity_ok = if variadic {
            args.len() >= expected
        } else {
            args.len() == expected
        };
        if !arity_ok {
            let detail = format!("expected {}, found {}", expected, args.len());
            return self.error(ErrorCode::WrongArgumentCount, r_loc, &detail);
        }

        for (i, &arg) in args.iter().enumerate() {
            if !self.tree.is_correct(arg) {
                return ExprId::BROKEN;
            }
            if i < expected {
                let expected_type = self.sx.types.function_params(callee_type)[i];
                if !self.check_assignment_operands(expected_type, arg) {
                    return ExprId::BROKEN;
                }
            }
        }

        let return_type = self.sx.types.function_return(callee_type);
        let loc = self.tree.loc(callee).merge(r_loc);
        self.add(
            ExprKind::Call { callee, args },
            return_type,
            ValueCategory::Rvalue,
            loc,
        )
    }

    pub fn member(
        &mut self,
        base: ExprId,
        name: &str,
        is_arrow: bool,
        op_loc: Location,
        id_loc: Location,
    ) -> ExprId {
        if !self.tree.is_correct(base) {
            return ExprId::BROKEN;
        }

        let base_type = self.tree.ty(base);
        let (struct_type, category) = if is_arrow {
            if !self.sx.types.is_struct_pointer(base_type) {
                return self.error(ErrorCode::InvalidMember, op_loc, "-> on non-struct-pointer");
            }
            (
                self.sx.types.pointer_element(base_type),
                ValueCategory::Lvalue,
            )
        } else {
            if !self.sx.types.is_structure(base_type) {
                return self.error(ErrorCode::InvalidMember, op_loc, ". on non-structure");
            }
            (base_type, self.tree.category(base))
        };

        let Some(member_index) = self.sx.types.member_index(struct_type, name) else {
            return self.error(ErrorCode::InvalidMember, id_loc, name);
        };

        let member_type = self.sx.types.members(struct_type)[member_index].ty;
        let loc = self.tree.loc(base).merge(id_loc);
        self.add(
            ExprKind::Member {
                base,
                member_index,
                is_arrow,
            },
            member_type,
            category,
            loc,
        )
    }

    /// `upb(d, a)`: upper bound of array `a`; `d` selects the dimension.
    pub fn upb(&mut self, dimension: ExprId, array: ExprId) -> ExprId {
        if !self.tree.is_correct(dimension) || !self.tree.is_correct(array) {
            return ExprId::BROKEN;
        }

        if !self.sx.types.is_integer(self.tree.ty(dimension)) {
            let loc = self.tree.loc(dimension);
            return self.error(ErrorCode::TypeMismatch, loc, "upb dimension must be integer");
        }
        if !self.sx.types.is_array(self.tree.ty(array)) {
            let loc = self.tree.loc(array);
            return self.error(ErrorCode::TypeMismatch, loc, "upb operand must be an array");
        }

        let loc = self.tree.loc(dimension).merge(self.tree.loc(array));
        self.add(
            ExprKind::Upb { dimension, array },
            TypeId::INT,
            ValueCategory::Rvalue,
            loc,
        )
    }

    // ------------------------------------------------------------------
    // Unary expressions
    // ------------------------------------------------------------------

    pub fn unary(&mut self, operand: ExprId, op: UnaryOp, op_loc: Location) -> ExprId {
        if !self.tree.is_correct(operand) {
            return ExprId::BROKEN;
        }

        let operand_type = self.tree.ty(operand);
        let loc = match op {
            UnaryOp::PostInc | UnaryOp::PostDec => self.tree.loc(operand).merge(op_loc),
            _ => op_loc.merge(self.tree.loc(operand)),
        };

        match op {
            UnaryOp::PostInc | UnaryOp::PostDec | UnaryOp::PreInc | UnaryOp::PreDec => {
                if !self.sx.types.is_arithmetic(operand_type) {
                    return self.error(ErrorCode::TypeMismatch, op_loc, "increment operand");
                }
                if !self.tree.is_lvalue(operand) {
                    return self.error(ErrorCode::NotLvalue, op_loc, "increment operand");
                }
                self.add(
                    ExprKind::Unary { op, operand },
                    operand_type,
                    ValueCategory::Rvalue,
                    loc,
                )
            }

            UnaryOp::Address => {
                if !self.tree.is_lvalue(operand) {
                    return self.error(ErrorCode::NotLvalue, op_loc, "address-of operand");
                }
                let result_type = self.sx.types.pointer_to(operand_type);
                self.add(
                    ExprKind::Unary { op, operand },
                    result_type,
                    ValueCategory::Rvalue,
                    loc,
                )
            }

            UnaryOp::Indirection => {
                if !self.sx.types.is_pointer(operand_type) {
                    return self.error(ErrorCode::TypeMismatch, op_loc, "indirection operand");
                }
                let pointee = self.sx.types.pointer_element(operand_type);
                self.add(
                    ExprKind::Unary { op, operand },
                    pointee,
                    ValueCategory::Lvalue,
                    loc,
                )
            }

            UnaryOp::Plus | UnaryOp::Minus | UnaryOp::Abs => {
                if !self.sx.types.is_arithmetic(operand_type) {
                    return self.error(ErrorCode::TypeMismatch, op_loc, "unary operand");
                }
                self.fold_unary(operand_type, operand, op, loc)
            }

            UnaryOp::BitNot => {
                if !self.sx.types.is_integer(operand_type) {
                    return self.error(ErrorCode::TypeMismatch, op_loc, "~ operand");
                }
                self.fold_unary(TypeId::INT, operand, op, loc)
            }

            UnaryOp::LogNot => {
                if !self.sx.types.is_scalar(operand_type) {
                    return self.error(ErrorCode::TypeMismatch, op_loc, "! operand");
                }
                self.fold_unary(TypeId::INT, operand, op, loc)
            }
        }
    }

    fn fold_unary(&mut self, ty: TypeId, operand: ExprId, op: UnaryOp, loc: Location) -> ExprId {
        if !self.tree.is_literal(operand) {
            return self.add(
                ExprKind::Unary { op, operand },
                ty,
                ValueCategory::Rvalue,
                loc,
            );
        }

        if matches!(self.tree.expr(operand).kind, ExprKind::NullPtrLiteral) {
            // Only `!` passes the scalar check with a null pointer operand.
            return self.int_literal(1, loc);
        }

        if let Some(value) = self.tree.as_int_literal(operand) {
            let folded = match op {
                UnaryOp::Plus => value,
                UnaryOp::Minus => value.wrapping_neg(),
                UnaryOp::BitNot => !value,
                UnaryOp::LogNot => i32::from(value == 0),
                UnaryOp::Abs => value.wrapping_abs(),
                _ => {
                    return self.add(
                        ExprKind::Unary { op, operand },
                        ty,
                        ValueCategory::Rvalue,
                        loc,
                    );
                }
            };
            trace!(?op, value, folded, "folded unary expression");
            return self.int_literal(folded, loc);
        }

        if let Some(value) = self.tree.as_float_literal(operand) {
            return match op {
                UnaryOp::Plus => self.float_literal(value, loc),
                UnaryOp::Minus => self.float_literal(-value, loc),
                UnaryOp::Abs => self.float_literal(value.abs(), loc),
                UnaryOp::LogNot => self.int_literal(i32::from(value == 0.0), loc),
                _ => self.add(
                    ExprKind::Unary { op, operand },
                    ty,
                    ValueCategory::Rvalue,
                    loc,
                ),
            };
        }

        // String literal operand: nothing to fold.
        self.add(
            ExprKind::Unary { op, operand },
            ty,
            ValueCategory::Rvalue,
            loc,
        )
    }

    // ------------------------------------------------------------------
    // Binary expressions
    // ------------------------------------------------------------------

    pub fn binary(&mut self, lhs: ExprId, rhs: ExprId, op: BinaryOp, op_loc: Location) -> ExprId {
        if !self.tree.is_correct(lhs) || !self.tree.is_correct(rhs) {
            return ExprId::BROKEN;
        }

        let left_type = self.tree.ty(lhs);
        let right_type = self.tree.ty(rhs);

        if op.is_assignment() {
            if !self.tree.is_lvalue(lhs) {
                return self.error(ErrorCode::NotLvalue, op_loc, "assignment target");
            }
            if !self.check_assignment_operands(left_type, rhs) {
                return ExprId::BROKEN;
            }
        }

        let loc = self.tree.loc(lhs).merge(self.tree.loc(rhs));

        match op {
            BinaryOp::Rem
            | BinaryOp::Shl
            | BinaryOp::Shr
            | BinaryOp::And
            | BinaryOp::Xor
            | BinaryOp::Or => {
                if !self.sx.types.is_integer(left_type) || !self.sx.types.is_integer(right_type) {
                    return self.error(ErrorCode::TypeMismatch, op_loc, "integer operands required");
                }
                self.fold_binary(TypeId::INT, lhs, rhs, op, loc)
            }

            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Add | BinaryOp::Sub => {
                if !self.sx.types.is_arithmetic(left_type)
                    || !self.sx.types.is_arithmetic(right_type)
                {
                    return self.error(ErrorCode::TypeMismatch, op_loc, "arithmetic operands");
                }
                let ty = self.usual_arithmetic_conversion(left_type, right_type);
                self.fold_binary(ty, lhs, rhs, op, loc)
            }

            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                if !self.sx.types.is_arithmetic(left_type)
                    || !self.sx.types.is_arithmetic(right_type)
                {
                    return self.error(ErrorCode::TypeMismatch, op_loc, "relational operands");
                }
                self.fold_binary(TypeId::INT, lhs, rhs, op, loc)
            }

            BinaryOp::LogAnd | BinaryOp::LogOr => {
                if !self.sx.types.is_scalar(left_type) || !self.sx.types.is_scalar(right_type) {
                    return self.error(ErrorCode::TypeMismatch, op_loc, "logical operands");
                }
                self.fold_binary(TypeId::INT, lhs, rhs, op, loc)
            }

            BinaryOp::Eq | BinaryOp::Ne => {
                if self.sx.types.is_floating(left_type) || self.sx.types.is_floating(right_type) {
                    self.sx
                        .reporter
                        .warning(WarningCode::FloatEqualityComparison, op_loc);
                }

                let compatible = (self.sx.types.is_arithmetic(left_type)
                    && self.sx.types.is_arithmetic(right_type))
                    || (self.sx.types.is_pointer(left_type)
                        && self.sx.types.is_null_pointer(right_type))
                    || (self.sx.types.is_null_pointer(left_type)
                        && self.sx.types.is_pointer(right_type))
                    || left_type == right_type;
                if !compatible {
                    return self.error(ErrorCode::TypeMismatch, op_loc, "equality operands");
                }
                self.fold_binary(TypeId::INT, lhs, rhs, op, loc)
            }

            BinaryOp::Assign => self.fold_binary(left_type, lhs, rhs, op, loc),

            BinaryOp::RemAssign
            | BinaryOp::ShlAssign
            | BinaryOp::ShrAssign
            | BinaryOp::AndAssign
            | BinaryOp::XorAssign
            | BinaryOp::OrAssign => {
                if !self.sx.types.is_integer(left_type) || !self.sx.types.is_integer(right_type) {
                    return self.error(ErrorCode::TypeMismatch, op_loc, "integer operands required");
                }
                self.fold_binary(left_type, lhs, rhs, op, loc)
            }

            BinaryOp::MulAssign | BinaryOp::DivAssign | BinaryOp::AddAssign | BinaryOp::SubAssign => {
                if !self.sx.types.is_arithmetic(left_type)
                    || !self.sx.types.is_arithmetic(right_type)
                {
                    return self.error(ErrorCode::TypeMismatch, op_loc, "arithmetic operands");
                }
                self.fold_binary(left_type, lhs, rhs, op, loc)
            }

            BinaryOp::Comma => self.fold_binary(right_type, lhs, rhs, op, loc),
        }
    }

    fn fold_binary(
        &mut self,
        ty: TypeId,
        lhs: ExprId,
        rhs: ExprId,
        op: BinaryOp,
        loc: Location,
    ) -> ExprId {
        // Short-circuit: a deciding literal LHS folds the whole operator
        // away even when the RHS is not a literal.
        if matches!(op, BinaryOp::LogAnd | BinaryOp::LogOr) {
            if let Some(decides) = self.tree.literal_as_f64(lhs).map(|v| v != 0.0) {
                match (op, decides) {
                    (BinaryOp::LogAnd, false) => return self.int_literal(0, loc),
                    (BinaryOp::LogOr, true) => return self.int_literal(1, loc),
                    _ => {
                        if self.tree.is_literal(rhs) {
                            let value = self.tree.literal_as_f64(rhs).unwrap_or(0.0);
                            return self.int_literal(i32::from(value != 0.0), loc);
                        }
                        // `1 && x` / `0 || x` still need the RHS at run time.
                    }
                }
            }
        }

        if !self.tree.is_literal(lhs) || !self.tree.is_literal(rhs) {
            return self.add(
                ExprKind::Binary { op, lhs, rhs },
                ty,
                ValueCategory::Rvalue,
                loc,
            );
        }

        if op == BinaryOp::Comma {
            // The folded comma discards the LHS entirely.
            return rhs;
        }

        let left_int = self.tree.as_int_literal(lhs);
        let right_int = self.tree.as_int_literal(rhs);

        if self.sx.types.is_integer(ty)
            && let (Some(a), Some(b)) = (left_int, right_int)
        {
            if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b == 0 {
                // Undefined behavior in the source program: keep the node
                // and let emission materialize the trap.
                return self.add(
                    ExprKind::Binary { op, lhs, rhs },
                    ty,
                    ValueCategory::Rvalue,
                    loc,
                );
            }

            let folded = match op {
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::Div => a.wrapping_div(b),
                BinaryOp::Rem => a.wrapping_rem(b),
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Shl => a.wrapping_shl(b as u32),
                BinaryOp::Shr => a.wrapping_shr(b as u32),
                BinaryOp::Lt => i32::from(a < b),
                BinaryOp::Gt => i32::from(a > b),
                BinaryOp::Le => i32::from(a <= b),
                BinaryOp::Ge => i32::from(a >= b),
                BinaryOp::Eq => i32::from(a == b),
                BinaryOp::Ne => i32::from(a != b),
                BinaryOp::And => a & b,
                BinaryOp::Xor => a ^ b,
                BinaryOp::Or => a | b,
                BinaryOp::LogAnd => i32::from(a != 0 && b != 0),
                BinaryOp::LogOr => i32::from(a != 0 || b != 0),
                _ => {
                    return self.add(
                        ExprKind::Binary { op, lhs, rhs },
                        ty,
                        ValueCategory::Rvalue,
                        loc,
                    );
                }
            };
            trace!(?op, a, b, folded, "folded binary expression");
            return self.int_literal(folded, loc);
        }

        // At least one floating operand: promote both to double.
        let (Some(a), Some(b)) = (self.tree.literal_as_f64(lhs), self.tree.literal_as_f64(rhs))
        else {
            return self.add(
                ExprKind::Binary { op, lhs, rhs },
                ty,
                ValueCategory::Rvalue,
                loc,
            );
        };

        if self.sx.types.is_integer(ty) {
            // Mixed comparison producing an integer.
            let folded = match op {
                BinaryOp::Lt => i32::from(a < b),
                BinaryOp::Gt => i32::from(a > b),
                BinaryOp::Le => i32::from(a <= b),
                BinaryOp::Ge => i32::from(a >= b),
                BinaryOp::Eq => i32::from(a == b),
                BinaryOp::Ne => i32::from(a != b),
                BinaryOp::LogAnd => i32::from(a != 0.0 && b != 0.0),
                BinaryOp::LogOr => i32::from(a != 0.0 || b != 0.0),
                _ => {
                    return self.add(
                        ExprKind::Binary { op, lhs, rhs },
                        ty,
                        ValueCategory::Rvalue,
                        loc,
                    );
                }
            };
            return self.int_literal(folded, loc);
        }

        let folded = match op {
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            _ => {
                return self.add(
                    ExprKind::Binary { op, lhs, rhs },
                    ty,
                    ValueCategory::Rvalue,
                    loc,
                );
            }
        };
        self.float_literal(folded, loc)
    }

    // ------------------------------------------------------------------
    // Ternary expression
    // ------------------------------------------------------------------

    pub fn ternary(
        &mut self,
        cond: ExprId,
        then: ExprId,
        otherwise: ExprId,
        op_loc: Location,
    ) -> ExprId {
        if !self.tree.is_correct(cond)
            || !self.tree.is_correct(then)
            || !self.tree.is_correct(otherwise)
        {
            return ExprId::BROKEN;
        }

        let cond_type = self.tree.ty(cond);
        let then_type = self.tree.ty(then);
        let else_type = self.tree.ty(otherwise);

        if !self.sx.types.is_scalar(cond_type) {
            let loc = self.tree.loc(cond);
            return self.error(ErrorCode::TypeMismatch, loc, "condition must be scalar");
        }

        let loc = self.tree.loc(cond).merge(self.tree.loc(otherwise));

        if self.sx.types.is_arithmetic(then_type) && self.sx.types.is_arithmetic(else_type) {
            let ty = self.usual_arithmetic_conversion(then_type, else_type);
            return self.fold_ternary(ty, cond, then, otherwise, loc);
        }

        if self.sx.types.is_pointer(then_type) && self.sx.types.is_null_pointer(else_type) {
            return self.fold_ternary(then_type, cond, then, otherwise, loc);
        }

        if self.sx.types.is_null_pointer(then_type) && self.sx.types.is_pointer(else_type) {
            return self.fold_ternary(else_type, cond, then, otherwise, loc);
        }

        if then_type == else_type {
            return self.fold_ternary(else_type, cond, then, otherwise, loc);
        }

        self.error(ErrorCode::TernaryIncompatible, op_loc, "")
    }

    fn fold_ternary(
        &mut self,
        ty: TypeId,
        cond: ExprId,
        then: ExprId,
        otherwise: ExprId,
        loc: Location,
    ) -> ExprId {
        if !self.tree.is_literal(cond) {
            return self.add(
                ExprKind::Ternary {
                    cond,
                    then,
                    otherwise,
                },
                ty,
                ValueCategory::Rvalue,
                loc,
            );
        }

        // A literal condition selects one branch; the other is dropped.
        let taken = match self.tree.expr(cond).kind {
            ExprKind::NullPtrLiteral => false,
            ExprKind::IntLiteral { value } => value != 0,
            ExprKind::FloatLiteral { value } => value != 0.0,
            _ => {
                return self.add(
                    ExprKind::Ternary {
                        cond,
                        then,
                        otherwise,
                    },
                    ty,
                    ValueCategory::Rvalue,
                    loc,
                );
            }
        };
        if taken { then } else { otherwise }
    }

    // ------------------------------------------------------------------
    // Casts
    // ------------------------------------------------------------------

    /// Explicit cast between arithmetic types.
    pub fn cast(&mut self, target: TypeId, operand: ExprId, loc: Location) -> ExprId {
        if !self.tree.is_correct(operand) {
            return ExprId::BROKEN;
        }

        let operand_type = self.tree.ty(operand);
        if !self.sx.types.is_arithmetic(target) || !self.sx.types.is_arithmetic(operand_type) {
            return self.error(ErrorCode::TypeMismatch, loc, "cast operands");
        }

        if self.sx.types.is_integer(target) == self.sx.types.is_integer(operand_type) {
            return operand;
        }

        if self.tree.is_literal(operand) {
            if self.sx.types.is_integer(target) {
                let value = self.tree.literal_as_f64(operand).unwrap_or(0.0);
                return self.int_literal(value as i32, loc);
            }
            let value = self.tree.literal_as_f64(operand).unwrap_or(0.0);
            return self.float_literal(value, loc);
        }

        self.add(
            ExprKind::Cast { operand },
            target,
            ValueCategory::Rvalue,
            loc,
        )
    }

    // ------------------------------------------------------------------
    // Initializer lists and assignment compatibility
    // ------------------------------------------------------------------

    pub fn init_list(&mut self, elements: Vec<ExprId>, l_loc: Location, r_loc: Location) -> ExprId {
        if elements.is_empty() {
            return self.error(ErrorCode::EmptyInitializer, l_loc, "");
        }

        let loc = l_loc.merge(r_loc);
        // The list is typed later, when checked against its target.
        self.add(
            ExprKind::InitList { elements },
            TypeId::VOID,
            ValueCategory::Rvalue,
            loc,
        )
    }

    /// The assignment-compatibility rule, shared by assignments, argument
    /// passing and initialization. Initializer lists recurse into their
    /// aggregate target and take on its type when they match.
    pub fn check_assignment_operands(&mut self, expected: TypeId, init: ExprId) -> bool {
        if let ExprKind::InitList { elements } = &self.tree.expr(init).kind {
            let elements = elements.clone();

            if self.sx.types.is_structure(expected) {
                let member_count = self.sx.types.members(expected).len();
                if member_count != elements.len() {
                    let detail =
                        format!("expected {}, found {}", member_count, elements.len());
                    let loc = self.tree.loc(init);
                    self.sx
                        .reporter
                        .error(ErrorCode::InitializerSizeMismatch, loc, &detail);
                    return false;
                }
                for (i, &element) in elements.iter().enumerate() {
                    if !self.tree.is_correct(element) {
                        return false;
                    }
                    let member_type = self.sx.types.members(expected)[i].ty;
                    if !self.check_assignment_operands(member_type, element) {
                        return false;
                    }
                }
                self.retype(init, expected);
                return true;
            }

            if self.sx.types.is_array(expected) {
                let element_type = self.sx.types.array_element(expected);
                for &element in &elements {
                    if !self.tree.is_correct(element) {
                        return false;
                    }
                    if !self.check_assignment_operands(element_type, element) {
                        return false;
                    }
                }
                self.retype(init, expected);
                return true;
            }

            let loc = self.tree.loc(init);
            self.sx
                .reporter
                .error(ErrorCode::InvalidInitializer, loc, "scalar target");
            return false;
        }

        let actual = self.tree.ty(init);

        if self.sx.types.is_floating(expected) && self.sx.types.is_integer(actual) {
            return true;
        }
        if self.sx.types.is_pointer(expected) && self.sx.types.is_null_pointer(actual) {
            return true;
        }
        if expected == actual {
            return true;
        }

        let loc = self.tree.loc(init);
        self.sx
            .reporter
            .error(ErrorCode::InvalidInitializer, loc, "");
        false
    }

    fn retype(&mut self, id: ExprId, ty: TypeId) {
        let mut node = self.tree.expr(id).clone();
        node.ty = ty;
        self.tree.replace_expr(id, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rvc_core::Location as L;

    fn ctx() -> (Syntax, Tree) {
        (Syntax::new(), Tree::new())
    }

    fn loc() -> L {
        L::default()
    }

    #[test]
    fn test_fold_integer_arithmetic() {
        let (mut sx, mut tree) = ctx();
        let mut b = ExprBuilder::new(&mut sx, &mut tree);

        let two = b.int_literal(2, loc());
        let three = b.int_literal(3, loc());
        let product = b.binary(two, three, BinaryOp::Mul, loc());
        let one = b.int_literal(1, loc());
        let sum = b.binary(one, product, BinaryOp::Add, loc());

        assert_eq!(tree.as_int_literal(sum), Some(7));
        assert!(!sx.was_error());
    }

    #[test]
    fn test_fold_full_integer_operator_set() {
        let cases: &[(i32, BinaryOp, i32, i32)] = &[
            (7, BinaryOp::Div, 2, 3),
            (7, BinaryOp::Rem, 2, 1),
            (1, BinaryOp::Shl, 4, 16),
            (-8, BinaryOp::Shr, 1, -4),
            (6, BinaryOp::And, 3, 2),
            (6, BinaryOp::Or, 3, 7),
            (6, BinaryOp::Xor, 3, 5),
            (2, BinaryOp::Lt, 3, 1),
            (2, BinaryOp::Ge, 3, 0),
            (3, BinaryOp::Eq, 3, 1),
            (3, BinaryOp::Ne, 3, 0),
            (2, BinaryOp::LogAnd, 0, 0),
            (0, BinaryOp::LogOr, 5, 1),
        ];
        for &(a, op, c, expected) in cases {
            let (mut sx, mut tree) = ctx();
            let mut b = ExprBuilder::new(&mut sx, &mut tree);
            let lhs = b.int_literal(a, loc());
            let rhs = b.int_literal(c, loc());
            let result = b.binary(lhs, rhs, op, loc());
            assert_eq!(tree.as_int_literal(result), Some(expected), "{:?}", op);
        }
    }

    #[test]
    fn test_division_by_zero_is_not_folded() {
        let (mut sx, mut tree) = ctx();
        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let lhs = b.int_literal(1, loc());
        let rhs = b.int_literal(0, loc());
        let div = b.binary(lhs, rhs, BinaryOp::Div, loc());

        assert!(tree.as_int_literal(div).is_none());
        assert!(matches!(
            tree.expr(div).kind,
            ExprKind::Binary {
                op: BinaryOp::Div,
                ..
            }
        ));
        assert!(!sx.was_error());
    }

    #[test]
    fn test_mixed_fold_promotes_to_double() {
        let (mut sx, mut tree) = ctx();
        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let lhs = b.int_literal(1, loc());
        let rhs = b.float_literal(0.5, loc());
        let sum = b.binary(lhs, rhs, BinaryOp::Add, loc());

        assert_eq!(tree.as_float_literal(sum), Some(1.5));
        assert_eq!(tree.ty(sum), TypeId::FLOAT);
    }

    #[test]
    fn test_short_circuit_fold_drops_rhs() {
        let (mut sx, mut tree) = ctx();
        sx.idents.declare("x", TypeId::INT);
        let mut b = ExprBuilder::new(&mut sx, &mut tree);

        let zero = b.int_literal(0, loc());
        let x = b.identifier("x", loc());
        let and = b.binary(zero, x, BinaryOp::LogAnd, loc());
        assert_eq!(tree.as_int_literal(and), Some(0));

        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let one = b.int_literal(1, loc());
        let x = b.identifier("x", loc());
        let or = b.binary(one, x, BinaryOp::LogOr, loc());
        assert_eq!(tree.as_int_literal(or), Some(1));

        // `1 && x` cannot fold: the RHS decides at run time.
        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let one = b.int_literal(1, loc());
        let x = b.identifier("x", loc());
        let and = b.binary(one, x, BinaryOp::LogAnd, loc());
        assert!(tree.as_int_literal(and).is_none());
    }

    #[test]
    fn test_ternary_fold_selects_branch() {
        let (mut sx, mut tree) = ctx();
        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let cond = b.int_literal(1, loc());
        let then = b.int_literal(10, loc());
        let otherwise = b.int_literal(20, loc());
        let pick = b.ternary(cond, then, otherwise, loc());
        assert_eq!(pick, then);
    }

    #[test]
    fn test_undeclared_identifier_is_broken() {
        let (mut sx, mut tree) = ctx();
        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let id = b.identifier("nope", loc());
        assert!(id.is_broken());
        assert!(sx.was_error());
    }

    #[test]
    fn test_broken_operand_posts_no_second_error() {
        let (mut sx, mut tree) = ctx();
        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let bad = b.identifier("nope", loc());
        let one = b.int_literal(1, loc());
        let sum = b.binary(bad, one, BinaryOp::Add, loc());
        assert!(sum.is_broken());
        assert_eq!(sx.reporter.error_count(), 1);
    }

    #[test]
    fn test_subscript_rules() {
        let (mut sx, mut tree) = ctx();
        let arr_ty = sx.types.array_of(TypeId::INT);
        sx.idents.declare("a", arr_ty);
        sx.idents.declare("f", TypeId::FLOAT);

        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let a = b.identifier("a", loc());
        let i = b.int_literal(1, loc());
        let elem = b.subscript(a, i, loc(), loc());
        assert_eq!(tree.ty(elem), TypeId::INT);
        assert!(tree.is_lvalue(elem));

        // Non-integer index is rejected.
        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let a = b.identifier("a", loc());
        let f = b.identifier("f", loc());
        let bad = b.subscript(a, f, loc(), loc());
        assert!(bad.is_broken());

        // Subscripting a non-array is rejected.
        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let f = b.identifier("f", loc());
        let i = b.int_literal(0, loc());
        let bad = b.subscript(f, i, loc(), loc());
        assert!(bad.is_broken());
    }

    #[test]
    fn test_call_arity_and_compatibility() {
        let (mut sx, mut tree) = ctx();
        let fn_ty = sx.types.function(TypeId::FLOAT, vec![TypeId::FLOAT]);
        sx.idents.declare("f", fn_ty);

        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let f = b.identifier("f", loc());
        // int argument converts to the floating parameter.
        let arg = b.int_literal(3, loc());
        let call = b.call(f, vec![arg], loc(), loc());
        assert_eq!(tree.ty(call), TypeId::FLOAT);
        assert!(!tree.is_lvalue(call));

        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let f = b.identifier("f", loc());
        let bad = b.call(f, vec![], loc(), loc());
        assert!(bad.is_broken());
    }

    #[test]
    fn test_member_rules() {
        let (mut sx, mut tree) = ctx();
        let st = sx.types.structure(vec![
            rvc_core::Member {
                name: "x".to_string(),
                ty: TypeId::INT,
            },
            rvc_core::Member {
                name: "y".to_string(),
                ty: TypeId::FLOAT,
            },
        ]);
        let ptr = sx.types.pointer_to(st);
        sx.idents.declare("s", st);
        sx.idents.declare("p", ptr);

        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let s = b.identifier("s", loc());
        let y = b.member(s, "y", false, loc(), loc());
        assert_eq!(tree.ty(y), TypeId::FLOAT);
        assert!(tree.is_lvalue(y));

        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let p = b.identifier("p", loc());
        let x = b.member(p, "x", true, loc(), loc());
        assert_eq!(tree.ty(x), TypeId::INT);
        assert!(tree.is_lvalue(x));

        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let s = b.identifier("s", loc());
        let bad = b.member(s, "z", false, loc(), loc());
        assert!(bad.is_broken());
    }

    #[test]
    fn test_address_and_indirection() {
        let (mut sx, mut tree) = ctx();
        sx.idents.declare("x", TypeId::INT);

        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let x = b.identifier("x", loc());
        let addr = b.unary(x, UnaryOp::Address, loc());
        let deref = b.unary(addr, UnaryOp::Indirection, loc());

        // *(&x) has the type and category of x.
        assert_eq!(tree.ty(deref), TypeId::INT);
        assert!(tree.is_lvalue(deref));
        assert!(!tree.is_lvalue(addr));

        // &rvalue is rejected.
        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let one = b.int_literal(1, loc());
        let bad = b.unary(one, UnaryOp::Address, loc());
        assert!(bad.is_broken());
    }

    #[test]
    fn test_float_equality_warns() {
        let (mut sx, mut tree) = ctx();
        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let a = b.float_literal(1.0, loc());
        let c = b.float_literal(2.0, loc());
        let eq = b.binary(a, c, BinaryOp::Eq, loc());
        assert_eq!(tree.as_int_literal(eq), Some(0));
        assert!(!sx.was_error());
        assert_eq!(sx.reporter.diagnostics().len(), 1);
    }

    #[test]
    fn test_empty_initializer_rejected() {
        let (mut sx, mut tree) = ctx();
        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let bad = b.init_list(vec![], loc(), loc());
        assert!(bad.is_broken());
        assert!(sx.was_error());
    }

    #[test]
    fn test_initializer_against_structure() {
        let (mut sx, mut tree) = ctx();
        let st = sx.types.structure(vec![
            rvc_core::Member {
                name: "a".to_string(),
                ty: TypeId::INT,
            },
            rvc_core::Member {
                name: "b".to_string(),
                ty: TypeId::FLOAT,
            },
        ]);

        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let x = b.int_literal(1, loc());
        let y = b.int_literal(2, loc());
        let list = b.init_list(vec![x, y], loc(), loc());
        assert!(b.check_assignment_operands(st, list));
        assert_eq!(tree.ty(list), st);

        // Wrong arity.
        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let x = b.int_literal(1, loc());
        let short = b.init_list(vec![x], loc(), loc());
        assert!(!b.check_assignment_operands(st, short));
        assert!(sx.was_error());
    }

    #[test]
    fn test_cast_folds_literals() {
        let (mut sx, mut tree) = ctx();
        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let f = b.float_literal(2.9, loc());
        let as_int = b.cast(TypeId::INT, f, loc());
        assert_eq!(tree.as_int_literal(as_int), Some(2));

        let mut b = ExprBuilder::new(&mut sx, &mut tree);
        let i = b.int_literal(3, loc());
        let as_float = b.cast(TypeId::FLOAT, i, loc());
        assert_eq!(tree.as_float_literal(as_float), Some(3.0));
    }
}
