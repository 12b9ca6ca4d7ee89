//! Expression lowering.
//!
//! Every expression lowers to an [`Rvalue`]; expressions with lvalue
//! category lower to an [`Lvalue`] first and are loaded on demand. The
//! address/value duality of C shows up here: array- and structure-typed
//! values are addresses of element zero, scalar values are register
//! contents.
//!
//! Conditions are lowered through inherited true/false labels so that
//! relational and logical operators branch directly instead of
//! materializing a 0/1 that is immediately tested again.

use super::instructions::{
    arith_immediate_instruction, arith_instruction, branch_instruction, float_compare, Ins,
};
use super::registers::Reg;
use super::state::{ConstValue, Label, Lvalue, LvalueKind, Rvalue, RvalueKind, WORD};
use super::{CodeGenError, Encoder};
use crate::ast::{BinaryOp, ExprId, ExprKind, UnaryOp};
use rvc_core::{ErrorCode, Location, TypeId};
use std::fmt::Write as _;

/// Fits the immediate operand of `addi`/`andi`/... instructions.
fn fits_imm12(value: i64) -> bool {
    (-2048..=2047).contains(&value)
}

impl Encoder<'_> {
    pub(super) fn node_unexpected(&mut self, loc: Location, detail: &str) {
        self.sx.reporter.error(ErrorCode::NodeUnexpected, loc, detail);
    }

    // ------------------------------------------------------------------
    // Lvalues
    // ------------------------------------------------------------------

    pub(super) fn emit_lvalue(&mut self, e: ExprId) -> Result<Lvalue, CodeGenError> {
        let node = self.tree.expr(e);
        match node.kind {
            ExprKind::Identifier { ident } => match self.displacements.get(&ident) {
                Some(lval) => Ok(*lval),
                None => {
                    self.node_unexpected(node.loc, "identifier without displacement");
                    Ok(Lvalue::on_stack(Reg::Fp, 0, node.ty))
                }
            },

            ExprKind::Subscript { base, index } => self.emit_subscript_lvalue(e, base, index),

            ExprKind::Member {
                base,
                member_index,
                is_arrow,
            } => self.emit_member_lvalue(e, base, member_index, is_arrow),

            ExprKind::Unary {
                op: UnaryOp::Indirection,
                operand,
            } => {
                let pointer = self.emit_expression(operand)?;
                let pointer = self.materialize(pointer)?;
                let reg = pointer.register().expect("materialized pointer");
                Ok(Lvalue::on_stack(reg, 0, self.tree.ty(e)))
            }

            _ => {
                self.node_unexpected(node.loc, "expression cannot be an lvalue");
                Ok(Lvalue::on_stack(Reg::Fp, 0, node.ty))
            }
        }
    }

    /// Element `base[index]`. The loaded base is the address of element
    /// zero; elements are laid out at descending addresses.
    fn emit_subscript_lvalue(
        &mut self,
        e: ExprId,
        base: ExprId,
        index: ExprId,
    ) -> Result<Lvalue, CodeGenError> {
        let ty = self.tree.ty(e);
        let elem_size = self.sx.types.size_of(ty) as i64;

        let base_value = self.emit_expression(base)?;
        let base_value = self.materialize(base_value)?;
        let base_reg = base_value.register().expect("array base address");

        let index_value = self.emit_expression(index)?;

        if let Some(i) = index_value.as_int_const() {
            return Ok(Lvalue::on_stack(base_reg, (-i * elem_size) as i32, ty));
        }

        // A borrowed base register belongs to a named variable and must
        // not be clobbered by the address computation below.
        let base_reg = if base_value.from_lvalue {
            let copy = self.pool.acquire_int()?;
            self.ins_rr(Ins::Mv, copy, base_reg)?;
            copy
        } else {
            base_reg
        };

        let offset = self.pool.acquire_int()?;
        self.emit_arith_binary(offset, &index_value, &Rvalue::int_const(elem_size), BinaryOp::Mul)?;
        self.free_rvalue(&index_value);

        self.ins_rrr(Ins::Sub, base_reg, base_reg, offset)?;
        self.pool.release(offset);

        Ok(Lvalue::on_stack(base_reg, 0, ty))
    }

    fn emit_member_lvalue(
        &mut self,
        e: ExprId,
        base: ExprId,
        member_index: usize,
        is_arrow: bool,
    ) -> Result<Lvalue, CodeGenError> {
        let base_type = self.tree.ty(base);
        let struct_type = if is_arrow {
            self.sx.types.pointer_element(base_type)
        } else {
            base_type
        };

        let member_displ: usize = self.sx.types.members(struct_type)[..member_index]
            .iter()
            .map(|m| self.sx.types.size_of(m.ty))
            .sum();
        let ty = self.tree.ty(e);

        if is_arrow {
            let pointer = self.emit_expression(base)?;
            let pointer = self.materialize(pointer)?;
            let reg = pointer.register().expect("struct pointer");
            return Ok(Lvalue::on_stack(reg, member_displ as i32, ty));
        }

        let base_lvalue = self.emit_lvalue(base)?;
        match base_lvalue.kind {
            LvalueKind::Stack { base, displ } => {
                Ok(Lvalue::on_stack(base, displ + member_displ as i32, ty))
            }
            LvalueKind::Register(_) => {
                self.node_unexpected(self.tree.loc(e), "member of register-resident structure");
                Ok(Lvalue::on_stack(Reg::Fp, 0, ty))
            }
        }
    }

    // ------------------------------------------------------------------
    // Loads and stores
    // ------------------------------------------------------------------

    /// Materializes a constant into a fresh register; register rvalues
    /// pass through untouched.
    pub(super) fn materialize(&mut self, value: Rvalue) -> Result<Rvalue, CodeGenError> {
        match value.kind {
            RvalueKind::Const(_) => self.emit_load_of_immediate(&value),
            RvalueKind::Register(_) => Ok(value),
            RvalueKind::Void => Err(CodeGenError::Logic(
                "cannot materialize a void value".to_string(),
            )),
        }
    }

    pub(super) fn emit_load_of_immediate(
        &mut self,
        value: &Rvalue,
    ) -> Result<Rvalue, CodeGenError> {
        match value.kind {
            RvalueKind::Const(ConstValue::Int(v)) => {
                let reg = self.pool.acquire_int()?;
                self.li(reg, v)?;
                Ok(Rvalue::reg(reg, value.ty))
            }
            RvalueKind::Const(ConstValue::Float(v)) => {
                let bits = self.pool.acquire_int()?;
                self.li_float_bits(bits, v)?;
                let reg = self.pool.acquire_float()?;
                self.ins_rr(Ins::FmvDX, reg, bits)?;
                self.pool.release(bits);
                Ok(Rvalue::reg(reg, value.ty))
            }
            RvalueKind::Const(ConstValue::Str(index)) => {
                let reg = self.pool.acquire_int()?;
                self.la(reg, Label::Str(index.index()))?;
                Ok(Rvalue::reg(reg, value.ty))
            }
            _ => Err(CodeGenError::Logic(
                "immediate load of a non-constant value".to_string(),
            )),
        }
    }

    pub(super) fn emit_load_of_lvalue(&mut self, lval: &Lvalue) -> Result<Rvalue, CodeGenError> {
        self.load_lvalue(lval, true)
    }

    /// `free_base` controls whether a temporary base register is released
    /// after the load; compound assignments keep it for the later store.
    pub(super) fn load_lvalue(
        &mut self,
        lval: &Lvalue,
        free_base: bool,
    ) -> Result<Rvalue, CodeGenError> {
        let (base, displ) = match lval.kind {
            LvalueKind::Register(reg) => return Ok(Rvalue::reg_borrowed(reg, lval.ty)),
            LvalueKind::Stack { base, displ } => (base, displ),
        };

        if self.sx.types.is_structure(lval.ty) {
            // A structure "value" is the address of its first word.
            let reg = self.pool.acquire_int()?;
            self.ins_rri(Ins::Addi, reg, base, displ as i64)?;
            if free_base {
                self.pool.release(base);
            }
            return Ok(Rvalue::reg(reg, lval.ty));
        }

        // Scalars, pointers and arrays (the slot holds the address of
        // element zero) are one plain load.
        let is_floating = self.sx.types.is_floating(lval.ty);
        let reg = self.acquire_for(lval.ty)?;
        let ins = if is_floating { Ins::Fld } else { Ins::Lw };
        self.ins_mem(ins, reg, displ, base)?;
        if free_base {
            self.pool.release(base);
        }
        Ok(Rvalue::reg(reg, lval.ty))
    }

    pub(super) fn emit_store_of_rvalue(
        &mut self,
        target: &Lvalue,
        value: &Rvalue,
    ) -> Result<(), CodeGenError> {
        self.store_rvalue(target, value, true)
    }

    /// `free_base` controls whether a temporary base register is released
    /// after the store; aggregate initialization stores through the same
    /// base repeatedly and keeps it.
    pub(super) fn store_rvalue(
        &mut self,
        target: &Lvalue,
        value: &Rvalue,
        free_base: bool,
    ) -> Result<(), CodeGenError> {
        if matches!(value.kind, RvalueKind::Void) {
            self.node_unexpected(Location::default(), "store of a void value");
            return Ok(());
        }

        if let LvalueKind::Register(target_reg) = target.kind {
            return self.emit_move_rvalue_to_register(target_reg, value);
        }
        let LvalueKind::Stack { base, displ } = target.kind else {
            unreachable!()
        };

        if self.sx.types.is_structure(target.ty) {
            self.node_unexpected(Location::default(), "scalar store into a structure");
            return Ok(());
        }

        let materialized_here = value.is_const();
        let source = self.materialize(*value)?;
        let source_reg = source.register().expect("materialized store source");

        let (store_reg, converted) =
            if self.sx.types.is_floating(target.ty) && !source_reg.is_float() {
                // Implicit integer-to-floating conversion on store.
                let reg = self.pool.acquire_float()?;
                self.ins_rr(Ins::FcvtDW, reg, source_reg)?;
                (reg, true)
            } else {
                (source_reg, false)
            };

        let ins = if store_reg.is_float() { Ins::Fsd } else { Ins::Sw };
        self.ins_mem(ins, store_reg, displ, base)?;

        if converted {
            self.pool.release(store_reg);
        }
        if materialized_here {
            self.pool.release(source_reg);
        }
        if free_base {
            self.pool.release(base);
        }
        Ok(())
    }

    pub(super) fn emit_move_rvalue_to_register(
        &mut self,
        target: Reg,
        value: &Rvalue,
    ) -> Result<(), CodeGenError> {
        match value.kind {
            RvalueKind::Const(ConstValue::Int(v)) => {
                if target.is_float() {
                    let staged = self.emit_load_of_immediate(&Rvalue::float_const(v as f64))?;
                    let reg = staged.register().expect("staged float");
                    self.ins_rr(Ins::FmvD, target, reg)?;
                    self.pool.release(reg);
                } else {
                    self.li(target, v)?;
                }
            }
            RvalueKind::Const(ConstValue::Float(v)) => {
                let bits = self.pool.acquire_int()?;
                self.li_float_bits(bits, v)?;
                if target.is_float() {
                    self.ins_rr(Ins::FmvDX, target, bits)?;
                } else {
                    self.ins_rr(Ins::Mv, target, bits)?;
                }
                self.pool.release(bits);
            }
            RvalueKind::Const(ConstValue::Str(index)) => {
                self.la(target, Label::Str(index.index()))?;
            }
            RvalueKind::Register(reg) => {
                if reg == target {
                    return Ok(());
                }
                match (target.is_float(), reg.is_float()) {
                    (true, true) => self.ins_rr(Ins::FmvD, target, reg)?,
                    (false, false) => self.ins_rr(Ins::Mv, target, reg)?,
                    (true, false) => self.ins_rr(Ins::FcvtDW, target, reg)?,
                    (false, true) => self.ins_rr(Ins::FcvtWD, target, reg)?,
                }
            }
            RvalueKind::Void => {
                self.node_unexpected(Location::default(), "move of a void value");
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Arithmetic and comparisons
    // ------------------------------------------------------------------

    /// `dest = lhs op rhs` for arithmetic, bitwise and shift operators.
    /// Immediate instruction forms are used when one operand is a
    /// small-enough constant; commutative operators may swap.
    pub(super) fn emit_arith_binary(
        &mut self,
        dest: Reg,
        lhs: &Rvalue,
        rhs: &Rvalue,
        op: BinaryOp,
    ) -> Result<(), CodeGenError> {
        if dest.is_float() {
            let (l, l_owned) = self.reg_operand(lhs)?;
            let (r, r_owned) = self.reg_operand(rhs)?;
            let ins = arith_instruction(op, true)
                .ok_or_else(|| CodeGenError::Logic(format!("no float instruction for {:?}", op)))?;
            self.ins_rrr(ins, dest, l, r)?;
            if l_owned {
                self.pool.release(l);
            }
            if r_owned {
                self.pool.release(r);
            }
            return Ok(());
        }

        let base_op = op.compound_base().unwrap_or(op);
        let commutative = matches!(
            base_op,
            BinaryOp::Add | BinaryOp::And | BinaryOp::Or | BinaryOp::Xor
        );

        // Immediate form with the constant on the right. Shift amounts
        // must be legal for `slli`/`srai`.
        if let Some(imm) = rhs.as_int_const() {
            let shift = matches!(base_op, BinaryOp::Shl | BinaryOp::Shr);
            let imm_ok = if shift {
                (0..32).contains(&imm)
            } else {
                fits_imm12(imm)
            };
            if imm_ok
                && let Some(ins) = arith_immediate_instruction(base_op)
            {
                let (l, l_owned) = self.reg_operand(lhs)?;
                self.ins_rri(ins, dest, l, imm)?;
                if l_owned {
                    self.pool.release(l);
                }
                return Ok(());
            }
            if base_op == BinaryOp::Sub && fits_imm12(-imm) {
                let (l, l_owned) = self.reg_operand(lhs)?;
                self.ins_rri(Ins::Addi, dest, l, -imm)?;
                if l_owned {
                    self.pool.release(l);
                }
                return Ok(());
            }
        }

        // Commutative operators take the immediate form with swapped
        // operands.
        if let Some(imm) = lhs.as_int_const()
            && commutative
            && fits_imm12(imm)
            && let Some(ins) = arith_immediate_instruction(base_op)
        {
            let (r, r_owned) = self.reg_operand(rhs)?;
            self.ins_rri(ins, dest, r, imm)?;
            if r_owned {
                self.pool.release(r);
            }
            return Ok(());
        }

        let (l, l_owned) = self.reg_operand(lhs)?;
        let (r, r_owned) = self.reg_operand(rhs)?;
        let ins = arith_instruction(op, false)
            .ok_or_else(|| CodeGenError::Logic(format!("no instruction for {:?}", op)))?;
        self.ins_rrr(ins, dest, l, r)?;
        if l_owned {
            self.pool.release(l);
        }
        if r_owned {
            self.pool.release(r);
        }
        Ok(())
    }

    /// Loads an operand into a register, reporting whether this call
    /// created (and must release) the register.
    fn reg_operand(&mut self, value: &Rvalue) -> Result<(Reg, bool), CodeGenError> {
        if let Some(reg) = value.register() {
            return Ok((reg, false));
        }
        let loaded = self.materialize(*value)?;
        Ok((loaded.register().expect("loaded operand"), true))
    }

    /// Materializes `lhs op rhs` as 0/1 in `dest`: `li 1` on the
    /// fall-through path, `li 0` behind the taken branch. Consumes both
    /// operands (owned registers are released here).
    fn emit_relational_into(
        &mut self,
        dest: Reg,
        lhs: &Rvalue,
        rhs: &Rvalue,
        op: BinaryOp,
    ) -> Result<(), CodeGenError> {
        let floating = self.sx.types.is_floating(lhs.ty) || self.sx.types.is_floating(rhs.ty);

        if floating {
            let lhs = self.normalize_to_float(*lhs)?;
            let rhs = self.normalize_to_float(*rhs)?;
            let l = lhs.register().expect("float operand");
            let r = rhs.register().expect("float operand");
            let (ins, swap, negate) = float_compare(op)
                .ok_or_else(|| CodeGenError::Logic(format!("not a comparison: {:?}", op)))?;
            let (a, b) = if swap { (r, l) } else { (l, r) };
            self.ins_rrr(ins, dest, a, b)?;
            if negate {
                self.ins_rri(Ins::Sltiu, dest, dest, 1)?;
            }
            self.free_rvalue(&lhs);
            self.free_rvalue(&rhs);
            return Ok(());
        }

        let (l, l_owned) = self.reg_operand(lhs)?;
        let (r, r_owned) = self.reg_operand(rhs)?;
        let ins = branch_instruction(op)
            .ok_or_else(|| CodeGenError::Logic(format!("not a comparison: {:?}", op)))?;

        let end = Label::End(self.new_label_num());
        self.li(dest, 1)?;
        self.branch(ins, l, r, end)?;
        self.li(dest, 0)?;
        self.label_decl(end)?;

        if l_owned {
            self.pool.release(l);
        }
        if r_owned {
            self.pool.release(r);
        }
        self.free_rvalue(lhs);
        self.free_rvalue(rhs);
        Ok(())
    }

    /// Converts an integer rvalue to floating; floating values pass
    /// through.
    pub(super) fn normalize_to_float(&mut self, value: Rvalue) -> Result<Rvalue, CodeGenError> {
        if self.sx.types.is_floating(value.ty) {
            return self.materialize(value);
        }
        if let Some(v) = value.as_int_const() {
            return self.materialize(Rvalue::float_const(v as f64));
        }
        let reg = value.register().expect("integer operand");
        let converted = self.pool.acquire_float()?;
        self.ins_rr(Ins::FcvtDW, converted, reg)?;
        self.free_rvalue(&value);
        Ok(Rvalue::reg(converted, TypeId::FLOAT))
    }

    // ------------------------------------------------------------------
    // Conditions: inherited true/false labels
    // ------------------------------------------------------------------

    /// Lowers `cond` as control flow: execution reaches `on_true` exactly
    /// when the condition holds, `on_false` otherwise. Relational and
    /// logical operators branch directly; everything else is materialized
    /// and tested against zero.
    pub(super) fn emit_condition(
        &mut self,
        cond: ExprId,
        on_true: Label,
        on_false: Label,
    ) -> Result<(), CodeGenError> {
        match self.tree.expr(cond).kind {
            ExprKind::Binary { op, lhs, rhs } if op.is_relational() => {
                let floating = self.sx.types.is_floating(self.tree.ty(lhs))
                    || self.sx.types.is_floating(self.tree.ty(rhs));
                let lhs_value = self.emit_expression(lhs)?;
                let rhs_value = self.emit_expression(rhs)?;

                if floating {
                    let flag = self.pool.acquire_int()?;
                    self.emit_relational_into(flag, &lhs_value, &rhs_value, op)?;
                    self.branch_z(Ins::Bnez, flag, on_true)?;
                    self.pool.release(flag);
                } else {
                    let (l, l_owned) = self.reg_operand(&lhs_value)?;
                    let (r, r_owned) = self.reg_operand(&rhs_value)?;
                    let ins = branch_instruction(op).expect("relational operator");
                    self.branch(ins, l, r, on_true)?;
                    if l_owned {
                        self.pool.release(l);
                    }
                    if r_owned {
                        self.pool.release(r);
                    }
                    self.free_rvalue(&lhs_value);
                    self.free_rvalue(&rhs_value);
                }
                self.jump(on_false)
            }

            ExprKind::Binary {
                op: BinaryOp::LogAnd,
                lhs,
                rhs,
            } => {
                let mid = Label::Then(self.new_label_num());
                self.emit_condition(lhs, mid, on_false)?;
                self.label_decl(mid)?;
                self.emit_condition(rhs, on_true, on_false)
            }

            ExprKind::Binary {
                op: BinaryOp::LogOr,
                lhs,
                rhs,
            } => {
                let mid = Label::Else(self.new_label_num());
                self.emit_condition(lhs, on_true, mid)?;
                self.label_decl(mid)?;
                self.emit_condition(rhs, on_true, on_false)
            }

            ExprKind::Unary {
                op: UnaryOp::LogNot,
                operand,
            } => self.emit_condition(operand, on_false, on_true),

            ExprKind::IntLiteral { value } => {
                self.jump(if value != 0 { on_true } else { on_false })
            }
            ExprKind::FloatLiteral { value } => {
                self.jump(if value != 0.0 { on_true } else { on_false })
            }
            ExprKind::NullPtrLiteral => self.jump(on_false),

            _ => {
                let value = self.emit_expression(cond)?;
                let (reg, owned) = self.reg_operand(&value)?;
                self.branch_z(Ins::Bnez, reg, on_true)?;
                if owned {
                    self.pool.release(reg);
                }
                self.free_rvalue(&value);
                self.jump(on_false)
            }
        }
    }

    // ------------------------------------------------------------------
    // Expression dispatch
    // ------------------------------------------------------------------

    pub(super) fn emit_expression(&mut self, e: ExprId) -> Result<Rvalue, CodeGenError> {
        let node = self.tree.expr(e);
        match node.kind {
            ExprKind::IntLiteral { value } => Ok(Rvalue {
                kind: RvalueKind::Const(ConstValue::Int(value as i64)),
                ty: node.ty,
                from_lvalue: false,
            }),
            ExprKind::FloatLiteral { value } => Ok(Rvalue::float_const(value)),
            ExprKind::StringLiteral { index } => Ok(Rvalue {
                kind: RvalueKind::Const(ConstValue::Str(index)),
                ty: node.ty,
                from_lvalue: false,
            }),
            ExprKind::NullPtrLiteral => Ok(Rvalue {
                kind: RvalueKind::Const(ConstValue::Int(0)),
                ty: node.ty,
                from_lvalue: false,
            }),

            _ if self.tree.is_lvalue(e) => {
                let lval = self.emit_lvalue(e)?;
                self.emit_load_of_lvalue(&lval)
            }

            ExprKind::Call { .. } => self.emit_call_expression(e),
            ExprKind::Cast { operand } => self.emit_cast_expression(e, operand),
            ExprKind::Unary { op, operand } => self.emit_unary_expression(e, op, operand),
            ExprKind::Binary { op, lhs, rhs } if op.is_assignment() => {
                self.emit_assignment_expression(op, lhs, rhs)
            }
            ExprKind::Binary { op, lhs, rhs } => self.emit_binary_expression(e, op, lhs, rhs),
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => self.emit_ternary_expression(e, cond, then, otherwise),
            ExprKind::Upb { array, .. } => self.emit_upb_expression(array),

            _ => {
                self.node_unexpected(node.loc, "expression kind not lowerable");
                Ok(Rvalue::VOID)
            }
        }
    }

    /// Lowers an expression for its effect only and releases its result.
    pub(super) fn emit_void_expression(&mut self, e: ExprId) -> Result<Rvalue, CodeGenError> {
        if self.tree.is_literal(e) {
            return Ok(Rvalue::VOID);
        }
        if self.tree.is_lvalue(e) {
            // Address computation may carry side effects (index
            // expressions); the value itself is dropped.
            let lval = self.emit_lvalue(e)?;
            if let LvalueKind::Stack { base, .. } = lval.kind {
                self.pool.release(base);
            }
            return Ok(Rvalue::VOID);
        }
        let value = self.emit_expression(e)?;
        self.free_rvalue(&value);
        Ok(Rvalue::VOID)
    }

    fn emit_upb_expression(&mut self, array: ExprId) -> Result<Rvalue, CodeGenError> {
        let address = self.emit_expression(array)?;
        let address = self.materialize(address)?;
        let reg = address.register().expect("array address");
        // The dimension size sits one word above element zero.
        let size_lvalue = Lvalue::on_stack(reg, WORD, TypeId::INT);
        self.emit_load_of_lvalue(&size_lvalue)
    }

    fn emit_cast_expression(
        &mut self,
        e: ExprId,
        operand: ExprId,
    ) -> Result<Rvalue, CodeGenError> {
        let target = self.tree.ty(e);
        let value = self.emit_expression(operand)?;

        if self.sx.types.is_floating(target) {
            return self.normalize_to_float(value);
        }

        if self.sx.types.is_floating(value.ty) {
            let value = self.materialize(value)?;
            let reg = value.register().expect("float operand");
            let dest = self.pool.acquire_int()?;
            // Truncating conversion, as C requires.
            writeln!(&mut self.out, "\tfcvt.w.d {}, {}, rtz", dest, reg)?;
            self.free_rvalue(&value);
            return Ok(Rvalue::reg(dest, target));
        }

        // Integer-class to integer-class: nothing to do.
        Ok(value)
    }

    fn emit_unary_expression(
        &mut self,
        e: ExprId,
        op: UnaryOp,
        operand: ExprId,
    ) -> Result<Rvalue, CodeGenError> {
        match op {
            UnaryOp::PostInc | UnaryOp::PostDec | UnaryOp::PreInc | UnaryOp::PreDec => {
                self.emit_increment_expression(op, operand)
            }

            UnaryOp::Plus => self.emit_expression(operand),

            UnaryOp::Minus => {
                let value = self.emit_expression(operand)?;
                let value = self.materialize(value)?;
                let (dest, value) = self.reuse_or_acquire(value)?;
                let src = value.register().expect("operand register");
                if dest.is_float() {
                    self.ins_rr(Ins::FnegD, dest, src)?;
                } else {
                    self.ins_rr(Ins::Neg, dest, src)?;
                }
                self.free_rvalue(&value);
                Ok(Rvalue::reg(dest, value.ty))
            }

            UnaryOp::BitNot => {
                let value = self.emit_expression(operand)?;
                let value = self.materialize(value)?;
                let (dest, value) = self.reuse_or_acquire(value)?;
                let src = value.register().expect("operand register");
                self.ins_rr(Ins::Not, dest, src)?;
                self.free_rvalue(&value);
                Ok(Rvalue::reg(dest, TypeId::INT))
            }

            UnaryOp::LogNot => {
                let value = self.emit_expression(operand)?;
                if self.sx.types.is_floating(value.ty) {
                    let value = self.materialize(value)?;
                    let zero = self.emit_load_of_immediate(&Rvalue::float_const(0.0))?;
                    let dest = self.pool.acquire_int()?;
                    self.ins_rrr(
                        Ins::FeqD,
                        dest,
                        value.register().expect("float operand"),
                        zero.register().expect("float zero"),
                    )?;
                    self.free_rvalue(&value);
                    self.free_rvalue(&zero);
                    return Ok(Rvalue::reg(dest, TypeId::INT));
                }
                let value = self.materialize(value)?;
                let (dest, value) = self.reuse_or_acquire(value)?;
                let src = value.register().expect("operand register");
                self.ins_rri(Ins::Sltiu, dest, src, 1)?;
                self.free_rvalue(&value);
                Ok(Rvalue::reg(dest, TypeId::INT))
            }

            UnaryOp::Abs => {
                let value = self.emit_expression(operand)?;
                let value = self.materialize(value)?;
                let (dest, value) = self.reuse_or_acquire(value)?;
                let src = value.register().expect("operand register");
                if dest.is_float() {
                    self.ins_rr(Ins::FabsD, dest, src)?;
                } else {
                    // No abs on the target: sign-extend, xor, subtract.
                    let sign = self.pool.acquire_int()?;
                    self.ins_rri(Ins::Srai, sign, src, 31)?;
                    self.ins_rrr(Ins::Xor, dest, src, sign)?;
                    self.ins_rrr(Ins::Sub, dest, dest, sign)?;
                    self.pool.release(sign);
                }
                self.free_rvalue(&value);
                Ok(Rvalue::reg(dest, value.ty))
            }

            UnaryOp::Address => {
                let lval = self.emit_lvalue(operand)?;
                match lval.kind {
                    LvalueKind::Stack { base, displ } => {
                        let dest = self.pool.acquire_int()?;
                        self.ins_rri(Ins::Addi, dest, base, displ as i64)?;
                        self.pool.release(base);
                        Ok(Rvalue::reg(dest, self.tree.ty(e)))
                    }
                    LvalueKind::Register(_) => {
                        self.node_unexpected(self.tree.loc(e), "address of register variable");
                        Ok(Rvalue::VOID)
                    }
                }
            }

            UnaryOp::Indirection => {
                // Handled through the lvalue path; reaching here means the
                // builder mis-categorized the node.
                self.node_unexpected(self.tree.loc(e), "indirection as rvalue");
                Ok(Rvalue::VOID)
            }
        }
    }

    /// Result register for a one-operand operation: the operand's own
    /// register when this expression owns it, a fresh one when it is
    /// borrowed from a variable.
    fn reuse_or_acquire(&mut self, value: Rvalue) -> Result<(Reg, Rvalue), CodeGenError> {
        let reg = value.register().expect("register operand");
        if value.from_lvalue {
            let dest = if reg.is_float() {
                self.pool.acquire_float()?
            } else {
                self.pool.acquire_int()?
            };
            Ok((dest, value))
        } else {
            Ok((reg, value))
        }
    }

    fn emit_increment_expression(
        &mut self,
        op: UnaryOp,
        operand: ExprId,
    ) -> Result<Rvalue, CodeGenError> {
        let target = self.emit_lvalue(operand)?;
        let value = self.load_lvalue(&target, false)?;
        let reg = value.register().expect("loaded operand");
        let ty = value.ty;

        let step: i64 = match op {
            UnaryOp::PreInc | UnaryOp::PostInc => 1,
            _ => -1,
        };
        let step_value = if self.sx.types.is_floating(ty) {
            Rvalue::float_const(step as f64)
        } else {
            Rvalue::int_const(step)
        };

        let is_postfix = matches!(op, UnaryOp::PostInc | UnaryOp::PostDec);
        let result = if is_postfix {
            // Keep the original value: copy it out before updating.
            let old = self.acquire_for(ty)?;
            let mv = if old.is_float() { Ins::FmvD } else { Ins::Mv };
            self.ins_rr(mv, old, reg)?;
            Rvalue::reg(old, ty)
        } else {
            value
        };

        self.emit_arith_binary(reg, &value, &step_value, BinaryOp::Add)?;
        self.emit_store_of_rvalue(&target, &value)?;
        if is_postfix {
            self.free_rvalue(&value);
        }
        Ok(result)
    }

    fn emit_binary_expression(
        &mut self,
        e: ExprId,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    ) -> Result<Rvalue, CodeGenError> {
        match op {
            BinaryOp::Comma => {
                self.emit_void_expression(lhs)?;
                self.emit_expression(rhs)
            }

            BinaryOp::LogAnd | BinaryOp::LogOr => {
                // Both branches feed the same result register.
                let n = self.new_label_num();
                let (on_true, on_false, end) = (Label::Then(n), Label::Else(n), Label::End(n));
                let dest = self.pool.acquire_int()?;
                self.emit_condition(e, on_true, on_false)?;
                self.label_decl(on_true)?;
                self.li(dest, 1)?;
                self.jump(end)?;
                self.label_decl(on_false)?;
                self.li(dest, 0)?;
                self.label_decl(end)?;
                Ok(Rvalue::reg(dest, TypeId::INT))
            }

            _ if op.is_relational() => {
                let lhs_value = self.emit_expression(lhs)?;
                let rhs_value = self.emit_expression(rhs)?;
                let dest = self.pool.acquire_int()?;
                self.emit_relational_into(dest, &lhs_value, &rhs_value, op)?;
                Ok(Rvalue::reg(dest, TypeId::INT))
            }

            _ => {
                let ty = self.tree.ty(e);
                let mut lhs_value = self.emit_expression(lhs)?;
                let mut rhs_value = self.emit_expression(rhs)?;

                if self.sx.types.is_floating(ty) {
                    lhs_value = self.normalize_to_float(lhs_value)?;
                    rhs_value = self.normalize_to_float(rhs_value)?;
                }

                let dest = self.acquire_for(ty)?;
                self.emit_arith_binary(dest, &lhs_value, &rhs_value, op)?;
                self.free_rvalue(&lhs_value);
                self.free_rvalue(&rhs_value);
                Ok(Rvalue::reg(dest, ty))
            }
        }
    }

    fn emit_ternary_expression(
        &mut self,
        e: ExprId,
        cond: ExprId,
        then: ExprId,
        otherwise: ExprId,
    ) -> Result<Rvalue, CodeGenError> {
        let ty = self.tree.ty(e);
        let n = self.new_label_num();
        let (label_then, label_else, label_end) = (Label::Then(n), Label::Else(n), Label::End(n));

        let dest = self.acquire_for(ty)?;
        self.emit_condition(cond, label_then, label_else)?;

        self.label_decl(label_then)?;
        let then_value = self.emit_expression(then)?;
        self.emit_move_rvalue_to_register(dest, &then_value)?;
        self.free_rvalue(&then_value);
        self.jump(label_end)?;

        self.label_decl(label_else)?;
        let else_value = self.emit_expression(otherwise)?;
        self.emit_move_rvalue_to_register(dest, &else_value)?;
        self.free_rvalue(&else_value);

        self.label_decl(label_end)?;
        Ok(Rvalue::reg(dest, ty))
    }

    fn emit_assignment_expression(
        &mut self,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    ) -> Result<Rvalue, CodeGenError> {
        let target = self.emit_lvalue(lhs)?;

        if self.sx.types.is_structure(self.tree.ty(rhs)) {
            return self.emit_struct_assignment(&target, rhs);
        }

        if op == BinaryOp::Assign {
            let value = self.emit_expression(rhs)?;
            self.emit_store_of_rvalue(&target, &value)?;
            return Ok(value);
        }

        // Compound assignment: load, combine, store back. The base
        // register of a computed lvalue stays live across all three steps.
        let base_op = op.compound_base().expect("compound assignment");
        let target_value = self.load_lvalue(&target, false)?;
        let value = self.emit_expression(rhs)?;

        let reg = target_value.register().expect("loaded target");
        let value = if reg.is_float() {
            self.normalize_to_float(value)?
        } else {
            value
        };

        self.emit_arith_binary(reg, &target_value, &value, base_op)?;
        self.free_rvalue(&value);
        self.emit_store_of_rvalue(&target, &target_value)?;
        Ok(target_value)
    }
}
