//! Call lowering.
//!
//! User calls follow the RV32 convention: up to eight integer arguments in
//! `a0–a7`, up to eight floating ones in `fa0–fa7`, the rest on the stack.
//! The call site reserves `(argc + 2) × 8` bytes of marshalling space
//! below `sp`: the bottom two doublewords stage the first argument of each
//! bank, and argument position `i` owns the positional slot at
//! `(i + 2) × 8`, so staging never aliases a positional copy. The staged
//! values are only loaded into `a0`/`fa0` once every other argument is in
//! place, because evaluating later arguments may itself clobber the
//! argument bank (a register could not carry them across a nested call).
//!
//! Built-ins never go through the generic path: the printf family expands
//! to one libc `printf` call per format specifier, the copy helpers to
//! unrolled word moves, and the transcendentals to their libm symbols.

use super::instructions::Ins;
use super::registers::{Reg, ARG_REG_COUNT};
use super::state::{Label, Lvalue, Rvalue, WORD};
use super::{CodeGenError, Encoder};
use crate::ast::{ExprId, ExprKind};
use crate::builtins::BuiltinKind;
use rvc_core::{IdentId, TypeId};
use std::fmt::Write as _;
use tracing::debug;

impl Encoder<'_> {
    pub(super) fn emit_call_expression(&mut self, e: ExprId) -> Result<Rvalue, CodeGenError> {
        let ExprKind::Call { callee, args } = &self.tree.expr(e).kind else {
            return Err(CodeGenError::Logic("emit_call on a non-call node".to_string()));
        };
        let args = args.clone();
        let callee = *callee;

        let ExprKind::Identifier { ident } = self.tree.expr(callee).kind else {
            self.node_unexpected(self.tree.loc(e), "callee is not a function designator");
            return Ok(Rvalue::VOID);
        };

        if let Some(kind) = self.builtins.get(ident) {
            return self.emit_builtin_call(kind, e, &args);
        }
        self.emit_user_call(ident, &args)
    }

    fn emit_user_call(&mut self, ident: IdentId, args: &[ExprId]) -> Result<Rvalue, CodeGenError> {
        let func_type = self.sx.idents.type_of(ident);
        let return_type = self.sx.types.function_return(func_type);
        let params: Vec<TypeId> = self.sx.types.function_params(func_type).to_vec();

        let spelling = self.sx.idents.spelling(ident).to_string();
        self.comment(&format!("\"{}\" function call:", spelling))?;

        // One doubleword of marshalling space per argument, plus two for
        // the a0/fa0 staging slots below the positional region.
        let frame = ((args.len() + 2) * 2 * WORD as usize) as i64;
        if !args.is_empty() {
            self.comment("displacing stack for parameters")?;
            self.ins_rri(Ins::Addi, Reg::Sp, Reg::Sp, -frame)?;
        }

        let mut int_count = 0usize;
        let mut float_count = 0usize;
        let mut staged_int: Option<(i32, TypeId)> = None;
        let mut staged_float: Option<(i32, TypeId)> = None;

        for (i, &arg) in args.iter().enumerate() {
            let value = self.emit_expression(arg)?;

            if self.sx.types.is_structure(value.ty) {
                // Passed by value: copied into the positional stack slot,
                // never through the register banks. The callee reads the
                // same slot.
                self.emit_struct_arg_copy(&value, ((i + 2) * 2 * WORD as usize) as i32)?;
                self.free_rvalue(&value);
                continue;
            }

            let param_ty = params.get(i).copied().unwrap_or(value.ty);
            let is_float = self.sx.types.is_floating(param_ty);
            let index = if is_float {
                let n = float_count;
                float_count += 1;
                n
            } else {
                let n = int_count;
                int_count += 1;
                n
            };

            if index == 0 {
                // a0/fa0 are staged on the stack and loaded last.
                let displ = if is_float { 2 * WORD } else { 0 };
                let slot = Lvalue::on_stack(Reg::Sp, displ, param_ty);
                self.emit_store_of_rvalue(&slot, &value)?;
                if is_float {
                    staged_float = Some((displ, param_ty));
                } else {
                    staged_int = Some((displ, param_ty));
                }
            } else if index < ARG_REG_COUNT {
                let target = if is_float {
                    Reg::Fa(index as u8)
                } else {
                    Reg::A(index as u8)
                };
                self.emit_move_rvalue_to_register(target, &value)?;
            } else {
                // Beyond the register banks: the positional slot is the
                // argument.
                let displ = ((i + 2) * 2 * WORD as usize) as i32;
                let slot = Lvalue::on_stack(Reg::Sp, displ, param_ty);
                self.emit_store_of_rvalue(&slot, &value)?;
            }
            self.free_rvalue(&value);
        }

        if let Some((displ, ty)) = staged_int {
            let ins = if self.sx.types.is_floating(ty) {
                Ins::Fld
            } else {
                Ins::Lw
            };
            self.ins_mem(ins, Reg::A(0), displ, Reg::Sp)?;
        }
        if let Some((displ, _)) = staged_float {
            self.ins_mem(Ins::Fld, Reg::Fa(0), displ, Reg::Sp)?;
        }

        self.jal(Label::Func(ident.index()))?;

        if !args.is_empty() {
            self.ins_rri(Ins::Addi, Reg::Sp, Reg::Sp, frame)?;
        }

        if matches!(self.sx.types.get(return_type), rvc_core::Type::Void) {
            return Ok(Rvalue::VOID);
        }
        let result_reg = if self.sx.types.is_floating(return_type) {
            Reg::Fa(0)
        } else {
            Reg::A(0)
        };
        Ok(Rvalue::reg(result_reg, return_type))
    }

    fn emit_struct_arg_copy(&mut self, value: &Rvalue, displ: i32) -> Result<(), CodeGenError> {
        let address = value.register().expect("structure address");
        let size = self.sx.types.size_of(value.ty) as i32;
        let word = self.pool.acquire_int()?;
        let mut offset = 0;
        while offset < size {
            self.ins_mem(Ins::Lw, word, offset, address)?;
            self.ins_mem(Ins::Sw, word, displ + offset, Reg::Sp)?;
            offset += WORD;
        }
        self.pool.release(word);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Built-ins
    // ------------------------------------------------------------------

    fn emit_builtin_call(
        &mut self,
        kind: BuiltinKind,
        e: ExprId,
        args: &[ExprId],
    ) -> Result<Rvalue, CodeGenError> {
        debug!(builtin = kind.name(), "lowering builtin call");
        match kind {
            BuiltinKind::Printf => self.emit_printf_call(e, args),
            BuiltinKind::Print => self.emit_print_call(args),
            BuiltinKind::PrintId => self.emit_printid_call(args),
            BuiltinKind::Strcat | BuiltinKind::Strncpy => self.emit_array_copy_call(kind, e, args),
            _ => self.emit_libm_call(kind, args),
        }
    }

    fn emit_libm_call(
        &mut self,
        kind: BuiltinKind,
        args: &[ExprId],
    ) -> Result<Rvalue, CodeGenError> {
        let symbol = kind.libm_symbol().expect("transcendental builtin");
        self.comment(&format!("\"{}\" function call:", symbol))?;

        let value = self.emit_expression(args[0])?;
        let value = self.normalize_to_float(value)?;
        self.emit_move_rvalue_to_register(Reg::Fa(0), &value)?;
        self.free_rvalue(&value);

        self.call_symbol(symbol)?;
        Ok(Rvalue::reg(Reg::Fa(0), TypeId::FLOAT))
    }

    /// `lui`/`addi` relocation pair loading a string slice address into a0.
    fn emit_format_address(&mut self, label: &str) -> Result<(), CodeGenError> {
        let hi = self.pool.acquire_int()?;
        writeln!(&mut self.out, "\tlui {}, %hi({})", hi, label)?;
        writeln!(&mut self.out, "\taddi a0, {}, %lo({})", hi, label)?;
        self.pool.release(hi);
        Ok(())
    }

    /// One `printf` call printing `value` through the given format label.
    /// Integer arguments travel in `a1`; floating ones are bit-copied into
    /// `a1` from the floating bank.
    fn emit_print_one(&mut self, format_label: &str, value: &Rvalue) -> Result<(), CodeGenError> {
        if self.sx.types.is_floating(value.ty) {
            let value = self.normalize_to_float(*value)?;
            let reg = value.register().expect("float argument");
            self.ins_rr(Ins::FmvXD, Reg::A(1), reg)?;
            self.free_rvalue(&value);
        } else {
            self.emit_move_rvalue_to_register(Reg::A(1), value)?;
            self.free_rvalue(value);
        }
        self.emit_format_address(format_label)?;
        self.call_symbol("printf")?;
        Ok(())
    }

    /// Prints one argument through `format_label`. A declared array is
    /// unrolled element-wise over its declaration size, one libc call per
    /// element, all through the same format slice; anything else is a
    /// single call.
    fn emit_print_arg(&mut self, arg: ExprId, format_label: &str) -> Result<(), CodeGenError> {
        let node = self.tree.expr(arg);
        if let ExprKind::Identifier { ident } = node.kind
            && self.sx.types.is_array(node.ty)
            && let Some(layout) = self.layouts.get(&ident).copied()
        {
            let elem_ty = self.sx.types.array_element(node.ty);
            let slot = match self.displacements.get(&ident) {
                Some(lval) => *lval,
                None => {
                    self.node_unexpected(node.loc, "array without displacement");
                    return Ok(());
                }
            };
            let pointer = self.load_lvalue(&slot, false)?;
            let base = pointer.register().expect("array pointer");

            for i in 0..layout.decl_elem_count {
                let reg = self.acquire_for(elem_ty)?;
                let ins = if reg.is_float() { Ins::Fld } else { Ins::Lw };
                self.ins_mem(ins, reg, -(i as i32) * WORD, base)?;
                self.emit_print_one(format_label, &Rvalue::reg(reg, elem_ty))?;
            }
            self.free_rvalue(&pointer);
            return Ok(());
        }

        let value = self.emit_expression(arg)?;
        self.emit_print_one(format_label, &value)
    }

    /// `printf(fmt, ...)`. The interned format string was split at its
    /// `%` specifiers into `total`-strided sub-labels by the data-section
    /// pre-pass; each specifier becomes one libc call consuming one
    /// argument, and a final call prints the trailing slice.
    fn emit_printf_call(&mut self, e: ExprId, args: &[ExprId]) -> Result<Rvalue, CodeGenError> {
        let ExprKind::StringLiteral { index } = self.tree.expr(args[0]).kind else {
            self.node_unexpected(self.tree.loc(e), "printf format is not a string literal");
            return Ok(Rvalue::VOID);
        };
        let base = index.index();
        let total = self.sx.strings.len();

        // Slice k ends with the k-th specifier and is printed together
        // with the k-th argument; an array argument repeats its slice for
        // every element.
        for (k, &arg) in args[1..].iter().enumerate() {
            let label = Label::Str(base + k * total).to_string();
            self.emit_print_arg(arg, &label)?;
        }

        // Trailing text after the last specifier.
        let label = Label::Str(base + (args.len() - 1) * total).to_string();
        self.emit_format_address(&label)?;
        self.call_symbol("printf")?;
        Ok(Rvalue::VOID)
    }

    /// `print(...)`: each argument is printed with the ascii template for
    /// its type (`.i`, `.f`), string literals with their own label.
    fn emit_print_call(&mut self, args: &[ExprId]) -> Result<Rvalue, CodeGenError> {
        for &arg in args {
            if let ExprKind::StringLiteral { index } = self.tree.expr(arg).kind {
                let label = Label::Str(index.index()).to_string();
                self.emit_format_address(&label)?;
                self.call_symbol("printf")?;
                continue;
            }
            let ty = self.tree.ty(arg);
            let printed_ty = if self.sx.types.is_array(ty) {
                self.sx.types.array_element(ty)
            } else {
                ty
            };
            let template = if self.sx.types.is_floating(printed_ty) {
                ".f"
            } else {
                ".i"
            };
            self.emit_print_arg(arg, template)?;
        }
        Ok(Rvalue::VOID)
    }

    /// `printid(...)`: integer values through the `.printid` template.
    fn emit_printid_call(&mut self, args: &[ExprId]) -> Result<Rvalue, CodeGenError> {
        for &arg in args {
            self.emit_print_arg(arg, ".printid")?;
        }
        Ok(Rvalue::VOID)
    }

    /// `strcat`/`strncpy`: unrolled word copies between two declared
    /// arrays, driven by their recorded layouts.
    fn emit_array_copy_call(
        &mut self,
        kind: BuiltinKind,
        e: ExprId,
        args: &[ExprId],
    ) -> Result<Rvalue, CodeGenError> {
        let idents: Vec<Option<IdentId>> = args
            .iter()
            .map(|&a| match self.tree.expr(a).kind {
                ExprKind::Identifier { ident } => Some(ident),
                _ => None,
            })
            .collect();
        let (Some(Some(dst)), Some(Some(src))) = (idents.first(), idents.get(1)) else {
            self.node_unexpected(self.tree.loc(e), "array copy needs two declared arrays");
            return Ok(Rvalue::VOID);
        };
        let (dst, src) = (*dst, *src);

        let (Some(dst_layout), Some(src_layout)) = (
            self.layouts.get(&dst).copied(),
            self.layouts.get(&src).copied(),
        ) else {
            self.node_unexpected(self.tree.loc(e), "array copy of arrays without layout");
            return Ok(Rvalue::VOID);
        };
        let (Some(dst_slot), Some(src_slot)) = (
            self.displacements.get(&dst).copied(),
            self.displacements.get(&src).copied(),
        ) else {
            self.node_unexpected(self.tree.loc(e), "array copy of undeclared arrays");
            return Ok(Rvalue::VOID);
        };

        self.comment(&format!("\"{}\" array copy:", kind.name()))?;
        let dst_ptr = self.load_lvalue(&dst_slot, false)?;
        let src_ptr = self.load_lvalue(&src_slot, false)?;
        let dst_base = dst_ptr.register().expect("destination pointer");
        let src_base = src_ptr.register().expect("source pointer");

        // strcat appends after the destination's elements; strncpy
        // overwrites from element zero.
        let start = if kind == BuiltinKind::Strcat {
            dst_layout.elem_count
        } else {
            0
        };

        let word = self.pool.acquire_int()?;
        for i in 0..src_layout.elem_count {
            self.ins_mem(Ins::Lw, word, -(i as i32) * WORD, src_base)?;
            self.ins_mem(Ins::Sw, word, -((start + i) as i32) * WORD, dst_base)?;
        }
        self.pool.release(word);
        self.free_rvalue(&dst_ptr);
        self.free_rvalue(&src_ptr);
        Ok(Rvalue::VOID)
    }
}
