//! Statement dispatch.
//!
//! Statements lower in depth-first source order. Compound statements
//! save and restore the scope displacement cursor so block-local storage
//! is reclaimed on exit; the high-water mark feeds the frame size.

use super::registers::Reg;
use super::state::{Label, Lvalue};
use super::{CodeGenError, Encoder};
use crate::ast::{ExprId, StmtId, StmtKind};
use rvc_core::TypeId;

impl Encoder<'_> {
    pub(super) fn emit_statement(&mut self, s: StmtId) -> Result<(), CodeGenError> {
        match self.tree.stmt(s).clone() {
            StmtKind::Declarations(decls) => {
                for d in decls {
                    self.emit_declaration(d)?;
                }
            }

            StmtKind::Compound(substmts) => self.emit_compound_statement(&substmts)?,

            StmtKind::Expr(e) => {
                self.emit_void_expression(e)?;
            }

            StmtKind::Null => {}

            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.emit_if_statement(cond, then_branch, else_branch)?,

            StmtKind::Switch { cond, body } => self.emit_switch_statement(cond, body)?,

            StmtKind::While { cond, body } => self.emit_while_statement(cond, body)?,

            StmtKind::Do { body, cond } => self.emit_do_statement(body, cond)?,

            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => self.emit_for_statement(init, cond, step, body)?,

            StmtKind::Continue => self.emit_continue_statement()?,

            StmtKind::Break => self.emit_break_statement()?,

            StmtKind::Return { value } => self.emit_return_statement(value)?,

            // Only valid directly inside a switch body, where the switch
            // lowering consumes them.
            StmtKind::Case { value, .. } => {
                let loc = self.tree.loc(value);
                self.node_unexpected(loc, "case outside a switch");
            }
            StmtKind::Default { .. } => {
                self.node_unexpected(rvc_core::Location::default(), "default outside a switch");
            }
        }
        self.blank_line()
    }

    fn emit_compound_statement(&mut self, substmts: &[StmtId]) -> Result<(), CodeGenError> {
        let scope_displacement = self.scope_displ;
        for &sub in substmts {
            self.emit_statement(sub)?;
        }
        self.max_displ = self.max_displ.max(self.scope_displ);
        self.scope_displ = scope_displacement;
        Ok(())
    }

    /// Stores the return value (if any) in `a0`/`fa0` and jumps to the
    /// function's exit label.
    fn emit_return_statement(&mut self, value: Option<ExprId>) -> Result<(), CodeGenError> {
        if let Some(value) = value {
            let result = self.emit_expression(value)?;
            let target_reg = if self.sx.types.is_floating(result.ty) {
                Reg::Fa(0)
            } else {
                Reg::A(0)
            };
            let ty = if target_reg.is_float() {
                TypeId::FLOAT
            } else {
                TypeId::INT
            };
            let return_lvalue = Lvalue::in_register(target_reg, ty);
            self.emit_store_of_rvalue(&return_lvalue, &result)?;
            self.free_rvalue(&result);
        }

        match self.current_function {
            Some(ident) => self.jump(Label::FuncEnd(ident.index())),
            None => {
                self.node_unexpected(rvc_core::Location::default(), "return outside a function");
                Ok(())
            }
        }
    }
}

// The dispatch above is exercised end-to-end by the scenario tests in
// `codegen/mod.rs`; the unit here pins the void-expression contract.
#[cfg(test)]
mod tests {
    use crate::codegen::Rvalue;

    #[test]
    fn test_void_rvalue_is_not_a_register() {
        assert_eq!(Rvalue::VOID.register(), None);
        assert!(!Rvalue::VOID.is_const());
    }
}
