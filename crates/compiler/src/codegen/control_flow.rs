//! Structured control flow.
//!
//! Conditions are lowered through inherited true/false labels (see
//! `expressions.rs`), so `if`/`while`/`do`/`for` only place labels and
//! jumps. `break` and `continue` jump to the labels of the innermost
//! enclosing construct, saved and restored around each nesting level.
//!
//! Switches pick a dispatch strategy by case count: small ones compare
//! with a `beq` chain; larger ones build a linear-probed table at run
//! time, allocated with an `ecall` and filled through one
//! `CASE_INSERT<n>` helper call per case, then dispatch through
//! `CASE_CONDITION<n>`. Both strategies label case bodies
//! `CASE<k>_<switch>` and fall through between them as C requires.

use super::instructions::Ins;
use super::registers::Reg;
use super::state::{Label, WORD};
use super::{CodeGenError, Encoder};
use crate::ast::{ExprId, StmtId, StmtKind};
use std::fmt::Write as _;
use tracing::debug;

impl Encoder<'_> {
    pub(super) fn emit_if_statement(
        &mut self,
        cond: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
    ) -> Result<(), CodeGenError> {
        let n = self.new_label_num();
        let (label_then, label_else, label_end) = (Label::Then(n), Label::Else(n), Label::End(n));

        self.emit_condition(cond, label_then, label_else)?;

        self.label_decl(label_then)?;
        self.emit_statement(then_branch)?;
        self.jump(label_end)?;

        self.label_decl(label_else)?;
        if let Some(else_branch) = else_branch {
            self.emit_statement(else_branch)?;
        }
        self.label_decl(label_end)
    }

    pub(super) fn emit_while_statement(
        &mut self,
        cond: ExprId,
        body: StmtId,
    ) -> Result<(), CodeGenError> {
        let n = self.new_label_num();
        let label_begin = Label::BeginCycle(n);
        let label_body = Label::Then(n);
        let label_end = Label::End(n);

        let old_continue = self.label_continue.replace(label_begin);
        let old_break = self.label_break.replace(label_end);

        self.label_decl(label_begin)?;
        self.emit_condition(cond, label_body, label_end)?;
        self.label_decl(label_body)?;
        self.emit_statement(body)?;
        self.jump(label_begin)?;
        self.label_decl(label_end)?;

        self.label_continue = old_continue;
        self.label_break = old_break;
        Ok(())
    }

    pub(super) fn emit_do_statement(
        &mut self,
        body: StmtId,
        cond: ExprId,
    ) -> Result<(), CodeGenError> {
        let n = self.new_label_num();
        let label_begin = Label::BeginCycle(n);
        // `continue` re-tests the condition rather than re-entering the body.
        let label_condition = Label::Next(n);
        let label_end = Label::End(n);

        let old_continue = self.label_continue.replace(label_condition);
        let old_break = self.label_break.replace(label_end);

        self.label_decl(label_begin)?;
        self.emit_statement(body)?;
        self.label_decl(label_condition)?;
        self.emit_condition(cond, label_begin, label_end)?;
        self.label_decl(label_end)?;

        self.label_continue = old_continue;
        self.label_break = old_break;
        Ok(())
    }

    pub(super) fn emit_for_statement(
        &mut self,
        init: Option<StmtId>,
        cond: Option<ExprId>,
        step: Option<ExprId>,
        body: StmtId,
    ) -> Result<(), CodeGenError> {
        let scope_displacement = self.scope_displ;

        if let Some(init) = init {
            self.emit_statement(init)?;
        }

        let n = self.new_label_num();
        let label_begin = Label::BeginCycle(n);
        let label_body = Label::Then(n);
        let label_end = Label::End(n);

        let old_continue = self.label_continue.replace(label_begin);
        let old_break = self.label_break.replace(label_end);

        self.label_decl(label_begin)?;
        if let Some(cond) = cond {
            self.emit_condition(cond, label_body, label_end)?;
        }
        self.label_decl(label_body)?;
        self.emit_statement(body)?;
        if let Some(step) = step {
            self.emit_void_expression(step)?;
        }
        self.jump(label_begin)?;
        self.label_decl(label_end)?;

        self.label_continue = old_continue;
        self.label_break = old_break;
        self.max_displ = self.max_displ.max(self.scope_displ);
        self.scope_displ = scope_displacement;
        Ok(())
    }

    pub(super) fn emit_continue_statement(&mut self) -> Result<(), CodeGenError> {
        match self.label_continue {
            Some(label) => self.jump(label),
            None => {
                self.node_unexpected(rvc_core::Location::default(), "continue outside a loop");
                Ok(())
            }
        }
    }

    pub(super) fn emit_break_statement(&mut self) -> Result<(), CodeGenError> {
        match self.label_break {
            Some(label) => self.jump(label),
            None => {
                self.node_unexpected(rvc_core::Location::default(), "break outside a construct");
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Switch
    // ------------------------------------------------------------------

    /// The case statements of a switch body, in source order, with their
    /// literal values; the default's position if present.
    fn collect_cases(&mut self, body: StmtId) -> (Vec<(StmtId, i64)>, bool) {
        let StmtKind::Compound(substmts) = self.tree.stmt(body) else {
            return (Vec::new(), false);
        };
        let substmts = substmts.clone();

        let mut cases = Vec::new();
        let mut has_default = false;
        for &sub in &substmts {
            match *self.tree.stmt(sub) {
                StmtKind::Case { value, .. } => {
                    // The builder folded case expressions to literals.
                    match self.tree.as_int_literal(value) {
                        Some(v) => cases.push((sub, v as i64)),
                        None => {
                            let loc = self.tree.loc(value);
                            self.node_unexpected(loc, "case value is not a constant");
                        }
                    }
                }
                StmtKind::Default { .. } => has_default = true,
                _ => {}
            }
        }
        (cases, has_default)
    }

    pub(super) fn emit_switch_statement(
        &mut self,
        cond: ExprId,
        body: StmtId,
    ) -> Result<(), CodeGenError> {
        self.switch_counter += 1;
        let switch = self.switch_counter;
        let n = self.new_label_num();
        let label_end = Label::End(n);

        let old_break = self.label_break.replace(label_end);

        let (cases, has_default) = self.collect_cases(body);
        let use_table = cases.len() >= self.config.switch_table_min_cases;
        debug!(
            switch,
            cases = cases.len(),
            strategy = if use_table { "table" } else { "beq-chain" },
            "lowering switch"
        );

        // Case labels are numbered across the whole translation unit.
        let first_case_num = self.case_label_num;
        self.case_label_num += cases.len();

        let miss = if has_default {
            Label::Default(switch)
        } else {
            label_end
        };

        if use_table {
            self.emit_switch_table_dispatch(cond, &cases, first_case_num, switch, miss)?;
        } else {
            self.emit_switch_chain_dispatch(cond, &cases, first_case_num, switch, miss)?;
        }

        // Bodies in source order; C fallthrough comes from adjacency.
        let StmtKind::Compound(substmts) = self.tree.stmt(body).clone() else {
            self.node_unexpected(self.tree.loc(cond), "switch body is not compound");
            self.label_break = old_break;
            return Ok(());
        };
        let mut case_num = first_case_num;
        for sub in substmts {
            match self.tree.stmt(sub).clone() {
                StmtKind::Case { body, .. } => {
                    self.label_decl(Label::Case {
                        num: case_num,
                        switch,
                    })?;
                    case_num += 1;
                    self.emit_statement(body)?;
                }
                StmtKind::Default { body } => {
                    self.label_decl(Label::Default(switch))?;
                    self.emit_statement(body)?;
                }
                _ => self.emit_statement(sub)?,
            }
        }

        self.label_decl(label_end)?;
        self.label_break = old_break;
        Ok(())
    }

    /// Small switch: one `beq` per case against the scrutinee.
    fn emit_switch_chain_dispatch(
        &mut self,
        cond: ExprId,
        cases: &[(StmtId, i64)],
        first_case_num: usize,
        switch: usize,
        miss: Label,
    ) -> Result<(), CodeGenError> {
        let value = self.emit_expression(cond)?;
        let value = self.materialize(value)?;
        let scrutinee = value.register().expect("switch scrutinee");

        let probe = self.pool.acquire_int()?;
        for (i, &(_, case_value)) in cases.iter().enumerate() {
            self.li(probe, case_value)?;
            let target = Label::Case {
                num: first_case_num + i,
                switch,
            };
            self.branch(Ins::Beq, scrutinee, probe, target)?;
        }
        self.pool.release(probe);
        self.free_rvalue(&value);
        self.jump(miss)
    }

    /// Large switch: a linear-probed table of (value, label) pairs on the
    /// heap. `CASE_INSERT<n>` fills one slot per case; dispatch walks the
    /// probe sequence in `CASE_CONDITION<n>` and jumps through the stored
    /// label, or to the miss target when it finds an empty slot.
    fn emit_switch_table_dispatch(
        &mut self,
        cond: ExprId,
        cases: &[(StmtId, i64)],
        first_case_num: usize,
        switch: usize,
        miss: Label,
    ) -> Result<(), CodeGenError> {
        // One spare slot keeps the probe loop terminating even when the
        // scrutinee matches no case.
        let table_size = cases.len() as i64 + 1;

        // The helpers expect the table base in t1, the value in t2 and
        // the case label in t3. Reserving them in the pool keeps the
        // scrutinee evaluation off those registers.
        let base = self.pool.acquire_specific(Reg::T(1))?;
        let value_slot = self.pool.acquire_specific(Reg::T(2))?;
        let label_slot = self.pool.acquire_specific(Reg::T(3))?;

        // Allocate 2 × table_size words with the brk ecall; the kernel
        // hands back zeroed memory, which is what marks slots empty.
        self.comment("switch dispatch table:")?;
        let size_scratch = self.pool.acquire_int()?;
        self.li(size_scratch, table_size * 2 * WORD as i64)?;
        self.li(Reg::A(7), 9)?;
        self.ins_rr(Ins::Mv, Reg::A(0), size_scratch)?;
        writeln!(&mut self.out, "\tecall")?;
        self.ins_rr(Ins::Mv, base, Reg::A(0))?;
        self.pool.release(size_scratch);

        for (i, &(_, case_value)) in cases.iter().enumerate() {
            self.li(value_slot, case_value)?;
            let target = Label::Case {
                num: first_case_num + i,
                switch,
            };
            self.la(label_slot, target)?;
            self.call_symbol(&format!("CASE_INSERT{}", switch))?;
        }

        let value = self.emit_expression(cond)?;
        let value = self.materialize(value)?;
        let scrutinee = value.register().expect("switch scrutinee");
        self.ins_rr(Ins::Mv, value_slot, scrutinee)?;
        self.free_rvalue(&value);
        self.call_symbol(&format!("CASE_CONDITION{}", switch))?;

        self.pool.release(base);
        self.pool.release(value_slot);
        self.pool.release(label_slot);
        self.emit_switch_table_routines(table_size, switch, miss);
        Ok(())
    }

    /// The two helper routines of one table-dispatched switch. They are
    /// staged and flushed behind the function epilogue so straight-line
    /// code never falls into them.
    ///
    /// Protocol: `t1` table base, `t2` value, `t3` case label (insert
    /// only); `t0`, `t4`–`t6` are scratch.
    fn emit_switch_table_routines(&mut self, table_size: i64, switch: usize, miss: Label) {
        let r = &mut self.routines;

        let _ = writeln!(r, "CASE_INSERT{}:", switch);
        let _ = writeln!(r, "\tli t0, {}", table_size);
        let _ = writeln!(r, "\trem t4, t2, t0");
        let _ = writeln!(r, "\tbgez t4, CASE_INSERT{}_PROBE", switch);
        let _ = writeln!(r, "\tadd t4, t4, t0");
        let _ = writeln!(r, "CASE_INSERT{}_PROBE:", switch);
        let _ = writeln!(r, "\tslli t5, t4, 3");
        let _ = writeln!(r, "\tadd t5, t5, t1");
        let _ = writeln!(r, "\tlw t6, 4(t5)");
        let _ = writeln!(r, "\tbeqz t6, CASE_INSERT{}_STORE", switch);
        let _ = writeln!(r, "\taddi t4, t4, 1");
        let _ = writeln!(r, "\trem t4, t4, t0");
        let _ = writeln!(r, "\tj CASE_INSERT{}_PROBE", switch);
        let _ = writeln!(r, "CASE_INSERT{}_STORE:", switch);
        let _ = writeln!(r, "\tsw t2, 0(t5)");
        let _ = writeln!(r, "\tsw t3, 4(t5)");
        let _ = writeln!(r, "\tret");

        let _ = writeln!(r, "CASE_CONDITION{}:", switch);
        let _ = writeln!(r, "\tli t0, {}", table_size);
        let _ = writeln!(r, "\trem t4, t2, t0");
        let _ = writeln!(r, "\tbgez t4, CASE_CONDITION{}_PROBE", switch);
        let _ = writeln!(r, "\tadd t4, t4, t0");
        let _ = writeln!(r, "CASE_CONDITION{}_PROBE:", switch);
        let _ = writeln!(r, "\tslli t5, t4, 3");
        let _ = writeln!(r, "\tadd t5, t5, t1");
        let _ = writeln!(r, "\tlw t6, 4(t5)");
        let _ = writeln!(r, "\tbeqz t6, CASE_CONDITION{}_MISS", switch);
        let _ = writeln!(r, "\tlw t5, 0(t5)");
        let _ = writeln!(r, "\tbeq t5, t2, CASE_CONDITION{}_HIT", switch);
        let _ = writeln!(r, "\taddi t4, t4, 1");
        let _ = writeln!(r, "\trem t4, t4, t0");
        let _ = writeln!(r, "\tj CASE_CONDITION{}_PROBE", switch);
        let _ = writeln!(r, "CASE_CONDITION{}_HIT:", switch);
        let _ = writeln!(r, "\tslli t5, t4, 3");
        let _ = writeln!(r, "\tadd t5, t5, t1");
        let _ = writeln!(r, "\tlw t6, 4(t5)");
        let _ = writeln!(r, "\tjr t6");
        let _ = writeln!(r, "CASE_CONDITION{}_MISS:", switch);
        let _ = writeln!(r, "\tj {}", miss);
    }
}
