//! Declaration lowering: variables, arrays, structures, functions.
//!
//! Locals live at negative displacements from `fp`, globals at
//! non-negative displacements from `gp`. An array variable's slot holds a
//! pointer to element zero; the element storage is carved out separately
//! with the dimension size one word above element zero and elements at
//! descending addresses. Multidimensional arrays store a pointer to the
//! next dimension's block at each element of the outer dimension.
//!
//! Function bodies are staged into a secondary buffer: the prologue's
//! frame size depends on the body's maximum displacement, so `fp`/`sp`
//! setup is emitted after the body is generated and the buffer is flushed
//! behind it.

use super::instructions::Ins;
use super::registers::Reg;
use super::state::{Label, LayoutInfo, Lvalue, LvalueKind, Rvalue, PRESERVED_AREA, WORD};
use super::{CodeGenError, Encoder};
use crate::ast::{DeclId, DeclKind, ExprId, ExprKind};
use rvc_core::{IdentId, TypeId};
use std::fmt::Write as _;
use tracing::debug;

impl Encoder<'_> {
    pub(super) fn emit_declaration(&mut self, d: DeclId) -> Result<(), CodeGenError> {
        match self.tree.decl(d) {
            DeclKind::Var { .. } => self.emit_variable_declaration(d)?,
            DeclKind::Func { .. } => self.emit_function_definition(d)?,
        }
        self.blank_line()
    }

    /// Allocates the variable's slot and records its lvalue. Array
    /// variables get a one-word pointer slot regardless of element count.
    pub(super) fn displacements_add(&mut self, ident: IdentId) -> Lvalue {
        let ty = self.sx.idents.type_of(ident);
        let size = if self.sx.types.is_array(ty) {
            WORD
        } else {
            self.sx.types.size_of(ty) as i32
        };

        let lval = if self.sx.idents.is_local(ident) {
            self.scope_displ += size;
            self.max_displ = self.max_displ.max(self.scope_displ);
            Lvalue::on_stack(Reg::Fp, -self.scope_displ, ty)
        } else {
            let displ = self.global_displ;
            self.global_displ += size;
            Lvalue::on_stack(Reg::Gp, displ, ty)
        };

        self.displacements.insert(ident, lval);
        lval
    }

    pub(super) fn emit_variable_declaration(&mut self, d: DeclId) -> Result<(), CodeGenError> {
        let DeclKind::Var {
            ident,
            bounds,
            init,
        } = self.tree.decl(d).clone()
        else {
            return Err(CodeGenError::Logic("expected a variable declaration".to_string()));
        };

        let spelling = self.sx.idents.spelling(ident).to_string();
        self.comment(&format!("\"{}\" variable declaration:", spelling))?;

        let ty = self.sx.idents.type_of(ident);
        if self.sx.types.is_array(ty) {
            return self.emit_array_declaration(ident, &bounds, init);
        }

        let variable = self.displacements_add(ident);
        if let Some(init) = init {
            if self.sx.types.is_structure(ty) {
                let result = self.emit_struct_assignment(&variable, init)?;
                self.free_rvalue(&result);
            } else {
                let value = self.emit_expression(init)?;
                self.emit_store_of_rvalue(&variable, &value)?;
                self.free_rvalue(&value);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Arrays
    // ------------------------------------------------------------------

    fn emit_array_declaration(
        &mut self,
        ident: IdentId,
        bounds: &[ExprId],
        init: Option<ExprId>,
    ) -> Result<(), CodeGenError> {
        let variable = self.displacements_add(ident);
        let elem_count = init
            .map(|i| self.init_list_len(i))
            .unwrap_or(0);

        // Constant bounds, outermost first; a missing or non-constant
        // bound falls back to the initializer length.
        let const_bounds: Option<Vec<i64>> = bounds
            .iter()
            .map(|&b| self.tree.as_int_literal(b).map(i64::from))
            .collect();

        if self.sx.idents.is_local(ident) {
            if let Some(mut dims) = const_bounds {
                if dims.is_empty() {
                    dims.push(elem_count as i64);
                }
                self.layouts.insert(
                    ident,
                    LayoutInfo {
                        elem_count: if elem_count > 0 { elem_count } else { dims[0] as usize },
                        decl_elem_count: dims[0] as usize,
                    },
                );
                let base = self.emit_array_block(&dims)?;
                self.store_rvalue(&variable, &Rvalue::reg(base, TypeId::INT), false)?;
                if let Some(init) = init {
                    self.emit_array_init(base, init, &dims)?;
                }
                self.pool.release(base);
                return Ok(());
            }

            // One runtime dimension: the bound is evaluated, stored above
            // element zero, and the stack is lowered by (n + 1) words.
            let bound = self.emit_expression(bounds[0])?;
            let bound = self.materialize(bound)?;
            let n = bound.register().expect("array bound");
            self.ins_mem(Ins::Sw, n, -WORD, Reg::Sp)?;

            let base = self.pool.acquire_int()?;
            self.ins_rri(Ins::Addi, base, Reg::Sp, -(2 * WORD) as i64)?;
            self.store_rvalue(&variable, &Rvalue::reg(base, TypeId::INT), false)?;

            let bytes = self.pool.acquire_int()?;
            self.ins_rri(Ins::Addi, bytes, n, 1)?;
            self.ins_rri(Ins::Slli, bytes, bytes, 2)?;
            self.ins_rrr(Ins::Sub, Reg::Sp, Reg::Sp, bytes)?;
            self.pool.release(bytes);
            self.free_rvalue(&bound);

            self.layouts.insert(
                ident,
                LayoutInfo {
                    elem_count,
                    decl_elem_count: elem_count.max(1),
                },
            );
            if let Some(init) = init {
                self.emit_array_init(base, init, &[elem_count as i64])?;
            }
            self.pool.release(base);
            return Ok(());
        }

        // Global array: storage is reserved in the gp area; the
        // initialization code runs at program start.
        let Some(mut dims) = const_bounds else {
            self.node_unexpected(
                self.tree.loc(bounds[0]),
                "global array with non-constant bound",
            );
            return Ok(());
        };
        if dims.is_empty() {
            dims.push(elem_count as i64);
        }
        let n = dims[0];
        if dims.len() > 1 {
            self.node_unexpected(
                self.tree.loc(bounds[0]),
                "multidimensional global array",
            );
            return Ok(());
        }

        let start = self.global_displ;
        self.global_displ += (n as i32 + 1) * WORD;
        let elem0 = start + (n as i32 - 1) * WORD;
        let size_word = start + n as i32 * WORD;

        self.layouts.insert(
            ident,
            LayoutInfo {
                elem_count: if elem_count > 0 { elem_count } else { n as usize },
                decl_elem_count: n as usize,
            },
        );

        let count = self.pool.acquire_int()?;
        self.li(count, n)?;
        self.ins_mem(Ins::Sw, count, size_word, Reg::Gp)?;
        self.pool.release(count);

        let base = self.pool.acquire_int()?;
        self.ins_rri(Ins::Addi, base, Reg::Gp, elem0 as i64)?;
        self.store_rvalue(&variable, &Rvalue::reg(base, TypeId::INT), false)?;
        if let Some(init) = init {
            self.emit_array_init(base, init, &dims)?;
        }
        self.pool.release(base);
        Ok(())
    }

    fn init_list_len(&self, init: ExprId) -> usize {
        match &self.tree.expr(init).kind {
            ExprKind::InitList { elements } => elements.len(),
            _ => 0,
        }
    }

    /// Carves one array block out of the stack and returns a register
    /// holding the address of element zero. The dimension size lands one
    /// word above element zero; inner dimensions are allocated recursively
    /// with their element-zero pointers stored into the outer elements.
    fn emit_array_block(&mut self, dims: &[i64]) -> Result<Reg, CodeGenError> {
        let n = dims[0];

        let count = self.pool.acquire_int()?;
        self.li(count, n)?;
        self.ins_mem(Ins::Sw, count, -WORD, Reg::Sp)?;
        self.pool.release(count);

        let base = self.pool.acquire_int()?;
        self.ins_rri(Ins::Addi, base, Reg::Sp, -(2 * WORD) as i64)?;
        self.ins_rri(Ins::Addi, Reg::Sp, Reg::Sp, -((n + 1) * WORD as i64))?;

        if dims.len() > 1 {
            for i in 0..n {
                let inner = self.emit_array_block(&dims[1..])?;
                self.ins_mem(Ins::Sw, inner, -(i as i32) * WORD, base)?;
                self.pool.release(inner);
            }
        }
        Ok(base)
    }

    /// Stores initializer elements through the element-zero address.
    /// Nested lists follow the stored next-dimension pointers.
    fn emit_array_init(
        &mut self,
        base: Reg,
        init: ExprId,
        dims: &[i64],
    ) -> Result<(), CodeGenError> {
        let ExprKind::InitList { elements } = &self.tree.expr(init).kind else {
            self.node_unexpected(self.tree.loc(init), "array initializer is not a list");
            return Ok(());
        };
        let elements = elements.clone();

        for (i, &element) in elements.iter().enumerate() {
            if matches!(self.tree.expr(element).kind, ExprKind::InitList { .. }) {
                let inner = self.pool.acquire_int()?;
                self.ins_mem(Ins::Lw, inner, -(i as i32) * WORD, base)?;
                self.emit_array_init(inner, element, &dims[1..])?;
                self.pool.release(inner);
                continue;
            }

            let elem_ty = self.tree.ty(element);
            let value = self.emit_expression(element)?;
            let slot = Lvalue::on_stack(base, -(i as i32) * WORD, elem_ty);
            self.store_rvalue(&slot, &value, false)?;
            self.free_rvalue(&value);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Structures
    // ------------------------------------------------------------------

    /// Assigns a structure value (another variable or an initializer
    /// list) into `target` and yields the target's address.
    pub(super) fn emit_struct_assignment(
        &mut self,
        target: &Lvalue,
        value: ExprId,
    ) -> Result<Rvalue, CodeGenError> {
        match self.tree.expr(value).kind {
            ExprKind::InitList { .. } => self.emit_structure_init(target, value)?,
            ExprKind::Identifier { ident } => {
                let source = match self.displacements.get(&ident) {
                    Some(lval) => *lval,
                    None => {
                        self.node_unexpected(self.tree.loc(value), "structure without storage");
                        return Ok(Rvalue::VOID);
                    }
                };
                self.emit_struct_copy(target, &source)?;
            }
            _ => {
                self.node_unexpected(self.tree.loc(value), "unsupported structure source");
            }
        }
        self.emit_load_of_lvalue(target)
    }

    /// Word-by-word copy between two in-memory structures.
    fn emit_struct_copy(&mut self, target: &Lvalue, source: &Lvalue) -> Result<(), CodeGenError> {
        let (LvalueKind::Stack {
            base: dst_base,
            displ: dst_displ,
        }, LvalueKind::Stack {
            base: src_base,
            displ: src_displ,
        }) = (target.kind, source.kind)
        else {
            self.node_unexpected(rvc_core::Location::default(), "register-resident structure");
            return Ok(());
        };

        let size = self.sx.types.size_of(target.ty) as i32;
        let word = self.pool.acquire_int()?;
        let mut offset = 0;
        while offset < size {
            self.ins_mem(Ins::Lw, word, src_displ + offset, src_base)?;
            self.ins_mem(Ins::Sw, word, dst_displ + offset, dst_base)?;
            offset += WORD;
        }
        self.pool.release(word);
        Ok(())
    }

    /// Member-wise structure initialization from a checked initializer
    /// list.
    pub(super) fn emit_structure_init(
        &mut self,
        target: &Lvalue,
        init: ExprId,
    ) -> Result<(), CodeGenError> {
        let ExprKind::InitList { elements } = &self.tree.expr(init).kind else {
            self.node_unexpected(self.tree.loc(init), "structure initializer is not a list");
            return Ok(());
        };
        let elements = elements.clone();
        let LvalueKind::Stack { base, displ } = target.kind else {
            self.node_unexpected(self.tree.loc(init), "register-resident structure");
            return Ok(());
        };

        let members: Vec<TypeId> = self
            .sx
            .types
            .members(target.ty)
            .iter()
            .map(|m| m.ty)
            .collect();

        let mut offset = 0i32;
        for (i, &member_ty) in members.iter().enumerate() {
            let member_lvalue = Lvalue::on_stack(base, displ + offset, member_ty);
            offset += self.sx.types.size_of(member_ty) as i32;

            let element = elements[i];
            if matches!(self.tree.expr(element).kind, ExprKind::InitList { .. })
                || self.sx.types.is_structure(self.tree.ty(element))
            {
                let result = self.emit_struct_assignment(&member_lvalue, element)?;
                self.free_rvalue(&result);
                continue;
            }

            let value = self.emit_expression(element)?;
            self.store_rvalue(&member_lvalue, &value, false)?;
            self.free_rvalue(&value);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn emit_function_definition(&mut self, d: DeclId) -> Result<(), CodeGenError> {
        let DeclKind::Func {
            ident,
            params,
            body,
        } = self.tree.decl(d).clone()
        else {
            return Err(CodeGenError::Logic("expected a function definition".to_string()));
        };

        let spelling = self.sx.idents.spelling(ident).to_string();
        debug!(function = %spelling, "emitting function definition");

        let func_num = ident.index();
        self.label_decl(Label::Func(func_num))?;
        let is_main = spelling == "main";
        if is_main {
            self.label_decl(Label::Main)?;
        }
        self.comment(&format!("\"{}\" function:", spelling))?;

        self.current_function = Some(ident);
        self.max_displ = 0;
        self.scope_displ = 0;

        self.comment("preserved registers:")?;
        self.ins_mem(Ins::Sw, Reg::Ra, -WORD, Reg::Sp)?;
        self.ins_mem(Ins::Sw, Reg::Fp, -2 * WORD, Reg::Sp)?;
        for i in 0..12u8 {
            let displ = -(2 * WORD + (i as i32 + 1) * WORD);
            self.ins_mem(Ins::Sw, Reg::S(i), displ, Reg::Sp)?;
        }
        self.blank_line()?;
        for i in 0..12u8 {
            let displ = -(2 * WORD + 12 * WORD + (i as i32 + 1) * 2 * WORD);
            self.ins_mem(Ins::Fsd, Reg::Fs(i), displ, Reg::Sp)?;
        }

        // The body goes to a staging buffer; the frame setup below needs
        // the body's maximum displacement.
        let outer = std::mem::take(&mut self.out);

        self.blank_line()?;
        self.comment("function parameters:")?;
        let mut int_args = 0usize;
        let mut float_args = 0usize;
        for (i, &param) in params.iter().enumerate() {
            let ty = self.sx.idents.type_of(param);
            let name = self.sx.idents.spelling(param).to_string();

            if self.sx.types.is_structure(ty) {
                // Structure parameters live in their positional argument
                // slot, mirroring the call site's element-wise copy.
                let displ = PRESERVED_AREA + WORD + ((i as i32) + 2) * 2 * WORD;
                self.comment(&format!(
                    "parameter \"{}\" is on stack at offset {} from fp",
                    name, displ
                ))?;
                self.displacements
                    .insert(param, Lvalue::on_stack(Reg::Fp, displ, ty));
                continue;
            }

            let is_float = self.sx.types.is_floating(ty);
            let index = if is_float { float_args } else { int_args };

            if index < super::registers::ARG_REG_COUNT {
                let reg = if is_float {
                    float_args += 1;
                    Reg::Fa(index as u8)
                } else {
                    int_args += 1;
                    Reg::A(index as u8)
                };
                self.comment(&format!("parameter \"{}\" is in register {}", name, reg))?;
                self.displacements.insert(param, Lvalue::in_register(reg, ty));
            } else {
                let displ = PRESERVED_AREA + WORD + ((i as i32) + 2) * 2 * WORD;
                self.comment(&format!(
                    "parameter \"{}\" is on stack at offset {} from fp",
                    name, displ
                ))?;
                self.displacements
                    .insert(param, Lvalue::on_stack(Reg::Fp, displ, ty));
            }
        }

        self.blank_line()?;
        self.comment("function body:")?;
        if is_main && !self.global_init.is_empty() {
            self.comment("global initialization:")?;
            let staged = std::mem::take(&mut self.global_init);
            self.out.push_str(&staged);
        }
        self.emit_statement(body)?;

        if self.max_displ % 8 != 0 {
            self.max_displ += 8 - self.max_displ % 8;
        }
        let max_displ = self.max_displ;

        let body_buf = std::mem::replace(&mut self.out, outer);

        self.blank_line()?;
        self.comment("setting up fp:")?;
        self.ins_rri(Ins::Addi, Reg::Fp, Reg::Sp, -(PRESERVED_AREA + WORD) as i64)?;
        self.comment("setting up sp:")?;
        self.ins_rri(Ins::Addi, Reg::Sp, Reg::Fp, -(WORD + max_displ) as i64)?;
        self.out.push_str(&body_buf);

        self.blank_line()?;
        self.label_decl(Label::FuncEnd(func_num))?;
        self.comment("data restoring:")?;
        self.ins_rri(Ins::Addi, Reg::Sp, Reg::Fp, (PRESERVED_AREA + WORD) as i64)?;
        self.blank_line()?;
        for i in 0..12u8 {
            let displ = -(2 * WORD + (i as i32 + 1) * WORD);
            self.ins_mem(Ins::Lw, Reg::S(i), displ, Reg::Sp)?;
        }
        self.blank_line()?;
        for i in 0..12u8 {
            let displ = -(2 * WORD + 12 * WORD + (i as i32 + 1) * 2 * WORD);
            self.ins_mem(Ins::Fld, Reg::Fs(i), displ, Reg::Sp)?;
        }
        self.blank_line()?;
        self.ins_mem(Ins::Lw, Reg::Fp, -2 * WORD, Reg::Sp)?;
        self.ins_mem(Ins::Lw, Reg::Ra, -WORD, Reg::Sp)?;
        writeln!(&mut self.out, "\tjr ra")?;

        // Switch dispatch helpers accumulated by the body land behind the
        // epilogue, outside the fall-through path.
        if !self.routines.is_empty() {
            let routines = std::mem::take(&mut self.routines);
            self.out.push_str(&routines);
        }

        self.current_function = None;
        Ok(())
    }
}
