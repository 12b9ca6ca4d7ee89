//! Encoder state and core value types.
//!
//! The [`Encoder`] owns everything emission needs: the output buffer, the
//! temporary-register pool, the identifier displacement map, array layout
//! records and the label counters. It is threaded mutably through every
//! emission function; there is no module-level state.

use super::instructions::Ins;
use super::registers::{Reg, RegisterPool};
use super::CodeGenError;
use crate::ast::Tree;
use crate::builtins::Builtins;
use crate::config::CodegenConfig;
use rvc_core::{IdentId, StringId, Syntax, TypeId};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Data word size in bytes.
pub const WORD: i32 = 4;

/// Bytes of the fixed preserved area: `ra` + `fp` + `s0–s11` + `fs0–fs11`.
pub const PRESERVED_AREA: i32 = 4 + 4 + 12 * WORD + 12 * 2 * WORD;

/// Assembly labels. Each prints as `<KIND><num>`; case labels additionally
/// carry the number of their enclosing switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Main,
    Func(usize),
    FuncEnd(usize),
    Next(usize),
    Str(usize),
    Then(usize),
    Else(usize),
    End(usize),
    BeginCycle(usize),
    Case { num: usize, switch: usize },
    CaseCondition(usize),
    Default(usize),
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Label::Main => f.write_str("main"),
            Label::Func(n) => write!(f, "FUNC{}", n),
            Label::FuncEnd(n) => write!(f, "FUNCEND{}", n),
            Label::Next(n) => write!(f, "NEXT{}", n),
            Label::Str(n) => write!(f, "STRING{}", n),
            Label::Then(n) => write!(f, "THEN{}", n),
            Label::Else(n) => write!(f, "ELSE{}", n),
            Label::End(n) => write!(f, "END{}", n),
            Label::BeginCycle(n) => write!(f, "BEGIN_CYCLE{}", n),
            Label::Case { num, switch } => write!(f, "CASE{}_{}", num, switch),
            Label::CaseCondition(n) => write!(f, "CASE_CONDITION{}", n),
            Label::Default(n) => write!(f, "DEFAULT{}", n),
        }
    }
}

/// Where an lvalue lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LvalueKind {
    /// At `displ(base)` in memory.
    Stack { base: Reg, displ: i32 },
    /// In a register (register-resident parameters).
    Register(Reg),
}

#[derive(Debug, Clone, Copy)]
pub struct Lvalue {
    pub kind: LvalueKind,
    pub ty: TypeId,
}

impl Lvalue {
    pub fn on_stack(base: Reg, displ: i32, ty: TypeId) -> Self {
        Lvalue {
            kind: LvalueKind::Stack { base, displ },
            ty,
        }
    }

    pub fn in_register(reg: Reg, ty: TypeId) -> Self {
        Lvalue {
            kind: LvalueKind::Register(reg),
            ty,
        }
    }
}

/// A constant operand not yet materialized into a register.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
    Str(StringId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RvalueKind {
    Const(ConstValue),
    Register(Reg),
    Void,
}

/// The result of lowering an expression.
#[derive(Debug, Clone, Copy)]
pub struct Rvalue {
    pub kind: RvalueKind,
    pub ty: TypeId,
    /// Set when the register is borrowed from a named lvalue; freeing such
    /// an rvalue is a no-op.
    pub from_lvalue: bool,
}

impl Rvalue {
    pub const VOID: Rvalue = Rvalue {
        kind: RvalueKind::Void,
        ty: TypeId::VOID,
        from_lvalue: false,
    };

    pub fn int_const(value: i64) -> Self {
        Rvalue {
            kind: RvalueKind::Const(ConstValue::Int(value)),
            ty: TypeId::INT,
            from_lvalue: false,
        }
    }

    pub fn float_const(value: f64) -> Self {
        Rvalue {
            kind: RvalueKind::Const(ConstValue::Float(value)),
            ty: TypeId::FLOAT,
            from_lvalue: false,
        }
    }

    pub fn reg(reg: Reg, ty: TypeId) -> Self {
        Rvalue {
            kind: RvalueKind::Register(reg),
            ty,
            from_lvalue: false,
        }
    }

    pub fn reg_borrowed(reg: Reg, ty: TypeId) -> Self {
        Rvalue {
            kind: RvalueKind::Register(reg),
            ty,
            from_lvalue: true,
        }
    }

    pub fn register(&self) -> Option<Reg> {
        match self.kind {
            RvalueKind::Register(reg) => Some(reg),
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self.kind, RvalueKind::Const(_))
    }

    pub fn as_int_const(&self) -> Option<i64> {
        match self.kind {
            RvalueKind::Const(ConstValue::Int(v)) => Some(v),
            _ => None,
        }
    }
}

/// Recorded layout of a declared array: how many elements the initializer
/// filled and how many the declaration reserved.
#[derive(Debug, Clone, Copy)]
pub struct LayoutInfo {
    pub elem_count: usize,
    pub decl_elem_count: usize,
}

/// The code generator's working state for one translation unit.
pub struct Encoder<'a> {
    pub(super) sx: &'a mut Syntax,
    pub(super) tree: &'a Tree,
    pub(super) builtins: &'a Builtins,
    pub(super) config: &'a CodegenConfig,

    /// Current output buffer. Function bodies temporarily swap in a
    /// staging buffer so the prologue can be patched with the final frame
    /// size before the body is flushed.
    pub(super) out: String,
    /// Helper routines (switch dispatch tables) flushed after the current
    /// function's epilogue.
    pub(super) routines: String,
    /// Global-variable initialization code, spliced into the top of `main`.
    pub(super) global_init: String,

    pub(super) pool: RegisterPool,
    pub(super) displacements: HashMap<IdentId, Lvalue>,
    pub(super) layouts: HashMap<IdentId, LayoutInfo>,

    /// High-water mark of local displacements in the current function.
    pub(super) max_displ: i32,
    /// Displacement cursor of the current block scope.
    pub(super) scope_displ: i32,
    /// Cursor of gp-relative global displacements.
    pub(super) global_displ: i32,

    pub(super) label_num: usize,
    pub(super) case_label_num: usize,
    pub(super) switch_counter: usize,

    pub(super) current_function: Option<IdentId>,
    pub(super) label_break: Option<Label>,
    pub(super) label_continue: Option<Label>,
}

impl<'a> Encoder<'a> {
    pub fn new(
        sx: &'a mut Syntax,
        tree: &'a Tree,
        builtins: &'a Builtins,
        config: &'a CodegenConfig,
    ) -> Self {
        Encoder {
            sx,
            tree,
            builtins,
            config,
            out: String::new(),
            routines: String::new(),
            global_init: String::new(),
            pool: RegisterPool::new(),
            displacements: HashMap::new(),
            layouts: HashMap::new(),
            max_displ: 0,
            scope_displ: 0,
            global_displ: 0,
            label_num: 1,
            case_label_num: 1,
            switch_counter: 0,
            current_function: None,
            label_break: None,
            label_continue: None,
        }
    }

    pub(super) fn new_label_num(&mut self) -> usize {
        let n = self.label_num;
        self.label_num += 1;
        n
    }

    // ------------------------------------------------------------------
    // Low-level text emission
    // ------------------------------------------------------------------

    pub(super) fn comment(&mut self, text: &str) -> Result<(), CodeGenError> {
        if self.config.emit_comments {
            writeln!(&mut self.out, "\t# {}", text)?;
        }
        Ok(())
    }

    pub(super) fn blank_line(&mut self) -> Result<(), CodeGenError> {
        writeln!(&mut self.out)?;
        Ok(())
    }

    pub(super) fn label_decl(&mut self, label: Label) -> Result<(), CodeGenError> {
        writeln!(&mut self.out, "{}:", label)?;
        Ok(())
    }

    pub(super) fn jump(&mut self, label: Label) -> Result<(), CodeGenError> {
        writeln!(&mut self.out, "\t{} {}", Ins::J, label)?;
        Ok(())
    }

    /// `instr rd, rs`
    pub(super) fn ins_rr(&mut self, ins: Ins, rd: Reg, rs: Reg) -> Result<(), CodeGenError> {
        writeln!(&mut self.out, "\t{} {}, {}", ins, rd, rs)?;
        Ok(())
    }

    /// `instr rd, rs1, rs2`
    pub(super) fn ins_rrr(
        &mut self,
        ins: Ins,
        rd: Reg,
        rs1: Reg,
        rs2: Reg,
    ) -> Result<(), CodeGenError> {
        writeln!(&mut self.out, "\t{} {}, {}, {}", ins, rd, rs1, rs2)?;
        Ok(())
    }

    /// `instr rd, rs, imm`
    pub(super) fn ins_rri(
        &mut self,
        ins: Ins,
        rd: Reg,
        rs: Reg,
        imm: i64,
    ) -> Result<(), CodeGenError> {
        writeln!(&mut self.out, "\t{} {}, {}, {}", ins, rd, rs, imm)?;
        Ok(())
    }

    /// `instr reg, displ(base)`
    pub(super) fn ins_mem(
        &mut self,
        ins: Ins,
        reg: Reg,
        displ: i32,
        base: Reg,
    ) -> Result<(), CodeGenError> {
        writeln!(&mut self.out, "\t{} {}, {}({})", ins, reg, displ, base)?;
        Ok(())
    }

    /// `li rd, imm`
    pub(super) fn li(&mut self, rd: Reg, imm: i64) -> Result<(), CodeGenError> {
        writeln!(&mut self.out, "\t{} {}, {}", Ins::Li, rd, imm)?;
        Ok(())
    }

    /// `li rd, 0x<ieee bits>` — floating constants travel through an
    /// integer register as their bit pattern.
    pub(super) fn li_float_bits(&mut self, rd: Reg, value: f64) -> Result<(), CodeGenError> {
        writeln!(&mut self.out, "\t{} {}, 0x{:016x}", Ins::Li, rd, value.to_bits())?;
        Ok(())
    }

    /// `la rd, <label>`
    pub(super) fn la(&mut self, rd: Reg, label: Label) -> Result<(), CodeGenError> {
        writeln!(&mut self.out, "\t{} {}, {}", Ins::La, rd, label)?;
        Ok(())
    }

    /// `b<cc> rs1, rs2, <label>`
    pub(super) fn branch(
        &mut self,
        ins: Ins,
        rs1: Reg,
        rs2: Reg,
        label: Label,
    ) -> Result<(), CodeGenError> {
        writeln!(&mut self.out, "\t{} {}, {}, {}", ins, rs1, rs2, label)?;
        Ok(())
    }

    /// `beqz/bnez rs, <label>`
    pub(super) fn branch_z(&mut self, ins: Ins, rs: Reg, label: Label) -> Result<(), CodeGenError> {
        writeln!(&mut self.out, "\t{} {}, {}", ins, rs, label)?;
        Ok(())
    }

    /// `call <symbol>` into the runtime or libc.
    pub(super) fn call_symbol(&mut self, symbol: &str) -> Result<(), CodeGenError> {
        writeln!(&mut self.out, "\t{} {}", Ins::Call, symbol)?;
        Ok(())
    }

    /// `jal <label>`
    pub(super) fn jal(&mut self, label: Label) -> Result<(), CodeGenError> {
        writeln!(&mut self.out, "\t{} {}", Ins::Jal, label)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Value plumbing
    // ------------------------------------------------------------------

    /// Frees the register owned by an rvalue. Borrowed registers (loaded
    /// from a named lvalue) and constants are untouched.
    pub(super) fn free_rvalue(&mut self, value: &Rvalue) {
        if let RvalueKind::Register(reg) = value.kind
            && !value.from_lvalue
        {
            self.pool.release(reg);
        }
    }

    /// Acquires a temporary of the right bank for `ty`.
    pub(super) fn acquire_for(&mut self, ty: TypeId) -> Result<Reg, CodeGenError> {
        if self.sx.types.is_floating(ty) {
            self.pool.acquire_float()
        } else {
            self.pool.acquire_int()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_formatting() {
        assert_eq!(Label::Func(7).to_string(), "FUNC7");
        assert_eq!(Label::FuncEnd(7).to_string(), "FUNCEND7");
        assert_eq!(Label::BeginCycle(2).to_string(), "BEGIN_CYCLE2");
        assert_eq!(Label::Case { num: 3, switch: 1 }.to_string(), "CASE3_1");
        assert_eq!(Label::Default(1).to_string(), "DEFAULT1");
        assert_eq!(Label::Str(0).to_string(), "STRING0");
        assert_eq!(Label::Main.to_string(), "main");
    }

    #[test]
    fn test_rvalue_constructors() {
        let c = Rvalue::int_const(5);
        assert!(c.is_const());
        assert_eq!(c.as_int_const(), Some(5));

        let r = Rvalue::reg_borrowed(Reg::A(0), TypeId::INT);
        assert!(r.from_lvalue);
        assert_eq!(r.register(), Some(Reg::A(0)));
        assert_eq!(Rvalue::VOID.register(), None);
    }

    #[test]
    fn test_preserved_area_size() {
        // ra + fp + 12 words of s-registers + 12 doublewords of fs-registers.
        assert_eq!(PRESERVED_AREA, 152);
    }
}
