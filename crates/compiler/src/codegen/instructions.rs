//! Instruction mnemonics.
//!
//! Double precision is used for all floating arithmetic (`.d` forms).
//! Pseudo-instructions the assembler expands (`mv`, `li`, `la`, `not`,
//! `neg`, `bgt`, `ble`, `beqz`, `bnez`, `ret`) are emitted as such.

use crate::ast::BinaryOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ins {
    Mv,
    Li,
    La,
    Not,
    Neg,

    Addi,
    Slli,
    Srai,
    Andi,
    Xori,
    Ori,
    Sltiu,

    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Sll,
    Sra,
    And,
    Xor,
    Or,

    Sw,
    Lw,
    Fsd,
    Fld,

    Jal,
    J,
    Call,

    Blt,
    Bgt,
    Ble,
    Bge,
    Beq,
    Bne,
    Bnez,

    FaddD,
    FsubD,
    FmulD,
    FdivD,
    FmvD,
    FnegD,
    FabsD,
    FeqD,
    FltD,
    FleD,
    FmvDX,
    FmvXD,
    FcvtDW,
    FcvtWD,
}

impl std::fmt::Display for Ins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Ins::Mv => "mv",
            Ins::Li => "li",
            Ins::La => "la",
            Ins::Not => "not",
            Ins::Neg => "neg",
            Ins::Addi => "addi",
            Ins::Slli => "slli",
            Ins::Srai => "srai",
            Ins::Andi => "andi",
            Ins::Xori => "xori",
            Ins::Ori => "ori",
            Ins::Sltiu => "sltiu",
            Ins::Add => "add",
            Ins::Sub => "sub",
            Ins::Mul => "mul",
            Ins::Div => "div",
            Ins::Rem => "rem",
            Ins::Sll => "sll",
            Ins::Sra => "sra",
            Ins::And => "and",
            Ins::Xor => "xor",
            Ins::Or => "or",
            Ins::Sw => "sw",
            Ins::Lw => "lw",
            Ins::Fsd => "fsd",
            Ins::Fld => "fld",
            Ins::Jal => "jal",
            Ins::J => "j",
            Ins::Call => "call",
            Ins::Blt => "blt",
            Ins::Bgt => "bgt",
            Ins::Ble => "ble",
            Ins::Bge => "bge",
            Ins::Beq => "beq",
            Ins::Bne => "bne",
            Ins::Bnez => "bnez",
            Ins::FaddD => "fadd.d",
            Ins::FsubD => "fsub.d",
            Ins::FmulD => "fmul.d",
            Ins::FdivD => "fdiv.d",
            Ins::FmvD => "fmv.d",
            Ins::FnegD => "fneg.d",
            Ins::FabsD => "fabs.d",
            Ins::FeqD => "feq.d",
            Ins::FltD => "flt.d",
            Ins::FleD => "fle.d",
            Ins::FmvDX => "fmv.d.x",
            Ins::FmvXD => "fmv.x.d",
            Ins::FcvtDW => "fcvt.d.w",
            Ins::FcvtWD => "fcvt.w.d",
        };
        f.write_str(text)
    }
}

/// Register-register instruction for an arithmetic/bitwise operator.
/// Compound assignments select the instruction of their base operation.
pub fn arith_instruction(op: BinaryOp, is_floating: bool) -> Option<Ins> {
    let ins = match op.compound_base().unwrap_or(op) {
        BinaryOp::Add => {
            if is_floating {
                Ins::FaddD
            } else {
                Ins::Add
            }
        }
        BinaryOp::Sub => {
            if is_floating {
                Ins::FsubD
            } else {
                Ins::Sub
            }
        }
        BinaryOp::Mul => {
            if is_floating {
                Ins::FmulD
            } else {
                Ins::Mul
            }
        }
        BinaryOp::Div => {
            if is_floating {
                Ins::FdivD
            } else {
                Ins::Div
            }
        }
        BinaryOp::Rem => Ins::Rem,
        BinaryOp::Shl => Ins::Sll,
        BinaryOp::Shr => Ins::Sra,
        BinaryOp::And => Ins::And,
        BinaryOp::Xor => Ins::Xor,
        BinaryOp::Or => Ins::Or,
        _ => return None,
    };
    Some(ins)
}

/// Immediate form of an arithmetic/bitwise instruction, when one exists.
pub fn arith_immediate_instruction(op: BinaryOp) -> Option<Ins> {
    match op.compound_base().unwrap_or(op) {
        BinaryOp::Add => Some(Ins::Addi),
        BinaryOp::Shl => Some(Ins::Slli),
        BinaryOp::Shr => Some(Ins::Srai),
        BinaryOp::And => Some(Ins::Andi),
        BinaryOp::Xor => Some(Ins::Xori),
        BinaryOp::Or => Some(Ins::Ori),
        _ => None,
    }
}

/// Conditional branch taken when `lhs op rhs` holds, integer operands.
pub fn branch_instruction(op: BinaryOp) -> Option<Ins> {
    match op {
        BinaryOp::Lt => Some(Ins::Blt),
        BinaryOp::Gt => Some(Ins::Bgt),
        BinaryOp::Le => Some(Ins::Ble),
        BinaryOp::Ge => Some(Ins::Bge),
        BinaryOp::Eq => Some(Ins::Beq),
        BinaryOp::Ne => Some(Ins::Bne),
        _ => None,
    }
}

/// Floating compare producing 0/1 in an integer register, together with
/// whether the operands must swap and whether the result is negated.
/// `flt.d`/`fle.d`/`feq.d` are the only comparisons the target has.
pub fn float_compare(op: BinaryOp) -> Option<(Ins, bool, bool)> {
    match op {
        BinaryOp::Lt => Some((Ins::FltD, false, false)),
        BinaryOp::Gt => Some((Ins::FltD, true, false)),
        BinaryOp::Le => Some((Ins::FleD, false, false)),
        BinaryOp::Ge => Some((Ins::FleD, true, false)),
        BinaryOp::Eq => Some((Ins::FeqD, false, false)),
        BinaryOp::Ne => Some((Ins::FeqD, false, true)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arith_selection() {
        assert_eq!(arith_instruction(BinaryOp::Add, false), Some(Ins::Add));
        assert_eq!(arith_instruction(BinaryOp::Add, true), Some(Ins::FaddD));
        assert_eq!(arith_instruction(BinaryOp::AddAssign, false), Some(Ins::Add));
        assert_eq!(arith_instruction(BinaryOp::Rem, false), Some(Ins::Rem));
        assert_eq!(arith_instruction(BinaryOp::Lt, false), None);
    }

    #[test]
    fn test_immediate_forms() {
        assert_eq!(arith_immediate_instruction(BinaryOp::Add), Some(Ins::Addi));
        assert_eq!(arith_immediate_instruction(BinaryOp::Xor), Some(Ins::Xori));
        // No subi/muli on the target.
        assert_eq!(arith_immediate_instruction(BinaryOp::Sub), None);
        assert_eq!(arith_immediate_instruction(BinaryOp::Mul), None);
    }

    #[test]
    fn test_branch_selection() {
        assert_eq!(branch_instruction(BinaryOp::Le), Some(Ins::Ble));
        assert_eq!(branch_instruction(BinaryOp::Ne), Some(Ins::Bne));
        assert_eq!(branch_instruction(BinaryOp::Add), None);
    }

    #[test]
    fn test_float_compare_shapes() {
        // a > b is b < a.
        assert_eq!(float_compare(BinaryOp::Gt), Some((Ins::FltD, true, false)));
        // a != b is !(a == b).
        assert_eq!(float_compare(BinaryOp::Ne), Some((Ins::FeqD, false, true)));
    }
}
