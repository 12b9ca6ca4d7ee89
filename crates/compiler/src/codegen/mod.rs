//! RV32GC code generation.
//!
//! Walks a validated translation unit and emits text assembly. The
//! expression builder has already enforced every type and category rule,
//! so this pass assumes well-typedness and only reports internal
//! inconsistencies (as `NodeUnexpected` diagnostics, continuing
//! best-effort).
//!
//! # Key Concepts
//!
//! ## Value Model
//!
//! Expressions lower to an [`Rvalue`]: a constant (not yet in a
//! register), a register, or void. Lvalues resolve to an [`Lvalue`]:
//! a `displ(base)` memory slot or a register. Loading an array- or
//! pointer-valued slot yields the address of element zero; structure
//! "values" are the address of their first word.
//!
//! ## Registers
//!
//! Temporaries come from a typed pool over `t0–t6` and `ft0–ft11`,
//! scanned first-free. An rvalue loaded from a register-resident variable
//! borrows that register (`from_lvalue`); releasing it is a no-op. Every
//! other acquired temporary is released exactly once, on every exit path
//! of the expression that owns it.
//!
//! ## Frames
//!
//! The prologue saves `ra`, `fp` and the full `s`/`fs` banks below the
//! caller's `sp` (152 bytes), then points `fp` below the preserved area
//! and `sp` below the frame. The frame size depends on the body's
//! high-water displacement, so bodies are staged into a secondary buffer
//! and flushed after the `fp`/`sp` setup is written. Locals sit at
//! negative `fp` offsets, globals at non-negative `gp` offsets, call
//! marshalling at non-negative `sp` offsets.
//!
//! ## Control Flow
//!
//! Conditions inherit a true and a false label and branch directly;
//! relationals materialize 0/1 only in value contexts. Loops use
//! `BEGIN_CYCLE`/`END` label pairs, switches either a `beq` chain or a
//! run-time linear-probed table keyed by `value mod size`, selected by
//! case count.
//!
//! # Module Structure
//!
//! - `state.rs`: the [`Encoder`], labels, lvalue/rvalue model, emission
//!   helpers
//! - `registers.rs`: register names and the temporary pool
//! - `instructions.rs`: mnemonics and operator-to-instruction tables
//! - `expressions.rs`: expression and condition lowering
//! - `calls.rs`: calling convention and built-ins (printf family, array
//!   copies, libm)
//! - `declarations.rs`: variables, arrays, structures, function frames
//! - `control_flow.rs`: if/loops/switch
//! - `statements.rs`: statement dispatch
//! - `globals.rs`: preamble, string data pre-pass, unit walk, postamble
//! - `error.rs`: error types

mod calls;
mod control_flow;
mod declarations;
mod error;
mod expressions;
mod globals;
mod instructions;
mod registers;
mod state;
mod statements;

pub use error::{CodeGenError, CompileError};
pub use registers::{Reg, RegisterPool};
pub use state::{Encoder, Label, Lvalue, LvalueKind, Rvalue, RvalueKind};

use crate::ast::Tree;
use crate::builtins::Builtins;
use crate::config::CodegenConfig;
use rvc_core::Syntax;

/// Compiles a validated translation unit to RV32GC assembly text.
///
/// Fails without emitting when the reporter already holds errors, and
/// after emitting when the generator had to post internal diagnostics
/// (the artifact would be invalid).
pub fn compile(
    tree: &Tree,
    sx: &mut Syntax,
    builtins: &Builtins,
    config: &CodegenConfig,
) -> Result<String, CompileError> {
    if sx.was_error() {
        return Err(CompileError::Semantic {
            errors: sx.reporter.error_count(),
        });
    }

    let encoder = Encoder::new(sx, tree, builtins, config);
    let text = encoder.encode()?;

    if sx.was_error() {
        return Err(CompileError::Semantic {
            errors: sx.reporter.error_count(),
        });
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, DeclKind, ExprId, StmtId, StmtKind, Tree, UnaryOp};
    use crate::builder::ExprBuilder;
    use rvc_core::{Location, Syntax, TypeId};

    fn loc() -> Location {
        Location::default()
    }

    struct Unit {
        sx: Syntax,
        tree: Tree,
        builtins: Builtins,
    }

    impl Unit {
        fn new() -> Self {
            let mut sx = Syntax::new();
            let builtins = Builtins::register(&mut sx);
            Unit {
                sx,
                tree: Tree::new(),
                builtins,
            }
        }

        fn builder(&mut self) -> ExprBuilder<'_> {
            ExprBuilder::new(&mut self.sx, &mut self.tree)
        }

        /// Declares and defines a zero-parameter `int` function from a
        /// list of body statements.
        fn define_function(&mut self, name: &str, body: Vec<StmtId>) {
            let fn_ty = self.sx.types.function(TypeId::INT, vec![]);
            let ident = self.sx.idents.declare(name, fn_ty);
            let body = self.tree.add_stmt(StmtKind::Compound(body));
            let d = self.tree.add_decl(DeclKind::Func {
                ident,
                params: vec![],
                body,
            });
            self.tree.push_unit(d);
        }

        fn ret(&mut self, value: ExprId) -> StmtId {
            self.tree.add_stmt(StmtKind::Return { value: Some(value) })
        }

        fn compile(mut self) -> String {
            compile(
                &self.tree,
                &mut self.sx,
                &self.builtins,
                &CodegenConfig::default(),
            )
            .expect("compilation succeeds")
        }
    }

    #[test]
    fn test_framing_directives() {
        let mut unit = Unit::new();
        let zero = unit.builder().int_literal(0, loc());
        let ret = unit.ret(zero);
        unit.define_function("main", vec![ret]);
        let asm = unit.compile();

        assert!(asm.contains("\t.attribute 4, 16"));
        assert!(asm.contains("\t.file \"main.c\""));
        assert!(asm.contains("\t.globl main"));
        assert!(asm.contains("main:"));
        assert!(asm.contains(".printid:"));
        assert!(asm.contains("\t.size main, .Lfunc_end0-main"));
        assert!(asm.contains("\t.section \".note.GNU-stack\",\"\",@progbits"));
    }

    #[test]
    fn test_prologue_epilogue_symmetry() {
        let mut unit = Unit::new();
        let zero = unit.builder().int_literal(0, loc());
        let ret = unit.ret(zero);
        unit.define_function("main", vec![ret]);
        let asm = unit.compile();

        // Every callee-saved register is saved and restored at the same
        // offset; sp ends where it started.
        assert!(asm.contains("\tsw ra, -4(sp)"));
        assert!(asm.contains("\tlw ra, -4(sp)"));
        assert!(asm.contains("\tsw fp, -8(sp)"));
        assert!(asm.contains("\tlw fp, -8(sp)"));
        for i in 0..12 {
            let displ = -(8 + (i + 1) * 4);
            assert!(asm.contains(&format!("\tsw s{}, {}(sp)", i, displ)));
            assert!(asm.contains(&format!("\tlw s{}, {}(sp)", i, displ)));
            let fdispl = -(8 + 48 + (i + 1) * 8);
            assert!(asm.contains(&format!("\tfsd fs{}, {}(sp)", i, fdispl)));
            assert!(asm.contains(&format!("\tfld fs{}, {}(sp)", i, fdispl)));
        }
        assert!(asm.contains("\taddi fp, sp, -156"));
        assert!(asm.contains("\taddi sp, fp, 156"));
        assert!(asm.contains("\tjr ra"));
    }

    #[test]
    fn test_scenario_folded_return() {
        // int main() { return 1 + 2 * 3; }
        let mut unit = Unit::new();
        let mut b = unit.builder();
        let two = b.int_literal(2, loc());
        let three = b.int_literal(3, loc());
        let product = b.binary(two, three, BinaryOp::Mul, loc());
        let one = b.int_literal(1, loc());
        let sum = b.binary(one, product, BinaryOp::Add, loc());
        let ret = unit.ret(sum);
        unit.define_function("main", vec![ret]);
        let asm = unit.compile();

        // Folding happened: the literal 7 is returned, no arithmetic in
        // the body.
        assert!(asm.contains("\tli a0, 7"));
        assert!(!asm.contains("\tmul"));
        assert!(!asm.contains("\tadd a0"));
        assert!(asm.contains("\tj FUNCEND"));
    }

    #[test]
    fn test_scenario_global_variable() {
        // int x; int main() { x = 5; return x; }
        let mut unit = Unit::new();
        let x = unit.sx.idents.declare("x", TypeId::INT);
        let d = unit.tree.add_decl(DeclKind::Var {
            ident: x,
            bounds: vec![],
            init: None,
        });
        unit.tree.push_unit(d);

        let mut b = unit.builder();
        let x_ref = b.identifier("x", loc());
        let five = b.int_literal(5, loc());
        let assign = b.binary(x_ref, five, BinaryOp::Assign, loc());
        let assign_stmt = unit.tree.add_stmt(StmtKind::Expr(assign));
        let x_ref = unit.builder().identifier("x", loc());
        let ret = unit.ret(x_ref);
        unit.define_function("main", vec![assign_stmt, ret]);
        let asm = unit.compile();

        // x lives at a gp-relative offset.
        assert!(asm.contains("\tli t0, 5"));
        assert!(asm.contains("\tsw t0, 0(gp)"));
        assert!(asm.contains("\tlw t0, 0(gp)"));
        assert!(asm.contains("\tmv a0, t0"));
    }

    #[test]
    fn test_scenario_global_array() {
        // int a[3] = {10, 20, 30}; int main() { return a[1]; }
        let mut unit = Unit::new();
        let arr_ty = unit.sx.types.array_of(TypeId::INT);
        let a = unit.sx.idents.declare("a", arr_ty);

        let mut b = unit.builder();
        let bound = b.int_literal(3, loc());
        let e10 = b.int_literal(10, loc());
        let e20 = b.int_literal(20, loc());
        let e30 = b.int_literal(30, loc());
        let init = b.init_list(vec![e10, e20, e30], loc(), loc());
        assert!(b.check_assignment_operands(arr_ty, init));
        let d = unit.tree.add_decl(DeclKind::Var {
            ident: a,
            bounds: vec![bound],
            init: Some(init),
        });
        unit.tree.push_unit(d);

        let mut b = unit.builder();
        let a_ref = b.identifier("a", loc());
        let one = b.int_literal(1, loc());
        let elem = b.subscript(a_ref, one, loc(), loc());
        let ret = unit.ret(elem);
        unit.define_function("main", vec![ret]);
        let asm = unit.compile();

        // The dimension size sits one word above element zero (slot word
        // at 0, block at 4..16, element zero at 12, size word at 16).
        assert!(asm.contains("\tli t0, 3"));
        assert!(asm.contains("\tsw t0, 16(gp)"));
        // The pointer to element zero lands in the variable slot.
        assert!(asm.contains("\taddi t0, gp, 12"));
        assert!(asm.contains("\tsw t0, 0(gp)"));
        // a[1] is one word below element zero.
        assert!(asm.contains("\tli t1, 20"));
        assert!(asm.contains(", -4(t0)"));
    }

    #[test]
    fn test_scenario_for_loop_printf() {
        // int main() { int i; for (i = 0; i < 3; i++) printf("%i\n", i);
        //              return 0; }
        let mut unit = Unit::new();
        unit.sx.idents.enter_scope();
        let i = unit.sx.idents.declare("i", TypeId::INT);
        let i_decl = unit.tree.add_decl(DeclKind::Var {
            ident: i,
            bounds: vec![],
            init: None,
        });
        let decl_stmt = unit.tree.add_stmt(StmtKind::Declarations(vec![i_decl]));

        let mut b = unit.builder();
        let i_ref = b.identifier("i", loc());
        let zero = b.int_literal(0, loc());
        let init = b.binary(i_ref, zero, BinaryOp::Assign, loc());
        let init_stmt = unit.tree.add_stmt(StmtKind::Expr(init));

        let mut b = unit.builder();
        let i_ref = b.identifier("i", loc());
        let three = b.int_literal(3, loc());
        let cond = b.binary(i_ref, three, BinaryOp::Lt, loc());

        let mut b = unit.builder();
        let i_ref = b.identifier("i", loc());
        let step = b.unary(i_ref, UnaryOp::PostInc, loc());

        let mut b = unit.builder();
        let printf_ref = b.identifier("printf", loc());
        let fmt = b.string_literal("%i\n", loc());
        let i_ref = b.identifier("i", loc());
        let call = b.call(printf_ref, vec![fmt, i_ref], loc(), loc());
        let body = unit.tree.add_stmt(StmtKind::Expr(call));

        let for_stmt = unit.tree.add_stmt(StmtKind::For {
            init: Some(init_stmt),
            cond: Some(cond),
            step: Some(step),
            body,
        });
        let zero = unit.builder().int_literal(0, loc());
        let ret = unit.ret(zero);
        unit.define_function("main", vec![decl_stmt, for_stmt, ret]);
        let asm = unit.compile();

        // Loop labels and the split format string.
        assert!(asm.contains("BEGIN_CYCLE"));
        assert!(asm.contains("END"));
        assert!(asm.contains("STRING0:\n\t.ascii \"%i\\0\""));
        assert!(asm.contains("STRING1:\n\t.ascii \"\\n\\0\""));
        assert!(asm.contains("\tlui t0, %hi(STRING0)"));
        assert!(asm.contains("\taddi a0, t0, %lo(STRING0)"));
        assert!(asm.contains("%lo(STRING1)"));
        assert!(asm.contains("\tcall printf"));
        // i is compared against its bound each iteration.
        assert!(asm.contains("\tblt"));
    }

    fn switch_unit(case_values: &[i32], with_default: bool) -> Unit {
        // int main() { int x = 3; switch (x) { case v: return v; ...
        //              [default: return 0;] } }
        let mut unit = Unit::new();
        unit.sx.idents.enter_scope();
        let x = unit.sx.idents.declare("x", TypeId::INT);

        let three = unit.builder().int_literal(3, loc());
        let x_decl = unit.tree.add_decl(DeclKind::Var {
            ident: x,
            bounds: vec![],
            init: Some(three),
        });
        let decl_stmt = unit.tree.add_stmt(StmtKind::Declarations(vec![x_decl]));

        let mut substmts = Vec::new();
        for &v in case_values {
            let value = unit.builder().int_literal(v, loc());
            let result = unit.builder().int_literal(v, loc());
            let body = unit.ret(result);
            substmts.push(unit.tree.add_stmt(StmtKind::Case { value, body }));
        }
        if with_default {
            let zero = unit.builder().int_literal(0, loc());
            let body = unit.ret(zero);
            substmts.push(unit.tree.add_stmt(StmtKind::Default { body }));
        }
        let body = unit.tree.add_stmt(StmtKind::Compound(substmts));

        let cond = unit.builder().identifier("x", loc());
        let switch_stmt = unit.tree.add_stmt(StmtKind::Switch { cond, body });
        unit.define_function("main", vec![decl_stmt, switch_stmt]);
        unit
    }

    #[test]
    fn test_scenario_small_switch_uses_chain() {
        let asm = switch_unit(&[1, 3], true).compile();

        assert!(asm.contains("CASE1_1:"));
        assert!(asm.contains("CASE2_1:"));
        assert!(asm.contains("DEFAULT1:"));
        assert!(asm.contains("\tbeq"));
        // Small switches never build the run-time table.
        assert!(!asm.contains("CASE_INSERT"));
        assert!(!asm.contains("\tecall"));
    }

    #[test]
    fn test_large_switch_builds_probed_table() {
        let asm = switch_unit(&[1, 2, 3, 4, 5], true).compile();

        // Heap allocation and one insert per case.
        assert!(asm.contains("\tli a7, 9"));
        assert!(asm.contains("\tecall"));
        assert_eq!(asm.matches("\tcall CASE_INSERT1").count(), 5);
        assert!(asm.contains("\tcall CASE_CONDITION1"));
        // The helper routines land behind the epilogue and dispatch
        // through the stored label.
        assert!(asm.contains("CASE_INSERT1:"));
        assert!(asm.contains("CASE_CONDITION1:"));
        assert!(asm.contains("\tjr t6"));
        assert!(asm.contains("\tbeqz t6, CASE_CONDITION1_MISS"));
        assert!(asm.contains("\tj DEFAULT1"));
        let epilogue_at = asm.find("\tjr ra").unwrap();
        let routines_at = asm.find("CASE_INSERT1:").unwrap();
        assert!(routines_at > epilogue_at);
    }

    #[test]
    fn test_switch_without_default_misses_to_end() {
        let asm = switch_unit(&[1, 2], false).compile();
        assert!(!asm.contains("DEFAULT1"));
        // The miss path of the chain jumps to the switch end label.
        assert!(asm.contains("\tj END"));
    }

    #[test]
    fn test_scenario_float_function() {
        // double f(double x) { return x * x; }
        // int main() { return (int)f(2.5); }
        let mut unit = Unit::new();
        let f_ty = unit.sx.types.function(TypeId::FLOAT, vec![TypeId::FLOAT]);
        let f = unit.sx.idents.declare("f", f_ty);

        unit.sx.idents.enter_scope();
        let x = unit.sx.idents.declare("x", TypeId::FLOAT);
        let mut b = unit.builder();
        let x1 = b.identifier("x", loc());
        let x2 = b.identifier("x", loc());
        let square = b.binary(x1, x2, BinaryOp::Mul, loc());
        unit.sx.idents.leave_scope();
        let ret = unit.ret(square);
        let body = unit.tree.add_stmt(StmtKind::Compound(vec![ret]));
        let d = unit.tree.add_decl(DeclKind::Func {
            ident: f,
            params: vec![x],
            body,
        });
        unit.tree.push_unit(d);

        let mut b = unit.builder();
        let f_ref = b.identifier("f", loc());
        let arg = b.float_literal(2.5, loc());
        let call = b.call(f_ref, vec![arg], loc(), loc());
        let cast = b.cast(TypeId::INT, call, loc());
        let ret = unit.ret(cast);
        unit.define_function("main", vec![ret]);
        let asm = unit.compile();

        // The argument is staged and loaded into fa0; the square runs in
        // the floating bank; the result converts back to an integer.
        assert!(asm.contains("\tfld fa0, 8(sp)"));
        assert!(asm.contains("\tfmul.d ft0, fa0, fa0"));
        assert!(asm.contains("\tfmv.d fa0, ft0"));
        assert!(asm.contains("\tfcvt.w.d t0, fa0, rtz"));
        assert!(asm.contains("\tjal FUNC"));
    }

    #[test]
    fn test_local_array_with_size_word() {
        // int main() { int a[3] = {10, 20, 30}; return a[1]; }
        let mut unit = Unit::new();
        let arr_ty = unit.sx.types.array_of(TypeId::INT);
        unit.sx.idents.enter_scope();
        let a = unit.sx.idents.declare("a", arr_ty);

        let mut b = unit.builder();
        let bound = b.int_literal(3, loc());
        let e10 = b.int_literal(10, loc());
        let e20 = b.int_literal(20, loc());
        let e30 = b.int_literal(30, loc());
        let init = b.init_list(vec![e10, e20, e30], loc(), loc());
        assert!(b.check_assignment_operands(arr_ty, init));
        let a_decl = unit.tree.add_decl(DeclKind::Var {
            ident: a,
            bounds: vec![bound],
            init: Some(init),
        });
        let decl_stmt = unit.tree.add_stmt(StmtKind::Declarations(vec![a_decl]));

        let mut b = unit.builder();
        let a_ref = b.identifier("a", loc());
        let one = b.int_literal(1, loc());
        let elem = b.subscript(a_ref, one, loc(), loc());
        let ret = unit.ret(elem);
        unit.define_function("main", vec![decl_stmt, ret]);
        let asm = unit.compile();

        // Size word above element zero, pointer in the slot, elements
        // stored downward from the element-zero address.
        assert!(asm.contains("\tsw t0, -4(sp)"));
        assert!(asm.contains("\taddi t0, sp, -8"));
        assert!(asm.contains("\tsw t0, -4(fp)"));
        assert!(asm.contains("\taddi sp, sp, -16"));
        assert!(asm.contains("\tlw t0, -4(fp)"));
        assert!(asm.contains("\tlw t1, -4(t0)"));
    }

    #[test]
    fn test_upb_reads_size_word() {
        // int main() { int a[4]; return upb(1, a); }
        let mut unit = Unit::new();
        let arr_ty = unit.sx.types.array_of(TypeId::INT);
        unit.sx.idents.enter_scope();
        let a = unit.sx.idents.declare("a", arr_ty);
        let bound = unit.builder().int_literal(4, loc());
        let a_decl = unit.tree.add_decl(DeclKind::Var {
            ident: a,
            bounds: vec![bound],
            init: None,
        });
        let decl_stmt = unit.tree.add_stmt(StmtKind::Declarations(vec![a_decl]));

        let mut b = unit.builder();
        let one = b.int_literal(1, loc());
        let a_ref = b.identifier("a", loc());
        let upb = b.upb(one, a_ref);
        let ret = unit.ret(upb);
        unit.define_function("main", vec![decl_stmt, ret]);
        let asm = unit.compile();

        // The bound is one load above the element-zero address.
        assert!(asm.contains("\tlw t1, 4(t0)"));
    }

    #[test]
    fn test_short_circuit_and_branches() {
        // int main() { int x = 1; if (x > 0 && x < 9) return 1;
        //              return 0; }
        let mut unit = Unit::new();
        unit.sx.idents.enter_scope();
        let x = unit.sx.idents.declare("x", TypeId::INT);
        let one = unit.builder().int_literal(1, loc());
        let x_decl = unit.tree.add_decl(DeclKind::Var {
            ident: x,
            bounds: vec![],
            init: Some(one),
        });
        let decl_stmt = unit.tree.add_stmt(StmtKind::Declarations(vec![x_decl]));

        let mut b = unit.builder();
        let x_ref = b.identifier("x", loc());
        let zero = b.int_literal(0, loc());
        let gt = b.binary(x_ref, zero, BinaryOp::Gt, loc());
        let x_ref = b.identifier("x", loc());
        let nine = b.int_literal(9, loc());
        let lt = b.binary(x_ref, nine, BinaryOp::Lt, loc());
        let and = b.binary(gt, lt, BinaryOp::LogAnd, loc());

        let one = unit.builder().int_literal(1, loc());
        let then_branch = unit.ret(one);
        let if_stmt = unit.tree.add_stmt(StmtKind::If {
            cond: and,
            then_branch,
            else_branch: None,
        });
        let zero = unit.builder().int_literal(0, loc());
        let ret = unit.ret(zero);
        unit.define_function("main", vec![decl_stmt, if_stmt, ret]);
        let asm = unit.compile();

        // Both comparisons branch directly; no 0/1 materialization of the
        // conjunction.
        assert!(asm.contains("\tbgt"));
        assert!(asm.contains("\tblt"));
        assert!(asm.contains("THEN"));
        assert!(asm.contains("ELSE"));
    }

    #[test]
    fn test_struct_member_assignment() {
        // struct { int x; double y; } s; s.y = 2; return s.x;
        let mut unit = Unit::new();
        let st = unit.sx.types.structure(vec![
            rvc_core::Member {
                name: "x".to_string(),
                ty: TypeId::INT,
            },
            rvc_core::Member {
                name: "y".to_string(),
                ty: TypeId::FLOAT,
            },
        ]);
        unit.sx.idents.enter_scope();
        let s = unit.sx.idents.declare("s", st);
        let s_decl = unit.tree.add_decl(DeclKind::Var {
            ident: s,
            bounds: vec![],
            init: None,
        });
        let decl_stmt = unit.tree.add_stmt(StmtKind::Declarations(vec![s_decl]));

        let mut b = unit.builder();
        let s_ref = b.identifier("s", loc());
        let y = b.member(s_ref, "y", false, loc(), loc());
        let two = b.int_literal(2, loc());
        let assign = b.binary(y, two, BinaryOp::Assign, loc());
        let assign_stmt = unit.tree.add_stmt(StmtKind::Expr(assign));

        let mut b = unit.builder();
        let s_ref = b.identifier("s", loc());
        let x = b.member(s_ref, "x", false, loc(), loc());
        let ret = unit.ret(x);
        unit.define_function("main", vec![decl_stmt, assign_stmt, ret]);
        let asm = unit.compile();

        // s occupies 12 bytes; x at -12(fp), y at -8(fp). The integer 2
        // converts to floating on store.
        assert!(asm.contains("\tfcvt.d.w"));
        assert!(asm.contains("\tfsd ft0, -8(fp)"));
        assert!(asm.contains("\tlw t0, -12(fp)"));
    }

    #[test]
    fn test_do_while_continue_label() {
        // int main() { int i = 0; do { i++; } while (i < 2); return i; }
        let mut unit = Unit::new();
        unit.sx.idents.enter_scope();
        let i = unit.sx.idents.declare("i", TypeId::INT);
        let zero = unit.builder().int_literal(0, loc());
        let i_decl = unit.tree.add_decl(DeclKind::Var {
            ident: i,
            bounds: vec![],
            init: Some(zero),
        });
        let decl_stmt = unit.tree.add_stmt(StmtKind::Declarations(vec![i_decl]));

        let mut b = unit.builder();
        let i_ref = b.identifier("i", loc());
        let inc = b.unary(i_ref, UnaryOp::PostInc, loc());
        let inc_stmt = unit.tree.add_stmt(StmtKind::Expr(inc));
        let body = unit.tree.add_stmt(StmtKind::Compound(vec![inc_stmt]));

        let mut b = unit.builder();
        let i_ref = b.identifier("i", loc());
        let two = b.int_literal(2, loc());
        let cond = b.binary(i_ref, two, BinaryOp::Lt, loc());
        let do_stmt = unit.tree.add_stmt(StmtKind::Do { body, cond });

        let i_ref = unit.builder().identifier("i", loc());
        let ret = unit.ret(i_ref);
        unit.define_function("main", vec![decl_stmt, do_stmt, ret]);
        let asm = unit.compile();

        // The condition sits behind its own label so continue re-tests it;
        // a true condition branches back to the cycle start.
        assert!(asm.contains("BEGIN_CYCLE1:"));
        assert!(asm.contains("NEXT1:"));
        assert!(asm.contains("\tblt t0, t1, BEGIN_CYCLE1"));
    }

    #[test]
    fn test_ternary_feeds_one_register() {
        // int main() { int x = 5; return x > 0 ? 1 : 2; }
        let mut unit = Unit::new();
        unit.sx.idents.enter_scope();
        let x = unit.sx.idents.declare("x", TypeId::INT);
        let five = unit.builder().int_literal(5, loc());
        let x_decl = unit.tree.add_decl(DeclKind::Var {
            ident: x,
            bounds: vec![],
            init: Some(five),
        });
        let decl_stmt = unit.tree.add_stmt(StmtKind::Declarations(vec![x_decl]));

        let mut b = unit.builder();
        let x_ref = b.identifier("x", loc());
        let zero = b.int_literal(0, loc());
        let cond = b.binary(x_ref, zero, BinaryOp::Gt, loc());
        let one = b.int_literal(1, loc());
        let two = b.int_literal(2, loc());
        let pick = b.ternary(cond, one, two, loc());
        let ret = unit.ret(pick);
        unit.define_function("main", vec![decl_stmt, ret]);
        let asm = unit.compile();

        // Both arms write the same result register.
        assert!(asm.contains("THEN1:"));
        assert!(asm.contains("ELSE1:"));
        assert!(asm.contains("\tli t0, 1"));
        assert!(asm.contains("\tli t0, 2"));
        assert!(asm.contains("END1:"));
    }

    #[test]
    fn test_strcat_appends_after_destination() {
        // int a[2] = {1, 2}; int b[2] = {3, 4}; strcat(a, b);
        let mut unit = Unit::new();
        let arr_ty = unit.sx.types.array_of(TypeId::INT);
        unit.sx.idents.enter_scope();
        let a = unit.sx.idents.declare("a", arr_ty);
        let bb = unit.sx.idents.declare("b", arr_ty);

        let mut decls = Vec::new();
        for (ident, lo, hi) in [(a, 1, 2), (bb, 3, 4)] {
            let mut b = unit.builder();
            let bound = b.int_literal(2, loc());
            let e1 = b.int_literal(lo, loc());
            let e2 = b.int_literal(hi, loc());
            let init = b.init_list(vec![e1, e2], loc(), loc());
            assert!(b.check_assignment_operands(arr_ty, init));
            decls.push(unit.tree.add_decl(DeclKind::Var {
                ident,
                bounds: vec![bound],
                init: Some(init),
            }));
        }
        let decl_stmt = unit.tree.add_stmt(StmtKind::Declarations(decls));

        let mut b = unit.builder();
        let strcat_ref = b.identifier("strcat", loc());
        let a_ref = b.identifier("a", loc());
        let b_ref = b.identifier("b", loc());
        let call = b.call(strcat_ref, vec![a_ref, b_ref], loc(), loc());
        let call_stmt = unit.tree.add_stmt(StmtKind::Expr(call));
        let zero = unit.builder().int_literal(0, loc());
        let ret = unit.ret(zero);
        unit.define_function("main", vec![decl_stmt, call_stmt, ret]);
        let asm = unit.compile();

        // Source words land behind the destination's two elements.
        assert!(asm.contains("\tlw t2, 0(t1)"));
        assert!(asm.contains("\tsw t2, -8(t0)"));
        assert!(asm.contains("\tlw t2, -4(t1)"));
        assert!(asm.contains("\tsw t2, -12(t0)"));
    }

    #[test]
    fn test_print_uses_type_templates() {
        // int main() { print(7, 2.5); return 0; }
        let mut unit = Unit::new();
        let mut b = unit.builder();
        let print_ref = b.identifier("print", loc());
        let seven = b.int_literal(7, loc());
        let half = b.float_literal(2.5, loc());
        let call = b.call(print_ref, vec![seven, half], loc(), loc());
        let call_stmt = unit.tree.add_stmt(StmtKind::Expr(call));
        let zero = unit.builder().int_literal(0, loc());
        let ret = unit.ret(zero);
        unit.define_function("main", vec![call_stmt, ret]);
        let asm = unit.compile();

        assert!(asm.contains("%hi(.i)"));
        assert!(asm.contains("%hi(.f)"));
        // The floating argument is bit-copied into a1.
        assert!(asm.contains("\tfmv.x.d a1, ft0"));
        assert_eq!(asm.matches("\tcall printf").count(), 2);
    }

    #[test]
    fn test_struct_argument_does_not_alias_staging_slots() {
        // struct Point { int x; int y; };
        // int f(struct Point p, double d) { return p.x; }
        // int main() { struct Point s = {1, 2}; return f(s, 2.5); }
        let mut unit = Unit::new();
        let st = unit.sx.types.structure(vec![
            rvc_core::Member {
                name: "x".to_string(),
                ty: TypeId::INT,
            },
            rvc_core::Member {
                name: "y".to_string(),
                ty: TypeId::INT,
            },
        ]);
        let f_ty = unit.sx.types.function(TypeId::INT, vec![st, TypeId::FLOAT]);
        let f = unit.sx.idents.declare("f", f_ty);

        unit.sx.idents.enter_scope();
        let p = unit.sx.idents.declare("p", st);
        let d = unit.sx.idents.declare("d", TypeId::FLOAT);
        let mut b = unit.builder();
        let p_ref = b.identifier("p", loc());
        let p_x = b.member(p_ref, "x", false, loc(), loc());
        unit.sx.idents.leave_scope();
        let ret = unit.ret(p_x);
        let body = unit.tree.add_stmt(StmtKind::Compound(vec![ret]));
        let fd = unit.tree.add_decl(DeclKind::Func {
            ident: f,
            params: vec![p, d],
            body,
        });
        unit.tree.push_unit(fd);

        unit.sx.idents.enter_scope();
        let s = unit.sx.idents.declare("s", st);
        let mut b = unit.builder();
        let one = b.int_literal(1, loc());
        let two = b.int_literal(2, loc());
        let init = b.init_list(vec![one, two], loc(), loc());
        assert!(b.check_assignment_operands(st, init));
        let s_decl = unit.tree.add_decl(DeclKind::Var {
            ident: s,
            bounds: vec![],
            init: Some(init),
        });
        let decl_stmt = unit.tree.add_stmt(StmtKind::Declarations(vec![s_decl]));

        let mut b = unit.builder();
        let f_ref = b.identifier("f", loc());
        let s_ref = b.identifier("s", loc());
        let half = b.float_literal(2.5, loc());
        let call = b.call(f_ref, vec![s_ref, half], loc(), loc());
        let ret = unit.ret(call);
        unit.define_function("main", vec![decl_stmt, ret]);
        let asm = unit.compile();

        // The structure's words land in its positional slot at 16(sp)..;
        // the floating argument stages at 8(sp), below the positional
        // region, so the later store cannot overwrite the copy.
        assert!(asm.contains("\taddi sp, sp, -32"));
        assert!(asm.contains("\tsw t1, 16(sp)"));
        assert!(asm.contains("\tsw t1, 20(sp)"));
        assert!(asm.contains("\tfsd ft0, 8(sp)"));
        assert!(asm.contains("\tfld fa0, 8(sp)"));
        // The callee reads the structure from the matching offset.
        assert!(asm.contains("parameter \"p\" is on stack at offset 172 from fp"));
        assert!(asm.contains("\tlw t0, 172(fp)"));
    }

    #[test]
    fn test_libm_builtin_call() {
        // double through fa0, straight into libm.
        let mut unit = Unit::new();
        let mut b = unit.builder();
        let sqrt_ref = b.identifier("sqrt", loc());
        let four = b.float_literal(4.0, loc());
        let call = b.call(sqrt_ref, vec![four], loc(), loc());
        let call_stmt = unit.tree.add_stmt(StmtKind::Expr(call));
        let zero = unit.builder().int_literal(0, loc());
        let ret = unit.ret(zero);
        unit.define_function("main", vec![call_stmt, ret]);
        let asm = unit.compile();

        assert!(asm.contains("\tfmv.d fa0, ft0"));
        assert!(asm.contains("\tcall sqrt"));
    }

    #[test]
    fn test_semantic_errors_block_emission() {
        let mut unit = Unit::new();
        let bad = unit.builder().identifier("ghost", loc());
        assert!(bad.is_broken());
        let result = compile(
            &unit.tree,
            &mut unit.sx,
            &unit.builtins,
            &CodegenConfig::default(),
        );
        assert!(matches!(
            result,
            Err(CompileError::Semantic { errors: 1 })
        ));
    }
}
