//! Translation-unit framing: preamble, string data, postamble.
//!
//! The emitted stream is, in order: the assembler preamble, the fixed
//! format-string constants, one labeled `.ascii` block per interned
//! string literal (split at `%` specifiers for the printf lowering), the
//! code of every function, and the closing directives.
//!
//! Global variable declarations are walked before any function: their
//! storage is assigned gp-relative displacements and their initialization
//! code is staged into a buffer that `main` splices into the top of its
//! body.

use super::state::Label;
use super::{CodeGenError, Encoder};
use crate::ast::DeclKind;
use std::fmt::Write as _;
use tracing::debug;

impl Encoder<'_> {
    /// Assembler preamble.
    pub(super) fn emit_pregen(&mut self) -> Result<(), CodeGenError> {
        writeln!(&mut self.out, "\t.text")?;
        writeln!(&mut self.out, "\t.attribute 4, 16")?;
        writeln!(&mut self.out, "\t.file \"{}\"", self.config.file_name)?;
        writeln!(&mut self.out, "\t.globl main")?;
        writeln!(&mut self.out, "\t.p2align 1")?;
        writeln!(&mut self.out, "\t.type main,@function")?;
        Ok(())
    }

    /// Ascii templates used by the print built-ins.
    pub(super) fn emit_format_constants(&mut self) -> Result<(), CodeGenError> {
        writeln!(&mut self.out, ".s:\n\t.ascii \"%s\\0\"")?;
        writeln!(&mut self.out, ".i:\n\t.ascii \"%i\\0\"")?;
        writeln!(&mut self.out, ".f:\n\t.ascii \"%f\\0\"")?;
        writeln!(&mut self.out, ".b:\n\t.ascii \"%b\\0\"")?;
        writeln!(&mut self.out, ".printid:\n\t.ascii \"%i \\0\"")?;
        Ok(())
    }

    /// Closing directives.
    pub(super) fn emit_postgen(&mut self) -> Result<(), CodeGenError> {
        writeln!(&mut self.out, ".Lfunc_end0:")?;
        writeln!(&mut self.out, "\t.size main, .Lfunc_end0-main")?;
        writeln!(
            &mut self.out,
            "\t.section \".note.GNU-stack\",\"\",@progbits"
        )?;
        Ok(())
    }

    /// Emits every interned string literal, split at its format
    /// specifiers. A string with k specifiers produces k + 1 slices; slice
    /// j of string i carries the label `STRING<i + j·total>`, so the
    /// printf lowering can address each slice from the base index alone.
    pub(super) fn emit_strings(&mut self) -> Result<(), CodeGenError> {
        let total = self.sx.strings.len();
        let strings: Vec<(usize, String)> = self
            .sx
            .strings
            .iter()
            .map(|(i, s)| (i, s.to_string()))
            .collect();

        for (i, text) in strings {
            self.label_decl(Label::Str(i))?;
            write!(&mut self.out, "\t.ascii \"")?;

            let mut slice = 0usize;
            let mut chars = text.chars().peekable();
            while let Some(ch) = chars.next() {
                match ch {
                    '%' if chars.peek().is_some() => {
                        // The specifier closes this slice; the next slice
                        // opens under its strided label.
                        let spec = chars.next().expect("peeked");
                        write!(&mut self.out, "%{}", spec)?;
                        writeln!(&mut self.out, "\\0\"")?;
                        slice += 1;
                        self.label_decl(Label::Str(i + slice * total))?;
                        write!(&mut self.out, "\t.ascii \"")?;
                    }
                    '\n' => write!(&mut self.out, "\\n")?,
                    '\t' => write!(&mut self.out, "\\t")?,
                    '"' => write!(&mut self.out, "\\\"")?,
                    '\\' => write!(&mut self.out, "\\\\")?,
                    _ => write!(&mut self.out, "{}", ch)?,
                }
            }
            writeln!(&mut self.out, "\\0\"")?;
        }
        Ok(())
    }

    /// Walks the translation unit. Globals first (storage assignment plus
    /// staged initialization), then every function definition.
    pub(super) fn emit_translation_unit(&mut self) -> Result<(), CodeGenError> {
        let unit: Vec<_> = self.tree.unit().to_vec();

        for &d in &unit {
            if matches!(self.tree.decl(d), DeclKind::Var { .. }) {
                // Initialization code goes to the staging buffer; it runs
                // at the top of main.
                let outer = std::mem::replace(&mut self.out, std::mem::take(&mut self.global_init));
                self.emit_variable_declaration(d)?;
                self.blank_line()?;
                self.global_init = std::mem::replace(&mut self.out, outer);
            }
        }
        debug!(
            globals_bytes = self.global_displ,
            strings = self.sx.strings.len(),
            "translation unit prepass done"
        );

        for &d in &unit {
            if matches!(self.tree.decl(d), DeclKind::Func { .. }) {
                self.emit_declaration(d)?;
            }
        }
        Ok(())
    }

    /// Runs the whole pipeline and hands back the assembly text.
    pub(super) fn encode(mut self) -> Result<String, CodeGenError> {
        self.emit_pregen()?;
        self.emit_format_constants()?;
        self.emit_strings()?;
        self.emit_translation_unit()?;
        self.emit_postgen()?;
        Ok(self.out)
    }
}
