//! Built-in functions.
//!
//! The reduced language ships a handful of built-ins: the printf family,
//! two array-copy helpers and the libm transcendentals. They are ordinary
//! identifiers as far as the expression builder is concerned; the code
//! generator dispatches on [`BuiltinKind`] looked up by identifier, never
//! on numeric ids.

use rvc_core::{IdentId, Syntax, TypeId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    /// `printf(fmt, ...)` — the sole supported variadic.
    Printf,
    /// `print(...)` — prints each argument with a per-type template.
    Print,
    /// `printid(...)` — prints identifier values with the `.printid` template.
    PrintId,
    /// `strcat(dst, src)` — appends `src` elements after `dst`'s.
    Strcat,
    /// `strncpy(dst, src)` — copies `src` elements over `dst`'s.
    Strncpy,
    Asin,
    Cos,
    Sin,
    Exp,
    Log,
    Log10,
    Sqrt,
}

impl BuiltinKind {
    pub const ALL: [BuiltinKind; 12] = [
        BuiltinKind::Printf,
        BuiltinKind::Print,
        BuiltinKind::PrintId,
        BuiltinKind::Strcat,
        BuiltinKind::Strncpy,
        BuiltinKind::Asin,
        BuiltinKind::Cos,
        BuiltinKind::Sin,
        BuiltinKind::Exp,
        BuiltinKind::Log,
        BuiltinKind::Log10,
        BuiltinKind::Sqrt,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinKind::Printf => "printf",
            BuiltinKind::Print => "print",
            BuiltinKind::PrintId => "printid",
            BuiltinKind::Strcat => "strcat",
            BuiltinKind::Strncpy => "strncpy",
            BuiltinKind::Asin => "asin",
            BuiltinKind::Cos => "cos",
            BuiltinKind::Sin => "sin",
            BuiltinKind::Exp => "exp",
            BuiltinKind::Log => "log",
            BuiltinKind::Log10 => "log10",
            BuiltinKind::Sqrt => "sqrt",
        }
    }

    pub fn from_name(name: &str) -> Option<BuiltinKind> {
        BuiltinKind::ALL.iter().copied().find(|b| b.name() == name)
    }

    /// The libm symbol a transcendental lowers to, if this is one.
    pub fn libm_symbol(self) -> Option<&'static str> {
        match self {
            BuiltinKind::Asin
            | BuiltinKind::Cos
            | BuiltinKind::Sin
            | BuiltinKind::Exp
            | BuiltinKind::Log
            | BuiltinKind::Log10
            | BuiltinKind::Sqrt => Some(self.name()),
            _ => None,
        }
    }
}

/// Registry mapping declared identifiers back to their builtin kind.
#[derive(Debug, Default)]
pub struct Builtins {
    by_ident: HashMap<IdentId, BuiltinKind>,
}

impl Builtins {
    /// Declares every builtin in the identifier table (at file scope) and
    /// records the mapping. Call once, before any user declarations.
    pub fn register(sx: &mut Syntax) -> Builtins {
        let string_ty = sx.types.array_of(TypeId::INT);
        let mut by_ident = HashMap::new();

        for kind in BuiltinKind::ALL {
            let ty = match kind {
                BuiltinKind::Printf => sx.types.variadic_function(TypeId::INT, vec![string_ty]),
                BuiltinKind::Print | BuiltinKind::PrintId => {
                    sx.types.variadic_function(TypeId::VOID, vec![])
                }
                BuiltinKind::Strcat | BuiltinKind::Strncpy => {
                    sx.types.function(TypeId::VOID, vec![string_ty, string_ty])
                }
                _ => sx.types.function(TypeId::FLOAT, vec![TypeId::FLOAT]),
            };
            let ident = sx.idents.declare(kind.name(), ty);
            by_ident.insert(ident, kind);
        }

        Builtins { by_ident }
    }

    pub fn get(&self, ident: IdentId) -> Option<BuiltinKind> {
        self.by_ident.get(&ident).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(BuiltinKind::from_name("printf"), Some(BuiltinKind::Printf));
        assert_eq!(BuiltinKind::from_name("sqrt"), Some(BuiltinKind::Sqrt));
        assert_eq!(BuiltinKind::from_name("memcpy"), None);
    }

    #[test]
    fn test_register_declares_callable_idents() {
        let mut sx = Syntax::new();
        let builtins = Builtins::register(&mut sx);

        let printf = sx.idents.lookup("printf").unwrap();
        assert_eq!(builtins.get(printf), Some(BuiltinKind::Printf));
        let ty = sx.idents.type_of(printf);
        assert!(sx.types.is_function(ty));
        assert!(sx.types.function_is_variadic(ty));

        let sin = sx.idents.lookup("sin").unwrap();
        assert_eq!(builtins.get(sin), Some(BuiltinKind::Sin));
        assert_eq!(
            sx.types.function_return(sx.idents.type_of(sin)),
            TypeId::FLOAT
        );
    }

    #[test]
    fn test_libm_symbols() {
        assert_eq!(BuiltinKind::Log10.libm_symbol(), Some("log10"));
        assert_eq!(BuiltinKind::Printf.libm_symbol(), None);
    }
}
