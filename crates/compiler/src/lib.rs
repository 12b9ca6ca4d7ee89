//! rvc compiler core.
//!
//! The semantic heart of a compiler for a reduced C language targeting
//! RV32GC: an expression builder that enforces type and value-category
//! rules and folds constants, and a code generator that lowers the
//! validated tree to text assembly. Lexing, parsing and the command line
//! are external collaborators; this crate consumes a finished AST plus a
//! [`rvc_core::Syntax`] context and produces an assembly string and
//! diagnostic records.
//!
//! ```rust
//! use rvc_compiler::{compile, Builtins, CodegenConfig, ExprBuilder, Tree};
//! use rvc_compiler::ast::{DeclKind, StmtKind};
//! use rvc_core::{Location, Syntax, TypeId};
//!
//! let mut sx = Syntax::new();
//! let builtins = Builtins::register(&mut sx);
//! let mut tree = Tree::new();
//!
//! // int main() { return 6 * 7; }
//! let mut b = ExprBuilder::new(&mut sx, &mut tree);
//! let six = b.int_literal(6, Location::default());
//! let seven = b.int_literal(7, Location::default());
//! let product = b.binary(six, seven, rvc_compiler::ast::BinaryOp::Mul, Location::default());
//!
//! let main_ty = sx.types.function(TypeId::INT, vec![]);
//! let main_ident = sx.idents.declare("main", main_ty);
//! let ret = tree.add_stmt(StmtKind::Return { value: Some(product) });
//! let body = tree.add_stmt(StmtKind::Compound(vec![ret]));
//! let main_decl = tree.add_decl(DeclKind::Func {
//!     ident: main_ident,
//!     params: vec![],
//!     body,
//! });
//! tree.push_unit(main_decl);
//!
//! let asm = compile(&tree, &mut sx, &builtins, &CodegenConfig::default()).unwrap();
//! assert!(asm.contains("li a0, 42"));
//! ```

pub mod ast;
pub mod builder;
pub mod builtins;
pub mod codegen;
pub mod config;

pub use ast::{DeclId, ExprId, StmtId, Tree, ValueCategory};
pub use builder::ExprBuilder;
pub use builtins::{BuiltinKind, Builtins};
pub use codegen::{compile, CodeGenError, CompileError};
pub use config::CodegenConfig;
