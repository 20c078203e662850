//! gitmem-core - Front-end for the gitmem language
//!
//! This crate provides:
//! - **AST**: the statement tree executed by the interpreter
//! - **Lexer/Parser**: source text to AST
//! - **Lowering**: branch flattening and static register checks
//! - **Diagnostics**: ariadne-rendered error reports
//!
//! # Quick start
//!
//! ```rust
//! use gitmem_core::{lower, parse};
//!
//! let block = parse("$r = 1; x = $r; assert x == 1;").unwrap();
//! let program = lower(&block).unwrap();
//! assert_eq!(program.len(), 3);
//! ```

pub mod ast;
pub mod diagnostic;
pub mod lower;
pub mod span;
pub mod syntax;

// Re-exports
pub use ast::{Block, Expr, LVal, Name, Stmt};
pub use diagnostic::Diagnostic;
pub use lower::{lower, LowerError};
pub use span::{Span, Spanned};
pub use syntax::lexer::Token;
pub use syntax::parser::{parse, ParseError};

use std::sync::Arc;

/// Parse and lower a source file in one step, collecting every error as a
/// renderable diagnostic.
pub fn compile(src: &str) -> Result<Arc<Block>, Vec<Diagnostic>> {
    let block = parse(src).map_err(|e| vec![Diagnostic::from(e)])?;
    lower(&block).map_err(|errors| errors.into_iter().map(Diagnostic::from).collect())
}
