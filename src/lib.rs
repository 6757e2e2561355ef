//! spreadcall: a JavaScript-subset engine with a speculative spread-call tier
//!
//! Spread calls (`f(...args)`) normally run the full iteration protocol on
//! every call. spreadcall profiles each `f(...x)` call site and, once it is hot
//! and its argument is always a plain dense array, switches it to a guarded
//! fast path that reads the elements directly. Any write to
//! `Array.prototype[Symbol.iterator]` or `%ArrayIteratorPrototype%.next`
//! invalidates the fast path before the next call can observe it.
//!
//! # Quick Start
//!
//! ```no_run
//! use spreadcall::{Runtime, Value};
//!
//! fn main() -> spreadcall::Result<()> {
//!     let mut runtime = Runtime::new();
//!     let result = runtime.eval("function add(a, b) { return a + b; } add(...[1, 2])")?;
//!     assert_eq!(result, Value::Number(3.0));
//!     println!("{}", runtime.stats().to_json()?);
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! The interpreter pipeline flows: Source → [`lexer`] → [`parser`] → [`ast`] → [`bytecode`] → [`runtime`] → Result
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Core** | [`lexer`], [`parser`], [`ast`], [`bytecode`], [`runtime`], [`error`](Error) |
//! | **Speculation** | [`jit`] |
//! | **Tooling** | [`repl`] |
// Clippy configuration for the spreadcall runtime.
//
// - type_complexity: VM execution uses nested Result<Option<Value>> types
// - new_without_default: Some types have required initialization logic
// - enum_variant_names: Opcode/AST variants follow JS naming conventions
#![allow(clippy::type_complexity)]
#![allow(clippy::new_without_default)]
#![allow(clippy::enum_variant_names)]

pub mod ast;
pub mod bytecode;
pub mod jit;
pub mod lexer;
pub mod parser;
pub mod prelude;
pub mod repl;
pub mod runtime;

mod error;

pub use error::{messages, Error, ErrorKind, Result, SourceLocation, StackFrame, StackTrace};
pub use jit::{OptimizerConfig, OptimizerStats};
pub use runtime::{ObjectKind, Runtime, RuntimeConfig, Value};

/// spreadcall version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
