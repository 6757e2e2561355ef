//! Prelude module for convenient imports
//!
//! This module provides the most commonly used types for embedding
//! spreadcall. Import everything from this module for quick access:
//!
//! ```no_run
//! use spreadcall::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = RuntimeConfig {
//!         optimizer: OptimizerConfig::default().with_warmup_threshold(10),
//!         ..RuntimeConfig::default()
//!     };
//!     let mut runtime = Runtime::with_config(config);
//!     let result = runtime.eval("1 + 2")?;
//!     println!("{:?}", result);
//!     Ok(())
//! }
//! ```

// Core runtime types
pub use crate::runtime::{ObjectKind, Runtime, RuntimeConfig, Value};

// Error handling
pub use crate::error::{Error, ErrorKind, Result, SourceLocation, StackFrame, StackTrace};

// Bytecode compilation
pub use crate::bytecode::{compile, Chunk, Opcode, Script};

// Speculative spread-call tier
pub use crate::jit::{CallSiteStats, OptimizerConfig, OptimizerStats};

// Version constant
pub use crate::VERSION;
