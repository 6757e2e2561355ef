//! Shared test helpers for integration tests

use spreadcall::jit::OptimizerConfig;
use spreadcall::{Runtime, RuntimeConfig, Value};

/// The invalidation oracle script
#[allow(dead_code)]
pub const ORACLE: &str = include_str!("../fixtures/spreadcall-dynamic-invalidation.js");

/// Run JavaScript code and return the result
#[allow(dead_code)]
pub fn run_js(code: &str) -> spreadcall::Result<Value> {
    let mut runtime = Runtime::new();
    runtime.eval(code)
}

/// Run JavaScript with the given optimizer settings, returning the runtime
/// so statistics can be inspected
#[allow(dead_code)]
pub fn run_js_with(code: &str, optimizer: OptimizerConfig) -> (Runtime, spreadcall::Result<Value>) {
    let mut runtime = Runtime::with_config(RuntimeConfig {
        optimizer,
        ..RuntimeConfig::default()
    });
    let result = runtime.eval(code);
    (runtime, result)
}

/// Optimizer settings with a small warm-up so tests optimize quickly
#[allow(dead_code)]
pub fn fast_warmup(threshold: u32) -> OptimizerConfig {
    OptimizerConfig::default().with_warmup_threshold(threshold)
}

/// Run JavaScript and collect everything it prints
#[allow(dead_code)]
pub fn run_js_output(code: &str, optimizer: OptimizerConfig) -> spreadcall::Result<Vec<String>> {
    let mut runtime = Runtime::with_config(RuntimeConfig {
        optimizer,
        ..RuntimeConfig::default()
    });
    let output = runtime.capture_output();
    runtime.eval(code)?;
    let lines = output.borrow().clone();
    Ok(lines)
}
