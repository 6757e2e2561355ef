//! spreadcall CLI
//!
//! A command-line interface for the spreadcall JavaScript-subset engine.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spreadcall::jit::OptimizerConfig;
use spreadcall::repl::{Repl, ReplConfig};
use spreadcall::{Runtime, RuntimeConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spreadcall")]
#[command(author, version, about = "A JavaScript-subset engine with a speculative spread-call optimizer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// JavaScript file to execute
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Evaluate a string of JavaScript
    #[arg(short, long, value_name = "CODE")]
    eval: Option<String>,

    /// Disable the speculative spread-call optimizer
    #[arg(long, global = true)]
    no_opt: bool,

    /// Consecutive eligible calls before a spread call site is optimized
    #[arg(long, value_name = "N", global = true)]
    warmup: Option<u32>,

    /// Invalidations after which a call site stays on the baseline path
    #[arg(long, value_name = "N", global = true)]
    max_deopts: Option<u32>,

    /// Load optimizer settings from a JSON file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Print optimizer statistics as JSON to stderr after the run
    #[arg(long, global = true)]
    stats: bool,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a REPL (Read-Eval-Print-Loop)
    Repl,

    /// Run a JavaScript file
    Run {
        /// The file to run
        file: PathBuf,
    },

    /// Evaluate JavaScript code and print the completion value
    Eval {
        /// The code to evaluate
        code: String,
    },

    /// Parse and display AST
    Ast {
        /// The file or code to parse
        input: String,
    },

    /// Compile and display bytecode
    Bytecode {
        /// The file or code to compile
        input: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = runtime_config(&cli)?;

    match cli.command {
        Some(Commands::Repl) => run_repl(config),
        Some(Commands::Run { file }) => run_file(&file, config, cli.stats),
        Some(Commands::Eval { code }) => eval_code(&code, config, cli.stats),
        Some(Commands::Ast { input }) => show_ast(&input),
        Some(Commands::Bytecode { input }) => show_bytecode(&input),
        None => {
            if let Some(code) = cli.eval {
                eval_code(&code, config, cli.stats)
            } else if let Some(file) = cli.file {
                run_file(&file, config, cli.stats)
            } else {
                run_repl(config)
            }
        }
    }
}

/// Build the runtime configuration: the JSON file first, then flags on top
fn runtime_config(cli: &Cli) -> Result<RuntimeConfig> {
    let mut optimizer = match &cli.config {
        Some(path) => OptimizerConfig::from_file(path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?,
        None => OptimizerConfig::default(),
    };
    if cli.no_opt {
        optimizer = optimizer.with_enabled(false);
    }
    if let Some(warmup) = cli.warmup {
        optimizer = optimizer.with_warmup_threshold(warmup);
    }
    if let Some(max) = cli.max_deopts {
        optimizer = optimizer.with_max_deopts(max);
    }
    optimizer.validate()?;

    Ok(RuntimeConfig {
        optimizer,
        ..RuntimeConfig::default()
    })
}

fn run_repl(config: RuntimeConfig) -> Result<ExitCode> {
    let mut repl = Repl::with_config(ReplConfig::default(), config)?;
    repl.run()?;
    Ok(ExitCode::SUCCESS)
}

fn run_file(path: &Path, config: RuntimeConfig, stats: bool) -> Result<ExitCode> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("Error reading '{}'", path.display()))?;

    let mut runtime = Runtime::with_config(config);
    let result = runtime.eval_file(path, &source);
    report(&runtime, result.map(|_| ()), stats)
}

fn eval_code(code: &str, config: RuntimeConfig, stats: bool) -> Result<ExitCode> {
    let mut runtime = Runtime::with_config(config);
    let result = runtime.eval(code).map(|value| println!("{}", value.inspect()));
    report(&runtime, result, stats)
}

/// Print the script error (if any) and the statistics; script errors exit 1
fn report(runtime: &Runtime, result: spreadcall::Result<()>, stats: bool) -> Result<ExitCode> {
    if stats {
        eprintln!("{}", runtime.stats().to_json()?);
    }
    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("{}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Treat `input` as a path when it names an existing file, otherwise as code
fn read_input(input: &str) -> Result<String> {
    if Path::new(input).is_file() {
        fs::read_to_string(input).with_context(|| format!("Error reading '{}'", input))
    } else {
        Ok(input.to_string())
    }
}

fn show_ast(input: &str) -> Result<ExitCode> {
    let source = read_input(input)?;
    match spreadcall::parser::parse(&source) {
        Ok(program) => {
            println!("{:#?}", program);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", e.with_source_context(&source));
            Ok(ExitCode::FAILURE)
        }
    }
}

fn show_bytecode(input: &str) -> Result<ExitCode> {
    let source = read_input(input)?;
    match spreadcall::bytecode::compile(&source) {
        Ok(script) => {
            println!("{}", script.main.disassemble());
            if !script.call_sites.is_empty() {
                println!("\nSpread call sites:");
                for site in &script.call_sites {
                    println!("  {} line {}: {}", site.id, site.line, site.label);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", e.with_source_context(&source));
            Ok(ExitCode::FAILURE)
        }
    }
}
