//! Interactive REPL (Read-Eval-Print Loop)
//!
//! An interactive shell over a single [`Runtime`]:
//! - Command history (persisted across sessions)
//! - Tab completion for keywords, globals and REPL commands
//! - Multi-line input while brackets or strings are open
//! - Special commands (.help, .stats, .exit, ...)

use crate::lexer::Keyword;
use crate::runtime::{Runtime, RuntimeConfig, Value};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Context, Editor, Helper};
use std::path::PathBuf;
use thiserror::Error;

/// REPL configuration
#[derive(Debug, Clone)]
pub struct ReplConfig {
    /// History file path
    pub history_file: Option<PathBuf>,
    /// Prompt string
    pub prompt: String,
    /// Enable colors
    pub colors: bool,
}

impl Default for ReplConfig {
    fn default() -> Self {
        let history_file = home_dir().map(|h| h.join(".spreadcall_history"));

        Self {
            history_file,
            prompt: "sc> ".to_string(),
            colors: true,
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

/// Script-visible globals
const JS_GLOBALS: &[&str] = &[
    "Array", "Function", "Infinity", "NaN", "Object", "Symbol", "assertEq", "globalThis",
    "print", "undefined",
];

const REPL_COMMANDS: &[&str] = &[".help", ".stats", ".load", ".reset", ".exit", ".quit"];

/// Whether `input` has no open brackets or unterminated strings
pub fn is_input_complete(input: &str) -> bool {
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut escape_next = false;

    for ch in input.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match in_string {
            Some(_) if ch == '\\' => escape_next = true,
            Some(quote) if ch == quote => in_string = None,
            Some(_) => {}
            None => match ch {
                '"' | '\'' => in_string = Some(ch),
                '{' | '(' | '[' => depth += 1,
                '}' | ')' | ']' => depth -= 1,
                _ => {}
            },
        }
    }

    depth <= 0 && in_string.is_none()
}

/// Completion and multi-line validation
struct ReplHelper;

impl ReplHelper {
    /// Extract the word being typed for completion
    fn extract_word<'a>(&self, line: &'a str, pos: usize) -> (usize, &'a str) {
        let start = line[..pos]
            .rfind(|c: char| !c.is_alphanumeric() && c != '_' && c != '$' && c != '.')
            .map(|i| i + 1)
            .unwrap_or(0);
        (start, &line[start..pos])
    }
}

impl Helper for ReplHelper {}

impl Completer for ReplHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        let (start, word) = self.extract_word(line, pos);
        if word.is_empty() {
            return Ok((pos, Vec::new()));
        }

        let source: Vec<&str> = if word.starts_with('.') {
            REPL_COMMANDS.to_vec()
        } else {
            Keyword::ALL.iter().chain(JS_GLOBALS).copied().collect()
        };
        let completions = source
            .into_iter()
            .filter(|candidate| candidate.starts_with(word))
            .map(|candidate| Pair {
                display: candidate.to_string(),
                replacement: candidate.to_string(),
            })
            .collect();
        Ok((start, completions))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;
}

impl Highlighter for ReplHelper {}

impl Validator for ReplHelper {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        if is_input_complete(ctx.input()) {
            Ok(ValidationResult::Valid(None))
        } else {
            Ok(ValidationResult::Incomplete)
        }
    }
}

/// Special REPL commands
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Help,
    Stats,
    Load(String),
    Reset,
    Exit,
}

impl ReplCommand {
    pub fn parse(input: &str) -> Option<Self> {
        let rest = input.trim().strip_prefix('.')?;
        let mut parts = rest.splitn(2, ' ');
        let cmd = parts.next()?.to_lowercase();
        let arg = parts.next().map(|s| s.trim().to_string());

        match cmd.as_str() {
            "help" | "h" => Some(Self::Help),
            "stats" => Some(Self::Stats),
            "load" => arg.filter(|a| !a.is_empty()).map(Self::Load),
            "reset" => Some(Self::Reset),
            "exit" | "quit" | "q" => Some(Self::Exit),
            _ => None,
        }
    }
}

/// REPL errors
#[derive(Debug, Error)]
pub enum ReplError {
    #[error("initialization error: {0}")]
    InitError(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("interrupted")]
    Interrupted,
    #[error("end of input")]
    Eof,
}

/// The REPL instance
pub struct Repl {
    config: ReplConfig,
    runtime_config: RuntimeConfig,
    runtime: Runtime,
    editor: Editor<ReplHelper, rustyline::history::DefaultHistory>,
}

impl Repl {
    /// Create a new REPL with default configuration
    pub fn new() -> Result<Self, ReplError> {
        Self::with_config(ReplConfig::default(), RuntimeConfig::default())
    }

    /// Create a new REPL
    pub fn with_config(config: ReplConfig, runtime_config: RuntimeConfig) -> Result<Self, ReplError> {
        let mut editor = Editor::new().map_err(|e| ReplError::InitError(e.to_string()))?;
        editor.set_helper(Some(ReplHelper));

        if let Some(ref history_file) = config.history_file {
            if let Err(e) = editor.load_history(history_file) {
                tracing::debug!(error = %e, "no REPL history loaded");
            }
        }

        Ok(Self {
            config,
            runtime: Runtime::with_config(runtime_config.clone()),
            runtime_config,
            editor,
        })
    }

    /// Run the REPL
    pub fn run(&mut self) -> Result<(), ReplError> {
        println!("spreadcall v{}", crate::VERSION);
        println!("Type .help for available commands\n");

        loop {
            match self.read_input() {
                Ok(input) => {
                    if input.trim().is_empty() {
                        continue;
                    }

                    if let Some(cmd) = ReplCommand::parse(&input) {
                        match self.execute_command(cmd) {
                            Ok(true) => continue,
                            Ok(false) => break,
                            Err(e) => {
                                self.print_error(&e.to_string());
                                continue;
                            }
                        }
                    }

                    self.eval_and_print(&input);
                }
                Err(ReplError::Interrupted) => {
                    println!("\n(To exit, type .exit or press Ctrl+D)");
                }
                Err(ReplError::Eof) => break,
                Err(e) => return Err(e),
            }
        }

        if let Some(ref history_file) = self.config.history_file {
            if let Err(e) = self.editor.save_history(history_file) {
                tracing::warn!(error = %e, "failed to save REPL history");
            }
        }
        Ok(())
    }

    fn read_input(&mut self) -> Result<String, ReplError> {
        match self.editor.readline(&self.config.prompt) {
            Ok(line) => {
                // Duplicate entries are rejected; nothing to report
                let _ = self.editor.add_history_entry(line.as_str());
                Ok(line)
            }
            Err(ReadlineError::Interrupted) => Err(ReplError::Interrupted),
            Err(ReadlineError::Eof) => Err(ReplError::Eof),
            Err(e) => Err(ReplError::IoError(e.to_string())),
        }
    }

    fn eval_and_print(&mut self, code: &str) {
        match self.runtime.eval(code) {
            Ok(Value::Undefined) => {}
            Ok(value) => println!("{}", self.format_value(&value)),
            Err(e) => self.print_error(&e.to_string()),
        }
    }

    fn format_value(&self, value: &Value) -> String {
        let text = value.inspect();
        if !self.config.colors {
            return text;
        }
        match value {
            Value::Number(_) | Value::Boolean(_) => format!("\x1b[33m{}\x1b[0m", text),
            Value::String(_) => format!("\x1b[32m{}\x1b[0m", text),
            _ => text,
        }
    }

    fn print_error(&self, message: &str) {
        if self.config.colors {
            println!("\x1b[31m{}\x1b[0m", message);
        } else {
            println!("{}", message);
        }
    }

    fn execute_command(&mut self, cmd: ReplCommand) -> Result<bool, ReplError> {
        match cmd {
            ReplCommand::Help => {
                self.print_help();
                Ok(true)
            }
            ReplCommand::Stats => {
                let json = self
                    .runtime
                    .stats()
                    .to_json()
                    .map_err(|e| ReplError::IoError(e.to_string()))?;
                println!("{}", json);
                Ok(true)
            }
            ReplCommand::Load(path) => {
                let code = std::fs::read_to_string(&path)
                    .map_err(|e| ReplError::IoError(e.to_string()))?;
                self.eval_and_print(&code);
                Ok(true)
            }
            ReplCommand::Reset => {
                self.runtime = Runtime::with_config(self.runtime_config.clone());
                println!("Runtime reset.");
                Ok(true)
            }
            ReplCommand::Exit => Ok(false),
        }
    }

    fn print_help(&self) {
        println!("Available commands:");
        println!("  .help, .h       Show this help message");
        println!("  .stats          Print spread call-site statistics as JSON");
        println!("  .load <file>    Load and execute a JavaScript file");
        println!("  .reset          Reset the runtime state");
        println!("  .exit, .quit    Exit the REPL");
        println!();
        println!("Unbalanced brackets or strings continue onto the next line.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        assert_eq!(ReplCommand::parse(".help"), Some(ReplCommand::Help));
        assert_eq!(ReplCommand::parse(" .stats "), Some(ReplCommand::Stats));
        assert_eq!(ReplCommand::parse(".exit"), Some(ReplCommand::Exit));
        assert_eq!(ReplCommand::parse(".quit"), Some(ReplCommand::Exit));
        assert_eq!(
            ReplCommand::parse(".load foo.js"),
            Some(ReplCommand::Load("foo.js".to_string()))
        );
        assert_eq!(ReplCommand::parse(".load"), None);
        assert_eq!(ReplCommand::parse("notacommand"), None);
        assert_eq!(ReplCommand::parse(".bogus"), None);
    }

    #[test]
    fn test_input_completeness() {
        assert!(is_input_complete("1 + 2"));
        assert!(!is_input_complete("function f() {"));
        assert!(!is_input_complete("f(1,"));
        assert!(is_input_complete("var s = '{';"));
        assert!(!is_input_complete("var s = 'abc"));
        assert!(is_input_complete("var s = 'it\\'s';"));
    }

    #[test]
    fn test_repl_config_default() {
        let config = ReplConfig::default();
        assert_eq!(config.prompt, "sc> ");
        assert!(config.colors);
    }
}
