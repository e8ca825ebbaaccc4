use thiserror::Error;

use crate::{
    frontend::{render_diagnostics, Diagnostic},
    runner::InvariantViolation,
};

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Script failures are deliberately absent: a script that times out, runs out of memory or
/// raises an error is a normal run, reported through
/// [`RunOutcome`](crate::runner::RunOutcome). The variants below cover failures of the
/// harness itself and of its inputs.
///
/// # Error Categories
///
/// ## Front-End Errors
/// - [`Error::Parse`] - One or more located parse diagnostics
/// - [`Error::Lower`] - A single failure while lowering a parsed program to bytecode
///
/// ## Runtime Errors
/// - [`Error::Load`] - Bytecode rejected by the interpreter's loader
/// - [`Error::Lua`] - Any other failure reported by the embedded interpreter
/// - [`Error::ContextBusy`] - Attempt to spawn a second live context on one host
///
/// ## Harness Errors
/// - [`Error::InvalidConfig`] - A configuration value that cannot be enforced
/// - [`Error::Invariant`] - The host was left unbalanced by a run
/// - [`Error::Json`] - Syntax tree serialization failure
///
/// # Examples
///
/// ```rust
/// use luaubox::{frontend::compile, Error};
///
/// match compile("x = ").into_result() {
///     Ok(bytecode) => println!("{} bytes", bytecode.len()),
///     Err(Error::Parse(diagnostics)) => {
///         for diagnostic in diagnostics {
///             eprintln!("{diagnostic}");
///         }
///     }
///     Err(e) => eprintln!("Other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Source text failed to parse.
    ///
    /// Displays as the rendered `(line,column): message` lines.
    #[error("{}", render_diagnostics(.0).trim_end())]
    Parse(Vec<Diagnostic>),

    /// A parsed program could not be lowered to bytecode.
    #[error("{0}")]
    Lower(String),

    /// The interpreter's loader rejected the bytecode.
    #[error("Failed to load bytecode - {0}")]
    Load(String),

    /// Error reported by the embedded interpreter.
    #[error("{0}")]
    Lua(#[from] mlua::Error),

    /// Syntax tree serialization failed.
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// Another execution context of the same host is still alive.
    ///
    /// Memory attribution relies on exactly one live context per host.
    #[error("Another execution context is active on this host")]
    ContextBusy,

    /// A configuration value cannot be enforced.
    #[error("Invalid configuration - {0}")]
    InvalidConfig(String),

    /// A sandbox invariant was violated by a run.
    #[error("{0}")]
    Invariant(#[from] InvariantViolation),
}
