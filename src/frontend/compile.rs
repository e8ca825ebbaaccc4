//! Source to bytecode compilation.
//!
//! Compilation is a two-stage pipeline:
//!
//! 1. **Parse** - the source is parsed by the Luau parser. A rejection stops the pipeline
//!    and is returned as a located diagnostic in [`CompileResult::ParseErrors`].
//! 2. **Lower** - the parsed program is lowered to bytecode by the Luau compiler using
//!    the fixed [`CompileOptions::FIXED`] option set. A lowering failure, such as running
//!    out of registers, originates from a single failure path and is returned as one
//!    message in [`CompileResult::LowerError`].
//!
//! Sources nested deeper than [`MAX_NESTING_DEPTH`](crate::frontend::MAX_NESTING_DEPTH)
//! are rejected from the token stream before either stage runs.
//!
//! Both stages are pure functions of the input; compiling the same source twice yields
//! byte-identical bytecode.
//!
//! # Example
//!
//! ```rust
//! use luaubox::frontend::{compile, CompileResult};
//!
//! match compile("return 1 + 2") {
//!     CompileResult::Bytecode(bytecode) => assert!(!bytecode.is_empty()),
//!     other => panic!("unexpected: {other:?}"),
//! }
//!
//! let result = compile("x = ");
//! assert!(!result.diagnostics().is_empty());
//! ```

use std::fmt;

use full_moon::LuaVersion;

use crate::{
    frontend::{
        diagnostic::{render_diagnostics, Diagnostic},
        scan::{clamp_u32, Scan},
    },
    Error, Result,
};

/// Version tag of the [`CompileOptions::FIXED`] option set.
///
/// Bumped whenever any of the fixed levels change, since bytecode produced under
/// different options is not byte-comparable.
pub const COMPILE_OPTIONS_VERSION: u32 = 1;

/// Luau compiler levels used for lowering.
///
/// Only [`CompileOptions::FIXED`] is used by [`compile`]; the type exists so the levels
/// are named and inspectable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompileOptions {
    /// Optimization level (0 - 2).
    pub optimization_level: u8,
    /// Debug information level (0 - 2).
    pub debug_level: u8,
    /// Type information level (0 - 1).
    pub type_info_level: u8,
}

impl CompileOptions {
    /// The fixed option set: optimization 1, debug info 1, type info 0.
    pub const FIXED: CompileOptions = CompileOptions {
        optimization_level: 1,
        debug_level: 1,
        type_info_level: 0,
    };

    fn compiler(&self) -> mlua::Compiler {
        mlua::Compiler::new()
            .set_optimization_level(self.optimization_level)
            .set_debug_level(self.debug_level)
            .set_type_info_level(self.type_info_level)
    }
}

/// Compiled bytecode, opaque beyond being accepted by the interpreter's loader.
#[derive(Clone, PartialEq, Eq)]
pub struct Bytecode(Vec<u8>);

impl Bytecode {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        Bytecode(bytes)
    }

    /// Returns the raw bytecode.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the wrapper and returns the raw bytecode.
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// Returns the bytecode size in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the bytecode is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the leading format version byte, if present.
    pub fn version(&self) -> Option<u8> {
        self.0.first().copied()
    }
}

impl fmt::Debug for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bytecode")
            .field("len", &self.0.len())
            .field("version", &self.version())
            .finish()
    }
}

/// Wraps bytes produced elsewhere.
///
/// The interpreter's loader only validates the format version, not the body, so bytes
/// that did not come from [`compile`] must be trusted.
impl From<Vec<u8>> for Bytecode {
    fn from(bytes: Vec<u8>) -> Self {
        Bytecode(bytes)
    }
}

impl AsRef<[u8]> for Bytecode {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Result of [`compile`]: bytecode or the reason none was produced. Never both.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompileResult {
    /// Parsing and lowering succeeded.
    Bytecode(Bytecode),
    /// Parsing failed; one entry per parser diagnostic, in reported order.
    ParseErrors(Vec<Diagnostic>),
    /// The program parsed but could not be lowered to bytecode.
    LowerError(String),
}

impl CompileResult {
    /// Returns `true` if bytecode was produced.
    pub fn is_success(&self) -> bool {
        matches!(self, CompileResult::Bytecode(_))
    }

    /// Returns the bytecode, if any.
    pub fn bytecode(&self) -> Option<&Bytecode> {
        match self {
            CompileResult::Bytecode(bytecode) => Some(bytecode),
            _ => None,
        }
    }

    /// Returns the parse diagnostics. Empty unless this is [`CompileResult::ParseErrors`].
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileResult::ParseErrors(diagnostics) => diagnostics,
            _ => &[],
        }
    }

    /// Returns the failure text as shown by command-line tools, or `None` on success.
    pub fn error_text(&self) -> Option<String> {
        match self {
            CompileResult::Bytecode(_) => None,
            CompileResult::ParseErrors(diagnostics) => Some(render_diagnostics(diagnostics)),
            CompileResult::LowerError(message) => Some(message.clone()),
        }
    }

    /// Converts into a [`Result`], mapping failures to [`Error::Parse`] and [`Error::Lower`].
    ///
    /// # Errors
    ///
    /// Returns the compile failure as an [`Error`].
    pub fn into_result(self) -> Result<Bytecode> {
        match self {
            CompileResult::Bytecode(bytecode) => Ok(bytecode),
            CompileResult::ParseErrors(diagnostics) => Err(Error::Parse(diagnostics)),
            CompileResult::LowerError(message) => Err(Error::Lower(message)),
        }
    }
}

/// Compiles Luau source text to bytecode.
///
/// The Luau parser decides whether the source is accepted. A rejection is reported as
/// a located diagnostic, unless it is one of the compiler's resource limits, which is a
/// lowering failure.
pub fn compile(source: &str) -> CompileResult {
    let scan = Scan::new(source);
    if let Some(diagnostic) = scan.nesting_violation() {
        return CompileResult::ParseErrors(vec![diagnostic]);
    }

    match CompileOptions::FIXED.compiler().compile(source) {
        Ok(bytes) => CompileResult::Bytecode(Bytecode::new(bytes)),
        Err(mlua::Error::SyntaxError { message, .. }) => match Rejection::parse(&message) {
            Some(rejection) if rejection.is_lowering() => {
                CompileResult::LowerError(rejection.message)
            }
            Some(rejection) => {
                let parsed = full_moon::parse_fallible(source, LuaVersion::luau());
                let diagnostic = rejection.locate(&scan, parsed.errors());
                log::trace!("compile rejected: {diagnostic}");
                CompileResult::ParseErrors(vec![diagnostic])
            }
            None => CompileResult::LowerError(message),
        },
        Err(err) => CompileResult::LowerError(err.to_string()),
    }
}

/// Compiles raw source bytes, as received from a fuzzer or a C-string boundary.
///
/// The input is cut at the first NUL byte. Input that is not valid UTF-8 is rejected
/// with a diagnostic pointing at the first invalid byte.
pub fn compile_bytes(source: &[u8]) -> CompileResult {
    match source_text(source) {
        Ok(text) => compile(text),
        Err(diagnostic) => CompileResult::ParseErrors(vec![diagnostic]),
    }
}

/// Decodes raw source bytes with C-string semantics.
fn source_text(source: &[u8]) -> std::result::Result<&str, Diagnostic> {
    let end = source.iter().position(|&b| b == 0).unwrap_or(source.len());
    let source = &source[..end];

    std::str::from_utf8(source).map_err(|err| {
        let valid = &source[..err.valid_up_to()];
        let (line, column) = location_of(valid);
        Diagnostic::new(line, column, "source is not valid UTF-8")
    })
}

/// A source rejected by the Luau compiler, reported as `line: message`.
#[derive(Debug)]
pub(crate) struct Rejection {
    line: u32,
    message: String,
}

impl Rejection {
    /// Compiles `source` and returns the parser's rejection, if it rejects it.
    pub(crate) fn of(source: &str) -> Option<Rejection> {
        match CompileOptions::FIXED.compiler().compile(source) {
            Err(mlua::Error::SyntaxError { message, .. }) => {
                Rejection::parse(&message).filter(|rejection| !rejection.is_lowering())
            }
            _ => None,
        }
    }

    fn parse(text: &str) -> Option<Rejection> {
        let (line, message) = text.split_once(": ")?;
        Some(Rejection {
            line: line.trim().parse().ok()?,
            message: message.to_string(),
        })
    }

    /// Compiler resource limits, as opposed to parse errors.
    fn is_lowering(&self) -> bool {
        let message = self.message.as_str();
        message.starts_with("Out of ")
            || (message.starts_with("Exceeded ") && message.contains(" limit"))
    }

    /// Places the rejection on its line.
    ///
    /// The Luau report carries no column. The column comes from the matching located
    /// error of the full_moon parse; an "expected ..." error is reported on the last
    /// consumed token, while Luau points at the token that follows it.
    pub(crate) fn locate(self, scan: &Scan, errors: &[full_moon::Error]) -> Diagnostic {
        let column = errors
            .iter()
            .find_map(|error| {
                let (start, end) = error.range();
                if error.error_message().starts_with("expected") {
                    if let Some(next) = scan.token_at_or_after(end.bytes()) {
                        let at = next.start_position();
                        if clamp_u32(at.line()) == self.line {
                            return Some(clamp_u32(at.character()));
                        }
                    }
                }
                (clamp_u32(start.line()) == self.line).then(|| clamp_u32(start.character()))
            })
            .or_else(|| scan.first_column_on(self.line))
            .unwrap_or(1);

        Diagnostic::new(self.line, column, self.message)
    }
}

/// Converts a full_moon error into a diagnostic at its own location.
pub(crate) fn to_diagnostic(error: &full_moon::Error) -> Diagnostic {
    let (start, _) = error.range();
    Diagnostic::new(
        clamp_u32(start.line()),
        clamp_u32(start.character()),
        error.error_message(),
    )
}

fn location_of(prefix: &[u8]) -> (u32, u32) {
    // The prefix is valid UTF-8 by construction.
    let text = String::from_utf8_lossy(prefix);
    let line = text.matches('\n').count() + 1;
    let column = text.rsplit('\n').next().map_or(0, |tail| tail.chars().count()) + 1;
    (clamp_u32(line), clamp_u32(column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::MAX_NESTING_DEPTH;

    #[test]
    fn test_compile_simple() {
        let result = compile("local x = 1\nreturn x + 1");
        let bytecode = result.bytecode().expect("bytecode");
        assert!(!bytecode.is_empty());
        assert!(result.diagnostics().is_empty());
        assert!(result.error_text().is_none());
    }

    #[test]
    fn test_compile_deterministic() {
        let source = "local t = {}\nfor i = 1, 10 do t[i] = i * 2 end\nreturn #t";
        assert_eq!(compile(source), compile(source));
    }

    #[test]
    fn test_incomplete_assignment() {
        let result = compile("x = ");
        assert!(!result.is_success());

        let diagnostics = result.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!((diagnostics[0].line, diagnostics[0].column), (1, 5));

        let text = result.error_text().unwrap();
        assert!(text.starts_with("(1,5): "));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_rejections_full_moon_accepts_are_located() {
        for (source, needle) in [
            ("for i = 1, 2 do end break", "break"),
            ("local x = 1\nfunction f() return ... end", "..."),
        ] {
            let result = compile(source);
            let diagnostics = result.diagnostics();
            assert_eq!(diagnostics.len(), 1, "{source}");
            assert!(diagnostics[0].message.contains(needle), "{source}");
            assert_eq!(diagnostics[0].line, source.lines().count() as u32);
            assert!(diagnostics[0].column >= 1);
        }
    }

    #[test]
    fn test_function_attributes_compile() {
        assert!(compile("@native\nfunction f() return 1 end\nreturn f()").is_success());
    }

    #[test]
    fn test_register_exhaustion_is_lower_error() {
        let source: String = (0..300).map(|i| format!("local v{i} = {{}}\n")).collect();
        let result = compile(&source);
        match &result {
            CompileResult::LowerError(message) => assert!(message.starts_with("Out of ")),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(result.diagnostics().is_empty());
    }

    #[test]
    fn test_brackets_inside_strings_and_comments() {
        let deep = "(".repeat(MAX_NESTING_DEPTH + 1);
        let source = format!("-- [[[{deep}\nlocal s = \"{deep}\"\nreturn s");
        assert!(compile(&source).is_success());
    }

    #[test]
    fn test_diagnostics_on_later_line() {
        let result = compile("local a = 1\nlocal b = 2\nif a then\n");
        let diagnostics = result.diagnostics();
        assert!(!diagnostics.is_empty());
        assert!(diagnostics.iter().all(|d| d.line >= 1 && d.column >= 1));
    }

    #[test]
    fn test_into_result() {
        assert!(compile("return 1").into_result().is_ok());
        assert!(matches!(
            compile("return +").into_result(),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_compile_bytes_nul_terminated() {
        let result = compile_bytes(b"return 1\0garbage that does not parse (");
        assert!(result.is_success());
    }

    #[test]
    fn test_compile_bytes_invalid_utf8() {
        let result = compile_bytes(b"local s = 1\nlocal t = \xff");
        let diagnostics = result.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].line, 2);
        assert_eq!(diagnostics[0].column, 11);
    }

    #[test]
    fn test_nesting_limit() {
        let source = format!("return {}1{}", "(".repeat(500), ")".repeat(500));
        let result = compile(&source);
        let diagnostics = result.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("recursion"));
    }

    #[test]
    fn test_bytecode_version() {
        let result = compile("return nil");
        let version = result.bytecode().and_then(Bytecode::version).unwrap();
        assert_ne!(version, 0);
    }
}
