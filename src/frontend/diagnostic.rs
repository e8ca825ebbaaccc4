//! Location-tagged diagnostics produced by the front-end.
//!
//! Every parse failure is reported as a [`Diagnostic`] carrying the 1-based line and
//! column of the offending token together with a human-readable message. Diagnostics
//! keep the order in which the parser reported them.
//!
//! The textual form used by command-line tools is one line per diagnostic:
//!
//! ```text
//! (1,5): Expected identifier when parsing expression, got <eof>
//! ```

use std::fmt;

use serde::Serialize;

/// A single parse diagnostic with a 1-based source location.
///
/// # Examples
///
/// ```rust
/// use luaubox::frontend::Diagnostic;
///
/// let diag = Diagnostic::new(1, 5, "unexpected end of input");
/// assert_eq!(diag.to_string(), "(1,5): unexpected end of input");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// 1-based line of the diagnostic.
    pub line: u32,
    /// 1-based column of the diagnostic.
    pub column: u32,
    /// Parser-supplied message.
    pub message: String,
}

impl Diagnostic {
    /// Creates a new diagnostic.
    ///
    /// Zero positions are clamped to 1 so that every diagnostic carries a valid
    /// 1-based location.
    pub fn new(line: u32, column: u32, message: impl Into<String>) -> Self {
        Diagnostic {
            line: line.max(1),
            column: column.max(1),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{}): {}", self.line, self.column, self.message)
    }
}

/// Renders diagnostics in the `(line,column): message` format, one per line.
///
/// Every line, including the last, is terminated by `\n`.
pub fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut out = String::new();
    for diag in diagnostics {
        out.push_str(&diag.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let diag = Diagnostic::new(3, 14, "Expected 'end'");
        assert_eq!(diag.to_string(), "(3,14): Expected 'end'");
    }

    #[test]
    fn test_zero_location_clamped() {
        let diag = Diagnostic::new(0, 0, "eof");
        assert_eq!(diag.line, 1);
        assert_eq!(diag.column, 1);
    }

    #[test]
    fn test_render_multiple() {
        let rendered = render_diagnostics(&[
            Diagnostic::new(1, 1, "first"),
            Diagnostic::new(2, 7, "second"),
        ]);
        assert_eq!(rendered, "(1,1): first\n(2,7): second\n");
    }

    #[test]
    fn test_render_empty() {
        assert!(render_diagnostics(&[]).is_empty());
    }
}
