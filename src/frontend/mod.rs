//! Front-end adapter: source text to bytecode or to a syntax tree.
//!
//! The front-end has no shared state. Both entry points are pure functions of their
//! input and report failures as location-tagged [`Diagnostic`]s:
//!
//! - [`compile`] - source to [`Bytecode`], or parse diagnostics, or a single lowering
//!   failure message
//! - [`parse_to_tree`] - source to a JSON [`SyntaxTree`] with comment locations, or parse
//!   diagnostics
//!
//! Parse diagnostics and lowering failures are kept as distinct result variants. A parse
//! produces an ordered list of located problems; lowering fails once, on one path, with
//! one message.
//!
//! The Luau parser decides what is accepted. The `full_moon` parser supplies the tree
//! and the columns that Luau's compile-time reports leave out.

mod compile;
mod diagnostic;
mod scan;
mod tree;

pub use compile::{
    compile, compile_bytes, Bytecode, CompileOptions, CompileResult, COMPILE_OPTIONS_VERSION,
};
pub use diagnostic::{render_diagnostics, Diagnostic};
pub use scan::MAX_NESTING_DEPTH;
pub use tree::{
    parse_to_tree, CommentKind, CommentSpan, Declaration, DeclarationKind, SourcePosition,
    SyntaxTree, TreeResult,
};
