//! Syntax tree rendering.
//!
//! [`parse_to_tree`] parses source text and renders the resulting tree, together with
//! the location of every comment in the source, as a single UTF-8 JSON document:
//!
//! ```json
//! {
//!   "root": { "stmts": [ ... ], "last_stmt": null },
//!   "commentLocations": [
//!     { "kind": "line", "start": { "line": 1, "column": 1 }, "end": { "line": 1, "column": 12 } }
//!   ]
//! }
//! ```
//!
//! Definition files are accepted too. Top-level `declare` statements are lifted out of
//! the source before parsing and listed under a `declarations` key, each with its kind,
//! name, span and text; the rest of the source keeps its lines and columns.
//!
//! Parsing is read-only and shares the diagnostic format of
//! [`compile`](crate::frontend::compile()).

use std::borrow::Cow;

use full_moon::{ast::Ast, LuaVersion};
use serde::Serialize;

use crate::{
    frontend::{
        compile::{to_diagnostic, Rejection},
        diagnostic::Diagnostic,
        scan::{mask, Scan},
    },
    Result,
};

/// A 1-based source position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SourcePosition {
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

/// Comment flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentKind {
    /// `-- comment`
    Line,
    /// `--[[ comment ]]`
    Block,
}

/// Location of one comment in the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CommentSpan {
    /// Comment flavour.
    pub kind: CommentKind,
    /// Position of the first character of the comment.
    pub start: SourcePosition,
    /// Position just past the last character of the comment.
    pub end: SourcePosition,
}

/// Kind of a lifted `declare` statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    /// `declare name: Type`
    Global,
    /// `declare function name(...): Type`
    Function,
    /// `declare class Name ... end`
    Class,
}

/// A top-level `declare` statement of a definition file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Declaration {
    /// Statement kind.
    pub kind: DeclarationKind,
    /// Declared name.
    pub name: String,
    /// Position of the `declare` keyword.
    pub start: SourcePosition,
    /// Position just past the last token of the statement.
    pub end: SourcePosition,
    /// Statement source text.
    pub text: String,
}

/// A rendered syntax tree.
#[derive(Clone, Debug)]
pub struct SyntaxTree {
    json: String,
    comments: Vec<CommentSpan>,
    declarations: Vec<Declaration>,
}

impl SyntaxTree {
    /// Returns the JSON document.
    pub fn json(&self) -> &str {
        &self.json
    }

    /// Consumes the tree and returns the JSON document.
    pub fn into_json(self) -> String {
        self.json
    }

    /// Returns the captured comment locations in source order.
    pub fn comments(&self) -> &[CommentSpan] {
        &self.comments
    }

    /// Returns the lifted `declare` statements in source order.
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }
}

/// Result of [`parse_to_tree`]: a tree or the parse diagnostics. Never both.
#[derive(Clone, Debug)]
pub enum TreeResult {
    /// The source parsed cleanly.
    Tree(SyntaxTree),
    /// Parsing failed.
    ParseErrors(Vec<Diagnostic>),
}

impl TreeResult {
    /// Returns the tree, if any.
    pub fn tree(&self) -> Option<&SyntaxTree> {
        match self {
            TreeResult::Tree(tree) => Some(tree),
            TreeResult::ParseErrors(_) => None,
        }
    }

    /// Returns the parse diagnostics. Empty on success.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            TreeResult::Tree(_) => &[],
            TreeResult::ParseErrors(diagnostics) => diagnostics,
        }
    }
}

#[derive(Serialize)]
struct TreeDocument<'a> {
    root: &'a full_moon::ast::Block,
    #[serde(rename = "commentLocations")]
    comment_locations: &'a [CommentSpan],
    #[serde(skip_serializing_if = "no_declarations")]
    declarations: &'a [Declaration],
}

fn no_declarations(declarations: &&[Declaration]) -> bool {
    declarations.is_empty()
}

/// Parses `source` and renders its syntax tree and comment locations as JSON.
///
/// # Errors
///
/// Returns [`crate::Error::Json`] if the tree cannot be serialized. Parse failures are
/// not errors; they are returned as [`TreeResult::ParseErrors`].
pub fn parse_to_tree(source: &str) -> Result<TreeResult> {
    let scan = Scan::new(source);
    let comments = scan.comments();
    let lifted = scan.declarations(source);

    let (source, scan) = if lifted.is_empty() {
        (Cow::Borrowed(source), scan)
    } else {
        let masked = mask(source, &lifted);
        let scan = Scan::new(&masked);
        (Cow::Owned(masked), scan)
    };

    if let Some(diagnostic) = scan.nesting_violation() {
        return Ok(TreeResult::ParseErrors(vec![diagnostic]));
    }

    let parsed = full_moon::parse_fallible(&source, LuaVersion::luau());
    if !parsed.errors().is_empty() {
        let diagnostics = match Rejection::of(&source) {
            Some(rejection) => vec![rejection.locate(&scan, parsed.errors())],
            // Luau accepts syntax the tree parser does not know.
            None => parsed.errors().iter().map(to_diagnostic).collect(),
        };
        return Ok(TreeResult::ParseErrors(diagnostics));
    }

    let ast: Ast = parsed.into_ast();
    let declarations: Vec<Declaration> = lifted.into_iter().map(|l| l.declaration).collect();
    let json = serde_json::to_string(&TreeDocument {
        root: ast.nodes(),
        comment_locations: &comments,
        declarations: &declarations,
    })?;

    Ok(TreeResult::Tree(SyntaxTree {
        json,
        comments,
        declarations,
    }))
}
