//! Token-level pre-pass shared by both front-end entry points.
//!
//! The lexer is iterative, so a [`Scan`] is safe to build on any input before handing it
//! to a recursive parser. It backs three things:
//!
//! - the nesting guard, measured over real tokens so brackets inside strings and
//!   comments never count
//! - comment locations for the syntax tree
//! - lifting top-level `declare` statements out of the source before tree parsing

use full_moon::{
    tokenizer::{Lexer, LexerResult, Position, Symbol, Token, TokenType},
    LuaVersion,
};

use crate::frontend::{
    diagnostic::Diagnostic,
    tree::{CommentKind, CommentSpan, Declaration, DeclarationKind, SourcePosition},
};

/// Deepest bracket and block nesting accepted before parsing.
///
/// The parsers are recursive; inputs nested deeper than this are rejected with a
/// diagnostic instead of risking the host stack.
pub const MAX_NESTING_DEPTH: usize = 200;

const NESTING_MESSAGE: &str =
    "Exceeded allowed recursion depth; simplify your expression to make the code compile";

/// A `declare` statement together with the source bytes it covers.
pub(crate) struct Lifted {
    pub(crate) declaration: Declaration,
    pub(crate) bytes: std::ops::Range<usize>,
}

/// The token stream of one source text.
pub(crate) struct Scan {
    tokens: Vec<Token>,
}

impl Scan {
    pub(crate) fn new(source: &str) -> Self {
        let tokens = match Lexer::new(source, LuaVersion::luau()).collect() {
            LexerResult::Ok(tokens) | LexerResult::Recovered(tokens, _) => tokens,
            LexerResult::Fatal(_) => Vec::new(),
        };
        Scan { tokens }
    }

    fn significant(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(|token| {
            let kind = token.token_type();
            !kind.is_trivia() && !matches!(kind, TokenType::Eof)
        })
    }

    /// Returns a diagnostic at the first token nested deeper than [`MAX_NESTING_DEPTH`].
    pub(crate) fn nesting_violation(&self) -> Option<Diagnostic> {
        let mut depth = 0usize;
        for token in self.significant() {
            match token.token_type() {
                TokenType::Symbol {
                    symbol:
                        Symbol::LeftParen
                        | Symbol::LeftBrace
                        | Symbol::LeftBracket
                        | Symbol::Function
                        | Symbol::Do
                        | Symbol::If
                        | Symbol::Repeat,
                } => {
                    depth += 1;
                    if depth > MAX_NESTING_DEPTH {
                        let start = token.start_position();
                        return Some(Diagnostic::new(
                            clamp_u32(start.line()),
                            clamp_u32(start.character()),
                            NESTING_MESSAGE,
                        ));
                    }
                }
                TokenType::Symbol {
                    symbol:
                        Symbol::RightParen
                        | Symbol::RightBrace
                        | Symbol::RightBracket
                        | Symbol::End
                        | Symbol::Until,
                } => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        None
    }

    /// Returns every comment in source order.
    pub(crate) fn comments(&self) -> Vec<CommentSpan> {
        self.tokens
            .iter()
            .filter_map(|token| {
                let kind = match token.token_type() {
                    TokenType::SingleLineComment { .. } => CommentKind::Line,
                    TokenType::MultiLineComment { .. } => CommentKind::Block,
                    _ => return None,
                };
                Some(CommentSpan {
                    kind,
                    start: position(token.start_position()),
                    end: position(token.end_position()),
                })
            })
            .collect()
    }

    /// Returns the first token starting at or after byte offset `bytes`.
    pub(crate) fn token_at_or_after(&self, bytes: usize) -> Option<&Token> {
        self.tokens
            .iter()
            .filter(|token| !token.token_type().is_trivia())
            .find(|token| token.start_position().bytes() >= bytes)
    }

    /// Returns the column of the first token on `line`, end of input included.
    pub(crate) fn first_column_on(&self, line: u32) -> Option<u32> {
        self.tokens
            .iter()
            .filter(|token| !token.token_type().is_trivia())
            .find(|token| clamp_u32(token.start_position().line()) == line)
            .map(|token| clamp_u32(token.start_position().character()))
    }

    /// Finds the top-level `declare` statements of a definition-style source.
    pub(crate) fn declarations(&self, source: &str) -> Vec<Lifted> {
        let tokens: Vec<&Token> = self.significant().collect();
        let mut lifted = Vec::new();

        let mut i = 0;
        while i < tokens.len() {
            match declaration_at(&tokens, i) {
                Some((kind, name, last)) => {
                    let start = tokens[i].start_position();
                    let end = tokens[last].end_position();
                    let bytes = start.bytes()..end.bytes();
                    lifted.push(Lifted {
                        declaration: Declaration {
                            kind,
                            name,
                            start: position(start),
                            end: position(end),
                            text: source.get(bytes.clone()).unwrap_or_default().to_string(),
                        },
                        bytes,
                    });
                    i = last + 1;
                }
                None => i += 1,
            }
        }

        lifted
    }
}

/// Blanks the lifted statements out of `source`, keeping every line and column intact.
pub(crate) fn mask(source: &str, lifted: &[Lifted]) -> String {
    let mut out = String::with_capacity(source.len());
    let mut spans = lifted.iter().map(|l| &l.bytes).peekable();

    for (offset, ch) in source.char_indices() {
        while spans.peek().is_some_and(|span| span.end <= offset) {
            spans.next();
        }
        let inside = spans.peek().is_some_and(|span| span.contains(&offset));
        if inside && ch != '\n' && ch != '\r' {
            out.push(' ');
        } else {
            out.push(ch);
        }
    }

    out
}

fn declaration_at(tokens: &[&Token], i: usize) -> Option<(DeclarationKind, String, usize)> {
    if identifier(tokens[i])? != "declare" {
        return None;
    }
    // Only at the start of a statement.
    if i > 0 {
        let previous = tokens[i - 1];
        let same_line = previous.end_position().line() == tokens[i].start_position().line();
        if same_line && !is_symbol(previous, Symbol::Semicolon) {
            return None;
        }
    }

    let next = tokens.get(i + 1)?;
    if is_symbol(next, Symbol::Function) {
        let name = identifier(tokens.get(i + 2)?)?.to_string();
        return Some((DeclarationKind::Function, name, statement_end(tokens, i + 2)));
    }

    let next_name = identifier(next)?;
    let after = tokens.get(i + 2)?;
    if next_name == "class" {
        let name = identifier(after)?.to_string();
        let end = (i + 3..tokens.len()).find(|&j| is_symbol(tokens[j], Symbol::End))?;
        return Some((DeclarationKind::Class, name, end));
    }
    if is_symbol(after, Symbol::Colon) {
        return Some((
            DeclarationKind::Global,
            next_name.to_string(),
            statement_end(tokens, i + 2),
        ));
    }

    None
}

/// Index of the last token of a single-statement declaration starting before `from`.
///
/// The statement runs until a token on a new line at bracket depth zero that does not
/// continue the type on the previous line.
fn statement_end(tokens: &[&Token], from: usize) -> usize {
    let mut depth = 0usize;
    let mut last = from;

    for (j, token) in tokens.iter().enumerate().skip(from + 1) {
        let new_line = token.start_position().line() > tokens[last].end_position().line();
        if depth == 0 && new_line && !continues(tokens[last], token) {
            break;
        }

        match token.token_type() {
            TokenType::Symbol {
                symbol:
                    Symbol::LeftParen | Symbol::LeftBrace | Symbol::LeftBracket | Symbol::LessThan,
            } => depth += 1,
            TokenType::Symbol {
                symbol:
                    Symbol::RightParen
                    | Symbol::RightBrace
                    | Symbol::RightBracket
                    | Symbol::GreaterThan,
            } => depth = depth.saturating_sub(1),
            TokenType::Symbol {
                symbol: Symbol::Semicolon,
            } if depth == 0 => return j,
            _ => {}
        }
        last = j;
    }

    last
}

fn continues(previous: &Token, next: &Token) -> bool {
    let open_end = matches!(
        previous.token_type(),
        TokenType::Symbol {
            symbol: Symbol::Colon
                | Symbol::Comma
                | Symbol::ThinArrow
                | Symbol::Pipe
                | Symbol::Ampersand
        }
    );
    let open_start = matches!(
        next.token_type(),
        TokenType::Symbol {
            symbol: Symbol::ThinArrow | Symbol::Pipe | Symbol::Ampersand
        }
    );
    open_end || open_start
}

fn identifier(token: &Token) -> Option<&str> {
    match token.token_type() {
        TokenType::Identifier { identifier } => Some(identifier.as_str()),
        _ => None,
    }
}

fn is_symbol(token: &Token, symbol: Symbol) -> bool {
    matches!(token.token_type(), TokenType::Symbol { symbol: s } if *s == symbol)
}

fn position(position: Position) -> SourcePosition {
    SourcePosition {
        line: clamp_u32(position.line()),
        column: clamp_u32(position.character()),
    }
}

pub(crate) fn clamp_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
