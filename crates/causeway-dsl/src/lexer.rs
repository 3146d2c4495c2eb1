//! Lexer for the rule DSL.
//!
//! Uses Logos for fast, compile-time optimized tokenization. Keywords are
//! case-sensitive; the language is line-oriented, so input is tokenized
//! one line at a time.

use logos::Logos;

/// Token type for one rule line.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t]+")]
pub enum Token {
    #[token("ACTOR")]
    Actor,
    #[token("BIT")]
    Bit,
    #[token("SET")]
    Set,
    #[token("CLEAR")]
    Clear,
    #[token("IF")]
    If,
    #[token("THEN")]
    Then,
    #[token("AND")]
    And,
    #[token("OR")]
    Or,

    /// Unsigned integer literal.
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u64>().ok())]
    Number(u64),
}

/// Tokenize a single line.
///
/// Returns the byte offset of the first unlexable slice on failure.
pub fn lex_line(line: &str) -> Result<Vec<Token>, usize> {
    let mut lexer = Token::lexer(line);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push(token),
            Err(()) => return Err(lexer.span().start),
        }
    }

    Ok(tokens)
}
