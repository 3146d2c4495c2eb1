//! Hand-written recursive descent parser over the token stream.
//!
//! One rule per line, four accepted shapes:
//!
//! ```text
//! ACTOR <i> BIT <b> SET|CLEAR
//! IF ACTOR <i> BIT <b> THEN ACTOR <j> BIT <c> SET|CLEAR
//! IF ACTOR <i> BIT <b> AND ACTOR <j> BIT <c> THEN ACTOR <k> BIT <d> SET|CLEAR
//! IF ACTOR <i> BIT <b> OR  ACTOR <j> BIT <c> THEN ACTOR <k> BIT <d> SET|CLEAR
//! ```

use causeway_core::matrix::ACTOR_BITS;
use causeway_core::{BitAction, BitOp, BitRef, CompiledRule, Condition};
use thiserror::Error;

use crate::lexer::Token;

/// Why a line failed to parse. Never fatal to compilation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseReason {
    #[error("unexpected character at byte {0}")]
    Unlexable(usize),

    #[error("expected {expected}, found {found}")]
    Unexpected {
        expected: &'static str,
        found: String,
    },

    #[error("line ends before the rule is complete (expected {expected})")]
    Truncated { expected: &'static str },

    #[error("trailing tokens after a complete rule")]
    TrailingTokens,

    #[error("bit position {0} exceeds the 64-bit actor width")]
    BitOutOfRange(u64),
}

struct TokenStream<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TokenStream<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.peek();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: Token, expected: &'static str) -> Result<(), ParseReason> {
        match self.advance() {
            Some(t) if t == want => Ok(()),
            Some(t) => Err(ParseReason::Unexpected {
                expected,
                found: format!("{t:?}"),
            }),
            None => Err(ParseReason::Truncated { expected }),
        }
    }

    fn expect_number(&mut self, expected: &'static str) -> Result<u64, ParseReason> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(n),
            Some(t) => Err(ParseReason::Unexpected {
                expected,
                found: format!("{t:?}"),
            }),
            None => Err(ParseReason::Truncated { expected }),
        }
    }

    fn at_end(&self) -> bool {
        self.pos == self.tokens.len()
    }
}

/// Parse `ACTOR <i> BIT <b>`.
fn bit_ref(stream: &mut TokenStream<'_>) -> Result<BitRef, ParseReason> {
    stream.expect(Token::Actor, "ACTOR")?;
    let actor = stream.expect_number("actor index")?;
    stream.expect(Token::Bit, "BIT")?;
    let bit = stream.expect_number("bit position")?;
    if bit >= ACTOR_BITS as u64 {
        return Err(ParseReason::BitOutOfRange(bit));
    }
    Ok(BitRef::new(actor as usize, bit as u8))
}

/// Parse the trailing `SET` or `CLEAR`.
fn bit_op(stream: &mut TokenStream<'_>) -> Result<BitOp, ParseReason> {
    match stream.advance() {
        Some(Token::Set) => Ok(BitOp::Set),
        Some(Token::Clear) => Ok(BitOp::Clear),
        Some(t) => Err(ParseReason::Unexpected {
            expected: "SET or CLEAR",
            found: format!("{t:?}"),
        }),
        None => Err(ParseReason::Truncated {
            expected: "SET or CLEAR",
        }),
    }
}

/// Parse one tokenized line into a compiled rule.
///
/// The caller filters out empty lines; an empty token slice here is a
/// truncation error.
pub fn parse_line(tokens: &[Token]) -> Result<CompiledRule, ParseReason> {
    let mut stream = TokenStream::new(tokens);

    let rule = match stream.peek() {
        Some(Token::If) => {
            stream.advance();
            let first = bit_ref(&mut stream)?;

            let condition = match stream.peek() {
                Some(Token::And) => {
                    stream.advance();
                    Condition::And(first, bit_ref(&mut stream)?)
                }
                Some(Token::Or) => {
                    stream.advance();
                    Condition::Or(first, bit_ref(&mut stream)?)
                }
                _ => Condition::Single(first),
            };

            stream.expect(Token::Then, "THEN")?;
            let target = bit_ref(&mut stream)?;
            let op = bit_op(&mut stream)?;
            CompiledRule {
                condition,
                action: BitAction { target, op },
            }
        }
        _ => {
            // Unconditional shape.
            let target = bit_ref(&mut stream)?;
            let op = bit_op(&mut stream)?;
            CompiledRule {
                condition: Condition::Always,
                action: BitAction { target, op },
            }
        }
    };

    if !stream.at_end() {
        return Err(ParseReason::TrailingTokens);
    }
    Ok(rule)
}
