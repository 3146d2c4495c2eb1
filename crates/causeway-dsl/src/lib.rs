//! Rule compiler: newline-delimited rule text to a [`RuleSet`].
//!
//! Compilation is line-by-line and never fatal: a malformed line produces
//! a [`Diagnostic`] and is skipped, the remaining lines still compile.
//! Partial rule sets are valid. Bounds against a concrete matrix are not
//! resolved here; that happens at deploy time via `RuleSet::validate`.

pub mod lexer;
pub mod parser;

use causeway_core::RuleSet;
use tracing::{debug, warn};

pub use parser::ParseReason;

/// One skipped line and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based line number in the source text.
    pub line_no: usize,
    /// The offending line, trimmed.
    pub text: String,
    pub reason: ParseReason,
}

/// Result of compiling a rule source: the rules that parsed, in source
/// order, plus a diagnostic per skipped line.
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    pub rules: RuleSet,
    pub diagnostics: Vec<Diagnostic>,
}

/// Compile newline-delimited rule text.
///
/// Blank lines and `#` comments are ignored. Source order is preserved
/// and becomes evaluation order within a tick.
pub fn compile(text: &str) -> CompileOutput {
    let mut output = CompileOutput::default();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        // Strip trailing comments before lexing.
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let reason = match lexer::lex_line(line) {
            Ok(tokens) => match parser::parse_line(&tokens) {
                Ok(rule) => {
                    output.rules.push(rule);
                    continue;
                }
                Err(reason) => reason,
            },
            Err(offset) => ParseReason::Unlexable(offset),
        };

        warn!(line_no, line, %reason, "rule line skipped");
        output.diagnostics.push(Diagnostic {
            line_no,
            text: line.to_string(),
            reason,
        });
    }

    debug!(
        rules = output.rules.len(),
        skipped = output.diagnostics.len(),
        "rule compilation finished"
    );
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway_core::{ActorMatrix, BitOp, Condition};

    #[test]
    fn compiles_all_four_shapes() {
        let out = compile(
            "ACTOR 0 BIT 0 SET\n\
             IF ACTOR 0 BIT 0 THEN ACTOR 1 BIT 1 SET\n\
             IF ACTOR 0 BIT 0 AND ACTOR 1 BIT 1 THEN ACTOR 2 BIT 2 SET\n\
             IF ACTOR 0 BIT 0 OR ACTOR 1 BIT 1 THEN ACTOR 3 BIT 3 CLEAR",
        );
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.rules.len(), 4);

        let kinds: Vec<_> = out.rules.iter().map(|r| r.condition).collect();
        assert!(matches!(kinds[0], Condition::Always));
        assert!(matches!(kinds[1], Condition::Single(_)));
        assert!(matches!(kinds[2], Condition::And(_, _)));
        assert!(matches!(kinds[3], Condition::Or(_, _)));
        assert_eq!(out.rules.iter().last().unwrap().action.op, BitOp::Clear);
    }

    #[test]
    fn malformed_lines_never_abort_the_rest() {
        let out = compile(
            "ACTOR 0 BIT 0 SET\n\
             THIS IS NOT A RULE\n\
             IF ACTOR 0 BIT 0 THEN\n\
             ACTOR 1 BIT 1 CLEAR",
        );
        assert_eq!(out.rules.len(), 2);
        assert_eq!(out.diagnostics.len(), 2);
        assert_eq!(out.diagnostics[0].line_no, 2);
        assert_eq!(out.diagnostics[1].line_no, 3);
    }

    #[test]
    fn blank_lines_and_comments_produce_no_diagnostics() {
        let out = compile(
            "\n\
             # header comment\n\
             ACTOR 0 BIT 0 SET  # trailing comment\n\
             \t\n",
        );
        assert_eq!(out.rules.len(), 1);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn source_order_is_preserved() {
        let out = compile("ACTOR 1 BIT 0 SET\nACTOR 0 BIT 0 SET");
        let targets: Vec<_> = out
            .rules
            .iter()
            .map(|r| r.action.target.actor)
            .collect();
        assert_eq!(targets, vec![1, 0]);
    }

    #[test]
    fn compiled_rules_do_not_resolve_matrix_bounds() {
        // Index 100 compiles fine; validation against a matrix is a
        // deploy-time concern.
        let out = compile("ACTOR 100 BIT 0 SET");
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.rules.len(), 1);
        assert!(out.rules.validate(2).is_err());
        assert!(out.rules.validate(101).is_ok());
    }

    #[test]
    fn empty_input_yields_empty_valid_rule_set() {
        let out = compile("");
        assert!(out.rules.is_empty());
        assert!(out.diagnostics.is_empty());
        assert!(out.rules.validate(0).is_ok());

        // An empty rule set applied to any matrix is a no-op; nothing to
        // evaluate, nothing to fire.
        let m = ActorMatrix::new(1);
        assert!(!out.rules.iter().any(|r| r.condition.holds(&m)));
    }
}
