//! The rate/formula mini-language. Text rates and formulas are
//! rewritten into plain arithmetic by a pipeline of substitutions
//! (dice, `{name}` node references, `self`), then handed to the
//! restricted expression evaluator in [`crate::expr`].
//!
//! This layer never fails: every malformed input lands on a documented
//! fallback (1 for rates, 0 for formulas, `value > 0` for conditions).

use crate::connection::Rate;
use crate::expr;
use crate::graph::Graph;
use crate::id::NodeId;
use crate::rng::SimRng;

/// Dice counts above this are clamped; evaluation stays bounded.
const MAX_DICE: u32 = 10_000;

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// What a rate or formula can see while evaluating: the graph for
/// `{name}` references and an optional context node for `self`.
#[derive(Clone, Copy)]
pub struct EvalScope<'a> {
    pub graph: &'a Graph,
    pub node: Option<NodeId>,
}

impl<'a> EvalScope<'a> {
    pub fn new(graph: &'a Graph, node: Option<NodeId>) -> Self {
        Self { graph, node }
    }

    fn self_resources(&self) -> f64 {
        self.node
            .and_then(|id| self.graph.node(id))
            .map(|n| n.resources)
            .unwrap_or(0.0)
    }

    fn named_resources(&self, name: &str) -> f64 {
        self.graph
            .find_node_by_name(name)
            .map(|n| n.resources)
            .unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Parsed rates
// ---------------------------------------------------------------------------

/// A rate after mini-language parsing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedRate {
    pub value: f64,
    /// `&` prefix: the transfer moves everything or nothing.
    pub all_or_nothing: bool,
    /// `/N` form: fire every Nth step. 1 means every step.
    pub interval: u32,
}

impl ParsedRate {
    fn plain(value: f64) -> Self {
        Self {
            value,
            all_or_nothing: false,
            interval: 1,
        }
    }
}

impl Default for ParsedRate {
    fn default() -> Self {
        Self::plain(1.0)
    }
}

/// Parse a rate. Numeric rates short-circuit; text runs through the
/// substitution pipeline and the expression evaluator, falling back to
/// 1 on any failure.
pub fn parse_rate(rate: &Rate, scope: &EvalScope<'_>, rng: &mut SimRng) -> ParsedRate {
    let text = match rate {
        Rate::Number(n) => return ParsedRate::plain(*n),
        Rate::Text(t) => t.trim(),
    };
    if text.is_empty() {
        return ParsedRate::default();
    }

    let (all_or_nothing, text) = match text.strip_prefix('&') {
        Some(rest) => (true, rest.trim()),
        None => (false, text),
    };

    // `/N` consumes the whole remainder or nothing.
    if let Some(digits) = text.strip_prefix('/')
        && !digits.trim().is_empty()
        && let Ok(n) = digits.trim().parse::<u32>()
        && n > 0
    {
        return ParsedRate {
            value: 1.0,
            all_or_nothing,
            interval: n,
        };
    }

    let value = match evaluate_text(text, scope, rng) {
        Some(v) => v,
        None => 1.0,
    };
    ParsedRate {
        value,
        all_or_nothing,
        interval: 1,
    }
}

/// Evaluate a formula. Empty or failing formulas are 0.
pub fn evaluate_formula(text: &str, scope: &EvalScope<'_>, rng: &mut SimRng) -> f64 {
    let text = text.trim();
    if text.is_empty() {
        return 0.0;
    }
    evaluate_text(text, scope, rng).unwrap_or(0.0)
}

/// Evaluate a condition against a value. The word `value` refers to it;
/// a bare comparison such as `>= 5` is applied to it. Truth is finite
/// and non-zero; failures fall back to `value > 0`.
pub fn evaluate_condition(text: &str, value: f64) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return value > 0.0;
    }
    let substituted = replace_word(text, "value", &format_number(value));
    let expr_text = if is_bare_comparison(&substituted) {
        format!("{} {}", format_number(value), substituted)
    } else {
        substituted
    };
    match expr::evaluate(&expr_text) {
        Ok(v) => v.is_finite() && v != 0.0,
        Err(_) => value > 0.0,
    }
}

// ---------------------------------------------------------------------------
// Substitution pipeline
// ---------------------------------------------------------------------------

/// Substitutions in fixed order (dice, `{name}`, `self`), then the
/// expression evaluator. Non-finite results count as failure.
fn evaluate_text(text: &str, scope: &EvalScope<'_>, rng: &mut SimRng) -> Option<f64> {
    let text = substitute_dice(text, rng);
    let text = substitute_refs(&text, scope);
    let text = replace_word(&text, "self", &format_number(scope.self_resources()));
    match expr::evaluate(&text) {
        Ok(v) if v.is_finite() => Some(v),
        _ => None,
    }
}

/// Replace every `(\d*)[dD](\d+)` occurrence with the sum of `count`
/// independent rolls of a `sides`-sided die. Each occurrence rolls
/// fresh.
fn substitute_dice(text: &str, rng: &mut SimRng) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let mut k = i;
        while k < chars.len() && chars[k].is_ascii_digit() {
            k += 1;
        }
        if k < chars.len() && (chars[k] == 'd' || chars[k] == 'D') {
            let mut m = k + 1;
            while m < chars.len() && chars[m].is_ascii_digit() {
                m += 1;
            }
            if m > k + 1 {
                let count: u32 = if k > i {
                    chars[i..k]
                        .iter()
                        .collect::<String>()
                        .parse()
                        .unwrap_or(MAX_DICE)
                } else {
                    1
                };
                let sides: u32 = chars[k + 1..m]
                    .iter()
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0);
                let mut sum = 0u64;
                for _ in 0..count.min(MAX_DICE) {
                    sum += rng.roll(sides) as u64;
                }
                out.push_str(&sum.to_string());
                i = m;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Replace every `{name}` with the referenced node's resources, or 0
/// when no node carries that exact display name. An unclosed brace is
/// left alone for the expression layer to reject.
fn substitute_refs(text: &str, scope: &EvalScope<'_>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                out.push_str(&format_number(scope.named_resources(name)));
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Replace whole-word occurrences of `word` (neighbors must not be
/// alphanumeric or underscore).
fn replace_word(text: &str, word: &str, with: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = word.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let matches_here = chars[i..].starts_with(&pattern[..])
            && (i == 0 || !is_word_char(chars[i - 1]))
            && chars
                .get(i + pattern.len())
                .is_none_or(|c| !is_word_char(*c));
        if matches_here {
            out.push_str(with);
            i += pattern.len();
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Render a number so it reads back from the expression tokenizer.
/// Negative values are parenthesized so they survive inside products.
fn format_number(v: f64) -> String {
    if v < 0.0 {
        format!("(0 - {})", -v)
    } else {
        format!("{v}")
    }
}

/// True when the whole text is a comparison operator followed by a
/// numeric literal, such as `>= 5`. Anything longer (`> 5 + 3`) is not
/// a bare comparison and must stand on its own.
fn is_bare_comparison(text: &str) -> bool {
    let t = text.trim_start();
    let rest = ["<=", ">=", "==", "!=", "<", ">", "="]
        .iter()
        .find_map(|op| t.strip_prefix(op));
    match rest {
        Some(rest) => rest.trim().parse::<f64>().is_ok(),
        None => false,
    }
}
