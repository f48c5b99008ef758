//! String and numeric comparison operators.
//!
//! Right-hand sides are macro strings: `@eq %{tx.limit}` compares against
//! the current value of `tx.limit` at evaluation time. Numeric operators
//! do not match when either side fails to parse.

use super::traits::{EvalContext, Operator, OperatorResult};
use crate::parser::RunTimeString;

/// Substring match (@contains).
pub struct ContainsOperator {
    needle: RunTimeString,
}

impl ContainsOperator {
    pub fn new(needle: &str) -> Self {
        Self {
            needle: RunTimeString::parse(needle),
        }
    }
}

impl Operator for ContainsOperator {
    fn evaluate(&self, input: &str, ctx: &EvalContext<'_>) -> OperatorResult {
        let needle = ctx.expand(&self.needle);
        if !needle.is_empty() && input.contains(&needle) {
            OperatorResult::matched(needle)
        } else {
            OperatorResult::no_match()
        }
    }

    fn name(&self) -> &'static str {
        "contains"
    }
}

/// Substring bounded by non-word characters (@containsWord).
pub struct ContainsWordOperator {
    word: RunTimeString,
}

impl ContainsWordOperator {
    pub fn new(word: &str) -> Self {
        Self {
            word: RunTimeString::parse(word),
        }
    }
}

impl Operator for ContainsWordOperator {
    fn evaluate(&self, input: &str, ctx: &EvalContext<'_>) -> OperatorResult {
        let word = ctx.expand(&self.word);
        if word.is_empty() {
            return OperatorResult::no_match();
        }

        let is_word = |c: char| c.is_alphanumeric() || c == '_';
        let mut search = 0;
        while let Some(pos) = input[search..].find(&word) {
            let start = search + pos;
            let end = start + word.len();
            let before_ok = input[..start].chars().next_back().map_or(true, |c| !is_word(c));
            let after_ok = input[end..].chars().next().map_or(true, |c| !is_word(c));
            if before_ok && after_ok {
                return OperatorResult::matched(word);
            }
            // advance one whole character so the next slice stays on a
            // boundary
            search = start
                + input[start..]
                    .chars()
                    .next()
                    .map_or(1, |c| c.len_utf8());
        }
        OperatorResult::no_match()
    }

    fn name(&self) -> &'static str {
        "containsWord"
    }
}

/// Prefix match (@beginsWith).
pub struct BeginsWithOperator {
    prefix: RunTimeString,
}

impl BeginsWithOperator {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: RunTimeString::parse(prefix),
        }
    }
}

impl Operator for BeginsWithOperator {
    fn evaluate(&self, input: &str, ctx: &EvalContext<'_>) -> OperatorResult {
        let prefix = ctx.expand(&self.prefix);
        if input.starts_with(&prefix) {
            OperatorResult::matched(prefix)
        } else {
            OperatorResult::no_match()
        }
    }

    fn name(&self) -> &'static str {
        "beginsWith"
    }
}

/// Suffix match (@endsWith).
pub struct EndsWithOperator {
    suffix: RunTimeString,
}

impl EndsWithOperator {
    pub fn new(suffix: &str) -> Self {
        Self {
            suffix: RunTimeString::parse(suffix),
        }
    }
}

impl Operator for EndsWithOperator {
    fn evaluate(&self, input: &str, ctx: &EvalContext<'_>) -> OperatorResult {
        let suffix = ctx.expand(&self.suffix);
        if input.ends_with(&suffix) {
            OperatorResult::matched(suffix)
        } else {
            OperatorResult::no_match()
        }
    }

    fn name(&self) -> &'static str {
        "endsWith"
    }
}

/// Input contained in the argument (@within). Matches when the expanded
/// argument contains the input; an empty input never matches.
pub struct WithinOperator {
    haystack: RunTimeString,
}

impl WithinOperator {
    pub fn new(haystack: &str) -> Self {
        Self {
            haystack: RunTimeString::parse(haystack),
        }
    }
}

impl Operator for WithinOperator {
    fn evaluate(&self, input: &str, ctx: &EvalContext<'_>) -> OperatorResult {
        if input.is_empty() {
            return OperatorResult::no_match();
        }
        let haystack = ctx.expand(&self.haystack);
        if haystack.contains(input) {
            OperatorResult::matched(input.to_string())
        } else {
            OperatorResult::no_match()
        }
    }

    fn name(&self) -> &'static str {
        "within"
    }
}

/// Exact equality (@streq).
pub struct StrEqOperator {
    expected: RunTimeString,
}

impl StrEqOperator {
    pub fn new(expected: &str) -> Self {
        Self {
            expected: RunTimeString::parse(expected),
        }
    }
}

impl Operator for StrEqOperator {
    fn evaluate(&self, input: &str, ctx: &EvalContext<'_>) -> OperatorResult {
        if input == ctx.expand(&self.expected) {
            OperatorResult::matched(input.to_string())
        } else {
            OperatorResult::no_match()
        }
    }

    fn name(&self) -> &'static str {
        "streq"
    }
}

/// Case-sensitive substring match with a fixed pattern (@strmatch).
pub struct StrMatchOperator {
    pattern: String,
}

impl StrMatchOperator {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
        }
    }
}

impl Operator for StrMatchOperator {
    fn evaluate(&self, input: &str, _ctx: &EvalContext<'_>) -> OperatorResult {
        if !self.pattern.is_empty() && input.contains(&self.pattern) {
            OperatorResult::matched(self.pattern.clone())
        } else {
            OperatorResult::no_match()
        }
    }

    fn name(&self) -> &'static str {
        "strmatch"
    }
}

/// Numeric comparison kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOp {
    /// `@eq`
    Eq,
    /// `@ne`
    Ne,
    /// `@gt`
    Gt,
    /// `@ge`
    Ge,
    /// `@lt`
    Lt,
    /// `@le`
    Le,
}

/// Numeric comparison (@eq/@ne/@gt/@ge/@lt/@le).
pub struct NumericOperator {
    op: NumericOp,
    rhs: RunTimeString,
}

impl NumericOperator {
    pub fn new(op: NumericOp, rhs: &str) -> Self {
        Self {
            op,
            rhs: RunTimeString::parse(rhs),
        }
    }
}

impl Operator for NumericOperator {
    fn evaluate(&self, input: &str, ctx: &EvalContext<'_>) -> OperatorResult {
        let lhs: i64 = match input.trim().parse() {
            Ok(n) => n,
            Err(_) => return OperatorResult::no_match(),
        };
        let rhs: i64 = match ctx.expand(&self.rhs).trim().parse() {
            Ok(n) => n,
            Err(_) => return OperatorResult::no_match(),
        };

        let matched = match self.op {
            NumericOp::Eq => lhs == rhs,
            NumericOp::Ne => lhs != rhs,
            NumericOp::Gt => lhs > rhs,
            NumericOp::Ge => lhs >= rhs,
            NumericOp::Lt => lhs < rhs,
            NumericOp::Le => lhs <= rhs,
        };

        if matched {
            OperatorResult::matched(input.to_string())
        } else {
            OperatorResult::no_match()
        }
    }

    fn name(&self) -> &'static str {
        match self.op {
            NumericOp::Eq => "eq",
            NumericOp::Ne => "ne",
            NumericOp::Gt => "gt",
            NumericOp::Ge => "ge",
            NumericOp::Lt => "lt",
            NumericOp::Le => "le",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::traits::test_support::{eval, eval_with};
    use super::*;

    #[test]
    fn test_contains() {
        let op = ContainsOperator::new("evil");
        assert!(eval(&op, "an evil payload").matched);
        assert!(!eval(&op, "benign").matched);
    }

    #[test]
    fn test_contains_word() {
        let op = ContainsWordOperator::new("select");
        assert!(eval(&op, "select * from t").matched);
        assert!(eval(&op, "(select)").matched);
        assert!(!eval(&op, "preselected").matched);
        assert!(!eval(&op, "select_all").matched);
    }

    #[test]
    fn test_begins_ends() {
        assert!(eval(&BeginsWithOperator::new("/admin"), "/admin/x").matched);
        assert!(!eval(&BeginsWithOperator::new("/admin"), "/x/admin").matched);
        assert!(eval(&EndsWithOperator::new(".php"), "index.php").matched);
        assert!(!eval(&EndsWithOperator::new(".php"), "index.html").matched);
    }

    #[test]
    fn test_within() {
        let op = WithinOperator::new("GET POST HEAD");
        assert!(eval(&op, "GET").matched);
        assert!(eval(&op, "POST").matched);
        assert!(!eval(&op, "DELETE").matched);
        assert!(!eval(&op, "").matched);
    }

    #[test]
    fn test_streq() {
        let op = StrEqOperator::new("POST");
        assert!(eval(&op, "POST").matched);
        assert!(!eval(&op, "post").matched);
    }

    #[test]
    fn test_streq_macro_rhs() {
        let op = StrEqOperator::new("%{tx.expected}");
        assert!(eval_with(&op, "abc", "tx.expected", "abc").matched);
        assert!(!eval_with(&op, "abc", "tx.expected", "xyz").matched);
    }

    #[test]
    fn test_strmatch_case_sensitive() {
        let op = StrMatchOperator::new("Admin");
        assert!(eval(&op, "the Admin page").matched);
        assert!(!eval(&op, "the admin page").matched);
    }

    #[test]
    fn test_numeric() {
        let gt = NumericOperator::new(NumericOp::Gt, "10");
        assert!(eval(&gt, "11").matched);
        assert!(!eval(&gt, "10").matched);
        assert!(!eval(&gt, "not-a-number").matched);

        let le = NumericOperator::new(NumericOp::Le, "5");
        assert!(eval(&le, "5").matched);
        assert!(eval(&le, "-3").matched);
        assert!(!eval(&le, "6").matched);
    }

    #[test]
    fn test_numeric_macro_rhs() {
        let ge = NumericOperator::new(NumericOp::Ge, "%{tx.threshold}");
        assert!(eval_with(&ge, "7", "tx.threshold", "5").matched);
        assert!(!eval_with(&ge, "3", "tx.threshold", "5").matched);
        // An unresolvable threshold expands empty and cannot match
        assert!(!eval(&ge, "7").matched);
    }
}
