//! Injection detection operators (@detectSQLi, @detectXSS).

use super::traits::{EvalContext, Operator, OperatorResult};
use crate::libinjection;

/// SQL injection detection (@detectSQLi). The fingerprint becomes the
/// matched value.
pub struct DetectSqliOperator;

impl Operator for DetectSqliOperator {
    fn evaluate(&self, input: &str, _ctx: &EvalContext<'_>) -> OperatorResult {
        match libinjection::sqli_fingerprint(input) {
            Some(fingerprint) => OperatorResult::matched(fingerprint),
            None => OperatorResult::no_match(),
        }
    }

    fn name(&self) -> &'static str {
        "detectSQLi"
    }
}

/// Cross-site scripting detection (@detectXSS).
pub struct DetectXssOperator;

impl Operator for DetectXssOperator {
    fn evaluate(&self, input: &str, _ctx: &EvalContext<'_>) -> OperatorResult {
        match libinjection::xss_signal(input) {
            Some(signal) => OperatorResult::matched(signal),
            None => OperatorResult::no_match(),
        }
    }

    fn name(&self) -> &'static str {
        "detectXSS"
    }
}

#[cfg(test)]
mod tests {
    use super::super::traits::test_support::eval;
    use super::*;

    #[test]
    fn test_detect_sqli() {
        let op = DetectSqliOperator;
        assert!(eval(&op, "1' OR '1'='1").matched);
        assert!(!eval(&op, "plain text").matched);
    }

    #[test]
    fn test_detect_xss() {
        let op = DetectXssOperator;
        assert!(eval(&op, "<script>alert(1)</script>").matched);
        assert!(!eval(&op, "hello world").matched);
    }

    #[test]
    fn test_fingerprint_is_matched_value() {
        let op = DetectSqliOperator;
        let result = eval(&op, "1 UNION SELECT password FROM users");
        assert!(result.matched);
        assert!(result.matched_value.is_some());
    }
}
