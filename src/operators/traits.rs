//! Operator trait and evaluation context.

use crate::host::HostCallbacks;
use crate::parser::RunTimeString;

/// Context handed to operators at evaluation time: host callbacks for
/// external lookups and the transaction's macro resolver for `%{...}`
/// right-hand sides.
pub struct EvalContext<'a> {
    /// Host callbacks (DNS, GeoIP, file inspection).
    pub host: &'a dyn HostCallbacks,
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl<'a> EvalContext<'a> {
    /// Create a context.
    pub fn new(host: &'a dyn HostCallbacks, lookup: &'a dyn Fn(&str) -> Option<String>) -> Self {
        Self { host, lookup }
    }

    /// Resolve one macro reference.
    pub fn lookup(&self, reference: &str) -> Option<String> {
        (self.lookup)(reference)
    }

    /// Expand a macro string against the transaction.
    pub fn expand(&self, s: &RunTimeString) -> String {
        s.expand(|name| (self.lookup)(name))
    }
}

/// Result of operator evaluation.
#[derive(Debug, Clone, Default)]
pub struct OperatorResult {
    /// Whether the operator matched (before negation).
    pub matched: bool,
    /// Captures: slot 0 is the whole match, 1.. are groups.
    pub captures: Vec<String>,
    /// The value that matched (pattern, fingerprint, matched substring).
    pub matched_value: Option<String>,
    /// Entries produced by lookup operators, written into the GEO
    /// collection by the evaluator.
    pub lookup_data: Vec<(String, String)>,
}

impl OperatorResult {
    /// No match.
    pub fn no_match() -> Self {
        Self::default()
    }

    /// A match carrying the matched value.
    pub fn matched(value: impl Into<String>) -> Self {
        Self {
            matched: true,
            matched_value: Some(value.into()),
            ..Self::default()
        }
    }

    /// A match with capture groups (slot 0 = whole match).
    pub fn matched_with_captures(value: impl Into<String>, captures: Vec<String>) -> Self {
        Self {
            matched: true,
            captures,
            matched_value: Some(value.into()),
            ..Self::default()
        }
    }
}

/// A compiled predicate over a transformed value.
pub trait Operator: Send + Sync {
    /// Evaluate against one value.
    fn evaluate(&self, input: &str, ctx: &EvalContext<'_>) -> OperatorResult;

    /// The operator's `@` name.
    fn name(&self) -> &'static str;

    /// Whether `capture` has an effect with this operator.
    fn supports_capture(&self) -> bool {
        false
    }
}
