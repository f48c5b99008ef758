//! Pattern matching operators (@rx, @pm, @pmFromFile).

use super::traits::{EvalContext, Operator, OperatorResult};
use crate::error::{Error, Result};
use aho_corasick::AhoCorasick;
use regex::{Regex, RegexBuilder};

/// Regex operator (@rx).
pub struct RxOperator {
    pattern: Regex,
}

impl RxOperator {
    /// Compile the pattern. `size_limit` bounds the compiled program (the
    /// engine's stand-in for a match limit; the regex engine itself runs
    /// in linear time).
    pub fn new(pattern: &str, size_limit: Option<usize>) -> Result<Self> {
        let mut builder = RegexBuilder::new(pattern);
        builder.case_insensitive(false);
        if let Some(limit) = size_limit {
            builder.size_limit(limit);
        }
        let regex = builder.build().map_err(|e| Error::RegexCompile {
            pattern: pattern.to_string(),
            source: e,
        })?;
        Ok(Self { pattern: regex })
    }
}

impl Operator for RxOperator {
    fn evaluate(&self, input: &str, _ctx: &EvalContext<'_>) -> OperatorResult {
        match self.pattern.captures(input) {
            Some(captures) => {
                let full = captures
                    .get(0)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                let groups: Vec<String> = captures
                    .iter()
                    .map(|c| c.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect();
                OperatorResult::matched_with_captures(full, groups)
            }
            None => OperatorResult::no_match(),
        }
    }

    fn name(&self) -> &'static str {
        "rx"
    }

    fn supports_capture(&self) -> bool {
        true
    }
}

/// Multi-phrase operator (@pm / @pmFromFile). First match wins.
pub struct PmOperator {
    automaton: AhoCorasick,
    patterns: Vec<String>,
}

impl PmOperator {
    /// Build from whitespace-separated phrases.
    pub fn new(phrases: &str) -> Result<Self> {
        Self::from_patterns(phrases.split_whitespace().map(str::to_string).collect())
    }

    /// Build from a phrase file (one per line, `#` comments).
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::RuleFileLoad {
            path: path.into(),
            source: e,
        })?;
        let patterns = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self::from_patterns(patterns)
    }

    fn from_patterns(patterns: Vec<String>) -> Result<Self> {
        if patterns.is_empty() {
            return Err(Error::PatternSet {
                message: "empty pattern list".to_string(),
            });
        }
        let automaton = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&patterns)
            .map_err(|e| Error::PatternSet {
                message: e.to_string(),
            })?;
        Ok(Self {
            automaton,
            patterns,
        })
    }
}

impl Operator for PmOperator {
    fn evaluate(&self, input: &str, _ctx: &EvalContext<'_>) -> OperatorResult {
        match self.automaton.find(input) {
            Some(found) => {
                OperatorResult::matched(self.patterns[found.pattern().as_usize()].clone())
            }
            None => OperatorResult::no_match(),
        }
    }

    fn name(&self) -> &'static str {
        "pm"
    }
}
