//! Identifier verification operators (@verifyCC, @verifyCPF, @verifySSN,
//! @verifySVNR).
//!
//! Each takes a regex that extracts candidate substrings; a candidate that
//! passes the respective checksum/structure test is a match.

use super::traits::{EvalContext, Operator, OperatorResult};
use crate::error::{Error, Result};
use regex::Regex;

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::RegexCompile {
        pattern: pattern.to_string(),
        source: e,
    })
}

fn digits_of(candidate: &str) -> Vec<u8> {
    candidate
        .chars()
        .filter(|c| c.is_ascii_digit())
        .map(|c| c.to_digit(10).unwrap() as u8)
        .collect()
}

/// Credit-card verification via the Luhn checksum.
pub struct VerifyCcOperator {
    extractor: Regex,
}

impl VerifyCcOperator {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            extractor: compile(pattern)?,
        })
    }
}

fn luhn_valid(digits: &[u8]) -> bool {
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let mut sum = 0u32;
    for (i, &d) in digits.iter().rev().enumerate() {
        let mut d = d as u32;
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}

impl Operator for VerifyCcOperator {
    fn evaluate(&self, input: &str, _ctx: &EvalContext<'_>) -> OperatorResult {
        for candidate in self.extractor.find_iter(input) {
            let digits = digits_of(candidate.as_str());
            if luhn_valid(&digits) {
                return OperatorResult::matched(candidate.as_str().to_string());
            }
        }
        OperatorResult::no_match()
    }

    fn name(&self) -> &'static str {
        "verifyCC"
    }
}

/// Brazilian CPF verification (11 digits, two check digits).
pub struct VerifyCpfOperator {
    extractor: Regex,
}

impl VerifyCpfOperator {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            extractor: compile(pattern)?,
        })
    }
}

fn cpf_valid(digits: &[u8]) -> bool {
    if digits.len() != 11 {
        return false;
    }
    // All-equal sequences pass the checksum but are not valid documents
    if digits.windows(2).all(|w| w[0] == w[1]) {
        return false;
    }
    let check = |count: usize| -> u8 {
        let sum: u32 = digits[..count]
            .iter()
            .enumerate()
            .map(|(i, &d)| d as u32 * (count as u32 + 1 - i as u32))
            .sum();
        let rem = (sum * 10) % 11;
        if rem == 10 {
            0
        } else {
            rem as u8
        }
    };
    check(9) == digits[9] && check(10) == digits[10]
}

impl Operator for VerifyCpfOperator {
    fn evaluate(&self, input: &str, _ctx: &EvalContext<'_>) -> OperatorResult {
        for candidate in self.extractor.find_iter(input) {
            if cpf_valid(&digits_of(candidate.as_str())) {
                return OperatorResult::matched(candidate.as_str().to_string());
            }
        }
        OperatorResult::no_match()
    }

    fn name(&self) -> &'static str {
        "verifyCPF"
    }
}

/// US social security number verification (structural: no zero fields, no
/// 666 or 900+ area).
pub struct VerifySsnOperator {
    extractor: Regex,
}

impl VerifySsnOperator {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            extractor: compile(pattern)?,
        })
    }
}

fn ssn_valid(digits: &[u8]) -> bool {
    if digits.len() != 9 {
        return false;
    }
    let area = digits[0] as u16 * 100 + digits[1] as u16 * 10 + digits[2] as u16;
    let group = digits[3] * 10 + digits[4];
    let serial =
        digits[5] as u16 * 1000 + digits[6] as u16 * 100 + digits[7] as u16 * 10 + digits[8] as u16;
    area != 0 && area != 666 && area < 900 && group != 0 && serial != 0
}

impl Operator for VerifySsnOperator {
    fn evaluate(&self, input: &str, _ctx: &EvalContext<'_>) -> OperatorResult {
        for candidate in self.extractor.find_iter(input) {
            if ssn_valid(&digits_of(candidate.as_str())) {
                return OperatorResult::matched(candidate.as_str().to_string());
            }
        }
        OperatorResult::no_match()
    }

    fn name(&self) -> &'static str {
        "verifySSN"
    }
}

/// Austrian social insurance number verification (10 digits, weighted
/// check digit).
pub struct VerifySvnrOperator {
    extractor: Regex,
}

impl VerifySvnrOperator {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            extractor: compile(pattern)?,
        })
    }
}

fn svnr_valid(digits: &[u8]) -> bool {
    if digits.len() != 10 || digits[0] == 0 {
        return false;
    }
    const WEIGHTS: [u32; 10] = [3, 7, 9, 0, 5, 8, 4, 2, 1, 6];
    let sum: u32 = digits
        .iter()
        .zip(WEIGHTS.iter())
        .map(|(&d, &w)| d as u32 * w)
        .sum();
    let check = sum % 11;
    check < 10 && check == digits[3] as u32
}

impl Operator for VerifySvnrOperator {
    fn evaluate(&self, input: &str, _ctx: &EvalContext<'_>) -> OperatorResult {
        for candidate in self.extractor.find_iter(input) {
            if svnr_valid(&digits_of(candidate.as_str())) {
                return OperatorResult::matched(candidate.as_str().to_string());
            }
        }
        OperatorResult::no_match()
    }

    fn name(&self) -> &'static str {
        "verifySVNR"
    }
}
