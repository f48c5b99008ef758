//! Operator parsing.
//!
//! Operator name lookup uses a perfect hash table for O(1) dispatch.

use crate::error::{Error, Result};
use phf::phf_map;

/// An operator specification in a SecRule, before compilation.
#[derive(Debug, Clone)]
pub struct OperatorSpec {
    /// Whether the operator is negated (`!` prefix).
    pub negated: bool,
    /// The operator name.
    pub name: OperatorName,
    /// The raw operator argument.
    pub argument: String,
}

/// Operator names understood by the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorName {
    // Pattern matching
    /// Regular expression match.
    Rx,
    /// Multi-phrase match (Aho-Corasick).
    Pm,
    /// Multi-phrase match from file.
    PmFromFile,

    // String comparison
    /// Exact string equality.
    StrEq,
    /// Substring match.
    Contains,
    /// Substring bounded by non-word characters.
    ContainsWord,
    /// Prefix match.
    BeginsWith,
    /// Suffix match.
    EndsWith,
    /// Input is contained within the argument.
    Within,
    /// Single-pattern substring match.
    StrMatch,

    // Numeric comparison
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,

    // Detection
    /// SQL injection detection.
    DetectSqli,
    /// Cross-site scripting detection.
    DetectXss,

    // Validation
    /// URL-encoding validation.
    ValidateUrlEncoding,
    /// UTF-8 validation.
    ValidateUtf8Encoding,
    /// Byte-range validation.
    ValidateByteRange,
    /// XML schema validation (unsupported).
    ValidateSchema,
    /// DTD validation (unsupported).
    ValidateDtd,
    /// Request hash validation (unsupported legacy).
    ValidateHash,

    // Verification
    /// Credit-card number verification (Luhn).
    VerifyCc,
    /// Brazilian CPF verification.
    VerifyCpf,
    /// US social security number verification.
    VerifySsn,
    /// Austrian social insurance number verification.
    VerifySvnr,

    // Network
    /// IP/CIDR list match.
    IpMatch,
    /// IP/CIDR list match from file.
    IpMatchFromFile,
    /// DNS blocklist lookup.
    Rbl,
    /// GeoIP lookup.
    GeoLookup,
    /// Safe-browsing lookup (unsupported legacy).
    GsbLookup,

    // Files
    /// Uploaded file inspection via host callback.
    InspectFile,
    /// Fuzzy hash comparison (unsupported).
    FuzzyHash,

    // Special
    /// Never matches.
    NoMatch,
    /// Always matches.
    UnconditionalMatch,
    /// Regex substitution (unsupported legacy).
    Rsub,
}

/// Perfect hash map for operator name lookup (keys are lowercase).
static OPERATOR_MAP: phf::Map<&'static str, OperatorName> = phf_map! {
    "rx" => OperatorName::Rx,
    "pm" => OperatorName::Pm,
    "pmf" => OperatorName::PmFromFile,
    "pmfromfile" => OperatorName::PmFromFile,
    "streq" => OperatorName::StrEq,
    "contains" => OperatorName::Contains,
    "containsword" => OperatorName::ContainsWord,
    "beginswith" => OperatorName::BeginsWith,
    "endswith" => OperatorName::EndsWith,
    "within" => OperatorName::Within,
    "strmatch" => OperatorName::StrMatch,
    "eq" => OperatorName::Eq,
    "ne" => OperatorName::Ne,
    "gt" => OperatorName::Gt,
    "ge" => OperatorName::Ge,
    "lt" => OperatorName::Lt,
    "le" => OperatorName::Le,
    "detectsqli" => OperatorName::DetectSqli,
    "detectxss" => OperatorName::DetectXss,
    "validateurlencoding" => OperatorName::ValidateUrlEncoding,
    "validateutf8encoding" => OperatorName::ValidateUtf8Encoding,
    "validatebyterange" => OperatorName::ValidateByteRange,
    "validateschema" => OperatorName::ValidateSchema,
    "validatedtd" => OperatorName::ValidateDtd,
    "validatehash" => OperatorName::ValidateHash,
    "verifycc" => OperatorName::VerifyCc,
    "verifycpf" => OperatorName::VerifyCpf,
    "verifyssn" => OperatorName::VerifySsn,
    "verifysvnr" => OperatorName::VerifySvnr,
    "ipmatch" => OperatorName::IpMatch,
    "ipmatchf" => OperatorName::IpMatchFromFile,
    "ipmatchfromfile" => OperatorName::IpMatchFromFile,
    "rbl" => OperatorName::Rbl,
    "geolookup" => OperatorName::GeoLookup,
    "gsblookup" => OperatorName::GsbLookup,
    "inspectfile" => OperatorName::InspectFile,
    "fuzzyhash" => OperatorName::FuzzyHash,
    "nomatch" => OperatorName::NoMatch,
    "unconditionalmatch" => OperatorName::UnconditionalMatch,
    "rsub" => OperatorName::Rsub,
};

impl OperatorName {
    /// Parse an operator name, case-insensitively.
    #[inline]
    pub fn parse(s: &str) -> Option<Self> {
        if s.bytes().all(|b| b.is_ascii_lowercase()) {
            return OPERATOR_MAP.get(s).copied();
        }
        let mut buf = [0u8; 32];
        if s.len() > buf.len() {
            return None;
        }
        for (i, b) in s.bytes().enumerate() {
            buf[i] = b.to_ascii_lowercase();
        }
        let lower = std::str::from_utf8(&buf[..s.len()]).ok()?;
        OPERATOR_MAP.get(lower).copied()
    }
}

/// Parse an operator string (`@name arg`, `!@name arg`, or a bare regex).
pub fn parse_operator(input: &str) -> Result<OperatorSpec> {
    let input = input.trim();

    let (negated, input) = match input.strip_prefix('!') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, input),
    };

    if let Some(rest) = input.strip_prefix('@') {
        let space_pos = rest.bytes().position(|b| b.is_ascii_whitespace());
        let (name_str, argument) = match space_pos {
            Some(pos) => (&rest[..pos], rest[pos..].trim_start().to_string()),
            None => (rest, String::new()),
        };

        let name = OperatorName::parse(name_str).ok_or_else(|| Error::UnknownOperator {
            name: name_str.to_string(),
        })?;

        Ok(OperatorSpec {
            negated,
            name,
            argument,
        })
    } else {
        // A bare pattern is an implicit @rx
        Ok(OperatorSpec {
            negated,
            name: OperatorName::Rx,
            argument: input.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rx() {
        let op = parse_operator("@rx ^/admin").unwrap();
        assert_eq!(op.name, OperatorName::Rx);
        assert_eq!(op.argument, "^/admin");
        assert!(!op.negated);
    }

    #[test]
    fn test_parse_implicit_rx() {
        let op = parse_operator("^/admin").unwrap();
        assert_eq!(op.name, OperatorName::Rx);
        assert_eq!(op.argument, "^/admin");
    }

    #[test]
    fn test_parse_negated() {
        let op = parse_operator("!@streq GET").unwrap();
        assert_eq!(op.name, OperatorName::StrEq);
        assert!(op.negated);
    }

    #[test]
    fn test_parse_no_argument() {
        let op = parse_operator("@detectSQLi").unwrap();
        assert_eq!(op.name, OperatorName::DetectSqli);
        assert!(op.argument.is_empty());
    }

    #[test]
    fn test_case_insensitive_lookup() {
        assert_eq!(OperatorName::parse("rx"), Some(OperatorName::Rx));
        assert_eq!(OperatorName::parse("RX"), Some(OperatorName::Rx));
        assert_eq!(
            OperatorName::parse("detectSQLi"),
            Some(OperatorName::DetectSqli)
        );
        assert_eq!(
            OperatorName::parse("ipMatchFromFile"),
            Some(OperatorName::IpMatchFromFile)
        );
    }

    #[test]
    fn test_unknown_operator() {
        assert!(matches!(
            parse_operator("@bogus arg"),
            Err(Error::UnknownOperator { .. })
        ));
    }
}
