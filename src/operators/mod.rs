//! Operator catalog.
//!
//! Operators are compiled once at load time; a compile failure (bad
//! regex, missing pattern file, invalid CIDR) aborts the build with the
//! first diagnostic. Negation lives on the rule envelope, not here.

mod comparison;
mod detection;
mod network;
mod pattern;
mod traits;
mod validation;
mod verify;

pub use comparison::{
    BeginsWithOperator, ContainsOperator, ContainsWordOperator, EndsWithOperator, NumericOp,
    NumericOperator, StrEqOperator, StrMatchOperator, WithinOperator,
};
pub use detection::{DetectSqliOperator, DetectXssOperator};
pub use network::{GeoLookupOperator, InspectFileOperator, IpMatchOperator, RblOperator};
pub use pattern::{PmOperator, RxOperator};
pub use traits::{EvalContext, Operator, OperatorResult};
pub use validation::{
    ValidateByteRangeOperator, ValidateUrlEncodingOperator, ValidateUtf8EncodingOperator,
};
pub use verify::{VerifyCcOperator, VerifyCpfOperator, VerifySsnOperator, VerifySvnrOperator};

use crate::error::{Error, Result};
use crate::parser::{OperatorName, OperatorSpec};
use std::sync::Arc;

/// Operator that never matches (@noMatch).
pub struct NoMatchOperator;

impl Operator for NoMatchOperator {
    fn evaluate(&self, _input: &str, _ctx: &EvalContext<'_>) -> OperatorResult {
        OperatorResult::no_match()
    }

    fn name(&self) -> &'static str {
        "noMatch"
    }
}

/// Operator that always matches (@unconditionalMatch).
pub struct UnconditionalMatchOperator;

impl Operator for UnconditionalMatchOperator {
    fn evaluate(&self, input: &str, _ctx: &EvalContext<'_>) -> OperatorResult {
        OperatorResult::matched(input.to_string())
    }

    fn name(&self) -> &'static str {
        "unconditionalMatch"
    }
}

/// Compile an operator specification into its executable form.
///
/// `regex_size_limit` is the configured bound on compiled regex programs
/// (`SecPcreMatchLimit`).
pub fn compile_operator(
    spec: &OperatorSpec,
    regex_size_limit: Option<usize>,
) -> Result<Arc<dyn Operator>> {
    let arg = spec.argument.as_str();
    match spec.name {
        OperatorName::Rx => Ok(Arc::new(RxOperator::new(arg, regex_size_limit)?)),
        OperatorName::Pm => Ok(Arc::new(PmOperator::new(arg)?)),
        OperatorName::PmFromFile => Ok(Arc::new(PmOperator::from_file(arg)?)),
        OperatorName::Contains => Ok(Arc::new(ContainsOperator::new(arg))),
        OperatorName::ContainsWord => Ok(Arc::new(ContainsWordOperator::new(arg))),
        OperatorName::BeginsWith => Ok(Arc::new(BeginsWithOperator::new(arg))),
        OperatorName::EndsWith => Ok(Arc::new(EndsWithOperator::new(arg))),
        OperatorName::Within => Ok(Arc::new(WithinOperator::new(arg))),
        OperatorName::StrEq => Ok(Arc::new(StrEqOperator::new(arg))),
        OperatorName::StrMatch => Ok(Arc::new(StrMatchOperator::new(arg))),
        OperatorName::Eq => Ok(Arc::new(NumericOperator::new(NumericOp::Eq, arg))),
        OperatorName::Ne => Ok(Arc::new(NumericOperator::new(NumericOp::Ne, arg))),
        OperatorName::Gt => Ok(Arc::new(NumericOperator::new(NumericOp::Gt, arg))),
        OperatorName::Ge => Ok(Arc::new(NumericOperator::new(NumericOp::Ge, arg))),
        OperatorName::Lt => Ok(Arc::new(NumericOperator::new(NumericOp::Lt, arg))),
        OperatorName::Le => Ok(Arc::new(NumericOperator::new(NumericOp::Le, arg))),
        OperatorName::DetectSqli => Ok(Arc::new(DetectSqliOperator)),
        OperatorName::DetectXss => Ok(Arc::new(DetectXssOperator)),
        OperatorName::ValidateUrlEncoding => Ok(Arc::new(ValidateUrlEncodingOperator)),
        OperatorName::ValidateUtf8Encoding => Ok(Arc::new(ValidateUtf8EncodingOperator)),
        OperatorName::ValidateByteRange => Ok(Arc::new(ValidateByteRangeOperator::new(arg)?)),
        OperatorName::VerifyCc => Ok(Arc::new(VerifyCcOperator::new(arg)?)),
        OperatorName::VerifyCpf => Ok(Arc::new(VerifyCpfOperator::new(arg)?)),
        OperatorName::VerifySsn => Ok(Arc::new(VerifySsnOperator::new(arg)?)),
        OperatorName::VerifySvnr => Ok(Arc::new(VerifySvnrOperator::new(arg)?)),
        OperatorName::IpMatch => Ok(Arc::new(IpMatchOperator::new(arg)?)),
        OperatorName::IpMatchFromFile => Ok(Arc::new(IpMatchOperator::from_file(arg)?)),
        OperatorName::Rbl => Ok(Arc::new(RblOperator::new(arg))),
        OperatorName::GeoLookup => Ok(Arc::new(GeoLookupOperator)),
        OperatorName::InspectFile => Ok(Arc::new(InspectFileOperator)),
        OperatorName::NoMatch => Ok(Arc::new(NoMatchOperator)),
        OperatorName::UnconditionalMatch => Ok(Arc::new(UnconditionalMatchOperator)),

        // Recognized legacy/unsupported operators get targeted
        // diagnostics instead of silent acceptance.
        OperatorName::Rsub => Err(Error::unsupported(
            "@rsub",
            "stream substitution is not implemented",
        )),
        OperatorName::GsbLookup => Err(Error::unsupported(
            "@gsbLookup",
            "the safe-browsing API this relied on is gone",
        )),
        OperatorName::ValidateHash => Err(Error::unsupported(
            "@validateHash",
            "request hash enforcement is not implemented",
        )),
        OperatorName::ValidateSchema => Err(Error::unsupported(
            "@validateSchema",
            "no XML body processor is available",
        )),
        OperatorName::ValidateDtd => Err(Error::unsupported(
            "@validateDTD",
            "no XML body processor is available",
        )),
        OperatorName::FuzzyHash => Err(Error::unsupported(
            "@fuzzyHash",
            "no fuzzy-hash backend is available",
        )),
    }
}
