//! Transformation catalog.
//!
//! Transformations are total: malformed input yields best-effort output,
//! never an error. `none` is special-cased during pipeline assembly — it
//! resets the accumulated list rather than transforming anything.

mod decode;
mod encode;
mod normalize;
mod pipeline;

pub use decode::*;
pub use encode::*;
pub use normalize::*;
pub use pipeline::TransformationPipeline;

use crate::error::{Error, Result};
use std::borrow::Cow;
use std::sync::Arc;

/// A byte-string rewrite applied before operator evaluation.
pub trait Transformation: Send + Sync {
    /// Apply the transformation.
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str>;

    /// Canonical name, as written after `t:`.
    fn name(&self) -> &'static str;
}

/// Look up a transformation by its `t:` name (case-insensitive; both
/// `normalisePath` and `normalizePath` spellings are accepted).
pub fn create_transformation(name: &str) -> Result<Arc<dyn Transformation>> {
    match name.to_ascii_lowercase().as_str() {
        // Decoding
        "urldecode" => Ok(Arc::new(UrlDecode)),
        "urldecodeuni" => Ok(Arc::new(UrlDecodeUni)),
        "base64decode" => Ok(Arc::new(Base64Decode)),
        "base64decodeext" => Ok(Arc::new(Base64DecodeExt)),
        "hexdecode" => Ok(Arc::new(HexDecode)),
        "htmlentitydecode" => Ok(Arc::new(HtmlEntityDecode)),
        "jsdecode" => Ok(Arc::new(JsDecode)),
        "cssdecode" => Ok(Arc::new(CssDecode)),
        "escapeseqdecode" => Ok(Arc::new(EscapeSeqDecode)),

        // Encoding
        "base64encode" => Ok(Arc::new(Base64Encode)),
        "hexencode" => Ok(Arc::new(HexEncode)),
        "urlencode" => Ok(Arc::new(UrlEncode)),
        "utf8tounicode" => Ok(Arc::new(Utf8ToUnicode)),

        // Normalization
        "lowercase" => Ok(Arc::new(Lowercase)),
        "uppercase" => Ok(Arc::new(Uppercase)),
        "compresswhitespace" => Ok(Arc::new(CompressWhitespace)),
        "removewhitespace" => Ok(Arc::new(RemoveWhitespace)),
        "removenulls" => Ok(Arc::new(RemoveNulls)),
        "replacenulls" => Ok(Arc::new(ReplaceNulls)),
        "trim" => Ok(Arc::new(Trim)),
        "trimleft" => Ok(Arc::new(TrimLeft)),
        "trimright" => Ok(Arc::new(TrimRight)),
        "normalisepath" | "normalizepath" => Ok(Arc::new(NormalizePath)),
        "normalisepathwin" | "normalizepathwin" => Ok(Arc::new(NormalizePathWin)),
        "removecomments" => Ok(Arc::new(RemoveComments)),
        "replacecomments" => Ok(Arc::new(ReplaceComments)),
        "removecommentschar" => Ok(Arc::new(RemoveCommentsChar)),
        "cmdline" => Ok(Arc::new(CmdLine)),

        // Digests
        "md5" => Ok(Arc::new(Md5)),
        "sha1" => Ok(Arc::new(Sha1)),

        // Special
        "length" => Ok(Arc::new(Length)),
        "none" => Ok(Arc::new(NoneTransform)),

        _ => Err(Error::UnknownTransformation {
            name: name.to_string(),
        }),
    }
}

/// Identity transformation. Observing `none` during pipeline assembly
/// clears the accumulated list; as a standalone it does nothing.
pub struct NoneTransform;

impl Transformation for NoneTransform {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(input)
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Replaces the value with its decimal byte length.
pub struct Length;

impl Transformation for Length {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        Cow::Owned(input.len().to_string())
    }

    fn name(&self) -> &'static str {
        "length"
    }
}
