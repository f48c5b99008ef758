//! Encoding and digest transformations.

use super::Transformation;
use base64::Engine;
use std::borrow::Cow;

/// Base64 encoding.
pub struct Base64Encode;

impl Transformation for Base64Encode {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        Cow::Owned(base64::engine::general_purpose::STANDARD.encode(input))
    }

    fn name(&self) -> &'static str {
        "base64Encode"
    }
}

/// Lowercase hex encoding.
pub struct HexEncode;

impl Transformation for HexEncode {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut out = String::with_capacity(input.len() * 2);
        for b in input.bytes() {
            out.push_str(&format!("{:02x}", b));
        }
        Cow::Owned(out)
    }

    fn name(&self) -> &'static str {
        "hexEncode"
    }
}

/// Percent-encoding of non-alphanumeric bytes.
pub struct UrlEncode;

impl Transformation for UrlEncode {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
        let encoded = utf8_percent_encode(input, NON_ALPHANUMERIC).to_string();
        if encoded == input {
            Cow::Borrowed(input)
        } else {
            Cow::Owned(encoded)
        }
    }

    fn name(&self) -> &'static str {
        "urlEncode"
    }
}

/// Re-encode non-ASCII characters as `%uXXXX` so rules written against
/// the escaped form keep matching. Characters outside the BMP pass
/// through unchanged.
pub struct Utf8ToUnicode;

impl Transformation for Utf8ToUnicode {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if input.is_ascii() {
            return Cow::Borrowed(input);
        }
        let mut out = String::with_capacity(input.len());
        for c in input.chars() {
            let code = c as u32;
            if code > 0x7f && code <= 0xffff {
                out.push_str(&format!("%u{:04x}", code));
            } else {
                out.push(c);
            }
        }
        Cow::Owned(out)
    }

    fn name(&self) -> &'static str {
        "utf8toUnicode"
    }
}

/// MD5 digest of the input, as raw-digest hex.
pub struct Md5;

impl Transformation for Md5 {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        use md5::{Digest, Md5 as Md5Hasher};
        let mut hasher = Md5Hasher::new();
        hasher.update(input.as_bytes());
        Cow::Owned(format!("{:x}", hasher.finalize()))
    }

    fn name(&self) -> &'static str {
        "md5"
    }
}

/// SHA-1 digest of the input, as raw-digest hex.
pub struct Sha1;

impl Transformation for Sha1 {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        use sha1::{Digest, Sha1 as Sha1Hasher};
        let mut hasher = Sha1Hasher::new();
        hasher.update(input.as_bytes());
        Cow::Owned(format!("{:x}", hasher.finalize()))
    }

    fn name(&self) -> &'static str {
        "sha1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_encode() {
        assert_eq!(Base64Encode.transform("hello"), "aGVsbG8=");
    }

    #[test]
    fn test_hex_encode() {
        assert_eq!(HexEncode.transform("AB"), "4142");
    }

    #[test]
    fn test_url_encode_decode_inverse() {
        use super::super::decode::UrlDecode;
        let samples = ["hello world", "a=b&c=d", "100%", "päth/税"];
        for s in samples {
            let encoded = UrlEncode.transform(s).into_owned();
            assert_eq!(UrlDecode.transform(&encoded), s);
        }
    }

    #[test]
    fn test_utf8_to_unicode() {
        assert_eq!(Utf8ToUnicode.transform("caf\u{e9}"), "caf%u00e9");
        assert_eq!(Utf8ToUnicode.transform("ascii"), "ascii");
    }

    #[test]
    fn test_md5() {
        assert_eq!(
            Md5.transform("hello"),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn test_sha1() {
        assert_eq!(
            Sha1.transform("hello"),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
    }
}
