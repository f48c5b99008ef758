//! Decoding transformations.

use super::Transformation;
use base64::Engine;
use std::borrow::Cow;

/// Percent-decoding (`%41` → `A`, `+` → space).
pub struct UrlDecode;

impl Transformation for UrlDecode {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains('%') && !input.contains('+') {
            return Cow::Borrowed(input);
        }
        Cow::Owned(percent_decode(input, false))
    }

    fn name(&self) -> &'static str {
        "urlDecode"
    }
}

/// Percent-decoding with `%uXXXX` support.
pub struct UrlDecodeUni;

impl Transformation for UrlDecodeUni {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains('%') && !input.contains('+') {
            return Cow::Borrowed(input);
        }
        Cow::Owned(percent_decode(input, true))
    }

    fn name(&self) -> &'static str {
        "urlDecodeUni"
    }
}

/// Shared percent-decoder. Invalid escapes are copied through unchanged.
fn percent_decode(input: &str, unicode: bool) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'+' {
            out.push(b' ');
            i += 1;
        } else if b == b'%' {
            if unicode
                && i + 5 < bytes.len()
                && (bytes[i + 1] == b'u' || bytes[i + 1] == b'U')
                && bytes[i + 2..i + 6].iter().all(u8::is_ascii_hexdigit)
            {
                let hex = std::str::from_utf8(&bytes[i + 2..i + 6]).unwrap();
                let code = u32::from_str_radix(hex, 16).unwrap();
                let mut buf = [0u8; 4];
                if let Some(c) = char::from_u32(code) {
                    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                } else {
                    out.extend_from_slice(&bytes[i..i + 6]);
                }
                i += 6;
            } else if i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit()
            {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap();
                out.push(u8::from_str_radix(hex, 16).unwrap());
                i += 3;
            } else {
                out.push(b'%');
                i += 1;
            }
        } else {
            out.push(b);
            i += 1;
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Strict base64 decoding; non-base64 input passes through unchanged.
pub struct Base64Decode;

impl Transformation for Base64Decode {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        match base64::engine::general_purpose::STANDARD.decode(input) {
            Ok(bytes) => Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()),
            Err(_) => Cow::Borrowed(input),
        }
    }

    fn name(&self) -> &'static str {
        "base64Decode"
    }
}

/// Permissive base64 decoding: bytes outside the alphabet are discarded
/// before decoding.
pub struct Base64DecodeExt;

impl Transformation for Base64DecodeExt {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let filtered: String = input
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
            .collect();
        // Truncate to a whole number of quads; padding errors stay lossy
        let trimmed = filtered.trim_end_matches('=');
        let usable = &trimmed[..trimmed.len() - trimmed.len() % 4 + usable_tail(trimmed.len())];
        match base64::engine::general_purpose::STANDARD_NO_PAD.decode(usable) {
            Ok(bytes) => Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()),
            Err(_) => Cow::Borrowed(input),
        }
    }

    fn name(&self) -> &'static str {
        "base64DecodeExt"
    }
}

/// How many trailing chars past the last whole quad are decodable (2 or 3
/// form a final partial group; a single leftover char cannot decode).
fn usable_tail(len: usize) -> usize {
    match len % 4 {
        1 => 0,
        tail => tail,
    }
}

/// Hex decoding; odd-length or non-hex input passes through.
pub struct HexDecode;

impl Transformation for HexDecode {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if input.is_empty() || input.len() % 2 != 0 || !input.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Cow::Borrowed(input);
        }
        let bytes: Vec<u8> = input
            .as_bytes()
            .chunks(2)
            .map(|pair| {
                let hex = std::str::from_utf8(pair).unwrap();
                u8::from_str_radix(hex, 16).unwrap()
            })
            .collect();
        Cow::Owned(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn name(&self) -> &'static str {
        "hexDecode"
    }
}

/// HTML entity decoding (`&lt;`, `&#x3c;`, ...).
pub struct HtmlEntityDecode;

impl Transformation for HtmlEntityDecode {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains('&') {
            return Cow::Borrowed(input);
        }
        match html_escape::decode_html_entities(input) {
            Cow::Borrowed(_) => Cow::Borrowed(input),
            Cow::Owned(s) => Cow::Owned(s),
        }
    }

    fn name(&self) -> &'static str {
        "htmlEntityDecode"
    }
}

/// JavaScript escape decoding (`\xHH`, `\uHHHH`, `\n`, ...).
pub struct JsDecode;

impl Transformation for JsDecode {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains('\\') {
            return Cow::Borrowed(input);
        }

        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '\\' {
                result.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('v') => result.push('\u{0b}'),
                Some('f') => result.push('\u{0c}'),
                Some('b') => result.push('\u{08}'),
                Some('0') => result.push('\0'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some('\'') => result.push('\''),
                Some('x') => match take_hex(&mut chars, 2) {
                    Some(code) => push_code(&mut result, code, "\\x"),
                    None => result.push_str("\\x"),
                },
                Some('u') => match take_hex(&mut chars, 4) {
                    Some(code) => push_code(&mut result, code, "\\u"),
                    None => result.push_str("\\u"),
                },
                Some(other) => result.push(other),
                None => result.push('\\'),
            }
        }

        Cow::Owned(result)
    }

    fn name(&self) -> &'static str {
        "jsDecode"
    }
}

/// CSS escape decoding (`\HH...` up to six digits, optional trailing
/// whitespace).
pub struct CssDecode;

impl Transformation for CssDecode {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains('\\') {
            return Cow::Borrowed(input);
        }

        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '\\' {
                result.push(c);
                continue;
            }
            let mut hex = String::new();
            while hex.len() < 6 {
                match chars.peek() {
                    Some(h) if h.is_ascii_hexdigit() => hex.push(chars.next().unwrap()),
                    _ => break,
                }
            }
            if hex.is_empty() {
                // An escaped non-hex character decodes to itself
                if let Some(next) = chars.next() {
                    result.push(next);
                } else {
                    result.push('\\');
                }
                continue;
            }
            if matches!(chars.peek(), Some(' ') | Some('\t') | Some('\n')) {
                chars.next();
            }
            let code = u32::from_str_radix(&hex, 16).unwrap_or(0);
            match char::from_u32(code) {
                Some(decoded) => result.push(decoded),
                None => {
                    result.push('\\');
                    result.push_str(&hex);
                }
            }
        }

        Cow::Owned(result)
    }

    fn name(&self) -> &'static str {
        "cssDecode"
    }
}

/// ANSI C escape sequence decoding (`\n`, `\xHH`, octal `\NNN`).
pub struct EscapeSeqDecode;

impl Transformation for EscapeSeqDecode {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains('\\') {
            return Cow::Borrowed(input);
        }

        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '\\' {
                result.push(c);
                continue;
            }
            match chars.peek().copied() {
                Some('a') => {
                    chars.next();
                    result.push('\u{07}');
                }
                Some('b') => {
                    chars.next();
                    result.push('\u{08}');
                }
                Some('f') => {
                    chars.next();
                    result.push('\u{0c}');
                }
                Some('n') => {
                    chars.next();
                    result.push('\n');
                }
                Some('r') => {
                    chars.next();
                    result.push('\r');
                }
                Some('t') => {
                    chars.next();
                    result.push('\t');
                }
                Some('v') => {
                    chars.next();
                    result.push('\u{0b}');
                }
                Some('\\') | Some('?') | Some('\'') | Some('"') => {
                    result.push(chars.next().unwrap());
                }
                Some('x') => {
                    chars.next();
                    match take_hex(&mut chars, 2) {
                        Some(code) => push_code(&mut result, code, "\\x"),
                        None => result.push_str("\\x"),
                    }
                }
                Some(d) if ('0'..='7').contains(&d) => {
                    let mut code = 0u32;
                    let mut digits = 0;
                    while digits < 3 {
                        match chars.peek() {
                            Some(&o) if ('0'..='7').contains(&o) => {
                                code = code * 8 + o.to_digit(8).unwrap();
                                chars.next();
                                digits += 1;
                            }
                            _ => break,
                        }
                    }
                    push_code(&mut result, code & 0xff, "\\");
                }
                _ => result.push('\\'),
            }
        }

        Cow::Owned(result)
    }

    fn name(&self) -> &'static str {
        "escapeSeqDecode"
    }
}

fn take_hex(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, max: usize) -> Option<u32> {
    let mut hex = String::new();
    while hex.len() < max {
        match chars.peek() {
            Some(h) if h.is_ascii_hexdigit() => hex.push(chars.next().unwrap()),
            _ => break,
        }
    }
    if hex.is_empty() {
        None
    } else {
        u32::from_str_radix(&hex, 16).ok()
    }
}

fn push_code(result: &mut String, code: u32, prefix: &str) {
    match char::from_u32(code) {
        Some(c) => result.push(c),
        None => {
            result.push_str(prefix);
            result.push_str(&format!("{:x}", code));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_decode() {
        let t = UrlDecode;
        assert_eq!(t.transform("hello%20world"), "hello world");
        assert_eq!(t.transform("a+b"), "a b");
        assert_eq!(t.transform("bad%2"), "bad%2");
        assert_eq!(t.transform("plain"), "plain");
    }

    #[test]
    fn test_url_decode_uni() {
        let t = UrlDecodeUni;
        assert_eq!(t.transform("%u0041"), "A");
        assert_eq!(t.transform("%41"), "A");
        assert_eq!(t.transform("%uZZZZ"), "%uZZZZ");
    }

    #[test]
    fn test_base64_decode() {
        let t = Base64Decode;
        assert_eq!(t.transform("aGVsbG8="), "hello");
        assert_eq!(t.transform("not base64!"), "not base64!");
    }

    #[test]
    fn test_base64_decode_ext_ignores_foreign_bytes() {
        let t = Base64DecodeExt;
        assert_eq!(t.transform("aGVs bG8="), "hello");
        assert_eq!(t.transform("aGV\nsbG8="), "hello");
    }

    #[test]
    fn test_hex_decode() {
        let t = HexDecode;
        assert_eq!(t.transform("414243"), "ABC");
        assert_eq!(t.transform("41424"), "41424");
        assert_eq!(t.transform("wxyz"), "wxyz");
    }

    #[test]
    fn test_html_entity_decode() {
        let t = HtmlEntityDecode;
        assert_eq!(t.transform("&lt;script&gt;"), "<script>");
        assert_eq!(t.transform("&#60;"), "<");
        assert_eq!(t.transform("&#x3c;"), "<");
    }

    #[test]
    fn test_js_decode() {
        let t = JsDecode;
        assert_eq!(t.transform(r"\x3cscript\x3e"), "<script>");
        assert_eq!(t.transform(r"<"), "<");
        assert_eq!(t.transform(r"a\nb"), "a\nb");
    }

    #[test]
    fn test_css_decode() {
        let t = CssDecode;
        assert_eq!(t.transform(r"\3c script\3e "), "<script>");
        assert_eq!(t.transform(r"\61 lert"), "alert");
    }

    #[test]
    fn test_escape_seq_decode() {
        let t = EscapeSeqDecode;
        assert_eq!(t.transform(r"a\tb"), "a\tb");
        assert_eq!(t.transform(r"\x41"), "A");
        assert_eq!(t.transform(r"\101"), "A");
        assert_eq!(t.transform(r"\q"), r"\q");
    }
}
