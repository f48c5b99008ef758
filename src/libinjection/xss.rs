//! Cross-site scripting detection.
//!
//! Input is first normalized (HTML entities, percent escapes, NULs,
//! whitespace tricks inside tags), then scanned for executable markup:
//! script-capable tags, event-handler attributes, and scriptable URL
//! schemes.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static SCRIPT_TAGS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "script", "iframe", "object", "embed", "applet", "base", "form", "svg", "math", "meta",
        "link", "style", "frame", "frameset", "layer", "bgsound", "xmp", "template", "portal",
        "marquee", "video", "audio",
    ]
    .into_iter()
    .collect()
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<\s*/?\s*([a-zA-Z][a-zA-Z0-9-]*)").unwrap());

static EVENT_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)[\s/<'"]on[a-z]{2,30}\s*="#).unwrap());

static SCHEME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:javascript|vbscript|livescript|mocha)\s*:").unwrap()
});

static CSS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:expression\s*\(|-moz-binding\s*:|behavior\s*:)").unwrap()
});

static DATA_HTML_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)data\s*:\s*text/html").unwrap());

/// Decode the encodings attackers use to smuggle markup past naive
/// filters.
fn normalize(input: &str) -> String {
    let mut out = html_escape::decode_html_entities(input).into_owned();

    if out.contains('%') {
        let decoded: Vec<u8> = {
            let bytes = out.as_bytes();
            let mut buf = Vec::with_capacity(bytes.len());
            let mut i = 0;
            while i < bytes.len() {
                if bytes[i] == b'%'
                    && i + 2 < bytes.len()
                    && bytes[i + 1].is_ascii_hexdigit()
                    && bytes[i + 2].is_ascii_hexdigit()
                {
                    let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap();
                    buf.push(u8::from_str_radix(hex, 16).unwrap());
                    i += 3;
                } else {
                    buf.push(bytes[i]);
                    i += 1;
                }
            }
            buf
        };
        out = String::from_utf8_lossy(&decoded).into_owned();
    }

    out.retain(|c| c != '\0');
    out
}

/// What triggered detection, if anything.
pub fn xss_signal(input: &str) -> Option<String> {
    // Fast path: nothing that could start markup or a scheme
    let lower = input.to_ascii_lowercase();
    if !lower.contains('<')
        && !lower.contains("script")
        && !lower.contains("on")
        && !lower.contains("expression")
        && !lower.contains("%3c")
        && !lower.contains("&lt")
        && !lower.contains("&#")
    {
        return None;
    }

    let normalized = normalize(input);

    for cap in TAG_RE.captures_iter(&normalized) {
        let tag = cap[1].to_ascii_lowercase();
        if SCRIPT_TAGS.contains(tag.as_str()) {
            return Some(format!("tag:{}", tag));
        }
    }

    if normalized.contains('<') {
        if let Some(m) = EVENT_ATTR_RE.find(&normalized) {
            return Some(format!("event:{}", m.as_str().trim().to_ascii_lowercase()));
        }
    }

    if let Some(m) = SCHEME_RE.find(&normalized) {
        return Some(format!(
            "scheme:{}",
            m.as_str().trim_end_matches(':').trim().to_ascii_lowercase()
        ));
    }

    if DATA_HTML_RE.is_match(&normalized) {
        return Some("scheme:data-text-html".to_string());
    }

    if CSS_RE.is_match(&normalized) {
        return Some("css-script".to_string());
    }

    None
}

/// Whether the input looks like an XSS payload.
pub fn is_xss(input: &str) -> bool {
    xss_signal(input).is_some()
}
