//! Normalization transformations.

use super::Transformation;
use std::borrow::Cow;

/// ASCII lowercase.
pub struct Lowercase;

impl Transformation for Lowercase {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if input.chars().any(|c| c.is_uppercase()) {
            Cow::Owned(input.to_lowercase())
        } else {
            Cow::Borrowed(input)
        }
    }

    fn name(&self) -> &'static str {
        "lowercase"
    }
}

/// ASCII uppercase.
pub struct Uppercase;

impl Transformation for Uppercase {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if input.chars().any(|c| c.is_lowercase()) {
            Cow::Owned(input.to_uppercase())
        } else {
            Cow::Borrowed(input)
        }
    }

    fn name(&self) -> &'static str {
        "uppercase"
    }
}

/// Collapse whitespace runs into single spaces.
pub struct CompressWhitespace;

impl Transformation for CompressWhitespace {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut result = String::with_capacity(input.len());
        let mut last_was_space = false;
        let mut changed = false;

        for c in input.chars() {
            if c.is_whitespace() {
                if !last_was_space {
                    result.push(' ');
                    if c != ' ' {
                        changed = true;
                    }
                } else {
                    changed = true;
                }
                last_was_space = true;
            } else {
                result.push(c);
                last_was_space = false;
            }
        }

        if changed {
            Cow::Owned(result)
        } else {
            Cow::Borrowed(input)
        }
    }

    fn name(&self) -> &'static str {
        "compressWhitespace"
    }
}

/// Remove all whitespace.
pub struct RemoveWhitespace;

impl Transformation for RemoveWhitespace {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if input.chars().any(char::is_whitespace) {
            Cow::Owned(input.chars().filter(|c| !c.is_whitespace()).collect())
        } else {
            Cow::Borrowed(input)
        }
    }

    fn name(&self) -> &'static str {
        "removeWhitespace"
    }
}

/// Remove NUL bytes.
pub struct RemoveNulls;

impl Transformation for RemoveNulls {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if input.contains('\0') {
            Cow::Owned(input.replace('\0', ""))
        } else {
            Cow::Borrowed(input)
        }
    }

    fn name(&self) -> &'static str {
        "removeNulls"
    }
}

/// Replace NUL bytes with spaces.
pub struct ReplaceNulls;

impl Transformation for ReplaceNulls {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if input.contains('\0') {
            Cow::Owned(input.replace('\0', " "))
        } else {
            Cow::Borrowed(input)
        }
    }

    fn name(&self) -> &'static str {
        "replaceNulls"
    }
}

/// Trim leading and trailing whitespace.
pub struct Trim;

impl Transformation for Trim {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let trimmed = input.trim();
        if trimmed.len() == input.len() {
            Cow::Borrowed(input)
        } else {
            Cow::Owned(trimmed.to_string())
        }
    }

    fn name(&self) -> &'static str {
        "trim"
    }
}

/// Trim leading whitespace.
pub struct TrimLeft;

impl Transformation for TrimLeft {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let trimmed = input.trim_start();
        if trimmed.len() == input.len() {
            Cow::Borrowed(input)
        } else {
            Cow::Owned(trimmed.to_string())
        }
    }

    fn name(&self) -> &'static str {
        "trimLeft"
    }
}

/// Trim trailing whitespace.
pub struct TrimRight;

impl Transformation for TrimRight {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let trimmed = input.trim_end();
        if trimmed.len() == input.len() {
            Cow::Borrowed(input)
        } else {
            Cow::Owned(trimmed.to_string())
        }
    }

    fn name(&self) -> &'static str {
        "trimRight"
    }
}

/// Canonicalize a path: collapse separator runs, drop `.` segments,
/// resolve `..` without escaping the root. Output is never longer than
/// the input and the function is idempotent.
///
/// Relative paths that hit the root keep their `..` prefix literally; the
/// leading separator of absolute paths and the presence of a trailing
/// separator are preserved.
pub(crate) fn canonicalize_path(input: &str, win: bool) -> (String, bool) {
    if input.is_empty() {
        return (String::new(), false);
    }

    let is_sep = |c: char| c == '/' || (win && c == '\\');
    let absolute = input.chars().next().map(&is_sep).unwrap_or(false);
    let trailing = input.chars().last().map(&is_sep).unwrap_or(false);

    let mut stack: Vec<&str> = Vec::new();
    for segment in input.split(is_sep) {
        match segment {
            "" | "." => {}
            ".." => match stack.last() {
                Some(&"..") => stack.push(".."),
                Some(_) => {
                    stack.pop();
                }
                None => {
                    if !absolute {
                        stack.push("..");
                    }
                    // `..` at the root of an absolute path is dropped
                }
            },
            other => stack.push(other),
        }
    }

    let mut out = String::with_capacity(input.len());
    if absolute {
        out.push('/');
    }
    out.push_str(&stack.join("/"));
    if trailing && !stack.is_empty() {
        out.push('/');
    }

    let changed = out != input;
    (out, changed)
}

/// Unix-style path normalization.
pub struct NormalizePath;

impl Transformation for NormalizePath {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let (out, changed) = canonicalize_path(input, false);
        if changed {
            Cow::Owned(out)
        } else {
            Cow::Borrowed(input)
        }
    }

    fn name(&self) -> &'static str {
        "normalisePath"
    }
}

/// Windows-style path normalization: backslashes count as separators and
/// are rewritten to forward slashes.
pub struct NormalizePathWin;

impl Transformation for NormalizePathWin {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let (out, changed) = canonicalize_path(input, true);
        if changed {
            Cow::Owned(out)
        } else {
            Cow::Borrowed(input)
        }
    }

    fn name(&self) -> &'static str {
        "normalisePathWin"
    }
}

/// Remove C-style comments (`/* ... */`). An unterminated comment removes
/// everything after its opener.
pub struct RemoveComments;

impl Transformation for RemoveComments {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains("/*") {
            return Cow::Borrowed(input);
        }

        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        let mut in_comment = false;

        while let Some(c) = chars.next() {
            if in_comment {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    in_comment = false;
                }
            } else if c == '/' && chars.peek() == Some(&'*') {
                chars.next();
                in_comment = true;
            } else {
                result.push(c);
            }
        }

        Cow::Owned(result)
    }

    fn name(&self) -> &'static str {
        "removeComments"
    }
}

/// Replace each C-style comment with a single space.
pub struct ReplaceComments;

impl Transformation for ReplaceComments {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains("/*") {
            return Cow::Borrowed(input);
        }

        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        let mut in_comment = false;

        while let Some(c) = chars.next() {
            if in_comment {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    in_comment = false;
                    result.push(' ');
                }
            } else if c == '/' && chars.peek() == Some(&'*') {
                chars.next();
                in_comment = true;
            } else {
                result.push(c);
            }
        }
        if in_comment {
            result.push(' ');
        }

        Cow::Owned(result)
    }

    fn name(&self) -> &'static str {
        "replaceComments"
    }
}

/// Remove comment markers (`/*`, `*/`, `--`, `#`) without touching the
/// text between them.
pub struct RemoveCommentsChar;

impl Transformation for RemoveCommentsChar {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        let mut changed = false;

        while let Some(c) = chars.next() {
            match c {
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    changed = true;
                }
                '*' if chars.peek() == Some(&'/') => {
                    chars.next();
                    changed = true;
                }
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    changed = true;
                }
                '#' => changed = true,
                _ => result.push(c),
            }
        }

        if changed {
            Cow::Owned(result)
        } else {
            Cow::Borrowed(input)
        }
    }

    fn name(&self) -> &'static str {
        "removeCommentsChar"
    }
}

/// Shell command-line normalization: deletes escape characters, folds
/// delimiters to spaces, lowercases, compresses whitespace.
pub struct CmdLine;

impl Transformation for CmdLine {
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut result = String::with_capacity(input.len());
        let mut changed = false;

        for c in input.chars() {
            match c {
                ',' | ';' | '\'' | '"' | '`' => {
                    result.push(' ');
                    changed = true;
                }
                '^' | '\\' => {
                    changed = true;
                }
                c if c.is_ascii_uppercase() => {
                    result.push(c.to_ascii_lowercase());
                    changed = true;
                }
                _ => result.push(c),
            }
        }

        // Collapse runs and drop spaces before / and (
        let mut out = String::with_capacity(result.len());
        let mut pending_space = false;
        for c in result.trim().chars() {
            if c.is_whitespace() {
                pending_space = true;
                continue;
            }
            if pending_space {
                if c != '/' && c != '(' {
                    out.push(' ');
                }
                pending_space = false;
            }
            out.push(c);
        }

        if changed || out != input {
            Cow::Owned(out)
        } else {
            Cow::Borrowed(input)
        }
    }

    fn name(&self) -> &'static str {
        "cmdLine"
    }
}
