//! SQL injection detection.
//!
//! The tokenizer folds input into a string of token-kind characters:
//!
//! | kind | meaning |
//! |---|---|
//! | `s` | string literal |
//! | `1` | numeric literal |
//! | `k` | SQL keyword |
//! | `f` | risky function call |
//! | `n` | bareword |
//! | `v` | variable (`@x`, `@@version`) |
//! | `o` | operator / comparison |
//! | `&` | logical connective (AND/OR/NOT, `&&`, `\|\|`) |
//! | `c` | comment |
//! | `;` | statement separator |
//! | `(`/`)` | grouping |
//!
//! Injection shapes are then recognized on the fingerprint, which keeps
//! the detector independent of keyword casing, whitespace and operand
//! spelling.

use once_cell::sync::Lazy;
use std::collections::HashSet;

static KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "select", "insert", "update", "delete", "drop", "truncate", "alter", "create", "union",
        "from", "where", "into", "values", "set", "table", "database", "exec", "execute",
        "having", "group", "order", "limit", "offset", "join", "case", "when", "then", "else",
        "declare", "grant", "revoke", "distinct", "waitfor", "shutdown", "like", "between",
        "exists", "all", "any",
    ]
    .into_iter()
    .collect()
});

static LOGIC_WORDS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["and", "or", "not", "xor"].into_iter().collect());

static RISKY_FUNCTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "sleep", "benchmark", "load_file", "extractvalue", "updatexml", "char", "chr", "concat",
        "group_concat", "substring", "substr", "mid", "ascii", "hex", "unhex", "version",
        "current_user", "pg_sleep", "dbms_pipe", "utl_http", "xp_cmdshell", "ifnull",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone)]
struct Token {
    kind: char,
    text: String,
}

/// Tokenize one evaluation context.
fn tokenize(input: &str) -> Vec<Token> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    let push = |tokens: &mut Vec<Token>, kind: char, text: &str| {
        tokens.push(Token {
            kind,
            text: text.to_string(),
        });
    };

    while i < bytes.len() {
        let c = bytes[i] as char;

        // whitespace
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        // comments
        if c == '-' && bytes.get(i + 1) == Some(&b'-') {
            push(&mut tokens, 'c', &input[i..]);
            break;
        }
        if c == '#' {
            push(&mut tokens, 'c', &input[i..]);
            break;
        }
        if c == '/' && bytes.get(i + 1) == Some(&b'*') {
            let end = input[i + 2..].find("*/").map(|p| i + 2 + p + 2);
            match end {
                Some(end) => {
                    push(&mut tokens, 'c', &input[i..end]);
                    i = end;
                    continue;
                }
                None => {
                    push(&mut tokens, 'c', &input[i..]);
                    break;
                }
            }
        }

        // string literals (backslash and doubled-quote escapes)
        if c == '\'' || c == '"' {
            let quote = c;
            let mut j = i + 1;
            while j < bytes.len() {
                let b = bytes[j] as char;
                if b == '\\' {
                    j += 2;
                    continue;
                }
                if b == quote {
                    if bytes.get(j + 1) == Some(&(quote as u8)) {
                        j += 2;
                        continue;
                    }
                    break;
                }
                j += 1;
            }
            let end = (j + 1).min(bytes.len());
            push(&mut tokens, 's', &input[i..end]);
            i = end;
            continue;
        }

        // numbers (including hex)
        if c.is_ascii_digit() {
            let mut j = i + 1;
            if c == '0' && matches!(bytes.get(i + 1), Some(b'x') | Some(b'X')) {
                j = i + 2;
                while j < bytes.len() && bytes[j].is_ascii_hexdigit() {
                    j += 1;
                }
            } else {
                while j < bytes.len()
                    && ((bytes[j] as char).is_ascii_digit() || bytes[j] == b'.')
                {
                    j += 1;
                }
            }
            push(&mut tokens, '1', &input[i..j]);
            i = j;
            continue;
        }

        // variables
        if c == '@' {
            let mut j = i + 1;
            while j < bytes.len()
                && ((bytes[j] as char).is_ascii_alphanumeric() || bytes[j] == b'_' || bytes[j] == b'@')
            {
                j += 1;
            }
            push(&mut tokens, 'v', &input[i..j]);
            i = j;
            continue;
        }

        // words
        if c.is_ascii_alphabetic() || c == '_' {
            let mut j = i + 1;
            while j < bytes.len() && ((bytes[j] as char).is_ascii_alphanumeric() || bytes[j] == b'_')
            {
                j += 1;
            }
            let word = &input[i..j];
            let lower = word.to_ascii_lowercase();
            let next_nonspace = bytes[j..]
                .iter()
                .find(|b| !b.is_ascii_whitespace())
                .copied();
            let kind = if LOGIC_WORDS.contains(lower.as_str()) {
                '&'
            } else if RISKY_FUNCTIONS.contains(lower.as_str()) && next_nonspace == Some(b'(') {
                'f'
            } else if KEYWORDS.contains(lower.as_str()) {
                'k'
            } else {
                'n'
            };
            push(&mut tokens, kind, word);
            i = j;
            continue;
        }

        // punctuation and operators
        match c {
            ';' => push(&mut tokens, ';', ";"),
            '(' => push(&mut tokens, '(', "("),
            ')' => push(&mut tokens, ')', ")"),
            ',' => push(&mut tokens, ',', ","),
            '&' | '|' => {
                if bytes.get(i + 1) == Some(&(c as u8)) {
                    push(&mut tokens, '&', &input[i..i + 2]);
                    i += 2;
                    continue;
                }
                push(&mut tokens, 'o', &input[i..i + 1]);
            }
            '=' | '<' | '>' | '!' | '+' | '-' | '*' | '/' | '%' | '^' | '~' => {
                push(&mut tokens, 'o', &input[i..i + 1]);
            }
            _ => {}
        }
        i += 1;
    }

    tokens
}

fn fingerprint_of(tokens: &[Token]) -> String {
    tokens.iter().map(|t| t.kind).take(16).collect()
}

/// Whether a fingerprint (plus the token texts) spells an injection.
fn is_injection(tokens: &[Token]) -> bool {
    if tokens.len() < 2 {
        return false;
    }
    let fp = fingerprint_of(tokens);

    // tautology: logic connective joining two operands with a comparison
    // (`' OR '1'='1`, `1 OR 1=1`, `OR 1=1`)
    let value = |c: char| matches!(c, 's' | '1' | 'n' | 'v');
    let chars: Vec<char> = fp.chars().collect();
    for w in chars.windows(4) {
        if w[0] == '&' && value(w[1]) && w[2] == 'o' && value(w[3]) {
            return true;
        }
    }
    // trailing bare tautology (`' OR '1`, `1 OR 1`); literals only, so
    // prose like "terms and conditions" stays clean
    let literal = |c: char| matches!(c, 's' | '1' | 'v');
    for w in chars.windows(3) {
        if literal(w[0]) && w[1] == '&' && literal(w[2]) {
            return true;
        }
    }

    // stacked query: statement separator followed by a keyword
    if fp.contains(";k") || fp.contains(";f") {
        return true;
    }

    // UNION ... SELECT
    let mut saw_union = false;
    for t in tokens {
        if t.kind == 'k' {
            let lower = t.text.to_ascii_lowercase();
            if lower == "union" {
                saw_union = true;
            } else if saw_union && lower == "select" {
                return true;
            }
        }
    }

    // comment truncation after live tokens (`admin'--`)
    if let Some(pos) = chars.iter().position(|&c| c == 'c') {
        if pos >= 1 {
            return true;
        }
    }

    // risky function call with at least one more token around it
    if fp.contains('f') && tokens.len() >= 2 {
        return true;
    }

    false
}

/// Fingerprint of the context that detected an injection, if any.
pub fn sqli_fingerprint(input: &str) -> Option<String> {
    if input.len() < 3 {
        return None;
    }

    // as-is, then as a continuation of a quoted string
    let single = format!("'{}", input);
    let double = format!("\"{}", input);
    for context in [input, single.as_str(), double.as_str()] {
        let tokens = tokenize(context);
        if is_injection(&tokens) {
            return Some(fingerprint_of(&tokens));
        }
    }
    None
}

/// Whether the input looks like SQL injection.
pub fn is_sqli(input: &str) -> bool {
    sqli_fingerprint(input).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_kinds() {
        let fp = fingerprint_of(&tokenize("1 OR 1=1"));
        assert_eq!(fp, "1&1o1");
    }

    #[test]
    fn test_tokenize_string_with_escape() {
        let tokens = tokenize(r"'a\'b' x");
        assert_eq!(tokens[0].kind, 's');
        assert_eq!(tokens[1].kind, 'n');
    }

    #[test]
    fn test_tautology_detection() {
        assert!(is_sqli("1 OR 1=1"));
        assert!(is_sqli("' OR '1'='1"));
        assert!(is_sqli("x' AND 'a'='a"));
        assert!(is_sqli("admin' OR 1=1--"));
    }

    #[test]
    fn test_stacked_query() {
        assert!(is_sqli("1; DROP TABLE users"));
        assert!(is_sqli("x'; DELETE FROM logs--"));
    }

    #[test]
    fn test_union_select() {
        assert!(is_sqli("1 UNION SELECT username, password FROM users"));
        assert!(is_sqli("-1 union all select null,null"));
    }

    #[test]
    fn test_comment_truncation() {
        assert!(is_sqli("admin'--"));
        assert!(is_sqli("admin'#"));
    }

    #[test]
    fn test_risky_function() {
        assert!(is_sqli("1 AND sleep(5)"));
        assert!(is_sqli("extractvalue(1,version())"));
    }

    #[test]
    fn test_benign_inputs() {
        assert!(!is_sqli("hello"));
        assert!(!is_sqli("a plain sentence with words"));
        assert!(!is_sqli("O'Brien"));
        assert!(!is_sqli("price is 100"));
        assert!(!is_sqli("ab"));
    }

    #[test]
    fn test_fingerprint_reported() {
        let fp = sqli_fingerprint("1 OR 1=1").unwrap();
        assert_eq!(fp, "1&1o1");
    }
}
