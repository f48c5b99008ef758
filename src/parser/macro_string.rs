//! Macro-expanded strings (`%{VAR}` references).
//!
//! Operator arguments, `msg`/`logdata`/`tag` values, `setvar` right-hand
//! sides, redirect URLs and dynamic selector keys are all lexed once at
//! load time into a [`RunTimeString`]: a list of literal runs and variable
//! references expanded against the transaction at evaluation time.

/// One segment of a macro string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A literal run of characters.
    Literal(String),
    /// A `%{...}` reference, stored verbatim without the delimiters
    /// (e.g. `REQUEST_URI`, `tx.score`, `RULE.id`).
    Variable(String),
}

/// A string with `%{VAR}` references expanded at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunTimeString {
    segments: Vec<Segment>,
}

impl RunTimeString {
    /// Lex a raw string into literal and variable segments.
    ///
    /// An unterminated `%{` is kept as literal text; expansion never fails.
    pub fn parse(input: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = input;

        while let Some(pos) = rest.find("%{") {
            let after = &rest[pos + 2..];
            match after.find('}') {
                Some(end) => {
                    literal.push_str(&rest[..pos]);
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Variable(after[..end].to_string()));
                    rest = &after[end + 1..];
                }
                None => break,
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }

    /// Build a macro string holding a single literal.
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        let segments = if text.is_empty() {
            Vec::new()
        } else {
            vec![Segment::Literal(text)]
        };
        Self { segments }
    }

    /// Whether the string contains any variable reference.
    pub fn has_variables(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Variable(_)))
    }

    /// The literal text, if the string holds no variable references.
    pub fn as_literal(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [] => Some(""),
            [Segment::Literal(s)] => Some(s),
            _ => None,
        }
    }

    /// Expand against a variable lookup. References the lookup cannot
    /// resolve expand to the empty string.
    pub fn expand<F>(&self, mut lookup: F) -> String
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Variable(name) => {
                    if let Some(value) = lookup(name) {
                        out.push_str(&value);
                    }
                }
            }
        }
        out
    }

    /// Render for display: literals verbatim, references as `%{name}`.
    pub fn source_text(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Variable(name) => {
                    out.push_str("%{");
                    out.push_str(name);
                    out.push('}');
                }
            }
        }
        out
    }

    /// The segments of this string.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl std::fmt::Display for RunTimeString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source_text())
    }
}
