//! Configuration parser.
//!
//! Three syntactic planes share one grammar:
//!
//! - configuration directives setting scalar engine flags
//!   (`SecRuleEngine`, `SecRequestBodyLimit`, ...)
//! - rules (`SecRule variables "operator" "actions"`, `SecAction`,
//!   `SecRuleScript`, `SecMarker`)
//! - exception overlays (`SecRuleRemoveBy*`, `SecRuleUpdateTargetBy*`,
//!   `SecRuleUpdateActionById`) and `SecDefaultAction`
//!
//! The parser produces a directive list; it performs no ruleset mutation
//! itself. `Include` is the one driver concern handled here, since file
//! expansion must happen while source locations are still known.

mod action;
mod directive;
mod lexer;
mod macro_string;
mod operator;
mod variable;

pub use action::{
    parse_actions, Action, ActionKind, AllowScope, ApplicationTime, BodyProcessor, ControlAction,
    DataAction, DisruptiveAction, FlowAction, LoggingAction, MetadataAction, RuleEngineMode,
    SetVarSpec, SetVarValue,
};
pub use directive::{ActionDirective, Directive, RuleDirective, ScriptDirective};
pub use lexer::{Lexer, Token, TokenKind};
pub use macro_string::{RunTimeString, Segment};
pub use operator::{parse_operator, OperatorName, OperatorSpec};
pub use variable::{
    parse_update_targets, parse_variables, KeyExclusion, Selection, TargetUpdate, VariableName,
    VariableSpec,
};

use crate::error::{Error, Result, SourceLocation};
use std::path::Path;

/// Directives accepted without effect, for compatibility with legacy
/// configurations.
const COMPAT_ACCEPTED: &[&str] = &["seccollectiontimeout"];

/// Recognized directives that are deliberately not implemented; loading
/// them is an error that names the feature.
const UNSUPPORTED: &[(&str, &str)] = &[
    (
        "secstreaminbodyinspection",
        "streaming request body inspection is not implemented",
    ),
    (
        "secstreamoutbodyinspection",
        "streaming response body inspection is not implemented",
    ),
];

/// Parser for rule configuration files.
pub struct Parser {
    directives: Vec<Directive>,
    location: SourceLocation,
}

impl Parser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self {
            directives: Vec::new(),
            location: SourceLocation::default(),
        }
    }

    /// Parse a configuration string.
    pub fn parse(&mut self, input: &str) -> Result<()> {
        self.parse_with_location(input, None)
    }

    /// Parse a configuration string, attributing errors to a file.
    pub fn parse_with_location(&mut self, input: &str, file: Option<&Path>) -> Result<()> {
        let saved = self.location.clone();
        self.location.file = file.map(|p| p.to_path_buf());
        self.location.line = 1;
        self.location.column = 1;

        let result = self.parse_inner(input);

        self.location = saved;
        result
    }

    fn parse_inner(&mut self, input: &str) -> Result<()> {
        let mut lexer = Lexer::new(input);

        while let Some(token) = lexer.next_token() {
            self.location.line = token.line;
            self.location.column = token.column;

            match token.kind {
                TokenKind::Directive(name) => {
                    let directive = self.parse_directive(&name, &mut lexer)?;
                    if let Some(directive) = directive {
                        self.directives.push(directive);
                    }
                }
                TokenKind::Comment | TokenKind::Newline => {}
                other => {
                    return Err(Error::parse(
                        format!("unexpected token: {:?}", other),
                        self.location.to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Parse a configuration file.
    pub fn parse_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::RuleFileLoad {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.parse_with_location(&content, Some(path))
    }

    /// Parse all files matching a glob pattern.
    pub fn parse_glob(&mut self, pattern: &str) -> Result<()> {
        let paths = glob::glob(pattern)
            .map_err(|e| Error::parse(format!("invalid glob pattern: {}", e), pattern))?;

        let mut seen = false;
        for entry in paths {
            match entry {
                Ok(path) => {
                    if path.is_file() {
                        seen = true;
                        self.parse_file(&path)?;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "error reading glob entry");
                }
            }
        }

        if !seen && !pattern.contains(['*', '?', '[']) {
            // A literal path that matched nothing is a configuration bug.
            return Err(Error::RuleFileLoad {
                path: pattern.into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }

        Ok(())
    }

    /// Consume the parser, yielding the directives in load order.
    pub fn into_directives(self) -> Vec<Directive> {
        self.directives
    }

    /// The directives parsed so far.
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    fn parse_directive(&mut self, name: &str, lexer: &mut Lexer) -> Result<Option<Directive>> {
        let lower = name.to_ascii_lowercase();

        if let Some((feature, message)) = UNSUPPORTED.iter().find(|(d, _)| *d == lower) {
            return Err(Error::unsupported(*feature, *message));
        }
        if COMPAT_ACCEPTED.contains(&lower.as_str()) {
            // Still validated: the argument must be numeric.
            if lower == "seccollectiontimeout" {
                let value = self.expect_word(lexer, "SecCollectionTimeout seconds")?;
                let seconds: u64 = value.parse().map_err(|_| {
                    Error::parse(
                        format!("invalid SecCollectionTimeout value '{}'", value),
                        self.location.to_string(),
                    )
                })?;
                return Ok(Some(Directive::CollectionTimeout(seconds)));
            }
            self.skip_line(lexer);
            return Ok(None);
        }

        let directive = match lower.as_str() {
            "secrule" => self.parse_secrule(lexer)?,
            "secaction" => {
                let actions_str = self.expect_quoted(lexer, "SecAction actions")?;
                Directive::ActionRule(ActionDirective {
                    actions: parse_actions(&actions_str)?,
                    location: self.location.clone(),
                })
            }
            "secrulescript" => {
                let path = self.expect_word(lexer, "SecRuleScript path")?;
                let actions_str = self.expect_quoted(lexer, "SecRuleScript actions")?;
                Directive::ScriptRule(ScriptDirective {
                    path: self.resolve_path(&path),
                    actions: parse_actions(&actions_str)?,
                    location: self.location.clone(),
                })
            }
            "secmarker" => Directive::Marker(self.expect_word(lexer, "SecMarker label")?),
            "secdefaultaction" => {
                let actions_str = self.expect_quoted(lexer, "SecDefaultAction actions")?;
                Directive::DefaultAction {
                    actions: parse_actions(&actions_str)?,
                    location: self.location.clone(),
                }
            }
            "secruleengine" => {
                let mode_str = self.expect_word(lexer, "SecRuleEngine mode")?;
                let mode = RuleEngineMode::parse(&mode_str).ok_or_else(|| {
                    Error::parse(
                        format!("invalid SecRuleEngine mode: {}", mode_str),
                        self.location.to_string(),
                    )
                })?;
                Directive::EngineMode(mode)
            }
            "secrequestbodyaccess" => {
                Directive::RequestBodyAccess(self.expect_on_off(lexer, "SecRequestBodyAccess")?)
            }
            "secresponsebodyaccess" => {
                Directive::ResponseBodyAccess(self.expect_on_off(lexer, "SecResponseBodyAccess")?)
            }
            "secrequestbodylimit" => {
                Directive::RequestBodyLimit(self.expect_number(lexer, "SecRequestBodyLimit")?)
            }
            "secrequestbodynofileslimit" => Directive::RequestBodyNoFilesLimit(
                self.expect_number(lexer, "SecRequestBodyNoFilesLimit")?,
            ),
            "secresponsebodylimit" => {
                Directive::ResponseBodyLimit(self.expect_number(lexer, "SecResponseBodyLimit")?)
            }
            "secargumentseparator" => {
                let sep = self.expect_word(lexer, "SecArgumentSeparator")?;
                let mut chars = sep.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Directive::ArgumentSeparator(c),
                    _ => {
                        return Err(Error::parse(
                            "SecArgumentSeparator takes a single character",
                            self.location.to_string(),
                        ));
                    }
                }
            }
            "seccomponentsignature" => {
                Directive::ComponentSignature(self.expect_word(lexer, "SecComponentSignature")?)
            }
            "secdebuglog" => {
                Directive::DebugLog(self.expect_word(lexer, "SecDebugLog path")?.into())
            }
            "secdebugloglevel" => {
                let level = self.expect_number(lexer, "SecDebugLogLevel")? as u64;
                if level > 9 {
                    return Err(Error::parse(
                        format!("SecDebugLogLevel {} out of range 0-9", level),
                        self.location.to_string(),
                    ));
                }
                Directive::DebugLogLevel(level as u8)
            }
            "secauditengine" => {
                let mode = self.expect_word(lexer, "SecAuditEngine mode")?;
                match mode.to_ascii_lowercase().as_str() {
                    "on" | "off" | "relevantonly" => Directive::AuditEngine(mode),
                    _ => {
                        return Err(Error::parse(
                            format!("invalid SecAuditEngine mode: {}", mode),
                            self.location.to_string(),
                        ));
                    }
                }
            }
            "secauditlog" => {
                Directive::AuditLog(self.expect_word(lexer, "SecAuditLog path")?.into())
            }
            "secauditlogparts" => {
                Directive::AuditLogParts(self.expect_word(lexer, "SecAuditLogParts")?)
            }
            "secgeolookupdb" => {
                let path = self.expect_word(lexer, "SecGeoLookupDb path")?;
                Directive::GeoLookupDb(self.resolve_path(&path))
            }
            "secunicodemapfile" => {
                let path = self.expect_word(lexer, "SecUnicodeMapFile path")?;
                let code_page = match self.peek_word(lexer) {
                    Some(word) => Some(word.parse().map_err(|_| {
                        Error::parse(
                            format!("invalid code page '{}'", word),
                            self.location.to_string(),
                        )
                    })?),
                    None => None,
                };
                Directive::UnicodeMapFile {
                    path: self.resolve_path(&path),
                    code_page,
                }
            }
            "secxmlexternalentity" => {
                Directive::XmlExternalEntity(self.expect_on_off(lexer, "SecXmlExternalEntity")?)
            }
            "sectmpdir" => Directive::TmpDir(self.expect_word(lexer, "SecTmpDir path")?.into()),
            "secuploaddir" => {
                Directive::UploadDir(self.expect_word(lexer, "SecUploadDir path")?.into())
            }
            "secwebappid" => Directive::WebAppId(self.expect_word(lexer, "SecWebAppId")?),
            "secpcrematchlimit" | "secpcrematchlimitrecursion" => {
                Directive::PcreMatchLimit(self.expect_number(lexer, "SecPcreMatchLimit")? as u64)
            }
            "secruleremovebyid" => {
                let ids_str = self.rest_of_line(lexer);
                let ranges = action::parse_id_ranges(&ids_str).ok_or_else(|| {
                    Error::parse(
                        format!("invalid rule id list '{}'", ids_str),
                        self.location.to_string(),
                    )
                })?;
                Directive::RemoveById(ranges)
            }
            "secruleremovebytag" => {
                Directive::RemoveByTag(self.expect_word(lexer, "SecRuleRemoveByTag pattern")?)
            }
            "secruleremovebymsg" => {
                Directive::RemoveByMsg(self.expect_word(lexer, "SecRuleRemoveByMsg pattern")?)
            }
            "secruleupdatetargetbyid" => {
                let ids_str = self.expect_word(lexer, "SecRuleUpdateTargetById id")?;
                let ids = action::parse_id_ranges(&ids_str).ok_or_else(|| {
                    Error::parse(
                        format!("invalid rule id list '{}'", ids_str),
                        self.location.to_string(),
                    )
                })?;
                let targets_str = self.expect_quoted(lexer, "SecRuleUpdateTargetById targets")?;
                Directive::UpdateTargetById {
                    ids,
                    targets: parse_update_targets(&targets_str)?,
                }
            }
            "secruleupdatetargetbytag" => {
                let tag = self.expect_word(lexer, "SecRuleUpdateTargetByTag tag")?;
                let targets_str = self.expect_quoted(lexer, "SecRuleUpdateTargetByTag targets")?;
                Directive::UpdateTargetByTag {
                    tag,
                    targets: parse_update_targets(&targets_str)?,
                }
            }
            "secruleupdatetargetbymsg" => {
                let msg = self.expect_word(lexer, "SecRuleUpdateTargetByMsg msg")?;
                let targets_str = self.expect_quoted(lexer, "SecRuleUpdateTargetByMsg targets")?;
                Directive::UpdateTargetByMsg {
                    msg,
                    targets: parse_update_targets(&targets_str)?,
                }
            }
            "secruleupdateactionbyid" => {
                let id: u64 = self
                    .expect_word(lexer, "SecRuleUpdateActionById id")?
                    .parse()
                    .map_err(|_| {
                        Error::parse("invalid rule id", self.location.to_string())
                    })?;
                let actions_str = self.expect_quoted(lexer, "SecRuleUpdateActionById actions")?;
                Directive::UpdateActionById {
                    id,
                    actions: parse_actions(&actions_str)?,
                }
            }
            "include" => {
                let path = self.expect_word(lexer, "Include path")?;
                let resolved = self.resolve_path(&path);
                let resolved_str = resolved.to_string_lossy().to_string();
                self.parse_glob(&resolved_str)?;
                Directive::Include(resolved)
            }
            _ => {
                return Err(Error::UnknownDirective {
                    name: name.to_string(),
                    location: self.location.to_string(),
                });
            }
        };

        Ok(Some(directive))
    }

    fn parse_secrule(&mut self, lexer: &mut Lexer) -> Result<Directive> {
        let variables_str = self.expect_word_or_quoted(lexer, "SecRule variables")?;
        let variables = parse_variables(&variables_str)
            .map_err(|e| self.at_location(e))?;

        let operator_str = self.expect_quoted(lexer, "SecRule operator")?;
        let operator = parse_operator(&operator_str).map_err(|e| self.at_location(e))?;

        // Actions are optional: a chained rule tail may carry none.
        let actions = if self.peek_quoted(lexer) {
            let actions_str = self.expect_quoted(lexer, "SecRule actions")?;
            parse_actions(&actions_str).map_err(|e| self.at_location(e))?
        } else {
            Vec::new()
        };

        Ok(Directive::Rule(RuleDirective {
            variables,
            operator,
            actions,
            location: self.location.clone(),
        }))
    }

    /// Re-wrap location-less sub-parser errors with the directive position.
    fn at_location(&self, error: Error) -> Error {
        match error {
            Error::Parse { message, location } if location.is_empty() => Error::Parse {
                message,
                location: self.location.to_string(),
            },
            other => other,
        }
    }

    /// Resolve a path relative to the including file when possible.
    fn resolve_path(&self, path: &str) -> std::path::PathBuf {
        if !Path::new(path).is_absolute() {
            if let Some(parent) = self.location.file.as_ref().and_then(|f| f.parent()) {
                let candidate = parent.join(path);
                if candidate.exists() {
                    return candidate;
                }
            }
        }
        path.into()
    }

    fn expect_word(&mut self, lexer: &mut Lexer, context: &str) -> Result<String> {
        self.expect_word_or_quoted(lexer, context)
    }

    fn expect_word_or_quoted(&mut self, lexer: &mut Lexer, context: &str) -> Result<String> {
        lexer.skip_whitespace();
        match lexer.next_token() {
            Some(token) => match token.kind {
                TokenKind::Word(s) | TokenKind::QuotedString(s) => Ok(s),
                other => Err(Error::parse(
                    format!("expected {} but got {:?}", context, other),
                    self.location.to_string(),
                )),
            },
            None => Err(Error::parse(
                format!("expected {} but got end of input", context),
                self.location.to_string(),
            )),
        }
    }

    fn expect_quoted(&mut self, lexer: &mut Lexer, context: &str) -> Result<String> {
        lexer.skip_whitespace();
        match lexer.next_token() {
            Some(token) => match token.kind {
                TokenKind::QuotedString(s) => Ok(s),
                other => Err(Error::parse(
                    format!("expected quoted {} but got {:?}", context, other),
                    self.location.to_string(),
                )),
            },
            None => Err(Error::parse(
                format!("expected quoted {} but got end of input", context),
                self.location.to_string(),
            )),
        }
    }

    fn expect_on_off(&mut self, lexer: &mut Lexer, directive: &str) -> Result<bool> {
        let value = self.expect_word(lexer, directive)?;
        match value.to_ascii_lowercase().as_str() {
            "on" => Ok(true),
            "off" => Ok(false),
            _ => Err(Error::parse(
                format!("invalid {} value: {} (expected On/Off)", directive, value),
                self.location.to_string(),
            )),
        }
    }

    fn expect_number(&mut self, lexer: &mut Lexer, directive: &str) -> Result<usize> {
        let value = self.expect_word(lexer, directive)?;
        value.parse().map_err(|_| {
            Error::parse(
                format!("invalid {} value: {}", directive, value),
                self.location.to_string(),
            )
        })
    }

    fn peek_quoted(&self, lexer: &mut Lexer) -> bool {
        lexer.skip_whitespace();
        lexer.peek().map(|c| c == '"' || c == '\'').unwrap_or(false)
    }

    /// A word on the same line, if any.
    fn peek_word(&mut self, lexer: &mut Lexer) -> Option<String> {
        lexer.skip_whitespace();
        match lexer.peek() {
            Some('\n') | None => None,
            _ => match lexer.next_token() {
                Some(Token {
                    kind: TokenKind::Word(s),
                    ..
                }) => Some(s),
                _ => None,
            },
        }
    }

    /// Collect the remaining words on the line, space-joined.
    fn rest_of_line(&mut self, lexer: &mut Lexer) -> String {
        let mut words = Vec::new();
        loop {
            lexer.skip_whitespace();
            match lexer.peek() {
                Some('\n') | None => break,
                _ => match lexer.next_token() {
                    Some(Token {
                        kind: TokenKind::Word(s) | TokenKind::QuotedString(s),
                        ..
                    }) => words.push(s),
                    _ => break,
                },
            }
        }
        words.join(" ")
    }

    fn skip_line(&mut self, lexer: &mut Lexer) {
        while let Some(token) = lexer.next_token() {
            if matches!(token.kind, TokenKind::Newline) {
                break;
            }
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(input: &str) -> Directive {
        let mut parser = Parser::new();
        parser.parse(input).unwrap();
        let mut directives = parser.into_directives();
        assert_eq!(directives.len(), 1, "expected one directive");
        directives.remove(0)
    }

    #[test]
    fn test_parse_simple_rule() {
        match parse_one(r#"SecRule REQUEST_URI "@contains /admin" "id:1,phase:1,deny""#) {
            Directive::Rule(rule) => {
                assert_eq!(rule.variables.len(), 1);
                assert_eq!(rule.variables[0].name, VariableName::RequestUri);
                assert_eq!(rule.operator.name, OperatorName::Contains);
            }
            other => panic!("expected rule, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_engine_mode() {
        assert!(matches!(
            parse_one("SecRuleEngine DetectionOnly"),
            Directive::EngineMode(RuleEngineMode::DetectionOnly)
        ));
    }

    #[test]
    fn test_parse_default_action() {
        match parse_one(r#"SecDefaultAction "phase:2,log,deny,status:403""#) {
            Directive::DefaultAction { actions, .. } => assert_eq!(actions.len(), 4),
            other => panic!("expected default action, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_remove_by_id_ranges() {
        match parse_one("SecRuleRemoveById 2 100-200") {
            Directive::RemoveById(ranges) => assert_eq!(ranges, vec![(2, 2), (100, 200)]),
            other => panic!("expected remove, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_update_target_by_id() {
        match parse_one(r#"SecRuleUpdateTargetById 958895 "!ARGS:email""#) {
            Directive::UpdateTargetById { ids, targets } => {
                assert_eq!(ids, vec![(958895, 958895)]);
                assert!(targets.additions.is_empty());
                assert_eq!(targets.exclusions.len(), 1);
            }
            other => panic!("expected update target, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_directive_is_error() {
        let mut parser = Parser::new();
        assert!(matches!(
            parser.parse("SecBogusDirective On"),
            Err(Error::UnknownDirective { .. })
        ));
    }

    #[test]
    fn test_unsupported_directive_is_targeted_error() {
        let mut parser = Parser::new();
        assert!(matches!(
            parser.parse("SecStreamInBodyInspection On"),
            Err(Error::Unsupported { .. })
        ));
    }

    #[test]
    fn test_collection_timeout_is_validated_and_accepted() {
        assert!(matches!(
            parse_one("SecCollectionTimeout 3600"),
            Directive::CollectionTimeout(3600)
        ));
        let mut parser = Parser::new();
        assert!(parser.parse("SecCollectionTimeout soon").is_err());
    }

    #[test]
    fn test_multi_line_rule() {
        let input = "SecRule ARGS \\\n    \"@rx attack\" \\\n    \"id:9,phase:2,deny\"";
        match parse_one(input) {
            Directive::Rule(rule) => assert_eq!(rule.actions.len(), 3),
            other => panic!("expected rule, got {:?}", other),
        }
    }

    #[test]
    fn test_chained_rule_without_actions() {
        let mut parser = Parser::new();
        parser
            .parse(
                r#"
SecRule REQUEST_METHOD "@streq POST" "id:4,phase:2,chain,deny"
SecRule ARGS:token "@streq bad" "t:none"
"#,
            )
            .unwrap();
        assert_eq!(parser.directives().len(), 2);
    }

    #[test]
    fn test_marker() {
        assert!(matches!(
            parse_one("SecMarker END_HOST_CHECK"),
            Directive::Marker(label) if label == "END_HOST_CHECK"
        ));
    }

    #[test]
    fn test_argument_separator() {
        assert!(matches!(
            parse_one("SecArgumentSeparator ;"),
            Directive::ArgumentSeparator(';')
        ));
    }
}
