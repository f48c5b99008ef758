//! Variable selector parsing.
//!
//! A SecRule variable list is `|`-separated. Each item is one of:
//!
//! - `NAME` — a scalar or a whole collection
//! - `NAME:key` — a collection entry selected by key
//! - `NAME:/regex/` — collection entries whose key matches the regex
//! - `NAME:%{...}` — a dynamic key expanded per evaluation
//! - `&NAME[...]` — count of the selected entries
//! - `!NAME[...]` — an exclusion applied to sibling selectors
//!
//! Exclusions are collapsed at parse time: each non-exclusion selector of
//! the same collection remembers the excluded key predicate and skips
//! matching entries during resolution. Standalone exclusions contribute no
//! values of their own.

use super::macro_string::RunTimeString;
use crate::error::{Error, Result};
use regex::Regex;

/// A variable selector in a SecRule.
#[derive(Debug, Clone)]
pub struct VariableSpec {
    /// The variable name.
    pub name: VariableName,
    /// Optional selection within a collection.
    pub selection: Option<Selection>,
    /// Count mode (`&` prefix): emit one integer value equal to the number
    /// of selected entries.
    pub count: bool,
    /// Key predicates excluded from this selector's results.
    pub exclusions: Vec<KeyExclusion>,
}

/// Selection mode for collection variables.
#[derive(Debug, Clone)]
pub enum Selection {
    /// Static key selection (`ARGS:id`).
    Key(String),
    /// Regex key selection (`ARGS:/^user/`), compiled at load.
    Regex(Regex),
    /// Dynamic key (`TX:%{RULE.id}`), expanded per evaluation.
    Dynamic(RunTimeString),
}

/// An excluded key predicate attached to a sibling selector.
#[derive(Debug, Clone)]
pub enum KeyExclusion {
    /// Exact key (case-insensitive, matching the collection's key rules).
    Key(String),
    /// Regex over keys.
    Regex(Regex),
}

impl KeyExclusion {
    /// Whether a resolved entry key is excluded.
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyExclusion::Key(k) => k.eq_ignore_ascii_case(key),
            KeyExclusion::Regex(re) => re.is_match(key),
        }
    }
}

/// Variable names understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableName {
    // Request
    /// All arguments (query string and body combined).
    Args,
    /// Query-string arguments only.
    ArgsGet,
    /// Body arguments only.
    ArgsPost,
    /// Argument names.
    ArgsNames,
    /// Query-string argument names.
    ArgsGetNames,
    /// Body argument names.
    ArgsPostNames,
    /// Combined byte size of all argument names and values.
    ArgsCombinedSize,
    /// Request URI (path plus query string).
    RequestUri,
    /// Request URI exactly as received.
    RequestUriRaw,
    /// Request path.
    RequestFilename,
    /// Last path segment.
    RequestBasename,
    /// Full request line.
    RequestLine,
    /// HTTP method.
    RequestMethod,
    /// HTTP protocol version.
    RequestProtocol,
    /// Request headers.
    RequestHeaders,
    /// Request header names.
    RequestHeadersNames,
    /// Request cookies.
    RequestCookies,
    /// Request cookie names.
    RequestCookiesNames,
    /// Request body.
    RequestBody,
    /// Request body length in bytes.
    RequestBodyLength,
    /// Query string.
    QueryString,

    // Response
    /// Response status code.
    ResponseStatus,
    /// Response protocol.
    ResponseProtocol,
    /// Response headers.
    ResponseHeaders,
    /// Response header names.
    ResponseHeadersNames,
    /// Response body.
    ResponseBody,
    /// Response content type.
    ResponseContentType,
    /// Response content length.
    ResponseContentLength,

    // Connection
    /// Client IP address.
    RemoteAddr,
    /// Client port.
    RemotePort,
    /// Client hostname.
    RemoteHost,
    /// Authenticated remote user.
    RemoteUser,
    /// Server IP address.
    ServerAddr,
    /// Server port.
    ServerPort,
    /// Server name.
    ServerName,
    /// Authentication type.
    AuthType,

    // Collections
    /// Transaction-local collection.
    Tx,
    /// Persistent session collection.
    Session,
    /// Environment variables.
    Env,
    /// Persistent per-client-IP collection.
    Ip,
    /// Persistent global collection.
    Global,
    /// Persistent per-resource collection.
    Resource,
    /// Persistent per-user collection.
    User,
    /// GeoIP lookup results.
    Geo,
    /// Metadata of the currently evaluating rule.
    Rule,

    // Match state
    /// Value of the most recent variable match.
    MatchedVar,
    /// Values of all variable matches in the current phase.
    MatchedVars,
    /// Origin name of the most recent variable match.
    MatchedVarName,
    /// Origin names of all variable matches in the current phase.
    MatchedVarsNames,

    // Time
    /// Formatted local time (hh:mm:ss).
    Time,
    /// Seconds since the epoch.
    TimeEpoch,
    /// Day of month.
    TimeDay,
    /// Hour.
    TimeHour,
    /// Minute.
    TimeMin,
    /// Second.
    TimeSec,
    /// Day of week (0 = Sunday).
    TimeWday,
    /// Month (1-12).
    TimeMon,
    /// Four-digit year.
    TimeYear,

    // Uploads
    /// Uploaded file names.
    Files,
    /// Uploaded file sizes.
    FilesSizes,
    /// Uploaded file temporary paths.
    FilesTmpnames,
    /// Uploaded file field names.
    FilesNames,
    /// Combined size of uploaded files.
    FilesCombinedSize,

    // Misc
    /// Transaction unique id.
    UniqueId,
    /// Milliseconds since transaction creation.
    Duration,
    /// Highest severity recorded so far.
    HighestSeverity,
    /// Response status line.
    StatusLine,
    /// Full reconstructed request.
    FullRequest,
    /// Length of the full reconstructed request.
    FullRequestLength,
    /// Parsed XML body (requires an XML body processor).
    Xml,
}

impl VariableName {
    /// Parse a variable name.
    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "ARGS" => Some(Self::Args),
            "ARGS_GET" => Some(Self::ArgsGet),
            "ARGS_POST" => Some(Self::ArgsPost),
            "ARGS_NAMES" => Some(Self::ArgsNames),
            "ARGS_GET_NAMES" => Some(Self::ArgsGetNames),
            "ARGS_POST_NAMES" => Some(Self::ArgsPostNames),
            "ARGS_COMBINED_SIZE" => Some(Self::ArgsCombinedSize),
            "REQUEST_URI" => Some(Self::RequestUri),
            "REQUEST_URI_RAW" => Some(Self::RequestUriRaw),
            "REQUEST_FILENAME" => Some(Self::RequestFilename),
            "REQUEST_BASENAME" => Some(Self::RequestBasename),
            "REQUEST_LINE" => Some(Self::RequestLine),
            "REQUEST_METHOD" => Some(Self::RequestMethod),
            "REQUEST_PROTOCOL" => Some(Self::RequestProtocol),
            "REQUEST_HEADERS" => Some(Self::RequestHeaders),
            "REQUEST_HEADERS_NAMES" => Some(Self::RequestHeadersNames),
            "REQUEST_COOKIES" => Some(Self::RequestCookies),
            "REQUEST_COOKIES_NAMES" => Some(Self::RequestCookiesNames),
            "REQUEST_BODY" => Some(Self::RequestBody),
            "REQUEST_BODY_LENGTH" => Some(Self::RequestBodyLength),
            "QUERY_STRING" => Some(Self::QueryString),
            "RESPONSE_STATUS" => Some(Self::ResponseStatus),
            "RESPONSE_PROTOCOL" => Some(Self::ResponseProtocol),
            "RESPONSE_HEADERS" => Some(Self::ResponseHeaders),
            "RESPONSE_HEADERS_NAMES" => Some(Self::ResponseHeadersNames),
            "RESPONSE_BODY" => Some(Self::ResponseBody),
            "RESPONSE_CONTENT_TYPE" => Some(Self::ResponseContentType),
            "RESPONSE_CONTENT_LENGTH" => Some(Self::ResponseContentLength),
            "REMOTE_ADDR" => Some(Self::RemoteAddr),
            "REMOTE_PORT" => Some(Self::RemotePort),
            "REMOTE_HOST" => Some(Self::RemoteHost),
            "REMOTE_USER" => Some(Self::RemoteUser),
            "SERVER_ADDR" => Some(Self::ServerAddr),
            "SERVER_PORT" => Some(Self::ServerPort),
            "SERVER_NAME" => Some(Self::ServerName),
            "AUTH_TYPE" => Some(Self::AuthType),
            "TX" => Some(Self::Tx),
            "SESSION" => Some(Self::Session),
            "ENV" => Some(Self::Env),
            "IP" => Some(Self::Ip),
            "GLOBAL" => Some(Self::Global),
            "RESOURCE" => Some(Self::Resource),
            "USER" => Some(Self::User),
            "GEO" => Some(Self::Geo),
            "RULE" => Some(Self::Rule),
            "MATCHED_VAR" => Some(Self::MatchedVar),
            "MATCHED_VARS" => Some(Self::MatchedVars),
            "MATCHED_VAR_NAME" => Some(Self::MatchedVarName),
            "MATCHED_VARS_NAMES" => Some(Self::MatchedVarsNames),
            "TIME" => Some(Self::Time),
            "TIME_EPOCH" => Some(Self::TimeEpoch),
            "TIME_DAY" => Some(Self::TimeDay),
            "TIME_HOUR" => Some(Self::TimeHour),
            "TIME_MIN" => Some(Self::TimeMin),
            "TIME_SEC" => Some(Self::TimeSec),
            "TIME_WDAY" => Some(Self::TimeWday),
            "TIME_MON" => Some(Self::TimeMon),
            "TIME_YEAR" => Some(Self::TimeYear),
            "FILES" => Some(Self::Files),
            "FILES_SIZES" => Some(Self::FilesSizes),
            "FILES_TMPNAMES" => Some(Self::FilesTmpnames),
            "FILES_NAMES" => Some(Self::FilesNames),
            "FILES_COMBINED_SIZE" => Some(Self::FilesCombinedSize),
            "UNIQUE_ID" => Some(Self::UniqueId),
            "DURATION" => Some(Self::Duration),
            "HIGHEST_SEVERITY" => Some(Self::HighestSeverity),
            "STATUS_LINE" => Some(Self::StatusLine),
            "FULL_REQUEST" => Some(Self::FullRequest),
            "FULL_REQUEST_LENGTH" => Some(Self::FullRequestLength),
            "XML" => Some(Self::Xml),
            _ => None,
        }
    }

    /// The canonical upper-case name.
    pub fn canonical(&self) -> &'static str {
        match self {
            Self::Args => "ARGS",
            Self::ArgsGet => "ARGS_GET",
            Self::ArgsPost => "ARGS_POST",
            Self::ArgsNames => "ARGS_NAMES",
            Self::ArgsGetNames => "ARGS_GET_NAMES",
            Self::ArgsPostNames => "ARGS_POST_NAMES",
            Self::ArgsCombinedSize => "ARGS_COMBINED_SIZE",
            Self::RequestUri => "REQUEST_URI",
            Self::RequestUriRaw => "REQUEST_URI_RAW",
            Self::RequestFilename => "REQUEST_FILENAME",
            Self::RequestBasename => "REQUEST_BASENAME",
            Self::RequestLine => "REQUEST_LINE",
            Self::RequestMethod => "REQUEST_METHOD",
            Self::RequestProtocol => "REQUEST_PROTOCOL",
            Self::RequestHeaders => "REQUEST_HEADERS",
            Self::RequestHeadersNames => "REQUEST_HEADERS_NAMES",
            Self::RequestCookies => "REQUEST_COOKIES",
            Self::RequestCookiesNames => "REQUEST_COOKIES_NAMES",
            Self::RequestBody => "REQUEST_BODY",
            Self::RequestBodyLength => "REQUEST_BODY_LENGTH",
            Self::QueryString => "QUERY_STRING",
            Self::ResponseStatus => "RESPONSE_STATUS",
            Self::ResponseProtocol => "RESPONSE_PROTOCOL",
            Self::ResponseHeaders => "RESPONSE_HEADERS",
            Self::ResponseHeadersNames => "RESPONSE_HEADERS_NAMES",
            Self::ResponseBody => "RESPONSE_BODY",
            Self::ResponseContentType => "RESPONSE_CONTENT_TYPE",
            Self::ResponseContentLength => "RESPONSE_CONTENT_LENGTH",
            Self::RemoteAddr => "REMOTE_ADDR",
            Self::RemotePort => "REMOTE_PORT",
            Self::RemoteHost => "REMOTE_HOST",
            Self::RemoteUser => "REMOTE_USER",
            Self::ServerAddr => "SERVER_ADDR",
            Self::ServerPort => "SERVER_PORT",
            Self::ServerName => "SERVER_NAME",
            Self::AuthType => "AUTH_TYPE",
            Self::Tx => "TX",
            Self::Session => "SESSION",
            Self::Env => "ENV",
            Self::Ip => "IP",
            Self::Global => "GLOBAL",
            Self::Resource => "RESOURCE",
            Self::User => "USER",
            Self::Geo => "GEO",
            Self::Rule => "RULE",
            Self::MatchedVar => "MATCHED_VAR",
            Self::MatchedVars => "MATCHED_VARS",
            Self::MatchedVarName => "MATCHED_VAR_NAME",
            Self::MatchedVarsNames => "MATCHED_VARS_NAMES",
            Self::Time => "TIME",
            Self::TimeEpoch => "TIME_EPOCH",
            Self::TimeDay => "TIME_DAY",
            Self::TimeHour => "TIME_HOUR",
            Self::TimeMin => "TIME_MIN",
            Self::TimeSec => "TIME_SEC",
            Self::TimeWday => "TIME_WDAY",
            Self::TimeMon => "TIME_MON",
            Self::TimeYear => "TIME_YEAR",
            Self::Files => "FILES",
            Self::FilesSizes => "FILES_SIZES",
            Self::FilesTmpnames => "FILES_TMPNAMES",
            Self::FilesNames => "FILES_NAMES",
            Self::FilesCombinedSize => "FILES_COMBINED_SIZE",
            Self::UniqueId => "UNIQUE_ID",
            Self::Duration => "DURATION",
            Self::HighestSeverity => "HIGHEST_SEVERITY",
            Self::StatusLine => "STATUS_LINE",
            Self::FullRequest => "FULL_REQUEST",
            Self::FullRequestLength => "FULL_REQUEST_LENGTH",
            Self::Xml => "XML",
        }
    }

    /// Whether this variable is a collection (may yield several values).
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            Self::Args
                | Self::ArgsGet
                | Self::ArgsPost
                | Self::ArgsNames
                | Self::ArgsGetNames
                | Self::ArgsPostNames
                | Self::RequestHeaders
                | Self::RequestHeadersNames
                | Self::RequestCookies
                | Self::RequestCookiesNames
                | Self::ResponseHeaders
                | Self::ResponseHeadersNames
                | Self::Tx
                | Self::Session
                | Self::Env
                | Self::Ip
                | Self::Global
                | Self::Resource
                | Self::User
                | Self::Geo
                | Self::Rule
                | Self::MatchedVars
                | Self::MatchedVarsNames
                | Self::Files
                | Self::FilesSizes
                | Self::FilesTmpnames
                | Self::FilesNames
        )
    }

    /// Whether collection keys compare case-insensitively (header-style).
    pub fn keys_case_insensitive(&self) -> bool {
        matches!(
            self,
            Self::RequestHeaders
                | Self::RequestHeadersNames
                | Self::ResponseHeaders
                | Self::ResponseHeadersNames
                | Self::RequestCookies
                | Self::RequestCookiesNames
        )
    }
}

/// A parsed target list in which exclusions are kept separate, for
/// overlay directives (`SecRuleUpdateTargetBy*`) that merge into an
/// existing rule's variable list.
#[derive(Debug, Clone, Default)]
pub struct TargetUpdate {
    /// Selectors appended to the target rule.
    pub additions: Vec<VariableSpec>,
    /// Exclusions applied to the target rule's selectors. `None` key
    /// predicate removes whole selectors of the collection.
    pub exclusions: Vec<(VariableName, Option<KeyExclusion>)>,
}

impl TargetUpdate {
    /// Merge this update into an existing variable list.
    pub fn apply(&self, variables: &mut Vec<VariableSpec>) {
        variables.extend(self.additions.iter().cloned());
        apply_exclusions(variables, &self.exclusions);
    }
}

/// Parse a `|`-separated target list, keeping exclusions separate.
pub fn parse_update_targets(input: &str) -> Result<TargetUpdate> {
    let mut update = TargetUpdate::default();

    for part in input.split('|') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some(rest) = part.strip_prefix('!') {
            let spec = parse_single(rest)?;
            let excl = match spec.selection {
                None => None,
                Some(Selection::Key(k)) => Some(KeyExclusion::Key(k)),
                Some(Selection::Regex(re)) => Some(KeyExclusion::Regex(re)),
                Some(Selection::Dynamic(_)) => {
                    return Err(Error::parse(
                        format!("exclusion '{}' cannot use a dynamic key", part),
                        String::new(),
                    ));
                }
            };
            update.exclusions.push((spec.name, excl));
            continue;
        }

        update.additions.push(parse_single(part)?);
    }

    Ok(update)
}

fn apply_exclusions(
    variables: &mut Vec<VariableSpec>,
    exclusions: &[(VariableName, Option<KeyExclusion>)],
) {
    for (name, excl) in exclusions {
        match excl {
            // Bare `!NAME` removes whole sibling selectors of that collection.
            None => variables.retain(|v| v.name != *name),
            Some(excl) => {
                for var in variables.iter_mut().filter(|v| v.name == *name) {
                    var.exclusions.push(excl.clone());
                }
            }
        }
    }
}

/// Parse a `|`-separated variable list, collapsing exclusions onto their
/// siblings.
pub fn parse_variables(input: &str) -> Result<Vec<VariableSpec>> {
    let update = parse_update_targets(input)?;
    let mut variables = update.additions;
    apply_exclusions(&mut variables, &update.exclusions);
    Ok(variables)
}

/// Parse one selector item (without `!` prefix).
fn parse_single(input: &str) -> Result<VariableSpec> {
    let input = input.trim();

    let (count, input) = match input.strip_prefix('&') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let (name_str, selection) = match input.find(':') {
        Some(pos) => {
            let sel_str = &input[pos + 1..];
            let selection = if sel_str.len() >= 2 && sel_str.starts_with('/') && sel_str.ends_with('/') {
                let pattern = &sel_str[1..sel_str.len() - 1];
                let re = Regex::new(pattern).map_err(|e| Error::RegexCompile {
                    pattern: pattern.to_string(),
                    source: e,
                })?;
                Selection::Regex(re)
            } else if sel_str.contains("%{") {
                Selection::Dynamic(RunTimeString::parse(sel_str))
            } else {
                Selection::Key(sel_str.to_string())
            };
            (&input[..pos], Some(selection))
        }
        None => (input, None),
    };

    let name = VariableName::parse(name_str).ok_or_else(|| Error::UnknownVariable {
        name: name_str.to_string(),
    })?;

    Ok(VariableSpec {
        name,
        selection,
        count,
        exclusions: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalar() {
        let vars = parse_variables("REQUEST_URI").unwrap();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].name, VariableName::RequestUri);
        assert!(vars[0].selection.is_none());
        assert!(!vars[0].count);
    }

    #[test]
    fn test_parse_key_selection() {
        let vars = parse_variables("ARGS:username").unwrap();
        assert!(matches!(&vars[0].selection, Some(Selection::Key(k)) if k == "username"));
    }

    #[test]
    fn test_parse_regex_selection() {
        let vars = parse_variables("ARGS:/^user/").unwrap();
        match &vars[0].selection {
            Some(Selection::Regex(re)) => assert!(re.is_match("username")),
            other => panic!("expected regex selection, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_dynamic_selection() {
        let vars = parse_variables("TX:%{RULE.id}").unwrap();
        assert!(matches!(&vars[0].selection, Some(Selection::Dynamic(_))));
    }

    #[test]
    fn test_parse_count_mode() {
        let vars = parse_variables("&ARGS").unwrap();
        assert!(vars[0].count);
    }

    #[test]
    fn test_key_exclusion_attaches_to_sibling() {
        let vars = parse_variables("ARGS|!ARGS:safe").unwrap();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].exclusions.len(), 1);
        assert!(vars[0].exclusions[0].matches("safe"));
        assert!(vars[0].exclusions[0].matches("SAFE"));
        assert!(!vars[0].exclusions[0].matches("other"));
    }

    #[test]
    fn test_regex_exclusion() {
        let vars = parse_variables("ARGS|!ARGS:/^csrf_/").unwrap();
        assert!(vars[0].exclusions[0].matches("csrf_token"));
        assert!(!vars[0].exclusions[0].matches("user"));
    }

    #[test]
    fn test_bare_exclusion_removes_sibling() {
        let vars = parse_variables("ARGS_NAMES|ARGS|!ARGS").unwrap();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].name, VariableName::ArgsNames);
    }

    #[test]
    fn test_exclusion_does_not_touch_other_collections() {
        let vars = parse_variables("ARGS|REQUEST_HEADERS|!ARGS:safe").unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].exclusions.len(), 1);
        assert!(vars[1].exclusions.is_empty());
    }

    #[test]
    fn test_invalid_selection_regex_is_load_error() {
        assert!(parse_variables("ARGS:/(/").is_err());
    }

    #[test]
    fn test_unknown_variable() {
        assert!(matches!(
            parse_variables("NO_SUCH_VAR"),
            Err(Error::UnknownVariable { .. })
        ));
    }
}
