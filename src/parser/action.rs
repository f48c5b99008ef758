//! Action parsing and classification.
//!
//! Every action carries a kind (meta, non-disruptive, data, flow,
//! disruptive, transformation) and an application time: configure-only
//! actions populate rule metadata during loading, `t:` actions extend the
//! transformation pipeline before matching, and everything else runs only
//! when the rule matches.

use super::macro_string::RunTimeString;
use crate::error::{Error, Result};

/// An action attached to a rule.
#[derive(Debug, Clone)]
pub enum Action {
    /// Disruptive action (deny, drop, allow, pass, redirect, proxy, block).
    Disruptive(DisruptiveAction),
    /// Flow control action (chain, skip, skipAfter).
    Flow(FlowAction),
    /// Metadata action (id, phase, severity, msg, tag, ...).
    Metadata(MetadataAction),
    /// Data action (setvar, capture, initcol, ...).
    Data(DataAction),
    /// Logging flags (log, nolog, auditlog, noauditlog).
    Logging(LoggingAction),
    /// Control action (ctl:...), mutating transaction state on match.
    Control(ControlAction),
    /// Transformation (t:name), appended to the pipeline.
    Transformation(String),
}

/// Action classification by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Rule metadata.
    Meta,
    /// Non-disruptive side effects (logging flags, ctl).
    NonDisruptive,
    /// Data mutation (setvar, initcol, capture, ...).
    Data,
    /// Cursor control (chain, skip, skipAfter).
    Flow,
    /// Alters the request outcome.
    Disruptive,
    /// Pipeline entry.
    Transformation,
}

/// When an action is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationTime {
    /// Consumed while loading the rule.
    ConfigureOnly,
    /// Applied before the operator runs (transformations).
    BeforeMatch,
    /// Executed only on a successful match.
    OnMatch,
}

/// Disruptive actions.
#[derive(Debug, Clone)]
pub enum DisruptiveAction {
    /// Deny the request with the rule's status code.
    Deny,
    /// Close the connection without a response.
    Drop,
    /// Defer the blocking decision to the inherited default action.
    Block,
    /// Continue processing; the rule still matches and logs.
    Pass,
    /// Stop processing and let the request through.
    Allow(AllowScope),
    /// Redirect to a macro-expanded URL.
    Redirect(RunTimeString),
    /// Proxy the request to a macro-expanded backend.
    Proxy(RunTimeString),
}

/// Scope of an `allow` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowScope {
    /// Skip all remaining phases except logging.
    Transaction,
    /// Skip the rest of the current phase only.
    Phase,
    /// Skip the remaining request phases; response phases still run.
    Request,
}

/// Flow control actions.
#[derive(Debug, Clone)]
pub enum FlowAction {
    /// Link the next rule into this rule's chain.
    Chain,
    /// Skip the next N top-level rules in the phase.
    Skip(u32),
    /// Skip past the marker or rule id with this label.
    SkipAfter(String),
}

/// Metadata actions (configure-only).
#[derive(Debug, Clone)]
pub enum MetadataAction {
    /// Rule ID.
    Id(u64),
    /// Processing phase (1-5).
    Phase(u8),
    /// Severity level (0-7).
    Severity(u8),
    /// Message, macro-expanded when logged.
    Msg(RunTimeString),
    /// Tag, macro-expanded when logged.
    Tag(RunTimeString),
    /// Extra log data, macro-expanded when logged.
    LogData(RunTimeString),
    /// Revision.
    Rev(String),
    /// Version.
    Ver(String),
    /// Maturity level.
    Maturity(u8),
    /// Accuracy level.
    Accuracy(u8),
    /// HTTP status used by deny/redirect.
    Status(u16),
    /// XML namespace declaration for XPath selectors.
    Xmlns(String),
}

/// Data actions.
#[derive(Debug, Clone)]
pub enum DataAction {
    /// Set, increment, decrement or unset a collection variable.
    SetVar(SetVarSpec),
    /// Bind regex captures into TX:0..TX:9.
    Capture,
    /// Re-run the operator after every transformation step.
    MultiMatch,
    /// Open a persistent collection under a macro-expanded key.
    InitCol {
        /// Collection name (lowercase).
        collection: String,
        /// Instance key.
        key: RunTimeString,
    },
    /// Open the USER collection for the given user id.
    SetUid(RunTimeString),
    /// Open the SESSION collection for the given session id.
    SetSid(RunTimeString),
    /// Set an expiry on a persistent collection variable.
    ExpireVar {
        /// Collection name (lowercase).
        collection: String,
        /// Variable key.
        key: String,
        /// Seconds from now.
        seconds: u64,
    },
    /// Write a transaction environment variable.
    SetEnv {
        /// Environment variable name.
        name: String,
        /// Value; `None` unsets.
        value: Option<RunTimeString>,
    },
    /// Execute an external script on match (host-mediated).
    Exec(String),
}

/// `setvar` specification.
#[derive(Debug, Clone)]
pub struct SetVarSpec {
    /// Collection name, lowercase (`tx`, `ip`, `session`, ...).
    pub collection: String,
    /// Variable key.
    pub key: String,
    /// Operation to perform.
    pub value: SetVarValue,
}

/// `setvar` operations. Numeric forms macro-expand their operand and treat
/// non-numeric results as 0.
#[derive(Debug, Clone)]
pub enum SetVarValue {
    /// `VAR=value`.
    Assign(RunTimeString),
    /// `VAR=+N`.
    Increment(RunTimeString),
    /// `VAR=-N`.
    Decrement(RunTimeString),
    /// `!VAR`.
    Delete,
    /// Bare `VAR` (sets "1").
    Init,
}

/// Logging flag actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingAction {
    /// Log matches to the error log.
    Log,
    /// Do not log matches.
    NoLog,
    /// Record the transaction in the audit log.
    AuditLog,
    /// Do not record the transaction in the audit log.
    NoAuditLog,
}

/// Rule engine modes selectable via `ctl:ruleEngine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleEngineMode {
    /// Evaluate rules and enforce disruptive actions.
    On,
    /// Do not evaluate rules.
    Off,
    /// Evaluate and record, but never disrupt.
    DetectionOnly,
}

impl RuleEngineMode {
    /// Parse an engine mode keyword.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            "detectiononly" => Some(Self::DetectionOnly),
            _ => None,
        }
    }
}

/// Request body processors selectable via `ctl:requestBodyProcessor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyProcessor {
    /// application/x-www-form-urlencoded.
    UrlEncoded,
    /// JSON body.
    Json,
    /// XML body.
    Xml,
    /// multipart/form-data.
    Multipart,
}

/// Control actions (`ctl:`). All are transaction-scoped.
#[derive(Debug, Clone)]
pub enum ControlAction {
    /// Override the rule engine mode for this transaction.
    RuleEngine(RuleEngineMode),
    /// Toggle request body access for this transaction.
    RequestBodyAccess(bool),
    /// Toggle response body access for this transaction.
    ResponseBodyAccess(bool),
    /// Disable rules by id for the remainder of the transaction.
    RuleRemoveById(Vec<(u64, u64)>),
    /// Disable rules carrying a tag for the remainder of the transaction.
    RuleRemoveByTag(String),
    /// Exclude a target from a rule for the remainder of the transaction.
    RuleRemoveTargetById {
        /// Target rule id.
        id: u64,
        /// Target selector text (e.g. `ARGS:password`).
        target: String,
    },
    /// Exclude a target from all rules carrying a tag.
    RuleRemoveTargetByTag {
        /// Tag to match.
        tag: String,
        /// Target selector text.
        target: String,
    },
    /// Override the audit engine for this transaction.
    AuditEngine(String),
    /// Override the audit log parts for this transaction.
    AuditLogParts(String),
    /// Select the request body processor.
    RequestBodyProcessor(BodyProcessor),
}

impl Action {
    /// The action's kind.
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Disruptive(_) => ActionKind::Disruptive,
            Action::Flow(_) => ActionKind::Flow,
            Action::Metadata(_) => ActionKind::Meta,
            Action::Data(_) => ActionKind::Data,
            Action::Logging(_) | Action::Control(_) => ActionKind::NonDisruptive,
            Action::Transformation(_) => ActionKind::Transformation,
        }
    }

    /// When the action is applied.
    pub fn timing(&self) -> ApplicationTime {
        match self {
            Action::Metadata(_) | Action::Logging(_) => ApplicationTime::ConfigureOnly,
            Action::Flow(FlowAction::Chain) => ApplicationTime::ConfigureOnly,
            Action::Data(DataAction::Capture) | Action::Data(DataAction::MultiMatch) => {
                ApplicationTime::ConfigureOnly
            }
            Action::Transformation(_) => ApplicationTime::BeforeMatch,
            _ => ApplicationTime::OnMatch,
        }
    }

    /// Whether this is a disruptive action.
    pub fn is_disruptive(&self) -> bool {
        matches!(self, Action::Disruptive(_))
    }
}

/// Parse a comma-separated action list. Commas inside quotes or
/// parentheses do not split.
pub fn parse_actions(input: &str) -> Result<Vec<Action>> {
    let mut actions = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quote_char = '"';
    let mut paren_depth: u32 = 0;

    for c in input.chars() {
        match c {
            '"' | '\'' if !in_quotes => {
                in_quotes = true;
                quote_char = c;
                current.push(c);
            }
            c if in_quotes && c == quote_char => {
                in_quotes = false;
                current.push(c);
            }
            '(' if !in_quotes => {
                paren_depth += 1;
                current.push(c);
            }
            ')' if !in_quotes => {
                paren_depth = paren_depth.saturating_sub(1);
                current.push(c);
            }
            ',' if !in_quotes && paren_depth == 0 => {
                if !current.trim().is_empty() {
                    actions.push(parse_single_action(current.trim())?);
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }

    if !current.trim().is_empty() {
        actions.push(parse_single_action(current.trim())?);
    }

    Ok(actions)
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'\'' && bytes[s.len() - 1] == b'\'')
            || (bytes[0] == b'"' && bytes[s.len() - 1] == b'"')
        {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Parse a single action.
fn parse_single_action(input: &str) -> Result<Action> {
    let input = input.trim();

    if let Some(name) = input.strip_prefix("t:") {
        return Ok(Action::Transformation(name.trim().to_string()));
    }

    let (name, argument) = match input.find(':') {
        Some(pos) => (input[..pos].to_ascii_lowercase(), Some(&input[pos + 1..])),
        None => (input.to_ascii_lowercase(), None),
    };

    fn required<'a>(argument: Option<&'a str>, action: &str) -> Result<&'a str> {
        argument.ok_or_else(|| Error::InvalidActionArgument {
            action: action.to_string(),
            message: "missing argument".to_string(),
        })
    }

    match name.as_str() {
        // Disruptive
        "deny" => Ok(Action::Disruptive(DisruptiveAction::Deny)),
        "drop" => Ok(Action::Disruptive(DisruptiveAction::Drop)),
        "block" => Ok(Action::Disruptive(DisruptiveAction::Block)),
        "pass" => Ok(Action::Disruptive(DisruptiveAction::Pass)),
        "allow" => {
            let scope = match argument.map(str::trim) {
                None | Some("") => AllowScope::Transaction,
                Some("phase") => AllowScope::Phase,
                Some("request") => AllowScope::Request,
                Some(other) => {
                    return Err(Error::InvalidActionArgument {
                        action: "allow".to_string(),
                        message: format!("unknown scope '{}'", other),
                    });
                }
            };
            Ok(Action::Disruptive(DisruptiveAction::Allow(scope)))
        }
        "redirect" => {
            let url = strip_quotes(required(argument, "redirect")?);
            Ok(Action::Disruptive(DisruptiveAction::Redirect(
                RunTimeString::parse(url),
            )))
        }
        "proxy" => {
            let backend = strip_quotes(required(argument, "proxy")?);
            Ok(Action::Disruptive(DisruptiveAction::Proxy(
                RunTimeString::parse(backend),
            )))
        }

        // Flow
        "chain" => Ok(Action::Flow(FlowAction::Chain)),
        "skip" => {
            let count: u32 = required(argument, "skip")?.trim().parse().map_err(|_| {
                Error::InvalidActionArgument {
                    action: "skip".to_string(),
                    message: "invalid count".to_string(),
                }
            })?;
            Ok(Action::Flow(FlowAction::Skip(count)))
        }
        "skipafter" => {
            let marker = strip_quotes(required(argument, "skipAfter")?);
            Ok(Action::Flow(FlowAction::SkipAfter(marker.to_string())))
        }

        // Metadata
        "id" => {
            let id: u64 = required(argument, "id")?.trim().parse().map_err(|_| {
                Error::InvalidActionArgument {
                    action: "id".to_string(),
                    message: "invalid rule id".to_string(),
                }
            })?;
            Ok(Action::Metadata(MetadataAction::Id(id)))
        }
        "phase" => {
            let phase: u8 = required(argument, "phase")?.trim().parse().map_err(|_| {
                Error::InvalidActionArgument {
                    action: "phase".to_string(),
                    message: "invalid phase".to_string(),
                }
            })?;
            if !(1..=5).contains(&phase) {
                return Err(Error::InvalidActionArgument {
                    action: "phase".to_string(),
                    message: format!("phase {} out of range 1-5", phase),
                });
            }
            Ok(Action::Metadata(MetadataAction::Phase(phase)))
        }
        "severity" => {
            let arg = strip_quotes(required(argument, "severity")?);
            let sev = parse_severity(arg).ok_or_else(|| Error::InvalidActionArgument {
                action: "severity".to_string(),
                message: format!("invalid severity '{}'", arg),
            })?;
            Ok(Action::Metadata(MetadataAction::Severity(sev)))
        }
        "msg" => Ok(Action::Metadata(MetadataAction::Msg(RunTimeString::parse(
            strip_quotes(argument.unwrap_or_default()),
        )))),
        "tag" => Ok(Action::Metadata(MetadataAction::Tag(RunTimeString::parse(
            strip_quotes(argument.unwrap_or_default()),
        )))),
        "logdata" => Ok(Action::Metadata(MetadataAction::LogData(
            RunTimeString::parse(strip_quotes(argument.unwrap_or_default())),
        ))),
        "rev" => Ok(Action::Metadata(MetadataAction::Rev(
            strip_quotes(argument.unwrap_or_default()).to_string(),
        ))),
        "ver" => Ok(Action::Metadata(MetadataAction::Ver(
            strip_quotes(argument.unwrap_or_default()).to_string(),
        ))),
        "maturity" => {
            let m: u8 = required(argument, "maturity")?.trim().parse().map_err(|_| {
                Error::InvalidActionArgument {
                    action: "maturity".to_string(),
                    message: "invalid maturity".to_string(),
                }
            })?;
            Ok(Action::Metadata(MetadataAction::Maturity(m)))
        }
        "accuracy" => {
            let a: u8 = required(argument, "accuracy")?.trim().parse().map_err(|_| {
                Error::InvalidActionArgument {
                    action: "accuracy".to_string(),
                    message: "invalid accuracy".to_string(),
                }
            })?;
            Ok(Action::Metadata(MetadataAction::Accuracy(a)))
        }
        "status" => {
            let status: u16 = required(argument, "status")?.trim().parse().map_err(|_| {
                Error::InvalidActionArgument {
                    action: "status".to_string(),
                    message: "invalid status code".to_string(),
                }
            })?;
            Ok(Action::Metadata(MetadataAction::Status(status)))
        }
        "xmlns" => Ok(Action::Metadata(MetadataAction::Xmlns(
            strip_quotes(argument.unwrap_or_default()).to_string(),
        ))),

        // Data
        "setvar" => {
            let spec = strip_quotes(required(argument, "setvar")?);
            Ok(Action::Data(DataAction::SetVar(parse_setvar(spec)?)))
        }
        "capture" => Ok(Action::Data(DataAction::Capture)),
        "multimatch" => Ok(Action::Data(DataAction::MultiMatch)),
        "initcol" => {
            let spec = strip_quotes(required(argument, "initcol")?);
            let (collection, key) =
                spec.split_once('=')
                    .ok_or_else(|| Error::InvalidActionArgument {
                        action: "initcol".to_string(),
                        message: "expected collection=key".to_string(),
                    })?;
            Ok(Action::Data(DataAction::InitCol {
                collection: collection.trim().to_ascii_lowercase(),
                key: RunTimeString::parse(key.trim()),
            }))
        }
        "setuid" => Ok(Action::Data(DataAction::SetUid(RunTimeString::parse(
            strip_quotes(required(argument, "setuid")?),
        )))),
        "setsid" => Ok(Action::Data(DataAction::SetSid(RunTimeString::parse(
            strip_quotes(required(argument, "setsid")?),
        )))),
        "expirevar" => {
            let spec = strip_quotes(required(argument, "expirevar")?);
            let (var, secs) = spec
                .split_once('=')
                .ok_or_else(|| Error::InvalidActionArgument {
                    action: "expirevar".to_string(),
                    message: "expected var=seconds".to_string(),
                })?;
            let seconds: u64 = secs.trim().parse().map_err(|_| Error::InvalidActionArgument {
                action: "expirevar".to_string(),
                message: "invalid seconds".to_string(),
            })?;
            let (collection, key) = split_var_name(var.trim());
            Ok(Action::Data(DataAction::ExpireVar {
                collection,
                key,
                seconds,
            }))
        }
        "setenv" => {
            let spec = strip_quotes(required(argument, "setenv")?);
            if let Some(rest) = spec.strip_prefix('!') {
                return Ok(Action::Data(DataAction::SetEnv {
                    name: rest.to_string(),
                    value: None,
                }));
            }
            let (name, value) = match spec.split_once('=') {
                Some((n, v)) => (n.to_string(), RunTimeString::parse(v)),
                None => (spec.to_string(), RunTimeString::literal("1")),
            };
            Ok(Action::Data(DataAction::SetEnv {
                name,
                value: Some(value),
            }))
        }
        "exec" => Ok(Action::Data(DataAction::Exec(
            strip_quotes(required(argument, "exec")?).to_string(),
        ))),

        // Logging flags
        "log" => Ok(Action::Logging(LoggingAction::Log)),
        "nolog" => Ok(Action::Logging(LoggingAction::NoLog)),
        "auditlog" => Ok(Action::Logging(LoggingAction::AuditLog)),
        "noauditlog" => Ok(Action::Logging(LoggingAction::NoAuditLog)),

        // Control
        "ctl" => parse_ctl(strip_quotes(required(argument, "ctl")?)),

        // Recognized but unsupported legacy actions
        "pause" => Err(Error::unsupported(
            "pause",
            "response delay is not implemented; remove the action",
        )),

        _ => Err(Error::UnknownAction { name }),
    }
}

/// Parse a `ctl:` argument (`option=value`).
fn parse_ctl(spec: &str) -> Result<Action> {
    let (option, value) = match spec.split_once('=') {
        Some((o, v)) => (o.trim(), v.trim()),
        None => (spec.trim(), ""),
    };

    let bad = |message: String| Error::InvalidActionArgument {
        action: "ctl".to_string(),
        message,
    };

    let ctl = match option.to_ascii_lowercase().as_str() {
        "ruleengine" => ControlAction::RuleEngine(
            RuleEngineMode::parse(value)
                .ok_or_else(|| bad(format!("invalid ruleEngine mode '{}'", value)))?,
        ),
        "requestbodyaccess" => ControlAction::RequestBodyAccess(parse_on_off(value).ok_or_else(
            || bad(format!("invalid requestBodyAccess value '{}'", value)),
        )?),
        "responsebodyaccess" => ControlAction::ResponseBodyAccess(parse_on_off(value).ok_or_else(
            || bad(format!("invalid responseBodyAccess value '{}'", value)),
        )?),
        "ruleremovebyid" => {
            let ranges = parse_id_ranges(value)
                .ok_or_else(|| bad(format!("invalid rule id list '{}'", value)))?;
            ControlAction::RuleRemoveById(ranges)
        }
        "ruleremovebytag" => ControlAction::RuleRemoveByTag(value.to_string()),
        "ruleremovetargetbyid" => {
            let (id, target) = value
                .split_once(';')
                .ok_or_else(|| bad("expected id;TARGET".to_string()))?;
            ControlAction::RuleRemoveTargetById {
                id: id
                    .trim()
                    .parse()
                    .map_err(|_| bad(format!("invalid rule id '{}'", id)))?,
                target: target.trim().to_string(),
            }
        }
        "ruleremovetargetbytag" => {
            let (tag, target) = value
                .split_once(';')
                .ok_or_else(|| bad("expected tag;TARGET".to_string()))?;
            ControlAction::RuleRemoveTargetByTag {
                tag: tag.trim().to_string(),
                target: target.trim().to_string(),
            }
        }
        "auditengine" => ControlAction::AuditEngine(value.to_string()),
        "auditlogparts" => ControlAction::AuditLogParts(value.to_string()),
        "requestbodyprocessor" => {
            let processor = match value.to_ascii_uppercase().as_str() {
                "URLENCODED" => BodyProcessor::UrlEncoded,
                "JSON" => BodyProcessor::Json,
                "XML" => BodyProcessor::Xml,
                "MULTIPART" => BodyProcessor::Multipart,
                _ => return Err(bad(format!("unknown body processor '{}'", value))),
            };
            ControlAction::RequestBodyProcessor(processor)
        }
        other => return Err(bad(format!("unknown ctl option '{}'", other))),
    };

    Ok(Action::Control(ctl))
}

/// Parse a `setvar` specification.
fn parse_setvar(input: &str) -> Result<SetVarSpec> {
    let input = input.trim();

    if let Some(var) = input.strip_prefix('!') {
        let (collection, key) = split_var_name(var);
        return Ok(SetVarSpec {
            collection,
            key,
            value: SetVarValue::Delete,
        });
    }

    let (var, value_str) = match input.split_once('=') {
        Some((v, rhs)) => (v, Some(rhs)),
        None => (input, None),
    };

    let (collection, key) = split_var_name(var.trim());

    let value = match value_str {
        None => SetVarValue::Init,
        Some(rhs) => {
            if let Some(amount) = rhs.strip_prefix('+') {
                SetVarValue::Increment(RunTimeString::parse(amount))
            } else if let Some(amount) = rhs.strip_prefix('-') {
                SetVarValue::Decrement(RunTimeString::parse(amount))
            } else {
                SetVarValue::Assign(RunTimeString::parse(rhs))
            }
        }
    };

    Ok(SetVarSpec {
        collection,
        key,
        value,
    })
}

/// Split `collection.key` (or `collection:key`); bare names default to `tx`.
fn split_var_name(input: &str) -> (String, String) {
    for sep in ['.', ':'] {
        if let Some((collection, key)) = input.split_once(sep) {
            return (collection.to_ascii_lowercase(), key.to_string());
        }
    }
    ("tx".to_string(), input.to_string())
}

fn parse_on_off(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

/// Parse a space-separated list of ids and `N-M` ranges.
pub(crate) fn parse_id_ranges(input: &str) -> Option<Vec<(u64, u64)>> {
    let mut ranges = Vec::new();
    for item in input.split_whitespace() {
        match item.split_once('-') {
            Some((lo, hi)) => {
                let lo: u64 = lo.parse().ok()?;
                let hi: u64 = hi.parse().ok()?;
                if lo > hi {
                    return None;
                }
                ranges.push((lo, hi));
            }
            None => {
                let id: u64 = item.parse().ok()?;
                ranges.push((id, id));
            }
        }
    }
    if ranges.is_empty() {
        None
    } else {
        Some(ranges)
    }
}

/// Parse severity from a number or a syslog name.
fn parse_severity(s: &str) -> Option<u8> {
    if let Ok(n) = s.parse::<u8>() {
        return (n <= 7).then_some(n);
    }
    match s.to_ascii_lowercase().as_str() {
        "emergency" => Some(0),
        "alert" => Some(1),
        "critical" => Some(2),
        "error" => Some(3),
        "warning" => Some(4),
        "notice" => Some(5),
        "info" => Some(6),
        "debug" => Some(7),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_list() {
        let actions = parse_actions("id:1,phase:2,deny,status:403").unwrap();
        assert_eq!(actions.len(), 4);
        assert!(actions.iter().any(Action::is_disruptive));
    }

    #[test]
    fn test_quoted_msg_with_comma() {
        let actions = parse_actions("id:1,msg:'one, two',deny").unwrap();
        assert_eq!(actions.len(), 3);
    }

    #[test]
    fn test_parse_setvar_increment() {
        let actions = parse_actions("setvar:tx.score=+5").unwrap();
        match &actions[0] {
            Action::Data(DataAction::SetVar(spec)) => {
                assert_eq!(spec.collection, "tx");
                assert_eq!(spec.key, "score");
                assert!(matches!(spec.value, SetVarValue::Increment(_)));
            }
            other => panic!("expected setvar, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_setvar_macro_value() {
        let actions = parse_actions("setvar:tx.blocked_uri=%{REQUEST_URI}").unwrap();
        match &actions[0] {
            Action::Data(DataAction::SetVar(spec)) => match &spec.value {
                SetVarValue::Assign(rts) => assert!(rts.has_variables()),
                other => panic!("expected assign, got {:?}", other),
            },
            other => panic!("expected setvar, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_setvar_delete() {
        let actions = parse_actions("setvar:!tx.score").unwrap();
        match &actions[0] {
            Action::Data(DataAction::SetVar(spec)) => {
                assert!(matches!(spec.value, SetVarValue::Delete));
            }
            other => panic!("expected setvar, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_ctl_rule_engine() {
        let actions = parse_actions("ctl:ruleEngine=detectionOnly").unwrap();
        assert!(matches!(
            actions[0],
            Action::Control(ControlAction::RuleEngine(RuleEngineMode::DetectionOnly))
        ));
    }

    #[test]
    fn test_parse_ctl_remove_target() {
        let actions = parse_actions("ctl:ruleRemoveTargetById=942100;ARGS:password").unwrap();
        match &actions[0] {
            Action::Control(ControlAction::RuleRemoveTargetById { id, target }) => {
                assert_eq!(*id, 942100);
                assert_eq!(target, "ARGS:password");
            }
            other => panic!("expected ctl, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_initcol() {
        let actions = parse_actions("initcol:ip=%{REMOTE_ADDR}").unwrap();
        match &actions[0] {
            Action::Data(DataAction::InitCol { collection, key }) => {
                assert_eq!(collection, "ip");
                assert!(key.has_variables());
            }
            other => panic!("expected initcol, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_expirevar() {
        let actions = parse_actions("expirevar:ip.block=600").unwrap();
        match &actions[0] {
            Action::Data(DataAction::ExpireVar {
                collection,
                key,
                seconds,
            }) => {
                assert_eq!(collection, "ip");
                assert_eq!(key, "block");
                assert_eq!(*seconds, 600);
            }
            other => panic!("expected expirevar, got {:?}", other),
        }
    }

    #[test]
    fn test_severity_names() {
        let actions = parse_actions("severity:CRITICAL").unwrap();
        assert!(matches!(
            actions[0],
            Action::Metadata(MetadataAction::Severity(2))
        ));
    }

    #[test]
    fn test_phase_range_check() {
        assert!(parse_actions("phase:6").is_err());
    }

    #[test]
    fn test_allow_scopes() {
        assert!(matches!(
            parse_actions("allow").unwrap()[0],
            Action::Disruptive(DisruptiveAction::Allow(AllowScope::Transaction))
        ));
        assert!(matches!(
            parse_actions("allow:phase").unwrap()[0],
            Action::Disruptive(DisruptiveAction::Allow(AllowScope::Phase))
        ));
        assert!(matches!(
            parse_actions("allow:request").unwrap()[0],
            Action::Disruptive(DisruptiveAction::Allow(AllowScope::Request))
        ));
    }

    #[test]
    fn test_pause_is_unsupported() {
        assert!(matches!(
            parse_actions("pause:3000"),
            Err(Error::Unsupported { .. })
        ));
    }

    #[test]
    fn test_timing_classification() {
        let actions =
            parse_actions("id:1,t:lowercase,setvar:tx.a=1,deny,chain,log,capture").unwrap();
        let timing_of = |i: usize| actions[i].timing();
        assert_eq!(timing_of(0), ApplicationTime::ConfigureOnly); // id
        assert_eq!(timing_of(1), ApplicationTime::BeforeMatch); // t:
        assert_eq!(timing_of(2), ApplicationTime::OnMatch); // setvar
        assert_eq!(timing_of(3), ApplicationTime::OnMatch); // deny
        assert_eq!(timing_of(4), ApplicationTime::ConfigureOnly); // chain
        assert_eq!(timing_of(5), ApplicationTime::ConfigureOnly); // log
        assert_eq!(timing_of(6), ApplicationTime::ConfigureOnly); // capture
    }

    #[test]
    fn test_id_ranges() {
        let ranges = parse_id_ranges("100 200-300").unwrap();
        assert_eq!(ranges, vec![(100, 100), (200, 300)]);
        assert!(parse_id_ranges("300-200").is_none());
    }
}
