//! Directive AST.
//!
//! The parser is side-effect free: it turns configuration text into a list
//! of directives, and the ruleset builder applies them in order.

use super::action::{Action, RuleEngineMode};
use super::operator::OperatorSpec;
use super::variable::{TargetUpdate, VariableSpec};
use crate::error::SourceLocation;
use std::path::PathBuf;

/// A parsed configuration directive.
#[derive(Debug, Clone)]
pub enum Directive {
    /// `SecRule VARIABLES "OPERATOR" "ACTIONS"`.
    Rule(RuleDirective),
    /// `SecAction "ACTIONS"` — an unconditional execution point.
    ActionRule(ActionDirective),
    /// `SecRuleScript PATH "ACTIONS"` — external script hook.
    ScriptRule(ScriptDirective),
    /// `SecMarker LABEL` — a skipAfter target.
    Marker(String),
    /// `SecDefaultAction "ACTIONS"` — per-phase defaults.
    DefaultAction {
        /// The action list (must name a phase and a disruptive action).
        actions: Vec<Action>,
        /// Source location for diagnostics.
        location: SourceLocation,
    },
    /// `SecRuleEngine On|Off|DetectionOnly`.
    EngineMode(RuleEngineMode),
    /// `SecRequestBodyAccess On|Off`.
    RequestBodyAccess(bool),
    /// `SecResponseBodyAccess On|Off`.
    ResponseBodyAccess(bool),
    /// `SecRequestBodyLimit BYTES`.
    RequestBodyLimit(usize),
    /// `SecRequestBodyNoFilesLimit BYTES`.
    RequestBodyNoFilesLimit(usize),
    /// `SecResponseBodyLimit BYTES`.
    ResponseBodyLimit(usize),
    /// `SecArgumentSeparator C`.
    ArgumentSeparator(char),
    /// `SecComponentSignature "NAME/VERSION"`.
    ComponentSignature(String),
    /// `SecDebugLog PATH`.
    DebugLog(PathBuf),
    /// `SecDebugLogLevel 0-9`.
    DebugLogLevel(u8),
    /// `SecAuditEngine On|Off|RelevantOnly`.
    AuditEngine(String),
    /// `SecAuditLog PATH`.
    AuditLog(PathBuf),
    /// `SecAuditLogParts LETTERS`.
    AuditLogParts(String),
    /// `SecGeoLookupDb PATH`.
    GeoLookupDb(PathBuf),
    /// `SecUnicodeMapFile PATH [CODEPAGE]`.
    UnicodeMapFile {
        /// Map file path.
        path: PathBuf,
        /// Optional code page.
        code_page: Option<u32>,
    },
    /// `SecXmlExternalEntity On|Off`.
    XmlExternalEntity(bool),
    /// `SecTmpDir PATH`.
    TmpDir(PathBuf),
    /// `SecUploadDir PATH`.
    UploadDir(PathBuf),
    /// `SecWebAppId NAME`.
    WebAppId(String),
    /// `SecCollectionTimeout SECONDS` (accepted for compatibility).
    CollectionTimeout(u64),
    /// `SecPcreMatchLimit N` — bounds compiled regex resources.
    PcreMatchLimit(u64),
    /// `SecRuleRemoveById ID|RANGE ...`.
    RemoveById(Vec<(u64, u64)>),
    /// `SecRuleRemoveByTag PATTERN`.
    RemoveByTag(String),
    /// `SecRuleRemoveByMsg PATTERN`.
    RemoveByMsg(String),
    /// `SecRuleUpdateTargetById ID "TARGETS"`.
    UpdateTargetById {
        /// Target rule ids.
        ids: Vec<(u64, u64)>,
        /// Selector additions and exclusions merged into the target.
        targets: TargetUpdate,
    },
    /// `SecRuleUpdateTargetByTag PATTERN "TARGETS"`.
    UpdateTargetByTag {
        /// Tag pattern.
        tag: String,
        /// Selector additions and exclusions merged into the target.
        targets: TargetUpdate,
    },
    /// `SecRuleUpdateTargetByMsg PATTERN "TARGETS"`.
    UpdateTargetByMsg {
        /// Message pattern.
        msg: String,
        /// Selector additions and exclusions merged into the target.
        targets: TargetUpdate,
    },
    /// `SecRuleUpdateActionById ID "ACTIONS"`.
    UpdateActionById {
        /// Target rule id.
        id: u64,
        /// Actions merged over the target's list.
        actions: Vec<Action>,
    },
    /// `Include PATH` (recorded after expansion for diagnostics).
    Include(PathBuf),
}

/// A `SecRule` directive.
#[derive(Debug, Clone)]
pub struct RuleDirective {
    /// Variables to inspect.
    pub variables: Vec<VariableSpec>,
    /// Operator to apply.
    pub operator: OperatorSpec,
    /// Action list (possibly empty: defaults apply).
    pub actions: Vec<Action>,
    /// Source location for diagnostics.
    pub location: SourceLocation,
}

/// A `SecAction` directive.
#[derive(Debug, Clone)]
pub struct ActionDirective {
    /// Action list.
    pub actions: Vec<Action>,
    /// Source location for diagnostics.
    pub location: SourceLocation,
}

/// A `SecRuleScript` directive.
#[derive(Debug, Clone)]
pub struct ScriptDirective {
    /// Script path (resolved relative to the including file).
    pub path: PathBuf,
    /// Action list.
    pub actions: Vec<Action>,
    /// Source location for diagnostics.
    pub location: SourceLocation,
}
