//! Rule metadata and severity levels.

use crate::parser::{Action, LoggingAction, MetadataAction, RunTimeString};

/// Syslog-style severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Severity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl From<u8> for Severity {
    fn from(value: u8) -> Self {
        match value {
            0 => Severity::Emergency,
            1 => Severity::Alert,
            2 => Severity::Critical,
            3 => Severity::Error,
            4 => Severity::Warning,
            5 => Severity::Notice,
            6 => Severity::Info,
            _ => Severity::Debug,
        }
    }
}

impl Severity {
    /// Upper-case name as used in log output.
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Emergency => "EMERGENCY",
            Severity::Alert => "ALERT",
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Notice => "NOTICE",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        }
    }
}

/// Configure-time metadata extracted from a rule's action list.
#[derive(Debug, Clone, Default)]
pub struct RuleMetadata {
    /// Rule id.
    pub id: Option<u64>,
    /// Message (macro, expanded when logged).
    pub msg: Option<RunTimeString>,
    /// Extra log data (macro).
    pub logdata: Option<RunTimeString>,
    /// Severity 0-7.
    pub severity: Option<u8>,
    /// Tags (macros).
    pub tags: Vec<RunTimeString>,
    /// Revision.
    pub rev: Option<String>,
    /// Version.
    pub ver: Option<String>,
    /// Maturity.
    pub maturity: Option<u8>,
    /// Accuracy.
    pub accuracy: Option<u8>,
    /// Status for deny/redirect.
    pub status: Option<u16>,
    /// Whether matches are logged (`log`/`nolog`).
    pub log: Option<bool>,
    /// Whether the transaction is audit-logged (`auditlog`/`noauditlog`).
    pub auditlog: Option<bool>,
}

impl RuleMetadata {
    /// Collect metadata from an action list.
    pub fn from_actions(actions: &[Action]) -> Self {
        let mut meta = Self::default();
        for action in actions {
            match action {
                Action::Metadata(m) => match m {
                    MetadataAction::Id(id) => meta.id = Some(*id),
                    MetadataAction::Msg(msg) => meta.msg = Some(msg.clone()),
                    MetadataAction::LogData(data) => meta.logdata = Some(data.clone()),
                    MetadataAction::Severity(sev) => meta.severity = Some(*sev),
                    MetadataAction::Tag(tag) => meta.tags.push(tag.clone()),
                    MetadataAction::Rev(rev) => meta.rev = Some(rev.clone()),
                    MetadataAction::Ver(ver) => meta.ver = Some(ver.clone()),
                    MetadataAction::Maturity(m) => meta.maturity = Some(*m),
                    MetadataAction::Accuracy(a) => meta.accuracy = Some(*a),
                    MetadataAction::Status(s) => meta.status = Some(*s),
                    MetadataAction::Phase(_) | MetadataAction::Xmlns(_) => {}
                },
                Action::Logging(l) => match l {
                    LoggingAction::Log => meta.log = Some(true),
                    LoggingAction::NoLog => meta.log = Some(false),
                    LoggingAction::AuditLog => meta.auditlog = Some(true),
                    LoggingAction::NoAuditLog => meta.auditlog = Some(false),
                },
                _ => {}
            }
        }
        meta
    }

    /// Whether any tag's literal text matches a predicate.
    pub fn has_tag_matching(&self, mut predicate: impl FnMut(&str) -> bool) -> bool {
        self.tags.iter().any(|t| predicate(&t.source_text()))
    }

    /// Format the configure-time fields as a log suffix.
    pub fn format_log(&self) -> String {
        let mut parts = Vec::new();

        if let Some(id) = self.id {
            parts.push(format!("[id \"{}\"]", id));
        }
        if let Some(ref msg) = self.msg {
            parts.push(format!("[msg \"{}\"]", msg.source_text()));
        }
        if let Some(sev) = self.severity {
            parts.push(format!("[severity \"{}\"]", Severity::from(sev).name()));
        }
        for tag in &self.tags {
            parts.push(format!("[tag \"{}\"]", tag.source_text()));
        }
        if let Some(ref rev) = self.rev {
            parts.push(format!("[rev \"{}\"]", rev));
        }
        if let Some(ref ver) = self.ver {
            parts.push(format!("[ver \"{}\"]", ver));
        }

        parts.join(" ")
    }
}
