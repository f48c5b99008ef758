//! Intervention records.

use super::phase::Phase;

/// The structured outcome the host reads after each phase.
///
/// `disruptive` is false when the engine ran in detection-only mode: the
/// record documents what would have happened, and the host should let the
/// transaction proceed.
#[derive(Debug, Clone)]
pub struct Intervention {
    /// HTTP status the host should return.
    pub status: u16,
    /// Redirect or proxy target, if one applies.
    pub url: Option<String>,
    /// Log line describing the decision.
    pub log: Option<String>,
    /// Whether the host must actually disrupt the transaction.
    pub disruptive: bool,
    /// Response pause in milliseconds (reserved; never set by the
    /// engine since `pause` is rejected at load).
    pub pause_ms: Option<u64>,
    /// Id of the rule that fired, if it had one.
    pub rule_id: Option<u64>,
    /// Phase in which the decision was made.
    pub phase: Phase,
    /// Whether the connection should be closed without a response.
    pub drop_connection: bool,
}

impl Intervention {
    /// A deny decision.
    pub fn deny(status: u16, phase: Phase, rule_id: Option<u64>) -> Self {
        Self {
            status,
            url: None,
            log: None,
            disruptive: true,
            pause_ms: None,
            rule_id,
            phase,
            drop_connection: false,
        }
    }

    /// A redirect decision.
    pub fn redirect(status: u16, url: String, phase: Phase, rule_id: Option<u64>) -> Self {
        Self {
            status,
            url: Some(url),
            ..Self::deny(0, phase, rule_id)
        }
    }

    /// A connection drop.
    pub fn drop(phase: Phase, rule_id: Option<u64>) -> Self {
        Self {
            drop_connection: true,
            ..Self::deny(444, phase, rule_id)
        }
    }

    /// Mark as detection-only: recorded, not enforced.
    pub fn detection_only(mut self) -> Self {
        self.disruptive = false;
        self
    }

    /// Attach the log line.
    pub fn with_log(mut self, log: String) -> Self {
        self.log = Some(log);
        self
    }

    /// Render for the error log.
    pub fn format_log(&self) -> String {
        let mut parts = vec![format!("[status {}]", self.status)];
        if let Some(id) = self.rule_id {
            parts.push(format!("[id {}]", id));
        }
        if let Some(ref url) = self.url {
            parts.push(format!("[redirect {}]", url));
        }
        if let Some(ref log) = self.log {
            parts.push(format!("[msg {}]", log));
        }
        parts.push(format!("[phase {}]", self.phase.name()));
        if !self.disruptive {
            parts.push("[detection-only]".to_string());
        }
        parts.join(" ")
    }
}
