//! Action execution support.
//!
//! Parsing and classification live in the parser; this module owns the
//! evaluation-side types: the disruptive outcome a matched rule produces,
//! the flow decision that moves the cursor, and rule metadata.

mod metadata;

pub use metadata::{RuleMetadata, Severity};

use crate::parser::{Action, AllowScope, DisruptiveAction, FlowAction};

/// Outcome of the disruptive action of a matched rule, with macros
/// already expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisruptiveOutcome {
    /// Deny with the rule's status (403 when unset).
    Deny,
    /// Close the connection.
    Drop,
    /// Defer to the inherited default disruptive action.
    Block,
    /// Stop processing in the given scope and let the request through.
    Allow(AllowScope),
    /// Redirect to an expanded URL.
    Redirect(String),
    /// Proxy to an expanded backend.
    Proxy(String),
    /// Explicit no-op.
    Pass,
}

impl DisruptiveOutcome {
    /// Build from a parsed disruptive action, expanding macro arguments.
    pub fn from_action(
        action: &DisruptiveAction,
        expand: impl Fn(&crate::parser::RunTimeString) -> String,
    ) -> Self {
        match action {
            DisruptiveAction::Deny => Self::Deny,
            DisruptiveAction::Drop => Self::Drop,
            DisruptiveAction::Block => Self::Block,
            DisruptiveAction::Pass => Self::Pass,
            DisruptiveAction::Allow(scope) => Self::Allow(*scope),
            DisruptiveAction::Redirect(url) => Self::Redirect(expand(url)),
            DisruptiveAction::Proxy(backend) => Self::Proxy(expand(backend)),
        }
    }

    /// Whether this outcome ends the transaction when enforced.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            Self::Deny | Self::Drop | Self::Block | Self::Redirect(_) | Self::Proxy(_)
        )
    }
}

/// Cursor movement requested by a matched rule.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FlowOutcome {
    /// Proceed to the next rule.
    #[default]
    Continue,
    /// Skip the next N top-level rules.
    Skip(u32),
    /// Skip past the marker or rule id with this label.
    SkipAfter(String),
}

impl FlowOutcome {
    /// Build from a parsed flow action. `chain` is structural and never
    /// reaches evaluation.
    pub fn from_action(action: &FlowAction) -> Self {
        match action {
            FlowAction::Chain => Self::Continue,
            FlowAction::Skip(n) => Self::Skip(*n),
            FlowAction::SkipAfter(label) => Self::SkipAfter(label.clone()),
        }
    }
}

/// Whether an action list contains any disruptive action.
pub fn has_disruptive(actions: &[Action]) -> bool {
    actions.iter().any(Action::is_disruptive)
}

/// Whether an action list contains the chain action.
pub fn has_chain(actions: &[Action]) -> bool {
    actions
        .iter()
        .any(|a| matches!(a, Action::Flow(FlowAction::Chain)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_actions, RunTimeString};

    #[test]
    fn test_outcome_from_deny() {
        let expand = |s: &RunTimeString| s.source_text();
        let outcome = DisruptiveOutcome::from_action(&DisruptiveAction::Deny, expand);
        assert_eq!(outcome, DisruptiveOutcome::Deny);
        assert!(outcome.is_blocking());
    }

    #[test]
    fn test_redirect_expands_macros() {
        let expand = |s: &RunTimeString| s.expand(|_| Some("/blocked".to_string()));
        let action = DisruptiveAction::Redirect(RunTimeString::parse("%{tx.target}"));
        let outcome = DisruptiveOutcome::from_action(&action, expand);
        assert_eq!(outcome, DisruptiveOutcome::Redirect("/blocked".to_string()));
    }

    #[test]
    fn test_pass_and_allow_do_not_block() {
        assert!(!DisruptiveOutcome::Pass.is_blocking());
        assert!(!DisruptiveOutcome::Allow(AllowScope::Transaction).is_blocking());
    }

    #[test]
    fn test_has_disruptive() {
        let actions = parse_actions("id:1,log,deny").unwrap();
        assert!(has_disruptive(&actions));
        let actions = parse_actions("id:1,log,setvar:tx.a=1").unwrap();
        assert!(!has_disruptive(&actions));
    }

    #[test]
    fn test_has_chain() {
        assert!(has_chain(&parse_actions("id:1,chain,deny").unwrap()));
        assert!(!has_chain(&parse_actions("id:1,deny").unwrap()));
    }
}
