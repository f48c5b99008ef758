//! Exception overlay.
//!
//! Rule-modification directives (`SecRuleRemoveBy*`,
//! `SecRuleUpdateTargetBy*`, `SecRuleUpdateActionById`) accumulate into a
//! value owned by the ruleset builder and are applied once when the
//! ruleset is sealed. Tag and message patterns are regexes, matched
//! against the literal (unexpanded) text.

use super::rule::CompiledRule;
use crate::error::{Error, Result};
use crate::parser::{Action, TargetUpdate};
use regex::Regex;

/// One pattern-based selector over rules.
#[derive(Debug, Clone)]
pub struct RulePattern {
    regex: Regex,
}

impl RulePattern {
    /// Compile a pattern; a bad pattern is a load error.
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| Error::RegexCompile {
            pattern: pattern.to_string(),
            source: e,
        })?;
        Ok(Self { regex })
    }

    /// Whether the pattern matches a candidate string.
    pub fn matches(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }
}

/// Accumulated exception directives.
#[derive(Debug, Clone, Default)]
pub struct ExceptionOverlay {
    removed_ids: Vec<(u64, u64)>,
    removed_tags: Vec<RulePattern>,
    removed_msgs: Vec<RulePattern>,
    target_updates_by_id: Vec<(Vec<(u64, u64)>, TargetUpdate)>,
    target_updates_by_tag: Vec<(RulePattern, TargetUpdate)>,
    target_updates_by_msg: Vec<(RulePattern, TargetUpdate)>,
    action_updates_by_id: Vec<(u64, Vec<Action>)>,
}

impl ExceptionOverlay {
    /// Create an empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record id ranges to remove.
    pub fn remove_ids(&mut self, ranges: &[(u64, u64)]) {
        self.removed_ids.extend_from_slice(ranges);
    }

    /// Record a tag pattern to remove.
    pub fn remove_tag(&mut self, pattern: &str) -> Result<()> {
        self.removed_tags.push(RulePattern::new(pattern)?);
        Ok(())
    }

    /// Record a message pattern to remove.
    pub fn remove_msg(&mut self, pattern: &str) -> Result<()> {
        self.removed_msgs.push(RulePattern::new(pattern)?);
        Ok(())
    }

    /// Record a target update keyed by rule id ranges.
    pub fn update_target_by_id(&mut self, ids: Vec<(u64, u64)>, targets: TargetUpdate) {
        self.target_updates_by_id.push((ids, targets));
    }

    /// Record a target update keyed by tag pattern.
    pub fn update_target_by_tag(&mut self, tag: &str, targets: TargetUpdate) -> Result<()> {
        self.target_updates_by_tag
            .push((RulePattern::new(tag)?, targets));
        Ok(())
    }

    /// Record a target update keyed by message pattern.
    pub fn update_target_by_msg(&mut self, msg: &str, targets: TargetUpdate) -> Result<()> {
        self.target_updates_by_msg
            .push((RulePattern::new(msg)?, targets));
        Ok(())
    }

    /// Record an action update for a rule id.
    pub fn update_action_by_id(&mut self, id: u64, actions: Vec<Action>) {
        self.action_updates_by_id.push((id, actions));
    }

    /// Whether a rule is removed by id, tag, or message.
    pub fn is_removed(&self, rule: &CompiledRule) -> bool {
        if let Some(id) = rule.id() {
            if self
                .removed_ids
                .iter()
                .any(|&(lo, hi)| (lo..=hi).contains(&id))
            {
                return true;
            }
        }
        if !self.removed_tags.is_empty()
            && rule
                .metadata
                .has_tag_matching(|t| self.removed_tags.iter().any(|p| p.matches(t)))
        {
            return true;
        }
        if let Some(ref msg) = rule.metadata.msg {
            let text = msg.source_text();
            if self.removed_msgs.iter().any(|p| p.matches(&text)) {
                return true;
            }
        }
        false
    }

    /// Apply target and action updates to a rule in place. Target updates
    /// on a chain apply to the head's selectors.
    pub fn apply_updates(&self, rule: &mut CompiledRule) {
        let id = rule.id();

        for (ranges, update) in &self.target_updates_by_id {
            if let Some(id) = id {
                if ranges.iter().any(|&(lo, hi)| (lo..=hi).contains(&id)) {
                    update.apply(&mut rule.variables);
                }
            }
        }
        for (pattern, update) in &self.target_updates_by_tag {
            if rule.metadata.has_tag_matching(|t| pattern.matches(t)) {
                update.apply(&mut rule.variables);
            }
        }
        for (pattern, update) in &self.target_updates_by_msg {
            if let Some(ref msg) = rule.metadata.msg {
                if pattern.matches(&msg.source_text()) {
                    update.apply(&mut rule.variables);
                }
            }
        }

        for (target_id, actions) in &self.action_updates_by_id {
            if id == Some(*target_id) {
                merge_actions(&mut rule.actions, actions);
                rule.metadata = crate::actions::RuleMetadata::from_actions(&rule.actions);
            }
        }
    }
}

/// Merge update actions over a rule's list: same-variant actions are
/// replaced, new ones appended (matching the default-action merge).
pub(crate) fn merge_actions(base: &mut Vec<Action>, updates: &[Action]) {
    for update in updates {
        base.retain(|a| !same_action_variant(a, update));
        base.push(update.clone());
    }
}

/// Discriminant comparison including the inner variant for nested enums,
/// so `msg` replaces `msg` but not `id`.
pub(crate) fn same_action_variant(a: &Action, b: &Action) -> bool {
    use std::mem::discriminant;
    match (a, b) {
        (Action::Metadata(ma), Action::Metadata(mb)) => discriminant(ma) == discriminant(mb),
        (Action::Disruptive(_), Action::Disruptive(_)) => true,
        (Action::Logging(la), Action::Logging(lb)) => {
            use crate::parser::LoggingAction::*;
            matches!((la, lb), (Log | NoLog, Log | NoLog))
                || matches!((la, lb), (AuditLog | NoAuditLog, AuditLog | NoAuditLog))
        }
        // Data, control, flow and transformation actions accumulate
        _ => false,
    }
}
