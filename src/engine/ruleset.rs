//! Ruleset building and the sealed phase index.
//!
//! The builder consumes parsed directives in load order: configuration
//! directives set engine flags, `SecDefaultAction` fills the per-phase
//! defaults merged into subsequently loaded rules, rules compile into
//! [`CompiledRule`]s bucketed by phase, and exception directives
//! accumulate into the overlay. `build()` seals the set: the overlay is
//! applied, marker positions are fixed up, and the id map is checked.

use super::exceptions::{merge_actions, ExceptionOverlay};
use super::phase::Phase;
use super::rule::{CompiledRule, RuleKind};
use crate::actions::{has_chain, has_disruptive, RuleMetadata};
use crate::error::{Error, Result, SourceLocation};
use crate::operators::compile_operator;
use crate::parser::{
    Action, ActionDirective, DataAction, Directive, MetadataAction, Parser, RuleDirective,
    RuleEngineMode, ScriptDirective, VariableSpec,
};
use crate::transformations::TransformationPipeline;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Audit engine modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditMode {
    /// Log every transaction.
    On,
    /// Log nothing.
    Off,
    /// Log transactions that matched a rule or were disrupted.
    #[default]
    RelevantOnly,
}

/// Engine configuration collected from directives.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Rule engine mode.
    pub engine_mode: RuleEngineMode,
    /// Whether the request body is inspected.
    pub request_body_access: bool,
    /// Whether the response body is inspected.
    pub response_body_access: bool,
    /// Request body size cap in bytes.
    pub request_body_limit: usize,
    /// Request body cap excluding file uploads.
    pub request_body_no_files_limit: usize,
    /// Response body size cap in bytes.
    pub response_body_limit: usize,
    /// Argument pair separator.
    pub argument_separator: char,
    /// Component signatures announced by the ruleset.
    pub component_signatures: Vec<String>,
    /// Debug log file.
    pub debug_log: Option<PathBuf>,
    /// Debug log verbosity (0-9).
    pub debug_log_level: u8,
    /// Audit engine mode.
    pub audit_engine: AuditMode,
    /// Audit log file.
    pub audit_log: Option<PathBuf>,
    /// Audit log part letters.
    pub audit_log_parts: String,
    /// GeoIP database path, handed to the host.
    pub geo_db: Option<PathBuf>,
    /// Unicode map file and code page.
    pub unicode_map: Option<(PathBuf, Option<u32>)>,
    /// Whether XML external entities are allowed.
    pub xml_external_entity: bool,
    /// Temporary directory.
    pub tmp_dir: Option<PathBuf>,
    /// Upload directory.
    pub upload_dir: Option<PathBuf>,
    /// Web application id (namespaces persistent collections).
    pub web_app_id: String,
    /// Persistent collection timeout (accepted for compatibility).
    pub collection_timeout: u64,
    /// Bound on compiled regex programs (SecPcreMatchLimit analog).
    pub regex_size_limit: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_mode: RuleEngineMode::On,
            request_body_access: false,
            response_body_access: false,
            request_body_limit: 134_217_728,
            request_body_no_files_limit: 1_048_576,
            response_body_limit: 524_288,
            argument_separator: '&',
            component_signatures: Vec::new(),
            debug_log: None,
            debug_log_level: 0,
            audit_engine: AuditMode::default(),
            audit_log: None,
            audit_log_parts: "ABIJDEFHZ".to_string(),
            geo_db: None,
            unicode_map: None,
            xml_external_entity: false,
            tmp_dir: None,
            upload_dir: None,
            web_app_id: "default".to_string(),
            collection_timeout: 3600,
            regex_size_limit: None,
        }
    }
}

/// Ruleset builder: applies directives, then seals.
pub struct RulesetBuilder {
    phases: [Vec<CompiledRule>; 5],
    markers: HashMap<String, [usize; 5]>,
    defaults: [Option<Vec<Action>>; 5],
    overlay: ExceptionOverlay,
    config: EngineConfig,
    chain_stack: Vec<CompiledRule>,
    next_slot: usize,
}

impl RulesetBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            phases: Default::default(),
            markers: HashMap::new(),
            defaults: Default::default(),
            overlay: ExceptionOverlay::new(),
            config: EngineConfig::default(),
            chain_stack: Vec::new(),
            next_slot: 0,
        }
    }

    /// Parse and apply configuration text.
    pub fn load_string(&mut self, text: &str) -> Result<&mut Self> {
        let mut parser = Parser::new();
        parser.parse(text)?;
        self.apply(parser.into_directives())?;
        Ok(self)
    }

    /// Remote rule loading entry point. Transport is the host's concern:
    /// fetch the document, verify it, and hand the text to
    /// [`load_string`](Self::load_string). Calling this directly reports
    /// the missing transport.
    pub fn load_remote(&mut self, url: &str, _key: &str) -> Result<&mut Self> {
        Err(Error::unsupported(
            "remote rules",
            format!(
                "no HTTPS transport is linked; fetch {} in the host and use load_string",
                url
            ),
        ))
    }

    /// Parse and apply a configuration file (glob patterns allowed).
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<&mut Self> {
        let mut parser = Parser::new();
        let path = path.as_ref();
        let text = path.to_string_lossy();
        if text.contains(['*', '?', '[']) {
            parser.parse_glob(&text)?;
        } else {
            parser.parse_file(path)?;
        }
        self.apply(parser.into_directives())?;
        Ok(self)
    }

    /// Apply parsed directives in order.
    pub fn apply(&mut self, directives: Vec<Directive>) -> Result<()> {
        for directive in directives {
            self.apply_directive(directive)?;
        }
        Ok(())
    }

    fn apply_directive(&mut self, directive: Directive) -> Result<()> {
        match directive {
            Directive::Rule(rule) => self.add_operator_rule(rule),
            Directive::ActionRule(rule) => self.add_action_rule(rule),
            Directive::ScriptRule(rule) => self.add_script_rule(rule),
            Directive::Marker(label) => {
                self.finish_chain()?;
                let positions =
                    std::array::from_fn(|i| self.phases[i].len());
                self.markers.insert(label, positions);
                Ok(())
            }
            Directive::DefaultAction { actions, location } => {
                self.set_default_action(actions, &location)
            }
            Directive::EngineMode(mode) => {
                self.config.engine_mode = mode;
                Ok(())
            }
            Directive::RequestBodyAccess(v) => {
                self.config.request_body_access = v;
                Ok(())
            }
            Directive::ResponseBodyAccess(v) => {
                self.config.response_body_access = v;
                Ok(())
            }
            Directive::RequestBodyLimit(v) => {
                self.config.request_body_limit = v;
                Ok(())
            }
            Directive::RequestBodyNoFilesLimit(v) => {
                self.config.request_body_no_files_limit = v;
                Ok(())
            }
            Directive::ResponseBodyLimit(v) => {
                self.config.response_body_limit = v;
                Ok(())
            }
            Directive::ArgumentSeparator(c) => {
                self.config.argument_separator = c;
                Ok(())
            }
            Directive::ComponentSignature(sig) => {
                self.config.component_signatures.push(sig);
                Ok(())
            }
            Directive::DebugLog(path) => {
                self.config.debug_log = Some(path);
                Ok(())
            }
            Directive::DebugLogLevel(level) => {
                self.config.debug_log_level = level;
                Ok(())
            }
            Directive::AuditEngine(mode) => {
                self.config.audit_engine = match mode.to_ascii_lowercase().as_str() {
                    "on" => AuditMode::On,
                    "off" => AuditMode::Off,
                    _ => AuditMode::RelevantOnly,
                };
                Ok(())
            }
            Directive::AuditLog(path) => {
                self.config.audit_log = Some(path);
                Ok(())
            }
            Directive::AuditLogParts(parts) => {
                self.config.audit_log_parts = parts;
                Ok(())
            }
            Directive::GeoLookupDb(path) => {
                self.config.geo_db = Some(path);
                Ok(())
            }
            Directive::UnicodeMapFile { path, code_page } => {
                self.config.unicode_map = Some((path, code_page));
                Ok(())
            }
            Directive::XmlExternalEntity(v) => {
                self.config.xml_external_entity = v;
                Ok(())
            }
            Directive::TmpDir(path) => {
                self.config.tmp_dir = Some(path);
                Ok(())
            }
            Directive::UploadDir(path) => {
                self.config.upload_dir = Some(path);
                Ok(())
            }
            Directive::WebAppId(id) => {
                self.config.web_app_id = id;
                Ok(())
            }
            Directive::CollectionTimeout(seconds) => {
                self.config.collection_timeout = seconds;
                Ok(())
            }
            Directive::PcreMatchLimit(limit) => {
                self.config.regex_size_limit = Some(limit as usize);
                Ok(())
            }
            Directive::RemoveById(ranges) => {
                self.overlay.remove_ids(&ranges);
                Ok(())
            }
            Directive::RemoveByTag(pattern) => self.overlay.remove_tag(&pattern),
            Directive::RemoveByMsg(pattern) => self.overlay.remove_msg(&pattern),
            Directive::UpdateTargetById { ids, targets } => {
                self.overlay.update_target_by_id(ids, targets);
                Ok(())
            }
            Directive::UpdateTargetByTag { tag, targets } => {
                self.overlay.update_target_by_tag(&tag, targets)
            }
            Directive::UpdateTargetByMsg { msg, targets } => {
                self.overlay.update_target_by_msg(&msg, targets)
            }
            Directive::UpdateActionById { id, actions } => {
                self.overlay.update_action_by_id(id, actions);
                Ok(())
            }
            Directive::Include(_) => Ok(()),
        }
    }

    fn set_default_action(
        &mut self,
        actions: Vec<Action>,
        location: &SourceLocation,
    ) -> Result<()> {
        let phase = actions
            .iter()
            .find_map(|a| match a {
                Action::Metadata(MetadataAction::Phase(p)) => Some(*p),
                _ => None,
            })
            .ok_or_else(|| {
                Error::parse("SecDefaultAction must name a phase", location.to_string())
            })?;
        let phase = Phase::from_number(phase).ok_or_else(|| Error::InvalidDefaultAction {
            phase,
            message: "phase out of range".to_string(),
        })?;

        if self.defaults[phase.index()].is_some() {
            return Err(Error::DuplicateDefaultAction {
                phase: phase.number(),
            });
        }
        if !has_disruptive(&actions) {
            return Err(Error::InvalidDefaultAction {
                phase: phase.number(),
                message: "missing a disruptive action".to_string(),
            });
        }
        if actions
            .iter()
            .any(|a| matches!(a, Action::Transformation(t) if t.eq_ignore_ascii_case("none")))
        {
            return Err(Error::InvalidDefaultAction {
                phase: phase.number(),
                message: "t:none is not allowed here".to_string(),
            });
        }
        if has_chain(&actions) {
            return Err(Error::InvalidDefaultAction {
                phase: phase.number(),
                message: "chain is not allowed here".to_string(),
            });
        }

        self.defaults[phase.index()] = Some(actions);
        Ok(())
    }

    fn add_operator_rule(&mut self, rule: RuleDirective) -> Result<()> {
        let compiled = self.compile_rule(
            RuleKind::Operator,
            rule.variables,
            Some(&rule.operator),
            rule.actions,
            rule.location,
        )?;
        self.insert_rule(compiled)
    }

    fn add_action_rule(&mut self, rule: ActionDirective) -> Result<()> {
        let compiled = self.compile_rule(
            RuleKind::Unconditional,
            Vec::new(),
            None,
            rule.actions,
            rule.location,
        )?;
        self.insert_rule(compiled)
    }

    fn add_script_rule(&mut self, rule: ScriptDirective) -> Result<()> {
        let compiled = self.compile_rule(
            RuleKind::Script(rule.path),
            Vec::new(),
            None,
            rule.actions,
            rule.location,
        )?;
        self.insert_rule(compiled)
    }

    fn compile_rule(
        &mut self,
        kind: RuleKind,
        variables: Vec<VariableSpec>,
        operator: Option<&crate::parser::OperatorSpec>,
        actions: Vec<Action>,
        location: SourceLocation,
    ) -> Result<CompiledRule> {
        // Chain tails inherit the head's phase; top-level rules declare
        // their own (defaulting to phase 2).
        let own_phase = actions.iter().find_map(|a| match a {
            Action::Metadata(MetadataAction::Phase(p)) => Phase::from_number(*p),
            _ => None,
        });
        let phase = match self.chain_stack.last() {
            Some(head) => head.phase,
            None => own_phase.unwrap_or_default(),
        };

        // Merge the phase defaults under the rule's own actions.
        let mut merged = self.defaults[phase.index()].clone().unwrap_or_default();
        merge_actions(&mut merged, &actions);

        let transformations = TransformationPipeline::from_names(
            &merged
                .iter()
                .filter_map(|a| match a {
                    Action::Transformation(name) => Some(name.clone()),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )?;

        let compiled_operator = operator
            .map(|spec| compile_operator(spec, self.config.regex_size_limit))
            .transpose()?;
        let negated = operator.map(|spec| spec.negated).unwrap_or(false);

        let metadata = RuleMetadata::from_actions(&merged);
        let capture = merged
            .iter()
            .any(|a| matches!(a, Action::Data(DataAction::Capture)));
        let multi_match = merged
            .iter()
            .any(|a| matches!(a, Action::Data(DataAction::MultiMatch)));

        let slot = self.next_slot;
        self.next_slot += 1;

        Ok(CompiledRule {
            kind,
            phase,
            variables,
            operator: compiled_operator,
            negated,
            transformations,
            actions: merged,
            metadata,
            capture,
            multi_match,
            chain: None,
            slot,
            location,
        })
    }

    fn insert_rule(&mut self, rule: CompiledRule) -> Result<()> {
        let chains = has_chain(&rule.actions);

        if chains {
            self.chain_stack.push(rule);
            return Ok(());
        }

        if self.chain_stack.is_empty() {
            let phase = rule.phase;
            self.phases[phase.index()].push(rule);
            return Ok(());
        }

        // This rule terminates the chain: fold the stack into a single
        // head-owned list.
        let mut tail = rule;
        while let Some(mut head) = self.chain_stack.pop() {
            head.chain = Some(Box::new(tail));
            tail = head;
        }
        let phase = tail.phase;
        self.phases[phase.index()].push(tail);
        Ok(())
    }

    fn finish_chain(&mut self) -> Result<()> {
        if self.chain_stack.is_empty() {
            Ok(())
        } else {
            Err(Error::IncompleteChain)
        }
    }

    /// Seal the ruleset: apply the exception overlay, fix up markers,
    /// check id uniqueness.
    pub fn build(mut self) -> Result<Ruleset> {
        self.finish_chain()?;

        let overlay = std::mem::take(&mut self.overlay);
        let mut markers = self.markers;

        for (phase_idx, rules) in self.phases.iter_mut().enumerate() {
            // Removals shift indices; adjust marker positions past them.
            let removed_positions: Vec<usize> = rules
                .iter()
                .enumerate()
                .filter(|(_, r)| overlay.is_removed(r))
                .map(|(i, _)| i)
                .collect();
            if !removed_positions.is_empty() {
                for positions in markers.values_mut() {
                    let shift = removed_positions
                        .iter()
                        .filter(|&&p| p < positions[phase_idx])
                        .count();
                    positions[phase_idx] -= shift;
                }
            }

            rules.retain(|r| !overlay.is_removed(r));
            for rule in rules.iter_mut() {
                overlay.apply_updates(rule);
            }
        }

        let mut by_id = HashMap::new();
        for (phase_idx, rules) in self.phases.iter().enumerate() {
            for (rule_idx, rule) in rules.iter().enumerate() {
                for link in rule.links() {
                    if let Some(id) = link.id() {
                        if by_id.insert(id, (phase_idx, rule_idx)).is_some() {
                            return Err(Error::DuplicateRuleId { id });
                        }
                    }
                }
            }
        }

        Ok(Ruleset {
            phases: self.phases,
            markers,
            by_id,
            config: self.config,
        })
    }
}

impl Default for RulesetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A sealed, immutable ruleset shared across transactions.
pub struct Ruleset {
    phases: [Vec<CompiledRule>; 5],
    markers: HashMap<String, [usize; 5]>,
    by_id: HashMap<u64, (usize, usize)>,
    /// Engine configuration.
    pub config: EngineConfig,
}

impl Ruleset {
    /// Build a ruleset from configuration text.
    pub fn from_string(text: &str) -> Result<Self> {
        let mut builder = RulesetBuilder::new();
        builder.load_string(text)?;
        builder.build()
    }

    /// Build a ruleset from a file or glob.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut builder = RulesetBuilder::new();
        builder.load_file(path)?;
        builder.build()
    }

    /// Rules of a phase, in source order.
    pub fn phase_rules(&self, phase: Phase) -> &[CompiledRule] {
        &self.phases[phase.index()]
    }

    /// Position just past a marker within a phase.
    pub fn marker_position(&self, label: &str, phase: Phase) -> Option<usize> {
        self.markers.get(label).map(|p| p[phase.index()])
    }

    /// Total number of top-level rules.
    pub fn rule_count(&self) -> usize {
        self.phases.iter().map(Vec::len).sum()
    }

    /// Look up a rule by id.
    pub fn rule_by_id(&self, id: u64) -> Option<&CompiledRule> {
        self.by_id
            .get(&id)
            .map(|&(phase_idx, rule_idx)| &self.phases[phase_idx][rule_idx])
    }
}

impl std::fmt::Debug for Ruleset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ruleset")
            .field("rule_count", &self.rule_count())
            .field("engine_mode", &self.config.engine_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_simple_rule() {
        let ruleset = Ruleset::from_string(
            r#"SecRule REQUEST_URI "@contains /admin" "id:1,phase:1,deny""#,
        )
        .unwrap();
        assert_eq!(ruleset.rule_count(), 1);
        let rules = ruleset.phase_rules(Phase::RequestHeaders);
        assert_eq!(rules[0].id(), Some(1));
    }

    #[test]
    fn test_phase_bucketing() {
        let ruleset = Ruleset::from_string(
            r#"
SecRule REQUEST_URI "@contains a" "id:1,phase:1,pass"
SecRule ARGS "@contains b" "id:2,phase:2,pass"
SecRule RESPONSE_BODY "@contains c" "id:3,phase:4,pass"
"#,
        )
        .unwrap();
        assert_eq!(ruleset.phase_rules(Phase::RequestHeaders).len(), 1);
        assert_eq!(ruleset.phase_rules(Phase::RequestBody).len(), 1);
        assert_eq!(ruleset.phase_rules(Phase::ResponseBody).len(), 1);
    }

    #[test]
    fn test_default_phase_is_two() {
        let ruleset =
            Ruleset::from_string(r#"SecRule ARGS "@contains x" "id:1,pass""#).unwrap();
        assert_eq!(ruleset.phase_rules(Phase::RequestBody).len(), 1);
    }

    #[test]
    fn test_chain_folding() {
        let ruleset = Ruleset::from_string(
            r#"
SecRule REQUEST_METHOD "@streq POST" "id:4,phase:2,chain,deny"
SecRule ARGS:token "@streq bad" "t:none"
SecRule ARGS "@contains x" "id:5,phase:2,pass"
"#,
        )
        .unwrap();
        let rules = ruleset.phase_rules(Phase::RequestBody);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].chain_len(), 2);
        assert_eq!(rules[0].id(), Some(4));
        let child = rules[0].chain.as_ref().unwrap();
        assert_eq!(child.phase, Phase::RequestBody);
        assert!(child.transformations.is_empty());
    }

    #[test]
    fn test_incomplete_chain_fails() {
        let result = Ruleset::from_string(
            r#"SecRule REQUEST_METHOD "@streq POST" "id:4,phase:2,chain,deny""#,
        );
        assert!(matches!(result, Err(Error::IncompleteChain)));
    }

    #[test]
    fn test_duplicate_id_fails() {
        let result = Ruleset::from_string(
            r#"
SecRule ARGS "@contains a" "id:7,pass"
SecRule ARGS "@contains b" "id:7,pass"
"#,
        );
        assert!(matches!(result, Err(Error::DuplicateRuleId { id: 7 })));
    }

    #[test]
    fn test_default_action_merge() {
        let ruleset = Ruleset::from_string(
            r#"
SecDefaultAction "phase:2,log,deny,status:403"
SecRule ARGS:id "@eq 0" "id:3"
"#,
        )
        .unwrap();
        let rule = &ruleset.phase_rules(Phase::RequestBody)[0];
        assert!(has_disruptive(&rule.actions));
        assert_eq!(rule.metadata.status, Some(403));
        assert_eq!(rule.metadata.log, Some(true));
    }

    #[test]
    fn test_rule_disruptive_overrides_default() {
        let ruleset = Ruleset::from_string(
            r#"
SecDefaultAction "phase:2,log,deny,status:403"
SecRule ARGS "@contains x" "id:3,pass"
"#,
        )
        .unwrap();
        let rule = &ruleset.phase_rules(Phase::RequestBody)[0];
        let disruptives: Vec<_> = rule.actions.iter().filter(|a| a.is_disruptive()).collect();
        assert_eq!(disruptives.len(), 1);
        assert!(matches!(
            disruptives[0],
            Action::Disruptive(crate::parser::DisruptiveAction::Pass)
        ));
    }

    #[test]
    fn test_duplicate_default_action_fails() {
        let result = Ruleset::from_string(
            r#"
SecDefaultAction "phase:2,log,deny,status:403"
SecDefaultAction "phase:2,nolog,pass"
"#,
        );
        assert!(matches!(
            result,
            Err(Error::DuplicateDefaultAction { phase: 2 })
        ));
    }

    #[test]
    fn test_default_action_per_phase_is_independent() {
        let ruleset = Ruleset::from_string(
            r#"
SecDefaultAction "phase:1,log,deny,status:401"
SecDefaultAction "phase:2,log,deny,status:403"
"#,
        )
        .unwrap();
        assert_eq!(ruleset.rule_count(), 0);
    }

    #[test]
    fn test_default_action_requires_disruptive() {
        let result = Ruleset::from_string(r#"SecDefaultAction "phase:2,log""#);
        assert!(matches!(result, Err(Error::InvalidDefaultAction { .. })));
    }

    #[test]
    fn test_default_action_rejects_none_transform() {
        let result = Ruleset::from_string(r#"SecDefaultAction "phase:2,deny,t:none""#);
        assert!(matches!(result, Err(Error::InvalidDefaultAction { .. })));
    }

    #[test]
    fn test_remove_by_id_overlay() {
        let ruleset = Ruleset::from_string(
            r#"
SecRule ARGS "@contains a" "id:100,pass"
SecRule ARGS "@contains b" "id:101,pass"
SecRuleRemoveById 100
"#,
        )
        .unwrap();
        assert_eq!(ruleset.rule_count(), 1);
        assert!(ruleset.rule_by_id(100).is_none());
        assert!(ruleset.rule_by_id(101).is_some());
    }

    #[test]
    fn test_remove_by_tag_overlay() {
        let ruleset = Ruleset::from_string(
            r#"
SecRule ARGS "@contains a" "id:100,tag:attack-sqli,pass"
SecRule ARGS "@contains b" "id:101,tag:attack-xss,pass"
SecRuleRemoveByTag attack-sqli
"#,
        )
        .unwrap();
        assert_eq!(ruleset.rule_count(), 1);
        assert!(ruleset.rule_by_id(101).is_some());
    }

    #[test]
    fn test_update_target_adds_exclusion() {
        let ruleset = Ruleset::from_string(
            r#"
SecRule ARGS "@contains attack" "id:200,pass"
SecRuleUpdateTargetById 200 "!ARGS:safe"
"#,
        )
        .unwrap();
        let rule = ruleset.rule_by_id(200).unwrap();
        assert_eq!(rule.variables[0].exclusions.len(), 1);
    }

    #[test]
    fn test_update_action_by_id() {
        let ruleset = Ruleset::from_string(
            r#"
SecRule ARGS "@contains attack" "id:300,deny,status:403"
SecRuleUpdateActionById 300 "pass,msg:'downgraded'"
"#,
        )
        .unwrap();
        let rule = ruleset.rule_by_id(300).unwrap();
        assert!(matches!(
            rule.actions.iter().find(|a| a.is_disruptive()),
            Some(Action::Disruptive(crate::parser::DisruptiveAction::Pass))
        ));
        assert_eq!(rule.metadata.msg.as_ref().unwrap().source_text(), "downgraded");
    }

    #[test]
    fn test_marker_positions() {
        let ruleset = Ruleset::from_string(
            r#"
SecRule ARGS "@contains a" "id:1,phase:2,pass"
SecMarker END_CHECKS
SecRule ARGS "@contains b" "id:2,phase:2,pass"
"#,
        )
        .unwrap();
        assert_eq!(
            ruleset.marker_position("END_CHECKS", Phase::RequestBody),
            Some(1)
        );
        assert_eq!(
            ruleset.marker_position("END_CHECKS", Phase::RequestHeaders),
            Some(0)
        );
        assert_eq!(ruleset.marker_position("MISSING", Phase::RequestBody), None);
    }

    #[test]
    fn test_marker_adjusts_for_removed_rules() {
        let ruleset = Ruleset::from_string(
            r#"
SecRule ARGS "@contains a" "id:1,phase:2,pass"
SecRule ARGS "@contains b" "id:2,phase:2,pass"
SecMarker AFTER_TWO
SecRule ARGS "@contains c" "id:3,phase:2,pass"
SecRuleRemoveById 1
"#,
        )
        .unwrap();
        assert_eq!(
            ruleset.marker_position("AFTER_TWO", Phase::RequestBody),
            Some(1)
        );
    }

    #[test]
    fn test_script_rule_compiles() {
        let ruleset = Ruleset::from_string(
            r#"SecRuleScript /opt/rules/check.lua "id:900,phase:1,nolog,pass,setvar:tx.scripted=1""#,
        )
        .unwrap();
        let rules = ruleset.phase_rules(Phase::RequestHeaders);
        assert_eq!(rules.len(), 1);
        assert!(matches!(rules[0].kind, RuleKind::Script(_)));
        assert!(rules[0].operator.is_none());
    }

    #[test]
    fn test_flow_action_in_defaults_rejected() {
        let result = Ruleset::from_string(r#"SecDefaultAction "phase:2,deny,chain""#);
        assert!(matches!(result, Err(Error::InvalidDefaultAction { .. })));
    }

    #[test]
    fn test_unsupported_operator_fails_load() {
        let result =
            Ruleset::from_string(r#"SecRule ARGS "@rsub s/a/b/" "id:1,pass""#);
        assert!(matches!(result, Err(Error::Unsupported { .. })));
    }

    #[test]
    fn test_config_directives() {
        let ruleset = Ruleset::from_string(
            r#"
SecRuleEngine DetectionOnly
SecRequestBodyAccess On
SecRequestBodyLimit 1048576
SecArgumentSeparator ;
SecComponentSignature "CRS/4.0"
SecWebAppId shop
"#,
        )
        .unwrap();
        assert_eq!(ruleset.config.engine_mode, RuleEngineMode::DetectionOnly);
        assert!(ruleset.config.request_body_access);
        assert_eq!(ruleset.config.request_body_limit, 1_048_576);
        assert_eq!(ruleset.config.argument_separator, ';');
        assert_eq!(ruleset.config.component_signatures, vec!["CRS/4.0"]);
        assert_eq!(ruleset.config.web_app_id, "shop");
    }
}
