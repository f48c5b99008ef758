//! Transaction processing.
//!
//! A transaction owns all per-request state and walks each phase's rules
//! in source order. Chains are evaluated head-first with the all-links
//! rule: on-match actions fire only when every link matched, while
//! capture bindings and MATCHED_VAR updates happen per link so later
//! links can see them.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use super::intervention::Intervention;
use super::phase::Phase;
use super::rule::{CompiledRule, RuleKind};
use super::ruleset::{AuditMode, Ruleset};
use crate::actions::{DisruptiveOutcome, FlowOutcome, Severity};
use crate::error::{Error, Result};
use crate::host::{AuditRecord, HostCallbacks};
use crate::operators::EvalContext;
use crate::parser::{
    parse_update_targets, Action, AllowScope, ApplicationTime, BodyProcessor, ControlAction,
    DataAction, RuleEngineMode, RunTimeString, SetVarValue, VariableSpec,
};
use crate::variables::{
    CollectionStore, MutableCollection, OrderedCollection, RequestData, Resolver, ResponseData,
    TimeInfo, TxCollection, VariableValue,
};

/// Per-transaction control state mutated by `ctl:` actions.
#[derive(Debug, Default)]
struct TransactionControl {
    engine_mode: Option<RuleEngineMode>,
    request_body_access: Option<bool>,
    response_body_access: Option<bool>,
    removed_rules: Vec<(u64, u64)>,
    removed_tags: Vec<String>,
    removed_targets: Vec<(u64, String)>,
    audit_engine: Option<AuditMode>,
    audit_log_parts: Option<String>,
    body_processor: Option<BodyProcessor>,
}

/// Per-transaction transformation cache, keyed by the value origin, a
/// hash of the raw value, and a running hash of the transformation-name
/// prefix, so rules sharing a pipeline prefix over the same value reuse
/// each step. Hashing the raw bytes into the key keeps mutable origins
/// honest: once `setvar` changes `TX:x`, the next read misses instead of
/// replaying the pre-mutation result.
#[derive(Debug, Default)]
struct TransformCache {
    map: HashMap<(String, u64), String>,
}

impl TransformCache {
    /// FNV-1a fold of one component into the running hash.
    fn fold(hash: u64, component: &str) -> u64 {
        let mut hash = hash;
        for b in component.bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash ^ 0xff
    }

    fn transformed(
        &mut self,
        pipeline: &crate::transformations::TransformationPipeline,
        origin: &str,
        raw: &str,
    ) -> String {
        if pipeline.is_empty() {
            return raw.to_string();
        }

        let mut prefix_hash = Self::fold(0xcbf2_9ce4_8422_2325, raw);
        let mut current: Option<String> = None;
        for t in pipeline.transforms() {
            prefix_hash = Self::fold(prefix_hash, t.name());
            let key = (origin.to_string(), prefix_hash);
            if let Some(cached) = self.map.get(&key) {
                current = Some(cached.clone());
                continue;
            }
            let input = current.as_deref().unwrap_or(raw);
            let next = t.transform(input).into_owned();
            self.map.insert(key, next.clone());
            current = Some(next);
        }
        current.unwrap_or_else(|| raw.to_string())
    }
}

/// Result of one chain evaluation.
#[derive(Debug, Default)]
struct RuleOutcome {
    matched: bool,
    disruptive: Option<DisruptiveOutcome>,
    flow: FlowOutcome,
}

/// A single request/response evaluated against a shared ruleset.
pub struct Transaction {
    ruleset: Arc<Ruleset>,
    host: Arc<dyn HostCallbacks>,
    store: Arc<dyn CollectionStore>,
    request: RequestData,
    response: ResponseData,
    tx: TxCollection,
    env: OrderedCollection,
    geo: OrderedCollection,
    persistent: HashMap<String, OrderedCollection>,
    persistent_scopes: HashMap<String, String>,
    rule_meta: OrderedCollection,
    matched_var: Option<VariableValue>,
    matched_vars: Vec<VariableValue>,
    matched_rule_ids: Vec<u64>,
    highest_severity: Option<u8>,
    control: TransactionControl,
    cache: TransformCache,
    phase: Phase,
    intervention: Option<Intervention>,
    allow_scope: Option<AllowScope>,
    time: TimeInfo,
    unique_id: String,
}

impl Transaction {
    /// Create a transaction against a sealed ruleset.
    pub fn new(
        ruleset: Arc<Ruleset>,
        host: Arc<dyn HostCallbacks>,
        store: Arc<dyn CollectionStore>,
    ) -> Self {
        let time = TimeInfo::now();
        let unique_id = time.unique_id();
        let mut request = RequestData::new();
        request.arg_separator = ruleset.config.argument_separator;

        Self {
            ruleset,
            host,
            store,
            request,
            response: ResponseData::new(),
            tx: TxCollection::new(),
            env: OrderedCollection::new(),
            geo: OrderedCollection::new(),
            persistent: HashMap::new(),
            persistent_scopes: HashMap::new(),
            rule_meta: OrderedCollection::new(),
            matched_var: None,
            matched_vars: Vec::new(),
            matched_rule_ids: Vec::new(),
            highest_severity: None,
            control: TransactionControl::default(),
            cache: TransformCache::default(),
            phase: Phase::RequestHeaders,
            intervention: None,
            allow_scope: None,
            time,
            unique_id,
        }
    }

    /// Record the connection endpoints. No rules run here.
    pub fn process_connection(
        &mut self,
        client_ip: &str,
        client_port: u16,
        server_ip: &str,
        server_port: u16,
    ) -> Result<bool> {
        self.request.client_ip = client_ip.to_string();
        self.request.client_port = client_port;
        self.request.server_ip = server_ip.to_string();
        self.request.server_port = server_port;
        Ok(self.is_disrupted())
    }

    /// Record the request line.
    pub fn process_uri(&mut self, uri: &str, method: &str, protocol: &str) -> Result<bool> {
        self.request.method = method.to_string();
        self.request.protocol = protocol.to_string();
        self.request.set_uri(uri);
        Ok(self.is_disrupted())
    }

    /// Record one request header.
    pub fn add_request_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.request.add_header(name, value);
        Ok(())
    }

    /// Run phase 1.
    pub fn process_request_headers(&mut self) -> Result<bool> {
        self.run_phase(Phase::RequestHeaders)?;
        Ok(self.is_disrupted())
    }

    /// Buffer request body bytes, honoring access and size limits.
    pub fn append_request_body(&mut self, data: &[u8]) -> Result<()> {
        if !self.request_body_access() {
            return Ok(());
        }
        let limit = self.ruleset.config.request_body_limit;
        let room = limit.saturating_sub(self.request.body.len());
        if data.len() > room {
            self.debug(2, "request body limit reached, truncating");
        }
        self.request.append_body(&data[..data.len().min(room)]);
        Ok(())
    }

    /// Parse the buffered body and run phase 2.
    pub fn process_request_body(&mut self) -> Result<bool> {
        if self.request_body_access() && !self.request.body.is_empty() {
            let processor = self.control.body_processor.unwrap_or_else(|| {
                let form = self
                    .request
                    .headers
                    .first("content-type")
                    .map(|ct| ct.contains("application/x-www-form-urlencoded"))
                    .unwrap_or(false);
                if form {
                    BodyProcessor::UrlEncoded
                } else {
                    BodyProcessor::Multipart
                }
            });
            match processor {
                BodyProcessor::UrlEncoded => self.request.parse_form_body(),
                // No JSON/XML/multipart processors are wired in; the raw
                // body stays inspectable through REQUEST_BODY.
                _ => self.debug(4, "request body left unparsed"),
            }
        }
        self.run_phase(Phase::RequestBody)?;
        Ok(self.is_disrupted())
    }

    /// Record one response header.
    pub fn add_response_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.response.add_header(name, value);
        Ok(())
    }

    /// Record the status line and run phase 3.
    pub fn process_response_headers(&mut self, status: u16, protocol: &str) -> Result<bool> {
        self.response.status = status;
        self.response.protocol = protocol.to_string();
        self.run_phase(Phase::ResponseHeaders)?;
        Ok(self.is_disrupted())
    }

    /// Buffer response body bytes, honoring access and size limits.
    pub fn append_response_body(&mut self, data: &[u8]) -> Result<()> {
        if !self.response_body_access() {
            return Ok(());
        }
        let limit = self.ruleset.config.response_body_limit;
        let room = limit.saturating_sub(self.response.body.len());
        if data.len() > room {
            self.debug(2, "response body limit reached, truncating");
        }
        self.response.append_body(&data[..data.len().min(room)]);
        Ok(())
    }

    /// Run phase 4.
    pub fn process_response_body(&mut self) -> Result<bool> {
        self.run_phase(Phase::ResponseBody)?;
        Ok(self.is_disrupted())
    }

    /// Run phase 5 and emit the audit record.
    pub fn process_logging(&mut self) -> Result<bool> {
        self.run_phase(Phase::Logging)?;
        self.emit_audit_record();
        Ok(self.is_disrupted())
    }

    /// The pending intervention, if any.
    pub fn intervention(&self) -> Option<&Intervention> {
        self.intervention.as_ref()
    }

    /// Whether a disruptive intervention is pending.
    pub fn is_disrupted(&self) -> bool {
        self.intervention
            .as_ref()
            .map(|i| i.disruptive)
            .unwrap_or(false)
    }

    /// Ids of matched rules, in match order.
    pub fn matched_rules(&self) -> &[u64] {
        &self.matched_rule_ids
    }

    /// The transaction unique id.
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Read access to the TX collection.
    pub fn tx(&self) -> &TxCollection {
        &self.tx
    }

    /// Set a transaction environment variable (ENV).
    pub fn set_env(&mut self, name: &str, value: &str) {
        self.env.set(name.to_string(), value.to_string());
    }

    // ---- phase driver ----

    fn run_phase(&mut self, phase: Phase) -> Result<()> {
        self.phase = phase;

        match self.allow_scope {
            Some(AllowScope::Transaction) if phase != Phase::Logging => return Ok(()),
            Some(AllowScope::Request) if phase.is_request_phase() => return Ok(()),
            _ => {}
        }
        if self.is_disrupted() && phase != Phase::Logging {
            return Ok(());
        }
        if self.effective_engine_mode() == RuleEngineMode::Off {
            return Ok(());
        }

        let ruleset = Arc::clone(&self.ruleset);
        let rules = ruleset.phase_rules(phase);

        let mut idx = 0;
        let mut skip_remaining: u32 = 0;
        while idx < rules.len() {
            let rule = &rules[idx];

            if skip_remaining > 0 {
                skip_remaining -= 1;
                idx += 1;
                continue;
            }
            if self.rule_disabled(rule) {
                idx += 1;
                continue;
            }

            let outcome = self.execute_chain(rule)?;

            if outcome.matched {
                if let Some(disruptive) = outcome.disruptive {
                    match disruptive {
                        DisruptiveOutcome::Pass => {}
                        DisruptiveOutcome::Allow(scope) => {
                            match scope {
                                AllowScope::Phase => {}
                                scope => self.allow_scope = Some(scope),
                            }
                            return Ok(());
                        }
                        blocking => {
                            let enforced =
                                self.effective_engine_mode() == RuleEngineMode::On;
                            self.record_intervention(rule, blocking, enforced);
                            if enforced {
                                return Ok(());
                            }
                        }
                    }
                }

                match &outcome.flow {
                    FlowOutcome::Skip(n) => skip_remaining = *n,
                    FlowOutcome::SkipAfter(label) => {
                        if let Some(pos) = self.skip_after_position(&ruleset, rules, idx, label)
                        {
                            idx = pos;
                            continue;
                        }
                        self.debug(3, &format!("skipAfter target '{}' not found", label));
                    }
                    FlowOutcome::Continue => {}
                }
            }

            idx += 1;
        }

        Ok(())
    }

    /// Position strictly after a `skipAfter` target: a marker with the
    /// label, or the rule whose id spells it.
    fn skip_after_position(
        &self,
        ruleset: &Ruleset,
        rules: &[CompiledRule],
        idx: usize,
        label: &str,
    ) -> Option<usize> {
        if let Some(pos) = ruleset.marker_position(label, self.phase) {
            if pos > idx {
                return Some(pos);
            }
        }
        rules
            .iter()
            .enumerate()
            .skip(idx + 1)
            .find(|(_, r)| r.id().map(|id| id.to_string()).as_deref() == Some(label))
            .map(|(pos, _)| pos + 1)
    }

    fn execute_chain(&mut self, rule: &CompiledRule) -> Result<RuleOutcome> {
        let links: Vec<&CompiledRule> = rule.links().collect();

        for &link in &links {
            self.set_rule_collection(link, rule);
            if !self.link_matches(link)? {
                return Ok(RuleOutcome::default());
            }
        }

        let mut outcome = RuleOutcome {
            matched: true,
            ..RuleOutcome::default()
        };
        for &link in &links {
            self.run_on_match_actions(link, &mut outcome);
        }

        if let Some(id) = rule.id() {
            self.matched_rule_ids.push(id);
        }
        if let Some(severity) = rule.metadata.severity {
            self.highest_severity = Some(match self.highest_severity {
                Some(current) => current.min(severity),
                None => severity,
            });
        }
        if rule.metadata.log != Some(false) {
            let msg = rule
                .metadata
                .msg
                .as_ref()
                .map(|m| self.expand(m))
                .unwrap_or_default();
            self.debug(
                4,
                &format!(
                    "rule {} matched {} {}",
                    rule.id().map(|i| i.to_string()).unwrap_or_default(),
                    msg,
                    rule.metadata.format_log()
                ),
            );
        }

        Ok(outcome)
    }

    /// Evaluate one link's predicate, updating match state on success.
    fn link_matches(&mut self, link: &CompiledRule) -> Result<bool> {
        match link.kind {
            RuleKind::Unconditional => return Ok(true),
            RuleKind::Script(ref path) => {
                // The script hook is host-mediated; the execution point
                // itself always fires.
                self.debug(4, &format!("script rule {} fires", path.display()));
                return Ok(true);
            }
            RuleKind::Operator => {}
        }

        let operator = link
            .operator
            .as_ref()
            .ok_or_else(|| Error::Internal {
                message: "operator rule without compiled operator".to_string(),
            })?
            .clone();

        let specs = self.effective_specs(link);

        let mut matches: Vec<(VariableValue, crate::operators::OperatorResult)> = Vec::new();
        {
            let resolver = Resolver {
                request: &self.request,
                response: &self.response,
                tx: &self.tx,
                env: &self.env,
                geo: &self.geo,
                persistent: &self.persistent,
                rule_meta: &self.rule_meta,
                matched_var: self.matched_var.as_ref(),
                matched_vars: &self.matched_vars,
                time: &self.time,
                unique_id: &self.unique_id,
                highest_severity: self.highest_severity,
            };
            let cache = &mut self.cache;
            let host = &*self.host;
            let lookup = |name: &str| resolver.lookup(name);
            let ctx = EvalContext::new(host, &lookup);

            for spec in specs.iter() {
                for value in resolver.resolve(spec) {
                    let candidates: Vec<String> = if link.multi_match {
                        let mut steps = vec![value.value.clone()];
                        steps.extend(link.transformations.apply_stepwise(&value.value));
                        steps
                    } else {
                        vec![cache.transformed(
                            &link.transformations,
                            &value.origin,
                            &value.value,
                        )]
                    };

                    for candidate in candidates {
                        let result = operator.evaluate(&candidate, &ctx);
                        if result.matched != link.negated {
                            matches.push((value.clone(), result));
                            break;
                        }
                    }
                }
            }
        }

        if matches.is_empty() {
            return Ok(false);
        }

        for (value, _) in &matches {
            self.matched_vars.push(value.clone());
        }
        let (last_value, last_result) = matches.last().expect("non-empty");
        self.matched_var = Some(last_value.clone());

        if link.capture && operator.supports_capture() {
            self.tx.bind_captures(&last_result.captures);
        }
        for (key, value) in &last_result.lookup_data {
            self.geo.set(key.clone(), value.clone());
        }

        Ok(true)
    }

    /// The link's selectors with transaction-scoped target removals
    /// (`ctl:ruleRemoveTargetById`) applied.
    fn effective_specs<'a>(&self, link: &'a CompiledRule) -> Cow<'a, [VariableSpec]> {
        let rule_id = link.metadata.id;
        let applicable: Vec<&str> = self
            .control
            .removed_targets
            .iter()
            .filter(|(id, _)| Some(*id) == rule_id)
            .map(|(_, target)| target.as_str())
            .collect();

        if applicable.is_empty() {
            return Cow::Borrowed(&link.variables);
        }

        let mut specs = link.variables.clone();
        for target in applicable {
            match parse_update_targets(&format!("!{}", target)) {
                Ok(update) => update.apply(&mut specs),
                Err(_) => self.debug(3, &format!("bad removal target '{}'", target)),
            }
        }
        Cow::Owned(specs)
    }

    /// Run a matched link's on-match actions in declaration order.
    fn run_on_match_actions(&mut self, link: &CompiledRule, outcome: &mut RuleOutcome) {
        for action in &link.actions {
            if action.timing() != ApplicationTime::OnMatch {
                continue;
            }
            match action {
                Action::Disruptive(d) => {
                    outcome.disruptive =
                        Some(DisruptiveOutcome::from_action(d, |s| self.expand(s)));
                }
                Action::Flow(f) => {
                    outcome.flow = FlowOutcome::from_action(f);
                }
                Action::Data(d) => self.run_data_action(d),
                Action::Control(c) => self.run_control_action(c),
                Action::Metadata(_) | Action::Logging(_) | Action::Transformation(_) => {}
            }
        }
    }

    fn run_data_action(&mut self, action: &DataAction) {
        match action {
            DataAction::SetVar(spec) => self.apply_setvar(spec),
            DataAction::InitCol { collection, key } => {
                let key = self.expand(key);
                self.open_collection(collection, &key);
            }
            DataAction::SetUid(key) => {
                let key = self.expand(key);
                self.open_collection("user", &key);
            }
            DataAction::SetSid(key) => {
                let key = self.expand(key);
                self.open_collection("session", &key);
            }
            DataAction::ExpireVar {
                collection,
                key,
                seconds,
            } => {
                let canonical = collection.to_ascii_uppercase();
                match self.persistent_scopes.get(&canonical) {
                    Some(scope) => {
                        let at = chrono::Utc::now().timestamp() + *seconds as i64;
                        self.store.expire(scope, key, at);
                    }
                    None => self.debug(
                        3,
                        &format!("expirevar on unopened collection '{}'", collection),
                    ),
                }
            }
            DataAction::SetEnv { name, value } => match value {
                Some(value) => {
                    let value = self.expand(value);
                    self.env.set(name.clone(), value);
                }
                None => self.env.delete(name),
            },
            DataAction::Exec(path) => {
                if !self.host.exec_script(path) {
                    self.debug(3, &format!("exec of {} failed or is not wired", path));
                }
            }
            DataAction::Capture | DataAction::MultiMatch => {}
        }
    }

    fn run_control_action(&mut self, action: &ControlAction) {
        match action {
            ControlAction::RuleEngine(mode) => self.control.engine_mode = Some(*mode),
            ControlAction::RequestBodyAccess(v) => {
                self.control.request_body_access = Some(*v);
            }
            ControlAction::ResponseBodyAccess(v) => {
                self.control.response_body_access = Some(*v);
            }
            ControlAction::RuleRemoveById(ranges) => {
                self.control.removed_rules.extend_from_slice(ranges);
            }
            ControlAction::RuleRemoveByTag(tag) => {
                self.control.removed_tags.push(tag.clone());
            }
            ControlAction::RuleRemoveTargetById { id, target } => {
                self.control.removed_targets.push((*id, target.clone()));
            }
            ControlAction::RuleRemoveTargetByTag { tag, target } => {
                // Resolve the tag to ids now; later rules check by id.
                let mut ids = Vec::new();
                for phase in Phase::all() {
                    for rule in self.ruleset.phase_rules(phase) {
                        if rule.metadata.has_tag_matching(|t| t.contains(tag.as_str())) {
                            if let Some(id) = rule.id() {
                                ids.push(id);
                            }
                        }
                    }
                }
                for id in ids {
                    self.control.removed_targets.push((id, target.clone()));
                }
            }
            ControlAction::AuditEngine(mode) => {
                self.control.audit_engine = Some(match mode.to_ascii_lowercase().as_str() {
                    "on" => AuditMode::On,
                    "off" => AuditMode::Off,
                    _ => AuditMode::RelevantOnly,
                });
            }
            ControlAction::AuditLogParts(parts) => {
                self.control.audit_log_parts = Some(parts.clone());
            }
            ControlAction::RequestBodyProcessor(processor) => {
                self.control.body_processor = Some(*processor);
            }
        }
    }

    fn apply_setvar(&mut self, spec: &crate::parser::SetVarSpec) {
        let collection = spec.collection.as_str();
        let key = spec.key.clone();

        // Numeric operands expand first and parse as 0 on failure.
        let numeric = |this: &Self, operand: &RunTimeString| -> i64 {
            this.expand(operand).trim().parse().unwrap_or(0)
        };

        enum Op {
            Set(String),
            Add(i64),
            Delete,
        }
        let op = match &spec.value {
            SetVarValue::Assign(value) => Op::Set(self.expand(value)),
            SetVarValue::Init => Op::Set("1".to_string()),
            SetVarValue::Increment(amount) => Op::Add(numeric(self, amount)),
            SetVarValue::Decrement(amount) => Op::Add(-numeric(self, amount)),
            SetVarValue::Delete => Op::Delete,
        };

        if collection == "tx" {
            match op {
                Op::Set(value) => self.tx.set(key, value),
                Op::Add(amount) => self.tx.increment(&key, amount),
                Op::Delete => self.tx.delete(&key),
            }
            return;
        }

        let canonical = collection.to_ascii_uppercase();
        let Some(scope) = self.persistent_scopes.get(&canonical).cloned() else {
            self.debug(
                3,
                &format!("setvar on unopened collection '{}'", collection),
            );
            return;
        };
        let snapshot = self
            .persistent
            .get_mut(&canonical)
            .expect("scope implies snapshot");
        match op {
            Op::Set(value) => {
                snapshot.set(key.clone(), value.clone());
                self.store.put(&scope, &key, &value, None);
            }
            Op::Add(amount) => {
                snapshot.increment(&key, amount);
                let value = snapshot.first(&key).unwrap_or("0").to_string();
                self.store.put(&scope, &key, &value, None);
            }
            Op::Delete => {
                snapshot.delete(&key);
                self.store.delete(&scope, &key);
            }
        }
    }

    /// Load a persistent collection snapshot for this transaction.
    fn open_collection(&mut self, collection: &str, key: &str) {
        let canonical = collection.to_ascii_uppercase();
        if !matches!(
            canonical.as_str(),
            "IP" | "SESSION" | "USER" | "GLOBAL" | "RESOURCE"
        ) {
            self.debug(3, &format!("initcol on unknown collection '{}'", collection));
            return;
        }

        let scope = format!(
            "{}:{}:{}",
            self.ruleset.config.web_app_id,
            canonical.to_ascii_lowercase(),
            key
        );
        let mut snapshot = OrderedCollection::new();
        for entry_key in self.store.keys(&scope) {
            if let Some(entry) = self.store.get(&scope, &entry_key) {
                snapshot.add(entry_key, entry.value);
            }
        }
        self.persistent.insert(canonical.clone(), snapshot);
        self.persistent_scopes.insert(canonical, scope);
    }

    fn record_intervention(
        &mut self,
        rule: &CompiledRule,
        outcome: DisruptiveOutcome,
        enforced: bool,
    ) {
        if self.intervention.is_some() {
            return;
        }

        let status = rule.metadata.status;
        let mut intervention = match outcome {
            DisruptiveOutcome::Deny | DisruptiveOutcome::Block => {
                Intervention::deny(status.unwrap_or(403), self.phase, rule.id())
            }
            DisruptiveOutcome::Drop => Intervention::drop(self.phase, rule.id()),
            DisruptiveOutcome::Redirect(url) => {
                Intervention::redirect(status.unwrap_or(302), url, self.phase, rule.id())
            }
            DisruptiveOutcome::Proxy(backend) => {
                Intervention::redirect(status.unwrap_or(200), backend, self.phase, rule.id())
            }
            DisruptiveOutcome::Pass | DisruptiveOutcome::Allow(_) => return,
        };

        let mut log = rule
            .metadata
            .msg
            .as_ref()
            .map(|m| self.expand(m))
            .unwrap_or_default();
        if let Some(ref data) = rule.metadata.logdata {
            let data = self.expand(data);
            if !data.is_empty() {
                if !log.is_empty() {
                    log.push(' ');
                }
                log.push_str(&data);
            }
        }
        if !log.is_empty() {
            intervention = intervention.with_log(log);
        }
        if !enforced {
            intervention = intervention.detection_only();
        }

        self.debug(1, &intervention.format_log());
        self.intervention = Some(intervention);
    }

    /// Expand a macro string against the current transaction state.
    fn expand(&self, s: &RunTimeString) -> String {
        let resolver = Resolver {
            request: &self.request,
            response: &self.response,
            tx: &self.tx,
            env: &self.env,
            geo: &self.geo,
            persistent: &self.persistent,
            rule_meta: &self.rule_meta,
            matched_var: self.matched_var.as_ref(),
            matched_vars: &self.matched_vars,
            time: &self.time,
            unique_id: &self.unique_id,
            highest_severity: self.highest_severity,
        };
        s.expand(|name| resolver.lookup(name))
    }

    /// Populate the RULE collection for the evaluating link.
    fn set_rule_collection(&mut self, link: &CompiledRule, head: &CompiledRule) {
        self.rule_meta.clear();
        let meta = &link.metadata;
        if let Some(id) = meta.id.or(head.metadata.id) {
            self.rule_meta.set("id".to_string(), id.to_string());
        }
        if let Some(ref msg) = meta.msg {
            self.rule_meta.set("msg".to_string(), msg.source_text());
        }
        if let Some(severity) = meta.severity {
            self.rule_meta
                .set("severity".to_string(), severity.to_string());
        }
        if let Some(ref rev) = meta.rev {
            self.rule_meta.set("rev".to_string(), rev.clone());
        }
        if let Some(ref ver) = meta.ver {
            self.rule_meta.set("ver".to_string(), ver.clone());
        }
        if let Some(ref logdata) = meta.logdata {
            self.rule_meta
                .set("logdata".to_string(), logdata.source_text());
        }
    }

    fn rule_disabled(&self, rule: &CompiledRule) -> bool {
        if let Some(id) = rule.id() {
            if self
                .control
                .removed_rules
                .iter()
                .any(|&(lo, hi)| (lo..=hi).contains(&id))
            {
                return true;
            }
        }
        if !self.control.removed_tags.is_empty()
            && rule.metadata.has_tag_matching(|t| {
                self.control.removed_tags.iter().any(|rt| t.contains(rt))
            })
        {
            return true;
        }
        false
    }

    fn effective_engine_mode(&self) -> RuleEngineMode {
        self.control
            .engine_mode
            .unwrap_or(self.ruleset.config.engine_mode)
    }

    fn request_body_access(&self) -> bool {
        self.control
            .request_body_access
            .unwrap_or(self.ruleset.config.request_body_access)
    }

    fn response_body_access(&self) -> bool {
        self.control
            .response_body_access
            .unwrap_or(self.ruleset.config.response_body_access)
    }

    fn emit_audit_record(&self) {
        let audit_mode = self
            .control
            .audit_engine
            .unwrap_or(self.ruleset.config.audit_engine);
        let relevant = !self.matched_rule_ids.is_empty() || self.intervention.is_some();
        let should_log = match audit_mode {
            AuditMode::On => true,
            AuditMode::Off => false,
            AuditMode::RelevantOnly => relevant,
        };
        if !should_log {
            return;
        }

        let record = AuditRecord {
            unique_id: self.unique_id.clone(),
            timestamp: self.time.rfc3339(),
            client_ip: self.request.client_ip.clone(),
            client_port: self.request.client_port,
            method: self.request.method.clone(),
            uri: self.request.uri.clone(),
            response_status: self.response.status,
            matched_rule_ids: self.matched_rule_ids.clone(),
            intervention: self.intervention.as_ref().map(|i| i.format_log()),
            parts: self
                .control
                .audit_log_parts
                .clone()
                .unwrap_or_else(|| self.ruleset.config.audit_log_parts.clone()),
        };
        self.host.audit_log(&record);
    }

    fn debug(&self, level: u8, message: &str) {
        // Level 0 leaves filtering to the host; a configured level caps
        // what gets forwarded.
        let configured = self.ruleset.config.debug_log_level;
        if configured > 0 && level > configured {
            return;
        }
        self.host.debug_log(level, message);
    }

    /// Highest severity recorded so far (0 is most severe).
    pub fn highest_severity(&self) -> Option<Severity> {
        self.highest_severity.map(Severity::from)
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("unique_id", &self.unique_id)
            .field("phase", &self.phase)
            .field("matched_rules", &self.matched_rule_ids)
            .field("disrupted", &self.is_disrupted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    fn engine(rules: &str) -> Engine {
        Engine::from_string(rules).unwrap()
    }

    fn get_tx(engine: &Engine, uri: &str) -> Transaction {
        let mut tx = engine.transaction();
        tx.process_connection("198.51.100.7", 40912, "192.0.2.1", 80)
            .unwrap();
        tx.process_uri(uri, "GET", "HTTP/1.1").unwrap();
        tx
    }

    #[test]
    fn test_basic_match_denies() {
        let engine = engine(r#"SecRule REQUEST_URI "@contains /admin" "id:1,phase:1,deny""#);
        let mut tx = get_tx(&engine, "/admin/panel");
        assert!(tx.process_request_headers().unwrap());
        let i = tx.intervention().unwrap();
        assert_eq!(i.status, 403);
        assert!(i.disruptive);
    }

    #[test]
    fn test_no_match_passes() {
        let engine = engine(r#"SecRule REQUEST_URI "@contains /admin" "id:1,phase:1,deny""#);
        let mut tx = get_tx(&engine, "/public");
        assert!(!tx.process_request_headers().unwrap());
        assert!(tx.intervention().is_none());
    }

    #[test]
    fn test_status_action_sets_intervention_status() {
        let engine =
            engine(r#"SecRule REQUEST_URI "@contains x" "id:1,phase:1,deny,status:418""#);
        let mut tx = get_tx(&engine, "/x");
        tx.process_request_headers().unwrap();
        assert_eq!(tx.intervention().unwrap().status, 418);
    }

    #[test]
    fn test_detection_only_records_without_disrupting() {
        let engine = engine(
            r#"
SecRuleEngine DetectionOnly
SecRule REQUEST_URI "@contains /admin" "id:1,phase:1,deny"
"#,
        );
        let mut tx = get_tx(&engine, "/admin");
        assert!(!tx.process_request_headers().unwrap());
        let i = tx.intervention().unwrap();
        assert!(!i.disruptive);
        assert_eq!(tx.matched_rules(), &[1]);
    }

    #[test]
    fn test_engine_off_evaluates_nothing() {
        let engine = engine(
            r#"
SecRuleEngine Off
SecRule REQUEST_URI "@contains /admin" "id:1,phase:1,deny"
"#,
        );
        let mut tx = get_tx(&engine, "/admin");
        assert!(!tx.process_request_headers().unwrap());
        assert!(tx.matched_rules().is_empty());
    }

    #[test]
    fn test_negated_operator() {
        let engine =
            engine(r#"SecRule REQUEST_METHOD "!@streq GET" "id:1,phase:1,deny""#);
        let mut tx = get_tx(&engine, "/");
        assert!(!tx.process_request_headers().unwrap());

        let mut tx = engine.transaction();
        tx.process_uri("/", "POST", "HTTP/1.1").unwrap();
        assert!(tx.process_request_headers().unwrap());
    }

    #[test]
    fn test_transformation_pipeline_applies() {
        let engine = engine(
            r#"SecRule REQUEST_URI "@rx ^/admin" "id:2,phase:1,t:lowercase,t:normalisePath,deny,status:401""#,
        );
        let mut tx = get_tx(&engine, "/ADMIN/../admin");
        assert!(tx.process_request_headers().unwrap());
        assert_eq!(tx.intervention().unwrap().status, 401);
    }

    #[test]
    fn test_setvar_visible_across_phases() {
        let engine = engine(
            r#"
SecAction "id:5,phase:1,nolog,pass,setvar:tx.score=+1"
SecRule TX:score "@gt 0" "id:6,phase:2,log,deny"
"#,
        );
        let mut tx = get_tx(&engine, "/");
        assert!(!tx.process_request_headers().unwrap());
        assert_eq!(tx.tx().first("score"), Some("1"));
        assert!(tx.process_request_body().unwrap());
    }

    #[test]
    fn test_setvar_macro_value() {
        let engine = engine(
            r#"SecAction "id:5,phase:1,nolog,pass,setvar:tx.seen_uri=%{REQUEST_URI}""#,
        );
        let mut tx = get_tx(&engine, "/somewhere");
        tx.process_request_headers().unwrap();
        assert_eq!(tx.tx().first("seen_uri"), Some("/somewhere"));
    }

    #[test]
    fn test_setvar_delete() {
        let engine = engine(
            r#"
SecAction "id:1,phase:1,nolog,pass,setvar:tx.a=5"
SecAction "id:2,phase:1,nolog,pass,setvar:!tx.a"
"#,
        );
        let mut tx = get_tx(&engine, "/");
        tx.process_request_headers().unwrap();
        assert_eq!(tx.tx().first("a"), None);
    }

    #[test]
    fn test_chain_requires_all_links() {
        let rules = r#"
SecRule REQUEST_METHOD "@streq POST" "id:4,phase:2,chain,deny"
SecRule ARGS:token "@streq bad" "t:none"
"#;
        let engine = engine(rules);

        // POST with the bad token: denied
        let mut tx = engine.transaction();
        tx.process_uri("/?token=bad", "POST", "HTTP/1.1").unwrap();
        tx.process_request_headers().unwrap();
        assert!(tx.process_request_body().unwrap());

        // POST with a good token: child fails, no deny
        let mut tx = engine.transaction();
        tx.process_uri("/?token=ok", "POST", "HTTP/1.1").unwrap();
        tx.process_request_headers().unwrap();
        assert!(!tx.process_request_body().unwrap());

        // GET with the bad token: head fails, no deny
        let mut tx = engine.transaction();
        tx.process_uri("/?token=bad", "GET", "HTTP/1.1").unwrap();
        tx.process_request_headers().unwrap();
        assert!(!tx.process_request_body().unwrap());
    }

    #[test]
    fn test_chain_on_match_actions_held_until_all_links() {
        // The head's setvar must not run when the child fails.
        let engine = engine(
            r#"
SecRule REQUEST_METHOD "@streq GET" "id:4,phase:1,chain,pass,setvar:tx.flag=1"
SecRule REQUEST_URI "@contains /never"
"#,
        );
        let mut tx = get_tx(&engine, "/");
        tx.process_request_headers().unwrap();
        assert_eq!(tx.tx().first("flag"), None);
    }

    #[test]
    fn test_capture_earlier_link_visible_to_later() {
        let engine = engine(
            r#"
SecRule REQUEST_URI "@rx ^/(\w+)" "id:4,phase:1,capture,chain,deny"
SecRule TX:1 "@streq admin" "t:none"
"#,
        );
        let mut tx = get_tx(&engine, "/admin/x");
        assert!(tx.process_request_headers().unwrap());

        let mut tx = get_tx(&engine, "/public/x");
        assert!(!tx.process_request_headers().unwrap());
    }

    #[test]
    fn test_capture_clears_stale_slots() {
        let engine = engine(
            r#"
SecRule REQUEST_URI "@rx ^/(\w+)/(\w+)/(\w+)" "id:1,phase:1,capture,pass"
SecRule REQUEST_URI "@rx ^/(\w+)" "id:2,phase:1,capture,pass"
"#,
        );
        let mut tx = get_tx(&engine, "/a/b/c");
        tx.process_request_headers().unwrap();
        // The second rule's single group overwrote slot 1 and cleared 2-3
        assert_eq!(tx.tx().first("0"), Some("/a"));
        assert_eq!(tx.tx().first("1"), Some("a"));
        assert_eq!(tx.tx().first("2"), None);
        assert_eq!(tx.tx().first("3"), None);
    }

    #[test]
    fn test_skip_counts_top_level_rules() {
        let engine = engine(
            r#"
SecAction "id:1,phase:1,nolog,pass,skip:1"
SecAction "id:2,phase:1,nolog,pass,setvar:tx.skipped=1"
SecAction "id:3,phase:1,nolog,pass,setvar:tx.ran=1"
"#,
        );
        let mut tx = get_tx(&engine, "/");
        tx.process_request_headers().unwrap();
        assert_eq!(tx.tx().first("skipped"), None);
        assert_eq!(tx.tx().first("ran"), Some("1"));
    }

    #[test]
    fn test_skip_after_marker() {
        let engine = engine(
            r#"
SecAction "id:1,phase:1,nolog,pass,skipAfter:END_CHECKS"
SecAction "id:2,phase:1,nolog,pass,setvar:tx.inside=1"
SecMarker END_CHECKS
SecAction "id:3,phase:1,nolog,pass,setvar:tx.after=1"
"#,
        );
        let mut tx = get_tx(&engine, "/");
        tx.process_request_headers().unwrap();
        assert_eq!(tx.tx().first("inside"), None);
        assert_eq!(tx.tx().first("after"), Some("1"));
    }

    #[test]
    fn test_skip_after_rule_id() {
        let engine = engine(
            r#"
SecAction "id:1,phase:1,nolog,pass,skipAfter:2"
SecAction "id:2,phase:1,nolog,pass,setvar:tx.two=1"
SecAction "id:3,phase:1,nolog,pass,setvar:tx.three=1"
"#,
        );
        let mut tx = get_tx(&engine, "/");
        tx.process_request_headers().unwrap();
        // lands strictly after rule 2
        assert_eq!(tx.tx().first("two"), None);
        assert_eq!(tx.tx().first("three"), Some("1"));
    }

    #[test]
    fn test_exclusion_variable_never_contributes() {
        let engine =
            engine(r#"SecRule ARGS|!ARGS:safe "@rx attack" "id:7,phase:2,deny""#);

        let mut tx = get_tx(&engine, "/?safe=attack&bad=attack");
        tx.process_request_headers().unwrap();
        assert!(tx.process_request_body().unwrap());

        let mut tx = get_tx(&engine, "/?safe=attack");
        tx.process_request_headers().unwrap();
        assert!(!tx.process_request_body().unwrap());
    }

    #[test]
    fn test_count_variable() {
        let engine = engine(r#"SecRule &ARGS "@gt 2" "id:1,phase:2,deny""#);

        let mut tx = get_tx(&engine, "/?a=1&b=2&c=3");
        tx.process_request_headers().unwrap();
        assert!(tx.process_request_body().unwrap());

        let mut tx = get_tx(&engine, "/?a=1");
        tx.process_request_headers().unwrap();
        assert!(!tx.process_request_body().unwrap());
    }

    #[test]
    fn test_redirect_with_macro_url() {
        let engine = engine(
            r#"SecRule ARGS:go "@streq out" "id:1,phase:2,redirect:'https://example.com%{REQUEST_FILENAME}',status:307""#,
        );
        let mut tx = get_tx(&engine, "/path?go=out");
        tx.process_request_headers().unwrap();
        assert!(tx.process_request_body().unwrap());
        let i = tx.intervention().unwrap();
        assert_eq!(i.status, 307);
        assert_eq!(i.url.as_deref(), Some("https://example.com/path"));
    }

    #[test]
    fn test_drop_closes_connection() {
        let engine = engine(r#"SecRule REQUEST_URI "@contains /x" "id:1,phase:1,drop""#);
        let mut tx = get_tx(&engine, "/x");
        tx.process_request_headers().unwrap();
        assert!(tx.intervention().unwrap().drop_connection);
    }

    #[test]
    fn test_allow_stops_remaining_phases() {
        let engine = engine(
            r#"
SecRule REQUEST_URI "@beginsWith /health" "id:1,phase:1,allow"
SecRule REQUEST_URI "@contains h" "id:2,phase:2,deny"
"#,
        );
        let mut tx = get_tx(&engine, "/health");
        tx.process_request_headers().unwrap();
        assert!(!tx.process_request_body().unwrap());
        assert!(tx.intervention().is_none());
    }

    #[test]
    fn test_ctl_rule_remove_by_id() {
        let engine = engine(
            r#"
SecAction "id:1,phase:1,nolog,pass,ctl:ruleRemoveById=9"
SecRule REQUEST_URI "@contains /" "id:9,phase:2,deny"
"#,
        );
        let mut tx = get_tx(&engine, "/");
        tx.process_request_headers().unwrap();
        assert!(!tx.process_request_body().unwrap());
    }

    #[test]
    fn test_ctl_rule_engine_detection_only() {
        let engine = engine(
            r#"
SecAction "id:1,phase:1,nolog,pass,ctl:ruleEngine=detectionOnly"
SecRule REQUEST_URI "@contains /" "id:9,phase:2,deny"
"#,
        );
        let mut tx = get_tx(&engine, "/");
        tx.process_request_headers().unwrap();
        assert!(!tx.process_request_body().unwrap());
        assert!(tx.intervention().is_some());
    }

    #[test]
    fn test_ctl_rule_remove_target_by_id() {
        let engine = engine(
            r#"
SecAction "id:1,phase:1,nolog,pass,ctl:ruleRemoveTargetById=9;ARGS:password"
SecRule ARGS "@contains secret" "id:9,phase:2,deny"
"#,
        );
        let mut tx = get_tx(&engine, "/?password=secret");
        tx.process_request_headers().unwrap();
        assert!(!tx.process_request_body().unwrap());

        let mut tx = get_tx(&engine, "/?other=secret");
        tx.process_request_headers().unwrap();
        assert!(tx.process_request_body().unwrap());
    }

    #[test]
    fn test_initcol_persists_across_transactions() {
        let engine = engine(
            r#"
SecAction "id:1,phase:1,nolog,pass,initcol:ip=%{REMOTE_ADDR},setvar:ip.hits=+1"
SecRule IP:hits "@ge 3" "id:2,phase:1,deny"
"#,
        );

        for expected_block in [false, false, true] {
            let mut tx = get_tx(&engine, "/");
            let blocked = tx.process_request_headers().unwrap();
            assert_eq!(blocked, expected_block);
        }

        // A different client address starts fresh
        let mut tx = engine.transaction();
        tx.process_connection("203.0.113.9", 1234, "192.0.2.1", 80)
            .unwrap();
        tx.process_uri("/", "GET", "HTTP/1.1").unwrap();
        assert!(!tx.process_request_headers().unwrap());
    }

    #[test]
    fn test_matched_var_updates_per_link() {
        let engine = engine(
            r#"
SecRule ARGS "@contains evil" "id:1,phase:2,chain,deny"
SecRule MATCHED_VAR "@contains evil-twice" "t:none"
"#,
        );
        let mut tx = get_tx(&engine, "/?a=evil-twice");
        tx.process_request_headers().unwrap();
        assert!(tx.process_request_body().unwrap());

        let mut tx = get_tx(&engine, "/?a=evil-once");
        tx.process_request_headers().unwrap();
        assert!(!tx.process_request_body().unwrap());
    }

    #[test]
    fn test_multi_match_sees_intermediate_values() {
        // The pre-transform value matches, the lowercased one does not.
        let engine = engine(
            r#"SecRule ARGS:q "@strmatch EVIL" "id:1,phase:2,t:lowercase,multiMatch,deny""#,
        );
        let mut tx = get_tx(&engine, "/?q=EVIL");
        tx.process_request_headers().unwrap();
        assert!(tx.process_request_body().unwrap());
    }

    #[test]
    fn test_transform_cache_sees_mutated_values() {
        // Both rules read TX:x through the same t:lowercase prefix; the
        // setvar in between must not leave rule 2 matching rule 1's
        // cached bytes.
        let engine = engine(
            r#"
SecAction "id:1,phase:2,nolog,pass,setvar:tx.x=A"
SecRule TX:x "@streq a" "id:2,phase:2,t:lowercase,pass,setvar:tx.first=1"
SecAction "id:3,phase:2,nolog,pass,setvar:tx.x=B"
SecRule TX:x "@streq b" "id:4,phase:2,t:lowercase,deny"
"#,
        );
        let mut tx = get_tx(&engine, "/");
        tx.process_request_headers().unwrap();
        assert!(tx.process_request_body().unwrap());
        assert_eq!(tx.tx().first("first"), Some("1"));
    }

    #[test]
    fn test_without_multi_match_only_final_value() {
        let engine =
            engine(r#"SecRule ARGS:q "@strmatch EVIL" "id:1,phase:2,t:lowercase,deny""#);
        let mut tx = get_tx(&engine, "/?q=EVIL");
        tx.process_request_headers().unwrap();
        assert!(!tx.process_request_body().unwrap());
    }

    #[test]
    fn test_request_body_form_parsing() {
        let engine = engine(
            r#"
SecRequestBodyAccess On
SecRule ARGS_POST:user "@streq root" "id:1,phase:2,deny"
"#,
        );
        let mut tx = engine.transaction();
        tx.process_uri("/login", "POST", "HTTP/1.1").unwrap();
        tx.add_request_header("Content-Type", "application/x-www-form-urlencoded")
            .unwrap();
        tx.process_request_headers().unwrap();
        tx.append_request_body(b"user=root&pass=x").unwrap();
        assert!(tx.process_request_body().unwrap());
    }

    #[test]
    fn test_response_phase_rules() {
        let engine = engine(
            r#"
SecResponseBodyAccess On
SecRule RESPONSE_STATUS "@streq 500" "id:1,phase:3,pass,setvar:tx.err=1"
SecRule RESPONSE_BODY "@contains stack trace" "id:2,phase:4,deny"
"#,
        );
        let mut tx = get_tx(&engine, "/");
        tx.process_request_headers().unwrap();
        tx.process_request_body().unwrap();
        tx.add_response_header("Content-Type", "text/html").unwrap();
        tx.process_response_headers(500, "HTTP/1.1").unwrap();
        assert_eq!(tx.tx().first("err"), Some("1"));
        tx.append_response_body(b"Exception: stack trace follows")
            .unwrap();
        assert!(tx.process_response_body().unwrap());
    }

    #[test]
    fn test_logging_phase_runs_after_disruption() {
        let engine = engine(
            r#"
SecRule REQUEST_URI "@contains /x" "id:1,phase:1,deny"
SecAction "id:2,phase:5,nolog,pass,setvar:tx.logged=1"
"#,
        );
        let mut tx = get_tx(&engine, "/x");
        tx.process_request_headers().unwrap();
        assert!(tx.is_disrupted());
        tx.process_logging().unwrap();
        assert_eq!(tx.tx().first("logged"), Some("1"));
    }

    #[test]
    fn test_dynamic_selector_key() {
        let engine = engine(
            r#"
SecAction "id:1,phase:1,nolog,pass,setvar:tx.param=q"
SecRule ARGS:%{tx.param} "@streq evil" "id:2,phase:2,deny"
"#,
        );
        let mut tx = get_tx(&engine, "/?q=evil");
        tx.process_request_headers().unwrap();
        assert!(tx.process_request_body().unwrap());
    }
}
