//! Variable resolution.
//!
//! Maps a [`VariableSpec`] plus transaction state onto a list of
//! [`VariableValue`]s. The resolver also implements `%{...}` macro
//! lookup, since a macro reference is just a single-valued resolution.

use super::collection::{Collection, OrderedCollection};
use super::request::RequestData;
use super::response::ResponseData;
use super::time::TimeInfo;
use super::tx::TxCollection;
use crate::parser::{Selection, VariableName, VariableSpec};
use std::collections::HashMap;

/// One resolved value: the fully-qualified origin (`COLLECTION:key` or a
/// scalar name) and the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableValue {
    /// Fully-qualified origin name.
    pub origin: String,
    /// The value.
    pub value: String,
}

impl VariableValue {
    /// Create a value.
    pub fn new(origin: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            value: value.into(),
        }
    }
}

/// Borrowed view of everything a variable can resolve against.
pub struct Resolver<'a> {
    /// Request state.
    pub request: &'a RequestData,
    /// Response state.
    pub response: &'a ResponseData,
    /// TX collection.
    pub tx: &'a TxCollection,
    /// Transaction environment.
    pub env: &'a OrderedCollection,
    /// GEO collection (populated by @geoLookup).
    pub geo: &'a OrderedCollection,
    /// Open persistent collections, keyed by canonical upper-case name.
    pub persistent: &'a HashMap<String, OrderedCollection>,
    /// Metadata of the rule currently evaluating (RULE collection).
    pub rule_meta: &'a OrderedCollection,
    /// Most recent match.
    pub matched_var: Option<&'a VariableValue>,
    /// All matches so far in this phase.
    pub matched_vars: &'a [VariableValue],
    /// Transaction clock snapshot.
    pub time: &'a TimeInfo,
    /// Transaction unique id.
    pub unique_id: &'a str,
    /// Highest severity recorded so far (0 = emergency).
    pub highest_severity: Option<u8>,
}

impl<'a> Resolver<'a> {
    /// Resolve a selector to its values, honoring selection, exclusions
    /// and count mode.
    pub fn resolve(&self, spec: &VariableSpec) -> Vec<VariableValue> {
        let mut values = self.resolve_selected(spec);

        if !spec.exclusions.is_empty() {
            values.retain(|v| {
                let key = entry_key(&v.origin);
                !spec.exclusions.iter().any(|e| e.matches(key))
            });
        }

        if spec.count {
            let origin = match &spec.selection {
                Some(Selection::Key(k)) => format!("{}:{}", spec.name.canonical(), k),
                _ => spec.name.canonical().to_string(),
            };
            return vec![VariableValue::new(origin, values.len().to_string())];
        }

        values
    }

    /// Macro lookup: `tx.score`, `REQUEST_URI`, `RULE.id`, ... Returns the
    /// first value of whatever the reference selects.
    pub fn lookup(&self, reference: &str) -> Option<String> {
        let (name_str, key) = match reference.split_once(['.', ':']) {
            Some((n, k)) => (n, Some(k)),
            None => (reference, None),
        };

        let name = VariableName::parse(name_str)?;
        let spec = VariableSpec {
            name,
            selection: key.map(|k| Selection::Key(k.to_string())),
            count: false,
            exclusions: Vec::new(),
        };

        self.resolve_selected(&spec)
            .into_iter()
            .next()
            .map(|v| v.value)
    }

    fn resolve_selected(&self, spec: &VariableSpec) -> Vec<VariableValue> {
        use VariableName::*;

        let name = spec.name;
        let scalar = |value: String| vec![VariableValue::new(name.canonical(), value)];

        match name {
            // Request scalars
            RequestUri => scalar(self.request.uri.clone()),
            RequestUriRaw => scalar(self.request.uri_raw.clone()),
            RequestMethod => scalar(self.request.method.clone()),
            RequestProtocol => scalar(self.request.protocol.clone()),
            RequestFilename => scalar(self.request.path.clone()),
            RequestBasename => scalar(self.request.basename().to_string()),
            RequestLine => scalar(self.request.request_line()),
            QueryString => scalar(self.request.query_string.clone()),
            RequestBody => scalar(self.request.body_str()),
            RequestBodyLength => scalar(self.request.body.len().to_string()),
            ArgsCombinedSize => scalar(self.request.args_combined_size().to_string()),
            FullRequest => scalar(self.request.full_request()),
            FullRequestLength => scalar(self.request.full_request().len().to_string()),

            // Connection scalars
            RemoteAddr => scalar(self.request.client_ip.clone()),
            RemotePort => scalar(self.request.client_port.to_string()),
            ServerAddr => scalar(self.request.server_ip.clone()),
            ServerPort => scalar(self.request.server_port.to_string()),
            ServerName => scalar(
                self.request
                    .headers
                    .first("host")
                    .unwrap_or(&self.request.server_ip)
                    .to_string(),
            ),
            // Resolved only when the connector supplies them; absent here.
            RemoteHost | RemoteUser | AuthType => Vec::new(),

            // Response scalars
            ResponseStatus => scalar(self.response.status.to_string()),
            ResponseProtocol => scalar(self.response.protocol.clone()),
            ResponseBody => scalar(self.response.body_str()),
            ResponseContentType => scalar(self.response.content_type.clone()),
            ResponseContentLength => scalar(self.response.body.len().to_string()),
            StatusLine => scalar(self.response.status_line()),

            // Collections
            Args => {
                let mut out = self.from_collection(&self.request.args_get, spec, "ARGS");
                out.extend(self.from_collection(&self.request.args_post, spec, "ARGS"));
                out
            }
            ArgsGet => self.from_collection(&self.request.args_get, spec, "ARGS_GET"),
            ArgsPost => self.from_collection(&self.request.args_post, spec, "ARGS_POST"),
            ArgsNames => {
                let mut out = self.names_of(&self.request.args_get, spec, "ARGS_NAMES");
                out.extend(self.names_of(&self.request.args_post, spec, "ARGS_NAMES"));
                out
            }
            ArgsGetNames => self.names_of(&self.request.args_get, spec, "ARGS_GET_NAMES"),
            ArgsPostNames => self.names_of(&self.request.args_post, spec, "ARGS_POST_NAMES"),
            RequestHeaders => self.from_collection(&self.request.headers, spec, "REQUEST_HEADERS"),
            RequestHeadersNames => {
                self.names_of(&self.request.headers, spec, "REQUEST_HEADERS_NAMES")
            }
            RequestCookies => self.from_collection(&self.request.cookies, spec, "REQUEST_COOKIES"),
            RequestCookiesNames => {
                self.names_of(&self.request.cookies, spec, "REQUEST_COOKIES_NAMES")
            }
            ResponseHeaders => {
                self.from_collection(&self.response.headers, spec, "RESPONSE_HEADERS")
            }
            ResponseHeadersNames => {
                self.names_of(&self.response.headers, spec, "RESPONSE_HEADERS_NAMES")
            }
            Tx => self.from_collection(self.tx, spec, "TX"),
            Env => self.from_collection(self.env, spec, "ENV"),
            Geo => self.from_collection(self.geo, spec, "GEO"),
            Rule => self.from_collection(self.rule_meta, spec, "RULE"),
            Ip | Session | User | Global | Resource => {
                match self.persistent.get(name.canonical()) {
                    Some(col) => self.from_collection(col, spec, name.canonical()),
                    // Not opened by initcol/setsid/setuid: nothing to read.
                    None => Vec::new(),
                }
            }

            // Match state
            MatchedVar => self
                .matched_var
                .map(|v| vec![VariableValue::new("MATCHED_VAR", v.value.clone())])
                .unwrap_or_default(),
            MatchedVarName => self
                .matched_var
                .map(|v| vec![VariableValue::new("MATCHED_VAR_NAME", v.origin.clone())])
                .unwrap_or_default(),
            MatchedVars => self
                .matched_vars
                .iter()
                .map(|v| {
                    VariableValue::new(format!("MATCHED_VARS:{}", v.origin), v.value.clone())
                })
                .collect(),
            MatchedVarsNames => self
                .matched_vars
                .iter()
                .map(|v| {
                    VariableValue::new(
                        format!("MATCHED_VARS_NAMES:{}", v.origin),
                        v.origin.clone(),
                    )
                })
                .collect(),

            // Time
            Time => scalar(self.time.time()),
            TimeEpoch => scalar(self.time.epoch()),
            TimeDay => scalar(self.time.day()),
            TimeHour => scalar(self.time.hour()),
            TimeMin => scalar(self.time.minute()),
            TimeSec => scalar(self.time.second()),
            TimeWday => scalar(self.time.weekday()),
            TimeMon => scalar(self.time.month()),
            TimeYear => scalar(self.time.year()),

            // Misc scalars
            UniqueId => scalar(self.unique_id.to_string()),
            Duration => scalar(self.time.elapsed_ms().to_string()),
            HighestSeverity => scalar(
                self.highest_severity
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "255".to_string()),
            ),

            // Populated only by body processors that are not wired in.
            Files | FilesSizes | FilesTmpnames | FilesNames | FilesCombinedSize | Xml => {
                Vec::new()
            }
        }
    }

    fn from_collection(
        &self,
        collection: &dyn Collection,
        spec: &VariableSpec,
        prefix: &str,
    ) -> Vec<VariableValue> {
        let case_insensitive = spec.name.keys_case_insensitive();

        match &spec.selection {
            Some(Selection::Key(key)) => {
                let values = if case_insensitive {
                    collection.get_ci(key)
                } else {
                    collection.get(key)
                };
                values
                    .into_iter()
                    .map(|v| VariableValue::new(format!("{}:{}", prefix, key), v))
                    .collect()
            }
            Some(Selection::Regex(re)) => collection
                .get_regex(re)
                .into_iter()
                .map(|(k, v)| VariableValue::new(format!("{}:{}", prefix, k), v))
                .collect(),
            Some(Selection::Dynamic(rts)) => {
                let key = rts.expand(|name| self.lookup(name));
                let values = if case_insensitive {
                    collection.get_ci(&key)
                } else {
                    collection.get(&key)
                };
                values
                    .into_iter()
                    .map(|v| VariableValue::new(format!("{}:{}", prefix, key), v))
                    .collect()
            }
            None => collection
                .all()
                .into_iter()
                .map(|(k, v)| VariableValue::new(format!("{}:{}", prefix, k), v))
                .collect(),
        }
    }

    /// Name-collections (`ARGS_NAMES` and friends): the keys become the
    /// values.
    fn names_of(
        &self,
        collection: &dyn Collection,
        spec: &VariableSpec,
        prefix: &str,
    ) -> Vec<VariableValue> {
        let mut out = Vec::new();
        for (k, _) in collection.all() {
            let selected = match &spec.selection {
                None => true,
                Some(Selection::Key(key)) => {
                    if spec.name.keys_case_insensitive() {
                        k.eq_ignore_ascii_case(key)
                    } else {
                        k == key
                    }
                }
                Some(Selection::Regex(re)) => re.is_match(k),
                Some(Selection::Dynamic(rts)) => {
                    let key = rts.expand(|name| self.lookup(name));
                    if spec.name.keys_case_insensitive() {
                        k.eq_ignore_ascii_case(&key)
                    } else {
                        k == key
                    }
                }
            };
            if selected {
                out.push(VariableValue::new(format!("{}:{}", prefix, k), k));
            }
        }
        out
    }
}

/// The bare entry key from an origin (`ARGS:id` → `id`).
fn entry_key(origin: &str) -> &str {
    match origin.split_once(':') {
        Some((_, key)) => key,
        None => origin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_variables;

    struct Fixture {
        request: RequestData,
        response: ResponseData,
        tx: TxCollection,
        env: OrderedCollection,
        geo: OrderedCollection,
        persistent: HashMap<String, OrderedCollection>,
        rule_meta: OrderedCollection,
        matched_vars: Vec<VariableValue>,
        time: TimeInfo,
    }

    impl Fixture {
        fn new() -> Self {
            let mut request = RequestData::new();
            request.set_uri("/index.php?id=5&name=bob");
            request.method = "GET".to_string();
            request.protocol = "HTTP/1.1".to_string();
            request.client_ip = "198.51.100.7".to_string();
            request.add_header("Host", "example.com");
            request.add_header("User-Agent", "test");
            Self {
                request,
                response: ResponseData::new(),
                tx: TxCollection::new(),
                env: OrderedCollection::new(),
                geo: OrderedCollection::new(),
                persistent: HashMap::new(),
                rule_meta: OrderedCollection::new(),
                matched_vars: Vec::new(),
                time: TimeInfo::now(),
            }
        }

        fn resolver(&self) -> Resolver<'_> {
            Resolver {
                request: &self.request,
                response: &self.response,
                tx: &self.tx,
                env: &self.env,
                geo: &self.geo,
                persistent: &self.persistent,
                rule_meta: &self.rule_meta,
                matched_var: None,
                matched_vars: &self.matched_vars,
                time: &self.time,
                unique_id: "abc123",
                highest_severity: None,
            }
        }
    }

    fn resolve_one(fixture: &Fixture, selector: &str) -> Vec<VariableValue> {
        let specs = parse_variables(selector).unwrap();
        let resolver = fixture.resolver();
        specs.iter().flat_map(|s| resolver.resolve(s)).collect()
    }

    #[test]
    fn test_scalar() {
        let f = Fixture::new();
        let values = resolve_one(&f, "REQUEST_METHOD");
        assert_eq!(values, vec![VariableValue::new("REQUEST_METHOD", "GET")]);
    }

    #[test]
    fn test_whole_collection() {
        let f = Fixture::new();
        let values = resolve_one(&f, "ARGS");
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].origin, "ARGS:id");
        assert_eq!(values[0].value, "5");
    }

    #[test]
    fn test_key_selection() {
        let f = Fixture::new();
        let values = resolve_one(&f, "ARGS:name");
        assert_eq!(values, vec![VariableValue::new("ARGS:name", "bob")]);
    }

    #[test]
    fn test_header_key_is_case_insensitive() {
        let f = Fixture::new();
        let values = resolve_one(&f, "REQUEST_HEADERS:User-Agent");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, "test");
    }

    #[test]
    fn test_regex_selection() {
        let f = Fixture::new();
        let values = resolve_one(&f, "ARGS:/^n/");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].origin, "ARGS:name");
    }

    #[test]
    fn test_count_mode() {
        let f = Fixture::new();
        let values = resolve_one(&f, "&ARGS");
        assert_eq!(values, vec![VariableValue::new("ARGS", "2")]);
    }

    #[test]
    fn test_count_with_key() {
        let f = Fixture::new();
        assert_eq!(
            resolve_one(&f, "&ARGS:id"),
            vec![VariableValue::new("ARGS:id", "1")]
        );
        assert_eq!(
            resolve_one(&f, "&ARGS:missing"),
            vec![VariableValue::new("ARGS:missing", "0")]
        );
    }

    #[test]
    fn test_exclusion_removes_entry() {
        let f = Fixture::new();
        let values = resolve_one(&f, "ARGS|!ARGS:id");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].origin, "ARGS:name");
    }

    #[test]
    fn test_args_names() {
        let f = Fixture::new();
        let values = resolve_one(&f, "ARGS_NAMES");
        let names: Vec<_> = values.iter().map(|v| v.value.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn test_macro_lookup() {
        let mut f = Fixture::new();
        use crate::variables::MutableCollection;
        f.tx.set("score".to_string(), "7".to_string());
        let resolver = f.resolver();
        assert_eq!(resolver.lookup("tx.score"), Some("7".to_string()));
        assert_eq!(resolver.lookup("REQUEST_METHOD"), Some("GET".to_string()));
        assert_eq!(resolver.lookup("tx.missing"), None);
    }

    #[test]
    fn test_dynamic_key_selection() {
        let mut f = Fixture::new();
        use crate::variables::MutableCollection;
        f.tx.set("target".to_string(), "id".to_string());
        // TX:%{tx.target} resolves the key "id" against ARGS via macro
        let specs = parse_variables("ARGS:%{tx.target}").unwrap();
        let resolver = f.resolver();
        let values: Vec<_> = specs.iter().flat_map(|s| resolver.resolve(s)).collect();
        assert_eq!(values, vec![VariableValue::new("ARGS:id", "5")]);
    }

    #[test]
    fn test_unopened_persistent_collection_is_empty() {
        let f = Fixture::new();
        assert!(resolve_one(&f, "IP").is_empty());
        assert!(resolve_one(&f, "IP:counter").is_empty());
    }

    #[test]
    fn test_matched_vars() {
        let mut f = Fixture::new();
        f.matched_vars = vec![VariableValue::new("ARGS:id", "5")];
        let values = resolve_one(&f, "MATCHED_VARS");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].origin, "MATCHED_VARS:ARGS:id");
        assert_eq!(values[0].value, "5");
    }

    #[test]
    fn test_server_name_from_host_header() {
        let f = Fixture::new();
        let values = resolve_one(&f, "SERVER_NAME");
        assert_eq!(values[0].value, "example.com");
    }
}
