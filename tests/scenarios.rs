//! End-to-end scenarios: full rule text through transaction processing.

use rampart::transformations::{
    NormalizePath, Transformation, TransformationPipeline, UrlDecode, UrlEncode,
};
use rampart::{Engine, Error};

fn engine(rules: &str) -> Engine {
    Engine::from_string(rules).unwrap()
}

#[test]
fn scenario_contains_deny() {
    // SecRule ARGS "@contains evil" with GET /?q=evil: phase 2 match,
    // disruptive 403.
    let engine = engine(r#"SecRule ARGS "@contains evil" "id:1,phase:2,deny,status:403""#);
    let mut tx = engine.transaction();
    tx.process_uri("/?q=evil", "GET", "HTTP/1.1").unwrap();
    assert!(!tx.process_request_headers().unwrap());
    assert!(tx.process_request_body().unwrap());

    let intervention = tx.intervention().unwrap();
    assert!(intervention.disruptive);
    assert_eq!(intervention.status, 403);
}

#[test]
fn scenario_transform_then_rx() {
    // /ADMIN/../admin normalizes to /admin before the regex runs.
    let engine = engine(
        r#"SecRule REQUEST_URI "@rx ^/admin" "id:2,phase:1,t:lowercase,t:normalisePath,deny,status:401""#,
    );
    let mut tx = engine.transaction();
    tx.process_uri("/ADMIN/../admin", "GET", "HTTP/1.1").unwrap();
    assert!(tx.process_request_headers().unwrap());
    assert_eq!(tx.intervention().unwrap().status, 401);
}

#[test]
fn scenario_default_action_inheritance() {
    // The rule names no disruptive action; it inherits deny,status:403.
    let engine = engine(
        r#"
SecDefaultAction "phase:2,log,auditlog,deny,status:403"
SecRule ARGS:id "@eq 0" "id:3"
"#,
    );
    let mut tx = engine.transaction();
    tx.process_uri("/?id=0", "GET", "HTTP/1.1").unwrap();
    tx.process_request_headers().unwrap();
    assert!(tx.process_request_body().unwrap());
    assert_eq!(tx.intervention().unwrap().status, 403);

    let mut tx = engine.transaction();
    tx.process_uri("/?id=5", "GET", "HTTP/1.1").unwrap();
    tx.process_request_headers().unwrap();
    assert!(!tx.process_request_body().unwrap());
}

#[test]
fn scenario_chain() {
    let engine = engine(
        r#"
SecRule REQUEST_METHOD "@streq POST" "id:4,phase:2,chain,deny"
SecRule ARGS:token "@streq bad" "t:none"
"#,
    );

    let run = |method: &str, uri: &str| -> bool {
        let mut tx = engine.transaction();
        tx.process_uri(uri, method, "HTTP/1.1").unwrap();
        tx.process_request_headers().unwrap();
        tx.process_request_body().unwrap()
    };

    assert!(run("POST", "/?token=bad"));
    assert!(!run("POST", "/?token=ok"));
    assert!(!run("GET", "/?token=bad"));
}

#[test]
fn scenario_setvar_across_phases() {
    let engine = engine(
        r#"
SecAction "id:5,phase:1,nolog,pass,setvar:tx.score=+1"
SecRule TX:score "@gt 0" "id:6,phase:2,log,pass"
"#,
    );
    let mut tx = engine.transaction();
    tx.process_uri("/", "GET", "HTTP/1.1").unwrap();
    tx.process_request_headers().unwrap();
    assert_eq!(tx.tx().first("score"), Some("1"));
    tx.process_request_body().unwrap();
    assert_eq!(tx.matched_rules(), &[5, 6]);
}

#[test]
fn scenario_exclusion() {
    let engine = engine(r#"SecRule ARGS|!ARGS:safe "@rx attack" "id:7,phase:2,deny""#);

    let mut tx = engine.transaction();
    tx.process_uri("/?safe=attack&bad=attack", "GET", "HTTP/1.1")
        .unwrap();
    tx.process_request_headers().unwrap();
    assert!(tx.process_request_body().unwrap());

    let mut tx = engine.transaction();
    tx.process_uri("/?safe=attack", "GET", "HTTP/1.1").unwrap();
    tx.process_request_headers().unwrap();
    assert!(!tx.process_request_body().unwrap());
}

// ---- quantified properties ----

#[test]
fn property_normalise_path_idempotent() {
    let t = NormalizePath;
    let samples = [
        "/a/b/../c",
        "/a//b/./c/",
        "a/../../b",
        "../..",
        "/..",
        "//",
        "",
        "/plain/path",
        "relative/path/..",
        "/a/b/c/../../../..",
        "./../a//",
    ];
    for s in samples {
        let once = t.transform(s).into_owned();
        let twice = t.transform(&once).into_owned();
        assert_eq!(once, twice, "normalisePath not idempotent for {:?}", s);
        assert!(once.len() <= s.len(), "output grew for {:?}", s);
    }
}

#[test]
fn property_url_decode_identity_without_escapes() {
    let t = UrlDecode;
    for s in ["plain", "/a/b", "no escapes here", "a-b_c.d~e"] {
        assert_eq!(t.transform(s), s);
    }
}

#[test]
fn property_url_decode_inverts_encode() {
    let decode = UrlDecode;
    let encode = UrlEncode;
    let samples = ["hello world", "a=b&c=d", "100%", "päth", "a+b c"];
    for s in samples {
        let encoded = encode.transform(s).into_owned();
        assert_eq!(decode.transform(&encoded), s, "roundtrip failed for {:?}", s);
    }
}

#[test]
fn property_none_equals_suffix_after_last_none() {
    let full = TransformationPipeline::from_names(&[
        "md5",
        "base64Encode",
        "none",
        "urlDecode",
        "none",
        "lowercase",
        "trim",
    ])
    .unwrap();
    let suffix = TransformationPipeline::from_names(&["lowercase", "trim"]).unwrap();
    for s in ["  ABC%20  ", "hello", "", "MiXeD Case"] {
        assert_eq!(full.apply(s), suffix.apply(s));
    }
}

#[test]
fn property_capture_slots_set_and_cleared() {
    let engine = engine(
        r#"SecRule ARGS:v "@rx ^(\w+)-(\w+)$" "id:1,phase:2,capture,pass""#,
    );
    let mut tx = engine.transaction();
    tx.process_uri("/?v=left-right", "GET", "HTTP/1.1").unwrap();
    tx.process_request_headers().unwrap();
    tx.process_request_body().unwrap();

    assert_eq!(tx.tx().first("0"), Some("left-right"));
    assert_eq!(tx.tx().first("1"), Some("left"));
    assert_eq!(tx.tx().first("2"), Some("right"));
    for slot in 3..10 {
        assert_eq!(tx.tx().first(&slot.to_string()), None, "slot {}", slot);
    }
}

#[test]
fn property_default_action_at_most_once_per_phase() {
    let result = Engine::from_string(
        r#"
SecDefaultAction "phase:1,deny,status:403"
SecDefaultAction "phase:1,pass"
"#,
    );
    assert!(matches!(
        result,
        Err(Error::DuplicateDefaultAction { phase: 1 })
    ));
}

#[test]
fn property_chain_actions_fire_iff_all_links_match() {
    let engine = engine(
        r#"
SecRule ARGS:a "@streq 1" "id:10,phase:2,chain,pass,setvar:tx.fired=1"
SecRule ARGS:b "@streq 2" "t:none,chain"
SecRule ARGS:c "@streq 3" "t:none"
"#,
    );

    let fired = |uri: &str| -> bool {
        let mut tx = engine.transaction();
        tx.process_uri(uri, "GET", "HTTP/1.1").unwrap();
        tx.process_request_headers().unwrap();
        tx.process_request_body().unwrap();
        tx.tx().first("fired").is_some()
    };

    assert!(fired("/?a=1&b=2&c=3"));
    assert!(!fired("/?a=1&b=2&c=X"));
    assert!(!fired("/?a=1&b=X&c=3"));
    assert!(!fired("/?a=X&b=2&c=3"));
}

#[test]
fn property_skip_after_lands_strictly_after_target() {
    let engine = engine(
        r#"
SecAction "id:1,phase:1,nolog,pass,skipAfter:TARGET"
SecAction "id:2,phase:1,nolog,pass,setvar:tx.before=1"
SecMarker TARGET
SecAction "id:4,phase:1,nolog,pass,setvar:tx.after=1"
"#,
    );
    let mut tx = engine.transaction();
    tx.process_uri("/", "GET", "HTTP/1.1").unwrap();
    tx.process_request_headers().unwrap();
    assert_eq!(tx.tx().first("before"), None);
    assert_eq!(tx.tx().first("after"), Some("1"));
}

#[test]
fn detection_operators_end_to_end() {
    let engine = engine(
        r#"
SecRule ARGS "@detectSQLi" "id:1,phase:2,t:urlDecodeUni,deny,status:403,msg:'SQLi'"
SecRule ARGS "@detectXSS" "id:2,phase:2,t:urlDecodeUni,deny,status:403,msg:'XSS'"
"#,
    );

    let blocked = |uri: &str| -> bool {
        let mut tx = engine.transaction();
        tx.process_uri(uri, "GET", "HTTP/1.1").unwrap();
        tx.process_request_headers().unwrap();
        tx.process_request_body().unwrap()
    };

    assert!(blocked("/?id=1%27%20OR%20%271%27=%271"));
    assert!(blocked("/?comment=<script>alert(1)</script>"));
    assert!(!blocked("/?id=42&comment=nice+article"));
}

#[test]
fn geo_lookup_feeds_geo_collection() {
    use rampart::HostCallbacks;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct GeoHost;
    impl HostCallbacks for GeoHost {
        fn geo_lookup(&self, ip: &str) -> Option<HashMap<String, String>> {
            (ip == "198.51.100.7").then(|| {
                let mut map = HashMap::new();
                map.insert("COUNTRY_CODE".to_string(), "KP".to_string());
                map
            })
        }
    }

    let engine = Engine::from_string(
        r#"
SecRule REMOTE_ADDR "@geoLookup" "id:1,phase:1,chain,deny,status:403"
SecRule GEO:COUNTRY_CODE "@streq KP" "t:none"
"#,
    )
    .unwrap()
    .with_host(Arc::new(GeoHost));

    let mut tx = engine.transaction();
    tx.process_connection("198.51.100.7", 40912, "192.0.2.1", 80)
        .unwrap();
    tx.process_uri("/", "GET", "HTTP/1.1").unwrap();
    assert!(tx.process_request_headers().unwrap());

    // An address the database does not know stays unmatched
    let mut tx = engine.transaction();
    tx.process_connection("203.0.113.5", 40912, "192.0.2.1", 80)
        .unwrap();
    tx.process_uri("/", "GET", "HTTP/1.1").unwrap();
    assert!(!tx.process_request_headers().unwrap());
}

#[test]
fn exec_action_reaches_host() {
    use rampart::HostCallbacks;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct ScriptHost {
        executed: Mutex<Vec<String>>,
    }
    impl HostCallbacks for ScriptHost {
        fn exec_script(&self, path: &str) -> bool {
            self.executed.lock().unwrap().push(path.to_string());
            true
        }
    }

    let host = Arc::new(ScriptHost::default());
    let engine = Engine::from_string(
        r#"SecRule ARGS "@contains evil" "id:1,phase:2,pass,exec:/opt/scripts/ban.sh""#,
    )
    .unwrap()
    .with_host(host.clone());

    let mut tx = engine.transaction();
    tx.process_uri("/?q=evil", "GET", "HTTP/1.1").unwrap();
    tx.process_request_headers().unwrap();
    tx.process_request_body().unwrap();
    assert_eq!(
        host.executed.lock().unwrap().as_slice(),
        &["/opt/scripts/ban.sh".to_string()]
    );

    // No match, no execution
    let mut tx = engine.transaction();
    tx.process_uri("/?q=fine", "GET", "HTTP/1.1").unwrap();
    tx.process_request_headers().unwrap();
    tx.process_request_body().unwrap();
    assert_eq!(host.executed.lock().unwrap().len(), 1);
}

#[test]
fn audit_record_reaches_host() {
    use rampart::{AuditRecord, HostCallbacks};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        records: Mutex<Vec<AuditRecord>>,
    }
    impl HostCallbacks for Recorder {
        fn audit_log(&self, record: &AuditRecord) {
            self.records.lock().unwrap().push(record.clone());
        }
    }

    let recorder = Arc::new(Recorder::default());
    let engine = Engine::from_string(
        r#"
SecAuditEngine RelevantOnly
SecRule ARGS "@contains evil" "id:1,phase:2,deny,status:403"
"#,
    )
    .unwrap()
    .with_host(recorder.clone());

    let mut tx = engine.transaction();
    tx.process_connection("198.51.100.7", 40912, "192.0.2.1", 80)
        .unwrap();
    tx.process_uri("/?q=evil", "GET", "HTTP/1.1").unwrap();
    tx.process_request_headers().unwrap();
    tx.process_request_body().unwrap();
    tx.process_logging().unwrap();

    let records = recorder.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].client_ip, "198.51.100.7");
    assert!(records[0].intervention.is_some());

    // A clean transaction is not relevant and produces no record
    drop(records);
    let mut tx = engine.transaction();
    tx.process_uri("/?q=fine", "GET", "HTTP/1.1").unwrap();
    tx.process_request_headers().unwrap();
    tx.process_request_body().unwrap();
    tx.process_logging().unwrap();
    assert_eq!(recorder.records.lock().unwrap().len(), 1);
}
