//! Host callback interfaces.
//!
//! The engine is embedded in an HTTP server; everything that crosses the
//! process boundary (debug sinks, audit writers, GeoIP databases, DNS
//! blocklists, upload scanners) is reached through the [`HostCallbacks`]
//! trait. A no-op default implementation is provided so the engine works
//! standalone.

use std::collections::HashMap;

/// A structured audit record handed to the host at the logging phase.
#[derive(Debug, Clone, Default)]
pub struct AuditRecord {
    /// Transaction unique id.
    pub unique_id: String,
    /// Timestamp of transaction creation (RFC 3339).
    pub timestamp: String,
    /// Client address.
    pub client_ip: String,
    /// Client port.
    pub client_port: u16,
    /// Request method.
    pub method: String,
    /// Request URI.
    pub uri: String,
    /// Response status (0 if the response was never seen).
    pub response_status: u16,
    /// IDs of the rules that matched during the transaction.
    pub matched_rule_ids: Vec<u64>,
    /// Intervention summary, if one was recorded.
    pub intervention: Option<String>,
    /// Audit-log part letters in effect for this transaction.
    pub parts: String,
}

/// Callbacks implemented by the embedding host.
///
/// Every method has a safe default so implementors override only what they
/// provide. Calls may block (DNS, disk); the engine treats them as opaque.
pub trait HostCallbacks: Send + Sync {
    /// Receive a debug message at the given level (1 = most severe).
    fn debug_log(&self, level: u8, message: &str) {
        match level {
            0..=2 => tracing::warn!(target: "rampart", "{message}"),
            3..=4 => tracing::info!(target: "rampart", "{message}"),
            _ => tracing::debug!(target: "rampart", "{message}"),
        }
    }

    /// Receive an audit record at the end of a transaction.
    fn audit_log(&self, record: &AuditRecord) {
        tracing::info!(
            target: "rampart::audit",
            unique_id = %record.unique_id,
            uri = %record.uri,
            "audit record"
        );
    }

    /// Look up GeoIP data for an address. Keys follow the `GEO` collection
    /// convention (`COUNTRY_CODE`, `COUNTRY_NAME`, `REGION`, `CITY`, ...).
    /// Returning `None` means the lookup failed.
    fn geo_lookup(&self, _ip: &str) -> Option<HashMap<String, String>> {
        None
    }

    /// Query a DNS blocklist. `query` is the fully-composed name
    /// (reversed octets prepended to the RBL zone). Returns whether the
    /// name resolves (listed).
    fn dns_rbl_query(&self, _query: &str) -> bool {
        false
    }

    /// Inspect an uploaded file. Returns true when the file should be
    /// treated as malicious.
    fn inspect_file(&self, _path: &str) -> bool {
        false
    }

    /// Execute an external script on rule match (the `exec` action).
    /// Returns whether the script ran successfully.
    fn exec_script(&self, _path: &str) -> bool {
        false
    }
}

/// Default host with tracing-backed logging and all lookups disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHost;

impl HostCallbacks for NullHost {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_host_lookups_fail_closed() {
        let host = NullHost;
        assert!(host.geo_lookup("198.51.100.1").is_none());
        assert!(!host.dns_rbl_query("1.100.51.198.rbl.example.net"));
        assert!(!host.inspect_file("/tmp/upload"));
        assert!(!host.exec_script("/opt/scripts/ban.sh"));
    }
}
