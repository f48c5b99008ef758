//! Network operators (@ipMatch, @ipMatchFromFile, @rbl, @geoLookup).

use super::traits::{EvalContext, Operator, OperatorResult};
use crate::error::{Error, Result};
use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// IP/CIDR list match (@ipMatch). The most specific (longest-prefix)
/// matching network wins, though for a boolean decision any hit suffices.
pub struct IpMatchOperator {
    networks: Vec<IpNetwork>,
}

impl IpMatchOperator {
    /// Build from a comma- or space-separated address/CIDR list.
    pub fn new(list: &str) -> Result<Self> {
        let networks = list
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_network)
            .collect::<Result<Vec<_>>>()?;
        if networks.is_empty() {
            return Err(Error::InvalidIp {
                value: list.to_string(),
                message: "empty address list".to_string(),
            });
        }
        Ok(Self { networks })
    }

    /// Build from a file (one address/CIDR per line, `#` comments).
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::RuleFileLoad {
            path: path.into(),
            source: e,
        })?;
        let list: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect();
        Self::new(&list.join(" "))
    }

    /// The longest matching prefix length, if any network contains the
    /// address.
    fn longest_match(&self, ip: &IpAddr) -> Option<u8> {
        self.networks
            .iter()
            .filter(|net| net.contains(*ip))
            .map(|net| net.prefix())
            .max()
    }
}

fn parse_network(s: &str) -> Result<IpNetwork> {
    if s.contains('/') {
        return s.parse::<IpNetwork>().map_err(|e| Error::InvalidIp {
            value: s.to_string(),
            message: e.to_string(),
        });
    }
    let ip: IpAddr = s.parse().map_err(|_| Error::InvalidIp {
        value: s.to_string(),
        message: "not an IP address".to_string(),
    })?;
    Ok(IpNetwork::from(ip))
}

impl Operator for IpMatchOperator {
    fn evaluate(&self, input: &str, _ctx: &EvalContext<'_>) -> OperatorResult {
        match input.trim().parse::<IpAddr>() {
            Ok(ip) => match self.longest_match(&ip) {
                Some(_) => OperatorResult::matched(input.trim().to_string()),
                None => OperatorResult::no_match(),
            },
            // Unparsable input downgrades to no-match
            Err(_) => OperatorResult::no_match(),
        }
    }

    fn name(&self) -> &'static str {
        "ipMatch"
    }
}

/// DNS blocklist lookup (@rbl). The input IP's reversed octets are
/// prepended to the configured zone and the host resolves the name.
pub struct RblOperator {
    zone: String,
}

impl RblOperator {
    pub fn new(zone: &str) -> Self {
        Self {
            zone: zone.trim().to_string(),
        }
    }

    fn query_name(&self, ip: &IpAddr) -> Option<String> {
        match ip {
            IpAddr::V4(v4) => {
                let o = v4.octets();
                Some(format!("{}.{}.{}.{}.{}", o[3], o[2], o[1], o[0], self.zone))
            }
            // v6 RBL zones are rare; nibble-reverse when needed
            IpAddr::V6(_) => None,
        }
    }
}

impl Operator for RblOperator {
    fn evaluate(&self, input: &str, ctx: &EvalContext<'_>) -> OperatorResult {
        let ip: IpAddr = match input.trim().parse() {
            Ok(ip) => ip,
            Err(_) => return OperatorResult::no_match(),
        };
        let Some(query) = self.query_name(&ip) else {
            return OperatorResult::no_match();
        };
        if ctx.host.dns_rbl_query(&query) {
            OperatorResult::matched(input.trim().to_string())
        } else {
            OperatorResult::no_match()
        }
    }

    fn name(&self) -> &'static str {
        "rbl"
    }
}

/// GeoIP lookup (@geoLookup). On success the returned fields are written
/// into the `GEO` collection and the operator matches.
pub struct GeoLookupOperator;

impl Operator for GeoLookupOperator {
    fn evaluate(&self, input: &str, ctx: &EvalContext<'_>) -> OperatorResult {
        match ctx.host.geo_lookup(input.trim()) {
            Some(fields) => {
                let mut result = OperatorResult::matched(input.trim().to_string());
                result.lookup_data = fields.into_iter().collect();
                result
            }
            None => OperatorResult::no_match(),
        }
    }

    fn name(&self) -> &'static str {
        "geoLookup"
    }
}

/// Uploaded-file inspection (@inspectFile), delegated to the host.
pub struct InspectFileOperator;

impl Operator for InspectFileOperator {
    fn evaluate(&self, input: &str, ctx: &EvalContext<'_>) -> OperatorResult {
        if ctx.host.inspect_file(input) {
            OperatorResult::matched(input.to_string())
        } else {
            OperatorResult::no_match()
        }
    }

    fn name(&self) -> &'static str {
        "inspectFile"
    }
}
