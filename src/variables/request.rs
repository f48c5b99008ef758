//! Request-side transaction data.

use super::collection::{Collection, OrderedCollection};
use percent_encoding::percent_decode_str;

/// Parsed request state, populated by the connector through the
/// transaction API.
#[derive(Debug, Clone)]
pub struct RequestData {
    /// HTTP method.
    pub method: String,
    /// Request URI (path plus query string).
    pub uri: String,
    /// URI exactly as received.
    pub uri_raw: String,
    /// Path component.
    pub path: String,
    /// Query string (without `?`).
    pub query_string: String,
    /// Protocol version string.
    pub protocol: String,
    /// Request headers (names lowercased on insert).
    pub headers: OrderedCollection,
    /// Query-string arguments.
    pub args_get: OrderedCollection,
    /// Body arguments.
    pub args_post: OrderedCollection,
    /// Cookies.
    pub cookies: OrderedCollection,
    /// Raw request body.
    pub body: Vec<u8>,
    /// Client IP address.
    pub client_ip: String,
    /// Client port.
    pub client_port: u16,
    /// Server IP address.
    pub server_ip: String,
    /// Server port.
    pub server_port: u16,
    /// Argument pair separator (configurable via SecArgumentSeparator).
    pub arg_separator: char,
}

impl Default for RequestData {
    fn default() -> Self {
        Self {
            method: String::new(),
            uri: String::new(),
            uri_raw: String::new(),
            path: String::new(),
            query_string: String::new(),
            protocol: String::new(),
            headers: OrderedCollection::new(),
            args_get: OrderedCollection::new(),
            args_post: OrderedCollection::new(),
            cookies: OrderedCollection::new(),
            body: Vec::new(),
            client_ip: String::new(),
            client_port: 0,
            server_ip: String::new(),
            server_port: 0,
            arg_separator: '&',
        }
    }
}

impl RequestData {
    /// Create empty request data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the URI and split it into path and parsed query arguments.
    pub fn set_uri(&mut self, uri: &str) {
        self.uri = uri.to_string();
        self.uri_raw = uri.to_string();

        match uri.split_once('?') {
            Some((path, query)) => {
                self.path = path.to_string();
                self.query_string = query.to_string();
                let qs = self.query_string.clone();
                parse_pairs(&qs, self.arg_separator, &mut self.args_get);
            }
            None => {
                self.path = uri.to_string();
                self.query_string.clear();
            }
        }
    }

    /// Last path segment.
    pub fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Record a header; `Cookie` headers are additionally parsed into the
    /// cookie collection.
    pub fn add_header(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case("cookie") {
            for pair in value.split(';') {
                if let Some((k, v)) = pair.split_once('=') {
                    self.cookies.add(k.trim().to_string(), v.trim().to_string());
                }
            }
        }
        self.headers.add(name.to_ascii_lowercase(), value.to_string());
    }

    /// Append request body bytes.
    pub fn append_body(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    /// Body as lossy UTF-8.
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Parse a urlencoded body into the body-argument collection.
    pub fn parse_form_body(&mut self) {
        let body = self.body_str();
        parse_pairs(&body, self.arg_separator, &mut self.args_post);
    }

    /// The reconstructed request line.
    pub fn request_line(&self) -> String {
        format!("{} {} {}", self.method, self.uri, self.protocol)
    }

    /// Combined byte size of all argument names and values.
    pub fn args_combined_size(&self) -> usize {
        self.args_get.combined_size() + self.args_post.combined_size()
    }

    /// Total argument count.
    pub fn args_count(&self) -> usize {
        self.args_get.count() + self.args_post.count()
    }

    /// Reconstruct the full request (line, headers, body) for
    /// FULL_REQUEST.
    pub fn full_request(&self) -> String {
        let mut out = self.request_line();
        out.push_str("\r\n");
        for (name, value) in self.headers.all() {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out.push_str(&self.body_str());
        out
    }
}

/// Split `k=v SEP k=v` pairs, percent-decoding keys and values. `+`
/// decodes to space, as form encoding requires.
fn parse_pairs(input: &str, separator: char, into: &mut OrderedCollection) {
    for pair in input.split(separator) {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        into.add(decode_component(key), decode_component(value));
    }
}

fn decode_component(s: &str) -> String {
    let plus_decoded = s.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .to_string()
}
