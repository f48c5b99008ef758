//! Response-side transaction data.

use super::collection::OrderedCollection;

/// Response state, populated by the connector.
#[derive(Debug, Clone, Default)]
pub struct ResponseData {
    /// HTTP status code.
    pub status: u16,
    /// Response protocol.
    pub protocol: String,
    /// Response headers (names lowercased on insert).
    pub headers: OrderedCollection,
    /// Raw response body.
    pub body: Vec<u8>,
    /// Content type, tracked from the header.
    pub content_type: String,
}

impl ResponseData {
    /// Create empty response data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a header.
    pub fn add_header(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case("content-type") {
            self.content_type = value.to_string();
        }
        self.headers.add(name.to_ascii_lowercase(), value.to_string());
    }

    /// Append response body bytes.
    pub fn append_body(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    /// Body as lossy UTF-8.
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// The status line (`HTTP/1.1 200`).
    pub fn status_line(&self) -> String {
        format!("{} {}", self.protocol, self.status)
    }
}
