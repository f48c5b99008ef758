//! # rampart
//!
//! An embeddable web application firewall rule engine with a
//! SecRule-compatible configuration language.
//!
//! The host HTTP server feeds each transaction's request and response
//! through the engine phase by phase; rules inspect variables, normalize
//! them through transformation pipelines, match operators, and produce
//! interventions (deny, drop, redirect, allow) that the host enforces.
//!
//! ## Quick start
//!
//! ```
//! use rampart::Engine;
//!
//! let engine = Engine::from_string(r#"
//!     SecRuleEngine On
//!     SecRule ARGS "@contains evil" "id:1,phase:2,deny,status:403"
//! "#).unwrap();
//!
//! let mut tx = engine.transaction();
//! tx.process_connection("198.51.100.7", 40912, "192.0.2.1", 443).unwrap();
//! tx.process_uri("/search?q=evil", "GET", "HTTP/1.1").unwrap();
//! tx.process_request_headers().unwrap();
//! if tx.process_request_body().unwrap() {
//!     let intervention = tx.intervention().unwrap();
//!     assert_eq!(intervention.status, 403);
//! }
//! ```
//!
//! External concerns (GeoIP, DNS blocklists, audit sinks, persistent
//! collection storage) are reached through the [`host::HostCallbacks`]
//! and [`variables::CollectionStore`] traits.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod actions;
pub mod engine;
pub mod error;
pub mod host;
pub mod libinjection;
pub mod operators;
pub mod parser;
pub mod transformations;
pub mod variables;

pub use engine::{Engine, Intervention, Phase, Ruleset, RulesetBuilder, Transaction};
pub use error::{Error, Result};
pub use host::{AuditRecord, HostCallbacks, NullHost};
pub use variables::{CollectionStore, MemoryStore};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
