//! Rule engine: compiled rulesets and transaction processing.

pub mod exceptions;
pub mod intervention;
pub mod phase;
pub mod rule;
pub mod ruleset;
pub mod transaction;

pub use intervention::Intervention;
pub use phase::Phase;
pub use rule::{CompiledRule, RuleKind};
pub use ruleset::{AuditMode, EngineConfig, Ruleset, RulesetBuilder};
pub use transaction::Transaction;

use crate::error::Result;
use crate::host::{HostCallbacks, NullHost};
use crate::variables::{CollectionStore, MemoryStore};
use std::sync::Arc;

/// The engine: a sealed ruleset plus host bindings, shared by all
/// transactions.
pub struct Engine {
    ruleset: Arc<Ruleset>,
    host: Arc<dyn HostCallbacks>,
    store: Arc<dyn CollectionStore>,
}

impl Engine {
    /// Create an engine with the default host and an in-memory
    /// persistent store.
    pub fn new(ruleset: Ruleset) -> Self {
        Self {
            ruleset: Arc::new(ruleset),
            host: Arc::new(NullHost),
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// Load rules from configuration text.
    pub fn from_string(rules: &str) -> Result<Self> {
        Ok(Self::new(Ruleset::from_string(rules)?))
    }

    /// Load rules from a file or glob pattern.
    pub fn from_file(path: &str) -> Result<Self> {
        Ok(Self::new(Ruleset::from_file(path)?))
    }

    /// Replace the host callbacks.
    pub fn with_host(mut self, host: Arc<dyn HostCallbacks>) -> Self {
        self.host = host;
        self
    }

    /// Replace the persistent collection store.
    pub fn with_store(mut self, store: Arc<dyn CollectionStore>) -> Self {
        self.store = store;
        self
    }

    /// Start a transaction.
    pub fn transaction(&self) -> Transaction {
        Transaction::new(
            Arc::clone(&self.ruleset),
            Arc::clone(&self.host),
            Arc::clone(&self.store),
        )
    }

    /// The sealed ruleset.
    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    /// Number of top-level rules.
    pub fn rule_count(&self) -> usize {
        self.ruleset.rule_count()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("rule_count", &self.ruleset.rule_count())
            .finish()
    }
}
