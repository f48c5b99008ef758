//! Compiled rule AST.
//!
//! A rule comes in three shapes: an operator rule (`SecRule`), an
//! unconditional execution point (`SecAction`), or a script hook
//! (`SecRuleScript`). Chained rules form a forward list owned by the
//! chain head; only the head carries the phase and id, and children
//! inherit both.

use super::phase::Phase;
use crate::actions::RuleMetadata;
use crate::error::SourceLocation;
use crate::operators::Operator;
use crate::parser::{Action, VariableSpec};
use crate::transformations::TransformationPipeline;
use std::path::PathBuf;
use std::sync::Arc;

/// The shape of a compiled rule.
#[derive(Clone)]
pub enum RuleKind {
    /// Variables, transformations, operator.
    Operator,
    /// Always fires (`SecAction`).
    Unconditional,
    /// Script execution point (`SecRuleScript`). The script itself is
    /// host-mediated; its on-match actions always fire.
    Script(PathBuf),
}

/// A compiled, executable rule.
#[derive(Clone)]
pub struct CompiledRule {
    /// Rule shape.
    pub kind: RuleKind,
    /// Phase (only meaningful on chain heads).
    pub phase: Phase,
    /// Variable selectors (empty for unconditional/script rules).
    pub variables: Vec<VariableSpec>,
    /// Compiled operator (`None` for unconditional/script rules).
    pub operator: Option<Arc<dyn Operator>>,
    /// Whether the operator decision is negated.
    pub negated: bool,
    /// Transformation pipeline (defaults merged, `none` applied).
    pub transformations: TransformationPipeline,
    /// The full action list in declaration order.
    pub actions: Vec<Action>,
    /// Configure-time metadata.
    pub metadata: RuleMetadata,
    /// Whether `capture` binds TX:0..9.
    pub capture: bool,
    /// Whether the operator re-runs after every transformation step.
    pub multi_match: bool,
    /// Next link of the chain, owned by this head.
    pub chain: Option<Box<CompiledRule>>,
    /// Stable slot used as the transformation-cache key component.
    pub slot: usize,
    /// Where the rule was defined.
    pub location: SourceLocation,
}

impl CompiledRule {
    /// The rule id, if it has one.
    pub fn id(&self) -> Option<u64> {
        self.metadata.id
    }

    /// Iterate over the chain, head first.
    pub fn links(&self) -> impl Iterator<Item = &CompiledRule> {
        let mut next = Some(self);
        std::iter::from_fn(move || {
            let current = next?;
            next = current.chain.as_deref();
            Some(current)
        })
    }

    /// Number of links, including the head.
    pub fn chain_len(&self) -> usize {
        self.links().count()
    }
}

impl std::fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRule")
            .field("id", &self.metadata.id)
            .field("phase", &self.phase)
            .field("variables", &self.variables.len())
            .field("negated", &self.negated)
            .field("chain_len", &self.chain_len())
            .finish()
    }
}
