//! Transformation pipeline.

use super::{create_transformation, Transformation};
use crate::error::Result;
use std::borrow::Cow;
use std::sync::Arc;

/// An ordered list of transformations applied before the operator.
///
/// Assembly honors the `none` discipline: whenever `none` appears, the
/// list accumulated so far is discarded, so only the suffix after the
/// last `none` survives.
#[derive(Clone, Default)]
pub struct TransformationPipeline {
    transformations: Vec<Arc<dyn Transformation>>,
}

impl TransformationPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `t:` names in declaration order.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut pipeline = Self::new();
        for name in names {
            pipeline.push(name.as_ref())?;
        }
        Ok(pipeline)
    }

    /// Append one transformation by name, applying the `none` reset.
    pub fn push(&mut self, name: &str) -> Result<()> {
        if name.eq_ignore_ascii_case("none") {
            self.transformations.clear();
            return Ok(());
        }
        self.transformations.push(create_transformation(name)?);
        Ok(())
    }

    /// Apply the whole pipeline.
    pub fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut current: Cow<'a, str> = Cow::Borrowed(input);
        for t in &self.transformations {
            current = match current {
                Cow::Borrowed(s) => t.transform(s),
                Cow::Owned(s) => match t.transform(&s) {
                    Cow::Borrowed(_) => Cow::Owned(s),
                    Cow::Owned(new) => Cow::Owned(new),
                },
            };
        }
        current
    }

    /// Apply the pipeline, collecting the value after every step. Used by
    /// `multiMatch` and by the evaluator's prefix cache.
    pub fn apply_stepwise(&self, input: &str) -> Vec<String> {
        let mut steps = Vec::with_capacity(self.transformations.len());
        let mut current = input.to_string();
        for t in &self.transformations {
            current = t.transform(&current).into_owned();
            steps.push(current.clone());
        }
        steps
    }

    /// The compiled transformations.
    pub fn transforms(&self) -> &[Arc<dyn Transformation>] {
        &self.transformations
    }

    /// Transformation names in application order.
    pub fn names(&self) -> Vec<&'static str> {
        self.transformations.iter().map(|t| t.name()).collect()
    }

    /// Whether the pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.transformations.is_empty()
    }

    /// Number of transformations.
    pub fn len(&self) -> usize {
        self.transformations.len()
    }
}

impl std::fmt::Debug for TransformationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformationPipeline")
            .field("transformations", &self.names())
            .finish()
    }
}
