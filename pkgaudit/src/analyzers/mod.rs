use std::sync::Arc;

use crate::context::AuditContext;
use crate::finding::Finding;

pub mod metadata;

pub use metadata::MetadataAnalyzer;

/// A synchronous check over the gathered context.
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &'static str;
    fn analyze(&self, ctx: &AuditContext) -> Vec<Finding>;
}

/// Ordered collection of analyzers run by the `run_analyses` task.
#[derive(Clone, Default)]
pub struct AnalyzerSet {
    analyzers: Vec<Arc<dyn Analyzer>>,
}

impl AnalyzerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every analyzer shipped with the crate.
    pub fn builtin() -> Self {
        Self::new().with(MetadataAnalyzer)
    }

    pub fn with(mut self, analyzer: impl Analyzer + 'static) -> Self {
        self.analyzers.push(Arc::new(analyzer));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Analyzer>> {
        self.analyzers.iter()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_contains_metadata() {
        let set = AnalyzerSet::builtin();
        let names: Vec<&str> = set.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["metadata"]);
    }

    #[test]
    fn empty_set() {
        let set = AnalyzerSet::new();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }
}
