use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tracing::debug;

use crate::error::ConfigError;
use crate::tasks::Task;

/// Name-keyed table of every task a chain may refer to.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<&'static str, Arc<dyn Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task under its name. A second task with the same name is rejected.
    pub fn register(&mut self, task: impl Task + 'static) -> Result<(), ConfigError> {
        self.register_arc(Arc::new(task))
    }

    pub fn register_arc(&mut self, task: Arc<dyn Task>) -> Result<(), ConfigError> {
        match self.tasks.entry(task.name()) {
            Entry::Occupied(e) => Err(ConfigError::DuplicateTask(e.key().to_string())),
            Entry::Vacant(e) => {
                debug!(task = task.name(), "task registered");
                e.insert(task);
                Ok(())
            }
        }
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(name).cloned()
    }

    /// Every registered task, in no particular order.
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Task>> {
        self.tasks.values()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tasks.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::context::AuditContext;
    use crate::error::TaskError;

    struct NoOpTask(&'static str);

    #[async_trait]
    impl Task for NoOpTask {
        fn name(&self) -> &'static str {
            self.0
        }
        fn describe_status(&self, _ctx: &AuditContext) -> String {
            format!("Running {}", self.0)
        }
        async fn execute(&self, _ctx: &mut AuditContext) -> Result<(), TaskError> {
            Ok(())
        }
    }

    #[test]
    fn new_registry_is_empty() {
        let registry = TaskRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.resolve("anything").is_none());
    }

    #[test]
    fn register_and_resolve() {
        let mut registry = TaskRegistry::new();
        registry.register(NoOpTask("fetch")).unwrap();
        registry.register(NoOpTask("analyze")).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve("fetch").unwrap().name(), "fetch");
        assert!(registry.resolve("download").is_none());
    }

    #[test]
    fn duplicate_name_is_rejected_and_keeps_first() {
        let mut registry = TaskRegistry::new();
        registry.register(NoOpTask("fetch")).unwrap();
        let err = registry.register(NoOpTask("fetch")).unwrap_err();

        assert_eq!(err, ConfigError::DuplicateTask("fetch".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = TaskRegistry::new();
        for name in ["run_analyses", "fetch_npm", "generate_sbom"] {
            registry.register(NoOpTask(name)).unwrap();
        }
        assert_eq!(registry.names(), vec!["fetch_npm", "generate_sbom", "run_analyses"]);
        assert_eq!(registry.all().count(), 3);
    }
}
