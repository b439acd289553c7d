//! Thread-safe wrapper around a state chart.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::StateChart;
use crate::runtime::{EvaluationError, Instance};
use crate::validation::ValidationIssue;

/// Shared handle to a chart.
///
/// Evaluations on one instance must be serialised; the write lock taken for
/// every dispatch also covers the recompile-on-dirty path. Instances are
/// still owned by the callers, so independent instances evaluated through
/// clones of this handle only contend on the lock.
pub struct SharedStateChart<M> {
    inner: Arc<RwLock<StateChart<M>>>,
}

impl<M> SharedStateChart<M> {
    /// Wrap a chart.
    pub fn new(chart: StateChart<M>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(chart)),
        }
    }

    /// Compile the model.
    pub fn compile(&self) {
        self.inner.write().compile();
    }

    /// Initialise an instance against the chart.
    pub fn initialise(&self, instance: &mut dyn Instance) -> Result<(), EvaluationError> {
        self.inner.write().initialise(instance)
    }

    /// Dispatch a message into an instance.
    pub fn evaluate(
        &self,
        instance: &mut dyn Instance,
        message: &M,
    ) -> Result<bool, EvaluationError> {
        self.inner.write().evaluate(instance, message)
    }

    /// Run the structural validator.
    pub fn validate(&self) -> Vec<ValidationIssue> {
        crate::validation::validate(&self.inner.read())
    }

    /// Run a closure with read access to the chart.
    pub fn read<R>(&self, f: impl FnOnce(&StateChart<M>) -> R) -> R {
        f(&self.inner.read())
    }

    /// Run a closure with write access to the chart, for late authoring.
    pub fn write<R>(&self, f: impl FnOnce(&mut StateChart<M>) -> R) -> R {
        f(&mut self.inner.write())
    }
}

impl<M> Clone for SharedStateChart<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> fmt::Debug for SharedStateChart<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedStateChart").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::toggle_chart;
    use crate::runtime::HashMapInstance;

    #[test]
    fn test_shared_evaluation() {
        let shared = SharedStateChart::new(toggle_chart("toggle", "off", "on", "flip").unwrap());
        let on = shared.read(|chart| chart.find_vertex("toggle.default.on")).unwrap();

        let mut instance = HashMapInstance::new();
        shared.initialise(&mut instance).unwrap();
        shared.evaluate(&mut instance, &"flip").unwrap();
        assert!(shared.read(|chart| chart.is_active(on, &instance)));
    }

    #[test]
    fn test_instances_evaluate_from_threads() {
        let shared = SharedStateChart::new(toggle_chart("toggle", "off", "on", "flip").unwrap());
        shared.compile();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let chart = shared.clone();
            handles.push(std::thread::spawn(move || {
                let mut instance = HashMapInstance::new();
                chart.initialise(&mut instance).unwrap();
                chart.evaluate(&mut instance, &"flip").unwrap();
                let on = chart.read(|c| c.find_vertex("toggle.default.on")).unwrap();
                chart.read(|c| c.is_active(on, &instance))
            }));
        }
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
