//! Fluent construction of transitions, plus factory functions for common
//! chart shapes.
//!
//! # Example
//!
//! ```rust,ignore
//! chart.transition(idle)
//!     .to(playing)
//!     .when(|message, _| *message == "play")
//!     .effect(|_, _| log::info!("spinning up"))
//!     .build()?;
//! ```

use std::sync::Arc;

use crate::behavior::Behavior;
use crate::model::chart::{StateChart, TransitionNode};
use crate::model::types::{
    GuardKind, ModelError, PseudoStateKind, TransitionId, TransitionKind, VertexId,
};
use crate::runtime::Instance;

impl<M> StateChart<M> {
    /// Begin building a transition out of `source`.
    ///
    /// A builder finished without a target produces an internal transition.
    /// A builder finished without a guard defaults to the constant-true
    /// guard when the source is a pseudo state, and to the source's
    /// completion event when the source is a state.
    pub fn transition(&mut self, source: VertexId) -> TransitionBuilder<'_, M> {
        TransitionBuilder {
            chart: self,
            source,
            target: None,
            kind: TransitionKind::Internal,
            guard: None,
            effect: Behavior::new(),
        }
    }
}

/// Builder for a single transition.
pub struct TransitionBuilder<'a, M> {
    chart: &'a mut StateChart<M>,
    source: VertexId,
    target: Option<VertexId>,
    kind: TransitionKind,
    guard: Option<GuardKind<M>>,
    effect: Behavior<M>,
}

impl<'a, M> TransitionBuilder<'a, M> {
    /// Target a vertex with an external transition.
    pub fn to(mut self, target: VertexId) -> Self {
        self.target = Some(target);
        self.kind = TransitionKind::External;
        self
    }

    /// Target a vertex with a local transition. The target must be a
    /// descendant of the source composite; the validator reports breaches.
    pub fn local(mut self, target: VertexId) -> Self {
        self.target = Some(target);
        self.kind = TransitionKind::Local;
        self
    }

    /// Make the transition internal: no target, no exit or entry, only the
    /// effect runs.
    pub fn internal(mut self) -> Self {
        self.target = None;
        self.kind = TransitionKind::Internal;
        self
    }

    /// Guard the transition with a predicate over (message, instance).
    pub fn when<F>(mut self, guard: F) -> Self
    where
        F: Fn(&M, &dyn Instance) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(GuardKind::When(Arc::new(guard)));
        self
    }

    /// Mark the transition as the else branch of its choice or junction
    /// source: it is selected only when no other guard passes.
    pub fn otherwise(mut self) -> Self {
        self.guard = Some(GuardKind::Else);
        self
    }

    /// Append a transition effect, executed between exit and entry.
    pub fn effect<F>(mut self, action: F) -> Self
    where
        F: Fn(Option<&M>, &mut dyn Instance) + Send + Sync + 'static,
    {
        self.effect.push(move |_, message, instance, _| {
            action(message, instance);
            Ok(())
        });
        self
    }

    /// Finish the transition and add it to the chart.
    pub fn build(self) -> Result<TransitionId, ModelError> {
        let source_node = &self.chart.vertices[self.source.0];
        if source_node.removed {
            return Err(ModelError::Removed(source_node.qualified_name.clone()));
        }
        if let Some(target) = self.target {
            let target_node = &self.chart.vertices[target.0];
            if target_node.removed {
                return Err(ModelError::Removed(target_node.qualified_name.clone()));
            }
        }
        let kind = if self.target.is_none() {
            TransitionKind::Internal
        } else {
            self.kind
        };
        let guard = self.guard.unwrap_or_else(|| {
            if self.chart.is_state(self.source) {
                GuardKind::Completion
            } else {
                GuardKind::Always
            }
        });
        Ok(self.chart.push_transition(TransitionNode {
            source: self.source,
            target: self.target,
            kind,
            guard,
            effect: self.effect,
            removed: false,
        }))
    }
}

/// Create a two-state toggle chart flipping on one message.
pub fn toggle_chart<M>(
    name: &str,
    off_state: &str,
    on_state: &str,
    toggle: M,
) -> Result<StateChart<M>, ModelError>
where
    M: Clone + PartialEq + Send + Sync + 'static,
{
    let mut chart = StateChart::new(name);
    let region = chart.default_region(chart.root())?;
    let initial = chart.add_pseudostate(region, "initial", PseudoStateKind::Initial)?;
    let off = chart.add_state(region, off_state)?;
    let on = chart.add_state(region, on_state)?;

    chart.transition(initial).to(off).build()?;
    let to_on = toggle.clone();
    chart
        .transition(off)
        .to(on)
        .when(move |message, _| *message == to_on)
        .build()?;
    chart
        .transition(on)
        .to(off)
        .when(move |message, _| *message == toggle)
        .build()?;

    Ok(chart)
}

/// Create a linear chart progressing through `states` on one message; the
/// last state is final, so reaching it completes the machine.
pub fn sequential_chart<M>(
    name: &str,
    states: &[&str],
    advance: M,
) -> Result<StateChart<M>, ModelError>
where
    M: Clone + PartialEq + Send + Sync + 'static,
{
    if states.is_empty() {
        return Err(ModelError::EmptyChart(name.to_string()));
    }

    let mut chart = StateChart::new(name);
    let region = chart.default_region(chart.root())?;
    let initial = chart.add_pseudostate(region, "initial", PseudoStateKind::Initial)?;

    let mut vertices = Vec::with_capacity(states.len());
    for (index, state) in states.iter().enumerate() {
        let vertex = if index + 1 == states.len() {
            chart.add_final_state(region, state)?
        } else {
            chart.add_state(region, state)?
        };
        vertices.push(vertex);
    }

    chart.transition(initial).to(vertices[0]).build()?;
    for pair in vertices.windows(2) {
        let message = advance.clone();
        chart
            .transition(pair[0])
            .to(pair[1])
            .when(move |m, _| *m == message)
            .build()?;
    }

    Ok(chart)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::HashMapInstance;

    #[test]
    fn test_targetless_transition_is_internal() {
        let mut chart = StateChart::<&str>::new("machine");
        let state = chart.add_state(chart.root(), "a").unwrap();
        let t = chart.transition(state).build().unwrap();
        assert_eq!(chart.transition_kind(t), TransitionKind::Internal);
        assert_eq!(chart.transition_target(t), None);
    }

    #[test]
    fn test_to_sets_external_kind() {
        let mut chart = StateChart::<&str>::new("machine");
        let a = chart.add_state(chart.root(), "a").unwrap();
        let b = chart.add_state(chart.root(), "b").unwrap();
        let t = chart.transition(a).to(b).build().unwrap();
        assert_eq!(chart.transition_kind(t), TransitionKind::External);
        assert_eq!(chart.transition_target(t), Some(b));
    }

    #[test]
    fn test_build_rejects_removed_source() {
        let mut chart = StateChart::<&str>::new("machine");
        let a = chart.add_state(chart.root(), "a").unwrap();
        let b = chart.add_state(chart.root(), "b").unwrap();
        chart.remove_vertex(a).unwrap();
        let result = chart.transition(a).to(b).build();
        assert!(matches!(result, Err(ModelError::Removed(_))));
    }

    #[test]
    fn test_toggle_chart() {
        let mut chart = toggle_chart("toggle", "off", "on", "flip").unwrap();
        let off = chart.find_vertex("toggle.default.off").unwrap();
        let on = chart.find_vertex("toggle.default.on").unwrap();

        let mut instance = HashMapInstance::new();
        chart.initialise(&mut instance).unwrap();
        assert!(chart.is_active(off, &instance));

        chart.evaluate(&mut instance, &"flip").unwrap();
        assert!(chart.is_active(on, &instance));

        chart.evaluate(&mut instance, &"flip").unwrap();
        assert!(chart.is_active(off, &instance));
    }

    #[test]
    fn test_sequential_chart_completes() {
        let mut chart = sequential_chart("seq", &["one", "two", "three"], "next").unwrap();
        let root = chart.root();
        let two = chart.find_vertex("seq.default.two").unwrap();

        let mut instance = HashMapInstance::new();
        chart.initialise(&mut instance).unwrap();

        assert!(chart.evaluate(&mut instance, &"next").unwrap());
        assert!(chart.is_active(two, &instance));

        assert!(chart.evaluate(&mut instance, &"next").unwrap());
        assert!(chart.is_complete(root, &instance));
    }

    #[test]
    fn test_sequential_chart_rejects_empty() {
        let result = sequential_chart::<&str>("seq", &[], "next");
        assert!(matches!(result, Err(ModelError::EmptyChart(_))));
    }
}
