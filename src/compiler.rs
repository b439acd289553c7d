//! Model compilation.
//!
//! A depth-first pass over the chart that synthesises, for every region and
//! vertex, three ordered behavior sequences — `leave`, `begin_enter` and
//! `end_enter` — and, for every transition, its `on_traverse` sequence.
//! Entry and exit work is flattened into these sequences once, so runtime
//! dispatch is a plain in-order walk.
//!
//! The pass threads a deep-history flag down the tree: a region whose entry
//! point is a deep history pseudo state forces history semantics onto every
//! descendant region. Junction branches stay unresolved here (they are
//! selected at traversal time, before any behavior runs); choice branches
//! are inherently dynamic and traversed recursively by the evaluator.

use crate::behavior::Behavior;
use crate::model::{
    PseudoStateKind, RegionId, StateChart, TransitionId, TransitionKind, VertexData, VertexId,
};

/// Compiled behavior record of one element.
pub(crate) struct ElementBehavior<M> {
    pub leave: Behavior<M>,
    pub begin_enter: Behavior<M>,
    pub end_enter: Behavior<M>,
}

impl<M> ElementBehavior<M> {
    fn new() -> Self {
        Self {
            leave: Behavior::new(),
            begin_enter: Behavior::new(),
            end_enter: Behavior::new(),
        }
    }

    /// The full entry sequence, materialised fresh so callers can extend it
    /// without aliasing the element's record.
    pub fn enter(&self) -> Behavior<M> {
        let mut enter = self.begin_enter.clone();
        enter.push_behavior(&self.end_enter);
        enter
    }
}

/// The compiled products of one pass, indexed by the chart's arena ids.
pub(crate) struct CompiledModel<M> {
    pub vertices: Vec<ElementBehavior<M>>,
    pub regions: Vec<ElementBehavior<M>>,
    pub on_traverse: Vec<Behavior<M>>,
    pub on_initialise: Behavior<M>,
}

impl<M> CompiledModel<M> {
    pub fn empty() -> Self {
        Self {
            vertices: Vec::new(),
            regions: Vec::new(),
            on_traverse: Vec::new(),
            on_initialise: Behavior::new(),
        }
    }
}

impl<M> StateChart<M> {
    /// Compile the model into behavior sequences. Idempotent; clears the
    /// dirty flag. Called automatically by `initialise` and `evaluate` when
    /// the model changed.
    pub fn compile(&mut self) {
        let compiled = Compiler::new(&*self).run();
        self.compiled = compiled;
        self.dirty = false;
    }
}

struct Compiler<'c, M> {
    chart: &'c StateChart<M>,
    vertices: Vec<ElementBehavior<M>>,
    regions: Vec<ElementBehavior<M>>,
}

impl<'c, M> Compiler<'c, M> {
    fn new(chart: &'c StateChart<M>) -> Self {
        Self {
            chart,
            vertices: (0..chart.vertices.len())
                .map(|_| ElementBehavior::new())
                .collect(),
            regions: (0..chart.regions.len())
                .map(|_| ElementBehavior::new())
                .collect(),
        }
    }

    fn run(mut self) -> CompiledModel<M> {
        let root = self.chart.root();
        self.visit_state(root, false);

        let mut on_traverse = vec![Behavior::new(); self.chart.transitions.len()];
        for transition in self.chart.live_transition_ids() {
            on_traverse[transition.0] = self.compile_transition(transition);
        }

        let on_initialise = self.vertices[root.0].enter();
        CompiledModel {
            vertices: self.vertices,
            regions: self.regions,
            on_traverse,
            on_initialise,
        }
    }

    // ---- element visits --------------------------------------------------

    fn visit_vertex_element(&mut self, vertex: VertexId) {
        let exit_name = self.chart.qualified_name(vertex).to_string();
        let enter_name = exit_name.clone();
        self.vertices[vertex.0].leave.push(move |_, _, _, _| {
            log::debug!("exit {}", exit_name);
            Ok(())
        });
        self.vertices[vertex.0].begin_enter.push(move |_, _, _, _| {
            log::debug!("enter {}", enter_name);
            Ok(())
        });
    }

    fn visit_region_element(&mut self, region: RegionId) {
        let exit_name = self.chart.region_qualified_name(region).to_string();
        let enter_name = exit_name.clone();
        self.regions[region.0].leave.push(move |_, _, _, _| {
            log::debug!("exit {}", exit_name);
            Ok(())
        });
        self.regions[region.0].begin_enter.push(move |_, _, _, _| {
            log::debug!("enter {}", enter_name);
            Ok(())
        });
    }

    fn visit_vertex(&mut self, vertex: VertexId, deep_history_above: bool) {
        match &self.chart.vertices[vertex.0].data {
            VertexData::State(_) => self.visit_state(vertex, deep_history_above),
            VertexData::Pseudo(kind) => self.visit_pseudostate(vertex, *kind),
        }
    }

    fn visit_region(&mut self, region: RegionId, deep_history_above: bool) {
        let chart = self.chart;
        let region_initial = chart
            .vertices_of(region)
            .iter()
            .find_map(|&vertex| {
                chart
                    .pseudo_kind(vertex)
                    .filter(|kind| kind.is_initial())
                    .map(|kind| (vertex, kind))
            });
        let initial_is_deep = matches!(region_initial, Some((_, PseudoStateKind::DeepHistory)));
        let initial_is_history = region_initial.map_or(false, |(_, kind)| kind.is_history());

        // leave: exit whatever child is currently active
        let leave_region = region;
        self.regions[region.0].leave.push(move |chart, message, instance, history| {
            if let Some(current) = instance.current(leave_region) {
                chart.compiled.vertices[current.0]
                    .leave
                    .invoke(chart, message, instance, history)?;
            }
            Ok(())
        });
        self.visit_region_element(region);

        for &child in chart.vertices_of(region) {
            self.visit_vertex(child, deep_history_above || initial_is_deep);
        }

        match region_initial {
            Some((initial, kind)) if !deep_history_above && !kind.is_history() => {
                // Fixed entry point: inline its full entry sequence.
                let enter = self.vertices[initial.0].enter();
                self.regions[region.0].end_enter.push_behavior(&enter);
            }
            _ => {
                // The vertex to enter depends on runtime state: history
                // replay, or a deep history somewhere above this region.
                let initial = region_initial.map(|(vertex, _)| vertex);
                let entry_region = region;
                let name = chart.region_qualified_name(region).to_string();
                self.regions[region.0].end_enter.push(
                    move |chart, message, instance, history| {
                        let chosen = if history || initial_is_history {
                            instance.current(entry_region).or(initial)
                        } else {
                            initial
                        };
                        match chosen {
                            Some(vertex) => {
                                let deep = history || initial_is_deep;
                                chart.compiled.vertices[vertex.0]
                                    .begin_enter
                                    .invoke(chart, message, instance, deep)?;
                                chart.compiled.vertices[vertex.0]
                                    .end_enter
                                    .invoke(chart, message, instance, deep)?;
                                Ok(())
                            }
                            None => {
                                log::warn!(
                                    "region '{}' entered with no initial vertex and no history",
                                    name
                                );
                                Ok(())
                            }
                        }
                    },
                );
            }
        }
    }

    fn visit_pseudostate(&mut self, vertex: VertexId, kind: PseudoStateKind) {
        self.visit_vertex_element(vertex);

        if kind.is_initial() {
            let is_history = kind.is_history();
            let is_deep = kind == PseudoStateKind::DeepHistory;
            self.vertices[vertex.0].end_enter.push(
                move |chart, message, instance, history| {
                    let region = match chart.parent_region(vertex) {
                        Some(region) => region,
                        None => return Ok(()),
                    };
                    let remembered = if is_history {
                        instance.current(region)
                    } else {
                        None
                    };
                    match remembered {
                        Some(current) => {
                            // History replay: step out of the pseudo state
                            // and re-enter the remembered state.
                            chart.compiled.vertices[vertex.0]
                                .leave
                                .invoke(chart, message, instance, history)?;
                            let deep = history || is_deep;
                            chart.compiled.vertices[current.0]
                                .begin_enter
                                .invoke(chart, message, instance, deep)?;
                            chart.compiled.vertices[current.0]
                                .end_enter
                                .invoke(chart, message, instance, deep)?;
                            Ok(())
                        }
                        None => match chart.outgoing(vertex).first() {
                            Some(&transition) => chart.traverse_from(transition, instance, message),
                            None => Err(crate::runtime::EvaluationError::MissingInitialTransition(
                                chart.qualified_name(vertex).to_string(),
                            )),
                        },
                    }
                },
            );
        } else if kind == PseudoStateKind::Terminate {
            self.vertices[vertex.0].begin_enter.push(|_, _, instance, _| {
                instance.set_terminated();
                Ok(())
            });
        }
    }

    fn visit_state(&mut self, state: VertexId, deep_history_above: bool) {
        let chart = self.chart;
        for &region in chart.regions_of(state) {
            self.visit_region(region, deep_history_above);
            let region_leave = self.regions[region.0].leave.clone();
            self.vertices[state.0].leave.push_behavior(&region_leave);
            let region_enter = self.regions[region.0].enter();
            self.vertices[state.0].end_enter.push_behavior(&region_enter);
        }
        self.visit_vertex_element(state);

        let (user_entry, user_exit) = match &chart.vertices[state.0].data {
            VertexData::State(data) => (data.entry.clone(), data.exit.clone()),
            VertexData::Pseudo(_) => (Behavior::new(), Behavior::new()),
        };
        self.vertices[state.0].leave.push_behavior(&user_exit);
        self.vertices[state.0].begin_enter.push_behavior(&user_entry);

        if let Some(region) = chart.parent_region(state) {
            self.vertices[state.0].begin_enter.push(move |_, _, instance, _| {
                instance.set_current(region, state);
                Ok(())
            });
        }
    }

    // ---- transitions -----------------------------------------------------

    fn compile_transition(&self, id: TransitionId) -> Behavior<M> {
        let chart = self.chart;
        let node = &chart.transitions[id.0];
        let mut on_traverse = Behavior::new();
        match (node.kind, node.target) {
            (TransitionKind::Internal, _) | (_, None) => {
                on_traverse.push_behavior(&node.effect);
                if chart.config.internal_transitions_trigger_completion {
                    let source = node.source;
                    on_traverse.push(move |chart, _, instance, _| {
                        if chart.is_complete(source, &*instance) {
                            chart.dispatch_completion(source, instance)?;
                        }
                        Ok(())
                    });
                }
            }
            (TransitionKind::Local, Some(_)) => {
                // Exit depth depends on what is active when the transition
                // fires, so the whole traversal is one runtime hook.
                on_traverse.push(move |chart, message, instance, _| {
                    chart.traverse_local(id, instance, message)
                });
            }
            (TransitionKind::External, Some(target)) => {
                let source_ancestry = chart.ancestry(node.source);
                let target_ancestry = chart.ancestry(target);
                let mut i = source_ancestry.len().min(target_ancestry.len()) - 1;
                while i > 0 && source_ancestry[i - 1] != target_ancestry[i - 1] {
                    i -= 1;
                }
                on_traverse.push_behavior(&self.vertices[source_ancestry[i].0].leave);
                on_traverse.push_behavior(&node.effect);
                self.cascade_enter(&target_ancestry[i..], &mut on_traverse);
                on_traverse.push_behavior(&self.vertices[target.0].end_enter);
            }
        }
        on_traverse
    }

    /// Entry along an ancestry path: every element's begin_enter, with
    /// orthogonal sibling regions of path elements entered fully and the
    /// on-path region left for the next cascade step.
    fn cascade_enter(&self, path: &[VertexId], out: &mut Behavior<M>) {
        let chart = self.chart;
        for (index, &element) in path.iter().enumerate() {
            out.push_behavior(&self.vertices[element.0].begin_enter);
            if let Some(&next) = path.get(index + 1) {
                let next_region = chart.parent_region(next);
                for &region in chart.regions_of(element) {
                    out.push_behavior(&self.regions[region.0].begin_enter);
                    if Some(region) != next_region {
                        out.push_behavior(&self.regions[region.0].end_enter);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PseudoStateKind;

    #[test]
    fn test_compile_clears_dirty_flag() {
        let mut chart = StateChart::<&str>::new("machine");
        let region = chart.default_region(chart.root()).unwrap();
        chart
            .add_pseudostate(region, "initial", PseudoStateKind::Initial)
            .unwrap();
        assert!(chart.is_dirty());

        chart.compile();
        assert!(!chart.is_dirty());
        assert!(chart.compiled.on_initialise.has_actions());
    }

    #[test]
    fn test_authoring_after_compile_marks_dirty() {
        let mut chart = StateChart::<&str>::new("machine");
        let region = chart.default_region(chart.root()).unwrap();
        chart.compile();

        chart.add_state(region, "late").unwrap();
        assert!(chart.is_dirty());

        chart.compile();
        assert!(!chart.is_dirty());
    }

    #[test]
    fn test_internal_transition_carries_only_its_effect() {
        let mut chart = StateChart::<&str>::new("machine");
        let state = chart.add_state(chart.root(), "a").unwrap();
        let plain = chart.transition(state).build().unwrap();
        let effectful = chart
            .transition(state)
            .effect(|_, _| {})
            .build()
            .unwrap();

        chart.compile();
        assert!(chart.compiled.on_traverse[plain.0].is_empty());
        assert_eq!(chart.compiled.on_traverse[effectful.0].len(), 1);
    }

    #[test]
    fn test_external_transition_composes_exit_and_entry() {
        let mut chart = StateChart::<&str>::new("machine");
        let a = chart.add_state(chart.root(), "a").unwrap();
        let b = chart.add_state(chart.root(), "b").unwrap();
        let t = chart.transition(a).to(b).build().unwrap();

        chart.compile();
        // At minimum: a's exit log, b's entry log and b's set-current hook.
        assert!(chart.compiled.on_traverse[t.0].len() >= 3);
    }
}
