//! Message dispatch and transition traversal.

use crate::model::{GuardKind, PseudoStateKind, RegionId, StateChart, TransitionId, VertexId};
use crate::runtime::{EvaluationError, Instance};

/// What an evaluation step is reacting to.
///
/// Completion events carry the identity of the completed state explicitly,
/// so they can never be confused with a user message.
pub(crate) enum Trigger<'a, M> {
    /// A user message under dispatch.
    Message(&'a M),
    /// The implicit completion event of a state.
    Completion(VertexId),
    /// Entry with no message, during initialisation.
    Entry,
}

impl<'a, M> Trigger<'a, M> {
    fn message(&self) -> Option<&'a M> {
        match *self {
            Trigger::Message(message) => Some(message),
            _ => None,
        }
    }

    fn is_completion_of(&self, state: VertexId) -> bool {
        matches!(self, Trigger::Completion(completed) if *completed == state)
    }
}

impl<'a, M> Copy for Trigger<'a, M> {}

impl<'a, M> Clone for Trigger<'a, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> StateChart<M> {
    /// Enter the root state machine, cascading through initial pseudo
    /// states until the instance reaches a stable configuration.
    ///
    /// Recompiles first if the model is dirty.
    pub fn initialise(&mut self, instance: &mut dyn Instance) -> Result<(), EvaluationError> {
        if self.is_dirty() {
            self.compile();
        }
        log::debug!("initialise instance of '{}'", self.name());
        let on_initialise = self.compiled.on_initialise.clone();
        on_initialise.invoke(self, None, instance, false)
    }

    /// Dispatch a message into the instance.
    ///
    /// Returns true if any transition fired. Returns false without touching
    /// the instance when it is terminated. Recompiles first if the model is
    /// dirty.
    pub fn evaluate(
        &mut self,
        instance: &mut dyn Instance,
        message: &M,
    ) -> Result<bool, EvaluationError> {
        if self.is_dirty() {
            self.compile();
        }
        if instance.is_terminated() {
            return Ok(false);
        }
        let root = self.root();
        self.evaluate_state(root, instance, Trigger::Message(message))
    }

    /// True if the vertex is part of the instance's active configuration.
    pub fn is_active(&self, vertex: VertexId, instance: &dyn Instance) -> bool {
        match self.parent_region(vertex) {
            Some(region) => {
                self.is_active(self.parent_state(region), instance)
                    && instance.current(region) == Some(vertex)
            }
            None => true,
        }
    }

    /// True if the region's active vertex is a final state.
    pub fn is_region_complete(&self, region: RegionId, instance: &dyn Instance) -> bool {
        instance
            .current(region)
            .map_or(false, |current| self.is_final_state(current))
    }

    /// True if every region of the state is complete. A simple state is
    /// trivially complete.
    pub fn is_complete(&self, state: VertexId, instance: &dyn Instance) -> bool {
        self.regions_of(state)
            .iter()
            .all(|&region| self.is_region_complete(region, instance))
    }

    pub(crate) fn dispatch_completion(
        &self,
        state: VertexId,
        instance: &mut dyn Instance,
    ) -> Result<bool, EvaluationError> {
        log::debug!("completion of '{}'", self.qualified_name(state));
        self.evaluate_state(state, instance, Trigger::Completion(state))
    }

    fn evaluate_state(
        &self,
        state: VertexId,
        instance: &mut dyn Instance,
        trigger: Trigger<'_, M>,
    ) -> Result<bool, EvaluationError> {
        let mut consumed = false;
        if !trigger.is_completion_of(state) {
            for &region in self.regions_of(state) {
                if let Some(current) = instance.current(region) {
                    if self.evaluate_state(current, instance, trigger)? {
                        consumed = true;
                        // The transition may have exited this state; if so,
                        // stop descending into its other regions.
                        if !self.is_active(state, &*instance) {
                            break;
                        }
                    }
                }
            }
        }
        if consumed {
            if !trigger.is_completion_of(state) && self.is_complete(state, &*instance) {
                self.dispatch_completion(state, instance)?;
            }
        } else {
            let mut passing = Vec::new();
            for &transition in self.outgoing(state) {
                if self.guard_passes(transition, trigger, &*instance) {
                    passing.push(transition);
                }
            }
            match passing.len() {
                0 => {}
                1 => {
                    self.traverse(passing[0], instance, trigger)?;
                    consumed = true;
                }
                _ => {
                    // Ambiguous dispatch: no transition fires, evaluation
                    // elsewhere continues untouched.
                    log::error!(
                        "multiple outbound transitions evaluated true at '{}'",
                        self.qualified_name(state)
                    );
                }
            }
        }
        Ok(consumed)
    }

    fn guard_passes(
        &self,
        transition: TransitionId,
        trigger: Trigger<'_, M>,
        instance: &dyn Instance,
    ) -> bool {
        let node = &self.transitions[transition.0];
        match (&node.guard, trigger) {
            (GuardKind::Else, _) => false,
            (GuardKind::Always, _) => true,
            (GuardKind::Completion, trigger) => trigger.is_completion_of(node.source),
            (GuardKind::When(guard), Trigger::Message(message)) => guard(message, instance),
            (GuardKind::When(_), _) => false,
        }
    }

    pub(crate) fn traverse(
        &self,
        transition: TransitionId,
        instance: &mut dyn Instance,
        trigger: Trigger<'_, M>,
    ) -> Result<bool, EvaluationError> {
        let mut on_traverse = self.compiled.on_traverse[transition.0].clone();
        let mut current = transition;

        // Junctions are static branches: resolve the whole chain into one
        // sequence before any behavior runs.
        while let Some(target) = self.transition_target(current) {
            if self.pseudo_kind(target) != Some(PseudoStateKind::Junction) {
                break;
            }
            current = self.select(target, instance, trigger)?;
            on_traverse.push_behavior(&self.compiled.on_traverse[current.0]);
        }

        on_traverse.invoke(self, trigger.message(), instance, false)?;

        if let Some(target) = self.transition_target(current) {
            if self.pseudo_kind(target) == Some(PseudoStateKind::Choice) {
                let next = self.select(target, instance, trigger)?;
                self.traverse(next, instance, trigger)?;
            } else if self.is_state(target) && self.is_complete(target, &*instance) {
                self.dispatch_completion(target, instance)?;
            }
        }
        Ok(true)
    }

    /// Traverse a transition on behalf of a compiled entry hook, where only
    /// the optional message is available.
    pub(crate) fn traverse_from(
        &self,
        transition: TransitionId,
        instance: &mut dyn Instance,
        message: Option<&M>,
    ) -> Result<(), EvaluationError> {
        let trigger = match message {
            Some(message) => Trigger::Message(message),
            None => Trigger::Entry,
        };
        self.traverse(transition, instance, trigger)?;
        Ok(())
    }

    /// Runtime body of a local transition: exit only as deep as the target
    /// entry requires, then cascade in.
    pub(crate) fn traverse_local(
        &self,
        transition: TransitionId,
        instance: &mut dyn Instance,
        message: Option<&M>,
    ) -> Result<(), EvaluationError> {
        let node = &self.transitions[transition.0];
        let target = node.target.ok_or_else(|| {
            EvaluationError::Internal(format!("local {} has no target", transition))
        })?;

        let ancestry = self.ancestry(target);
        let mut first_to_enter = 0;
        while first_to_enter < ancestry.len()
            && self.is_active(ancestry[first_to_enter], &*instance)
        {
            first_to_enter += 1;
        }
        // A fully active target re-enters itself.
        let first_to_enter = first_to_enter.min(ancestry.len() - 1);

        if let Some(region) = self.parent_region(ancestry[first_to_enter]) {
            if let Some(current) = instance.current(region) {
                self.compiled.vertices[current.0]
                    .leave
                    .invoke(self, message, instance, false)?;
            }
        }

        node.effect.invoke(self, message, instance, false)?;

        let path = &ancestry[first_to_enter..];
        for (index, &element) in path.iter().enumerate() {
            self.compiled.vertices[element.0]
                .begin_enter
                .invoke(self, message, instance, false)?;
            if let Some(&next) = path.get(index + 1) {
                let next_region = self.parent_region(next);
                for &region in self.regions_of(element) {
                    self.compiled.regions[region.0]
                        .begin_enter
                        .invoke(self, message, instance, false)?;
                    if Some(region) != next_region {
                        self.compiled.regions[region.0]
                            .end_enter
                            .invoke(self, message, instance, false)?;
                    }
                }
            }
        }
        self.compiled.vertices[target.0]
            .end_enter
            .invoke(self, message, instance, false)
    }

    fn find_else(&self, pseudo: VertexId) -> Option<TransitionId> {
        self.outgoing(pseudo)
            .iter()
            .copied()
            .find(|&transition| self.transitions[transition.0].guard.is_else())
    }

    /// Pick the outgoing branch of a choice or junction pseudo state.
    fn select(
        &self,
        pseudo: VertexId,
        instance: &mut dyn Instance,
        trigger: Trigger<'_, M>,
    ) -> Result<TransitionId, EvaluationError> {
        let mut passing = Vec::new();
        for &transition in self.outgoing(pseudo) {
            if self.guard_passes(transition, trigger, &*instance) {
                passing.push(transition);
            }
        }
        match self.pseudo_kind(pseudo) {
            Some(PseudoStateKind::Choice) => match passing.len() {
                0 => self.select_else(pseudo),
                1 => Ok(passing[0]),
                count => {
                    let index = (self.config().random)(count);
                    passing.get(index).copied().ok_or_else(|| {
                        EvaluationError::Internal(format!(
                            "injected RNG returned {} for bound {}",
                            index, count
                        ))
                    })
                }
            },
            _ => match passing.len() {
                0 => self.select_else(pseudo),
                1 => Ok(passing[0]),
                _ => {
                    log::error!(
                        "multiple outbound guards evaluated true at junction '{}'",
                        self.qualified_name(pseudo)
                    );
                    Err(EvaluationError::AmbiguousJunction(
                        self.qualified_name(pseudo).to_string(),
                    ))
                }
            },
        }
    }

    fn select_else(&self, pseudo: VertexId) -> Result<TransitionId, EvaluationError> {
        self.find_else(pseudo).ok_or_else(|| {
            log::error!(
                "no outbound guard evaluated true at '{}' and no else transition is present",
                self.qualified_name(pseudo)
            );
            EvaluationError::NoEligibleBranch(self.qualified_name(pseudo).to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{PseudoStateKind, StateChart};
    use crate::runtime::{EvaluationError, HashMapInstance, Instance};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_initialise_enters_initial_state() {
        let mut chart = StateChart::<&str>::new("machine");
        let region = chart.default_region(chart.root()).unwrap();
        let initial = chart
            .add_pseudostate(region, "initial", PseudoStateKind::Initial)
            .unwrap();
        let idle = chart.add_state(region, "idle").unwrap();
        chart.transition(initial).to(idle).build().unwrap();

        let mut instance = HashMapInstance::new();
        chart.initialise(&mut instance).unwrap();
        assert!(chart.is_active(idle, &instance));
        assert_eq!(instance.current(region), Some(idle));
    }

    #[test]
    fn test_unmatched_message_returns_false() {
        let mut chart = StateChart::<&str>::new("machine");
        let region = chart.default_region(chart.root()).unwrap();
        let initial = chart
            .add_pseudostate(region, "initial", PseudoStateKind::Initial)
            .unwrap();
        let idle = chart.add_state(region, "idle").unwrap();
        chart.transition(initial).to(idle).build().unwrap();

        let mut instance = HashMapInstance::new();
        chart.initialise(&mut instance).unwrap();
        assert!(!chart.evaluate(&mut instance, &"nothing").unwrap());
        assert!(chart.is_active(idle, &instance));
    }

    #[test]
    fn test_ambiguous_state_dispatch_fires_nothing() {
        let mut chart = StateChart::<&str>::new("machine");
        let region = chart.default_region(chart.root()).unwrap();
        let initial = chart
            .add_pseudostate(region, "initial", PseudoStateKind::Initial)
            .unwrap();
        let a = chart.add_state(region, "a").unwrap();
        let b = chart.add_state(region, "b").unwrap();
        let c = chart.add_state(region, "c").unwrap();
        chart.transition(initial).to(a).build().unwrap();
        chart
            .transition(a)
            .to(b)
            .when(|m, _| *m == "go")
            .build()
            .unwrap();
        chart
            .transition(a)
            .to(c)
            .when(|m, _| *m == "go")
            .build()
            .unwrap();

        let mut instance = HashMapInstance::new();
        chart.initialise(&mut instance).unwrap();

        assert!(!chart.evaluate(&mut instance, &"go").unwrap());
        assert!(chart.is_active(a, &instance));
    }

    #[test]
    fn test_internal_transition_keeps_state() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut chart = StateChart::<&str>::new("machine");
        let region = chart.default_region(chart.root()).unwrap();
        let initial = chart
            .add_pseudostate(region, "initial", PseudoStateKind::Initial)
            .unwrap();
        let state = chart.add_state(region, "a").unwrap();
        chart.transition(initial).to(state).build().unwrap();

        let hits = counter.clone();
        chart
            .transition(state)
            .internal()
            .when(|m, _| *m == "poke")
            .effect(move |_, _| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        let entries = Arc::new(AtomicUsize::new(0));
        let entry_count = entries.clone();
        chart
            .on_entry(state, move |_, _| {
                entry_count.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let mut instance = HashMapInstance::new();
        chart.initialise(&mut instance).unwrap();
        assert_eq!(entries.load(Ordering::SeqCst), 1);

        assert!(chart.evaluate(&mut instance, &"poke").unwrap());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        // No exit, no re-entry.
        assert_eq!(entries.load(Ordering::SeqCst), 1);
        assert!(chart.is_active(state, &instance));
    }

    #[test]
    fn test_choice_uses_injected_rng() {
        let mut chart = StateChart::<&str>::new("machine")
            .with_config(crate::model::EngineConfig::new().with_random(|_| 1));
        let region = chart.default_region(chart.root()).unwrap();
        let initial = chart
            .add_pseudostate(region, "initial", PseudoStateKind::Initial)
            .unwrap();
        let start = chart.add_state(region, "start").unwrap();
        let choice = chart
            .add_pseudostate(region, "pick", PseudoStateKind::Choice)
            .unwrap();
        let left = chart.add_state(region, "left").unwrap();
        let right = chart.add_state(region, "right").unwrap();

        chart.transition(initial).to(start).build().unwrap();
        chart
            .transition(start)
            .to(choice)
            .when(|m, _| *m == "go")
            .build()
            .unwrap();
        chart.transition(choice).to(left).build().unwrap();
        chart.transition(choice).to(right).build().unwrap();

        let mut instance = HashMapInstance::new();
        chart.initialise(&mut instance).unwrap();
        chart.evaluate(&mut instance, &"go").unwrap();
        // Both guards pass; the injected RNG picks index 1.
        assert!(chart.is_active(right, &instance));
    }

    #[test]
    fn test_choice_falls_back_to_else() {
        let mut chart = StateChart::<&str>::new("machine");
        let region = chart.default_region(chart.root()).unwrap();
        let initial = chart
            .add_pseudostate(region, "initial", PseudoStateKind::Initial)
            .unwrap();
        let start = chart.add_state(region, "start").unwrap();
        let choice = chart
            .add_pseudostate(region, "pick", PseudoStateKind::Choice)
            .unwrap();
        let narrow = chart.add_state(region, "narrow").unwrap();
        let fallback = chart.add_state(region, "fallback").unwrap();

        chart.transition(initial).to(start).build().unwrap();
        chart
            .transition(start)
            .to(choice)
            .when(|m, _| *m == "go")
            .build()
            .unwrap();
        chart
            .transition(choice)
            .to(narrow)
            .when(|m, _| *m == "never")
            .build()
            .unwrap();
        chart.transition(choice).to(fallback).otherwise().build().unwrap();

        let mut instance = HashMapInstance::new();
        chart.initialise(&mut instance).unwrap();
        chart.evaluate(&mut instance, &"go").unwrap();
        assert!(chart.is_active(fallback, &instance));
    }

    #[test]
    fn test_choice_without_match_or_else_is_ill_formed() {
        let mut chart = StateChart::<&str>::new("machine");
        let region = chart.default_region(chart.root()).unwrap();
        let initial = chart
            .add_pseudostate(region, "initial", PseudoStateKind::Initial)
            .unwrap();
        let start = chart.add_state(region, "start").unwrap();
        let choice = chart
            .add_pseudostate(region, "pick", PseudoStateKind::Choice)
            .unwrap();
        let never = chart.add_state(region, "never").unwrap();

        chart.transition(initial).to(start).build().unwrap();
        chart
            .transition(start)
            .to(choice)
            .when(|m, _| *m == "go")
            .build()
            .unwrap();
        chart
            .transition(choice)
            .to(never)
            .when(|m, _| *m == "nope")
            .build()
            .unwrap();

        let mut instance = HashMapInstance::new();
        chart.initialise(&mut instance).unwrap();
        let result = chart.evaluate(&mut instance, &"go");
        assert!(matches!(result, Err(EvaluationError::NoEligibleBranch(_))));
    }
}
