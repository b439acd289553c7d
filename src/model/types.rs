//! Core types for the state chart model.
//!
//! Ids are stable indices into the chart's arenas; kinds are closed enums.
//! Guards and the engine configuration live here as well, so the model,
//! compiler and runtime all share one vocabulary.

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::runtime::Instance;

/// Identifier of a region within a chart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub(crate) usize);

/// Identifier of a vertex (state, final state or pseudo state) within a chart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexId(pub(crate) usize);

/// Identifier of a transition within a chart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransitionId(pub(crate) usize);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vertex#{}", self.0)
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transition#{}", self.0)
    }
}

/// The kinds of pseudo state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PseudoStateKind {
    /// Default entry point of a region.
    Initial,
    /// Entry point that restores the previously active child of its region.
    ShallowHistory,
    /// Entry point that restores the previously active child and cascades
    /// history to all descendant regions.
    DeepHistory,
    /// Dynamic multi-way branch; outgoing guards are evaluated when the
    /// branch is reached during traversal.
    Choice,
    /// Static multi-way branch; outgoing guards are evaluated before any
    /// traversal behavior runs.
    Junction,
    /// Entry halts all further evaluation on the instance.
    Terminate,
}

impl PseudoStateKind {
    /// True for the kinds that may serve as a region's entry point.
    pub fn is_initial(self) -> bool {
        matches!(
            self,
            PseudoStateKind::Initial
                | PseudoStateKind::ShallowHistory
                | PseudoStateKind::DeepHistory
        )
    }

    /// True for the history kinds.
    pub fn is_history(self) -> bool {
        matches!(
            self,
            PseudoStateKind::ShallowHistory | PseudoStateKind::DeepHistory
        )
    }
}

impl fmt::Display for PseudoStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PseudoStateKind::Initial => "initial",
            PseudoStateKind::ShallowHistory => "shallow history",
            PseudoStateKind::DeepHistory => "deep history",
            PseudoStateKind::Choice => "choice",
            PseudoStateKind::Junction => "junction",
            PseudoStateKind::Terminate => "terminate",
        };
        write!(f, "{}", name)
    }
}

/// The kinds of transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionKind {
    /// May cross any region boundary; exits up to the least common ancestor
    /// and enters down to the target.
    External,
    /// Runs its effect without exiting or entering any vertex.
    Internal,
    /// Stays within the source composite; exits only what the target entry
    /// requires.
    Local,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransitionKind::External => "external",
            TransitionKind::Internal => "internal",
            TransitionKind::Local => "local",
        };
        write!(f, "{}", name)
    }
}

/// Type alias for guard predicates.
///
/// Guards receive the message under evaluation and a read-only view of the
/// instance, and must be free of side effects.
pub type GuardFn<M> = Arc<dyn Fn(&M, &dyn Instance) -> bool + Send + Sync>;

/// A transition's guard.
///
/// Unguarded transitions default by source: pseudo states get the
/// constant-true guard (`Always`), states get `Completion`, which fires
/// only on the implicit completion event of the source. `Else` is the
/// constant-false sentinel that makes a transition the fallback branch of a
/// choice or junction.
pub enum GuardKind<M> {
    /// Constant true; satisfied by any trigger.
    Always,
    /// Constant false sentinel; selected only as a branch fallback.
    Else,
    /// Satisfied exactly by the completion event of the source state.
    Completion,
    /// User predicate over (message, instance).
    When(GuardFn<M>),
}

impl<M> GuardKind<M> {
    /// True if this is the else sentinel.
    pub fn is_else(&self) -> bool {
        matches!(self, GuardKind::Else)
    }
}

// Manual Clone: Arc'd predicates clone without requiring M: Clone.
impl<M> Clone for GuardKind<M> {
    fn clone(&self) -> Self {
        match self {
            GuardKind::Always => GuardKind::Always,
            GuardKind::Else => GuardKind::Else,
            GuardKind::Completion => GuardKind::Completion,
            GuardKind::When(guard) => GuardKind::When(guard.clone()),
        }
    }
}

impl<M> fmt::Debug for GuardKind<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardKind::Always => write!(f, "Always"),
            GuardKind::Else => write!(f, "Else"),
            GuardKind::Completion => write!(f, "Completion"),
            GuardKind::When(_) => write!(f, "When(..)"),
        }
    }
}

/// Engine configuration consulted at compilation time.
///
/// Promotes the global knobs of classic statechart engines to explicit,
/// injected configuration: the random number generator used to break ties
/// between passing choice branches, and whether internal transitions test
/// their source state for completion after running their effect.
pub struct EngineConfig {
    pub(crate) random: Arc<dyn Fn(usize) -> usize + Send + Sync>,
    pub(crate) internal_transitions_trigger_completion: bool,
}

impl EngineConfig {
    /// Create a configuration with the default RNG and completion behavior.
    pub fn new() -> Self {
        Self {
            random: Arc::new(|max| rand::thread_rng().gen_range(0..max)),
            internal_transitions_trigger_completion: false,
        }
    }

    /// Inject a random number generator.
    ///
    /// The function must return a value in `[0, max)`; `max` is always at
    /// least one when the engine calls it.
    pub fn with_random<F>(mut self, random: F) -> Self
    where
        F: Fn(usize) -> usize + Send + Sync + 'static,
    {
        self.random = Arc::new(random);
        self
    }

    /// Make internal transitions test their source state for completion
    /// after their effect runs.
    pub fn with_internal_completion(mut self, enabled: bool) -> Self {
        self.internal_transitions_trigger_completion = enabled;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EngineConfig {
    fn clone(&self) -> Self {
        Self {
            random: self.random.clone(),
            internal_transitions_trigger_completion: self.internal_transitions_trigger_completion,
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field(
                "internal_transitions_trigger_completion",
                &self.internal_transitions_trigger_completion,
            )
            .finish()
    }
}

/// Error type for model authoring.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("'{0}' is not a state")]
    NotAState(String),

    #[error("final state '{0}' may not contain regions")]
    FinalStateRegion(String),

    #[error("'{0}' has been removed from the model")]
    Removed(String),

    #[error("the root state machine '{0}' cannot be removed")]
    RemoveRoot(String),

    #[error("chart '{0}' has no states")]
    EmptyChart(String),
}
