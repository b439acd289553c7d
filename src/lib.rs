#![forbid(unsafe_code)]

//! Hierarchical, event-driven UML state machine engine.
//!
//! This crate implements the UML state machine semantics: composite and
//! orthogonal states, entry/exit behavior, completion transitions,
//! pseudo states (initial, shallow/deep history, choice, junction,
//! terminate) and three transition flavors (internal, local, external).
//!
//! # Key Concepts
//!
//! ## Model and instance
//!
//! The model is a [`StateChart`]: an arena-allocated tree of regions,
//! vertices and transitions, built once and then *compiled* into ordered
//! behavior sequences. Runtime state lives entirely outside the model in an
//! [`Instance`](runtime::Instance) — a mapping from region to its last known
//! active state plus a termination flag. Any number of instances can run
//! against one compiled model.
//!
//! ## States, regions and pseudo states
//!
//! A state owns zero or more regions (zero makes it simple, one composite,
//! two or more orthogonal). A region owns vertices: states, final states and
//! pseudo states. Initial pseudo states pick the vertex a region enters by
//! default; history kinds replay the previously active child instead.
//!
//! ## Transitions
//!
//! Transitions carry a guard, a user effect and a compiled traversal
//! sequence. External transitions exit up to the least common ancestor and
//! re-enter down to the target; local transitions stay inside the source
//! composite; internal transitions run their effect without exiting anything.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use statechart::prelude::*;
//!
//! let mut chart = StateChart::<&str>::new("player");
//! let region = chart.default_region(chart.root())?;
//! let initial = chart.add_pseudostate(region, "initial", PseudoStateKind::Initial)?;
//! let idle = chart.add_state(region, "idle")?;
//! let playing = chart.add_state(region, "playing")?;
//!
//! chart.transition(initial).to(idle).build()?;
//! chart.transition(idle).to(playing).when(|m, _| *m == "play").build()?;
//! chart.transition(playing).to(idle).when(|m, _| *m == "stop").build()?;
//!
//! let mut instance = HashMapInstance::new();
//! chart.initialise(&mut instance)?;
//! chart.evaluate(&mut instance, &"play")?;
//! assert!(chart.is_active(playing, &instance));
//! ```
//!
//! # Observability
//!
//! The engine logs through the [`log`] facade: `debug` for element
//! entry/exit and traversals, `warn` for validation findings and recoverable
//! oddities, `error` for dispatch ambiguity and ill-formed compound
//! transitions. Install any `log` backend to see them.

pub mod behavior;
pub mod model;
pub mod runtime;
pub mod validation;

pub(crate) mod compiler;

pub use behavior::Behavior;
pub use model::{
    EngineConfig, ModelError, Owner, PseudoStateKind, RegionId, StateChart, TransitionId,
    TransitionKind, VertexId,
};
pub use runtime::{EvaluationError, HashMapInstance, Instance, SharedStateChart};
pub use validation::{validate, Severity, ValidationIssue};

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use statechart::prelude::*;
/// ```
pub mod prelude {
    pub use crate::model::{
        EngineConfig, ModelError, Owner, PseudoStateKind, RegionId, StateChart, TransitionId,
        TransitionKind, VertexId,
    };
    pub use crate::runtime::{EvaluationError, HashMapInstance, Instance, SharedStateChart};
    pub use crate::validation::{validate, Severity, ValidationIssue};
}
