//! Runtime evaluation of compiled charts against instances.
//!
//! # Key Concepts
//!
//! ## Instances
//!
//! All mutable runtime state lives in an [`Instance`]: the last known active
//! state of every region plus a termination flag. The model itself is
//! read-only during evaluation, so one compiled chart can drive any number
//! of instances.
//!
//! ## Dispatch
//!
//! [`StateChart::evaluate`](crate::StateChart::evaluate) descends the active
//! state configuration through orthogonal regions in declaration order,
//! selects at most one firing transition per state by guard evaluation, and
//! drives the pre-compiled traversal sequence. Completion events cascade
//! depth first after a traversal leaves a state complete.
//!
//! ## Error handling
//!
//! Ambiguity at a state (several guards true) is logged and treated as "no
//! transition fired". Ill-formed compound transitions — a junction with
//! several true guards, or a choice/junction with no true guard and no else
//! branch — abort the evaluation with an [`EvaluationError`]. Junction
//! branches are resolved before any behavior runs, so that abort leaves the
//! instance untouched.

mod evaluator;
mod instance;
mod shared;

pub use instance::{HashMapInstance, Instance};
pub use shared::SharedStateChart;

/// Error type for runtime evaluation.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("multiple outbound guards evaluated true at junction '{0}'")]
    AmbiguousJunction(String),

    #[error("no outbound guard evaluated true at '{0}' and no else transition is present")]
    NoEligibleBranch(String),

    #[error("initial pseudo state '{0}' has no outgoing transition")]
    MissingInitialTransition(String),

    #[error("internal error: {0}")]
    Internal(String),
}
