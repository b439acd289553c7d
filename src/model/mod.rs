//! The state chart model: regions, vertices, transitions and their
//! authoring API.
//!
//! # Key Concepts
//!
//! ## Arena graph
//!
//! The model is a tree with cross links, stored as flat arenas indexed by
//! [`RegionId`], [`VertexId`] and [`TransitionId`]. Ids stay stable for the
//! life of the chart; removal tombstones the slot and detaches it from its
//! parent.
//!
//! ## Authoring
//!
//! ```rust,ignore
//! let mut chart = StateChart::<&str>::new("machine");
//! let region = chart.default_region(chart.root())?;
//! let initial = chart.add_pseudostate(region, "initial", PseudoStateKind::Initial)?;
//! let on = chart.add_state(region, "on")?;
//! let off = chart.add_state(region, "off")?;
//! chart.transition(initial).to(off).build()?;
//! chart.transition(off).to(on).when(|m, _| *m == "toggle").build()?;
//! ```
//!
//! Any structural mutation marks the chart dirty; the evaluator recompiles
//! it before the next dispatch.

mod builder;
mod chart;
mod types;

pub use builder::{sequential_chart, toggle_chart, TransitionBuilder};
pub use chart::{Owner, StateChart, DEFAULT_REGION};
pub use types::{
    EngineConfig, GuardFn, GuardKind, ModelError, PseudoStateKind, RegionId, TransitionId,
    TransitionKind, VertexId,
};

pub(crate) use chart::VertexData;
