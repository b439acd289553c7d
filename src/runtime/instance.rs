//! Instance state: the mutable half of a running state machine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{RegionId, VertexId};

/// Runtime state of one state machine instance.
///
/// The engine depends only on this interface, so alternate implementations
/// (for example persistence-backed ones) can be substituted freely. The
/// stored vertex per region doubles as the history record: history pseudo
/// states replay it on re-entry.
pub trait Instance {
    /// True once a terminate pseudo state has been entered; every later
    /// evaluation returns false without inspecting the model.
    fn is_terminated(&self) -> bool;

    /// Mark the instance terminated.
    fn set_terminated(&mut self);

    /// Record the active state of a region.
    fn set_current(&mut self, region: RegionId, state: VertexId);

    /// The last known active state of a region, if it was ever entered.
    fn current(&self, region: RegionId) -> Option<VertexId>;
}

/// Default in-memory instance.
///
/// Serializable, so snapshots can be persisted and restored against the
/// same (unchanged) chart.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HashMapInstance {
    current: HashMap<RegionId, VertexId>,
    terminated: bool,
}

impl HashMapInstance {
    /// Create a fresh instance with no recorded state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all recorded state, including the termination flag.
    pub fn reset(&mut self) {
        self.current.clear();
        self.terminated = false;
    }
}

impl Instance for HashMapInstance {
    fn is_terminated(&self) -> bool {
        self.terminated
    }

    fn set_terminated(&mut self) {
        self.terminated = true;
    }

    fn set_current(&mut self, region: RegionId, state: VertexId) {
        self.current.insert(region, state);
    }

    fn current(&self, region: RegionId) -> Option<VertexId> {
        self.current.get(&region).copied()
    }
}
