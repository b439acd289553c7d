//! The state chart model graph.
//!
//! A [`StateChart`] is an arena: regions, vertices and transitions live in
//! flat vectors and refer to each other through stable indices. The tree is
//! exclusively owned from the root down; back references (vertex to region,
//! region to state) are plain ids, so there are no reference-counted cycles.
//!
//! Authoring mutates the arena and marks the chart dirty; the evaluator
//! recompiles a dirty chart before the next dispatch.

use std::fmt;

use crate::behavior::Behavior;
use crate::compiler::CompiledModel;
use crate::model::types::{
    EngineConfig, GuardKind, ModelError, PseudoStateKind, RegionId, TransitionId, TransitionKind,
    VertexId,
};
use crate::runtime::Instance;

/// Name of the region created implicitly when vertices are added directly
/// to a state.
pub const DEFAULT_REGION: &str = "default";

/// Owner of a new vertex: an explicit region, or a state whose implicit
/// "default" region is resolved (and created if needed).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Owner {
    /// An explicit region.
    Region(RegionId),
    /// A state; the vertex lands in its "default" region.
    State(VertexId),
}

impl From<RegionId> for Owner {
    fn from(region: RegionId) -> Self {
        Owner::Region(region)
    }
}

impl From<VertexId> for Owner {
    fn from(state: VertexId) -> Self {
        Owner::State(state)
    }
}

pub(crate) struct RegionNode {
    pub name: String,
    pub qualified_name: String,
    pub parent: VertexId,
    pub vertices: Vec<VertexId>,
    pub removed: bool,
}

pub(crate) struct StateData<M> {
    pub regions: Vec<RegionId>,
    pub entry: Behavior<M>,
    pub exit: Behavior<M>,
    pub is_final: bool,
}

pub(crate) enum VertexData<M> {
    State(StateData<M>),
    Pseudo(PseudoStateKind),
}

pub(crate) struct VertexNode<M> {
    pub name: String,
    pub qualified_name: String,
    pub parent: Option<RegionId>,
    pub data: VertexData<M>,
    pub outgoing: Vec<TransitionId>,
    pub removed: bool,
}

pub(crate) struct TransitionNode<M> {
    pub source: VertexId,
    pub target: Option<VertexId>,
    pub kind: TransitionKind,
    pub guard: GuardKind<M>,
    pub effect: Behavior<M>,
    pub removed: bool,
}

/// A hierarchical state machine model.
///
/// The chart is built through the authoring methods, compiled once, and then
/// shared read-only by any number of instances. The root is itself a state
/// (the state machine) whose regions hold the top-level vertices.
pub struct StateChart<M> {
    name: String,
    separator: String,
    pub(crate) regions: Vec<RegionNode>,
    pub(crate) vertices: Vec<VertexNode<M>>,
    pub(crate) transitions: Vec<TransitionNode<M>>,
    root: VertexId,
    pub(crate) dirty: bool,
    pub(crate) compiled: CompiledModel<M>,
    pub(crate) config: EngineConfig,
}

impl<M> StateChart<M> {
    /// Create a new chart whose root state machine carries the given name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let root_node = VertexNode {
            name: name.clone(),
            qualified_name: name.clone(),
            parent: None,
            data: VertexData::State(StateData {
                regions: Vec::new(),
                entry: Behavior::new(),
                exit: Behavior::new(),
                is_final: false,
            }),
            outgoing: Vec::new(),
            removed: false,
        };
        Self {
            name,
            separator: ".".to_string(),
            regions: Vec::new(),
            vertices: vec![root_node],
            transitions: Vec::new(),
            root: VertexId(0),
            dirty: true,
            compiled: CompiledModel::empty(),
            config: EngineConfig::new(),
        }
    }

    /// Override the qualified-name separator.
    ///
    /// Call before any element is added; names are computed eagerly.
    pub fn with_name_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Replace the engine configuration. Marks the chart dirty, since the
    /// configuration is baked into compiled behavior.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self.dirty = true;
        self
    }

    /// The chart's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The root state machine vertex.
    pub fn root(&self) -> VertexId {
        self.root
    }

    /// The active engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// True if the model changed since it was last compiled.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // ---- queries ---------------------------------------------------------

    /// The simple name of a vertex.
    pub fn vertex_name(&self, vertex: VertexId) -> &str {
        &self.vertices[vertex.0].name
    }

    /// The dotted root-to-self name of a vertex.
    pub fn qualified_name(&self, vertex: VertexId) -> &str {
        &self.vertices[vertex.0].qualified_name
    }

    /// The simple name of a region.
    pub fn region_name(&self, region: RegionId) -> &str {
        &self.regions[region.0].name
    }

    /// The dotted root-to-self name of a region.
    pub fn region_qualified_name(&self, region: RegionId) -> &str {
        &self.regions[region.0].qualified_name
    }

    /// The pseudo state kind of a vertex, if it is a pseudo state.
    pub fn pseudo_kind(&self, vertex: VertexId) -> Option<PseudoStateKind> {
        match &self.vertices[vertex.0].data {
            VertexData::Pseudo(kind) => Some(*kind),
            VertexData::State(_) => None,
        }
    }

    /// True if the vertex is a state (including final states and the root).
    pub fn is_state(&self, vertex: VertexId) -> bool {
        matches!(self.vertices[vertex.0].data, VertexData::State(_))
    }

    /// True if the vertex is a final state.
    pub fn is_final_state(&self, vertex: VertexId) -> bool {
        match &self.vertices[vertex.0].data {
            VertexData::State(state) => state.is_final,
            VertexData::Pseudo(_) => false,
        }
    }

    /// True if the state owns at least one region.
    pub fn is_composite(&self, vertex: VertexId) -> bool {
        !self.regions_of(vertex).is_empty()
    }

    /// True if the state owns two or more regions.
    pub fn is_orthogonal(&self, vertex: VertexId) -> bool {
        self.regions_of(vertex).len() > 1
    }

    /// The regions owned by a state, in declaration order. Empty for pseudo
    /// states.
    pub fn regions_of(&self, vertex: VertexId) -> &[RegionId] {
        match &self.vertices[vertex.0].data {
            VertexData::State(state) => &state.regions,
            VertexData::Pseudo(_) => &[],
        }
    }

    /// The vertices owned by a region, in declaration order.
    pub fn vertices_of(&self, region: RegionId) -> &[VertexId] {
        &self.regions[region.0].vertices
    }

    /// The region containing a vertex. `None` only for the root.
    pub fn parent_region(&self, vertex: VertexId) -> Option<RegionId> {
        self.vertices[vertex.0].parent
    }

    /// The state owning a region.
    pub fn parent_state(&self, region: RegionId) -> VertexId {
        self.regions[region.0].parent
    }

    /// The outgoing transitions of a vertex, in declaration order.
    pub fn outgoing(&self, vertex: VertexId) -> &[TransitionId] {
        &self.vertices[vertex.0].outgoing
    }

    /// A transition's source vertex.
    pub fn transition_source(&self, transition: TransitionId) -> VertexId {
        self.transitions[transition.0].source
    }

    /// A transition's target vertex, if any.
    pub fn transition_target(&self, transition: TransitionId) -> Option<VertexId> {
        self.transitions[transition.0].target
    }

    /// A transition's kind.
    pub fn transition_kind(&self, transition: TransitionId) -> TransitionKind {
        self.transitions[transition.0].kind
    }

    /// Look up a vertex by qualified name.
    pub fn find_vertex(&self, qualified_name: &str) -> Option<VertexId> {
        self.vertices
            .iter()
            .position(|vertex| !vertex.removed && vertex.qualified_name == qualified_name)
            .map(VertexId)
    }

    /// Look up a region by qualified name.
    pub fn find_region(&self, qualified_name: &str) -> Option<RegionId> {
        self.regions
            .iter()
            .position(|region| !region.removed && region.qualified_name == qualified_name)
            .map(RegionId)
    }

    // ---- ancestry --------------------------------------------------------

    /// The root-to-vertex path, both ends inclusive.
    pub fn ancestry(&self, vertex: VertexId) -> Vec<VertexId> {
        let mut path = vec![vertex];
        let mut current = vertex;
        while let Some(region) = self.vertices[current.0].parent {
            current = self.regions[region.0].parent;
            path.push(current);
        }
        path.reverse();
        path
    }

    /// The greatest index at which two ancestries still agree, or `None`
    /// when they share no root.
    pub fn lca(&self, a: &[VertexId], b: &[VertexId]) -> Option<usize> {
        let mut common = None;
        for i in 0..a.len().min(b.len()) {
            if a[i] != b[i] {
                break;
            }
            common = Some(i);
        }
        common
    }

    // ---- authoring -------------------------------------------------------

    fn live_vertex(&self, vertex: VertexId) -> Result<&VertexNode<M>, ModelError> {
        let node = &self.vertices[vertex.0];
        if node.removed {
            return Err(ModelError::Removed(node.qualified_name.clone()));
        }
        Ok(node)
    }

    fn live_region(&self, region: RegionId) -> Result<&RegionNode, ModelError> {
        let node = &self.regions[region.0];
        if node.removed {
            return Err(ModelError::Removed(node.qualified_name.clone()));
        }
        Ok(node)
    }

    /// Add a named region to a state.
    pub fn add_region(&mut self, state: VertexId, name: &str) -> Result<RegionId, ModelError> {
        let (parent_qualified, is_state, is_final) = {
            let node = self.live_vertex(state)?;
            match &node.data {
                VertexData::State(data) => (node.qualified_name.clone(), true, data.is_final),
                VertexData::Pseudo(_) => (node.qualified_name.clone(), false, false),
            }
        };
        if !is_state {
            return Err(ModelError::NotAState(parent_qualified));
        }
        if is_final {
            return Err(ModelError::FinalStateRegion(parent_qualified));
        }
        let qualified = format!("{}{}{}", parent_qualified, self.separator, name);
        let region = RegionId(self.regions.len());
        self.regions.push(RegionNode {
            name: name.to_string(),
            qualified_name: qualified,
            parent: state,
            vertices: Vec::new(),
            removed: false,
        });
        if let VertexData::State(data) = &mut self.vertices[state.0].data {
            data.regions.push(region);
        }
        self.dirty = true;
        Ok(region)
    }

    /// Find or create the implicit "default" region of a state.
    pub fn default_region(&mut self, state: VertexId) -> Result<RegionId, ModelError> {
        let node = self.live_vertex(state)?;
        if let VertexData::State(data) = &node.data {
            for &region in &data.regions {
                if self.regions[region.0].name == DEFAULT_REGION {
                    return Ok(region);
                }
            }
        }
        self.add_region(state, DEFAULT_REGION)
    }

    fn resolve_owner(&mut self, owner: Owner) -> Result<RegionId, ModelError> {
        match owner {
            Owner::Region(region) => {
                self.live_region(region)?;
                Ok(region)
            }
            Owner::State(state) => self.default_region(state),
        }
    }

    fn add_vertex(
        &mut self,
        region: RegionId,
        name: &str,
        data: VertexData<M>,
    ) -> Result<VertexId, ModelError> {
        let qualified = format!(
            "{}{}{}",
            self.regions[region.0].qualified_name, self.separator, name
        );
        let vertex = VertexId(self.vertices.len());
        self.vertices.push(VertexNode {
            name: name.to_string(),
            qualified_name: qualified,
            parent: Some(region),
            data,
            outgoing: Vec::new(),
            removed: false,
        });
        self.regions[region.0].vertices.push(vertex);
        self.dirty = true;
        Ok(vertex)
    }

    /// Add a state to a region or to a state's default region.
    pub fn add_state(
        &mut self,
        owner: impl Into<Owner>,
        name: &str,
    ) -> Result<VertexId, ModelError> {
        let region = self.resolve_owner(owner.into())?;
        self.add_vertex(
            region,
            name,
            VertexData::State(StateData {
                regions: Vec::new(),
                entry: Behavior::new(),
                exit: Behavior::new(),
                is_final: false,
            }),
        )
    }

    /// Add a final state. Final states represent completion of their
    /// containing region and may carry neither regions nor outgoing
    /// transitions.
    pub fn add_final_state(
        &mut self,
        owner: impl Into<Owner>,
        name: &str,
    ) -> Result<VertexId, ModelError> {
        let region = self.resolve_owner(owner.into())?;
        self.add_vertex(
            region,
            name,
            VertexData::State(StateData {
                regions: Vec::new(),
                entry: Behavior::new(),
                exit: Behavior::new(),
                is_final: true,
            }),
        )
    }

    /// Add a pseudo state of the given kind.
    pub fn add_pseudostate(
        &mut self,
        owner: impl Into<Owner>,
        name: &str,
        kind: PseudoStateKind,
    ) -> Result<VertexId, ModelError> {
        let region = self.resolve_owner(owner.into())?;
        self.add_vertex(region, name, VertexData::Pseudo(kind))
    }

    /// Append an entry action to a state.
    pub fn on_entry<F>(&mut self, state: VertexId, action: F) -> Result<(), ModelError>
    where
        F: Fn(Option<&M>, &mut dyn Instance) + Send + Sync + 'static,
    {
        let name = self.live_vertex(state)?.qualified_name.clone();
        match &mut self.vertices[state.0].data {
            VertexData::State(data) => {
                data.entry.push(move |_, message, instance, _| {
                    action(message, instance);
                    Ok(())
                });
                self.dirty = true;
                Ok(())
            }
            VertexData::Pseudo(_) => Err(ModelError::NotAState(name)),
        }
    }

    /// Append an exit action to a state.
    pub fn on_exit<F>(&mut self, state: VertexId, action: F) -> Result<(), ModelError>
    where
        F: Fn(Option<&M>, &mut dyn Instance) + Send + Sync + 'static,
    {
        let name = self.live_vertex(state)?.qualified_name.clone();
        match &mut self.vertices[state.0].data {
            VertexData::State(data) => {
                data.exit.push(move |_, message, instance, _| {
                    action(message, instance);
                    Ok(())
                });
                self.dirty = true;
                Ok(())
            }
            VertexData::Pseudo(_) => Err(ModelError::NotAState(name)),
        }
    }

    pub(crate) fn push_transition(&mut self, node: TransitionNode<M>) -> TransitionId {
        let id = TransitionId(self.transitions.len());
        let source = node.source;
        self.transitions.push(node);
        self.vertices[source.0].outgoing.push(id);
        self.dirty = true;
        id
    }

    // ---- removal ---------------------------------------------------------

    fn collect_subtree(&self, vertex: VertexId, vertices: &mut Vec<VertexId>, regions: &mut Vec<RegionId>) {
        vertices.push(vertex);
        for &region in self.regions_of(vertex) {
            regions.push(region);
            for &child in &self.regions[region.0].vertices {
                self.collect_subtree(child, vertices, regions);
            }
        }
    }

    fn remove_collected(&mut self, vertices: Vec<VertexId>, regions: Vec<RegionId>) {
        for id in 0..self.transitions.len() {
            let node = &self.transitions[id];
            if node.removed {
                continue;
            }
            let touches = vertices.contains(&node.source)
                || node.target.map_or(false, |target| vertices.contains(&target));
            if touches {
                let source = node.source;
                self.transitions[id].removed = true;
                self.vertices[source.0]
                    .outgoing
                    .retain(|&t| t != TransitionId(id));
            }
        }
        for vertex in vertices {
            self.vertices[vertex.0].removed = true;
        }
        for region in regions {
            self.regions[region.0].removed = true;
        }
        self.dirty = true;
    }

    /// Remove a vertex, its subtree and every transition touching it.
    pub fn remove_vertex(&mut self, vertex: VertexId) -> Result<(), ModelError> {
        let node = self.live_vertex(vertex)?;
        let parent = match node.parent {
            Some(region) => region,
            None => return Err(ModelError::RemoveRoot(node.qualified_name.clone())),
        };
        let mut vertices = Vec::new();
        let mut regions = Vec::new();
        self.collect_subtree(vertex, &mut vertices, &mut regions);
        self.regions[parent.0].vertices.retain(|&v| v != vertex);
        self.remove_collected(vertices, regions);
        Ok(())
    }

    /// Remove a region, its subtree and every transition touching it.
    pub fn remove_region(&mut self, region: RegionId) -> Result<(), ModelError> {
        let node = self.live_region(region)?;
        let parent = node.parent;
        let mut vertices = Vec::new();
        let mut regions = vec![region];
        for &child in &self.regions[region.0].vertices.clone() {
            self.collect_subtree(child, &mut vertices, &mut regions);
        }
        if let VertexData::State(data) = &mut self.vertices[parent.0].data {
            data.regions.retain(|&r| r != region);
        }
        self.remove_collected(vertices, regions);
        Ok(())
    }

    /// Remove a transition.
    pub fn remove_transition(&mut self, transition: TransitionId) -> Result<(), ModelError> {
        let node = &self.transitions[transition.0];
        if node.removed {
            return Err(ModelError::Removed(transition.to_string()));
        }
        let source = node.source;
        self.transitions[transition.0].removed = true;
        self.vertices[source.0].outgoing.retain(|&t| t != transition);
        self.dirty = true;
        Ok(())
    }

    // ---- iteration helpers ----------------------------------------------

    /// Ids of every vertex currently in the model.
    pub fn vertex_ids(&self) -> Vec<VertexId> {
        self.live_vertex_ids().collect()
    }

    /// Ids of every region currently in the model.
    pub fn region_ids(&self) -> Vec<RegionId> {
        self.live_region_ids().collect()
    }

    pub(crate) fn live_vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.removed)
            .map(|(id, _)| VertexId(id))
    }

    pub(crate) fn live_region_ids(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.regions
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.removed)
            .map(|(id, _)| RegionId(id))
    }

    pub(crate) fn live_transition_ids(&self) -> impl Iterator<Item = TransitionId> + '_ {
        self.transitions
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.removed)
            .map(|(id, _)| TransitionId(id))
    }
}

impl<M> fmt::Debug for StateChart<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateChart")
            .field("name", &self.name)
            .field(
                "vertex_count",
                &self.vertices.iter().filter(|v| !v.removed).count(),
            )
            .field(
                "region_count",
                &self.regions.iter().filter(|r| !r.removed).count(),
            )
            .field(
                "transition_count",
                &self.transitions.iter().filter(|t| !t.removed).count(),
            )
            .field("dirty", &self.dirty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_names() {
        let mut chart = StateChart::<()>::new("machine");
        let region = chart.default_region(chart.root()).unwrap();
        let state = chart.add_state(region, "idle").unwrap();

        assert_eq!(chart.qualified_name(chart.root()), "machine");
        assert_eq!(chart.region_qualified_name(region), "machine.default");
        assert_eq!(chart.qualified_name(state), "machine.default.idle");
        assert_eq!(chart.find_vertex("machine.default.idle"), Some(state));
    }

    #[test]
    fn test_custom_separator() {
        let mut chart = StateChart::<()>::new("machine").with_name_separator("/");
        let region = chart.default_region(chart.root()).unwrap();
        let state = chart.add_state(region, "idle").unwrap();
        assert_eq!(chart.qualified_name(state), "machine/default/idle");
    }

    #[test]
    fn test_state_owner_resolves_default_region() {
        let mut chart = StateChart::<()>::new("machine");
        let root = chart.root();
        let state = chart.add_state(root, "idle").unwrap();
        let region = chart.parent_region(state).unwrap();
        assert_eq!(chart.region_qualified_name(region), "machine.default");

        // A second vertex lands in the same implicit region.
        let other = chart.add_state(root, "busy").unwrap();
        assert_eq!(chart.parent_region(other), Some(region));
    }

    #[test]
    fn test_pseudo_state_owner_rejected() {
        let mut chart = StateChart::<()>::new("machine");
        let root = chart.root();
        let pseudo = chart
            .add_pseudostate(root, "initial", PseudoStateKind::Initial)
            .unwrap();
        let result = chart.add_state(pseudo, "child");
        assert!(matches!(result, Err(ModelError::NotAState(_))));
    }

    #[test]
    fn test_final_state_rejects_regions() {
        let mut chart = StateChart::<()>::new("machine");
        let root = chart.root();
        let done = chart.add_final_state(root, "done").unwrap();
        let result = chart.add_region(done, "inner");
        assert!(matches!(result, Err(ModelError::FinalStateRegion(_))));
    }

    #[test]
    fn test_ancestry_spans_root_to_vertex() {
        let mut chart = StateChart::<()>::new("machine");
        let root = chart.root();
        let composite = chart.add_state(root, "composite").unwrap();
        let inner = chart.add_state(composite, "inner").unwrap();
        let leaf = chart.add_state(inner, "leaf").unwrap();

        let path = chart.ancestry(leaf);
        assert_eq!(path, vec![root, composite, inner, leaf]);
        assert_eq!(chart.ancestry(root), vec![root]);
    }

    #[test]
    fn test_lca_of_siblings() {
        let mut chart = StateChart::<()>::new("machine");
        let root = chart.root();
        let composite = chart.add_state(root, "composite").unwrap();
        let a = chart.add_state(composite, "a").unwrap();
        let b = chart.add_state(composite, "b").unwrap();

        let pa = chart.ancestry(a);
        let pb = chart.ancestry(b);
        let lca = chart.lca(&pa, &pb).unwrap();
        assert_eq!(pa[lca], composite);
        assert_ne!(pa[lca + 1], pb[lca + 1]);
    }

    #[test]
    fn test_remove_vertex_drops_subtree_and_transitions() {
        let mut chart = StateChart::<()>::new("machine");
        let root = chart.root();
        let composite = chart.add_state(root, "composite").unwrap();
        let inner = chart.add_state(composite, "inner").unwrap();
        let outside = chart.add_state(root, "outside").unwrap();
        let t = chart.transition(outside).to(inner).build().unwrap();

        chart.compile();
        assert!(!chart.is_dirty());

        chart.remove_vertex(composite).unwrap();
        assert!(chart.is_dirty());
        assert!(chart.find_vertex("machine.default.composite").is_none());
        assert!(chart.find_vertex("machine.default.composite.default.inner").is_none());
        assert!(chart.outgoing(outside).is_empty());
        assert!(matches!(
            chart.remove_transition(t),
            Err(ModelError::Removed(_))
        ));
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let mut chart = StateChart::<()>::new("machine");
        let root = chart.root();
        assert!(matches!(
            chart.remove_vertex(root),
            Err(ModelError::RemoveRoot(_))
        ));
    }
}
