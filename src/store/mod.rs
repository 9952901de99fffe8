// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The in-memory DAG: vertices, edges, attributes, and the invariants that keep it acyclic.
//!
//! Grounded on `config::dependency_graph::DependencyGraph`'s topological-sort machinery and
//! `config::validation`'s DFS cycle check, generalized from `String` keys to any ordered,
//! hashable key `K` and from a fixed processor-config payload to an opaque value `V`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use crate::errors::GraphError;

/// Lifecycle label a vertex carries while the [`crate::discover::GraphDiscoverer`] expands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Unknown,
    Discovering,
    Discovered,
    Completed,
    Error,
}

/// Lifecycle label a vertex carries while the [`crate::process::TopologicalProcessor`] walks it.
/// Absent (`None` on the vertex) until a processor run first touches the vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    Queued,
    Processing,
    Completed,
    Error,
}

/// Reserved attribute keys, exposed through [`Vertex::attribute`] for callers that want the
/// map-based view rather than the typed `discovery_state`/`processing_state` accessors.
pub mod reserved {
    pub const DISCOVERY_STATE: &str = "dag/discovery-state";
    pub const PROCESSING_STATE: &str = "dag/processing-state";
    pub const ORDER_INDEX: &str = "dag/order-index";
}

/// Attributes attached to a single edge. `order_index` is set by the discoverer and is the
/// only ordering signal [`Dag::current_edges`] honors.
#[derive(Debug, Clone, Default)]
pub struct EdgeAttrs {
    pub order_index: Option<usize>,
    pub extra: HashMap<String, serde_json::Value>,
}

impl EdgeAttrs {
    fn merge_from(&mut self, order_index: Option<usize>, attrs: HashMap<String, serde_json::Value>) {
        if order_index.is_some() {
            self.order_index = order_index;
        }
        self.extra.extend(attrs);
    }
}

/// A vertex in the graph. `value` and non-reserved `attributes` are held behind `Arc` so that
/// [`Dag::clone`] can share them by reference while still giving the clone independently
/// owned `discovery_state`/`processing_state` fields (see module docs on clone depth).
pub struct Vertex<K, V> {
    id: K,
    value: Option<Arc<V>>,
    discovery_state: DiscoveryState,
    processing_state: Option<ProcessingState>,
    attributes: HashMap<String, Arc<serde_json::Value>>,
    edges: HashMap<K, EdgeAttrs>,
    in_degree: usize,
}

// Hand-written rather than `#[derive(Clone)]`: derive would add a spurious `V: Clone` bound
// even though `V` only ever appears behind an `Arc`, which forecloses opaque, non-Clone
// payloads the spec requires supporting.
impl<K: Clone, V> Clone for Vertex<K, V> {
    fn clone(&self) -> Self {
        Vertex {
            id: self.id.clone(),
            value: self.value.clone(),
            discovery_state: self.discovery_state,
            processing_state: self.processing_state,
            attributes: self.attributes.clone(),
            edges: self.edges.clone(),
            in_degree: self.in_degree,
        }
    }
}

impl<K: Clone + Eq + Hash, V> Vertex<K, V> {
    fn new(id: K) -> Self {
        Vertex {
            id,
            value: None,
            discovery_state: DiscoveryState::Unknown,
            processing_state: None,
            attributes: HashMap::new(),
            edges: HashMap::new(),
            in_degree: 0,
        }
    }

    pub fn id(&self) -> &K {
        &self.id
    }

    pub fn value(&self) -> Option<&Arc<V>> {
        self.value.as_ref()
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery_state
    }

    pub fn processing_state(&self) -> Option<ProcessingState> {
        self.processing_state
    }

    pub fn in_degree(&self) -> usize {
        self.in_degree
    }

    pub fn out_degree(&self) -> usize {
        self.edges.len()
    }

    /// Reads a vertex attribute by name. Reserved keys are synthesized from the typed fields;
    /// anything else is looked up in the free-form attribute bag.
    pub fn attribute(&self, key: &str) -> Option<Arc<serde_json::Value>> {
        match key {
            reserved::DISCOVERY_STATE => {
                Some(Arc::new(serde_json::Value::String(self.discovery_state.to_string())))
            }
            reserved::PROCESSING_STATE => self
                .processing_state
                .map(|s| Arc::new(serde_json::Value::String(s.to_string()))),
            _ => self.attributes.get(key).cloned(),
        }
    }
}

/// The DAG itself. Keys iterate in `K`'s natural order (`BTreeMap`), which is what makes
/// [`Dag::topological_sort`] deterministic.
pub struct Dag<K, V> {
    vertices: BTreeMap<K, Vertex<K, V>>,
}

impl<K, V> Default for Dag<K, V>
where
    K: Ord + Hash + Clone,
{
    fn default() -> Self {
        Dag::new()
    }
}

impl<K, V> Clone for Dag<K, V>
where
    K: Ord + Hash + Clone,
{
    /// Deep structural copy: every vertex and edge is duplicated. Attribute *values*
    /// (`value`, free-form attributes) are shared via `Arc`; `discovery_state` and
    /// `processing_state` are plain fields and are therefore independently owned by the
    /// clone, so the [`crate::process::TopologicalProcessor`]'s working copy never leaks
    /// processing-state mutations back into the original.
    fn clone(&self) -> Self {
        Dag {
            vertices: self.vertices.clone(),
        }
    }
}

impl<K, V> Dag<K, V>
where
    K: Ord + Hash + Clone,
{
    pub fn new() -> Self {
        Dag {
            vertices: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn contains(&self, id: &K) -> bool {
        self.vertices.contains_key(id)
    }

    pub fn get(&self, id: &K) -> Option<&Vertex<K, V>> {
        self.vertices.get(id)
    }

    /// Inserts `id` if absent, merging `attrs` left-to-right. If the vertex already exists
    /// the merge is a no-op aside from layering the new attributes on top — duplicate
    /// discovery of the same key is expected and benign (see `GraphError::AlreadyExists`
    /// docs for why the store never rejects this itself).
    pub fn add_vertex<I>(&mut self, id: K, attrs: I)
    where
        I: IntoIterator<Item = HashMap<String, serde_json::Value>>,
    {
        let vertex = self
            .vertices
            .entry(id.clone())
            .or_insert_with(|| Vertex::new(id));
        for map in attrs {
            for (k, v) in map {
                vertex.attributes.insert(k, Arc::new(v));
            }
        }
    }

    fn vertex_mut(&mut self, id: &K) -> Result<&mut Vertex<K, V>, GraphError>
    where
        K: ToString,
    {
        self.vertices
            .get_mut(id)
            .ok_or_else(|| GraphError::MissingVertex { id: id.to_string() })
    }

    /// Adds an edge `from -> to`, rejecting self-references, missing endpoints, and anything
    /// that would close a cycle. `order_index`, when given, is recorded on the edge; repeat
    /// calls for the same pair merge attributes and only overwrite `order_index` when a new
    /// one is supplied.
    pub fn add_edge<I>(
        &mut self,
        from: &K,
        to: &K,
        order_index: Option<usize>,
        attrs: I,
    ) -> Result<(), GraphError>
    where
        K: ToString,
        I: IntoIterator<Item = HashMap<String, serde_json::Value>>,
    {
        if from == to {
            return Err(GraphError::SelfReference { id: from.to_string() });
        }
        if !self.vertices.contains_key(from) {
            return Err(GraphError::MissingVertex { id: from.to_string() });
        }
        if !self.vertices.contains_key(to) {
            return Err(GraphError::MissingVertex { id: to.to_string() });
        }

        let is_new_edge = !self.vertices[from].edges.contains_key(to);
        if is_new_edge {
            if let Some(path) = self.path_to(to, from) {
                return Err(GraphError::CycleViolation {
                    path: path.into_iter().map(|k| k.to_string()).collect(),
                });
            }
        }

        let merged: HashMap<String, serde_json::Value> =
            attrs.into_iter().fold(HashMap::new(), |mut acc, map| {
                acc.extend(map);
                acc
            });

        let from_vertex = self.vertices.get_mut(from).expect("checked above");
        from_vertex
            .edges
            .entry(to.clone())
            .or_default()
            .merge_from(order_index, merged);

        if is_new_edge {
            self.vertices.get_mut(to).expect("checked above").in_degree += 1;
        }
        Ok(())
    }

    /// Removes a vertex and every edge that pointed at it.
    pub fn delete_vertex(&mut self, id: &K) -> Result<(), GraphError>
    where
        K: ToString,
    {
        if self.vertices.remove(id).is_none() {
            return Err(GraphError::MissingVertex { id: id.to_string() });
        }
        for vertex in self.vertices.values_mut() {
            vertex.edges.remove(id);
        }
        Ok(())
    }

    /// Vertices with no incoming edges, in natural key order.
    pub fn roots(&self) -> Vec<K> {
        self.vertices
            .values()
            .filter(|v| v.in_degree == 0)
            .map(|v| v.id.clone())
            .collect()
    }

    /// Depth-first search from `start`, neighbors visited in natural key order, looking for
    /// `target`. Returns the concrete path `start -> ... -> target` if reachable.
    fn path_to(&self, start: &K, target: &K) -> Option<Vec<K>> {
        if start == target {
            return Some(vec![start.clone()]);
        }
        let mut stack: Vec<K> = vec![start.clone()];
        let mut visited: HashSet<K> = HashSet::new();
        let mut parent: HashMap<K, K> = HashMap::new();
        visited.insert(start.clone());

        while let Some(current) = stack.pop() {
            if current == *target {
                let mut path = vec![current.clone()];
                let mut cursor = current;
                while let Some(p) = parent.get(&cursor) {
                    path.push(p.clone());
                    cursor = p.clone();
                }
                path.reverse();
                return Some(path);
            }
            let Some(vertex) = self.vertices.get(&current) else {
                continue;
            };
            for neighbor in self.sorted_neighbor_keys(vertex) {
                if visited.insert(neighbor.clone()) {
                    parent.insert(neighbor.clone(), current.clone());
                    stack.push(neighbor);
                }
            }
        }
        None
    }

    fn sorted_neighbor_keys(&self, vertex: &Vertex<K, V>) -> Vec<K> {
        let mut keys: Vec<K> = vertex.edges.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Deterministic topological order: iterate vertex ids in natural order, DFS each
    /// neighbor set in natural order, emit post-order reversed. Ties never depend on
    /// insertion order or `dag/order-index`.
    pub fn topological_sort(&self) -> Result<Vec<K>, GraphError>
    where
        K: ToString,
    {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            White,
            Gray,
            Black,
        }

        let mut marks: HashMap<K, Mark> = self
            .vertices
            .keys()
            .map(|k| (k.clone(), Mark::White))
            .collect();
        let mut order: Vec<K> = Vec::with_capacity(self.vertices.len());

        for start in self.vertices.keys().cloned().collect::<Vec<_>>() {
            if marks[&start] != Mark::White {
                continue;
            }
            // Explicit stack with a post-order marker avoids recursion depth growing with
            // the graph; each frame remembers whether we're entering or leaving a vertex.
            let mut stack: Vec<(K, bool)> = vec![(start, false)];
            while let Some((id, leaving)) = stack.pop() {
                if leaving {
                    marks.insert(id.clone(), Mark::Black);
                    order.push(id);
                    continue;
                }
                match marks.get(&id) {
                    Some(Mark::Black) => continue,
                    Some(Mark::Gray) => {
                        return Err(GraphError::CycleViolation {
                            path: vec![id.to_string()],
                        })
                    }
                    _ => {}
                }
                marks.insert(id.clone(), Mark::Gray);
                stack.push((id.clone(), true));
                if let Some(vertex) = self.vertices.get(&id) {
                    for neighbor in self.sorted_neighbor_keys(vertex) {
                        match marks.get(&neighbor) {
                            Some(Mark::White) | None => stack.push((neighbor, false)),
                            Some(Mark::Gray) => {
                                return Err(GraphError::CycleViolation {
                                    path: vec![id.to_string(), neighbor.to_string()],
                                })
                            }
                            Some(Mark::Black) => {}
                        }
                    }
                }
            }
        }

        order.reverse();
        Ok(order)
    }

    /// A new DAG with every edge reversed. Vertex attributes and states are preserved
    /// (shared the same way `Clone` shares them); degree counters are recomputed.
    pub fn reverse(&self) -> Dag<K, V> {
        let mut reversed = Dag::new();
        for vertex in self.vertices.values() {
            reversed.vertices.insert(
                vertex.id.clone(),
                Vertex {
                    id: vertex.id.clone(),
                    value: vertex.value.clone(),
                    discovery_state: vertex.discovery_state,
                    processing_state: vertex.processing_state,
                    attributes: vertex.attributes.clone(),
                    edges: HashMap::new(),
                    in_degree: 0,
                },
            );
        }
        for vertex in self.vertices.values() {
            for (to, attrs) in &vertex.edges {
                let reversed_from = reversed.vertices.get_mut(to).expect("same vertex set");
                reversed_from.edges.insert(vertex.id.clone(), attrs.clone());
                reversed
                    .vertices
                    .get_mut(&vertex.id)
                    .expect("same vertex set")
                    .in_degree += 1;
            }
        }
        reversed
    }

    /// Discovery-state snapshot; `Unknown` if the vertex is absent.
    pub fn current_state(&self, id: &K) -> DiscoveryState {
        self.vertices
            .get(id)
            .map(|v| v.discovery_state)
            .unwrap_or(DiscoveryState::Unknown)
    }

    /// Resolved-value snapshot; `None` if absent or not yet resolved.
    pub fn current_value(&self, id: &K) -> Option<Arc<V>> {
        self.vertices.get(id).and_then(|v| v.value.clone())
    }

    /// Outgoing edges sorted by `dag/order-index`. An edge missing its order index is a
    /// programming error (see spec, §6) and trips an assertion rather than silently
    /// misordering the caller's view.
    pub fn current_edges(&self, id: &K) -> Vec<K> {
        let Some(vertex) = self.vertices.get(id) else {
            return Vec::new();
        };
        let mut entries: Vec<(&K, usize)> = vertex
            .edges
            .iter()
            .map(|(k, attrs)| {
                (
                    k,
                    attrs
                        .order_index
                        .expect("edge missing dag/order-index: invariant violated"),
                )
            })
            .collect();
        entries.sort_by_key(|(_, idx)| *idx);
        entries.into_iter().map(|(k, _)| k.clone()).collect()
    }

    pub(crate) fn set_discovery_state(&mut self, id: &K, state: DiscoveryState)
    where
        K: ToString,
    {
        if let Ok(v) = self.vertex_mut(id) {
            v.discovery_state = state;
        }
    }

    pub(crate) fn set_value(&mut self, id: &K, value: Arc<V>) {
        if let Some(v) = self.vertices.get_mut(id) {
            v.value = Some(value);
        }
    }

    /// Clears a vertex's `dag/value`. Used when a vertex's `Resolve` succeeded but its
    /// subsequent `Discover` failed: the vertex never reaches a usable state, so `dag/value`
    /// must not be left looking like a successful resolution.
    pub(crate) fn clear_value(&mut self, id: &K) {
        if let Some(v) = self.vertices.get_mut(id) {
            v.value = None;
        }
    }

    pub(crate) fn set_processing_state(&mut self, id: &K, state: ProcessingState) {
        if let Some(v) = self.vertices.get_mut(id) {
            v.processing_state = Some(state);
        }
    }

    /// Converts the concurrent-map representation this store actually uses into a plain,
    /// non-locking map view. Part of the extensibility contract in spec §6: every attribute,
    /// edge attribute, and degree counter survives the round trip.
    pub fn to_plain_map(&self) -> PlainDag<K, V> {
        let mut vertices = HashMap::new();
        for (id, vertex) in &self.vertices {
            vertices.insert(id.clone(), vertex.clone());
        }
        PlainDag { vertices }
    }

    pub fn from_plain_map(plain: PlainDag<K, V>) -> Self {
        let mut vertices = BTreeMap::new();
        for (id, vertex) in plain.vertices {
            vertices.insert(id, vertex);
        }
        Dag { vertices }
    }
}

/// A plain, `HashMap`-backed view of a [`Dag`], with no locking discipline attached. See
/// [`Dag::to_plain_map`] / [`Dag::from_plain_map`].
pub struct PlainDag<K, V> {
    pub vertices: HashMap<K, Vertex<K, V>>,
}

impl std::fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DiscoveryState::Unknown => "Unknown",
            DiscoveryState::Discovering => "Discovering",
            DiscoveryState::Discovered => "Discovered",
            DiscoveryState::Completed => "Completed",
            DiscoveryState::Error => "Error",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessingState::Queued => "Queued",
            ProcessingState::Processing => "Processing",
            ProcessingState::Completed => "Completed",
            ProcessingState::Error => "Error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs() -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }

    #[test]
    fn add_vertex_is_idempotent() {
        let mut dag: Dag<String, ()> = Dag::new();
        dag.add_vertex("a".to_string(), vec![attrs()]);
        dag.add_vertex("a".to_string(), vec![attrs()]);
        assert_eq!(dag.len(), 1);
    }

    #[test]
    fn add_edge_rejects_self_reference() {
        let mut dag: Dag<String, ()> = Dag::new();
        dag.add_vertex("a".to_string(), vec![]);
        let err = dag
            .add_edge(&"a".to_string(), &"a".to_string(), None, vec![])
            .unwrap_err();
        assert!(matches!(err, GraphError::SelfReference { .. }));
    }

    #[test]
    fn add_edge_rejects_missing_vertex() {
        let mut dag: Dag<String, ()> = Dag::new();
        dag.add_vertex("a".to_string(), vec![]);
        let err = dag
            .add_edge(&"a".to_string(), &"b".to_string(), None, vec![])
            .unwrap_err();
        assert!(matches!(err, GraphError::MissingVertex { .. }));
    }

    #[test]
    fn add_edge_rejects_cycle() {
        let mut dag: Dag<String, ()> = Dag::new();
        for id in ["a", "b", "c"] {
            dag.add_vertex(id.to_string(), vec![]);
        }
        dag.add_edge(&"a".to_string(), &"b".to_string(), Some(0), vec![])
            .unwrap();
        dag.add_edge(&"b".to_string(), &"c".to_string(), Some(0), vec![])
            .unwrap();
        let err = dag
            .add_edge(&"c".to_string(), &"a".to_string(), Some(0), vec![])
            .unwrap_err();
        assert!(matches!(err, GraphError::CycleViolation { .. }));
    }

    #[test]
    fn roots_and_degrees() {
        let mut dag: Dag<String, ()> = Dag::new();
        for id in ["a", "b", "c"] {
            dag.add_vertex(id.to_string(), vec![]);
        }
        dag.add_edge(&"a".to_string(), &"b".to_string(), Some(0), vec![])
            .unwrap();
        dag.add_edge(&"a".to_string(), &"c".to_string(), Some(1), vec![])
            .unwrap();
        assert_eq!(dag.roots(), vec!["a".to_string()]);
        assert_eq!(dag.get(&"a".to_string()).unwrap().out_degree(), 2);
        assert_eq!(dag.get(&"b".to_string()).unwrap().in_degree(), 1);
    }

    #[test]
    fn topological_sort_diamond_is_deterministic() {
        let mut dag: Dag<String, ()> = Dag::new();
        for id in ["a", "b", "c", "d"] {
            dag.add_vertex(id.to_string(), vec![]);
        }
        dag.add_edge(&"a".to_string(), &"b".to_string(), Some(0), vec![])
            .unwrap();
        dag.add_edge(&"a".to_string(), &"c".to_string(), Some(1), vec![])
            .unwrap();
        dag.add_edge(&"b".to_string(), &"d".to_string(), Some(0), vec![])
            .unwrap();
        dag.add_edge(&"c".to_string(), &"d".to_string(), Some(0), vec![])
            .unwrap();

        let order = dag.topological_sort().unwrap();
        let pos = |id: &str| order.iter().position(|k| k == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }

    #[test]
    fn reverse_flips_edges_and_degrees() {
        let mut dag: Dag<String, ()> = Dag::new();
        for id in ["a", "b"] {
            dag.add_vertex(id.to_string(), vec![]);
        }
        dag.add_edge(&"a".to_string(), &"b".to_string(), Some(0), vec![])
            .unwrap();
        let reversed = dag.reverse();
        assert_eq!(reversed.roots(), vec!["b".to_string()]);
        assert_eq!(reversed.get(&"b".to_string()).unwrap().out_degree(), 1);
        assert_eq!(reversed.get(&"a".to_string()).unwrap().in_degree(), 1);
    }

    #[test]
    fn reverse_reverse_is_identity_on_edge_shape() {
        let mut dag: Dag<String, ()> = Dag::new();
        for id in ["a", "b", "c"] {
            dag.add_vertex(id.to_string(), vec![]);
        }
        dag.add_edge(&"a".to_string(), &"b".to_string(), Some(0), vec![])
            .unwrap();
        dag.add_edge(&"b".to_string(), &"c".to_string(), Some(0), vec![])
            .unwrap();
        let back = dag.reverse().reverse();
        assert_eq!(back.roots(), dag.roots());
        assert_eq!(back.current_edges(&"a".to_string()), dag.current_edges(&"a".to_string()));
    }

    #[test]
    fn clone_shares_values_but_not_processing_state() {
        let mut dag: Dag<String, i32> = Dag::new();
        dag.add_vertex("a".to_string(), vec![]);
        dag.set_value(&"a".to_string(), Arc::new(42));
        dag.set_processing_state(&"a".to_string(), ProcessingState::Queued);

        let clone = dag.clone();
        assert!(Arc::ptr_eq(
            &dag.current_value(&"a".to_string()).unwrap(),
            &clone.current_value(&"a".to_string()).unwrap()
        ));

        dag.set_processing_state(&"a".to_string(), ProcessingState::Completed);
        assert_eq!(
            clone.get(&"a".to_string()).unwrap().processing_state(),
            Some(ProcessingState::Queued)
        );
    }

    #[test]
    fn current_edges_sorted_by_order_index() {
        let mut dag: Dag<String, ()> = Dag::new();
        for id in ["a", "x", "y"] {
            dag.add_vertex(id.to_string(), vec![]);
        }
        dag.add_edge(&"a".to_string(), &"y".to_string(), Some(1), vec![])
            .unwrap();
        dag.add_edge(&"a".to_string(), &"x".to_string(), Some(0), vec![])
            .unwrap();
        assert_eq!(
            dag.current_edges(&"a".to_string()),
            vec!["x".to_string(), "y".to_string()]
        );
    }

    #[test]
    fn delete_vertex_cleans_up_incoming_edges() {
        let mut dag: Dag<String, ()> = Dag::new();
        for id in ["a", "b"] {
            dag.add_vertex(id.to_string(), vec![]);
        }
        dag.add_edge(&"a".to_string(), &"b".to_string(), Some(0), vec![])
            .unwrap();
        dag.delete_vertex(&"b".to_string()).unwrap();
        assert_eq!(dag.get(&"a".to_string()).unwrap().out_degree(), 0);
        assert!(dag.delete_vertex(&"b".to_string()).is_err());
    }
}
