use rustc_hash::{FxHashMap, FxHashSet};
use std::borrow::Cow;
use std::io;

/// An oriented reference to a node: the node id shifted left by one, with the
/// low bit set when the node is traversed in reverse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    pub fn new(id: usize, is_reverse: bool) -> Self {
        Handle(((id as u64) << 1) | is_reverse as u64)
    }

    pub fn forward(id: usize) -> Self {
        Handle::new(id, false)
    }

    pub fn id(self) -> usize {
        (self.0 >> 1) as usize
    }

    pub fn is_reverse(self) -> bool {
        self.0 & 1 == 1
    }

    pub fn flip(self) -> Self {
        Handle(self.0 ^ 1)
    }
}

/// Dense index of a path inside one graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathId(pub usize);

/// A position along a path. `rank == step count` is the one-past-the-end step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Step {
    pub path: PathId,
    pub rank: usize,
}

/// Read-only handle/step/position queries over a graph with embedded paths.
pub trait PathGraph {
    fn node_count(&self) -> usize;

    /// Sequence of the node as seen through `handle` (reverse complemented
    /// for reverse handles).
    fn sequence(&self, handle: Handle) -> Cow<'_, [u8]>;

    fn length(&self, handle: Handle) -> usize;

    fn path_count(&self) -> usize;

    fn path_name(&self, path: PathId) -> &str;

    fn path_by_name(&self, name: &str) -> Option<PathId>;

    /// Total sequence length of the path.
    fn path_length(&self, path: PathId) -> usize;

    fn path_end(&self, path: PathId) -> Step;

    fn handle_of_step(&self, step: Step) -> Handle;

    /// Offset of the first base of `step` along its path. The end step maps to
    /// the path length.
    fn position_of_step(&self, step: Step) -> usize;

    fn path_begin(&self, path: PathId) -> Step {
        Step { path, rank: 0 }
    }

    fn path_of_step(&self, step: Step) -> PathId {
        step.path
    }

    fn next_step(&self, step: Step) -> Step {
        Step {
            path: step.path,
            rank: step.rank + 1,
        }
    }

    fn previous_step(&self, step: Step) -> Step {
        Step {
            path: step.path,
            rank: step.rank.saturating_sub(1),
        }
    }

    /// Concatenated sequence of the steps in `[begin, end)`.
    fn step_range_sequence(&self, begin: Step, end: Step) -> Vec<u8> {
        let path_end = self.path_end(begin.path);
        let mut seq = Vec::new();
        let mut step = begin;
        while step != end && step.rank < path_end.rank {
            seq.extend_from_slice(&self.sequence(self.handle_of_step(step)));
            step = self.next_step(step);
        }
        seq
    }

    fn path_sequence(&self, path: PathId) -> Vec<u8> {
        self.step_range_sequence(self.path_begin(path), self.path_end(path))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct EmbeddedPath {
    name: String,
    steps: Vec<Handle>,
    /// Start offset of every step; parallel to `steps`.
    offsets: Vec<usize>,
    length: usize,
}

/// In-memory bidirected sequence graph. Node ids are dense and 0-based, so a
/// graph doubles as the arena for a block subgraph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SequenceGraph {
    nodes: Vec<Vec<u8>>,
    edges: Vec<(Handle, Handle)>,
    edge_set: FxHashSet<(Handle, Handle)>,
    paths: Vec<EmbeddedPath>,
    path_ids: FxHashMap<String, PathId>,
}

impl SequenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn create_node(&mut self, sequence: Vec<u8>) -> Handle {
        self.nodes.push(sequence);
        Handle::forward(self.nodes.len() - 1)
    }

    /// Adds the edge unless it (or its reverse-complement twin) already exists.
    /// Returns whether a new edge was added.
    pub fn create_edge(&mut self, from: Handle, to: Handle) -> bool {
        if self.edge_set.insert(canonical_edge(from, to)) {
            self.edges.push((from, to));
            true
        } else {
            false
        }
    }

    pub fn has_edge(&self, from: Handle, to: Handle) -> bool {
        self.edge_set.contains(&canonical_edge(from, to))
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> &[(Handle, Handle)] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn create_path(&mut self, name: &str) -> io::Result<PathId> {
        if self.path_ids.contains_key(name) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Path '{}' already exists in the graph", name),
            ));
        }
        let id = PathId(self.paths.len());
        self.paths.push(EmbeddedPath {
            name: name.to_string(),
            ..Default::default()
        });
        self.path_ids.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn append_step(&mut self, path: PathId, handle: Handle) {
        let len = self.nodes[handle.id()].len();
        let path = &mut self.paths[path.0];
        path.offsets.push(path.length);
        path.steps.push(handle);
        path.length += len;
    }

    pub fn path_steps(&self, path: PathId) -> &[Handle] {
        &self.paths[path.0].steps
    }

    pub fn path_ids(&self) -> impl Iterator<Item = PathId> {
        (0..self.paths.len()).map(PathId)
    }

    /// Drops every path whose name fails `keep`, renumbering the survivors in
    /// their original order. Nodes and edges are untouched.
    pub fn retain_paths<F: Fn(&str) -> bool>(&mut self, keep: F) {
        self.paths.retain(|p| keep(&p.name));
        self.path_ids = self
            .paths
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), PathId(i)))
            .collect();
    }

    /// Forward sequence of a node, independent of orientation.
    pub fn node_sequence(&self, id: usize) -> &[u8] {
        &self.nodes[id]
    }
}

impl PathGraph for SequenceGraph {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn sequence(&self, handle: Handle) -> Cow<'_, [u8]> {
        let seq = &self.nodes[handle.id()];
        if handle.is_reverse() {
            Cow::Owned(reverse_complement(seq))
        } else {
            Cow::Borrowed(seq)
        }
    }

    fn length(&self, handle: Handle) -> usize {
        self.nodes[handle.id()].len()
    }

    fn path_count(&self) -> usize {
        self.paths.len()
    }

    fn path_name(&self, path: PathId) -> &str {
        &self.paths[path.0].name
    }

    fn path_by_name(&self, name: &str) -> Option<PathId> {
        self.path_ids.get(name).copied()
    }

    fn path_length(&self, path: PathId) -> usize {
        self.paths[path.0].length
    }

    fn path_end(&self, path: PathId) -> Step {
        Step {
            path,
            rank: self.paths[path.0].steps.len(),
        }
    }

    fn handle_of_step(&self, step: Step) -> Handle {
        self.paths[step.path.0].steps[step.rank]
    }

    fn position_of_step(&self, step: Step) -> usize {
        let path = &self.paths[step.path.0];
        path.offsets.get(step.rank).copied().unwrap_or(path.length)
    }
}

/// An edge and its reverse-complement twin share one canonical form.
fn canonical_edge(from: Handle, to: Handle) -> (Handle, Handle) {
    (from, to).min((to.flip(), from.flip()))
}

/// Reverse complement that keeps the case of each base, so that applying it
/// twice gives back the input exactly.
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|&base| match base {
            b'A' => b'T',
            b'T' => b'A',
            b'C' => b'G',
            b'G' => b'C',
            b'a' => b't',
            b't' => b'a',
            b'c' => b'g',
            b'g' => b'c',
            _ => base,
        })
        .collect()
}
