//! Compaction and ordering of small graphs.
//!
//! Both passes only reason about edges that keep strand (`a+ -> b+`, or the
//! equivalent `b- -> a-`). Nodes touched by an inverting edge are never merged
//! and impose no ordering constraint through that edge.

use crate::graph::{Handle, PathGraph, PathId, SequenceGraph};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io;

struct Adjacency {
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
    inverted: Vec<bool>,
}

fn adjacency(graph: &SequenceGraph) -> Adjacency {
    let n = graph.node_count();
    let mut successors = vec![Vec::new(); n];
    let mut predecessors = vec![Vec::new(); n];
    let mut inverted = vec![false; n];
    for &(from, to) in graph.edges() {
        let (a, b) = match (from.is_reverse(), to.is_reverse()) {
            (false, false) => (from.id(), to.id()),
            (true, true) => (to.id(), from.id()),
            _ => {
                inverted[from.id()] = true;
                inverted[to.id()] = true;
                continue;
            }
        };
        if !successors[a].contains(&b) {
            successors[a].push(b);
            predecessors[b].push(a);
        }
    }
    Adjacency {
        successors,
        predecessors,
        inverted,
    }
}

/// Merge runs of nodes that form a simple chain and that every path crosses
/// as a unit, so a one-base-per-node alignment graph becomes a compact one.
///
/// Node order of the result follows the first node of each run.
pub fn unchop(graph: &SequenceGraph) -> io::Result<SequenceGraph> {
    let n = graph.node_count();
    let adj = adjacency(graph);

    // (path, rank, is_reverse) for every visit of every node
    let mut visits: Vec<Vec<(PathId, usize, bool)>> = vec![Vec::new(); n];
    for path in graph.path_ids() {
        for (rank, handle) in graph.path_steps(path).iter().enumerate() {
            visits[handle.id()].push((path, rank, handle.is_reverse()));
        }
    }

    let perfect_neighbors = |a: usize, b: usize| -> bool {
        if visits[a].len() != visits[b].len() {
            return false;
        }
        visits[a].iter().all(|&(path, rank, is_reverse)| {
            let steps = graph.path_steps(path);
            if is_reverse {
                rank > 0 && steps[rank - 1] == Handle::new(b, true)
            } else {
                steps.get(rank + 1) == Some(&Handle::forward(b))
            }
        })
    };

    let mut next: Vec<Option<usize>> = vec![None; n];
    let mut has_prev = vec![false; n];
    for a in 0..n {
        if adj.inverted[a] || adj.successors[a].len() != 1 {
            continue;
        }
        let b = adj.successors[a][0];
        if b != a
            && !adj.inverted[b]
            && adj.predecessors[b].len() == 1
            && perfect_neighbors(a, b)
        {
            next[a] = Some(b);
            has_prev[b] = true;
        }
    }

    // chain index and offset inside the chain, per original node
    let mut placement: Vec<Option<(usize, usize)>> = vec![None; n];
    let mut chains: Vec<Vec<usize>> = Vec::new();
    for start in 0..n {
        if has_prev[start] {
            continue;
        }
        let mut chain = vec![start];
        placement[start] = Some((chains.len(), 0));
        let mut cur = start;
        while let Some(b) = next[cur] {
            if placement[b].is_some() {
                break;
            }
            placement[b] = Some((chains.len(), chain.len()));
            chain.push(b);
            cur = b;
        }
        chains.push(chain);
    }
    // nodes on a cycle of merges have no head; keep them unmerged
    for node in 0..n {
        if placement[node].is_none() {
            placement[node] = Some((chains.len(), 0));
            chains.push(vec![node]);
        }
    }
    let placement: Vec<(usize, usize)> = placement.into_iter().flatten().collect();

    let mut compact = SequenceGraph::new();
    for chain in &chains {
        let mut seq = Vec::new();
        for &node in chain {
            seq.extend_from_slice(graph.node_sequence(node));
        }
        compact.create_node(seq);
    }

    // leaving a handle means leaving the tail of its chain (head, if reversed)
    let exits = |h: Handle| -> Option<Handle> {
        let (chain, offset) = placement[h.id()];
        let at_boundary = if h.is_reverse() {
            offset == 0
        } else {
            offset + 1 == chains[chain].len()
        };
        at_boundary.then(|| Handle::new(chain, h.is_reverse()))
    };
    let enters = |h: Handle| -> Option<Handle> {
        let (chain, offset) = placement[h.id()];
        let at_boundary = if h.is_reverse() {
            offset + 1 == chains[chain].len()
        } else {
            offset == 0
        };
        at_boundary.then(|| Handle::new(chain, h.is_reverse()))
    };

    for &(from, to) in graph.edges() {
        if let (Some(f), Some(t)) = (exits(from), enters(to)) {
            compact.create_edge(f, t);
        }
    }

    for path in graph.path_ids() {
        let new_path = compact.create_path(graph.path_name(path))?;
        for &handle in graph.path_steps(path) {
            if let Some(h) = enters(handle) {
                compact.append_step(new_path, h);
            }
        }
    }

    Ok(compact)
}

/// Kahn's topological sort over strand-preserving edges, always emitting the
/// lowest available node id first. Nodes left over because of cycles are
/// appended in id order.
pub fn topological_order(graph: &SequenceGraph) -> Vec<usize> {
    let n = graph.node_count();
    let adj = adjacency(graph);
    let mut in_degree: Vec<usize> = adj.predecessors.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| in_degree[i] == 0)
        .map(Reverse)
        .collect();
    let mut emitted = vec![false; n];
    let mut order = Vec::with_capacity(n);

    while let Some(Reverse(node)) = ready.pop() {
        emitted[node] = true;
        order.push(node);
        for &succ in &adj.successors[node] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                ready.push(Reverse(succ));
            }
        }
    }

    if order.len() < n {
        order.extend((0..n).filter(|&i| !emitted[i]));
    }
    order
}

/// Renumber nodes so that `order[i]` becomes node `i`. Orientation, edge
/// insertion order and paths are preserved.
pub fn apply_ordering(graph: &SequenceGraph, order: &[usize]) -> io::Result<SequenceGraph> {
    let mut new_id = vec![0usize; order.len()];
    for (i, &old) in order.iter().enumerate() {
        new_id[old] = i;
    }
    let remap = |h: Handle| Handle::new(new_id[h.id()], h.is_reverse());

    let mut ordered = SequenceGraph::new();
    for &old in order {
        ordered.create_node(graph.node_sequence(old).to_vec());
    }
    for &(from, to) in graph.edges() {
        ordered.create_edge(remap(from), remap(to));
    }
    for path in graph.path_ids() {
        let new_path = ordered.create_path(graph.path_name(path))?;
        for &handle in graph.path_steps(path) {
            ordered.append_step(new_path, remap(handle));
        }
    }
    Ok(ordered)
}
