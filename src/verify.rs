use crate::graph::{PathGraph, PathId, SequenceGraph};
use log::{debug, error};
use std::io;

/// Check that every base path exists in `assembled` and spells exactly the
/// same sequence there.
pub fn verify_paths<G: PathGraph>(base: &G, assembled: &SequenceGraph) -> io::Result<()> {
    for p in 0..base.path_count() {
        let base_path = PathId(p);
        let name = base.path_name(base_path);
        let path = assembled.path_by_name(name).ok_or_else(|| {
            error!("Path '{}' is missing from the assembled graph", name);
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Path '{}' is missing from the assembled graph", name),
            )
        })?;

        let expected = base.path_sequence(base_path);
        let observed = assembled.path_sequence(path);
        if expected != observed {
            let expected = String::from_utf8_lossy(&expected);
            let observed = String::from_utf8_lossy(&observed);
            error!(
                "Path '{}' does not match the input graph\nexpected: {}\nobserved: {}",
                name, expected, observed
            );
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Path '{}' does not match the input graph\nexpected: {}\nobserved: {}",
                    name, expected, observed
                ),
            ));
        }
    }
    debug!("All {} base paths verified", base.path_count());
    Ok(())
}

/// Check that consecutive steps of every path are joined by an edge.
pub fn verify_embedding(graph: &SequenceGraph) -> io::Result<()> {
    for path in graph.path_ids() {
        for (rank, pair) in graph.path_steps(path).windows(2).enumerate() {
            if !graph.has_edge(pair[0], pair[1]) {
                let name = graph.path_name(path);
                error!(
                    "Path '{}' steps {} and {} are not joined by an edge",
                    name,
                    rank,
                    rank + 1
                );
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "Path '{}' has no edge between steps {} ({}{}) and {} ({}{})",
                        name,
                        rank,
                        pair[0].id() + 1,
                        if pair[0].is_reverse() { '-' } else { '+' },
                        rank + 1,
                        pair[1].id() + 1,
                        if pair[1].is_reverse() { '-' } else { '+' },
                    ),
                ));
            }
        }
    }
    Ok(())
}
