use crate::graph::{Handle, PathGraph, SequenceGraph};
use rustc_hash::FxHashMap;
use std::io::{self, BufRead, Write};

/// Parse GFA v1 (`S`, `L`, `P`, plus GFA v1.1 `W` walks) into a graph.
///
/// Segment names are mapped to dense node ids in the order segments appear,
/// so links and paths may reference segments declared later in the file.
/// Overlaps are ignored; all other record types are skipped.
pub fn parse_gfa<R: BufRead>(reader: R) -> io::Result<SequenceGraph> {
    let mut graph = SequenceGraph::new();
    let mut segment_ids: FxHashMap<String, usize> = FxHashMap::default();
    let mut links: Vec<(String, bool, String, bool)> = Vec::new();
    let mut paths: Vec<(String, Vec<(String, bool)>)> = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.starts_with("S\t") {
            let fields: Vec<&str> = line.splitn(4, '\t').collect();
            if fields.len() < 3 {
                return Err(malformed(line_no, "segment line needs a name and a sequence"));
            }
            if segment_ids.contains_key(fields[1]) {
                return Err(malformed(
                    line_no,
                    &format!("segment '{}' declared twice", fields[1]),
                ));
            }
            let sequence = if fields[2] == "*" {
                Vec::new()
            } else {
                fields[2].as_bytes().to_vec()
            };
            let handle = graph.create_node(sequence);
            segment_ids.insert(fields[1].to_string(), handle.id());
        } else if line.starts_with("L\t") {
            let fields: Vec<&str> = line.splitn(7, '\t').collect();
            if fields.len() < 5 {
                return Err(malformed(line_no, "link line needs two oriented segments"));
            }
            links.push((
                fields[1].to_string(),
                parse_orientation(fields[2], line_no)?,
                fields[3].to_string(),
                parse_orientation(fields[4], line_no)?,
            ));
        } else if line.starts_with("P\t") {
            let fields: Vec<&str> = line.splitn(4, '\t').collect();
            if fields.len() < 3 {
                return Err(malformed(line_no, "path line needs a name and steps"));
            }
            paths.push((fields[1].to_string(), parse_path_steps(fields[2], line_no)?));
        } else if line.starts_with("W\t") {
            let fields: Vec<&str> = line.splitn(8, '\t').collect();
            if fields.len() < 7 {
                return Err(malformed(line_no, "walk line needs seven fields"));
            }
            // PanSN name: sample#haplotype#sequence
            let name = format!("{}#{}#{}", fields[1], fields[2], fields[3]);
            paths.push((name, parse_walk_steps(fields[6], line_no)?));
        }
    }

    let lookup = |name: &str, is_reverse: bool| -> io::Result<Handle> {
        segment_ids
            .get(name)
            .map(|&id| Handle::new(id, is_reverse))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Segment '{}' is referenced but never declared", name),
                )
            })
    };

    for (from, from_rev, to, to_rev) in &links {
        graph.create_edge(lookup(from, *from_rev)?, lookup(to, *to_rev)?);
    }

    for (name, steps) in &paths {
        let path = graph.create_path(name)?;
        for (segment, is_reverse) in steps {
            let handle = lookup(segment, *is_reverse)?;
            graph.append_step(path, handle);
        }
    }

    Ok(graph)
}

/// Write the graph as GFA v1 with 1-based numeric segment names.
pub fn write_gfa<W: Write>(graph: &SequenceGraph, writer: &mut W) -> io::Result<()> {
    writeln!(writer, "H\tVN:Z:1.0")?;
    for id in 0..graph.node_count() {
        writer.write_all(format!("S\t{}\t", id + 1).as_bytes())?;
        writer.write_all(graph.node_sequence(id))?;
        writer.write_all(b"\n")?;
    }
    for &(from, to) in graph.edges() {
        writeln!(
            writer,
            "L\t{}\t{}\t{}\t{}\t0M",
            from.id() + 1,
            orientation_char(from),
            to.id() + 1,
            orientation_char(to)
        )?;
    }
    for path in graph.path_ids() {
        let steps: Vec<String> = graph
            .path_steps(path)
            .iter()
            .map(|h| format!("{}{}", h.id() + 1, orientation_char(*h)))
            .collect();
        writeln!(
            writer,
            "P\t{}\t{}\t*",
            graph.path_name(path),
            steps.join(",")
        )?;
    }
    Ok(())
}

/// Render the graph as a GFA string.
pub fn to_gfa_string(graph: &SequenceGraph) -> io::Result<String> {
    let mut buffer = Vec::new();
    write_gfa(graph, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Graph contains non UTF-8 sequence: {}", e),
        )
    })
}

/// Parse a GFA path step list like "12+,5-".
pub(crate) fn parse_path_steps(steps: &str, line_no: usize) -> io::Result<Vec<(String, bool)>> {
    if steps.is_empty() || steps == "*" {
        return Ok(Vec::new());
    }
    steps
        .split(',')
        .map(|step| {
            if let Some(segment) = step.strip_suffix('+') {
                Ok((segment.to_string(), false))
            } else if let Some(segment) = step.strip_suffix('-') {
                Ok((segment.to_string(), true))
            } else {
                Err(malformed(
                    line_no,
                    &format!("missing segment orientation in step '{}'", step),
                ))
            }
        })
        .collect()
}

/// Parse a GFA v1.1 walk like ">s1<s2>s3".
pub(crate) fn parse_walk_steps(walk: &str, line_no: usize) -> io::Result<Vec<(String, bool)>> {
    let mut steps = Vec::new();
    let mut current: Option<(String, bool)> = None;
    for c in walk.chars() {
        match c {
            '>' | '<' => {
                if let Some(step) = current.take() {
                    steps.push(step);
                }
                current = Some((String::new(), c == '<'));
            }
            _ => match current.as_mut() {
                Some((segment, _)) => segment.push(c),
                None => {
                    return Err(malformed(
                        line_no,
                        &format!("walk '{}' must start with '>' or '<'", walk),
                    ))
                }
            },
        }
    }
    if let Some(step) = current {
        steps.push(step);
    }
    Ok(steps)
}

fn parse_orientation(field: &str, line_no: usize) -> io::Result<bool> {
    match field {
        "+" => Ok(false),
        "-" => Ok(true),
        _ => Err(malformed(
            line_no,
            &format!("invalid orientation '{}'", field),
        )),
    }
}

fn orientation_char(handle: Handle) -> char {
    if handle.is_reverse() {
        '-'
    } else {
        '+'
    }
}

fn malformed(line_no: usize, reason: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Malformed GFA at line {}: {}", line_no + 1, reason),
    )
}
