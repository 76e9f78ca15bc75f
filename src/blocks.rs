use crate::graph::{PathGraph, Step};
use log::warn;
use std::io::{self, BufRead};

/// Half-open step range `[begin, end)` on one path of the base graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathRange {
    pub begin: Step,
    pub end: Step,
}

/// A collinear region selected for realignment: an ordered list of path ranges.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
    pub path_ranges: Vec<PathRange>,
}

impl Block {
    pub fn new(path_ranges: Vec<PathRange>) -> Self {
        Block { path_ranges }
    }
}

/// Read blocks from a tab-separated list: `block_id  path_name  begin  end`,
/// where `begin`/`end` are 0-based step ranks of a half-open range.
///
/// Ranges keep their file order inside each block. Block ids index the
/// returned vector; ids that never appear become empty blocks. Every id must
/// be below the number of data lines, which bounds the vector's size.
pub fn parse_blocks<R: BufRead, G: PathGraph>(reader: R, graph: &G) -> io::Result<Vec<Block>> {
    // (line number, block id, range)
    let mut rows: Vec<(usize, usize, PathRange)> = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = trimmed.split('\t').collect();
        if parts.len() < 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Invalid block line {}: expected 'block_id<TAB>path<TAB>begin<TAB>end'",
                    line_no + 1
                ),
            ));
        }

        let parse_field = |value: &str, what: &str| -> io::Result<usize> {
            value.parse::<usize>().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Invalid {} '{}' on block line {}", what, value, line_no + 1),
                )
            })
        };
        let block_id = parse_field(parts[0], "block id")?;
        let begin = parse_field(parts[2], "begin step")?;
        let end = parse_field(parts[3], "end step")?;

        let path = graph.path_by_name(parts[1]).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Path '{}' on block line {} not found in graph",
                    parts[1],
                    line_no + 1
                ),
            )
        })?;
        let step_count = graph.path_end(path).rank;
        if begin > end || end > step_count {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Step range {}-{} on block line {} is invalid for path '{}' with {} steps",
                    begin,
                    end,
                    line_no + 1,
                    parts[1],
                    step_count
                ),
            ));
        }

        rows.push((
            line_no + 1,
            block_id,
            PathRange {
                begin: Step { path, rank: begin },
                end: Step { path, rank: end },
            },
        ));
    }

    let mut blocks: Vec<Block> = Vec::new();
    for (line, block_id, range) in rows.iter().copied() {
        let block_count = block_id
            .checked_add(1)
            .filter(|&count| count <= rows.len())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "Block id {} on block line {} must be below the number of block lines ({})",
                        block_id,
                        line,
                        rows.len()
                    ),
                )
            })?;
        if block_count > blocks.len() {
            blocks.resize_with(block_count, Block::default);
        }
        blocks[block_id].path_ranges.push(range);
    }

    let empty = blocks.iter().filter(|b| b.path_ranges.is_empty()).count();
    if empty > 0 {
        warn!("{} of {} block ids have no path ranges", empty, blocks.len());
    }

    Ok(blocks)
}
