use crate::poa::AlignmentMode;
use std::io::{self, Write};

/// One sequence line of a MAF alignment block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MafRow {
    /// Source path name.
    pub name: String,
    /// 0-based start on the strand the row is written on.
    pub start: usize,
    pub strand: char,
    /// Length of the source path.
    pub src_size: usize,
    /// Gapped alignment text, `-` for gaps.
    pub text: Vec<u8>,
}

/// Alignment of one smoothed block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MafBlock {
    pub block_id: usize,
    pub rows: Vec<MafRow>,
}

/// File header: format line plus provenance comments.
pub fn write_maf_header<W: Write>(
    writer: &mut W,
    input: &str,
    sequences: usize,
    mode: AlignmentMode,
    scoring: &str,
) -> io::Result<()> {
    writeln!(writer, "##maf version=1")?;
    writeln!(writer, "# blocklace")?;
    writeln!(writer, "# input={} sequences={}", input, sequences)?;
    writeln!(
        writer,
        "# POA=SPOA alignment_mode={} scoring={}",
        mode.as_str(),
        scoring
    )?;
    writeln!(writer)
}

/// Write one block, trimming columns that are gaps in every row. Sizes count
/// the non-gap characters left after trimming.
pub fn write_maf_block<W: Write>(writer: &mut W, block: &MafBlock) -> io::Result<()> {
    if block.rows.is_empty() {
        return Ok(());
    }
    let width = block.rows.iter().map(|r| r.text.len()).max().unwrap_or(0);
    let occupied = |col: usize| {
        block
            .rows
            .iter()
            .any(|r| r.text.get(col).map_or(false, |&c| c != b'-'))
    };
    let start_trim = (0..width).find(|&c| occupied(c)).unwrap_or(width);
    let end_trim = (start_trim..width)
        .rev()
        .find(|&c| occupied(c))
        .map_or(start_trim, |c| c + 1);

    writeln!(writer, "a score=0.0 block={}", block.block_id)?;
    for row in &block.rows {
        let lo = start_trim.min(row.text.len());
        let hi = end_trim.min(row.text.len());
        let mut text = row.text[lo..hi].to_vec();
        text.resize(end_trim - start_trim, b'-');
        let size = text.iter().filter(|&&c| c != b'-').count();
        writeln!(
            writer,
            "s {} {} {} {} {} {}",
            row.name,
            row.start,
            size,
            row.strand,
            row.src_size,
            String::from_utf8_lossy(&text)
        )?;
    }
    writeln!(writer)
}
