//! Process tree reconstruction
//!
//! Rebuilds the spawn tree from the completed spawn log and renders it. Run
//! once by the root after its direct child has been reaped, which (since
//! every process reaps all of its own children) means every log write has
//! already happened.
//!
//! The log is CSV-like, `<parent>,<child>` per line:
//!
//! ```text
//! 1234,5678
//! 5678,5680
//! 5678,5681
//! 5680,5690
//! ```
//!
//! which becomes `1234 => [5678]`, `5678 => [5680, 5681]`, `5680 => [5690]`
//! and is displayed in that shape.

use crate::core::models::{ProcessTree, SpawnRecord};
use crate::error::{ForkTreeError, ForkTreeResult};
use std::io::{self, Write};
use std::path::Path;

/// Parse a whole log. Any malformed line fails the build; nothing is skipped.
pub fn build(log: &str) -> ForkTreeResult<ProcessTree> {
    let records = log
        .lines()
        .enumerate()
        .map(|(idx, line)| parse_record(idx + 1, line))
        .collect::<ForkTreeResult<Vec<_>>>()?;
    Ok(ProcessTree::from_records(records))
}

pub fn build_from_path(path: &Path) -> ForkTreeResult<ProcessTree> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| ForkTreeError::io("read spawn log", path, err))?;
    build(&content)
}

/// Parse one `<parent>,<child>` line. Fields past the second are ignored.
pub fn parse_record(line_number: usize, line: &str) -> ForkTreeResult<SpawnRecord> {
    let malformed = |reason: String| ForkTreeError::MalformedRecord {
        line_number,
        line: line.to_string(),
        reason,
    };

    let mut fields = line.split(',');
    let (parent, child) = match (fields.next(), fields.next()) {
        (Some(parent), Some(child)) => (parent, child),
        _ => return Err(malformed("expected two comma-separated fields".to_string())),
    };

    let parse_id = |field: &str, name: &str| {
        field
            .trim()
            .parse::<u32>()
            .map_err(|err| malformed(format!("{} id {:?}: {}", name, field.trim(), err)))
    };

    Ok(SpawnRecord::new(
        parse_id(parent, "parent")?,
        parse_id(child, "child")?,
    ))
}

/// Write each parent on its own line with its children indented beneath.
pub fn render<W: Write>(tree: &ProcessTree, out: &mut W) -> io::Result<()> {
    for (parent, children) in tree.iter() {
        writeln!(out, "{}", parent)?;
        for child in children {
            writeln!(out, "  |-> {}", child)?;
        }
    }
    out.flush()
}

pub fn render_to_string(tree: &ProcessTree) -> String {
    let mut buffer = Vec::new();
    // writing into a Vec cannot fail
    let _ = render(tree, &mut buffer);
    String::from_utf8_lossy(&buffer).into_owned()
}
