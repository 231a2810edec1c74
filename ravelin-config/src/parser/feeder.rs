//! Chunk feeder
//!
//! Reads a policy file in fixed-size chunks and drives the scanner. The
//! session's cursor, include directory, entry node, and scanner state are
//! saved around the call and restored afterwards, so a nested include
//! returns control to the outer file with its context intact. Skipping any
//! of these would corrupt file/line attribution for everything parsed after
//! the include.

use crate::error::{ConfError, ConfResult};
use crate::parser::scanner::{NESTING_LIMIT, Scanner};
use crate::parser::session::ConfParser;
use crate::parser::tree::{FILE_NAME, NodeId, NodeKind};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub(crate) const CHUNK_SIZE: usize = 8192;

/// Parse one file into a fresh file node under `parent`. `depth` is the
/// nesting budget already consumed by enclosing blocks and includes.
pub(crate) fn feed_file(
    parser: &mut ConfParser,
    path: &Path,
    parent: NodeId,
    depth: usize,
) -> ConfResult<()> {
    if depth > NESTING_LIMIT {
        return Err(ConfError::Resource {
            pos: parser.cursor_pos(),
            message: format!("include nesting exceeds {NESTING_LIMIT} levels"),
        });
    }

    let mut file = File::open(path).map_err(|source| ConfError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let label: Arc<str> = Arc::from(path.to_string_lossy().as_ref());
    let file_node = parser.tree.add_child(
        parent,
        NodeKind::File,
        FILE_NAME.to_string(),
        Vec::new(),
        label.clone(),
        0,
    );

    let base_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let saved_scanner = std::mem::replace(&mut parser.scanner, Scanner::with_depth(depth));
    let saved_cursor = std::mem::replace(&mut parser.cursor, file_node);
    let saved_entry = std::mem::replace(&mut parser.entry, file_node);
    let saved_dir = std::mem::replace(&mut parser.base_dir, base_dir);
    let saved_file = std::mem::replace(&mut parser.current_file, label);

    let result = pump(parser, &mut file, path, file_node);

    parser.scanner = saved_scanner;
    parser.cursor = saved_cursor;
    parser.entry = saved_entry;
    parser.base_dir = saved_dir;
    parser.current_file = saved_file;

    result
}

fn pump(
    parser: &mut ConfParser,
    reader: &mut File,
    path: &Path,
    file_node: NodeId,
) -> ConfResult<()> {
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let read = reader.read(&mut buf).map_err(|source| ConfError::Io {
            path: path.display().to_string(),
            source,
        })?;
        // A zero-length read is the final chunk
        let last = read == 0;
        let events = parser.scanner.feed(&buf[..read], last);
        parser.handle_events(events);
        if last {
            break;
        }
    }
    parser.finish_file(file_node);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_file_larger_than_one_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.conf");
        let mut out = File::create(&path).unwrap();
        // Enough directives to span several 8 KiB chunks
        let lines = 2000;
        for i in 0..lines {
            writeln!(out, "SetVar key{i} \"some padding value {i}\"").unwrap();
        }
        drop(out);

        let parser = ConfParser::parse(&path).unwrap();
        assert!(!parser.has_errors());
        assert_eq!(parser.tree().statement_count(), lines);
    }

    #[test]
    fn test_top_level_open_failure_is_fatal() {
        let result = ConfParser::parse("/nonexistent/ravelin.conf");
        assert!(matches!(result, Err(ConfError::Io { .. })));
    }

    #[test]
    fn test_file_node_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waf.conf");
        std::fs::write(&path, "RuleEngine On\n").unwrap();

        let parser = ConfParser::parse(&path).unwrap();
        let tree = parser.tree();
        let file = tree.node(tree.node(tree.root()).children[0]);
        assert_eq!(file.kind, NodeKind::File);
        assert!(file.file.ends_with("waf.conf"));

        let directive = tree.node(file.children[0]);
        assert_eq!(directive.line, 1);
        assert!(directive.file.ends_with("waf.conf"));
    }
}
