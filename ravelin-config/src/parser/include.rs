//! Include resolution
//!
//! `Include` and `IncludeIfExists` are parse directives: they run while the
//! tree is being built, attaching the included file's subtree under the
//! directive node itself. Cycle detection walks the ancestor chain of parse
//! directives and rejects a site whose (file, line) is already active. The
//! key is the include site, not the resolved path, so merely redundant
//! inclusion is allowed while infinite recursion is not.
//!
//! No failure here ever aborts the including file. A missing required
//! include is recorded and parsing continues; an optional one is skipped
//! quietly.

use crate::error::ConfError;
use crate::parser::feeder;
use crate::parser::session::ConfParser;
use crate::parser::tree::{NodeId, NodeKind};
use std::path::{Path, PathBuf};

pub(crate) fn execute(parser: &mut ConfParser, node: NodeId, required: bool) {
    let directive_node = parser.tree.node(node);
    let pos = directive_node.pos();
    let directive = directive_node.name.clone();

    if directive_node.params.len() != 1 {
        let got = directive_node.params.len();
        parser.record_error(ConfError::Structural {
            pos,
            message: format!("{directive} expects exactly 1 parameter, got {got}"),
        });
        return;
    }
    let raw = directive_node.params[0].clone();

    let resolved = resolve(&parser.base_dir, &raw);

    if let Some(chain) = find_cycle(parser, node) {
        parser.record_error(ConfError::IncludeCycle { pos, chain });
        return;
    }

    match std::fs::metadata(&resolved) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => {
            if required {
                parser.record_error(ConfError::Io {
                    path: resolved.display().to_string(),
                    source: std::io::Error::other("not a regular file"),
                });
            } else {
                tracing::debug!("{pos}: optional include {} skipped: not a regular file", resolved.display());
            }
            return;
        }
        Err(source) => {
            if required {
                parser.record_error(ConfError::Io {
                    path: resolved.display().to_string(),
                    source,
                });
            } else {
                tracing::debug!("{pos}: optional include {} skipped: {source}", resolved.display());
            }
            return;
        }
    }

    tracing::debug!("{pos}: including {}", resolved.display());
    let depth = parser.scanner.depth() + 1;
    if let Err(err) = feeder::feed_file(parser, &resolved, node, depth) {
        // A failed include never unwinds the including file; for a required
        // include the session's error count still reflects it.
        if required {
            parser.record_error(err);
        } else {
            tracing::debug!("{pos}: optional include {} failed: {err}", resolved.display());
        }
    }
}

/// Resolve relative to the including file's own directory, not the process
/// working directory.
fn resolve(base_dir: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Walk the ancestor parse directives of `node`; if one shares its (file,
/// line), return the include chain for diagnostics.
fn find_cycle(parser: &ConfParser, node: NodeId) -> Option<String> {
    let target = parser.tree.node(node);
    let mut sites = vec![target.pos()];
    let mut cycle = false;

    for ancestor_id in parser.tree.ancestors(node) {
        let ancestor = parser.tree.node(ancestor_id);
        if ancestor.kind != NodeKind::ParseDirective {
            continue;
        }
        sites.push(ancestor.pos());
        if ancestor.file == target.file && ancestor.line == target.line {
            cycle = true;
            break;
        }
    }

    if !cycle {
        return None;
    }
    sites.reverse();
    let chain: Vec<String> = sites.iter().map(ToString::to_string).collect();
    Some(chain.join(" -> "))
}
