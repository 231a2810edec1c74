//! Tree application
//!
//! Walks a finished parse tree depth-first and drives a [`Dispatcher`].
//! Synthetic nodes and parse directives only recurse; parse directives
//! already ran during construction and are never re-executed here. A
//! dispatcher failure is logged and remembered, but never stops the walk:
//! sibling subtrees are always applied, and the first failure is returned
//! once the whole tree has been visited.

use crate::error::{ApplyError, SourcePos};
use crate::parser::session::ConfParser;
use crate::parser::tree::{NodeId, NodeKind};
use ravelin_core::{DispatchError, Dispatcher};

pub(crate) fn apply_tree(
    parser: &mut ConfParser,
    dispatcher: &mut dyn Dispatcher,
) -> Result<(), ApplyError> {
    let root = parser.tree.root();
    let mut first = None;
    apply_node(parser, dispatcher, root, &mut first);
    match first {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn apply_node(
    parser: &mut ConfParser,
    dispatcher: &mut dyn Dispatcher,
    id: NodeId,
    first: &mut Option<ApplyError>,
) {
    let node = parser.tree.node(id);
    match node.kind {
        NodeKind::Root | NodeKind::File | NodeKind::ParseDirective => {
            let children = node.children.clone();
            for child in children {
                apply_node(parser, dispatcher, child, first);
            }
        }
        NodeKind::Directive => {
            debug_assert!(node.children.is_empty(), "directive nodes are leaves");
            let name = node.name.clone();
            let params = node.params.clone();
            let pos = node.pos();

            let saved = std::mem::replace(&mut parser.cursor, id);
            if let Err(source) = dispatcher.process_directive(&name, &params) {
                note(first, pos, source);
            }
            parser.cursor = saved;
        }
        NodeKind::Block => {
            let name = node.name.clone();
            let params = node.params.clone();
            let pos = node.pos();
            let children = node.children.clone();

            let saved = std::mem::replace(&mut parser.cursor, id);
            if let Err(source) = dispatcher.start_block(&name, &params) {
                note(first, pos.clone(), source);
            }
            for child in children {
                apply_node(parser, dispatcher, child, first);
            }
            // The cursor moved while the children applied; point it back at
            // the block for the closing callback.
            parser.cursor = id;
            if let Err(source) = dispatcher.end_block(&name) {
                note(first, pos, source);
            }
            parser.cursor = saved;
        }
    }
}

fn note(first: &mut Option<ApplyError>, pos: SourcePos, source: DispatchError) {
    tracing::warn!("{pos}: {source}");
    if first.is_none() {
        *first = Some(ApplyError::Dispatch { pos, source });
    }
}
