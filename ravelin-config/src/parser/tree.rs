//! Directive parse tree
//!
//! The tree is an index arena owned by the parser session: nodes live in a
//! single `Vec` addressed by [`NodeId`], parent links are ids rather than
//! pointers, and nothing is freed until the session itself is dropped. Every
//! parameter string is deep-copied out of the scan buffer before it lands
//! here, so the tree never references transient chunk memory.

use crate::error::SourcePos;
use std::sync::Arc;

/// Synthetic name of the root node
pub const ROOT_NAME: &str = "[root]";
/// Synthetic name of a file node
pub const FILE_NAME: &str = "[file]";

/// Handle to a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Node classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    File,
    Directive,
    /// A directive executed at tree-construction time (`Include`,
    /// `IncludeIfExists`, `LogLevel`); skipped by the applicator.
    ParseDirective,
    Block,
}

impl NodeKind {
    fn as_str(self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::File => "file",
            NodeKind::Directive => "directive",
            NodeKind::ParseDirective => "parse_directive",
            NodeKind::Block => "block",
        }
    }
}

/// A node in the directive tree
#[derive(Debug)]
pub struct ParseNode {
    pub kind: NodeKind,
    pub name: String,
    pub params: Vec<String>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    pub file: Arc<str>,
    pub line: u32,
}

impl ParseNode {
    /// Source position of this node
    pub fn pos(&self) -> SourcePos {
        SourcePos::new(self.file.clone(), self.line)
    }
}

/// Arena-backed directive tree
#[derive(Debug)]
pub struct ParseTree {
    nodes: Vec<ParseNode>,
    root: NodeId,
}

impl ParseTree {
    pub fn new() -> Self {
        let root = ParseNode {
            kind: NodeKind::Root,
            name: ROOT_NAME.to_string(),
            params: Vec::new(),
            children: Vec::new(),
            parent: None,
            file: Arc::from(""),
            line: 0,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &ParseNode {
        &self.nodes[id.index()]
    }

    /// Total node count, synthetic nodes included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Append a child under `parent`. Directive nodes are leaves; attaching
    /// under one is a bug in the builder, not in the input.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        name: String,
        params: Vec<String>,
        file: Arc<str>,
        line: u32,
    ) -> NodeId {
        debug_assert!(
            !matches!(self.node(parent).kind, NodeKind::Directive),
            "directive nodes cannot have children"
        );

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(ParseNode {
            kind,
            name,
            params,
            children: Vec::new(),
            parent: Some(parent),
            file,
            line,
        });
        self.nodes[parent.index()].children.push(id);
        id
    }

    /// Reclassify a node (Directive -> ParseDirective on recognition)
    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes[id.index()].kind = kind;
    }

    /// Walk from `id` towards the root, excluding `id` itself
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.node(id).parent,
        }
    }

    /// Number of Directive/ParseDirective/Block nodes
    pub fn statement_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| !matches!(n.kind, NodeKind::Root | NodeKind::File))
            .count()
    }

    /// Nested JSON rendering of the tree, used by `ravelin tree`
    pub fn to_json(&self) -> serde_json::Value {
        self.node_json(self.root)
    }

    fn node_json(&self, id: NodeId) -> serde_json::Value {
        let node = self.node(id);
        let children: Vec<serde_json::Value> = node
            .children
            .iter()
            .map(|child| self.node_json(*child))
            .collect();

        serde_json::json!({
            "kind": node.kind.as_str(),
            "name": node.name,
            "params": node.params,
            "file": &*node.file,
            "line": node.line,
            "children": children,
        })
    }
}

impl Default for ParseTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a node's ancestor chain
pub struct Ancestors<'a> {
    tree: &'a ParseTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.tree.node(id).parent;
        Some(id)
    }
}
