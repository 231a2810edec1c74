//! Parser session
//!
//! [`ConfParser`] owns everything a single configuration load needs: the
//! scanner, the tree arena, the current-node cursor, the directory relative
//! includes resolve against, and the accumulated error state. The cursor is
//! shared between tree construction and tree application; both use it to
//! attribute errors to a file and line.

use crate::error::{ApplyError, ConfError, ConfResult, SourcePos};
use crate::parser::apply;
use crate::parser::feeder;
use crate::parser::include;
use crate::parser::scanner::{ScanEvent, ScanFault, Scanner};
use crate::parser::tree::{FILE_NAME, NodeId, NodeKind, ParseTree};
use ravelin_core::Dispatcher;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directives executed during tree construction instead of application.
/// Matched case-insensitively, unlike registry lookup.
enum ParseDirectiveKind {
    Include { required: bool },
    LogLevel,
}

fn parse_directive_kind(name: &str) -> Option<ParseDirectiveKind> {
    if name.eq_ignore_ascii_case("include") {
        Some(ParseDirectiveKind::Include { required: true })
    } else if name.eq_ignore_ascii_case("includeifexists") {
        Some(ParseDirectiveKind::Include { required: false })
    } else if name.eq_ignore_ascii_case("loglevel") {
        Some(ParseDirectiveKind::LogLevel)
    } else {
        None
    }
}

/// A parser session: one configuration load, one owning arena.
///
/// All nodes and parameter strings stay valid until the session is dropped,
/// however many nested includes were processed.
pub struct ConfParser {
    pub(crate) tree: ParseTree,
    pub(crate) scanner: Scanner,
    /// Current node, for attribution of new nodes and errors
    pub(crate) cursor: NodeId,
    /// File node input is currently being attached under
    pub(crate) entry: NodeId,
    /// Directory relative includes resolve against
    pub(crate) base_dir: PathBuf,
    pub(crate) current_file: Arc<str>,
    errors: Vec<ConfError>,
    log_level: u8,
}

impl ConfParser {
    fn with_root() -> Self {
        let tree = ParseTree::new();
        let root = tree.root();
        Self {
            tree,
            scanner: Scanner::new(),
            cursor: root,
            entry: root,
            base_dir: PathBuf::from("."),
            current_file: Arc::from(""),
            errors: Vec::new(),
            log_level: 3,
        }
    }

    /// Session fed incrementally through [`ConfParser::feed`]. Relative
    /// includes resolve against the process working directory.
    pub fn new(label: impl Into<String>) -> Self {
        let mut parser = Self::with_root();
        let file: Arc<str> = Arc::from(label.into());
        let root = parser.tree.root();
        let entry = parser.tree.add_child(
            root,
            NodeKind::File,
            FILE_NAME.to_string(),
            Vec::new(),
            file.clone(),
            0,
        );
        parser.cursor = entry;
        parser.entry = entry;
        parser.current_file = file;
        parser
    }

    /// Parse a policy file, following includes.
    ///
    /// Only a top-level open/read failure is fatal; scanner and structural
    /// errors are accumulated and available through [`ConfParser::errors`].
    pub fn parse(path: impl AsRef<Path>) -> ConfResult<Self> {
        let mut parser = Self::with_root();
        let root = parser.tree.root();
        feeder::feed_file(&mut parser, path.as_ref(), root, 0)?;
        Ok(parser)
    }

    /// Parse an in-memory policy in one shot
    pub fn parse_source(label: impl Into<String>, source: &[u8]) -> Self {
        let mut parser = Self::new(label);
        parser.feed(source, true);
        parser
    }

    /// Feed one chunk of input to a streaming session. Pass `last = true`
    /// exactly once; that is when dangling constructs become errors.
    pub fn feed(&mut self, chunk: &[u8], last: bool) {
        let events = self.scanner.feed(chunk, last);
        self.handle_events(events);
        if last {
            let entry = self.entry;
            self.finish_file(entry);
            self.cursor = entry;
        }
    }

    /// Apply the finished tree to a dispatcher.
    ///
    /// Errors never stop the walk; the first one is returned once every
    /// subtree has been visited.
    pub fn apply(&mut self, dispatcher: &mut dyn Dispatcher) -> Result<(), ApplyError> {
        apply::apply_tree(self, dispatcher)
    }

    pub fn tree(&self) -> &ParseTree {
        &self.tree
    }

    /// Errors accumulated while parsing, in detection order
    pub fn errors(&self) -> &[ConfError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Remove and return the first accumulated error
    pub fn take_first_error(&mut self) -> Option<ConfError> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.remove(0))
        }
    }

    /// Diagnostic level set by the `LogLevel` parse directive
    pub fn log_level(&self) -> u8 {
        self.log_level
    }

    /// Position of the current node, for error attribution
    pub fn cursor_pos(&self) -> SourcePos {
        self.tree.node(self.cursor).pos()
    }

    pub(crate) fn record_error(&mut self, err: ConfError) {
        tracing::error!("{err}");
        self.errors.push(err);
    }

    pub(crate) fn handle_events(&mut self, events: Vec<ScanEvent>) {
        for event in events {
            match event {
                ScanEvent::Directive { name, params, line } => {
                    self.handle_directive(name, params, line);
                }
                ScanEvent::BlockOpen { name, params, line } => {
                    let id = self.tree.add_child(
                        self.cursor,
                        NodeKind::Block,
                        name,
                        params,
                        self.current_file.clone(),
                        line,
                    );
                    self.cursor = id;
                }
                ScanEvent::BlockClose { name, line } => {
                    self.handle_block_close(&name, line);
                }
                ScanEvent::Error {
                    fault,
                    message,
                    line,
                } => {
                    let pos = SourcePos::new(self.current_file.clone(), line);
                    let err = match fault {
                        ScanFault::Syntax => ConfError::Syntax { pos, message },
                        ScanFault::Structural => ConfError::Structural { pos, message },
                        ScanFault::Resource => ConfError::Resource { pos, message },
                    };
                    self.record_error(err);
                }
            }
        }
    }

    fn handle_directive(&mut self, name: String, params: Vec<String>, line: u32) {
        let kind = parse_directive_kind(&name);
        let id = self.tree.add_child(
            self.cursor,
            NodeKind::Directive,
            name,
            params,
            self.current_file.clone(),
            line,
        );

        // Parse directives are reclassified and executed immediately, as a
        // side effect of tree construction.
        if let Some(kind) = kind {
            self.tree.set_kind(id, NodeKind::ParseDirective);
            match kind {
                ParseDirectiveKind::Include { required } => include::execute(self, id, required),
                ParseDirectiveKind::LogLevel => self.set_log_level(id),
            }
        }
    }

    fn handle_block_close(&mut self, name: &str, line: u32) {
        let node = self.tree.node(self.cursor);
        let pos = SourcePos::new(self.current_file.clone(), line);

        if node.kind != NodeKind::Block {
            self.record_error(ConfError::Structural {
                pos,
                message: format!("closing tag '</{name}>' without a matching open"),
            });
            return;
        }

        if node.name.eq_ignore_ascii_case(name) {
            if let Some(parent) = node.parent {
                self.cursor = parent;
            }
        } else {
            let open_name = node.name.clone();
            let open_pos = node.pos();
            self.record_error(ConfError::Structural {
                pos,
                message: format!(
                    "mismatched closing tag '</{name}>' for block '<{open_name}>' opened at {open_pos}"
                ),
            });
        }
    }

    fn set_log_level(&mut self, id: NodeId) {
        let node = self.tree.node(id);
        let pos = node.pos();

        if node.params.len() != 1 {
            let got = node.params.len();
            self.record_error(ConfError::Structural {
                pos,
                message: format!("LogLevel expects exactly 1 parameter, got {got}"),
            });
            return;
        }

        let value = node.params[0].clone();
        match value.parse::<u8>() {
            Ok(level) if level <= 9 => {
                tracing::debug!("{pos}: log level set to {level}");
                self.log_level = level;
            }
            _ => {
                self.record_error(ConfError::Structural {
                    pos,
                    message: format!("LogLevel must be 0..=9, got '{value}'"),
                });
            }
        }
    }

    /// Final-chunk check: the cursor must be back at the file node, or some
    /// block was left open.
    pub(crate) fn finish_file(&mut self, target: NodeId) {
        while self.cursor != target {
            let node = self.tree.node(self.cursor);
            let name = node.name.clone();
            let pos = node.pos();
            let parent = node.parent;
            self.record_error(ConfError::Structural {
                pos,
                message: format!("unclosed <{name}> block at end of input"),
            });
            match parent {
                Some(parent) => self.cursor = parent,
                None => break,
            }
        }
    }
}
