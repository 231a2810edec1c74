//! Resumable tokenizer for the policy configuration language
//!
//! A hand-written state machine that consumes input one bounded chunk at a
//! time and emits commit events (directive, block open, block close) as
//! statements complete. Token bytes are copied into an internal side buffer
//! as they are matched, so a token split across two chunks resumes
//! transparently and nothing references the caller's buffer after
//! [`Scanner::feed`] returns.
//!
//! Escapes are resolved on commit, not during scanning: the buffer holds the
//! raw `\X` pairs until a parameter completes. Two-byte lookahead points
//! (backslash, carriage return) are explicit states so a chunk boundary can
//! fall between any pair of bytes.

/// Upper bound on a single token, in bytes
const TOKEN_LIMIT: usize = 8192;

/// Shared nesting budget covering both block depth and include recursion
pub const NESTING_LIMIT: usize = 1024;

/// Classification of a scanner-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFault {
    Syntax,
    Structural,
    Resource,
}

/// Commit events produced by the scanner
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Directive {
        name: String,
        params: Vec<String>,
        line: u32,
    },
    BlockOpen {
        name: String,
        params: Vec<String>,
        line: u32,
    },
    BlockClose {
        name: String,
        line: u32,
    },
    Error {
        fault: ScanFault,
        message: String,
        line: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between statements, before a directive name
    Main,
    /// Inside a `#` comment
    Comment,
    /// Discarding the rest of a line after an error
    Recover,
    /// Accumulating a directive name
    Name,
    /// Between parameters of a directive
    Params,
    /// Accumulating an unquoted parameter
    Bare,
    /// Inside a quoted parameter
    Quoted,
    /// Saw `<`, deciding between an opening and a closing tag
    TagStart,
    /// Accumulating a block name after `<`
    BlockName,
    /// Between parameters inside an opening tag
    BlockParams,
    /// Accumulating an unquoted parameter inside an opening tag
    BlockBare,
    /// Inside a quoted parameter inside an opening tag
    BlockQuoted,
    /// Accumulating a block name after `</`
    CloseName,
    /// Skipping whitespace before the `>` of a closing tag
    CloseEnd,
    /// Saw `\`, waiting for the escaped byte
    Escape,
    /// Saw `\` then `\r`, waiting for the `\n` of a continuation
    EscapeCr,
    /// Saw `\r`, waiting for `\n`
    Cr,
}

/// Resumable scanner state
#[derive(Debug)]
pub struct Scanner {
    state: State,
    /// Return state for the Escape/Cr lookahead states
    ret: State,
    /// Nesting budget consumed so far (blocks plus enclosing includes)
    depth: usize,
    line: u32,
    /// Line the current statement started on
    stmt_line: u32,
    /// In-progress token, carried across feed calls
    token: Vec<u8>,
    /// Committed directive or block name awaiting its parameter list
    pending_name: Option<String>,
    params: Vec<String>,
    events: Vec<ScanEvent>,
}

impl Scanner {
    pub fn new() -> Self {
        Self::with_depth(0)
    }

    /// Scanner for a nested include, sharing the outer nesting budget
    pub fn with_depth(depth: usize) -> Self {
        Self {
            state: State::Main,
            ret: State::Main,
            depth,
            line: 1,
            stmt_line: 1,
            token: Vec::new(),
            pending_name: None,
            params: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Nesting levels currently consumed
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Consume one chunk of input. Pass `last = true` exactly once, with the
    /// final (possibly empty) chunk; an unterminated construct is only an
    /// error then. Returns the commit events recognized so far, in input
    /// order.
    pub fn feed(&mut self, chunk: &[u8], last: bool) -> Vec<ScanEvent> {
        for &byte in chunk {
            self.step(byte);
        }
        if last {
            self.finish();
        }
        std::mem::take(&mut self.events)
    }

    fn step(&mut self, b: u8) {
        match self.state {
            State::Main => match b {
                b' ' | b'\t' => {}
                b'\n' => self.end_of_line(State::Main),
                b'\r' => self.lookahead_cr(State::Main),
                b'#' => self.state = State::Comment,
                b'<' => {
                    self.stmt_line = self.line;
                    self.token.clear();
                    self.state = State::TagStart;
                }
                b'>' => self.fail(ScanFault::Syntax, "unexpected '>'"),
                b'"' => self.fail(ScanFault::Syntax, "directive names cannot be quoted"),
                b'\\' => {
                    self.stmt_line = self.line;
                    self.token.clear();
                    self.lookahead_escape(State::Name);
                }
                _ => {
                    self.stmt_line = self.line;
                    self.token.clear();
                    self.state = State::Name;
                    self.push(b);
                }
            },

            State::Comment | State::Recover => match b {
                b'\n' => self.end_of_line(self.state),
                b'\r' => self.lookahead_cr(self.state),
                _ => {}
            },

            State::Name => match b {
                b' ' | b'\t' => {
                    // Empty only after a continuation joined a blank tail
                    if !self.token.is_empty() {
                        self.commit_name();
                        self.state = State::Params;
                    }
                }
                b'\n' => self.end_of_line(State::Name),
                b'\r' => self.lookahead_cr(State::Name),
                b'\\' => self.lookahead_escape(State::Name),
                b'"' | b'#' | b'<' | b'>' => self.fail(
                    ScanFault::Syntax,
                    format!("reserved character '{}' in directive name", b as char),
                ),
                _ => {
                    self.push(b);
                }
            },

            State::Params => match b {
                b' ' | b'\t' => {}
                b'\n' => self.end_of_line(State::Params),
                b'\r' => self.lookahead_cr(State::Params),
                b'"' => {
                    self.token.clear();
                    self.state = State::Quoted;
                }
                b'\\' => {
                    self.token.clear();
                    self.lookahead_escape(State::Bare);
                }
                b'#' | b'<' | b'>' => self.fail(
                    ScanFault::Syntax,
                    format!("reserved character '{}' in parameter", b as char),
                ),
                _ => {
                    self.token.clear();
                    self.state = State::Bare;
                    self.push(b);
                }
            },

            State::Bare => match b {
                b' ' | b'\t' => {
                    if !self.token.is_empty() {
                        self.commit_param();
                    }
                    self.state = State::Params;
                }
                b'\n' => self.end_of_line(State::Bare),
                b'\r' => self.lookahead_cr(State::Bare),
                b'\\' => self.lookahead_escape(State::Bare),
                b'"' | b'#' | b'<' | b'>' => self.fail(
                    ScanFault::Syntax,
                    format!("reserved character '{}' in parameter", b as char),
                ),
                _ => {
                    self.push(b);
                }
            },

            State::Quoted => match b {
                b'"' => {
                    self.commit_param();
                    self.state = State::Params;
                }
                b'\\' => self.lookahead_escape(State::Quoted),
                b'\n' => self.end_of_line(State::Quoted),
                b'\r' => self.lookahead_cr(State::Quoted),
                _ => {
                    self.push(b);
                }
            },

            State::TagStart => match b {
                b'/' => {
                    self.token.clear();
                    self.state = State::CloseName;
                }
                b'\n' => self.end_of_line(State::TagStart),
                b'\r' => self.lookahead_cr(State::TagStart),
                b' ' | b'\t' | b'>' | b'"' | b'#' | b'<' | b'\\' => {
                    self.fail(ScanFault::Syntax, "malformed block tag")
                }
                _ => {
                    self.state = State::BlockName;
                    self.push(b);
                }
            },

            State::BlockName => match b {
                b' ' | b'\t' => {
                    self.commit_name();
                    self.state = State::BlockParams;
                }
                b'>' => {
                    self.commit_name();
                    self.commit_block_open();
                }
                b'\n' => self.end_of_line(State::BlockName),
                b'\r' => self.lookahead_cr(State::BlockName),
                b'"' | b'#' | b'<' | b'\\' => self.fail(
                    ScanFault::Syntax,
                    format!("reserved character '{}' in block name", b as char),
                ),
                _ => {
                    self.push(b);
                }
            },

            State::BlockParams => match b {
                b' ' | b'\t' => {}
                b'>' => self.commit_block_open(),
                b'"' => {
                    self.token.clear();
                    self.state = State::BlockQuoted;
                }
                b'\\' => {
                    self.token.clear();
                    self.lookahead_escape(State::BlockBare);
                }
                b'\n' => self.end_of_line(State::BlockParams),
                b'\r' => self.lookahead_cr(State::BlockParams),
                b'#' | b'<' => self.fail(
                    ScanFault::Syntax,
                    format!("reserved character '{}' in block parameter", b as char),
                ),
                _ => {
                    self.state = State::BlockBare;
                    self.push(b);
                }
            },

            State::BlockBare => match b {
                b' ' | b'\t' => {
                    if !self.token.is_empty() {
                        self.commit_param();
                    }
                    self.state = State::BlockParams;
                }
                b'>' => {
                    if !self.token.is_empty() {
                        self.commit_param();
                    }
                    self.commit_block_open();
                }
                b'\\' => self.lookahead_escape(State::BlockBare),
                b'\n' => self.end_of_line(State::BlockBare),
                b'\r' => self.lookahead_cr(State::BlockBare),
                b'"' | b'#' | b'<' => self.fail(
                    ScanFault::Syntax,
                    format!("reserved character '{}' in block parameter", b as char),
                ),
                _ => {
                    self.push(b);
                }
            },

            State::BlockQuoted => match b {
                b'"' => {
                    self.commit_param();
                    self.state = State::BlockParams;
                }
                b'\\' => self.lookahead_escape(State::BlockQuoted),
                b'\n' => self.end_of_line(State::BlockQuoted),
                b'\r' => self.lookahead_cr(State::BlockQuoted),
                _ => {
                    self.push(b);
                }
            },

            State::CloseName => match b {
                b'>' => self.commit_block_close(),
                b' ' | b'\t' => {
                    if self.token.is_empty() {
                        self.fail(ScanFault::Syntax, "malformed block tag");
                    } else {
                        self.state = State::CloseEnd;
                    }
                }
                b'\n' => self.end_of_line(State::CloseName),
                b'\r' => self.lookahead_cr(State::CloseName),
                b'"' | b'#' | b'<' | b'\\' => self.fail(
                    ScanFault::Syntax,
                    format!("reserved character '{}' in closing tag", b as char),
                ),
                _ => {
                    self.push(b);
                }
            },

            State::CloseEnd => match b {
                b' ' | b'\t' => {}
                b'>' => self.commit_block_close(),
                b'\n' => self.end_of_line(State::CloseEnd),
                b'\r' => self.lookahead_cr(State::CloseEnd),
                _ => self.fail(ScanFault::Syntax, "expected '>' to end closing tag"),
            },

            State::Escape => match b {
                // Backslash-newline is a continuation: the line ends without
                // terminating the surrounding token or statement.
                b'\n' => {
                    self.line += 1;
                    self.state = self.ret;
                }
                b'\r' => self.state = State::EscapeCr,
                _ => {
                    if self.push(b'\\') && self.push(b) {
                        self.state = self.ret;
                    }
                }
            },

            State::EscapeCr => match b {
                b'\n' => {
                    self.line += 1;
                    self.state = self.ret;
                }
                _ => self.fail(ScanFault::Syntax, "stray carriage return"),
            },

            State::Cr => match b {
                b'\n' => self.end_of_line(self.ret),
                _ => self.fail(ScanFault::Syntax, "stray carriage return"),
            },
        }
    }

    /// End-of-input handling. A trailing line without a newline commits
    /// normally; a quoted or bracketed construct left open is a structural
    /// error.
    fn finish(&mut self) {
        loop {
            match self.state {
                State::Main | State::Comment | State::Recover => break,
                State::Name => {
                    if !self.token.is_empty() {
                        self.commit_name();
                        self.commit_directive();
                    }
                    break;
                }
                State::Params => {
                    self.commit_directive();
                    break;
                }
                State::Bare => {
                    if !self.token.is_empty() {
                        self.commit_param();
                    }
                    self.commit_directive();
                    break;
                }
                State::Quoted | State::BlockQuoted => {
                    self.error_event(
                        ScanFault::Structural,
                        "unterminated quoted parameter at end of input".to_string(),
                    );
                    self.reset_statement();
                    break;
                }
                State::TagStart
                | State::BlockName
                | State::BlockParams
                | State::BlockBare
                | State::CloseName
                | State::CloseEnd => {
                    self.error_event(
                        ScanFault::Structural,
                        "unterminated block tag at end of input".to_string(),
                    );
                    self.reset_statement();
                    break;
                }
                State::Escape => {
                    // A trailing lone backslash belongs to the token
                    self.push(b'\\');
                    self.state = self.ret;
                }
                State::EscapeCr | State::Cr => {
                    self.error_event(
                        ScanFault::Syntax,
                        "stray carriage return at end of input".to_string(),
                    );
                    self.reset_statement();
                    break;
                }
            }
        }
        self.state = State::Main;
    }

    fn end_of_line(&mut self, from: State) {
        match from {
            State::Main | State::Comment | State::Recover => {}
            State::Name => {
                if !self.token.is_empty() {
                    self.commit_name();
                    self.commit_directive();
                }
            }
            State::Params => self.commit_directive(),
            State::Bare => {
                if !self.token.is_empty() {
                    self.commit_param();
                }
                self.commit_directive();
            }
            State::Quoted | State::BlockQuoted => {
                self.error_event(
                    ScanFault::Syntax,
                    "unterminated quoted parameter".to_string(),
                );
                self.reset_statement();
            }
            State::TagStart
            | State::BlockName
            | State::BlockParams
            | State::BlockBare
            | State::CloseName
            | State::CloseEnd => {
                self.error_event(ScanFault::Syntax, "newline inside block tag".to_string());
                self.reset_statement();
            }
            // Lookahead states never reach here
            State::Escape | State::EscapeCr | State::Cr => {}
        }
        self.line += 1;
        self.state = State::Main;
    }

    fn lookahead_escape(&mut self, ret: State) {
        self.ret = ret;
        self.state = State::Escape;
    }

    fn lookahead_cr(&mut self, ret: State) {
        self.ret = ret;
        self.state = State::Cr;
    }

    fn push(&mut self, b: u8) -> bool {
        if self.token.len() >= TOKEN_LIMIT {
            self.fail(
                ScanFault::Resource,
                format!("token exceeds {TOKEN_LIMIT} bytes"),
            );
            return false;
        }
        self.token.push(b);
        true
    }

    fn commit_name(&mut self) {
        let name = String::from_utf8_lossy(&self.token).into_owned();
        self.token.clear();
        self.pending_name = Some(name);
        self.params.clear();
    }

    fn commit_param(&mut self) {
        let raw = String::from_utf8_lossy(&self.token).into_owned();
        self.token.clear();
        self.params.push(unescape(&raw));
    }

    fn commit_directive(&mut self) {
        let Some(name) = self.pending_name.take() else {
            return;
        };
        let params = std::mem::take(&mut self.params);
        self.events.push(ScanEvent::Directive {
            name,
            params,
            line: self.stmt_line,
        });
    }

    fn commit_block_open(&mut self) {
        if self.depth >= NESTING_LIMIT {
            self.fail(
                ScanFault::Resource,
                format!("nesting exceeds {NESTING_LIMIT} levels"),
            );
            return;
        }
        let Some(name) = self.pending_name.take() else {
            return;
        };
        self.depth += 1;
        let params = std::mem::take(&mut self.params);
        self.events.push(ScanEvent::BlockOpen {
            name,
            params,
            line: self.stmt_line,
        });
        self.state = State::Main;
    }

    fn commit_block_close(&mut self) {
        if self.token.is_empty() {
            self.fail(ScanFault::Structural, "empty closing tag");
            return;
        }
        let name = String::from_utf8_lossy(&self.token).into_owned();
        self.token.clear();
        self.depth = self.depth.saturating_sub(1);
        self.events.push(ScanEvent::BlockClose {
            name,
            line: self.stmt_line,
        });
        self.state = State::Main;
    }

    fn error_event(&mut self, fault: ScanFault, message: String) {
        self.events.push(ScanEvent::Error {
            fault,
            message,
            line: self.line,
        });
    }

    fn fail(&mut self, fault: ScanFault, message: impl Into<String>) {
        self.error_event(fault, message.into());
        self.reset_statement();
        self.state = State::Recover;
    }

    fn reset_statement(&mut self) {
        self.token.clear();
        self.pending_name = None;
        self.params.clear();
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve `\X` escapes: the backslash is dropped and the following
/// character kept verbatim. A trailing lone backslash is kept.
fn unescape(raw: &str) -> String {
    let mut resolved = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(escaped) => resolved.push(escaped),
                None => resolved.push('\\'),
            }
        } else {
            resolved.push(c);
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Vec<ScanEvent> {
        Scanner::new().feed(source.as_bytes(), true)
    }

    fn directive(name: &str, params: &[&str], line: u32) -> ScanEvent {
        ScanEvent::Directive {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            line,
        }
    }

    #[test]
    fn test_basic_directive() {
        let events = scan("RuleEngine On\n");
        assert_eq!(events, vec![directive("RuleEngine", &["On"], 1)]);
    }

    #[test]
    fn test_quoted_and_escaped_parameters() {
        let events = scan("Foo \"hello world\" bar\\ baz\n");
        assert_eq!(events, vec![directive("Foo", &["hello world", "bar baz"], 1)]);
    }

    #[test]
    fn test_escaped_quote_inside_quotes() {
        let events = scan("Foo \"a \\\"b\\\" c\"\n");
        assert_eq!(events, vec![directive("Foo", &["a \"b\" c"], 1)]);
    }

    #[test]
    fn test_empty_quoted_parameter() {
        let events = scan("Foo \"\"\n");
        assert_eq!(events, vec![directive("Foo", &[""], 1)]);
    }

    #[test]
    fn test_comment_discarded() {
        let events = scan("# a comment line\nAuditEngine Off\n");
        assert_eq!(events, vec![directive("AuditEngine", &["Off"], 2)]);
    }

    #[test]
    fn test_continuation_joins_lines() {
        let events = scan("AuditLog \\\n/var/log/audit.log\nDebugLevel 3\n");
        assert_eq!(
            events,
            vec![
                directive("AuditLog", &["/var/log/audit.log"], 1),
                // The continuation still counted its line
                directive("DebugLevel", &["3"], 3),
            ]
        );
    }

    #[test]
    fn test_continuation_inside_token() {
        let events = scan("Foo ab\\\ncd\n");
        assert_eq!(events, vec![directive("Foo", &["abcd"], 1)]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let events = scan("RuleEngine On\r\nAuditEngine Off\r\n");
        assert_eq!(
            events,
            vec![
                directive("RuleEngine", &["On"], 1),
                directive("AuditEngine", &["Off"], 2),
            ]
        );
    }

    #[test]
    fn test_block_events() {
        let events = scan("<Site a>\nDirective1 x\n</Site>\n");
        assert_eq!(
            events,
            vec![
                ScanEvent::BlockOpen {
                    name: "Site".to_string(),
                    params: vec!["a".to_string()],
                    line: 1,
                },
                directive("Directive1", &["x"], 2),
                ScanEvent::BlockClose {
                    name: "Site".to_string(),
                    line: 3,
                },
            ]
        );
    }

    #[test]
    fn test_block_with_quoted_parameter() {
        let events = scan("<Location \"/a b\">\n</Location>\n");
        assert_eq!(
            events[0],
            ScanEvent::BlockOpen {
                name: "Location".to_string(),
                params: vec!["/a b".to_string()],
                line: 1,
            }
        );
    }

    #[test]
    fn test_closing_tag_with_whitespace() {
        let events = scan("<Site>\n</Site >\n");
        assert_eq!(
            events[1],
            ScanEvent::BlockClose {
                name: "Site".to_string(),
                line: 2,
            }
        );
    }

    #[test]
    fn test_no_trailing_newline_commits() {
        let events = scan("DebugLevel 9");
        assert_eq!(events, vec![directive("DebugLevel", &["9"], 1)]);
    }

    #[test]
    fn test_chunked_feed_matches_whole_feed() {
        let source = "RuleEngine On\n<Location \"/x\">\nAuditLog \"a b\\\"c\"\n</Location>\n";
        let whole = scan(source);

        let bytes = source.as_bytes();
        for split in 0..=bytes.len() {
            let mut scanner = Scanner::new();
            let mut events = scanner.feed(&bytes[..split], false);
            events.extend(scanner.feed(&bytes[split..], true));
            assert_eq!(events, whole, "differs when split at byte {split}");
        }
    }

    #[test]
    fn test_partial_chunk_is_not_an_error() {
        let mut scanner = Scanner::new();
        let events = scanner.feed(b"<Site a>\nDirective", false);
        // Mid-token at a chunk boundary: nothing dangles yet
        assert_eq!(events.len(), 1);
        let events = scanner.feed(b"1 x\n", true);
        assert_eq!(events, vec![directive("Directive1", &["x"], 2)]);
    }

    #[test]
    fn test_unterminated_quote_recovers_at_next_line() {
        let events = scan("Foo \"abc\nBar x\n");
        assert!(matches!(
            events[0],
            ScanEvent::Error {
                fault: ScanFault::Syntax,
                line: 1,
                ..
            }
        ));
        assert_eq!(events[1], directive("Bar", &["x"], 2));
    }

    #[test]
    fn test_dangling_quote_at_end_of_input() {
        let events = scan("Foo \"abc");
        assert!(matches!(
            events[0],
            ScanEvent::Error {
                fault: ScanFault::Structural,
                ..
            }
        ));
    }

    #[test]
    fn test_dangling_open_tag_at_end_of_input() {
        let events = scan("<Site a");
        assert!(matches!(
            events[0],
            ScanEvent::Error {
                fault: ScanFault::Structural,
                ..
            }
        ));
    }

    #[test]
    fn test_reserved_character_in_parameter() {
        let events = scan("Foo a<b\n");
        assert!(matches!(
            events[0],
            ScanEvent::Error {
                fault: ScanFault::Syntax,
                ..
            }
        ));
    }

    #[test]
    fn test_token_limit_overflow() {
        let long = "A".repeat(TOKEN_LIMIT + 1);
        let events = scan(&format!("Foo {long}\n"));
        assert!(matches!(
            events[0],
            ScanEvent::Error {
                fault: ScanFault::Resource,
                ..
            }
        ));
    }

    #[test]
    fn test_nesting_budget_exhausted() {
        let mut scanner = Scanner::with_depth(NESTING_LIMIT);
        let events = scanner.feed(b"<Site>\n", true);
        assert!(matches!(
            events[0],
            ScanEvent::Error {
                fault: ScanFault::Resource,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_input() {
        assert!(scan("").is_empty());
        assert!(scan("   \n\t\n").is_empty());
    }

    #[test]
    fn test_directive_line_attribution_spans_continuations() {
        let events = scan("First a\nSecond \\\nb \\\nc\nThird d\n");
        assert_eq!(
            events,
            vec![
                directive("First", &["a"], 1),
                directive("Second", &["b", "c"], 2),
                directive("Third", &["d"], 5),
            ]
        );
    }
}
