//! Ravelin policy-language parser
//!
//! This crate parses the Apache-style directive/block policy files the
//! Ravelin engine is configured with, chunk by chunk, into a directive tree
//! that is then applied to a directive dispatcher.
//!
//! # Example
//!
//! ```rust,ignore
//! use ravelin_config::ConfParser;
//! use ravelin_core::{DirectiveRegistry, RegistryDispatcher, SettingsBuilder};
//!
//! let mut parser = ConfParser::parse("ravelin.conf")?;
//! let registry = DirectiveRegistry::builtin();
//! let mut builder = SettingsBuilder::new();
//! let mut dispatcher = RegistryDispatcher::new(&registry, &mut builder);
//! parser.apply(&mut dispatcher)?;
//! let settings = builder.finish();
//! ```

pub mod error;
pub mod parser;

pub use error::{ApplyError, ConfError, ConfResult, SourcePos};
pub use parser::{
    ConfParser, NESTING_LIMIT, NodeId, NodeKind, ParseNode, ParseTree, ScanEvent, ScanFault,
    Scanner,
};

use ravelin_core::Dispatcher;
use std::path::Path;

/// Parse error or apply error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Parse error: {0}")]
    Parse(#[from] ConfError),

    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),
}

/// Parse a policy file, failing if any part of it failed to parse.
///
/// Processing still runs to completion on error: every reachable directive
/// is scanned and every reachable include followed, but the first
/// accumulated error is returned.
pub fn parse_file(path: impl AsRef<Path>) -> ConfResult<ConfParser> {
    let mut parser = ConfParser::parse(path)?;
    if let Some(err) = parser.take_first_error() {
        return Err(err);
    }
    Ok(parser)
}

/// Full pipeline: parse a policy file and apply it to a dispatcher
pub fn parse_and_apply(
    path: impl AsRef<Path>,
    dispatcher: &mut dyn Dispatcher,
) -> Result<(), ConfigError> {
    let mut parser = parse_file(path)?;
    parser.apply(dispatcher)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ravelin_core::{DirectiveRegistry, RegistryDispatcher, SettingsBuilder, Toggle};

    #[test]
    fn test_full_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("audit.conf");
        std::fs::write(&sub, "AuditEngine On\nAuditLog \"/var/log/ravelin/audit.log\"\n")
            .unwrap();
        let main = dir.path().join("ravelin.conf");
        std::fs::write(
            &main,
            "LogLevel 4\n\
             RuleEngine On\n\
             Include audit.conf\n\
             <Location \"/api\">\n\
             RuleEngine Off\n\
             </Location>\n",
        )
        .unwrap();

        let registry = DirectiveRegistry::builtin();
        let mut builder = SettingsBuilder::new();
        let mut dispatcher = RegistryDispatcher::new(&registry, &mut builder);
        parse_and_apply(&main, &mut dispatcher).unwrap();

        let settings = builder.finish();
        assert_eq!(settings.rule_engine, Toggle::On);
        assert_eq!(settings.audit_engine, Toggle::On);
        assert_eq!(
            settings.audit_log.as_deref(),
            Some("/var/log/ravelin/audit.log")
        );
        assert_eq!(settings.locations.len(), 1);
        assert_eq!(settings.locations[0].path, "/api");
    }

    #[test]
    fn test_parse_file_surfaces_first_error() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("broken.conf");
        std::fs::write(&main, "Good x\nBad \"oops\nAlso good\n").unwrap();

        let result = parse_file(&main);
        assert!(matches!(result, Err(ConfError::Syntax { .. })));
    }

    #[test]
    fn test_unknown_directive_is_an_apply_error() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("unknown.conf");
        std::fs::write(&main, "NoSuchDirective x\nRuleEngine On\n").unwrap();

        let registry = DirectiveRegistry::builtin();
        let mut builder = SettingsBuilder::new();
        let mut dispatcher = RegistryDispatcher::new(&registry, &mut builder);
        let result = parse_and_apply(&main, &mut dispatcher);
        assert!(matches!(result, Err(ConfigError::Apply(_))));

        // The walk continued past the unknown directive
        assert_eq!(builder.finish().rule_engine, Toggle::On);
    }

    #[test]
    fn test_session_memory_outlives_parse_result() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub.conf");
        std::fs::write(&sub, "SetVar a b\n").unwrap();
        let main = dir.path().join("main.conf");
        std::fs::write(&main, "Include sub.conf\nBad \"unterminated\n").unwrap();

        // Parse fails overall, but the session keeps the whole tree readable
        let parser = ConfParser::parse(&main).unwrap();
        assert!(parser.has_errors());
        let tree = parser.tree();
        let json = tree.to_json();
        assert!(json.to_string().contains("SetVar"));
    }
}
