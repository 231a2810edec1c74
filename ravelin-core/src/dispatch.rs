//! Directive dispatch
//!
//! The parser hands every directive and block of a parsed policy tree to a
//! [`Dispatcher`]. A [`DirectiveRegistry`] sits in front of the dispatcher:
//! it maps directive names to descriptors whose [`DirectiveShape`] drives
//! parameter validation, so handlers only ever see well-formed argument
//! lists. Registry lookup is case-sensitive; the parse-time directives
//! (`Include`, `IncludeIfExists`, `LogLevel`) never reach the registry
//! because the parser executes them during tree construction.

use std::collections::HashMap;
use thiserror::Error;

/// Dispatch error types
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown directive '{name}'")]
    UnknownDirective { name: String },

    #[error("directive '{name}' expects {expected}, got {got} parameter(s)")]
    ParameterCount {
        name: String,
        expected: &'static str,
        got: usize,
    },

    #[error("directive '{name}': '{value}' is not one of On, Off")]
    InvalidSwitch { name: String, value: String },

    #[error("directive '{name}': empty flag '{flag}'")]
    InvalidFlag { name: String, flag: String },

    #[error("directive '{name}' does not open a block")]
    NotABlock { name: String },

    #[error("directive '{name}' must be written as a <{name}> block")]
    IsABlock { name: String },

    #[error("directive '{name}' failed: {message}")]
    Handler { name: String, message: String },
}

pub type DispatchResult = Result<(), DispatchError>;

/// Parameter shape contract of a registered directive.
///
/// The discriminant drives the arity check performed before the handler is
/// invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveShape {
    /// A single `On`/`Off` parameter
    Switch,
    /// Exactly one parameter
    Single,
    /// Exactly two parameters
    Pair,
    /// One or more parameters
    List,
    /// One or more flags, each optionally prefixed with `+` or `-`
    FlagSet,
    /// Opens a sub-block with paired start/end handling
    Block,
}

/// Descriptor for a registered directive
#[derive(Debug, Clone)]
pub struct DirectiveDescriptor {
    pub name: String,
    pub shape: DirectiveShape,
}

/// Callback surface the engine exposes to the tree applicator.
///
/// `start_block`/`end_block` are always paired by the caller; a failed
/// `start_block` still receives its matching `end_block` once the block's
/// children have been walked.
pub trait Dispatcher {
    fn process_directive(&mut self, name: &str, params: &[String]) -> DispatchResult;
    fn start_block(&mut self, name: &str, params: &[String]) -> DispatchResult;
    fn end_block(&mut self, name: &str) -> DispatchResult;
}

/// Name-keyed table of directive descriptors
#[derive(Debug, Default)]
pub struct DirectiveRegistry {
    directives: HashMap<String, DirectiveDescriptor>,
}

impl DirectiveRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the stock engine directive set
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("RuleEngine", DirectiveShape::Switch);
        registry.register("AuditEngine", DirectiveShape::Switch);
        registry.register("AuditLog", DirectiveShape::Single);
        registry.register("AuditLogParts", DirectiveShape::FlagSet);
        registry.register("DebugLevel", DirectiveShape::Single);
        registry.register("RequestBodyLimit", DirectiveShape::Single);
        registry.register("ResponseBodyLimit", DirectiveShape::Single);
        registry.register("ServerSignature", DirectiveShape::Single);
        registry.register("DefaultAction", DirectiveShape::List);
        registry.register("SetVar", DirectiveShape::Pair);
        registry.register("Location", DirectiveShape::Block);
        registry
    }

    /// Register a directive
    pub fn register(&mut self, name: impl Into<String>, shape: DirectiveShape) {
        let name = name.into();
        tracing::debug!("Registering directive: {} ({:?})", name, shape);
        self.directives.insert(
            name.clone(),
            DirectiveDescriptor { name, shape },
        );
    }

    /// Look up a descriptor by name (case-sensitive)
    pub fn get(&self, name: &str) -> Option<&DirectiveDescriptor> {
        self.directives.get(name)
    }

    /// Validate a plain directive invocation against its descriptor
    pub fn check_directive(&self, name: &str, params: &[String]) -> DispatchResult {
        let descriptor = self.get(name).ok_or_else(|| DispatchError::UnknownDirective {
            name: name.to_string(),
        })?;

        let got = params.len();
        match descriptor.shape {
            DirectiveShape::Switch => {
                if got != 1 {
                    return Err(DispatchError::ParameterCount {
                        name: name.to_string(),
                        expected: "a single On|Off value",
                        got,
                    });
                }
                let value = &params[0];
                if !value.eq_ignore_ascii_case("on") && !value.eq_ignore_ascii_case("off") {
                    return Err(DispatchError::InvalidSwitch {
                        name: name.to_string(),
                        value: value.clone(),
                    });
                }
            }
            DirectiveShape::Single => {
                if got != 1 {
                    return Err(DispatchError::ParameterCount {
                        name: name.to_string(),
                        expected: "exactly 1",
                        got,
                    });
                }
            }
            DirectiveShape::Pair => {
                if got != 2 {
                    return Err(DispatchError::ParameterCount {
                        name: name.to_string(),
                        expected: "exactly 2",
                        got,
                    });
                }
            }
            DirectiveShape::List => {
                if got == 0 {
                    return Err(DispatchError::ParameterCount {
                        name: name.to_string(),
                        expected: "at least 1",
                        got,
                    });
                }
            }
            DirectiveShape::FlagSet => {
                if got == 0 {
                    return Err(DispatchError::ParameterCount {
                        name: name.to_string(),
                        expected: "at least 1 flag",
                        got,
                    });
                }
                for flag in params {
                    let body = flag.strip_prefix(['+', '-']).unwrap_or(flag);
                    if body.is_empty() {
                        return Err(DispatchError::InvalidFlag {
                            name: name.to_string(),
                            flag: flag.clone(),
                        });
                    }
                }
            }
            DirectiveShape::Block => {
                return Err(DispatchError::IsABlock {
                    name: name.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Validate a block opening against its descriptor
    pub fn check_block(&self, name: &str) -> DispatchResult {
        let descriptor = self.get(name).ok_or_else(|| DispatchError::UnknownDirective {
            name: name.to_string(),
        })?;
        if descriptor.shape != DirectiveShape::Block {
            return Err(DispatchError::NotABlock {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Number of registered directives
    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

/// Dispatcher wrapper that validates against a registry before forwarding to
/// the inner handler.
pub struct RegistryDispatcher<'a, D: Dispatcher> {
    registry: &'a DirectiveRegistry,
    inner: &'a mut D,
}

impl<'a, D: Dispatcher> RegistryDispatcher<'a, D> {
    pub fn new(registry: &'a DirectiveRegistry, inner: &'a mut D) -> Self {
        Self { registry, inner }
    }
}

impl<D: Dispatcher> Dispatcher for RegistryDispatcher<'_, D> {
    fn process_directive(&mut self, name: &str, params: &[String]) -> DispatchResult {
        self.registry.check_directive(name, params)?;
        self.inner.process_directive(name, params)
    }

    fn start_block(&mut self, name: &str, params: &[String]) -> DispatchResult {
        self.registry.check_block(name)?;
        self.inner.start_block(name, params)
    }

    fn end_block(&mut self, name: &str) -> DispatchResult {
        // A block rejected by check_block never reached the inner dispatcher,
        // but end_block must stay paired for handlers that did see the start.
        if self.registry.check_block(name).is_err() {
            return Ok(());
        }
        self.inner.end_block(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_unknown_directive() {
        let registry = DirectiveRegistry::builtin();
        let result = registry.check_directive("NoSuchDirective", &params(&["x"]));
        assert!(matches!(result, Err(DispatchError::UnknownDirective { .. })));
    }

    #[test]
    fn test_switch_shape() {
        let registry = DirectiveRegistry::builtin();
        assert!(registry.check_directive("RuleEngine", &params(&["On"])).is_ok());
        assert!(registry.check_directive("RuleEngine", &params(&["off"])).is_ok());
        assert!(matches!(
            registry.check_directive("RuleEngine", &params(&["Maybe"])),
            Err(DispatchError::InvalidSwitch { .. })
        ));
        assert!(matches!(
            registry.check_directive("RuleEngine", &params(&["On", "Off"])),
            Err(DispatchError::ParameterCount { got: 2, .. })
        ));
    }

    #[test]
    fn test_pair_shape() {
        let registry = DirectiveRegistry::builtin();
        assert!(registry.check_directive("SetVar", &params(&["k", "v"])).is_ok());
        assert!(matches!(
            registry.check_directive("SetVar", &params(&["k"])),
            Err(DispatchError::ParameterCount { expected: "exactly 2", .. })
        ));
    }

    #[test]
    fn test_flag_set_shape() {
        let registry = DirectiveRegistry::builtin();
        assert!(registry
            .check_directive("AuditLogParts", &params(&["+request", "-response", "body"]))
            .is_ok());
        assert!(matches!(
            registry.check_directive("AuditLogParts", &params(&["+"])),
            Err(DispatchError::InvalidFlag { .. })
        ));
        assert!(matches!(
            registry.check_directive("AuditLogParts", &[]),
            Err(DispatchError::ParameterCount { .. })
        ));
    }

    #[test]
    fn test_block_shape() {
        let registry = DirectiveRegistry::builtin();
        assert!(registry.check_block("Location").is_ok());
        assert!(matches!(
            registry.check_block("RuleEngine"),
            Err(DispatchError::NotABlock { .. })
        ));
        // A block name used as a plain directive is rejected too
        assert!(matches!(
            registry.check_directive("Location", &params(&["/"])),
            Err(DispatchError::IsABlock { .. })
        ));
    }
}
