//! Engine settings materialized from a policy file
//!
//! [`SettingsBuilder`] is the stock [`Dispatcher`]: it turns the directive
//! stream produced by the tree applicator into an [`EngineSettings`] value
//! the inspection engine boots from. Directives seen inside a `<Location>`
//! block are kept with that location instead of being applied globally.

use crate::dispatch::{DispatchError, DispatchResult, Dispatcher};
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// On/off engine switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    On,
    #[default]
    Off,
}

impl Toggle {
    fn parse(name: &str, value: &str) -> Result<Self, DispatchError> {
        if value.eq_ignore_ascii_case("on") {
            Ok(Toggle::On)
        } else if value.eq_ignore_ascii_case("off") {
            Ok(Toggle::Off)
        } else {
            Err(DispatchError::InvalidSwitch {
                name: name.to_string(),
                value: value.to_string(),
            })
        }
    }
}

/// A directive recorded verbatim inside a location scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveLine {
    pub name: String,
    pub params: Vec<String>,
}

/// Per-location overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSettings {
    pub path: String,
    pub directives: Vec<DirectiveLine>,
}

/// Engine configuration assembled from a policy file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub rule_engine: Toggle,
    pub audit_engine: Toggle,
    pub audit_log: Option<String>,
    /// Audit part name -> enabled, from `AuditLogParts +a -b`
    pub audit_log_parts: BTreeMap<String, bool>,
    pub debug_level: u8,
    pub request_body_limit: Option<u64>,
    pub response_body_limit: Option<u64>,
    pub server_signature: Option<String>,
    pub default_actions: Vec<String>,
    pub variables: BTreeMap<String, String>,
    pub locations: Vec<LocationSettings>,
}

impl EngineSettings {
    /// Load settings previously exported as JSON
    pub fn from_json(content: &str) -> Result<Self, Error> {
        serde_json::from_str(content).map_err(|e| Error::Config(format!("Invalid JSON: {}", e)))
    }

    /// Export settings as pretty-printed JSON
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Internal(format!("JSON encoding failed: {}", e)))
    }
}

/// Dispatcher that builds [`EngineSettings`]
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings: EngineSettings,
    /// Index into `settings.locations` while inside a `<Location>` block
    scope: Option<usize>,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the builder and return the assembled settings
    pub fn finish(self) -> EngineSettings {
        self.settings
    }

    fn handler_err(name: &str, message: impl Into<String>) -> DispatchError {
        DispatchError::Handler {
            name: name.to_string(),
            message: message.into(),
        }
    }

    fn parse_limit(name: &str, value: &str) -> Result<u64, DispatchError> {
        value
            .parse::<u64>()
            .map_err(|_| Self::handler_err(name, format!("'{value}' is not a byte count")))
    }
}

impl Dispatcher for SettingsBuilder {
    fn process_directive(&mut self, name: &str, params: &[String]) -> DispatchResult {
        if let Some(index) = self.scope {
            self.settings.locations[index].directives.push(DirectiveLine {
                name: name.to_string(),
                params: params.to_vec(),
            });
            return Ok(());
        }

        match name {
            "RuleEngine" => self.settings.rule_engine = Toggle::parse(name, &params[0])?,
            "AuditEngine" => self.settings.audit_engine = Toggle::parse(name, &params[0])?,
            "AuditLog" => self.settings.audit_log = Some(params[0].clone()),
            "AuditLogParts" => {
                for flag in params {
                    let (part, enabled) = match flag.strip_prefix('-') {
                        Some(rest) => (rest, false),
                        None => (flag.strip_prefix('+').unwrap_or(flag), true),
                    };
                    self.settings.audit_log_parts.insert(part.to_string(), enabled);
                }
            }
            "DebugLevel" => {
                let level: u8 = params[0]
                    .parse()
                    .ok()
                    .filter(|v| *v <= 9)
                    .ok_or_else(|| Self::handler_err(name, "level must be 0..=9"))?;
                self.settings.debug_level = level;
            }
            "RequestBodyLimit" => {
                self.settings.request_body_limit = Some(Self::parse_limit(name, &params[0])?)
            }
            "ResponseBodyLimit" => {
                self.settings.response_body_limit = Some(Self::parse_limit(name, &params[0])?)
            }
            "ServerSignature" => self.settings.server_signature = Some(params[0].clone()),
            "DefaultAction" => self.settings.default_actions.extend(params.iter().cloned()),
            "SetVar" => {
                self.settings
                    .variables
                    .insert(params[0].clone(), params[1].clone());
            }
            _ => {
                return Err(DispatchError::UnknownDirective {
                    name: name.to_string(),
                })
            }
        }

        Ok(())
    }

    fn start_block(&mut self, name: &str, params: &[String]) -> DispatchResult {
        if name != "Location" {
            return Err(DispatchError::UnknownDirective {
                name: name.to_string(),
            });
        }
        if self.scope.is_some() {
            return Err(Self::handler_err(name, "Location blocks cannot nest"));
        }
        if params.len() != 1 {
            return Err(DispatchError::ParameterCount {
                name: name.to_string(),
                expected: "exactly 1 path",
                got: params.len(),
            });
        }

        self.settings.locations.push(LocationSettings {
            path: params[0].clone(),
            directives: Vec::new(),
        });
        self.scope = Some(self.settings.locations.len() - 1);
        Ok(())
    }

    fn end_block(&mut self, name: &str) -> DispatchResult {
        if self.scope.take().is_none() {
            return Err(Self::handler_err(name, "end of block without a start"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_global_directives() {
        let mut builder = SettingsBuilder::new();
        builder.process_directive("RuleEngine", &params(&["On"])).unwrap();
        builder.process_directive("AuditLog", &params(&["/var/log/ravelin/audit.log"])).unwrap();
        builder.process_directive("DebugLevel", &params(&["3"])).unwrap();
        builder.process_directive("SetVar", &params(&["site", "shop"])).unwrap();

        let settings = builder.finish();
        assert_eq!(settings.rule_engine, Toggle::On);
        assert_eq!(settings.audit_log.as_deref(), Some("/var/log/ravelin/audit.log"));
        assert_eq!(settings.debug_level, 3);
        assert_eq!(settings.variables.get("site").map(String::as_str), Some("shop"));
    }

    #[test]
    fn test_audit_log_parts_flags() {
        let mut builder = SettingsBuilder::new();
        builder
            .process_directive("AuditLogParts", &params(&["+request", "-response", "headers"]))
            .unwrap();

        let settings = builder.finish();
        assert_eq!(settings.audit_log_parts.get("request"), Some(&true));
        assert_eq!(settings.audit_log_parts.get("response"), Some(&false));
        assert_eq!(settings.audit_log_parts.get("headers"), Some(&true));
    }

    #[test]
    fn test_location_scope() {
        let mut builder = SettingsBuilder::new();
        builder.process_directive("RuleEngine", &params(&["On"])).unwrap();
        builder.start_block("Location", &params(&["/api"])).unwrap();
        builder.process_directive("RuleEngine", &params(&["Off"])).unwrap();
        builder.end_block("Location").unwrap();

        let settings = builder.finish();
        // The scoped directive did not touch the global switch
        assert_eq!(settings.rule_engine, Toggle::On);
        assert_eq!(settings.locations.len(), 1);
        assert_eq!(settings.locations[0].path, "/api");
        assert_eq!(settings.locations[0].directives[0].name, "RuleEngine");
    }

    #[test]
    fn test_invalid_debug_level() {
        let mut builder = SettingsBuilder::new();
        let result = builder.process_directive("DebugLevel", &params(&["11"]));
        assert!(matches!(result, Err(DispatchError::Handler { .. })));
    }

    #[test]
    fn test_nested_location_rejected() {
        let mut builder = SettingsBuilder::new();
        builder.start_block("Location", &params(&["/a"])).unwrap();
        let result = builder.start_block("Location", &params(&["/b"]));
        assert!(matches!(result, Err(DispatchError::Handler { .. })));
    }

    #[test]
    fn test_settings_json_round_trip() {
        let mut builder = SettingsBuilder::new();
        builder.process_directive("RuleEngine", &params(&["On"])).unwrap();
        builder.process_directive("DefaultAction", &params(&["deny", "status:403"])).unwrap();
        let settings = builder.finish();

        let json = settings.to_json().unwrap();
        let back = EngineSettings::from_json(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let result = EngineSettings::from_json("not json");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
