//! Core library for the Ravelin web application firewall engine.
//!
//! This crate defines the boundary between the policy-language parser and
//! the inspection engine: the [`Dispatcher`] callback surface invoked while a
//! parsed directive tree is applied, the [`DirectiveRegistry`] that validates
//! directive names and parameter shapes before a handler runs, and the
//! [`EngineSettings`] sink the stock engine materializes its configuration
//! into.

pub mod dispatch;
pub mod error;
pub mod settings;

pub use dispatch::{
    Dispatcher, DirectiveDescriptor, DirectiveRegistry, DirectiveShape, DispatchError,
    DispatchResult, RegistryDispatcher,
};
pub use error::{Error, Result};
pub use settings::{EngineSettings, LocationSettings, SettingsBuilder, Toggle};
