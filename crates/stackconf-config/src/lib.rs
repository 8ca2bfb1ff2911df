//! Configuration for stackconf.
//!
//! This crate handles:
//! - KDL config file parsing into a metadata tree
//! - Merging facts, instance metadata and environment overrides
//! - Typed settings resolved once from the merged tree
//! - Fact lookups that depend on the Puppet version
//! - `{{ }}` template expansion against host metadata

pub mod error;
pub mod facts;
pub mod file;
pub mod metadata;
pub mod settings;
pub mod sources;
pub mod template;

pub use error::{ConfigError, ConfigResult};
pub use facts::FactView;
pub use metadata::HostMetadata;
pub use settings::Settings;
pub use template::{TemplateContext, TemplateError};
