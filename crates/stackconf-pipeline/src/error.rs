//! Pipeline errors.

use stackconf_clients::ClientError;
use stackconf_config::{ConfigError, TemplateError};
use stackconf_core::ResourceKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("{op} {collection} failed after {attempts} attempts: {last_error}")]
    MutationExhausted {
        op: String,
        collection: String,
        attempts: usize,
        last_error: String,
    },

    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Core(#[from] stackconf_core::Error),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl PipelineError {
    /// Missing configuration for `key`.
    pub fn missing(key: &str) -> Self {
        PipelineError::Config(ConfigError::MissingField(key.to_string()))
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
