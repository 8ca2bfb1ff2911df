//! Client errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("{status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Request(e.to_string())
    }
}

impl From<ClientError> for stackconf_core::Error {
    fn from(e: ClientError) -> Self {
        use stackconf_core::Error;
        match e {
            ClientError::Api { status: 404, body } => Error::NotFound(body),
            ClientError::Api { status: 401, body } | ClientError::Api { status: 403, body } => {
                Error::Unauthorized(body)
            }
            ClientError::Api { status: 409, body } => Error::Conflict(body),
            ClientError::Parse(msg) => Error::InvalidResponse(msg),
            ClientError::InvalidInput(msg) => Error::InvalidInput(msg),
            other => Error::Remote(other.to_string()),
        }
    }
}
