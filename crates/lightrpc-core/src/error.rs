use thiserror::Error;

use crate::protocol::{RpcError, INVALID_PARAMS};

/// Parameter codec errors. All of them surface to a peer as invalid params.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Types don't match for {path}. Expected {expected} from the JSON, instead got {found}")]
    Mismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Expecting number input for {path}, but got {found}")]
    ExpectedNumber { path: String, found: &'static str },

    #[error("Field {path} isn't settable. Are you sure it's exported?")]
    Unsettable { path: String },

    #[error("No exported field found {path}")]
    UnknownField { path: String },

    #[error("Invalid hex string for {path}: {source}")]
    Hex {
        path: String,
        #[source]
        source: hex::FromHexError,
    },

    #[error("Too many parameters. Expected {expected}, received {received}. See `help {method}` for expected usage")]
    TooManyParams {
        expected: usize,
        received: usize,
        method: String,
    },
}

impl From<CodecError> for RpcError {
    fn from(err: CodecError) -> Self {
        RpcError::new(INVALID_PARAMS, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Configuration validation error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Framer errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame exceeds {limit} bytes without a delimiter")]
    TooLong { limit: usize },
}
