use lightrpc_core::{ConfigError, ResponseError, RpcError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Client is shutdown")]
    Shutdown,

    #[error("Client already running")]
    AlreadyRunning,

    #[error("Request timed out")]
    TimedOut,

    #[error("Pipe closed unexpectedly, nil result")]
    Closed,

    /// Error object returned by the peer, unchanged.
    #[error("{0}")]
    Rpc(RpcError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl From<ResponseError> for ClientError {
    fn from(err: ResponseError) -> Self {
        match err {
            ResponseError::Rpc(error) => ClientError::Rpc(error),
            ResponseError::Decode(error) => ClientError::Json(error),
            ResponseError::Empty => ClientError::Closed,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
