use lightrpc_core::ConfigError;

use crate::registry::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Server is shutdown")]
    Shutdown,

    #[error("Server already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, ServerError>;
