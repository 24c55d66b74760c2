//! LightRPC Server Library
//!
//! Serves registered methods to JSON-RPC 2.0 peers over a stream pair or a
//! Unix socket.

mod connection;
mod dispatch;
mod error;
pub mod method;
pub mod registry;
mod server;

pub use async_trait::async_trait;
pub use error::{Result, ServerError};
pub use method::{Handler, ServerMethod};
pub use registry::{MethodRegistry, RegistryError};
pub use server::Server;
