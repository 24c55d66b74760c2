//! LightRPC core
//!
//! Shared pieces of the JSON-RPC 2.0 engine: identifiers, message shapes,
//! the parameter codec, `\n\n` framing and engine configuration.

pub mod config;
pub mod error;
pub mod framing;
pub mod id;
pub mod method;
pub mod params;
pub mod protocol;

pub use config::{Direction, EngineConfig};
pub use error::{CodecError, ConfigError, FrameError};
pub use framing::FrameCodec;
pub use id::Id;
pub use method::Method;
pub use params::{FieldSpec, Param, Params};
pub use protocol::{
    IncomingRequest, Message, RawResponse, Request, Response, ResponseError, RpcError,
};

#[doc(hidden)]
pub use serde_json;
