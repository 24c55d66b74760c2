//! LightRPC Client Library
//!
//! Issues JSON-RPC 2.0 requests and notifications over any byte stream pair
//! and matches the responses back to their callers.

mod client;
mod error;

pub use client::Client;
pub use error::{ClientError, Result};
