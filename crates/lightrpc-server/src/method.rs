//! Server-side method contract

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use lightrpc_core::error::Result as CodecResult;
use lightrpc_core::{params, Method};

/// A method the server can invoke.
///
/// Implementors are plain params structs: the server builds a fresh
/// `Default` instance per request, fills it from the request params and
/// calls it.
#[async_trait]
pub trait Handler: Method + Default {
    type Output: Serialize;

    async fn call(&self) -> anyhow::Result<Self::Output>;
}

/// Object-safe view of a [`Handler`], as stored in the registry.
#[async_trait]
pub trait ServerMethod: Send + Sync + 'static {
    fn method_name(&self) -> &str;

    /// A zero-value instance of the same method type.
    fn new_instance(&self) -> Box<dyn ServerMethod>;

    fn decode_named(&mut self, params: &Map<String, Value>, strict: bool) -> CodecResult<()>;

    fn decode_positional(&mut self, params: &[Value], strict: bool) -> CodecResult<()>;

    /// Current field values as named params.
    fn encode_params(&self) -> Map<String, Value>;

    async fn invoke(&self) -> anyhow::Result<Value>;
}

#[async_trait]
impl<H: Handler> ServerMethod for H {
    fn method_name(&self) -> &str {
        Method::name(self)
    }

    fn new_instance(&self) -> Box<dyn ServerMethod> {
        Box::new(H::default())
    }

    fn decode_named(&mut self, params: &Map<String, Value>, strict: bool) -> CodecResult<()> {
        params::decode_named(self, params, strict)
    }

    fn decode_positional(&mut self, params: &[Value], strict: bool) -> CodecResult<()> {
        let name = Method::name(self).to_string();
        params::decode_positional(self, params, &name, strict)
    }

    fn encode_params(&self) -> Map<String, Value> {
        params::encode_named(self)
    }

    async fn invoke(&self) -> anyhow::Result<Value> {
        let output = Handler::call(self).await?;
        Ok(serde_json::to_value(output)?)
    }
}
