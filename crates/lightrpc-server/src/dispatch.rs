use serde_json::Value;

use lightrpc_core::protocol::VERSION;
use lightrpc_core::{EngineConfig, Id, IncomingRequest, Response, RpcError};

use crate::method::ServerMethod;
use crate::registry::MethodRegistry;

/// A request ready to be invoked.
pub(crate) struct Call {
    pub id: Option<Id>,
    pub method: Box<dyn ServerMethod>,
}

/// Handle one inbound frame. Returns the response to send back, if any.
pub(crate) async fn process(
    registry: &MethodRegistry,
    config: &EngineConfig,
    frame: &[u8],
) -> Option<Response> {
    let call = match decode(registry, config.strict_mode, frame) {
        Ok(call) => call,
        Err(response) => {
            if let Err(error) = &response.outcome {
                tracing::warn!("Rejected request: {}", error);
            }
            return Some(response);
        }
    };

    let name = call.method.method_name().to_string();
    match call.id {
        None => {
            tracing::debug!("Handling notification {}", name);
            if let Err(e) = call.method.invoke().await {
                tracing::warn!("Notification {} failed: {}", name, e);
            }
            None
        }
        Some(id) => {
            tracing::debug!(%id, "Handling request {}", name);
            let response = match call.method.invoke().await {
                Ok(result) => Response::success(result, Some(id)),
                Err(e) => Response::error(RpcError::application_error(e.to_string()), Some(id)),
            };
            Some(response)
        }
    }
}

/// Parse and validate a frame, then decode its params into a fresh method
/// instance. Failures come back as the error response to send.
pub(crate) fn decode(
    registry: &MethodRegistry,
    strict: bool,
    frame: &[u8],
) -> Result<Call, Response> {
    if frame.is_empty() {
        return Err(Response::error(
            RpcError::invalid_request("Invalid Request"),
            None,
        ));
    }

    // Batches are not supported.
    if frame[0] == b'[' {
        return Err(Response::error(
            RpcError::internal_error("This server can't handle batch requests"),
            None,
        ));
    }

    let request: IncomingRequest = serde_json::from_slice(frame).map_err(|e| {
        let message = format!("Parse error:{} [{}]", e, String::from_utf8_lossy(frame));
        Response::error(RpcError::parse_error(message), None)
    })?;

    let id = request.id;
    let reject = |error: RpcError| Response::error(error, id.clone());

    if request.jsonrpc != VERSION {
        return Err(reject(RpcError::invalid_request(format!(
            r#"Invalid version, expected "{}" got "{}""#,
            VERSION, request.jsonrpc
        ))));
    }

    let name = match request.method {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(name)) => name,
        Some(_) => return Err(reject(RpcError::invalid_request("Invalid Request"))),
    };
    if name.is_empty() {
        return Err(reject(RpcError::invalid_request("`method` cannot be empty")));
    }

    let prototype = registry
        .get(&name)
        .ok_or_else(|| reject(RpcError::method_not_found()))?;
    let mut method = prototype.new_instance();

    let decoded = match &request.params {
        None => Ok(()),
        Some(Value::Array(params)) => method.decode_positional(params, strict),
        Some(Value::Object(params)) => method.decode_named(params, strict),
        Some(_) => return Err(reject(RpcError::invalid_params("Invalid params"))),
    };
    decoded.map_err(|e| reject(RpcError::from(e)))?;

    Ok(Call { id, method })
}
