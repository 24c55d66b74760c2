//! JSON-RPC 2.0 wire shapes

use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use std::fmt;

use crate::id::Id;
use crate::method::Method;
use crate::params::encode_named;

pub const VERSION: &str = "2.0";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
// Shares its code with INTERNAL_ERROR; peers already key off -32603 for both.
pub const INVALID_PARAMS: i32 = -32603;
pub const INTERNAL_ERROR: i32 = -32603;
/// Code used for every error returned by an application method.
pub const APPLICATION_ERROR: i32 = -1;

/// Outbound request or notification.
///
/// `params` is always emitted as a named object; `id` is omitted for
/// notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    pub params: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
}

impl Request {
    pub fn new<M: Method>(id: Id, method: &M) -> Self {
        Self::build(Some(id), method)
    }

    pub fn notification<M: Method>(method: &M) -> Self {
        Self::build(None, method)
    }

    fn build<M: Method>(id: Option<Id>, method: &M) -> Self {
        Self {
            jsonrpc: VERSION.to_string(),
            method: method.name().to_string(),
            params: encode_named(method),
            id,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Request as read off the wire by a server, before dispatch.
///
/// Every member is optional so that whatever identifier is present can be
/// recovered for the error reply even when the rest is invalid.
#[derive(Debug, Deserialize)]
pub struct IncomingRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default, deserialize_with = "deserialize_present")]
    pub method: Option<Value>,
    #[serde(default, deserialize_with = "deserialize_present")]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Id>,
}

/// Server-side response: a result XOR an error.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: Option<Id>,
    pub outcome: std::result::Result<Value, RpcError>,
}

impl Response {
    pub fn success(result: Value, id: Option<Id>) -> Self {
        Self {
            id,
            outcome: Ok(result),
        }
    }

    pub fn error(error: RpcError, id: Option<Id>) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("jsonrpc", VERSION)?;
        match &self.outcome {
            Ok(result) => map.serialize_entry("result", result)?,
            Err(error) => map.serialize_entry("error", error)?,
        }
        map.serialize_entry("id", &self.id)?;
        map.end()
    }
}

/// Anything an engine's writer loop can put on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Response(Response),
}

/// Client-side view of a response. The result is kept as raw JSON until the
/// caller decides what type to decode it into.
#[derive(Debug, Deserialize)]
#[serde(try_from = "RawResponseWire")]
pub struct RawResponse {
    pub id: Option<Id>,
    pub result: Option<Box<RawValue>>,
    pub error: Option<RpcError>,
}

impl RawResponse {
    /// Decode the result, surfacing an error object verbatim instead.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, ResponseError> {
        if let Some(error) = self.error {
            return Err(ResponseError::Rpc(error));
        }
        let raw = self.result.ok_or(ResponseError::Empty)?;
        serde_json::from_str(raw.get()).map_err(ResponseError::Decode)
    }
}

#[derive(Deserialize)]
struct RawResponseWire {
    #[serde(default)]
    id: Option<Id>,
    #[serde(default, deserialize_with = "deserialize_present")]
    result: Option<Box<RawValue>>,
    #[serde(default)]
    error: Option<RpcError>,
}

impl TryFrom<RawResponseWire> for RawResponse {
    type Error = String;

    fn try_from(wire: RawResponseWire) -> Result<Self, Self::Error> {
        if wire.result.is_none() && wire.error.is_none() {
            return Err("Must send either a result or an error in a response".to_string());
        }
        Ok(Self {
            id: wire.id,
            result: wire.result,
            error: wire.error,
        })
    }
}

/// Why a raw response could not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("{0}")]
    Rpc(RpcError),

    #[error("{0}")]
    Decode(serde_json::Error),

    #[error("Must send either a result or an error in a response")]
    Empty,
}

/// JSON-RPC error object. Also used as an error value by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    pub fn method_not_found() -> Self {
        Self::new(METHOD_NOT_FOUND, "Method not found")
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }

    pub fn application_error(message: impl Into<String>) -> Self {
        Self::new(APPLICATION_ERROR, message)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Decode the optional `data` member into a caller-supplied type.
    pub fn parse_data<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.data.clone().unwrap_or(Value::Null))
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// Treats a member that is present but `null` as `Some`, so it can be told
/// apart from a missing member.
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;
    use serde_json::json;

    params! {
        #[derive(Debug, Default, Clone, PartialEq)]
        struct Subtract {
            minuend: i64,
            subtrahend: i64,
        }
    }

    impl Method for Subtract {
        fn name(&self) -> &str {
            "subtract"
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Arbitrary {
        name: String,
        items: Vec<i64>,
    }

    #[test]
    fn test_request_serialization() {
        let req = Request::new(
            Id::Int(1),
            &Subtract {
                minuend: 5,
                subtrahend: 1,
            },
        );

        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"jsonrpc":"2.0","method":"subtract","params":{"minuend":5,"subtrahend":1},"id":1}"#
        );
    }

    #[test]
    fn test_notification_has_no_id() {
        let req = Request::notification(&Subtract {
            minuend: 5,
            subtrahend: 1,
        });

        assert!(req.is_notification());
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"jsonrpc":"2.0","method":"subtract","params":{"minuend":5,"subtrahend":1}}"#
        );
    }

    #[test]
    fn test_response_success_serialization() {
        let resp = Response::success(json!(19), Some(Id::Int(1)));
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"jsonrpc":"2.0","result":19,"id":1}"#);
    }

    #[test]
    fn test_response_null_result_is_still_emitted() {
        let resp = Response::success(Value::Null, Some(Id::from("a")));
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"jsonrpc":"2.0","result":null,"id":"a"}"#);
    }

    #[test]
    fn test_response_error_without_id() {
        let resp = Response::error(
            RpcError::internal_error("This server can't handle batch requests"),
            None,
        );
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(
            json,
            r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"This server can't handle batch requests"},"id":null}"#
        );
    }

    #[test]
    fn test_error_data_round_trip() {
        let error = RpcError::new(2, "omg").with_data(json!({"name": "arbit", "items": [1, 2]}));
        let resp = Response::error(error, Some(Id::from("id")));
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(
            json,
            r#"{"jsonrpc":"2.0","error":{"code":2,"message":"omg","data":{"items":[1,2],"name":"arbit"}},"id":"id"}"#
        );

        let raw: RawResponse = serde_json::from_str(&json).unwrap();
        let error = raw.error.unwrap();
        let data: Arbitrary = error.parse_data().unwrap();
        assert_eq!(data.name, "arbit");
        assert_eq!(data.items, vec![1, 2]);
    }

    #[test]
    fn test_raw_response_keeps_result_raw() {
        let raw: RawResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"29ak","result":"answer"}"#).unwrap();
        assert_eq!(raw.id, Some(Id::from("29ak")));
        assert_eq!(raw.result.as_ref().unwrap().get(), "\"answer\"");

        let answer: String = raw.into_result().unwrap();
        assert_eq!(answer, "answer");
    }

    #[test]
    fn test_raw_response_null_result_is_present() {
        let raw: RawResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        let unit: Option<i64> = raw.into_result().unwrap();
        assert_eq!(unit, None);
    }

    #[test]
    fn test_raw_response_requires_result_or_error() {
        let err = serde_json::from_str::<RawResponse>(r#"{"jsonrpc":"2.0","id":"29ak"}"#)
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Must send either a result or an error in a response"));
    }

    #[test]
    fn test_raw_response_error_is_returned_verbatim() {
        let raw: RawResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"},"id":"1"}"#,
        )
        .unwrap();

        let err = raw.into_result::<i64>().unwrap_err();
        assert_eq!(err.to_string(), "-32601:Method not found");
    }

    #[test]
    fn test_raw_response_wrong_result_type() {
        let raw: RawResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","result":"6","id":1}"#).unwrap();
        let err = raw.into_result::<i64>().unwrap_err();
        assert!(matches!(err, ResponseError::Decode(_)));
    }

    #[test]
    fn test_incoming_request_recovers_id() {
        let req: IncomingRequest =
            serde_json::from_str(r#"{"jsonrpc":"1.0","method":"subtract","id":"x"}"#).unwrap();
        assert_eq!(req.jsonrpc, "1.0");
        assert_eq!(req.method, Some(json!("subtract")));
        assert_eq!(req.params, None);
        assert_eq!(req.id, Some(Id::from("x")));
    }

    #[test]
    fn test_incoming_request_null_params_are_present() {
        let req: IncomingRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"m","params":null}"#).unwrap();
        assert_eq!(req.params, Some(Value::Null));
        assert_eq!(req.id, None);
    }
}
