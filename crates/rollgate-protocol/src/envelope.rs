//! JSON-RPC 2.0 envelopes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::result::{InvocationResult, ProtocolErrorKind, TransportFailure, TransportFailureKind};

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
/// Server-defined range; used by tool servers for rejected credentials.
pub const UNAUTHORIZED: i64 = -32001;

/// Outgoing request: `{"jsonrpc":"2.0","method":..,"params":..,"id":..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Map<String, Value>,
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(method: &str, params: Map<String, Value>, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id,
        }
    }
}

/// Incoming reply. Exactly one of `result`/`error` is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    /// Whether this reply answers request `id` (numeric or string form).
    pub fn matches(&self, id: u64) -> bool {
        match &self.id {
            Some(Value::Number(n)) => n.as_u64() == Some(id),
            Some(Value::String(s)) => s == &id.to_string(),
            _ => false,
        }
    }

    /// Reduce to an invocation outcome. A reply carrying both or neither
    /// of `result`/`error` is a decode failure.
    pub fn into_result(self) -> Result<InvocationResult, TransportFailure> {
        match (self.result, self.error) {
            (Some(payload), None) => Ok(InvocationResult::Success { payload }),
            (None, Some(err)) => Ok(InvocationResult::ProtocolError {
                kind: ProtocolErrorKind::from_code(err.code),
                code: Some(err.code),
                message: err.message,
            }),
            (Some(_), Some(_)) => Err(TransportFailure::new(
                TransportFailureKind::Decode,
                "reply carries both result and error",
            )),
            (None, None) => Err(TransportFailure::new(
                TransportFailureKind::Decode,
                "reply carries neither result nor error",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_wire_shape() {
        let mut params = Map::new();
        params.insert("name".into(), json!("add_numbers"));
        let req = JsonRpcRequest::new("tools/call", params, 7);
        let wire = serde_json::to_value(&req).unwrap();
        assert_eq!(
            wire,
            json!({"jsonrpc": "2.0", "method": "tools/call", "params": {"name": "add_numbers"}, "id": 7})
        );
    }

    #[test]
    fn matches_numeric_and_string_ids() {
        let numeric: JsonRpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 3, "result": {}})).unwrap();
        let string: JsonRpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": "3", "result": {}})).unwrap();
        let notification: JsonRpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "method": "notifications/progress"}))
                .unwrap();
        assert!(numeric.matches(3));
        assert!(string.matches(3));
        assert!(!numeric.matches(4));
        assert!(!notification.matches(3));
    }

    #[test]
    fn error_reply_maps_kind() {
        let reply: JsonRpcResponse = serde_json::from_value(
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32601, "message": "Method not found"}}),
        )
        .unwrap();
        match reply.into_result().unwrap() {
            InvocationResult::ProtocolError { kind, code, message } => {
                assert_eq!(kind, ProtocolErrorKind::MethodNotFound);
                assert_eq!(code, Some(METHOD_NOT_FOUND));
                assert_eq!(message, "Method not found");
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[test]
    fn empty_reply_is_decode_failure() {
        let reply: JsonRpcResponse = serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1})).unwrap();
        let err = reply.into_result().unwrap_err();
        assert_eq!(err.kind, TransportFailureKind::Decode);
    }
}
