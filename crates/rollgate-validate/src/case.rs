//! Validation cases: a request template plus a pass predicate.

use std::sync::Arc;

use serde_json::{Map, Value, json};

use rollgate_protocol::{InvocationResult, ProtocolErrorKind};

/// Pure check over one outcome. `Err` carries the failure reason.
pub type Predicate = Arc<dyn Fn(&InvocationResult) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
pub struct ValidationCase {
    pub name: String,
    pub method: String,
    pub params: Map<String, Value>,
    /// Send without credentials.
    pub anonymous: bool,
    predicate: Predicate,
}

impl std::fmt::Debug for ValidationCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationCase")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("anonymous", &self.anonymous)
            .finish_non_exhaustive()
    }
}

impl ValidationCase {
    pub fn new<P>(name: &str, method: &str, params: Map<String, Value>, predicate: P) -> Self
    where
        P: Fn(&InvocationResult) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            method: method.to_string(),
            params,
            anonymous: false,
            predicate: Arc::new(predicate),
        }
    }

    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    pub fn check(&self, result: &InvocationResult) -> Result<(), String> {
        (self.predicate)(result)
    }

    /// `initialize` handshake; passes on any object result.
    pub fn connectivity(protocol_version: &str) -> Self {
        let params = object(json!({
            "protocolVersion": protocol_version,
            "capabilities": {},
            "clientInfo": {"name": "rollgate", "version": env!("CARGO_PKG_VERSION")},
        }));
        Self::new("connectivity", "initialize", params, |result| {
            let payload = success(result)?;
            if payload.is_object() {
                Ok(())
            } else {
                Err(format!("initialize returned non-object result: {payload}"))
            }
        })
    }

    /// `tools/list`; passes iff every descriptor has a name and a schema.
    pub fn capability_discovery() -> Self {
        Self::new("capability_discovery", "tools/list", Map::new(), |result| {
            let payload = success(result)?;
            let tools = payload
                .get("tools")
                .and_then(Value::as_array)
                .ok_or("result has no tools array")?;
            if tools.is_empty() {
                return Err("tools array is empty".to_string());
            }
            for (i, tool) in tools.iter().enumerate() {
                let name = tool.get("name").and_then(Value::as_str).unwrap_or("");
                if name.is_empty() {
                    return Err(format!("tool {i} has no name"));
                }
                if !tool.get("inputSchema").is_some_and(Value::is_object) {
                    return Err(format!("tool '{name}' has no inputSchema"));
                }
            }
            Ok(())
        })
    }

    /// `tools/call` with valid arguments; passes on a non-error content result.
    pub fn successful_invocation(tool: &str, arguments: &Map<String, Value>) -> Self {
        Self::new(
            "successful_invocation",
            "tools/call",
            call_params(tool, arguments),
            expect_tool_content,
        )
    }

    /// `tools/call` with malformed arguments; expects invalid-params.
    pub fn invalid_params(tool: &str, arguments: &Map<String, Value>) -> Self {
        Self::new(
            "invalid_params",
            "tools/call",
            call_params(tool, arguments),
            |result| expect_protocol(result, ProtocolErrorKind::InvalidParams),
        )
    }

    /// Nonexistent method; expects method-not-found.
    pub fn unknown_method(method: &str) -> Self {
        Self::new("unknown_method", method, Map::new(), |result| {
            expect_protocol(result, ProtocolErrorKind::MethodNotFound)
        })
    }

    /// Credential-less `tools/list`; expects an unauthorized rejection.
    pub fn auth_gate() -> Self {
        Self::new("auth_gate", "tools/list", Map::new(), |result| {
            if result.is_unauthorized() {
                Ok(())
            } else {
                Err(format!("expected unauthorized, got {}", result.describe()))
            }
        })
        .anonymous()
    }
}

/// Payload of a tool call: `content` array present and `isError` not set.
pub fn expect_tool_content(result: &InvocationResult) -> Result<(), String> {
    let payload = success(result)?;
    if payload.get("isError").and_then(Value::as_bool) == Some(true) {
        return Err(format!("tool reported an error: {payload}"));
    }
    match payload.get("content").and_then(Value::as_array) {
        Some(content) if !content.is_empty() => Ok(()),
        Some(_) => Err("tool returned empty content".to_string()),
        None => Err(format!("tool result has no content array: {payload}")),
    }
}

fn expect_protocol(result: &InvocationResult, want: ProtocolErrorKind) -> Result<(), String> {
    match result.protocol_kind() {
        Some(kind) if kind == want => Ok(()),
        _ => Err(format!("expected {want:?}, got {}", result.describe())),
    }
}

fn success(result: &InvocationResult) -> Result<&Value, String> {
    result
        .payload()
        .ok_or_else(|| format!("expected success, got {}", result.describe()))
}

fn call_params(tool: &str, arguments: &Map<String, Value>) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("name".to_string(), Value::from(tool));
    params.insert("arguments".to_string(), Value::Object(arguments.clone()));
    params
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
