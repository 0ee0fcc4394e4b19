//! JSON-RPC 2.0 envelope and the error-code mapping shared by both
//! transports (spec §6: "errors follow the JSON-RPC error object shape
//! with codes −32600..−32099 mapped to the taxonomy in §7").

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{CoreError, ExternalError, InputError, SecurityError, StateError, SystemError};

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    pub fn failure(id: Option<Value>, error: JsonRpcError) -> Self {
        Self { jsonrpc: "2.0", id, result: None, error: Some(error) }
    }

    pub fn method_not_found(id: Option<Value>, method: &str) -> Self {
        Self::failure(
            id,
            JsonRpcError { code: -32601, message: format!("method not found: {method}"), data: None },
        )
    }

    pub fn invalid_request(id: Option<Value>, detail: impl Into<String>) -> Self {
        Self::failure(id, JsonRpcError { code: -32600, message: detail.into(), data: None })
    }
}

/// Maps a [`CoreError`] onto a JSON-RPC error code within the reserved
/// −32600..−32099 band, preserving the error taxonomy kind tag in `data`
/// for clients that want the precise variant.
pub fn core_error_to_jsonrpc(err: &CoreError) -> JsonRpcError {
    let code: i64 = match err {
        CoreError::Input(InputError::SchemaViolation(_))
        | CoreError::Input(InputError::ArgumentOutOfRange(_))
        | CoreError::Input(InputError::MalformedRequest(_)) => -32602,
        CoreError::System(SystemError::InternalInvariant(_))
        | CoreError::System(SystemError::OutOfMemory)
        | CoreError::System(SystemError::IoFailure(_)) => -32603,
        CoreError::State(StateError::MissingParent(_))
        | CoreError::State(StateError::HierarchyViolation(_)) => -32000,
        CoreError::State(StateError::VersionMismatch { .. }) => -32001,
        CoreError::State(StateError::CorruptBlob(_)) => -32002,
        CoreError::External(ExternalError::LlmTimeout(_)) => -32010,
        CoreError::External(ExternalError::LlmRejected(_)) => -32011,
        CoreError::External(ExternalError::RedisUnavailable(_)) => -32012,
        CoreError::Security(SecurityError::ManipulationCritical)
        | CoreError::Security(SecurityError::PrincipalLoyaltyBreach)
        | CoreError::Security(SecurityError::ValidatorOverrideIrrecoverable) => -32020,
    };

    JsonRpcError {
        code,
        message: err.to_string(),
        data: Some(serde_json::json!({ "kind": err.kind() })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_map_to_invalid_params() {
        let err = CoreError::Input(InputError::SchemaViolation("missing x".into()));
        assert_eq!(core_error_to_jsonrpc(&err).code, -32602);
    }

    #[test]
    fn security_errors_stay_in_reserved_band() {
        let err = CoreError::Security(SecurityError::ValidatorOverrideIrrecoverable);
        let mapped = core_error_to_jsonrpc(&err);
        assert!((-32099..=-32000).contains(&mapped.code));
    }
}
