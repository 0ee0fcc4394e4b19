//! Tool-invocation transports (spec §6): line-delimited JSON-RPC 2.0 on
//! stdio, or HTTP with Server-Sent Events. Both carry the same envelope
//! and route through the same [`crate::context::CoreContext`]; only the
//! framing differs.

mod rpc;
mod sse;
mod stdio;

pub use rpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use sse::serve_sse;
pub use stdio::serve_stdio;

use std::sync::Arc;

use serde_json::Value;

use crate::core::{CoreError, InputError};
use crate::orchestrator::llm::ExternalLlmPort;
use crate::tools::ToolDispatcher;

use rpc::core_error_to_jsonrpc;

/// Shared method routing for `initialize`/`ping`/`tools/list`/`tools/call`
/// (spec §6), used by both the stdio and SSE transports so framing is the
/// only thing that differs between them.
async fn handle_request<L: ExternalLlmPort>(
    dispatcher: &ToolDispatcher<L>,
    request: JsonRpcRequest,
) -> JsonRpcResponse {
    match request.method.as_str() {
        "initialize" => JsonRpcResponse::success(
            request.id,
            serde_json::json!({
                "protocolVersion": "2.0",
                "serverInfo": { "name": "mnemosd", "version": env!("CARGO_PKG_VERSION") },
            }),
        ),
        "ping" => JsonRpcResponse::success(request.id, serde_json::json!({ "pong": true })),
        "tools/list" => JsonRpcResponse::success(
            request.id,
            serde_json::json!({ "tools": ToolDispatcher::<L>::tool_names() }),
        ),
        "tools/call" => handle_tools_call(dispatcher, request).await,
        other => JsonRpcResponse::method_not_found(request.id, other),
    }
}

async fn handle_tools_call<L: ExternalLlmPort>(
    dispatcher: &ToolDispatcher<L>,
    request: JsonRpcRequest,
) -> JsonRpcResponse {
    let params = request.params.unwrap_or(Value::Null);
    let name = match params.get("name").and_then(Value::as_str) {
        Some(name) => name.to_string(),
        None => {
            let err = core_error_to_jsonrpc(&CoreError::Input(InputError::MalformedRequest(
                "tools/call requires a string 'name' field".to_string(),
            )));
            return JsonRpcResponse::failure(request.id, err);
        }
    };
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| serde_json::json!({}));

    let text = dispatcher.dispatch(&name, arguments).await;
    JsonRpcResponse::success(request.id, serde_json::json!({ "text": text }))
}
