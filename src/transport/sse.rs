//! HTTP + Server-Sent Events transport (§6): `POST /mcp` accepts the
//! same JSON-RPC envelope as stdio and streams back a single SSE `event:
//! message` frame carrying the response. Mirrors the
//! state-in-`axum::extract::State` REST-router shape, with a router built
//! once in [`serve_sse`] rather than per-request.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::orchestrator::llm::ExternalLlmPort;
use crate::tools::ToolDispatcher;

use super::rpc::JsonRpcRequest;

#[derive(Clone)]
struct SseState<L: ExternalLlmPort> {
    dispatcher: Arc<ToolDispatcher<L>>,
}

/// Binds `addr` and serves the SSE transport until the process is signaled
/// to shut down, returning the process exit code (spec §6).
pub async fn serve_sse<L: ExternalLlmPort>(dispatcher: Arc<ToolDispatcher<L>>, addr: SocketAddr) -> i32 {
    let state = SseState { dispatcher };
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/mcp", post(handle_mcp))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind SSE transport");
            return 1;
        }
    };

    tracing::info!(%addr, "SSE transport listening");
    if let Err(e) = axum::serve(listener, router).await {
        tracing::error!(error = %e, "SSE transport exited with error");
        return 1;
    }
    0
}

async fn healthz() -> &'static str {
    "ok"
}

/// Accepts one JSON-RPC request and replies with a one-frame SSE stream
/// (spec §6: "the server MAY stream the same envelope as Server-Sent
/// Events"); a single frame is sufficient since tool calls are not
/// themselves streamed.
async fn handle_mcp<L: ExternalLlmPort>(
    State(state): State<SseState<L>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let response = super::handle_request(&state.dispatcher, request).await;
    let payload = match serde_json::to_string(&response) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize SSE response frame");
            format!(r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":-32603,"message":"internal serialization failure"}}}}"#)
        }
    };

    let event: Result<Event, Infallible> = Ok(Event::default().event("message").data(payload));
    Sse::new(stream::once(async move { event })).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::{LexiconEmotionalAnalyzer, LexiconSemanticAnalyzer};
    use crate::orchestrator::{Orchestrator, StubLlmPort};
    use crate::store::PersistenceStore;

    fn dispatcher() -> (tempfile::TempDir, Arc<ToolDispatcher<StubLlmPort>>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PersistenceStore::open(dir.path()).unwrap());
        let memory = Arc::new(crate::memory::FractalMemory::new(Arc::clone(&store)));
        let orchestrator = Orchestrator::new(
            store,
            memory,
            0.05,
            0.7,
            Arc::new(LexiconEmotionalAnalyzer),
            Arc::new(LexiconSemanticAnalyzer),
            StubLlmPort,
            Duration::from_secs(5),
        )
        .unwrap();
        (dir, Arc::new(ToolDispatcher::new(Arc::new(orchestrator))))
    }

    #[tokio::test]
    async fn handle_mcp_returns_sse_stream_for_ping() {
        let (_dir, dispatcher) = dispatcher();
        let state = SseState { dispatcher };
        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        let _response = handle_mcp(State(state), Json(request)).await;
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        assert_eq!(healthz().await, "ok");
    }
}
