//! Line-delimited JSON-RPC over stdio (spec §6): each line on stdin is one
//! JSON-RPC request; stdout carries only protocol frames, one per line.
//! All diagnostics go to stderr via `tracing`, never stdout.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::orchestrator::llm::ExternalLlmPort;
use crate::tools::ToolDispatcher;

use super::rpc::{JsonRpcRequest, JsonRpcResponse};

/// Runs the stdio read loop until stdin closes (EOF), returning the
/// process exit code (spec §6: 0 on clean shutdown).
pub async fn serve_stdio<L: ExternalLlmPort>(dispatcher: Arc<ToolDispatcher<L>>) -> i32 {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                return 1;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(&dispatcher, &line).await;
        let Ok(serialized) = serde_json::to_string(&response) else {
            tracing::error!("failed to serialize JSON-RPC response");
            continue;
        };

        if let Err(e) = stdout.write_all(serialized.as_bytes()).await {
            tracing::error!(error = %e, "stdout write failed");
            return 1;
        }
        if let Err(e) = stdout.write_all(b"\n").await {
            tracing::error!(error = %e, "stdout write failed");
            return 1;
        }
        if let Err(e) = stdout.flush().await {
            tracing::error!(error = %e, "stdout flush failed");
            return 1;
        }
    }

    0
}

async fn handle_line<L: ExternalLlmPort>(
    dispatcher: &ToolDispatcher<L>,
    line: &str,
) -> JsonRpcResponse {
    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return JsonRpcResponse::invalid_request(None, format!("malformed JSON-RPC envelope: {e}")),
    };

    super::handle_request(dispatcher, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::{LexiconEmotionalAnalyzer, LexiconSemanticAnalyzer};
    use crate::orchestrator::{Orchestrator, StubLlmPort};
    use crate::store::PersistenceStore;
    use std::time::Duration;

    fn dispatcher() -> (tempfile::TempDir, ToolDispatcher<StubLlmPort>) {
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
        (dir, ToolDispatcher::new(Arc::new(orchestrator)))
    }

    #[tokio::test]
    async fn malformed_line_returns_invalid_request() {
        let (_dir, dispatcher) = dispatcher();
        let response = handle_line(&dispatcher, "not json").await;
        assert!(response.error.is_some());
        assert_eq!(response.error.unwrap().code, -32600);
    }

    #[tokio::test]
    async fn ping_returns_pong_result() {
        let (_dir, dispatcher) = dispatcher();
        let line = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
        let response = handle_line(&dispatcher, line).await;
        assert!(response.error.is_none());
        assert_eq!(response.result, Some(serde_json::json!({"pong": true})));
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let (_dir, dispatcher) = dispatcher();
        let line = r#"{"jsonrpc":"2.0","id":1,"method":"bogus"}"#;
        let response = handle_line(&dispatcher, line).await;
        assert_eq!(response.error.unwrap().code, -32601);
    }
}
