//! `CoreContext`: the composition root (spec §9, "global mutable
//! singletons" redesign note). Everything the core needs — persistence
//! store, fractal memory, orchestrator, analyzers — is constructed once
//! here at startup and threaded through tool handlers; nothing is a
//! hidden global.

use std::sync::Arc;

use crate::analyzers::{LexiconEmotionalAnalyzer, LexiconSemanticAnalyzer};
use crate::config::Config;
use crate::core::Result;
use crate::memory::FractalMemory;
use crate::orchestrator::{Orchestrator, ReqwestLlmPort, StubLlmPort};
use crate::store::PersistenceStore;
use crate::tools::ToolDispatcher;

/// Picks the external-LLM port at startup: a real `reqwest` client when
/// an endpoint is configured via the environment, otherwise the safe
/// no-network stub (spec §5: "their absence must not prevent the core
/// from serving requests", applied here to the external-LLM collaborator
/// by analogy with Redis/Prometheus optionality).
pub enum LlmBackend {
    Live(ReqwestLlmPort),
    Stub(StubLlmPort),
}

#[async_trait::async_trait]
impl crate::orchestrator::ExternalLlmPort for LlmBackend {
    async fn complete(&self, prompt: &str, deadline: std::time::Duration) -> Result<String> {
        match self {
            LlmBackend::Live(port) => port.complete(prompt, deadline).await,
            LlmBackend::Stub(port) => port.complete(prompt, deadline).await,
        }
    }
}

fn resolve_llm_backend() -> LlmBackend {
    match std::env::var("EXTERNAL_LLM_ENDPOINT") {
        Ok(endpoint) if !endpoint.is_empty() => {
            let model = std::env::var("EXTERNAL_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
            let api_key = std::env::var("EXTERNAL_LLM_API_KEY").ok();
            LlmBackend::Live(ReqwestLlmPort::new(endpoint, model, api_key))
        }
        _ => LlmBackend::Stub(StubLlmPort),
    }
}

/// The process-wide singleton set, built once in `main` and handed to
/// every tool invocation via `Arc`.
pub struct CoreContext {
    pub dispatcher: Arc<ToolDispatcher<LlmBackend>>,
}

impl CoreContext {
    pub fn build(config: &Config) -> Result<Self> {
        let store = Arc::new(PersistenceStore::open(&config.memory_path)?);
        let memory = Arc::new(FractalMemory::new(Arc::clone(&store)));
        let llm = resolve_llm_backend();

        let orchestrator = Orchestrator::new(
            store,
            memory,
            config.phi_alpha,
            config.principal_threshold,
            Arc::new(LexiconEmotionalAnalyzer),
            Arc::new(LexiconSemanticAnalyzer),
            llm,
            config.llm_timeout,
        )
        .map_err(|e| {
            tracing::error!(error = %e, "failed to initialize orchestrator");
            e
        })?;

        Ok(Self { dispatcher: Arc::new(ToolDispatcher::new(Arc::new(orchestrator))) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_default_config_in_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::new();
        config.memory_path = dir.path().to_path_buf();
        let context = CoreContext::build(&config).unwrap();
        assert_eq!(ToolDispatcher::<LlmBackend>::tool_names().len(), 13);
        let _ = context.dispatcher;
    }
}
