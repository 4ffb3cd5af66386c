//! LLM 层：模型调用协作方的抽象与实现（Ollama / OpenAI 兼容 / Mock）

pub mod error;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use error::LlmError;
pub use mock::{MockLlmClient, ScriptedLlmClient, ScriptedReply};
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use traits::{complete_cancellable, complete_stream_cancellable, LlmClient, TextStream};

use crate::config::LlmSection;
use crate::core::AgentError;

/// 根据 [llm] 配置创建客户端
pub fn create_llm_from_config(cfg: &LlmSection) -> Result<Arc<dyn LlmClient>, AgentError> {
    let provider = cfg.provider.trim().to_lowercase();
    tracing::info!(provider = %provider, model = %cfg.model, "creating llm client");
    match provider.as_str() {
        "ollama" => {
            let client = OllamaClient::new(
                cfg.base_url.as_deref(),
                &cfg.model,
                Duration::from_secs(cfg.timeouts.request),
            )
            .map_err(|e| AgentError::Config(format!("cannot build ollama client: {e}")))?;
            Ok(Arc::new(client))
        }
        "openai" => Ok(Arc::new(OpenAiClient::new(
            cfg.base_url.as_deref(),
            &cfg.model,
            cfg.api_key.as_deref(),
        ))),
        "mock" => Ok(Arc::new(MockLlmClient)),
        other => Err(AgentError::Config(format!("unknown llm provider: {other}"))),
    }
}
