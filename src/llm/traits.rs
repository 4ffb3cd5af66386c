//! LLM 客户端抽象
//!
//! 所有后端（Ollama / OpenAI 兼容 / Mock）实现 LlmClient：complete（非流式）、complete_stream（流式文本片段）。
//! `complete_cancellable` 让核心在每次模型调用处观察取消令牌。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use tokio_util::sync::CancellationToken;

use crate::llm::LlmError;
use crate::memory::Message;

/// 流式完成返回的文本片段流
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// LLM 客户端 trait：非流式完成与流式完成（返回文本片段流）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 流式完成；所有片段拼接后应等于 complete 的返回
    async fn complete_stream(&self, messages: &[Message]) -> Result<TextStream, LlmError>;
}

/// 与取消令牌竞争的非流式调用
pub async fn complete_cancellable(
    llm: &dyn LlmClient,
    messages: &[Message],
    cancel: &CancellationToken,
) -> Result<String, LlmError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LlmError::Cancelled),
        r = llm.complete(messages) => r,
    }
}

/// 与取消令牌竞争的流式调用（仅覆盖建立连接阶段，片段消费由调用方处理）
pub async fn complete_stream_cancellable(
    llm: &dyn LlmClient,
    messages: &[Message],
    cancel: &CancellationToken,
) -> Result<TextStream, LlmError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LlmError::Cancelled),
        r = llm.complete_stream(messages) => r,
    }
}
