//! 错误类型
//!
//! - `ToolError`：工具协作方返回的错误，区分可重试（Transient / Timeout）与不可重试；
//! - `AgentError`：一次对话轮次级别的错误（模型调用失败、取消、配置错误）。
//!
//! 计划解析失败不在此列：它在 Planner / ReactLoop 边界内被吸收为安全默认值。

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;

/// 工具执行错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    /// 临时性失败（网络抖动等），可重试
    #[error("temporary failure: {0}")]
    Transient(String),

    /// 单次调用超时，可重试
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// 参数不合法，重试无意义
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Permanent(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolError {
    /// 稳定的错误分类字符串，写入 `ToolResult::Failure.kind`
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Transient(_) => "transient",
            ToolError::Timeout(_) => "timeout",
            ToolError::InvalidArgs(_) => "invalid_args",
            ToolError::Permanent(_) => "permanent",
            ToolError::UnknownTool(_) => "unknown_tool",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ToolError::Transient(_) | ToolError::Timeout(_))
    }
}

/// 对话轮次错误：只有这些会越过核心边界到达编排层
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("model call failed: {0}")]
    Model(LlmError),

    #[error("turn cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),
}

impl From<LlmError> for AgentError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Cancelled => AgentError::Cancelled,
            other => AgentError::Model(other),
        }
    }
}

impl AgentError {
    /// 面向最终用户的一句话，不含原始诊断信息
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Model(e) => e.user_message().to_string(),
            AgentError::Cancelled => "Okay, I stopped working on that.".to_string(),
            AgentError::Config(_) => {
                "I'm not set up correctly right now. Please check the configuration.".to_string()
            }
        }
    }
}
