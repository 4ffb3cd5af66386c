//! 工具调用结果：失败也是数据，不会以错误形式逃逸

use serde::Serialize;
use serde_json::Value;

use crate::core::ToolError;

/// 单次工具调用的结果（创建后不可变）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success { value: Value },
    Failure { message: String, kind: String },
}

impl ToolResult {
    pub fn success(value: Value) -> Self {
        ToolResult::Success { value }
    }

    pub fn failure(message: impl Into<String>, kind: impl Into<String>) -> Self {
        ToolResult::Failure {
            message: message.into(),
            kind: kind.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::failure("the request was cancelled", "cancelled")
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }

    pub fn kind(&self) -> Option<&str> {
        match self {
            ToolResult::Success { .. } => None,
            ToolResult::Failure { kind, .. } => Some(kind),
        }
    }
}

impl From<ToolError> for ToolResult {
    fn from(e: ToolError) -> Self {
        ToolResult::failure(e.to_string(), e.kind())
    }
}

/// 调用结果 + 重试次数（首次尝试不计入）
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub result: ToolResult,
    pub retries: u32,
}
