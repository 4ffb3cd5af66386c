//! 模型输出的防御式解码
//!
//! 模型被要求只输出一个 JSON 对象，但常在前后夹带说明文字或 Markdown。
//! 这里只做一件事：取第一个 `{` 到最后一个 `}` 之间的片段解析为对象，并提供读取 action / tool / args 的小工具。
//! 每个失败分支都返回 DecodeError，由 Planner / ReactLoop 换成各自的安全默认值，绝不越过它们的边界。

use serde_json::{Map, Value};
use thiserror::Error;

use crate::tools::ToolArgs;

/// 解码失败原因（仅用于日志，不对外暴露）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("no JSON object found in model output")]
    NoJson,

    #[error("malformed JSON: {0}")]
    Malformed(String),

    #[error("JSON value is not an object")]
    NotAnObject,

    #[error("missing 'action' field")]
    MissingAction,

    #[error("invalid or unregistered tool: {0:?}")]
    InvalidTool(String),

    #[error("invalid args: {0}")]
    InvalidArgs(String),

    #[error("chain has no steps")]
    EmptyChain,
}

/// 取第一个 `{` 到最后一个 `}` 的片段并解析为 JSON 对象
pub fn extract_json_object(raw: &str) -> Result<Map<String, Value>, DecodeError> {
    let start = raw.find('{').ok_or(DecodeError::NoJson)?;
    let end = raw.rfind('}').ok_or(DecodeError::NoJson)?;
    if end < start {
        return Err(DecodeError::NoJson);
    }
    let value: Value = serde_json::from_str(&raw[start..=end])
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(DecodeError::NotAnObject),
    }
}

/// `action` 字段；缺失或不是非空字符串都算缺失
pub fn action(obj: &Map<String, Value>) -> Result<&str, DecodeError> {
    obj.get("action")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(DecodeError::MissingAction)
}

/// 非空的 `tool` 字段
pub fn tool_name(obj: &Map<String, Value>) -> Option<&str> {
    obj.get("tool")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// `args` 字段；缺失或 null 时为空映射，其它非对象值视为错误
pub fn tool_args(obj: &Map<String, Value>) -> Result<ToolArgs, DecodeError> {
    match obj.get("args") {
        None | Some(Value::Null) => Ok(ToolArgs::new()),
        Some(Value::Object(m)) => Ok(m.clone()),
        Some(other) => Err(DecodeError::InvalidArgs(format!(
            "expected an object, got {other}"
        ))),
    }
}
