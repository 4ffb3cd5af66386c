//! ReAct 过程事件：供 CLI / 前端实时展示决策、工具调用与观察

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 进入第几轮决策（从 1 开始）
    Step { step: usize, max_steps: usize },
    /// 模型的原始决策（预览，避免过长）
    Decision { preview: String },
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 本轮记录的观察
    Observation { index: usize, text: String },
    /// 工具执行失败
    ToolFailure { tool: String, reason: String },
    /// 循环结束
    Finished { answer: String, exhausted: bool },
}
