//! 模型响应格式的 JSON Schema（schemars 自动生成）
//!
//! 注入 system prompt，减少 LLM 输出格式错误。类型只用于生成 Schema，解析走 react::decode。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};

/// 链式计划中的一步
#[allow(dead_code)]
#[derive(JsonSchema)]
struct StepFormat {
    /// 工具名，如 get_time、fake_weather
    tool: String,
    /// 具名参数；无参数时为 {}
    args: HashMap<String, serde_json::Value>,
}

/// Planner 的三种合法回复
#[allow(dead_code)]
#[derive(JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
enum PlannerFormat {
    AnswerDirect,
    UseTool {
        tool: String,
        args: HashMap<String, serde_json::Value>,
    },
    UseTools {
        steps: Vec<StepFormat>,
    },
}

/// ReAct 每轮决策的两种合法回复
#[allow(dead_code)]
#[derive(JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
enum DecisionFormat {
    UseTool {
        tool: String,
        args: HashMap<String, serde_json::Value>,
    },
    Finish {
        answer: String,
    },
}

/// Planner 回复格式的 JSON Schema 字符串
pub fn planner_schema_json() -> String {
    serde_json::to_string_pretty(&schema_for!(PlannerFormat)).unwrap_or_default()
}

/// ReAct 决策格式的 JSON Schema 字符串
pub fn decision_schema_json() -> String {
    serde_json::to_string_pretty(&schema_for!(DecisionFormat)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planner_schema_mentions_all_actions() {
        let s = planner_schema_json();
        assert!(s.contains("answer_direct"));
        assert!(s.contains("use_tool"));
        assert!(s.contains("use_tools"));
        assert!(!s.contains("finish"));
    }

    #[test]
    fn test_decision_schema_mentions_finish() {
        let s = decision_schema_json();
        assert!(s.contains("finish"));
        assert!(s.contains("answer"));
        assert!(!s.contains("answer_direct"));
    }
}
