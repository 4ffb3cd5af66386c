//! Planner：决定本轮是直接回答、调用单个工具，还是按顺序调用一串工具
//!
//! 调用 LLM 得到 JSON 计划，经 decode 解析并按注册表校验。任何解析或校验失败都回退为
//! `Plan::AnswerDirect`，模型调用失败同样回退；只有取消会返回错误。

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::llm::{complete_cancellable, LlmClient, LlmError};
use crate::memory::Message;
use crate::react::decode::{self, DecodeError};
use crate::react::prior_turns;
use crate::tools::{planner_schema_json, ToolArgs, ToolRegistry};

/// 计划中的一次工具调用
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanStep {
    pub tool: String,
    pub args: ToolArgs,
}

impl PlanStep {
    pub fn new(tool: impl Into<String>, args: ToolArgs) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

/// Planner 输出（创建后不可变，由编排层消费一次）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Plan {
    AnswerDirect,
    UseTool(PlanStep),
    UseChain { steps: Vec<PlanStep> },
}

impl Plan {
    /// 按执行顺序列出所有步骤；AnswerDirect 为空
    pub fn steps(&self) -> &[PlanStep] {
        match self {
            Plan::AnswerDirect => &[],
            Plan::UseTool(step) => std::slice::from_ref(step),
            Plan::UseChain { steps } => steps,
        }
    }

    pub fn needs_tools(&self) -> bool {
        !self.steps().is_empty()
    }
}

/// 把模型原始输出解析为计划；失败时记录日志并回退为 AnswerDirect
pub fn parse_plan(raw: &str, registry: &ToolRegistry) -> Plan {
    match try_parse_plan(raw, registry) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::warn!(error = %e, "planner output rejected, answering directly");
            Plan::AnswerDirect
        }
    }
}

fn try_parse_plan(raw: &str, registry: &ToolRegistry) -> Result<Plan, DecodeError> {
    let obj = decode::extract_json_object(raw)?;
    let action = decode::action(&obj)?;

    match action {
        "answer_direct" => Ok(Plan::AnswerDirect),
        "use_tool" => {
            let tool = decode::tool_name(&obj).unwrap_or_default();
            let args = decode::tool_args(&obj)?;
            Ok(Plan::UseTool(validated_step(tool, args, registry)?))
        }
        "use_tools" => {
            let raw_steps = obj
                .get("steps")
                .and_then(|v| v.as_array())
                .ok_or(DecodeError::EmptyChain)?;
            if raw_steps.is_empty() {
                return Err(DecodeError::EmptyChain);
            }
            let steps = raw_steps
                .iter()
                .map(|s| {
                    let step = s.as_object().ok_or(DecodeError::NotAnObject)?;
                    let tool = decode::tool_name(step).unwrap_or_default();
                    validated_step(tool, decode::tool_args(step)?, registry)
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Plan::UseChain { steps })
        }
        // 模型省略了外层 action，直接把工具名写在 action 里
        other => {
            let args = decode::tool_args(&obj)?;
            Ok(Plan::UseTool(validated_step(other, args, registry)?))
        }
    }
}

fn validated_step(tool: &str, args: ToolArgs, registry: &ToolRegistry) -> Result<PlanStep, DecodeError> {
    if tool.is_empty() || !registry.contains(tool) {
        return Err(DecodeError::InvalidTool(tool.to_string()));
    }
    registry
        .check_arg_names(tool, &args)
        .map_err(|e| DecodeError::InvalidArgs(e.to_string()))?;
    Ok(PlanStep::new(tool, args))
}

/// Planner：持有 LLM 与只读工具注册表
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<ToolRegistry>) -> Self {
        Self { llm, registry }
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "You are a planning assistant for a chatbot.\n\
             Your job is NOT to answer the user, but to decide whether answering needs any of the tools below.\n\
             \n\
             Tools you can choose from:\n\
             {catalogue}\n\
             \n\
             You must respond ONLY with a single JSON object on one line, in one of these shapes:\n\
             {{\"action\": \"answer_direct\"}}\n\
             {{\"action\": \"use_tool\", \"tool\": \"get_time\", \"args\": {{}}}}\n\
             {{\"action\": \"use_tools\", \"steps\": [{{\"tool\": \"get_time\", \"args\": {{}}}}, {{\"tool\": \"fake_weather\", \"args\": {{\"location\": \"Paris\"}}}}]}}\n\
             Do NOT include any explanation, comments, or markdown.\n\
             \n\
             Rules:\n\
             - If the question is simple chit-chat or general knowledge, use \"answer_direct\".\n\
             - If exactly one tool is needed, use \"use_tool\".\n\
             - If several tools are needed, list them in order with \"use_tools\".\n\
             - Only pass the parameters a tool declares.\n\
             \n\
             JSON schema of a valid response:\n\
             {schema}",
            catalogue = self.registry.catalogue(),
            schema = planner_schema_json(),
        )
    }

    /// system + 之前的对话 + 本轮用户消息
    pub fn build_messages(&self, message: &str, history: &[Message]) -> Vec<Message> {
        let mut messages = vec![Message::system(self.system_prompt())];
        messages.extend(prior_turns(history, message).iter().cloned());
        messages.push(Message::user(format!(
            "User Message: {message}\nPlanner JSON Response:"
        )));
        messages
    }

    /// 生成计划；除取消外绝不失败
    pub async fn plan(
        &self,
        message: &str,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> Result<Plan, AgentError> {
        let messages = self.build_messages(message, history);
        let raw = match complete_cancellable(self.llm.as_ref(), &messages, cancel).await {
            Ok(raw) => raw,
            Err(LlmError::Cancelled) => return Err(AgentError::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "planner model call failed, answering directly");
                return Ok(Plan::AnswerDirect);
            }
        };
        tracing::debug!(raw = %raw, "planner output");
        let plan = parse_plan(&raw, &self.registry);
        tracing::debug!(plan = ?plan, "plan");
        Ok(plan)
    }
}
