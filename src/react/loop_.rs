//! ReAct 主循环
//!
//! Deciding -> (use_tool) Observing -> Deciding ... -> Finished。
//! 每轮把所有观察拼进 prompt 让模型决定下一步；决策解析失败时直接以道歉文本结束，
//! 未知工具只记为观察不终止循环。迭代次数有硬上限，耗尽时用已收集的观察拼出兜底回答。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::llm::{complete_cancellable, LlmClient, LlmError};
use crate::memory::Message;
use crate::react::chain::render_value;
use crate::react::decode::{self, DecodeError};
use crate::react::planner::PlanStep;
use crate::react::{prior_turns, ReactEvent};
use crate::tools::{decision_schema_json, ToolInvoker, ToolResult};

/// 单次对话内默认最大决策轮数
pub const DEFAULT_MAX_ITERATIONS: usize = 5;
/// 决策预览最大字符数
const DECISION_PREVIEW_CHARS: usize = 300;

const NO_JSON_ANSWER: &str = "I couldn't process that request.";
const PARSE_ERROR_ANSWER: &str = "I encountered an error processing your request.";
const NO_ANSWER: &str = "No answer provided";

/// 每轮模型决策
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// 调用工具（名称未必已注册）
    UseTool(PlanStep),
    Finish(String),
}

/// 循环状态
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    Deciding,
    Observing(PlanStep),
    Finished(String),
}

/// 一轮 ReAct 的结果；observations 仅在本轮内有效，不跨轮保留
#[derive(Debug, Clone, PartialEq)]
pub struct ReactOutcome {
    pub answer: String,
    pub observations: Vec<String>,
    /// 实际发出的决策调用次数
    pub iterations: usize,
    /// 是否因迭代上限结束
    pub exhausted: bool,
}

/// 解析模型决策；任何失败都变成带道歉文本的 Finish
pub fn parse_decision(raw: &str) -> Decision {
    match try_parse_decision(raw) {
        Ok(d) => d,
        Err(DecodeError::NoJson) => {
            tracing::warn!("decision has no JSON object, finishing");
            Decision::Finish(NO_JSON_ANSWER.to_string())
        }
        Err(e) => {
            tracing::warn!(error = %e, "decision rejected, finishing");
            Decision::Finish(PARSE_ERROR_ANSWER.to_string())
        }
    }
}

fn try_parse_decision(raw: &str) -> Result<Decision, DecodeError> {
    let obj = decode::extract_json_object(raw)?;
    match decode::action(&obj)? {
        "finish" => {
            let answer = obj
                .get("answer")
                .map(render_value)
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| NO_ANSWER.to_string());
            Ok(Decision::Finish(answer))
        }
        "use_tool" => {
            let tool = decode::tool_name(&obj).unwrap_or_default();
            Ok(Decision::UseTool(PlanStep::new(tool, decode::tool_args(&obj)?)))
        }
        // 与 Planner 相同的宽松回退：action 即工具名
        other => Ok(Decision::UseTool(PlanStep::new(other, decode::tool_args(&obj)?))),
    }
}

/// 观察文本：成功 `Tool {name} returned {value}`，失败 `Tool {name} failed: {message}`
pub fn observation_text(tool: &str, result: &ToolResult) -> String {
    match result {
        ToolResult::Success { value } => format!("Tool {tool} returned {}", render_value(value)),
        ToolResult::Failure { message, .. } => format!("Tool {tool} failed: {message}"),
    }
}

/// 每条观察一行：`Observation {i}: {text}`（从 1 开始，原文不转义）
fn render_observations(observations: &[String]) -> String {
    observations
        .iter()
        .enumerate()
        .map(|(i, o)| format!("Observation {}: {}", i + 1, o))
        .collect::<Vec<_>>()
        .join("\n")
}

fn send_event(tx: Option<&UnboundedSender<ReactEvent>>, ev: ReactEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

fn preview(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}

/// ReAct 循环：持有 LLM、工具调用器与迭代上限
pub struct ReactLoop {
    llm: Arc<dyn LlmClient>,
    invoker: Arc<ToolInvoker>,
    max_iterations: usize,
}

impl ReactLoop {
    pub fn new(llm: Arc<dyn LlmClient>, invoker: Arc<ToolInvoker>) -> Self {
        Self {
            llm,
            invoker,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n.max(1);
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "You are a ReAct agent. Your job is to decide what to do next.\n\
             Available tools:\n\
             {catalogue}\n\
             \n\
             You must respond with a single JSON object in one of two formats:\n\
             1. To use a tool (when you need more information):\n\
             {{\"action\": \"use_tool\", \"tool\": \"get_time\", \"args\": {{}}}}\n\
             2. To finish (when you have enough information to answer):\n\
             {{\"action\": \"finish\", \"answer\": \"The time is 3PM\"}}\n\
             \n\
             Think step by step:\n\
             - What information do I need?\n\
             - Do I already have it from previous observations?\n\
             - If not, which tool should I use?\n\
             - If yes, provide the final answer.\n\
             \n\
             JSON schema of a valid response:\n\
             {schema}",
            catalogue = self.invoker.registry().catalogue(),
            schema = decision_schema_json(),
        )
    }

    /// 本轮的 user prompt：问题 + 已有观察（`Observation {i}: {text}`，从 1 开始）
    pub fn user_prompt(message: &str, observations: &[String]) -> String {
        if observations.is_empty() {
            return format!("User question: {message}\n\nWhat should I do next?");
        }
        format!(
            "User question: {message}\n\nPrevious observations:\n{}\n\nWhat should I do next?",
            render_observations(observations)
        )
    }

    fn build_messages(&self, message: &str, history: &[Message], observations: &[String]) -> Vec<Message> {
        let mut messages = vec![Message::system(self.system_prompt())];
        messages.extend(prior_turns(history, message).iter().cloned());
        messages.push(Message::user(Self::user_prompt(message, observations)));
        messages
    }

    pub async fn run(
        &self,
        message: &str,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> Result<ReactOutcome, AgentError> {
        self.run_with_events(message, history, cancel, None).await
    }

    /// 执行 ReAct 循环；可选 event_tx 推送过程事件
    pub async fn run_with_events(
        &self,
        message: &str,
        history: &[Message],
        cancel: &CancellationToken,
        event_tx: Option<&UnboundedSender<ReactEvent>>,
    ) -> Result<ReactOutcome, AgentError> {
        let mut observations: Vec<String> = Vec::new();
        let mut iterations = 0;
        let mut state = LoopState::Deciding;

        loop {
            state = match state {
                LoopState::Deciding => {
                    if iterations >= self.max_iterations {
                        break;
                    }
                    if cancel.is_cancelled() {
                        return Err(AgentError::Cancelled);
                    }
                    iterations += 1;
                    send_event(event_tx, ReactEvent::Step {
                        step: iterations,
                        max_steps: self.max_iterations,
                    });

                    let messages = self.build_messages(message, history, &observations);
                    match complete_cancellable(self.llm.as_ref(), &messages, cancel).await {
                        Ok(raw) => {
                            tracing::debug!(iteration = iterations, raw = %raw, "react decision");
                            send_event(event_tx, ReactEvent::Decision {
                                preview: preview(&raw, DECISION_PREVIEW_CHARS),
                            });
                            match parse_decision(&raw) {
                                Decision::UseTool(step) => LoopState::Observing(step),
                                Decision::Finish(answer) => LoopState::Finished(answer),
                            }
                        }
                        Err(LlmError::Cancelled) => return Err(AgentError::Cancelled),
                        Err(e) => {
                            tracing::warn!(error = %e, "react model call failed");
                            LoopState::Finished(e.user_message().to_string())
                        }
                    }
                }
                LoopState::Observing(step) => {
                    let observation = if self.invoker.registry().contains(&step.tool) {
                        send_event(event_tx, ReactEvent::ToolCall {
                            tool: step.tool.clone(),
                            args: serde_json::Value::Object(step.args.clone()),
                        });
                        let result = self.invoker.invoke(&step.tool, &step.args, cancel).await;
                        if cancel.is_cancelled() && result.kind() == Some("cancelled") {
                            return Err(AgentError::Cancelled);
                        }
                        if let ToolResult::Failure { message, .. } = &result {
                            send_event(event_tx, ReactEvent::ToolFailure {
                                tool: step.tool.clone(),
                                reason: message.clone(),
                            });
                        }
                        observation_text(&step.tool, &result)
                    } else {
                        format!("Unknown tool: {}", step.tool)
                    };
                    observations.push(observation);
                    send_event(event_tx, ReactEvent::Observation {
                        index: observations.len(),
                        text: observations.last().cloned().unwrap_or_default(),
                    });
                    LoopState::Deciding
                }
                LoopState::Finished(answer) => {
                    send_event(event_tx, ReactEvent::Finished {
                        answer: answer.clone(),
                        exhausted: false,
                    });
                    return Ok(ReactOutcome {
                        answer,
                        observations,
                        iterations,
                        exhausted: false,
                    });
                }
            };
        }

        tracing::warn!(iterations, "react iteration budget exhausted");
        let answer = format!(
            "I gathered information but couldn't form a complete answer. Observations:\n{}",
            render_observations(&observations)
        );
        send_event(event_tx, ReactEvent::Finished {
            answer: answer.clone(),
            exhausted: true,
        });
        Ok(ReactOutcome {
            answer,
            observations,
            iterations,
            exhausted: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RetryConfig;
    use crate::llm::{ScriptedLlmClient, ScriptedReply};
    use crate::tools::{builtin_registry, ToolArgs};

    fn react(llm: Arc<ScriptedLlmClient>) -> ReactLoop {
        let invoker = ToolInvoker::new(Arc::new(builtin_registry()), RetryConfig::no_retry());
        ReactLoop::new(llm, Arc::new(invoker))
    }

    #[test]
    fn test_parse_decision_variants() {
        assert_eq!(
            parse_decision(r#"{"action":"finish","answer":"It is noon."}"#),
            Decision::Finish("It is noon.".into())
        );
        assert_eq!(
            parse_decision(r#"{"action":"finish"}"#),
            Decision::Finish(NO_ANSWER.into())
        );
        assert_eq!(
            parse_decision(r#"Thought: need time. {"action":"use_tool","tool":"get_time","args":{}}"#),
            Decision::UseTool(PlanStep::new("get_time", ToolArgs::new()))
        );
        assert_eq!(
            parse_decision(r#"{"action":"random_number"}"#),
            Decision::UseTool(PlanStep::new("random_number", ToolArgs::new()))
        );
        assert_eq!(parse_decision("no idea"), Decision::Finish(NO_JSON_ANSWER.into()));
        assert_eq!(
            parse_decision("{broken"),
            Decision::Finish(NO_JSON_ANSWER.into())
        );
        assert_eq!(
            parse_decision("{broken}"),
            Decision::Finish(PARSE_ERROR_ANSWER.into())
        );
    }

    #[test]
    fn test_user_prompt_renders_observations() {
        let prompt = ReactLoop::user_prompt("time?", &["Tool get_time returned x".into(), "y".into()]);
        assert!(prompt.contains("Observation 1: Tool get_time returned x\nObservation 2: y"));
        assert!(!ReactLoop::user_prompt("time?", &[]).contains("Observation"));
    }

    #[tokio::test]
    async fn test_tool_then_finish() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"action": "use_tool", "tool": "get_time", "args": {}}"#,
            r#"{"action": "finish", "answer": "It's tea time."}"#,
        ]));
        let outcome = react(llm.clone())
            .run("what time is it?", &[], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.answer, "It's tea time.");
        assert_eq!(llm.call_count(), 2);
        assert_eq!(outcome.iterations, 2);
        assert!(!outcome.exhausted);
        assert_eq!(outcome.observations.len(), 1);
        assert!(outcome.observations[0].starts_with("Tool get_time returned {\"time\":"));

        // 第二次决策能看到第一次的观察
        let second = &llm.requests()[1];
        assert!(second.last().unwrap().content.contains("Observation 1: Tool get_time returned"));
    }

    #[tokio::test]
    async fn test_unknown_tool_exhausts_budget() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"action": "use_tool", "tool": "unknown_tool", "args": {}}"#,
        ]));
        let outcome = react(llm.clone())
            .with_max_iterations(3)
            .run("do something", &[], &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.exhausted);
        assert_eq!(llm.call_count(), 3);
        assert_eq!(outcome.observations, vec!["Unknown tool: unknown_tool"; 3]);
        assert!(outcome.answer.contains("couldn't form a complete answer"));
        assert!(outcome.answer.contains("Observation 3: Unknown tool: unknown_tool"));
    }

    #[tokio::test]
    async fn test_default_budget_is_five_decisions() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"action": "use_tool", "tool": "unknown_tool"}"#,
        ]));
        let react = react(llm.clone());
        assert_eq!(react.max_iterations(), DEFAULT_MAX_ITERATIONS);

        let outcome = react
            .run("loop forever", &[], &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.exhausted);
        assert_eq!(outcome.iterations, 5);
        assert_eq!(llm.call_count(), 5);
        assert_eq!(outcome.observations.len(), 5);
    }

    #[tokio::test]
    async fn test_exhaustion_answer_quotes_observations_verbatim() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"action": "use_tool", "tool": "fake_weather", "args": {"location": "Oslo"}}"#,
        ]));
        let outcome = react(llm)
            .with_max_iterations(1)
            .run("weather?", &[], &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.exhausted);
        let observation = &outcome.observations[0];
        assert!(observation.contains(r#""location":"Oslo""#));
        assert!(outcome.answer.contains(observation.as_str()), "{}", outcome.answer);
        assert!(!outcome.answer.contains('\\'));
    }

    #[tokio::test]
    async fn test_tool_failure_is_observed_and_loop_continues() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"action": "use_tool", "tool": "failing_tool"}"#,
            r#"{"action": "finish", "answer": "Sorry, that service is down."}"#,
        ]));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let outcome = react(llm)
            .run_with_events("try it", &[], &CancellationToken::new(), Some(&tx))
            .await
            .unwrap();
        assert_eq!(outcome.answer, "Sorry, that service is down.");
        assert_eq!(
            outcome.observations,
            vec!["Tool failing_tool failed: temporary failure: upstream service unavailable"]
        );

        drop(tx);
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert!(events.iter().any(|e| matches!(e, ReactEvent::ToolFailure { tool, .. } if tool == "failing_tool")));
        assert!(matches!(
            events.last(),
            Some(ReactEvent::Finished { exhausted: false, .. })
        ));
    }

    #[tokio::test]
    async fn test_unparseable_decision_finishes_with_apology() {
        let llm = Arc::new(ScriptedLlmClient::new(["I think the answer is 42"]));
        let outcome = react(llm.clone())
            .run("?", &[], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.answer, NO_JSON_ANSWER);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_model_failure_finishes_with_friendly_text() {
        let llm = Arc::new(ScriptedLlmClient::from_replies([ScriptedReply::Fail(
            LlmError::RateLimited,
        )]));
        let outcome = react(llm).run("?", &[], &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.answer, LlmError::RateLimited.user_message());
        assert!(!outcome.exhausted);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_decision() {
        let llm = Arc::new(ScriptedLlmClient::new([r#"{"action":"finish","answer":"x"}"#]));
        let token = CancellationToken::new();
        token.cancel();
        let err = react(llm.clone()).run("?", &[], &token).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(llm.call_count(), 0);
    }
}
