//! Headless Agent 运行时
//!
//! 对上层（CLI 或其它前端）暴露一轮对话所需的全部操作：
//! plan_turn / execute_plan / run_react_turn / synthesize_answer(_stream)，
//! 以及按配置模式端到端跑完一轮的 respond。
//! Agent 只持有只读组件，`Send + Sync`，多会话可各自在独立 task 中共享同一实例。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::config::{AgentMode, AppConfig};
use crate::core::{AgentError, RetryConfig};
use crate::llm::{create_llm_from_config, LlmClient};
use crate::memory::Message;
use crate::react::{
    AnswerStream, AnswerSynthesizer, ChainExecutor, ExecutionResult, Plan, Planner, ReactEvent,
    ReactLoop, ReactOutcome, DEFAULT_MAX_ITERATIONS,
};
use crate::tools::{builtin_registry, ToolInvoker, ToolRegistry};

/// 运行模式相关设置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSettings {
    pub mode: AgentMode,
    pub stream_answers: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            mode: AgentMode::Pipeline,
            stream_answers: true,
        }
    }
}

/// 预构建的 Agent：Planner、ChainExecutor、ReactLoop、AnswerSynthesizer 共享同一注册表与 LLM
pub struct Agent {
    planner: Planner,
    chain: ChainExecutor,
    react: ReactLoop,
    answer: AnswerSynthesizer,
    settings: AgentSettings,
}

impl Agent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        retry: RetryConfig,
        tool_timeout: Duration,
    ) -> Self {
        let invoker = Arc::new(ToolInvoker::new(registry.clone(), retry).with_timeout(tool_timeout));
        Self {
            planner: Planner::new(llm.clone(), registry),
            chain: ChainExecutor::new(invoker.clone()),
            react: ReactLoop::new(llm.clone(), invoker),
            answer: AnswerSynthesizer::new(llm),
            settings: AgentSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.react = self.react.with_max_iterations(n);
        self
    }

    /// 从配置构建：LLM 后端、内置工具、重试与超时、模式
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        let llm = create_llm_from_config(&cfg.llm)?;
        let retry = cfg.retry.to_retry_config()?;
        let tool_timeout = cfg.tools.tool_timeout()?;
        let registry = Arc::new(builtin_registry());
        tracing::info!(
            tools = ?registry.tool_names(),
            mode = ?cfg.agent.mode,
            max_attempts = retry.max_attempts,
            "agent ready"
        );
        Ok(Self::new(llm, registry, retry, tool_timeout)
            .with_max_iterations(cfg.agent.max_iterations)
            .with_settings(AgentSettings {
                mode: cfg.agent.mode,
                stream_answers: cfg.agent.stream_answers,
            }))
    }

    pub fn settings(&self) -> AgentSettings {
        self.settings
    }

    pub fn mode(&self) -> AgentMode {
        self.settings.mode
    }

    pub fn max_iterations(&self) -> usize {
        self.react.max_iterations()
    }

    pub async fn plan_turn(
        &self,
        message: &str,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> Result<Plan, AgentError> {
        self.planner.plan(message, history, cancel).await
    }

    pub async fn execute_plan(
        &self,
        plan: &Plan,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, AgentError> {
        self.chain.execute_plan(plan, cancel).await
    }

    pub async fn run_react_turn(
        &self,
        message: &str,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> Result<ReactOutcome, AgentError> {
        self.react.run(message, history, cancel).await
    }

    /// 同 run_react_turn，并通过 event_tx 推送过程事件
    pub async fn run_react_turn_with_events(
        &self,
        message: &str,
        history: &[Message],
        cancel: &CancellationToken,
        event_tx: &UnboundedSender<ReactEvent>,
    ) -> Result<ReactOutcome, AgentError> {
        self.react
            .run_with_events(message, history, cancel, Some(event_tx))
            .await
    }

    pub async fn synthesize_answer(
        &self,
        message: &str,
        execution: Option<&ExecutionResult>,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        self.answer.compose(message, execution, history, cancel).await
    }

    pub async fn synthesize_answer_stream(
        &self,
        message: &str,
        execution: Option<&ExecutionResult>,
        history: &[Message],
        cancel: CancellationToken,
    ) -> Result<AnswerStream, AgentError> {
        self.answer
            .compose_stream(message, execution, history, cancel)
            .await
    }

    /// 两阶段：计划 -> （需要时）执行 -> 合成
    pub async fn run_pipeline_turn(
        &self,
        message: &str,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let plan = self.plan_turn(message, history, cancel).await?;
        let execution = if plan.needs_tools() {
            Some(self.execute_plan(&plan, cancel).await?)
        } else {
            None
        };
        self.synthesize_answer(message, execution.as_ref(), history, cancel)
            .await
    }

    /// 按配置模式跑完一轮，总是返回可直接展示给用户的文本
    pub async fn respond(
        &self,
        message: &str,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> String {
        let result = match self.settings.mode {
            AgentMode::Pipeline => self.run_pipeline_turn(message, history, cancel).await,
            AgentMode::React => self
                .run_react_turn(message, history, cancel)
                .await
                .map(|o| o.answer),
        };
        match result {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(error = %e, "turn failed");
                e.user_message()
            }
        }
    }
}

impl Default for Agent {
    /// 离线 Mock 后端 + 内置工具，便于本地跑通
    fn default() -> Self {
        Self::new(
            Arc::new(crate::llm::MockLlmClient),
            Arc::new(builtin_registry()),
            RetryConfig::default(),
            Duration::from_secs(30),
        )
        .with_max_iterations(DEFAULT_MAX_ITERATIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedLlmClient};

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_agent_is_shareable() {
        assert_send_sync::<Agent>();
    }

    fn agent(llm: Arc<ScriptedLlmClient>) -> Agent {
        Agent::new(
            llm,
            Arc::new(builtin_registry()),
            RetryConfig::no_retry(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_pipeline_direct_answer_skips_tools() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"action": "answer_direct"}"#,
            " Hello there! ",
        ]));
        let answer = agent(llm.clone())
            .respond("hi", &[], &CancellationToken::new())
            .await;
        assert_eq!(answer, "Hello there!");
        assert_eq!(llm.call_count(), 2);
        assert!(llm.requests()[1]
            .last()
            .unwrap()
            .content
            .contains("No tools were used."));
    }

    #[tokio::test]
    async fn test_pipeline_with_tool_passes_summary() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"action": "use_tool", "tool": "fake_weather", "args": {"location": "Rome"}}"#,
            "Sunny in Rome.",
        ]));
        let answer = agent(llm.clone())
            .respond("weather in Rome?", &[], &CancellationToken::new())
            .await;
        assert_eq!(answer, "Sunny in Rome.");
        let requests = llm.requests();
        let prompt = &requests[1].last().unwrap().content;
        assert!(prompt.contains("Step 1 (fake_weather): {"));
        assert!(prompt.contains("Rome"));
    }

    #[tokio::test]
    async fn test_react_mode() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"action": "finish", "answer": "Done."}"#,
        ]));
        let agent = agent(llm).with_settings(AgentSettings {
            mode: AgentMode::React,
            stream_answers: false,
        });
        assert_eq!(agent.respond("?", &[], &CancellationToken::new()).await, "Done.");
    }

    #[tokio::test]
    async fn test_model_failure_becomes_friendly_text() {
        let llm = Arc::new(ScriptedLlmClient::failing(LlmError::Unauthorized));
        let answer = agent(llm).respond("hi", &[], &CancellationToken::new()).await;
        assert_eq!(answer, LlmError::Unauthorized.user_message());
    }

    #[tokio::test]
    async fn test_cancelled_turn() {
        let llm = Arc::new(ScriptedLlmClient::new(["x"]));
        let token = CancellationToken::new();
        token.cancel();
        let answer = agent(llm).respond("hi", &[], &token).await;
        assert_eq!(answer, AgentError::Cancelled.user_message());
    }

    fn mock_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".to_string();
        cfg
    }

    #[test]
    fn test_from_config_applies_agent_section() {
        let mut cfg = mock_config();
        cfg.agent.mode = AgentMode::React;
        cfg.agent.max_iterations = 2;
        let agent = Agent::from_config(&cfg).unwrap();
        assert_eq!(agent.mode(), AgentMode::React);
        assert_eq!(agent.max_iterations(), 2);

        let agent = Agent::from_config(&mock_config()).unwrap();
        assert_eq!(agent.max_iterations(), DEFAULT_MAX_ITERATIONS);
    }

    #[test]
    fn test_from_config_rejects_zero_tool_timeout() {
        let mut cfg = mock_config();
        cfg.tools.tool_timeout_secs = 0;
        assert!(matches!(Agent::from_config(&cfg), Err(AgentError::Config(_))));
    }

    #[tokio::test]
    async fn test_default_agent_runs_offline() {
        let answer = Agent::default()
            .respond("ping", &[], &CancellationToken::new())
            .await;
        assert!(answer.starts_with("Echo from Mock:"));
        assert!(answer.contains("ping"));
    }
}
