//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__LLM__PROVIDER=openai`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::{AgentError, RetryConfig};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub retry: RetrySection,
    pub agent: AgentSection,
}

/// [app] 段：应用名、送入模型的对话轮数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    pub max_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_context_turns: 20,
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：ollama / openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时 openai 后端读取 OPENAI_API_KEY
    pub api_key: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "gemma3:1b".to_string(),
            base_url: None,
            api_key: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

impl ToolsSection {
    /// 单次调用超时；0 会让每次调用立即超时，视为配置错误
    pub fn tool_timeout(&self) -> Result<Duration, AgentError> {
        if self.tool_timeout_secs == 0 {
            return Err(AgentError::Config(
                "tools.tool_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(Duration::from_secs(self.tool_timeout_secs))
    }
}

/// [retry] 段：工具调用的指数退避参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

impl RetrySection {
    pub fn to_retry_config(&self) -> Result<RetryConfig, AgentError> {
        RetryConfig::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            self.backoff_multiplier,
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

/// 回合执行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Planner -> ChainExecutor -> AnswerSynthesizer 两阶段
    #[default]
    Pipeline,
    /// ReAct 迭代
    React,
}

/// [agent] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub mode: AgentMode,
    /// ReAct 最大迭代次数
    pub max_iterations: usize,
    /// 两阶段模式下是否流式输出最终回答
    pub stream_answers: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            mode: AgentMode::Pipeline,
            max_iterations: 5,
            stream_answers: true,
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "ollama");
        assert_eq!(cfg.agent.mode, AgentMode::Pipeline);
        assert_eq!(cfg.agent.max_iterations, 5);
        let retry = cfg.retry.to_retry_config().unwrap();
        assert_eq!(retry, RetryConfig::default());
    }

    #[test]
    fn test_load_explicit_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[llm]
provider = "mock"

[agent]
mode = "react"
max_iterations = 3

[retry]
max_attempts = 5
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.llm.model, "gemma3:1b");
        assert_eq!(cfg.agent.mode, AgentMode::React);
        assert_eq!(cfg.agent.max_iterations, 3);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.initial_delay_ms, 1000);
    }

    #[test]
    fn test_invalid_retry_section_rejected() {
        let section = RetrySection {
            max_attempts: 0,
            ..RetrySection::default()
        };
        assert!(matches!(section.to_retry_config(), Err(AgentError::Config(_))));
    }

    #[test]
    fn test_zero_tool_timeout_rejected() {
        let section = ToolsSection {
            tool_timeout_secs: 0,
        };
        assert!(matches!(section.tool_timeout(), Err(AgentError::Config(_))));
        assert_eq!(
            ToolsSection::default().tool_timeout().unwrap(),
            Duration::from_secs(30)
        );
    }
}
