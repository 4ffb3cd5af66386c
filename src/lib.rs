//! Hive - 工具编排型对话智能体
//!
//! 模块划分：
//! - **agent**: 无头 Agent 运行时（计划、执行、ReAct、回答合成的对外接口）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、带退避的重试
//! - **llm**: LLM 客户端抽象与实现（Ollama / OpenAI 兼容 / Mock）
//! - **memory**: 对话历史
//! - **observability**: tracing 初始化
//! - **react**: Planner、ChainExecutor、ReAct 主循环、AnswerSynthesizer
//! - **tools**: 工具注册表、调用器与内置工具

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use agent::{Agent, AgentSettings};
