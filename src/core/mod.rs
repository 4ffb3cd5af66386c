//! 核心基础：错误分类与带退避的重试

pub mod error;
pub mod retry;

pub use error::{AgentError, ToolError};
pub use retry::{RetryConfig, RetryError, RetryExecutor, Retryable};
