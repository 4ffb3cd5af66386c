//! failing_tool：总是临时失败，用于演示重试与「失败即数据」

use async_trait::async_trait;
use serde_json::Value;

use crate::core::ToolError;
use crate::tools::{Tool, ToolArgs};

pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "failing_tool"
    }

    fn description(&self) -> &str {
        "A tool that always fails to demonstrate error handling."
    }

    async fn execute(&self, _args: &ToolArgs) -> Result<Value, ToolError> {
        Err(ToolError::Transient("upstream service unavailable".into()))
    }
}
