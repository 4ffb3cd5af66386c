//! get_time：返回当前本地时间（RFC 3339）

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::ToolError;
use crate::tools::{Tool, ToolArgs};

pub struct GetTimeTool;

#[async_trait]
impl Tool for GetTimeTool {
    fn name(&self) -> &str {
        "get_time"
    }

    fn description(&self) -> &str {
        "Returns the current system time."
    }

    async fn execute(&self, _args: &ToolArgs) -> Result<Value, ToolError> {
        Ok(json!({ "time": chrono::Local::now().to_rfc3339() }))
    }
}
