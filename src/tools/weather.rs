//! fake_weather：固定的假天气预报（演示带必填参数的工具）

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::ToolError;
use crate::tools::{ParamSchema, ParamSpec, ParamType, Tool, ToolArgs};

pub struct FakeWeatherTool;

#[async_trait]
impl Tool for FakeWeatherTool {
    fn name(&self) -> &str {
        "fake_weather"
    }

    fn description(&self) -> &str {
        "Returns a fake weather report for a given location."
    }

    fn parameters(&self) -> ParamSchema {
        let mut params = ParamSchema::new();
        params.insert("location".into(), ParamSpec::required(ParamType::String));
        params
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value, ToolError> {
        let location = args
            .get("location")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError::InvalidArgs("location must be a non-empty string".into()))?;
        Ok(json!({
            "location": location,
            "forecast": "Sunny with light wind",
            "temperature_c": 24,
        }))
    }
}
