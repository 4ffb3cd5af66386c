//! random_number：返回 1..=100 的随机整数

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};

use crate::core::ToolError;
use crate::tools::{Tool, ToolArgs};

pub struct RandomNumberTool;

#[async_trait]
impl Tool for RandomNumberTool {
    fn name(&self) -> &str {
        "random_number"
    }

    fn description(&self) -> &str {
        "Returns a random integer between 1 and 100."
    }

    async fn execute(&self, _args: &ToolArgs) -> Result<Value, ToolError> {
        let n: u32 = rand::thread_rng().gen_range(1..=100);
        Ok(json!({ "number": n }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_range() {
        for _ in 0..50 {
            let out = RandomNumberTool.execute(&ToolArgs::new()).await.unwrap();
            let n = out["number"].as_u64().unwrap();
            assert!((1..=100).contains(&n));
        }
    }
}
