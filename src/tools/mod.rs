//! 工具箱：注册表、调用器、调用结果与内置工具

pub mod failing;
pub mod invoker;
pub mod random;
pub mod registry;
pub mod result;
pub mod schema;
pub mod time;
pub mod weather;

pub use failing::FailingTool;
pub use invoker::ToolInvoker;
pub use random::RandomNumberTool;
pub use registry::{ParamSchema, ParamSpec, ParamType, Tool, ToolArgs, ToolRegistry};
pub use result::{Invocation, ToolResult};
pub use schema::{decision_schema_json, planner_schema_json};
pub use time::GetTimeTool;
pub use weather::FakeWeatherTool;

/// 内置工具：get_time / random_number / fake_weather / failing_tool
pub fn builtin_registry() -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(GetTimeTool);
    tools.register(RandomNumberTool);
    tools.register(FakeWeatherTool);
    tools.register(FailingTool);
    tools
}
