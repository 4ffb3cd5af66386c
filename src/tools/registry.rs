//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters / execute），由 ToolRegistry 按名注册与查找。
//! 注册只在启动时进行，之后注册表只读，可通过 Arc 在多个会话间共享。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::core::ToolError;

/// 工具参数（具名参数映射）
pub type ToolArgs = serde_json::Map<String, Value>;

/// 参数类型提示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

impl ParamType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
            ParamType::Any => true,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
            ParamType::Any => "any",
        };
        f.write_str(s)
    }
}

/// 单个参数的声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub required: bool,
    pub type_hint: ParamType,
}

impl ParamSpec {
    pub fn required(type_hint: ParamType) -> Self {
        Self {
            required: true,
            type_hint,
        }
    }

    pub fn optional(type_hint: ParamType) -> Self {
        Self {
            required: false,
            type_hint,
        }
    }
}

/// 参数名 -> 声明（有序，保证 prompt 输出稳定）
pub type ParamSchema = BTreeMap<String, ParamSpec>;

/// 工具 trait：名称、描述（供 LLM 理解）、参数声明、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数声明；默认无参数
    fn parameters(&self) -> ParamSchema {
        ParamSchema::new()
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value, ToolError>;
}

type ToolFn = dyn Fn(&ToolArgs) -> Result<Value, ToolError> + Send + Sync;

/// 以闭包实现的工具，供 `register_fn` 使用
struct FnTool {
    name: String,
    description: String,
    params: ParamSchema,
    func: Box<ToolFn>,
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> ParamSchema {
        self.params.clone()
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value, ToolError> {
        (self.func)(args)
    }
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同名再次注册会覆盖
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    /// 注册已共享的工具实例（调用方可保留句柄观察其状态）
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool registered twice, replacing");
        }
    }

    /// 以闭包注册同步工具
    pub fn register_fn<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        params: ParamSchema,
        func: F,
    ) where
        F: Fn(&ToolArgs) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        self.register(FnTool {
            name: name.into(),
            description: description.into(),
            params,
            func: Box::new(func),
        });
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 只检查参数名是否都已声明（计划不变量：args 键是参数声明的子集）
    pub fn check_arg_names(&self, name: &str, args: &ToolArgs) -> Result<(), ToolError> {
        let params = self.lookup(name)?.parameters();
        match args.keys().find(|k| !params.contains_key(k.as_str())) {
            Some(extra) => Err(ToolError::InvalidArgs(format!(
                "unexpected argument '{extra}' for tool '{name}'"
            ))),
            None => Ok(()),
        }
    }

    /// 完整校验：参数名、必填项、类型提示
    pub fn validate_args(&self, name: &str, args: &ToolArgs) -> Result<(), ToolError> {
        self.check_arg_names(name, args)?;
        let params = self.lookup(name)?.parameters();
        for (param, spec) in &params {
            match args.get(param) {
                None if spec.required => {
                    return Err(ToolError::InvalidArgs(format!(
                        "missing required argument '{param}' for tool '{name}'"
                    )));
                }
                Some(v) if !spec.type_hint.matches(v) => {
                    return Err(ToolError::InvalidArgs(format!(
                        "argument '{param}' for tool '{name}' must be {}",
                        spec.type_hint
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// 生成 prompt 中的 Available tools 段落，每行 `- name: description Parameters: ...`
    pub fn catalogue(&self) -> String {
        self.tools
            .values()
            .map(|tool| {
                let params = tool.parameters();
                let params_desc = if params.is_empty() {
                    "Parameters: NONE (use empty args: {})".to_string()
                } else {
                    let parts: Vec<String> = params
                        .iter()
                        .map(|(n, spec)| {
                            let req = if spec.required { "required" } else { "optional" };
                            format!("{n} ({}, {req})", spec.type_hint)
                        })
                        .collect();
                    format!("Parameters: {}", parts.join(", "))
                };
                format!("- {}: {} {}", tool.name(), tool.description(), params_desc)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
