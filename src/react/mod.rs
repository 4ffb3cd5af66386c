//! 认知层：Planner、链式执行、ReAct 主循环与回答合成

pub mod answer;
pub mod chain;
pub mod decode;
pub mod events;
pub mod loop_;
pub mod planner;

pub use answer::{AnswerStream, AnswerSynthesizer};
pub use chain::{ChainExecutor, ExecutionResult};
pub use events::ReactEvent;
pub use loop_::{parse_decision, Decision, ReactLoop, ReactOutcome, DEFAULT_MAX_ITERATIONS};
pub use planner::{parse_plan, Plan, PlanStep, Planner};

use crate::memory::{Message, Role};

/// 之前的对话轮次：若历史末尾就是本轮用户消息则去掉，避免在 prompt 中出现两次
pub(crate) fn prior_turns<'a>(history: &'a [Message], message: &str) -> &'a [Message] {
    match history.split_last() {
        Some((last, rest)) if last.role == Role::User && last.content.trim() == message.trim() => rest,
        _ => history,
    }
}
