//! 对话历史
//!
//! 会话内只追加；由编排层持有，核心组件只读（以 `&[Message]` 传入）。
//! 序列化字段名与 OpenAI / Ollama 的 `{role, content}` 消息格式一致。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致，序列化为小写）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 会话历史：只追加，不剪枝；送入模型时用 `recent` 取最近 N 轮
#[derive(Clone, Debug, Default)]
pub struct ConversationMemory {
    messages: Vec<Message>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    /// 最近 max_turns 轮（每轮 user + assistant，约 max_turns*2 条）
    pub fn recent(&self, max_turns: usize) -> &[Message] {
        let keep = max_turns.saturating_mul(2);
        let start = self.messages.len().saturating_sub(keep);
        &self.messages[start..]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn test_recent_window() {
        let mut mem = ConversationMemory::new();
        for i in 0..5 {
            mem.push(Message::user(format!("q{i}")));
            mem.push(Message::assistant(format!("a{i}")));
        }
        assert_eq!(mem.len(), 10);
        let recent = mem.recent(2);
        assert_eq!(recent.len(), 4);
        assert_eq!(recent[0].content, "q3");
        assert_eq!(mem.recent(100).len(), 10);
        assert!(mem.recent(0).is_empty());
    }
}
