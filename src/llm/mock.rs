//! 测试与离线运行用的 LLM 客户端
//!
//! - `MockLlmClient`：无需 API，按 system prompt 判断场景，回复固定 JSON / 文本，便于本地跑通流程。
//! - `ScriptedLlmClient`：按预设脚本依次回复，记录每次请求，供测试断言调用次数与 prompt 内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{LlmClient, LlmError, TextStream};
use crate::memory::{Message, Role};

/// Mock 客户端：规划时直接回答，ReAct 时直接结束，合成回答时回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let system = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        if system.contains("\"finish\"") {
            Ok(serde_json::json!({
                "action": "finish",
                "answer": format!("Echo from Mock: {last_user}"),
            })
            .to_string())
        } else if system.contains("\"answer_direct\"") {
            Ok(r#"{"action": "answer_direct"}"#.to_string())
        } else {
            Ok(format!("Echo from Mock: {last_user}"))
        }
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TextStream, LlmError> {
        let content = self.complete(messages).await?;
        Ok(Box::pin(stream::iter(vec![Ok(content)])))
    }
}

/// 单条脚本回复
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Fail(LlmError),
}

/// 脚本客户端：依次弹出回复，耗尽后重复最后一条
#[derive(Debug)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    last: Mutex<Option<ScriptedReply>>,
    requests: Mutex<Vec<Vec<Message>>>,
    chunk_chars: usize,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_replies(replies.into_iter().map(|r| ScriptedReply::Text(r.into())))
    }

    pub fn from_replies(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            chunk_chars: 4,
        }
    }

    /// 每次都失败的客户端
    pub fn failing(err: LlmError) -> Self {
        Self::from_replies([ScriptedReply::Fail(err)])
    }

    /// 流式输出时每个片段的字符数
    pub fn with_chunk_chars(mut self, n: usize) -> Self {
        self.chunk_chars = n.max(1);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// 所有收到的请求（按调用顺序）
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next_reply(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut reqs) = self.requests.lock() {
            reqs.push(messages.to_vec());
        }
        let popped = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        let reply = match popped {
            Some(r) => {
                if let Ok(mut last) = self.last.lock() {
                    *last = Some(r.clone());
                }
                r
            }
            None => self
                .last
                .lock()
                .ok()
                .and_then(|l| l.clone())
                .unwrap_or_else(|| ScriptedReply::Text(String::new())),
        };
        match reply {
            ScriptedReply::Text(t) => Ok(t),
            ScriptedReply::Fail(e) => Err(e),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.next_reply(messages)
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TextStream, LlmError> {
        let content = self.next_reply(messages)?;
        let chars: Vec<char> = content.chars().collect();
        let chunks: Vec<Result<String, LlmError>> = chars
            .chunks(self.chunk_chars)
            .map(|c| Ok(c.iter().collect()))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_scripted_repeats_last_reply() {
        let llm = ScriptedLlmClient::new(["one", "two"]);
        let msgs = [Message::user("hi")];
        assert_eq!(llm.complete(&msgs).await.unwrap(), "one");
        assert_eq!(llm.complete(&msgs).await.unwrap(), "two");
        assert_eq!(llm.complete(&msgs).await.unwrap(), "two");
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_stream_chunks() {
        let llm = ScriptedLlmClient::new(["hello world"]).with_chunk_chars(3);
        let parts: Vec<String> = llm
            .complete_stream(&[Message::user("x")])
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(parts, vec!["hel", "lo ", "wor", "ld"]);
    }

    #[tokio::test]
    async fn test_mock_plans_answer_direct() {
        let msgs = [
            Message::system(r#"Respond with {"action": "answer_direct"}"#),
            Message::user("hi"),
        ];
        let out = MockLlmClient.complete(&msgs).await.unwrap();
        assert!(out.contains("answer_direct"));
    }
}
