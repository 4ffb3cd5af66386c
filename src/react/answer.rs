//! 回答合成：根据用户消息、工具执行摘要与历史生成最终回复
//!
//! 流式版本逐片转发模型输出，只在片段边界处理首尾空白，
//! 保证所有片段拼接后与非流式版本 `trim()` 后的结果一致。

use std::pin::Pin;
use std::sync::Arc;

use futures_util::{stream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::llm::{complete_cancellable, complete_stream_cancellable, LlmClient, LlmError, TextStream};
use crate::memory::Message;
use crate::react::chain::ExecutionResult;
use crate::react::prior_turns;

pub const NO_TOOLS_USED: &str = "No tools were used.";

/// 流式回答：有限、不可重启的文本片段序列
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

const SYSTEM_INSTRUCTIONS: &str = "You are a helpful assistant for a simple chatbot.\n\
     You may receive results gathered for this question (like the current time, random numbers, or weather).\n\
     They come as one line per item: a line reading \"Step N (name): value\" is an accurate result you should use;\n\
     a line reading \"Step N (name): ERROR - message\" means that lookup failed.\n\
     Only mention a failure if it prevents you from answering.\n\
     If no results are present, just answer the user directly.\n\
     Do not mention 'tools', 'planner', 'steps' or internal JSON in your reply.\n\
     Reply in a concise, friendly way.";

/// 回答合成器
pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmClient>,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub fn build_messages(
        &self,
        message: &str,
        execution: Option<&ExecutionResult>,
        history: &[Message],
    ) -> Vec<Message> {
        let results = execution
            .map(|e| e.summary.as_str())
            .unwrap_or(NO_TOOLS_USED);
        let mut messages = vec![Message::system(SYSTEM_INSTRUCTIONS)];
        messages.extend(prior_turns(history, message).iter().cloned());
        messages.push(Message::user(format!(
            "User message:\n{message}\n\n\
             Results gathered for this question:\n{results}\n\n\
             Now write the final answer for the user:"
        )));
        messages
    }

    pub async fn compose(
        &self,
        message: &str,
        execution: Option<&ExecutionResult>,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let messages = self.build_messages(message, execution, history);
        let answer = complete_cancellable(self.llm.as_ref(), &messages, cancel).await?;
        Ok(answer.trim().to_string())
    }

    /// 流式合成；返回的流在取消时产出一次 `LlmError::Cancelled` 后结束
    pub async fn compose_stream(
        &self,
        message: &str,
        execution: Option<&ExecutionResult>,
        history: &[Message],
        cancel: CancellationToken,
    ) -> Result<AnswerStream, AgentError> {
        let messages = self.build_messages(message, execution, history);
        let inner = complete_stream_cancellable(self.llm.as_ref(), &messages, &cancel).await?;
        Ok(trimmed(inner, cancel))
    }
}

struct TrimState {
    inner: TextStream,
    cancel: CancellationToken,
    started: bool,
    /// 尚未确定是否属于结尾的空白
    pending: String,
    done: bool,
}

/// 去掉整段输出首尾空白，其余内容按片段原样转发
fn trimmed(inner: TextStream, cancel: CancellationToken) -> AnswerStream {
    let state = TrimState {
        inner,
        cancel,
        started: false,
        pending: String::new(),
        done: false,
    };
    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if st.done {
                return None;
            }
            let item = tokio::select! {
                biased;
                _ = st.cancel.cancelled() => Some(Err(LlmError::Cancelled)),
                item = st.inner.next() => item,
            };
            match item {
                None => return None,
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e), st));
                }
                Some(Ok(chunk)) => {
                    let text = if st.started {
                        chunk
                    } else {
                        chunk.trim_start().to_string()
                    };
                    if text.is_empty() {
                        continue;
                    }
                    st.started = true;
                    let body_len = text.trim_end().len();
                    if body_len == 0 {
                        st.pending.push_str(&text);
                        continue;
                    }
                    let mut out = std::mem::take(&mut st.pending);
                    out.push_str(&text[..body_len]);
                    st.pending = text[body_len..].to_string();
                    return Some((Ok(out), st));
                }
            }
        }
    }))
}
