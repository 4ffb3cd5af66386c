//! Ollama 客户端
//!
//! POST `{base_url}/api/chat`，请求体 `{"model", "messages", "stream"}`。
//! 非流式读取 `message.content`；流式响应为逐行 JSON（NDJSON），直到 `done: true`。

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::llm::{LlmClient, LlmError, TextStream};
use crate::memory::Message;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Deserialize, Default)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

pub struct OllamaClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: Option<&str>, model: &str, timeout: Duration) -> Result<Self, LlmError> {
        let base = base_url.unwrap_or(DEFAULT_OLLAMA_URL).trim_end_matches('/');
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(LlmError::from)?;
        Ok(Self {
            http,
            endpoint: format!("{base}/api/chat"),
            model: model.to_string(),
        })
    }

    async fn post(&self, messages: &[Message], stream: bool) -> Result<reqwest::Response, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream,
        };
        let response = self.http.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => LlmError::RateLimited,
                401 | 403 => LlmError::Unauthorized,
                _ => LlmError::classify(&format!("HTTP {status}: {text}")),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let data: ChatResponse = self.post(messages, false).await?.json().await?;
        if let Some(err) = data.error {
            return Err(LlmError::classify(&err));
        }
        Ok(data
            .message
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default())
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TextStream, LlmError> {
        let response = self.post(messages, true).await?;
        Ok(ndjson_chunks(response.bytes_stream()))
    }
}

type ByteStream<B> = Pin<Box<dyn Stream<Item = Result<B, reqwest::Error>> + Send>>;

struct NdjsonState<B> {
    bytes: ByteStream<B>,
    buf: Vec<u8>,
    done: bool,
}

/// 把字节流切成行，每行解析为一个 ChatResponse，产出其中的 content 片段
fn ndjson_chunks<S, B>(bytes: S) -> TextStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = NdjsonState {
        bytes: Box::pin(bytes),
        buf: Vec::new(),
        done: false,
    };
    let chunks = stream::unfold(state, |mut st| async move {
        loop {
            if st.done {
                return None;
            }
            if let Some(pos) = st.buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = st.buf.drain(..=pos).collect();
                if let Some(item) = parse_line(&line, &mut st.done) {
                    return Some((item, st));
                }
                continue;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(LlmError::from(e)), st));
                }
                None => {
                    // 末行可能没有换行符
                    let rest = std::mem::take(&mut st.buf);
                    st.done = true;
                    return parse_line(&rest, &mut st.done).map(|item| (item, st));
                }
            }
        }
    });
    Box::pin(chunks)
}

fn parse_line(line: &[u8], done: &mut bool) -> Option<Result<String, LlmError>> {
    let text = std::str::from_utf8(line).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    let parsed: ChatResponse = match serde_json::from_str(text) {
        Ok(p) => p,
        Err(e) => {
            *done = true;
            return Some(Err(LlmError::Api(format!("malformed stream line: {e}"))));
        }
    };
    if let Some(err) = parsed.error {
        *done = true;
        return Some(Err(LlmError::classify(&err)));
    }
    if parsed.done {
        *done = true;
    }
    parsed
        .message
        .map(|m| m.content)
        .filter(|c| !c.is_empty())
        .map(Ok)
}
