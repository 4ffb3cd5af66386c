//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 OpenAI、DeepSeek、自建代理等。

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::llm::{LlmClient, LlmError, TextStream};
use crate::memory::{Message, Role};

/// OpenAI 兼容客户端：持有 Client 与 model 名，complete 时转 Message 为 API 格式并取首条 content
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();

        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }

    fn request(&self, messages: &[Message]) -> Result<CreateChatCompletionRequest, LlmError> {
        let converted = messages
            .iter()
            .map(to_openai_message)
            .collect::<Result<Vec<_>, _>>()?;
        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(converted)
            .build()
            .map_err(map_openai_error)
    }
}

fn to_openai_message(m: &Message) -> Result<ChatCompletionRequestMessage, LlmError> {
    let msg = match m.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(m.content.clone())
            .build()
            .map(ChatCompletionRequestMessage::System),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(m.content.clone())
            .build()
            .map(ChatCompletionRequestMessage::User),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(m.content.clone())
            .build()
            .map(ChatCompletionRequestMessage::Assistant),
    };
    msg.map_err(map_openai_error)
}

fn map_openai_error(e: OpenAIError) -> LlmError {
    match e {
        OpenAIError::Reqwest(inner) => LlmError::from(inner),
        OpenAIError::InvalidArgument(msg) => LlmError::Api(msg),
        other => LlmError::classify(&other.to_string()),
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let request = self.request(messages)?;
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TextStream, LlmError> {
        let request = self.request(messages)?;
        let stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(map_openai_error)?;

        let mapped = stream.filter_map(|item| async move {
            match item {
                Ok(chunk) => chunk
                    .choices
                    .first()
                    .and_then(|c| c.delta.content.clone())
                    .filter(|s| !s.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(map_openai_error(e))),
            }
        });
        Ok(Box::pin(mapped))
    }
}
