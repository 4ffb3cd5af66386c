//! 模型调用错误
//!
//! 各后端把传输 / 鉴权 / 超时 / 限流失败统一转为 LlmError；
//! classify 按错误描述做子串匹配，user_message 给出面向用户的友好提示。

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("rate limited")]
    RateLimited,

    #[error("unauthorized")]
    Unauthorized,

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("cancelled")]
    Cancelled,
}

impl LlmError {
    /// 根据原始错误描述归类（大小写不敏感）
    pub fn classify(description: &str) -> Self {
        let msg = description.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| msg.contains(n));

        if has(&["resource_exhausted", "429", "quota", "rate limit", "too many requests"]) {
            LlmError::RateLimited
        } else if has(&[
            "unauthenticated",
            "invalid api key",
            "incorrect api key",
            "permission",
            "401",
            "403",
        ]) {
            LlmError::Unauthorized
        } else if has(&["timed out", "timeout", "connection aborted"]) {
            LlmError::Timeout
        } else {
            LlmError::Api(description.to_string())
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            LlmError::RateLimited => {
                "The service is currently experiencing high demand. Please try again later."
            }
            LlmError::Unauthorized => {
                "Authentication failed. Please check your API key or permissions."
            }
            LlmError::Timeout => "The request timed out. Please try again.",
            LlmError::Cancelled => "The request was cancelled.",
            LlmError::Transport(_) | LlmError::Api(_) => {
                "Something went wrong while accessing the AI service, please try again later."
            }
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return LlmError::Timeout;
        }
        if let Some(status) = e.status() {
            return match status.as_u16() {
                429 => LlmError::RateLimited,
                401 | 403 => LlmError::Unauthorized,
                _ => LlmError::Api(e.to_string()),
            };
        }
        if e.is_connect() || e.is_request() || e.is_body() {
            return LlmError::Transport(e.to_string());
        }
        LlmError::classify(&e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit() {
        assert_eq!(LlmError::classify("HTTP 429 Too Many Requests"), LlmError::RateLimited);
        assert_eq!(LlmError::classify("RESOURCE_EXHAUSTED: quota"), LlmError::RateLimited);
    }

    #[test]
    fn test_classify_auth() {
        assert_eq!(LlmError::classify("Invalid API key provided"), LlmError::Unauthorized);
        assert_eq!(LlmError::classify("UNAUTHENTICATED"), LlmError::Unauthorized);
    }

    #[test]
    fn test_classify_timeout() {
        assert_eq!(LlmError::classify("operation timed out"), LlmError::Timeout);
        assert_eq!(LlmError::classify("Connection aborted."), LlmError::Timeout);
    }

    #[test]
    fn test_classify_generic() {
        let e = LlmError::classify("model 'x' not found");
        assert!(matches!(e, LlmError::Api(_)));
        assert!(e.user_message().starts_with("Something went wrong"));
    }
}
