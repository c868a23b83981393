use std::future::Future;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::AiSettings;

#[derive(Error, Debug, Clone)]
pub enum CompletionError {
    #[error("completion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion request failed: {message}")]
    Transport { message: String, retryable: bool },

    #[error("unexpected completion response: {0}")]
    Malformed(String),

    #[error("{0}")]
    MissingApiKey(String),
}

impl CompletionError {
    /// Rate limits, oversized-request throttling and server-side failures are
    /// worth another attempt; everything else is final for the chunk.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(status, 413 | 429 | 500..=599),
            Self::Transport { retryable, .. } => *retryable,
            Self::Malformed(_) | Self::MissingApiKey(_) => false,
        }
    }
}

/// A text-completion backend. The AI PDF extractor only ever needs a prompt in
/// and free-form text out, which keeps the live service swappable in tests.
pub trait CompletionClient {
    fn complete(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<String, CompletionError>> + Send;
}

/// OpenAI-compatible chat completions over HTTP (Groq by default).
#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl HttpCompletionClient {
    pub fn from_settings(ai: &AiSettings) -> Result<Self, CompletionError> {
        let api_key = ai.api_key().ok_or_else(|| {
            CompletionError::MissingApiKey(format!(
                "PDF parsing requires an API key. Set {} in your environment, or upload a CSV instead.",
                ai.api_key_env
            ))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(ai.request_timeout_secs))
            .build()
            .map_err(|e| CompletionError::Transport {
                message: e.to_string(),
                retryable: false,
            })?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", ai.base_url.trim_end_matches('/')),
            api_key,
            model: ai.model.clone(),
            temperature: ai.temperature,
            max_tokens: ai.max_tokens,
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MsgOut,
}

#[derive(Deserialize)]
struct MsgOut {
    content: Option<String>,
}

fn transport_error(e: reqwest::Error) -> CompletionError {
    CompletionError::Transport {
        retryable: e.is_timeout() || e.is_connect(),
        message: e.to_string(),
    }
}

impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let body = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let out: Resp = resp
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;
        Ok(out
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        for status in [429u16, 413, 500, 502, 503] {
            let e = CompletionError::Status { status, body: String::new() };
            assert!(e.is_retryable(), "{status} should be retryable");
        }
        for status in [400u16, 401, 403, 404] {
            let e = CompletionError::Status { status, body: String::new() };
            assert!(!e.is_retryable(), "{status} should not be retryable");
        }
    }

    #[test]
    fn test_transport_and_malformed_retry_flags() {
        let t = CompletionError::Transport { message: "timed out".into(), retryable: true };
        assert!(t.is_retryable());
        assert!(!CompletionError::Malformed("bad json".into()).is_retryable());
        assert!(!CompletionError::MissingApiKey("no key".into()).is_retryable());
    }

    #[test]
    fn test_missing_api_key_names_the_variable() {
        let ai = AiSettings {
            api_key_env: "BURNRATE_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..AiSettings::default()
        };
        let err = HttpCompletionClient::from_settings(&ai).unwrap_err();
        assert!(matches!(err, CompletionError::MissingApiKey(_)));
        assert!(err.to_string().contains("BURNRATE_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
