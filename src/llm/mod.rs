//! Language-model seam used for commit, day, branch, week and month summaries
//!
//! The ingestion engine and the worklog generator receive an
//! `Arc<dyn LanguageModelClient>` at construction; no provider is global.

/// Prompt construction for every summary granularity
pub mod prompts;

#[cfg(test)]
pub(crate) mod testing;

use crate::error::LlmError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat completion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Trait for text-generation backends
///
/// Cancellation is the caller's timeout dropping the returned future.
#[async_trait::async_trait]
pub trait LanguageModelClient: Send + Sync {
    /// Complete a single prompt
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Complete a multi-message conversation
    async fn chat_complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Run one generation call under a deadline
///
/// Empty output counts as a failure; surrounding whitespace is trimmed.
pub async fn with_timeout<F>(target: &str, limit: Duration, call: F) -> Result<String, LlmError>
where
    F: Future<Output = Result<String>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(text)) => {
            let text = text.trim();
            if text.is_empty() {
                Err(LlmError::EmptyResponse(target.to_string()))
            } else {
                Ok(text.to_string())
            }
        }
        Ok(Err(e)) => Err(LlmError::RequestFailed(format!("{}: {:#}", target, e))),
        Err(_) => {
            tracing::warn!("Summary for {} exceeded {:?}", target, limit);
            Err(LlmError::Timeout {
                target: target.to_string(),
                secs: limit.as_secs(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testing::ScriptedClient;

    #[tokio::test]
    async fn test_with_timeout_trims_output() {
        let client = ScriptedClient::replying("  Refactored the parser.\n");
        let text = with_timeout("commit abc1234", Duration::from_secs(5), client.complete("p"))
            .await
            .unwrap();
        assert_eq!(text, "Refactored the parser.");
    }

    #[tokio::test]
    async fn test_with_timeout_reports_timeout() {
        let client = ScriptedClient::replying("late").with_delay(Duration::from_millis(500));
        let err = with_timeout("day 2024-03-04", Duration::from_millis(20), client.complete("p"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Timeout { ref target, .. } if target == "day 2024-03-04"));
    }

    #[tokio::test]
    async fn test_with_timeout_maps_empty_and_failed() {
        let empty = ScriptedClient::replying("   ");
        assert!(matches!(
            with_timeout("x", Duration::from_secs(1), empty.complete("p")).await,
            Err(LlmError::EmptyResponse(_))
        ));

        let failing = ScriptedClient::failing("rate limited");
        let err = with_timeout("x", Duration::from_secs(1), failing.complete("p"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_chat_message_json_shape() {
        let json = serde_json::to_string(&ChatMessage::system("be brief")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"be brief"}"#);
    }
}
