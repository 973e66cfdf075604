//! Counting stand-in for a language model

use super::{ChatMessage, LanguageModelClient};
use anyhow::Result;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) struct ScriptedClient {
    reply: String,
    fail_with: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail_with: None,
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            ..Self::replying("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    async fn respond(&self, prompt: String) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().unwrap().push(prompt);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.fail_with {
            Some(reason) => anyhow::bail!("{}", reason),
            None if self.reply.contains("{n}") => Ok(self.reply.replace("{n}", &n.to_string())),
            None => Ok(self.reply.clone()),
        }
    }
}

#[async_trait::async_trait]
impl LanguageModelClient for ScriptedClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.respond(prompt.to_string()).await
    }

    async fn chat_complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let joined = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        self.respond(joined).await
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
