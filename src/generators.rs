//! Text generation backends

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Trait for pluggable text generators. One call per prompt, no caching.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, model: &str, prompt: &str) -> Result<String>;
}

/// Reply the mock produces for one call
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    /// `response to: <prompt>`
    Echo,
    Fail(String),
}

/// Scripted generator for testing; counts calls and records prompts
pub struct MockTextGen {
    script: Mutex<VecDeque<MockReply>>,
    fallback: MockReply,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockTextGen {
    /// Replies in order, then echoes once the script runs out
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::scripted(replies.into_iter().map(|r| MockReply::Text(r.into())))
    }

    pub fn scripted(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            fallback: MockReply::Echo,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn echo() -> Self {
        Self::scripted(Vec::new())
    }

    /// Every call fails like an unreachable service
    pub fn failing() -> Self {
        Self {
            fallback: MockReply::Fail("connection refused".to_string()),
            ..Self::echo()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for MockTextGen {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(&self, _model: &str, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let reply = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            MockReply::Text(text) => Ok(text),
            MockReply::Echo => Ok(format!("response to: {}", prompt)),
            MockReply::Fail(reason) => Err(PipelineError::Service(reason)),
        }
    }
}
