//! Scripted completion provider for service and router tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm_client::{CompletionProvider, LlmError};

/// Replays queued results in order; once the queue is empty every call
/// fails with [`LlmError::EmptyContent`].
pub struct StubProvider {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl StubProvider {
    pub fn new(script: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for StubProvider {
    fn model(&self) -> &str {
        "stub-model"
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyContent))
    }
}

/// Records the session it was called under, then never completes.
#[derive(Default)]
pub struct HangingProvider {
    seen_session: Mutex<Option<String>>,
}

impl HangingProvider {
    pub fn seen_session(&self) -> Option<String> {
        self.seen_session.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for HangingProvider {
    fn model(&self) -> &str {
        "hanging-model"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
        *self.seen_session.lock().unwrap() = crate::profiler::current_session_id();
        std::future::pending().await
    }
}
