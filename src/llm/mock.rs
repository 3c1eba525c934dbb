//! Scripted generator for tests and offline runs.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use serde_json::json;

use super::generator::{GenerationOutput, GenerationRequest, Generator};
use crate::domain::User;
use crate::error::{Result, SymposiumError};

/// A canned reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    Text(String),
    /// Delivered as a stream of delta fragments
    Stream(Vec<String>),
    Fail(String),
    /// Never completes; used to exercise cancellation
    Hang,
}

/// Replays scripted replies per model and records every request.
///
/// Scripted replies are consumed in order; a model with an empty script uses
/// its sticky reply, or `"<model> has spoken."` when none is set.
#[derive(Debug, Default)]
pub struct MockGenerator {
    scripts: Mutex<HashMap<String, VecDeque<MockReply>>>,
    sticky: Mutex<HashMap<String, MockReply>>,
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every reply by `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a one-shot reply for `model`
    pub fn push(&self, model: &str, reply: MockReply) {
        lock(&self.scripts).entry(model.to_string()).or_default().push_back(reply);
    }

    /// Reply used whenever `model` has nothing queued
    pub fn always(&self, model: &str, reply: MockReply) {
        lock(&self.sticky).insert(model.to_string(), reply);
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock(&self.requests).clone()
    }

    pub fn requests_for(&self, model: &str) -> Vec<GenerationRequest> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.model == model)
            .cloned()
            .collect()
    }

    fn next_reply(&self, model: &str) -> MockReply {
        if let Some(reply) = lock(&self.scripts).get_mut(model).and_then(VecDeque::pop_front) {
            return reply;
        }
        lock(&self.sticky)
            .get(model)
            .cloned()
            .unwrap_or_else(|| MockReply::Text(format!("{} has spoken.", model)))
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest, _user: &User) -> Result<GenerationOutput> {
        lock(&self.requests).push(request.clone());
        let reply = self.next_reply(&request.model);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match reply {
            MockReply::Text(text) => Ok(GenerationOutput::Complete(json!({
                "choices": [{ "message": { "role": "assistant", "content": text } }]
            }))),
            MockReply::Stream(parts) => {
                let mut lines: Vec<Result<String>> = parts
                    .into_iter()
                    .map(|p| Ok(format!("data: {}\n", json!({ "choices": [{ "delta": { "content": p } }] }))))
                    .collect();
                lines.push(Ok("data: [DONE]\n".to_string()));
                Ok(GenerationOutput::Stream(Box::pin(stream::iter(lines))))
            }
            MockReply::Fail(message) => Err(SymposiumError::Generation(message)),
            MockReply::Hang => {
                std::future::pending::<()>().await;
                Err(SymposiumError::Cancelled(request.model.clone()))
            }
        }
    }
}
