//! Mock gateway backends shared by unit tests.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dyad_types::character::{CharacterProfile, ScenarioSituation};
use dyad_types::llm::{CompletionRequest, CompletionResponse, LlmError, Usage};

use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::fallback::{FallbackChain, RetryPolicy};
use crate::llm::provider::LlmProvider;

type Responder = dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync;

/// Scriptable provider that counts calls and records requests.
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    responder: Arc<Responder>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockProvider {
    pub fn responder<F>(name: &str, f: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            responder: Arc::new(f),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn fixed(name: &str, text: &str) -> Self {
        let text = text.to_string();
        Self::responder(name, move |_| Ok(text.clone()))
    }

    pub fn failing(name: &str, err: fn() -> LlmError) -> Self {
        Self::responder(name, move |_| Err(err()))
    }

    /// Replies in order; the last reply repeats once the script runs out.
    pub fn scripted(name: &str, replies: Vec<Result<String, LlmError>>) -> Self {
        let queue = Mutex::new(VecDeque::from(replies));
        let last: Mutex<Option<Result<String, LlmError>>> = Mutex::new(None);
        Self::responder(name, move |_| {
            let mut queue = queue.lock().unwrap();
            let mut last = last.lock().unwrap();
            if let Some(next) = queue.pop_front() {
                *last = Some(next.clone());
                return next;
            }
            last.clone().unwrap_or_else(|| Err(LlmError::Provider { message: "script empty".into() }))
        })
    }

    pub fn echo_temperature(name: &str) -> Self {
        Self::responder(name, |req| {
            Ok(format!(
                "temperature={} max_tokens={}",
                req.temperature.unwrap_or_default(),
                req.max_tokens
            ))
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        Arc::clone(&self.requests)
    }

    pub fn boxed(self) -> BoxLlmProvider {
        BoxLlmProvider::new(self)
    }

    /// Single-provider chain with no retries and a short timeout.
    pub fn chain(self) -> Arc<FallbackChain> {
        Arc::new(FallbackChain::single(self.boxed(), quick_policy()))
    }
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, LlmError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let result = (self.responder)(request);
        let delay = self.delay;
        let name = self.name.clone();
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result.map(|content| CompletionResponse {
                id: format!("resp-{name}"),
                raw: serde_json::json!({ "content": content }),
                content,
                model: "mock-model".to_string(),
                usage: Usage {
                    input_tokens: 10,
                    output_tokens: 20,
                },
            })
        }
    }
}

pub fn quick_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 0,
        backoff: Duration::from_millis(1),
        timeout: Duration::from_secs(2),
    }
}

pub fn sample_character(personality_tag: &str) -> CharacterProfile {
    CharacterProfile {
        id: "anxious_01".to_string(),
        name: "Lin".to_string(),
        age: 27,
        gender: "female".to_string(),
        personality_tag: personality_tag.to_string(),
        relationship_belief_tag: "growth".to_string(),
        communication_tag: "indirect".to_string(),
        attachment_tag: "anxious".to_string(),
        background: "Works long hours at a design studio.".to_string(),
        trigger_topics: vec!["late replies".to_string()],
        coping_mechanisms: vec!["journaling".to_string()],
        scenario_id: Some("communication".to_string()),
        situation_id: Some("ignored_messages".to_string()),
    }
}

pub fn sample_situation() -> ScenarioSituation {
    ScenarioSituation {
        scenario_id: "communication".to_string(),
        situation_id: "ignored_messages".to_string(),
        name: "Ignored messages".to_string(),
        description: "One partner feels their messages are ignored.".to_string(),
        example: "He left her messages on read for a whole afternoon.".to_string(),
        typical_triggers: vec!["read but no reply".to_string()],
    }
}
