//! Deterministic model client that replays scripted responses.
//!
//! Used to drive the tool loop without network access, and to record what
//! the loop actually sent on each call.

use super::{ModelClient, ModelRequest, ModelResponse};
use crate::conversation::Turn;
use crate::error::{Result, TripsyError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

type Generator = Box<dyn Fn(usize, &ModelRequest<'_>) -> Result<ModelResponse> + Send + Sync>;

/// Snapshot of one request received by a [`ScriptedClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub messages: Vec<Turn>,
    /// Advertised tool names, in declaration order.
    pub tools: Vec<String>,
    pub max_tokens: u32,
    pub system: Option<String>,
}

enum Script {
    Queue(VecDeque<Result<ModelResponse>>),
    Generator(Generator),
}

struct State {
    script: Script,
    requests: Vec<RecordedRequest>,
}

/// A [`ModelClient`] that answers from a fixed script.
pub struct ScriptedClient {
    model: String,
    state: Mutex<State>,
}

impl ScriptedClient {
    /// Reply with each response in turn; fail once the script is exhausted.
    pub fn new(responses: impl IntoIterator<Item = ModelResponse>) -> Self {
        Self::from_results(responses.into_iter().map(Ok))
    }

    /// Reply with each scripted result in turn, including errors.
    pub fn from_results(results: impl IntoIterator<Item = Result<ModelResponse>>) -> Self {
        Self::with_script(Script::Queue(results.into_iter().collect()))
    }

    /// Compute each reply from the zero-based call index and the request.
    pub fn from_fn<F>(generator: F) -> Self
    where
        F: Fn(usize, &ModelRequest<'_>) -> Result<ModelResponse> + Send + Sync + 'static,
    {
        Self::with_script(Script::Generator(Box::new(generator)))
    }

    fn with_script(script: Script) -> Self {
        Self {
            model: "scripted".to_string(),
            state: Mutex::new(State {
                script,
                requests: Vec::new(),
            }),
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ScriptedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedClient")
            .field("model", &self.model)
            .field("calls", &self.call_count())
            .finish()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn send(&self, request: &ModelRequest<'_>) -> Result<ModelResponse> {
        let mut state = self.lock();
        let index = state.requests.len();
        state.requests.push(RecordedRequest {
            messages: request.messages.to_vec(),
            tools: request.tools.iter().map(|t| t.name.clone()).collect(),
            max_tokens: request.max_tokens,
            system: request.system.map(str::to_string),
        });

        match &mut state.script {
            Script::Queue(queue) => queue.pop_front().unwrap_or_else(|| {
                Err(TripsyError::ModelBoundary(format!(
                    "Scripted client has no response for call {}",
                    index + 1
                )))
            }),
            Script::Generator(generator) => generator(index, request),
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}
