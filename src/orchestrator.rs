//! Tool-augmented conversation loop.
//!
//! The orchestrator sends the transcript to the model, dispatches every tool
//! the model asks for, feeds the outcomes back, and repeats until the model
//! answers without requesting tools.

use crate::config::{OrchestratorSettings, Settings};
use crate::conversation::{Conversation, Turn};
use crate::error::{Result, TripsyError};
use crate::model::{ModelClient, ModelRequest, ModelResponse};
use crate::tools::{dispatch_all, Capability, ToolArguments, ToolDeclaration, ToolRegistry};
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Where a run currently is.
#[derive(Debug)]
enum LoopState {
    AwaitingModel,
    DispatchingTools(ModelResponse),
    Done(ModelResponse),
}

/// Result of a completed `chat` run.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// The model's final response, unchanged.
    pub response: ModelResponse,
    /// Every turn sent to the model during the run.
    pub transcript: Conversation,
    /// Number of tool-dispatch cycles performed.
    pub cycles: usize,
}

impl ChatOutcome {
    /// Text of the final response.
    pub fn text(&self) -> String {
        self.response.text()
    }
}

/// Drives conversations between a model client and registered tools.
pub struct Orchestrator {
    client: Arc<dyn ModelClient>,
    registry: ToolRegistry,
    max_cycles: usize,
    parallel_dispatch: bool,
    max_tokens: u32,
    system_prompt: Option<String>,
}

impl Orchestrator {
    /// Create an orchestrator with an empty registry and default limits.
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        let defaults = OrchestratorSettings::default();
        Self {
            client,
            registry: ToolRegistry::new(),
            max_cycles: defaults.max_cycles,
            parallel_dispatch: defaults.parallel_dispatch,
            max_tokens: DEFAULT_MAX_TOKENS,
            system_prompt: None,
        }
    }

    /// Create an orchestrator configured from settings.
    pub fn from_settings(client: Arc<dyn ModelClient>, settings: &Settings) -> Self {
        let orchestrator = Self::new(client)
            .with_max_cycles(settings.orchestrator.max_cycles)
            .with_parallel_dispatch(settings.orchestrator.parallel_dispatch)
            .with_max_tokens(settings.model.max_tokens);
        match &settings.model.system_prompt {
            Some(prompt) => orchestrator.with_system_prompt(prompt.clone()),
            None => orchestrator,
        }
    }

    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Maximum number of tool-dispatch cycles per run.
    pub fn with_max_cycles(mut self, max_cycles: usize) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    /// Run the tool requests of one model turn concurrently.
    pub fn with_parallel_dispatch(mut self, parallel: bool) -> Self {
        self.parallel_dispatch = parallel;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Register a capability. Setup-time only.
    pub fn register<C>(&mut self, declaration: ToolDeclaration, capability: C) -> Result<()>
    where
        C: Capability + 'static,
    {
        self.registry.register(declaration, capability)
    }

    /// Register an async closure as a capability. Setup-time only.
    pub fn register_fn<F, Fut, O>(&mut self, declaration: ToolDeclaration, handler: F) -> Result<()>
    where
        F: Fn(ToolArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
        O: Into<Value> + Send + 'static,
    {
        self.registry.register_fn(declaration, handler)
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn max_cycles(&self) -> usize {
        self.max_cycles
    }

    /// Run a conversation seeded with `prompt` until the model gives a final answer.
    pub async fn chat(&self, prompt: &str) -> Result<ChatOutcome> {
        self.chat_turn(Turn::user_text(prompt)).await
    }

    /// Run a conversation seeded with a pre-built first turn.
    pub async fn chat_turn(&self, first_turn: Turn) -> Result<ChatOutcome> {
        self.chat_with_cancel(first_turn, CancellationToken::new()).await
    }

    /// Run a conversation that stops with [`TripsyError::Cancelled`] once `cancel` fires.
    ///
    /// Cancellation drops the in-flight model call or tool dispatch.
    pub async fn chat_with_cancel(
        &self,
        first_turn: Turn,
        cancel: CancellationToken,
    ) -> Result<ChatOutcome> {
        let span = info_span!("chat", run_id = %Uuid::new_v4());
        self.run(Conversation::with_turn(first_turn), cancel)
            .instrument(span)
            .await
    }

    async fn run(&self, mut conversation: Conversation, cancel: CancellationToken) -> Result<ChatOutcome> {
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut cycles = 0usize;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    let request = ModelRequest {
                        messages: conversation.turns(),
                        tools: self.registry.declarations(),
                        max_tokens: self.max_tokens,
                        system: self.system_prompt.as_deref(),
                    };
                    debug!("Calling model with {} turn(s)", conversation.len());

                    let response = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(TripsyError::Cancelled),
                        response = self.client.send(&request) => response?,
                    };

                    if response.stop_reason.is_tool_use() {
                        LoopState::DispatchingTools(response)
                    } else {
                        LoopState::Done(response)
                    }
                }
                LoopState::DispatchingTools(response) => {
                    if cycles >= self.max_cycles {
                        return Err(TripsyError::LoopBudgetExceeded {
                            max_cycles: self.max_cycles,
                        });
                    }

                    let requests = response.invocations();
                    if requests.is_empty() {
                        return Err(TripsyError::ModelBoundary(
                            "Model signalled tool use without requesting any tool".to_string(),
                        ));
                    }
                    for request in &requests {
                        if !seen_ids.insert(request.invocation_id.clone()) {
                            return Err(TripsyError::ModelBoundary(format!(
                                "Model reused invocation id '{}'",
                                request.invocation_id
                            )));
                        }
                    }

                    cycles += 1;
                    info!("Dispatch cycle {}: {} tool request(s)", cycles, requests.len());
                    conversation.push_assistant(response.content);

                    let outcomes = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(TripsyError::Cancelled),
                        outcomes = dispatch_all(&self.registry, &requests, self.parallel_dispatch) => outcomes,
                    };
                    conversation.push_outcomes(outcomes);
                    LoopState::AwaitingModel
                }
                LoopState::Done(response) => {
                    info!("Conversation finished after {} cycle(s)", cycles);
                    return Ok(ChatOutcome {
                        response,
                        transcript: conversation,
                        cycles,
                    });
                }
            };
        }
    }
}
