//! Dispatch of tool invocation requests with failure containment.

use super::{ToolArguments, ToolRegistry};
use crate::conversation::{ToolInvocationRequest, ToolOutcome};
use crate::error::TripsyError;
use futures::future::join_all;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{info, warn};

/// Result of running one capability.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolExecution {
    Success(String),
    Failure(String),
}

impl ToolExecution {
    /// Attach the originating invocation id.
    pub fn into_outcome(self, invocation_id: impl Into<String>) -> ToolOutcome {
        match self {
            ToolExecution::Success(text) => ToolOutcome::success(invocation_id, text),
            ToolExecution::Failure(message) => ToolOutcome::error(invocation_id, message),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ToolExecution::Failure(_))
    }
}

impl ToolRegistry {
    /// Execute one request against the registry.
    ///
    /// Never fails: a missing tool, a capability error, and a capability
    /// panic all come back as [`ToolExecution::Failure`].
    pub async fn execute(&self, request: &ToolInvocationRequest) -> ToolExecution {
        let Some(capability) = self.resolve(&request.tool_name) else {
            return ToolExecution::Failure(
                TripsyError::ToolNotFound(request.tool_name.clone()).to_string(),
            );
        };

        let args = ToolArguments::new(request.arguments.clone());
        let invocation = AssertUnwindSafe(capability.invoke(args)).catch_unwind();

        match invocation.await {
            Ok(Ok(value)) => ToolExecution::Success(coerce_to_text(value)),
            Ok(Err(e)) => ToolExecution::Failure(failure_message(e)),
            Err(payload) => ToolExecution::Failure(
                TripsyError::ToolExecution(panic_message(payload.as_ref())).to_string(),
            ),
        }
    }

    /// Execute one request and wrap the result as an outcome.
    pub async fn dispatch(&self, request: &ToolInvocationRequest) -> ToolOutcome {
        info!(
            "Calling tool: {} with args: {}",
            request.tool_name,
            serde_json::Value::Object(request.arguments.clone())
        );

        let execution = self.execute(request).await;
        if let ToolExecution::Failure(message) = &execution {
            warn!(
                tool = %request.tool_name,
                invocation_id = %request.invocation_id,
                "Tool returned an error: {}",
                message
            );
        }
        execution.into_outcome(request.invocation_id.clone())
    }
}

/// Dispatch every request of one model turn.
///
/// Outcomes are returned in request order whether or not the requests ran
/// concurrently.
pub async fn dispatch_all(
    registry: &ToolRegistry,
    requests: &[ToolInvocationRequest],
    parallel: bool,
) -> Vec<ToolOutcome> {
    if parallel && requests.len() > 1 {
        join_all(requests.iter().map(|r| registry.dispatch(r))).await
    } else {
        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            outcomes.push(registry.dispatch(request).await);
        }
        outcomes
    }
}

/// Render a capability's return value as text for the model.
fn coerce_to_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn failure_message(error: TripsyError) -> String {
    match error {
        TripsyError::ToolExecution(_) => error.to_string(),
        other => TripsyError::ToolExecution(other.to_string()).to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "capability panicked".to_string()
    }
}
