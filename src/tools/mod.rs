//! Tool registry and the uniform capability interface.
//!
//! Every tool is treated the same way by the orchestrator: a declared name,
//! a schema forwarded to the model, and a [`Capability`] that maps named
//! arguments to a JSON value which is coerced to text for the model.

mod dispatch;
mod registry;

pub use dispatch::{dispatch_all, ToolExecution};
pub use registry::{ToolRegistration, ToolRegistry};

use crate::error::{Result, TripsyError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;

/// Declaration of a tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDeclaration {
    /// Create a new declaration.
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Check the declaration is usable for registration.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TripsyError::InvalidTool("tool declaration has no name".to_string()));
        }
        if !self.input_schema.is_object() {
            return Err(TripsyError::InvalidTool(format!(
                "input schema for '{}' must be a JSON object",
                self.name
            )));
        }
        Ok(())
    }
}

/// Named arguments passed to a capability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments(Map<String, Value>);

impl ToolArguments {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Look up a single named argument.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Deserialize the arguments into a typed parameter struct.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| TripsyError::InvalidInput(format!("Invalid tool arguments: {}", e)))
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for ToolArguments {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A locally implemented function the model can call.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Invoke the capability with the model's arguments.
    async fn invoke(&self, args: ToolArguments) -> Result<Value>;
}

/// A capability backed by an async closure.
pub struct FnCapability<F> {
    handler: F,
}

impl<F> FnCapability<F> {
    pub fn new<Fut, O>(handler: F) -> Self
    where
        F: Fn(ToolArguments) -> Fut + Send + Sync,
        Fut: Future<Output = Result<O>> + Send + 'static,
        O: Into<Value> + Send + 'static,
    {
        Self { handler }
    }
}

impl<F> std::fmt::Debug for FnCapability<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnCapability").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut, O> Capability for FnCapability<F>
where
    F: Fn(ToolArguments) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O>> + Send + 'static,
    O: Into<Value> + Send + 'static,
{
    async fn invoke(&self, args: ToolArguments) -> Result<Value> {
        (self.handler)(args).await.map(Into::into)
    }
}
