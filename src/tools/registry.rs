//! Name-indexed registry of tool capabilities.

use super::{Capability, FnCapability, ToolArguments, ToolDeclaration};
use crate::error::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// A declaration bound to the capability that executes it.
#[derive(Clone)]
pub struct ToolRegistration {
    pub declaration: ToolDeclaration,
    pub capability: Arc<dyn Capability>,
}

impl std::fmt::Debug for ToolRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistration")
            .field("declaration", &self.declaration)
            .finish_non_exhaustive()
    }
}

/// Registry mapping tool names to their bound capabilities.
///
/// Registering a name twice replaces the earlier binding. The advertised
/// declaration list keeps every registration in order, so it may contain
/// the same name more than once.
#[derive(Debug, Default, Clone)]
pub struct ToolRegistry {
    bindings: HashMap<String, ToolRegistration>,
    advertised: Vec<ToolDeclaration>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability under its declaration.
    pub fn register<C>(&mut self, declaration: ToolDeclaration, capability: C) -> Result<()>
    where
        C: Capability + 'static,
    {
        self.register_arc(declaration, Arc::new(capability))
    }

    /// Register an already shared capability.
    pub fn register_arc(
        &mut self,
        declaration: ToolDeclaration,
        capability: Arc<dyn Capability>,
    ) -> Result<()> {
        declaration.validate()?;

        let name = declaration.name.clone();
        let replaced = self
            .bindings
            .insert(
                name.clone(),
                ToolRegistration {
                    declaration: declaration.clone(),
                    capability,
                },
            )
            .is_some();

        if replaced {
            debug!("Replaced existing binding for tool '{}'", name);
        } else {
            debug!("Registered tool '{}'", name);
        }

        self.advertised.push(declaration);
        Ok(())
    }

    /// Register an async closure as a capability.
    pub fn register_fn<F, Fut, O>(&mut self, declaration: ToolDeclaration, handler: F) -> Result<()>
    where
        F: Fn(ToolArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
        O: Into<Value> + Send + 'static,
    {
        self.register(declaration, FnCapability::new(handler))
    }

    /// Look up the capability currently bound to `name`.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.bindings.get(name).map(|r| Arc::clone(&r.capability))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Declarations advertised to the model, in registration order.
    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.advertised
    }

    /// Number of distinct bound names.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
