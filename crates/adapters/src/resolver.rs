// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maps action kinds to capabilities
//!
//! Kinds register a factory; resolving a kind builds the capability and
//! wraps it in [`TracedAction`].

use crate::action::{
    Action, ActionError, ActionOutcome, HttpAction, Params, PlanAction, ShellAction, SshAction,
    WakeAction,
};
use crate::traced::TracedAction;
use cg_core::{ActionSpec, PlanBook, PlanError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Factory = Arc<dyn Fn() -> Arc<dyn Action> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ActionResolver {
    factories: HashMap<String, Factory>,
}

impl ActionResolver {
    /// A resolver with no kinds registered
    pub fn new() -> Self {
        Self::default()
    }

    /// A resolver with the built-in `shell`, `ssh`, `wake` and `http` kinds
    pub fn with_defaults() -> Self {
        let mut resolver = Self::new();
        resolver.register_instance(ShellAction::KIND, ShellAction::new());
        resolver.register_instance(SshAction::KIND, SshAction::new());
        resolver.register_instance(WakeAction::KIND, WakeAction::new());
        resolver.register_instance(HttpAction::KIND, HttpAction::new());
        resolver
    }

    /// Register (or replace) the factory for a kind
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Action> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    /// Register a kind served by clones of one instance
    pub fn register_instance<A: Action + Clone>(&mut self, kind: impl Into<String>, action: A) {
        self.register(kind, move || Arc::new(action.clone()) as Arc<dyn Action>);
    }

    /// Register the `plan` kind over `book`
    ///
    /// Steps resolve against the kinds registered so far. Fails when a step
    /// command names neither a plan nor a registered kind.
    pub fn register_plans(&mut self, book: PlanBook) -> Result<(), PlanError> {
        for (name, plan) in book.iter() {
            for (index, step) in plan.steps.iter().enumerate() {
                if !book.contains(&step.command) && !self.contains(&step.command) {
                    return Err(PlanError::UnknownCommand {
                        plan: name.to_string(),
                        step: index,
                        command: step.command.clone(),
                    });
                }
            }
        }
        let action = PlanAction::new(book, self.clone());
        self.register_instance(PlanAction::KIND, action);
        Ok(())
    }

    pub fn resolve(&self, kind: &str) -> Result<Arc<dyn Action>, ActionError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| ActionError::UnknownKind(kind.to_string()))?;
        Ok(Arc::new(TracedAction::new(factory())))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Resolve `spec.kind` and invoke it with `spec.params`
    pub async fn invoke(
        &self,
        spec: &ActionSpec,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<ActionOutcome, ActionError> {
        let action = self.resolve(&spec.kind)?;
        let params = Params::new(spec.params.clone());
        action.invoke(&params, deadline, cancel).await
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
