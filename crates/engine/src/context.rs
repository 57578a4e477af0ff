//! Variable scopes available to template resolution.
//!
//! A [`VariableContext`] is built once per top-level invocation (one request or one chain
//! run). Only `steps` grows during a run; every other scope is fixed once the run starts.
//! Plugin and secret sources are not stored here; they live in the
//! [`PluginRegistry`](crate::plugin::PluginRegistry) injected into the resolver.

use std::collections::HashMap;

use anyhow::{Result, bail};
use indexmap::{IndexMap, map::Entry};
use relay_types::{ApiDefinition, EndpointDefinition, RelayConfig, ScalarMap, StepExecutionResult};
use serde_json::{Value, json};

use crate::templates::Scope;

/// Named scopes consulted by the resolver.
///
/// Unqualified lookups use the precedence
/// `cli > chain > endpoint > api > profile > env`; namespaced references
/// (`env.`, `profile.`, `api.`, `endpoint.`) address one scope directly.
#[derive(Debug, Default, Clone)]
pub struct VariableContext {
    /// Values supplied by the invoker; highest precedence.
    pub cli: IndexMap<String, String>,
    /// Union of the selected profiles, later profiles winning on collision.
    pub profile: ScalarMap,
    /// Variables declared by the API being invoked.
    pub api: ScalarMap,
    /// Variables declared by the endpoint being invoked.
    pub endpoint: ScalarMap,
    /// Chain-level `vars`, visible to every step of the chain.
    pub chain: ScalarMap,
    /// Recorded steps keyed by id, in execution order. Append-only during a run.
    pub steps: IndexMap<String, Value>,
    /// Process environment snapshot.
    pub env: HashMap<String, String>,
}

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots the current process environment into the `env` scope.
    pub fn with_process_env(mut self) -> Self {
        self.env = std::env::vars().collect();
        self
    }

    pub fn with_cli_variables<I, K, V>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.cli
            .extend(variables.into_iter().map(|(key, value)| (key.into(), value.into())));
        self
    }

    /// Merges the named profiles from `config` left to right into the `profile` scope.
    pub fn apply_profiles(&mut self, config: &RelayConfig, names: &[String]) -> Result<()> {
        for name in names {
            let Some(profile) = config.profiles.get(name) else {
                bail!("unknown profile '{name}'");
            };
            self.profile
                .extend(profile.iter().map(|(key, value)| (key.clone(), value.clone())));
        }
        Ok(())
    }

    /// Copy of this context with the `api` and `endpoint` scopes set for one request.
    pub fn scoped_to(&self, api: &ApiDefinition, endpoint: &EndpointDefinition) -> Self {
        let mut scoped = self.clone();
        scoped.api = api.variables.clone();
        scoped.endpoint = endpoint.variables.clone();
        scoped
    }

    /// Appends a step so later templates can address it as `steps.<id>`.
    ///
    /// Returns `false` and leaves the existing record untouched when the id is already taken.
    pub fn record_step(&mut self, result: &StepExecutionResult) -> bool {
        match self.steps.entry(result.step_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(step_record(result));
                true
            }
        }
    }

    /// Resolves an unqualified name by precedence. Returns the raw text, which may itself
    /// contain placeholders.
    pub fn lookup(&self, name: &str) -> Option<String> {
        if let Some(value) = self.cli.get(name) {
            return Some(value.clone());
        }
        [&self.chain, &self.endpoint, &self.api, &self.profile]
            .into_iter()
            .find_map(|scope| scope.get(name).and_then(render_scalar))
            .or_else(|| self.env.get(name).cloned())
    }

    /// Resolves a name in exactly one scope. Secrets are not held by the context and
    /// always yield `None` here.
    pub fn lookup_scoped(&self, scope: Scope, name: &str) -> Option<String> {
        match scope {
            Scope::Env => self.env.get(name).cloned(),
            Scope::Profile => self.profile.get(name).and_then(render_scalar),
            Scope::Api => self.api.get(name).and_then(render_scalar),
            Scope::Endpoint => self.endpoint.get(name).and_then(render_scalar),
            Scope::Secret => None,
        }
    }

    /// Walks `path` inside a recorded step.
    pub fn step_value(&self, step_id: &str, path: &[String]) -> Option<&Value> {
        let mut current = self.steps.get(step_id)?;
        for segment in path {
            current = match current {
                Value::Object(map) => map.get(segment).or_else(|| {
                    map.iter()
                        .find(|(key, _)| key.eq_ignore_ascii_case(segment))
                        .map(|(_, value)| value)
                })?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// JSON shape of a recorded step: the request as sent and the response with its body
/// parsed when structured.
fn step_record(result: &StepExecutionResult) -> Value {
    json!({
        "request": {
            "method": result.request.method,
            "url": result.request.url,
            "headers": result.request.headers,
            "body": result.request.body,
        },
        "response": {
            "status": result.response.status,
            "statusText": result.response.status_text,
            "headers": result.response.headers,
            "body": result.response.body_value(),
        },
    })
}

/// Coerces a scalar to its template text. `null` counts as undefined.
pub fn render_scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        other => Some(other.to_string()),
    }
}
