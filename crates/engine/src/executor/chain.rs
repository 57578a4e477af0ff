//! Sequential, fail-fast chain execution.
//!
//! A chain run owns its [`VariableContext`] for the duration of the run. Each step gets a
//! copy scoped to its API and endpoint that also sees every step recorded so far; after a
//! successful step its request and response are appended so later steps can reference
//! them as `steps.<id>.request...` / `steps.<id>.response...`. The first failure ends
//! the run.

use std::{sync::Arc, time::Instant};

use anyhow::{Result, bail};
use relay_types::{ChainDefinition, ChainExecutionResult, HttpRequest, HttpResponse, RelayConfig, StepExecutionResult, StepOverrides};
use tracing::{debug, info, warn};

use super::{ExecutionOptions, HttpExecutor, parse_call};
use crate::{
    context::VariableContext,
    error::StepError,
    plugin::PluginRegistry,
    request::RequestAssembler,
    resolve::TemplateResolver,
};

/// Lifecycle of one chain run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainRunState {
    NotStarted,
    Running { step_index: usize },
    Succeeded,
    Failed { step_id: String, reason: String },
}

impl ChainRunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. })
    }
}

/// Runs chains and single endpoint calls against a configuration.
pub struct ChainExecutor {
    http: Arc<dyn HttpExecutor>,
    assembler: RequestAssembler,
    options: ExecutionOptions,
}

impl ChainExecutor {
    pub fn new(http: Arc<dyn HttpExecutor>, plugins: Arc<PluginRegistry>, options: ExecutionOptions) -> Self {
        Self {
            http,
            assembler: RequestAssembler::new(TemplateResolver::new(plugins)),
            options,
        }
    }

    pub fn options(&self) -> ExecutionOptions {
        self.options
    }

    pub fn plugins(&self) -> &Arc<PluginRegistry> {
        self.assembler.resolver().plugins()
    }

    /// Looks up `chain_name` in `config` and runs it.
    ///
    /// Only an unknown chain name is an `Err`; step failures are reported inside the
    /// returned [`ChainExecutionResult`].
    pub async fn run(&self, config: &RelayConfig, chain_name: &str, context: VariableContext) -> Result<ChainExecutionResult> {
        let Some(chain) = config.chains.get(chain_name) else {
            bail!("unknown chain '{chain_name}'");
        };
        Ok(self.execute_chain(config, chain_name, chain, context).await)
    }

    /// Executes every step of `chain` in declaration order, stopping at the first failure.
    pub async fn execute_chain(
        &self,
        config: &RelayConfig,
        chain_name: &str,
        chain: &ChainDefinition,
        mut context: VariableContext,
    ) -> ChainExecutionResult {
        context.chain = chain.vars.clone();
        context.steps.clear();

        let mut state = ChainRunState::NotStarted;
        let mut steps = Vec::with_capacity(chain.steps.len());
        info!(
            chain = %chain_name,
            step_count = chain.steps.len(),
            dry_run = self.options.dry_run,
            "starting chain"
        );

        for (step_index, step) in chain.steps.iter().enumerate() {
            state = ChainRunState::Running { step_index };
            debug!(chain = %chain_name, step = %step.id, state = ?state, "running step");

            let result = if context.steps.contains_key(&step.id) {
                let error = StepError::DuplicateStepId { step_id: step.id.clone() };
                warn!(chain = %chain_name, step = %step.id, "step id already used in this run");
                StepExecutionResult::preparation_failure(&step.id, error.to_string())
            } else {
                self.execute_step(config, &step.id, &step.call, step.with.as_ref(), &context)
                    .await
            };

            if !result.success {
                let reason = result.error.clone().unwrap_or_else(|| "unknown error".to_string());
                state = ChainRunState::Failed {
                    step_id: step.id.clone(),
                    reason,
                };
                steps.push(result);
                break;
            }

            context.record_step(&result);
            steps.push(result);
        }

        if !state.is_terminal() {
            state = ChainRunState::Succeeded;
        }

        match state {
            ChainRunState::Failed { step_id, reason } => {
                let error = format!("Step '{step_id}' failed: {reason}");
                warn!(chain = %chain_name, step = %step_id, error = %error, "chain failed");
                ChainExecutionResult {
                    chain_name: chain_name.to_string(),
                    success: false,
                    steps,
                    error: Some(error),
                }
            }
            _ => {
                info!(chain = %chain_name, step_count = steps.len(), "chain succeeded");
                ChainExecutionResult {
                    chain_name: chain_name.to_string(),
                    success: true,
                    steps,
                    error: None,
                }
            }
        }
    }

    /// Invokes one endpoint outside of any chain. The result's step id is
    /// `<api>.<endpoint>`.
    pub async fn call_endpoint(&self, config: &RelayConfig, api_name: &str, endpoint_name: &str, context: &VariableContext) -> StepExecutionResult {
        let call = format!("{api_name}.{endpoint_name}");
        self.execute_step(config, &call, &call, None, context).await
    }

    async fn execute_step(
        &self,
        config: &RelayConfig,
        step_id: &str,
        call: &str,
        overrides: Option<&StepOverrides>,
        context: &VariableContext,
    ) -> StepExecutionResult {
        let mut request = match self.prepare(config, call, overrides, context).await {
            Ok(request) => request,
            Err(error) => {
                warn!(step = %step_id, call = %call, error = %error, "step preparation failed");
                return StepExecutionResult::preparation_failure(step_id, error.to_string());
            }
        };

        for (plugin, hook) in self.plugins().pre_request_hooks() {
            if let Err(error) = hook.before_request(&mut request).await {
                let error = StepError::Hook {
                    hook: "pre-request",
                    plugin: plugin.to_string(),
                    message: format!("{error:#}"),
                };
                warn!(step = %step_id, error = %error, "pre-request hook failed");
                return failed(step_id, request, HttpResponse::default(), error.to_string());
            }
        }

        if self.options.dry_run {
            info!(step = %step_id, method = %request.method, url = %request.url, "dry run: request not sent");
            return StepExecutionResult {
                step_id: step_id.to_string(),
                request,
                response: HttpResponse::dry_run(),
                success: true,
                error: None,
            };
        }

        let started_at = Instant::now();
        let mut response = match self.http.execute(&request).await {
            Ok(response) => response,
            Err(error) => {
                let error = StepError::Transport(format!("{error:#}"));
                warn!(step = %step_id, url = %request.url, error = %error, "request failed");
                return failed(step_id, request, HttpResponse::default(), error.to_string());
            }
        };
        let duration_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);

        for (plugin, hook) in self.plugins().post_response_hooks() {
            if let Err(error) = hook.after_response(&request, &mut response).await {
                let error = StepError::Hook {
                    hook: "post-response",
                    plugin: plugin.to_string(),
                    message: format!("{error:#}"),
                };
                warn!(step = %step_id, error = %error, "post-response hook failed");
                return failed(step_id, request, response, error.to_string());
            }
        }

        info!(
            step = %step_id,
            method = %request.method,
            url = %request.url,
            status = response.status,
            duration_ms,
            "step completed"
        );
        let success = response.is_success();
        let error = (!success).then(|| format!("HTTP {} {}", response.status, response.status_text));
        StepExecutionResult {
            step_id: step_id.to_string(),
            request,
            response,
            success,
            error,
        }
    }

    async fn prepare(
        &self,
        config: &RelayConfig,
        call: &str,
        overrides: Option<&StepOverrides>,
        context: &VariableContext,
    ) -> Result<HttpRequest, StepError> {
        let (api_name, endpoint_name) = parse_call(call)?;
        let api = config.apis.get(api_name).ok_or_else(|| StepError::UnknownApi {
            api: api_name.to_string(),
        })?;
        let endpoint = api
            .endpoints
            .get(endpoint_name)
            .ok_or_else(|| StepError::UnknownEndpoint {
                api: api_name.to_string(),
                endpoint: endpoint_name.to_string(),
            })?;

        let step_context = context.scoped_to(api, endpoint);
        Ok(self
            .assembler
            .assemble(api, endpoint, overrides, &step_context)
            .await?)
    }
}

fn failed(step_id: &str, request: HttpRequest, response: HttpResponse, error: String) -> StepExecutionResult {
    StepExecutionResult {
        step_id: step_id.to_string(),
        request,
        response,
        success: false,
        error: Some(error),
    }
}
