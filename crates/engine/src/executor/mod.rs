//! Execution: resolves steps into requests, dispatches them through an injected
//! [`HttpExecutor`], and records the outcomes.
//!
//! - `runner::HttpExecutor` abstracts how a request is sent
//! - `chain::ChainExecutor` runs chains sequentially and fail-fast, and single endpoint
//!   calls through the same step pipeline
//! - Dry runs substitute a synthetic `200 OK` and perform no I/O

use crate::error::StepError;

pub mod chain;
pub mod runner;

pub use chain::{ChainExecutor, ChainRunState};
pub use runner::{HttpExecutor, NoopExecutor};

/// Switches applied to every step of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Assemble requests but never dispatch them.
    pub dry_run: bool,
}

impl ExecutionOptions {
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }
}

/// Splits a step `call` into API and endpoint names.
///
/// The call must contain exactly one `.` with non-empty names on both sides.
pub fn parse_call(call: &str) -> Result<(&str, &str), StepError> {
    let invalid = || StepError::InvalidCall { call: call.to_string() };
    let (api, endpoint) = call.split_once('.').ok_or_else(invalid)?;
    if api.is_empty() || endpoint.is_empty() || endpoint.contains('.') {
        return Err(invalid());
    }
    Ok((api, endpoint))
}
