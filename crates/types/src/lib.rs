//! Shared type definitions for Relay.
//!
//! Configuration documents (APIs, endpoints, profiles, chains) deserialize into the
//! types in [`config`]. The engine turns them into concrete [`HttpRequest`] values and
//! reports what happened through [`StepExecutionResult`] and [`ChainExecutionResult`].
//! Maps are `IndexMap` throughout so authoring order survives into rendered output.

pub mod config;
pub mod http;
pub mod results;

pub use config::{ApiDefinition, ChainDefinition, ChainStep, EndpointDefinition, RelayConfig, ScalarMap, StepOverrides};
pub use http::{HttpRequest, HttpResponse};
pub use results::{ChainExecutionResult, StepExecutionResult};
