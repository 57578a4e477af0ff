//! Declarative configuration schema.
//!
//! A Relay document describes APIs (a base URL plus named endpoints), named profiles of
//! variables, and chains of sequential steps. Field names are camelCase on the wire.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Name to scalar mapping used for variables, headers, and params.
///
/// Values are kept as JSON so YAML numbers and booleans survive parsing; they are
/// coerced to strings when rendered.
pub type ScalarMap = IndexMap<String, JsonValue>;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    /// API definitions keyed by API name.
    #[serde(default)]
    pub apis: IndexMap<String, ApiDefinition>,
    /// Named variable profiles, merged left to right when several are selected.
    #[serde(default)]
    pub profiles: IndexMap<String, ScalarMap>,
    /// Chain definitions keyed by chain name.
    #[serde(default)]
    pub chains: IndexMap<String, ChainDefinition>,
}

impl RelayConfig {
    /// Looks up an endpoint by API and endpoint name.
    pub fn endpoint(&self, api_name: &str, endpoint_name: &str) -> Option<(&ApiDefinition, &EndpointDefinition)> {
        let api = self.apis.get(api_name)?;
        let endpoint = api.endpoints.get(endpoint_name)?;
        Some((api, endpoint))
    }
}

/// A remote API: base URL, shared headers/params/variables, and its endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiDefinition {
    /// Base URL; may contain templates.
    pub base_url: String,
    /// Headers sent with every endpoint of this API.
    #[serde(default)]
    pub headers: ScalarMap,
    /// Query params sent with every endpoint of this API.
    #[serde(default)]
    pub params: ScalarMap,
    /// Variables visible under the `api.` namespace and in unqualified lookups.
    #[serde(default)]
    pub variables: ScalarMap,
    /// Endpoints keyed by endpoint name.
    #[serde(default)]
    pub endpoints: IndexMap<String, EndpointDefinition>,
}

/// A single endpoint of an API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDefinition {
    /// HTTP method; defaults to `GET`.
    #[serde(default = "default_method")]
    pub method: String,
    /// Path appended to the API base URL; may contain templates.
    pub path: String,
    /// Endpoint headers; override API headers by key.
    #[serde(default)]
    pub headers: ScalarMap,
    /// Endpoint params; override API params by key.
    #[serde(default)]
    pub params: ScalarMap,
    /// Request body template.
    #[serde(default)]
    pub body: Option<JsonValue>,
    /// Variables visible under the `endpoint.` namespace and in unqualified lookups.
    #[serde(default)]
    pub variables: ScalarMap,
}

impl Default for EndpointDefinition {
    fn default() -> Self {
        Self {
            method: default_method(),
            path: String::new(),
            headers: ScalarMap::new(),
            params: ScalarMap::new(),
            body: None,
            variables: ScalarMap::new(),
        }
    }
}

fn default_method() -> String {
    "GET".to_string()
}

/// An ordered list of steps sharing one variable context.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChainDefinition {
    /// Free-form description shown by listings.
    #[serde(default)]
    pub description: Option<String>,
    /// Chain-level variables visible to every step.
    #[serde(default)]
    pub vars: ScalarMap,
    /// Steps executed strictly in declaration order.
    #[serde(default)]
    pub steps: Vec<ChainStep>,
}

/// One HTTP call inside a chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChainStep {
    /// Identifier unique within the chain; used by `steps.<id>` references.
    pub id: String,
    /// Target endpoint in `<api>.<endpoint>` form.
    pub call: String,
    /// Per-step overrides applied after API/endpoint merge.
    #[serde(default)]
    pub with: Option<StepOverrides>,
}

/// Per-step overrides. These take precedence over API and endpoint definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepOverrides {
    #[serde(default)]
    pub headers: ScalarMap,
    #[serde(default)]
    pub params: ScalarMap,
    /// Literal `{{name}}` substitutions applied to the built URL.
    #[serde(default)]
    pub path_params: ScalarMap,
    /// Replaces the endpoint body when present.
    #[serde(default)]
    pub body: Option<JsonValue>,
}
