//! # Relay Engine
//!
//! The Relay Engine turns declarative API definitions into concrete HTTP requests and
//! runs chains of dependent requests in order.
//!
//! ## Key Features
//!
//! - **Template Resolution**: `{{ ... }}` placeholders with scoped lookups, optional
//!   references (`{{name?}}`), secrets, plugin values, and nested plugin calls
//! - **Request Assembly**: base URL and path joining, header/param merging with the
//!   optional-value policy, per-step overrides, and query encoding
//! - **Chain Execution**: strictly sequential, fail-fast runs where later steps read
//!   earlier responses through `{{steps.<id>.response...}}`
//! - **Plugins**: compiled-in capabilities installed into an explicit registry
//!
//! ## Usage
//!
//! ```rust
//! use relay_engine::{parse_config_file, validate_config};
//!
//! let temp_dir = tempfile::tempdir()?;
//! let config_path = temp_dir.path().join("relay.yaml");
//! std::fs::write(&config_path, r#"
//! apis:
//!   users:
//!     baseUrl: "https://api.example.com"
//!     endpoints:
//!       get:
//!         path: "/users/{{userId}}"
//! "#)?;
//!
//! let config = parse_config_file(&config_path)?;
//! assert!(validate_config(&config).is_ok());
//! assert!(config.endpoint("users", "get").is_some());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`templates`**: placeholder parsing into segments and references
//! - **`context`**: variable scopes and precedence
//! - **`resolve`**: template resolution against a context and plugin registry
//! - **`optional`**: inclusion policy for optional header/param entries
//! - **`request`**: request assembly
//! - **`executor`**: chain and single-endpoint execution over an injected HTTP executor
//! - **`plugin`**: plugin capability traits, registry, cache, and built-in plugins

use std::{fs, path::Path};

use anyhow::{Context, Result};
use relay_types::RelayConfig;

pub mod context;
pub mod error;
pub mod executor;
pub mod optional;
pub mod plugin;
pub mod request;
pub mod resolve;
pub mod templates;

pub use context::VariableContext;
pub use error::{StepError, TemplateError, VariableResolutionError};
pub use executor::{ChainExecutor, ChainRunState, ExecutionOptions, HttpExecutor, NoopExecutor, parse_call};
pub use optional::{resolve_entries_with_optional, should_include};
pub use plugin::{Plugin, PluginRegistrar, PluginRegistry, PluginRegistryBuilder};
pub use request::{
    RequestAssembler, append_query, apply_path_params, build_url, merge_headers, merge_headers_with_optional, merge_params,
    merge_params_with_optional,
};
pub use resolve::{Rendered, TemplateResolver};
pub use templates::Template;

/// Loads a Relay configuration document (YAML, which also accepts JSON).
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not match the configuration schema.
pub fn parse_config_file(file_path: impl AsRef<Path>) -> Result<RelayConfig> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("Failed to read config file: {}", file_path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config file: {}", file_path.display()))
}

/// Checks structural rules serde cannot express.
///
/// Collects every problem instead of stopping at the first one: chain step ids must be
/// non-empty and unique within a chain, step calls must have the `<api>.<endpoint>`
/// shape and name a configured endpoint, and every template in the document must parse.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();

    for (api_name, api) in &config.apis {
        check_template(&mut problems, &format!("apis.{api_name}.baseUrl"), &api.base_url);
        for (key, value) in api.headers.iter().chain(&api.params) {
            if let Some(text) = value.as_str() {
                check_template(&mut problems, &format!("apis.{api_name}.{key}"), text);
            }
        }
        for (endpoint_name, endpoint) in &api.endpoints {
            let location = format!("apis.{api_name}.endpoints.{endpoint_name}");
            check_template(&mut problems, &format!("{location}.path"), &endpoint.path);
            for (key, value) in endpoint.headers.iter().chain(&endpoint.params) {
                if let Some(text) = value.as_str() {
                    check_template(&mut problems, &format!("{location}.{key}"), text);
                }
            }
        }
    }

    for (chain_name, chain) in &config.chains {
        let mut seen = std::collections::HashSet::new();
        for (index, step) in chain.steps.iter().enumerate() {
            let location = format!("chains.{chain_name}.steps[{index}]");
            if step.id.trim().is_empty() {
                problems.push(format!("{location}: step id is empty"));
            } else if !seen.insert(step.id.as_str()) {
                problems.push(format!("{location}: duplicate step id '{}'", step.id));
            }
            match parse_call(&step.call) {
                Ok((api_name, endpoint_name)) if config.endpoint(api_name, endpoint_name).is_none() => {
                    problems.push(format!("{location}: '{}' does not name a configured endpoint", step.call));
                }
                Ok(_) => {}
                Err(error) => problems.push(format!("{location}: {error}")),
            }
        }
    }

    if problems.is_empty() { Ok(()) } else { Err(problems) }
}

fn check_template(problems: &mut Vec<String>, location: &str, text: &str) {
    if let Err(error) = Template::parse(text) {
        problems.push(format!("{location}: {error}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
apis:
  users:
    baseUrl: "https://{{host}}"
    headers:
      Authorization: "Bearer {{secret.TOKEN}}"
    endpoints:
      get:
        path: "/users/{{userId}}"
      create:
        method: POST
        path: "/users"
        body:
          name: "{{name}}"
profiles:
  dev:
    host: dev.example.com
chains:
  onboard:
    description: Create then fetch
    steps:
      - id: create
        call: users.create
      - id: fetch
        call: users.get
        with:
          pathParams:
            userId: "{{steps.create.response.body.id}}"
"#;

    #[test]
    fn parses_config_file() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let path = temp_dir.path().join("relay.yaml");
        fs::write(&path, CONFIG).expect("write");

        let config = parse_config_file(&path).expect("parse");
        assert_eq!(config.apis["users"].endpoints["create"].method, "POST");
        assert_eq!(config.chains["onboard"].steps.len(), 2);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn missing_file_reports_path() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let path = temp_dir.path().join("absent.yaml");
        let error = parse_config_file(&path).expect_err("missing");
        assert!(error.to_string().contains("absent.yaml"));
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut config: RelayConfig = serde_yaml::from_str(CONFIG).expect("parse");
        let chain = config.chains.get_mut("onboard").expect("chain");
        chain.steps[1].id = "create".into();
        chain.steps[1].call = "users.delete".into();
        chain.steps[0].call = "broken".into();
        config.apis.get_mut("users").expect("api").base_url = "https://{{}}".into();

        let problems = validate_config(&config).expect_err("invalid");
        assert_eq!(problems.len(), 4, "{problems:#?}");
        assert!(problems.iter().any(|problem| problem.contains("duplicate step id 'create'")));
        assert!(problems.iter().any(|problem| problem.contains("'users.delete' does not name")));
        assert!(problems.iter().any(|problem| problem.contains("invalid call 'broken'")));
        assert!(problems.iter().any(|problem| problem.starts_with("apis.users.baseUrl")));
    }
}
