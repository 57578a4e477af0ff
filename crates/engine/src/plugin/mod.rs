//! Plugin capability interface.
//!
//! A plugin is compiled in and installed into a [`PluginRegistry`] before any resolution
//! happens. During [`Plugin::setup`] it receives a [`PluginRegistrar`] and registers the
//! capabilities it provides:
//!
//! - zero-argument variable sources, addressed as `{{plugins.<plugin>.<name>}}`
//! - parameterized sources, addressed as `{{plugins.<plugin>.<name>(arg, ...)}}`
//! - secret resolvers, queried in registration order for `{{secret.NAME}}`
//! - pre-request and post-response hooks run by the executor
//!
//! Every capability is an `async_trait` object so sources may perform I/O. Plain
//! synchronous closures can be adapted with [`variable_fn`] and [`function_fn`].

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use relay_types::{HttpRequest, HttpResponse};
use serde_json::Value;

pub mod builtin;
pub mod cache;
pub mod registry;
pub mod secrets;

pub use builtin::CorePlugin;
pub use cache::{MemoryCache, PluginCache};
pub use registry::{PluginRegistry, PluginRegistryBuilder, RegistryError};
pub use secrets::{CachedSecretResolver, EnvSecretResolver, EnvSecretsPlugin};

/// Zero-argument value source.
#[async_trait]
pub trait VariableSource: Send + Sync {
    async fn resolve(&self) -> Result<Value>;
}

/// N-argument value source. Arguments arrive fully resolved, left to right.
#[async_trait]
pub trait ParameterizedSource: Send + Sync {
    async fn call(&self, arguments: &[String]) -> Result<Value>;
}

/// Resolves `{{secret.NAME}}`. `Ok(None)` passes the lookup to the next resolver.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<Option<String>>;
}

/// Runs on every assembled request before it is dispatched.
#[async_trait]
pub trait PreRequestHook: Send + Sync {
    async fn before_request(&self, request: &mut HttpRequest) -> Result<()>;
}

/// Runs on every real response before success is evaluated.
#[async_trait]
pub trait PostResponseHook: Send + Sync {
    async fn after_response(&self, request: &HttpRequest, response: &mut HttpResponse) -> Result<()>;
}

/// A compiled-in plugin.
pub trait Plugin: Send + Sync {
    /// Namespace used in `plugins.<name>.*` references. Must be unique per registry.
    fn name(&self) -> &str;

    /// Registers this plugin's capabilities.
    fn setup(&self, registrar: &mut PluginRegistrar<'_>) -> Result<()>;
}

/// Registration surface handed to [`Plugin::setup`]. Everything registered is scoped to
/// the plugin being installed.
pub struct PluginRegistrar<'a> {
    plugin: String,
    builder: &'a mut PluginRegistryBuilder,
}

impl<'a> PluginRegistrar<'a> {
    pub(crate) fn new(plugin: impl Into<String>, builder: &'a mut PluginRegistryBuilder) -> Self {
        Self {
            plugin: plugin.into(),
            builder,
        }
    }

    /// Name of the plugin being installed.
    pub fn plugin_name(&self) -> &str {
        &self.plugin
    }

    /// Cache shared by all plugins of the registry under construction.
    pub fn cache(&self) -> Arc<dyn PluginCache> {
        self.builder.cache()
    }

    pub fn register_variable_source(&mut self, name: impl Into<String>, source: impl VariableSource + 'static) {
        self.builder
            .add_variable_source(&self.plugin, name.into(), Arc::new(source));
    }

    pub fn register_parameterized_variable_source(&mut self, name: impl Into<String>, source: impl ParameterizedSource + 'static) {
        self.builder.add_function(&self.plugin, name.into(), Arc::new(source));
    }

    pub fn register_secret_resolver(&mut self, resolver: impl SecretResolver + 'static) {
        self.builder.add_secret_resolver(&self.plugin, Arc::new(resolver));
    }

    pub fn register_pre_request_hook(&mut self, hook: impl PreRequestHook + 'static) {
        self.builder.add_pre_request_hook(&self.plugin, Arc::new(hook));
    }

    pub fn register_post_response_hook(&mut self, hook: impl PostResponseHook + 'static) {
        self.builder.add_post_response_hook(&self.plugin, Arc::new(hook));
    }
}

/// Adapter turning a synchronous closure into a [`VariableSource`].
pub struct FnVariableSource<F>(F);

#[async_trait]
impl<F> VariableSource for FnVariableSource<F>
where
    F: Fn() -> Result<Value> + Send + Sync,
{
    async fn resolve(&self) -> Result<Value> {
        (self.0)()
    }
}

/// Wraps `f` as a zero-argument variable source.
pub fn variable_fn<F>(f: F) -> FnVariableSource<F>
where
    F: Fn() -> Result<Value> + Send + Sync,
{
    FnVariableSource(f)
}

/// Adapter turning a synchronous closure into a [`ParameterizedSource`].
pub struct FnParameterizedSource<F>(F);

#[async_trait]
impl<F> ParameterizedSource for FnParameterizedSource<F>
where
    F: Fn(&[String]) -> Result<Value> + Send + Sync,
{
    async fn call(&self, arguments: &[String]) -> Result<Value> {
        (self.0)(arguments)
    }
}

/// Wraps `f` as a parameterized variable source.
pub fn function_fn<F>(f: F) -> FnParameterizedSource<F>
where
    F: Fn(&[String]) -> Result<Value> + Send + Sync,
{
    FnParameterizedSource(f)
}
