//! Explicit plugin registry passed into the resolver and executor.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use super::{MemoryCache, ParameterizedSource, Plugin, PluginCache, PluginRegistrar, PostResponseHook, PreRequestHook, SecretResolver, VariableSource};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("plugin '{name}' is already installed")]
    DuplicatePlugin { name: String },

    #[error("invalid plugin name '{name}': use letters, digits, '_' or '-'")]
    InvalidName { name: String },

    #[error("plugin '{name}' setup failed: {reason}")]
    SetupFailed { name: String, reason: String },
}

#[derive(Default, Clone)]
struct PluginSources {
    variables: IndexMap<String, Arc<dyn VariableSource>>,
    functions: IndexMap<String, Arc<dyn ParameterizedSource>>,
}

/// Installed plugins and their capabilities. Immutable once built.
#[derive(Clone)]
pub struct PluginRegistry {
    plugins: IndexMap<String, PluginSources>,
    secret_resolvers: Vec<(String, Arc<dyn SecretResolver>)>,
    pre_request_hooks: Vec<(String, Arc<dyn PreRequestHook>)>,
    post_response_hooks: Vec<(String, Arc<dyn PostResponseHook>)>,
    cache: Arc<dyn PluginCache>,
}

impl PluginRegistry {
    pub fn builder() -> PluginRegistryBuilder {
        PluginRegistryBuilder::new()
    }

    /// Registry with no plugins installed.
    pub fn empty() -> Self {
        PluginRegistryBuilder::new().build()
    }

    pub fn contains_plugin(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn plugin_names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn variable_source(&self, plugin: &str, name: &str) -> Option<&Arc<dyn VariableSource>> {
        self.plugins.get(plugin)?.variables.get(name)
    }

    pub fn function(&self, plugin: &str, name: &str) -> Option<&Arc<dyn ParameterizedSource>> {
        self.plugins.get(plugin)?.functions.get(name)
    }

    /// Secret resolvers in registration order, paired with the owning plugin name.
    pub fn secret_resolvers(&self) -> impl Iterator<Item = (&str, &Arc<dyn SecretResolver>)> {
        self.secret_resolvers
            .iter()
            .map(|(plugin, resolver)| (plugin.as_str(), resolver))
    }

    pub fn pre_request_hooks(&self) -> impl Iterator<Item = (&str, &Arc<dyn PreRequestHook>)> {
        self.pre_request_hooks.iter().map(|(plugin, hook)| (plugin.as_str(), hook))
    }

    pub fn post_response_hooks(&self) -> impl Iterator<Item = (&str, &Arc<dyn PostResponseHook>)> {
        self.post_response_hooks.iter().map(|(plugin, hook)| (plugin.as_str(), hook))
    }

    pub fn cache(&self) -> Arc<dyn PluginCache> {
        Arc::clone(&self.cache)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .field("secret_resolvers", &self.secret_resolvers.len())
            .field("pre_request_hooks", &self.pre_request_hooks.len())
            .field("post_response_hooks", &self.post_response_hooks.len())
            .finish()
    }
}

/// Collects plugin registrations before any resolution occurs.
pub struct PluginRegistryBuilder {
    plugins: IndexMap<String, PluginSources>,
    secret_resolvers: Vec<(String, Arc<dyn SecretResolver>)>,
    pre_request_hooks: Vec<(String, Arc<dyn PreRequestHook>)>,
    post_response_hooks: Vec<(String, Arc<dyn PostResponseHook>)>,
    cache: Arc<dyn PluginCache>,
}

impl PluginRegistryBuilder {
    pub fn new() -> Self {
        Self {
            plugins: IndexMap::new(),
            secret_resolvers: Vec::new(),
            pre_request_hooks: Vec::new(),
            post_response_hooks: Vec::new(),
            cache: Arc::new(MemoryCache::new()),
        }
    }

    /// Replaces the default in-memory cache handed to plugins during setup.
    pub fn with_cache(mut self, cache: Arc<dyn PluginCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Runs `plugin.setup` and records everything it registers.
    pub fn install(mut self, plugin: impl Plugin) -> Result<Self, RegistryError> {
        let name = plugin.name().to_string();
        if name.is_empty()
            || !name
                .chars()
                .all(|character| character.is_ascii_alphanumeric() || character == '_' || character == '-')
        {
            return Err(RegistryError::InvalidName { name });
        }
        if self.plugins.contains_key(&name) {
            return Err(RegistryError::DuplicatePlugin { name });
        }

        self.plugins.insert(name.clone(), PluginSources::default());
        let mut registrar = PluginRegistrar::new(name.clone(), &mut self);
        plugin.setup(&mut registrar).map_err(|error| RegistryError::SetupFailed {
            name: name.clone(),
            reason: format!("{error:#}"),
        })?;

        debug!(plugin = %name, "installed plugin");
        Ok(self)
    }

    pub fn build(self) -> PluginRegistry {
        PluginRegistry {
            plugins: self.plugins,
            secret_resolvers: self.secret_resolvers,
            pre_request_hooks: self.pre_request_hooks,
            post_response_hooks: self.post_response_hooks,
            cache: self.cache,
        }
    }

    pub(crate) fn cache(&self) -> Arc<dyn PluginCache> {
        Arc::clone(&self.cache)
    }

    pub(crate) fn add_variable_source(&mut self, plugin: &str, name: String, source: Arc<dyn VariableSource>) {
        self.plugins
            .entry(plugin.to_string())
            .or_default()
            .variables
            .insert(name, source);
    }

    pub(crate) fn add_function(&mut self, plugin: &str, name: String, source: Arc<dyn ParameterizedSource>) {
        self.plugins
            .entry(plugin.to_string())
            .or_default()
            .functions
            .insert(name, source);
    }

    pub(crate) fn add_secret_resolver(&mut self, plugin: &str, resolver: Arc<dyn SecretResolver>) {
        self.secret_resolvers.push((plugin.to_string(), resolver));
    }

    pub(crate) fn add_pre_request_hook(&mut self, plugin: &str, hook: Arc<dyn PreRequestHook>) {
        self.pre_request_hooks.push((plugin.to_string(), hook));
    }

    pub(crate) fn add_post_response_hook(&mut self, plugin: &str, hook: Arc<dyn PostResponseHook>) {
        self.post_response_hooks.push((plugin.to_string(), hook));
    }
}

impl Default for PluginRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
