//! Built-in secret resolvers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::{Plugin, PluginCache, PluginRegistrar, SecretResolver};

/// Environment variable consulted for the prefix used by [`EnvSecretResolver::from_env`].
pub const SECRET_PREFIX_ENV_VAR: &str = "RELAY_SECRET_PREFIX";

/// Reads `{{secret.NAME}}` from the process environment variable `<prefix>NAME`.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretResolver {
    prefix: String,
}

impl EnvSecretResolver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// Uses the prefix configured in `RELAY_SECRET_PREFIX`, or none.
    pub fn from_env() -> Self {
        Self::new(std::env::var(SECRET_PREFIX_ENV_VAR).unwrap_or_default())
    }
}

#[async_trait]
impl SecretResolver for EnvSecretResolver {
    async fn resolve(&self, name: &str) -> Result<Option<String>> {
        let variable = format!("{}{}", self.prefix, name);
        let value = std::env::var(&variable).ok();
        debug!(secret = %name, found = value.is_some(), "looked up secret in environment -> [REDACTED]");
        Ok(value)
    }
}

/// Caches the values produced by another resolver. Misses are not cached.
pub struct CachedSecretResolver<R> {
    inner: R,
    cache: Arc<dyn PluginCache>,
    ttl: Option<Duration>,
}

impl<R: SecretResolver> CachedSecretResolver<R> {
    pub fn new(inner: R, cache: Arc<dyn PluginCache>, ttl: Option<Duration>) -> Self {
        Self { inner, cache, ttl }
    }

    fn cache_key(name: &str) -> String {
        format!("secret:{name}")
    }
}

#[async_trait]
impl<R: SecretResolver> SecretResolver for CachedSecretResolver<R> {
    async fn resolve(&self, name: &str) -> Result<Option<String>> {
        let key = Self::cache_key(name);
        if let Some(value) = self.cache.get(&key) {
            return Ok(Some(value));
        }
        let value = self.inner.resolve(name).await?;
        if let Some(value) = &value {
            self.cache.set(&key, value.clone(), self.ttl);
        }
        Ok(value)
    }
}

/// Installs a cached [`EnvSecretResolver`] (prefix from `RELAY_SECRET_PREFIX`) using the
/// registry's cache.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretsPlugin {
    ttl: Option<Duration>,
}

impl EnvSecretsPlugin {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self { ttl }
    }
}

impl Plugin for EnvSecretsPlugin {
    fn name(&self) -> &str {
        "env-secrets"
    }

    fn setup(&self, registrar: &mut PluginRegistrar<'_>) -> Result<()> {
        let cache = registrar.cache();
        registrar.register_secret_resolver(CachedSecretResolver::new(EnvSecretResolver::from_env(), cache, self.ttl));
        Ok(())
    }
}
