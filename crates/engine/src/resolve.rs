//! # Template Resolution
//!
//! [`TemplateResolver`] renders parsed templates against a [`VariableContext`] and the
//! injected [`PluginRegistry`]. It holds no per-run state and can be shared between runs.
//!
//! Resolution is sequential: placeholders are resolved left to right, plugin call
//! arguments are resolved innermost-first before the call, and every plugin or secret
//! lookup is awaited before the next one starts, so plugin side effects happen in
//! reference order.
//!
//! Context values (CLI, chain, endpoint, API, profile, env) may themselves contain
//! placeholders; those are resolved recursively up to [`MAX_RESOLUTION_DEPTH`] levels.
//! Plugin results, secrets, and step values are used verbatim.
//!
//! ```rust
//! use relay_engine::{TemplateResolver, VariableContext};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), relay_engine::VariableResolutionError> {
//! let context = VariableContext::new().with_cli_variables([("itemId", "42")]);
//! let resolver = TemplateResolver::default();
//! let path = resolver.resolve("/users/{{itemId}}", &context).await?;
//! assert_eq!(path, "/users/42");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tracing::{debug, trace};

use crate::{
    context::{VariableContext, render_scalar},
    error::VariableResolutionError,
    plugin::PluginRegistry,
    templates::{Reference, ReferenceKind, Scope, Segment, Template, contains_placeholder},
};

/// Maximum nesting of values that expand into further placeholders.
pub const MAX_RESOLUTION_DEPTH: usize = 10;

/// Output of rendering one template, with the bookkeeping the optional-value policy needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    /// Rendered text; undefined optional references contribute nothing.
    pub text: String,
    /// Number of top-level optional references in the template.
    pub optional_references: usize,
    /// How many of those were undefined.
    pub undefined_optional: usize,
}

impl Rendered {
    fn literal(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }

    /// Optional references that resolved to a value.
    pub fn defined_optional(&self) -> usize {
        self.optional_references - self.undefined_optional
    }
}

/// Resolves `{{...}}` templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateResolver {
    plugins: Arc<PluginRegistry>,
}

impl TemplateResolver {
    pub fn new(plugins: Arc<PluginRegistry>) -> Self {
        Self { plugins }
    }

    pub fn plugins(&self) -> &Arc<PluginRegistry> {
        &self.plugins
    }

    /// Resolves `template` to a string.
    ///
    /// Fails with [`VariableResolutionError`] when a non-optional reference is undefined,
    /// malformed, or backed by a failing plugin. Undefined optional references render as
    /// empty text.
    pub async fn resolve(&self, template: &str, context: &VariableContext) -> Result<String, VariableResolutionError> {
        Ok(self.render(template, context).await?.text)
    }

    /// Like [`resolve`](Self::resolve) but also reports optional-reference statistics.
    pub async fn render(&self, template: &str, context: &VariableContext) -> Result<Rendered, VariableResolutionError> {
        if !contains_placeholder(template) {
            return Ok(Rendered::literal(template));
        }
        let parsed = Template::parse(template)?;
        self.render_template(&parsed, context, 0).await
    }

    /// Resolves every string leaf of a nested JSON structure. Keys and non-string
    /// scalars are left untouched.
    pub fn resolve_value<'a>(&'a self, value: &'a Value, context: &'a VariableContext) -> BoxFuture<'a, Result<Value, VariableResolutionError>> {
        async move {
            match value {
                Value::String(text) => Ok(Value::String(self.resolve(text, context).await?)),
                Value::Array(items) => {
                    let mut resolved = Vec::with_capacity(items.len());
                    for item in items {
                        resolved.push(self.resolve_value(item, context).await?);
                    }
                    Ok(Value::Array(resolved))
                }
                Value::Object(map) => {
                    let mut resolved = serde_json::Map::with_capacity(map.len());
                    for (key, item) in map {
                        resolved.insert(key.clone(), self.resolve_value(item, context).await?);
                    }
                    Ok(Value::Object(resolved))
                }
                other => Ok(other.clone()),
            }
        }
        .boxed()
    }

    fn render_template<'a>(
        &'a self,
        template: &'a Template,
        context: &'a VariableContext,
        depth: usize,
    ) -> BoxFuture<'a, Result<Rendered, VariableResolutionError>> {
        async move {
            let mut rendered = Rendered::default();
            for segment in template.segments() {
                let reference = match segment {
                    Segment::Literal(text) => {
                        rendered.text.push_str(text);
                        continue;
                    }
                    Segment::Placeholder(reference) => reference,
                };

                if reference.optional {
                    rendered.optional_references += 1;
                }
                match self.lookup_reference(reference, context, depth).await? {
                    Some(value) => rendered.text.push_str(&value),
                    None if reference.optional => {
                        trace!(reference = %reference.raw, "optional reference undefined");
                        rendered.undefined_optional += 1;
                    }
                    None => {
                        return Err(VariableResolutionError::Unresolved {
                            name: reference.raw.clone(),
                        });
                    }
                }
            }
            Ok(rendered)
        }
        .boxed()
    }

    fn lookup_reference<'a>(
        &'a self,
        reference: &'a Reference,
        context: &'a VariableContext,
        depth: usize,
    ) -> BoxFuture<'a, Result<Option<String>, VariableResolutionError>> {
        async move {
            match &reference.kind {
                ReferenceKind::Variable(name) => self.expand(reference, context.lookup(name), context, depth).await,
                ReferenceKind::Scoped {
                    scope: Scope::Secret,
                    name,
                } => self.resolve_secret(reference, name).await,
                ReferenceKind::Scoped { scope, name } => {
                    self.expand(reference, context.lookup_scoped(*scope, name), context, depth)
                        .await
                }
                ReferenceKind::PluginVariable { plugin, member } => self.call_variable_source(reference, plugin, member).await,
                ReferenceKind::PluginCall {
                    plugin,
                    function,
                    arguments,
                } => {
                    let mut resolved_arguments = Vec::with_capacity(arguments.len());
                    for argument in arguments {
                        resolved_arguments.push(self.render_template(argument, context, depth + 1).await?.text);
                    }
                    self.call_function(reference, plugin, function, &resolved_arguments)
                        .await
                }
                ReferenceKind::Step { step_id, path } => Ok(context.step_value(step_id, path).and_then(render_scalar)),
            }
        }
        .boxed()
    }

    /// Resolves placeholders embedded in a context value.
    ///
    /// Under an optional reference, a nested reference that is undefined makes the whole
    /// value undefined instead of failing.
    async fn expand(
        &self,
        reference: &Reference,
        value: Option<String>,
        context: &VariableContext,
        depth: usize,
    ) -> Result<Option<String>, VariableResolutionError> {
        let Some(text) = value else {
            return Ok(None);
        };
        if !contains_placeholder(&text) {
            return Ok(Some(text));
        }
        if depth + 1 >= MAX_RESOLUTION_DEPTH {
            return Err(VariableResolutionError::DepthExceeded {
                reference: reference.raw.clone(),
                limit: MAX_RESOLUTION_DEPTH,
            });
        }
        let nested = Template::parse(&text)?;
        match self.render_template(&nested, context, depth + 1).await {
            Ok(rendered) => Ok(Some(rendered.text)),
            Err(
                error @ (VariableResolutionError::Unresolved { .. }
                | VariableResolutionError::UnknownPlugin { .. }
                | VariableResolutionError::UnknownPluginMember { .. }),
            ) if reference.optional => {
                trace!(reference = %reference.raw, nested = %error.variable_name(), "optional reference has undefined nested value");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    async fn resolve_secret(&self, reference: &Reference, name: &str) -> Result<Option<String>, VariableResolutionError> {
        for (plugin, resolver) in self.plugins.secret_resolvers() {
            let value = resolver
                .resolve(name)
                .await
                .map_err(|error| VariableResolutionError::SecretFailed {
                    reference: reference.raw.clone(),
                    message: format!("{error:#}"),
                })?;
            if value.is_some() {
                debug!(secret = %name, plugin = %plugin, "resolved secret -> [REDACTED]");
                return Ok(value);
            }
        }
        Ok(None)
    }

    async fn call_variable_source(
        &self,
        reference: &Reference,
        plugin: &str,
        member: &str,
    ) -> Result<Option<String>, VariableResolutionError> {
        let Some(source) = self.plugins.variable_source(plugin, member) else {
            return self.missing_plugin_member(reference, plugin, member);
        };
        let value = source
            .resolve()
            .await
            .map_err(|error| VariableResolutionError::PluginFailed {
                reference: reference.raw.clone(),
                message: format!("{error:#}"),
            })?;
        debug!(plugin = %plugin, member = %member, "resolved plugin variable");
        Ok(render_scalar(&value))
    }

    async fn call_function(
        &self,
        reference: &Reference,
        plugin: &str,
        function: &str,
        arguments: &[String],
    ) -> Result<Option<String>, VariableResolutionError> {
        let Some(source) = self.plugins.function(plugin, function) else {
            return self.missing_plugin_member(reference, plugin, function);
        };
        let value = source
            .call(arguments)
            .await
            .map_err(|error| VariableResolutionError::PluginFailed {
                reference: reference.raw.clone(),
                message: format!("{error:#}"),
            })?;
        debug!(plugin = %plugin, function = %function, argument_count = arguments.len(), "called plugin function");
        Ok(render_scalar(&value))
    }

    /// Unregistered plugins and members are undefined for optional references and an
    /// error otherwise.
    fn missing_plugin_member(&self, reference: &Reference, plugin: &str, member: &str) -> Result<Option<String>, VariableResolutionError> {
        if reference.optional {
            return Ok(None);
        }
        if !self.plugins.contains_plugin(plugin) {
            return Err(VariableResolutionError::UnknownPlugin {
                reference: reference.raw.clone(),
                plugin: plugin.to_string(),
            });
        }
        Err(VariableResolutionError::UnknownPluginMember {
            reference: reference.raw.clone(),
            plugin: plugin.to_string(),
            member: member.to_string(),
        })
    }
}
