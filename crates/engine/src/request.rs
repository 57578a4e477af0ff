//! Request assembly: turns an API and endpoint definition plus optional step overrides
//! into a concrete [`HttpRequest`].
//!
//! Assembly order:
//!
//! 1. `pathParams` overrides are resolved once and substituted literally into the base
//!    URL and path, so neither a path placeholder satisfied by `pathParams` nor the value
//!    put in its place ever reaches the general resolver.
//! 2. Base URL and path are resolved and joined with [`build_url`].
//! 3. API and endpoint headers and params are merged (endpoint wins), resolved, and
//!    filtered through the optional-value policy; step overrides are resolved the same
//!    way and applied on top.
//! 4. Params are appended to the URL as a form-encoded query string.
//! 5. The body (step override, else endpoint body) is resolved leaf by leaf.

use indexmap::IndexMap;
use regex::{NoExpand, Regex};
use relay_types::{ApiDefinition, EndpointDefinition, HttpRequest, ScalarMap, StepOverrides};
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::{
    context::VariableContext,
    error::VariableResolutionError,
    optional::{resolve_entries, resolve_entries_with_optional},
    resolve::TemplateResolver,
};

/// Joins a resolved base URL and path: trailing slashes are stripped from the base and
/// a leading slash is enforced on a non-empty path.
pub fn build_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Raw merge of API and endpoint headers. Endpoint entries replace API entries by key.
pub fn merge_headers(api: &ApiDefinition, endpoint: &EndpointDefinition) -> ScalarMap {
    merge_maps(&api.headers, &endpoint.headers)
}

/// Raw merge of API and endpoint params. Endpoint entries replace API entries by key.
pub fn merge_params(api: &ApiDefinition, endpoint: &EndpointDefinition) -> ScalarMap {
    merge_maps(&api.params, &endpoint.params)
}

fn merge_maps(base: &ScalarMap, overrides: &ScalarMap) -> ScalarMap {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Merged headers resolved against `context`, with the optional-value policy applied once
/// per key after the merge.
pub async fn merge_headers_with_optional(
    api: &ApiDefinition,
    endpoint: &EndpointDefinition,
    resolver: &TemplateResolver,
    context: &VariableContext,
) -> Result<IndexMap<String, String>, VariableResolutionError> {
    resolve_entries_with_optional(resolver, &merge_headers(api, endpoint), context).await
}

/// Merged params resolved against `context`, with the optional-value policy applied once
/// per key after the merge.
pub async fn merge_params_with_optional(
    api: &ApiDefinition,
    endpoint: &EndpointDefinition,
    resolver: &TemplateResolver,
    context: &VariableContext,
) -> Result<IndexMap<String, String>, VariableResolutionError> {
    resolve_entries_with_optional(resolver, &merge_params(api, endpoint), context).await
}

/// Replaces every `{{name}}` (whitespace inside the braces allowed) with the matching
/// value from `path_params`. Replacement text is inserted literally.
pub fn apply_path_params(template: &str, path_params: &IndexMap<String, String>) -> String {
    let mut output = template.to_string();
    for (name, value) in path_params {
        let pattern = format!(r"\{{\{{\s*{}\s*\}}\}}", regex::escape(name));
        match Regex::new(&pattern) {
            Ok(regex) => output = regex.replace_all(&output, NoExpand(value)).into_owned(),
            Err(error) => warn!(param = %name, error = %error, "skipping path param with unusable name"),
        }
    }
    output
}

/// Appends `params` to `url` as a form-encoded query string.
pub fn append_query(url: &str, params: &IndexMap<String, String>) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    let query = serializer.finish();

    let separator = match url.rfind('?') {
        None => "?",
        Some(_) if url.ends_with('?') || url.ends_with('&') => "",
        Some(_) => "&",
    };
    format!("{url}{separator}{query}")
}

/// Resolves a URL template whose `{{name}}` placeholders may be satisfied by `path_params`.
///
/// Those placeholders are masked with brace-free tokens while the rest of the template
/// is resolved, then the values are swapped in literally, so a path param value is
/// never resolved a second time.
async fn resolve_with_path_params(
    resolver: &TemplateResolver,
    template: &str,
    path_params: &IndexMap<String, String>,
    context: &VariableContext,
) -> Result<String, VariableResolutionError> {
    if path_params.is_empty() {
        return resolver.resolve(template, context).await;
    }
    let tokens: IndexMap<String, String> = path_params
        .keys()
        .enumerate()
        .map(|(index, name)| (name.clone(), format!("\u{1}path-param-{index}\u{1}")))
        .collect();
    let mut resolved = resolver.resolve(&apply_path_params(template, &tokens), context).await?;
    for (name, token) in &tokens {
        if let Some(value) = path_params.get(name) {
            resolved = resolved.replace(token.as_str(), value);
        }
    }
    Ok(resolved)
}

/// Builds concrete requests from definitions.
#[derive(Debug, Clone, Default)]
pub struct RequestAssembler {
    resolver: TemplateResolver,
}

impl RequestAssembler {
    pub fn new(resolver: TemplateResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &TemplateResolver {
        &self.resolver
    }

    /// Assembles the request for `endpoint` of `api`.
    ///
    /// `context` should already be scoped to this API and endpoint
    /// (see [`VariableContext::scoped_to`]).
    pub async fn assemble(
        &self,
        api: &ApiDefinition,
        endpoint: &EndpointDefinition,
        overrides: Option<&StepOverrides>,
        context: &VariableContext,
    ) -> Result<HttpRequest, VariableResolutionError> {
        let resolver = &self.resolver;

        let path_params = match overrides {
            Some(overrides) if !overrides.path_params.is_empty() => resolve_entries(resolver, &overrides.path_params, context).await?,
            _ => IndexMap::new(),
        };
        let base_url = resolve_with_path_params(resolver, &api.base_url, &path_params, context).await?;
        let path = resolve_with_path_params(resolver, &endpoint.path, &path_params, context).await?;
        let url = build_url(&base_url, &path);

        let mut headers = merge_headers_with_optional(api, endpoint, resolver, context).await?;
        let mut params = merge_params_with_optional(api, endpoint, resolver, context).await?;
        if let Some(overrides) = overrides {
            headers.extend(resolve_entries_with_optional(resolver, &overrides.headers, context).await?);
            params.extend(resolve_entries_with_optional(resolver, &overrides.params, context).await?);
        }

        let body_template = overrides
            .and_then(|overrides| overrides.body.as_ref())
            .or(endpoint.body.as_ref());
        let body = match body_template {
            Some(template) => Some(resolver.resolve_value(template, context).await?),
            None => None,
        };

        let request = HttpRequest {
            method: endpoint.method.trim().to_ascii_uppercase(),
            url: append_query(&url, &params),
            headers,
            body,
        };
        debug!(
            method = %request.method,
            url = %request.url,
            header_count = request.headers.len(),
            has_body = request.body.is_some(),
            "assembled request"
        );
        Ok(request)
    }
}
