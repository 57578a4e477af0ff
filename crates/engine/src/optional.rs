//! Inclusion policy for header and parameter entries that use optional references.
//!
//! An entry whose template contains `{{name?}}` placeholders is kept when at least one of
//! those optional references is defined, or when its rendered text is non-empty after
//! trimming. Entries without optional references are always kept. A JSON `null` entry is
//! treated as absent.

use indexmap::IndexMap;
use relay_types::ScalarMap;
use tracing::trace;

use crate::{
    context::{VariableContext, render_scalar},
    error::VariableResolutionError,
    resolve::{Rendered, TemplateResolver},
};

/// Decides whether a rendered entry survives.
pub fn should_include(rendered: &Rendered) -> bool {
    rendered.optional_references == 0 || rendered.defined_optional() > 0 || !rendered.text.trim().is_empty()
}

/// Resolves every entry of `entries`, dropping those the optional policy excludes.
///
/// Order of the surviving entries follows `entries`. Required references that are
/// undefined still fail the whole map.
pub async fn resolve_entries_with_optional(
    resolver: &TemplateResolver,
    entries: &ScalarMap,
    context: &VariableContext,
) -> Result<IndexMap<String, String>, VariableResolutionError> {
    let mut resolved = IndexMap::with_capacity(entries.len());
    for (key, value) in entries {
        let Some(template) = render_scalar(value) else {
            trace!(entry = %key, "skipping null entry");
            continue;
        };
        let rendered = resolver.render(&template, context).await?;
        if should_include(&rendered) {
            resolved.insert(key.clone(), rendered.text);
        } else {
            trace!(entry = %key, "dropping entry with only undefined optional references");
        }
    }
    Ok(resolved)
}

/// Resolves every entry of `entries` without the optional policy.
pub async fn resolve_entries(
    resolver: &TemplateResolver,
    entries: &ScalarMap,
    context: &VariableContext,
) -> Result<IndexMap<String, String>, VariableResolutionError> {
    let mut resolved = IndexMap::with_capacity(entries.len());
    for (key, value) in entries {
        if let Some(template) = render_scalar(value) {
            resolved.insert(key.clone(), resolver.resolve(&template, context).await?);
        }
    }
    Ok(resolved)
}
