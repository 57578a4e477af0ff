//! The `core` plugin: small helpers available in every configuration.
//!
//! - `{{plugins.core.timestamp}}` - Unix seconds
//! - `{{plugins.core.isoTimestamp}}` - RFC 3339 UTC timestamp
//! - `{{plugins.core.now("%Y-%m-%d")}}` - current UTC time with a `strftime` format
//! - `{{plugins.core.upper(text)}}`, `{{plugins.core.lower(text)}}`
//! - `{{plugins.core.concat(a, b, ...)}}`
//! - `{{plugins.core.default(value, fallback)}}` - `fallback` when `value` is empty

use anyhow::{Result, bail};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use super::{Plugin, PluginRegistrar, function_fn, variable_fn};

#[derive(Debug, Clone, Copy, Default)]
pub struct CorePlugin;

impl Plugin for CorePlugin {
    fn name(&self) -> &str {
        "core"
    }

    fn setup(&self, registrar: &mut PluginRegistrar<'_>) -> Result<()> {
        registrar.register_variable_source("timestamp", variable_fn(|| Ok(Value::from(Utc::now().timestamp()))));
        registrar.register_variable_source(
            "isoTimestamp",
            variable_fn(|| Ok(Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)))),
        );
        registrar.register_parameterized_variable_source("now", function_fn(now));
        registrar.register_parameterized_variable_source(
            "upper",
            function_fn(|arguments: &[String]| Ok(Value::String(single_argument("upper", arguments)?.to_uppercase()))),
        );
        registrar.register_parameterized_variable_source(
            "lower",
            function_fn(|arguments: &[String]| Ok(Value::String(single_argument("lower", arguments)?.to_lowercase()))),
        );
        registrar.register_parameterized_variable_source(
            "concat",
            function_fn(|arguments: &[String]| Ok(Value::String(arguments.concat()))),
        );
        registrar.register_parameterized_variable_source("default", function_fn(default_value));
        Ok(())
    }
}

fn single_argument<'a>(function: &str, arguments: &'a [String]) -> Result<&'a str> {
    match arguments {
        [argument] => Ok(argument.as_str()),
        _ => bail!("{function}() expects exactly one argument, got {}", arguments.len()),
    }
}

fn now(arguments: &[String]) -> Result<Value> {
    use std::fmt::Write;

    let format = single_argument("now", arguments)?;
    let mut rendered = String::new();
    write!(rendered, "{}", Utc::now().format(format)).map_err(|_| anyhow::anyhow!("invalid time format '{format}'"))?;
    Ok(Value::String(rendered))
}

fn default_value(arguments: &[String]) -> Result<Value> {
    match arguments {
        [value, fallback] if value.trim().is_empty() => Ok(Value::String(fallback.clone())),
        [value, _] => Ok(Value::String(value.clone())),
        _ => bail!("default() expects two arguments, got {}", arguments.len()),
    }
}
