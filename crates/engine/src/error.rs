//! Error types for template resolution and step execution.

use thiserror::Error;

/// Failure to parse a template string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("empty template reference")]
    EmptyReference,

    #[error("malformed reference '{reference}': {reason}")]
    MalformedReference { reference: String, reason: String },
}

impl TemplateError {
    pub(crate) fn malformed(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedReference {
            reference: reference.into(),
            reason: reason.into(),
        }
    }
}

/// Failure to resolve a template against a variable context.
///
/// Every variant carries the reference that caused it; see [`VariableResolutionError::variable_name`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VariableResolutionError {
    #[error("variable '{name}' is not defined in any scope")]
    Unresolved { name: String },

    #[error("malformed template reference '{reference}': {reason}")]
    Malformed { reference: String, reason: String },

    #[error("plugin '{plugin}' is not registered (referenced by '{reference}')")]
    UnknownPlugin { reference: String, plugin: String },

    #[error("plugin '{plugin}' has no member '{member}' (referenced by '{reference}')")]
    UnknownPluginMember { reference: String, plugin: String, member: String },

    #[error("plugin reference '{reference}' failed: {message}")]
    PluginFailed { reference: String, message: String },

    #[error("secret '{reference}' could not be read: {message}")]
    SecretFailed { reference: String, message: String },

    #[error("template nesting exceeded {limit} levels while resolving '{reference}'")]
    DepthExceeded { reference: String, limit: usize },
}

impl VariableResolutionError {
    /// Reference text (without delimiters) that failed to resolve.
    pub fn variable_name(&self) -> &str {
        match self {
            Self::Unresolved { name } => name,
            Self::Malformed { reference, .. }
            | Self::UnknownPlugin { reference, .. }
            | Self::UnknownPluginMember { reference, .. }
            | Self::PluginFailed { reference, .. }
            | Self::SecretFailed { reference, .. }
            | Self::DepthExceeded { reference, .. } => reference,
        }
    }
}

impl From<TemplateError> for VariableResolutionError {
    fn from(error: TemplateError) -> Self {
        match error {
            TemplateError::EmptyReference => Self::Malformed {
                reference: String::new(),
                reason: "empty template reference".to_string(),
            },
            TemplateError::MalformedReference { reference, reason } => Self::Malformed { reference, reason },
        }
    }
}

/// Failure while preparing or dispatching a single step.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("invalid call '{call}': expected '<api>.<endpoint>'")]
    InvalidCall { call: String },

    #[error("duplicate step id '{step_id}'")]
    DuplicateStepId { step_id: String },

    #[error("unknown API '{api}'")]
    UnknownApi { api: String },

    #[error("unknown endpoint '{endpoint}' in API '{api}'")]
    UnknownEndpoint { api: String, endpoint: String },

    #[error("Variable resolution failed: {0}")]
    Resolution(#[from] VariableResolutionError),

    #[error("{hook} hook '{plugin}' failed: {message}")]
    Hook {
        hook: &'static str,
        plugin: String,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_name_is_exposed_for_every_variant() {
        let unresolved = VariableResolutionError::Unresolved { name: "itemId".into() };
        assert_eq!(unresolved.variable_name(), "itemId");

        let failed = VariableResolutionError::PluginFailed {
            reference: "plugins.auth.token".into(),
            message: "expired".into(),
        };
        assert_eq!(failed.variable_name(), "plugins.auth.token");
    }

    #[test]
    fn step_resolution_errors_carry_prefix() {
        let error = StepError::from(VariableResolutionError::Unresolved { name: "token".into() });
        assert_eq!(error.to_string(), "Variable resolution failed: variable 'token' is not defined in any scope");
    }
}
