//! Concrete request and response descriptors exchanged with the HTTP collaborator.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A fully resolved request ready to send.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// JSON bodies are sent as JSON; string bodies are sent verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<JsonValue>,
}

/// Response returned by the HTTP collaborator. Error statuses are still responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub body: String,
}

impl HttpResponse {
    /// Synthetic `200 OK` used in place of network I/O for dry runs.
    pub fn dry_run() -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            headers: IndexMap::new(),
            body: String::new(),
        }
    }

    /// Returns true for statuses below 400.
    pub fn is_success(&self) -> bool {
        self.status < 400
    }

    /// Body parsed as JSON when it looks structured, otherwise the raw text.
    pub fn body_value(&self) -> JsonValue {
        let trimmed = self.body.trim_start();
        if (trimmed.starts_with('{') || trimmed.starts_with('['))
            && let Ok(parsed) = serde_json::from_str::<JsonValue>(&self.body)
        {
            return parsed;
        }
        JsonValue::String(self.body.clone())
    }
}
