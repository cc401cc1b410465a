//! API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ModelSpec, Provider};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_sessions: usize,
    pub max_iterations: usize,
}

/// An entry of `GET /api/models`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub label: &'static str,
    pub provider: Provider,
    /// Upper-cased provider name, as used in prompts to the user
    pub provider_name: String,
    pub id: &'static str,
    pub key_name: &'static str,
    /// True for the default selection
    pub default: bool,
}

impl ModelInfo {
    pub fn new(spec: &ModelSpec, default: bool) -> Self {
        Self {
            label: spec.label,
            provider: spec.provider,
            provider_name: spec.provider.display_name(),
            id: spec.id,
            key_name: spec.key_name,
            default,
        }
    }
}

/// Response for `POST /api/session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
}

/// Body of `PUT /api/session/:id/credentials`.
///
/// An absent field leaves that key untouched; an empty string clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCredentialsRequest {
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub xai_api_key: Option<String>,
    #[serde(default)]
    pub brave_api_key: Option<String>,
}

impl UpdateCredentialsRequest {
    /// The updates present in this request.
    pub fn updates(&self) -> Vec<(Provider, &str)> {
        [
            (Provider::Gemini, &self.gemini_api_key),
            (Provider::OpenAi, &self.openai_api_key),
            (Provider::Xai, &self.xai_api_key),
            (Provider::Brave, &self.brave_api_key),
        ]
        .into_iter()
        .filter_map(|(provider, value)| value.as_deref().map(|v| (provider, v)))
        .collect()
    }
}

/// Providers that currently have a key. Secrets are never echoed.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialsResponse {
    pub configured: Vec<Provider>,
}

/// Body of `POST /api/session/:id/query`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    /// Model label; the default model when omitted
    #[serde(default)]
    pub model: Option<String>,
    pub query: String,
}

/// A finished research report.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    /// Sanitized markdown
    pub report: String,
    /// `report` rendered as HTML
    pub report_html: String,
    /// True if sanitization changed the output
    pub sanitized: bool,
    pub model: String,
    pub iterations: usize,
    pub log: Vec<TaskLogEntry>,
}

/// Error body for query requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryFailure {
    pub error: String,
    /// Raw agent output captured before the error, if any
    pub raw_output: Option<String>,
}

/// A single entry in the task execution log.
#[derive(Debug, Clone, Serialize)]
pub struct TaskLogEntry {
    /// Timestamp (RFC 3339)
    pub timestamp: String,

    /// Entry type
    pub entry_type: LogEntryType,

    /// Content of the entry
    pub content: String,
}

/// Types of log entries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryType {
    /// Text the model sent along with tool calls
    Thinking,
    /// Tool is being called
    ToolCall,
    /// Tool returned a result
    ToolResult,
    /// Agent produced final response
    Response,
    /// An error occurred
    Error,
}
