//! Tool system for the agent.
//!
//! Tools are the agent's only way to touch the outside world: load a page in a
//! headless browser or run a keyword search. The agent reaches them through
//! [`ToolRegistry::invoke`], which returns a typed [`ToolError`] on failure;
//! the `Error: ...` string the model sees is rendered only at that boundary.
//!
//! Credentials and settings are injected when the registry is built for a
//! query, so tools never read ambient session state.

mod fetcher;
mod search;
mod web;

pub use fetcher::{
    BrowserLauncher, ChromiumLauncher, PageFetcher, RenderError, RenderSession,
};
pub use search::{format_listing, parse_listing, BraveSearch, SearchResult};
pub use web::DuckDuckGoSearch;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::ToolSettings;
use crate::llm::{FunctionDefinition, ToolDefinition};
use crate::models::Provider;
use crate::session::Credentials;

// ============================================================================
// Errors
// ============================================================================

/// Failure of a single tool call. Never fatal to the caller.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Malformed input, rejected before any I/O
    #[error("Invalid input. {0}")]
    InvalidInput(String),

    /// Required credential absent; no request was made
    #[error("{0}")]
    MissingCredential(String),

    /// Bounded wait exceeded
    #[error("{0}")]
    Timeout(String),

    /// Connection-level failure
    #[error("{0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("{message}")]
    Protocol {
        status: u16,
        body: String,
        message: String,
    },

    /// Response body could not be parsed
    #[error("{0}")]
    Parse(String),

    /// Well-formed response missing the expected structure
    #[error("{0}")]
    Shape(String),

    /// Anything else, with the failure's kind preserved
    #[error("{message}")]
    Unexpected { kind: String, message: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

/// Machine-readable classification of a [`ToolError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    InvalidInput,
    MissingCredential,
    Timeout,
    Transport,
    Protocol,
    Parse,
    Shape,
    Unexpected,
    UnknownTool,
}

impl ToolError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::InvalidInput(_) => ToolErrorKind::InvalidInput,
            ToolError::MissingCredential(_) => ToolErrorKind::MissingCredential,
            ToolError::Timeout(_) => ToolErrorKind::Timeout,
            ToolError::Transport(_) => ToolErrorKind::Transport,
            ToolError::Protocol { .. } => ToolErrorKind::Protocol,
            ToolError::Parse(_) => ToolErrorKind::Parse,
            ToolError::Shape(_) => ToolErrorKind::Shape,
            ToolError::Unexpected { .. } => ToolErrorKind::Unexpected,
            ToolError::UnknownTool(_) => ToolErrorKind::UnknownTool,
        }
    }

    /// Render the error the way the model sees it.
    pub fn to_tool_output(&self) -> String {
        format!("Error: {}", self)
    }
}

/// Fetch a required string argument.
pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidInput(format!("Missing '{}' argument", key)))
}

// ============================================================================
// Tool Trait and Registry
// ============================================================================

/// Information about a tool for display purposes.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Trait for implementing tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does.
    fn description(&self) -> &str;

    /// JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: Value) -> Result<String, ToolError>;
}

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry (no built-in tools).
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Build the research toolset for one query.
    ///
    /// The Brave key is copied out of the session's credentials here; tools
    /// hold it for the lifetime of this registry only.
    pub fn for_session(settings: &ToolSettings, credentials: &Credentials) -> Self {
        let mut registry = Self::empty();

        registry.register(Arc::new(PageFetcher::new(
            Arc::new(ChromiumLauncher::new(settings.chrome_path.clone())),
            settings.fetch_timeout,
        )));
        registry.register(Arc::new(BraveSearch::new(
            settings,
            credentials.get(Provider::Brave).cloned(),
        )));
        registry.register(Arc::new(DuckDuckGoSearch::new(settings)));

        tracing::debug!("Tool registry built with {} tools", registry.tools.len());
        registry
    }

    /// Add a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// List all available tools, sorted by name.
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        let mut tools: Vec<ToolInfo> = self
            .tools
            .values()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Check if a tool exists by name.
    #[cfg(test)]
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get tool schemas in LLM-compatible format, sorted by name.
    pub fn get_tool_schemas(&self) -> Vec<ToolDefinition> {
        let mut schemas: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                tool_type: "function".to_string(),
                function: FunctionDefinition {
                    name: t.name().to_string(),
                    description: t.description().to_string(),
                    parameters: t.parameters_schema(),
                },
            })
            .collect();
        schemas.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        schemas
    }

    /// Invoke a tool by name.
    pub async fn invoke(&self, name: &str, args: Value) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        tool.execute(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the text argument"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn execute(&self, args: Value) -> Result<String, ToolError> {
            Ok(required_str(&args, "text")?.to_string())
        }
    }

    #[test]
    fn test_session_registry_has_research_tools() {
        let registry = ToolRegistry::for_session(&ToolSettings::default(), &Credentials::new());
        let names: Vec<_> = registry.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["brave_search", "duckduckgo_search", "fetch_page"]);
        assert_eq!(registry.get_tool_schemas().len(), 3);
    }

    #[tokio::test]
    async fn test_invoke_dispatches_by_name() {
        let mut registry = ToolRegistry::empty();
        registry.register(Arc::new(Echo));

        assert!(registry.has_tool("echo"));
        assert_eq!(
            registry.invoke("echo", json!({"text": "hi"})).await.unwrap(),
            "hi"
        );

        let err = registry.invoke("echo", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::InvalidInput);
        assert_eq!(err.to_tool_output(), "Error: Invalid input. Missing 'text' argument");

        let err = registry.invoke("nope", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::UnknownTool);
        assert_eq!(err.to_tool_output(), "Error: Unknown tool: nope");
    }

    #[test]
    fn test_protocol_error_keeps_status_and_body() {
        let err = ToolError::Protocol {
            status: 502,
            body: "bad gateway".to_string(),
            message: "upstream said no".to_string(),
        };
        assert_eq!(err.kind(), ToolErrorKind::Protocol);
        assert_eq!(err.to_tool_output(), "Error: upstream said no");
        assert!(matches!(err, ToolError::Protocol { status: 502, ref body, .. } if body == "bad gateway"));
    }
}
