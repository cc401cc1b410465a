//! Configuration management for the research assistant.
//!
//! Configuration can be set via environment variables:
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `8501`.
//! - `MAX_ITERATIONS` - Optional. Maximum agent loop iterations. Defaults to `30`.
//! - `MAX_TOOL_OUTPUT_CHARS` - Optional. Tool output is clipped to this many chars before it
//!   is fed back to the model. Defaults to `100000`.
//! - `SESSION_TTL_SECS` - Optional. Idle sessions (and their credentials) are dropped after
//!   this many seconds. Defaults to `3600`.
//! - `LLM_TIMEOUT_SECS` - Optional. Timeout for one chat-completion request. Defaults to `300`.
//! - `FETCH_TIMEOUT_SECS` - Optional. Page fetch timeout. Defaults to `30`.
//! - `SEARCH_TIMEOUT_SECS` - Optional. Search request timeout. Defaults to `10`.
//! - `BRAVE_SEARCH_URL` - Optional. Brave Search web endpoint.
//! - `DUCKDUCKGO_URL` - Optional. DuckDuckGo HTML endpoint.
//! - `CHROME_PATH` - Optional. Chrome/Chromium executable used by the page fetcher.
//! - `GEMINI_BASE_URL`, `OPENAI_BASE_URL`, `XAI_BASE_URL` - Optional. OpenAI-compatible
//!   API roots for each LLM provider.
//!
//! API keys are never read from the environment; they are entered per session in the web form.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::Provider;

pub const DEFAULT_BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";
pub const DEFAULT_DUCKDUCKGO_URL: &str = "https://html.duckduckgo.com/html/";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_XAI_BASE_URL: &str = "https://api.x.ai/v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Settings shared by the agent's tools.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Brave Search web endpoint
    pub brave_search_url: String,

    /// DuckDuckGo HTML search endpoint
    pub duckduckgo_url: String,

    /// Timeout for a single search request
    pub search_timeout: Duration,

    /// Timeout for loading one page in the headless browser
    pub fetch_timeout: Duration,

    /// Maximum number of results requested from a search provider
    pub search_result_count: usize,

    /// Explicit browser executable (auto-detected when unset)
    pub chrome_path: Option<PathBuf>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            brave_search_url: DEFAULT_BRAVE_SEARCH_URL.to_string(),
            duckduckgo_url: DEFAULT_DUCKDUCKGO_URL.to_string(),
            search_timeout: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(30),
            search_result_count: 5,
            chrome_path: None,
        }
    }
}

/// OpenAI-compatible API roots for each LLM provider.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub gemini: String,
    pub openai: String,
    pub xai: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            gemini: DEFAULT_GEMINI_BASE_URL.to_string(),
            openai: DEFAULT_OPENAI_BASE_URL.to_string(),
            xai: DEFAULT_XAI_BASE_URL.to_string(),
        }
    }
}

impl ProviderEndpoints {
    /// API root for an LLM provider. Brave is a search provider and has none.
    pub fn base_url(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Gemini => Some(&self.gemini),
            Provider::OpenAi => Some(&self.openai),
            Provider::Xai => Some(&self.xai),
            Provider::Brave => None,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Maximum iterations for the agent loop
    pub max_iterations: usize,

    /// Tool output beyond this many chars is clipped before reaching the model
    pub max_tool_output_chars: usize,

    /// Idle lifetime of a session
    pub session_ttl: Duration,

    /// Upper bound on one chat-completion request
    pub llm_timeout: Duration,

    /// Tool settings
    pub tools: ToolSettings,

    /// LLM provider endpoints
    pub endpoints: ProviderEndpoints,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = parse_env("PORT", 8501u16)?;
        let max_iterations = parse_env("MAX_ITERATIONS", 30usize)?;
        let max_tool_output_chars = parse_env("MAX_TOOL_OUTPUT_CHARS", 100_000usize)?;
        let session_ttl = Duration::from_secs(parse_env("SESSION_TTL_SECS", 3600u64)?);
        let llm_timeout = Duration::from_secs(parse_env("LLM_TIMEOUT_SECS", 300u64)?);

        if max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_ITERATIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let tools = ToolSettings {
            brave_search_url: std::env::var("BRAVE_SEARCH_URL")
                .unwrap_or_else(|_| DEFAULT_BRAVE_SEARCH_URL.to_string()),
            duckduckgo_url: std::env::var("DUCKDUCKGO_URL")
                .unwrap_or_else(|_| DEFAULT_DUCKDUCKGO_URL.to_string()),
            search_timeout: Duration::from_secs(parse_env("SEARCH_TIMEOUT_SECS", 10u64)?),
            fetch_timeout: Duration::from_secs(parse_env("FETCH_TIMEOUT_SECS", 30u64)?),
            search_result_count: 5,
            chrome_path: std::env::var("CHROME_PATH").ok().map(PathBuf::from),
        };

        let endpoints = ProviderEndpoints {
            gemini: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string()),
            openai: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string()),
            xai: std::env::var("XAI_BASE_URL").unwrap_or_else(|_| DEFAULT_XAI_BASE_URL.to_string()),
        };

        Ok(Self {
            host,
            port,
            max_iterations,
            max_tool_output_chars,
            session_ttl,
            llm_timeout,
            tools,
            endpoints,
        })
    }

    /// Create a config with default values (useful for testing).
    pub fn new() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
            max_iterations: 30,
            max_tool_output_chars: 100_000,
            session_ttl: Duration::from_secs(3600),
            llm_timeout: Duration::from_secs(300),
            tools: ToolSettings::default(),
            endpoints: ProviderEndpoints::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}
