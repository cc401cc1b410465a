//! Keyless web search through DuckDuckGo's HTML endpoint.
//!
//! This is the fallback when no Brave key is configured. DuckDuckGo may serve a
//! CAPTCHA instead of results; that is reported as an error rather than as an
//! empty result set.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::search::{format_listing, SearchResult};
use super::{required_str, Tool, ToolError};
use crate::config::ToolSettings;

/// Search the web without an API key.
pub struct DuckDuckGoSearch {
    endpoint: String,
    timeout: Duration,
    count: usize,
}

impl DuckDuckGoSearch {
    pub fn new(settings: &ToolSettings) -> Self {
        Self {
            endpoint: settings.duckduckgo_url.clone(),
            timeout: settings.search_timeout,
            count: settings.search_result_count,
        }
    }

    pub async fn search(&self, query: &str) -> Result<String, ToolError> {
        tracing::info!("[duckduckgo_search] Searching DuckDuckGo for: {}", query);

        let url = format!("{}?q={}", self.endpoint, urlencoding::encode(query));

        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; ResearchAssistant/0.3)")
            .timeout(self.timeout)
            .build()
            .map_err(|e| ToolError::Unexpected {
                kind: "ClientBuild".to_string(),
                message: format!("Could not create HTTP client: {}", e),
            })?;

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(query, e))?;
        let status = response.status();
        let html = response
            .text()
            .await
            .map_err(|e| request_error(query, e))?;

        if !status.is_success() {
            tracing::error!("[duckduckgo_search] HTTP error occurred: {}", status);
            return Err(ToolError::Protocol {
                status: status.as_u16(),
                body: html,
                message: format!(
                    "DuckDuckGo returned HTTP error {} for query: {}",
                    status.as_u16(),
                    query
                ),
            });
        }

        if html.contains("anomaly-modal") || html.contains("Unfortunately, bots") {
            tracing::warn!("[duckduckgo_search] Blocked by CAPTCHA for query: {}", query);
            return Err(ToolError::Protocol {
                status: status.as_u16(),
                body: String::new(),
                message: format!(
                    "DuckDuckGo blocked the request with a CAPTCHA for query: {}. Try brave_search instead.",
                    query
                ),
            });
        }

        let results = extract_ddg_results(&html, self.count);

        if results.is_empty() {
            Ok(format!("No results found for: {}", query))
        } else {
            tracing::info!(
                "[duckduckgo_search] Found {} results for: {}",
                results.len(),
                query
            );
            Ok(format_listing(&results))
        }
    }
}

fn request_error(query: &str, e: reqwest::Error) -> ToolError {
    if e.is_timeout() {
        ToolError::Timeout(format!(
            "DuckDuckGo request timed out for query: {}",
            query
        ))
    } else {
        ToolError::Transport(format!(
            "Failed to connect to DuckDuckGo for query: {}. Details: {}",
            query, e
        ))
    }
}

/// Extract search results from DuckDuckGo HTML.
fn extract_ddg_results(html: &str, limit: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    // `result__body` sits inside a multi-class attribute
    for chunk in html.split("result__body").skip(1) {
        if results.len() >= limit {
            break;
        }

        let anchor = chunk.split("class=\"result__a\"").nth(1);

        let title = anchor.and_then(inner_text).unwrap_or_default();
        if title.is_empty() {
            continue;
        }

        let href = anchor
            .and_then(|s| s.split("href=\"").nth(1))
            .and_then(|s| s.split('"').next())
            .and_then(resolve_ddg_href);

        let display_url = chunk
            .split("class=\"result__url\"")
            .nth(1)
            .and_then(|s| s.split('>').nth(1))
            .and_then(|s| s.split('<').next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.starts_with("http") {
                    s.to_string()
                } else {
                    format!("https://{}", s)
                }
            });

        let snippet = chunk
            .split("class=\"result__snippet\"")
            .nth(1)
            .and_then(inner_text)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "No Description".to_string());

        results.push(SearchResult {
            title: html_decode(&title),
            url: href
                .or(display_url)
                .unwrap_or_else(|| "No URL".to_string()),
            description: html_decode(&snippet),
        });
    }

    results
}

/// Text content of the element whose opening tag `after_class` is inside.
///
/// Inline markup such as `<b>` around matched terms is dropped.
fn inner_text(after_class: &str) -> Option<String> {
    let (_, rest) = after_class.split_once('>')?;
    let end = ["</a>", "</div>", "</td>"]
        .iter()
        .filter_map(|close| rest.find(close))
        .min()
        .unwrap_or(rest.len());

    let mut text = String::new();
    let mut in_tag = false;
    for c in rest[..end].chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    Some(text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Turn a result link into the target URL.
///
/// DuckDuckGo wraps targets in a redirect (`//duckduckgo.com/l/?uddg=<encoded>&rut=...`).
fn resolve_ddg_href(href: &str) -> Option<String> {
    let href = html_decode(href);
    if let Some(encoded) = href.split("uddg=").nth(1) {
        let encoded = encoded.split('&').next().unwrap_or(encoded);
        return urlencoding::decode(encoded).ok().map(|s| s.into_owned());
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        Some(href)
    } else {
        None
    }
}

/// Basic HTML entity decoding.
fn html_decode(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
}

#[async_trait]
impl Tool for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo_search"
    }

    fn description(&self) -> &str {
        "Search the web with DuckDuckGo (no API key needed). Returns the top results as a numbered list with title, URL and description. Use when brave_search is unavailable."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let query = required_str(&args, "query")?;
        self.search(query).await
    }
}
