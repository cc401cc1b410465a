//! Brave Search keyword search.
//!
//! The listing format produced here is the contract with the model:
//!
//! ```text
//! Result 1:
//! Title: ...
//! URL: ...
//! Description: ...
//! ---
//! ```
//!
//! Blocks are joined with a newline and numbered from 1 in provider order.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use super::{required_str, Tool, ToolError};
use crate::config::ToolSettings;
use crate::session::Secret;

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub description: String,
}

/// Format results as the numbered listing handed to the model.
pub fn format_listing(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "Result {}:\nTitle: {}\nURL: {}\nDescription: {}\n---",
                i + 1,
                r.title,
                r.url,
                escape_description(&r.description)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A continuation line that would read as (or was escaped from) a block end.
fn is_separator_like(line: &str) -> bool {
    line.trim_start_matches(' ') == "---"
}

/// Indent continuation lines that look like `---` by one space.
fn escape_description(description: &str) -> String {
    description
        .split('\n')
        .enumerate()
        .map(|(i, line)| {
            if i > 0 && is_separator_like(line) {
                format!(" {}", line)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Recover the ordered results from a listing produced by [`format_listing`].
///
/// Descriptions may span several lines; a block ends at a line that is
/// exactly `---`. Lines split on `\n` only, so `\r` survives. Titles and URLs
/// are single-line.
pub fn parse_listing(text: &str) -> Vec<SearchResult> {
    let mut results = Vec::new();
    let mut current: Option<SearchResult> = None;
    let mut in_description = false;

    for line in text.split('\n') {
        if line == "---" {
            if let Some(result) = current.take() {
                results.push(result);
            }
            in_description = false;
            continue;
        }

        if current.is_none() {
            if line.starts_with("Result ") && line.ends_with(':') {
                current = Some(SearchResult {
                    title: String::new(),
                    url: String::new(),
                    description: String::new(),
                });
            }
            continue;
        }
        let Some(result) = current.as_mut() else {
            continue;
        };

        if in_description {
            result.description.push('\n');
            match line.strip_prefix(' ') {
                Some(unescaped) if is_separator_like(line) => {
                    result.description.push_str(unescaped)
                }
                _ => result.description.push_str(line),
            }
        } else if let Some(title) = line.strip_prefix("Title: ") {
            result.title = title.to_string();
        } else if let Some(url) = line.strip_prefix("URL: ") {
            result.url = url.to_string();
        } else if let Some(description) = line.strip_prefix("Description: ") {
            result.description = description.to_string();
            in_description = true;
        }
    }

    results
}

/// Pull results out of a Brave `web/search` response.
///
/// A missing `web` section or `results` list means no hits. Anything present
/// but of the wrong type is a shape error.
fn extract_results(data: &Value, cap: usize) -> Result<Vec<SearchResult>, String> {
    let root = data
        .as_object()
        .ok_or_else(|| "response is not a JSON object".to_string())?;

    let web = match root.get("web") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(web)) => web,
        Some(_) => return Err("'web' is not an object".to_string()),
    };

    let items = match web.get("results") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err("'web.results' is not a list".to_string()),
    };

    items
        .iter()
        .take(cap)
        .enumerate()
        .map(|(i, item)| {
            let item = item
                .as_object()
                .ok_or_else(|| format!("'web.results[{}]' is not an object", i))?;
            let field = |key: &str, fallback: &str| {
                item.get(key)
                    .and_then(Value::as_str)
                    .unwrap_or(fallback)
                    .to_string()
            };
            Ok(SearchResult {
                title: field("title", "No Title"),
                url: field("url", "No URL"),
                description: field("description", "No Description"),
            })
        })
        .collect()
}

/// Keyword search through the Brave Search API.
pub struct BraveSearch {
    endpoint: String,
    api_key: Option<Secret>,
    timeout: Duration,
    count: usize,
}

impl BraveSearch {
    pub fn new(settings: &ToolSettings, api_key: Option<Secret>) -> Self {
        Self {
            endpoint: settings.brave_search_url.clone(),
            api_key,
            timeout: settings.search_timeout,
            count: settings.search_result_count,
        }
    }

    /// Run one search and return the formatted listing.
    pub async fn search(&self, query: &str) -> Result<String, ToolError> {
        let Some(api_key) = self.api_key.as_ref().filter(|k| !k.expose().is_empty()) else {
            return Err(ToolError::MissingCredential(
                "Brave Search API Key not found in session. Please configure it in the sidebar."
                    .to_string(),
            ));
        };

        tracing::info!("[brave_search] Searching Brave for: {}", query);

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ToolError::Unexpected {
                kind: "ClientBuild".to_string(),
                message: format!(
                    "An unexpected error occurred in brave_search for query: {}. Details: {}",
                    query, e
                ),
            })?;

        // Accept-Encoding: gzip is added (and decoded) by reqwest's gzip feature.
        let count = self.count.to_string();
        let response = client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key.expose())
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await
            .map_err(|e| request_error(query, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| request_error(query, e))?;

        if !status.is_success() {
            tracing::error!(
                "[brave_search] HTTP error occurred: {} - Response: {}",
                status,
                body
            );
            return Err(ToolError::Protocol {
                status: status.as_u16(),
                body,
                message: format!(
                    "Brave Search API returned HTTP error {} for query: {}",
                    status.as_u16(),
                    query
                ),
            });
        }

        let data: Value = serde_json::from_str(&body).map_err(|e| {
            tracing::error!("[brave_search] Failed to decode JSON response: {}", e);
            ToolError::Parse(format!(
                "Could not parse Brave Search API response for query: {}",
                query
            ))
        })?;

        let results = extract_results(&data, self.count).map_err(|detail| {
            tracing::error!("[brave_search] Unexpected response format: {}", detail);
            ToolError::Shape(format!(
                "Unexpected response format from Brave Search API for query: {}",
                query
            ))
        })?;

        if results.is_empty() {
            return Ok(format!(
                "No results found from Brave Search for query: {}",
                query
            ));
        }

        tracing::info!(
            "[brave_search] Found {} results for: {}",
            results.len(),
            query
        );
        Ok(format_listing(&results))
    }
}

fn request_error(query: &str, e: reqwest::Error) -> ToolError {
    if e.is_timeout() {
        tracing::error!("[brave_search] Request timed out for query: {}", query);
        ToolError::Timeout(format!(
            "Brave Search API request timed out for query: {}",
            query
        ))
    } else {
        tracing::error!("[brave_search] Request exception occurred: {}", e);
        ToolError::Transport(format!(
            "Failed to connect to Brave Search API for query: {}. Details: {}",
            query, e
        ))
    }
}

#[async_trait]
impl Tool for BraveSearch {
    fn name(&self) -> &str {
        "brave_search"
    }

    fn description(&self) -> &str {
        "Search the web with the Brave Search API. Returns the top results as a numbered list with title, URL and description, or a message starting with 'Error:' if the search fails or the Brave API key is missing."
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
