//! # Research Assistant
//!
//! A web form in front of an LLM research agent.
//!
//! The user picks a model, supplies provider keys for the session, and types a
//! query. The agent searches the web, fetches pages in a headless browser, and
//! returns a markdown report, which the form shows rendered as HTML.
//!
//! ## Architecture
//!
//! ```text
//!  browser ──HTTP──▶ api (axum) ── session store (in-memory credentials)
//!                        │
//!                        ▼
//!                  agent loop ──▶ OpenAI-compatible chat completions
//!                        │        (Gemini / OpenAI / xAI)
//!                        ▼
//!                  ToolRegistry::invoke
//!                    ├── fetch_page         (headless Chromium)
//!                    ├── brave_search       (Brave Search API)
//!                    └── duckduckgo_search  (DuckDuckGo HTML)
//! ```
//!
//! ## Modules
//! - `api`: HTTP endpoints and the form
//! - `agent`: tool-calling loop, task prompt, report sanitization and rendering
//! - `tools`: the research tools
//! - `llm`: chat-completions client
//! - `models`: model registry
//! - `session`: per-session credentials

pub mod agent;
pub mod api;
pub mod config;
pub mod llm;
pub mod models;
pub mod session;
pub mod tools;

#[cfg(test)]
mod test_support;

pub use config::Config;
