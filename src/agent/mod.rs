//! Research agent: a tools-in-a-loop executor over an LLM.
//!
//! The agent keeps calling the model, runs whatever tools it asks for, and
//! feeds the results back until the model answers without tool calls.

mod agent_loop;
mod prompt;
mod render;
mod sanitize;

pub use agent_loop::{Agent, AgentFailure, AgentRun};
pub use prompt::{build_system_prompt, render_task, TASK_TEMPLATE};
pub use render::render_report_html;
pub use sanitize::{sanitize_report, Sanitized};
