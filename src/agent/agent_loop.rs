//! Core agent loop implementation.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::api::types::{LogEntryType, TaskLogEntry};
use crate::llm::{ChatMessage, LlmClient, Role, TokenUsage, ToolCall};
use crate::tools::{ToolError, ToolRegistry};

use super::prompt::build_system_prompt;

const DEFAULT_MAX_ITERATIONS: usize = 30;
const DEFAULT_MAX_TOOL_OUTPUT_CHARS: usize = 100_000;

/// The research agent, bound to one model and one toolset.
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    model: String,
    max_iterations: usize,
    max_tool_output_chars: usize,
}

/// A completed run.
#[derive(Debug)]
pub struct AgentRun {
    /// Final assistant text, unsanitized
    pub output: String,
    pub log: Vec<TaskLogEntry>,
    /// Number of LLM calls made
    pub iterations: usize,
    pub usage: TokenUsage,
}

/// A failed run, with whatever the model said before it failed.
#[derive(Debug)]
pub struct AgentFailure {
    pub error: anyhow::Error,
    /// Last non-empty assistant text seen, if any
    pub raw_output: Option<String>,
    pub log: Vec<TaskLogEntry>,
    pub iterations: usize,
}

impl fmt::Display for AgentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

#[derive(Default)]
struct Progress {
    log: Vec<TaskLogEntry>,
    iterations: usize,
    usage: TokenUsage,
    last_text: Option<String>,
}

impl Progress {
    fn record(&mut self, entry_type: LogEntryType, content: String) {
        self.log.push(TaskLogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            entry_type,
            content,
        });
    }
}

impl Agent {
    pub fn new(llm: Arc<dyn LlmClient>, tools: ToolRegistry, model: impl Into<String>) -> Self {
        Self {
            llm,
            tools,
            model: model.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_tool_output_chars: DEFAULT_MAX_TOOL_OUTPUT_CHARS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_tool_output_chars(mut self, max_chars: usize) -> Self {
        self.max_tool_output_chars = max_chars;
        self
    }

    /// Run a task to completion.
    pub async fn run(&self, task: &str) -> Result<AgentRun, AgentFailure> {
        let mut progress = Progress::default();

        match self.drive(task, &mut progress).await {
            Ok(output) => {
                tracing::info!(
                    "Agent finished after {} iterations ({} tokens)",
                    progress.iterations,
                    progress.usage.total_tokens
                );
                Ok(AgentRun {
                    output,
                    log: progress.log,
                    iterations: progress.iterations,
                    usage: progress.usage,
                })
            }
            Err(error) => {
                tracing::error!(
                    "Agent failed after {} iterations: {}",
                    progress.iterations,
                    error
                );
                progress.record(LogEntryType::Error, error.to_string());
                Err(AgentFailure {
                    error,
                    raw_output: progress.last_text,
                    log: progress.log,
                    iterations: progress.iterations,
                })
            }
        }
    }

    async fn drive(&self, task: &str, progress: &mut Progress) -> anyhow::Result<String> {
        let system_prompt = build_system_prompt(&self.tools);
        let mut messages = vec![
            ChatMessage::new(Role::System, system_prompt),
            ChatMessage::new(Role::User, task),
        ];

        let tool_schemas = self.tools.get_tool_schemas();

        for iteration in 0..self.max_iterations {
            progress.iterations = iteration + 1;
            tracing::debug!("Agent iteration {}", iteration + 1);

            let response = self
                .llm
                .chat_completion(&self.model, &messages, Some(&tool_schemas))
                .await?;

            if let Some(usage) = &response.usage {
                progress.usage.add(usage);
            }
            let text = response
                .content
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .map(str::to_string);
            if let Some(text) = &text {
                progress.last_text = Some(text.clone());
            }

            if let Some(tool_calls) = response.tool_calls.filter(|c| !c.is_empty()) {
                if let Some(thought) = &text {
                    progress.record(LogEntryType::Thinking, truncate_for_log(thought, 1000));
                }
                messages.push(ChatMessage::assistant_tool_calls(
                    response.content.clone(),
                    tool_calls.clone(),
                ));

                for tool_call in &tool_calls {
                    progress.record(
                        LogEntryType::ToolCall,
                        format!(
                            "Calling tool: {} with args: {}",
                            tool_call.function.name, tool_call.function.arguments
                        ),
                    );

                    let result_str = match self.execute_tool_call(tool_call).await {
                        Ok(output) => output,
                        Err(e) => {
                            tracing::warn!(
                                "Tool {} failed ({:?}): {}",
                                tool_call.function.name,
                                e.kind(),
                                e
                            );
                            e.to_tool_output()
                        }
                    };
                    let result_str = clip_output(&result_str, self.max_tool_output_chars);

                    progress.record(LogEntryType::ToolResult, truncate_for_log(&result_str, 1000));
                    messages.push(ChatMessage::tool_result(tool_call.id.clone(), result_str));
                }

                continue;
            }

            // No tool calls - this is the final response
            if let Some(content) = text {
                progress.record(LogEntryType::Response, truncate_for_log(&content, 2000));
                return Ok(content);
            }

            return Err(anyhow::anyhow!("LLM returned empty response"));
        }

        Err(anyhow::anyhow!(
            "Max iterations ({}) reached without completion",
            self.max_iterations
        ))
    }

    /// Execute a single tool call.
    async fn execute_tool_call(&self, tool_call: &ToolCall) -> Result<String, ToolError> {
        let raw = tool_call.function.arguments.trim();
        let args: Value = if raw.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(raw).map_err(|e| {
                ToolError::InvalidInput(format!(
                    "Arguments for '{}' are not valid JSON: {}",
                    tool_call.function.name, e
                ))
            })?
        };

        self.tools.invoke(&tool_call.function.name, args).await
    }
}

/// Clip tool output before it goes back into the conversation.
fn clip_output(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((cut, _)) => {
            let omitted = s[cut..].chars().count();
            format!("{}\n... [truncated {} chars]", &s[..cut], omitted)
        }
    }
}

/// Truncate a string for logging purposes.
fn truncate_for_log(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}... [truncated]", &s[..cut]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, FunctionCall};
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses; repeats `fallback` once the script runs out.
    struct ScriptedLlm {
        script: Mutex<VecDeque<ChatResponse>>,
        fallback: Option<ChatResponse>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedLlm {
        fn new(script: Vec<ChatResponse>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn repeating(response: ChatResponse) -> Self {
            Self {
                fallback: Some(response),
                ..Self::new(Vec::new())
            }
        }

        fn last_request(&self) -> Vec<ChatMessage> {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat_completion(
            &self,
            _model: &str,
            messages: &[ChatMessage],
            _tools: Option<&[crate::llm::ToolDefinition]>,
        ) -> anyhow::Result<ChatResponse> {
            self.seen.lock().unwrap().push(messages.to_vec());
            let next = self.script.lock().unwrap().pop_front();
            next.or_else(|| self.fallback.clone())
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
    }

    struct Lookup;

    #[async_trait]
    impl Tool for Lookup {
        fn name(&self) -> &str {
            "lookup"
        }

        fn description(&self) -> &str {
            "Look something up"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"q": {"type": "string"}}})
        }

        async fn execute(&self, args: Value) -> Result<String, ToolError> {
            match args["q"].as_str() {
                Some("slow") => Err(ToolError::Timeout("took too long".to_string())),
                Some("big") => Ok("x".repeat(50)),
                Some(q) => Ok(format!("found: {}", q)),
                None => Err(ToolError::InvalidInput("Missing 'q' argument".to_string())),
            }
        }
    }

    fn registry() -> ToolRegistry {
        let mut tools = ToolRegistry::empty();
        tools.register(Arc::new(Lookup));
        tools
    }

    fn call(id: &str, name: &str, args: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: args.to_string(),
            },
        }
    }

    fn tool_turn(content: Option<&str>, calls: Vec<ToolCall>) -> ChatResponse {
        ChatResponse {
            content: content.map(str::to_string),
            tool_calls: Some(calls),
            finish_reason: Some("tool_calls".to_string()),
            usage: Some(TokenUsage::new(10, 5)),
            model: None,
        }
    }

    fn final_turn(content: &str) -> ChatResponse {
        ChatResponse {
            content: Some(content.to_string()),
            tool_calls: None,
            finish_reason: Some("stop".to_string()),
            usage: Some(TokenUsage::new(20, 8)),
            model: None,
        }
    }

    fn tool_messages(messages: &[ChatMessage]) -> Vec<String> {
        messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.content.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_runs_tools_then_returns_final_content() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            tool_turn(Some("searching"), vec![call("c1", "lookup", r#"{"q":"rust"}"#)]),
            final_turn("# Report\nRust is fine."),
        ]));
        let agent = Agent::new(llm.clone(), registry(), "gpt-4o-mini");

        let run = agent.run("task").await.unwrap();
        assert_eq!(run.output, "# Report\nRust is fine.");
        assert_eq!(run.iterations, 2);
        assert_eq!(run.usage, TokenUsage::new(30, 13));

        let request = llm.last_request();
        assert_eq!(request[0].role, Role::System);
        assert_eq!(request[1].content.as_deref(), Some("task"));
        assert_eq!(tool_messages(&request), vec!["found: rust"]);
        assert_eq!(request.last().unwrap().tool_call_id.as_deref(), Some("c1"));

        let kinds: Vec<_> = run
            .log
            .iter()
            .map(|e| serde_json::to_value(&e.entry_type).unwrap())
            .collect();
        assert_eq!(
            kinds,
            vec![json!("thinking"), json!("tool_call"), json!("tool_result"), json!("response")]
        );
    }

    #[tokio::test]
    async fn test_tool_errors_are_fed_back_as_text() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            tool_turn(
                None,
                vec![
                    call("c1", "lookup", r#"{"q":"slow"}"#),
                    call("c2", "missing_tool", "{}"),
                    call("c3", "lookup", "not json"),
                    call("c4", "lookup", ""),
                ],
            ),
            final_turn("done"),
        ]));
        let agent = Agent::new(llm.clone(), registry(), "m");

        let run = agent.run("task").await.unwrap();
        assert_eq!(run.output, "done");

        let results = tool_messages(&llm.last_request());
        assert_eq!(results.len(), 4);
        assert_eq!(results[0], "Error: took too long");
        assert_eq!(results[1], "Error: Unknown tool: missing_tool");
        assert!(results[2].starts_with("Error: Invalid input. Arguments for 'lookup' are not valid JSON"));
        assert_eq!(results[3], "Error: Invalid input. Missing 'q' argument");
    }

    #[tokio::test]
    async fn test_stops_at_max_iterations_with_raw_output() {
        let llm = Arc::new(ScriptedLlm::repeating(tool_turn(
            Some("still looking"),
            vec![call("c", "lookup", r#"{"q":"again"}"#)],
        )));
        let agent = Agent::new(llm, registry(), "m").with_max_iterations(3);

        let failure = agent.run("task").await.unwrap_err();
        assert_eq!(failure.iterations, 3);
        assert_eq!(
            failure.to_string(),
            "Max iterations (3) reached without completion"
        );
        assert_eq!(failure.raw_output.as_deref(), Some("still looking"));
        assert!(matches!(
            failure.log.last().map(|e| &e.entry_type),
            Some(LogEntryType::Error)
        ));
    }

    #[tokio::test]
    async fn test_llm_failure_without_text_has_no_raw_output() {
        let agent = Agent::new(Arc::new(ScriptedLlm::new(Vec::new())), registry(), "m");
        let failure = agent.run("task").await.unwrap_err();
        assert_eq!(failure.iterations, 1);
        assert!(failure.raw_output.is_none());
        assert_eq!(failure.error.to_string(), "script exhausted");
    }

    #[tokio::test]
    async fn test_tool_output_is_clipped() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            tool_turn(None, vec![call("c1", "lookup", r#"{"q":"big"}"#)]),
            final_turn("ok"),
        ]));
        let agent = Agent::new(llm.clone(), registry(), "m").with_max_tool_output_chars(10);

        agent.run("task").await.unwrap();
        let results = tool_messages(&llm.last_request());
        assert_eq!(results[0], format!("{}\n... [truncated 40 chars]", "x".repeat(10)));
    }

    #[test]
    fn test_clipping_respects_char_boundaries() {
        assert_eq!(clip_output("héllo", 10), "héllo");
        assert_eq!(clip_output("héllo", 2), "hé\n... [truncated 3 chars]");
        assert_eq!(truncate_for_log("ééé", 1), "é... [truncated]");
    }
}
