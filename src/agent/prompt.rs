//! Prompt templates for the research agent.

use crate::tools::ToolRegistry;

/// Research instructions sent as the user message. `{query}` is substituted.
pub const TASK_TEMPLATE: &str = r#"Based on the query: '{query}', perform the following steps and compile a report:

1.  **Perform a web search** using `duckduckgo_search` or `brave_search`. Choose one. Collect top results (URLs, descriptions). If `brave_search` fails due to key, use `duckduckgo_search`.

2.  Select all website URLs from the search results.

3.  For each selected URL:
    a. Use the `fetch_page` tool (provide URL as 'url' arg) to fetch HTML.
    b. If an error occurs, record the URL and error, then skip it.
    c. If successful, read the HTML for key info relevant to '{query}'. Extract meaningful text.

4.  Compile findings into a detailed, readable report:
    *   Comprehensive answer.
    *   Key points.
    *   Weird points.
    *   Conclusion.
    *   Search phrases used.
    *   Search tool used (`duckduckgo_search` or `brave_search`).
    *   Website URLs attempted (indicate ✔️ success or ❌ failure type).

**IMPORTANT Formatting Rule:** Format the report in **standard Markdown ONLY**. Avoid non-standard syntax, directives (like `::` or `:::` at the start of lines), admonitions, or complex block elements. Stick to headings, lists, bold, italics, links, and standard code blocks (```).
"#;

/// Fill the task template with the user's query.
pub fn render_task(query: &str) -> String {
    TASK_TEMPLATE.replace("{query}", query)
}

/// Build the system prompt with tool definitions.
pub fn build_system_prompt(tools: &ToolRegistry) -> String {
    let tool_descriptions = tools
        .list_tools()
        .iter()
        .map(|t| format!("- **{}**: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a web research agent. You answer research questions by searching the web, reading pages, and writing a report.

## Your Capabilities

You have access to the following tools:
{tool_descriptions}

## Rules and Guidelines

1. **Always use tools** - Don't guess. Search first, then fetch the pages you cite.

2. **Expect failures** - A tool result starting with `Error:` means that call failed. Record it and move on; don't repeat the same failing call.

3. **Stay on topic** - Only extract information relevant to the query.

4. **Be honest about sources** - Only report URLs you actually attempted, and say which ones failed.

## Response Format

When you are done, reply with the final report only, without a tool call.

If you need to use a tool, respond with a tool call. The system will execute it and return the result."#,
        tool_descriptions = tool_descriptions
    )
}
