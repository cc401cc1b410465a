//! Markdown to HTML for the report view.

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};

/// Render a sanitized report as HTML.
///
/// Raw HTML in the report is shown as text, and links or images with a
/// scriptable scheme lose their target.
pub fn render_report_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let events = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    let scheme = url.trim_start().to_ascii_lowercase();
    if ["javascript:", "vbscript:", "data:"]
        .iter()
        .any(|s| scheme.starts_with(s))
    {
        CowStr::Borrowed("")
    } else {
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_headings_lists_and_links() {
        let html = render_report_html(
            "# Report\n\n## Key points\n\n- first\n- second\n\n1. one\n\nSee [docs](https://docs.rs).",
        );
        assert!(html.contains("<h1>Report</h1>"));
        assert!(html.contains("<h2>Key points</h2>"));
        assert!(html.contains("<ul>\n<li>first</li>\n<li>second</li>\n</ul>"));
        assert!(html.contains("<ol>\n<li>one</li>\n</ol>"));
        assert!(html.contains(r#"<a href="https://docs.rs">docs</a>"#));
    }

    #[test]
    fn test_raw_html_and_script_links_are_neutralized() {
        let html = render_report_html(
            "<script>alert(1)</script>\n\nhi <b>x</b> [bad](javascript:alert(1))",
        );
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("&lt;b&gt;x&lt;/b&gt;"));
        assert!(!html.contains("javascript:"));
    }
}
