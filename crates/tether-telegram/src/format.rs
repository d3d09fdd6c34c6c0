//! Markdown to Telegram HTML conversion.
//!
//! Telegram accepts only a small HTML subset (`<b>`, `<i>`, `<code>`,
//! `<pre>`, `<a href>`). The converter first segments the markdown into
//! code spans and prose with a backtick scanner, then renders each span:
//! code is escaped wholesale, prose gets the inline transforms. Code
//! never sees a prose transform because it is never part of a prose
//! span.

use regex::Regex;
use std::sync::LazyLock;

/// Maximum message length (with margin below Telegram's 4096).
pub const MAX_MESSAGE_LEN: usize = 4000;

/// URL schemes allowed through as anchors.
const SAFE_SCHEMES: &[&str] = &["http://", "https://", "tg://"];

/// Escape text for safe inclusion in Telegram HTML.
#[must_use]
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Convert assistant markdown to Telegram HTML.
#[must_use]
pub fn md_to_telegram_html(md: &str) -> String {
    let mut out = String::with_capacity(md.len());
    for span in split_code_spans(md) {
        match span {
            Span::Fenced(code) => {
                out.push_str("<pre>");
                out.push_str(&html_escape(&code));
                out.push_str("</pre>");
            },
            Span::Inline(code) => {
                out.push_str("<code>");
                out.push_str(&html_escape(&code));
                out.push_str("</code>");
            },
            Span::Prose(text) => out.push_str(&render_prose(&text)),
        }
    }
    out
}

/// One segment of the source markdown.
enum Span {
    /// Text outside any code region.
    Prose(String),
    /// Inline `` `code` `` without its backticks.
    Inline(String),
    /// A fenced block without fences or language tag.
    Fenced(String),
}

/// Segment markdown at backticks. Unterminated backticks stay prose.
fn split_code_spans(md: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut prose = String::new();
    let mut rest = md;

    loop {
        let Some(tick) = rest.find('`') else {
            prose.push_str(rest);
            break;
        };
        let (before, from_tick) = rest.split_at(tick);
        prose.push_str(before);

        if let Some(after_fence) = from_tick.strip_prefix("```") {
            let Some(close) = after_fence.find("```") else {
                // No closing fence: the backticks are literal text.
                prose.push_str("```");
                rest = after_fence;
                continue;
            };
            if !prose.is_empty() {
                spans.push(Span::Prose(std::mem::take(&mut prose)));
            }
            let (raw, tail) = after_fence.split_at(close);
            // A language tag on the fence line carries no meaning in
            // Telegram HTML; drop it.
            let body = match raw.split_once('\n') {
                Some((tag, code)) if tag.chars().all(|c| c.is_ascii_alphanumeric()) => code,
                _ => raw,
            };
            spans.push(Span::Fenced(body.to_string()));
            rest = tail.strip_prefix("```").unwrap_or(tail);
            continue;
        }

        let after_tick = from_tick.strip_prefix('`').unwrap_or(from_tick);
        if let Some(close) = after_tick.find('`') {
            if !prose.is_empty() {
                spans.push(Span::Prose(std::mem::take(&mut prose)));
            }
            let (code, tail) = after_tick.split_at(close);
            spans.push(Span::Inline(code.to_string()));
            rest = tail.strip_prefix('`').unwrap_or(tail);
        } else {
            prose.push('`');
            rest = after_tick;
        }
    }

    if !prose.is_empty() {
        spans.push(Span::Prose(prose));
    }
    spans
}

/// Escape a prose span and apply the inline transforms: bold, links,
/// headings.
fn render_prose(text: &str) -> String {
    static BOLD: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("invalid regex"));
    static LINK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("invalid regex"));

    let escaped = html_escape(text);
    let bolded = BOLD.replace_all(&escaped, "<b>$1</b>");
    let linked = LINK.replace_all(&bolded, |caps: &regex::Captures<'_>| {
        let label = &caps[1];
        let url = &caps[2];
        if SAFE_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
            format!("<a href=\"{url}\">{label}</a>")
        } else {
            // Unsafe schemes render as plain text.
            format!("{label} ({url})")
        }
    });

    let lines: Vec<String> = linked.lines().map(render_heading).collect();
    let mut rendered = lines.join("\n");
    if linked.ends_with('\n') {
        rendered.push('\n');
    }
    rendered
}

/// `# Heading` through `###### Heading` becomes bold.
fn render_heading(line: &str) -> String {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if (1..=6).contains(&hashes)
        && let Some(title) = line.trim_start_matches('#').strip_prefix(' ')
    {
        return format!("<b>{title}</b>");
    }
    line.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_specials() {
        assert_eq!(html_escape("a < b & c"), "a &lt; b &amp; c");
    }

    #[test]
    fn bold_and_heading_become_b_tags() {
        assert_eq!(md_to_telegram_html("**hi**"), "<b>hi</b>");
        assert_eq!(md_to_telegram_html("## Title"), "<b>Title</b>");
    }

    #[test]
    fn code_blocks_are_protected_from_inline_transforms() {
        let html = md_to_telegram_html("```rust\nlet x = a < b && **not bold**;\n```");
        assert_eq!(
            html,
            "<pre>let x = a &lt; b &amp;&amp; **not bold**;\n</pre>"
        );
    }

    #[test]
    fn inline_code_is_escaped_and_wrapped() {
        assert_eq!(
            md_to_telegram_html("use `Vec<u8>` here"),
            "use <code>Vec&lt;u8&gt;</code> here"
        );
    }

    #[test]
    fn fence_without_language_tag_keeps_its_first_line() {
        assert_eq!(
            md_to_telegram_html("```\nplain code\n```"),
            "<pre>plain code\n</pre>"
        );
        assert_eq!(md_to_telegram_html("```a + b```"), "<pre>a + b</pre>");
    }

    #[test]
    fn unterminated_backticks_stay_literal() {
        assert_eq!(md_to_telegram_html("a ` b"), "a ` b");
        assert_eq!(md_to_telegram_html("open ```fence"), "open ```fence");
    }

    #[test]
    fn prose_around_code_keeps_its_transforms() {
        assert_eq!(
            md_to_telegram_html("**run** `cargo test` now"),
            "<b>run</b> <code>cargo test</code> now"
        );
    }

    #[test]
    fn safe_links_become_anchors() {
        assert_eq!(
            md_to_telegram_html("[docs](https://example.com)"),
            "<a href=\"https://example.com\">docs</a>"
        );
    }

    #[test]
    fn unsafe_links_render_as_text() {
        let html = md_to_telegram_html("[x](javascript:alert(1))");
        assert!(!html.contains("<a "));
    }

    #[test]
    fn hash_mid_line_is_not_a_heading() {
        assert_eq!(md_to_telegram_html("issue #42"), "issue #42");
        assert_eq!(md_to_telegram_html("####### seven"), "####### seven");
    }
}
