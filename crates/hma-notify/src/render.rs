use hma_core::RunClock;
use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use std::sync::OnceLock;

pub const REPORT_TITLE: &str = "S&P 500 Heat Map Analysis";
const FOOTER: &str = "This is an automated message from your S&P 500 Heat Map Analyzer.";

const TAG_STYLES: [(&str, &str); 6] = [
    (
        "<code>",
        r#"<code style="background-color: #f5f5f5; padding: 2px 4px; border-radius: 4px; font-family: monospace;">"#,
    ),
    (
        "<pre>",
        r#"<pre style="background-color: #f5f5f5; padding: 10px; border-radius: 4px; overflow-x: auto; font-family: monospace; line-height: 1.4;">"#,
    ),
    (
        "<blockquote>",
        r#"<blockquote style="border-left: 4px solid #ddd; padding-left: 15px; color: #666;">"#,
    ),
    (
        "<table>",
        r#"<table style="border-collapse: collapse; width: 100%; margin: 16px 0;">"#,
    ),
    (
        "<th>",
        r#"<th style="border: 1px solid #ddd; padding: 8px; text-align: left; background-color: #f5f5f5;">"#,
    ),
    (
        "<td>",
        r#"<td style="border: 1px solid #ddd; padding: 8px; text-align: left;">"#,
    ),
];

struct StripPatterns {
    heading: Regex,
    bold: Regex,
    italic: Regex,
    link: Regex,
}

fn strip_patterns() -> &'static StripPatterns {
    static PATTERNS: OnceLock<StripPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| StripPatterns {
        heading: Regex::new(r"(?m)^#+\s+").expect("valid regex"),
        bold: Regex::new(r"\*\*(.*?)\*\*").expect("valid regex"),
        italic: Regex::new(r"\*(.*?)\*").expect("valid regex"),
        link: Regex::new(r"\[(.*?)\]\(.*?\)").expect("valid regex"),
    })
}

/// Best-effort markdown removal for the plaintext part. Nested emphasis and
/// reference-style links may leave artifacts behind.
pub fn strip_markdown(text: &str) -> String {
    let patterns = strip_patterns();
    let text = patterns.heading.replace_all(text, "");
    let text = patterns.bold.replace_all(&text, "${1}");
    let text = patterns.italic.replace_all(&text, "${1}");
    patterns.link.replace_all(&text, "${1}").into_owned()
}

/// Renders markdown (tables and fenced code included) and inlines styles on
/// the bare `<code>`, `<pre>`, `<blockquote>`, `<table>`, `<th>` and `<td>`
/// open tags. Tags emitted with attributes keep their original form.
pub fn markdown_to_html(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let parser = Parser::new_ext(text, Options::ENABLE_TABLES);
    let mut rendered = String::with_capacity(text.len() * 2);
    html::push_html(&mut rendered, parser);

    TAG_STYLES
        .iter()
        .fold(rendered, |html, (tag, styled)| html.replace(tag, styled))
}

pub fn subject(clock: &RunClock) -> String {
    format!(
        "{REPORT_TITLE} - {} / EST: {}",
        clock.local.format("%Y-%m-%d %H:%M"),
        clock.market.format("%H:%M")
    )
}

pub fn plain_letter(narrative: &str, clock: &RunClock) -> String {
    format!(
        "{REPORT_TITLE}\n\
         Date: {} ({})\n\
         Local Time: {}\n\
         Market Time ({}): {}\n\
         \n\
         Analysis Results:\n\
         {}\n\
         \n\
         {FOOTER}\n",
        clock.date(),
        clock.day_of_week(),
        clock.local_time_labeled(),
        clock.market_zone_name,
        clock.market_time_labeled(),
        strip_markdown(narrative),
    )
}

pub fn html_letter(narrative: &str, clock: &RunClock) -> String {
    let title = REPORT_TITLE.replace('&', "&amp;");
    let footer = FOOTER.replace('&', "&amp;");
    format!(
        r#"<html>
<head>
<style>
body {{ font-family: Arial, sans-serif; line-height: 1.5; color: #333; }}
.header {{ background-color: #f5f5f5; padding: 15px; margin-bottom: 20px; border-radius: 5px; }}
.content {{ padding: 0 20px; }}
.footer {{ font-size: 12px; color: #666; margin-top: 30px; border-top: 1px solid #eee; padding-top: 10px; }}
h1, h2, h3 {{ color: #444; }}
ul, ol {{ padding-left: 25px; }}
li {{ margin-bottom: 5px; }}
</style>
</head>
<body>
<div class="header">
<h1>{title}</h1>
<p>
<strong>Date:</strong> {date} ({weekday})<br>
<strong>Local Time:</strong> {local}<br>
<strong>Market Time ({market_zone}):</strong> {market}
</p>
</div>
<div class="content">
<h2>Analysis Results:</h2>
{analysis}
</div>
<div class="footer">
<p>{footer}</p>
</div>
</body>
</html>
"#,
        date = clock.date(),
        weekday = clock.day_of_week(),
        local = clock.local_time_labeled(),
        market_zone = clock.market_zone_name,
        market = clock.market_time_labeled(),
        analysis = markdown_to_html(narrative),
    )
}
