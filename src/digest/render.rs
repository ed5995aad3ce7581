//! Markdown and HTML rendering of digest items.

use std::fmt::{Display, Write};

use chrono::{DateTime, NaiveDate, TimeZone};

use crate::feed::Item;

/// Day header format, e.g. `Monday January 2, 2006`.
pub const HEADER_DATE_FORMAT: &str = "%A %B %-d, %Y";

const ITEM_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

const STYLESHEET: &str = r#"
body { font-family: -apple-system, "Segoe UI", Helvetica, Arial, sans-serif; max-width: 48em; margin: 0 auto; padding: 1em; line-height: 1.4; color: #222; background: #fdfdfd; }
h1 { font-size: 1.3em; border-bottom: 1px solid #ddd; margin-top: 1.5em; }
a { color: #1a55a0; text-decoration: none; }
a:hover { text-decoration: underline; }
small { color: #666; }
"#;

/// Escape text for use in HTML content and attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

/// Yields each item with the day header to print before it, if any.
fn with_day_headers<'a, Tz>(
    items: &'a [Item],
    tz: &'a Tz,
) -> impl Iterator<Item = (Option<NaiveDate>, DateTime<Tz>, &'a Item)> + 'a
where
    Tz: TimeZone,
{
    let mut last_day: Option<NaiveDate> = None;
    items.iter().map(move |item| {
        let local = item.published.with_timezone(tz);
        let day = local.date_naive();
        let header = if last_day != Some(day) {
            last_day = Some(day);
            Some(day)
        } else {
            None
        };
        (header, local, item)
    })
}

/// Render items as Markdown, in the order given.
pub fn render_markdown<Tz>(items: &[Item], tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut out = String::new();
    for (header, local, item) in with_day_headers(items, tz) {
        if let Some(day) = header {
            let _ = write!(out, "# {}\n\n", day.format(HEADER_DATE_FORMAT));
        }
        let _ = write!(
            out,
            "[{}]({}) {} @ {}\n\n",
            item.title,
            item.link,
            item.feed_title,
            local.format(ITEM_TIME_FORMAT)
        );
    }
    out
}

/// Render items as a standalone HTML page, in the order given.
pub fn render_html<Tz>(items: &[Item], tz: &Tz, generated_at: DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut out = String::new();
    let _ = write!(
        out,
        "<html>\n<head>\n<title>Feeds</title>\n<style>{STYLESHEET}</style>\n\
         <meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\" />\n\
         <meta name=\"viewport\" content=\"initial-scale=1.0\" />\n</head>\n<body>\n"
    );

    for (header, local, item) in with_day_headers(items, tz) {
        if let Some(day) = header {
            let _ = write!(out, "<h1>{}</h1>\n\n", day.format(HEADER_DATE_FORMAT));
        }
        let _ = writeln!(
            out,
            "<p><a href=\"{}\">{}</a> <small>{} @ {}</small></p>",
            escape_html(&item.link),
            escape_html(&item.title),
            escape_html(&item.feed_title),
            local.format(ITEM_TIME_FORMAT)
        );
        if let Some(summary) = item.summary.as_deref().filter(|s| !s.is_empty()) {
            let _ = writeln!(out, "<p><small>{}</small></p>", escape_html(summary));
        }
    }

    let _ = write!(
        out,
        "<p><small>Generated: {}</small></p></body>\n</html>\n",
        generated_at.format(ITEM_TIME_FORMAT)
    );
    out
}
