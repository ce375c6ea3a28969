//! Content templates applied to moved text.
//!
//! Tokens look like `{{content}}` or `{{date:YYYY-MM-DD}}`; date and time
//! formats use moment-style tokens.

use chrono::{DateTime, Local};
use regex::Regex;
use std::fmt::Write;
use std::sync::LazyLock;

use crate::error::{ComposeError, Result};

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{([^{}]*)\}\}").unwrap());

const DEFAULT_DATE: &str = "YYYY-MM-DD";
const DEFAULT_TIME: &str = "HH:mm";

/// Longest tokens first so `YYYY` wins over `YY`.
const MOMENT_TOKENS: &[(&str, &str)] = &[
    ("YYYY", "%Y"),
    ("YY", "%y"),
    ("MMMM", "%B"),
    ("MMM", "%b"),
    ("MM", "%m"),
    ("M", "%-m"),
    ("DD", "%d"),
    ("D", "%-d"),
    ("dddd", "%A"),
    ("ddd", "%a"),
    ("HH", "%H"),
    ("H", "%-H"),
    ("hh", "%I"),
    ("h", "%-I"),
    ("mm", "%M"),
    ("ss", "%S"),
    ("A", "%p"),
    ("a", "%P"),
];

/// Values available to a template.
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    pub content: &'a str,
    pub from_path: &'a str,
    pub from_title: &'a str,
    pub new_path: &'a str,
    pub new_title: &'a str,
    pub now: DateTime<Local>,
}

/// Expand every token in `template`.
pub fn render(template: &str, ctx: &TemplateContext<'_>) -> Result<String> {
    let mut out = String::with_capacity(template.len() + ctx.content.len());
    let mut last = 0;
    for cap in TOKEN_RE.captures_iter(template) {
        let (Some(whole), Some(inner)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let (name, format) = match inner.as_str().split_once(':') {
            Some((name, format)) => (name.trim(), Some(format.trim())),
            None => (inner.as_str().trim(), None),
        };
        out.push_str(&template[last..whole.start()]);
        match name {
            "content" => out.push_str(ctx.content),
            "fromPath" => out.push_str(ctx.from_path),
            "fromTitle" => out.push_str(ctx.from_title),
            "newPath" => out.push_str(ctx.new_path),
            "newTitle" => out.push_str(ctx.new_title),
            "date" => format_date(&mut out, &ctx.now, format.unwrap_or(DEFAULT_DATE))?,
            "time" => format_date(&mut out, &ctx.now, format.unwrap_or(DEFAULT_TIME))?,
            other => return Err(ComposeError::InvalidTemplate(other.to_string())),
        }
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Check a template for unknown tokens without rendering it.
pub fn validate(template: &str) -> Result<()> {
    let ctx = TemplateContext {
        content: "",
        from_path: "",
        from_title: "",
        new_path: "",
        new_title: "",
        now: Local::now(),
    };
    render(template, &ctx).map(|_| ())
}

fn format_date(out: &mut String, now: &DateTime<Local>, moment: &str) -> Result<()> {
    let pattern = moment_to_strftime(moment);
    write!(out, "{}", now.format(&pattern))
        .map_err(|_| ComposeError::InvalidTemplate(format!("date:{moment}")))
}

/// Translate a moment-style format into a chrono strftime pattern.
/// Text in `[brackets]` is literal.
fn moment_to_strftime(moment: &str) -> String {
    let mut out = String::new();
    let mut rest = moment;
    'outer: while let Some(c) = rest.chars().next() {
        if c == '[' {
            if let Some(close) = rest.find(']') {
                out.push_str(&rest[1..close].replace('%', "%%"));
                rest = &rest[close + 1..];
                continue;
            }
        }
        for (token, spec) in MOMENT_TOKENS {
            if let Some(after) = rest.strip_prefix(token) {
                out.push_str(spec);
                rest = after;
                continue 'outer;
            }
        }
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}
