//! Markdown rendering and HTML document assembly.
//!
//! The heavy lifting is `pulldown-cmark`; this module adds the two things
//! every plugin needs around it: `{{ param }}` substitution before parsing,
//! and wrapping the rendered body into a standalone printable HTML document
//! with the plugin's CSS inlined.

use once_cell::sync::Lazy;
use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use serde_yml::{Mapping, Value};

/// `{{ key }}` / `{{ nested.key }}` placeholders.
static PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").expect("valid placeholder regex"));

/// Render Markdown to an HTML fragment.
///
/// Tables, footnotes, strikethrough and task lists are enabled — document
/// templates (CVs, recipes) lean on tables and task lists heavily.
#[must_use]
pub fn to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS;

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 2);
    html::push_html(&mut out, parser);
    out
}

/// Substitute `{{ key }}` placeholders from `params`.
///
/// Dotted keys walk nested mappings (`{{ contact.email }}`). Placeholders
/// with no matching param are left verbatim so typos stay visible in the
/// output instead of silently vanishing.
#[must_use]
pub fn substitute_params(body: &str, params: &Mapping) -> String {
    PARAM_RE
        .replace_all(body, |caps: &regex::Captures<'_>| {
            lookup(params, &caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Dotted-path lookup returning a display string for scalar values.
fn lookup(params: &Mapping, dotted: &str) -> Option<String> {
    let mut current = params;
    let mut parts = dotted.split('.').peekable();

    while let Some(part) = parts.next() {
        let value = current.get(part)?;
        if parts.peek().is_none() {
            return scalar_to_string(value);
        }
        current = value.as_mapping()?;
    }
    None
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Wrap a rendered body into a complete HTML document.
///
/// `css` is already-concatenated stylesheet text; it is inlined so the
/// resulting file is self-contained (the PDF backend loads it via a single
/// `file://` URL with no asset server).
#[must_use]
pub fn wrap_document(body_html: &str, title: &str, css: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <title>{title}</title>\n\
         <style>\n{css}\n</style>\n\
         </head>\n\
         <body>\n{body_html}\n</body>\n\
         </html>\n",
        title = escape_html(title),
    )
}

/// Minimal escaping for text interpolated into HTML head elements.
#[must_use]
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
