//! Response body, header, and webhook payload templating.
//!
//! Templates use `${...}` placeholders resolved against the request context,
//! built-in time/id variables, and the synthetic-data generator:
//!
//! - `${request.path}`, `${request.method}`, `${request.body}`
//! - `${request.query.<name>}`, `${request.headers.<name>}`, `${request.cookies.<name>}`
//! - `${params.<name>}` - route parameters from matching
//! - `${id}` - random per-request short id, `${uuid}` - fresh v4 UUID
//! - `${now.iso}`, `${now.unix}`, `${now.unixMillis}`, `${now.date}`,
//!   `${now.time}`, `${now.rfc2822}`
//! - `${faker.<category>.<method>}` - e.g. `${faker.person.firstName}`
//!
//! Rendering never fails a request: `render_or_original` returns the
//! unmodified source text on any render error, missing request fields
//! resolve to the empty string, and placeholders with an unknown domain are
//! left verbatim.

pub mod faker;

use crate::engine::context::RequestContext;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

static TEMPLATE_REGEX: OnceLock<Regex> = OnceLock::new();

fn template_regex() -> &'static Regex {
    TEMPLATE_REGEX.get_or_init(|| {
        Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z0-9_\-\[\]]+)*)\}")
            .expect("template placeholder regex is valid")
    })
}

/// Everything a template can read: the captured request plus route params.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub request: &'a RequestContext,
    pub params: &'a HashMap<String, String>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RenderError {
    #[error("unterminated placeholder starting at byte {0}")]
    UnterminatedPlaceholder(usize),
}

/// Render a template. A template without placeholders renders to itself.
pub fn render(template: &str, ctx: &RenderContext<'_>) -> Result<String, RenderError> {
    for (i, _) in template.match_indices("${") {
        if !template[i..].contains('}') {
            return Err(RenderError::UnterminatedPlaceholder(i));
        }
    }

    let rendered = template_regex().replace_all(template, |caps: &regex::Captures| {
        let var_path = &caps[1];
        resolve(var_path, ctx).unwrap_or_else(|| caps[0].to_string())
    });
    Ok(rendered.into_owned())
}

/// The pipeline's only rendering entry point: on any render error the
/// original source text is returned unchanged, so a user's malformed
/// template surfaces as-is instead of failing the request.
pub fn render_or_original(template: &str, ctx: &RenderContext<'_>) -> String {
    match render(template, ctx) {
        Ok(rendered) => rendered,
        Err(_) => template.to_string(),
    }
}

pub fn has_template_variables(s: &str) -> bool {
    template_regex().is_match(s)
}

/// `None` keeps the placeholder verbatim (unknown domain); known domains
/// with missing data resolve to the empty string.
fn resolve(var_path: &str, ctx: &RenderContext<'_>) -> Option<String> {
    let (domain, rest) = match var_path.split_once('.') {
        Some((d, r)) => (d, Some(r)),
        None => (var_path, None),
    };

    match (domain, rest) {
        ("request", Some(rest)) => Some(ctx.request.get(rest).unwrap_or_default()),
        ("params", Some(name)) => Some(ctx.params.get(name).cloned().unwrap_or_default()),
        ("id", None) => Some(ctx.request.request_id.clone()),
        ("uuid", None) => Some(uuid::Uuid::new_v4().to_string()),
        ("now", rest) => Some(format_now(rest.unwrap_or("iso"), ctx.request.received_at)),
        ("faker", Some(rest)) => {
            let (category, method) = rest.split_once('.').unwrap_or((rest, ""));
            Some(faker::generate(category, method))
        }
        _ => None,
    }
}

fn format_now(format: &str, now: chrono::DateTime<chrono::Utc>) -> String {
    match format {
        "unix" => now.timestamp().to_string(),
        "unixMillis" => now.timestamp_millis().to_string(),
        "date" => now.format("%Y-%m-%d").to_string(),
        "time" => now.format("%H:%M:%S").to_string(),
        "rfc2822" => now.to_rfc2822(),
        // "iso" and anything unrecognized
        _ => now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    }
}
