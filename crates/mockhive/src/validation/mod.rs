//! Declarative request validation.
//!
//! Each active rule resolves its parameter by location, then runs a fixed
//! check chain, short-circuiting per rule on the first failure:
//! required → data type → numeric range / string length → allowed values →
//! regex. Every failure carries the rule's own status code; the aggregate
//! response uses the first failing rule's. Invalid user regexes are skipped,
//! never fatal. A malformed JSON body short-circuits all body rules with a
//! single invalid-JSON error.

use crate::engine::context::RequestContext;
use crate::model::{ParamLocation, ValidationRule};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

pub const CODE_REQUIRED: &str = "REQUIRED";
pub const CODE_INVALID_TYPE: &str = "INVALID_TYPE";
pub const CODE_PATTERN_MISMATCH: &str = "PATTERN_MISMATCH";
pub const CODE_BELOW_MINIMUM: &str = "BELOW_MINIMUM";
pub const CODE_ABOVE_MAXIMUM: &str = "ABOVE_MAXIMUM";
pub const CODE_TOO_SHORT: &str = "TOO_SHORT";
pub const CODE_TOO_LONG: &str = "TOO_LONG";
pub const CODE_INVALID_VALUE: &str = "INVALID_VALUE";
pub const CODE_INVALID_JSON: &str = "INVALID_JSON";

/// One rule failure. `status_code` is the rule's, not the aggregate's.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFailure {
    pub field: String,
    pub message: String,
    pub detail: String,
    #[serde(skip)]
    pub code: &'static str,
    #[serde(skip)]
    pub status_code: u16,
}

/// A resolved parameter value: plain text from query/header/path/cookie,
/// or a JSON node from the body.
#[derive(Debug, Clone)]
enum ParamValue {
    Text(String),
    Json(serde_json::Value),
}

impl ParamValue {
    /// Textual form used by bounds, membership, and pattern checks.
    /// JSON strings are unquoted; other JSON nodes are serialized.
    fn as_text(&self) -> String {
        match self {
            ParamValue::Text(s) => s.clone(),
            ParamValue::Json(serde_json::Value::String(s)) => s.clone(),
            ParamValue::Json(v) => v.to_string(),
        }
    }
}

/// Evaluate all active rules against the request. Returns the failures in
/// rule order; an empty vec means the request is valid.
pub fn validate_request(
    rules: &[ValidationRule],
    ctx: &RequestContext,
    path_params: &HashMap<String, String>,
) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();

    // The body is parsed at most once; a parse error fails all body rules
    // with a single entry.
    let mut body_json: Option<Result<serde_json::Value, ()>> = None;
    let mut body_error_reported = false;

    for rule in rules.iter().filter(|r| r.active) {
        let value = match rule.location {
            ParamLocation::Query => ctx.query.get(&rule.parameter).cloned().map(ParamValue::Text),
            ParamLocation::Header => ctx
                .headers
                .get(&rule.parameter.to_lowercase())
                .cloned()
                .map(ParamValue::Text),
            ParamLocation::Cookie => ctx
                .cookies
                .get(&rule.parameter)
                .cloned()
                .map(ParamValue::Text),
            ParamLocation::Path => path_params
                .get(&rule.parameter)
                .cloned()
                .map(ParamValue::Text),
            ParamLocation::Body => {
                let parsed = body_json.get_or_insert_with(|| match ctx.body_json() {
                    Some(Ok(v)) => Ok(v),
                    Some(Err(_)) => Err(()),
                    None => Ok(serde_json::Value::Null),
                });
                match parsed {
                    Err(()) => {
                        if !body_error_reported {
                            body_error_reported = true;
                            failures.push(ValidationFailure {
                                field: "body".to_string(),
                                message: "Request body is not valid JSON".to_string(),
                                detail: "body could not be parsed as JSON".to_string(),
                                code: CODE_INVALID_JSON,
                                status_code: rule.status_code,
                            });
                        }
                        continue;
                    }
                    Ok(root) => lookup_json_path(root, &rule.parameter)
                        .cloned()
                        .map(ParamValue::Json),
                }
            }
        };

        if let Some(failure) = check_rule(rule, value) {
            failures.push(failure);
        }
    }

    failures
}

/// Run the check chain for one rule against its resolved value.
fn check_rule(rule: &ValidationRule, value: Option<ParamValue>) -> Option<ValidationFailure> {
    let value = match value {
        None => {
            if rule.required {
                return Some(fail(
                    rule,
                    CODE_REQUIRED,
                    format!("parameter '{}' is required but missing", rule.parameter),
                ));
            }
            return None;
        }
        Some(v) => v,
    };

    // Path parameters come from route matching and are only checked for
    // presence.
    if rule.location == ParamLocation::Path {
        return None;
    }

    if let Some(failure) = check_data_type(rule, &value) {
        return Some(failure);
    }
    if let Some(failure) = check_bounds(rule, &value) {
        return Some(failure);
    }
    if let Some(failure) = check_allowed_values(rule, &value) {
        return Some(failure);
    }
    check_pattern(rule, &value)
}

fn check_data_type(rule: &ValidationRule, value: &ParamValue) -> Option<ValidationFailure> {
    let text = value.as_text();
    let ok = match rule.data_type.to_lowercase().as_str() {
        "number" | "numeric" | "float" | "double" => match value {
            ParamValue::Json(v) => v.is_number() || text.parse::<f64>().is_ok(),
            ParamValue::Text(_) => text.parse::<f64>().is_ok(),
        },
        "integer" | "int" => match value {
            ParamValue::Json(v) => v.is_i64() || v.is_u64() || text.parse::<i64>().is_ok(),
            ParamValue::Text(_) => text.parse::<i64>().is_ok(),
        },
        "boolean" | "bool" => match value {
            ParamValue::Json(v) => v.is_boolean() || is_bool_text(&text),
            ParamValue::Text(_) => is_bool_text(&text),
        },
        "uuid" => uuid::Uuid::parse_str(&text).is_ok(),
        "email" => is_email(&text),
        "url" => url::Url::parse(&text).is_ok(),
        "date" | "datetime" => is_date(&text),
        "array" => match value {
            ParamValue::Json(v) => v.is_array(),
            ParamValue::Text(_) => serde_json::from_str::<serde_json::Value>(&text)
                .map(|v| v.is_array())
                .unwrap_or(false),
        },
        "object" => match value {
            ParamValue::Json(v) => v.is_object(),
            ParamValue::Text(_) => serde_json::from_str::<serde_json::Value>(&text)
                .map(|v| v.is_object())
                .unwrap_or(false),
        },
        // "string" and unknown tags always pass
        _ => true,
    };

    if ok {
        None
    } else {
        Some(fail(
            rule,
            CODE_INVALID_TYPE,
            format!(
                "parameter '{}' must be of type {}, got '{}'",
                rule.parameter, rule.data_type, text
            ),
        ))
    }
}

/// Numeric range when the value parses as a number, string-length bounds
/// otherwise. Unparsable min/max entries are ignored.
fn check_bounds(rule: &ValidationRule, value: &ParamValue) -> Option<ValidationFailure> {
    if rule.min.is_none() && rule.max.is_none() {
        return None;
    }
    let text = value.as_text();
    let min = rule.min.as_deref().and_then(|s| s.trim().parse::<f64>().ok());
    let max = rule.max.as_deref().and_then(|s| s.trim().parse::<f64>().ok());

    if let Ok(n) = text.parse::<f64>() {
        if let Some(min) = min {
            if n < min {
                return Some(fail(
                    rule,
                    CODE_BELOW_MINIMUM,
                    format!("parameter '{}' is {} but must be >= {}", rule.parameter, n, min),
                ));
            }
        }
        if let Some(max) = max {
            if n > max {
                return Some(fail(
                    rule,
                    CODE_ABOVE_MAXIMUM,
                    format!("parameter '{}' is {} but must be <= {}", rule.parameter, n, max),
                ));
            }
        }
    } else {
        let len = text.chars().count() as f64;
        if let Some(min) = min {
            if len < min {
                return Some(fail(
                    rule,
                    CODE_TOO_SHORT,
                    format!(
                        "parameter '{}' has length {} but must be at least {}",
                        rule.parameter, len, min
                    ),
                ));
            }
        }
        if let Some(max) = max {
            if len > max {
                return Some(fail(
                    rule,
                    CODE_TOO_LONG,
                    format!(
                        "parameter '{}' has length {} but must be at most {}",
                        rule.parameter, len, max
                    ),
                ));
            }
        }
    }
    None
}

fn check_allowed_values(rule: &ValidationRule, value: &ParamValue) -> Option<ValidationFailure> {
    let raw = rule.allowed_values.as_deref()?.trim();
    if raw.is_empty() {
        return None;
    }
    let allowed = parse_allowed_values(raw);
    if allowed.is_empty() {
        return None;
    }
    let text = value.as_text();
    let found = allowed.iter().any(|a| a.eq_ignore_ascii_case(&text));
    if found {
        None
    } else {
        Some(fail(
            rule,
            CODE_INVALID_VALUE,
            format!(
                "parameter '{}' must be one of [{}], got '{}'",
                rule.parameter,
                allowed.join(", "),
                text
            ),
        ))
    }
}

/// JSON array takes precedence; comma-separated fallback.
fn parse_allowed_values(raw: &str) -> Vec<String> {
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(raw) {
        return items
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
    }
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Invalid user patterns are skipped rather than failing the rule.
fn check_pattern(rule: &ValidationRule, value: &ParamValue) -> Option<ValidationFailure> {
    let pattern = rule.pattern.as_deref()?;
    if pattern.is_empty() {
        return None;
    }
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(_) => return None,
    };
    let text = value.as_text();
    if re.is_match(&text) {
        None
    } else {
        Some(fail(
            rule,
            CODE_PATTERN_MISMATCH,
            format!(
                "parameter '{}' does not match pattern '{}'",
                rule.parameter, pattern
            ),
        ))
    }
}

fn fail(rule: &ValidationRule, code: &'static str, detail: String) -> ValidationFailure {
    let message = rule
        .error_message
        .clone()
        .unwrap_or_else(|| detail.clone());
    ValidationFailure {
        field: rule.parameter.clone(),
        message,
        detail,
        code,
        status_code: rule.status_code,
    }
}

fn is_bool_text(text: &str) -> bool {
    matches!(text.to_lowercase().as_str(), "true" | "false")
}

fn is_email(text: &str) -> bool {
    static EMAIL_RE: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap()
    });
    EMAIL_RE.is_match(text)
}

fn is_date(text: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(text).is_ok()
        || chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
        || chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").is_ok()
}

/// Resolve a dotted path with optional `[index]` accessors against a JSON
/// document, e.g. `items[0].sku` or `user.address.city`.
pub fn lookup_json_path<'a>(
    root: &'a serde_json::Value,
    path: &str,
) -> Option<&'a serde_json::Value> {
    let mut current = root;
    for part in path.split('.') {
        if part.is_empty() {
            return None;
        }
        let (key, indexes) = split_indexes(part)?;
        if !key.is_empty() {
            current = current.as_object()?.get(key)?;
        }
        for idx in indexes {
            current = current.as_array()?.get(idx)?;
        }
    }
    Some(current)
}

/// Split `items[0][1]` into `("items", [0, 1])`.
fn split_indexes(part: &str) -> Option<(&str, Vec<usize>)> {
    let open = match part.find('[') {
        Some(i) => i,
        None => return Some((part, Vec::new())),
    };
    let key = &part[..open];
    let mut indexes = Vec::new();
    let mut rest = &part[open..];
    while !rest.is_empty() {
        if !rest.starts_with('[') {
            return None;
        }
        let close = rest.find(']')?;
        let idx = rest[1..close].parse::<usize>().ok()?;
        indexes.push(idx);
        rest = &rest[close + 1..];
    }
    Some((key, indexes))
}

// ============================================================================
// Error body rendering
// ============================================================================

/// Default structured body for validation failures.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrorBody {
    pub error: String,
    pub message: String,
    pub validation_errors: Vec<ValidationFailure>,
}

/// Build the default JSON error body. The aggregate status code is the
/// first failing rule's.
pub fn default_error_body(failures: &[ValidationFailure]) -> String {
    let body = ValidationErrorBody {
        error: "Validation failed".to_string(),
        message: failures
            .first()
            .map(|f| f.message.clone())
            .unwrap_or_default(),
        validation_errors: failures.to_vec(),
    };
    serde_json::to_string(&body).unwrap_or_else(|_| r#"{"error":"Validation failed"}"#.to_string())
}

/// Render a custom validation-error template. Placeholders: `${errors}`
/// (full list as JSON), `${errorCount}`, `${messages}`, `${firstMessage}`,
/// `${fields}`, `${firstField}`, `${timestamp}`.
pub fn render_error_template(template: &str, failures: &[ValidationFailure]) -> String {
    let errors_json = serde_json::to_string(failures).unwrap_or_else(|_| "[]".to_string());
    let messages: Vec<&str> = failures.iter().map(|f| f.message.as_str()).collect();
    let fields: Vec<&str> = failures.iter().map(|f| f.field.as_str()).collect();

    template
        .replace("${errors}", &errors_json)
        .replace("${errorCount}", &failures.len().to_string())
        .replace("${messages}", &messages.join("; "))
        .replace("${firstMessage}", messages.first().unwrap_or(&""))
        .replace("${fields}", &fields.join(", "))
        .replace("${firstField}", fields.first().unwrap_or(&""))
        .replace("${timestamp}", &chrono::Utc::now().to_rfc3339())
}
