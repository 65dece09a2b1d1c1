//! Type definitions for tenant projects and their endpoint graphs.
//!
//! The engine treats these as read-mostly value snapshots: the definition
//! provider hands out a full `Project` graph per lookup and the serving path
//! never mutates it. Selection cursors and counters live outside the
//! snapshot (see `engine::selection` and `host::instance`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_true() -> bool {
    true
}

pub(crate) fn default_status_code() -> u16 {
    200
}

fn default_rule_status() -> u16 {
    400
}

fn default_data_type() -> String {
    "string".to_string()
}

fn default_content_type() -> String {
    "application/json".to_string()
}

fn default_webhook_method() -> String {
    "POST".to_string()
}

/// Deserialize a status code from either a number or a string
pub(crate) fn deserialize_status_code<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| D::Error::custom("invalid status code number")),
        serde_json::Value::String(s) => s
            .parse::<u16>()
            .map_err(|_| D::Error::custom(format!("invalid status code string: {s}"))),
        _ => Err(D::Error::custom("statusCode must be a number or string")),
    }
}

// ============================================================================
// Project
// ============================================================================

/// One mock-API tenant: a project with its full endpoint graph.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub slug: String,
    /// Team scoping for the shared-listener path (`/team/project/...`).
    /// Personal projects leave this unset and resolve by slug alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_slug: Option<String>,
    /// Dedicated listener port. 0 means the project is served only through
    /// the shared, path-prefixed listener.
    #[serde(default)]
    pub port: u16,
    #[serde(default, alias = "allowCORS")]
    pub allow_cors: bool,
    #[serde(default = "default_true")]
    pub logging_enabled: bool,
    /// Applied when an endpoint has no delay override of its own.
    #[serde(default)]
    pub default_delay_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<JwtSettings>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// Stateless JWT gate settings. This is a simulate/validate utility for
/// mock flows, not a security boundary: tokens are checked for structure
/// and expiry only.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct JwtSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_jwt_expiry")]
    pub expires_in_secs: u64,
}

fn default_jwt_expiry() -> u64 {
    3600
}

// ============================================================================
// Endpoint
// ============================================================================

/// How a response is picked from an endpoint's active response list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SelectionMode {
    /// Round-robin over active responses, wrapping modulo the active count.
    #[default]
    Sequential,
    /// Uniform pick per request.
    Random,
    /// First active response whose condition matches; default/first otherwise.
    Conditional,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: String,
    #[serde(default)]
    pub project_id: String,
    /// Route pattern: literal path with optional `{name}` segments, or a
    /// trailing `*` catch-all when `isWildcard` is set.
    pub route: String,
    pub method: String,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Explicit scan order for the dedicated-listener path (ascending).
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub is_wildcard: bool,
    /// When present, takes precedence over the route pattern; named capture
    /// groups become path parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_pattern: Option<String>,
    #[serde(default)]
    pub response_mode: SelectionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    /// Custom body for validation failures; rendered with the error
    /// placeholder set (see `validation::render_error_template`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_error_template: Option<String>,
    #[serde(default)]
    pub rules: Vec<ValidationRule>,
    #[serde(default)]
    pub responses: Vec<ResponseDef>,
    #[serde(default)]
    pub webhooks: Vec<WebhookDef>,
}

// ============================================================================
// Response
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDef {
    #[serde(default)]
    pub id: String,
    #[serde(
        default = "default_status_code",
        deserialize_with = "deserialize_status_code"
    )]
    pub status_code: u16,
    /// Template source; rendered per request.
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Header values are template sources too.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Exactly one response should carry this; when none does, the first
    /// active response stands in.
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub order: i32,
    /// Dotted-path comparison, e.g. `body.type == "admin"` or
    /// `query.age >= 18`. A matching condition wins regardless of the
    /// endpoint's selection mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Default for ResponseDef {
    fn default() -> Self {
        Self {
            id: String::new(),
            status_code: default_status_code(),
            body: String::new(),
            content_type: default_content_type(),
            headers: HashMap::new(),
            is_default: false,
            order: 0,
            condition: None,
            active: true,
        }
    }
}

impl ResponseDef {
    /// The synthesized reply used when an endpoint has no active responses.
    pub fn synthesized() -> Self {
        Self {
            body: "{}".to_string(),
            ..Self::default()
        }
    }
}

// ============================================================================
// Validation rules
// ============================================================================

/// Where a validated parameter is read from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    #[default]
    Query,
    Header,
    Path,
    Body,
    Cookie,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    #[serde(default)]
    pub id: String,
    /// Parameter name; body rules may use dotted paths with `[index]`
    /// accessors, e.g. `items[0].sku`.
    pub parameter: String,
    #[serde(default)]
    pub location: ParamLocation,
    #[serde(default, alias = "isRequired")]
    pub required: bool,
    /// Type tag: number/integer/boolean/uuid/email/url/date/array/object.
    /// `string` and unknown tags always pass the type check.
    #[serde(default = "default_data_type")]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Numeric bound or minimum string length; the value's own numeric
    /// parse decides which applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
    /// JSON array or comma-separated list; membership is case-insensitive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(
        default = "default_rule_status",
        deserialize_with = "deserialize_status_code"
    )]
    pub status_code: u16,
    #[serde(default = "default_true")]
    pub active: bool,
}

// ============================================================================
// Webhooks
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDef {
    #[serde(default)]
    pub id: String,
    /// Target URL template.
    pub url: String,
    #[serde(default = "default_webhook_method")]
    pub method: String,
    /// Body template; sent as UTF-8 text with a JSON content type unless
    /// the rendered headers override it.
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Fixed delay before the outbound call.
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// ============================================================================
// Host status
// ============================================================================

/// Lifecycle state of a dedicated tenant listener.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HostStatus::Stopped => "stopped",
            HostStatus::Starting => "starting",
            HostStatus::Running => "running",
            HostStatus::Stopping => "stopping",
            HostStatus::Error => "error",
        };
        f.write_str(s)
    }
}
