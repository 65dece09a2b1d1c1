//! Captured request context for validation, templating, and webhooks.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;

/// Snapshot of an inbound request, taken once per request and shared by the
/// validation engine, the template renderer, and webhook jobs. Header keys
/// are lowercased; cookies are parsed out of the `Cookie` header.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub body: Option<String>,
    /// Random short id, unique per request; exposed to templates as `${id}`.
    pub request_id: String,
    pub received_at: chrono::DateTime<chrono::Utc>,
}

impl RequestContext {
    pub fn new(
        method: &str,
        path: &str,
        query_string: Option<&str>,
        headers: &hyper::HeaderMap,
        body: Option<String>,
    ) -> Self {
        let headers_map: HashMap<String, String> = headers
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|val| (k.as_str().to_lowercase(), val.to_string()))
            })
            .collect();
        let cookies = parse_cookie_header(headers_map.get("cookie").map(String::as_str));

        Self {
            method: method.to_string(),
            path: path.to_string(),
            query: parse_query_string(query_string),
            headers: headers_map,
            cookies,
            body,
            request_id: short_id(),
            received_at: chrono::Utc::now(),
        }
    }

    /// Get a value by dotted path (e.g. `query.name`, `headers.content-type`).
    /// Used by the template renderer's `request.*` domain.
    pub fn get(&self, path: &str) -> Option<String> {
        let parts: Vec<&str> = path.splitn(2, '.').collect();
        match parts.as_slice() {
            ["path"] => Some(self.path.clone()),
            ["method"] => Some(self.method.clone()),
            ["body"] => Some(self.body.clone().unwrap_or_default()),
            ["query", name] => self.query.get(*name).cloned(),
            ["headers", name] | ["header", name] => {
                self.headers.get(&name.to_lowercase()).cloned()
            }
            ["cookies", name] | ["cookie", name] => self.cookies.get(*name).cloned(),
            _ => None,
        }
    }

    /// Parse the body as JSON. `None` when there is no body, `Some(Err)` when
    /// the body is present but malformed.
    pub fn body_json(&self) -> Option<Result<serde_json::Value, serde_json::Error>> {
        self.body
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .map(serde_json::from_str)
    }
}

/// Parse a query string into a map, URL-decoding values.
pub fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(q) = query {
        for pair in q.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                let decoded = urlencoding::decode(value).unwrap_or_default().to_string();
                params.insert(key.to_string(), decoded);
            } else if !pair.is_empty() {
                params.insert(pair.to_string(), String::new());
            }
        }
    }
    params
}

fn parse_cookie_header(header: Option<&str>) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    if let Some(raw) = header {
        for pair in raw.split(';') {
            if let Some((key, value)) = pair.split_once('=') {
                cookies.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }
    cookies
}

fn short_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::{HeaderName, HeaderValue};
    use hyper::HeaderMap;

    fn test_context() -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            HeaderName::from_static("cookie"),
            HeaderValue::from_static("session=abc123; theme=dark"),
        );
        RequestContext::new(
            "POST",
            "/users/123",
            Some("name=John&city=New%20York"),
            &headers,
            Some(r#"{"action": "create"}"#.to_string()),
        )
    }

    #[test]
    fn query_is_decoded() {
        let ctx = test_context();
        assert_eq!(ctx.query.get("name"), Some(&"John".to_string()));
        assert_eq!(ctx.query.get("city"), Some(&"New York".to_string()));
    }

    #[test]
    fn cookies_are_parsed() {
        let ctx = test_context();
        assert_eq!(ctx.cookies.get("session"), Some(&"abc123".to_string()));
        assert_eq!(ctx.cookies.get("theme"), Some(&"dark".to_string()));
    }

    #[test]
    fn dotted_get_resolves_fields() {
        let ctx = test_context();
        assert_eq!(ctx.get("path"), Some("/users/123".to_string()));
        assert_eq!(ctx.get("method"), Some("POST".to_string()));
        assert_eq!(ctx.get("query.name"), Some("John".to_string()));
        assert_eq!(
            ctx.get("headers.Content-Type"),
            Some("application/json".to_string())
        );
        assert_eq!(ctx.get("cookies.session"), Some("abc123".to_string()));
        assert_eq!(ctx.get("nope.x"), None);
    }

    #[test]
    fn body_json_distinguishes_absent_from_malformed() {
        let ctx = test_context();
        assert!(ctx.body_json().unwrap().is_ok());

        let empty = RequestContext::default();
        assert!(empty.body_json().is_none());

        let bad = RequestContext {
            body: Some("{not json".to_string()),
            ..Default::default()
        };
        assert!(bad.body_json().unwrap().is_err());
    }

    #[test]
    fn request_ids_are_unique() {
        let a = test_context();
        let b = test_context();
        assert_eq!(a.request_id.len(), 8);
        assert_ne!(a.request_id, b.request_id);
    }
}
