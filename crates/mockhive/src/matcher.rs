//! Route pattern matching and path parameter extraction.
//!
//! Per-endpoint precedence: an explicit regex pattern wins, then a wildcard
//! prefix, then segment-by-segment comparison with `{name}` parameters.
//! A failed match short-circuits to the next candidate endpoint; compile
//! errors in user-supplied regexes are treated as a non-match, never a panic.

use crate::model::Endpoint;
use regex::Regex;
use std::collections::HashMap;

/// Name under which a wildcard route exposes the remaining path segments.
pub const WILDCARD_PARAM: &str = "wildcard";

#[derive(Debug, Clone)]
pub enum RoutePattern {
    /// Whole-path regex; named capture groups become path parameters.
    Regex(Regex),
    /// Literal prefix before a trailing `*`; the remainder binds to
    /// the `wildcard` parameter.
    Wildcard { prefix: String },
    /// Segment-by-segment comparison with `{name}` placeholders.
    Segments(Vec<Segment>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

impl RoutePattern {
    /// Compile an endpoint's route definition. Returns `None` when a
    /// supplied regex fails to compile.
    pub fn compile(route: &str, is_wildcard: bool, regex_pattern: Option<&str>) -> Option<Self> {
        if let Some(pattern) = regex_pattern {
            let anchored = anchor(pattern);
            return Regex::new(&anchored).ok().map(RoutePattern::Regex);
        }

        if is_wildcard {
            let prefix = route.trim_end_matches('*').to_string();
            return Some(RoutePattern::Wildcard { prefix });
        }

        let segments = split_segments(route)
            .map(|s| {
                if s.len() > 2 && s.starts_with('{') && s.ends_with('}') {
                    Segment::Param(s[1..s.len() - 1].to_string())
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();
        Some(RoutePattern::Segments(segments))
    }

    /// Match a request path, producing extracted parameters on success.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        match self {
            RoutePattern::Regex(re) => {
                let caps = re.captures(path)?;
                let mut params = HashMap::new();
                for name in re.capture_names().flatten() {
                    if let Some(m) = caps.name(name) {
                        params.insert(name.to_string(), m.as_str().to_string());
                    }
                }
                Some(params)
            }
            RoutePattern::Wildcard { prefix } => {
                let rest = if let Some(rest) = path.strip_prefix(prefix.as_str()) {
                    rest
                } else if path == prefix.trim_end_matches('/') {
                    ""
                } else {
                    return None;
                };
                let mut params = HashMap::new();
                params.insert(
                    WILDCARD_PARAM.to_string(),
                    rest.trim_start_matches('/').to_string(),
                );
                Some(params)
            }
            RoutePattern::Segments(segments) => {
                let path_parts: Vec<&str> = split_segments(path).collect();
                if path_parts.len() != segments.len() {
                    return None;
                }
                let mut params = HashMap::new();
                for (segment, part) in segments.iter().zip(path_parts.iter()) {
                    match segment {
                        Segment::Literal(lit) => {
                            if lit != part {
                                return None;
                            }
                        }
                        Segment::Param(name) => {
                            if part.is_empty() {
                                return None;
                            }
                            params.insert(name.clone(), (*part).to_string());
                        }
                    }
                }
                Some(params)
            }
        }
    }
}

/// Match a request path against an endpoint's route definition.
pub fn match_endpoint(endpoint: &Endpoint, path: &str) -> Option<HashMap<String, String>> {
    let pattern = RoutePattern::compile(
        &endpoint.route,
        endpoint.is_wildcard,
        endpoint.regex_pattern.as_deref(),
    )?;
    pattern.matches(path)
}

/// Number of non-empty segments in a route; used for specificity ordering
/// on the shared-listener path (more segments match first).
pub fn segment_count(route: &str) -> usize {
    split_segments(route).count()
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn anchor(pattern: &str) -> String {
    let mut anchored = String::with_capacity(pattern.len() + 2);
    if !pattern.starts_with('^') {
        anchored.push('^');
    }
    anchored.push_str(pattern);
    if !pattern.ends_with('$') {
        anchored.push('$');
    }
    anchored
}
