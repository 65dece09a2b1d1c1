//! The per-request pipeline for one tenant's endpoint set:
//! match → JWT gate → validate → select → render → delay.
//!
//! `process` is pure over the endpoint snapshot and produces an [`Outcome`];
//! the serving layers (dedicated host, shared dispatcher) apply the delay,
//! write the response, enqueue webhook jobs, and emit the log record via
//! [`finish`]. Failures local to a template or a webhook never disturb the
//! computed response; failures local to one tenant never touch another.

use crate::engine::context::RequestContext;
use crate::engine::respond::build_response_with_headers;
use crate::engine::selection::{select_response, SelectionCycler};
use crate::matcher::{match_endpoint, segment_count};
use crate::model::{Endpoint, Project, WebhookDef};
use crate::sink::{LogSink, RequestRecord};
use crate::template::{render_or_original, RenderContext};
use crate::validation::{default_error_body, render_error_template, validate_request};
use crate::webhook::{DispatchQueue, WebhookJob};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const BODY_SNIPPET_LIMIT: usize = 500;

/// Candidate ordering differs between the two serving paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointOrdering {
    /// Dedicated listener: explicit `order` ascending.
    ByOrder,
    /// Shared listener: non-wildcard first, then more path segments first.
    BySpecificity,
}

/// The computed reply for one request, before any I/O side effects.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub delay_ms: u64,
    pub matched: bool,
    pub matched_route: Option<String>,
    pub error_message: Option<String>,
    pub params: HashMap<String, String>,
    /// Enabled webhook definitions to enqueue after responding.
    pub webhooks: Vec<WebhookDef>,
}

impl Outcome {
    fn reply(status: u16, body: String, content_type: &str) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body,
            delay_ms: 0,
            matched: false,
            matched_route: None,
            error_message: None,
            params: HashMap::new(),
            webhooks: Vec::new(),
        }
    }
}

/// Filter to active endpoints and sort candidates for the linear scan.
pub fn order_candidates(endpoints: &[Endpoint], ordering: EndpointOrdering) -> Vec<&Endpoint> {
    let mut candidates: Vec<&Endpoint> = endpoints.iter().filter(|e| e.active).collect();
    match ordering {
        EndpointOrdering::ByOrder => candidates.sort_by_key(|e| e.order),
        EndpointOrdering::BySpecificity => candidates.sort_by_key(|e| {
            (
                e.is_wildcard,
                std::cmp::Reverse(segment_count(&e.route)),
            )
        }),
    }
    candidates
}

/// Linear scan: the first candidate whose method and route both match wins.
pub fn find_match<'a>(
    candidates: &[&'a Endpoint],
    method: &str,
    path: &str,
) -> Option<(&'a Endpoint, HashMap<String, String>)> {
    for endpoint in candidates {
        if !endpoint.method.eq_ignore_ascii_case(method) {
            continue;
        }
        if let Some(params) = match_endpoint(endpoint, path) {
            return Some((endpoint, params));
        }
    }
    None
}

/// Run the full pipeline for one request against one tenant's endpoint set.
pub fn process(
    project: &Project,
    endpoints: &[Endpoint],
    ctx: &RequestContext,
    cycler: &SelectionCycler,
    ordering: EndpointOrdering,
) -> Outcome {
    if ctx.method.eq_ignore_ascii_case("OPTIONS") && project.allow_cors {
        return preflight_outcome();
    }

    let candidates = order_candidates(endpoints, ordering);
    let (endpoint, params) = match find_match(&candidates, &ctx.method, &ctx.path) {
        Some(found) => found,
        None => {
            let mut outcome = not_found_outcome(project, ctx, &candidates);
            apply_cors(project, &mut outcome);
            return outcome;
        }
    };
    debug!(
        project = %project.slug,
        route = %endpoint.route,
        "matched endpoint"
    );

    if let Some(mut outcome) = jwt_gate(project, ctx) {
        apply_cors(project, &mut outcome);
        return outcome;
    }

    let failures = validate_request(&endpoint.rules, ctx, &params);
    if !failures.is_empty() {
        let status = failures[0].status_code;
        let body = match endpoint.validation_error_template.as_deref() {
            Some(template) => render_error_template(template, &failures),
            None => default_error_body(&failures),
        };
        let mut outcome = Outcome {
            matched: true,
            matched_route: Some(endpoint.route.clone()),
            error_message: Some(failures[0].message.clone()),
            params,
            ..Outcome::reply(status, body, "application/json")
        };
        apply_cors(project, &mut outcome);
        return outcome;
    }

    let response = select_response(endpoint, ctx, &params, cycler);
    let render_ctx = RenderContext {
        request: ctx,
        params: &params,
    };
    let body = render_or_original(&response.body, &render_ctx);

    let mut headers: Vec<(String, String)> = Vec::with_capacity(response.headers.len() + 1);
    let mut content_type_overridden = false;
    for (name, value) in &response.headers {
        if name.eq_ignore_ascii_case("content-type") {
            content_type_overridden = true;
        }
        headers.push((name.clone(), render_or_original(value, &render_ctx)));
    }
    if !content_type_overridden {
        headers.push(("Content-Type".to_string(), response.content_type.clone()));
    }

    let mut outcome = Outcome {
        status: response.status_code,
        headers,
        body,
        delay_ms: compute_delay(endpoint, project),
        matched: true,
        matched_route: Some(endpoint.route.clone()),
        error_message: None,
        params,
        webhooks: endpoint
            .webhooks
            .iter()
            .filter(|w| w.enabled)
            .cloned()
            .collect(),
    };
    apply_cors(project, &mut outcome);
    outcome
}

/// Endpoint min/max range wins over the project default; a degenerate range
/// collapses to its minimum.
fn compute_delay(endpoint: &Endpoint, project: &Project) -> u64 {
    match (endpoint.min_delay_ms, endpoint.max_delay_ms) {
        (None, None) => project.default_delay_ms,
        (min, max) => {
            let min = min.unwrap_or(0);
            let max = max.unwrap_or(min);
            if max > min {
                rand::thread_rng().gen_range(min..=max)
            } else {
                min
            }
        }
    }
}

fn jwt_gate(project: &Project, ctx: &RequestContext) -> Option<Outcome> {
    let settings = project.jwt.as_ref().filter(|j| j.enabled)?;
    let token = ctx
        .headers
        .get("authorization")
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);
    let error = match token {
        None => "Missing bearer token".to_string(),
        Some(token) => match crate::jwt::validate(token, settings) {
            Ok(_) => return None,
            Err(e) => e.to_string(),
        },
    };
    let body = serde_json::json!({
        "error": "Unauthorized",
        "message": error.clone(),
    });
    let mut outcome = Outcome::reply(401, body.to_string(), "application/json");
    outcome.error_message = Some(error);
    Some(outcome)
}

fn preflight_outcome() -> Outcome {
    Outcome {
        status: 204,
        headers: cors_headers(),
        body: String::new(),
        delay_ms: 0,
        matched: false,
        matched_route: None,
        error_message: None,
        params: HashMap::new(),
        webhooks: Vec::new(),
    }
}

fn apply_cors(project: &Project, outcome: &mut Outcome) {
    if project.allow_cors && !outcome.headers.iter().any(|(n, _)| n.starts_with("Access-")) {
        outcome.headers.extend(cors_headers());
    }
}

fn cors_headers() -> Vec<(String, String)> {
    vec![
        ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
        (
            "Access-Control-Allow-Methods".to_string(),
            "GET, POST, PUT, PATCH, DELETE, OPTIONS".to_string(),
        ),
        (
            "Access-Control-Allow-Headers".to_string(),
            "*".to_string(),
        ),
    ]
}

/// Structured 404 listing the tenant's available routes.
fn not_found_outcome(
    project: &Project,
    ctx: &RequestContext,
    candidates: &[&Endpoint],
) -> Outcome {
    let available: Vec<String> = candidates
        .iter()
        .map(|e| format!("{} {}", e.method.to_uppercase(), e.route))
        .collect();
    let body = serde_json::json!({
        "error": "No endpoint matched",
        "project": project.slug,
        "path": ctx.path,
        "availableRoutes": available,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    let mut outcome = Outcome::reply(404, body.to_string(), "application/json");
    outcome.error_message = Some("No endpoint matched".to_string());
    outcome
}

/// Apply an outcome's side effects and produce the HTTP response: sleep the
/// delay, write the reply, enqueue webhook jobs, emit the log record.
pub async fn finish(
    outcome: Outcome,
    project: &Project,
    ctx: &RequestContext,
    queue: &DispatchQueue,
    sink: &Arc<dyn LogSink>,
    started: Instant,
) -> Response<Full<Bytes>> {
    if outcome.delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(outcome.delay_ms)).await;
    }

    let status =
        StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let response = build_response_with_headers(
        status,
        outcome.headers.iter().map(|(n, v)| (n.as_str(), v.as_str())),
        Bytes::from(outcome.body.clone()),
    );

    for definition in &outcome.webhooks {
        let job = WebhookJob::new(
            definition.clone(),
            ctx.clone(),
            outcome.params.clone(),
            project.slug.clone(),
        );
        // Blocking on a full queue is deliberate backpressure, not a hang.
        if let Err(e) = queue.enqueue(job).await {
            warn!(project = %project.slug, "webhook enqueue failed: {e}");
        }
    }

    if project.logging_enabled {
        let record = request_record(&outcome, project, ctx, started);
        sink.notify(&record).await;
        sink.record(record).await;
    }

    response
}

fn request_record(
    outcome: &Outcome,
    project: &Project,
    ctx: &RequestContext,
    started: Instant,
) -> RequestRecord {
    RequestRecord {
        project_slug: project.slug.clone(),
        method: ctx.method.clone(),
        path: ctx.path.clone(),
        query: ctx.query.clone(),
        headers: ctx.headers.clone(),
        body_snippet: ctx.body.as_deref().map(snippet),
        status: outcome.status,
        duration_ms: started.elapsed().as_millis() as u64,
        matched: outcome.matched,
        matched_route: outcome.matched_route.clone(),
        error_message: outcome.error_message.clone(),
        timestamp: chrono::Utc::now(),
    }
}

fn snippet(body: &str) -> String {
    if body.len() > BODY_SNIPPET_LIMIT {
        let mut end = BODY_SNIPPET_LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResponseDef, ValidationRule};

    fn project() -> Project {
        Project {
            id: "p1".to_string(),
            slug: "shop".to_string(),
            ..Default::default()
        }
    }

    fn get_endpoint(route: &str) -> Endpoint {
        Endpoint {
            id: format!("ep-{route}"),
            route: route.to_string(),
            method: "GET".to_string(),
            active: true,
            responses: vec![ResponseDef {
                id: "ok".to_string(),
                body: r#"{"route": "${request.path}"}"#.to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn ctx(method: &str, path: &str) -> RequestContext {
        RequestContext {
            method: method.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn non_wildcard_wins_over_wildcard() {
        let mut wildcard = get_endpoint("/users/*");
        wildcard.is_wildcard = true;
        let specific = get_endpoint("/users/{id}");
        let endpoints = vec![wildcard, specific];

        let candidates = order_candidates(&endpoints, EndpointOrdering::BySpecificity);
        let (matched, params) = find_match(&candidates, "GET", "/users/42").unwrap();
        assert_eq!(matched.route, "/users/{id}");
        assert_eq!(params.get("id"), Some(&"42".to_string()));
    }

    #[test]
    fn specificity_prefers_more_segments() {
        let endpoints = vec![get_endpoint("/a/{x}"), get_endpoint("/a/{x}/b")];
        let candidates = order_candidates(&endpoints, EndpointOrdering::BySpecificity);
        assert_eq!(candidates[0].route, "/a/{x}/b");
    }

    #[test]
    fn by_order_respects_explicit_order() {
        let mut first = get_endpoint("/a/{x}");
        first.order = 2;
        let mut second = get_endpoint("/a/b");
        second.order = 1;
        let endpoints = vec![first, second];
        let candidates = order_candidates(&endpoints, EndpointOrdering::ByOrder);
        assert_eq!(candidates[0].route, "/a/b");
    }

    #[test]
    fn method_match_is_case_insensitive() {
        let mut ep = get_endpoint("/x");
        ep.method = "post".to_string();
        let endpoints = vec![ep];
        let candidates = order_candidates(&endpoints, EndpointOrdering::ByOrder);
        assert!(find_match(&candidates, "POST", "/x").is_some());
    }

    #[test]
    fn inactive_endpoints_are_skipped() {
        let mut ep = get_endpoint("/x");
        ep.active = false;
        let endpoints = vec![ep];
        let candidates = order_candidates(&endpoints, EndpointOrdering::ByOrder);
        assert!(find_match(&candidates, "GET", "/x").is_none());
    }

    #[test]
    fn no_match_produces_structured_404() {
        let project = project();
        let endpoints = vec![get_endpoint("/users/{id}")];
        let cycler = SelectionCycler::new();
        let outcome = process(
            &project,
            &endpoints,
            &ctx("GET", "/nope"),
            &cycler,
            EndpointOrdering::ByOrder,
        );
        assert_eq!(outcome.status, 404);
        assert!(!outcome.matched);
        let body: serde_json::Value = serde_json::from_str(&outcome.body).unwrap();
        assert_eq!(body["project"], "shop");
        assert_eq!(body["path"], "/nope");
        assert_eq!(body["availableRoutes"][0], "GET /users/{id}");
        assert!(body["timestamp"].is_string());
    }

    #[test]
    fn matched_request_renders_body() {
        let project = project();
        let endpoints = vec![get_endpoint("/users/{id}")];
        let cycler = SelectionCycler::new();
        let outcome = process(
            &project,
            &endpoints,
            &ctx("GET", "/users/9"),
            &cycler,
            EndpointOrdering::ByOrder,
        );
        assert_eq!(outcome.status, 200);
        assert!(outcome.matched);
        assert_eq!(outcome.body, r#"{"route": "/users/9"}"#);
        assert_eq!(outcome.params.get("id"), Some(&"9".to_string()));
    }

    #[test]
    fn validation_failure_uses_first_rule_status() {
        let project = project();
        let mut ep = get_endpoint("/users");
        ep.rules = vec![
            ValidationRule {
                id: String::new(),
                parameter: "age".to_string(),
                location: crate::model::ParamLocation::Query,
                required: true,
                data_type: "integer".to_string(),
                pattern: None,
                min: None,
                max: None,
                allowed_values: None,
                error_message: None,
                status_code: 422,
                active: true,
            },
            ValidationRule {
                id: String::new(),
                parameter: "name".to_string(),
                location: crate::model::ParamLocation::Query,
                required: true,
                data_type: "string".to_string(),
                pattern: None,
                min: None,
                max: None,
                allowed_values: None,
                error_message: None,
                status_code: 400,
                active: true,
            },
        ];
        let endpoints = vec![ep];
        let cycler = SelectionCycler::new();
        let outcome = process(
            &project,
            &endpoints,
            &ctx("GET", "/users"),
            &cycler,
            EndpointOrdering::ByOrder,
        );
        assert_eq!(outcome.status, 422);
        assert!(outcome.matched);
        assert!(outcome.webhooks.is_empty());
        let body: serde_json::Value = serde_json::from_str(&outcome.body).unwrap();
        assert_eq!(body["validationErrors"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn custom_validation_template_is_used() {
        let project = project();
        let mut ep = get_endpoint("/users");
        ep.validation_error_template =
            Some(r#"{"oops": ${errorCount}, "field": "${firstField}"}"#.to_string());
        ep.rules = vec![ValidationRule {
            id: String::new(),
            parameter: "age".to_string(),
            location: crate::model::ParamLocation::Query,
            required: true,
            data_type: "string".to_string(),
            pattern: None,
            min: None,
            max: None,
            allowed_values: None,
            error_message: None,
            status_code: 400,
            active: true,
        }];
        let endpoints = vec![ep];
        let cycler = SelectionCycler::new();
        let outcome = process(
            &project,
            &endpoints,
            &ctx("GET", "/users"),
            &cycler,
            EndpointOrdering::ByOrder,
        );
        assert_eq!(outcome.body, r#"{"oops": 1, "field": "age"}"#);
    }

    #[test]
    fn cors_preflight_when_enabled() {
        let mut project = project();
        project.allow_cors = true;
        let endpoints = vec![get_endpoint("/users")];
        let cycler = SelectionCycler::new();
        let outcome = process(
            &project,
            &endpoints,
            &ctx("OPTIONS", "/users"),
            &cycler,
            EndpointOrdering::ByOrder,
        );
        assert_eq!(outcome.status, 204);
        assert!(outcome
            .headers
            .iter()
            .any(|(n, v)| n == "Access-Control-Allow-Origin" && v == "*"));
    }

    #[test]
    fn options_without_cors_is_a_regular_miss() {
        let project = project();
        let endpoints = vec![get_endpoint("/users")];
        let cycler = SelectionCycler::new();
        let outcome = process(
            &project,
            &endpoints,
            &ctx("OPTIONS", "/users"),
            &cycler,
            EndpointOrdering::ByOrder,
        );
        assert_eq!(outcome.status, 404);
    }

    #[test]
    fn delay_uses_endpoint_range_over_project_default() {
        let mut project = project();
        project.default_delay_ms = 7;
        let mut ep = get_endpoint("/x");
        assert_eq!(compute_delay(&ep, &project), 7);

        ep.min_delay_ms = Some(10);
        ep.max_delay_ms = Some(20);
        for _ in 0..10 {
            let d = compute_delay(&ep, &project);
            assert!((10..=20).contains(&d));
        }

        ep.max_delay_ms = Some(5); // degenerate range collapses to min
        assert_eq!(compute_delay(&ep, &project), 10);
    }

    #[test]
    fn jwt_gate_rejects_missing_token() {
        let mut project = project();
        project.jwt = Some(crate::model::JwtSettings {
            enabled: true,
            secret: "s3cret".to_string(),
            expires_in_secs: 3600,
        });
        let endpoints = vec![get_endpoint("/users")];
        let cycler = SelectionCycler::new();
        let outcome = process(
            &project,
            &endpoints,
            &ctx("GET", "/users"),
            &cycler,
            EndpointOrdering::ByOrder,
        );
        assert_eq!(outcome.status, 401);
    }

    #[test]
    fn jwt_gate_accepts_issued_token() {
        let settings = crate::model::JwtSettings {
            enabled: true,
            secret: "s3cret".to_string(),
            expires_in_secs: 3600,
        };
        let mut project = project();
        project.jwt = Some(settings.clone());
        let token = crate::jwt::issue(&settings, "tester");

        let mut request = ctx("GET", "/users");
        request
            .headers
            .insert("authorization".to_string(), format!("Bearer {token}"));

        let endpoints = vec![get_endpoint("/users")];
        let cycler = SelectionCycler::new();
        let outcome = process(
            &project,
            &endpoints,
            &request,
            &cycler,
            EndpointOrdering::ByOrder,
        );
        assert_eq!(outcome.status, 200);
    }

    #[test]
    fn header_templates_are_rendered() {
        let project = project();
        let mut ep = get_endpoint("/users/{id}");
        ep.responses[0]
            .headers
            .insert("X-User".to_string(), "${params.id}".to_string());
        let endpoints = vec![ep];
        let cycler = SelectionCycler::new();
        let outcome = process(
            &project,
            &endpoints,
            &ctx("GET", "/users/7"),
            &cycler,
            EndpointOrdering::ByOrder,
        );
        assert!(outcome
            .headers
            .iter()
            .any(|(n, v)| n == "X-User" && v == "7"));
        // content type comes from the response definition
        assert!(outcome
            .headers
            .iter()
            .any(|(n, v)| n == "Content-Type" && v == "application/json"));
    }

    #[test]
    fn body_snippet_truncates() {
        let long = "x".repeat(600);
        let s = snippet(&long);
        assert_eq!(s.len(), BODY_SNIPPET_LIMIT + 3);
        assert!(s.ends_with("..."));
    }
}
