//! Integration tests for the shared multi-tenant listener and webhook
//! delivery end to end.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use mockhive::engine::dispatcher::RoutingDispatcher;
use mockhive::model::{Endpoint, Project, ResponseDef, ValidationRule, WebhookDef};
use mockhive::provider::InMemoryProvider;
use mockhive::sink::NoOpLogSink;
use mockhive::webhook::DispatchQueue;
use parking_lot::Mutex;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

fn endpoint(route: &str, method: &str, body: &str) -> Endpoint {
    Endpoint {
        id: format!("{method}-{route}"),
        route: route.to_string(),
        method: method.to_string(),
        active: true,
        responses: vec![ResponseDef {
            id: "r".to_string(),
            body: body.to_string(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

async fn spawn_shared_listener(projects: Vec<Project>) -> (u16, DispatchQueue) {
    let (queue, worker) = DispatchQueue::new();
    tokio::spawn(worker.run());
    let dispatcher = Arc::new(RoutingDispatcher::new(
        Arc::new(InMemoryProvider::new(projects)),
        queue.clone(),
        Arc::new(NoOpLogSink),
    ));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = dispatcher.run(listener).await;
    });
    (port, queue)
}

/// Tiny capture server standing in for a webhook target.
async fn spawn_capture_server() -> (u16, Arc<Mutex<Vec<(String, String, String)>>>) {
    let hits: Arc<Mutex<Vec<(String, String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server_hits = Arc::clone(&hits);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let io = TokioIo::new(stream);
            let hits = Arc::clone(&server_hits);
            tokio::spawn(async move {
                let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                    let hits = Arc::clone(&hits);
                    async move {
                        let method = req.method().to_string();
                        let correlation = req
                            .headers()
                            .get("x-correlation-id")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("")
                            .to_string();
                        let body = req
                            .into_body()
                            .collect()
                            .await
                            .map(|c| String::from_utf8_lossy(&c.to_bytes()).to_string())
                            .unwrap_or_default();
                        hits.lock().push((method, correlation, body));
                        Ok::<_, std::convert::Infallible>(hyper::Response::new(Full::new(
                            Bytes::from("ok"),
                        )))
                    }
                });
                let _ = http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });
    (port, hits)
}

#[tokio::test]
async fn shared_listener_routes_by_tenant_prefix() {
    let team_project = Project {
        id: "t1".to_string(),
        slug: "api".to_string(),
        team_slug: Some("acme".to_string()),
        endpoints: vec![endpoint("/users/{id}", "GET", r#"{"from": "team"}"#)],
        ..Default::default()
    };
    let personal = Project {
        id: "p1".to_string(),
        slug: "sandbox".to_string(),
        endpoints: vec![endpoint("/ping", "GET", r#"{"from": "personal"}"#)],
        ..Default::default()
    };
    let (port, _queue) = spawn_shared_listener(vec![team_project, personal]).await;
    let client = Client::new();
    let base = format!("http://127.0.0.1:{port}");

    let team = client
        .get(format!("{base}/acme/api/users/42"))
        .send()
        .await
        .unwrap();
    assert_eq!(team.status().as_u16(), 200);
    assert_eq!(team.text().await.unwrap(), r#"{"from": "team"}"#);

    let personal = client
        .get(format!("{base}/sandbox/ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(personal.text().await.unwrap(), r#"{"from": "personal"}"#);

    let unknown = client
        .get(format!("{base}/nobody/home"))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status().as_u16(), 404);
    assert_eq!(
        unknown.text().await.unwrap(),
        r#"{"error": "Unknown project"}"#
    );
}

#[tokio::test]
async fn validation_error_surfaces_on_shared_listener() {
    let mut ep = endpoint("/signup", "POST", "{}");
    ep.rules = vec![ValidationRule {
        id: String::new(),
        parameter: "age".to_string(),
        location: mockhive::model::ParamLocation::Query,
        required: true,
        data_type: "integer".to_string(),
        pattern: None,
        min: Some("18".to_string()),
        max: None,
        allowed_values: None,
        error_message: None,
        status_code: 400,
        active: true,
    }];
    let project = Project {
        id: "p1".to_string(),
        slug: "sandbox".to_string(),
        endpoints: vec![ep],
        ..Default::default()
    };
    let (port, _queue) = spawn_shared_listener(vec![project]).await;

    let response = Client::new()
        .post(format!("http://127.0.0.1:{port}/sandbox/signup?age=15"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Validation failed");
    assert_eq!(body["validationErrors"][0]["field"], "age");
}

#[tokio::test]
async fn webhooks_fire_with_rendered_payload_and_correlation_id() {
    let (capture_port, hits) = spawn_capture_server().await;

    let mut ep = endpoint("/orders/{id}", "POST", r#"{"accepted": true}"#);
    ep.webhooks = vec![WebhookDef {
        id: "wh1".to_string(),
        url: format!("http://127.0.0.1:{capture_port}/notify"),
        method: "POST".to_string(),
        body: r#"{"order": "${params.id}", "method": "${request.method}"}"#.to_string(),
        headers: Default::default(),
        delay_ms: 0,
        enabled: true,
    }];
    let project = Project {
        id: "p1".to_string(),
        slug: "shop".to_string(),
        endpoints: vec![ep],
        ..Default::default()
    };
    let (port, _queue) = spawn_shared_listener(vec![project]).await;

    let response = Client::new()
        .post(format!("http://127.0.0.1:{port}/shop/orders/77"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // delivery is asynchronous; poll briefly
    let mut delivered = Vec::new();
    for _ in 0..50 {
        delivered = hits.lock().clone();
        if !delivered.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(delivered.len(), 1, "webhook was not delivered");
    let (method, correlation, body) = &delivered[0];
    assert_eq!(method, "POST");
    assert!(!correlation.is_empty());
    assert_eq!(body, r#"{"order": "77", "method": "POST"}"#);
}

#[tokio::test]
async fn disabled_webhooks_do_not_fire() {
    let (capture_port, hits) = spawn_capture_server().await;

    let mut ep = endpoint("/orders", "POST", "{}");
    ep.webhooks = vec![WebhookDef {
        id: "wh1".to_string(),
        url: format!("http://127.0.0.1:{capture_port}/notify"),
        method: "POST".to_string(),
        body: String::new(),
        headers: Default::default(),
        delay_ms: 0,
        enabled: false,
    }];
    let project = Project {
        id: "p1".to_string(),
        slug: "shop".to_string(),
        endpoints: vec![ep],
        ..Default::default()
    };
    let (port, _queue) = spawn_shared_listener(vec![project]).await;

    Client::new()
        .post(format!("http://127.0.0.1:{port}/shop/orders"))
        .send()
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(hits.lock().is_empty());
}

#[tokio::test]
async fn webhook_failure_does_not_stop_later_dispatch() {
    let (capture_port, hits) = spawn_capture_server().await;

    let dead_hook = WebhookDef {
        id: "dead".to_string(),
        // unroutable target: transport error is logged and discarded
        url: "http://127.0.0.1:1/void".to_string(),
        method: "POST".to_string(),
        body: String::new(),
        headers: Default::default(),
        delay_ms: 0,
        enabled: true,
    };
    let live_hook = WebhookDef {
        id: "live".to_string(),
        url: format!("http://127.0.0.1:{capture_port}/notify"),
        method: "POST".to_string(),
        body: String::new(),
        headers: Default::default(),
        delay_ms: 0,
        enabled: true,
    };
    let mut ep = endpoint("/orders", "POST", "{}");
    ep.webhooks = vec![dead_hook, live_hook];
    let project = Project {
        id: "p1".to_string(),
        slug: "shop".to_string(),
        endpoints: vec![ep],
        ..Default::default()
    };
    let (port, _queue) = spawn_shared_listener(vec![project]).await;

    let response = Client::new()
        .post(format!("http://127.0.0.1:{port}/shop/orders"))
        .send()
        .await
        .unwrap();
    // the original response is unaffected by the failing job
    assert_eq!(response.status().as_u16(), 200);

    let mut delivered = Vec::new();
    for _ in 0..50 {
        delivered = hits.lock().clone();
        if !delivered.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(delivered.len(), 1, "surviving webhook should still deliver");
}
