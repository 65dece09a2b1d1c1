//! Runtime state of one tenant's dedicated listener.

use crate::engine::context::RequestContext;
use crate::engine::processor::{finish, process, EndpointOrdering};
use crate::engine::respond::build_response_with_headers;
use crate::engine::selection::SelectionCycler;
use crate::model::{Endpoint, HostStatus, Project};
use crate::sink::LogSink;
use crate::webhook::DispatchQueue;
use arc_swap::ArcSwap;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use parking_lot::RwLock;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Liveness endpoint registered on every dedicated listener.
pub const LIVENESS_PATH: &str = "/__mockhive/health";

/// One running (or stopped/errored) tenant listener.
///
/// The endpoint table is an immutable snapshot behind an `ArcSwap`:
/// hot-swapping endpoints replaces the whole reference, so in-flight
/// requests never observe a partially updated table.
#[derive(Debug)]
pub struct HostInstance {
    project: Project,
    pub port: u16,
    status: RwLock<HostStatus>,
    endpoints: ArcSwap<Vec<Endpoint>>,
    pub(crate) cycler: SelectionCycler,
    pub request_count: AtomicU64,
    pub error_count: AtomicU64,
    last_error: RwLock<Option<String>>,
    last_request_at: RwLock<Option<chrono::DateTime<chrono::Utc>>>,
    started_at: RwLock<Option<chrono::DateTime<chrono::Utc>>>,
    pub(crate) shutdown_tx: RwLock<Option<broadcast::Sender<()>>>,
    pub(crate) serve_handle: RwLock<Option<JoinHandle<()>>>,
}

/// Counter snapshot for status reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostStats {
    pub project_id: String,
    pub project_slug: String,
    pub port: u16,
    pub status: HostStatus,
    pub request_count: u64,
    pub error_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_request_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl HostInstance {
    pub fn new(project: Project) -> Self {
        let port = project.port;
        let endpoints = project.endpoints.clone();
        Self {
            project,
            port,
            status: RwLock::new(HostStatus::Stopped),
            endpoints: ArcSwap::from_pointee(endpoints),
            cycler: SelectionCycler::new(),
            request_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            last_error: RwLock::new(None),
            last_request_at: RwLock::new(None),
            started_at: RwLock::new(None),
            shutdown_tx: RwLock::new(None),
            serve_handle: RwLock::new(None),
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn status(&self) -> HostStatus {
        *self.status.read()
    }

    pub(crate) fn set_status(&self, status: HostStatus) {
        *self.status.write() = status;
    }

    pub(crate) fn mark_started(&self) {
        *self.started_at.write() = Some(chrono::Utc::now());
    }

    pub(crate) fn mark_stopped(&self) {
        *self.started_at.write() = None;
    }

    pub(crate) fn record_error(&self, message: impl Into<String>) {
        self.error_count.fetch_add(1, Ordering::SeqCst);
        *self.last_error.write() = Some(message.into());
    }

    fn mark_request(&self) {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        *self.last_request_at.write() = Some(chrono::Utc::now());
    }

    /// Atomically replace the endpoint table (hot swap, no restart).
    pub fn swap_endpoints(&self, endpoints: Vec<Endpoint>) {
        self.endpoints.store(Arc::new(endpoints));
    }

    pub fn endpoints(&self) -> Arc<Vec<Endpoint>> {
        self.endpoints.load_full()
    }

    pub fn stats(&self) -> HostStats {
        HostStats {
            project_id: self.project.id.clone(),
            project_slug: self.project.slug.clone(),
            port: self.port,
            status: self.status(),
            request_count: self.request_count.load(Ordering::SeqCst),
            error_count: self.error_count.load(Ordering::SeqCst),
            last_error: self.last_error.read().clone(),
            last_request_at: *self.last_request_at.read(),
            started_at: *self.started_at.read(),
        }
    }

    fn uptime_secs(&self) -> Option<i64> {
        (*self.started_at.read()).map(|started| (chrono::Utc::now() - started).num_seconds())
    }
}

/// Handle one request on a dedicated tenant listener.
pub(crate) async fn handle_host_request(
    req: Request<Incoming>,
    instance: Arc<HostInstance>,
    queue: DispatchQueue,
    sink: Arc<dyn LogSink>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let method = req.method().to_string();
    let uri = req.uri().clone();
    let path = uri.path().to_string();
    let headers = req.headers().clone();

    if path == LIVENESS_PATH {
        let body = serde_json::json!({
            "status": "ok",
            "project": instance.project().slug,
            "uptimeSecs": instance.uptime_secs(),
        });
        return Ok(build_response_with_headers(
            StatusCode::OK,
            [("Content-Type", "application/json")],
            body.to_string(),
        ));
    }

    instance.mark_request();

    let body = match req.into_body().collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            if bytes.is_empty() {
                None
            } else {
                Some(String::from_utf8_lossy(&bytes).to_string())
            }
        }
        Err(_) => None,
    };

    let ctx = RequestContext::new(&method, &path, uri.query(), &headers, body);
    let endpoints = instance.endpoints();
    let outcome = process(
        instance.project(),
        &endpoints,
        &ctx,
        &instance.cycler,
        EndpointOrdering::ByOrder,
    );
    if outcome.status >= 500 {
        instance.record_error(
            outcome
                .error_message
                .clone()
                .unwrap_or_else(|| format!("request failed with status {}", outcome.status)),
        );
    }

    Ok(finish(outcome, instance.project(), &ctx, &queue, &sink, started).await)
}
