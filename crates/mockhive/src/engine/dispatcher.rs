//! Shared-listener dispatch: path-prefixed multi-tenant routing.
//!
//! The first one or two path segments select the tenant: a team slug plus
//! project slug is tried first, then the first segment alone as a personal
//! project slug, with the remaining path re-sliced accordingly. Team-first
//! precedence is authoritative when a personal slug collides with a team
//! slug (the personal interpretation is attempted only on pair-lookup
//! miss). No tenant on either attempt means the request falls through to
//! the next external handler rather than a 404 from the engine.

use crate::engine::context::RequestContext;
use crate::engine::processor::{finish, process, EndpointOrdering};
use crate::engine::respond::build_response_with_headers;
use crate::engine::selection::SelectionCycler;
use crate::model::Project;
use crate::provider::DefinitionProvider;
use crate::sink::LogSink;
use crate::webhook::DispatchQueue;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// A resolved tenant plus the path with the tenant prefix sliced off.
#[derive(Debug, Clone)]
pub struct ResolvedTenant {
    pub project: Project,
    pub remaining_path: String,
}

pub struct RoutingDispatcher {
    provider: Arc<dyn DefinitionProvider>,
    queue: DispatchQueue,
    sink: Arc<dyn LogSink>,
    /// Sequential cursors for all tenants on this listener, keyed by
    /// endpoint id (ids are unique across projects).
    cycler: SelectionCycler,
}

impl RoutingDispatcher {
    pub fn new(
        provider: Arc<dyn DefinitionProvider>,
        queue: DispatchQueue,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            provider,
            queue,
            sink,
            cycler: SelectionCycler::new(),
        }
    }

    /// Resolve the tenant from the leading path segments. Team+project is
    /// tried before the personal-slug interpretation.
    pub async fn resolve(&self, path: &str) -> Option<ResolvedTenant> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return None;
        }

        if segments.len() >= 2 {
            if let Some(project) = self.provider.by_slugs(segments[0], segments[1]).await {
                return Some(ResolvedTenant {
                    project,
                    remaining_path: reslice(&segments[2..]),
                });
            }
        }

        if let Some(project) = self.provider.by_personal_slug(segments[0]).await {
            return Some(ResolvedTenant {
                project,
                remaining_path: reslice(&segments[1..]),
            });
        }

        None
    }

    /// Run the pipeline for one shared-listener request. `None` means no
    /// tenant was resolved and the request should fall through to the next
    /// external handler.
    pub async fn dispatch(&self, req: Request<Incoming>) -> Option<Response<Full<Bytes>>> {
        let started = Instant::now();
        let method = req.method().to_string();
        let uri = req.uri().clone();

        let resolved = self.resolve(uri.path()).await?;
        debug!(
            project = %resolved.project.slug,
            path = %resolved.remaining_path,
            "tenant resolved on shared listener"
        );

        let headers = req.headers().clone();
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

        let ctx = RequestContext::new(
            &method,
            &resolved.remaining_path,
            uri.query(),
            &headers,
            body,
        );
        let outcome = process(
            &resolved.project,
            &resolved.project.endpoints,
            &ctx,
            &self.cycler,
            EndpointOrdering::BySpecificity,
        );
        Some(finish(outcome, &resolved.project, &ctx, &self.queue, &self.sink, started).await)
    }

    /// Serve the shared listener. Requests with no resolvable tenant get a
    /// minimal 404 here; embedders that chain handlers should call
    /// `dispatch`/`resolve` directly instead.
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        info!(
            "shared listener on http://{}",
            listener.local_addr()?
        );
        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let dispatcher = Arc::clone(&self);
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let dispatcher = Arc::clone(&dispatcher);
                    async move {
                        let response = match dispatcher.dispatch(req).await {
                            Some(response) => response,
                            None => build_response_with_headers(
                                StatusCode::NOT_FOUND,
                                [("Content-Type", "application/json")],
                                r#"{"error": "Unknown project"}"#,
                            ),
                        };
                        Ok::<_, std::convert::Infallible>(response)
                    }
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("shared listener connection error: {}", e);
                }
            });
        }
    }
}

fn reslice(segments: &[&str]) -> String {
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}
