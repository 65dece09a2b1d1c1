//! Request log sink: the external log collaborator's interface.
//!
//! The engine emits one structured record per request plus a best-effort
//! real-time notification with the same summary. Storage and retrieval are
//! external concerns; the default sink writes to the tracing subscriber.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

/// One request's structured log record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub project_slug: String,
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    /// Truncated to the first 500 characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_snippet: Option<String>,
    pub status: u16,
    pub duration_ms: u64,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_route: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[async_trait]
pub trait LogSink: Send + Sync {
    /// Persist a record. Called once per request after the response is
    /// computed; must not fail the request.
    async fn record(&self, record: RequestRecord);

    /// Best-effort real-time notification; default is a no-op.
    async fn notify(&self, _record: &RequestRecord) {}
}

/// Default sink: structured fields through the tracing subscriber.
pub struct TracingLogSink;

#[async_trait]
impl LogSink for TracingLogSink {
    async fn record(&self, record: RequestRecord) {
        tracing::info!(
            project = %record.project_slug,
            method = %record.method,
            path = %record.path,
            status = record.status,
            duration_ms = record.duration_ms,
            matched = record.matched,
            route = record.matched_route.as_deref().unwrap_or("-"),
            "request"
        );
    }
}

/// Sink that drops everything; used in tests and by callers that disable
/// logging entirely.
pub struct NoOpLogSink;

#[async_trait]
impl LogSink for NoOpLogSink {
    async fn record(&self, _record: RequestRecord) {}
}
