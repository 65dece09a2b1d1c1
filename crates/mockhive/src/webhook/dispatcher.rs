//! The webhook dispatch loop and per-job delivery.

use super::WebhookJob;
use crate::template::{render_or_original, RenderContext};
use reqwest::Method;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Process-wide HTTP client for outbound webhook calls.
static HTTP_CLIENT: std::sync::OnceLock<reqwest::Client> = std::sync::OnceLock::new();

fn http_client() -> &'static reqwest::Client {
    HTTP_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default()
    })
}

/// The single consumer of the dispatch queue. `run` dequeues jobs in FIFO
/// order and detaches each into its own task; a job's failure is logged and
/// discarded, never retried, and never stops the loop.
pub struct DispatchWorker {
    rx: mpsc::Receiver<WebhookJob>,
}

impl DispatchWorker {
    pub(super) fn new(rx: mpsc::Receiver<WebhookJob>) -> Self {
        Self { rx }
    }

    pub async fn run(mut self) {
        while let Some(job) = self.rx.recv().await {
            tokio::spawn(async move {
                dispatch_job(job).await;
            });
        }
        debug!("webhook dispatch loop stopped: queue closed");
    }

    /// Test hook: pull one job off the queue without dispatching it.
    #[doc(hidden)]
    pub async fn recv_for_test(&mut self) -> Option<WebhookJob> {
        self.rx.recv().await
    }
}

/// Deliver one job: honor the fixed delay, render URL/body/headers against
/// the captured request context, issue the call, and log failures.
async fn dispatch_job(job: WebhookJob) {
    if job.definition.delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(job.definition.delay_ms)).await;
    }

    let render_ctx = RenderContext {
        request: &job.context,
        params: &job.params,
    };
    let url = render_or_original(&job.definition.url, &render_ctx);
    let body = render_or_original(&job.definition.body, &render_ctx);

    let method = job
        .definition
        .method
        .to_uppercase()
        .parse::<Method>()
        .unwrap_or(Method::POST);

    let mut request = http_client()
        .request(method, &url)
        .header("X-Correlation-Id", &job.correlation_id);

    let mut content_type_set = false;
    for (name, value) in &job.definition.headers {
        if name.eq_ignore_ascii_case("content-type") {
            content_type_set = true;
        }
        request = request.header(name, render_or_original(value, &render_ctx));
    }
    // Body goes out as UTF-8 text with an assumed JSON content type unless
    // the rendered headers say otherwise.
    if !body.is_empty() {
        if !content_type_set {
            request = request.header("Content-Type", "application/json");
        }
        request = request.body(body);
    }

    match request.send().await {
        Ok(response) if response.status().is_success() => {
            debug!(
                project = %job.project_slug,
                correlation_id = %job.correlation_id,
                url = %url,
                status = response.status().as_u16(),
                "webhook delivered"
            );
        }
        Ok(response) => {
            warn!(
                project = %job.project_slug,
                correlation_id = %job.correlation_id,
                url = %url,
                status = response.status().as_u16(),
                "webhook target returned non-success status"
            );
        }
        Err(e) => {
            warn!(
                project = %job.project_slug,
                correlation_id = %job.correlation_id,
                url = %url,
                "webhook delivery failed: {e}"
            );
        }
    }
}
