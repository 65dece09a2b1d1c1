//! Asynchronous outbound webhook dispatch.
//!
//! Webhook side effects are decoupled from the request path through a
//! bounded FIFO queue: the serving path enqueues one job per enabled
//! webhook on a matched request (blocking when the queue is full - explicit
//! backpressure, never a silent drop), and a single dispatch loop dequeues
//! jobs in order but detaches each into its own task, so completion
//! concurrency is unbounded and one slow target never stalls the rest.

mod dispatcher;
mod queue;

pub use dispatcher::DispatchWorker;
pub use queue::{DispatchQueue, EnqueueError, DEFAULT_QUEUE_CAPACITY};

use crate::engine::context::RequestContext;
use crate::model::WebhookDef;
use std::collections::HashMap;

/// One queued outbound call: a webhook definition paired with the captured
/// request context it renders against, plus a fresh correlation id.
#[derive(Debug, Clone)]
pub struct WebhookJob {
    pub correlation_id: String,
    pub definition: WebhookDef,
    pub context: RequestContext,
    pub params: HashMap<String, String>,
    pub project_slug: String,
}

impl WebhookJob {
    pub fn new(
        definition: WebhookDef,
        context: RequestContext,
        params: HashMap<String, String>,
        project_slug: String,
    ) -> Self {
        Self {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            definition,
            context,
            params,
            project_slug,
        }
    }
}
