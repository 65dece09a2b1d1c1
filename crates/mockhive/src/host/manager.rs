//! HostManager - lifecycle management for dedicated tenant listeners.
//!
//! Start/stop/restart one isolated listener per tenant, enforcing port
//! exclusivity across running instances. Faults set that instance's state
//! to Error and record the message; the manager never auto-retries.

use super::instance::{handle_host_request, HostInstance};
use super::HostError;
use crate::model::{Endpoint, HostStatus, Project};
use crate::sink::LogSink;
use crate::webhook::DispatchQueue;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

pub struct HostManager {
    /// Instances by project id; entries persist across stop so counters and
    /// last-error survive until the next start replaces them.
    hosts: RwLock<HashMap<String, Arc<HostInstance>>>,
    queue: DispatchQueue,
    sink: Arc<dyn LogSink>,
}

impl HostManager {
    pub fn new(queue: DispatchQueue, sink: Arc<dyn LogSink>) -> Self {
        Self {
            hosts: RwLock::new(HashMap::new()),
            queue,
            sink,
        }
    }

    /// Start a dedicated listener for the project.
    ///
    /// Rejected when the project has no dedicated port, when a host for the
    /// same project is already starting/running, or when another running
    /// host claims the port. A bind failure leaves the instance in Error
    /// with the message recorded.
    pub async fn start(&self, project: Project) -> Result<Arc<HostInstance>, HostError> {
        if project.port == 0 {
            return Err(HostError::NoDedicatedPort(project.id));
        }

        let instance = {
            let mut hosts = self.hosts.write();
            if let Some(existing) = hosts.get(&project.id) {
                if matches!(existing.status(), HostStatus::Starting | HostStatus::Running) {
                    return Err(HostError::AlreadyRunning(project.id));
                }
            }
            for (id, other) in hosts.iter() {
                if *id != project.id
                    && other.port == project.port
                    && matches!(other.status(), HostStatus::Starting | HostStatus::Running)
                {
                    return Err(HostError::PortInUse(project.port));
                }
            }
            // Claim the id/port slot before releasing the lock so a
            // concurrent start sees Starting, not an empty entry.
            let instance = Arc::new(HostInstance::new(project));
            instance.set_status(HostStatus::Starting);
            hosts.insert(instance.project().id.clone(), Arc::clone(&instance));
            instance
        };

        let port = instance.port;
        let listener = match TcpListener::bind(("0.0.0.0", port)).await {
            Ok(listener) => listener,
            Err(e) => {
                instance.set_status(HostStatus::Error);
                instance.record_error(format!("bind failed: {e}"));
                return Err(HostError::Bind(port, e.to_string()));
            }
        };

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        *instance.shutdown_tx.write() = Some(shutdown_tx);

        let serve_instance = Arc::clone(&instance);
        let queue = self.queue.clone();
        let sink = Arc::clone(&self.sink);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _addr)) => {
                                let instance = Arc::clone(&serve_instance);
                                let queue = queue.clone();
                                let sink = Arc::clone(&sink);
                                tokio::spawn(async move {
                                    let io = TokioIo::new(stream);
                                    let service = service_fn(move |req| {
                                        let instance = Arc::clone(&instance);
                                        let queue = queue.clone();
                                        let sink = Arc::clone(&sink);
                                        async move {
                                            handle_host_request(req, instance, queue, sink).await
                                        }
                                    });
                                    if let Err(e) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        debug!("connection error on port {}: {}", port, e);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("accept error on port {}: {}", port, e);
                                serve_instance.record_error(format!("accept failed: {e}"));
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("host on port {} shutting down", port);
                        break;
                    }
                }
            }
        });
        *instance.serve_handle.write() = Some(handle);

        instance.set_status(HostStatus::Running);
        instance.mark_started();
        info!(
            project = %instance.project().slug,
            port,
            "host started"
        );
        Ok(instance)
    }

    /// Stop a running listener: cancel its serving loop and await shutdown.
    pub async fn stop(&self, project_id: &str) -> Result<(), HostError> {
        let instance = self
            .get(project_id)
            .ok_or_else(|| HostError::NotFound(project_id.to_string()))?;
        if instance.status() != HostStatus::Running {
            return Err(HostError::NotRunning(project_id.to_string()));
        }

        instance.set_status(HostStatus::Stopping);
        if let Some(tx) = instance.shutdown_tx.write().take() {
            let _ = tx.send(());
        }
        let handle = instance.serve_handle.write().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                instance.set_status(HostStatus::Error);
                instance.record_error(format!("serve loop join failed: {e}"));
                return Ok(());
            }
        }
        instance.set_status(HostStatus::Stopped);
        instance.mark_stopped();
        info!(project = %instance.project().slug, port = instance.port, "host stopped");
        Ok(())
    }

    /// Restart = stop (if running) then start with the given snapshot.
    pub async fn restart(&self, project: Project) -> Result<Arc<HostInstance>, HostError> {
        match self.stop(&project.id).await {
            Ok(()) | Err(HostError::NotFound(_)) | Err(HostError::NotRunning(_)) => {}
            Err(e) => return Err(e),
        }
        self.start(project).await
    }

    /// Hot-swap a running host's endpoint table without a restart.
    pub fn update_endpoints(
        &self,
        project_id: &str,
        endpoints: Vec<Endpoint>,
    ) -> Result<(), HostError> {
        let instance = self
            .get(project_id)
            .ok_or_else(|| HostError::NotFound(project_id.to_string()))?;
        instance.swap_endpoints(endpoints);
        debug!(project_id, "endpoint table hot-swapped");
        Ok(())
    }

    pub fn get(&self, project_id: &str) -> Option<Arc<HostInstance>> {
        self.hosts.read().get(project_id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<HostInstance>> {
        self.hosts.read().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.hosts.read().len()
    }

    /// Stop every running host; used on process shutdown.
    pub async fn stop_all(&self) {
        let ids: Vec<String> = {
            let hosts = self.hosts.read();
            hosts.keys().cloned().collect()
        };
        for id in ids {
            let _ = self.stop(&id).await;
        }
    }
}
