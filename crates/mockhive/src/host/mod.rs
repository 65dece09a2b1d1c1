//! Dedicated per-tenant listener lifecycle.
//!
//! Each tenant with a nonzero configured port gets one isolated network
//! listener. Lifecycle faults are fatal to that tenant's instance only;
//! other tenants and the shared listener are unaffected.

mod instance;
mod manager;

pub use instance::{HostInstance, HostStats, LIVENESS_PATH};
pub use manager::HostManager;

/// Lifecycle errors for dedicated tenant listeners.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("project '{0}' has no dedicated port configured")]
    NoDedicatedPort(String),
    #[error("host for project '{0}' is already running")]
    AlreadyRunning(String),
    #[error("port {0} is already claimed by a running host")]
    PortInUse(u16),
    #[error("no host found for project '{0}'")]
    NotFound(String),
    #[error("host for project '{0}' is not running")]
    NotRunning(String),
    #[error("failed to bind port {0}: {1}")]
    Bind(u16, String),
}
