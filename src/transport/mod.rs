use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{Applications, Instance, InstanceStatus};

pub mod http;
pub use http::HttpTransport;

/// Calls against a single registry endpoint.
///
/// `endpoint` is a registry base URL ending in `/`, e.g.
/// `http://localhost:8761/eureka/`.
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    /// Registers `instance` under `app`. Any 2xx answer is success.
    async fn register(
        &self,
        endpoint: &str,
        app: &str,
        instance: &Instance,
    ) -> Result<(), TransportError>;

    /// Removes the instance. Only an exact 200 is success.
    async fn unregister(
        &self,
        endpoint: &str,
        app: &str,
        instance_id: &str,
    ) -> Result<(), TransportError>;

    /// Fetches every application known to the registry.
    async fn refresh(&self, endpoint: &str) -> Result<Applications, TransportError>;

    /// Renews the lease. A 404 is reported as [`TransportError::NotFound`].
    async fn heartbeat(
        &self,
        endpoint: &str,
        app: &str,
        instance_id: &str,
        status: InstanceStatus,
    ) -> Result<(), TransportError>;
}
