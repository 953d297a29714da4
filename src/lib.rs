//! Client-side service discovery for Eureka-style registries.
//!
//! * [`discovery::DiscoveryClient`] registers this process, keeps the lease
//!   alive and caches the registry's view of all applications.
//! * [`balancer`] picks one instance URL out of many.
//! * [`dispatch::DispatchClient`] sends HTTP requests addressed by
//!   application name to a balanced instance.

pub mod balancer;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod transport;
pub mod types;

pub use balancer::{Balance, Balancer, StrategyRegistry};
pub use config::Config;
pub use discovery::{DiscoveryClient, RunState};
pub use dispatch::{DispatchClient, DispatchResponse, RequestBuilder};
pub use error::{BalanceError, DispatchError, TransportError};
pub use transport::{HttpTransport, RegistryTransport};
pub use types::{Application, Applications, Instance, InstanceStatus};
