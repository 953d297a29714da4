//! Registration lifecycle and the shared instance cache.
//!
//! [`DiscoveryClient::start`] blocks until this process is registered,
//! retrying every [`REGISTER_RETRY_DELAY`] for as long as it takes.  It then
//! spawns two background tasks:
//!
//! * **heartbeat** renews the lease every renewal interval.  A "not found"
//!   answer means the registry lost our record (typically a restart), so a
//!   single re-registration is attempted right away.
//! * **refresh** replaces the cached [`Applications`] snapshot every fetch
//!   interval.  A failed fetch keeps the previous snapshot.
//!
//! Shutdown is an explicit operation ([`DiscoveryClient::shutdown`]); the
//! shutdown watch task simply calls it once its trigger future resolves.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use rand::Rng;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, DEFAULT_ZONE};
use crate::error::TransportError;
use crate::transport::RegistryTransport;
use crate::types::{Applications, Instance, InstanceStatus};

/// Fixed backoff between initial registration attempts.
pub const REGISTER_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
}

pub struct DiscoveryClient {
    config: Arc<Config>,
    instance: Instance,
    endpoints: Vec<String>,
    transport: Arc<dyn RegistryTransport>,
    applications: RwLock<Arc<Applications>>,
    state: watch::Sender<RunState>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    stopping: AtomicBool,
}

impl DiscoveryClient {
    pub fn new(config: Config, transport: Arc<dyn RegistryTransport>) -> Self {
        let config = config.normalized();
        let instance = config.instance();
        let mut endpoints = config.registry_endpoints();
        if endpoints.is_empty() {
            warn!("No usable registry endpoint configured, using {}", DEFAULT_ZONE);
            endpoints.push(DEFAULT_ZONE.to_string());
        }
        let (state, _) = watch::channel(RunState::Stopped);

        Self {
            config: Arc::new(config),
            instance,
            endpoints,
            transport,
            applications: RwLock::new(Arc::new(Applications::default())),
            state,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Descriptor this process registers under.
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub fn run_state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Current snapshot of every known application.
    pub async fn applications(&self) -> Arc<Applications> {
        Arc::clone(&*self.applications.read().await)
    }

    /// Base URLs of every instance of `app`, or `None` if the application
    /// is not in the cache.
    pub async fn instance_urls(&self, app: &str) -> Option<Vec<String>> {
        let snapshot = self.applications().await;
        snapshot.get(app).map(|application| {
            application
                .instances
                .iter()
                .map(|instance| instance.base_url().to_string())
                .collect()
        })
    }

    /// Picks a registry endpoint uniformly at random.
    pub fn pick_endpoint(&self) -> &str {
        match self.endpoints.len() {
            1 => self.endpoints[0].as_str(),
            n => self.endpoints[rand::thread_rng().gen_range(0..n)].as_str(),
        }
    }

    /// Registers until it succeeds, then starts heartbeat and refresh.
    ///
    /// Returns early, without starting anything, if shutdown is requested
    /// while registration is still being retried.
    pub async fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Discovery client already started");
            return;
        }

        if !self.register_until_success().await {
            info!("Shutdown requested before registration completed");
            return;
        }

        let mut tasks = self.tasks.lock().await;
        if self.cancel.is_cancelled() {
            // Shutdown already ran without seeing Running, so the record is ours to remove.
            drop(tasks);
            info!("Shutdown requested during registration, deregistering");
            self.deregister_once().await;
            return;
        }
        self.state.send_replace(RunState::Running);
        tasks.push(tokio::spawn(Arc::clone(self).heartbeat_loop()));
        tasks.push(tokio::spawn(Arc::clone(self).refresh_loop()));
        info!(
            "Discovery client running (renew every {}s, fetch every {}s)",
            self.config.renewal_interval_secs, self.config.registry_fetch_interval_secs
        );
    }

    /// Spawns the shutdown watch: once `signal` resolves, [`shutdown`](Self::shutdown) runs.
    pub fn spawn_shutdown_watch<F>(self: &Arc<Self>, signal: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = signal => info!("Received shutdown signal, deregistering"),
                _ = client.cancel.cancelled() => {}
            }
            client.shutdown().await;
        })
    }

    /// Stops the background tasks and deregisters once, best effort.
    pub async fn shutdown(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();

        let handles = std::mem::take(&mut *self.tasks.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Background task ended abnormally: {}", e);
            }
        }

        if self.run_state() == RunState::Running {
            self.deregister_once().await;
        }
        self.state.send_replace(RunState::Stopped);
    }

    async fn deregister_once(&self) {
        match self.deregister().await {
            Ok(()) => info!("Deregistered {}", self.instance.instance_id),
            Err(e) => error!("Failed to deregister {}: {}", self.instance.instance_id, e),
        }
    }

    pub async fn register(&self) -> Result<(), TransportError> {
        self.transport
            .register(self.pick_endpoint(), &self.config.app, &self.instance)
            .await
    }

    pub async fn deregister(&self) -> Result<(), TransportError> {
        self.transport
            .unregister(
                self.pick_endpoint(),
                &self.config.app,
                &self.instance.instance_id,
            )
            .await
    }

    pub async fn heartbeat(&self) -> Result<(), TransportError> {
        self.transport
            .heartbeat(
                self.pick_endpoint(),
                &self.config.app,
                &self.instance.instance_id,
                InstanceStatus::Up,
            )
            .await
    }

    /// Fetches the full application list and swaps it into the cache.
    /// Returns the number of applications fetched.
    pub async fn refresh(&self) -> Result<usize, TransportError> {
        let fetched = self.transport.refresh(self.pick_endpoint()).await?;
        let count = fetched.len();
        *self.applications.write().await = Arc::new(fetched);
        Ok(count)
    }

    /// An attempt already in flight is always awaited, so a registration the
    /// registry accepted is never lost to a concurrent shutdown.
    async fn register_until_success(&self) -> bool {
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            match self.register().await {
                Ok(()) => {
                    info!(
                        "Registered {} as {}",
                        self.config.app, self.instance.instance_id
                    );
                    return true;
                }
                Err(e) => {
                    error!(
                        "Registration failed: {}. Retrying in {}s...",
                        e,
                        REGISTER_RETRY_DELAY.as_secs()
                    );
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                _ = sleep(REGISTER_RETRY_DELAY) => {}
            }
        }
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let period = self.config.renewal_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.heartbeat() => result,
            };

            match outcome {
                Ok(()) => debug!("Heartbeat sent for {}", self.instance.instance_id),
                Err(TransportError::NotFound) => {
                    warn!(
                        "Registry does not know {}, re-registering",
                        self.instance.instance_id
                    );
                    let attempt = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        result = self.register() => result,
                    };
                    match attempt {
                        Ok(()) => info!("Re-registered {}", self.instance.instance_id),
                        Err(e) => error!("Re-registration failed: {}", e),
                    }
                }
                Err(e) => error!("Heartbeat failed: {}", e),
            }
        }
        debug!("Heartbeat loop stopped");
    }

    async fn refresh_loop(self: Arc<Self>) {
        let mut ticker = interval(self.config.fetch_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.refresh() => result,
            };

            match outcome {
                Ok(count) => debug!("Refreshed registry cache: {} applications", count),
                Err(e) => error!("Registry refresh failed, keeping cached view: {}", e),
            }
        }
        debug!("Refresh loop stopped");
    }
}
