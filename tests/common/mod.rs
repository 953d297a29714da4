//! Scripted registry transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eureka_agent::{
    Applications, Config, DiscoveryClient, Instance, InstanceStatus, RegistryTransport,
    TransportError,
};
use serde_json::json;
use tokio::sync::oneshot;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Register,
    Unregister,
    Refresh,
    Heartbeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    NotFound,
    Status(u16),
}

impl Outcome {
    fn into_result(self) -> Result<(), TransportError> {
        match self {
            Outcome::Ok => Ok(()),
            Outcome::NotFound => Err(TransportError::NotFound),
            Outcome::Status(status) => Err(TransportError::UnexpectedStatus {
                status,
                reason: "scripted".into(),
            }),
        }
    }
}

struct Script<T> {
    queued: VecDeque<T>,
    fallback: T,
}

impl<T: Clone> Script<T> {
    fn new(fallback: T) -> Self {
        Self {
            queued: VecDeque::new(),
            fallback,
        }
    }

    fn next(&mut self) -> T {
        self.queued
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Records every call with its (virtual) time and answers from per-call scripts.
/// Once a script runs dry its fallback answer is used.
pub struct MockTransport {
    calls: Mutex<Vec<(Call, Instant, String)>>,
    register: Mutex<Script<Outcome>>,
    unregister: Mutex<Script<Outcome>>,
    heartbeat: Mutex<Script<Outcome>>,
    refresh: Mutex<Script<Option<Applications>>>,
    register_gate: Mutex<Option<Gate>>,
}

/// Holds the next register call open: `reached` fires once it has been
/// received, and it answers only after `release` fires.
struct Gate {
    reached: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            register: Mutex::new(Script::new(Outcome::Ok)),
            unregister: Mutex::new(Script::new(Outcome::Ok)),
            heartbeat: Mutex::new(Script::new(Outcome::Ok)),
            refresh: Mutex::new(Script::new(Some(Applications::default()))),
            register_gate: Mutex::new(None),
        })
    }

    pub fn script_register(&self, outcomes: &[Outcome], fallback: Outcome) {
        let mut script = self.register.lock().unwrap();
        script.queued.extend(outcomes.iter().copied());
        script.fallback = fallback;
    }

    /// Parks the next register call. Returns (reached, release).
    pub fn hold_next_register(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (reached, reached_rx) = oneshot::channel();
        let (release_tx, release) = oneshot::channel();
        *self.register_gate.lock().unwrap() = Some(Gate { reached, release });
        (reached_rx, release_tx)
    }

    pub fn script_unregister(&self, fallback: Outcome) {
        self.unregister.lock().unwrap().fallback = fallback;
    }

    pub fn script_heartbeat(&self, outcomes: &[Outcome], fallback: Outcome) {
        let mut script = self.heartbeat.lock().unwrap();
        script.queued.extend(outcomes.iter().copied());
        script.fallback = fallback;
    }

    /// `None` entries make the fetch fail.
    pub fn script_refresh(&self, outcomes: Vec<Option<Applications>>, fallback: Option<Applications>) {
        let mut script = self.refresh.lock().unwrap();
        script.queued.extend(outcomes);
        script.fallback = fallback;
    }

    pub fn calls(&self) -> Vec<(Call, Instant)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(call, at, _)| (*call, *at))
            .collect()
    }

    pub fn endpoints_used(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, endpoint)| endpoint.clone())
            .collect()
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _, _)| *c == call)
            .count()
    }

    /// Calls of the given kinds, in order.
    pub fn sequence(&self, kinds: &[Call]) -> Vec<Call> {
        self.calls()
            .into_iter()
            .map(|(call, _)| call)
            .filter(|call| kinds.contains(call))
            .collect()
    }

    fn record(&self, call: Call, endpoint: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((call, Instant::now(), endpoint.to_string()));
    }
}

#[async_trait]
impl RegistryTransport for MockTransport {
    async fn register(
        &self,
        endpoint: &str,
        _app: &str,
        _instance: &Instance,
    ) -> Result<(), TransportError> {
        self.record(Call::Register, endpoint);
        let gate = self.register_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.reached.send(());
            let _ = gate.release.await;
        }
        let outcome = self.register.lock().unwrap().next();
        outcome.into_result()
    }

    async fn unregister(
        &self,
        endpoint: &str,
        _app: &str,
        _instance_id: &str,
    ) -> Result<(), TransportError> {
        self.record(Call::Unregister, endpoint);
        let outcome = self.unregister.lock().unwrap().next();
        outcome.into_result()
    }

    async fn refresh(&self, endpoint: &str) -> Result<Applications, TransportError> {
        self.record(Call::Refresh, endpoint);
        let outcome = self.refresh.lock().unwrap().next();
        outcome.ok_or(TransportError::UnexpectedStatus {
            status: 500,
            reason: "scripted".into(),
        })
    }

    async fn heartbeat(
        &self,
        endpoint: &str,
        _app: &str,
        _instance_id: &str,
        status: InstanceStatus,
    ) -> Result<(), TransportError> {
        assert_eq!(status, InstanceStatus::Up);
        self.record(Call::Heartbeat, endpoint);
        let outcome = self.heartbeat.lock().unwrap().next();
        outcome.into_result()
    }
}

pub fn test_config() -> Config {
    Config {
        default_zone: "http://registry:8761/eureka/".into(),
        app: "orderservice".into(),
        port: 8080,
        ip_address: Some("10.0.0.9".into()),
        ..Config::default()
    }
}

pub fn client_with(transport: &Arc<MockTransport>) -> Arc<DiscoveryClient> {
    Arc::new(DiscoveryClient::new(test_config(), transport.clone()))
}

/// Builds a registry snapshot from `(application, [home urls])` pairs.
pub fn applications(apps: &[(&str, &[&str])]) -> Applications {
    let application: Vec<_> = apps
        .iter()
        .map(|(name, urls)| {
            let instance: Vec<_> = urls
                .iter()
                .enumerate()
                .map(|(i, url)| {
                    json!({
                        "instanceId": format!("{}-{}", name, i),
                        "app": name.to_uppercase(),
                        "status": "UP",
                        "homePageUrl": url,
                    })
                })
                .collect();
            json!({ "name": name.to_uppercase(), "instance": instance })
        })
        .collect();

    serde_json::from_value(json!({ "application": application })).expect("valid snapshot")
}
