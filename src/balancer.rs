//! Client-side instance selection.
//!
//! A [`Balancer`] picks one URL out of the candidate list for a single
//! application.  Balancers are built by name from a [`StrategyRegistry`],
//! which comes preloaded with `random` and `roundrobin` and accepts custom
//! strategies at construction time.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;

use crate::error::BalanceError;

pub const RANDOM: &str = "random";
pub const ROUND_ROBIN: &str = "roundrobin";

/// Picks one URL from a non-empty candidate list.
pub trait Balance: Send + Sync {
    fn pick<'a>(&self, urls: &'a [String]) -> Result<&'a str, BalanceError>;
}

#[derive(Debug, Default)]
pub struct RandomBalancer;

impl Balance for RandomBalancer {
    fn pick<'a>(&self, urls: &'a [String]) -> Result<&'a str, BalanceError> {
        if urls.is_empty() {
            return Err(BalanceError::EmptyCandidates);
        }
        let index = rand::thread_rng().gen_range(0..urls.len());
        Ok(&urls[index])
    }
}

/// Walks the list in order, wrapping at the end.
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    cursor: AtomicUsize,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Balance for RoundRobinBalancer {
    fn pick<'a>(&self, urls: &'a [String]) -> Result<&'a str, BalanceError> {
        let len = urls.len();
        if len == 0 {
            return Err(BalanceError::EmptyCandidates);
        }

        // A cursor past the end means the list shrank since the last pick.
        let previous = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                let current = if cursor >= len { 0 } else { cursor };
                Some((current + 1) % len)
            })
            .unwrap_or_else(|cursor| cursor);
        let index = if previous >= len { 0 } else { previous };
        Ok(&urls[index])
    }
}

/// One balancer instance. Round-robin state lives inside the value, so two
/// balancers never share a cursor.
#[derive(Clone)]
pub enum Balancer {
    Random(Arc<RandomBalancer>),
    RoundRobin(Arc<RoundRobinBalancer>),
    Custom(Arc<dyn Balance>),
}

impl Balancer {
    pub fn random() -> Self {
        Balancer::Random(Arc::new(RandomBalancer))
    }

    pub fn round_robin() -> Self {
        Balancer::RoundRobin(Arc::new(RoundRobinBalancer::new()))
    }
}

impl Balance for Balancer {
    fn pick<'a>(&self, urls: &'a [String]) -> Result<&'a str, BalanceError> {
        match self {
            Balancer::Random(b) => b.pick(urls),
            Balancer::RoundRobin(b) => b.pick(urls),
            Balancer::Custom(b) => b.pick(urls),
        }
    }
}

impl fmt::Debug for Balancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Balancer::Random(_) => f.write_str("Balancer::Random"),
            Balancer::RoundRobin(_) => f.write_str("Balancer::RoundRobin"),
            Balancer::Custom(_) => f.write_str("Balancer::Custom"),
        }
    }
}

type Factory = Arc<dyn Fn() -> Balancer + Send + Sync>;

/// Name → strategy mapping, built once and handed to whoever creates balancers.
#[derive(Clone)]
pub struct StrategyRegistry {
    factories: HashMap<String, Factory>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::empty()
            .register(RANDOM, Balancer::random)
            .register(ROUND_ROBIN, Balancer::round_robin)
    }
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Adds or replaces a strategy. Names are matched case-insensitively.
    pub fn register<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn() -> Balancer + Send + Sync + 'static,
    {
        self.factories
            .insert(name.to_ascii_lowercase(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_lowercase())
    }

    /// Builds a fresh balancer for `name`.
    pub fn build(&self, name: &str) -> Result<Balancer, BalanceError> {
        self.factories
            .get(&name.to_ascii_lowercase())
            .map(|factory| factory())
            .ok_or_else(|| BalanceError::UnknownStrategy(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}
