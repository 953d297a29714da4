//! Outbound calls routed by application name.
//!
//! Callers address a service with a logical URL whose host is the
//! application name, e.g. `http://orderservice/api/orders?limit=10`.  The
//! dispatch client looks the application up in the discovery cache, lets a
//! per-application [`Balancer`] pick one instance, and sends the request to
//! `<instance base url><path>?<query>`.
//!
//! Nothing is retried here.  Re-sending a cloned [`RequestBuilder`] gets a
//! fresh balancer selection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::balancer::{Balance, Balancer, StrategyRegistry};
use crate::discovery::DiscoveryClient;
use crate::error::{BalanceError, DispatchError};

pub struct DispatchClient {
    discovery: Arc<DiscoveryClient>,
    strategies: StrategyRegistry,
    strategy: String,
    balancers: Mutex<HashMap<String, Balancer>>,
    http: Client,
}

impl DispatchClient {
    /// Fails if `strategy` is not registered in `strategies`.
    pub fn new(
        discovery: Arc<DiscoveryClient>,
        strategies: StrategyRegistry,
        strategy: &str,
    ) -> Result<Self, BalanceError> {
        if !strategies.contains(strategy) {
            return Err(BalanceError::UnknownStrategy(strategy.to_string()));
        }
        Ok(Self {
            discovery,
            strategies,
            strategy: strategy.to_string(),
            balancers: Mutex::new(HashMap::new()),
            http: Client::new(),
        })
    }

    /// Built-in strategies, picking the one named in the discovery config.
    pub fn from_config(discovery: Arc<DiscoveryClient>) -> Result<Self, BalanceError> {
        let strategy = discovery.config().balance_strategy.clone();
        Self::new(discovery, StrategyRegistry::default(), &strategy)
    }

    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    /// Resolves `app` to the base URL of one live instance.
    pub async fn resolve(&self, app: &str) -> Result<String, DispatchError> {
        let key = app.to_ascii_lowercase();
        let urls = self
            .discovery
            .instance_urls(&key)
            .await
            .filter(|urls| !urls.is_empty())
            .ok_or_else(|| DispatchError::UnknownApplication(app.to_string()))?;

        let balancer = self.balancer_for(&key)?;
        let picked = balancer.pick(&urls)?.to_string();
        debug!("Selected {} for {}", picked, app);
        Ok(picked)
    }

    fn balancer_for(&self, key: &str) -> Result<Balancer, BalanceError> {
        let mut balancers = self
            .balancers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(balancer) = balancers.get(key) {
            return Ok(balancer.clone());
        }
        let balancer = self.strategies.build(&self.strategy)?;
        balancers.insert(key.to_string(), balancer.clone());
        Ok(balancer)
    }

    pub fn request(&self, method: Method, logical_url: &str) -> RequestBuilder<'_> {
        RequestBuilder {
            client: self,
            method,
            logical_url: logical_url.to_string(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(&self, logical_url: &str) -> RequestBuilder<'_> {
        self.request(Method::GET, logical_url)
    }

    pub fn post(&self, logical_url: &str) -> RequestBuilder<'_> {
        self.request(Method::POST, logical_url)
    }

    pub fn put(&self, logical_url: &str) -> RequestBuilder<'_> {
        self.request(Method::PUT, logical_url)
    }

    pub fn delete(&self, logical_url: &str) -> RequestBuilder<'_> {
        self.request(Method::DELETE, logical_url)
    }
}

#[derive(Debug, Clone)]
enum Body {
    Json(Result<serde_json::Value, String>),
    Raw(Vec<u8>),
}

/// One logical call. Holds no state beyond what was set on it.
#[derive(Clone)]
pub struct RequestBuilder<'a> {
    client: &'a DispatchClient,
    method: Method,
    logical_url: String,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Option<Body>,
}

impl<'a> RequestBuilder<'a> {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn query_pairs<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        let value = serde_json::to_value(body).map_err(|e| e.to_string());
        self.body = Some(Body::Json(value));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(Body::Raw(body.into()));
        self
    }

    /// Splits the logical URL into application name and `path?query`.
    fn target(&self) -> Result<(String, String), DispatchError> {
        let logical = Url::parse(&self.logical_url)?;
        let app = logical
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| DispatchError::MissingApplication(self.logical_url.clone()))?
            .to_string();

        let mut path = logical.path().to_string();
        if let Some(query) = logical.query() {
            path.push('?');
            path.push_str(query);
        }
        Ok((app, path))
    }

    pub async fn send(&self) -> Result<DispatchResponse, DispatchError> {
        let (app, path) = self.target()?;
        let base = self.client.resolve(&app).await?;
        let url = format!("{}{}", base, path);

        let mut request = self.client.http.request(self.method.clone(), &url);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !self.query.is_empty() {
            request = request.query(&self.query);
        }
        match &self.body {
            Some(Body::Json(Ok(value))) => request = request.json(value),
            Some(Body::Json(Err(e))) => return Err(DispatchError::Encode(e.clone())),
            Some(Body::Raw(bytes)) => request = request.body(bytes.clone()),
            None => {}
        }

        debug!("{} {} (via {})", self.method, url, self.logical_url);
        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(DispatchResponse {
            url,
            status,
            headers,
            body,
        })
    }

    /// Sends the request and decodes a successful response as `T`.
    pub async fn send_json<T: DeserializeOwned>(&self) -> Result<T, DispatchError> {
        let response = self.send().await?;
        if !response.status.is_success() {
            return Err(DispatchError::Status {
                status: response.status.as_u16(),
                url: response.url,
            });
        }
        response.json()
    }
}

#[derive(Debug, Clone)]
pub struct DispatchResponse {
    /// Concrete URL the request went to.
    pub url: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl DispatchResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, DispatchError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}
