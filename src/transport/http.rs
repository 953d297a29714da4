//! Registry transport over the Eureka REST API.
//!
//! | call       | request                               | success |
//! |------------|---------------------------------------|---------|
//! | register   | `POST {zone}apps/{app}`               | 2xx     |
//! | unregister | `DELETE {zone}apps/{app}/{id}`        | 200     |
//! | refresh    | `GET {zone}apps`                      | 200     |
//! | heartbeat  | `PUT {zone}apps/{app}/{id}?status=UP` | 200     |

use async_trait::async_trait;
use log::debug;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::RegistryTransport;
use crate::error::TransportError;
use crate::types::{Applications, Instance, InstanceStatus};

#[derive(Serialize)]
struct InstanceEnvelope<'a> {
    instance: &'a Instance,
}

#[derive(Deserialize)]
struct ApplicationsEnvelope {
    applications: Applications,
}

#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn unexpected(response: &Response) -> TransportError {
        let status = response.status();
        TransportError::UnexpectedStatus {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("unknown").to_string(),
        }
    }
}

#[async_trait]
impl RegistryTransport for HttpTransport {
    async fn register(
        &self,
        endpoint: &str,
        app: &str,
        instance: &Instance,
    ) -> Result<(), TransportError> {
        let url = format!("{}apps/{}", endpoint, app);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .header(ACCEPT, "application/json")
            .json(&InstanceEnvelope { instance })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::unexpected(&response));
        }
        Ok(())
    }

    async fn unregister(
        &self,
        endpoint: &str,
        app: &str,
        instance_id: &str,
    ) -> Result<(), TransportError> {
        let url = format!("{}apps/{}/{}", endpoint, app, instance_id);
        debug!("DELETE {}", url);
        let response = self.client.delete(&url).send().await?;

        if response.status() != StatusCode::OK {
            return Err(Self::unexpected(&response));
        }
        Ok(())
    }

    async fn refresh(&self, endpoint: &str) -> Result<Applications, TransportError> {
        let url = format!("{}apps", endpoint);
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Self::unexpected(&response));
        }

        let body = response.bytes().await?;
        let envelope: ApplicationsEnvelope = serde_json::from_slice(&body)?;
        Ok(envelope.applications)
    }

    async fn heartbeat(
        &self,
        endpoint: &str,
        app: &str,
        instance_id: &str,
        status: InstanceStatus,
    ) -> Result<(), TransportError> {
        let url = format!("{}apps/{}/{}", endpoint, app, instance_id);
        debug!("PUT {}", url);
        let response = self
            .client
            .put(&url)
            .query(&[("status", status.as_str())])
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(TransportError::NotFound),
            _ => Err(Self::unexpected(&response)),
        }
    }
}
