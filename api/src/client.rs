use std::collections::HashMap;

use async_trait::async_trait;
use prometheus::Registry;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use common::config::ApiConfig;

use crate::metrics::RequestMetrics;
use crate::response::{Response, Validator};

/// One failed chunk fetch: transport, decode, or envelope status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("error response from server: {status}")]
    Status { status: String },
}

/// Validator-information API collaborator.
#[async_trait]
pub trait BeaconApi: Send + Sync {
    /// Fetch a single validator snapshot.
    async fn get_validator(&self, pubkey: &str) -> Result<Validator, ApiError>;
    /// Fetch a batch of validator snapshots, keyed by pubkey.
    async fn get_validators(
        &self,
        pubkeys: &[String],
    ) -> Result<HashMap<String, Validator>, ApiError>;
    /// Maximum number of pubkeys a single batched request may carry.
    fn batch_size(&self) -> usize;
    /// External request budget per minute.
    fn max_requests_per_minute(&self) -> u32;
}

pub struct HttpClient {
    http: reqwest::Client,
    endpoint: String,
    apikey: String,
    batch_size: usize,
    max_requests_per_minute: u32,
    metrics: RequestMetrics,
}

impl HttpClient {
    pub fn new(config: &ApiConfig, registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            apikey: config.apikey.clone(),
            batch_size: config.batch_size,
            max_requests_per_minute: config.max_requests_per_minute,
            metrics: RequestMetrics::new(registry)?,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<Response<T>, ApiError> {
        let url = format!("{}{}", self.endpoint, path);
        debug!(url = %url, "Requesting");

        let mut request = self.http.get(&url);
        if !self.apikey.is_empty() {
            request = request.query(&[("apikey", self.apikey.as_str())]);
        }

        let result = async {
            let response = request.send().await?.error_for_status()?;
            Ok(response.json::<Response<T>>().await?)
        }
        .await;

        self.metrics.observe("validator", result.is_ok());

        result
    }
}

#[async_trait]
impl BeaconApi for HttpClient {
    async fn get_validator(&self, pubkey: &str) -> Result<Validator, ApiError> {
        let response: Response<Validator> =
            self.fetch(&format!("/api/v1/validator/{pubkey}")).await?;

        if response.status != "OK" {
            return Err(ApiError::Status {
                status: response.status,
            });
        }

        Ok(response.data)
    }

    async fn get_validators(
        &self,
        pubkeys: &[String],
    ) -> Result<HashMap<String, Validator>, ApiError> {
        let joined = pubkeys.join(",");
        let response: Response<Option<Vec<Validator>>> =
            self.fetch(&format!("/api/v1/validator/{joined}")).await?;

        if response.status != "OK" {
            return Err(ApiError::Status {
                status: response.status,
            });
        }

        Ok(response
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|validator| (validator.pubkey.clone(), validator))
            .collect())
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn max_requests_per_minute(&self) -> u32 {
        self.max_requests_per_minute
    }
}
