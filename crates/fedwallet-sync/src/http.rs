use crate::error::{map_reqwest_error, map_status, BackendError, BackendResult, ErrorBody};
use crate::WalletBackend;
use async_trait::async_trait;
use backoff::future::retry_notify;
use backoff::ExponentialBackoff;
use fedwallet_types::{
    AttestationId, DiscoveredFederation, FederationBalance, FederationId, FederationIdentity,
};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Serialize)]
struct InviteRequest<'a> {
    invite_code: &'a str,
}

#[derive(Deserialize)]
struct BalancesResponse {
    #[serde(default)]
    balances: Vec<FederationBalance>,
}

#[derive(Deserialize)]
struct RecommendedResponse {
    recommended: bool,
}

#[derive(Deserialize)]
struct RecommendResponse {
    event_id: AttestationId,
}

/// Wallet backend reached over the wallet daemon's JSON API.
///
/// Reads are retried with exponential backoff while the daemon reports
/// itself unavailable; mutating calls are sent exactly once.
#[derive(Clone)]
pub struct HttpBackend {
    /// HTTP client
    client: Client,

    /// Base URL of the wallet daemon
    base_url: Url,

    /// Bearer token (if needed)
    auth_token: Option<String>,

    /// Retry policy for reads, `None` for a single attempt
    read_retry: Option<ExponentialBackoff>,
}

impl HttpBackend {
    /// Create a backend for the daemon at `base_url`
    pub fn new(base_url: &str) -> BackendResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BackendError::InvalidArguments(format!("Invalid backend URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::InvalidArguments(format!(
                "Backend URL {} cannot be a base",
                base_url
            )));
        }

        Ok(Self {
            client: Client::new(),
            base_url,
            auth_token: None,
            read_retry: Some(ExponentialBackoff {
                max_elapsed_time: Some(Duration::from_secs(10)),
                ..ExponentialBackoff::default()
            }),
        })
    }

    /// Add authentication token for requests
    pub fn with_auth_token(mut self, token: String) -> Self {
        self.auth_token = Some(token);
        self
    }

    /// Apply a per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> BackendResult<Self> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(self)
    }

    /// Bound read retries by total elapsed time; zero disables retries
    pub fn with_read_retry(mut self, max_elapsed: Duration) -> Self {
        self.read_retry = if max_elapsed.is_zero() {
            None
        } else {
            Some(ExponentialBackoff {
                max_elapsed_time: Some(max_elapsed),
                ..ExponentialBackoff::default()
            })
        };
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> BackendResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::Internal(format!("Backend URL {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "v1", "federations"])
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> BackendResult<Response> {
        let request = match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(map_reqwest_error)?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => Err(body.into()),
            Err(_) => {
                let message = if text.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    format!("HTTP {}: {}", status, text)
                };
                Err(map_status(status.as_u16(), message))
            }
        }
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> BackendResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Internal(format!("Malformed response: {}", e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> BackendResult<T> {
        let response = self.send(self.client.get(url)).await?;
        Self::read_json(response).await
    }

    /// Run a read, retrying transient failures under the read policy
    async fn retry_read<T, F, Fut>(&self, operation_name: &'static str, mut operation: F) -> BackendResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        let Some(policy) = self.read_retry.clone() else {
            return operation().await;
        };

        retry_notify(
            policy,
            || {
                let attempt = operation();
                async move {
                    attempt.await.map_err(|e| {
                        if e.is_transient() {
                            backoff::Error::transient(e)
                        } else {
                            backoff::Error::permanent(e)
                        }
                    })
                }
            },
            |err: BackendError, dur: Duration| {
                warn!(operation = operation_name, "Retrying after {:?} due to error: {}", dur, err);
            },
        )
        .await
    }
}

#[async_trait]
impl WalletBackend for HttpBackend {
    async fn join_federation(&self, invite_code: &str) -> BackendResult<FederationIdentity> {
        let url = self.endpoint(&["join"])?;
        debug!(%url, "Joining federation");
        let response = self
            .send(self.client.post(url).json(&InviteRequest { invite_code }))
            .await?;
        Self::read_json(response).await
    }

    async fn list_federations(&self) -> BackendResult<Vec<FederationIdentity>> {
        let url = self.endpoint(&[])?;
        self.retry_read("list_federations", || self.get_json(url.clone()))
            .await
    }

    async fn remove_federation(&self, id: &FederationId) -> BackendResult<()> {
        let url = self.endpoint(&[id.as_str()])?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn get_federation_balances(&self) -> BackendResult<Vec<FederationBalance>> {
        let url = self.endpoint(&["balances"])?;
        let response: BalancesResponse = self
            .retry_read("get_federation_balances", || self.get_json(url.clone()))
            .await?;
        Ok(response.balances)
    }

    async fn has_recommended_federation(&self, id: &FederationId) -> BackendResult<bool> {
        let url = self.endpoint(&[id.as_str(), "recommendation"])?;
        let response: RecommendedResponse = self
            .retry_read("has_recommended_federation", || self.get_json(url.clone()))
            .await?;
        Ok(response.recommended)
    }

    async fn recommend_federation(&self, invite_code: &str) -> BackendResult<AttestationId> {
        let url = self.endpoint(&["recommendations"])?;
        let response = self
            .send(self.client.post(url).json(&InviteRequest { invite_code }))
            .await?;
        let response: RecommendResponse = Self::read_json(response).await?;
        Ok(response.event_id)
    }

    async fn delete_federation_recommendation(&self, id: &FederationId) -> BackendResult<()> {
        let url = self.endpoint(&[id.as_str(), "recommendation"])?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn discover_federations(&self) -> BackendResult<Vec<DiscoveredFederation>> {
        let url = self.endpoint(&["discover"])?;
        self.retry_read("discover_federations", || self.get_json(url.clone()))
            .await
    }
}
