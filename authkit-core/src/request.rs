//! Authenticated HTTP transport.
//!
//! A single wrapper over an HTTP client shared by every flow. It attaches
//! the device identity and bearer headers to each outbound request,
//! classifies error statuses into the crate taxonomy, and performs exactly
//! one silent re-issue after a coordinator-driven token refresh on 401.
//! There is no other retry at this layer.

use std::sync::Arc;

use reqwest::header::RETRY_AFTER;
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;

use crate::api::ErrorBody;
use crate::config::Config;
use crate::error::AuthKitError;
use crate::identity::DeviceIdentityManager;
use crate::refresh::RefreshCoordinator;
use crate::storage::{keys, KeyValueStore, StoreHandle};

/// An outbound request described as data, rebuilt per attempt.
///
/// The attempt counter replaces the mutable retried-flag of interceptor
/// designs: the budget is one re-issue, enforced structurally.
#[derive(Debug, Clone)]
struct PreparedRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    attempt: u8,
}

/// The shared authenticated transport.
pub struct AuthHttp {
    client: reqwest::Client,
    config: Config,
    cache: StoreHandle,
    identity: Arc<DeviceIdentityManager>,
    coordinator: Arc<RefreshCoordinator>,
}

impl AuthHttp {
    /// Creates the transport over a shared identity manager and refresh
    /// coordinator.
    #[must_use]
    pub fn new(
        config: Config,
        cache: StoreHandle,
        identity: Arc<DeviceIdentityManager>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            cache,
            identity,
            coordinator,
        }
    }

    /// Issues a GET and deserializes the JSON response body.
    ///
    /// # Errors
    ///
    /// Returns a classified transport error; see [`AuthKitError`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AuthKitError> {
        let response = self
            .execute(PreparedRequest {
                method: Method::GET,
                path: path.to_string(),
                body: None,
                attempt: 0,
            })
            .await?;
        Self::parse_json(response).await
    }

    /// Issues a POST with a JSON body and deserializes the JSON response.
    ///
    /// # Errors
    ///
    /// Returns a classified transport error; see [`AuthKitError`].
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, AuthKitError> {
        let response = self
            .execute(PreparedRequest {
                method: Method::POST,
                path: path.to_string(),
                body: Some(body),
                attempt: 0,
            })
            .await?;
        Self::parse_json(response).await
    }

    async fn execute(&self, mut prepared: PreparedRequest) -> Result<Response, AuthKitError> {
        loop {
            let response = self.send(&prepared).await?;
            let status = response.status().as_u16();
            if response.status().is_success() {
                return Ok(response);
            }

            if status == 401 && prepared.attempt == 0 {
                prepared.attempt = 1;
                match self.coordinator.refresh_tokens().await {
                    // Re-issue once; the next send re-reads the cache and
                    // picks up the freshly persisted access token.
                    Ok(_) => continue,
                    Err(err) => {
                        log::warn!("silent refresh failed, surfacing original 401: {err}");
                        return Err(classify(response).await);
                    }
                }
            }

            return Err(classify(response).await);
        }
    }

    async fn send(&self, prepared: &PreparedRequest) -> Result<Response, AuthKitError> {
        let url = self.config.endpoint(&prepared.path);
        let identity = self.identity.cached_identity()?;

        let mut builder = self
            .client
            .request(prepared.method.clone(), &url)
            .timeout(self.config.timeout())
            .header("X-Device-ID", &identity.device_id)
            .header("X-Device-Fingerprint", &identity.fingerprint)
            .header("X-Fingerprint-Signature", &identity.signature)
            .header("User-Agent", &identity.user_agent);

        match self.cache.get(keys::ACCESS_TOKEN) {
            Ok(Some(token)) => {
                builder = builder.header("Authorization", format!("Bearer {token}"));
            }
            Ok(None) => {}
            Err(err) => log::warn!("access token read failed, sending unauthenticated: {err}"),
        }

        if let Some(body) = &prepared.body {
            builder = builder.json(body);
        }

        builder.send().await.map_err(Into::into)
    }

    async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, AuthKitError> {
        let url = response.url().to_string();
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|err| AuthKitError::SerializationError {
            error: format!("failed to parse response from {url}: {err}"),
        })
    }
}

/// Maps a non-2xx response to the crate error taxonomy, mining the error
/// body for a display message and a 429 wait hint.
async fn classify(response: Response) -> AuthKitError {
    let status = response.status().as_u16();
    let url = response.url().to_string();
    let header_retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());

    let text = response.text().await.unwrap_or_default();
    let body: Option<ErrorBody> = serde_json::from_str(&text).ok();
    let message = body
        .as_ref()
        .and_then(|body| body.message.clone())
        .unwrap_or_else(|| format!("request failed with status {status}"));

    match status {
        401 => AuthKitError::Unauthorized { message },
        403 => AuthKitError::DeviceTrustRejected { message },
        409 => AuthKitError::ResourceConflict { message },
        429 => AuthKitError::RateLimited {
            retry_after_secs: header_retry_after
                .or_else(|| body.as_ref().and_then(|body| body.retry_after))
                .unwrap_or(0),
        },
        500..=599 => AuthKitError::ServerError { status, message },
        _ => AuthKitError::NetworkError {
            url,
            status: Some(status),
            error: message,
        },
    }
}
