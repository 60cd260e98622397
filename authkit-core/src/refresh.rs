//! Token refresh coordination.
//!
//! Owns the access/refresh token lifecycle. All refresh triggers — the
//! background timer, a 401-intercepted request, another simultaneous 401 —
//! collapse into one in-flight network call through an explicit in-flight
//! flag plus a pending-waiter list. A single-use refresh token consumed
//! twice locks the account out; the collapse is the invariant everything
//! else here serves.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::{Envelope, RefreshData};
use crate::config::{Config, REFRESH_INTERVAL};
use crate::error::AuthKitError;
use crate::identity::DeviceIdentityManager;
use crate::storage::{self, keys, KeyValueStore, StoreHandle};

const REFRESH_PATH: &str = "/admin-auth/refresh";

/// Coordinator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No refresh in flight; tokens assumed valid.
    Idle,
    /// A refresh network call is in flight.
    Refreshing,
    /// The backend rejected the refresh token. Session tokens are cleared;
    /// credential identity survives so the user re-authenticates via MPIN.
    Degraded,
}

/// A freshly granted token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// Bearer token for authenticated requests.
    pub access_token: String,
    /// Single-use token for the next refresh.
    pub refresh_token: String,
}

/// Cloneable failure value so every queued waiter observes the same outcome.
#[derive(Debug, Clone)]
enum RefreshFailure {
    NoRefreshToken,
    Rejected { message: String },
    Network { message: String },
    Identity { reason: String },
    Storage { message: String },
}

impl From<RefreshFailure> for AuthKitError {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::NoRefreshToken => Self::NoRefreshToken,
            RefreshFailure::Rejected { message } => Self::Unauthorized { message },
            RefreshFailure::Network { message } => Self::NetworkError {
                url: REFRESH_PATH.to_string(),
                status: None,
                error: message,
            },
            RefreshFailure::Identity { reason } => Self::IdentityUnavailable { reason },
            RefreshFailure::Storage { message } => {
                Self::Storage(crate::storage::StorageError::Backend(message))
            }
        }
    }
}

type RefreshOutcome = Result<TokenPair, RefreshFailure>;

struct Inner {
    state: CoordinatorState,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// Process-wide owner of the token lifecycle. Constructed once and shared
/// by `Arc`; never ambient.
pub struct RefreshCoordinator {
    client: reqwest::Client,
    config: Config,
    cache: StoreHandle,
    identity: Arc<DeviceIdentityManager>,
    interval: Duration,
    inner: Mutex<Inner>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshCoordinator {
    /// Creates a coordinator with the standard proactive refresh interval.
    #[must_use]
    pub fn new(config: Config, cache: StoreHandle, identity: Arc<DeviceIdentityManager>) -> Self {
        Self::with_interval(config, cache, identity, REFRESH_INTERVAL)
    }

    /// Creates a coordinator with an explicit timer interval. Intended for
    /// tests; production code uses [`Self::new`].
    #[must_use]
    pub fn with_interval(
        config: Config,
        cache: StoreHandle,
        identity: Arc<DeviceIdentityManager>,
        interval: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            cache,
            identity,
            interval,
            inner: Mutex::new(Inner {
                state: CoordinatorState::Idle,
                waiters: Vec::new(),
            }),
            timer: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        self.lock_inner().state
    }

    /// Marks a fresh session (MPIN verify or launch validation succeeded),
    /// leaving any degraded state behind.
    pub fn session_established(&self) {
        self.lock_inner().state = CoordinatorState::Idle;
    }

    /// Exchanges the stored refresh token for a new pair.
    ///
    /// Mutual-exclusion contract: if a refresh is already in flight the
    /// caller is enqueued and receives the same eventual outcome — no
    /// duplicate network call is ever issued. On success the new pair is
    /// persisted to the cache BEFORE any waiter is released.
    ///
    /// # Errors
    ///
    /// [`AuthKitError::NoRefreshToken`] without any network call when no
    /// token is stored; [`AuthKitError::Unauthorized`] when the backend
    /// rejects the token (session tokens cleared, state degraded; never
    /// retried here — the launch logic picks the fallback destination).
    pub async fn refresh_tokens(&self) -> Result<TokenPair, AuthKitError> {
        let waiter = {
            let mut inner = self.lock_inner();
            if inner.state == CoordinatorState::Refreshing {
                let (sender, receiver) = oneshot::channel();
                inner.waiters.push(sender);
                Some(receiver)
            } else {
                inner.state = CoordinatorState::Refreshing;
                None
            }
        };

        if let Some(receiver) = waiter {
            return match receiver.await {
                Ok(outcome) => outcome.map_err(Into::into),
                Err(_) => Err(AuthKitError::NetworkError {
                    url: REFRESH_PATH.to_string(),
                    status: None,
                    error: "refresh owner dropped before settling".to_string(),
                }),
            };
        }

        let outcome = self.perform_refresh().await;

        let next_state = match &outcome {
            Ok(_) => CoordinatorState::Idle,
            Err(RefreshFailure::Rejected { .. }) => CoordinatorState::Degraded,
            // Transient failures leave the session intact; the next timer
            // tick or 401 will try again.
            Err(_) => CoordinatorState::Idle,
        };

        let waiters = {
            let mut inner = self.lock_inner();
            inner.state = next_state;
            std::mem::take(&mut inner.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }

        outcome.map_err(Into::into)
    }

    /// Starts (or restarts) the proactive background refresh. Idempotent:
    /// an existing timer is cancelled first.
    pub fn start_background_timer(self: &Arc<Self>) {
        self.stop_background_timer();

        let weak = Arc::downgrade(self);
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The zeroth tick fires immediately; the session has just been
            // granted a token, so skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                match coordinator.cache.get(keys::REFRESH_TOKEN) {
                    Ok(Some(_)) => {
                        if let Err(err) = coordinator.refresh_tokens().await {
                            log::warn!("background refresh failed: {err}");
                        }
                    }
                    Ok(None) => {}
                    Err(err) => log::warn!("background refresh skipped: {err}"),
                }
            }
        });

        *self.lock_timer() = Some(handle);
    }

    /// Cancels the background timer. Must run before tokens are cleared on
    /// logout, otherwise a scheduled tick can resurrect the session being
    /// ended.
    pub fn stop_background_timer(&self) {
        if let Some(handle) = self.lock_timer().take() {
            handle.abort();
        }
    }

    /// Whether the background timer is currently scheduled.
    #[must_use]
    pub fn timer_running(&self) -> bool {
        self.lock_timer()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    async fn perform_refresh(&self) -> RefreshOutcome {
        let refresh_token = match self.cache.get(keys::REFRESH_TOKEN) {
            Ok(Some(token)) => token,
            Ok(None) => return Err(RefreshFailure::NoRefreshToken),
            Err(err) => {
                return Err(RefreshFailure::Storage {
                    message: err.to_string(),
                })
            }
        };

        let identity =
            self.identity
                .cached_identity()
                .map_err(|err| RefreshFailure::Identity {
                    reason: err.to_string(),
                })?;

        let response = self
            .client
            .post(self.config.endpoint(REFRESH_PATH))
            .timeout(self.config.timeout())
            .header("X-Device-ID", &identity.device_id)
            .header("X-Device-Fingerprint", &identity.fingerprint)
            .header("X-Fingerprint-Signature", &identity.signature)
            .header("User-Agent", &identity.user_agent)
            .json(&json!({
                "refresh_token": refresh_token,
                "device_fingerprint": identity.fingerprint,
                "user_agent": identity.user_agent,
            }))
            .send()
            .await
            .map_err(|err| RefreshFailure::Network {
                message: err.to_string(),
            })?;

        let status = response.status().as_u16();
        if status == 401 {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "refresh token rejected".to_string());
            log::warn!("refresh token rejected, degrading session");
            if let Err(err) = storage::delete_all(self.cache.as_ref(), keys::SESSION_KEYS) {
                log::warn!("session token cleanup failed: {err}");
            }
            return Err(RefreshFailure::Rejected { message });
        }
        if !(200..300).contains(&status) {
            return Err(RefreshFailure::Network {
                message: format!("refresh failed with status {status}"),
            });
        }

        let envelope: Envelope<RefreshData> =
            response.json().await.map_err(|err| RefreshFailure::Network {
                message: format!("refresh response parse failed: {err}"),
            })?;
        let data = envelope
            .into_data()
            .map_err(|err| RefreshFailure::Network {
                message: err.to_string(),
            })?;

        let pair = TokenPair {
            access_token: data.tokens.access_token,
            refresh_token: data.tokens.refresh_token,
        };

        // Persist before any waiter can observe success.
        let persisted = self
            .cache
            .set(keys::ACCESS_TOKEN, &pair.access_token)
            .and_then(|()| self.cache.set(keys::REFRESH_TOKEN, &pair.refresh_token));
        if let Err(err) = persisted {
            return Err(RefreshFailure::Storage {
                message: err.to_string(),
            });
        }

        log::debug!("access token refreshed");
        Ok(pair)
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::DeviceProfile;
    use crate::storage::MemoryStore;

    fn coordinator() -> (Arc<RefreshCoordinator>, Arc<MemoryStore>) {
        let cache = Arc::new(MemoryStore::new());
        let vault = Arc::new(MemoryStore::new());
        let cache_handle: StoreHandle = cache.clone();
        let vault_handle: StoreHandle = vault.clone();
        let identity = Arc::new(DeviceIdentityManager::new(
            vault_handle,
            Arc::clone(&cache_handle),
            DeviceProfile {
                model: "Pixel 8".to_string(),
                brand: "Google".to_string(),
                platform: "android".to_string(),
                os_version: "14".to_string(),
                app_name: "AuthKitDemo".to_string(),
                app_version: "1.0".to_string(),
            },
        ));
        let coordinator = Arc::new(RefreshCoordinator::new(
            Config::new("http://127.0.0.1:9"),
            cache_handle,
            identity,
        ));
        (coordinator, cache)
    }

    #[tokio::test]
    async fn test_refresh_without_token_fails_fast() {
        let (coordinator, _cache) = coordinator();
        match coordinator.refresh_tokens().await {
            Err(AuthKitError::NoRefreshToken) => {}
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
    }

    #[tokio::test]
    async fn test_timer_start_is_idempotent_and_stop_cancels() {
        let (coordinator, _cache) = coordinator();
        coordinator.start_background_timer();
        assert!(coordinator.timer_running());
        coordinator.start_background_timer();
        assert!(coordinator.timer_running());
        coordinator.stop_background_timer();
        assert!(!coordinator.timer_running());
        // Stopping twice is harmless.
        coordinator.stop_background_timer();
    }
}
