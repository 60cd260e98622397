//! Session lifecycle: launch resolution, validation, logout.
//!
//! Encodes the launch decision the splash layer renders, and the two logout
//! depths. Ordering matters on logout: the refresh timer is stopped before
//! any token is cleared, otherwise a scheduled tick can regenerate the
//! session the user is ending.

use std::sync::Arc;

use serde_json::json;

use crate::api::Envelope;
use crate::error::AuthKitError;
use crate::flow::Role;
use crate::identity::DeviceIdentityManager;
use crate::refresh::RefreshCoordinator;
use crate::request::AuthHttp;
use crate::storage::{self, keys, KeyValueStore, StoreHandle};

/// Where the launch sequence lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchDestination {
    /// Nothing usable stored: full phone login.
    PhoneEntry,
    /// Credential identity survives but the session does not: MPIN re-entry.
    MpinEntry,
    /// Stored tokens validated; session is live.
    Authenticated,
}

/// Owns session validation and teardown for one role.
pub struct SessionManager {
    http: Arc<AuthHttp>,
    cache: StoreHandle,
    identity: Arc<DeviceIdentityManager>,
    coordinator: Arc<RefreshCoordinator>,
    role: Role,
}

impl SessionManager {
    /// Creates a session manager over the shared core components.
    #[must_use]
    pub fn new(
        http: Arc<AuthHttp>,
        cache: StoreHandle,
        identity: Arc<DeviceIdentityManager>,
        coordinator: Arc<RefreshCoordinator>,
        role: Role,
    ) -> Self {
        Self {
            http,
            cache,
            identity,
            coordinator,
            role,
        }
    }

    /// Checks the stored session against the backend. An expired access
    /// token is refreshed silently by the transport before this fails.
    ///
    /// # Errors
    ///
    /// Propagates transport errors; [`AuthKitError::Unauthorized`] means the
    /// session is gone for good.
    pub async fn validate_session(&self) -> Result<(), AuthKitError> {
        let envelope: Envelope<serde_json::Value> = self.http.get_json("/auth/validate").await?;
        envelope.into_success()
    }

    /// Resolves the app-start destination from stored state.
    ///
    /// # Errors
    ///
    /// Only storage failures propagate; network failures degrade to the
    /// stored-credential fallback.
    pub async fn resolve_launch(&self) -> Result<LaunchDestination, AuthKitError> {
        let access = self.cache.get(keys::ACCESS_TOKEN)?;
        let refresh = self.cache.get(keys::REFRESH_TOKEN)?;

        if access.is_some() && refresh.is_some() {
            match self.validate_session().await {
                Ok(()) => {
                    self.coordinator.session_established();
                    self.coordinator.start_background_timer();
                    return Ok(LaunchDestination::Authenticated);
                }
                Err(err) => {
                    // The transport already spent its one silent refresh;
                    // this session cannot be saved.
                    log::warn!("stored session rejected at launch: {err}");
                    storage::delete_all(self.cache.as_ref(), keys::SESSION_KEYS)?;
                }
            }
        }

        if self.has_stored_credential()? {
            Ok(LaunchDestination::MpinEntry)
        } else {
            Ok(LaunchDestination::PhoneEntry)
        }
    }

    /// Whether a credential identity (role id + phone number) is stored.
    ///
    /// # Errors
    ///
    /// Propagates cache read failures.
    pub fn has_stored_credential(&self) -> Result<bool, AuthKitError> {
        let id = self.cache.get(self.role.identity_key())?;
        let phone = self.cache.get(keys::PHONE_NUMBER)?;
        Ok(id.is_some() && phone.is_some())
    }

    /// The stored phone with its country prefix, for MPIN-entry display.
    ///
    /// # Errors
    ///
    /// Propagates cache read failures.
    pub fn stored_phone_for_mpin(&self) -> Result<Option<String>, AuthKitError> {
        let number = self.cache.get(keys::PHONE_NUMBER)?;
        let country = self
            .cache
            .get(keys::COUNTRY_CODE)?
            .unwrap_or_else(|| "+91".to_string());
        Ok(number.map(|number| format!("{country}{number}")))
    }

    /// Ordinary logout: ends the session but keeps the credential identity
    /// so the next launch goes straight to MPIN entry.
    ///
    /// # Errors
    ///
    /// Only storage failures propagate; the server-side revocation is best
    /// effort.
    pub async fn logout(&self) -> Result<(), AuthKitError> {
        self.coordinator.stop_background_timer();
        self.revoke_on_server().await;
        storage::delete_all(self.cache.as_ref(), keys::SESSION_KEYS)?;
        log::info!("logged out; credential identity preserved");
        Ok(())
    }

    /// Full logout: ends the session and removes the credential identity
    /// and the device identity (account switch / remove from device).
    ///
    /// # Errors
    ///
    /// Only cache storage failures propagate; vault cleanup is best effort
    /// and never blocks the logout.
    pub async fn full_logout(&self) -> Result<(), AuthKitError> {
        self.coordinator.stop_background_timer();
        self.revoke_on_server().await;
        storage::delete_all(self.cache.as_ref(), keys::SESSION_KEYS)?;
        storage::delete_all(self.cache.as_ref(), keys::CREDENTIAL_KEYS)?;
        if let Err(err) = self.identity.clear() {
            log::warn!("device identity cleanup failed: {err}");
        }
        log::info!("full logout complete; all local state cleared");
        Ok(())
    }

    /// Replaces the enrolled MPIN for the logged-in identity.
    ///
    /// # Errors
    ///
    /// [`AuthKitError::InvalidCredential`] when the current MPIN is wrong.
    pub async fn change_mpin(&self, current: &str, new: &str) -> Result<(), AuthKitError> {
        let id = self
            .cache
            .get(self.role.identity_key())?
            .ok_or_else(|| AuthKitError::InvalidInput {
                attribute: self.role.identity_key().to_string(),
                reason: "no logged-in identity".to_string(),
            })?;
        let identity = self.identity.cached_identity()?;

        let envelope: Envelope<serde_json::Value> = self
            .http
            .post_json(
                &format!("{}/mpin/change", self.role.path_prefix()),
                json!({
                    self.role.identity_key(): id,
                    "current_mpin": current,
                    "new_mpin": new,
                    "device_id": identity.device_id,
                    "device_fingerprint": identity.fingerprint,
                    "user_agent": identity.user_agent,
                }),
            )
            .await
            .map_err(AuthKitError::into_credential_rejection)?;
        envelope.into_success()
    }

    /// Best-effort server-side revocation of the refresh token.
    async fn revoke_on_server(&self) {
        let refresh_token = match self.cache.get(keys::REFRESH_TOKEN) {
            Ok(Some(token)) => token,
            Ok(None) => return,
            Err(err) => {
                log::warn!("refresh token read failed during logout: {err}");
                return;
            }
        };
        let identity = match self.identity.cached_identity() {
            Ok(identity) => identity,
            Err(err) => {
                log::warn!("identity unavailable during logout: {err}");
                return;
            }
        };
        let result: Result<Envelope<serde_json::Value>, AuthKitError> = self
            .http
            .post_json(
                &format!("{}/logout", self.role.path_prefix()),
                json!({
                    "refresh_token": refresh_token,
                    "device_fingerprint": identity.fingerprint,
                    "user_agent": identity.user_agent,
                }),
            )
            .await;
        if let Err(err) = result {
            log::warn!("server-side logout failed: {err}");
        }
    }
}
