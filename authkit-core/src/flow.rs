//! Login flow state machine.
//!
//! Drives phone submission → device-trust check → (OTP | MPIN) →
//! MPIN-setup-or-verify → authenticated, for both user classes, plus the
//! parallel forgot-MPIN branch. Operations return the resulting
//! [`LoginState`]; the UI maps states to navigation and never the other way
//! around.

use std::time::Duration;

use std::sync::Arc;

use serde_json::json;
use tokio::time::Instant;

use crate::api::{Envelope, ForgotMpinVerifyData, LoginInitiateData, VerifyMpinData, VerifyOtpData};
use crate::config::{MPIN_LENGTH, OTP_LENGTH, OTP_RESEND_COOLDOWN};
use crate::digits::DigitEntry;
use crate::error::AuthKitError;
use crate::identity::{DeviceIdentity, DeviceIdentityManager};
use crate::refresh::RefreshCoordinator;
use crate::request::AuthHttp;
use crate::storage::{keys, KeyValueStore, StoreHandle};

/// User class driving endpoint prefixes and identity keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    /// Administrator (`/admin-auth` endpoints, `admin_id` identity).
    Admin,
    /// Standard user (`/auth` endpoints, `user_id` identity).
    User,
}

impl Role {
    pub(crate) const fn path_prefix(self) -> &'static str {
        match self {
            Self::Admin => "/admin-auth",
            Self::User => "/auth",
        }
    }

    /// Storage key — and wire field name — of the role-scoped identity.
    pub(crate) const fn identity_key(self) -> &'static str {
        match self {
            Self::Admin => keys::ADMIN_ID,
            Self::User => keys::USER_ID,
        }
    }
}

/// Resting states of the login flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum LoginState {
    /// Awaiting a phone number.
    PhoneEntry,
    /// An OTP was sent; awaiting the 6-digit code.
    Otp,
    /// First login on this identity; awaiting MPIN + confirmation.
    MpinSetup,
    /// Awaiting the enrolled MPIN.
    MpinEntry,
    /// Forgot-MPIN reset in progress; awaiting OTP + new MPIN.
    ForgotMpin,
    /// Session established; tokens held by the refresh coordinator.
    Authenticated,
}

/// The login flow state machine for one role.
pub struct LoginFlow {
    http: Arc<AuthHttp>,
    cache: StoreHandle,
    identity: Arc<DeviceIdentityManager>,
    coordinator: Arc<RefreshCoordinator>,
    role: Role,
    state: LoginState,
    /// Bumped on every transition; in-flight results captured under an older
    /// generation are discarded instead of being applied to the wrong state.
    generation: u64,
    pending_phone: Option<(String, String)>,
    otp: DigitEntry,
    mpin: DigitEntry,
    mpin_confirm: DigitEntry,
    last_otp_sent_at: Option<Instant>,
}

impl LoginFlow {
    /// Creates a flow at [`LoginState::PhoneEntry`].
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
            state: LoginState::PhoneEntry,
            generation: 0,
            pending_phone: None,
            otp: DigitEntry::new(OTP_LENGTH),
            mpin: DigitEntry::new(MPIN_LENGTH),
            mpin_confirm: DigitEntry::new(MPIN_LENGTH),
            last_otp_sent_at: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> LoginState {
        self.state
    }

    /// Role this flow authenticates.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// OTP input cells.
    pub fn otp_input(&mut self) -> &mut DigitEntry {
        &mut self.otp
    }

    /// MPIN input cells (also the new-MPIN cells during a reset).
    pub fn mpin_input(&mut self) -> &mut DigitEntry {
        &mut self.mpin
    }

    /// MPIN confirmation cells.
    pub fn mpin_confirm_input(&mut self) -> &mut DigitEntry {
        &mut self.mpin_confirm
    }

    /// Time until another OTP send is allowed. Zero when sending is allowed;
    /// a pure function of elapsed time since the last send.
    #[must_use]
    pub fn resend_available_in(&self) -> Duration {
        self.last_otp_sent_at.map_or(Duration::ZERO, |sent_at| {
            OTP_RESEND_COOLDOWN.saturating_sub(sent_at.elapsed())
        })
    }

    /// Returns the flow to phone entry, discarding any in-flight result.
    pub fn abort_to_phone_entry(&mut self) -> LoginState {
        self.pending_phone = None;
        self.transition(LoginState::PhoneEntry)
    }

    /// Submits a phone number. Trusted devices with an enrolled MPIN skip
    /// straight to [`LoginState::MpinEntry`]; everyone else is sent an OTP.
    ///
    /// # Errors
    ///
    /// Transport and envelope errors propagate verbatim.
    pub async fn submit_phone(
        &mut self,
        phone_number: &str,
        country_code: &str,
    ) -> Result<LoginState, AuthKitError> {
        self.require_state(LoginState::PhoneEntry)?;
        let generation = self.generation;
        let (clean, full) = split_phone(phone_number, country_code);
        let identity = self.identity.cached_identity()?;

        let envelope: Envelope<LoginInitiateData> = self
            .http
            .post_json(
                &format!("{}/login/initiate", self.role.path_prefix()),
                json!({
                    "phone_number": full,
                    "device_id": identity.device_id,
                    "device_fingerprint": identity.fingerprint,
                    "user_agent": identity.user_agent,
                }),
            )
            .await?;
        let data = envelope.into_data()?;
        if self.is_stale(generation) {
            return Ok(self.state);
        }

        self.pending_phone = Some((clean, country_code.to_string()));
        if let Some(user_id) = &data.user_id {
            self.cache.set(keys::USER_ID, user_id)?;
        }

        if data.device_trusted && data.has_mpin {
            // Known device, enrolled MPIN: the OTP leg is skipped entirely.
            return Ok(self.transition(LoginState::MpinEntry));
        }

        self.send_otp(&full, "login", &identity).await?;
        if self.is_stale(generation) {
            return Ok(self.state);
        }
        self.last_otp_sent_at = Some(Instant::now());
        Ok(self.transition(LoginState::Otp))
    }

    /// Re-sends the OTP for the current flow leg. Rejected locally, without
    /// any transport call, while the cooldown since the last send runs.
    ///
    /// # Errors
    ///
    /// [`AuthKitError::RateLimited`] during the cooldown.
    pub async fn resend_otp(&mut self) -> Result<(), AuthKitError> {
        if !matches!(self.state, LoginState::Otp | LoginState::ForgotMpin) {
            return Err(self.wrong_state("otp or forgot_mpin"));
        }
        let remaining = self.resend_available_in();
        if remaining > Duration::ZERO {
            return Err(AuthKitError::RateLimited {
                retry_after_secs: ceil_secs(remaining),
            });
        }

        let purpose = if self.state == LoginState::Otp {
            "login"
        } else {
            "forgot_mpin"
        };
        let full = self.current_full_phone()?;
        let identity = self.identity.cached_identity()?;
        self.send_otp(&full, purpose, &identity).await?;
        self.last_otp_sent_at = Some(Instant::now());
        Ok(())
    }

    /// Verifies the entered OTP; on success the role-scoped identity and
    /// phone number are persisted (credential identity is born here).
    ///
    /// # Errors
    ///
    /// [`AuthKitError::InvalidCredential`] on a wrong code (input cells are
    /// cleared); [`AuthKitError::InvalidInput`] when fewer than 6 digits are
    /// entered.
    pub async fn verify_otp(&mut self) -> Result<LoginState, AuthKitError> {
        self.require_state(LoginState::Otp)?;
        let generation = self.generation;
        let otp = self.otp.value().ok_or_else(|| AuthKitError::InvalidInput {
            attribute: "otp".to_string(),
            reason: format!("{OTP_LENGTH} digits required"),
        })?;
        let full = self.current_full_phone()?;
        let identity = self.identity.cached_identity()?;

        let data = match self
            .http
            .post_json::<Envelope<VerifyOtpData>>(
                &format!("{}/login/verify-otp", self.role.path_prefix()),
                json!({
                    "phone_number": full,
                    "otp": otp,
                    "device_id": identity.device_id,
                    "device_fingerprint": identity.fingerprint,
                    "user_agent": identity.user_agent,
                }),
            )
            .await
            .map_err(AuthKitError::into_credential_rejection)
            .and_then(Envelope::into_data)
        {
            Ok(data) => data,
            Err(err) => return Err(self.reject_code_entry(err)),
        };
        if self.is_stale(generation) {
            return Ok(self.state);
        }

        let role_id = match self.role {
            Role::Admin => data.admin_id,
            Role::User => data.user_id,
        };
        if let Some(id) = role_id {
            self.cache.set(self.role.identity_key(), &id)?;
        }
        if let Some((clean, country)) = &self.pending_phone {
            self.cache.set(keys::PHONE_NUMBER, clean)?;
            self.cache.set(keys::COUNTRY_CODE, country)?;
        }

        if data.has_mpin {
            Ok(self.transition(LoginState::MpinEntry))
        } else {
            Ok(self.transition(LoginState::MpinSetup))
        }
    }

    /// Enrolls a new MPIN, then immediately verifies it — setup alone does
    /// not establish a session.
    ///
    /// # Errors
    ///
    /// [`AuthKitError::InvalidInput`] when the two entries differ or are
    /// incomplete, before any network call.
    pub async fn setup_mpin(&mut self) -> Result<LoginState, AuthKitError> {
        self.require_state(LoginState::MpinSetup)?;
        let mpin = self.mpin.value().ok_or_else(|| AuthKitError::InvalidInput {
            attribute: "mpin".to_string(),
            reason: format!("{MPIN_LENGTH} digits required"),
        })?;
        let confirm = self
            .mpin_confirm
            .value()
            .ok_or_else(|| AuthKitError::InvalidInput {
                attribute: "mpin_confirm".to_string(),
                reason: format!("{MPIN_LENGTH} digits required"),
            })?;
        if mpin != confirm {
            return Err(AuthKitError::InvalidInput {
                attribute: "mpin_confirm".to_string(),
                reason: "entries do not match".to_string(),
            });
        }

        let generation = self.generation;
        let id = self.stored_role_id()?;
        let identity = self.identity.cached_identity()?;

        let envelope: Envelope<serde_json::Value> = self
            .http
            .post_json(
                &format!("{}/mpin/setup", self.role.path_prefix()),
                json!({
                    self.role.identity_key(): id,
                    "mpin": mpin,
                    "device_id": identity.device_id,
                    "device_fingerprint": identity.fingerprint,
                    "user_agent": identity.user_agent,
                }),
            )
            .await?;
        envelope.into_success()?;
        if self.is_stale(generation) {
            return Ok(self.state);
        }

        self.transition(LoginState::MpinEntry);
        self.verify_mpin_value(&mpin).await
    }

    /// Verifies the entered MPIN and establishes the session.
    ///
    /// # Errors
    ///
    /// [`AuthKitError::InvalidCredential`] on a wrong MPIN — all six cells
    /// are cleared and focus returns to the first.
    pub async fn verify_mpin(&mut self) -> Result<LoginState, AuthKitError> {
        self.require_state(LoginState::MpinEntry)?;
        let mpin = self.mpin.value().ok_or_else(|| AuthKitError::InvalidInput {
            attribute: "mpin".to_string(),
            reason: format!("{MPIN_LENGTH} digits required"),
        })?;
        self.verify_mpin_value(&mpin).await
    }

    /// Starts the forgot-MPIN branch by requesting a reset OTP.
    ///
    /// # Errors
    ///
    /// [`AuthKitError::RateLimited`] with the server's wait hint when the
    /// backend throttles reset requests.
    pub async fn forgot_mpin_initiate(
        &mut self,
        phone_number: &str,
        country_code: &str,
    ) -> Result<LoginState, AuthKitError> {
        self.require_state(LoginState::MpinEntry)?;
        let generation = self.generation;
        let (clean, full) = split_phone(phone_number, country_code);
        let identity = self.identity.cached_identity()?;

        let envelope: Envelope<serde_json::Value> = self
            .http
            .post_json(
                &format!("{}/mpin/forgot", self.role.path_prefix()),
                json!({
                    "phone_number": full,
                    "device_id": identity.device_id,
                    "device_fingerprint": identity.fingerprint,
                    "user_agent": identity.user_agent,
                }),
            )
            .await?;
        envelope.into_success()?;
        if self.is_stale(generation) {
            return Ok(self.state);
        }

        self.pending_phone = Some((clean, country_code.to_string()));
        self.last_otp_sent_at = Some(Instant::now());
        Ok(self.transition(LoginState::ForgotMpin))
    }

    /// Completes the reset: validates OTP + new MPIN locally, calls the
    /// reset endpoint and returns the flow to MPIN entry.
    ///
    /// # Errors
    ///
    /// [`AuthKitError::InvalidInput`] on incomplete or mismatched entries;
    /// [`AuthKitError::InvalidCredential`] when the backend rejects the OTP.
    pub async fn forgot_mpin_verify(&mut self) -> Result<LoginState, AuthKitError> {
        self.require_state(LoginState::ForgotMpin)?;
        let otp = self.otp.value().ok_or_else(|| AuthKitError::InvalidInput {
            attribute: "otp".to_string(),
            reason: format!("{OTP_LENGTH} digits required"),
        })?;
        let new_mpin = self.mpin.value().ok_or_else(|| AuthKitError::InvalidInput {
            attribute: "new_mpin".to_string(),
            reason: format!("{MPIN_LENGTH} digits required"),
        })?;
        let confirm = self
            .mpin_confirm
            .value()
            .ok_or_else(|| AuthKitError::InvalidInput {
                attribute: "new_mpin_confirm".to_string(),
                reason: format!("{MPIN_LENGTH} digits required"),
            })?;
        if new_mpin != confirm {
            return Err(AuthKitError::InvalidInput {
                attribute: "new_mpin_confirm".to_string(),
                reason: "entries do not match".to_string(),
            });
        }

        let generation = self.generation;
        let full = self.current_full_phone()?;
        let identity = self.identity.cached_identity()?;

        let data = match self
            .http
            .post_json::<Envelope<ForgotMpinVerifyData>>(
                &format!("{}/mpin/forgot/verify", self.role.path_prefix()),
                json!({
                    "phone_number": full,
                    "otp_code": otp,
                    "new_mpin": new_mpin,
                    "device_id": identity.device_id,
                    "device_fingerprint": identity.fingerprint,
                    "user_agent": identity.user_agent,
                }),
            )
            .await
            .map_err(AuthKitError::into_credential_rejection)
            .and_then(Envelope::into_data)
        {
            Ok(data) => data,
            Err(err) => return Err(self.reject_code_entry(err)),
        };
        if self.is_stale(generation) {
            return Ok(self.state);
        }

        if let Some(admin_id) = &data.admin_id {
            self.cache.set(self.role.identity_key(), admin_id)?;
        }
        Ok(self.transition(LoginState::MpinEntry))
    }

    async fn verify_mpin_value(&mut self, mpin: &str) -> Result<LoginState, AuthKitError> {
        let generation = self.generation;
        let id = self.stored_role_id()?;
        let identity = self.identity.cached_identity()?;

        let data = match self
            .http
            .post_json::<Envelope<VerifyMpinData>>(
                &format!("{}/login/verify-mpin", self.role.path_prefix()),
                json!({
                    self.role.identity_key(): id,
                    "mpin": mpin,
                    "device_id": identity.device_id,
                    "device_fingerprint": identity.fingerprint,
                    "user_agent": identity.user_agent,
                }),
            )
            .await
            .map_err(AuthKitError::into_credential_rejection)
            .and_then(Envelope::into_data)
        {
            Ok(data) => data,
            Err(err) => return Err(self.reject_code_entry(err)),
        };
        if self.is_stale(generation) {
            return Ok(self.state);
        }

        self.cache.set(keys::ACCESS_TOKEN, &data.tokens.access_token)?;
        self.cache
            .set(keys::REFRESH_TOKEN, &data.tokens.refresh_token)?;
        if let Some(context) = data.admin.as_ref().or(data.user.as_ref()) {
            self.cache.set(keys::ADMIN_INFO, &context.to_string())?;
        }

        self.coordinator.session_established();
        self.coordinator.start_background_timer();
        log::info!("session established for role {}", self.role);
        Ok(self.transition(LoginState::Authenticated))
    }

    async fn send_otp(
        &self,
        full_phone: &str,
        purpose: &str,
        identity: &DeviceIdentity,
    ) -> Result<(), AuthKitError> {
        let envelope: Envelope<serde_json::Value> = self
            .http
            .post_json(
                "/otp/send",
                json!({
                    "phone_number": full_phone,
                    "purpose": purpose,
                    "device_id": identity.device_id,
                    "device_fingerprint": identity.fingerprint,
                    "user_agent": identity.user_agent,
                }),
            )
            .await?;
        envelope.into_success()
    }

    /// Clears the code entry that was just rejected, so no partial state is
    /// left behind, and passes the rejection through.
    fn reject_code_entry(&mut self, err: AuthKitError) -> AuthKitError {
        if matches!(
            err,
            AuthKitError::InvalidCredential { .. } | AuthKitError::Api { .. }
        ) {
            match self.state {
                LoginState::Otp => self.otp.reset(),
                LoginState::MpinEntry => self.mpin.reset(),
                LoginState::ForgotMpin => {
                    self.otp.reset();
                    self.mpin.reset();
                    self.mpin_confirm.reset();
                }
                _ => {}
            }
        }
        err
    }

    fn stored_role_id(&self) -> Result<String, AuthKitError> {
        self.cache
            .get(self.role.identity_key())?
            .ok_or_else(|| AuthKitError::InvalidInput {
                attribute: self.role.identity_key().to_string(),
                reason: "OTP verification must complete first".to_string(),
            })
    }

    fn current_full_phone(&self) -> Result<String, AuthKitError> {
        if let Some((clean, country)) = &self.pending_phone {
            return Ok(format!("{country}{clean}"));
        }
        let number = self.cache.get(keys::PHONE_NUMBER)?;
        let country = self
            .cache
            .get(keys::COUNTRY_CODE)?
            .unwrap_or_else(|| "+91".to_string());
        number
            .map(|number| format!("{country}{number}"))
            .ok_or_else(|| AuthKitError::InvalidInput {
                attribute: "phone_number".to_string(),
                reason: "no phone number available".to_string(),
            })
    }

    fn require_state(&self, expected: LoginState) -> Result<(), AuthKitError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.wrong_state(&expected.to_string()))
        }
    }

    fn wrong_state(&self, expected: &str) -> AuthKitError {
        AuthKitError::InvalidState {
            expected: expected.to_string(),
            actual: self.state.to_string(),
        }
    }

    fn is_stale(&self, generation: u64) -> bool {
        if self.generation == generation {
            return false;
        }
        log::debug!("discarding in-flight result from superseded flow state");
        true
    }

    fn transition(&mut self, next: LoginState) -> LoginState {
        log::debug!("login flow: {} -> {next}", self.state);
        self.state = next;
        self.generation += 1;
        match next {
            LoginState::Otp => self.otp.reset(),
            LoginState::MpinEntry => self.mpin.reset(),
            LoginState::MpinSetup => {
                self.mpin.reset();
                self.mpin_confirm.reset();
            }
            LoginState::ForgotMpin => {
                self.otp.reset();
                self.mpin.reset();
                self.mpin_confirm.reset();
            }
            LoginState::PhoneEntry | LoginState::Authenticated => {}
        }
        next
    }
}

fn split_phone(number: &str, country: &str) -> (String, String) {
    if let Some(rest) = number.strip_prefix(country) {
        (rest.to_string(), number.to_string())
    } else if number.starts_with('+') {
        // Unknown prefix: the country code is treated as opaque, pass
        // through untouched.
        (number.to_string(), number.to_string())
    } else {
        (number.to_string(), format!("{country}{number}"))
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}
