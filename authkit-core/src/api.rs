//! Wire types for the authentication endpoints.

use serde::Deserialize;

use crate::error::AuthKitError;

/// Standard response envelope: `{ success, message?, data? }`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    /// Whether the backend accepted the operation.
    pub success: bool,
    /// Human-readable status message.
    #[serde(default)]
    pub message: Option<String>,
    /// Operation payload, present on success.
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Unwraps the payload, converting an unsuccessful envelope into
    /// [`AuthKitError::Api`].
    ///
    /// # Errors
    ///
    /// Returns an error when `success` is false or the payload is missing.
    pub fn into_data(self) -> Result<T, AuthKitError> {
        if !self.success {
            return Err(AuthKitError::Api {
                message: self
                    .message
                    .unwrap_or_else(|| "request rejected".to_string()),
            });
        }
        self.data.ok_or_else(|| AuthKitError::SerializationError {
            error: "missing data in successful response".to_string(),
        })
    }

    /// Checks `success` only, for endpoints whose payload is irrelevant.
    ///
    /// # Errors
    ///
    /// Returns [`AuthKitError::Api`] when the envelope reports failure.
    pub fn into_success(self) -> Result<(), AuthKitError> {
        if self.success {
            Ok(())
        } else {
            Err(AuthKitError::Api {
                message: self
                    .message
                    .unwrap_or_else(|| "request rejected".to_string()),
            })
        }
    }
}

/// Error body shape used by the backend on non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    /// Display message.
    #[serde(default)]
    pub message: Option<String>,
    /// Wait hint accompanying a 429.
    #[serde(default)]
    pub retry_after: Option<u64>,
}

/// `POST {prefix}/login/initiate` payload.
#[derive(Debug, Deserialize)]
pub struct LoginInitiateData {
    /// This device+fingerprint pair previously completed full verification.
    pub device_trusted: bool,
    /// An MPIN is already enrolled for this identity.
    pub has_mpin: bool,
    /// Standard-user identity, returned for already-known users.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// `POST {prefix}/login/verify-otp` payload.
#[derive(Debug, Deserialize)]
pub struct VerifyOtpData {
    /// Administrator identity, on the admin path.
    #[serde(default)]
    pub admin_id: Option<String>,
    /// Standard-user identity, on the user path.
    #[serde(default)]
    pub user_id: Option<String>,
    /// An MPIN is already enrolled for this identity.
    #[serde(default)]
    pub has_mpin: bool,
}

/// Token grant embedded in MPIN-verify and refresh responses.
#[derive(Debug, Clone, Deserialize)]
pub struct TokensDto {
    /// Bearer token attached to authenticated requests.
    pub access_token: String,
    /// Single-use token exchanged for the next pair.
    pub refresh_token: String,
    /// Access-token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Token scheme, normally `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,
}

/// `POST {prefix}/login/verify-mpin` payload.
#[derive(Debug, Deserialize)]
pub struct VerifyMpinData {
    /// The granted session tokens.
    pub tokens: TokensDto,
    /// Role context payload (admin profile), persisted verbatim.
    #[serde(default)]
    pub admin: Option<serde_json::Value>,
    /// Role context payload (user profile), persisted verbatim.
    #[serde(default)]
    pub user: Option<serde_json::Value>,
}

/// `POST /admin-auth/refresh` payload.
#[derive(Debug, Deserialize)]
pub struct RefreshData {
    /// The replacement token pair.
    pub tokens: TokensDto,
}

/// `POST {prefix}/mpin/forgot/verify` payload.
#[derive(Debug, Deserialize)]
pub struct ForgotMpinVerifyData {
    /// Administrator identity, re-announced after a reset.
    #[serde(default)]
    pub admin_id: Option<String>,
}
