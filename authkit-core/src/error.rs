use thiserror::Error;

use crate::storage::StorageError;

/// Error outputs from `AuthKit`.
#[derive(Debug, Error)]
pub enum AuthKitError {
    /// The secure vault could not produce a device identity. Fatal: no
    /// authenticated request may proceed without one.
    #[error("identity_unavailable: {reason}")]
    IdentityUnavailable {
        /// Why the identity could not be established.
        reason: String,
    },
    /// A refresh was requested with no stored refresh token. The caller
    /// should fall back to a full login.
    #[error("no_refresh_token")]
    NoRefreshToken,
    /// The submitted OTP or MPIN was wrong. Recoverable: clear the input and
    /// let the user retry.
    #[error("invalid_credential: {message}")]
    InvalidCredential {
        /// Server-supplied rejection message.
        message: String,
    },
    /// A 401 that survived the single silent refresh attempt.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Server-supplied rejection message.
        message: String,
    },
    /// The backend rejected this device's fingerprint (403). Surfaced
    /// verbatim, never retried.
    #[error("device_trust_rejected: {message}")]
    DeviceTrustRejected {
        /// Server-supplied rejection message.
        message: String,
    },
    /// The backend rate-limited the request (429), or flow logic blocked a
    /// resend locally. Retry is blocked until the wait elapses.
    #[error("rate_limited: retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the caller must wait before retrying.
        retry_after_secs: u64,
    },
    /// The request conflicted with existing server state (409).
    #[error("resource_conflict: {message}")]
    ResourceConflict {
        /// Server-supplied conflict description.
        message: String,
    },
    /// The backend failed (5xx). Not retried by the transport.
    #[error("server_error: status {status}: {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Server-supplied failure message, if any.
        message: String,
    },
    /// A scanned pairing payload could not be decoded or parsed.
    #[error("malformed_payload: {reason}")]
    MalformedPayload {
        /// What failed while decoding.
        reason: String,
    },
    /// The backend declined to bind the web session.
    #[error("pairing_rejected: {message}")]
    PairingRejected {
        /// Server-supplied rejection message.
        message: String,
    },
    /// The presented input is not valid for the requested operation.
    #[error("invalid_input: {attribute}: {reason}")]
    InvalidInput {
        /// Name of the offending input.
        attribute: String,
        /// Description of the problem.
        reason: String,
    },
    /// A flow operation was invoked from the wrong state.
    #[error("invalid_state: expected {expected}, currently {actual}")]
    InvalidState {
        /// State the operation requires.
        expected: String,
        /// State the flow is actually in.
        actual: String,
    },
    /// The backend answered 2xx but reported failure in the response
    /// envelope.
    #[error("api_error: {message}")]
    Api {
        /// Server-supplied failure message.
        message: String,
    },
    /// Network connection error with details.
    #[error("network_error: {url}: {error}")]
    NetworkError {
        /// Request URL.
        url: String,
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Failure description.
        error: String,
    },
    /// HTTP request failure.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Unexpected error serializing information.
    #[error("serialization_error: {error}")]
    SerializationError {
        /// Underlying serializer message.
        error: String,
    },
    /// A storage tier failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AuthKitError {
    /// Remaps a post-refresh [`AuthKitError::Unauthorized`] into
    /// [`AuthKitError::InvalidCredential`]; used by flow operations whose
    /// 401 means "wrong code", not "expired session".
    #[must_use]
    pub fn into_credential_rejection(self) -> Self {
        match self {
            Self::Unauthorized { message } => Self::InvalidCredential { message },
            other => other,
        }
    }
}
