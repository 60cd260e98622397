//! Endpoint configuration and protocol constants.

use std::time::Duration;

use crate::Environment;

/// Access-token lifetime granted by the backend.
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(300);

/// Proactive refresh interval. Strictly shorter than [`ACCESS_TOKEN_TTL`];
/// the 30-second margin is the minimum acceptable 10% of the token life.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(270);

/// Minimum wait between OTP send requests for the same flow.
pub const OTP_RESEND_COOLDOWN: Duration = Duration::from_secs(30);

/// Digits in a one-time passcode.
pub const OTP_LENGTH: usize = 6;

/// Digits in an MPIN.
pub const MPIN_LENGTH: usize = 6;

/// Base URL, API version prefix and transport timeout for one backend.
#[derive(Debug, Clone)]
pub struct Config {
    base_url: String,
    api_version: String,
    timeout: Duration,
}

impl Config {
    /// Canonical configuration for a deployment environment.
    #[must_use]
    pub fn for_environment(environment: &Environment) -> Self {
        let base_url = match environment {
            Environment::Staging => "https://api.staging.authkit.app",
            Environment::Production => "https://api.authkit.app",
        };
        Self::new(base_url)
    }

    /// Configuration against an explicit base URL (self-hosted backends,
    /// integration tests).
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_version: "/api/v1".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Overrides the single global request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL for an API path, e.g. `endpoint("/otp/send")`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}{path}", self.base_url, self.api_version)
    }

    /// The transport's single global request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}
