//! Canonical storage keys for both tiers.

/// Cache tier: mirrored device identifier.
pub const DEVICE_ID: &str = "device_id";
/// Cache tier: mirrored device fingerprint document.
pub const DEVICE_FINGERPRINT: &str = "device_fingerprint";
/// Cache tier: mirrored fingerprint signature.
pub const FINGERPRINT_SIGNATURE: &str = "fingerprint_signature";
/// Cache tier: rendered user agent string.
pub const USER_AGENT: &str = "user_agent";
/// Cache tier: current access token.
pub const ACCESS_TOKEN: &str = "access_token";
/// Cache tier: current refresh token.
pub const REFRESH_TOKEN: &str = "refresh_token";
/// Cache tier: administrator identity returned by OTP verification.
pub const ADMIN_ID: &str = "admin_id";
/// Cache tier: standard-user identity returned by OTP verification.
pub const USER_ID: &str = "user_id";
/// Cache tier: role context payload returned by MPIN verification.
pub const ADMIN_INFO: &str = "admin_info";
/// Cache tier: phone number without its country prefix.
pub const PHONE_NUMBER: &str = "phone_number";
/// Cache tier: country prefix for the stored phone number.
pub const COUNTRY_CODE: &str = "country_code";

/// Vault tier: persistent device identifier.
pub const VAULT_DEVICE_ID: &str = "persistent_device_id";
/// Vault tier: fingerprint seed hash. Never leaves the vault.
pub const VAULT_FINGERPRINT_SEED: &str = "persistent_fingerprint_seed";

/// Keys cleared by an ordinary logout. Credential identity and the device
/// mirror survive so a later launch can go straight to MPIN entry.
pub const SESSION_KEYS: &[&str] = &[ACCESS_TOKEN, REFRESH_TOKEN, ADMIN_INFO];

/// Keys cleared, in addition to [`SESSION_KEYS`], by a full logout.
pub const CREDENTIAL_KEYS: &[&str] = &[ADMIN_ID, USER_ID, PHONE_NUMBER, COUNTRY_CODE];

/// Cache-tier identity mirror keys, cleared when the device identity is
/// destroyed.
pub const IDENTITY_MIRROR_KEYS: &[&str] = &[
    DEVICE_ID,
    DEVICE_FINGERPRINT,
    FINGERPRINT_SIGNATURE,
    USER_AGENT,
];
