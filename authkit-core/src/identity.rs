//! Device identity derivation and persistence.
//!
//! The identity lives in two tiers: the vault holds the persistent device id
//! and the fingerprint seed (the only secret), the cache holds a mirror of
//! the derived, non-secret values so the transport can attach headers
//! without paying vault latency on every request.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::AuthKitError;
use crate::storage::{self, keys, KeyValueStore, StoreHandle};

/// Hex characters of the seed hash used for the device id.
const DEVICE_ID_HEX_LEN: usize = 16;

/// Platform metadata supplied by the embedding application.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    /// Hardware model name, e.g. `Pixel 8`.
    pub model: String,
    /// Hardware vendor, e.g. `Google`.
    pub brand: String,
    /// Operating system identifier, lowercase, e.g. `android`.
    pub platform: String,
    /// Operating system version string.
    pub os_version: String,
    /// Embedding application name.
    pub app_name: String,
    /// Embedding application version.
    pub app_version: String,
}

impl DeviceProfile {
    /// Renders the `User-Agent` value for this installation.
    #[must_use]
    pub fn user_agent(&self) -> String {
        format!(
            "{}/{} ({})",
            self.app_name, self.app_version, self.platform
        )
    }
}

/// The stable, derived identity of this installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Stable identifier, `authkit-{platform}-{16 hex}`.
    pub device_id: String,
    /// Signed, non-secret fingerprint document (JSON).
    pub fingerprint: String,
    /// Hex signature binding the fingerprint to the vault seed.
    pub signature: String,
    /// Rendered user agent.
    pub user_agent: String,
}

/// Fingerprint document sent as `X-Device-Fingerprint`. Non-secret by
/// design; only the seed it is derived from needs vault-grade protection.
#[derive(Debug, Serialize)]
struct FingerprintDocument<'a> {
    device_id: &'a str,
    persistent_hash: &'a str,
    device_model: &'a str,
    device_brand: &'a str,
    platform: &'a str,
    os_version: &'a str,
    app_name: &'a str,
    app_version: &'a str,
    secure_storage: &'a str,
}

/// Derives and persists the device identity across the two storage tiers.
pub struct DeviceIdentityManager {
    vault: StoreHandle,
    cache: StoreHandle,
    profile: DeviceProfile,
}

impl DeviceIdentityManager {
    /// Creates a manager over the given tiers.
    #[must_use]
    pub fn new(vault: StoreHandle, cache: StoreHandle, profile: DeviceProfile) -> Self {
        Self {
            vault,
            cache,
            profile,
        }
    }

    /// Returns the device identity, generating and persisting one if the
    /// vault holds no record. Idempotent: with an intact vault record the
    /// same id and fingerprint derivation are reproduced on every call, so
    /// the backend recognizes returning devices.
    ///
    /// # Errors
    ///
    /// Returns [`AuthKitError::IdentityUnavailable`] if the vault stays
    /// inaccessible after a retry. Callers must treat that as fatal for any
    /// authenticated operation.
    pub fn ensure_identity(&self) -> Result<DeviceIdentity, AuthKitError> {
        let stored_id = self.vault_get(keys::VAULT_DEVICE_ID)?;
        let stored_seed = self.vault_get(keys::VAULT_FINGERPRINT_SEED)?;

        let (device_id, mut seed_hex) = match (stored_id, stored_seed) {
            (Some(id), Some(seed)) if seed.len() >= 2 * DEVICE_ID_HEX_LEN => (id, seed),
            // Missing or corrupt record: fresh generation is the only option.
            _ => self.generate()?,
        };

        let fingerprint = self.render_fingerprint(&device_id, &seed_hex)?;
        let signature = sign_fingerprint(&seed_hex, &fingerprint);
        let user_agent = self.profile.user_agent();

        self.cache.set(keys::DEVICE_ID, &device_id)?;
        self.cache.set(keys::DEVICE_FINGERPRINT, &fingerprint)?;
        self.cache.set(keys::FINGERPRINT_SIGNATURE, &signature)?;
        self.cache.set(keys::USER_AGENT, &user_agent)?;

        seed_hex.zeroize();

        Ok(DeviceIdentity {
            device_id,
            fingerprint,
            signature,
            user_agent,
        })
    }

    /// Fast path for the transport: reads the cache mirror written by
    /// [`Self::ensure_identity`], falling back to the full derivation when
    /// the mirror is empty.
    ///
    /// # Errors
    ///
    /// Propagates [`AuthKitError::IdentityUnavailable`] from the fallback.
    pub fn cached_identity(&self) -> Result<DeviceIdentity, AuthKitError> {
        let mirror = self.read_mirror();
        match mirror {
            Ok(Some(identity)) => Ok(identity),
            Ok(None) => self.ensure_identity(),
            Err(err) => {
                log::warn!("identity cache read failed, rederiving: {err}");
                self.ensure_identity()
            }
        }
    }

    /// Destroys the identity in both tiers. Only invoked by the explicit
    /// "remove account from device" path.
    ///
    /// # Errors
    ///
    /// Returns the first storage failure; callers doing best-effort cleanup
    /// log it instead of propagating.
    pub fn clear(&self) -> Result<(), AuthKitError> {
        self.vault.delete(keys::VAULT_DEVICE_ID)?;
        self.vault.delete(keys::VAULT_FINGERPRINT_SEED)?;
        storage::delete_all(self.cache.as_ref(), keys::IDENTITY_MIRROR_KEYS)?;
        Ok(())
    }

    fn read_mirror(&self) -> Result<Option<DeviceIdentity>, AuthKitError> {
        let device_id = self.cache.get(keys::DEVICE_ID)?;
        let fingerprint = self.cache.get(keys::DEVICE_FINGERPRINT)?;
        let signature = self.cache.get(keys::FINGERPRINT_SIGNATURE)?;
        let user_agent = self.cache.get(keys::USER_AGENT)?;
        match (device_id, fingerprint, signature, user_agent) {
            (Some(device_id), Some(fingerprint), Some(signature), Some(user_agent)) => {
                Ok(Some(DeviceIdentity {
                    device_id,
                    fingerprint,
                    signature,
                    user_agent,
                }))
            }
            _ => Ok(None),
        }
    }

    /// Draws fresh entropy, derives the id/seed pair and persists both to
    /// the vault before returning.
    fn generate(&self) -> Result<(String, String), AuthKitError> {
        let mut entropy = [0u8; 32];
        OsRng.fill_bytes(&mut entropy);
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();

        let mut material = format!(
            "{}-{}-{}-{}-{}",
            self.profile.model,
            self.profile.brand,
            self.profile.platform,
            timestamp,
            hex::encode(entropy)
        );
        let seed_hex = hex::encode(Sha256::digest(material.as_bytes()));
        entropy.zeroize();
        material.zeroize();

        let device_id = format!(
            "authkit-{}-{}",
            self.profile.platform,
            &seed_hex[..DEVICE_ID_HEX_LEN]
        );

        self.vault_set(keys::VAULT_DEVICE_ID, &device_id)?;
        self.vault_set(keys::VAULT_FINGERPRINT_SEED, &seed_hex)?;
        log::info!("generated new device identity {device_id}");

        Ok((device_id, seed_hex))
    }

    fn render_fingerprint(
        &self,
        device_id: &str,
        seed_hex: &str,
    ) -> Result<String, AuthKitError> {
        let document = FingerprintDocument {
            device_id,
            persistent_hash: &seed_hex[DEVICE_ID_HEX_LEN..2 * DEVICE_ID_HEX_LEN],
            device_model: &self.profile.model,
            device_brand: &self.profile.brand,
            platform: &self.profile.platform,
            os_version: &self.profile.os_version,
            app_name: &self.profile.app_name,
            app_version: &self.profile.app_version,
            secure_storage: "keychain_keystore",
        };
        serde_json::to_string(&document).map_err(|err| AuthKitError::SerializationError {
            error: format!("fingerprint serialization failed: {err}"),
        })
    }

    fn vault_get(&self, key: &str) -> Result<Option<String>, AuthKitError> {
        match self.vault.get(key) {
            Ok(value) => Ok(value),
            Err(first) => {
                log::warn!("vault read of {key} failed, retrying: {first}");
                self.vault
                    .get(key)
                    .map_err(|err| AuthKitError::IdentityUnavailable {
                        reason: format!("secure vault read failed: {err}"),
                    })
            }
        }
    }

    fn vault_set(&self, key: &str, value: &str) -> Result<(), AuthKitError> {
        match self.vault.set(key, value) {
            Ok(()) => Ok(()),
            Err(first) => {
                log::warn!("vault write of {key} failed, retrying: {first}");
                self.vault
                    .set(key, value)
                    .map_err(|err| AuthKitError::IdentityUnavailable {
                        reason: format!("secure vault write failed: {err}"),
                    })
            }
        }
    }
}

fn sign_fingerprint(seed_hex: &str, fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed_hex.as_bytes());
    hasher.update(fingerprint.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::MemoryStore;

    fn test_profile() -> DeviceProfile {
        DeviceProfile {
            model: "Pixel 8".to_string(),
            brand: "Google".to_string(),
            platform: "android".to_string(),
            os_version: "14".to_string(),
            app_name: "AuthKitDemo".to_string(),
            app_version: "1.0".to_string(),
        }
    }

    fn manager() -> (DeviceIdentityManager, Arc<MemoryStore>, Arc<MemoryStore>) {
        let vault = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryStore::new());
        let vault_handle: StoreHandle = vault.clone();
        let cache_handle: StoreHandle = cache.clone();
        let manager = DeviceIdentityManager::new(vault_handle, cache_handle, test_profile());
        (manager, vault, cache)
    }

    #[test]
    fn test_ensure_identity_is_deterministic() {
        let (manager, _vault, _cache) = manager();
        let first = manager.ensure_identity().expect("first");
        let second = manager.ensure_identity().expect("second");
        assert_eq!(first.device_id, second.device_id);
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.signature, second.signature);
    }

    #[test]
    fn test_vault_clear_produces_new_identity() {
        let (manager, vault, _cache) = manager();
        let first = manager.ensure_identity().expect("first");
        vault.delete(keys::VAULT_DEVICE_ID).expect("delete");
        vault.delete(keys::VAULT_FINGERPRINT_SEED).expect("delete");
        let second = manager.ensure_identity().expect("second");
        assert_ne!(first.device_id, second.device_id);
    }

    #[test]
    fn test_identity_mirrored_into_cache() {
        let (manager, _vault, cache) = manager();
        let identity = manager.ensure_identity().expect("ensure");
        assert_eq!(
            cache.get(keys::DEVICE_ID).expect("get"),
            Some(identity.device_id.clone())
        );
        assert_eq!(
            cache.get(keys::USER_AGENT).expect("get"),
            Some("AuthKitDemo/1.0 (android)".to_string())
        );
    }

    #[test]
    fn test_cached_identity_falls_back_to_derivation() {
        let (manager, _vault, cache) = manager();
        assert!(cache.is_empty().expect("is_empty"));
        let identity = manager.cached_identity().expect("cached");
        assert!(identity.device_id.starts_with("authkit-android-"));
        // Second read hits the mirror and agrees with the derivation.
        let again = manager.cached_identity().expect("cached");
        assert_eq!(identity, again);
    }

    #[test]
    fn test_corrupt_seed_regenerates() {
        let (manager, vault, _cache) = manager();
        let first = manager.ensure_identity().expect("first");
        vault
            .set(keys::VAULT_FINGERPRINT_SEED, "short")
            .expect("set");
        let second = manager.ensure_identity().expect("second");
        assert_ne!(first.device_id, second.device_id);
    }

    #[test]
    fn test_clear_removes_both_tiers() {
        let (manager, vault, cache) = manager();
        manager.ensure_identity().expect("ensure");
        manager.clear().expect("clear");
        assert_eq!(vault.get(keys::VAULT_DEVICE_ID).expect("get"), None);
        assert_eq!(cache.get(keys::DEVICE_ID).expect("get"), None);
    }
}
