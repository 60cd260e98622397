//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use authkit_core::storage::{MemoryStore, StoreHandle};
use authkit_core::{AuthKit, Config, DeviceProfile, Role};

/// The assembled core plus concrete handles on both storage tiers, so tests
/// can seed and inspect stored state directly.
pub struct Harness {
    pub kit: AuthKit,
    pub cache: Arc<MemoryStore>,
    pub vault: Arc<MemoryStore>,
}

pub fn profile() -> DeviceProfile {
    DeviceProfile {
        model: "Pixel 8".to_string(),
        brand: "Google".to_string(),
        platform: "android".to_string(),
        os_version: "14".to_string(),
        app_name: "AuthKitDemo".to_string(),
        app_version: "1.0".to_string(),
    }
}

pub fn harness(base_url: &str, role: Role) -> Harness {
    let cache = Arc::new(MemoryStore::new());
    let vault = Arc::new(MemoryStore::new());
    let cache_handle: StoreHandle = cache.clone();
    let vault_handle: StoreHandle = vault.clone();
    let kit = AuthKit::new(
        Config::new(base_url),
        profile(),
        role,
        cache_handle,
        vault_handle,
    );
    Harness { kit, cache, vault }
}

/// Envelope body for a token grant, as the refresh and MPIN-verify
/// endpoints return it.
pub fn tokens_body(access: &str, refresh: &str) -> String {
    serde_json::json!({
        "success": true,
        "data": {
            "tokens": {
                "access_token": access,
                "refresh_token": refresh,
                "expires_in": 300,
                "token_type": "Bearer",
            }
        }
    })
    .to_string()
}
