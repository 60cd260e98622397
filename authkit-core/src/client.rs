//! Composition root.
//!
//! Wires the storage tiers, identity manager, refresh coordinator and
//! transport together in the one valid order and hands out the flow and
//! session entry points. Embedders construct exactly one of these per
//! process.

use std::sync::Arc;

use crate::config::Config;
use crate::flow::{LoginFlow, Role};
use crate::identity::{DeviceIdentityManager, DeviceProfile};
use crate::pairing::PairingHandler;
use crate::refresh::RefreshCoordinator;
use crate::request::AuthHttp;
use crate::session::SessionManager;
use crate::storage::StoreHandle;
use crate::Environment;

/// The assembled authentication core.
pub struct AuthKit {
    config: Config,
    identity: Arc<DeviceIdentityManager>,
    coordinator: Arc<RefreshCoordinator>,
    http: Arc<AuthHttp>,
    session: SessionManager,
    pairing: PairingHandler,
    cache: StoreHandle,
    role: Role,
}

impl AuthKit {
    /// Assembles the core over embedder-provided storage tiers.
    #[must_use]
    pub fn new(
        config: Config,
        profile: DeviceProfile,
        role: Role,
        cache: StoreHandle,
        vault: StoreHandle,
    ) -> Self {
        let identity = Arc::new(DeviceIdentityManager::new(
            vault,
            Arc::clone(&cache),
            profile,
        ));
        let coordinator = Arc::new(RefreshCoordinator::new(
            config.clone(),
            Arc::clone(&cache),
            Arc::clone(&identity),
        ));
        let http = Arc::new(AuthHttp::new(
            config.clone(),
            Arc::clone(&cache),
            Arc::clone(&identity),
            Arc::clone(&coordinator),
        ));
        let session = SessionManager::new(
            Arc::clone(&http),
            Arc::clone(&cache),
            Arc::clone(&identity),
            Arc::clone(&coordinator),
            role,
        );
        let pairing = PairingHandler::new(Arc::clone(&http), Arc::clone(&identity));
        Self {
            config,
            identity,
            coordinator,
            http,
            session,
            pairing,
            cache,
            role,
        }
    }

    /// Assembles the core against a canonical deployment environment.
    #[must_use]
    pub fn for_environment(
        environment: &Environment,
        profile: DeviceProfile,
        role: Role,
        cache: StoreHandle,
        vault: StoreHandle,
    ) -> Self {
        Self::new(
            Config::for_environment(environment),
            profile,
            role,
            cache,
            vault,
        )
    }

    /// Starts a fresh login flow at phone entry.
    #[must_use]
    pub fn login_flow(&self) -> LoginFlow {
        LoginFlow::new(
            Arc::clone(&self.http),
            Arc::clone(&self.cache),
            Arc::clone(&self.identity),
            Arc::clone(&self.coordinator),
            self.role,
        )
    }

    /// Session lifecycle operations.
    #[must_use]
    pub const fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Web-session pairing operations.
    #[must_use]
    pub const fn pairing(&self) -> &PairingHandler {
        &self.pairing
    }

    /// The device identity manager.
    #[must_use]
    pub fn identity(&self) -> Arc<DeviceIdentityManager> {
        Arc::clone(&self.identity)
    }

    /// The token refresh coordinator.
    #[must_use]
    pub fn coordinator(&self) -> Arc<RefreshCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// The shared authenticated transport.
    #[must_use]
    pub fn http(&self) -> Arc<AuthHttp> {
        Arc::clone(&self.http)
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The role this core authenticates.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }
}
