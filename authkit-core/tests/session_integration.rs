//! Launch resolution, logout depths and web pairing against a mock backend.

mod common;

use authkit_core::storage::{keys, KeyValueStore, MemoryStore};
use authkit_core::{AuthKitError, LaunchDestination, Role};

fn seed_authenticated(cache: &MemoryStore) {
    cache.set(keys::ACCESS_TOKEN, "access-1").expect("set");
    cache.set(keys::REFRESH_TOKEN, "refresh-1").expect("set");
    cache.set(keys::ADMIN_ID, "admin-7").expect("set");
    cache.set(keys::ADMIN_INFO, r#"{"name":"A"}"#).expect("set");
    cache.set(keys::PHONE_NUMBER, "9876543210").expect("set");
    cache.set(keys::COUNTRY_CODE, "+91").expect("set");
}

#[tokio::test]
async fn test_launch_with_valid_tokens_authenticates() {
    let mut server = mockito::Server::new_async().await;
    let validate = server
        .mock("GET", "/api/v1/auth/validate")
        .match_header("authorization", "Bearer access-1")
        .with_status(200)
        .with_body(r#"{"success": true}"#)
        .expect(1)
        .create_async()
        .await;

    let harness = common::harness(&server.url(), Role::Admin);
    seed_authenticated(&harness.cache);
    let coordinator = harness.kit.coordinator();

    let destination = harness
        .kit
        .session()
        .resolve_launch()
        .await
        .expect("resolve launch");
    assert_eq!(destination, LaunchDestination::Authenticated);
    assert!(coordinator.timer_running());
    coordinator.stop_background_timer();

    validate.assert_async().await;
    drop(server);
}

#[tokio::test]
async fn test_launch_with_dead_session_falls_back_to_mpin_entry() {
    let mut server = mockito::Server::new_async().await;
    let validate = server
        .mock("GET", "/api/v1/auth/validate")
        .with_status(401)
        .with_body(r#"{"success": false, "message": "token expired"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/v1/admin-auth/refresh")
        .with_status(401)
        .with_body(r#"{"success": false, "message": "invalid refresh token"}"#)
        .expect(1)
        .create_async()
        .await;

    let harness = common::harness(&server.url(), Role::Admin);
    seed_authenticated(&harness.cache);

    let destination = harness
        .kit
        .session()
        .resolve_launch()
        .await
        .expect("resolve launch");
    assert_eq!(destination, LaunchDestination::MpinEntry);
    assert_eq!(harness.cache.get(keys::ACCESS_TOKEN).expect("get"), None);
    assert_eq!(harness.cache.get(keys::REFRESH_TOKEN).expect("get"), None);
    assert_eq!(
        harness.cache.get(keys::PHONE_NUMBER).expect("get"),
        Some("9876543210".to_string())
    );

    validate.assert_async().await;
    refresh.assert_async().await;
    drop(server);
}

#[tokio::test]
async fn test_launch_with_no_stored_state_goes_to_phone_entry() {
    let server = mockito::Server::new_async().await;
    let harness = common::harness(&server.url(), Role::Admin);

    let destination = harness
        .kit
        .session()
        .resolve_launch()
        .await
        .expect("resolve launch");
    assert_eq!(destination, LaunchDestination::PhoneEntry);

    drop(server);
}

#[tokio::test]
async fn test_ordinary_logout_preserves_credential_identity() {
    let mut server = mockito::Server::new_async().await;
    let logout = server
        .mock("POST", "/api/v1/admin-auth/logout")
        .with_status(200)
        .with_body(r#"{"success": true}"#)
        .expect(1)
        .create_async()
        .await;

    let harness = common::harness(&server.url(), Role::Admin);
    seed_authenticated(&harness.cache);
    let identity = harness.kit.identity();
    identity.ensure_identity().expect("identity");
    let coordinator = harness.kit.coordinator();
    coordinator.start_background_timer();

    harness.kit.session().logout().await.expect("logout");

    assert!(!coordinator.timer_running());
    assert_eq!(harness.cache.get(keys::ACCESS_TOKEN).expect("get"), None);
    assert_eq!(harness.cache.get(keys::REFRESH_TOKEN).expect("get"), None);
    assert_eq!(harness.cache.get(keys::ADMIN_INFO).expect("get"), None);
    assert_eq!(
        harness.cache.get(keys::ADMIN_ID).expect("get"),
        Some("admin-7".to_string())
    );
    assert_eq!(
        harness.cache.get(keys::PHONE_NUMBER).expect("get"),
        Some("9876543210".to_string())
    );
    // Device identity survives an ordinary logout.
    assert!(harness
        .cache
        .get(keys::DEVICE_ID)
        .expect("get")
        .is_some());
    assert!(harness
        .vault
        .get(keys::VAULT_DEVICE_ID)
        .expect("get")
        .is_some());

    logout.assert_async().await;
    drop(server);
}

#[tokio::test]
async fn test_full_logout_clears_credentials_and_device_identity() {
    let mut server = mockito::Server::new_async().await;
    let logout = server
        .mock("POST", "/api/v1/admin-auth/logout")
        .with_status(200)
        .with_body(r#"{"success": true}"#)
        .expect(1)
        .create_async()
        .await;

    let harness = common::harness(&server.url(), Role::Admin);
    seed_authenticated(&harness.cache);
    let identity = harness.kit.identity();
    identity.ensure_identity().expect("identity");

    harness.kit.session().full_logout().await.expect("logout");

    for key in [
        keys::ACCESS_TOKEN,
        keys::REFRESH_TOKEN,
        keys::ADMIN_ID,
        keys::PHONE_NUMBER,
        keys::COUNTRY_CODE,
        keys::DEVICE_ID,
        keys::DEVICE_FINGERPRINT,
    ] {
        assert_eq!(harness.cache.get(key).expect("get"), None, "{key}");
    }
    assert_eq!(harness.vault.get(keys::VAULT_DEVICE_ID).expect("get"), None);
    assert_eq!(
        harness
            .vault
            .get(keys::VAULT_FINGERPRINT_SEED)
            .expect("get"),
        None
    );

    logout.assert_async().await;
    drop(server);
}

#[tokio::test]
async fn test_pairing_binds_scanned_session() {
    let mut server = mockito::Server::new_async().await;
    let raw = {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;
        URL_SAFE_NO_PAD.encode(r#"{"sid":"web-session-42"}"#)
    };
    let pair = server
        .mock("POST", "/api/v1/web/login/pair")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "session_id": "web-session-42",
            "signature": raw.clone(),
        })))
        .with_status(200)
        .with_body(r#"{"success": true}"#)
        .expect(1)
        .create_async()
        .await;

    let harness = common::harness(&server.url(), Role::Admin);
    seed_authenticated(&harness.cache);

    harness.kit.pairing().pair(&raw).await.expect("pair");

    pair.assert_async().await;
    drop(server);
}

#[tokio::test]
async fn test_pairing_backend_decline_is_surfaced_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let raw = {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;
        URL_SAFE_NO_PAD.encode(r#"{"sid":"expired-session"}"#)
    };
    let pair = server
        .mock("POST", "/api/v1/web/login/pair")
        .with_status(410)
        .with_body(r#"{"success": false, "message": "session expired"}"#)
        .expect(1)
        .create_async()
        .await;

    let harness = common::harness(&server.url(), Role::Admin);
    seed_authenticated(&harness.cache);

    match harness.kit.pairing().pair(&raw).await {
        Err(AuthKitError::PairingRejected { message }) => {
            assert_eq!(message, "session expired");
        }
        other => panic!("unexpected: {other:?}"),
    }

    pair.assert_async().await;
    drop(server);
}

#[tokio::test]
async fn test_malformed_scan_never_reaches_the_network() {
    let mut server = mockito::Server::new_async().await;
    let pair = server
        .mock("POST", "/api/v1/web/login/pair")
        .expect(0)
        .create_async()
        .await;

    let harness = common::harness(&server.url(), Role::Admin);

    match harness.kit.pairing().pair("%%%not-a-payload%%%").await {
        Err(AuthKitError::MalformedPayload { .. }) => {}
        other => panic!("unexpected: {other:?}"),
    }

    pair.assert_async().await;
    drop(server);
}
