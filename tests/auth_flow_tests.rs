// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-to-end tests of the authentication flows against mocked providers.

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::time::Duration;
use todo_desktop_auth::error::AuthError;
use todo_desktop_auth::models::{FlowKind, MicrosoftToken};
use todo_desktop_auth::services::pkce::derive_challenge;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{
    form_map, mint_id_token, query_map, test_config, test_service, BrowserScript, TEST_CODE,
    TOKEN_PATH,
};

async fn mount_token_endpoint(server: &MockServer, body: serde_json::Value, times: u64) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(times)
        .mount(server)
        .await;
}

// ─── Flow A ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_password_sign_in_sets_session() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithPassword"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "localId": "uid-1",
            "email": "ann@example.com"
        })))
        .mount(&server)
        .await;

    let (service, _) = test_service(test_config(&server, dir.path()), BrowserScript::Ignore);
    let profile = service
        .sign_in_with_password("ann@example.com", "pw")
        .await
        .unwrap();

    assert_eq!(service.current_user().unwrap().uid, profile.uid);

    service.sign_out();
    assert!(service.current_user().is_none());
}

#[tokio::test]
async fn test_blank_credentials_never_reach_provider() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (service, _) = test_service(test_config(&server, dir.path()), BrowserScript::Ignore);
    let err = service.sign_in_with_password("", "pw").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidInput("email")));
    let err = service.register("a@b.com", "   ", None).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidInput("password")));

    server.verify().await;
}

#[tokio::test]
async fn test_failed_sign_in_keeps_previous_session() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path("/v1/accounts:signUp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "localId": "uid-1",
            "email": "ann@example.com"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithPassword"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "EMAIL_NOT_FOUND" }
        })))
        .mount(&server)
        .await;

    let (service, _) = test_service(test_config(&server, dir.path()), BrowserScript::Ignore);
    service
        .register("ann@example.com", "secret1", Some("Ann"))
        .await
        .unwrap();

    let err = service
        .sign_in_with_password("ghost@example.com", "pw")
        .await
        .unwrap_err();
    assert!(err.is_wrong_credentials());
    assert_eq!(service.current_user().unwrap().uid, "uid-1");
}

// ─── Flow B ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_microsoft_sign_in_federates_into_firebase() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let id_token = mint_id_token(json!({
        "sub": "ms-sub",
        "email": "dana@contoso.com",
        "exp": 4_102_444_800u64
    }));
    mount_token_endpoint(
        &server,
        json!({ "id_token": id_token, "access_token": "ms-access", "expires_in": 3600 }),
        1,
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithIdp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "localId": "uid-dana",
            "displayName": "Dana"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (service, browser) =
        test_service(test_config(&server, dir.path()), BrowserScript::Approve);
    let profile = service.sign_in_with_microsoft().await.unwrap();

    assert_eq!(profile.uid, "uid-dana");
    assert_eq!(profile.email, "dana@contoso.com");
    assert_eq!(service.current_user().unwrap().email, "dana@contoso.com");
    assert!(!service.is_flow_pending(FlowKind::MicrosoftSignIn));

    // Sign-in does not touch the Outlook silo.
    assert!(service.token_store().load().await.unwrap().is_none());

    let authorize = browser.last_authorize_params();
    assert_eq!(authorize["response_type"], "code");
    assert_eq!(authorize["response_mode"], "query");
    assert_eq!(authorize["prompt"], "select_account");
    assert_eq!(authorize["code_challenge_method"], "S256");
    assert_eq!(authorize["scope"], "openid profile email offline_access");

    let requests = server.received_requests().await.unwrap();
    let token_request = requests
        .iter()
        .find(|r| r.url.path() == TOKEN_PATH)
        .unwrap();
    let form = form_map(&token_request.body);
    assert_eq!(form["code"], TEST_CODE);
    assert_eq!(form["grant_type"], "authorization_code");
    assert_eq!(form["redirect_uri"], authorize["redirect_uri"]);
    assert_eq!(derive_challenge(&form["code_verifier"]), authorize["code_challenge"]);

    let idp_request = requests
        .iter()
        .find(|r| r.url.path() == "/v1/accounts:signInWithIdp")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&idp_request.body).unwrap();
    let post_body = form_map(body["postBody"].as_str().unwrap().as_bytes());
    assert_eq!(post_body["nonce"], authorize["nonce"]);
    assert_eq!(post_body["access_token"], "ms-access");
}

#[tokio::test]
async fn test_state_mismatch_never_exchanges_code() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_token_endpoint(&server, json!({ "access_token": "A" }), 0).await;

    let (service, _) = test_service(test_config(&server, dir.path()), BrowserScript::ForgeState);
    let err = service.sign_in_with_microsoft().await.unwrap_err();

    assert!(matches!(err, AuthError::CsrfMismatch));
    assert!(service.current_user().is_none());
    assert!(!service.is_flow_pending(FlowKind::MicrosoftSignIn));
    server.verify().await;
}

#[tokio::test]
async fn test_access_denied_fails_without_timeout() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_token_endpoint(&server, json!({ "access_token": "A" }), 0).await;

    let mut config = test_config(&server, dir.path());
    config.callback_timeout = Duration::from_secs(60);
    let (service, _) = test_service(config, BrowserScript::Deny);

    let err = tokio::time::timeout(Duration::from_secs(10), service.connect_outlook())
        .await
        .expect("flow should finish before the callback timeout")
        .unwrap_err();

    match err {
        AuthError::ProviderDenied { error, description } => {
            assert_eq!(error, "access_denied");
            assert_eq!(description.as_deref(), Some("User declined"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    server.verify().await;
}

#[tokio::test]
async fn test_federation_failure_leaves_no_session() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_token_endpoint(&server, json!({ "access_token": "ms-access" }), 1).await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithIdp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "localId": "uid-x" })))
        .mount(&server)
        .await;

    let (service, _) = test_service(test_config(&server, dir.path()), BrowserScript::Approve);
    let err = service.sign_in_with_microsoft().await.unwrap_err();

    assert!(matches!(err, AuthError::FederationFailed(_)));
    assert!(service.current_user().is_none());
}

#[tokio::test]
async fn test_redirect_timeout_releases_flow() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = test_config(&server, dir.path());
    config.callback_timeout = Duration::from_millis(200);
    let (service, browser) = test_service(config, BrowserScript::Ignore);

    let err = service.sign_in_with_microsoft().await.unwrap_err();
    assert!(matches!(err, AuthError::AuthorizationTimeout(_)));
    assert!(!service.is_flow_pending(FlowKind::MicrosoftSignIn));

    // The user may simply try again.
    let err = service.sign_in_with_microsoft().await.unwrap_err();
    assert!(matches!(err, AuthError::AuthorizationTimeout(_)));
    assert_eq!(browser.opened().len(), 2);
}

#[tokio::test]
async fn test_concurrent_flow_of_same_kind_fails_fast() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = test_config(&server, dir.path());
    config.callback_timeout = Duration::from_secs(2);
    let (service, browser) = test_service(config, BrowserScript::Ignore);

    let first = tokio::spawn({
        let service = service.clone();
        async move { service.connect_outlook().await }
    });

    while browser.opened().is_empty() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(service.is_flow_pending(FlowKind::OutlookConnect));

    let err = service.connect_outlook().await.unwrap_err();
    assert!(matches!(err, AuthError::ListenerUnavailable(_)));
    assert_eq!(browser.opened().len(), 1);

    let first = first.await.unwrap().unwrap_err();
    assert!(matches!(first, AuthError::AuthorizationTimeout(_)));
}

#[tokio::test]
async fn test_browser_failure_aborts_flow() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_token_endpoint(&server, json!({ "access_token": "A" }), 0).await;

    let (service, _) = test_service(test_config(&server, dir.path()), BrowserScript::Fail);
    let err = service.connect_outlook().await.unwrap_err();

    assert!(matches!(err, AuthError::Browser(_)));
    assert!(!service.is_flow_pending(FlowKind::OutlookConnect));
    server.verify().await;
}

#[tokio::test]
async fn test_busy_redirect_port_fails_before_browser() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let holder = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = holder.local_addr().unwrap().port();

    let mut config = test_config(&server, dir.path());
    if let Some(app) = config.outlook.as_mut() {
        app.redirect_uri = format!("http://127.0.0.1:{}/oauth2/callback", port);
    }
    let (service, browser) = test_service(config, BrowserScript::Approve);

    let err = service.connect_outlook().await.unwrap_err();
    assert!(matches!(err, AuthError::ListenerUnavailable(_)));
    assert!(browser.opened().is_empty());
}

#[tokio::test]
async fn test_missing_client_id_is_not_configured() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&server, dir.path());
    config.microsoft_sign_in = None;

    let (service, browser) = test_service(config, BrowserScript::Approve);
    let err = service.sign_in_with_microsoft().await.unwrap_err();
    assert!(matches!(err, AuthError::NotConfigured(_)));
    assert!(browser.opened().is_empty());
}

// ─── Flow C and the token silo ───────────────────────────────────

#[tokio::test]
async fn test_connect_outlook_persists_token() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_token_endpoint(
        &server,
        json!({ "access_token": "A", "refresh_token": "R", "expires_in": 3600 }),
        1,
    )
    .await;

    let (service, browser) =
        test_service(test_config(&server, dir.path()), BrowserScript::Approve);

    let before = Utc::now();
    service.connect_outlook().await.unwrap();
    let after = Utc::now();

    let stored = service.token_store().load().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "A");
    assert_eq!(stored.refresh_token, "R");
    assert!(stored.expires_at >= before + ChronoDuration::seconds(3600));
    assert!(stored.expires_at <= after + ChronoDuration::seconds(3600));

    assert!(service.is_outlook_connected().await);
    assert!(service.current_user().is_none());
    assert_eq!(service.get_valid_access_token().await.unwrap(), "A");

    let authorize = query_map(&browser.opened()[0]);
    assert!(authorize["scope"].contains("Mail.ReadWrite"));
    assert!(authorize["scope"].contains("Mail.Send"));
}

#[tokio::test]
async fn test_access_token_requires_connection() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let (service, _) = test_service(test_config(&server, dir.path()), BrowserScript::Ignore);

    let err = service.get_valid_access_token().await.unwrap_err();
    assert!(matches!(err, AuthError::NotConnected));
    assert!(!service.is_outlook_connected().await);
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_saved() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=R1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A2",
            "refresh_token": "R2",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (service, _) = test_service(test_config(&server, dir.path()), BrowserScript::Ignore);
    let stale = MicrosoftToken {
        access_token: "A1".into(),
        refresh_token: "R1".into(),
        expires_at: Utc::now() + ChronoDuration::seconds(30),
    };
    service.token_store().save(&stale).await.unwrap();

    assert_eq!(service.get_valid_access_token().await.unwrap(), "A2");
    // Cached now; no second refresh.
    assert_eq!(service.get_valid_access_token().await.unwrap(), "A2");

    let stored = service.token_store().load().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "A2");
    assert_eq!(stored.refresh_token, "R2");
    assert!(!stored.is_expired());
    server.verify().await;
}

#[tokio::test]
async fn test_failed_refresh_keeps_file_and_drops_cache() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })),
        )
        .expect(2)
        .mount(&server)
        .await;

    let (service, _) = test_service(test_config(&server, dir.path()), BrowserScript::Ignore);
    let expired = MicrosoftToken {
        access_token: "A1".into(),
        refresh_token: "R1".into(),
        expires_at: Utc::now() - ChronoDuration::minutes(5),
    };
    service.token_store().save(&expired).await.unwrap();

    for _ in 0..2 {
        let err = service.get_valid_access_token().await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExchangeFailed { status: 400, .. }));
    }

    assert_eq!(service.token_store().load().await.unwrap(), Some(expired));
    server.verify().await;
}

#[tokio::test]
async fn test_refresh_inside_expiry_margin_is_rejected() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_token_endpoint(
        &server,
        json!({ "access_token": "A2", "refresh_token": "R2", "expires_in": 30 }),
        2,
    )
    .await;

    let (service, _) = test_service(test_config(&server, dir.path()), BrowserScript::Ignore);
    let expired = MicrosoftToken {
        access_token: "A1".into(),
        refresh_token: "R1".into(),
        expires_at: Utc::now() - ChronoDuration::minutes(5),
    };
    service.token_store().save(&expired).await.unwrap();

    // Nothing cached after the first rejection, so the second call refreshes again.
    for _ in 0..2 {
        let err = service.get_valid_access_token().await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidTokenResponse(_)));
    }

    assert_eq!(service.token_store().load().await.unwrap(), Some(expired));
    server.verify().await;
}

#[tokio::test]
async fn test_sign_out_keeps_outlook_and_disconnect_clears_it() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let (service, _) = test_service(test_config(&server, dir.path()), BrowserScript::Ignore);

    let token = MicrosoftToken::issued("A", "R", Utc::now(), 3600);
    service.token_store().save(&token).await.unwrap();
    assert_eq!(service.get_valid_access_token().await.unwrap(), "A");

    service.sign_out();
    assert!(service.is_outlook_connected().await);
    assert_eq!(service.get_valid_access_token().await.unwrap(), "A");

    service.disconnect_outlook().await.unwrap();
    assert!(!service.is_outlook_connected().await);
    assert!(matches!(
        service.get_valid_access_token().await,
        Err(AuthError::NotConnected)
    ));

    // Disconnecting twice is fine.
    service.disconnect_outlook().await.unwrap();
}
