//! End-to-end login flow through the HTTP handlers.
//!
//! A wiremock server stands in for the identity provider (discovery document
//! and token endpoint); requests are driven through the axum router.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use tokio::sync::broadcast::error::TryRecvError;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vidauth::{IdentityConfig, IdentityManager, OAuthError, OAuthToken, router};

const BASE_URI: &str = "http://localhost:7070/";

async fn mock_provider() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "issuer": server.uri(),
            "authorization_endpoint": format!("{}/as/authorization.oauth2", server.uri()),
            "token_endpoint": format!("{}/as/token.oauth2", server.uri()),
        })))
        .mount(&server)
        .await;
    server
}

async fn mount_token_success(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/as/token.oauth2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "access",
            "refresh_token": "refresh",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .mount(server)
        .await;
}

async fn identity_for(server: &MockServer) -> Arc<IdentityManager> {
    let config = IdentityConfig::mercedes("client", "secret")
        .with_issuer(server.uri())
        .with_redirect_uri("http://localhost:7070/auth/callback")
        .with_base_uri(BASE_URI);
    Arc::new(IdentityManager::builder(config).build().await.unwrap())
}

async fn get(app: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn login_state(app: &Router) -> String {
    let (status, _, body) = get(app, "/login").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    let login_uri = json["loginUri"].as_str().expect("loginUri");
    url::Url::parse(login_uri)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("state parameter")
}

#[tokio::test]
async fn test_login_returns_provider_uri() {
    let server = mock_provider().await;
    let app = router(identity_for(&server).await);

    let (status, _, body) = get(&app, "/login").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    let login_uri = json["loginUri"].as_str().unwrap();
    assert!(login_uri.starts_with(&format!("{}/as/authorization.oauth2?", server.uri())));
    assert!(login_uri.contains("client_id=client"));
    assert!(login_uri.contains("state="));
    assert!(login_uri.contains("access_type=offline"));
}

#[tokio::test]
async fn test_successful_callback_redirects_and_notifies() {
    let server = mock_provider().await;
    mount_token_success(&server).await;
    let identity = identity_for(&server).await;
    let mut rx = identity.subscribe();
    let app = router(identity.clone());

    let state = login_state(&app).await;
    let (status, headers, _) = get(&app, &format!("/callback?code=abc&state={state}")).await;

    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(headers[header::LOCATION], BASE_URI);
    assert!(rx.try_recv().unwrap());
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(identity.token().await.unwrap().access_token, "access");

    let (_, _, body) = get(&app, "/status").await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["loggedIn"], true);
    assert!(json["expiresAt"].is_string());
}

#[tokio::test]
async fn test_callback_with_foreign_state_fails() {
    let server = mock_provider().await;
    mount_token_success(&server).await;
    let identity = identity_for(&server).await;
    let mut rx = identity.subscribe();
    let app = router(identity.clone());

    let foreign = router(identity_for(&server).await);
    let state = login_state(&foreign).await;

    let (status, headers, body) = get(&app, &format!("/callback?code=abc&state={state}")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(header::LOCATION).is_none());
    assert!(body.contains("failed state validation"));
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert!(!identity.is_logged_in().await);
}

#[tokio::test]
async fn test_callback_reports_provider_error() {
    let server = mock_provider().await;
    let identity = identity_for(&server).await;
    let mut rx = identity.subscribe();
    let app = router(identity.clone());

    let (status, _, body) = get(
        &app,
        "/callback?error=access_denied&error_description=user+cancelled",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("access_denied"));
    assert!(body.contains("user cancelled"));
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert!(!identity.is_logged_in().await);
}

#[tokio::test]
async fn test_callback_without_code_fails() {
    let server = mock_provider().await;
    let app = router(identity_for(&server).await);

    let state = login_state(&app).await;
    let (status, _, body) = get(&app, &format!("/callback?state={state}")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("invalid response"));

    let (status, _, body) = get(&app, "/callback").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("invalid state response"));
}

#[tokio::test]
async fn test_logout_notifies_and_forgets_token() {
    let server = mock_provider().await;
    mount_token_success(&server).await;
    let identity = identity_for(&server).await;
    let app = router(identity.clone());

    let state = login_state(&app).await;
    get(&app, &format!("/callback?code=abc&state={state}")).await;
    assert!(identity.is_logged_in().await);

    let mut rx = identity.subscribe();
    let (status, _, body) = get(&app, "/logout").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());

    assert!(!rx.try_recv().unwrap());
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert!(matches!(
        identity.token().await,
        Err(OAuthError::NotAuthenticated)
    ));
}

#[tokio::test]
async fn test_warm_start_token_is_served() {
    let server = mock_provider().await;
    let config = IdentityConfig::mercedes("client", "secret")
        .with_issuer(server.uri())
        .with_redirect_uri("http://localhost:7070/auth/callback");
    let identity = IdentityManager::builder(config)
        .token(OAuthToken::bearer("persisted").expiring_in(3600))
        .build()
        .await
        .unwrap();

    assert_eq!(identity.token().await.unwrap().access_token, "persisted");
}
