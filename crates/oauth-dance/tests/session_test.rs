//! Tests for the token-bound HTTP session: URL resolution, bearer
//! attachment, and automatic refresh.

use oauth_dance::{
    MemoryStorage, OAuth2Flow, OAuth2FlowBuilder, SessionError, Token, TokenRefreshError,
    TokenStorage,
};
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn acme_flow() -> OAuth2FlowBuilder {
    OAuth2Flow::builder("acme")
        .client_id("cid")
        .client_secret("shh")
        .authorization_url("https://provider.example/oauth/authorize")
        .token_url("https://provider.example/oauth/token")
}

fn expired_token() -> Token {
    let mut token = Token::new("stale", "Bearer");
    token.expires_at = Some(1);
    token.refresh_token = Some("r1".to_string());
    token
}

#[test]
fn authorized_reflects_loaded_token() {
    let flow = acme_flow().build().unwrap();
    let session = flow.session();

    assert!(!session.authorized());
    session.load_token(Some(Token::new("deadbeef", "bearer")));
    assert!(session.authorized());
    session.load_token(None);
    assert!(!session.authorized());
}

#[tokio::test]
async fn relative_urls_resolve_against_base() {
    let server = MockServer::start().await;
    let flow = acme_flow()
        .base_url(format!("{}/v1/", server.uri()))
        .build()
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .and(header("authorization", "Bearer deadbeef"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    flow.set_token(Token::new("deadbeef", "Bearer")).await.unwrap();
    let response = flow.session().get("users/me").await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn absolute_urls_pass_through_unchanged() {
    let server = MockServer::start().await;
    let flow = acme_flow()
        .base_url("https://unreachable.example.com/v1/")
        .build()
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/elsewhere"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    flow.set_token(Token::new("deadbeef", "Bearer")).await.unwrap();
    let response = flow
        .session()
        .get(&format!("{}/elsewhere", server.uri()))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn missing_token_is_loaded_through_storage() {
    let server = MockServer::start().await;
    let storage: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());
    storage
        .set(None, Token::new("from-storage", "Bearer"))
        .await
        .unwrap();

    let flow = acme_flow()
        .base_url(format!("{}/", server.uri()))
        .storage(storage)
        .build()
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/profile"))
        .and(header("authorization", "Bearer from-storage"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    // Nothing explicitly loaded into the session; the request pulls
    // the token through the retrieval hook.
    assert!(!flow.session().authorized());
    let response = flow.session().get("profile").await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(flow.session().authorized());
}

#[tokio::test]
async fn expired_token_refreshes_before_request() {
    let server = MockServer::start().await;
    let flow = acme_flow()
        .base_url(format!("{}/", server.uri()))
        .auto_refresh_url(format!("{}/oauth/token", server.uri()))
        .build()
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r1"))
        .and(body_string_contains("client_id=cid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "minty",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/widgets"))
        .and(header("authorization", "Bearer minty"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    flow.set_token(expired_token()).await.unwrap();
    let response = flow.session().get("api/widgets").await.unwrap();
    assert_eq!(response.status(), 200);

    // The refreshed token was persisted through the update hook, and
    // the refresh token survived a response that omitted it.
    let stored = flow.token().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "minty");
    assert_eq!(stored.refresh_token.as_deref(), Some("r1"));
    assert!(!stored.is_expired());
}

#[tokio::test]
async fn refresh_failure_aborts_original_request() {
    let server = MockServer::start().await;
    let flow = acme_flow()
        .base_url(format!("{}/", server.uri()))
        .auto_refresh_url(format!("{}/oauth/token", server.uri()))
        .build()
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/widgets"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    flow.set_token(expired_token()).await.unwrap();
    let err = flow.session().get("api/widgets").await.unwrap_err();
    match err {
        SessionError::Refresh(TokenRefreshError::Provider(provider)) => {
            assert_eq!(provider.error, "invalid_grant");
        }
        other => panic!("expected refresh rejection, got {other:?}"),
    }

    // The stale token stays in storage; nothing was overwritten.
    let stored = flow.token().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "stale");
}

#[tokio::test]
async fn expired_token_without_refresh_configuration_fails() {
    let server = MockServer::start().await;
    let flow = acme_flow()
        .base_url(format!("{}/", server.uri()))
        .build()
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/api/widgets"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    flow.set_token(expired_token()).await.unwrap();
    let err = flow.session().get("api/widgets").await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Refresh(TokenRefreshError::Expired)
    ));
}

#[tokio::test]
async fn relative_request_without_base_url_fails() {
    let flow = acme_flow().build().unwrap();
    let err = flow.session().get("users/me").await.unwrap_err();
    assert!(matches!(err, SessionError::Config(_)));
}

#[tokio::test]
async fn requests_without_any_token_go_out_unauthenticated() {
    let server = MockServer::start().await;
    let flow = acme_flow()
        .base_url(format!("{}/", server.uri()))
        .build()
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let response = flow.session().get("public").await.unwrap();
    assert_eq!(response.status(), 200);
}
