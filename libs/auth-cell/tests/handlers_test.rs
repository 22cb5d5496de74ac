use std::sync::Arc;
use axum::{extract::{Extension, Json, State}, http::{HeaderMap, HeaderValue}};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::json;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{body_json, method, path, query_param};
use assert_matches::assert_matches;

use auth_cell::handlers::{me, refresh_session, validate_token, verify_token, RefreshRequest};
use shared_config::AppConfig;
use shared_models::error::AppError;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

fn create_test_config() -> AppConfig {
    TestConfig::default().to_app_config()
}

fn create_auth_header(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "authorization",
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
    headers
}

fn bearer(token: &str) -> TypedHeader<Authorization<Bearer>> {
    TypedHeader(Authorization::bearer(token).unwrap())
}

#[tokio::test]
async fn test_validate_token_success() {
    let config = Arc::new(create_test_config());
    let user = TestUser::physician("doc@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let result = validate_token(State(config), create_auth_header(&token)).await;

    let response = result.unwrap().0;
    assert!(response.valid);
    assert_eq!(response.user_id, user.id);
    assert_eq!(response.email, Some(user.email));
    assert_eq!(response.role, Some("physician".to_string()));
}

#[tokio::test]
async fn test_validate_token_missing_header() {
    let config = Arc::new(create_test_config());

    let result = validate_token(State(config), HeaderMap::new()).await;

    match result.unwrap_err() {
        AppError::Auth(msg) => assert_eq!(msg, "Missing authorization header"),
        other => panic!("Expected Auth error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_validate_token_no_bearer_prefix() {
    let config = Arc::new(create_test_config());
    let mut headers = HeaderMap::new();
    headers.insert("authorization", HeaderValue::from_static("sometoken"));

    let result = validate_token(State(config), headers).await;

    match result.unwrap_err() {
        AppError::Auth(msg) => assert_eq!(msg, "Invalid authorization header format"),
        other => panic!("Expected Auth error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_validate_token_expired() {
    let config = Arc::new(create_test_config());
    let token = JwtTestUtils::create_expired_token(&TestUser::default(), &config.supabase_jwt_secret);

    let result = validate_token(State(config), create_auth_header(&token)).await;

    assert_matches!(result, Err(AppError::Auth(_)));
}

#[tokio::test]
async fn test_validate_token_invalid_signature() {
    let config = Arc::new(create_test_config());
    let token = JwtTestUtils::create_invalid_signature_token(&TestUser::default());

    let result = validate_token(State(config), create_auth_header(&token)).await;

    assert_matches!(result, Err(AppError::Auth(_)));
}

#[tokio::test]
async fn test_verify_token_reports_validity() {
    let config = Arc::new(create_test_config());
    let token = JwtTestUtils::create_test_token(&TestUser::default(), &config.supabase_jwt_secret, None);

    let valid = verify_token(State(config.clone()), create_auth_header(&token)).await;
    assert_eq!(valid.0["valid"], true);

    let malformed = verify_token(
        State(config.clone()),
        create_auth_header(&JwtTestUtils::create_malformed_token()),
    ).await;
    assert_eq!(malformed.0["valid"], false);

    let missing = verify_token(State(config), HeaderMap::new()).await;
    assert_eq!(missing.0["valid"], false);
}

#[tokio::test]
async fn test_refresh_session() {
    let server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&server.uri()).to_arc();

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_json(json!({ "refresh_token": "refresh-abc" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access",
            "refresh_token": "refresh-def",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = refresh_session(
        State(config),
        Json(RefreshRequest { refresh_token: "refresh-abc".to_string() }),
    ).await;

    let session = result.unwrap().0;
    assert_eq!(session["access_token"], "new-access");
    assert_eq!(session["refresh_token"], "refresh-def");
}

#[tokio::test]
async fn test_refresh_requires_token() {
    let config = Arc::new(create_test_config());

    let result = refresh_session(
        State(config),
        Json(RefreshRequest { refresh_token: "  ".to_string() }),
    ).await;

    assert_matches!(result, Err(AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_refresh_rejected_upstream() {
    let server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&server.uri()).to_arc();

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(
            MockSupabaseResponses::error_response("Invalid Refresh Token", "invalid_grant"),
        ))
        .mount(&server)
        .await;

    let result = refresh_session(
        State(config),
        Json(RefreshRequest { refresh_token: "stale".to_string() }),
    ).await;

    assert_matches!(result, Err(AppError::Auth(_)));
}

#[tokio::test]
async fn test_me_returns_portal_and_profile() {
    let server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&server.uri()).to_arc();
    let user = TestUser::staff("desk@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("eq.{}", user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::profile_response(&user.id, "staff")
        ])))
        .mount(&server)
        .await;

    let result = me(State(config), bearer("test-token"), Extension(user.to_user())).await;

    let body = result.unwrap().0;
    assert_eq!(body["role"], "staff");
    assert_eq!(body["portal"], "/admin");
    assert_eq!(body["profile"]["id"], json!(user.id));
}

#[tokio::test]
async fn test_me_without_profile_row() {
    let server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&server.uri()).to_arc();
    let user = TestUser::patient("new@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = me(State(config), bearer("test-token"), Extension(user.to_user())).await;

    let body = result.unwrap().0;
    assert_eq!(body["portal"], "/patient");
    assert!(body["profile"].is_null());
}
