use std::sync::Arc;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt;
use serde_json::json;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path};

use auth_cell::router::auth_routes;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

fn create_test_app(config: AppConfig) -> Router {
    auth_routes(Arc::new(config))
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_validate_endpoint() {
    let config = TestConfig::default().to_app_config();
    let user = TestUser::patient("test@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let request = Request::builder()
        .method("POST")
        .uri("/validate")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = create_test_app(config).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["user_id"], user.id);
    assert_eq!(body["role"], "patient");
}

#[tokio::test]
async fn test_validate_endpoint_rejects_bad_token() {
    let config = TestConfig::default().to_app_config();
    let token = JwtTestUtils::create_invalid_signature_token(&TestUser::default());

    let request = Request::builder()
        .method("POST")
        .uri("/validate")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = create_test_app(config).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_verify_endpoint_never_errors() {
    let config = TestConfig::default().to_app_config();

    let request = Request::builder()
        .method("POST")
        .uri("/verify")
        .header("authorization", "Bearer not.a.token")
        .body(Body::empty())
        .unwrap();

    let response = create_test_app(config).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "valid": false }));
}

#[tokio::test]
async fn test_me_requires_token() {
    let config = TestConfig::default().to_app_config();

    let request = Request::builder()
        .uri("/me")
        .body(Body::empty())
        .unwrap();

    let response = create_test_app(config).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_endpoint() {
    let server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&server.uri()).to_app_config();
    let user = TestUser::physician("doc@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(1));

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::profile_response(&user.id, "physician")
        ])))
        .mount(&server)
        .await;

    let request = Request::builder()
        .uri("/me")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = create_test_app(config).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["portal"], "/physician");
    assert_eq!(body["profile"]["specialty"], "Family Medicine");
}
