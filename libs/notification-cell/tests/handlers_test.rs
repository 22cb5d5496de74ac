use axum::extract::{Extension, Path, Query, State};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::json;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path, query_param};
use assert_matches::assert_matches;

use notification_cell::handlers::*;
use notification_cell::models::NotificationQuery;
use shared_models::error::AppError;
use shared_utils::test_utils::{TestConfig, TestUser};

fn auth_header() -> TypedHeader<Authorization<Bearer>> {
    TypedHeader(Authorization::bearer("test-token").unwrap())
}

fn notification_row(id: Uuid, recipient: Uuid, read: bool) -> serde_json::Value {
    let read_at = read.then_some("2025-01-02T00:00:00Z");
    json!({
        "id": id,
        "recipient_id": recipient,
        "kind": "invoice_issued",
        "title": "New invoice",
        "body": "Invoice INV-1 is ready",
        "link": "/billing/invoices/1",
        "read_at": read_at,
        "created_at": "2025-01-01T00:00:00Z"
    })
}

#[tokio::test]
async fn test_list_unread_notifications() {
    let server = MockServer::start().await;
    let user = TestUser::patient("p@example.com");
    let recipient = Uuid::parse_str(&user.id).unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/notifications"))
        .and(query_param("recipient_id", format!("eq.{}", recipient)))
        .and(query_param("read_at", "is.null"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            notification_row(Uuid::new_v4(), recipient, false)
        ])))
        .mount(&server)
        .await;

    let config = TestConfig::with_mock_server(&server.uri()).to_arc();
    let query = NotificationQuery { unread_only: Some(true), limit: None };

    let result = list_notifications(State(config), auth_header(), Extension(user.to_user()), Query(query))
        .await
        .unwrap();

    assert_eq!(result.0["total"], 1);
    assert_eq!(result.0["notifications"][0]["kind"], "invoice_issued");
}

#[tokio::test]
async fn test_mark_read_rejects_other_users_notification() {
    let server = MockServer::start().await;
    let user = TestUser::patient("p@example.com");
    let notification_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/notifications"))
        .and(query_param("id", format!("eq.{}", notification_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            notification_row(notification_id, Uuid::new_v4(), false)
        ])))
        .mount(&server)
        .await;

    let config = TestConfig::with_mock_server(&server.uri()).to_arc();
    let result = mark_read(State(config), auth_header(), Extension(user.to_user()), Path(notification_id)).await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_mark_read_missing_notification() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let config = TestConfig::with_mock_server(&server.uri()).to_arc();
    let result = mark_read(
        State(config),
        auth_header(),
        Extension(TestUser::default().to_user()),
        Path(Uuid::new_v4()),
    ).await;

    assert_matches!(result, Err(AppError::NotFound(_)));
}

#[tokio::test]
async fn test_unread_count() {
    let server = MockServer::start().await;
    let user = TestUser::default();
    let recipient = Uuid::parse_str(&user.id).unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/notifications"))
        .and(query_param("select", "id"))
        .and(query_param("recipient_id", format!("eq.{}", recipient)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": Uuid::new_v4() }, { "id": Uuid::new_v4() }
        ])))
        .mount(&server)
        .await;

    let config = TestConfig::with_mock_server(&server.uri()).to_arc();
    let result = unread_count(State(config), auth_header(), Extension(user.to_user())).await.unwrap();

    assert_eq!(result.0["unread"], 2);
}
