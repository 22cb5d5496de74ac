use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::NotificationQuery;
use crate::services::NotificationService;

#[axum::debug_handler]
pub async fn list_notifications(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Value>, AppError> {
    let service = NotificationService::new(&config);
    let notifications = service
        .list_for_recipient(user.user_id()?, &query, auth.token())
        .await?;

    Ok(Json(json!({
        "notifications": notifications,
        "total": notifications.len()
    })))
}

#[axum::debug_handler]
pub async fn unread_count(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = NotificationService::new(&config);
    let count = service.unread_count(user.user_id()?, auth.token()).await?;

    Ok(Json(json!({ "unread": count })))
}

#[axum::debug_handler]
pub async fn mark_read(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = NotificationService::new(&config);
    let notification = service
        .mark_read(notification_id, user.user_id()?, auth.token())
        .await?;

    Ok(Json(json!(notification)))
}

#[axum::debug_handler]
pub async fn mark_all_read(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = NotificationService::new(&config);
    let marked = service.mark_all_read(user.user_id()?, auth.token()).await?;

    Ok(Json(json!({ "marked": marked })))
}
