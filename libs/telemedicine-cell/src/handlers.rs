use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::CreateSessionRequest;
use crate::services::SessionService;

#[axum::debug_handler]
pub async fn create_session(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let service = SessionService::new(&config);
    let session = service
        .create_session(request.appointment_id, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!({
        "session": session,
        "message": "Telemedicine room ready"
    })))
}

#[axum::debug_handler]
pub async fn get_session(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = SessionService::new(&config);
    let session = service
        .get_for_caller(session_id, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!(session)))
}

#[axum::debug_handler]
pub async fn get_appointment_session(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = SessionService::new(&config);
    let session = service
        .session_for_appointment(appointment_id, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!(session)))
}

#[axum::debug_handler]
pub async fn join_session(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = SessionService::new(&config);
    let join = service.join_session(session_id, user.user_id()?, auth.token()).await?;

    Ok(Json(json!(join)))
}

#[axum::debug_handler]
pub async fn end_session(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = SessionService::new(&config);
    let session = service
        .end_session(session_id, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!(session)))
}

#[axum::debug_handler]
pub async fn cancel_session(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = SessionService::new(&config);
    let session = service
        .cancel_session(session_id, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!(session)))
}
