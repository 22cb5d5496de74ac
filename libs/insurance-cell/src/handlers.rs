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
use shared_models::auth::{Role, User};
use shared_models::error::AppError;

use crate::models::{CreateVerificationRequest, RecordVerificationRequest, VerificationListQuery};
use crate::services::VerificationService;

#[axum::debug_handler]
pub async fn create_verification(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateVerificationRequest>,
) -> Result<Json<Value>, AppError> {
    let service = VerificationService::new(&config);
    let verification = service
        .create_verification(request, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!({
        "verification": verification,
        "message": "Insurance submitted for verification"
    })))
}

#[axum::debug_handler]
pub async fn record_verification(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(verification_id): Path<Uuid>,
    Json(request): Json<RecordVerificationRequest>,
) -> Result<Json<Value>, AppError> {
    let service = VerificationService::new(&config);
    let verification = service
        .record_result(verification_id, request, user.user_id()?, auth.token())
        .await?;

    Ok(Json(json!(verification)))
}

#[axum::debug_handler]
pub async fn list_verifications(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<VerificationListQuery>,
) -> Result<Json<Value>, AppError> {
    let service = VerificationService::new(&config);
    let verifications = service
        .list_verifications(&query, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!({
        "verifications": verifications,
        "total": verifications.len()
    })))
}

#[axum::debug_handler]
pub async fn get_verification(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(verification_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = VerificationService::new(&config);
    let verification = service
        .get_for_caller(verification_id, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!(verification)))
}

#[axum::debug_handler]
pub async fn get_active_verification(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if user.practice_role() == Role::Patient && !user.is(patient_id) {
        return Err(AppError::Forbidden("Patients can only view their own coverage".to_string()));
    }

    let service = VerificationService::new(&config);
    let verification = service.active_for_patient(patient_id, auth.token()).await?;

    Ok(Json(json!({
        "verification": verification,
        "remaining_deductible_cents": verification.remaining_deductible_cents()
    })))
}
