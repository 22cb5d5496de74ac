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

use crate::models::{
    CreateLocationRequest, LocationQuery, PatientSearchQuery, PhysicianQuery, ProfileError,
    UpdateLocationRequest, UpdateProfileRequest,
};
use crate::services::{LocationService, ProfileService};

// ==============================================================================
// PROFILE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_my_profile(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = ProfileService::new(&config);
    let profile = service.get_profile(user.user_id()?, auth.token()).await?;

    Ok(Json(json!(profile)))
}

#[axum::debug_handler]
pub async fn update_my_profile(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<Value>, AppError> {
    if request.specialty.is_some() && user.practice_role() != Role::Physician {
        return Err(AppError::Forbidden("Only physicians can set a specialty".to_string()));
    }

    let service = ProfileService::new(&config);
    let profile = service.update_profile(user.user_id()?, request, auth.token()).await?;

    Ok(Json(json!(profile)))
}

/// Self and clinical roles see any profile; patients may also view physicians.
#[axum::debug_handler]
pub async fn get_profile(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(profile_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = ProfileService::new(&config);
    let profile = service.get_profile(profile_id, auth.token()).await?;

    let allowed = user.is(profile.id)
        || user.practice_role().is_clinical()
        || profile.role == Role::Physician;
    if !allowed {
        return Err(ProfileError::Unauthorized.into());
    }

    Ok(Json(json!(profile)))
}

#[axum::debug_handler]
pub async fn list_physicians(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<PhysicianQuery>,
) -> Result<Json<Value>, AppError> {
    let service = ProfileService::new(&config);
    let physicians = service.list_physicians(&query, auth.token()).await?;

    Ok(Json(json!({
        "physicians": physicians,
        "total": physicians.len()
    })))
}

#[axum::debug_handler]
pub async fn search_patients(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<PatientSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let service = ProfileService::new(&config);
    let patients = service.search_patients(&query, auth.token()).await?;

    Ok(Json(json!({
        "patients": patients,
        "total": patients.len()
    })))
}

// ==============================================================================
// LOCATION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_locations(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(mut query): Query<LocationQuery>,
) -> Result<Json<Value>, AppError> {
    if !user.is_staff() {
        query.include_inactive = None;
    }

    let service = LocationService::new(&config);
    let locations = service.list_locations(&query, auth.token()).await?;

    Ok(Json(json!({
        "locations": locations,
        "total": locations.len()
    })))
}

#[axum::debug_handler]
pub async fn get_location(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(location_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = LocationService::new(&config);
    let location = service.get_location(location_id, auth.token()).await?;

    Ok(Json(json!(location)))
}

#[axum::debug_handler]
pub async fn create_location(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<CreateLocationRequest>,
) -> Result<Json<Value>, AppError> {
    let service = LocationService::new(&config);
    let location = service.create_location(request, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "location": location
    })))
}

#[axum::debug_handler]
pub async fn update_location(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(location_id): Path<Uuid>,
    Json(request): Json<UpdateLocationRequest>,
) -> Result<Json<Value>, AppError> {
    let service = LocationService::new(&config);
    let location = service.update_location(location_id, request, auth.token()).await?;

    Ok(Json(json!(location)))
}
