use std::sync::Arc;

use axum::{
    extract::{Extension, State, Json},
    http::HeaderMap,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::{TokenResponse, User};
use shared_models::error::AppError;
use shared_utils::jwt::validate_token as decode_token;
use profile_cell::{ProfileError, ProfileService};

fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    auth_value
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn validate_token(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AppError> {
    debug!("Validating token");

    let token = extract_bearer_token(&headers)?;
    let user = decode_token(&token, &config.supabase_jwt_secret).map_err(AppError::Auth)?;

    Ok(Json(TokenResponse {
        valid: true,
        role: Some(user.practice_role().to_string()),
        user_id: user.id,
        email: user.email,
    }))
}

/// Like `validate_token` but reports failure in the body instead of a 401.
pub async fn verify_token(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
) -> Json<Value> {
    let valid = extract_bearer_token(&headers)
        .ok()
        .map(|token| decode_token(&token, &config.supabase_jwt_secret).is_ok())
        .unwrap_or(false);

    Json(json!({ "valid": valid }))
}

pub async fn refresh_session(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<Value>, AppError> {
    let refresh_token = request.refresh_token.trim();
    if refresh_token.is_empty() {
        return Err(AppError::BadRequest("refresh_token is required".to_string()));
    }

    let client = SupabaseClient::new(&config);
    let session = client.refresh_session(refresh_token).await.map_err(|e| {
        warn!("Session refresh failed: {}", e);
        AppError::Auth("Session expired, please sign in again".to_string())
    })?;

    Ok(Json(session))
}

#[axum::debug_handler]
pub async fn me(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let role = user.practice_role();
    debug!("Resolving session for user {}", user.id);

    // A fresh sign-up may not have a profile row yet.
    let service = ProfileService::new(&config);
    let profile = match service.get_profile(user.user_id()?, auth.token()).await {
        Ok(profile) => Some(profile),
        Err(ProfileError::NotFound) => None,
        Err(e) => return Err(e.into()),
    };

    Ok(Json(json!({
        "user_id": user.id,
        "email": user.email,
        "role": role,
        "portal": format!("/{}", role.portal()),
        "profile": profile
    })))
}

/// Portal entry point. `portal_gate` has already matched the prefix to the role.
#[axum::debug_handler]
pub async fn portal_home(
    Extension(user): Extension<User>,
) -> Json<Value> {
    let role = user.practice_role();
    Json(json!({
        "portal": role.portal(),
        "user_id": user.id,
        "role": role.to_string()
    }))
}
