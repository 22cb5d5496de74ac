use std::sync::Arc;

use axum::{
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
    body::Body,
};
use tracing::warn;

use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_config::AppConfig;

use crate::jwt::validate_token;

/// Validates the bearer token and stores the `User` in request extensions.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?;

    let user = validate_token(token, &config.supabase_jwt_secret)
        .map_err(AppError::Auth)?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

pub fn extract_user<B>(request: &Request<B>) -> Result<User, AppError> {
    request
        .extensions()
        .get::<User>()
        .cloned()
        .ok_or_else(|| AppError::Auth("User not found in request extensions".to_string()))
}

/// Returns the caller's role if it is one of `allowed`.
pub fn require_role(user: &User, allowed: &[Role]) -> Result<Role, AppError> {
    let role = user.practice_role();
    if allowed.contains(&role) {
        Ok(role)
    } else {
        warn!("User {} with role {} denied; requires one of {:?}", user.id, role, allowed);
        Err(AppError::Forbidden(format!("Role {} is not allowed to perform this action", role)))
    }
}

pub fn require_staff(user: &User) -> Result<Role, AppError> {
    require_role(user, &[Role::Staff, Role::Admin])
}

async fn gate(allowed: &[Role], request: Request<Body>, next: Next) -> Result<Response, AppError> {
    let user = extract_user(&request)?;
    require_role(&user, allowed)?;
    Ok(next.run(request).await)
}

// Route gates; layer them inside `auth_middleware`.

pub async fn staff_only(request: Request<Body>, next: Next) -> Result<Response, AppError> {
    gate(&[Role::Staff, Role::Admin], request, next).await
}

pub async fn physician_only(request: Request<Body>, next: Next) -> Result<Response, AppError> {
    gate(&[Role::Physician], request, next).await
}

pub async fn clinical_only(request: Request<Body>, next: Next) -> Result<Response, AppError> {
    gate(&[Role::Physician, Role::Staff, Role::Admin], request, next).await
}

/// Roles allowed under a portal path prefix, if the path belongs to a portal.
pub fn portal_roles(path: &str) -> Option<&'static [Role]> {
    let first = path.trim_start_matches('/').split('/').next().unwrap_or("");
    match first {
        "patient" => Some(&[Role::Patient]),
        "physician" => Some(&[Role::Physician]),
        "admin" => Some(&[Role::Staff, Role::Admin]),
        _ => None,
    }
}

/// Gates `/patient/*`, `/physician/*` and `/admin/*` by role.
pub async fn portal_gate(request: Request<Body>, next: Next) -> Result<Response, AppError> {
    if let Some(allowed) = portal_roles(request.uri().path()) {
        let user = extract_user(&request)?;
        require_role(&user, allowed)?;
    }
    Ok(next.run(request).await)
}
