use std::sync::Arc;

use axum::{
    extract::{Extension, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::AnalyticsQuery;
use crate::services::AnalyticsService;

#[axum::debug_handler]
pub async fn revenue_report(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AnalyticsService::new(&config);
    let report = service.revenue_report(&query, auth.token()).await?;

    Ok(Json(json!(report)))
}

#[axum::debug_handler]
pub async fn network_overview(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AnalyticsService::new(&config);
    let overview = service.network_overview(&query, auth.token()).await?;

    Ok(Json(json!(overview)))
}

#[axum::debug_handler]
pub async fn my_summary(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AnalyticsService::new(&config);
    let summary = service
        .physician_summary(user.user_id()?, &query, auth.token())
        .await?;

    Ok(Json(json!(summary)))
}
