use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentListQuery, AvailabilityQuery, BookAppointmentRequest, RescheduleAppointmentRequest,
    UpdateStatusRequest,
};
use crate::services::availability::AvailabilityService;
use crate::services::booking::AppointmentBookingService;

#[axum::debug_handler]
pub async fn get_availability(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&config);
    let availability = service.get_availability(&query, auth.token()).await?;

    Ok(Json(json!(availability)))
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    info!("Booking request from {} ({})", user.id, user.practice_role());

    let service = AppointmentBookingService::new(&config);
    let appointment = service
        .book_appointment(request, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!({
        "appointment": appointment,
        "message": "Appointment booked"
    })))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&config);
    let appointments = service
        .list_appointments(&query, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&config);
    let appointment = service
        .get_for_caller(appointment_id, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_status(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&config);
    let appointment = service
        .update_status(appointment_id, request, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!({
        "appointment": appointment,
        "message": format!("Appointment is now {}", appointment.status)
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&config);
    let appointment = service
        .reschedule_appointment(appointment_id, request, user.user_id()?, user.practice_role(), auth.token())
        .await?;

    Ok(Json(json!({
        "appointment": appointment,
        "message": "Appointment rescheduled"
    })))
}
