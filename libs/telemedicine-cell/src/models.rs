// libs/telemedicine-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::error::AppError;

/// How early participants may enter the room before the visit starts.
pub const EARLY_JOIN_MINUTES: i64 = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemedicineSession {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub physician_id: Uuid,
    pub room_name: String,
    pub room_url: String,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl TelemedicineSession {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.patient_id == user_id || self.physician_id == user_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Active,
    Ended,
    Cancelled,
}

impl SessionStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, SessionStatus::Waiting | SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Waiting => write!(f, "waiting"),
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Ended => write!(f, "ended"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub appointment_id: Uuid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Host,
    Guest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinInfo {
    pub session_id: Uuid,
    pub room_name: String,
    pub room_url: String,
    pub participant_role: ParticipantRole,
    pub status: SessionStatus,
    pub appointment_starts_at: DateTime<Utc>,
    pub appointment_ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TelemedicineError {
    #[error("Telemedicine session not found")]
    NotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Appointment is not a telemedicine visit")]
    NotTelemedicine,

    #[error("Appointment is {0} and cannot host a session")]
    AppointmentNotJoinable(String),

    #[error("Session is {0}")]
    InvalidSessionState(SessionStatus),

    #[error("The room opens 15 minutes before the visit and closes when it ends")]
    OutsideJoinWindow,

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<TelemedicineError> for AppError {
    fn from(e: TelemedicineError) -> Self {
        match e {
            TelemedicineError::NotFound | TelemedicineError::AppointmentNotFound => AppError::NotFound(e.to_string()),
            TelemedicineError::NotTelemedicine
            | TelemedicineError::AppointmentNotJoinable(_)
            | TelemedicineError::InvalidSessionState(_)
            | TelemedicineError::OutsideJoinWindow => AppError::BadRequest(e.to_string()),
            TelemedicineError::Unauthorized(msg) => AppError::Forbidden(msg),
            TelemedicineError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
