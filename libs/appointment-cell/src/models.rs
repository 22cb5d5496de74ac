// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::fmt;

use shared_models::error::AppError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub physician_id: Uuid,
    pub location_id: Option<Uuid>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn duration_minutes(&self) -> i64 {
        (self.ends_at - self.starts_at).num_minutes()
    }

    /// Half-open interval overlap: touching appointments do not conflict.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.starts_at < end && start < self.ends_at
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.patient_id.to_string() == user_id || self.physician_id.to_string() == user_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    CheckedIn,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Statuses that hold a slot on the calendar.
    pub const ACTIVE: [AppointmentStatus; 3] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::CheckedIn,
        AppointmentStatus::InProgress,
    ];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::CheckedIn => write!(f, "checked_in"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    #[serde(alias = "office", alias = "in_office")]
    InPerson,
    #[serde(alias = "telehealth", alias = "virtual", alias = "video")]
    Telemedicine,
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::InPerson => write!(f, "in_person"),
            AppointmentType::Telemedicine => write!(f, "telemedicine"),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    /// Defaults to the caller when omitted.
    pub patient_id: Option<Uuid>,
    pub physician_id: Uuid,
    pub location_id: Option<Uuid>,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
    pub appointment_type: AppointmentType,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQuery {
    pub physician_id: Uuid,
    pub date: NaiveDate,
    pub duration_minutes: Option<i64>,
    pub location_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailableSlot {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub physician_id: Uuid,
    pub date: NaiveDate,
    pub duration_minutes: i64,
    pub slots: Vec<AvailableSlot>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub status: Option<AppointmentStatus>,
    pub patient_id: Option<Uuid>,
    pub physician_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

// ==============================================================================
// BOOKING RULES
// ==============================================================================

#[derive(Debug, Clone)]
pub struct BookingRules {
    pub min_duration_minutes: i64,
    pub max_duration_minutes: i64,
    pub default_duration_minutes: i64,
    pub slot_step_minutes: i64,
    pub default_opens_at: NaiveTime,
    pub default_closes_at: NaiveTime,
    pub max_reason_length: usize,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            min_duration_minutes: 15,
            max_duration_minutes: 120,
            default_duration_minutes: 30,
            slot_step_minutes: 30,
            default_opens_at: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            default_closes_at: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            max_reason_length: 500,
        }
    }
}

impl BookingRules {
    pub fn slot_step(&self) -> Duration {
        Duration::minutes(self.slot_step_minutes)
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Physician not found or not accepting appointments")]
    PhysicianNotFound,

    #[error("Location not found or inactive")]
    LocationNotFound,

    #[error("Requested time conflicts with an existing appointment")]
    ConflictDetected,

    #[error("Requested time is outside location hours")]
    OutsideHours,

    #[error("Cannot change appointment from {from} to {to}")]
    InvalidStatusTransition { from: AppointmentStatus, to: AppointmentStatus },

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound
            | AppointmentError::PhysicianNotFound
            | AppointmentError::LocationNotFound => AppError::NotFound(e.to_string()),
            AppointmentError::ConflictDetected => AppError::Conflict(e.to_string()),
            AppointmentError::OutsideHours
            | AppointmentError::InvalidStatusTransition { .. } => AppError::BadRequest(e.to_string()),
            AppointmentError::Unauthorized(msg) => AppError::Forbidden(msg),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
