use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AppointmentBooked,
    AppointmentRescheduled,
    AppointmentStatus,
    InvoiceIssued,
    PaymentReceived,
    ClaimUpdated,
    InsuranceVerified,
    General,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            NotificationKind::AppointmentBooked => "appointment_booked",
            NotificationKind::AppointmentRescheduled => "appointment_rescheduled",
            NotificationKind::AppointmentStatus => "appointment_status",
            NotificationKind::InvoiceIssued => "invoice_issued",
            NotificationKind::PaymentReceived => "payment_received",
            NotificationKind::ClaimUpdated => "claim_updated",
            NotificationKind::InsuranceVerified => "insurance_verified",
            NotificationKind::General => "general",
        };
        write!(f, "{}", value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

impl NewNotification {
    pub fn new(recipient_id: Uuid, kind: NotificationKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipient_id,
            kind,
            title: title.into(),
            body: body.into(),
            link: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationQuery {
    pub unread_only: Option<bool>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification not found")]
    NotFound,

    #[error("Not allowed to modify this notification")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<NotificationError> for AppError {
    fn from(e: NotificationError) -> Self {
        match e {
            NotificationError::NotFound => AppError::NotFound(e.to_string()),
            NotificationError::Unauthorized => AppError::Forbidden(e.to_string()),
            NotificationError::ValidationError(msg) => AppError::ValidationError(msg),
            NotificationError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
