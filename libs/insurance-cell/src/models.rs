use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::error::AppError;

/// How long a successful verification stays usable for claims.
pub const VERIFICATION_FRESHNESS_DAYS: i64 = 90;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceVerification {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub payer_name: String,
    pub member_id: String,
    pub group_number: Option<String>,
    pub plan_name: Option<String>,
    pub status: VerificationStatus,
    pub copay_cents: Option<i64>,
    pub deductible_cents: Option<i64>,
    pub deductible_met_cents: Option<i64>,
    pub coverage_start: Option<NaiveDate>,
    pub coverage_end: Option<NaiveDate>,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InsuranceVerification {
    pub fn covers(&self, day: NaiveDate) -> bool {
        match (self.coverage_start, self.coverage_end) {
            (Some(start), Some(end)) => start <= day && day <= end,
            _ => false,
        }
    }

    /// Verified, coverage includes today, and checked within the freshness window.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        let fresh = self
            .verified_at
            .is_some_and(|at| now - at <= Duration::days(VERIFICATION_FRESHNESS_DAYS));

        self.status == VerificationStatus::Verified && fresh && self.covers(now.date_naive())
    }

    pub fn remaining_deductible_cents(&self) -> Option<i64> {
        let deductible = self.deductible_cents?;
        Some((deductible - self.deductible_met_cents.unwrap_or(0)).max(0))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Failed,
    Expired,
}

impl VerificationStatus {
    pub fn can_become(&self, next: VerificationStatus) -> bool {
        matches!(
            (self, next),
            (VerificationStatus::Pending, VerificationStatus::Verified)
                | (VerificationStatus::Pending, VerificationStatus::Failed)
                | (VerificationStatus::Verified, VerificationStatus::Expired)
        )
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Failed => "failed",
            VerificationStatus::Expired => "expired",
        };
        write!(f, "{}", value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVerificationRequest {
    /// Defaults to the caller for patients.
    pub patient_id: Option<Uuid>,
    pub payer_name: String,
    pub member_id: String,
    pub group_number: Option<String>,
    pub plan_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordVerificationRequest {
    pub status: VerificationStatus,
    pub copay_cents: Option<i64>,
    pub deductible_cents: Option<i64>,
    pub deductible_met_cents: Option<i64>,
    pub coverage_start: Option<NaiveDate>,
    pub coverage_end: Option<NaiveDate>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerificationListQuery {
    pub patient_id: Option<Uuid>,
    pub status: Option<VerificationStatus>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum InsuranceError {
    #[error("Insurance verification not found")]
    NotFound,

    #[error("No active insurance verification for patient")]
    NoActiveVerification,

    #[error("Cannot change verification from {from} to {to}")]
    InvalidTransition { from: VerificationStatus, to: VerificationStatus },

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<InsuranceError> for AppError {
    fn from(e: InsuranceError) -> Self {
        match e {
            InsuranceError::NotFound | InsuranceError::NoActiveVerification => AppError::NotFound(e.to_string()),
            InsuranceError::InvalidTransition { .. } => AppError::BadRequest(e.to_string()),
            InsuranceError::Unauthorized(msg) => AppError::Forbidden(msg),
            InsuranceError::ValidationError(msg) => AppError::ValidationError(msg),
            InsuranceError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
