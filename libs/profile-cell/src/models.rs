use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::auth::Role;
use shared_models::error::AppError;

// ==============================================================================
// PROFILES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub specialty: Option<String>,
    pub npi: Option<String>,
    pub default_location_id: Option<Uuid>,
    pub stripe_customer_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// "Dr. Last" for physicians, full name otherwise.
    pub fn display_name(&self) -> String {
        match self.role {
            Role::Physician => format!("Dr. {}", self.last_name),
            _ => self.full_name(),
        }
    }

    pub fn is_bookable_physician(&self) -> bool {
        self.role == Role::Physician && self.is_active
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub specialty: Option<String>,
    pub default_location_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhysicianQuery {
    pub location_id: Option<Uuid>,
    pub specialty: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientSearchQuery {
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ==============================================================================
// LOCATIONS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub phone: Option<String>,
    pub timezone: String,
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLocationRequest {
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub phone: Option<String>,
    pub timezone: Option<String>,
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateLocationRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
    pub timezone: Option<String>,
    pub opens_at: Option<NaiveTime>,
    pub closes_at: Option<NaiveTime>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationQuery {
    pub include_inactive: Option<bool>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum ProfileError {
    #[error("Profile not found")]
    NotFound,

    #[error("Location not found")]
    LocationNotFound,

    #[error("Not allowed to access this profile")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<ProfileError> for AppError {
    fn from(e: ProfileError) -> Self {
        match e {
            ProfileError::NotFound | ProfileError::LocationNotFound => AppError::NotFound(e.to_string()),
            ProfileError::Unauthorized => AppError::Forbidden(e.to_string()),
            ProfileError::ValidationError(msg) => AppError::ValidationError(msg),
            ProfileError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
