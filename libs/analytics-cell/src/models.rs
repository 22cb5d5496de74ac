// =====================================================================================
// ANALYTICS CELL MODELS
// =====================================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::error::AppError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub location_id: Option<Uuid>,
    pub physician_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Period {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RevenueTotals {
    pub billed_cents: i64,
    /// Patient payments plus payer adjustments.
    pub collected_cents: i64,
    pub outstanding_cents: i64,
    pub insurance_adjustments_cents: i64,
    pub collection_rate: f64,
    pub invoice_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonthlyRevenue {
    /// `YYYY-MM`
    pub month: String,
    pub billed_cents: i64,
    pub collected_cents: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RevenueBreakdown {
    /// `None` groups invoices without a physician or location.
    pub id: Option<Uuid>,
    pub billed_cents: i64,
    pub collected_cents: i64,
    pub invoice_count: usize,
}

/// Unpaid balances by days since the invoice was issued.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgingBuckets {
    pub days_0_30_cents: i64,
    pub days_31_60_cents: i64,
    pub days_61_90_cents: i64,
    pub days_over_90_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueReport {
    pub period: Period,
    pub totals: RevenueTotals,
    pub monthly: Vec<MonthlyRevenue>,
    pub by_physician: Vec<RevenueBreakdown>,
    pub by_location: Vec<RevenueBreakdown>,
    pub status_counts: BTreeMap<String, usize>,
    pub aging: AgingBuckets,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppointmentCounts {
    pub total: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub no_shows: usize,
    pub telemedicine: usize,
    pub upcoming: usize,
    pub completion_rate: f64,
    pub no_show_rate: f64,
    pub telemedicine_share: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationStats {
    pub location_id: Option<Uuid>,
    pub location_name: String,
    pub appointments: AppointmentCounts,
    pub active_physicians: usize,
    pub revenue_collected_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkOverview {
    pub period: Period,
    pub locations: Vec<LocationStats>,
    pub totals: AppointmentCounts,
    pub active_physicians: usize,
    pub revenue_collected_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicianSummary {
    pub period: Period,
    pub physician_id: Uuid,
    pub appointments: AppointmentCounts,
    pub billed_cents: i64,
    pub collected_cents: i64,
    pub outstanding_cents: i64,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalyticsError {
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AnalyticsError> for AppError {
    fn from(e: AnalyticsError) -> Self {
        match e {
            AnalyticsError::InvalidPeriod(_) => AppError::BadRequest(e.to_string()),
            AnalyticsError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
