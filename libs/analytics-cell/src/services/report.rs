use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use appointment_cell::Appointment;
use billing_cell::Invoice;
use profile_cell::{LocationQuery, LocationService};
use shared_config::AppConfig;
use shared_database::{QueryBuilder, SupabaseClient};

use crate::models::{AnalyticsError, AnalyticsQuery, NetworkOverview, Period, PhysicianSummary, RevenueReport};
use crate::services::aggregate;

const DEFAULT_PERIOD_DAYS: i64 = 365;

/// Rows fetched per request when loading a reporting window.
pub const PAGE_SIZE: i64 = 1000;

pub struct AnalyticsService {
    supabase: SupabaseClient,
    locations: LocationService,
}

/// Resolves the reporting window; defaults to the trailing year.
pub fn resolve_period(query: &AnalyticsQuery, now: DateTime<Utc>) -> Result<Period, AnalyticsError> {
    let to = query.to.unwrap_or(now);
    let from = query.from.unwrap_or(to - Duration::days(DEFAULT_PERIOD_DAYS));
    if from > to {
        return Err(AnalyticsError::InvalidPeriod("from must not be after to".to_string()));
    }
    Ok(Period { from, to })
}

impl AnalyticsService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            locations: LocationService::new(config),
        }
    }

    /// Reads every row matching `q`, one page at a time, until a short page.
    async fn select_all<T>(&self, table: &str, q: QueryBuilder, auth_token: &str) -> Result<Vec<T>, AnalyticsError>
    where T: DeserializeOwned {
        let mut rows: Vec<T> = Vec::new();
        loop {
            let page_q = q.clone().limit(PAGE_SIZE).offset(rows.len() as i64);
            let page: Vec<T> = self.supabase
                .select(table, &page_q, auth_token)
                .await
                .map_err(|e| AnalyticsError::DatabaseError(e.to_string()))?;
            let last = (page.len() as i64) < PAGE_SIZE;
            rows.extend(page);
            if last {
                return Ok(rows);
            }
            debug!("Fetched {} {} rows so far", rows.len(), table);
        }
    }

    async fn fetch_invoices(
        &self,
        period: &Period,
        location_id: Option<Uuid>,
        physician_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Invoice>, AnalyticsError> {
        let mut q = QueryBuilder::new()
            .gte_time("created_at", period.from)
            .lt_time("created_at", period.to);
        if let Some(id) = location_id {
            q = q.eq("location_id", id);
        }
        if let Some(id) = physician_id {
            q = q.eq("physician_id", id);
        }
        self.select_all("invoices", q.order("created_at", true), auth_token).await
    }

    async fn fetch_appointments(
        &self,
        period: &Period,
        physician_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AnalyticsError> {
        let mut q = QueryBuilder::new()
            .gte_time("starts_at", period.from)
            .lt_time("starts_at", period.to);
        if let Some(id) = physician_id {
            q = q.eq("physician_id", id);
        }
        self.select_all("appointments", q.order("starts_at", true), auth_token).await
    }

    pub async fn revenue_report(&self, query: &AnalyticsQuery, auth_token: &str) -> Result<RevenueReport, AnalyticsError> {
        let now = Utc::now();
        let period = resolve_period(query, now)?;
        let invoices = self
            .fetch_invoices(&period, query.location_id, query.physician_id, auth_token)
            .await?;
        debug!("Revenue report over {} invoices", invoices.len());

        Ok(RevenueReport {
            period,
            totals: aggregate::revenue_totals(&invoices),
            monthly: aggregate::monthly_revenue(&invoices),
            by_physician: aggregate::breakdown_by(&invoices, |i| i.physician_id),
            by_location: aggregate::breakdown_by(&invoices, |i| i.location_id),
            status_counts: aggregate::status_counts(&invoices),
            aging: aggregate::aging_buckets(&invoices, now),
        })
    }

    pub async fn network_overview(&self, query: &AnalyticsQuery, auth_token: &str) -> Result<NetworkOverview, AnalyticsError> {
        let now = Utc::now();
        let period = resolve_period(query, now)?;
        let appointments = self.fetch_appointments(&period, None, auth_token).await?;
        let invoices = self.fetch_invoices(&period, None, None, auth_token).await?;

        // Stats still render with raw ids if the directory lookup fails.
        let locations = match self
            .locations
            .list_locations(&LocationQuery { include_inactive: Some(true) }, auth_token)
            .await
        {
            Ok(rows) => rows.into_iter().map(|l| (l.id, l.name)).collect(),
            Err(e) => {
                warn!("Location lookup failed for network overview: {}", e);
                Vec::new()
            },
        };

        Ok(aggregate::network_overview(period, &appointments, &invoices, &locations, now))
    }

    pub async fn physician_summary(
        &self,
        physician_id: Uuid,
        query: &AnalyticsQuery,
        auth_token: &str,
    ) -> Result<PhysicianSummary, AnalyticsError> {
        let now = Utc::now();
        let period = resolve_period(query, now)?;
        let appointments = self.fetch_appointments(&period, Some(physician_id), auth_token).await?;
        let invoices = self.fetch_invoices(&period, None, Some(physician_id), auth_token).await?;
        let totals = aggregate::revenue_totals(&invoices);

        Ok(PhysicianSummary {
            period,
            physician_id,
            appointments: aggregate::appointment_counts(&appointments, now),
            billed_cents: totals.billed_cents,
            collected_cents: totals.collected_cents,
            outstanding_cents: totals.outstanding_cents,
        })
    }
}
