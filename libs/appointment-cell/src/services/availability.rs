use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{QueryBuilder, SupabaseClient};
use profile_cell::LocationService;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, AvailabilityQuery, AvailabilityResponse,
    AvailableSlot, BookingRules,
};

/// Candidate slots in `[opens_at, closes_at)` stepping by `step`, dropping any
/// that start before `now` or overlap an active appointment.
pub fn open_slots(
    date: NaiveDate,
    opens_at: NaiveTime,
    closes_at: NaiveTime,
    duration: Duration,
    step: Duration,
    booked: &[Appointment],
    now: DateTime<Utc>,
) -> Vec<AvailableSlot> {
    let day_start = date.and_time(opens_at).and_utc();
    let day_end = date.and_time(closes_at).and_utc();

    let mut slots = Vec::new();
    let mut cursor = day_start;
    while cursor + duration <= day_end {
        let end = cursor + duration;
        let taken = booked
            .iter()
            .any(|apt| apt.status.is_active() && apt.overlaps(cursor, end));

        if cursor > now && !taken {
            slots.push(AvailableSlot { starts_at: cursor, ends_at: end });
        }
        cursor += step;
    }
    slots
}

/// Whether `[start, end)` falls inside a single day's opening hours.
pub fn within_hours(start: DateTime<Utc>, end: DateTime<Utc>, opens_at: NaiveTime, closes_at: NaiveTime) -> bool {
    start.date_naive() == end.date_naive()
        && start.time() >= opens_at
        && end.time() <= closes_at
}

pub struct AvailabilityService {
    supabase: SupabaseClient,
    locations: LocationService,
    rules: BookingRules,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            locations: LocationService::new(config),
            rules: BookingRules::default(),
        }
    }

    /// Opening hours for the location, or the practice default.
    pub async fn hours_for(
        &self,
        location_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(NaiveTime, NaiveTime), AppointmentError> {
        match location_id {
            Some(id) => {
                let location = self.locations
                    .get_location(id, auth_token)
                    .await
                    .map_err(|_| AppointmentError::LocationNotFound)?;
                if !location.is_active {
                    return Err(AppointmentError::LocationNotFound);
                }
                Ok((location.opens_at, location.closes_at))
            },
            None => Ok((self.rules.default_opens_at, self.rules.default_closes_at)),
        }
    }

    /// Active appointments of a physician intersecting `[start, end)`.
    pub async fn physician_appointments_between(
        &self,
        physician_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.active_between("physician_id", physician_id, start, end, auth_token).await
    }

    pub async fn patient_appointments_between(
        &self,
        patient_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.active_between("patient_id", patient_id, start, end, auth_token).await
    }

    async fn active_between(
        &self,
        column: &str,
        id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let q = QueryBuilder::new()
            .eq(column, id)
            .in_list("status", &AppointmentStatus::ACTIVE)
            .lt_time("starts_at", end)
            .gt_time("ends_at", start)
            .order("starts_at", true);

        let rows: Vec<Appointment> = self.supabase
            .select("appointments", &q, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter(|apt| apt.status.is_active() && apt.overlaps(start, end))
            .collect())
    }

    pub async fn get_availability(
        &self,
        query: &AvailabilityQuery,
        auth_token: &str,
    ) -> Result<AvailabilityResponse, AppointmentError> {
        let duration_minutes = query.duration_minutes.unwrap_or(self.rules.default_duration_minutes);
        if duration_minutes < self.rules.min_duration_minutes || duration_minutes > self.rules.max_duration_minutes {
            return Err(AppointmentError::ValidationError(format!(
                "duration_minutes: must be between {} and {}",
                self.rules.min_duration_minutes, self.rules.max_duration_minutes
            )));
        }

        debug!("Computing availability for physician {} on {}", query.physician_id, query.date);

        let (opens_at, closes_at) = self.hours_for(query.location_id, auth_token).await?;
        let day_start = query.date.and_time(opens_at).and_utc();
        let day_end = query.date.and_time(closes_at).and_utc();

        let booked = self
            .physician_appointments_between(query.physician_id, day_start, day_end, auth_token)
            .await?;

        let slots = open_slots(
            query.date,
            opens_at,
            closes_at,
            Duration::minutes(duration_minutes),
            self.rules.slot_step(),
            &booked,
            Utc::now(),
        );

        Ok(AvailabilityResponse {
            physician_id: query.physician_id,
            date: query.date,
            duration_minutes,
            slots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentType;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 3, h, m, 0).unwrap()
    }

    fn booked(start: DateTime<Utc>, minutes: i64, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            physician_id: Uuid::new_v4(),
            location_id: None,
            starts_at: start,
            ends_at: start + Duration::minutes(minutes),
            appointment_type: AppointmentType::InPerson,
            status,
            reason: None,
            notes: None,
            cancellation_reason: None,
            checked_in_at: None,
            completed_at: None,
            created_at: start,
            updated_at: start,
        }
    }

    fn hours() -> (NaiveDate, NaiveTime, NaiveTime) {
        (
            NaiveDate::from_ymd_opt(2030, 6, 3).unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_empty_day_yields_every_step() {
        let (date, opens, closes) = hours();
        let slots = open_slots(date, opens, closes, Duration::minutes(30), Duration::minutes(30), &[], at(0, 0));
        assert_eq!(slots.len(), 6);
        assert_eq!(slots[0].starts_at, at(9, 0));
        assert_eq!(slots[5].ends_at, at(12, 0));
    }

    #[test]
    fn test_active_appointment_blocks_overlapping_slots() {
        let (date, opens, closes) = hours();
        let existing = vec![booked(at(10, 0), 45, AppointmentStatus::Scheduled)];
        let slots = open_slots(date, opens, closes, Duration::minutes(30), Duration::minutes(30), &existing, at(0, 0));

        let starts: Vec<_> = slots.iter().map(|s| s.starts_at).collect();
        assert!(!starts.contains(&at(10, 0)));
        assert!(!starts.contains(&at(10, 30)));
        assert!(starts.contains(&at(9, 30)), "slot ending exactly at 10:00 stays open");
        assert!(starts.contains(&at(11, 0)));
    }

    #[test]
    fn test_cancelled_appointment_frees_slot() {
        let (date, opens, closes) = hours();
        let existing = vec![booked(at(10, 0), 30, AppointmentStatus::Cancelled)];
        let slots = open_slots(date, opens, closes, Duration::minutes(30), Duration::minutes(30), &existing, at(0, 0));
        assert!(slots.iter().any(|s| s.starts_at == at(10, 0)));
    }

    #[test]
    fn test_past_slots_are_dropped() {
        let (date, opens, closes) = hours();
        let slots = open_slots(date, opens, closes, Duration::minutes(30), Duration::minutes(30), &[], at(10, 15));
        assert_eq!(slots.first().map(|s| s.starts_at), Some(at(10, 30)));
    }

    #[test]
    fn test_long_visit_must_fit_before_closing() {
        let (date, opens, closes) = hours();
        let slots = open_slots(date, opens, closes, Duration::minutes(90), Duration::minutes(30), &[], at(0, 0));
        assert_eq!(slots.last().map(|s| s.starts_at), Some(at(10, 30)));
    }

    #[test]
    fn test_within_hours() {
        let (_, opens, closes) = hours();
        assert!(within_hours(at(9, 0), at(9, 30), opens, closes));
        assert!(within_hours(at(11, 30), at(12, 0), opens, closes));
        assert!(!within_hours(at(8, 30), at(9, 0), opens, closes));
        assert!(!within_hours(at(11, 45), at(12, 15), opens, closes));
    }
}
