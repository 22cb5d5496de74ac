use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{QueryBuilder, SupabaseClient};
use shared_models::auth::Role;
use shared_utils::validation::Validator;
use notification_cell::{NewNotification, NotificationKind, NotificationService};
use profile_cell::{ProfileError, ProfileService};

use crate::models::{
    Appointment, AppointmentError, AppointmentListQuery, AppointmentStatus, AppointmentType,
    BookAppointmentRequest, BookingRules, RescheduleAppointmentRequest, UpdateStatusRequest,
};
use crate::services::availability::{within_hours, AvailabilityService};
use crate::services::lifecycle::{authorize_transition, status_changes};

const TABLE: &str = "appointments";

pub struct AppointmentBookingService {
    supabase: SupabaseClient,
    profiles: ProfileService,
    availability: AvailabilityService,
    notifications: NotificationService,
    rules: BookingRules,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            profiles: ProfileService::new(config),
            availability: AvailabilityService::new(config),
            notifications: NotificationService::new(config),
            rules: BookingRules::default(),
        }
    }

    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let patient_id = match (request.patient_id, role) {
            (Some(id), _) => id,
            (None, Role::Patient) => caller_id,
            (None, _) => {
                return Err(AppointmentError::ValidationError("patient_id: is required".to_string()));
            },
        };

        match role {
            Role::Patient if patient_id != caller_id => {
                return Err(AppointmentError::Unauthorized(
                    "patients can only book their own appointments".to_string(),
                ));
            },
            Role::Physician if request.physician_id != caller_id => {
                return Err(AppointmentError::Unauthorized(
                    "physicians can only book onto their own schedule".to_string(),
                ));
            },
            _ => {},
        }

        debug!("Booking appointment for patient {} with physician {} at {}",
               patient_id, request.physician_id, request.starts_at);

        let duration_minutes = request.duration_minutes.unwrap_or(self.rules.default_duration_minutes);
        self.validate_time(request.starts_at, duration_minutes)
            .check(
                request.appointment_type == AppointmentType::Telemedicine || request.location_id.is_some(),
                "location_id",
                "is required for in-person appointments",
            )
            .optional_max_len("reason", request.reason.as_deref(), self.rules.max_reason_length)
            .into_result()
            .map_err(AppointmentError::ValidationError)?;

        self.profiles
            .get_physician(request.physician_id, auth_token)
            .await
            .map_err(|e| match e {
                ProfileError::NotFound => AppointmentError::PhysicianNotFound,
                other => AppointmentError::DatabaseError(other.to_string()),
            })?;

        let starts_at = request.starts_at;
        let ends_at = starts_at + Duration::minutes(duration_minutes);

        let (opens_at, closes_at) = self.availability.hours_for(request.location_id, auth_token).await?;
        if !within_hours(starts_at, ends_at, opens_at, closes_at) {
            return Err(AppointmentError::OutsideHours);
        }

        self.ensure_free(request.physician_id, patient_id, starts_at, ends_at, None, auth_token).await?;

        let now = Utc::now().to_rfc3339();
        let row = json!({
            "patient_id": patient_id,
            "physician_id": request.physician_id,
            "location_id": request.location_id,
            "starts_at": starts_at.to_rfc3339(),
            "ends_at": ends_at.to_rfc3339(),
            "appointment_type": request.appointment_type,
            "status": AppointmentStatus::Scheduled,
            "reason": request.reason,
            "created_at": now,
            "updated_at": now,
        });

        let appointment: Appointment = self.supabase
            .insert(TABLE, row, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        info!("Appointment {} booked for {}", appointment.id, appointment.starts_at);

        let when = appointment.starts_at.format("%Y-%m-%d %H:%M UTC").to_string();
        for recipient in [appointment.patient_id, appointment.physician_id] {
            let notification = NewNotification::new(
                recipient,
                NotificationKind::AppointmentBooked,
                "Appointment booked",
                format!("A {} appointment is booked for {}.", appointment.appointment_type, when),
            ).with_link(format!("/appointments/{}", appointment.id));
            self.notifications.notify_best_effort(notification, auth_token).await;
        }

        Ok(appointment)
    }

    fn validate_time(&self, starts_at: chrono::DateTime<Utc>, duration_minutes: i64) -> Validator {
        Validator::new()
            .range(
                "duration_minutes",
                duration_minutes,
                self.rules.min_duration_minutes,
                self.rules.max_duration_minutes,
            )
            .in_future("starts_at", starts_at, Utc::now())
    }

    /// Rejects the slot when the physician or the patient already has an
    /// active appointment overlapping it.
    async fn ensure_free(
        &self,
        physician_id: Uuid,
        patient_id: Uuid,
        starts_at: chrono::DateTime<Utc>,
        ends_at: chrono::DateTime<Utc>,
        exclude: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let not_excluded = |apt: &Appointment| Some(apt.id) != exclude;

        let physician_conflicts = self.availability
            .physician_appointments_between(physician_id, starts_at, ends_at, auth_token)
            .await?;
        if physician_conflicts.iter().any(not_excluded) {
            warn!("Physician {} already booked between {} and {}", physician_id, starts_at, ends_at);
            return Err(AppointmentError::ConflictDetected);
        }

        let patient_conflicts = self.availability
            .patient_appointments_between(patient_id, starts_at, ends_at, auth_token)
            .await?;
        if patient_conflicts.iter().any(not_excluded) {
            warn!("Patient {} already has an appointment between {} and {}", patient_id, starts_at, ends_at);
            return Err(AppointmentError::ConflictDetected);
        }

        Ok(())
    }

    pub async fn get_appointment(&self, appointment_id: Uuid, auth_token: &str) -> Result<Appointment, AppointmentError> {
        self.supabase
            .select_one(TABLE, &QueryBuilder::new().eq("id", appointment_id), auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?
            .ok_or(AppointmentError::NotFound)
    }

    /// Participants and staff only.
    pub async fn get_for_caller(
        &self,
        appointment_id: Uuid,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        if !role.is_staff() && !appointment.is_participant(&caller_id.to_string()) {
            return Err(AppointmentError::Unauthorized("not a participant of this appointment".to_string()));
        }
        Ok(appointment)
    }

    pub async fn list_appointments(
        &self,
        query: &AppointmentListQuery,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Listing appointments for {} ({})", caller_id, role);

        let mut q = QueryBuilder::new();
        q = match role {
            Role::Patient => q.eq("patient_id", caller_id),
            Role::Physician => q.eq("physician_id", caller_id),
            Role::Staff | Role::Admin => {
                let mut staff_q = q;
                if let Some(patient_id) = query.patient_id {
                    staff_q = staff_q.eq("patient_id", patient_id);
                }
                if let Some(physician_id) = query.physician_id {
                    staff_q = staff_q.eq("physician_id", physician_id);
                }
                staff_q
            },
        };
        if let Some(status) = query.status {
            q = q.eq("status", status);
        }
        if let Some(location_id) = query.location_id {
            q = q.eq("location_id", location_id);
        }
        if let Some(from) = query.from {
            q = q.gte_time("starts_at", from);
        }
        if let Some(to) = query.to {
            q = q.lt_time("starts_at", to);
        }
        let q = q
            .order("starts_at", true)
            .limit(query.limit.unwrap_or(50).clamp(1, 200));

        self.supabase
            .select(TABLE, &q, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        request: UpdateStatusRequest,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        let now = Utc::now();

        authorize_transition(&appointment, request.status, role, &caller_id.to_string(), now)?;

        Validator::new()
            .optional_max_len("reason", request.reason.as_deref(), self.rules.max_reason_length)
            .optional_max_len("notes", request.notes.as_deref(), 4000)
            .into_result()
            .map_err(AppointmentError::ValidationError)?;

        // Patients may cancel but not annotate the chart.
        let notes = if role == Role::Patient { None } else { request.notes.as_deref() };
        let changes = status_changes(request.status, request.reason.as_deref(), notes, now);

        let updated: Vec<Appointment> = self.supabase
            .update(TABLE, &QueryBuilder::new().eq("id", appointment_id), changes, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
        let updated = updated.into_iter().next().ok_or(AppointmentError::NotFound)?;

        info!("Appointment {} moved from {} to {} by {}", appointment_id, appointment.status, updated.status, role);

        let recipient = if caller_id == updated.patient_id { updated.physician_id } else { updated.patient_id };
        let notification = NewNotification::new(
            recipient,
            NotificationKind::AppointmentStatus,
            "Appointment updated",
            format!("Your appointment on {} is now {}.",
                    updated.starts_at.format("%Y-%m-%d %H:%M UTC"), updated.status),
        ).with_link(format!("/appointments/{}", updated.id));
        self.notifications.notify_best_effort(notification, auth_token).await;

        Ok(updated)
    }

    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_for_caller(appointment_id, caller_id, role, auth_token).await?;

        if appointment.status != AppointmentStatus::Scheduled {
            return Err(AppointmentError::InvalidStatusTransition {
                from: appointment.status,
                to: AppointmentStatus::Scheduled,
            });
        }
        if role == Role::Patient && appointment.starts_at <= Utc::now() {
            return Err(AppointmentError::Unauthorized(
                "appointments that have started cannot be rescheduled".to_string(),
            ));
        }

        let duration_minutes = request.duration_minutes.unwrap_or_else(|| appointment.duration_minutes());
        self.validate_time(request.starts_at, duration_minutes)
            .into_result()
            .map_err(AppointmentError::ValidationError)?;

        let starts_at = request.starts_at;
        let ends_at = starts_at + Duration::minutes(duration_minutes);

        let (opens_at, closes_at) = self.availability.hours_for(appointment.location_id, auth_token).await?;
        if !within_hours(starts_at, ends_at, opens_at, closes_at) {
            return Err(AppointmentError::OutsideHours);
        }

        self.ensure_free(
            appointment.physician_id,
            appointment.patient_id,
            starts_at,
            ends_at,
            Some(appointment.id),
            auth_token,
        ).await?;

        let changes = json!({
            "starts_at": starts_at.to_rfc3339(),
            "ends_at": ends_at.to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339(),
        });

        let updated: Vec<Appointment> = self.supabase
            .update(TABLE, &QueryBuilder::new().eq("id", appointment_id), changes, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
        let updated = updated.into_iter().next().ok_or(AppointmentError::NotFound)?;

        info!("Appointment {} rescheduled to {}", updated.id, updated.starts_at);

        for recipient in [updated.patient_id, updated.physician_id] {
            let notification = NewNotification::new(
                recipient,
                NotificationKind::AppointmentRescheduled,
                "Appointment rescheduled",
                format!("The appointment moved to {}.", updated.starts_at.format("%Y-%m-%d %H:%M UTC")),
            ).with_link(format!("/appointments/{}", updated.id));
            self.notifications.notify_best_effort(notification, auth_token).await;
        }

        Ok(updated)
    }
}
