use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{QueryBuilder, SupabaseClient};
use shared_models::auth::Role;
use appointment_cell::{Appointment, AppointmentBookingService, AppointmentError, AppointmentStatus, AppointmentType};

use crate::models::{
    JoinInfo, ParticipantRole, SessionStatus, TelemedicineError, TelemedicineSession, EARLY_JOIN_MINUTES,
};

const TABLE: &str = "telemedicine_sessions";

/// Participants may join from shortly before the start until the scheduled end.
pub fn join_window_open(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= starts_at - Duration::minutes(EARLY_JOIN_MINUTES) && now <= ends_at
}

pub fn room_name() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("visit-{}", suffix)
}

/// Whole minutes between start and end, never negative.
pub fn elapsed_minutes(started_at: Option<DateTime<Utc>>, ended_at: DateTime<Utc>) -> i64 {
    started_at
        .map(|start| (ended_at - start).num_minutes().max(0))
        .unwrap_or(0)
}

pub struct SessionService {
    supabase: SupabaseClient,
    appointments: AppointmentBookingService,
    base_url: String,
}

impl SessionService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            appointments: AppointmentBookingService::new(config),
            base_url: config.telemedicine_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn appointment(&self, appointment_id: Uuid, auth_token: &str) -> Result<Appointment, TelemedicineError> {
        self.appointments
            .get_appointment(appointment_id, auth_token)
            .await
            .map_err(|e| match e {
                AppointmentError::NotFound => TelemedicineError::AppointmentNotFound,
                other => TelemedicineError::DatabaseError(other.to_string()),
            })
    }

    fn can_manage(role: Role, caller_id: Uuid, physician_id: Uuid) -> bool {
        role.is_staff() || (role == Role::Physician && caller_id == physician_id)
    }

    /// Opens the room for a telemedicine appointment, or returns the one already open.
    pub async fn create_session(
        &self,
        appointment_id: Uuid,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<TelemedicineSession, TelemedicineError> {
        let appointment = self.appointment(appointment_id, auth_token).await?;

        if !Self::can_manage(role, caller_id, appointment.physician_id) {
            return Err(TelemedicineError::Unauthorized("only the assigned physician or staff can open a session".to_string()));
        }
        if appointment.appointment_type != AppointmentType::Telemedicine {
            return Err(TelemedicineError::NotTelemedicine);
        }
        if !matches!(appointment.status, AppointmentStatus::Scheduled | AppointmentStatus::CheckedIn) {
            return Err(TelemedicineError::AppointmentNotJoinable(appointment.status.to_string()));
        }

        if let Some(existing) = self.find_for_appointment(appointment_id, auth_token).await? {
            debug!("Reusing session {} for appointment {}", existing.id, appointment_id);
            return Ok(existing);
        }

        let room = room_name();
        let row = json!({
            "appointment_id": appointment.id,
            "patient_id": appointment.patient_id,
            "physician_id": appointment.physician_id,
            "room_name": room,
            "room_url": format!("{}/{}", self.base_url, room),
            "status": SessionStatus::Waiting,
            "created_at": Utc::now().to_rfc3339(),
        });

        let session: TelemedicineSession = self.supabase
            .insert(TABLE, row, auth_token)
            .await
            .map_err(|e| TelemedicineError::DatabaseError(e.to_string()))?;

        info!("Telemedicine session {} created for appointment {}", session.id, appointment_id);
        Ok(session)
    }

    async fn find_for_appointment(&self, appointment_id: Uuid, auth_token: &str) -> Result<Option<TelemedicineSession>, TelemedicineError> {
        let q = QueryBuilder::new()
            .eq("appointment_id", appointment_id)
            .neq("status", SessionStatus::Cancelled)
            .order("created_at", false)
            .limit(1);

        self.supabase
            .select_one(TABLE, &q, auth_token)
            .await
            .map_err(|e| TelemedicineError::DatabaseError(e.to_string()))
    }

    pub async fn get_session(&self, session_id: Uuid, auth_token: &str) -> Result<TelemedicineSession, TelemedicineError> {
        self.supabase
            .select_one(TABLE, &QueryBuilder::new().eq("id", session_id), auth_token)
            .await
            .map_err(|e| TelemedicineError::DatabaseError(e.to_string()))?
            .ok_or(TelemedicineError::NotFound)
    }

    fn check_access(session: &TelemedicineSession, caller_id: Uuid, role: Role) -> Result<(), TelemedicineError> {
        if role.is_staff() || session.is_participant(caller_id) {
            Ok(())
        } else {
            Err(TelemedicineError::Unauthorized("not a participant of this session".to_string()))
        }
    }

    pub async fn get_for_caller(
        &self,
        session_id: Uuid,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<TelemedicineSession, TelemedicineError> {
        let session = self.get_session(session_id, auth_token).await?;
        Self::check_access(&session, caller_id, role)?;
        Ok(session)
    }

    pub async fn session_for_appointment(
        &self,
        appointment_id: Uuid,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<TelemedicineSession, TelemedicineError> {
        let session = self
            .find_for_appointment(appointment_id, auth_token)
            .await?
            .ok_or(TelemedicineError::NotFound)?;
        Self::check_access(&session, caller_id, role)?;
        Ok(session)
    }

    pub async fn join_session(
        &self,
        session_id: Uuid,
        caller_id: Uuid,
        auth_token: &str,
    ) -> Result<JoinInfo, TelemedicineError> {
        let mut session = self.get_session(session_id, auth_token).await?;
        if !session.is_participant(caller_id) {
            return Err(TelemedicineError::Unauthorized("only the patient and physician can join".to_string()));
        }
        if !session.status.is_open() {
            return Err(TelemedicineError::InvalidSessionState(session.status));
        }

        let appointment = self.appointment(session.appointment_id, auth_token).await?;
        let now = Utc::now();
        if !join_window_open(appointment.starts_at, appointment.ends_at, now) {
            return Err(TelemedicineError::OutsideJoinWindow);
        }

        let is_physician = caller_id == session.physician_id;
        if is_physician && session.status == SessionStatus::Waiting {
            session = self.patch(session_id, json!({
                "status": SessionStatus::Active,
                "started_at": now.to_rfc3339(),
            }), auth_token).await?;
            info!("Session {} started by physician {}", session_id, caller_id);
        }

        Ok(JoinInfo {
            session_id: session.id,
            room_name: session.room_name,
            room_url: session.room_url,
            participant_role: if is_physician { ParticipantRole::Host } else { ParticipantRole::Guest },
            status: session.status,
            appointment_starts_at: appointment.starts_at,
            appointment_ends_at: appointment.ends_at,
        })
    }

    pub async fn end_session(
        &self,
        session_id: Uuid,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<TelemedicineSession, TelemedicineError> {
        let session = self.get_session(session_id, auth_token).await?;
        if !Self::can_manage(role, caller_id, session.physician_id) {
            return Err(TelemedicineError::Unauthorized("only the physician or staff can end a session".to_string()));
        }
        if session.status != SessionStatus::Active {
            return Err(TelemedicineError::InvalidSessionState(session.status));
        }

        let now = Utc::now();
        let ended = self.patch(session_id, json!({
            "status": SessionStatus::Ended,
            "ended_at": now.to_rfc3339(),
            "duration_minutes": elapsed_minutes(session.started_at, now),
        }), auth_token).await?;

        info!("Session {} ended after {} minutes", session_id, ended.duration_minutes.unwrap_or(0));
        Ok(ended)
    }

    pub async fn cancel_session(
        &self,
        session_id: Uuid,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<TelemedicineSession, TelemedicineError> {
        let session = self.get_session(session_id, auth_token).await?;
        if !Self::can_manage(role, caller_id, session.physician_id) {
            return Err(TelemedicineError::Unauthorized("only the physician or staff can cancel a session".to_string()));
        }
        if session.status != SessionStatus::Waiting {
            return Err(TelemedicineError::InvalidSessionState(session.status));
        }

        let cancelled = self.patch(session_id, json!({ "status": SessionStatus::Cancelled }), auth_token).await?;
        info!("Session {} cancelled", session_id);
        Ok(cancelled)
    }

    async fn patch(&self, session_id: Uuid, changes: Value, auth_token: &str) -> Result<TelemedicineSession, TelemedicineError> {
        let rows: Vec<TelemedicineSession> = self.supabase
            .update(TABLE, &QueryBuilder::new().eq("id", session_id), changes, auth_token)
            .await
            .map_err(|e| TelemedicineError::DatabaseError(e.to_string()))?;
        rows.into_iter().next().ok_or(TelemedicineError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_join_window() {
        let start = Utc.with_ymd_and_hms(2030, 5, 1, 14, 0, 0).unwrap();
        let end = start + Duration::minutes(30);

        assert!(!join_window_open(start, end, start - Duration::minutes(16)));
        assert!(join_window_open(start, end, start - Duration::minutes(15)));
        assert!(join_window_open(start, end, start + Duration::minutes(10)));
        assert!(join_window_open(start, end, end));
        assert!(!join_window_open(start, end, end + Duration::seconds(1)));
    }

    #[test]
    fn test_room_names_are_random() {
        let a = room_name();
        let b = room_name();

        assert!(a.starts_with("visit-"));
        assert_eq!(a.len(), "visit-".len() + 12);
        assert_ne!(a, b);
    }

    #[test]
    fn test_elapsed_minutes() {
        let start = Utc.with_ymd_and_hms(2030, 5, 1, 14, 0, 0).unwrap();
        assert_eq!(elapsed_minutes(Some(start), start + Duration::minutes(27)), 27);
        assert_eq!(elapsed_minutes(Some(start), start - Duration::minutes(5)), 0);
        assert_eq!(elapsed_minutes(None, start), 0);
    }
}
