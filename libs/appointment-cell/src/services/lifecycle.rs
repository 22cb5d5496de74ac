use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use shared_models::auth::Role;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, AppointmentType};

/// Edges of the appointment status graph. `Scheduled -> InProgress` is only
/// taken by telemedicine visits; `authorize_transition` enforces that.
pub fn is_allowed_edge(from: AppointmentStatus, to: AppointmentStatus) -> bool {
    use AppointmentStatus::*;
    matches!(
        (from, to),
        (Scheduled, CheckedIn)
            | (Scheduled, InProgress)
            | (Scheduled, Cancelled)
            | (Scheduled, NoShow)
            | (CheckedIn, InProgress)
            | (CheckedIn, Cancelled)
            | (CheckedIn, NoShow)
            | (InProgress, Completed)
    )
}

/// Checks the edge, then who may take it.
pub fn authorize_transition(
    appointment: &Appointment,
    to: AppointmentStatus,
    role: Role,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<(), AppointmentError> {
    let from = appointment.status;
    if !is_allowed_edge(from, to) {
        return Err(AppointmentError::InvalidStatusTransition { from, to });
    }
    let skips_check_in = from == AppointmentStatus::Scheduled && to == AppointmentStatus::InProgress;
    if skips_check_in && appointment.appointment_type != AppointmentType::Telemedicine {
        return Err(AppointmentError::InvalidStatusTransition { from, to });
    }

    let is_assigned_physician = role == Role::Physician && appointment.physician_id.to_string() == user_id;
    let is_owner_patient = role == Role::Patient && appointment.patient_id.to_string() == user_id;

    let permitted = match to {
        AppointmentStatus::CheckedIn => role.is_staff(),
        AppointmentStatus::InProgress | AppointmentStatus::Completed => role.is_staff() || is_assigned_physician,
        AppointmentStatus::NoShow => {
            if now < appointment.starts_at {
                return Err(AppointmentError::ValidationError(
                    "status: cannot mark a no-show before the appointment starts".to_string(),
                ));
            }
            role.is_staff() || is_assigned_physician
        },
        AppointmentStatus::Cancelled => {
            role.is_staff() || (is_owner_patient && now < appointment.starts_at)
        },
        AppointmentStatus::Scheduled => false,
    };

    if permitted {
        Ok(())
    } else {
        Err(AppointmentError::Unauthorized(format!(
            "{} cannot change this appointment to {}",
            role, to
        )))
    }
}

/// Row changes for a status write, including the timestamp the status implies.
pub fn status_changes(
    to: AppointmentStatus,
    reason: Option<&str>,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Value {
    let mut changes = Map::new();
    changes.insert("status".to_string(), json!(to));
    changes.insert("updated_at".to_string(), json!(now.to_rfc3339()));

    match to {
        AppointmentStatus::CheckedIn => {
            changes.insert("checked_in_at".to_string(), json!(now.to_rfc3339()));
        },
        AppointmentStatus::Completed => {
            changes.insert("completed_at".to_string(), json!(now.to_rfc3339()));
        },
        AppointmentStatus::Cancelled => {
            changes.insert("cancellation_reason".to_string(), json!(reason));
        },
        _ => {},
    }

    if let Some(notes) = notes {
        changes.insert("notes".to_string(), json!(notes));
    }

    Value::Object(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn appointment(status: AppointmentStatus, starts_in_hours: i64) -> Appointment {
        let starts_at = Utc::now() + Duration::hours(starts_in_hours);
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            physician_id: Uuid::new_v4(),
            location_id: None,
            starts_at,
            ends_at: starts_at + Duration::minutes(30),
            appointment_type: AppointmentType::InPerson,
            status,
            reason: None,
            notes: None,
            cancellation_reason: None,
            checked_in_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_happy_path_edges() {
        use AppointmentStatus::*;
        assert!(is_allowed_edge(Scheduled, CheckedIn));
        assert!(is_allowed_edge(CheckedIn, InProgress));
        assert!(is_allowed_edge(InProgress, Completed));
        assert!(!is_allowed_edge(Scheduled, Completed));
        assert!(!is_allowed_edge(Completed, Cancelled));
        assert!(!is_allowed_edge(Cancelled, Scheduled));
    }

    #[test]
    fn test_only_staff_checks_in() {
        let apt = appointment(AppointmentStatus::Scheduled, 1);
        let physician = apt.physician_id.to_string();
        let now = Utc::now();

        assert!(authorize_transition(&apt, AppointmentStatus::CheckedIn, Role::Staff, "desk", now).is_ok());
        assert!(matches!(
            authorize_transition(&apt, AppointmentStatus::CheckedIn, Role::Physician, &physician, now),
            Err(AppointmentError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_only_assigned_physician_completes() {
        let apt = appointment(AppointmentStatus::InProgress, 0);
        let now = Utc::now();
        let assigned = apt.physician_id.to_string();
        let other = Uuid::new_v4().to_string();

        assert!(authorize_transition(&apt, AppointmentStatus::Completed, Role::Physician, &assigned, now).is_ok());
        assert!(authorize_transition(&apt, AppointmentStatus::Completed, Role::Physician, &other, now).is_err());
    }

    #[test]
    fn test_patient_cancels_own_before_start_only() {
        let upcoming = appointment(AppointmentStatus::Scheduled, 2);
        let patient = upcoming.patient_id.to_string();
        assert!(authorize_transition(&upcoming, AppointmentStatus::Cancelled, Role::Patient, &patient, Utc::now()).is_ok());

        let started = appointment(AppointmentStatus::Scheduled, -1);
        let patient = started.patient_id.to_string();
        assert!(authorize_transition(&started, AppointmentStatus::Cancelled, Role::Patient, &patient, Utc::now()).is_err());

        let stranger = Uuid::new_v4().to_string();
        assert!(authorize_transition(&upcoming, AppointmentStatus::Cancelled, Role::Patient, &stranger, Utc::now()).is_err());
    }

    #[test]
    fn test_no_show_requires_start_time_passed() {
        let apt = appointment(AppointmentStatus::Scheduled, 3);
        let result = authorize_transition(&apt, AppointmentStatus::NoShow, Role::Staff, "desk", Utc::now());
        assert!(matches!(result, Err(AppointmentError::ValidationError(_))));
    }

    #[test]
    fn test_invalid_edge_reports_statuses() {
        let apt = appointment(AppointmentStatus::Completed, -2);
        let err = authorize_transition(&apt, AppointmentStatus::Cancelled, Role::Admin, "admin", Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), "Cannot change appointment from completed to cancelled");
    }

    #[test]
    fn test_in_person_visit_must_check_in_first() {
        let apt = appointment(AppointmentStatus::Scheduled, 0);
        let physician = apt.physician_id.to_string();
        let result = authorize_transition(&apt, AppointmentStatus::InProgress, Role::Physician, &physician, Utc::now());
        assert!(matches!(result, Err(AppointmentError::InvalidStatusTransition { .. })));

        let mut video = appointment(AppointmentStatus::Scheduled, 0);
        video.appointment_type = AppointmentType::Telemedicine;
        let physician = video.physician_id.to_string();
        assert!(authorize_transition(&video, AppointmentStatus::InProgress, Role::Physician, &physician, Utc::now()).is_ok());
    }

    #[test]
    fn test_physician_cannot_cancel() {
        let apt = appointment(AppointmentStatus::Scheduled, 2);
        let physician = apt.physician_id.to_string();
        let result = authorize_transition(&apt, AppointmentStatus::Cancelled, Role::Physician, &physician, Utc::now());
        assert!(matches!(result, Err(AppointmentError::Unauthorized(_))));
        assert!(authorize_transition(&apt, AppointmentStatus::Cancelled, Role::Staff, "desk", Utc::now()).is_ok());
    }

    #[test]
    fn test_status_changes_stamp_timestamps() {
        let now = Utc::now();
        let checked_in = status_changes(AppointmentStatus::CheckedIn, None, None, now);
        assert_eq!(checked_in["status"], "checked_in");
        assert!(checked_in.get("checked_in_at").is_some());

        let cancelled = status_changes(AppointmentStatus::Cancelled, Some("Feeling better"), None, now);
        assert_eq!(cancelled["cancellation_reason"], "Feeling better");
        assert!(cancelled.get("completed_at").is_none());
    }
}
