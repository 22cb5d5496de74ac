use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{QueryBuilder, SupabaseClient};
use shared_models::auth::Role;
use shared_utils::money::format_cents;
use shared_utils::validation::Validator;
use appointment_cell::{AppointmentBookingService, AppointmentError, AppointmentStatus};
use profile_cell::{Profile, ProfileService};

use crate::models::{BillingError, CreateEncounterRequest, Encounter, Superbill, SuperbillParty};
use crate::services::totals::superbill_lines;

const TABLE: &str = "encounters";

pub struct EncounterService {
    supabase: SupabaseClient,
    appointments: AppointmentBookingService,
    profiles: ProfileService,
}

fn validate_encounter(request: &CreateEncounterRequest) -> Result<(), BillingError> {
    let mut validator = Validator::new()
        .check(!request.diagnosis_codes.is_empty(), "diagnosis_codes", "at least one diagnosis is required")
        .check(!request.procedures.is_empty(), "procedures", "at least one procedure is required")
        .optional_max_len("notes", request.notes.as_deref(), 4000);

    for code in &request.diagnosis_codes {
        validator = validator.icd10("diagnosis_codes", &code.trim().to_uppercase());
    }
    for procedure in &request.procedures {
        validator = validator
            .cpt("procedures.code", &procedure.code)
            .required("procedures.description", &procedure.description)
            .positive("procedures.units", procedure.units)
            .non_negative("procedures.unit_price_cents", procedure.unit_price_cents);
    }

    validator.into_result().map_err(BillingError::ValidationError)
}

impl EncounterService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            appointments: AppointmentBookingService::new(config),
            profiles: ProfileService::new(config),
        }
    }

    /// Documents a completed visit. Only the treating physician or staff may do so.
    pub async fn create_encounter(
        &self,
        request: CreateEncounterRequest,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<Encounter, BillingError> {
        validate_encounter(&request)?;

        let appointment = self.appointments
            .get_appointment(request.appointment_id, auth_token)
            .await
            .map_err(|e| match e {
                AppointmentError::NotFound => BillingError::AppointmentNotFound,
                other => BillingError::DatabaseError(other.to_string()),
            })?;

        if !(role.is_staff() || (role == Role::Physician && appointment.physician_id == caller_id)) {
            return Err(BillingError::Unauthorized("only the treating physician or staff can document this visit".to_string()));
        }
        if appointment.status != AppointmentStatus::Completed {
            return Err(BillingError::AppointmentNotCompleted);
        }

        let existing: Vec<serde_json::Value> = self.supabase
            .select(TABLE, &QueryBuilder::new().select("id").eq("appointment_id", appointment.id), auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;
        if !existing.is_empty() {
            return Err(BillingError::DuplicateEncounter);
        }

        let diagnosis_codes: Vec<String> = request.diagnosis_codes.iter().map(|c| c.trim().to_uppercase()).collect();
        let row = json!({
            "appointment_id": appointment.id,
            "patient_id": appointment.patient_id,
            "physician_id": appointment.physician_id,
            "location_id": appointment.location_id,
            "diagnosis_codes": diagnosis_codes,
            "procedures": request.procedures,
            "notes": request.notes,
            "created_at": Utc::now().to_rfc3339(),
        });

        let encounter: Encounter = self.supabase
            .insert(TABLE, row, auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        info!("Encounter {} recorded for appointment {}", encounter.id, appointment.id);
        Ok(encounter)
    }

    pub async fn get_encounter(&self, encounter_id: Uuid, auth_token: &str) -> Result<Encounter, BillingError> {
        self.supabase
            .select_one(TABLE, &QueryBuilder::new().eq("id", encounter_id), auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?
            .ok_or(BillingError::EncounterNotFound)
    }

    /// Patients read their own encounters, physicians the ones they treated.
    pub async fn get_for_caller(
        &self,
        encounter_id: Uuid,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<Encounter, BillingError> {
        let encounter = self.get_encounter(encounter_id, auth_token).await?;
        let allowed = match role {
            Role::Patient => encounter.patient_id == caller_id,
            Role::Physician => encounter.physician_id == caller_id,
            Role::Staff | Role::Admin => true,
        };
        if !allowed {
            return Err(BillingError::Unauthorized("not your encounter".to_string()));
        }
        Ok(encounter)
    }

    pub async fn superbill(
        &self,
        encounter_id: Uuid,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<Superbill, BillingError> {
        let encounter = self.get_for_caller(encounter_id, caller_id, role, auth_token).await?;

        let provider = self.party(encounter.physician_id, auth_token).await?;
        let patient = self.party(encounter.patient_id, auth_token).await?;

        let date_of_service = self.appointments
            .get_appointment(encounter.appointment_id, auth_token)
            .await
            .map(|apt| apt.starts_at.date_naive())
            .unwrap_or_else(|_| encounter.created_at.date_naive());

        let lines = superbill_lines(&encounter.procedures);
        let total_cents = lines.iter().map(|l| l.line_total_cents).sum();

        Ok(Superbill {
            encounter_id: encounter.id,
            date_of_service,
            provider,
            patient,
            location_id: encounter.location_id,
            diagnosis_codes: encounter.diagnosis_codes,
            lines,
            total_cents,
            total_display: format_cents(total_cents),
        })
    }

    async fn party(&self, profile_id: Uuid, auth_token: &str) -> Result<SuperbillParty, BillingError> {
        let profile: Profile = self.profiles
            .get_profile(profile_id, auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        Ok(SuperbillParty {
            id: profile.id,
            name: profile.display_name(),
            npi: profile.npi,
            specialty: profile.specialty,
            date_of_birth: profile.date_of_birth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProcedureLine;
    use assert_matches::assert_matches;

    fn request(codes: &[&str], cpt: &str) -> CreateEncounterRequest {
        CreateEncounterRequest {
            appointment_id: Uuid::new_v4(),
            diagnosis_codes: codes.iter().map(|c| c.to_string()).collect(),
            procedures: vec![ProcedureLine {
                code: cpt.to_string(),
                description: "Office visit".to_string(),
                units: 1,
                unit_price_cents: 12_000,
            }],
            notes: None,
        }
    }

    #[test]
    fn test_valid_codes_pass() {
        assert!(validate_encounter(&request(&["J06.9", "E11"], "99213")).is_ok());
    }

    #[test]
    fn test_bad_icd10_rejected() {
        assert_matches!(
            validate_encounter(&request(&["flu"], "99213")),
            Err(BillingError::ValidationError(msg)) if msg.contains("diagnosis_codes")
        );
    }

    #[test]
    fn test_bad_cpt_rejected() {
        assert_matches!(
            validate_encounter(&request(&["J06.9"], "9921")),
            Err(BillingError::ValidationError(msg)) if msg.contains("procedures.code")
        );
    }

    #[test]
    fn test_empty_encounter_rejected() {
        let mut empty = request(&[], "99213");
        empty.procedures.clear();
        let err = validate_encounter(&empty).unwrap_err().to_string();
        assert!(err.contains("diagnosis_codes") && err.contains("procedures"));
    }
}
