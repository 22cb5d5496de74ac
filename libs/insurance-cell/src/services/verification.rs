use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{QueryBuilder, SupabaseClient};
use shared_models::auth::Role;
use shared_utils::validation::Validator;
use notification_cell::{NewNotification, NotificationKind, NotificationService};

use crate::models::{
    CreateVerificationRequest, InsuranceError, InsuranceVerification, RecordVerificationRequest,
    VerificationListQuery, VerificationStatus,
};

const TABLE: &str = "insurance_verifications";

pub struct VerificationService {
    supabase: SupabaseClient,
    notifications: NotificationService,
}

impl VerificationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            notifications: NotificationService::new(config),
        }
    }

    pub async fn create_verification(
        &self,
        request: CreateVerificationRequest,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<InsuranceVerification, InsuranceError> {
        let patient_id = match (role, request.patient_id) {
            (Role::Patient, Some(id)) if id != caller_id => {
                return Err(InsuranceError::Unauthorized("patients can only submit their own insurance".to_string()));
            },
            (Role::Patient, _) => caller_id,
            (r, Some(id)) if r.is_staff() => id,
            (r, None) if r.is_staff() => {
                return Err(InsuranceError::ValidationError("patient_id: is required".to_string()));
            },
            _ => {
                return Err(InsuranceError::Unauthorized("only patients and staff submit insurance".to_string()));
            },
        };

        Validator::new()
            .required("payer_name", &request.payer_name)
            .max_len("payer_name", &request.payer_name, 200)
            .required("member_id", &request.member_id)
            .max_len("member_id", &request.member_id, 64)
            .optional_max_len("group_number", request.group_number.as_deref(), 64)
            .optional_max_len("plan_name", request.plan_name.as_deref(), 200)
            .into_result()
            .map_err(InsuranceError::ValidationError)?;

        let row = json!({
            "patient_id": patient_id,
            "payer_name": request.payer_name.trim(),
            "member_id": request.member_id.trim(),
            "group_number": request.group_number,
            "plan_name": request.plan_name,
            "status": VerificationStatus::Pending,
            "created_at": Utc::now().to_rfc3339(),
        });

        let verification: InsuranceVerification = self.supabase
            .insert(TABLE, row, auth_token)
            .await
            .map_err(|e| InsuranceError::DatabaseError(e.to_string()))?;

        info!("Insurance verification {} opened for patient {}", verification.id, patient_id);
        Ok(verification)
    }

    /// Staff record the payer's answer.
    pub async fn record_result(
        &self,
        verification_id: Uuid,
        request: RecordVerificationRequest,
        staff_id: Uuid,
        auth_token: &str,
    ) -> Result<InsuranceVerification, InsuranceError> {
        let current = self.get_verification(verification_id, auth_token).await?;
        if !current.status.can_become(request.status) {
            return Err(InsuranceError::InvalidTransition { from: current.status, to: request.status });
        }

        let mut validator = Validator::new();
        match request.status {
            VerificationStatus::Verified => {
                let dates_ok = match (request.coverage_start, request.coverage_end) {
                    (Some(start), Some(end)) => start <= end,
                    _ => false,
                };
                validator = validator.check(dates_ok, "coverage", "start and end dates are required, start on or before end");
            },
            VerificationStatus::Failed => {
                validator = validator.required("failure_reason", request.failure_reason.as_deref().unwrap_or(""));
            },
            _ => {},
        }
        for (field, value) in [
            ("copay_cents", request.copay_cents),
            ("deductible_cents", request.deductible_cents),
            ("deductible_met_cents", request.deductible_met_cents),
        ] {
            if let Some(v) = value {
                validator = validator.non_negative(field, v);
            }
        }
        validator.into_result().map_err(InsuranceError::ValidationError)?;

        let mut changes = Map::new();
        changes.insert("status".to_string(), json!(request.status));
        if request.status == VerificationStatus::Verified {
            changes.insert("verified_by".to_string(), json!(staff_id));
            changes.insert("verified_at".to_string(), json!(Utc::now().to_rfc3339()));
            changes.insert("coverage_start".to_string(), json!(request.coverage_start));
            changes.insert("coverage_end".to_string(), json!(request.coverage_end));
            changes.insert("copay_cents".to_string(), json!(request.copay_cents));
            changes.insert("deductible_cents".to_string(), json!(request.deductible_cents));
            changes.insert("deductible_met_cents".to_string(), json!(request.deductible_met_cents));
        }
        if request.status == VerificationStatus::Failed {
            changes.insert("failure_reason".to_string(), json!(request.failure_reason));
        }

        let updated: Vec<InsuranceVerification> = self.supabase
            .update(TABLE, &QueryBuilder::new().eq("id", verification_id), Value::Object(changes), auth_token)
            .await
            .map_err(|e| InsuranceError::DatabaseError(e.to_string()))?;
        let updated = updated.into_iter().next().ok_or(InsuranceError::NotFound)?;

        info!("Verification {} recorded as {} by {}", updated.id, updated.status, staff_id);

        let body = match updated.status {
            VerificationStatus::Verified => format!("Your {} coverage has been verified.", updated.payer_name),
            VerificationStatus::Failed => format!("We could not verify your {} coverage.", updated.payer_name),
            _ => format!("Your {} verification is now {}.", updated.payer_name, updated.status),
        };
        let notification = NewNotification::new(
            updated.patient_id,
            NotificationKind::InsuranceVerified,
            "Insurance verification",
            body,
        ).with_link(format!("/insurance/verifications/{}", updated.id));
        self.notifications.notify_best_effort(notification, auth_token).await;

        Ok(updated)
    }

    pub async fn get_verification(&self, verification_id: Uuid, auth_token: &str) -> Result<InsuranceVerification, InsuranceError> {
        self.supabase
            .select_one(TABLE, &QueryBuilder::new().eq("id", verification_id), auth_token)
            .await
            .map_err(|e| InsuranceError::DatabaseError(e.to_string()))?
            .ok_or(InsuranceError::NotFound)
    }

    /// Patients see only their own verifications.
    pub async fn get_for_caller(
        &self,
        verification_id: Uuid,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<InsuranceVerification, InsuranceError> {
        let verification = self.get_verification(verification_id, auth_token).await?;
        if role == Role::Patient && verification.patient_id != caller_id {
            return Err(InsuranceError::Unauthorized("not your insurance record".to_string()));
        }
        Ok(verification)
    }

    pub async fn list_verifications(
        &self,
        query: &VerificationListQuery,
        caller_id: Uuid,
        role: Role,
        auth_token: &str,
    ) -> Result<Vec<InsuranceVerification>, InsuranceError> {
        let patient_id = if role == Role::Patient { Some(caller_id) } else { query.patient_id };

        let mut q = QueryBuilder::new();
        if let Some(patient_id) = patient_id {
            q = q.eq("patient_id", patient_id);
        }
        if let Some(status) = query.status {
            q = q.eq("status", status);
        }
        let q = q.order("created_at", false).limit(100);

        self.supabase
            .select(TABLE, &q, auth_token)
            .await
            .map_err(|e| InsuranceError::DatabaseError(e.to_string()))
    }

    /// The most recent verification usable for billing today.
    pub async fn active_for_patient(&self, patient_id: Uuid, auth_token: &str) -> Result<InsuranceVerification, InsuranceError> {
        debug!("Looking up active insurance for patient {}", patient_id);

        let q = QueryBuilder::new()
            .eq("patient_id", patient_id)
            .eq("status", VerificationStatus::Verified)
            .order("verified_at", false);

        let rows: Vec<InsuranceVerification> = self.supabase
            .select(TABLE, &q, auth_token)
            .await
            .map_err(|e| InsuranceError::DatabaseError(e.to_string()))?;

        let now = Utc::now();
        rows.into_iter()
            .find(|v| v.is_active_at(now))
            .ok_or(InsuranceError::NoActiveVerification)
    }
}
