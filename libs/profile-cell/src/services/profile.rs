use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{QueryBuilder, SupabaseClient};
use shared_models::auth::Role;
use shared_utils::validation::Validator;

use crate::models::{PatientSearchQuery, PhysicianQuery, Profile, ProfileError, UpdateProfileRequest};

const TABLE: &str = "profiles";

pub struct ProfileService {
    supabase: SupabaseClient,
}

impl ProfileService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_profile(&self, profile_id: Uuid, auth_token: &str) -> Result<Profile, ProfileError> {
        debug!("Fetching profile {}", profile_id);

        self.supabase
            .select_one(TABLE, &QueryBuilder::new().eq("id", profile_id), auth_token)
            .await
            .map_err(|e| ProfileError::DatabaseError(e.to_string()))?
            .ok_or(ProfileError::NotFound)
    }

    /// Active physician lookup used by booking.
    pub async fn get_physician(&self, physician_id: Uuid, auth_token: &str) -> Result<Profile, ProfileError> {
        let profile = self.get_profile(physician_id, auth_token).await?;
        if !profile.is_bookable_physician() {
            return Err(ProfileError::NotFound);
        }
        Ok(profile)
    }

    pub async fn update_profile(
        &self,
        profile_id: Uuid,
        request: UpdateProfileRequest,
        auth_token: &str,
    ) -> Result<Profile, ProfileError> {
        debug!("Updating profile {}", profile_id);

        let mut validator = Validator::new()
            .optional_max_len("first_name", request.first_name.as_deref(), 100)
            .optional_max_len("last_name", request.last_name.as_deref(), 100)
            .optional_max_len("specialty", request.specialty.as_deref(), 100)
            .optional_phone("phone", request.phone.as_deref());
        if let Some(first_name) = &request.first_name {
            validator = validator.required("first_name", first_name);
        }
        if let Some(last_name) = &request.last_name {
            validator = validator.required("last_name", last_name);
        }
        if let Some(dob) = request.date_of_birth {
            validator = validator.check(dob < Utc::now().date_naive(), "date_of_birth", "must be in the past");
        }
        validator.into_result().map_err(ProfileError::ValidationError)?;

        let mut changes = Map::new();
        if let Some(first_name) = request.first_name {
            changes.insert("first_name".to_string(), json!(first_name.trim()));
        }
        if let Some(last_name) = request.last_name {
            changes.insert("last_name".to_string(), json!(last_name.trim()));
        }
        if let Some(phone) = request.phone {
            changes.insert("phone".to_string(), json!(phone));
        }
        if let Some(dob) = request.date_of_birth {
            changes.insert("date_of_birth".to_string(), json!(dob));
        }
        if let Some(specialty) = request.specialty {
            changes.insert("specialty".to_string(), json!(specialty));
        }
        if let Some(location_id) = request.default_location_id {
            changes.insert("default_location_id".to_string(), json!(location_id));
        }
        changes.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let updated: Vec<Profile> = self.supabase
            .update(TABLE, &QueryBuilder::new().eq("id", profile_id), Value::Object(changes), auth_token)
            .await
            .map_err(|e| ProfileError::DatabaseError(e.to_string()))?;

        let profile = updated.into_iter().next().ok_or(ProfileError::NotFound)?;
        info!("Profile {} updated", profile.id);
        Ok(profile)
    }

    pub async fn list_physicians(&self, query: &PhysicianQuery, auth_token: &str) -> Result<Vec<Profile>, ProfileError> {
        debug!("Listing physicians: {:?}", query);

        let mut q = QueryBuilder::new()
            .eq("role", Role::Physician)
            .eq("is_active", true);
        if let Some(location_id) = query.location_id {
            q = q.eq("default_location_id", location_id);
        }
        if let Some(specialty) = query.specialty.as_deref().filter(|s| !s.trim().is_empty()) {
            q = q.ilike("specialty", specialty.trim());
        }
        let q = q.order("last_name", true);

        self.supabase
            .select(TABLE, &q, auth_token)
            .await
            .map_err(|e| ProfileError::DatabaseError(e.to_string()))
    }

    pub async fn search_patients(&self, query: &PatientSearchQuery, auth_token: &str) -> Result<Vec<Profile>, ProfileError> {
        debug!("Searching patients: {:?}", query);

        let mut q = QueryBuilder::new().eq("role", Role::Patient);
        if let Some(term) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            // PostgREST or-groups reserve commas and parentheses.
            let term: String = term.chars().filter(|c| !matches!(c, ',' | '(' | ')')).collect();
            let term = urlencoding::encode(&term);
            q = q.or(&format!(
                "first_name.ilike.*{0}*,last_name.ilike.*{0}*,email.ilike.*{0}*",
                term
            ));
        }
        let q = q
            .order("last_name", true)
            .limit(query.limit.unwrap_or(50).clamp(1, 200))
            .offset(query.offset.unwrap_or(0).max(0));

        self.supabase
            .select(TABLE, &q, auth_token)
            .await
            .map_err(|e| ProfileError::DatabaseError(e.to_string()))
    }
}
