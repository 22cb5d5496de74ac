use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{QueryBuilder, SupabaseClient};
use shared_utils::validation::Validator;

use crate::models::{CreateLocationRequest, Location, LocationQuery, ProfileError, UpdateLocationRequest};

const TABLE: &str = "locations";

pub struct LocationService {
    supabase: SupabaseClient,
}

impl LocationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn list_locations(&self, query: &LocationQuery, auth_token: &str) -> Result<Vec<Location>, ProfileError> {
        let mut q = QueryBuilder::new();
        if !query.include_inactive.unwrap_or(false) {
            q = q.eq("is_active", true);
        }
        let q = q.order("name", true);

        self.supabase
            .select(TABLE, &q, auth_token)
            .await
            .map_err(|e| ProfileError::DatabaseError(e.to_string()))
    }

    pub async fn get_location(&self, location_id: Uuid, auth_token: &str) -> Result<Location, ProfileError> {
        debug!("Fetching location {}", location_id);

        self.supabase
            .select_one(TABLE, &QueryBuilder::new().eq("id", location_id), auth_token)
            .await
            .map_err(|e| ProfileError::DatabaseError(e.to_string()))?
            .ok_or(ProfileError::LocationNotFound)
    }

    pub async fn create_location(&self, request: CreateLocationRequest, auth_token: &str) -> Result<Location, ProfileError> {
        debug!("Creating location {}", request.name);

        Validator::new()
            .required("name", &request.name)
            .max_len("name", &request.name, 120)
            .required("address", &request.address)
            .required("city", &request.city)
            .required("state", &request.state)
            .required("postal_code", &request.postal_code)
            .optional_phone("phone", request.phone.as_deref())
            .check(request.opens_at < request.closes_at, "opens_at", "must be before closes_at")
            .into_result()
            .map_err(ProfileError::ValidationError)?;

        let now = Utc::now().to_rfc3339();
        let row = json!({
            "name": request.name.trim(),
            "address": request.address,
            "city": request.city,
            "state": request.state,
            "postal_code": request.postal_code,
            "phone": request.phone,
            "timezone": request.timezone.unwrap_or_else(|| "UTC".to_string()),
            "opens_at": request.opens_at.format("%H:%M:%S").to_string(),
            "closes_at": request.closes_at.format("%H:%M:%S").to_string(),
            "is_active": true,
            "created_at": now,
            "updated_at": now,
        });

        let location: Location = self.supabase
            .insert(TABLE, row, auth_token)
            .await
            .map_err(|e| ProfileError::DatabaseError(e.to_string()))?;

        info!("Location {} created", location.id);
        Ok(location)
    }

    pub async fn update_location(
        &self,
        location_id: Uuid,
        request: UpdateLocationRequest,
        auth_token: &str,
    ) -> Result<Location, ProfileError> {
        debug!("Updating location {}", location_id);

        let current = self.get_location(location_id, auth_token).await?;
        let opens_at = request.opens_at.unwrap_or(current.opens_at);
        let closes_at = request.closes_at.unwrap_or(current.closes_at);

        let mut validator = Validator::new()
            .optional_phone("phone", request.phone.as_deref())
            .check(opens_at < closes_at, "opens_at", "must be before closes_at");
        if let Some(name) = &request.name {
            validator = validator.required("name", name).max_len("name", name, 120);
        }
        validator.into_result().map_err(ProfileError::ValidationError)?;

        let mut changes = Map::new();
        if let Some(name) = request.name {
            changes.insert("name".to_string(), json!(name.trim()));
        }
        if let Some(address) = request.address {
            changes.insert("address".to_string(), json!(address));
        }
        if let Some(city) = request.city {
            changes.insert("city".to_string(), json!(city));
        }
        if let Some(state) = request.state {
            changes.insert("state".to_string(), json!(state));
        }
        if let Some(postal_code) = request.postal_code {
            changes.insert("postal_code".to_string(), json!(postal_code));
        }
        if let Some(phone) = request.phone {
            changes.insert("phone".to_string(), json!(phone));
        }
        if let Some(timezone) = request.timezone {
            changes.insert("timezone".to_string(), json!(timezone));
        }
        if request.opens_at.is_some() {
            changes.insert("opens_at".to_string(), json!(opens_at.format("%H:%M:%S").to_string()));
        }
        if request.closes_at.is_some() {
            changes.insert("closes_at".to_string(), json!(closes_at.format("%H:%M:%S").to_string()));
        }
        if let Some(is_active) = request.is_active {
            changes.insert("is_active".to_string(), json!(is_active));
        }
        changes.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let updated: Vec<Location> = self.supabase
            .update(TABLE, &QueryBuilder::new().eq("id", location_id), Value::Object(changes), auth_token)
            .await
            .map_err(|e| ProfileError::DatabaseError(e.to_string()))?;

        updated.into_iter().next().ok_or(ProfileError::LocationNotFound)
    }
}
