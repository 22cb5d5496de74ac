use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

/// Practice role carried by every authenticated user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Physician,
    Staff,
    Admin,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "patient" => Some(Role::Patient),
            "physician" | "doctor" | "provider" => Some(Role::Physician),
            "staff" | "front_desk" | "biller" => Some(Role::Staff),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Portal the user lands on after sign-in.
    pub fn portal(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Physician => "physician",
            Role::Staff | Role::Admin => "admin",
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Staff | Role::Admin)
    }

    pub fn is_clinical(&self) -> bool {
        matches!(self, Role::Physician | Role::Staff | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Patient => write!(f, "patient"),
            Role::Physician => write!(f, "physician"),
            Role::Staff => write!(f, "staff"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Resolves the practice role. Supabase puts `authenticated` in the
    /// top-level claim, so the metadata role wins when present.
    pub fn practice_role(&self) -> Role {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("role"))
            .and_then(|r| r.as_str())
            .and_then(Role::parse)
            .or_else(|| self.role.as_deref().and_then(Role::parse))
            .unwrap_or(Role::Patient)
    }

    pub fn is_staff(&self) -> bool {
        self.practice_role().is_staff()
    }

    /// Token subject as a profile id.
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.id)
            .map_err(|_| AppError::Auth("Token subject is not a valid user id".to_string()))
    }

    pub fn is(&self, id: impl fmt::Display) -> bool {
        self.id == id.to_string()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub valid: bool,
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(role: Option<&str>, metadata: Option<serde_json::Value>) -> User {
        User {
            id: "u1".to_string(),
            email: None,
            role: role.map(str::to_string),
            metadata,
            created_at: None,
        }
    }

    #[test]
    fn test_metadata_role_wins_over_claim() {
        let u = user(Some("authenticated"), Some(json!({"role": "physician"})));
        assert_eq!(u.practice_role(), Role::Physician);
    }

    #[test]
    fn test_claim_role_used_without_metadata() {
        assert_eq!(user(Some("admin"), None).practice_role(), Role::Admin);
        assert_eq!(user(Some("doctor"), None).practice_role(), Role::Physician);
    }

    #[test]
    fn test_unknown_role_defaults_to_patient() {
        assert_eq!(user(Some("authenticated"), None).practice_role(), Role::Patient);
        assert_eq!(user(None, None).practice_role(), Role::Patient);
    }

    #[test]
    fn test_portals() {
        assert_eq!(Role::Patient.portal(), "patient");
        assert_eq!(Role::Physician.portal(), "physician");
        assert_eq!(Role::Staff.portal(), "admin");
        assert!(Role::Admin.is_staff());
        assert!(!Role::Physician.is_staff());
        assert!(Role::Physician.is_clinical());
    }
}
