use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use shared_models::error::AppError;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid email regex")
    })
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?[0-9 ().-]{7,20}$").expect("valid phone regex"))
}

fn icd10_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-TV-Z][0-9][0-9A-Z](\.[0-9A-Z]{1,4})?$").expect("valid ICD-10 regex"))
}

fn cpt_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{4}[0-9A-Z]$").expect("valid CPT regex"))
}

/// Collects field errors for a request, then reports them all at once.
///
/// ```
/// use shared_utils::validation::Validator;
///
/// let result = Validator::new()
///     .required("payer_name", "")
///     .max_len("member_id", "ABC123", 40)
///     .finish();
/// assert!(result.is_err());
/// ```
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(mut self, field: &str, message: &str) -> Self {
        self.errors.push(format!("{}: {}", field, message));
        self
    }

    pub fn check(self, ok: bool, field: &str, message: &str) -> Self {
        if ok { self } else { self.fail(field, message) }
    }

    pub fn required(self, field: &str, value: &str) -> Self {
        let ok = !value.trim().is_empty();
        self.check(ok, field, "is required")
    }

    pub fn max_len(self, field: &str, value: &str, max: usize) -> Self {
        let ok = value.chars().count() <= max;
        self.check(ok, field, &format!("must be at most {} characters", max))
    }

    pub fn optional_max_len(self, field: &str, value: Option<&str>, max: usize) -> Self {
        match value {
            Some(v) => self.max_len(field, v, max),
            None => self,
        }
    }

    pub fn email(self, field: &str, value: &str) -> Self {
        let ok = email_regex().is_match(value);
        self.check(ok, field, "must be a valid email address")
    }

    pub fn optional_phone(self, field: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => {
                let ok = phone_regex().is_match(v);
                self.check(ok, field, "must be a valid phone number")
            },
            None => self,
        }
    }

    pub fn range(self, field: &str, value: i64, min: i64, max: i64) -> Self {
        let ok = value >= min && value <= max;
        self.check(ok, field, &format!("must be between {} and {}", min, max))
    }

    pub fn positive(self, field: &str, value: i64) -> Self {
        self.check(value > 0, field, "must be greater than zero")
    }

    pub fn non_negative(self, field: &str, value: i64) -> Self {
        self.check(value >= 0, field, "must not be negative")
    }

    pub fn in_future(self, field: &str, value: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        self.check(value > now, field, "must be in the future")
    }

    pub fn icd10(self, field: &str, code: &str) -> Self {
        let ok = icd10_regex().is_match(code);
        self.check(ok, field, &format!("{} is not a valid ICD-10 code", code))
    }

    pub fn cpt(self, field: &str, code: &str) -> Self {
        let ok = cpt_regex().is_match(code);
        self.check(ok, field, &format!("{} is not a valid CPT code", code))
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Joined field messages, for cells that wrap them in their own error type.
    pub fn into_result(self) -> Result<(), String> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors.join("; "))
        }
    }

    pub fn finish(self) -> Result<(), AppError> {
        self.into_result().map_err(AppError::ValidationError)
    }
}
