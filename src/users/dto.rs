use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{repo_types::User, UserError};

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> Result<String, UserError> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(UserError::Validation("invalid email".into()));
    }
    Ok(email)
}

fn check_password(password: &str) -> Result<(), UserError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(UserError::Validation("password too short".into()));
    }
    Ok(())
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    /// Trims and lower-cases only; malformed addresses surface as unknown.
    pub fn normalize(&mut self) {
        self.email = self.email.trim().to_lowercase();
    }
}

/// Request body for user creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub surnames: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub claims: Vec<i32>,
}

impl CreateUserRequest {
    pub fn normalize(&mut self) -> Result<(), UserError> {
        self.email = normalize_email(&self.email)?;
        check_password(&self.password)
    }
}

/// Merge-patch body: absent (or null) fields stay as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub surnames: Option<String>,
    pub email: Option<String>,
    pub old_password: Option<String>,
    pub new_password: Option<String>,
    pub claims: Option<Vec<i32>>,
}

impl UpdateUserRequest {
    pub fn normalize(&mut self) -> Result<(), UserError> {
        if let Some(email) = self.email.as_deref() {
            self.email = Some(normalize_email(email)?);
        }
        if let Some(password) = self.new_password.as_deref() {
            check_password(password)?;
        }
        Ok(())
    }
}

/// User as returned to clients. The password hash stays server-side.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub surnames: String,
    pub email: String,
    pub claims: Vec<i32>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id.to_string(),
            name: u.name,
            surnames: u.surnames,
            email: u.email,
            claims: u.claims,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserResponse,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct CreationResponse {
    pub inserted_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn login_request_folds_case_without_format_check() {
        let mut req = LoginRequest {
            email: "  NoBody ".into(),
            password: "whatever".into(),
        };
        req.normalize();
        assert_eq!(req.email, "nobody");
    }

    #[test]
    fn create_request_normalizes_email() {
        let mut req = CreateUserRequest {
            name: "Ann".into(),
            surnames: "Smith".into(),
            email: "  Ann@Example.COM ".into(),
            password: "long-enough".into(),
            claims: vec![],
        };
        req.normalize().expect("valid");
        assert_eq!(req.email, "ann@example.com");
    }

    #[test]
    fn create_request_rejects_bad_email_and_short_password() {
        let mut req = CreateUserRequest {
            name: "Ann".into(),
            surnames: "Smith".into(),
            email: "not-an-email".into(),
            password: "long-enough".into(),
            claims: vec![],
        };
        assert_matches!(req.normalize(), Err(UserError::Validation(_)));

        req.email = "ann@example.com".into();
        req.password = "short".into();
        assert_matches!(req.normalize(), Err(UserError::Validation(msg)) if msg == "password too short");
    }

    #[test]
    fn update_request_missing_fields_are_none() {
        let mut req: UpdateUserRequest =
            serde_json::from_str(r#"{"name": "New", "email": null}"#).unwrap();
        req.normalize().expect("valid");
        assert_eq!(req.name.as_deref(), Some("New"));
        assert!(req.email.is_none());
        assert!(req.surnames.is_none());
        assert!(req.new_password.is_none());
        assert!(req.claims.is_none());
    }

    #[test]
    fn user_response_hides_password_hash() {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: crate::store::ObjectId::new(),
            name: "Ann".into(),
            surnames: "Smith".into(),
            email: "ann@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            claims: vec![0],
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&UserResponse::from(user)).unwrap();
        assert!(json.contains("ann@example.com"));
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2"));
    }
}
