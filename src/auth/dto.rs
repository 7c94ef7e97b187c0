use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::auth::store::Role;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Request body for account creation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub photo: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub password: String,
    pub password_confirm: String,
}

/// Shared password rules for signup, reset, and update.
pub(crate) fn password_problems(password: &str, confirm: &str) -> Vec<String> {
    let mut problems = Vec::new();
    if password.len() < 8 {
        problems.push("A password must have at least 8 characters".to_string());
    }
    if password != confirm {
        problems.push("Passwords are not equal".to_string());
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(is_valid_email("guide@example.com"));
        assert!(is_valid_email("lead.guide+tours@example.co.uk"));
    }

    #[test]
    fn rejects_junk() {
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("missing@tld"));
        assert!(!is_valid_email("spaces in@example.com"));
    }

    #[test]
    fn password_rules_aggregate() {
        assert!(password_problems("pass1234", "pass1234").is_empty());
        assert_eq!(password_problems("short", "short").len(), 1);
        assert_eq!(password_problems("short", "other").len(), 2);
    }
}
