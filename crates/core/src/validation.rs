//! Credential validation support

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

/// Validation failures, each carrying the message shown to the user
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Email is required")]
    EmailRequired,

    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("Password is required")]
    PasswordRequired,

    #[error("Password must be at least {MIN_PASSWORD_LEN} characters")]
    PasswordTooShort,
}

/// Email/password pair sent to the login and registration endpoints
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Check the credentials locally before they are sent anywhere
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_email(&self.email)?;
        validate_password(&self.password)
    }

    /// Login only requires an email; its format is the server's business
    pub fn validate_login(&self) -> Result<(), ValidationError> {
        if self.email.trim().is_empty() {
            return Err(ValidationError::EmailRequired);
        }
        validate_password(&self.password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() {
        return Err(ValidationError::EmailRequired);
    }
    if !EMAIL_PATTERN.is_match(email) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::PasswordRequired);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_credentials() {
        assert!(Credentials::new("a@b.com", "secret1").validate().is_ok());
    }

    #[test]
    fn test_login_skips_email_format() {
        assert!(Credentials::new("ada", "secret1").validate_login().is_ok());
        assert!(Credentials::new("ada", "secret1").validate().is_err());
        assert_eq!(
            Credentials::new(" ", "secret1").validate_login(),
            Err(ValidationError::EmailRequired)
        );
        assert_eq!(
            Credentials::new("ada", "12345").validate_login(),
            Err(ValidationError::PasswordTooShort)
        );
    }

    #[test]
    fn test_email_rules() {
        assert_eq!(validate_email(""), Err(ValidationError::EmailRequired));
        assert_eq!(validate_email("   "), Err(ValidationError::EmailRequired));
        assert_eq!(validate_email("a@b"), Err(ValidationError::InvalidEmail));
        assert_eq!(
            validate_email("a b@c.com"),
            Err(ValidationError::InvalidEmail)
        );
        assert_eq!(validate_email("@b.com"), Err(ValidationError::InvalidEmail));
        assert!(validate_email("first.last@example.co.uk").is_ok());
    }

    #[test]
    fn test_password_rules() {
        assert_eq!(validate_password(""), Err(ValidationError::PasswordRequired));
        assert_eq!(
            validate_password("12345"),
            Err(ValidationError::PasswordTooShort)
        );
        assert!(validate_password("123456").is_ok());
    }

    #[test]
    fn test_messages_are_user_facing() {
        assert_eq!(
            ValidationError::PasswordTooShort.to_string(),
            "Password must be at least 6 characters"
        );
        assert_eq!(
            ValidationError::InvalidEmail.to_string(),
            "Please enter a valid email address"
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", Credentials::new("a@b.com", "secret1"));
        assert!(rendered.contains("a@b.com"));
        assert!(!rendered.contains("secret1"));
    }

    #[test]
    fn test_serializes_as_login_body() {
        let body = serde_json::to_value(Credentials::new("a@b.com", "secret1")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"email": "a@b.com", "password": "secret1"})
        );
    }
}
