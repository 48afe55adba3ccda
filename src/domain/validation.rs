//! Boundary validators.
//!
//! Each function normalises its input and returns the cleaned value, or a
//! [`ValidationError`] naming the offending field.

use regex::Regex;
use std::sync::OnceLock;

use crate::constants::limits;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

fn username_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("Invalid regex"))
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("Invalid regex")
    })
}

fn contains_html(value: &str) -> bool {
    value.contains('<') || value.contains('>')
}

pub fn validate_username(raw: &str) -> Result<String, ValidationError> {
    let username = raw.trim();

    if username.is_empty() {
        return Err(ValidationError::new("username", "Username is required"));
    }

    let len = username.chars().count();
    if !(limits::USERNAME_MIN..=limits::USERNAME_MAX).contains(&len) {
        return Err(ValidationError::new(
            "username",
            format!(
                "Username must be between {} and {} characters",
                limits::USERNAME_MIN,
                limits::USERNAME_MAX
            ),
        ));
    }

    if !username_regex().is_match(username) {
        return Err(ValidationError::new(
            "username",
            "Username can only contain letters, numbers, hyphens, and underscores",
        ));
    }

    Ok(username.to_string())
}

pub fn validate_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_lowercase();

    if email.is_empty() {
        return Err(ValidationError::new("email", "Email is required"));
    }

    if email.chars().count() > limits::EMAIL_MAX {
        return Err(ValidationError::new(
            "email",
            format!("Email must be {} characters or less", limits::EMAIL_MAX),
        ));
    }

    if !email_regex().is_match(&email) {
        return Err(ValidationError::new("email", "Invalid email address"));
    }

    Ok(email)
}

pub fn validate_new_password(
    password: &str,
    confirmation: &str,
    min_length: usize,
) -> Result<(), ValidationError> {
    if password.chars().count() < min_length {
        return Err(ValidationError::new(
            "password",
            format!("Password must be at least {min_length} characters long"),
        ));
    }

    if password != confirmation {
        return Err(ValidationError::new("password2", "Passwords must match"));
    }

    Ok(())
}

/// One-time codes are exactly six ASCII digits.
pub fn validate_otp_token(raw: &str) -> Result<String, ValidationError> {
    let token = raw.trim();
    if token.len() == 6 && token.bytes().all(|b| b.is_ascii_digit()) {
        Ok(token.to_string())
    } else {
        Err(ValidationError::new(
            "token",
            "Authentication code must be 6 digits",
        ))
    }
}

pub fn validate_category_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();

    if name.is_empty() {
        return Err(ValidationError::new("name", "Category name is required"));
    }

    if name.chars().count() > limits::CATEGORY_NAME_MAX {
        return Err(ValidationError::new(
            "name",
            format!(
                "Category name must be {} characters or less",
                limits::CATEGORY_NAME_MAX
            ),
        ));
    }

    if contains_html(name) {
        return Err(ValidationError::new(
            "name",
            "This field cannot contain HTML tags",
        ));
    }

    Ok(name.to_string())
}

/// Blank descriptions normalise to `None`.
pub fn validate_category_description(
    raw: Option<&str>,
) -> Result<Option<String>, ValidationError> {
    let Some(description) = raw.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };

    if description.chars().count() > limits::CATEGORY_DESCRIPTION_MAX {
        return Err(ValidationError::new(
            "description",
            format!(
                "Description must be {} characters or less",
                limits::CATEGORY_DESCRIPTION_MAX
            ),
        ));
    }

    Ok(Some(description.to_string()))
}

pub fn validate_incident_title(raw: &str) -> Result<String, ValidationError> {
    let title = raw.trim();

    if title.is_empty() {
        return Err(ValidationError::new("title", "Title cannot be empty"));
    }

    if title.chars().count() > limits::INCIDENT_TITLE_MAX {
        return Err(ValidationError::new(
            "title",
            format!(
                "Title must be {} characters or less",
                limits::INCIDENT_TITLE_MAX
            ),
        ));
    }

    Ok(title.to_string())
}

pub fn validate_incident_description(raw: &str) -> Result<String, ValidationError> {
    let description = raw.trim();

    if description.chars().count() < limits::INCIDENT_DESCRIPTION_MIN {
        return Err(ValidationError::new(
            "description",
            format!(
                "Description must be at least {} characters long",
                limits::INCIDENT_DESCRIPTION_MIN
            ),
        ));
    }

    Ok(description.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert_eq!(validate_username("  alice_01 ").unwrap(), "alice_01");
        assert!(validate_username("ab").is_err());
        assert!(validate_username("").is_err());
        assert!(validate_username("bob smith").is_err());
        assert!(validate_username("<script>").is_err());
        assert!(validate_username(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(
            validate_email(" Alice@Example.COM ").unwrap(),
            "alice@example.com"
        );
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("").is_err());
        assert!(validate_email("<b>x</b>@evil.c").is_err());
        assert!(validate_email("a@b.c").is_err());
        assert!(validate_email("\"x\"@y.zz").is_err());
        assert!(validate_email("first.last+tag@mail.example.org").is_ok());
    }

    #[test]
    fn test_validate_new_password() {
        assert!(validate_new_password("secret1", "secret1", 6).is_ok());
        let short = validate_new_password("abc", "abc", 6).unwrap_err();
        assert_eq!(short.field, "password");
        let mismatch = validate_new_password("secret1", "secret2", 6).unwrap_err();
        assert_eq!(mismatch.field, "password2");
    }

    #[test]
    fn test_validate_otp_token() {
        assert_eq!(validate_otp_token(" 123456 ").unwrap(), "123456");
        assert!(validate_otp_token("12345").is_err());
        assert!(validate_otp_token("12345a").is_err());
        assert!(validate_otp_token("1234567").is_err());
    }

    #[test]
    fn test_validate_category_fields() {
        assert_eq!(validate_category_name("  Network ").unwrap(), "Network");
        assert!(validate_category_name("   ").is_err());
        assert!(validate_category_name("<b>Net</b>").is_err());
        assert!(validate_category_name(&"n".repeat(65)).is_err());

        assert_eq!(validate_category_description(Some("  ")).unwrap(), None);
        assert_eq!(
            validate_category_description(Some(" Outages ")).unwrap(),
            Some("Outages".to_string())
        );
        assert!(validate_category_description(Some(&"d".repeat(256))).is_err());
    }

    #[test]
    fn test_validate_incident_fields() {
        assert_eq!(validate_incident_title(" Outage ").unwrap(), "Outage");
        assert!(validate_incident_title("  ").is_err());
        assert!(validate_incident_title(&"t".repeat(141)).is_err());

        assert!(validate_incident_description("too short").is_err());
        assert!(validate_incident_description("   padded    ").is_err());
        assert!(validate_incident_description("Database is down again").is_ok());
    }
}
