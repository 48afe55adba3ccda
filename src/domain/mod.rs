//! Domain types for incident tracking with strong typing.
//!
//! Roles, statuses and audit vocabulary are closed enums stored as strings in
//! the database. Parsing happens once at the boundary so the rest of the crate
//! never compares raw strings.

pub mod validation;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use validation::ValidationError;

/// Account role.
///
/// Per C-CUSTOM-TYPE: an enum instead of an `is_admin` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Regular,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regular" => Ok(Self::Regular),
            "admin" => Ok(Self::Admin),
            other => Err(ValidationError::new(
                "role",
                format!("Unknown role '{other}'. Expected 'regular' or 'admin'"),
            )),
        }
    }
}

/// Incident lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IncidentStatus {
    #[default]
    Open,
    InProgress,
    Closed,
}

impl IncidentStatus {
    pub const ALL: [Self; 3] = [Self::Open, Self::InProgress, Self::Closed];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::InProgress => "In Progress",
            Self::Closed => "Closed",
        }
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::new("status", "Invalid status"))
    }
}

impl Serialize for IncidentStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for IncidentStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// What an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Register,
    Login,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Register => "register",
            Self::Login => "login",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of row an audit entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetType {
    Incident,
    Category,
    User,
}

impl TargetType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Incident => "Incident",
            Self::Category => "Category",
            Self::User => "User",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation an actor wants to perform, as seen by the authorization policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

/// Resource an action targets.
///
/// Incidents carry their creator so ownership can be checked without a
/// second lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Category,
    Incident { creator_id: Option<i32> },
    AuditLog,
    Dashboard,
    Account,
    Metrics,
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i32,
    pub role: Role,
}

impl Actor {
    #[must_use]
    pub const fn new(id: i32, role: Role) -> Self {
        Self { id, role }
    }
}

/// Account view without password hash, OTP secret or lockout counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub otp_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    #[must_use]
    pub const fn actor(&self) -> Actor {
        Actor::new(self.id, self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" Regular ".parse::<Role>().unwrap(), Role::Regular);
        assert!("root".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::Regular);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(
            "In Progress".parse::<IncidentStatus>().unwrap(),
            IncidentStatus::InProgress
        );
        assert_eq!(
            "closed".parse::<IncidentStatus>().unwrap(),
            IncidentStatus::Closed
        );
        assert!("Pending".parse::<IncidentStatus>().is_err());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&IncidentStatus::InProgress).unwrap();
        assert_eq!(json, "\"In Progress\"");

        let parsed: IncidentStatus = serde_json::from_str("\"Open\"").unwrap();
        assert_eq!(parsed, IncidentStatus::Open);
        assert!(serde_json::from_str::<IncidentStatus>("\"Done\"").is_err());
    }
}
