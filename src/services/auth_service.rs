//! Domain service for authentication and account management.
//!
//! Drives the login sequence: credential check, lockout, mandatory second
//! factor and finally an authenticated session. Also owns registration,
//! password reset and role changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Account, Actor, Role, ValidationError};

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    DuplicateIdentity(String),

    #[error("Invalid username or password.")]
    InvalidCredentials,

    #[error("Account locked until {}.", .until.format("%H:%M on %Y-%m-%d"))]
    Locked { until: DateTime<Utc> },

    #[error("Invalid authentication code.")]
    InvalidOtp,

    /// No login is waiting for a second factor, or it has expired.
    #[error("No login in progress")]
    NoPendingLogin,

    #[error("The reset link is invalid or has expired.")]
    InvalidResetToken,

    #[error("Account not found")]
    AccountNotFound,

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

/// Which second-factor step a pending login still has to pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStage {
    NeedsOtpSetup,
    NeedsOtpVerify,
}

/// Session-scoped proof that the password step succeeded.
///
/// Holding one is necessary but not sufficient for an authenticated session:
/// the second factor must still be verified before it expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLoginTicket {
    pub account_id: i32,
    pub stage: LoginStage,
    pub expires_at: DateTime<Utc>,
    /// Set once this ticket has generated the account's secret.
    #[serde(default)]
    pub provisioned: bool,
}

impl PendingLoginTicket {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Outcome of visiting the setup step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpSetup {
    /// A new secret was stored; render this URI as a QR code.
    Provisioned { provisioning_uri: String },
    /// The account already has a secret this ticket did not create.
    AlreadyEnrolled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Creates a `regular` account.
    ///
    /// # Errors
    ///
    /// [`AuthError::Validation`] for malformed fields and
    /// [`AuthError::DuplicateIdentity`] when the username or email is taken.
    async fn register(&self, registration: Registration) -> Result<Account, AuthError>;

    /// Seeds an account with an explicit role, skipping the confirmation field.
    async fn create_account(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<Account, AuthError>;

    /// Password step of the login sequence.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] or [`AuthError::Locked`]. A locked
    /// account gets the same answer whether or not the password was right.
    async fn submit_credentials(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<PendingLoginTicket, AuthError>;

    /// Provisions a TOTP secret for a ticket in the setup stage.
    async fn begin_otp_setup(
        &self,
        ticket: &mut PendingLoginTicket,
        now: DateTime<Utc>,
    ) -> Result<OtpSetup, AuthError>;

    /// Second-factor step. On success the ticket is spent and the caller
    /// establishes the authenticated session.
    async fn complete_login(
        &self,
        ticket: &PendingLoginTicket,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, AuthError>;

    /// Sends a reset link when the email is known. Always succeeds from the
    /// caller's perspective so account existence is not revealed.
    async fn request_password_reset(&self, email: &str, now: DateTime<Utc>)
    -> Result<(), AuthError>;

    async fn check_reset_token(&self, token: &str, now: DateTime<Utc>)
    -> Result<Account, AuthError>;

    async fn reset_password(
        &self,
        token: &str,
        password: &str,
        password2: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    async fn get_account(&self, account_id: i32) -> Result<Account, AuthError>;

    /// Admin-only role change, audited as an update of the account.
    async fn change_role(
        &self,
        actor: &Actor,
        account_id: i32,
        role: Role,
    ) -> Result<Account, AuthError>;
}
