//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::constants::routes;
use crate::db::{NewUser, Store};
use crate::domain::{
    Account, Action, Actor, AuditAction, Resource, Role, TargetType, validation,
};
use crate::services::audit::AuditRecorder;
use crate::services::auth_service::{
    AuthError, AuthService, LoginStage, OtpSetup, PendingLoginTicket, Registration,
};
use crate::services::lockout::LockoutPolicy;
use crate::services::notifier::{self, Notification, Notifier};
use crate::services::reset_token::ResetTokenSigner;
use crate::services::totp::TotpManager;
use crate::services::{password, policy};

fn login_outcome(outcome: &'static str) {
    metrics::counter!("auth_login_outcomes_total", "outcome" => outcome).increment(1);
}

pub struct SeaOrmAuthService {
    store: Store,
    config: Arc<Config>,
    lockout: LockoutPolicy,
    totp: TotpManager,
    reset_tokens: ResetTokenSigner,
    audit: AuditRecorder,
    notifier: Arc<dyn Notifier>,
}

impl SeaOrmAuthService {
    pub fn new(
        store: Store,
        config: Arc<Config>,
        audit: AuditRecorder,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let security = &config.security;
        let reset_tokens =
            ResetTokenSigner::new(&security.secret_key, security.reset_token_ttl_seconds)?;

        Ok(Self {
            lockout: LockoutPolicy::from_config(&security.lockout),
            totp: TotpManager::new(&security.totp),
            reset_tokens,
            store,
            config,
            audit,
            notifier,
        })
    }

    async fn ensure_unique(&self, username: &str, email: &str) -> Result<(), AuthError> {
        let users = self.store.user_repo();

        if users.get_by_username(username).await?.is_some() {
            return Err(AuthError::DuplicateIdentity(
                "Username already in use.".to_string(),
            ));
        }

        if users.get_by_email(email).await?.is_some() {
            return Err(AuthError::DuplicateIdentity(
                "Email already in use.".to_string(),
            ));
        }

        Ok(())
    }

    async fn insert_account(
        &self,
        username: String,
        email: String,
        password: &str,
        role: Role,
    ) -> Result<Account, AuthError> {
        self.ensure_unique(&username, &email).await?;

        let password_hash = password::hash_password(password, &self.config.security).await?;

        let user = self
            .store
            .user_repo()
            .create(NewUser {
                username,
                email,
                password_hash,
                role,
            })
            .await
            .map_err(|e| {
                // Lost a race with a concurrent registration
                if format!("{e:#}").contains("UNIQUE") {
                    AuthError::DuplicateIdentity("Username or email already in use.".to_string())
                } else {
                    AuthError::from(e)
                }
            })?;

        Ok(Account::from(user))
    }

    async fn record_auth_event(&self, action: AuditAction, account_id: i32) {
        if self.config.audit.record_auth_events {
            self.audit
                .record(action, TargetType::User, Some(account_id), Some(account_id))
                .await;
        }
    }

    /// Resolves a token to the account it was issued for, checking that the
    /// password has not changed since.
    async fn resolve_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<crate::entities::users::Model, AuthError> {
        let (account_id, fingerprint) = self
            .reset_tokens
            .verify(token, now)
            .map_err(|_| AuthError::InvalidResetToken)?;

        let user = self
            .store
            .user_repo()
            .get_by_id(account_id)
            .await?
            .ok_or(AuthError::InvalidResetToken)?;

        if !ResetTokenSigner::matches_password(&fingerprint, &user.password_hash) {
            return Err(AuthError::InvalidResetToken);
        }

        Ok(user)
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn register(&self, registration: Registration) -> Result<Account, AuthError> {
        let username = validation::validate_username(&registration.username)?;
        let email = validation::validate_email(&registration.email)?;
        validation::validate_new_password(
            &registration.password,
            &registration.password2,
            self.config.security.min_password_length,
        )?;

        let account = self
            .insert_account(username, email, &registration.password, Role::Regular)
            .await?;

        info!(user_id = account.id, username = %account.username, "New user registered");
        self.record_auth_event(AuditAction::Register, account.id)
            .await;

        Ok(account)
    }

    async fn create_account(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<Account, AuthError> {
        let username = validation::validate_username(username)?;
        let email = validation::validate_email(email)?;
        validation::validate_new_password(
            password,
            password,
            self.config.security.min_password_length,
        )?;

        let account = self.insert_account(username, email, password, role).await?;
        info!(user_id = account.id, role = %account.role, "Account created");
        Ok(account)
    }

    async fn submit_credentials(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<PendingLoginTicket, AuthError> {
        let Some(user) = self.store.user_repo().get_by_username(username).await? else {
            login_outcome("rejected");
            return Err(AuthError::InvalidCredentials);
        };

        // Checked before the password so a locked answer says nothing about it
        if let Some(until) = self.lockout.active_lock(&self.store, user.id, now).await? {
            login_outcome("locked");
            info!(user_id = user.id, "Login refused for locked account");
            return Err(if self.config.security.lockout.disclose_lock_until {
                AuthError::Locked { until }
            } else {
                AuthError::InvalidCredentials
            });
        }

        if !password::verify_password(password, &user.password_hash).await? {
            self.lockout
                .register_failure(&self.store, user.id, now)
                .await?;
            login_outcome("rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let stage = if user.otp_secret.is_some() {
            LoginStage::NeedsOtpVerify
        } else {
            LoginStage::NeedsOtpSetup
        };

        login_outcome("password_ok");
        info!(user_id = user.id, ?stage, "Password accepted, second factor pending");

        Ok(PendingLoginTicket {
            account_id: user.id,
            stage,
            expires_at: now
                + chrono::Duration::seconds(self.config.security.pending_login_ttl_seconds),
            provisioned: false,
        })
    }

    async fn begin_otp_setup(
        &self,
        ticket: &mut PendingLoginTicket,
        now: DateTime<Utc>,
    ) -> Result<OtpSetup, AuthError> {
        if ticket.is_expired(now) {
            return Err(AuthError::NoPendingLogin);
        }

        let user = self
            .store
            .user_repo()
            .get_by_id(ticket.account_id)
            .await?
            .ok_or(AuthError::NoPendingLogin)?;

        if ticket.stage == LoginStage::NeedsOtpVerify
            || (user.otp_secret.is_some() && !ticket.provisioned)
        {
            // Enrolled elsewhere since the password step; the existing secret wins
            ticket.stage = LoginStage::NeedsOtpVerify;
            return Ok(OtpSetup::AlreadyEnrolled);
        }

        let provisioning_uri = self
            .totp
            .provision(&self.store, user.id, &user.email)
            .await?;
        ticket.provisioned = true;

        Ok(OtpSetup::Provisioned { provisioning_uri })
    }

    async fn complete_login(
        &self,
        ticket: &PendingLoginTicket,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, AuthError> {
        if ticket.is_expired(now) {
            return Err(AuthError::NoPendingLogin);
        }

        let code = validation::validate_otp_token(code)?;

        let user = self
            .store
            .user_repo()
            .get_by_id(ticket.account_id)
            .await?
            .ok_or(AuthError::NoPendingLogin)?;

        if !self.totp.verify(user.otp_secret.as_deref(), &code, now) {
            login_outcome("otp_rejected");
            warn!(user_id = user.id, "Invalid authentication code");
            return Err(AuthError::InvalidOtp);
        }

        self.lockout
            .register_success(&self.store, user.id)
            .await?;
        login_outcome("authenticated");
        info!(user_id = user.id, "Second factor verified, login complete");
        self.record_auth_event(AuditAction::Login, user.id).await;

        Ok(Account::from(user))
    }

    async fn request_password_reset(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let Some(user) = self.store.user_repo().get_by_email(email).await? else {
            info!("Password reset requested for unknown email");
            return Ok(());
        };

        let token = self.reset_tokens.issue(user.id, &user.password_hash, now)?;
        let link = format!(
            "{}{}/{token}",
            self.config.server.public_base_url.trim_end_matches('/'),
            routes::RESET_PASSWORD,
        );

        let notification = Notification {
            subject: "Password Reset Request".to_string(),
            recipients: vec![user.email.clone()],
            html_body: format!(
                "<p>Dear {},</p><p>To reset your password, visit the following link:</p><p><a href=\"{link}\">{link}</a></p><p>If you did not request a password reset, simply ignore this message.</p>",
                html_escape::encode_text(&user.username),
            ),
        };
        notifier::deliver(self.notifier.as_ref(), notification).await;

        info!(user_id = user.id, "Password reset link issued");
        Ok(())
    }

    async fn check_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, AuthError> {
        self.resolve_reset_token(token, now)
            .await
            .map(Account::from)
    }

    async fn reset_password(
        &self,
        token: &str,
        password: &str,
        password2: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let user = self.resolve_reset_token(token, now).await?;

        validation::validate_new_password(
            password,
            password2,
            self.config.security.min_password_length,
        )?;

        let password_hash = password::hash_password(password, &self.config.security).await?;
        let replaced = self
            .store
            .user_repo()
            .replace_password_hash(user.id, &user.password_hash, password_hash)
            .await?;

        // A concurrent reset with the same token already changed the hash
        if !replaced {
            return Err(AuthError::InvalidResetToken);
        }

        info!(user_id = user.id, "Password reset completed");
        Ok(())
    }

    async fn get_account(&self, account_id: i32) -> Result<Account, AuthError> {
        self.store
            .user_repo()
            .get_by_id(account_id)
            .await?
            .map(Account::from)
            .ok_or(AuthError::AccountNotFound)
    }

    async fn change_role(
        &self,
        actor: &Actor,
        account_id: i32,
        role: Role,
    ) -> Result<Account, AuthError> {
        if !policy::authorize(actor, Action::Update, Resource::Account) {
            return Err(AuthError::Forbidden);
        }

        let user = self
            .store
            .user_repo()
            .set_role(account_id, role)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        info!(user_id = actor.id, target = account_id, role = %role, "Role changed");
        self.audit
            .record(
                AuditAction::Update,
                TargetType::User,
                Some(account_id),
                Some(actor.id),
            )
            .await;

        Ok(Account::from(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notifier::testing::RecordingNotifier;
    use crate::services::totp;

    struct Harness {
        service: SeaOrmAuthService,
        store: Store,
        notifier: Arc<RecordingNotifier>,
        path: std::path::PathBuf,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    async fn harness(configure: impl FnOnce(&mut Config)) -> Harness {
        let path =
            std::env::temp_dir().join(format!("incidentry-auth-{}.db", uuid::Uuid::new_v4()));
        let store = Store::new(&format!("sqlite:{}", path.display()))
            .await
            .unwrap();

        let mut config = Config::default();
        config.security.argon2_memory_cost_kib = 1024;
        config.security.argon2_time_cost = 1;
        configure(&mut config);

        let notifier = Arc::new(RecordingNotifier::default());
        let service = SeaOrmAuthService::new(
            store.clone(),
            Arc::new(config),
            AuditRecorder::new(store.clone()),
            notifier.clone(),
        )
        .unwrap();

        Harness {
            service,
            store,
            notifier,
            path,
        }
    }

    fn registration(username: &str, email: &str) -> Registration {
        Registration {
            username: username.to_string(),
            email: email.to_string(),
            password: "secret123".to_string(),
            password2: "secret123".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_defaults_and_duplicates() {
        let h = harness(|_| {}).await;
        let account = h
            .service
            .register(registration("alice", "Alice@Example.com"))
            .await
            .unwrap();
        assert_eq!(account.role, Role::Regular);
        assert_eq!(account.email, "alice@example.com");
        assert!(!account.otp_enabled);

        let dup_name = h
            .service
            .register(registration("ALICE", "other@example.com"))
            .await;
        assert!(matches!(dup_name, Err(AuthError::DuplicateIdentity(_))));

        let dup_email = h
            .service
            .register(registration("bob", "alice@example.com"))
            .await;
        assert!(matches!(dup_email, Err(AuthError::DuplicateIdentity(_))));

        let mut mismatch = registration("carol", "carol@example.com");
        mismatch.password2 = "different".to_string();
        assert!(matches!(
            h.service.register(mismatch).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_full_login_sequence() {
        let h = harness(|_| {}).await;
        let account = h
            .service
            .register(registration("alice", "alice@example.com"))
            .await
            .unwrap();
        let now = Utc::now();

        let mut ticket = h
            .service
            .submit_credentials("alice", "secret123", now)
            .await
            .unwrap();
        assert_eq!(ticket.stage, LoginStage::NeedsOtpSetup);

        // No secret yet: nothing can verify
        assert!(matches!(
            h.service.complete_login(&ticket, "000000", now).await,
            Err(AuthError::InvalidOtp)
        ));

        let OtpSetup::Provisioned { provisioning_uri } =
            h.service.begin_otp_setup(&mut ticket, now).await.unwrap()
        else {
            panic!("expected provisioning");
        };
        assert!(provisioning_uri.starts_with("otpauth://totp/IncidentTracker:alice%40example.com"));

        let secret = h
            .store
            .user_repo()
            .get_by_id(account.id)
            .await
            .unwrap()
            .unwrap()
            .otp_secret
            .unwrap();
        let code = totp::code_at(&secret, now.timestamp()).unwrap();
        let logged_in = h.service.complete_login(&ticket, &code, now).await.unwrap();
        assert_eq!(logged_in.id, account.id);

        // Next login must go through verification, not setup
        let ticket = h
            .service
            .submit_credentials("alice", "secret123", now)
            .await
            .unwrap();
        assert_eq!(ticket.stage, LoginStage::NeedsOtpVerify);
    }

    #[tokio::test]
    async fn test_locked_account_hides_password_validity() {
        let h = harness(|_| {}).await;
        h.service
            .register(registration("alice", "alice@example.com"))
            .await
            .unwrap();
        let now = Utc::now();

        for _ in 0..5 {
            let result = h.service.submit_credentials("alice", "wrong-pass", now).await;
            assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        }

        let wrong = h
            .service
            .submit_credentials("alice", "wrong-pass", now)
            .await
            .unwrap_err()
            .to_string();
        let right = h
            .service
            .submit_credentials("alice", "secret123", now)
            .await
            .unwrap_err()
            .to_string();
        assert!(wrong.starts_with("Account locked until"));
        assert_eq!(wrong, right);
    }

    #[tokio::test]
    async fn test_lock_can_be_reported_generically() {
        let h = harness(|c| c.security.lockout.disclose_lock_until = false).await;
        h.service
            .register(registration("alice", "alice@example.com"))
            .await
            .unwrap();
        let now = Utc::now();

        for _ in 0..5 {
            let _ = h.service.submit_credentials("alice", "wrong-pass", now).await;
        }

        assert!(matches!(
            h.service.submit_credentials("alice", "secret123", now).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_expired_ticket_is_refused() {
        let h = harness(|_| {}).await;
        h.service
            .register(registration("alice", "alice@example.com"))
            .await
            .unwrap();
        let now = Utc::now();
        let mut ticket = h
            .service
            .submit_credentials("alice", "secret123", now)
            .await
            .unwrap();

        let later = ticket.expires_at;
        assert!(matches!(
            h.service.begin_otp_setup(&mut ticket, later).await,
            Err(AuthError::NoPendingLogin)
        ));
        assert!(matches!(
            h.service.complete_login(&ticket, "123456", later).await,
            Err(AuthError::NoPendingLogin)
        ));
    }

    #[tokio::test]
    async fn test_reset_token_is_single_use() {
        let h = harness(|_| {}).await;
        h.service
            .register(registration("alice", "alice@example.com"))
            .await
            .unwrap();
        let now = Utc::now();

        h.service
            .request_password_reset("alice@example.com", now)
            .await
            .unwrap();
        h.service
            .request_password_reset("nobody@example.com", now)
            .await
            .unwrap();

        let sent = h.notifier.sent.lock().await.clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients, vec!["alice@example.com".to_string()]);
        let token = sent[0]
            .html_body
            .split("/auth/reset_password/")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap()
            .to_string();

        h.service.check_reset_token(&token, now).await.unwrap();
        h.service
            .reset_password(&token, "brand-new", "brand-new", now)
            .await
            .unwrap();

        assert!(matches!(
            h.service
                .reset_password(&token, "again-new", "again-new", now)
                .await,
            Err(AuthError::InvalidResetToken)
        ));
        assert!(h.service.submit_credentials("alice", "brand-new", now).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reset_token_races_accept_only_one() {
        let h = harness(|_| {}).await;
        h.service
            .register(registration("alice", "alice@example.com"))
            .await
            .unwrap();
        let now = Utc::now();

        h.service
            .request_password_reset("alice@example.com", now)
            .await
            .unwrap();
        let body = h.notifier.sent.lock().await[0].html_body.clone();
        let token = body
            .split("/auth/reset_password/")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap()
            .to_string();

        let (first, second) = tokio::join!(
            h.service
                .reset_password(&token, "first-pass", "first-pass", now),
            h.service
                .reset_password(&token, "second-pass", "second-pass", now),
        );

        assert!(first.is_ok() != second.is_ok());
        let loser = if first.is_ok() { second } else { first };
        assert!(matches!(loser, Err(AuthError::InvalidResetToken)));

        let first_works = h
            .service
            .submit_credentials("alice", "first-pass", now)
            .await
            .is_ok();
        let second_works = h
            .service
            .submit_credentials("alice", "second-pass", now)
            .await
            .is_ok();
        assert!(first_works != second_works);
    }

    #[tokio::test]
    async fn test_change_role_requires_admin() {
        let h = harness(|_| {}).await;
        let target = h
            .service
            .register(registration("alice", "alice@example.com"))
            .await
            .unwrap();
        let regular = Actor::new(target.id, Role::Regular);

        assert!(matches!(
            h.service.change_role(&regular, target.id, Role::Admin).await,
            Err(AuthError::Forbidden)
        ));
        assert_eq!(h.store.audit_repo().count().await.unwrap(), 0);

        let admin = Actor::new(999, Role::Admin);
        let updated = h
            .service
            .change_role(&admin, target.id, Role::Admin)
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(h.store.audit_repo().count().await.unwrap(), 1);
    }
}
