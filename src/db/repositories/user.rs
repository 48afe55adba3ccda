use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

use crate::domain::{Account, Role};
use crate::entities::{prelude::*, users};

impl From<users::Model> for Account {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            role: model.role.parse().unwrap_or_default(),
            otp_enabled: model.otp_secret.is_some(),
            username: model.username,
            email: model.email,
            created_at: model.created_at,
        }
    }
}

/// Fields for a new account. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<users::Model>> {
        Users::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")
    }

    /// Case-insensitive username lookup.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<users::Model>> {
        Users::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(users::Column::Username)))
                    .eq(username.trim().to_lowercase()),
            )
            .one(&self.conn)
            .await
            .context("Failed to query user by username")
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<users::Model>> {
        Users::find()
            .filter(users::Column::Email.eq(email.trim().to_lowercase()))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")
    }

    pub async fn create(&self, new_user: NewUser) -> Result<users::Model> {
        let active = users::ActiveModel {
            username: Set(new_user.username),
            email: Set(new_user.email.to_lowercase()),
            password_hash: Set(new_user.password_hash),
            role: Set(new_user.role.as_str().to_string()),
            failed_attempts: Set(0),
            lock_until: Set(None),
            otp_secret: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        active
            .insert(&self.conn)
            .await
            .context("Failed to insert user")
    }

    pub async fn list_admins(&self) -> Result<Vec<users::Model>> {
        Users::find()
            .filter(users::Column::Role.eq(Role::Admin.as_str()))
            .order_by_asc(users::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list admin users")
    }

    /// Swaps the hash only while it still equals `current_hash`.
    /// Returns false when another writer got there first.
    pub async fn replace_password_hash(
        &self,
        id: i32,
        current_hash: &str,
        password_hash: String,
    ) -> Result<bool> {
        let result = Users::update_many()
            .col_expr(users::Column::PasswordHash, Expr::value(password_hash))
            .filter(users::Column::Id.eq(id))
            .filter(users::Column::PasswordHash.eq(current_hash))
            .exec(&self.conn)
            .await
            .context("Failed to update password hash")?;
        Ok(result.rows_affected > 0)
    }

    pub async fn set_otp_secret(&self, id: i32, secret: &str) -> Result<()> {
        Users::update_many()
            .col_expr(users::Column::OtpSecret, Expr::value(secret))
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to store OTP secret")?;
        Ok(())
    }

    pub async fn set_role(&self, id: i32, role: Role) -> Result<Option<users::Model>> {
        let Some(user) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        active.role = Set(role.as_str().to_string());
        let updated = active
            .update(&self.conn)
            .await
            .context("Failed to update user role")?;
        Ok(Some(updated))
    }

    /// Counts one failed login against the persisted counter.
    ///
    /// The increment is a single `UPDATE ... SET failed_attempts = failed_attempts + 1`
    /// so concurrent failures are never lost. Reaching `max_attempts` locks the
    /// account until `now + lock_duration` and resets the counter. An account
    /// that is already locked keeps its existing lock window.
    pub async fn record_failed_attempt(
        &self,
        id: i32,
        max_attempts: u32,
        lock_duration: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<users::Model>> {
        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to begin lockout transaction")?;

        let result = Users::update_many()
            .col_expr(
                users::Column::FailedAttempts,
                Expr::col(users::Column::FailedAttempts).add(1),
            )
            .filter(users::Column::Id.eq(id))
            .exec(&txn)
            .await
            .context("Failed to increment failed attempts")?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(None);
        }

        let user = Users::find_by_id(id)
            .one(&txn)
            .await
            .context("Failed to re-read user after increment")?
            .ok_or_else(|| anyhow::anyhow!("User {id} vanished during lockout update"))?;

        let already_locked = user.lock_until.is_some_and(|until| now < until);
        let threshold = i32::try_from(max_attempts).unwrap_or(i32::MAX);

        let user = if already_locked {
            let mut active: users::ActiveModel = user.into();
            active.failed_attempts = Set(0);
            active.update(&txn).await?
        } else if user.failed_attempts >= threshold {
            let mut active: users::ActiveModel = user.into();
            active.failed_attempts = Set(0);
            active.lock_until = Set(Some(now + lock_duration));
            active.update(&txn).await?
        } else {
            user
        };

        txn.commit()
            .await
            .context("Failed to commit lockout transaction")?;

        Ok(Some(user))
    }

    /// Resets the counter and any lock after a successful login.
    pub async fn clear_failures(&self, id: i32) -> Result<()> {
        Users::update_many()
            .col_expr(users::Column::FailedAttempts, Expr::value(0))
            .col_expr(
                users::Column::LockUntil,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to clear failed attempts")?;
        Ok(())
    }

    /// Clears a lock whose window has passed. Only matches the exact lock value
    /// that was observed, so a lock set in the meantime survives.
    pub async fn clear_expired_lock(&self, id: i32, observed: DateTime<Utc>) -> Result<bool> {
        let result = Users::update_many()
            .col_expr(users::Column::FailedAttempts, Expr::value(0))
            .col_expr(
                users::Column::LockUntil,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .filter(users::Column::Id.eq(id))
            .filter(users::Column::LockUntil.eq(observed))
            .exec(&self.conn)
            .await
            .context("Failed to clear expired lock")?;
        Ok(result.rows_affected > 0)
    }
}
