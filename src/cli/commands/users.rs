use anyhow::{Context, bail};

use crate::config::Config;
use crate::db::Store;
use crate::domain::{AuditAction, Role, TargetType};
use crate::services::AuditRecorder;
use crate::services::notifier;
use crate::state::SharedState;

pub async fn cmd_create_user(
    config: &Config,
    username: &str,
    email: &str,
    password: &str,
    admin: bool,
) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let notifier = notifier::build_notifier(&config.notifications)?;
    let state = SharedState::with_store(config.clone(), store, notifier)?;

    let role = if admin { Role::Admin } else { Role::Regular };
    let account = state
        .auth_service
        .create_account(username, email, password, role)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    println!(
        "✓ Created {} account '{}' (ID: {})",
        account.role, account.username, account.id
    );
    println!("  The authenticator app is enrolled on first login.");

    Ok(())
}

pub async fn cmd_set_role(config: &Config, username: &str, role: &str) -> anyhow::Result<()> {
    let role: Role = role.parse()?;
    let store = Store::new(&config.general.database_path).await?;

    let Some(user) = store.user_repo().get_by_username(username).await? else {
        bail!("No account named '{username}'");
    };

    let updated = store
        .user_repo()
        .set_role(user.id, role)
        .await?
        .context("Account disappeared while updating")?;

    // Operator actions have no account behind them
    AuditRecorder::new(store)
        .record(AuditAction::Update, TargetType::User, Some(updated.id), None)
        .await;

    println!("✓ '{}' is now {}", updated.username, role);
    Ok(())
}
