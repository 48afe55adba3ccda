use crate::config::Config;
use crate::db::Store;

pub async fn cmd_audit(config: &Config, limit: u64) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let entries = store.recent_audit_entries(limit).await?;

    if entries.is_empty() {
        println!("No audit entries.");
        return Ok(());
    }

    println!("Recent Audit Entries (last {}):", entries.len());
    println!("{:-<70}", "");

    for entry in entries {
        let actor = entry
            .user_id
            .map_or_else(|| "system".to_string(), |id| format!("user {id}"));
        let target = entry
            .target_id
            .map_or_else(|| entry.target_type.clone(), |id| format!("{} #{id}", entry.target_type));

        println!("• {} {} by {}", entry.action, target, actor);
        println!("  {}", entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    Ok(())
}
