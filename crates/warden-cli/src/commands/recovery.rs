use console::style;
use serde_json::json;
use uuid::Uuid;

use warden_config::WardenConfig;
use warden_core::Result;
use warden_runtime::Warden;

use super::render;

pub(super) fn cmd_restore(config: WardenConfig, id: Uuid, as_json: bool) -> Result<()> {
    let warden = Warden::from_config(config)?;
    let cp = warden.restore(&id)?;
    if as_json {
        return render::json(&cp);
    }
    println!(
        "{} restored: {}",
        style("⟲").cyan().bold(),
        cp.operation.raw_text
    );
    render::checkpoint(&cp);
    Ok(())
}

pub(super) fn cmd_checkpoints(config: WardenConfig, as_json: bool) -> Result<()> {
    let warden = Warden::from_config(config)?;
    let checkpoints = warden.checkpoints()?;
    if as_json {
        return render::json(&checkpoints);
    }
    if checkpoints.is_empty() {
        println!("No checkpoints.");
        return Ok(());
    }
    let now = chrono::Utc::now();
    for cp in &checkpoints {
        let tag = if cp.is_expired(now) {
            style("expired").dim().to_string()
        } else {
            style("live").green().to_string()
        };
        println!("{}  {}", tag, cp.operation.raw_text);
        render::checkpoint(cp);
    }
    Ok(())
}

pub(super) fn cmd_purge(config: WardenConfig, as_json: bool) -> Result<()> {
    let warden = Warden::from_config(config)?;
    let removed = warden.purge_expired()?;
    if as_json {
        return render::json(&json!({ "removed": removed }));
    }
    println!("Purged {removed} expired checkpoint(s).");
    Ok(())
}
