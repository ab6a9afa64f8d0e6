use serde_json::json;

use warden_config::WardenConfig;
use warden_core::{Result, WardenError};
use warden_policy::pattern_key;
use warden_runtime::{Authorization, Warden};

use super::operation::OperationArgs;
use super::render;

pub(super) async fn cmd_evaluate(
    config: WardenConfig,
    identity: &str,
    args: OperationArgs,
    json: bool,
) -> Result<()> {
    let op = args.into_operation()?;
    let warden = Warden::from_config(config)?;
    let decision = warden.evaluate(identity, &op).await?;
    render::decision(&decision, json)
}

pub(super) async fn cmd_preview(
    config: WardenConfig,
    identity: &str,
    args: OperationArgs,
    json: bool,
) -> Result<()> {
    let op = args.into_operation()?;
    let warden = Warden::from_config(config)?;
    let results = warden.probe().await;
    let decision = warden.preview(identity, &op, results)?;
    render::decision(&decision, json)
}

pub(super) fn cmd_report(
    config: WardenConfig,
    identity: &str,
    args: OperationArgs,
    approved: bool,
    mistake: bool,
    as_json: bool,
) -> Result<()> {
    let op = args.into_operation()?;
    let warden = Warden::from_config(config)?;
    let newly_trusted = warden.report_outcome(identity, &op, approved, mistake)?;
    let pattern = pattern_key(&op);
    let trust = warden.trust(identity, &pattern);

    if as_json {
        return render::json(&json!({
            "pattern": pattern,
            "approvals": trust.approval_count,
            "auto_trusted": trust.auto_trusted,
            "newly_trusted": newly_trusted,
        }));
    }
    println!(
        "Recorded {} for {} ({} approvals)",
        if approved { "approval" } else { "denial" },
        pattern,
        trust.approval_count
    );
    if mistake {
        println!("   Marked as a mistake: scores stay raised for a while.");
    }
    if newly_trusted {
        println!("   {} is now trusted in this context.", pattern);
    }
    Ok(())
}

pub(super) async fn cmd_authorize(
    config: WardenConfig,
    identity: &str,
    args: OperationArgs,
    override_block: bool,
    json: bool,
) -> Result<()> {
    let op = args.into_operation()?;
    let warden = Warden::from_config(config)?;
    let decision = warden.evaluate(identity, &op).await?;
    let authorization = warden.authorize(identity, &op, &decision, override_block)?;

    if !json {
        render::decision(&decision, false)?;
        println!();
    }
    render::authorization(&authorization, json)?;

    match authorization {
        Authorization::Denied { reason } => {
            Err(WardenError::Other(anyhow::anyhow!("operation denied: {reason}")))
        }
        _ => Ok(()),
    }
}
