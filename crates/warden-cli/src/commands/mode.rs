use warden_config::WardenConfig;
use warden_core::{ModeKind, Result};
use warden_runtime::Warden;

use super::ModeAction;
use super::render;

pub(super) fn cmd_mode(
    config: WardenConfig,
    identity: &str,
    action: ModeAction,
    as_json: bool,
) -> Result<()> {
    let learning_days = config.modes.learning_period_days;
    let warden = Warden::from_config(config)?;

    let state = match action {
        ModeAction::Show => warden.mode(identity),
        ModeAction::Flow { minutes } => warden.enter_flow(identity, minutes)?,
        ModeAction::Paranoid => warden.enter_paranoid(identity)?,
        ModeAction::Adaptive => match warden.mode(identity).kind() {
            ModeKind::Paranoid => warden.exit_paranoid(identity)?,
            ModeKind::Adaptive => warden.mode(identity),
            // Learning cannot be left early; exit_flow reports the invalid transition.
            ModeKind::Flow | ModeKind::Learning => warden.exit_flow(identity)?,
        },
    };

    if as_json {
        return render::json(&state);
    }
    println!("{}: {}", identity, render::mode_line(&state, learning_days));
    Ok(())
}
