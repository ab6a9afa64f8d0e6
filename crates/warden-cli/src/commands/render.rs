//! Human and JSON output.

use console::style;
use serde::Serialize;

use warden_core::{Action, Decision, Result};
use warden_policy::ModeState;
use warden_recovery::RecoveryCheckpoint;
use warden_runtime::Authorization;

pub(super) fn json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn action_label(action: Action) -> String {
    let label = format!(" {} ", action.to_string().to_uppercase());
    match action {
        Action::Allow => style(label).green().bold().to_string(),
        Action::HintOnly => style(label).cyan().bold().to_string(),
        Action::QuickConfirm => style(label).yellow().bold().to_string(),
        Action::ExplainAndConfirm => style(label).magenta().bold().to_string(),
        Action::Block => style(label).red().bold().reverse().to_string(),
    }
}

pub(super) fn decision(d: &Decision, as_json: bool) -> Result<()> {
    if as_json {
        return json(d);
    }
    println!(
        "{}  risk {}/10 · {} mode",
        action_label(d.action),
        style(d.score()).bold(),
        d.mode
    );
    for reason in &d.reasons {
        println!("   {} {}", style("•").dim(), reason);
    }
    if !d.alternatives.is_empty() {
        println!();
        println!("   {}", style("safer alternatives:").bold());
        for alt in &d.alternatives {
            println!(
                "   {} {}  {}",
                style("→").green(),
                style(&alt.replacement.raw_text).cyan(),
                style(format!("({})", alt.description)).dim()
            );
        }
    }
    Ok(())
}

pub(super) fn checkpoint(cp: &RecoveryCheckpoint) {
    println!(
        "   {} {}  {} · {} · expires {}",
        style("⟲").cyan(),
        style(cp.id).bold(),
        cp.strategy,
        cp.backup_ref,
        cp.expires_at.with_timezone(&chrono::Local).format("%H:%M:%S")
    );
}

pub(super) fn authorization(a: &Authorization, as_json: bool) -> Result<()> {
    if as_json {
        return json(a);
    }
    match a {
        Authorization::Proceed { checkpoint: None } => {
            println!("{} proceed", style("✓").green().bold());
        }
        Authorization::Proceed {
            checkpoint: Some(cp),
        } => {
            println!("{} proceed, undo with `warden restore {}`", style("✓").green().bold(), cp.id);
            checkpoint(cp);
        }
        Authorization::ProceedAtOwnRisk { reason } => {
            println!("{} proceed at your own risk: {}", style("!").yellow().bold(), reason);
        }
        Authorization::Denied { reason } => {
            println!("{} denied: {}", style("✗").red().bold(), reason);
        }
    }
    Ok(())
}

pub(super) fn mode_line(state: &ModeState, learning_days: u32) -> String {
    match state {
        ModeState::Learning { days_observed, .. } => {
            format!("learning (day {} of {})", days_observed, learning_days)
        }
        ModeState::Adaptive => "adaptive".into(),
        ModeState::Flow { expires_at } => format!(
            "flow until {}",
            expires_at.with_timezone(&chrono::Local).format("%H:%M")
        ),
        ModeState::Paranoid => "paranoid".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn mode_lines() {
        let learning = ModeState::Learning {
            started_at: Utc::now(),
            days_observed: 2,
        };
        assert_eq!(mode_line(&learning, 7), "learning (day 2 of 7)");
        assert_eq!(mode_line(&ModeState::Paranoid, 7), "paranoid");
        let flow = ModeState::Flow {
            expires_at: Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap(),
        };
        assert!(mode_line(&flow, 7).starts_with("flow until "));
    }
}
