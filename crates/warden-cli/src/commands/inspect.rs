use console::style;
use serde_json::json;
use std::time::Duration;

use warden_config::{ConfigLoader, WardenConfig, WarningSeverity};
use warden_core::{Result, WardenError};
use warden_policy::{RuleBook, gather};
use warden_runtime::system_probes;
use warden_store::SqliteStore;

use super::render;

pub(super) fn cmd_rules(config: WardenConfig, sequences: bool, as_json: bool) -> Result<()> {
    let book = RuleBook::load(&config.rules)?;

    if sequences {
        let patterns: Vec<_> = book.sequences().iter().map(|s| &s.pattern).collect();
        if as_json {
            return render::json(&patterns);
        }
        for p in patterns {
            println!(
                "{:<26} {:>+3}  {} ({} steps)",
                style(&p.id).bold(),
                p.risk,
                p.label,
                p.steps.len()
            );
        }
        return Ok(());
    }

    let rules: Vec<_> = book.rules().collect();
    if as_json {
        return render::json(&rules);
    }
    for r in rules {
        let marker = if r.reversible { " ↺" } else { "" };
        println!(
            "{:<26} {:>3}  {}{}",
            style(&r.id).bold(),
            r.base_risk,
            r.label,
            marker
        );
    }
    Ok(())
}

pub(super) fn cmd_config(config: WardenConfig, as_json: bool) -> Result<()> {
    if as_json {
        return render::json(&config);
    }
    println!(
        "{}",
        toml::to_string_pretty(&config).map_err(|e| WardenError::Config(e.to_string()))?
    );
    Ok(())
}

pub(super) async fn cmd_doctor(config: WardenConfig, loader: &ConfigLoader) -> Result<()> {
    println!("Warden doctor");
    println!();

    let mut ok = 0;
    let mut warn_count = 0;
    let mut info_count = 0;

    // ── Config ───
    if loader.from_file() {
        println!("  ✅ config: {}", loader.path().display());
        ok += 1;
    } else {
        println!("  💡 config: {} not found, using defaults", loader.path().display());
        info_count += 1;
    }
    match config.validate() {
        Ok(warnings) => {
            for w in &warnings {
                println!("  {}", w);
                match w.severity {
                    WarningSeverity::Warning => warn_count += 1,
                    WarningSeverity::Info => info_count += 1,
                    WarningSeverity::Error => {}
                }
            }
            if warnings.is_empty() {
                ok += 1;
            }
        }
        Err(e) => println!("  {}", e),
    }

    // ── Rules ───
    match RuleBook::load(&config.rules) {
        Ok(book) => {
            println!(
                "  ✅ rules: {} rules, {} sequences",
                book.rules().count(),
                book.sequences().len()
            );
            ok += 1;
        }
        Err(e) => {
            println!("  ❌ rules: {e}");
            warn_count += 1;
        }
    }

    // ── Store ───
    if config.store.in_memory {
        println!("  💡 store: in memory, nothing survives this process");
        info_count += 1;
    } else {
        match SqliteStore::open(&config.store.db_path) {
            Ok(_) => {
                println!("  ✅ store: {}", config.store.db_path.display());
                ok += 1;
            }
            Err(e) => {
                println!("  ⚠️  store: {e} (decisions will run without memory)");
                warn_count += 1;
            }
        }
    }

    // ── Probes ───
    let cwd = std::env::current_dir()?;
    let timeout = Duration::from_millis(config.engine.probe_timeout_ms);
    let results = gather(&system_probes(&cwd), timeout).await;
    if results.failures.is_empty() {
        println!("  ✅ probes: {} facts", results.facts.len());
        ok += 1;
    }
    for f in &results.failures {
        println!("  ⚠️  probe {}: {} (conservative defaults apply)", f.probe, f.reason);
        warn_count += 1;
    }

    println!();
    println!(
        "  ✅ {} checks passed, ⚠️  {} warnings, 💡 {} suggestions",
        ok, warn_count, info_count
    );
    Ok(())
}

pub(super) fn cmd_version(as_json: bool) -> Result<()> {
    if as_json {
        return render::json(&json!({
            "version": env!("CARGO_PKG_VERSION"),
            "arch": std::env::consts::ARCH,
            "os": std::env::consts::OS,
        }));
    }
    println!("Warden v{}", env!("CARGO_PKG_VERSION"));
    println!("   Rust edition: {}", "2024");
    println!("   Target: {}", std::env::consts::ARCH);
    println!("   OS: {}", std::env::consts::OS);
    #[cfg(debug_assertions)]
    println!("   Profile: debug");
    #[cfg(not(debug_assertions))]
    println!("   Profile: release");
    Ok(())
}
