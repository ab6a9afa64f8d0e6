use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use warden_core::MAX_DURATION_SECS;

/// Root configuration: maps to `warden.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub engine: EngineConfig,
    pub rules: RulesConfig,
    pub trust: TrustConfig,
    pub modes: ModesConfig,
    pub recovery: RecoveryConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

// ── Engine ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of recent operations kept for sequence correlation.
    pub window_capacity: usize,
    /// Per-probe deadline when gathering context, in milliseconds.
    pub probe_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_capacity: 5,
            probe_timeout_ms: 2_000,
        }
    }
}

// ── Rules ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Optional rule book (TOML) loaded at startup.
    pub file: Option<PathBuf>,
    /// Keep the built-in rules and append the file's rules after them.
    /// When false, the file replaces the built-in book entirely.
    pub include_builtin: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            file: None,
            include_builtin: true,
        }
    }
}

// ── Trust ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Approvals after which a pattern becomes auto-trusted.
    pub auto_trust_after: u32,
    /// Idle time after which all trusted patterns are forgotten.
    pub idle_reset_secs: u64,
    /// How long a reported mistake keeps raising risk.
    pub mistake_cooldown_secs: u64,
    /// Oldest mistakes are dropped beyond this many entries.
    pub max_mistake_log: usize,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            auto_trust_after: 3,
            idle_reset_secs: 1_800,
            mistake_cooldown_secs: 3_600,
            max_mistake_log: 200,
        }
    }
}

// ── Modes ──────────────────────────────────────────────────────

/// Minimum risk score at which each action kicks in, before mode shifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    pub hint: i32,
    pub quick_confirm: i32,
    pub explain: i32,
    pub block: i32,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            hint: 4,
            quick_confirm: 6,
            explain: 8,
            block: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModesConfig {
    /// Days of observation before Learning hands over to Adaptive.
    pub learning_period_days: u32,
    /// Flow duration used when none is given explicitly.
    pub default_flow_minutes: u32,
    /// Added to every threshold in Paranoid mode.
    pub paranoid_shift: i32,
    /// Added to every threshold in Flow mode.
    pub flow_shift: i32,
    /// Scores at or above this are never downgraded below explain-and-confirm.
    pub critical_floor: u8,
    pub thresholds: ThresholdsConfig,
    /// Show scores below the hint threshold as hints instead of allowing silently.
    pub show_low_risk_hints: bool,
    /// Local hour at which off-hours begin (inclusive).
    pub off_hours_start: u8,
    /// Local hour at which off-hours end (exclusive).
    pub off_hours_end: u8,
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            learning_period_days: 7,
            default_flow_minutes: 30,
            paranoid_shift: -2,
            flow_shift: 4,
            critical_floor: 9,
            thresholds: ThresholdsConfig::default(),
            show_low_risk_hints: false,
            off_hours_start: 22,
            off_hours_end: 7,
        }
    }
}

// ── Recovery ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// How long a checkpoint stays restorable.
    pub retention_secs: u64,
    /// Approved operations at or above this score are checkpointed first.
    pub min_risk: u8,
    /// Archives larger than this are refused.
    pub max_archive_bytes: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            retention_secs: 60,
            min_risk: 6,
            max_archive_bytes: 64 * 1024 * 1024,
        }
    }
}

// ── Store ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database holding ledgers and checkpoints.
    pub db_path: PathBuf,
    /// Keep everything in memory (nothing survives the process).
    pub in_memory: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: crate::loader::default_home().join("warden.db"),
            in_memory: false,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "[{}] {}: {}", tag, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   hint: {}", h)?;
        }
        Ok(())
    }
}

impl WardenConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Window ───
        if self.engine.window_capacity == 0 {
            warnings.push(ConfigWarning {
                field: "engine.window_capacity".into(),
                message: "window capacity is 0: sequence correlation is impossible".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 5".into()),
            });
        } else if self.engine.window_capacity > 100 {
            warnings.push(ConfigWarning {
                field: "engine.window_capacity".into(),
                message: format!("window capacity {} is very large", self.engine.window_capacity),
                severity: WarningSeverity::Warning,
                hint: Some("Long windows make old operations correlate with new ones".into()),
            });
        }

        // ── Probe timeout ───
        if self.engine.probe_timeout_ms == 0 {
            warnings.push(ConfigWarning {
                field: "engine.probe_timeout_ms".into(),
                message: "probe timeout is 0: every probe will be treated as unavailable".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set to e.g. 2000".into()),
            });
        }

        // ── Thresholds ───
        let t = &self.modes.thresholds;
        if !(t.hint <= t.quick_confirm && t.quick_confirm <= t.explain && t.explain <= t.block) {
            warnings.push(ConfigWarning {
                field: "modes.thresholds".into(),
                message: format!(
                    "thresholds must be ascending (hint {}, quick_confirm {}, explain {}, block {})",
                    t.hint, t.quick_confirm, t.explain, t.block
                ),
                severity: WarningSeverity::Error,
                hint: Some("Defaults are 4, 6, 8, 10".into()),
            });
        }
        if self.modes.paranoid_shift > 0 {
            warnings.push(ConfigWarning {
                field: "modes.paranoid_shift".into(),
                message: "positive paranoid shift makes paranoid mode more permissive".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Use a negative value such as -2".into()),
            });
        }
        if self.modes.critical_floor == 0 || self.modes.critical_floor > 10 {
            warnings.push(ConfigWarning {
                field: "modes.critical_floor".into(),
                message: format!("critical floor {} is outside 1-10", self.modes.critical_floor),
                severity: WarningSeverity::Error,
                hint: Some("Default is 9".into()),
            });
        }
        if self.modes.learning_period_days == 0 {
            warnings.push(ConfigWarning {
                field: "modes.learning_period_days".into(),
                message: "learning period is 0: new identities start adaptive immediately".into(),
                severity: WarningSeverity::Info,
                hint: None,
            });
        }
        if self.modes.off_hours_start > 23 || self.modes.off_hours_end > 23 {
            warnings.push(ConfigWarning {
                field: "modes.off_hours".into(),
                message: "off-hours bounds must be hours 0-23".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }

        // ── Trust ───
        if self.trust.auto_trust_after == 0 {
            warnings.push(ConfigWarning {
                field: "trust.auto_trust_after".into(),
                message: "auto_trust_after is 0: every pattern is trusted before any approval".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 3".into()),
            });
        }

        if self.trust.mistake_cooldown_secs > MAX_DURATION_SECS {
            warnings.push(ConfigWarning {
                field: "trust.mistake_cooldown_secs".into(),
                message: format!(
                    "mistake cool-down {}s is longer than {MAX_DURATION_SECS}s",
                    self.trust.mistake_cooldown_secs
                ),
                severity: WarningSeverity::Error,
                hint: Some("Default is 3600".into()),
            });
        }

        // ── Recovery ───
        if self.recovery.retention_secs > MAX_DURATION_SECS {
            warnings.push(ConfigWarning {
                field: "recovery.retention_secs".into(),
                message: format!(
                    "retention {}s is longer than {MAX_DURATION_SECS}s",
                    self.recovery.retention_secs
                ),
                severity: WarningSeverity::Error,
                hint: Some("Checkpoints are short-lived; default is 60".into()),
            });
        }
        if self.recovery.retention_secs == 0 {
            warnings.push(ConfigWarning {
                field: "recovery.retention_secs".into(),
                message: "retention is 0: checkpoints expire immediately".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set to e.g. 60".into()),
            });
        }
        if self.recovery.min_risk > 10 {
            warnings.push(ConfigWarning {
                field: "recovery.min_risk".into(),
                message: format!("min_risk {} > 10: nothing will be checkpointed", self.recovery.min_risk),
                severity: WarningSeverity::Warning,
                hint: Some("Risk scores range 1-10. A value of 6 is typical.".into()),
            });
        }

        // ── Logging format ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        // Check for hard errors
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
