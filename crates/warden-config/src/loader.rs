use std::path::{Path, PathBuf};
use tracing::{info, warn};

use warden_core::{Result, WardenError};

use crate::schema::WardenConfig;

/// Loads the Warden configuration from disk and the environment.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: WardenConfig,
    config_path: PathBuf,
    from_file: bool,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > WARDEN_CONFIG env > ~/.warden/warden.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("WARDEN_CONFIG") {
            return PathBuf::from(p);
        }
        default_home().join("warden.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = Self::resolve_path(path);
        let from_file = config_path.exists();
        let config = if from_file {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw, &config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            WardenConfig::default()
        };

        let config = Self::apply_overrides_from(config, |key| std::env::var(key).ok());
        Self::check(&config)?;

        Ok(Self {
            config,
            config_path,
            from_file,
        })
    }

    /// Build a loader from TOML text, without touching the filesystem or env.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config_path = PathBuf::from("<inline>");
        let config = Self::parse(raw, &config_path)?;
        Self::check(&config)?;
        Ok(Self {
            config,
            config_path,
            from_file: false,
        })
    }

    /// Get a copy of the loaded config.
    pub fn get(&self) -> WardenConfig {
        self.config.clone()
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// Path the config was (or would have been) read from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Whether a config file was actually found.
    pub fn from_file(&self) -> bool {
        self.from_file
    }

    fn parse(raw: &str, path: &Path) -> Result<WardenConfig> {
        toml::from_str::<WardenConfig>(raw).map_err(|e| {
            WardenError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Log warnings, fail on errors.
    fn check(config: &WardenConfig) -> Result<()> {
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
                Ok(())
            }
            Err(e) => Err(WardenError::Config(e)),
        }
    }

    /// Apply overrides (WARDEN_LOG_LEVEL, WARDEN_DB_PATH, ...) read through `lookup`.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_overrides_from<F>(mut config: WardenConfig, lookup: F) -> WardenConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("WARDEN_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Some(v) = lookup("WARDEN_DB_PATH") {
            config.store.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("WARDEN_RULES") {
            config.rules.file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("WARDEN_WINDOW") {
            match v.parse::<usize>() {
                Ok(n) => config.engine.window_capacity = n,
                Err(_) => warn!(value = %v, "ignoring non-numeric WARDEN_WINDOW"),
            }
        }
        if let Some(v) = lookup("WARDEN_RETENTION_SECS") {
            match v.parse::<u64>() {
                Ok(n) => config.recovery.retention_secs = n,
                Err(_) => warn!(value = %v, "ignoring non-numeric WARDEN_RETENTION_SECS"),
            }
        }
        config
    }
}

/// `~/.warden`, the home of the config file and the database.
pub fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".warden")
}
