//! # warden-config
//!
//! Configuration for the Warden engine. Reads `warden.toml`, then applies
//! environment variable overrides, then validates.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::WardenConfig;
pub use schema::{
    ConfigWarning, EngineConfig, LoggingConfig, ModesConfig, RecoveryConfig, RulesConfig,
    StoreConfig, ThresholdsConfig, TrustConfig, WarningSeverity,
};
