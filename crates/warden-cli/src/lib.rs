//! # warden-cli
//!
//! Command-line interface for the Warden command-risk advisory engine.
//!
//! ## Commands
//!
//! - `warden evaluate` / `preview`: score an operation
//! - `warden report`: record the human's answer
//! - `warden authorize`: checkpoint and decide whether to run
//! - `warden restore` / `checkpoints` / `purge`: recovery
//! - `warden mode`: show or switch the operating mode
//! - `warden rules`, `config`, `doctor`: inspect the setup

pub mod commands;

pub use commands::Cli;
