//! Subcommand implementations.

pub mod config;
pub mod mirror;
pub mod verify;
