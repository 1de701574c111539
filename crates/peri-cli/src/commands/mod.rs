//! Subcommand implementations

pub mod client;
pub mod daemon;
pub mod device;
