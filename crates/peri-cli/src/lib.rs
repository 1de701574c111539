//! periscope: command-line interface crate
//!
//! The subcommand implementations and output helpers for the `periscope`
//! binary.

pub mod commands;
pub mod output;
