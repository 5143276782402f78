//! CLI subcommand implementations.

pub mod boards;
pub mod build;
pub mod status;
